//! The LEF tree: an arena of file-entry nodes, addressed by index rather
//! than raw pointers (§9 "cyclic parent/child references in the LEF tree").

/// One node of the LEF tree (§3 `LefFileEntry`).
#[derive(Clone, Debug, Default)]
pub struct LefFileEntry {
    pub identifier: u64,
    pub entry_type: u8,
    pub flags: u32,

    pub data_offset: i64,
    pub data_size: u64,
    pub logical_offset: i64,
    pub physical_offset: i64,
    pub duplicate_data_offset: i64,

    pub guid: String,
    pub name: String,
    pub short_name: String,

    pub size: u64,
    pub source_identifier: String,
    pub permission_group_index: u32,
    pub record_type: String,

    pub creation_time: Option<i64>,
    pub modification_time: Option<i64>,
    pub access_time: Option<i64>,
    pub entry_modification_time: Option<i64>,
    pub deletion_time: Option<i64>,

    pub md5_hash: Option<String>,
    pub sha1_hash: Option<String>,

    pub extended_attributes: Vec<(String, String)>,
}

struct LefNode {
    entry: LefFileEntry,
    children: Vec<usize>,
}

/// Arena owning every node; children are stored by index, and a node's
/// parent is reachable via a side table rather than a back-pointer (§9).
#[derive(Default)]
pub struct LefTree {
    nodes: Vec<LefNode>,
    parents: Vec<Option<usize>>,
    root: Option<usize>,
}

impl LefTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_node(&mut self, entry: LefFileEntry, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(LefNode { entry, children: Vec::new() });
        self.parents.push(parent);
        if let Some(parent_index) = parent {
            self.nodes[parent_index].children.push(index);
        } else if self.root.is_none() {
            self.root = Some(index);
        }
        index
    }

    pub fn root(&self) -> Option<FileEntryRef<'_>> {
        self.root.map(|index| FileEntryRef { tree: self, index })
    }

    pub fn entry_by_index(&self, index: usize) -> Option<FileEntryRef<'_>> {
        if index < self.nodes.len() {
            Some(FileEntryRef { tree: self, index })
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// A borrow-style reference to one node, tied to the owning [`LefTree`]'s
/// lifetime (§3 "individual entry handles ... are borrow-style references").
#[derive(Clone, Copy)]
pub struct FileEntryRef<'a> {
    tree: &'a LefTree,
    index: usize,
}

impl<'a> FileEntryRef<'a> {
    fn node(&self) -> &'a LefNode {
        &self.tree.nodes[self.index]
    }

    pub fn entry(&self) -> &'a LefFileEntry {
        &self.node().entry
    }

    pub fn name(&self) -> &'a str {
        &self.entry().name
    }

    pub fn size(&self) -> u64 {
        self.entry().size
    }

    pub fn md5(&self) -> Option<&'a str> {
        self.entry().md5_hash.as_deref()
    }

    pub fn sha1(&self) -> Option<&'a str> {
        self.entry().sha1_hash.as_deref()
    }

    pub fn number_of_sub_entries(&self) -> usize {
        self.node().children.len()
    }

    pub fn sub(&self, index: usize) -> Option<FileEntryRef<'a>> {
        self.node().children.get(index).map(|&child_index| FileEntryRef { tree: self.tree, index: child_index })
    }

    pub fn parent(&self) -> Option<FileEntryRef<'a>> {
        self.tree.parents[self.index].map(|parent_index| FileEntryRef { tree: self.tree, index: parent_index })
    }
}

/// One group's worth of ACL entries from a `perm` sub-table (§B).
#[derive(Clone, Debug, Default)]
pub struct PermissionRecord {
    pub group_index: u32,
    pub entries: Vec<AclEntry>,
}

#[derive(Clone, Debug, Default)]
pub struct AclEntry {
    pub ace_type: u32,
    pub flags: u32,
    pub access_mask: u32,
    pub identifier: String,
}

/// One `srce` row (§B).
#[derive(Clone, Debug, Default)]
pub struct SourceRecord {
    pub identifier: String,
    pub fields: std::collections::HashMap<String, String>,
}

/// One `sub` row (§B).
#[derive(Clone, Debug, Default)]
pub struct SubjectRecord {
    pub identifier: String,
    pub fields: std::collections::HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_5_lef_tree_shape() {
        let mut tree = LefTree::new();
        let root = tree.push_node(LefFileEntry { name: "/".into(), ..Default::default() }, None);
        let foo = LefFileEntry { name: "foo.txt".into(), size: 13, md5_hash: Some("9e107d9d372bb6826bd81d3542a419d6".into()), ..Default::default() };
        tree.push_node(foo, Some(root));
        let bar = LefFileEntry { name: "bar".into(), ..Default::default() };
        tree.push_node(bar, Some(root));

        let root_ref = tree.root().unwrap();
        assert_eq!(root_ref.name(), "/");
        let foo_ref = root_ref.sub(0).unwrap();
        assert_eq!(foo_ref.name(), "foo.txt");
        assert_eq!(foo_ref.size(), 13);
        assert_eq!(foo_ref.md5(), Some("9e107d9d372bb6826bd81d3542a419d6"));
        let bar_ref = root_ref.sub(1).unwrap();
        assert_eq!(bar_ref.number_of_sub_entries(), 0);
    }

    #[test]
    fn parent_traversal_round_trips() {
        let mut tree = LefTree::new();
        let root = tree.push_node(LefFileEntry { name: "/".into(), ..Default::default() }, None);
        tree.push_node(LefFileEntry { name: "child".into(), ..Default::default() }, Some(root));

        let child = tree.root().unwrap().sub(0).unwrap();
        assert_eq!(child.parent().unwrap().name(), "/");
    }
}
