//! `ltree` payload parser (C9, §4.7): UTF-16LE -> UTF-8 -> tab-delimited
//! records -> a [`LefTree`] plus permission/source/subject record lists.
//!
//! Column-tag vocabulary grounded on `libewf_single_files.c` /
//! `libewf_lef_file_entry.h` (`examples/original_source/libewf`).

use super::tree::{AclEntry, LefFileEntry, LefTree, PermissionRecord, SourceRecord, SubjectRecord};
use std::collections::HashMap;
use tracing::warn;

#[derive(Default)]
pub struct LefParseResult {
    pub tree: LefTree,
    pub permissions: Vec<PermissionRecord>,
    pub sources: Vec<SourceRecord>,
    pub subjects: Vec<SubjectRecord>,
}

/// Step 1 of §4.7: decode a `ltree` section's UTF-16LE payload to UTF-8.
pub fn utf16le_to_string(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .filter_map(|c| if c.len() == 2 { Some(u16::from_le_bytes([c[0], c[1]])) } else { None })
        .collect();
    String::from_utf16_lossy(&units)
}

/// Parse an already-UTF-8 `ltree` body into a tree + side tables. Malformed
/// text never aborts the parse (§4.10): unrecognised structure truncates the
/// tree at that point and is logged.
pub fn parse_ltree_body(text: &str) -> LefParseResult {
    let lines: Vec<&str> = text.lines().collect();
    let mut result = LefParseResult::default();

    let Some(entry_header_index) = lines.iter().position(|l| *l == "entry") else {
        warn!("ltree payload has no 'entry' section header");
        return result;
    };
    let Some(types_line) = lines.get(entry_header_index + 1) else {
        warn!("ltree 'entry' section header has no types row");
        return result;
    };
    let columns: Vec<&str> = types_line.split('\t').collect();

    let mut cursor = entry_header_index + 2;
    parse_siblings(&lines, &mut cursor, &columns, &mut result.tree, None, usize::MAX);

    parse_supplementary_sections(&lines, cursor, &mut result);
    result
}

fn is_section_marker(line: &str) -> bool {
    matches!(line, "entry" | "perm" | "srce" | "sub")
}

/// Consume a flat `<types>\n<row>\n<row>\n...` table starting at `start`
/// (the types line), stopping at a blank line, the next section marker, or
/// end of input. Returns the column tags, the raw rows, and the cursor
/// position just past the table.
fn parse_flat_rows<'a>(lines: &'a [&'a str], start: usize) -> (Vec<&'a str>, Vec<Vec<&'a str>>, usize) {
    let columns: Vec<&str> = lines.get(start).copied().unwrap_or("").split('\t').collect();
    let mut cursor = start + 1;
    let mut rows = Vec::new();
    while cursor < lines.len() {
        let line = lines[cursor];
        if line.is_empty() || is_section_marker(line) {
            break;
        }
        rows.push(line.split('\t').collect::<Vec<&str>>());
        cursor += 1;
    }
    (columns, rows, cursor)
}

/// §B "LEF permission/source/subject records": the `perm`/`srce`/`sub`
/// sub-tables that follow the `entry` tree in a `ltree` payload.
fn parse_supplementary_sections(lines: &[&str], mut cursor: usize, result: &mut LefParseResult) {
    while cursor < lines.len() {
        match lines[cursor] {
            "perm" => {
                let (columns, rows, next) = parse_flat_rows(lines, cursor + 1);
                result.permissions = build_permission_records(&columns, &rows);
                cursor = next;
            }
            "srce" => {
                let (columns, rows, next) = parse_flat_rows(lines, cursor + 1);
                result.sources =
                    rows.iter().map(|row| build_identified_record(&columns, row)).map(SourceRecord::from).collect();
                cursor = next;
            }
            "sub" => {
                let (columns, rows, next) = parse_flat_rows(lines, cursor + 1);
                result.subjects =
                    rows.iter().map(|row| build_identified_record(&columns, row)).map(SubjectRecord::from).collect();
                cursor = next;
            }
            _ => cursor += 1,
        }
    }
}

/// `pm` groups rows into one [`PermissionRecord`] per group index, each
/// carrying the ACE described by that row's `ty`/`fl`/`am`/`id` columns.
fn build_permission_records(columns: &[&str], rows: &[Vec<&str>]) -> Vec<PermissionRecord> {
    let mut records: Vec<PermissionRecord> = Vec::new();
    for row in rows {
        let mut group_index = 0u32;
        let mut entry = AclEntry::default();
        for (i, &col) in columns.iter().enumerate() {
            let Some(&value) = row.get(i) else { continue };
            match col {
                "pm" => group_index = value.parse().unwrap_or(0),
                "ty" => entry.ace_type = value.parse().unwrap_or(0),
                "fl" => entry.flags = value.parse().unwrap_or(0),
                "am" => entry.access_mask = value.parse().unwrap_or(0),
                "id" => entry.identifier = value.to_string(),
                _ => {}
            }
        }
        match records.iter_mut().find(|r| r.group_index == group_index) {
            Some(existing) => existing.entries.push(entry),
            None => records.push(PermissionRecord { group_index, entries: vec![entry] }),
        }
    }
    records
}

/// Zips `columns` against one `srce`/`sub` row into `(identifier, fields)`,
/// with the `id` column (if present) doubling as the record's identifier.
fn build_identified_record(columns: &[&str], row: &[&str]) -> (String, HashMap<String, String>) {
    let mut fields = HashMap::new();
    for (i, &col) in columns.iter().enumerate() {
        let Some(&value) = row.get(i) else { continue };
        if !value.is_empty() {
            fields.insert(col.to_string(), value.to_string());
        }
    }
    let identifier = fields.get("id").cloned().unwrap_or_default();
    (identifier, fields)
}

impl From<(String, HashMap<String, String>)> for SourceRecord {
    fn from((identifier, fields): (String, HashMap<String, String>)) -> Self {
        SourceRecord { identifier, fields }
    }
}

impl From<(String, HashMap<String, String>)> for SubjectRecord {
    fn from((identifier, fields): (String, HashMap<String, String>)) -> Self {
        SubjectRecord { identifier, fields }
    }
}

/// Recursively consume `limit` sibling records (or until input/section end)
/// as children of `parent`.
fn parse_siblings(
    lines: &[&str],
    cursor: &mut usize,
    columns: &[&str],
    tree: &mut LefTree,
    parent: Option<usize>,
    limit: usize,
) {
    let mut consumed = 0usize;
    while consumed < limit && *cursor + 1 < lines.len() {
        let count_line = lines[*cursor];
        let values_line = lines[*cursor + 1];
        if count_line.is_empty() || values_line.is_empty() || is_section_marker(count_line) {
            break;
        }

        let sub_count: usize = count_line.split('\t').nth(1).and_then(|s| s.parse().ok()).unwrap_or(0);
        let values: Vec<&str> = values_line.split('\t').collect();
        let entry = build_entry(columns, &values);

        *cursor += 2;
        let node_index = tree.push_node(entry, parent);
        parse_siblings(lines, cursor, columns, tree, Some(node_index), sub_count);

        consumed += 1;
    }
}

fn build_entry(columns: &[&str], values: &[&str]) -> LefFileEntry {
    let mut entry = LefFileEntry::default();
    for (i, &col) in columns.iter().enumerate() {
        let Some(&value) = values.get(i) else { continue };
        if value.is_empty() {
            continue;
        }
        apply_column(&mut entry, col, value);
    }
    entry
}

fn apply_column(entry: &mut LefFileEntry, tag: &str, value: &str) {
    match tag {
        "n" => entry.name = value.to_string(),
        "p" => entry.short_name = value.to_string(),
        "ls" => entry.size = value.parse().unwrap_or(0),
        "ha" => entry.md5_hash = Some(value.to_string()),
        "sha" => entry.sha1_hash = Some(value.to_string()),
        "be" => apply_binary_extent(entry, value),
        "lo" => entry.logical_offset = value.parse().unwrap_or(0),
        "po" => entry.physical_offset = value.parse().unwrap_or(0),
        "cr" => entry.creation_time = value.parse().ok(),
        "ac" => entry.access_time = value.parse().ok(),
        "mo" => entry.modification_time = value.parse().ok(),
        "wr" => entry.entry_modification_time = value.parse().ok(),
        "dl" => entry.deletion_time = value.parse().ok(),
        "du" => entry.duplicate_data_offset = value.parse().unwrap_or(0),
        "id" => entry.identifier = value.parse().unwrap_or(0),
        "pm" => entry.permission_group_index = value.parse().unwrap_or(0),
        "src" => entry.source_identifier = value.to_string(),
        // Unrecognised columns (including undocumented ones like `jq`, `cid`,
        // `opr`) are kept verbatim rather than guessed at, matching the
        // `unknown_dc` treatment in header_values.rs.
        other => entry.extended_attributes.push((other.to_string(), value.to_string())),
    }
}

/// §4.7 step 6: `be` is `count {offset size}+` space-separated hex; only the
/// first extent is kept as the entry's primary data location, matching
/// `data_offset`/`data_size` in §3.
fn apply_binary_extent(entry: &mut LefFileEntry, value: &str) {
    let mut parts = value.split_whitespace();
    let Some(_count) = parts.next() else { return };
    if let (Some(offset_hex), Some(size_hex)) = (parts.next(), parts.next()) {
        if let (Ok(offset), Ok(size)) = (i64::from_str_radix(offset_hex, 16), u64::from_str_radix(size_hex, 16)) {
            entry.data_offset = offset;
            entry.data_size = size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ltree() -> String {
        [
            "entry",
            "n\tls\tha",
            "node\t2",
            "/",
            "node\t0",
            "foo.txt\t13\t9e107d9d372bb6826bd81d3542a419d6",
            "node\t0",
            "bar",
        ]
        .join("\n")
    }

    #[test]
    fn scenario_5_lef_tree_from_text() {
        let result = parse_ltree_body(&sample_ltree());
        let root = result.tree.root().unwrap();
        assert_eq!(root.name(), "/");
        let foo = root.sub(0).unwrap();
        assert_eq!(foo.name(), "foo.txt");
        assert_eq!(foo.size(), 13);
        assert_eq!(foo.md5(), Some("9e107d9d372bb6826bd81d3542a419d6"));
        let bar = root.sub(1).unwrap();
        assert_eq!(bar.number_of_sub_entries(), 0);
    }

    #[test]
    fn utf16le_round_trip() {
        let original = "hello/world";
        let bytes: Vec<u8> = original.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert_eq!(utf16le_to_string(&bytes), original);
    }

    #[test]
    fn unknown_column_kept_verbatim_in_extended_attributes() {
        let text = ["entry", "n\tjq", "node\t0", "file.bin\tmystery-value"].join("\n");
        let result = parse_ltree_body(&text);
        let entry = result.tree.root().unwrap().entry();
        assert_eq!(entry.extended_attributes, vec![("jq".to_string(), "mystery-value".to_string())]);
    }

    #[test]
    fn binary_extent_parses_hex_offset_and_size() {
        let text = ["entry", "n\tbe", "node\t0", "file.bin\t1 13135c1 3f44"].join("\n");
        let result = parse_ltree_body(&text);
        let entry = result.tree.root().unwrap().entry();
        assert_eq!(entry.data_offset, 0x13135c1);
        assert_eq!(entry.data_size, 0x3f44);
    }

    #[test]
    fn missing_entry_header_returns_empty_tree() {
        let result = parse_ltree_body("not an ltree payload");
        assert!(result.tree.is_empty());
    }

    #[test]
    fn perm_srce_sub_sections_populate_side_tables() {
        let text = [
            "entry",
            "n\tls",
            "node\t0",
            "file.bin\t4",
            "perm",
            "pm\tty\tfl\tam\tid",
            "0\t1\t0\t2032127\tS-1-5-21",
            "0\t1\t0\t1179817\tS-1-5-32-544",
            "1\t1\t0\t2032127\tS-1-5-18",
            "srce",
            "id\tdr\tip",
            "1\tC:\\\\evidence\\\\image.E01\t10.0.0.5",
            "sub",
            "id\tn",
            "1\tJ. Examiner",
        ]
        .join("\n");

        let result = parse_ltree_body(&text);

        assert_eq!(result.permissions.len(), 2);
        let group0 = result.permissions.iter().find(|p| p.group_index == 0).unwrap();
        assert_eq!(group0.entries.len(), 2);
        assert_eq!(group0.entries[0].identifier, "S-1-5-21");
        assert_eq!(group0.entries[0].access_mask, 2032127);
        let group1 = result.permissions.iter().find(|p| p.group_index == 1).unwrap();
        assert_eq!(group1.entries.len(), 1);
        assert_eq!(group1.entries[0].identifier, "S-1-5-18");

        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].identifier, "1");
        assert_eq!(result.sources[0].fields.get("ip").map(String::as_str), Some("10.0.0.5"));

        assert_eq!(result.subjects.len(), 1);
        assert_eq!(result.subjects[0].identifier, "1");
        assert_eq!(result.subjects[0].fields.get("n").map(String::as_str), Some("J. Examiner"));
    }
}
