//! LEF parser (C9): logical evidence file tree (§4.7, §9, §B).

pub mod parse;
pub mod tree;

pub use parse::{parse_ltree_body, utf16le_to_string, LefParseResult};
pub use tree::{AclEntry, FileEntryRef, LefFileEntry, LefTree, PermissionRecord, SourceRecord, SubjectRecord};
