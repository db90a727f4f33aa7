//! Segment-file layer (C1/C2/C10): naming/discovery, the file-handle pool,
//! section descriptor framing, and the reader that ties them together.

pub mod io_pool;
pub mod naming;
pub mod reader;
pub mod section;

pub use naming::{discover_segment_set, extension_for_ordinal, is_segment_filename, SegmentFamily};
pub use reader::{open_explicit_set, open_set, OpenedImage};
