//! Expert Witness Compression Format (EWF) evidence container engine.
//!
//! Reads and writes E01/Ex01/L01/Lx01 forensic disk image containers: the
//! raw sector stream, case/evidence/examiner header text, MD5/SHA-1
//! verification hashes, acquisition-error and optical-disc session ranges,
//! and — for logical evidence files — the captured file-entry tree.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  EwfHandle (handle.rs)                                        │
//! │   - open/read_buffer/seek/verify/close (read side)            │
//! │   - begin_write/write_buffer/finalise (write side)            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  MediaStream (media_stream.rs)                                │
//! │   - cached random-access reads over the chunk table           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  segment/ (naming, io_pool, section, reader) + writer.rs      │
//! │   - segment-file discovery, section framing, rollover         │
//! ├──────────────────────────────────────────────────────────────┤
//! │  chunk_table.rs, chunk_codec.rs, cache.rs                     │
//! │   - chunk location index, decode pipeline, LRU cache           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  header_values.rs, hash_values.rs, ranges.rs, media_values.rs │
//! │   - typed section payloads                                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  lef/ (mod, parse, tree)                                      │
//! │   - logical evidence file tree                                │
//! ├──────────────────────────────────────────────────────────────┤
//! │  codec/ (binary, checksum, compression)                       │
//! │   - little-endian framing, Adler-32/CRC-32, deflate            │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod macros;

pub mod cache;
pub mod chunk_codec;
pub mod chunk_table;
pub mod codec;
pub mod config;
pub mod error;
pub mod handle;
pub mod hash_values;
pub mod header_values;
pub mod lef;
pub mod logging;
pub mod media_stream;
pub mod media_values;
pub mod ranges;
pub mod segment;
pub mod writer;

pub use config::{CompressionLevel, CompressionMethod, DateFormat, EwfConfig, EwfFormat, MediaFlags, MediaType};
pub use error::{EwfError, Result};
pub use handle::{CancellationFlag, EwfHandle};
pub use hash_values::HashValueMap;
pub use header_values::HeaderValueMap;
pub use lef::{FileEntryRef, LefTree};
pub use media_stream::MediaStream;
pub use media_values::MediaValues;
pub use ranges::{SectorRange, SectorRangeList};
