//! Reader/writer configuration knobs (spec §6.5).

use serde::{Deserialize, Serialize};

/// Output EWF variant, driving filename extensions and section layout choices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EwfFormat {
    Smart,
    Ftk,
    EnCase1,
    EnCase2,
    EnCase3,
    EnCase4,
    EnCase5,
    EnCase6,
    EnCase7,
    Linen5,
    Linen6,
    Linen7,
    Ewfx,
    Lvf,
    L01,
    Lx01,
}

impl EwfFormat {
    pub fn is_v2(self) -> bool {
        matches!(self, EwfFormat::EnCase7 | EwfFormat::Lx01)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, EwfFormat::Lvf | EwfFormat::L01 | EwfFormat::Lx01)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionLevel {
    None,
    Fast,
    Best,
}

impl CompressionLevel {
    pub fn to_flate2_level(self) -> flate2::Compression {
        match self {
            CompressionLevel::None => flate2::Compression::none(),
            CompressionLevel::Fast => flate2::Compression::fast(),
            CompressionLevel::Best => flate2::Compression::best(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionMethod {
    Deflate,
    #[cfg(feature = "bzip2-chunks")]
    Bzip2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Removable,
    Fixed,
    Optical,
    Memory,
    SingleFiles,
}

crate::bitflags_lite! {
    /// Bits carried in the `volume`/`disk` section's media-flags field.
    pub struct MediaFlags: u32 {
        const PHYSICAL = 0x01;
        const FASTBLOC_WRITEBLOCKED = 0x02;
        const TABLEAU_WRITEBLOCKED = 0x04;
        const SINGLE_FILES = 0x08;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateFormat {
    DayMonth,
    MonthDay,
    Ctime,
    Iso8601,
}

/// Knobs for both the reader (open path) and the writer (§6.5).
#[derive(Clone, Debug)]
pub struct EwfConfig {
    pub max_segment_size: u64,
    pub chunk_cache_entries: usize,
    pub open_file_limit: usize,
    pub compression_level: CompressionLevel,
    pub compression_method: CompressionMethod,
    pub format: EwfFormat,
    pub media_type: MediaType,
    pub media_flags: MediaFlags,
    pub header_codepage: &'static str,
    pub date_format: DateFormat,
    /// When set, a recoverable [`crate::error::EwfError::Corrupt`] is propagated
    /// instead of absorbed as a flag on the affected chunk/section.
    pub strict: bool,
    /// AES-256 key derived (PBKDF2-HMAC-SHA-256, §6.4) from a user-supplied
    /// password, for decrypting EWF2 encrypted chunks. Read support only;
    /// gated behind `ewf2-encryption` per the §9 open question on key
    /// derivation parameters.
    #[cfg(feature = "ewf2-encryption")]
    pub encryption_key: Option<[u8; 32]>,
}

impl Default for EwfConfig {
    fn default() -> Self {
        EwfConfig {
            max_segment_size: 650 * 1024 * 1024,
            chunk_cache_entries: 8,
            open_file_limit: 16,
            compression_level: CompressionLevel::None,
            compression_method: CompressionMethod::Deflate,
            format: EwfFormat::EnCase6,
            media_type: MediaType::Fixed,
            media_flags: MediaFlags::PHYSICAL,
            header_codepage: "windows-1252",
            date_format: DateFormat::Iso8601,
            strict: false,
            #[cfg(feature = "ewf2-encryption")]
            encryption_key: None,
        }
    }
}

impl EwfConfig {
    pub fn with_max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    pub fn with_chunk_cache_entries(mut self, n: usize) -> Self {
        self.chunk_cache_entries = n;
        self
    }

    pub fn with_open_file_limit(mut self, n: usize) -> Self {
        self.open_file_limit = n;
        self
    }

    pub fn with_compression_level(mut self, level: CompressionLevel) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_format(mut self, format: EwfFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Derive the per-image AES-256 key from `password` and `salt` via
    /// PBKDF2-HMAC-SHA-256 (§6.4). The iteration count is an assumption
    /// pending a reference capture (§9 open question; recorded in DESIGN.md).
    #[cfg(feature = "ewf2-encryption")]
    pub fn with_encryption_password(mut self, password: &str, salt: &[u8]) -> Self {
        const ITERATIONS: u32 = 100_000;
        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password.as_bytes(), salt, ITERATIONS, &mut key);
        self.encryption_key = Some(key);
        self
    }
}

