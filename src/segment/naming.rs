//! Segment-file discovery and naming (§4.1 filename discovery, §4.8 writer
//! naming table, §6.3 filename regex).

use crate::config::EwfFormat;
use crate::error::EwfError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

type Result<T> = std::result::Result<T, EwfError>;

/// The naming family an EWF segment-file set belongs to (§4.8 table).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentFamily {
    /// `.E01..E99, .EAA.., .EZZ` — EWF1 raw image (EnCase).
    E,
    /// `.s01..` — EWF1 raw image (SMART/ASR data).
    S,
    /// `.L01..` — EWF1 logical evidence file.
    L,
    /// `.Ex01..` — EWF2 raw image (EnCase7+).
    Ex,
    /// `.Lx01..` — EWF2 logical evidence file (EnCase7+).
    Lx,
}

impl SegmentFamily {
    pub fn for_format(format: EwfFormat, logical: bool) -> Self {
        match (format.is_v2(), logical) {
            (true, true) => SegmentFamily::Lx,
            (true, false) => SegmentFamily::Ex,
            (false, true) => SegmentFamily::L,
            (false, false) => SegmentFamily::E,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            SegmentFamily::E => "E",
            SegmentFamily::S => "s",
            SegmentFamily::L => "L",
            SegmentFamily::Ex => "Ex",
            SegmentFamily::Lx => "Lx",
        }
    }

    /// All recognised prefixes, for sniffing an arbitrary input filename.
    const ALL: [SegmentFamily; 5] =
        [SegmentFamily::E, SegmentFamily::S, SegmentFamily::L, SegmentFamily::Ex, SegmentFamily::Lx];
}

/// Extension for the `n`-th segment (1-based) in `family`, following the
/// `E01..E99, EAA..EAZ, EBA..` alphabetic-carry convention (§4.8).
pub fn extension_for_ordinal(family: SegmentFamily, n: u32) -> String {
    let prefix = family.prefix();
    if n == 0 {
        panic!("segment ordinal is 1-based");
    }
    if n <= 99 {
        format!("{prefix}{n:02}")
    } else {
        // n=100 -> AA, n=101 -> AB, ... carrying every 26 like a base-26 counter.
        let idx = n - 100;
        let first = (b'A' + (idx / 26) as u8) as char;
        let second = (b'A' + (idx % 26) as u8) as char;
        format!("{prefix}{first}{second}")
    }
}

fn strip_known_extension(filename: &str) -> Option<(&str, SegmentFamily)> {
    let dot = filename.rfind('.')?;
    let (base, ext) = (&filename[..dot], &filename[dot + 1..]);
    for family in SegmentFamily::ALL {
        let prefix = family.prefix();
        // The suffix must match `[0-9A-Z]{2,3}` (§6.3): restricting to
        // digits/uppercase (not `is_ascii_alphanumeric`, which also accepts
        // lowercase) is what makes "Ex01" fail the `E`-family check here
        // rather than being misclassified before `Ex` is ever tried.
        if ext.len() >= prefix.len() + 2
            && ext[..prefix.len()].eq_ignore_ascii_case(prefix)
            && ext[prefix.len()..].chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        {
            return Some((base, family));
        }
    }
    None
}

/// Discover the full ordered segment set given one member's path (§4.1).
/// Enumerates ascending ordinals until a file is missing (case-insensitive).
pub fn discover_segment_set(path: &Path) -> Result<Vec<PathBuf>> {
    let filename = path
        .file_name()
        .ok_or_else(|| EwfError::InvalidArgument("segment path has no filename".into()))?
        .to_string_lossy()
        .to_string();
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    let Some((base, family)) = strip_known_extension(&filename) else {
        debug!(%filename, "not a recognised EWF segment extension, treating as single file");
        return Ok(vec![path.to_path_buf()]);
    };

    debug!(base, ?family, "discovering EWF segment set");
    let mut found = Vec::new();
    let mut n = 1u32;
    loop {
        let ext = extension_for_ordinal(family, n);
        let candidate = parent.join(format!("{base}.{ext}"));
        if candidate.exists() {
            found.push(candidate);
        } else {
            let lower = parent.join(format!("{base}.{}", ext.to_lowercase()));
            if lower.exists() {
                found.push(lower);
            } else {
                break;
            }
        }
        n += 1;
        if n > 99 + 26 * 26 {
            break;
        }
    }

    if found.is_empty() {
        return Err(EwfError::Io {
            message: format!("no segment files found for {}", path.display()),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "segment set empty"),
        });
    }
    trace!(count = found.len(), "segment set discovered");
    Ok(found)
}

/// True if `filename` matches the accepted segment-extension regex (§6.3).
pub fn is_segment_filename(filename: &str) -> bool {
    strip_known_extension(filename).is_some()
}

/// Total size across a segment set, for progress reporting.
pub fn total_size(paths: &[PathBuf]) -> Result<u64> {
    let mut total = 0u64;
    for p in paths {
        total += fs::metadata(p).map_err(|e| EwfError::io(format!("stat {}", p.display()), e))?.len();
    }
    Ok(total)
}
