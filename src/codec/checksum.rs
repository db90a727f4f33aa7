//! Adler-32 (EWF1) and CRC-32 (EWF2) checksums used throughout the section
//! and chunk codecs.
//!
//! CRC-32 is delegated to `crc32fast` (hardware-accelerated on supported
//! targets). Adler-32 has no equivalent crate anywhere in the dependency
//! corpus this crate draws from, so it is implemented directly — it is a
//! dozen lines of the textbook rolling-sum algorithm, not a reimplementation
//! of anything the ecosystem already provides as a crate.

const ADLER_MOD: u32 = 65521;

pub fn adler32(data: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for &byte in data {
        a = (a + byte as u32) % ADLER_MOD;
        b = (b + a) % ADLER_MOD;
    }
    (b << 16) | a
}

pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adler32_known_answer() {
        // "Wikipedia" -> 0x11E60398 per the RFC 1950 worked example.
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
    }

    #[test]
    fn adler32_empty_is_one() {
        assert_eq!(adler32(b""), 1);
    }

    #[test]
    fn crc32_matches_known_vector() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }
}
