//! Shannon entropy over head-of-file byte samples.
//!
//! Detection conservatively treats unreadable or empty files as zero
//! entropy rather than fabricating a signal: a sample that cannot be read
//! must never push the score upward.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes sampled from the head of each file by default.
///
/// Head-of-file sampling is a deliberate trade-off: headers of many formats
/// are low-entropy even when the payload is encrypted, but sampling stays
/// cheap and deterministic.
pub const DEFAULT_SAMPLE_BYTES: usize = 4096;

/// Shannon entropy of a byte slice, in bits per byte. Ranges over [0, 8];
/// the empty slice yields 0.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }

    let len = data.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Entropy of up to `sample_bytes` bytes from the head of a file.
///
/// Any I/O failure yields 0.0.
pub fn file_entropy(path: &Path, sample_bytes: usize) -> f64 {
    let mut buf = vec![0u8; sample_bytes];
    let read = File::open(path).and_then(|mut f| {
        let mut filled = 0;
        // read to the byte budget or EOF, whichever comes first
        loop {
            match f.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => {
                    filled += n;
                    if filled == buf.len() {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    });

    match read {
        Ok(filled) => shannon_entropy(&buf[..filled]),
        Err(_) => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(shannon_entropy(&[]), 0.0);
    }

    #[test]
    fn constant_input_is_zero() {
        let data = vec![0x41u8; 8192];
        assert_eq!(shannon_entropy(&data), 0.0);
    }

    #[test]
    fn full_byte_range_is_eight_bits() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let h = shannon_entropy(&data);
        assert!((h - 8.0).abs() < 1e-9, "expected 8.0, got {h}");
    }

    #[test]
    fn two_symbol_input_is_one_bit() {
        let data: Vec<u8> = [0u8, 255u8].iter().cycle().take(1024).copied().collect();
        let h = shannon_entropy(&data);
        assert!((h - 1.0).abs() < 1e-9, "expected 1.0, got {h}");
    }

    #[test]
    fn unreadable_path_is_zero() {
        assert_eq!(
            file_entropy(Path::new("/nonexistent/sample.bin"), DEFAULT_SAMPLE_BYTES),
            0.0
        );
    }

    #[test]
    fn file_sampling_respects_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.bin");
        let mut f = std::fs::File::create(&path).unwrap();
        // constant head, high-entropy tail beyond the budget
        f.write_all(&[0u8; 4096]).unwrap();
        let tail: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        f.write_all(&tail).unwrap();

        assert_eq!(file_entropy(&path, 4096), 0.0);
        assert!(file_entropy(&path, 8192) > 0.5);
    }

    #[test]
    fn empty_file_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::File::create(&path).unwrap();
        assert_eq!(file_entropy(&path, DEFAULT_SAMPLE_BYTES), 0.0);
    }

    proptest! {
        #[test]
        fn entropy_stays_in_range(data: Vec<u8>) {
            let h = shannon_entropy(&data);
            prop_assert!((0.0..=8.0).contains(&h), "entropy {} out of range", h);
        }

        #[test]
        fn entropy_is_permutation_invariant(mut data: Vec<u8>) {
            let before = shannon_entropy(&data);
            data.reverse();
            let after = shannon_entropy(&data);
            prop_assert!((before - after).abs() < 1e-9);
        }
    }
}
