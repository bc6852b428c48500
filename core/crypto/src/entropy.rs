//! Byte-level entropy estimates.
//!
//! Used to hint whether a file already looks encrypted or compressed:
//! ciphertext approaches 8 bits per byte (perplexity 256), text sits
//! well below.

/// Shannon entropy of `data` in bits per byte (0.0 for empty input).
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut counts = [0u64; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }

    let len = data.len() as f64;
    counts
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Perplexity of `data`: `2^entropy`, between 1 and 256.
pub fn perplexity(data: &[u8]) -> f64 {
    shannon_entropy(data).exp2()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::CipherMethod;
    use crate::keys::Key;

    #[test]
    fn test_constant_input_has_zero_entropy() {
        assert_eq!(shannon_entropy(&[7u8; 1000]), 0.0);
        assert_eq!(perplexity(&[7u8; 1000]), 1.0);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(shannon_entropy(&[]), 0.0);
    }

    #[test]
    fn test_uniform_bytes() {
        let data: Vec<u8> = (0..=255u8).cycle().take(256 * 16).collect();
        assert!((shannon_entropy(&data) - 8.0).abs() < 1e-9);
        assert!((perplexity(&data) - 256.0).abs() < 1e-6);
    }

    #[test]
    fn test_two_symbols() {
        assert!((shannon_entropy(b"abababab") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ciphertext_looks_random() {
        let key = Key::generate(CipherMethod::Aes256Gcm);
        let ciphertext = CipherMethod::Aes256Gcm
            .encrypt(key.as_bytes(), &[0u8; 64 * 1024])
            .unwrap();
        assert!(shannon_entropy(&ciphertext) > 7.9);
    }
}
