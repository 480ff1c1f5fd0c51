//! XOR masking of client payloads (RFC 6455 Section 5.3).
//!
//! `output[i] = input[i] ^ key[i % 4]`. The transform is its own inverse, so the same function
//! masks and unmasks.

/// Masks or unmasks `buf` in place with the 4-byte `key`.
#[inline]
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    apply_mask_words(buf, key);
}

/// Byte-at-a-time reference implementation.
#[inline]
fn apply_mask_bytes(buf: &mut [u8], key: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

/// Processes the buffer in 4-byte words. Every word starts at an offset that is a multiple of
/// four, so each one lines up with the key and the tail can use the byte path unchanged.
#[inline]
fn apply_mask_words(buf: &mut [u8], key: [u8; 4]) {
    let key_word = u32::from_ne_bytes(key);

    let mut words = buf.chunks_exact_mut(4);
    for word in &mut words {
        let masked = u32::from_ne_bytes([word[0], word[1], word[2], word[3]]) ^ key_word;
        word.copy_from_slice(&masked.to_ne_bytes());
    }
    apply_mask_bytes(words.into_remainder(), key);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_match_bytes() {
        let keys = [
            [0x00, 0x00, 0x00, 0x00],
            [0xFF, 0xFF, 0xFF, 0xFF],
            [0x12, 0x34, 0x56, 0x78],
            [0x6d, 0xb6, 0xb2, 0x80],
        ];

        for key in keys {
            for size in 0..=67 {
                let data: Vec<u8> = (0..size).map(|i| (i * 7) as u8).collect();

                let mut expected = data.clone();
                apply_mask_bytes(&mut expected, key);

                let mut actual = data.clone();
                apply_mask_words(&mut actual, key);

                assert_eq!(expected, actual, "key {:?} size {}", key, size);
            }
        }
    }

    #[test]
    fn test_mask_is_self_inverse() {
        let key = [0xAA, 0xBB, 0xCC, 0xDD];
        let original = b"Hello, World! This is a test message with various lengths.";

        let mut data = original.to_vec();
        apply_mask(&mut data, key);
        assert_ne!(&data[..], &original[..]);

        apply_mask(&mut data, key);
        assert_eq!(&data[..], &original[..]);
    }

    #[test]
    fn test_mask_self_inverse_random() {
        use rand::{Rng, RngCore};

        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let len = rng.gen_range(0..512);
            let mut data = vec![0u8; len];
            rng.fill_bytes(&mut data);
            let key: [u8; 4] = rng.gen();

            let original = data.clone();
            apply_mask(&mut data, key);
            apply_mask(&mut data, key);
            assert_eq!(data, original);
        }
    }

    #[test]
    fn test_mask_short_buffers() {
        let key = [0x12, 0x34, 0x56, 0x78];

        let mut empty: Vec<u8> = vec![];
        apply_mask(&mut empty, key);
        assert!(empty.is_empty());

        let mut three = vec![0xAB, 0xCD, 0xEF];
        apply_mask(&mut three, key);
        assert_eq!(three, vec![0xAB ^ 0x12, 0xCD ^ 0x34, 0xEF ^ 0x56]);

        let mut five = vec![0x00; 5];
        apply_mask(&mut five, key);
        assert_eq!(five, vec![0x12, 0x34, 0x56, 0x78, 0x12]);
    }

    #[test]
    fn test_mask_known_vector() {
        // "Hello" masked with 37 fa 21 3d, RFC 6455 Section 5.7
        let mut data = b"Hello".to_vec();
        apply_mask(&mut data, [0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(data, vec![0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_mask_subslice_offsets() {
        let key = [0xAA, 0xBB, 0xCC, 0xDD];
        let buffer: Vec<u8> = (0..20).collect();

        for offset in 0..4 {
            let mut data = buffer.clone();
            apply_mask(&mut data[offset..], key);

            for (i, &byte) in data[offset..].iter().enumerate() {
                assert_eq!(byte, buffer[offset + i] ^ key[i % 4], "offset {} index {}", offset, i);
            }
        }
    }
}
