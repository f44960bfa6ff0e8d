//! Deterministic identifier hashing.
//!
//! FNV-1a 32-bit over UTF-8 bytes. Used only to derive stable ids
//! (url hashes, story ids, digest ids); it is not a security primitive.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// FNV-1a 32-bit hash of `input`.
pub fn fnv1a32(input: &str) -> u32 {
    input.as_bytes().iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u32::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Lower-case, zero-padded 8 hex chars.
pub fn to_hex8(value: u32) -> String {
    format!("{value:08x}")
}

/// `to_hex8(fnv1a32(input))`.
pub fn hash_hex(input: &str) -> String {
    to_hex8(fnv1a32(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        // Reference values for FNV-1a 32.
        assert_eq!(fnv1a32(""), 0x811c_9dc5);
        assert_eq!(fnv1a32("a"), 0xe40c_292c);
        assert_eq!(fnv1a32("foobar"), 0xbf9c_f968);
    }

    #[test]
    fn hex_is_padded() {
        assert_eq!(to_hex8(0xab), "000000ab");
        assert_eq!(hash_hex("a"), "e40c292c");
        assert_eq!(hash_hex("anything").len(), 8);
    }
}
