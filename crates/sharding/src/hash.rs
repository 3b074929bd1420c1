//! Bucket hash.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1 hash (multiply, then xor) of the key bytes.
///
/// Bucket assignment depends on the exact value, so this must stay FNV-1 and
/// not the more common FNV-1a.
pub fn fnv1_32(key: &str) -> u32 {
    key.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        hash.wrapping_mul(FNV_PRIME) ^ u32::from(byte)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(fnv1_32(""), 0x811c_9dc5);
        assert_eq!(fnv1_32("a"), 0x050c_5d7e);
        assert_eq!(fnv1_32("foobar"), 0x31f0_b262);
    }

    #[test]
    fn test_customer_keys() {
        assert_eq!(fnv1_32("1"), 84_696_366);
        assert_eq!(fnv1_32("5"), 84_696_362);
        assert_eq!(fnv1_32("42"), 494_316_163);
    }
}
