//! Fnv-1a hasher, used for the crate wide `Map`

const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const PRIME: u64 = 0x100_0000_01b3;

pub(crate) struct CHasher(u64);

impl CHasher {
    pub(crate) const fn new() -> CHasher {
        CHasher(OFFSET_BASIS)
    }
}

impl Default for CHasher {
    fn default() -> CHasher {
        CHasher::new()
    }
}

impl std::hash::Hasher for CHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        let CHasher(mut hash) = *self;
        for byte in bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(PRIME);
        }
        *self = CHasher(hash);
    }
}
