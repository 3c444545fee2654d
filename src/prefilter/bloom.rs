//! Fixed-size bloom filter over raw byte keys.

/// Bit array of `2^bits_log2` bits, each key setting `hashes` derived indexes.
#[derive(Clone)]
pub struct BloomFilter {
    words: Vec<u64>,
    mask: u64,
    hashes: u32,
    inserted: usize,
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
const GOLDEN: u64 = 0x9e37_79b9_7f4a_7c15;

#[inline]
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |h, &b| (h ^ b as u64).wrapping_mul(FNV_PRIME))
}

/// splitmix64 finalizer
#[inline]
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

impl BloomFilter {
    pub fn new(bits_log2: u32, hashes: u32) -> Self {
        let bits = 1u64 << bits_log2.clamp(6, 40);
        Self {
            words: vec![0; (bits / 64) as usize],
            mask: bits - 1,
            hashes: hashes.max(1),
            inserted: 0,
        }
    }

    #[inline]
    fn positions(&self, item: &[u8]) -> impl Iterator<Item = u64> + '_ {
        let base = fnv1a(item);
        (0..self.hashes as u64).map(move |i| mix(base ^ i.wrapping_mul(GOLDEN)) & self.mask)
    }

    pub fn insert(&mut self, item: &[u8]) {
        let positions: Vec<u64> = self.positions(item).collect();
        for pos in positions {
            self.words[(pos >> 6) as usize] |= 1 << (pos & 63);
        }
        self.inserted += 1;
    }

    /// May return false positives, never false negatives.
    #[inline]
    pub fn contains(&self, item: &[u8]) -> bool {
        self.positions(item)
            .all(|pos| self.words[(pos >> 6) as usize] & (1 << (pos & 63)) != 0)
    }

    pub fn bit_len(&self) -> u64 {
        self.mask + 1
    }

    pub fn len(&self) -> usize {
        self.inserted
    }

    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }

    /// Theoretical false-positive rate `(1 - e^(-kn/m))^k`.
    pub fn estimated_fp_rate(&self) -> f64 {
        let k = self.hashes as f64;
        let exponent = -k * self.inserted as f64 / self.bit_len() as f64;
        (1.0 - exponent.exp()).powf(k)
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("bits", &self.bit_len())
            .field("hashes", &self.hashes)
            .field("inserted", &self.inserted)
            .finish()
    }
}
