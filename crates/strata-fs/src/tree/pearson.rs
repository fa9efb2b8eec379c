//! 64-bit Pearson hashing for the frozen lookup table

const TABLE: [u8; 256] = permutation();

/// Fixed permutation of 0..=255 (Fisher-Yates driven by xorshift32)
const fn permutation() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = i as u8;
        i += 1;
    }

    let mut state: u32 = 0x9E37_79B9;
    let mut i = 255;
    while i > 0 {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let j = (state % (i as u32 + 1)) as usize;
        let tmp = table[i];
        table[i] = table[j];
        table[j] = tmp;
        i -= 1;
    }
    table
}

/// Eight 8-bit Pearson passes, each with the first byte perturbed by the
/// pass number, concatenated into one u64.
pub(crate) fn pearson64(data: &[u8]) -> u64 {
    let mut out = 0u64;
    for pass in 0..8u8 {
        let mut h = match data.first() {
            Some(&first) => TABLE[first.wrapping_add(pass) as usize],
            None => TABLE[pass as usize],
        };
        for &b in data.iter().skip(1) {
            h = TABLE[(h ^ b) as usize];
        }
        out = (out << 8) | h as u64;
    }
    out
}

/// Table slot for `path` in a table built over `entries` files
pub(crate) fn slot(path: &str, entries: usize) -> usize {
    (pearson64(path.as_bytes()) % (entries as u64 + 1)) as usize
}
