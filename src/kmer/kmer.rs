// src/kmer/kmer.rs
//! Multi-word 2-bit k-mer codec.
//!
//! Base `i` of a k-mer lives in word `i / 32` at bit offset `62 - 2 * (i % 32)`,
//! so the first base occupies the most significant bits of the first word.
//! With that layout, comparing the word vectors of two equal-length k-mers is
//! the same as comparing their sequences lexicographically, which is what
//! canonicalization needs. Bits past the last base are always zero.

use crate::error::{Error, Result};
use std::fmt;

pub const BASES_PER_WORD: usize = 32;

pub const BASE_A: u8 = 0;
pub const BASE_C: u8 = 1;
pub const BASE_G: u8 = 2;
pub const BASE_T: u8 = 3;

const ALPHABET: [u8; 4] = *b"ACGT";

/// Complement of a 2-bit base.
#[inline]
pub fn complement(base: u8) -> u8 {
    3 - (base & 3)
}

/// Number of words needed to hold `len` bases.
#[inline]
pub fn words_for(len: usize) -> usize {
    len.div_ceil(BASES_PER_WORD)
}

/// Encodes an ASCII nucleotide to 2 bits, `None` for anything outside ACGT.
#[inline]
pub fn encode_base(b: u8) -> Option<u8> {
    match b {
        b'A' | b'a' => Some(BASE_A),
        b'C' | b'c' => Some(BASE_C),
        b'G' | b'g' => Some(BASE_G),
        b'T' | b't' => Some(BASE_T),
        _ => None,
    }
}

#[inline]
pub fn decode_base(base: u8) -> u8 {
    ALPHABET[(base & 3) as usize]
}

/// Decodes a slice of 2-bit bases to an ASCII string.
pub fn decode_bases(bases: &[u8]) -> String {
    bases.iter().map(|&b| decode_base(b) as char).collect()
}

/// Encodes an ASCII sequence to 2-bit bases.
pub fn encode_bases(seq: &[u8]) -> Result<Vec<u8>> {
    seq.iter()
        .map(|&c| encode_base(c).ok_or(Error::InvalidBase(c as char)))
        .collect()
}

#[inline]
fn shift_of(i: usize) -> u32 {
    (62 - 2 * (i % BASES_PER_WORD)) as u32
}

/// A bit-packed k-mer of arbitrary length.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Kmer {
    words: Vec<u64>,
    len: usize,
}

impl Kmer {
    /// A k-mer of `len` bases, all `A`.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; words_for(len)],
            len,
        }
    }

    pub fn from_bases(bases: &[u8]) -> Self {
        let mut kmer = Self::new(bases.len());
        for (i, &b) in bases.iter().enumerate() {
            kmer.set(i, b);
        }
        kmer
    }

    pub fn from_ascii(seq: &[u8]) -> Result<Self> {
        Ok(Self::from_bases(&encode_bases(seq)?))
    }

    /// Rebuilds a k-mer from its packed words, as read back from a record file.
    ///
    /// Extra words are dropped and missing ones are zero-filled; bits past
    /// `len` are cleared.
    pub fn from_words(mut words: Vec<u64>, len: usize) -> Self {
        words.resize(words_for(len), 0);
        let mut kmer = Self { words, len };
        kmer.mask_tail();
        kmer
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    #[inline]
    pub fn get(&self, i: usize) -> u8 {
        debug_assert!(i < self.len);
        ((self.words[i / BASES_PER_WORD] >> shift_of(i)) & 3) as u8
    }

    #[inline]
    pub fn set(&mut self, i: usize, base: u8) {
        debug_assert!(i < self.len);
        let shift = shift_of(i);
        let word = &mut self.words[i / BASES_PER_WORD];
        *word = (*word & !(3u64 << shift)) | (((base & 3) as u64) << shift);
    }

    #[inline]
    pub fn first(&self) -> u8 {
        self.get(0)
    }

    #[inline]
    pub fn last(&self) -> u8 {
        self.get(self.len - 1)
    }

    pub fn to_bases(&self) -> Vec<u8> {
        (0..self.len).map(|i| self.get(i)).collect()
    }

    pub fn reverse_complement(&self) -> Self {
        let mut rc = Self::new(self.len);
        for i in 0..self.len {
            rc.set(self.len - 1 - i, complement(self.get(i)));
        }
        rc
    }

    /// Returns the smaller of the k-mer and its reverse complement, and whether
    /// the reverse complement was chosen.
    pub fn canonical(&self) -> (Self, bool) {
        let rc = self.reverse_complement();
        if rc < *self {
            (rc, true)
        } else {
            (self.clone(), false)
        }
    }

    pub fn is_canonical(&self) -> bool {
        *self <= self.reverse_complement()
    }

    /// Slides one base to the right: drops the first base, appends `base`.
    pub fn extend_forward(&self, base: u8) -> Self {
        let mut next = self.clone();
        next.shift_left();
        next.set(next.len - 1, base);
        next
    }

    /// Slides one base to the left: prepends `base`, drops the last base.
    pub fn extend_backward(&self, base: u8) -> Self {
        let mut prev = self.clone();
        prev.shift_right();
        prev.set(0, base);
        prev.mask_tail();
        prev
    }

    /// The (len + 1)-mer with `base` appended.
    pub fn push_back(&self, base: u8) -> Self {
        let mut longer = self.clone();
        longer.len += 1;
        longer.words.resize(words_for(longer.len), 0);
        longer.set(longer.len - 1, base);
        longer
    }

    /// The (len + 1)-mer with `base` prepended.
    pub fn push_front(&self, base: u8) -> Self {
        let mut longer = self.clone();
        longer.len += 1;
        longer.words.resize(words_for(longer.len), 0);
        longer.shift_right();
        longer.set(0, base);
        longer
    }

    /// The (len - 1)-mer without the first base.
    pub fn drop_first(&self) -> Self {
        let mut shorter = self.clone();
        shorter.shift_left();
        shorter.len -= 1;
        shorter.words.truncate(words_for(shorter.len));
        shorter
    }

    /// The (len - 1)-mer without the last base.
    pub fn drop_last(&self) -> Self {
        let mut shorter = self.clone();
        shorter.len -= 1;
        shorter.words.truncate(words_for(shorter.len));
        shorter.mask_tail();
        shorter
    }

    fn shift_left(&mut self) {
        let n = self.words.len();
        for i in 0..n {
            let carry = if i + 1 < n { self.words[i + 1] >> 62 } else { 0 };
            self.words[i] = (self.words[i] << 2) | carry;
        }
    }

    fn shift_right(&mut self) {
        for i in (0..self.words.len()).rev() {
            let carry = if i > 0 { self.words[i - 1] << 62 } else { 0 };
            self.words[i] = (self.words[i] >> 2) | carry;
        }
    }

    fn mask_tail(&mut self) {
        let used = self.len % BASES_PER_WORD;
        if used != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= !0u64 << (64 - 2 * used);
            }
        }
    }
}

impl fmt::Display for Kmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.len {
            write!(f, "{}", decode_base(self.get(i)) as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Kmer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kmer({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn random_seq(rng: &mut StdRng, len: usize) -> String {
        (0..len).map(|_| ALPHABET[rng.gen_range(0..4)] as char).collect()
    }

    fn revcomp_str(seq: &str) -> String {
        seq.bytes()
            .rev()
            .map(|b| match b {
                b'A' => 'T',
                b'C' => 'G',
                b'G' => 'C',
                _ => 'A',
            })
            .collect()
    }

    #[test]
    fn test_ascii_roundtrip() {
        let kmer = Kmer::from_ascii(b"ACGTTGCA").unwrap();
        assert_eq!(kmer.len(), 8);
        assert_eq!(kmer.to_string(), "ACGTTGCA");
        assert_eq!(kmer.to_bases(), vec![0, 1, 2, 3, 3, 2, 1, 0]);
    }

    #[test]
    fn test_invalid_base() {
        assert!(matches!(Kmer::from_ascii(b"ACNT"), Err(Error::InvalidBase('N'))));
    }

    #[test]
    fn test_reverse_complement_across_words() {
        let mut rng = StdRng::seed_from_u64(7);
        for len in [1, 5, 31, 32, 33, 63, 64, 65, 203] {
            let seq = random_seq(&mut rng, len);
            let kmer = Kmer::from_ascii(seq.as_bytes()).unwrap();
            assert_eq!(kmer.reverse_complement().to_string(), revcomp_str(&seq));
        }
    }

    #[test]
    fn test_canonical_symmetry() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let len = rng.gen_range(1..100);
            let kmer = Kmer::from_ascii(random_seq(&mut rng, len).as_bytes()).unwrap();
            let (a, _) = kmer.canonical();
            let (b, _) = kmer.reverse_complement().canonical();
            assert_eq!(a, b);
            assert!(a.is_canonical());
        }
    }

    #[test]
    fn test_ordering_matches_string_order() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let a = random_seq(&mut rng, 40);
            let b = random_seq(&mut rng, 40);
            let ka = Kmer::from_ascii(a.as_bytes()).unwrap();
            let kb = Kmer::from_ascii(b.as_bytes()).unwrap();
            assert_eq!(ka.cmp(&kb), a.cmp(&b));
        }
    }

    #[test]
    fn test_extend_forward_and_backward() {
        let seq = "ACGTACGTTTGCAAGGCTAGCTAGGATCCATGCAAT"; // 36 bases, spans two words
        let kmer = Kmer::from_ascii(seq.as_bytes()).unwrap();

        let fwd = kmer.extend_forward(BASE_G);
        assert_eq!(fwd.to_string(), format!("{}G", &seq[1..]));

        let bwd = kmer.extend_backward(BASE_T);
        assert_eq!(bwd.to_string(), format!("T{}", &seq[..seq.len() - 1]));
        assert_eq!(bwd, Kmer::from_ascii(bwd.to_string().as_bytes()).unwrap());
    }

    #[test]
    fn test_push_and_drop() {
        let seq = "CATGCATGCATGCATGCATGCATGCATGCAT"; // 31 bases
        let kmer = Kmer::from_ascii(seq.as_bytes()).unwrap();

        let back = kmer.push_back(BASE_A).push_back(BASE_C);
        assert_eq!(back.to_string(), format!("{}AC", seq));
        assert_eq!(back.words().len(), 2);

        let front = kmer.push_front(BASE_T).push_front(BASE_G);
        assert_eq!(front.to_string(), format!("GT{}", seq));
        assert_eq!(front.drop_first().drop_first(), kmer);
        assert_eq!(back.drop_last().drop_last(), kmer);
    }

    #[test]
    fn test_from_words_masks_tail() {
        let kmer = Kmer::from_words(vec![u64::MAX], 3);
        assert_eq!(kmer.to_string(), "TTT");
        assert_eq!(kmer, Kmer::from_ascii(b"TTT").unwrap());
    }
}
