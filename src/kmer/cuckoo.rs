// src/kmer/cuckoo.rs
//! Lock-free counting cuckoo filter for canonical k-mers.
//!
//! Each key is reduced to a 14-bit fingerprint stored in one of two candidate
//! buckets, next to a 2-bit saturating counter. A cell packs both into a `u16`
//! (`fingerprint << 2 | count`), and a count of zero marks a free slot. All
//! mutation goes through compare-and-swap on whole cells, so any number of
//! threads may insert and query concurrently without a lock.
//!
//! False positives are possible (two keys sharing a bucket and fingerprint);
//! false negatives are not, as long as no insert returned `FilterOverfull`.

use crate::error::{Error, Result};
use crate::kmer::kmer::Kmer;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use tracing::{debug, info};

pub const BUCKET_SIZE: usize = 4;
pub const FP_BITS: u32 = 14;
pub const MAX_COUNT: u8 = 3;
/// Upper bound on evictions for a single insert.
pub const MAX_KICKS: usize = 500_000;

const FP_MASK: u16 = (1 << FP_BITS) - 1;
const COUNT_MASK: u16 = 0x3;

/// A packed filter cell.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Cell(u16);

impl Cell {
    pub const EMPTY: Cell = Cell(0);

    #[inline]
    pub fn new(fingerprint: u16, count: u8) -> Self {
        Cell(((fingerprint & FP_MASK) << 2) | (count as u16 & COUNT_MASK))
    }

    #[inline]
    pub fn from_raw(raw: u16) -> Self {
        Cell(raw)
    }

    #[inline]
    pub fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn fingerprint(self) -> u16 {
        self.0 >> 2
    }

    #[inline]
    pub fn count(self) -> u8 {
        (self.0 & COUNT_MASK) as u8
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.count() == 0
    }

    #[inline]
    fn holds(self, fingerprint: u16) -> bool {
        !self.is_empty() && self.fingerprint() == fingerprint
    }

    #[inline]
    fn with_count(self, count: u8) -> Self {
        Cell::new(self.fingerprint(), count.min(MAX_COUNT))
    }
}

/// 14-bit fingerprint: multiplicative mixing over 14-bit slices of each word,
/// last word first.
pub fn fingerprint(words: &[u64]) -> u16 {
    const M: u64 = 0xc6a4_a793_5bd1_e995;
    let mut hash: u64 = 0x5bd1_e995;
    for &word in words.iter().rev() {
        let mut a = word;
        for _ in 0..5 {
            hash ^= a & FP_MASK as u64;
            hash = hash.wrapping_mul(M);
            a >>= FP_BITS;
        }
    }
    (hash & FP_MASK as u64) as u16
}

/// FNV-style accumulating hash used for the primary bucket index.
pub fn index_hash(words: &[u64]) -> u64 {
    const OFFSET: u64 = 14_695_981_039_346_656_037;
    const PRIME: u64 = 1_099_511_628_211;
    let mut hash = OFFSET;
    for &word in words {
        hash ^= word & 0xFFFF_FFFF;
        hash = hash.wrapping_mul(PRIME);
        hash ^= word >> 32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

struct Bucket {
    cells: [AtomicU16; BUCKET_SIZE],
}

impl Bucket {
    fn new() -> Self {
        Self {
            cells: Default::default(),
        }
    }

    #[inline]
    fn load(&self, slot: usize) -> Cell {
        Cell(self.cells[slot].load(Ordering::Acquire))
    }

    #[inline]
    fn cas(&self, slot: usize, current: Cell, new: Cell) -> std::result::Result<Cell, Cell> {
        self.cells[slot]
            .compare_exchange_weak(current.0, new.0, Ordering::AcqRel, Ordering::Acquire)
            .map(Cell)
            .map_err(Cell)
    }
}

enum Claim {
    Done,
    Raced,
    Full,
}

/// Counting cuckoo filter shared by reference between worker threads.
pub struct CuckooFilter {
    buckets: Vec<Bucket>,
    /// Always a power of two, so `alt_index` is its own inverse.
    num_buckets: u64,
    kmer_len: usize,
    items: AtomicU64,
}

impl CuckooFilter {
    /// Creates an empty filter able to hold roughly `capacity` keys.
    ///
    /// # Arguments
    /// * `capacity` - Expected number of distinct k-mers
    /// * `kmer_len` - Length of the k-mers stored in the filter
    pub fn new(capacity: usize, kmer_len: usize) -> Self {
        let num_buckets = capacity.div_ceil(BUCKET_SIZE).next_power_of_two().max(1);
        Self::with_buckets(num_buckets, kmer_len)
    }

    fn with_buckets(num_buckets: usize, kmer_len: usize) -> Self {
        let buckets = (0..num_buckets).map(|_| Bucket::new()).collect();
        Self {
            buckets,
            num_buckets: num_buckets as u64,
            kmer_len,
            items: AtomicU64::new(0),
        }
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn capacity(&self) -> usize {
        self.buckets.len() * BUCKET_SIZE
    }

    pub fn kmer_len(&self) -> usize {
        self.kmer_len
    }

    /// Number of cells created by inserts (or recorded in a loaded filter).
    pub fn items(&self) -> u64 {
        self.items.load(Ordering::Relaxed)
    }

    pub fn memory_bytes(&self) -> usize {
        self.buckets.len() * BUCKET_SIZE * std::mem::size_of::<u16>()
    }

    #[inline]
    fn primary_index(&self, key: &Kmer) -> usize {
        (index_hash(key.words()) % self.num_buckets) as usize
    }

    #[inline]
    pub fn alt_index(&self, index: usize, fingerprint: u16) -> usize {
        ((index as u64 ^ fingerprint as u64) % self.num_buckets) as usize
    }

    /// Counts one more occurrence of `key` and returns its previous count.
    ///
    /// A new key lands in the first free slot of its primary bucket, then of
    /// its alternate bucket. When both are full the minimum-count cell of the
    /// alternate bucket is evicted and re-homed, repeating up to `MAX_KICKS`
    /// times.
    pub fn insert(&self, key: &Kmer) -> Result<u8> {
        let fp = fingerprint(key.words());
        let primary = self.primary_index(key);
        let alt = self.alt_index(primary, fp);

        loop {
            if let Some(prior) = self
                .try_increment(primary, fp)
                .or_else(|| self.try_increment(alt, fp))
            {
                return Ok(prior);
            }

            let fresh = Cell::new(fp, 1);
            match self.try_claim_free(primary, fresh) {
                Claim::Done => {
                    self.items.fetch_add(1, Ordering::Relaxed);
                    return Ok(0);
                }
                Claim::Raced => continue,
                Claim::Full => {}
            }
            match self.try_claim_free(alt, fresh) {
                Claim::Done => {
                    self.items.fetch_add(1, Ordering::Relaxed);
                    return Ok(0);
                }
                Claim::Raced => continue,
                Claim::Full => {}
            }

            self.relocate(alt, fresh)?;
            self.items.fetch_add(1, Ordering::Relaxed);
            return Ok(0);
        }
    }

    /// Saturating increment of an existing cell carrying `fp`.
    fn try_increment(&self, index: usize, fp: u16) -> Option<u8> {
        let bucket = &self.buckets[index];
        for slot in 0..BUCKET_SIZE {
            let mut current = bucket.load(slot);
            while current.holds(fp) {
                let count = current.count();
                if count >= MAX_COUNT {
                    return Some(MAX_COUNT);
                }
                match bucket.cas(slot, current, current.with_count(count + 1)) {
                    Ok(_) => return Some(count),
                    Err(actual) => current = actual,
                }
            }
        }
        None
    }

    /// Claims the first empty slot of a bucket. Seeing `cell`'s fingerprint
    /// on the way means another thread inserted the key first.
    fn try_claim_free(&self, index: usize, cell: Cell) -> Claim {
        let bucket = &self.buckets[index];
        for slot in 0..BUCKET_SIZE {
            let mut current = bucket.load(slot);
            loop {
                if current.holds(cell.fingerprint()) {
                    return Claim::Raced;
                }
                if !current.is_empty() {
                    break;
                }
                match bucket.cas(slot, current, cell) {
                    Ok(_) => return Claim::Done,
                    Err(actual) => current = actual,
                }
            }
        }
        Claim::Full
    }

    /// Pushes `cell` into bucket `index`, evicting until every displaced cell
    /// has found a home.
    fn relocate(&self, mut index: usize, mut cell: Cell) -> Result<()> {
        for _ in 0..MAX_KICKS {
            if self.place_or_merge(index, cell) {
                return Ok(());
            }
            let victim = self.swap_min(index, cell);
            if victim.is_empty() {
                return Ok(());
            }
            cell = victim;
            index = self.alt_index(index, cell.fingerprint());
        }
        Err(Error::FilterOverfull { kicks: MAX_KICKS })
    }

    /// Stores a displaced cell in a free slot, or folds its count into a cell
    /// with the same fingerprint.
    fn place_or_merge(&self, index: usize, cell: Cell) -> bool {
        let bucket = &self.buckets[index];
        for slot in 0..BUCKET_SIZE {
            let mut current = bucket.load(slot);
            loop {
                let next = if current.is_empty() {
                    cell
                } else if current.fingerprint() == cell.fingerprint() {
                    current.with_count(current.count().saturating_add(cell.count()))
                } else {
                    break;
                };
                match bucket.cas(slot, current, next) {
                    Ok(_) => return true,
                    Err(actual) => current = actual,
                }
            }
        }
        false
    }

    /// Replaces the minimum-count cell of a bucket with `cell` and returns the
    /// evicted cell.
    fn swap_min(&self, index: usize, cell: Cell) -> Cell {
        let bucket = &self.buckets[index];
        loop {
            let mut victim_slot = BUCKET_SIZE - 1;
            let mut victim = bucket.load(victim_slot);
            for slot in (0..BUCKET_SIZE - 1).rev() {
                let current = bucket.load(slot);
                if current.count() < victim.count() {
                    victim_slot = slot;
                    victim = current;
                }
            }
            if bucket.cas(victim_slot, victim, cell).is_ok() {
                return victim;
            }
        }
    }

    fn find(&self, key: &Kmer) -> Option<Cell> {
        let fp = fingerprint(key.words());
        let primary = self.primary_index(key);
        let alt = self.alt_index(primary, fp);
        [primary, alt].into_iter().find_map(|index| {
            let bucket = &self.buckets[index];
            (0..BUCKET_SIZE)
                .map(|slot| bucket.load(slot))
                .find(|cell| cell.holds(fp))
        })
    }

    pub fn lookup(&self, key: &Kmer) -> bool {
        self.find(key).is_some()
    }

    /// Count of a key that must be present.
    ///
    /// # Panics
    /// Panics when `key` is absent; use [`get_count_allow_zero`](Self::get_count_allow_zero)
    /// for keys that may never have been inserted.
    pub fn get_count(&self, key: &Kmer) -> u8 {
        match self.find(key) {
            Some(cell) => cell.count(),
            None => panic!("k-mer {} not found in cuckoo filter", key),
        }
    }

    pub fn get_count_allow_zero(&self, key: &Kmer) -> u8 {
        self.find(key).map_or(0, Cell::count)
    }

    /// Occupancy histogram and load factor.
    pub fn stats(&self) -> FilterStats {
        let mut histogram = [0u64; MAX_COUNT as usize + 1];
        for bucket in &self.buckets {
            for slot in 0..BUCKET_SIZE {
                histogram[bucket.load(slot).count() as usize] += 1;
            }
        }
        let occupied: u64 = histogram[1..].iter().sum();
        FilterStats {
            buckets: self.buckets.len(),
            items: self.items(),
            occupied,
            count_histogram: histogram,
            load_factor: occupied as f64 / self.capacity() as f64,
        }
    }

    /// Writes the info record and the bucket dump.
    ///
    /// The dump is gzip-compressed when `hash_path` ends in `.gz`.
    pub fn save(&self, info_path: &Path, hash_path: &Path) -> Result<()> {
        let mut info = BufWriter::new(File::create(info_path)?);
        writeln!(info, "NumBuckets\t{}", self.buckets.len())?;
        writeln!(info, "Items\t{}", self.items())?;
        writeln!(info, "Kmerlen\t{}", self.kmer_len)?;
        info.flush()?;

        let file = File::create(hash_path)?;
        let mut out: Box<dyn Write> = if is_gz(hash_path) {
            Box::new(BufWriter::new(GzEncoder::new(file, Compression::fast())))
        } else {
            Box::new(BufWriter::new(file))
        };
        for bucket in &self.buckets {
            for slot in 0..BUCKET_SIZE {
                out.write_all(&bucket.load(slot).raw().to_le_bytes())?;
            }
        }
        out.flush()?;
        debug!("Saved cuckoo filter ({} buckets) to {}", self.buckets.len(), hash_path.display());
        Ok(())
    }

    /// Loads a filter written by [`save`](Self::save).
    ///
    /// # Arguments
    /// * `expected_kmer_len` - When set, a filter built for another k is rejected
    pub fn load(info_path: &Path, hash_path: &Path, expected_kmer_len: Option<usize>) -> Result<Self> {
        let info = FilterInfo::read(info_path)?;
        if info.num_buckets == 0 || !info.num_buckets.is_power_of_two() {
            return Err(Error::malformed(
                info_path,
                format!("bucket count {} is not a nonzero power of two", info.num_buckets),
            ));
        }
        if let Some(k) = expected_kmer_len {
            if k != info.kmer_len {
                return Err(Error::malformed(
                    info_path,
                    format!("filter built for k={}, expected k={}", info.kmer_len, k),
                ));
            }
        }

        let file = File::open(hash_path)?;
        let mut input: Box<dyn Read> = if is_gz(hash_path) {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        let mut raw = Vec::new();
        input.read_to_end(&mut raw)?;
        let expected = info.num_buckets * BUCKET_SIZE * std::mem::size_of::<u16>();
        if raw.len() != expected {
            return Err(Error::malformed(
                hash_path,
                format!("expected {} bytes of buckets, found {}", expected, raw.len()),
            ));
        }

        let filter = Self::with_buckets(info.num_buckets, info.kmer_len);
        for (i, chunk) in raw.chunks_exact(2).enumerate() {
            let value = u16::from_le_bytes([chunk[0], chunk[1]]);
            filter.buckets[i / BUCKET_SIZE].cells[i % BUCKET_SIZE].store(value, Ordering::Relaxed);
        }
        filter.items.store(info.items, Ordering::Relaxed);
        info!(
            "Loaded cuckoo filter: {} buckets, {} items, k={}",
            info.num_buckets, info.items, info.kmer_len
        );
        Ok(filter)
    }
}

fn is_gz(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Contents of the filter info file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterInfo {
    pub num_buckets: usize,
    pub items: u64,
    pub kmer_len: usize,
}

impl FilterInfo {
    pub fn read(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let (mut buckets, mut items, mut kmer_len) = (None, None, None);
        for line in reader.lines() {
            let line = line?;
            let Some((key, value)) = line.split_once('\t') else {
                continue;
            };
            let parsed: u64 = value
                .trim()
                .parse()
                .map_err(|_| Error::malformed(path, format!("bad value for {}: {:?}", key, value)))?;
            match key {
                "NumBuckets" => buckets = Some(parsed as usize),
                "Items" => items = Some(parsed),
                "Kmerlen" => kmer_len = Some(parsed as usize),
                _ => {}
            }
        }
        match (buckets, items, kmer_len) {
            (Some(num_buckets), Some(items), Some(kmer_len)) => Ok(Self {
                num_buckets,
                items,
                kmer_len,
            }),
            _ => Err(Error::malformed(path, "missing NumBuckets, Items or Kmerlen")),
        }
    }
}

/// Occupancy summary of a filter.
#[derive(Debug, Clone, Default)]
pub struct FilterStats {
    pub buckets: usize,
    pub items: u64,
    pub occupied: u64,
    /// Number of cells holding each count value, index 0 being free cells.
    pub count_histogram: [u64; MAX_COUNT as usize + 1],
    pub load_factor: f64,
}

impl fmt::Display for FilterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Cuckoo Filter ===")?;
        writeln!(f, "Buckets: {}", self.buckets)?;
        writeln!(f, "Items: {}, occupied cells: {}", self.items, self.occupied)?;
        for (count, cells) in self.count_histogram.iter().enumerate().skip(1) {
            writeln!(f, "  count {}: {}", count, cells)?;
        }
        write!(f, "Load factor: {:.3}", self.load_factor)
    }
}
