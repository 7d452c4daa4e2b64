//! The bucketed table that backs [`BucketMap`](crate::BucketMap).
//!
//! `HashTable<V>` maps byte-string keys to values of type `V`. It owns a
//! copy of every key and hands displaced values back to the caller instead
//! of destroying them, which makes it usable on its own when the caller
//! wants ownership of overwritten or removed values.

use alloc::boxed::Box;
use core::fmt::Debug;
use core::mem;
use core::ops::ControlFlow;

use tracing::trace;

use crate::bucket::BUCKET_CAPACITY;
use crate::bucket::BucketArray;
use crate::bucket::Entry;
use crate::bucket::SlotRef;
use crate::bucket::Tag;
pub use crate::growth::GrowthState;
use crate::growth::DEFAULT_EVACUATION_LIMIT;
use crate::growth::OverflowCounter;
use crate::growth::log2_for_capacity;
use crate::hasher::KeyHasher;
use crate::hasher::SeedSource;

/// Debug statistics for hash table analysis.
///
/// Available in tests and with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of live entries as tracked by the table
    pub populated: usize,
    /// Live slots found by scanning every bucket
    pub live_slots: usize,
    /// Number of primary buckets in the current array
    pub bucket_count: usize,
    /// log2 of `bucket_count`
    pub log2_buckets: u8,
    /// Overflow buckets linked into the current array
    pub overflow_buckets: usize,
    /// Overflow counter used for same-size growth; approximate for large
    /// tables
    pub approx_overflow: u16,
    /// Primary buckets in the old array, 0 when not growing
    pub old_bucket_count: usize,
    /// Overflow buckets linked into the old array
    pub old_overflow_buckets: usize,
    /// Evacuation cursor into the old array
    pub evac_cursor: usize,
    /// Whether the current growth keeps the bucket count
    pub same_size: bool,
    /// Average entries per primary bucket
    pub load_factor: f64,
    /// Fraction of allocated slots holding live entries
    pub slot_utilization: f64,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {} ({} scanned) in {} buckets (B = {}, {:.2} per bucket)",
            self.populated,
            self.live_slots,
            self.bucket_count,
            self.log2_buckets,
            self.load_factor
        );
        println!(
            "Overflow: {} buckets linked, counter at {}",
            self.overflow_buckets, self.approx_overflow
        );
        println!("Slot Usage: {:.2}%", self.slot_utilization * 100.0);
        if self.old_bucket_count > 0 {
            println!(
                "Growing{}: {}/{} old buckets evacuated, {} old overflow buckets",
                if self.same_size { " (same size)" } else { "" },
                self.evac_cursor,
                self.old_bucket_count,
                self.old_overflow_buckets
            );
        } else {
            println!("Stable");
        }
    }
}

/// A byte-string keyed hash table with 8-slot buckets, overflow chaining,
/// and incremental growth.
///
/// ## Growth
///
/// When a new key would push the average bucket load past 6.5, or when
/// roughly as many overflow buckets as primary buckets have been linked, the
/// table allocates a new bucket array (twice as large, or the same size to
/// compact overflow chains). Entries move to the new array a few buckets at
/// a time during later `insert` and `remove` calls. Lookups never migrate.
///
/// ## Seeds
///
/// Each table hashes with its own seed. The seed is replaced with a fresh
/// one whenever the table becomes empty.
///
/// ## Example
///
/// ```rust
/// # use bucket_hash::HashTable;
/// #
/// let mut table = HashTable::with_seed(7);
/// assert_eq!(table.insert(b"apple", 1), None);
/// assert_eq!(table.insert(b"apple", 2), Some(1));
/// assert_eq!(table.get(b"apple"), Some(&2));
/// assert_eq!(table.remove(b"apple"), Some(2));
/// assert!(table.is_empty());
/// ```
pub struct HashTable<V> {
    pub(crate) buckets: BucketArray<V>,
    pub(crate) old_buckets: Option<BucketArray<V>>,

    pub(crate) count: usize,
    pub(crate) log2_buckets: u8,

    pub(crate) same_size: bool,
    pub(crate) evac_cursor: usize,
    pub(crate) evacuation_limit: usize,
    pub(crate) overflow: OverflowCounter,

    pub(crate) hasher: KeyHasher,
    pub(crate) seeds: SeedSource,
}

/// Which bucket array a located slot lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Home {
    Current,
    Old,
}

enum Probe {
    Found(SlotRef),
    Vacant {
        insert_at: Option<SlotRef>,
        tail: usize,
    },
}

/// Walk the chain at `head` looking for `key`, remembering the first empty
/// slot as an insertion point.
fn probe_for_insert<V>(buckets: &BucketArray<V>, head: usize, tag: Tag, key: &[u8]) -> Probe {
    let mut insert_at = None;
    let mut tail = head;
    for (id, bucket) in buckets.chain(head) {
        tail = id;
        for slot in 0..BUCKET_CAPACITY {
            let current = bucket.tag(slot);
            if current != tag {
                if current.is_empty() && insert_at.is_none() {
                    insert_at = Some(SlotRef { bucket: id, slot });
                }
                if current == Tag::EmptyRest {
                    return Probe::Vacant { insert_at, tail };
                }
                continue;
            }
            if bucket.entry(slot).is_some_and(|entry| *entry.key == *key) {
                return Probe::Found(SlotRef { bucket: id, slot });
            }
        }
    }
    Probe::Vacant { insert_at, tail }
}

impl<V> Default for HashTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Debug for HashTable<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTable")
            .field("count", &self.count)
            .field("log2_buckets", &self.log2_buckets)
            .field("hasher", &self.hasher)
            .field("growth", &self.growth_state())
            .field("same_size", &self.same_size)
            .field("evac_cursor", &self.evac_cursor)
            .field("noverflow", &self.overflow.get())
            .field("buckets", &self.buckets)
            .field("old_buckets", &self.old_buckets)
            .finish()
    }
}

impl<V> HashTable<V> {
    /// Creates an empty table with a seed drawn from the operating system
    /// (or, without the `std` feature, from foldhash's random state).
    ///
    /// Nothing is allocated until the first insert.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use bucket_hash::HashTable;
    /// #
    /// let table: HashTable<u32> = HashTable::new();
    /// assert!(table.is_empty());
    /// assert_eq!(table.bucket_count(), 0);
    /// ```
    pub fn new() -> Self {
        Self::with_options(None, 0, DEFAULT_EVACUATION_LIMIT)
    }

    /// Creates an empty table hashing with `seed`.
    ///
    /// Tables built from the same seed hash identically and replay the same
    /// sequence of re-randomized seeds, which makes layouts reproducible in
    /// tests.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use bucket_hash::HashTable;
    /// #
    /// let table: HashTable<u32> = HashTable::with_seed(42);
    /// assert_eq!(table.seed(), 42);
    /// ```
    pub fn with_seed(seed: u64) -> Self {
        Self::with_options(Some(seed), 0, DEFAULT_EVACUATION_LIMIT)
    }

    /// Creates an empty table sized to hold `capacity` entries before it
    /// first grows. The buckets are still allocated lazily.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use bucket_hash::HashTable;
    /// #
    /// let mut table: HashTable<u32> = HashTable::with_capacity(100);
    /// assert_eq!(table.bucket_count(), 0);
    /// table.insert(b"k", 1);
    /// assert_eq!(table.bucket_count(), 16);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_options(None, capacity, DEFAULT_EVACUATION_LIMIT)
    }

    pub(crate) fn with_options(seed: Option<u64>, capacity: usize, evacuation_limit: usize) -> Self {
        let (hasher, seeds) = match seed {
            Some(seed) => (KeyHasher::new(seed), SeedSource::from_seed(seed)),
            None => {
                let mut seeds = SeedSource::from_entropy();
                (KeyHasher::new(seeds.next_seed()), seeds)
            }
        };

        Self {
            buckets: BucketArray::empty(),
            old_buckets: None,
            count: 0,
            log2_buckets: log2_for_capacity(capacity),
            same_size: false,
            evac_cursor: 0,
            evacuation_limit,
            overflow: OverflowCounter::default(),
            hasher,
            seeds,
        }
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of primary buckets in the current array, or 0 before the first
    /// insert.
    pub fn bucket_count(&self) -> usize {
        self.buckets.primary_len()
    }

    /// Returns `true` while an old bucket array is being evacuated.
    pub fn is_growing(&self) -> bool {
        self.old_buckets.is_some()
    }

    /// The seed currently used to hash keys.
    pub fn seed(&self) -> u64 {
        self.hasher.seed()
    }

    #[inline]
    fn bucket_mask(&self) -> usize {
        self.buckets.primary_len() - 1
    }

    fn reseed(&mut self) {
        let seed = self.seeds.next_seed();
        self.hasher = KeyHasher::new(seed);
        trace!(seed, "hash seed re-randomized");
    }

    /// Inserts `value` under a copy of `key`, returning the value it
    /// replaced.
    ///
    /// If a growth is in progress, this first evacuates the old bucket that
    /// feeds the key's bucket plus one more. A new key that would exceed the
    /// load factor, or arrive when overflow chains have bloated, starts a
    /// growth. Overwriting an existing key never does.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use bucket_hash::HashTable;
    /// #
    /// let mut table = HashTable::with_seed(1);
    /// assert_eq!(table.insert("key", "a"), None);
    /// assert_eq!(table.insert("key", "b"), Some("a"));
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn insert(&mut self, key: impl AsRef<[u8]>, value: V) -> Option<V> {
        let key = key.as_ref();
        let hash = self.hasher.hash(key);
        let tag = Tag::from_hash(hash);

        if !self.buckets.is_allocated() {
            self.buckets = BucketArray::with_log2(self.log2_buckets);
        }

        loop {
            let bucket = hash as usize & self.bucket_mask();
            if self.old_buckets.is_some() {
                self.grow_work(bucket);
            }

            let (insert_at, tail) = match probe_for_insert(&self.buckets, bucket, tag, key) {
                Probe::Found(at) => {
                    let Some(entry) = self.buckets.entry_mut(at) else {
                        unreachable!("occupied tag without an entry at {at:?}");
                    };
                    return Some(mem::replace(&mut entry.value, value));
                }
                Probe::Vacant { insert_at, tail } => (insert_at, tail),
            };

            if self.needs_growth() {
                // Growing moves every bucket, so search again.
                self.start_growth();
                continue;
            }

            let at = match insert_at {
                Some(at) => at,
                None => {
                    let id = self.buckets.link_overflow(tail);
                    self.overflow.incr(self.log2_buckets, &mut self.seeds);
                    SlotRef { bucket: id, slot: 0 }
                }
            };
            self.buckets.bucket_mut(at.bucket).put(
                at.slot,
                tag,
                Entry {
                    key: Box::from(key),
                    value,
                },
            );
            self.count += 1;
            return None;
        }
    }

    fn locate(&self, key: &[u8]) -> Option<(Home, SlotRef)> {
        if self.count == 0 {
            return None;
        }

        if self.log2_buckets == 0 && self.old_buckets.is_none() {
            return self
                .buckets
                .find_bytes(0, key)
                .map(|at| (Home::Current, at));
        }

        let hash = self.hasher.hash(key);
        let tag = Tag::from_hash(hash);

        if let Some(old) = &self.old_buckets {
            let old_index = hash as usize & (old.primary_len() - 1);
            if !old.bucket(old_index).is_evacuated() {
                return old.find(old_index, tag, key).map(|at| (Home::Old, at));
            }
        }

        self.buckets
            .find(hash as usize & self.bucket_mask(), tag, key)
            .map(|at| (Home::Current, at))
    }

    /// Returns a reference to the value stored under `key`.
    ///
    /// Lookups never migrate entries. During a growth they read the old
    /// bucket when it has not been evacuated yet.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use bucket_hash::HashTable;
    /// #
    /// let mut table = HashTable::with_seed(1);
    /// table.insert(b"present", 10);
    /// assert_eq!(table.get(b"present"), Some(&10));
    /// assert_eq!(table.get(b"absent"), None);
    /// ```
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&V> {
        let (home, at) = self.locate(key.as_ref())?;
        let array = match home {
            Home::Current => &self.buckets,
            Home::Old => self.old_buckets.as_ref()?,
        };
        array.entry(at).map(|entry| &entry.value)
    }

    /// Returns a mutable reference to the value stored under `key`.
    ///
    /// Like [`get`](Self::get), this performs no migration.
    pub fn get_mut(&mut self, key: impl AsRef<[u8]>) -> Option<&mut V> {
        let (home, at) = self.locate(key.as_ref())?;
        let array = match home {
            Home::Current => &mut self.buckets,
            Home::Old => self.old_buckets.as_mut()?,
        };
        array.entry_mut(at).map(|entry| &mut entry.value)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> bool {
        self.locate(key.as_ref()).is_some()
    }

    /// Removes `key`, returning its value.
    ///
    /// The emptied slot is tagged so later scans can still stop early at the
    /// end of the chain. When the last entry is removed the table picks a new
    /// hash seed.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use bucket_hash::HashTable;
    /// #
    /// let mut table = HashTable::with_seed(5);
    /// table.insert(b"gone", 1);
    /// assert_eq!(table.remove(b"gone"), Some(1));
    /// assert_eq!(table.remove(b"gone"), None);
    /// assert_ne!(table.seed(), 5);
    /// ```
    pub fn remove(&mut self, key: impl AsRef<[u8]>) -> Option<V> {
        let key = key.as_ref();
        if self.count == 0 {
            return None;
        }

        let hash = self.hasher.hash(key);
        let bucket = hash as usize & self.bucket_mask();
        if self.old_buckets.is_some() {
            self.grow_work(bucket);
        }

        let at = self.buckets.find(bucket, Tag::from_hash(hash), key)?;
        let entry = self.buckets.bucket_mut(at.bucket).take(at.slot)?;
        self.buckets.mark_deleted(bucket, at);

        self.count -= 1;
        if self.count == 0 {
            // Fresh seed so a flooding pattern does not survive reuse.
            self.reseed();
        }
        Some(entry.value)
    }

    /// Removes every entry, passing each value to `f`.
    ///
    /// The current bucket array is kept (tables never shrink) but its
    /// overflow buckets and any old array are freed.
    pub fn clear_with(&mut self, mut f: impl FnMut(V)) {
        if let Some(mut old) = self.old_buckets.take() {
            old.drain_live(|entry| f(entry.value));
        }
        self.buckets.drain_live(|entry| f(entry.value));

        let was_populated = self.count != 0;
        self.count = 0;
        self.same_size = false;
        self.evac_cursor = 0;
        self.overflow.reset();
        if was_populated {
            self.reseed();
        }
    }

    /// Removes every entry, dropping the values.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use bucket_hash::HashTable;
    /// #
    /// let mut table = HashTable::with_seed(3);
    /// table.insert(b"a", 1);
    /// table.insert(b"b", 2);
    /// table.clear();
    /// assert!(table.is_empty());
    /// assert_eq!(table.get(b"a"), None);
    /// ```
    pub fn clear(&mut self) {
        self.clear_with(drop);
    }

    /// Calls `f` with every live key and value until it breaks.
    ///
    /// Order is unspecified. During a growth, entries still in the old array
    /// are visited there, so each entry is seen exactly once.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::ops::ControlFlow;
    /// # use bucket_hash::HashTable;
    /// #
    /// let mut table = HashTable::with_seed(9);
    /// for i in 0..20u32 {
    ///     table.insert(i.to_le_bytes(), i);
    /// }
    /// let mut sum = 0;
    /// table.for_each(|_, v| {
    ///     sum += v;
    ///     ControlFlow::Continue(())
    /// });
    /// assert_eq!(sum, (0..20).sum());
    /// ```
    pub fn for_each(&self, mut f: impl FnMut(&[u8], &V) -> ControlFlow<()>) {
        let mut visit = |entry: &Entry<V>| f(&entry.key, &entry.value).is_continue();
        if let Some(old) = &self.old_buckets {
            if !old.for_each_live(&mut visit) {
                return;
            }
        }
        self.buckets.for_each_live(visit);
    }

    /// Returns detailed utilization statistics, including a live-slot count
    /// obtained by scanning every bucket.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let old_live = self
            .old_buckets
            .as_ref()
            .map_or(0, |old| old.live_slots());
        let live_slots = self.buckets.live_slots() + old_live;
        let bucket_count = self.buckets.primary_len();
        let total_slots = (bucket_count + self.buckets.overflow_len()) * BUCKET_CAPACITY;

        DebugStats {
            populated: self.count,
            live_slots,
            bucket_count,
            log2_buckets: self.log2_buckets,
            overflow_buckets: self.buckets.overflow_len(),
            approx_overflow: self.overflow.get(),
            old_bucket_count: self.old_buckets.as_ref().map_or(0, |old| old.primary_len()),
            old_overflow_buckets: self.old_buckets.as_ref().map_or(0, |old| old.overflow_len()),
            evac_cursor: self.evac_cursor,
            same_size: self.same_size,
            load_factor: if bucket_count == 0 {
                0.0
            } else {
                self.count as f64 / bucket_count as f64
            },
            slot_utilization: if total_slots == 0 {
                0.0
            } else {
                (live_slots - old_live) as f64 / total_slots as f64
            },
        }
    }

    /// Verify the structural invariants: tags agree with entries, nothing
    /// follows `EmptyRest` in a chain, keys are unique per chain, the live
    /// count matches `len()`, and the growth bookkeeping is consistent.
    #[cfg(any(test, feature = "stats"))]
    pub fn check_invariants(&self) -> Result<(), alloc::string::String> {
        use alloc::format;

        let mut live = self.buckets.check_chains()?;
        if self.buckets.is_allocated() && self.buckets.primary_len() != 1 << self.log2_buckets {
            return Err(format!(
                "{} primary buckets for B = {}",
                self.buckets.primary_len(),
                self.log2_buckets
            ));
        }

        match &self.old_buckets {
            Some(old) => {
                live += old.check_chains()?;
                if self.evac_cursor > old.primary_len() {
                    return Err(format!(
                        "evac_cursor {} beyond {} old buckets",
                        self.evac_cursor,
                        old.primary_len()
                    ));
                }
                if let Some(stale) = (0..self.evac_cursor).find(|&i| !old.bucket(i).is_evacuated()) {
                    return Err(format!("old bucket {stale} behind the cursor is not evacuated"));
                }
                let expected = if self.same_size {
                    old.primary_len()
                } else {
                    old.primary_len() * 2
                };
                if expected != self.buckets.primary_len() {
                    return Err(format!(
                        "{} old buckets grew into {} (same_size = {})",
                        old.primary_len(),
                        self.buckets.primary_len(),
                        self.same_size
                    ));
                }
            }
            None => {
                if self.same_size || self.evac_cursor > self.buckets.primary_len() {
                    return Err(format!(
                        "stable table with same_size = {} and evac_cursor = {}",
                        self.same_size, self.evac_cursor
                    ));
                }
            }
        }

        if live != self.count {
            return Err(format!("count is {} but {live} slots are live", self.count));
        }
        Ok(())
    }
}
