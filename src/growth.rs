//! Growth triggers and incremental evacuation.
//!
//! A table grows by allocating a new bucket array and keeping the previous
//! one as `old_buckets`. Entries are moved ("evacuated") one old bucket chain
//! at a time from inside mutating operations, so no single call pays for the
//! whole rehash. Lookups read whichever copy is authoritative.

use core::mem;

use tracing::debug;

use crate::bucket::BUCKET_CAPACITY;
use crate::bucket::BucketArray;
use crate::bucket::Entry;
use crate::bucket::Half;
use crate::bucket::Tag;
use crate::bucket::bucket_shift;
use crate::hash_table::HashTable;
use crate::hasher::SeedSource;

/// Maximum average bucket load before the table doubles, as a fraction
/// (6.5 entries per 8-slot bucket).
const LOAD_FACTOR_NUM: u128 = 13;
const LOAD_FACTOR_DEN: u128 = 2;

/// Upper bound on already-evacuated buckets skipped by one cursor advance.
pub(crate) const DEFAULT_EVACUATION_LIMIT: usize = 1024;

/// Whether `count` entries in `2^log2` buckets exceed the load factor.
#[inline]
pub(crate) fn over_load_factor(count: usize, log2: u8) -> bool {
    count > BUCKET_CAPACITY
        && count as u128 > LOAD_FACTOR_NUM * (bucket_shift(log2) as u128 / LOAD_FACTOR_DEN)
}

/// Smallest bucket exponent that holds `capacity` entries without crossing
/// the load factor.
pub(crate) fn log2_for_capacity(capacity: usize) -> u8 {
    let mut log2 = 0;
    while over_load_factor(capacity, log2) {
        log2 += 1;
    }
    log2
}

/// Approximate number of overflow buckets allocated since the last growth.
///
/// Exact while the table has fewer than `2^16` buckets. Beyond that it is
/// incremented with probability `1 / 2^(log2 - 15)`, so reaching `2^15`
/// still means roughly as many overflow buckets as primary buckets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct OverflowCounter(u16);

impl OverflowCounter {
    pub(crate) fn incr(&mut self, log2: u8, seeds: &mut SeedSource) {
        if log2 < 16 {
            self.0 = self.0.saturating_add(1);
            return;
        }
        if seeds.one_in_pow2(u32::from(log2 - 15)) {
            self.0 = self.0.saturating_add(1);
        }
    }

    /// "Too many" means about as many overflow buckets as primary buckets.
    /// Most of them must be sparsely used, otherwise the load factor would
    /// already have triggered a regular growth.
    pub(crate) fn too_many(self, log2: u8) -> bool {
        self.0 >= 1u16 << log2.min(15)
    }

    pub(crate) fn get(self) -> u16 {
        self.0
    }

    pub(crate) fn reset(&mut self) {
        self.0 = 0;
    }
}

/// Whether a table is moving entries out of an old bucket array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrowthState {
    /// Every entry lives in the current bucket array.
    Stable,
    /// An old bucket array is still being evacuated.
    Growing,
}

/// Write cursor into a destination chain of the new bucket array.
struct EvacDest {
    bucket: usize,
    slot: usize,
}

impl EvacDest {
    fn new(head: usize) -> Self {
        Self {
            bucket: head,
            slot: 0,
        }
    }

    /// Place `entry` in the first empty slot at or after the cursor, linking
    /// a new overflow bucket when the chain is full.
    fn push<V>(
        &mut self,
        buckets: &mut BucketArray<V>,
        tag: Tag,
        entry: Entry<V>,
        overflow: &mut OverflowCounter,
        log2: u8,
        seeds: &mut SeedSource,
    ) {
        loop {
            if self.slot == BUCKET_CAPACITY {
                self.bucket = match buckets.bucket(self.bucket).overflow() {
                    Some(next) => next,
                    None => {
                        let id = buckets.link_overflow(self.bucket);
                        overflow.incr(log2, seeds);
                        id
                    }
                };
                self.slot = 0;
            }
            if buckets.bucket(self.bucket).tag(self.slot).is_empty() {
                break;
            }
            self.slot += 1;
        }
        buckets.bucket_mut(self.bucket).put(self.slot, tag, entry);
        self.slot += 1;
    }
}

impl<V> HashTable<V> {
    /// Current growth state.
    pub fn growth_state(&self) -> GrowthState {
        if self.old_buckets.is_some() {
            GrowthState::Growing
        } else {
            GrowthState::Stable
        }
    }

    /// Whether a new key would push the table into growth: either the load
    /// factor would be exceeded or overflow chains have bloated.
    pub(crate) fn needs_growth(&self) -> bool {
        self.old_buckets.is_none()
            && (over_load_factor(self.count + 1, self.log2_buckets)
                || self.overflow.too_many(self.log2_buckets))
    }

    /// Allocate the next bucket array and start evacuating into it.
    ///
    /// The array doubles when the load factor is exceeded. Otherwise it keeps
    /// the same size and the evacuation compacts sparse overflow chains.
    pub(crate) fn start_growth(&mut self) {
        debug_assert!(self.old_buckets.is_none());

        let bigger = over_load_factor(self.count + 1, self.log2_buckets);
        let log2 = if bigger {
            self.log2_buckets + 1
        } else {
            self.log2_buckets
        };

        debug!(
            log2_buckets = log2,
            same_size = !bigger,
            count = self.count,
            noverflow = self.overflow.get(),
            "hash table growth started"
        );

        let old = mem::replace(&mut self.buckets, BucketArray::with_log2(log2));
        self.old_buckets = Some(old);
        self.log2_buckets = log2;
        self.same_size = !bigger;
        self.evac_cursor = 0;
        self.overflow.reset();
    }

    /// One bounded step of migration on behalf of an operation on new bucket
    /// `bucket`.
    ///
    /// The old bucket that feeds `bucket` is evacuated first so the caller
    /// only has to look at the new array. One more bucket at the cursor is
    /// evacuated to guarantee forward progress.
    pub(crate) fn grow_work(&mut self, bucket: usize) {
        let Some(old) = self.old_buckets.as_ref() else {
            return;
        };
        let old_mask = old.primary_len() - 1;
        self.evacuate(bucket & old_mask);

        if self.old_buckets.is_some() {
            self.evacuate(self.evac_cursor);
        }
    }

    /// Move every live entry of old bucket chain `old_index` into the new
    /// array, tagging each source slot with the half it went to.
    pub(crate) fn evacuate(&mut self, old_index: usize) {
        let Some(old) = self.old_buckets.as_mut() else {
            return;
        };
        let newbit = old.primary_len();
        debug_assert!(old_index < newbit);

        if !old.bucket(old_index).is_evacuated() {
            let mut low = EvacDest::new(old_index);
            let mut high = EvacDest::new(old_index + newbit);

            let mut next = Some(old_index);
            while let Some(id) = next {
                let bucket = old.bucket_mut(id);
                for slot in 0..BUCKET_CAPACITY {
                    let tag = bucket.tag(slot);
                    if tag.is_empty() {
                        bucket.set_tag(slot, Tag::Evacuated(Half::Empty));
                        continue;
                    }
                    let Some(entry) = bucket.take(slot) else {
                        unreachable!("bad map state: {tag:?} in an unevacuated bucket");
                    };

                    // Hashes are not stored, so recompute to pick the half.
                    let half = if !self.same_size
                        && (self.hasher.hash(&entry.key) as usize) & newbit != 0
                    {
                        Half::High
                    } else {
                        Half::Low
                    };
                    bucket.set_tag(slot, Tag::Evacuated(half));

                    let dest = match half {
                        Half::High => &mut high,
                        _ => &mut low,
                    };
                    dest.push(
                        &mut self.buckets,
                        tag,
                        entry,
                        &mut self.overflow,
                        self.log2_buckets,
                        &mut self.seeds,
                    );
                }
                next = bucket.overflow();
            }
        }

        if old_index == self.evac_cursor {
            self.advance_evacuation_mark(newbit);
        }
    }

    fn advance_evacuation_mark(&mut self, old_count: usize) {
        let Some(old) = self.old_buckets.as_ref() else {
            return;
        };

        self.evac_cursor += 1;
        let stop = self
            .evac_cursor
            .saturating_add(self.evacuation_limit)
            .min(old_count);
        while self.evac_cursor != stop && old.bucket(self.evac_cursor).is_evacuated() {
            self.evac_cursor += 1;
        }

        if self.evac_cursor == old_count {
            self.finish_growth();
        }
    }

    fn finish_growth(&mut self) {
        // Every entry has been moved out, dropping the array drops no values.
        self.old_buckets = None;
        self.same_size = false;
        debug!(
            log2_buckets = self.log2_buckets,
            count = self.count,
            overflow_buckets = self.buckets.overflow_len(),
            "hash table growth finished"
        );
    }
}
