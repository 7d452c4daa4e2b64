use alloc::alloc::handle_alloc_error;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::cmp::Ordering;
use core::fmt::Debug;

/// Number of slots in a bucket.
///
/// Eight tags plus eight key/value slots keep a bucket within a few cache
/// lines for small values.
pub const BUCKET_CAPACITY: usize = 8;

/// Smallest tag byte that marks an occupied slot. Bytes below it are reserved
/// for the empty and evacuated states.
pub const MIN_TAG: u8 = 5;

/// Which half of the grown bucket array an evacuated slot was moved into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Half {
    /// Moved to the bucket at the same index in the new array.
    Low,
    /// Moved to the bucket at `index + old_bucket_count` in the new array.
    High,
    /// The slot was already empty when its bucket was evacuated.
    Empty,
}

/// Per-slot state.
///
/// Tags compare and order by their byte encoding: `EmptyRest = 0`,
/// `EmptyOne = 1`, `Evacuated(Low) = 2`, `Evacuated(High) = 3`,
/// `Evacuated(Empty) = 4`, and `Occupied(t)` with `t >= MIN_TAG`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// This slot and every later slot in the bucket chain are empty.
    EmptyRest,
    /// This slot is empty, later slots may be occupied.
    EmptyOne,
    /// The slot's entry was moved during growth.
    Evacuated(Half),
    /// The slot holds a live entry. The byte is a fragment of the key's hash.
    Occupied(u8),
}

impl Tag {
    /// Derive an occupied tag from the top byte of a hash.
    #[inline(always)]
    pub const fn from_hash(hash: u64) -> Tag {
        let top = (hash >> 56) as u8;
        if top < MIN_TAG {
            Tag::Occupied(top + MIN_TAG)
        } else {
            Tag::Occupied(top)
        }
    }

    /// The byte encoding of this tag.
    #[inline(always)]
    pub const fn to_byte(self) -> u8 {
        match self {
            Tag::EmptyRest => 0,
            Tag::EmptyOne => 1,
            Tag::Evacuated(Half::Low) => 2,
            Tag::Evacuated(Half::High) => 3,
            Tag::Evacuated(Half::Empty) => 4,
            Tag::Occupied(top) => top,
        }
    }

    /// Decode a tag byte.
    pub const fn from_byte(byte: u8) -> Tag {
        match byte {
            0 => Tag::EmptyRest,
            1 => Tag::EmptyOne,
            2 => Tag::Evacuated(Half::Low),
            3 => Tag::Evacuated(Half::High),
            4 => Tag::Evacuated(Half::Empty),
            top => Tag::Occupied(top),
        }
    }

    /// `true` for `EmptyRest` and `EmptyOne`.
    #[inline(always)]
    pub const fn is_empty(self) -> bool {
        self.to_byte() <= 1
    }

    /// `true` for any of the three evacuated states.
    #[inline(always)]
    pub const fn is_evacuated(self) -> bool {
        let byte = self.to_byte();
        byte > 1 && byte < MIN_TAG
    }

    /// `true` if the slot holds a live entry.
    #[inline(always)]
    pub const fn is_occupied(self) -> bool {
        matches!(self, Tag::Occupied(_))
    }
}

impl PartialOrd for Tag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_byte().cmp(&other.to_byte())
    }
}

/// An owned key and its value.
pub(crate) struct Entry<V> {
    pub(crate) key: Box<[u8]>,
    pub(crate) value: V,
}

/// Location of a slot inside a bucket array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SlotRef {
    pub(crate) bucket: usize,
    pub(crate) slot: usize,
}

pub(crate) struct Bucket<V> {
    tags: [Tag; BUCKET_CAPACITY],
    entries: [Option<Entry<V>>; BUCKET_CAPACITY],
    overflow: Option<usize>,
}

impl<V> Bucket<V> {
    fn new() -> Self {
        Self {
            tags: [Tag::EmptyRest; BUCKET_CAPACITY],
            entries: [const { None }; BUCKET_CAPACITY],
            overflow: None,
        }
    }

    #[inline(always)]
    pub(crate) fn tag(&self, slot: usize) -> Tag {
        self.tags[slot]
    }

    #[inline(always)]
    pub(crate) fn set_tag(&mut self, slot: usize, tag: Tag) {
        debug_assert!(!tag.is_occupied() || self.entries[slot].is_some());
        self.tags[slot] = tag;
    }

    #[inline(always)]
    pub(crate) fn overflow(&self) -> Option<usize> {
        self.overflow
    }

    #[inline]
    pub(crate) fn entry(&self, slot: usize) -> Option<&Entry<V>> {
        self.entries[slot].as_ref()
    }

    #[inline]
    pub(crate) fn entry_mut(&mut self, slot: usize) -> Option<&mut Entry<V>> {
        self.entries[slot].as_mut()
    }

    /// Store an entry and mark the slot occupied.
    #[inline]
    pub(crate) fn put(&mut self, slot: usize, tag: Tag, entry: Entry<V>) {
        debug_assert!(tag.is_occupied());
        debug_assert!(self.entries[slot].is_none());
        self.entries[slot] = Some(entry);
        self.tags[slot] = tag;
    }

    /// Remove the entry from a slot, leaving the tag for the caller to set.
    #[inline]
    pub(crate) fn take(&mut self, slot: usize) -> Option<Entry<V>> {
        self.entries[slot].take()
    }

    /// A bucket whose first tag is an evacuated state has had its whole chain
    /// moved into the new array.
    #[inline(always)]
    pub(crate) fn is_evacuated(&self) -> bool {
        self.tags[0].is_evacuated()
    }

    fn live(&self) -> usize {
        self.tags.iter().filter(|tag| tag.is_occupied()).count()
    }
}

/// Owns a primary array of `2^log2` buckets and every overflow bucket chained
/// off it. Overflow buckets are appended after the primary buckets and
/// addressed by index.
pub(crate) struct BucketArray<V> {
    buckets: Vec<Bucket<V>>,
    primary: usize,
}

#[inline(always)]
pub(crate) fn bucket_shift(log2: u8) -> usize {
    1usize
        .checked_shl(u32::from(log2))
        .expect("capacity overflow")
}

/// Grow `buckets` by `additional`, aborting the process if the allocator
/// cannot satisfy the request. There is no way to unwind a half-grown table.
fn reserve_or_abort<V>(buckets: &mut Vec<Bucket<V>>, additional: usize) {
    if buckets.try_reserve(additional).is_err() {
        let wanted = buckets.len().saturating_add(additional);
        handle_alloc_error(Layout::array::<Bucket<V>>(wanted).expect("allocation size overflow"));
    }
}

impl<V> BucketArray<V> {
    /// An array with no buckets. Nothing is allocated until the table first
    /// needs a bucket.
    pub(crate) const fn empty() -> Self {
        Self {
            buckets: Vec::new(),
            primary: 0,
        }
    }

    #[inline(always)]
    pub(crate) fn is_allocated(&self) -> bool {
        self.primary != 0
    }

    /// Allocate `2^log2` empty primary buckets.
    pub(crate) fn with_log2(log2: u8) -> Self {
        let primary = bucket_shift(log2);
        let mut buckets = Vec::new();
        if buckets.try_reserve_exact(primary).is_err() {
            handle_alloc_error(
                Layout::array::<Bucket<V>>(primary).expect("allocation size overflow"),
            );
        }
        buckets.resize_with(primary, Bucket::new);
        Self { buckets, primary }
    }

    #[inline(always)]
    pub(crate) fn primary_len(&self) -> usize {
        self.primary
    }

    #[inline(always)]
    pub(crate) fn overflow_len(&self) -> usize {
        self.buckets.len() - self.primary
    }

    #[inline(always)]
    pub(crate) fn bucket(&self, id: usize) -> &Bucket<V> {
        &self.buckets[id]
    }

    #[inline(always)]
    pub(crate) fn bucket_mut(&mut self, id: usize) -> &mut Bucket<V> {
        &mut self.buckets[id]
    }

    /// Every bucket in the chain starting at primary bucket `head`.
    pub(crate) fn chain(&self, head: usize) -> Chain<'_, V> {
        Chain {
            array: self,
            next: Some(head),
        }
    }

    /// Append a fresh overflow bucket and link it after `tail`.
    pub(crate) fn link_overflow(&mut self, tail: usize) -> usize {
        debug_assert!(self.buckets[tail].overflow.is_none());
        reserve_or_abort(&mut self.buckets, 1);
        let id = self.buckets.len();
        self.buckets.push(Bucket::new());
        self.buckets[tail].overflow = Some(id);
        id
    }

    /// The bucket linked directly before `id` in the chain headed by `head`.
    pub(crate) fn previous(&self, head: usize, id: usize) -> Option<usize> {
        let mut current = head;
        loop {
            let next = self.buckets[current].overflow?;
            if next == id {
                return Some(current);
            }
            current = next;
        }
    }

    /// Find a live slot whose tag equals `tag` and whose key equals `key`.
    /// The scan stops at the first `EmptyRest`.
    pub(crate) fn find(&self, head: usize, tag: Tag, key: &[u8]) -> Option<SlotRef> {
        for (id, bucket) in self.chain(head) {
            for slot in 0..BUCKET_CAPACITY {
                let current = bucket.tags[slot];
                if current != tag {
                    if current == Tag::EmptyRest {
                        return None;
                    }
                    continue;
                }
                if bucket.entries[slot]
                    .as_ref()
                    .is_some_and(|entry| *entry.key == *key)
                {
                    return Some(SlotRef { bucket: id, slot });
                }
            }
        }
        None
    }

    /// Find a live slot by comparing key length, then key bytes, without
    /// looking at hash fragments.
    pub(crate) fn find_bytes(&self, head: usize, key: &[u8]) -> Option<SlotRef> {
        for (id, bucket) in self.chain(head) {
            for slot in 0..BUCKET_CAPACITY {
                let Some(entry) = bucket.entries[slot].as_ref() else {
                    if bucket.tags[slot] == Tag::EmptyRest {
                        return None;
                    }
                    continue;
                };
                if entry.key.len() == key.len() && *entry.key == *key {
                    return Some(SlotRef { bucket: id, slot });
                }
            }
        }
        None
    }

    #[inline]
    pub(crate) fn entry(&self, at: SlotRef) -> Option<&Entry<V>> {
        self.buckets[at.bucket].entry(at.slot)
    }

    #[inline]
    pub(crate) fn entry_mut(&mut self, at: SlotRef) -> Option<&mut Entry<V>> {
        self.buckets[at.bucket].entry_mut(at.slot)
    }

    /// Mark a slot emptied by a removal.
    ///
    /// The slot becomes `EmptyOne`. If nothing live follows it in the chain,
    /// the slot and the run of `EmptyOne` slots before it (crossing back into
    /// earlier buckets of the chain) become `EmptyRest`.
    pub(crate) fn mark_deleted(&mut self, head: usize, at: SlotRef) {
        let SlotRef {
            bucket: mut id,
            slot: mut slot,
        } = at;
        self.buckets[id].set_tag(slot, Tag::EmptyOne);

        let followed_by_rest = if slot == BUCKET_CAPACITY - 1 {
            match self.buckets[id].overflow {
                Some(next) => self.buckets[next].tags[0] == Tag::EmptyRest,
                None => true,
            }
        } else {
            self.buckets[id].tags[slot + 1] == Tag::EmptyRest
        };
        if !followed_by_rest {
            return;
        }

        loop {
            self.buckets[id].set_tag(slot, Tag::EmptyRest);
            if slot == 0 {
                if id == head {
                    break;
                }
                match self.previous(head, id) {
                    Some(prev) => {
                        id = prev;
                        slot = BUCKET_CAPACITY - 1;
                    }
                    None => break,
                }
            } else {
                slot -= 1;
            }
            if self.buckets[id].tags[slot] != Tag::EmptyOne {
                break;
            }
        }
    }

    /// Number of occupied slots across every bucket, counted by scanning.
    pub(crate) fn live_slots(&self) -> usize {
        self.buckets.iter().map(Bucket::live).sum()
    }

    /// Visit every live entry in arena order.
    pub(crate) fn for_each_live(&self, mut f: impl FnMut(&Entry<V>) -> bool) -> bool {
        for bucket in &self.buckets {
            for entry in bucket.entries.iter().flatten() {
                if !f(entry) {
                    return false;
                }
            }
        }
        true
    }

    /// Move every live entry out, leaving the primary buckets empty and
    /// dropping all overflow buckets.
    pub(crate) fn drain_live(&mut self, mut f: impl FnMut(Entry<V>)) {
        for bucket in &mut self.buckets {
            for slot in 0..BUCKET_CAPACITY {
                if let Some(entry) = bucket.entries[slot].take() {
                    f(entry);
                }
                bucket.tags[slot] = Tag::EmptyRest;
            }
            bucket.overflow = None;
        }
        // Overflow buckets are empty by now, so truncating drops no values.
        self.buckets.truncate(self.primary);
    }

    /// Check the per-chain tag invariants, returning the number of live slots
    /// reachable from primary buckets.
    #[cfg(any(test, feature = "stats"))]
    pub(crate) fn check_chains(&self) -> Result<usize, alloc::string::String> {
        use alloc::format;

        let mut live = 0;
        for head in 0..self.primary {
            let mut rest = false;
            let mut keys: Vec<&[u8]> = Vec::new();
            for (id, bucket) in self.chain(head) {
                for slot in 0..BUCKET_CAPACITY {
                    let tag = bucket.tags[slot];
                    let entry = bucket.entries[slot].as_ref();
                    if tag.is_occupied() != entry.is_some() {
                        return Err(format!("bucket {id} slot {slot}: tag {tag:?} disagrees with entry"));
                    }
                    if rest && tag != Tag::EmptyRest {
                        return Err(format!("bucket {id} slot {slot}: {tag:?} after EmptyRest"));
                    }
                    if tag == Tag::EmptyRest {
                        rest = true;
                    }
                    if let Some(entry) = entry {
                        if keys.contains(&&*entry.key) {
                            return Err(format!("bucket {id} slot {slot}: duplicate key"));
                        }
                        keys.push(&entry.key);
                        live += 1;
                    }
                }
            }
        }
        Ok(live)
    }
}

impl<V> Debug for BucketArray<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::String;

        let rows = self
            .buckets
            .iter()
            .enumerate()
            .map(|(id, bucket)| {
                let mut row = String::new();
                for tag in bucket.tags {
                    match tag {
                        Tag::EmptyRest => row.push_str(".. "),
                        Tag::EmptyOne => row.push_str("__ "),
                        other => row.push_str(&format!("{:02x} ", other.to_byte())),
                    }
                }
                match bucket.overflow {
                    Some(next) => format!("{id:>5}: {row}-> {next}"),
                    None => format!("{id:>5}: {row}"),
                }
            })
            .collect::<Vec<_>>();
        f.debug_struct("BucketArray")
            .field("primary", &self.primary)
            .field("overflow", &self.overflow_len())
            .field("tags", &rows)
            .finish()
    }
}

pub(crate) struct Chain<'a, V> {
    array: &'a BucketArray<V>,
    next: Option<usize>,
}

impl<'a, V> Iterator for Chain<'a, V> {
    type Item = (usize, &'a Bucket<V>);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let bucket = &self.array.buckets[id];
        self.next = bucket.overflow;
        Some((id, bucket))
    }
}
