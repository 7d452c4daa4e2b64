use core::fmt::Debug;
use core::marker::PhantomData;
use core::ops::ControlFlow;

use crate::growth::DEFAULT_EVACUATION_LIMIT;
use crate::hash_table::HashTable;

/// Receives every value the map gives up.
///
/// A value is handed to the destructor exactly once: when it is overwritten
/// by [`BucketMap::insert`], removed by [`BucketMap::remove`], cleared, or
/// when the map is dropped. Any `FnMut(V)` closure is a destructor.
pub trait Destructor<V> {
    /// Dispose of a value the map no longer owns.
    fn destroy(&mut self, value: V);
}

/// The default destructor. Drops the value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DropValue;

impl<V> Destructor<V> for DropValue {
    #[inline]
    fn destroy(&mut self, value: V) {
        drop(value);
    }
}

impl<V, F> Destructor<V> for F
where
    F: FnMut(V),
{
    #[inline]
    fn destroy(&mut self, value: V) {
        self(value)
    }
}

/// A byte-string keyed map that passes displaced values to a [`Destructor`].
///
/// `BucketMap` wraps a [`HashTable`] and differs from it only in what happens
/// to values leaving the map: instead of being returned, they go to the
/// destructor. Keys are copied on insert, so the caller's buffer may be
/// reused right away.
///
/// # Examples
///
/// ```rust
/// # use bucket_hash::BucketMap;
/// #
/// let mut freed = Vec::new();
/// {
///     let mut map = BucketMap::with_destructor(|v: String| freed.push(v));
///     map.insert(b"greeting", "hello".to_string());
///     map.insert(b"greeting", "hi".to_string());
///     assert_eq!(map.get(b"greeting").map(String::as_str), Some("hi"));
///     assert_eq!(map.len(), 1);
/// }
/// assert_eq!(freed, ["hello", "hi"]);
/// ```
pub struct BucketMap<V, D: Destructor<V> = DropValue> {
    table: HashTable<V>,
    destructor: D,
}

/// A builder for a [`BucketMap`].
///
/// # Examples
///
/// ```rust
/// # use bucket_hash::BucketMap;
/// #
/// let mut dropped = 0;
/// let mut map = BucketMap::builder()
///     // Hash with a fixed seed for a reproducible layout.
///     .seed(0xdead_beef)
///     // Size the first bucket array for 1000 entries.
///     .capacity(1000)
///     // Count values as they leave the map.
///     .destructor(|_: u64| dropped += 1)
///     .build();
/// map.insert(b"a", 1);
/// map.remove(b"a");
/// drop(map);
/// assert_eq!(dropped, 1);
/// ```
pub struct BucketMapBuilder<V, D = DropValue> {
    seed: Option<u64>,
    capacity: usize,
    evacuation_limit: usize,
    destructor: D,
    _values: PhantomData<fn(V)>,
}

impl<V> BucketMapBuilder<V> {
    /// Set the destructor that receives displaced values.
    pub fn destructor<D>(self, destructor: D) -> BucketMapBuilder<V, D>
    where
        D: Destructor<V>,
    {
        BucketMapBuilder {
            destructor,
            seed: self.seed,
            capacity: self.capacity,
            evacuation_limit: self.evacuation_limit,
            _values: PhantomData,
        }
    }
}

impl<V, D> BucketMapBuilder<V, D> {
    /// Hash keys with `seed` instead of a random one.
    ///
    /// Fixed seeds make bucket layouts reproducible, which is what tests
    /// want. They also make hash flooding easy for anyone who knows the seed.
    pub fn seed(self, seed: u64) -> Self {
        BucketMapBuilder {
            seed: Some(seed),
            ..self
        }
    }

    /// Size the first bucket array so `capacity` entries fit without
    /// growing. Nothing is allocated until the first insert.
    pub fn capacity(self, capacity: usize) -> Self {
        BucketMapBuilder { capacity, ..self }
    }

    /// Upper bound on already-evacuated old buckets the migration cursor
    /// skips in a single step. Defaults to 1024.
    pub fn evacuation_limit(self, evacuation_limit: usize) -> Self {
        BucketMapBuilder {
            evacuation_limit,
            ..self
        }
    }

    /// Construct a [`BucketMap`] from the builder.
    pub fn build(self) -> BucketMap<V, D>
    where
        D: Destructor<V>,
    {
        BucketMap {
            table: HashTable::with_options(self.seed, self.capacity, self.evacuation_limit),
            destructor: self.destructor,
        }
    }
}

impl<V, D> Debug for BucketMapBuilder<V, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BucketMapBuilder")
            .field("seed", &self.seed)
            .field("capacity", &self.capacity)
            .field("evacuation_limit", &self.evacuation_limit)
            .finish()
    }
}

impl<V> Default for BucketMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> BucketMap<V> {
    /// Creates an empty map that drops displaced values.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use bucket_hash::BucketMap;
    /// #
    /// let mut map = BucketMap::new();
    /// map.insert("one", 1);
    /// assert_eq!(map.get("one"), Some(&1));
    /// ```
    pub fn new() -> Self {
        Self::with_destructor(DropValue)
    }

    /// Creates an empty map hashing with `seed` that drops displaced values.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_seed_and_destructor(seed, DropValue)
    }

    /// Returns a builder for a `BucketMap`.
    pub fn builder() -> BucketMapBuilder<V> {
        BucketMapBuilder {
            seed: None,
            capacity: 0,
            evacuation_limit: DEFAULT_EVACUATION_LIMIT,
            destructor: DropValue,
            _values: PhantomData,
        }
    }
}

impl<V, D: Destructor<V>> BucketMap<V, D> {
    /// Creates an empty map with a random seed.
    pub fn with_destructor(destructor: D) -> Self {
        Self {
            table: HashTable::new(),
            destructor,
        }
    }

    /// Creates an empty map hashing with `seed`.
    ///
    /// Two maps built with the same seed and fed the same operations end up
    /// with identical layouts.
    pub fn with_seed_and_destructor(seed: u64, destructor: D) -> Self {
        Self {
            table: HashTable::with_seed(seed),
            destructor,
        }
    }

    /// Inserts or updates `key`.
    ///
    /// If the key was present, its previous value goes to the destructor.
    /// Returns `true` if the key is new.
    pub fn insert(&mut self, key: impl AsRef<[u8]>, value: V) -> bool {
        match self.table.insert(key, value) {
            Some(old) => {
                self.destructor.destroy(old);
                false
            }
            None => true,
        }
    }

    /// Returns a reference to the value stored under `key`.
    #[inline]
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&V> {
        self.table.get(key)
    }

    /// Returns a mutable reference to the value stored under `key`.
    #[inline]
    pub fn get_mut(&mut self, key: impl AsRef<[u8]>) -> Option<&mut V> {
        self.table.get_mut(key)
    }

    /// Returns `true` if `key` is present.
    #[inline]
    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> bool {
        self.table.contains_key(key)
    }

    /// Removes `key`, passing its value to the destructor.
    ///
    /// Returns `true` if the key was present. Removing an absent key leaves
    /// the map untouched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use bucket_hash::BucketMap;
    /// #
    /// let mut map = BucketMap::with_seed(1);
    /// map.insert(b"k", ());
    /// assert!(map.remove(b"k"));
    /// assert!(!map.remove(b"k"));
    /// ```
    pub fn remove(&mut self, key: impl AsRef<[u8]>) -> bool {
        match self.table.remove(key) {
            Some(value) => {
                self.destructor.destroy(value);
                true
            }
            None => false,
        }
    }

    /// Number of live keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map holds no keys.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Removes every entry, passing each value to the destructor.
    pub fn clear(&mut self) {
        let destructor = &mut self.destructor;
        self.table.clear_with(|value| destructor.destroy(value));
    }

    /// Calls `f` with every live key and value until it breaks.
    ///
    /// See [`HashTable::for_each`].
    pub fn for_each(&self, f: impl FnMut(&[u8], &V) -> ControlFlow<()>) {
        self.table.for_each(f);
    }

    /// Number of primary buckets, 0 before the first insert.
    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    /// Returns `true` while entries are being migrated to a new bucket array.
    pub fn is_growing(&self) -> bool {
        self.table.is_growing()
    }

    /// The seed currently used to hash keys.
    pub fn seed(&self) -> u64 {
        self.table.seed()
    }

    /// The destructor.
    pub fn destructor(&self) -> &D {
        &self.destructor
    }

    /// The underlying table.
    pub fn table(&self) -> &HashTable<V> {
        &self.table
    }
}

impl<V, D: Destructor<V>> Drop for BucketMap<V, D> {
    fn drop(&mut self) {
        let destructor = &mut self.destructor;
        self.table.clear_with(|value| destructor.destroy(value));
    }
}

impl<V, D: Destructor<V>> Debug for BucketMap<V, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BucketMap")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
