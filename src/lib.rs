#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Fixed-capacity buckets, slot tags, and the bucket arena.
///
/// Buckets hold eight tagged slots and link to at most one overflow bucket by
/// arena index.
pub mod bucket;

/// A byte-string keyed map that routes displaced values through an injected
/// destructor.
///
/// This module wraps the `HashTable` and adds the destructor contract and a
/// builder for seeding and sizing.
pub mod bucket_map;

mod growth;

pub mod hash_table;

mod hasher;

pub use bucket_map::BucketMap;
pub use bucket_map::BucketMapBuilder;
pub use bucket_map::Destructor;
pub use bucket_map::DropValue;
pub use hash_table::HashTable;
