use core::hash::BuildHasher;
use core::hash::Hasher;

use foldhash::quality::FixedState;
use rand::RngCore;
use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Seeded 64-bit hash over key bytes.
///
/// The seed belongs to a single table. Two hashers built from the same seed
/// always agree.
#[derive(Clone)]
pub(crate) struct KeyHasher {
    seed: u64,
    state: FixedState,
}

impl KeyHasher {
    #[inline]
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            seed,
            state: FixedState::with_seed(seed),
        }
    }

    #[inline]
    pub(crate) fn seed(&self) -> u64 {
        self.seed
    }

    #[inline]
    pub(crate) fn hash(&self, key: &[u8]) -> u64 {
        let mut hasher = self.state.build_hasher();
        hasher.write(key);
        hasher.finish()
    }
}

impl core::fmt::Debug for KeyHasher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeyHasher")
            .field("seed", &format_args!("{:#018x}", self.seed))
            .finish()
    }
}

/// Per-table source of fresh hash seeds and of the coin flips used by the
/// approximate overflow counter.
pub(crate) struct SeedSource {
    rng: SmallRng,
}

impl SeedSource {
    /// A deterministic source. Tables built from the same seed replay the
    /// same sequence of re-randomized seeds.
    pub(crate) fn from_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub(crate) fn from_entropy() -> Self {
        Self { rng: entropy_rng() }
    }

    #[inline]
    pub(crate) fn next_seed(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Returns `true` with probability `1 / 2^bits`.
    #[inline]
    pub(crate) fn one_in_pow2(&mut self, bits: u32) -> bool {
        if bits == 0 {
            return true;
        }
        let mask = (1u64 << bits.min(63)) - 1;
        self.rng.next_u64() & mask == 0
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "std")] {
        fn entropy_rng() -> SmallRng {
            SmallRng::from_os_rng()
        }
    } else {
        // Without an OS RNG, borrow foldhash's per-instance random state.
        fn entropy_rng() -> SmallRng {
            let state = foldhash::fast::RandomState::default();
            SmallRng::seed_from_u64(state.hash_one(0x5eed_u64))
        }
    }
}
