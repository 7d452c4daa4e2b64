#![allow(dead_code)]

use bucket_hash::BucketMap;
use bucket_hash::Destructor;

pub const WORDS: [&str; 46] = [
    "abac",
    "abaca",
    "abacate",
    "abacay",
    "abacinate",
    "abacination",
    "abaciscus",
    "abacist",
    "aback",
    "abactinal",
    "abactinally",
    "abaction",
    "abactor",
    "abaculus",
    "abacus",
    "Abadite",
    "abaff",
    "abaft",
    "abaisance",
    "abaiser",
    "abaissed",
    "abalienate",
    "abalienation",
    "abalone",
    "Abama",
    "abampere",
    "abandon",
    "abandonable",
    "abandoned",
    "abandonedly",
    "abandonee",
    "abandoner",
    "abandonment",
    "Abanic",
    "Abantes",
    "abaptiston",
    "Abarambo",
    "Abaris",
    "abarthrosis",
    "abarticular",
    "abarticulation",
    "abas",
    "abase",
    "abased",
    "abasedly",
    "abashed",
];

// Run the test on different configurations of a `BucketMap`.
pub fn with_map<V, D: Destructor<V>>(
    destructor: impl Fn() -> D,
    mut test: impl FnMut(BucketMap<V, D>),
) {
    // Default migration: skip up to 1024 evacuated buckets per step.
    test(BucketMap::builder().seed(0x5eed).destructor(destructor()).build());

    // Move the cursor one bucket at a time so lookups and removals run
    // against half-evacuated tables for longer.
    test(
        BucketMap::builder()
            .seed(0xc0ffee)
            .evacuation_limit(1)
            .destructor(destructor())
            .build(),
    );

    // Presized: the first growths never happen.
    test(
        BucketMap::builder()
            .seed(0xbeef)
            .capacity(1 << 12)
            .destructor(destructor())
            .build(),
    );

    // Seeded from the OS.
    test(BucketMap::builder().destructor(destructor()).build());
}

pub fn key(i: usize) -> String {
    format!("key-{i:08}")
}
