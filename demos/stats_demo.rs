use bucket_hash::BucketMap;
use clap::Parser;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'n', long = "entries", default_value_t = 1000)]
    entries: usize,

    /// Remove every k-th key after filling, to leave holes in the chains.
    #[arg(short = 'r', long = "remove_every", default_value_t = 0)]
    remove_every: usize,

    #[arg(short = 's', long = "seed")]
    seed: Option<u64>,
}

fn main() {
    let args = Args::parse();

    let mut builder = BucketMap::builder();
    if let Some(seed) = args.seed {
        builder = builder.seed(seed);
    }
    let mut map: BucketMap<u64> = builder.build();

    println!("Filling map with {} keys...", args.entries);
    for i in 0..args.entries {
        map.insert(format!("key-{i}"), i as u64);
        if map.is_growing() && i % 64 == 0 {
            println!(
                "  growing at {} entries ({} buckets)",
                map.len(),
                map.bucket_count()
            );
        }
    }

    if args.remove_every > 0 {
        let removed = (0..args.entries)
            .step_by(args.remove_every)
            .filter(|i| map.remove(format!("key-{i}")))
            .count();
        println!("Removed {removed} keys");
    }

    println!(
        "Final load factor: {:.2} entries per bucket",
        map.len() as f64 / map.bucket_count().max(1) as f64
    );
    map.table().debug_stats().print();
    if let Err(problem) = map.table().check_invariants() {
        println!("Invariant violated: {problem}");
    }
}
