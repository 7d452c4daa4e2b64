use core::hint::black_box;

use bucket_hash::BucketMap;
use criterion::AxisScale;
use criterion::BatchSize;
use criterion::Criterion;
use criterion::PlotConfiguration;
use criterion::Throughput;
use criterion::criterion_group;
use criterion::criterion_main;
use hashbrown::HashMap as HashbrownMap;
use rand::Rng;
use rand::SeedableRng;
use rand::distr;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand_distr::Zipf;

trait KeyValue: Clone {
    fn new(key: u64) -> Self;

    fn key(&self) -> &[u8];
}

#[derive(Clone)]
struct SmallItem {
    key: [u8; 8],
}

impl KeyValue for SmallItem {
    fn new(key: u64) -> Self {
        black_box(Self {
            key: key.to_le_bytes(),
        })
    }

    fn key(&self) -> &[u8] {
        &self.key
    }
}

#[derive(Clone)]
struct StringItem {
    key: String,
    _value: u64,
}

impl KeyValue for StringItem {
    fn new(key: u64) -> Self {
        black_box(Self {
            key: format!("key_{:016X}", key),
            _value: key,
        })
    }

    fn key(&self) -> &[u8] {
        self.key.as_bytes()
    }
}

#[derive(Clone)]
struct LargeItem {
    key: String,
    _value: [u8; 256],
}

impl KeyValue for LargeItem {
    fn new(key: u64) -> Self {
        let mut value = [0u8; 256];
        for (i, byte) in value.iter_mut().enumerate() {
            *byte = ((key >> ((i % 8) * 8)) & 0xFF) as u8;
        }
        black_box(Self {
            key: format!("key_{:064b}", key),
            _value: value,
        })
    }

    fn key(&self) -> &[u8] {
        self.key.as_bytes()
    }
}

const SIZES: &[usize] = &[
    (1 << 10),
    (1 << 11),
    (1 << 12),
    (1 << 13),
    (1 << 14),
    (1 << 15),
    (1 << 16),
    (1 << 17),
    (1 << 18),
];

fn make_items<Item: KeyValue>(count: usize, rng: &mut SmallRng) -> Vec<Item> {
    (0..count).map(|_| Item::new(rng.random())).collect()
}

fn filled_bucket_map<Item: KeyValue>(items: &[Item]) -> BucketMap<Item> {
    let mut map = BucketMap::new();
    for item in items {
        map.insert(item.key(), item.clone());
    }
    map
}

fn filled_hashbrown<Item: KeyValue>(items: &[Item]) -> HashbrownMap<Box<[u8]>, Item> {
    let mut map = HashbrownMap::new();
    for item in items {
        map.insert(Box::from(item.key()), item.clone());
    }
    map
}

fn bench_insert_random<Item: KeyValue, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!(
        "insert_random_{}",
        core::any::type_name::<Item>()
    ));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    let mut rng = SmallRng::from_os_rng();

    for size in SIZES[..=MAX_SIZE].iter() {
        let items = make_items::<Item>(*size, &mut rng);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_function(format!("bucket_hash/{size}"), |b| {
            b.iter_batched(
                || {
                    let mut items = items.clone();
                    items.shuffle(&mut SmallRng::from_os_rng());
                    items
                },
                |items| {
                    let mut map = BucketMap::new();
                    for item in items {
                        let key = Box::<[u8]>::from(item.key());
                        black_box(map.insert(key, item));
                    }
                    black_box(map)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || {
                    let mut items = items.clone();
                    items.shuffle(&mut SmallRng::from_os_rng());
                    items
                },
                |items| {
                    let mut map = HashbrownMap::new();
                    for item in items {
                        let key = Box::<[u8]>::from(item.key());
                        black_box(map.insert(key, item));
                    }
                    black_box(map)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_find_hit<Item: KeyValue, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("find_hit_{}", core::any::type_name::<Item>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    let mut rng = SmallRng::from_os_rng();

    for size in SIZES[..=MAX_SIZE].iter() {
        let mut items = make_items::<Item>(*size, &mut rng);
        let bucket_map = filled_bucket_map(&items);
        let hashbrown = filled_hashbrown(&items);
        items.shuffle(&mut rng);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_function(format!("bucket_hash/{size}"), |b| {
            b.iter(|| {
                for item in &items {
                    black_box(bucket_map.get(item.key()));
                }
            })
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter(|| {
                for item in &items {
                    black_box(hashbrown.get(item.key()));
                }
            })
        });
    }

    group.finish();
}

fn bench_find_miss<Item: KeyValue, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("find_miss_{}", core::any::type_name::<Item>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    let mut rng = SmallRng::from_os_rng();

    for size in SIZES[..=MAX_SIZE].iter() {
        let items = make_items::<Item>(*size, &mut rng);
        let misses = make_items::<Item>(*size, &mut rng);
        let bucket_map = filled_bucket_map(&items);
        let hashbrown = filled_hashbrown(&items);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_function(format!("bucket_hash/{size}"), |b| {
            b.iter(|| {
                for item in &misses {
                    black_box(bucket_map.get(item.key()));
                }
            })
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter(|| {
                for item in &misses {
                    black_box(hashbrown.get(item.key()));
                }
            })
        });
    }

    group.finish();
}

fn bench_remove<Item: KeyValue, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("remove_{}", core::any::type_name::<Item>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    let mut rng = SmallRng::from_os_rng();

    for size in SIZES[..=MAX_SIZE].iter() {
        let mut items = make_items::<Item>(*size, &mut rng);
        let hashbrown = filled_hashbrown(&items);
        items.shuffle(&mut rng);
        group.throughput(Throughput::Elements(*size as u64));

        // Cloning a `BucketMap` is not supported, so rebuild it per batch.
        group.bench_function(format!("bucket_hash/{size}"), |b| {
            b.iter_batched(
                || filled_bucket_map(&items),
                |mut map| {
                    for item in &items {
                        black_box(map.remove(item.key()));
                    }
                    black_box(map)
                },
                BatchSize::SmallInput,
            )
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter_batched(
                || hashbrown.clone(),
                |mut map| {
                    for item in &items {
                        black_box(map.remove(item.key()));
                    }
                    black_box(map)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_churn<Item: KeyValue, const MAX_SIZE: usize>(c: &mut Criterion) {
    let mut group = c.benchmark_group(format!("churn_{}", core::any::type_name::<Item>()));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    let mut rng = SmallRng::from_os_rng();

    for size in SIZES[..=MAX_SIZE].iter() {
        // Every key is inserted once and removed once, in random order, so
        // the population stays around half of `size`.
        let half = make_items::<Item>(*size / 2, &mut rng);
        let mut operations = half.iter().chain(half.iter()).cloned().collect::<Vec<_>>();
        operations.shuffle(&mut rng);
        group.throughput(Throughput::Elements(operations.len() as u64));

        group.bench_function(format!("bucket_hash/{size}"), |b| {
            b.iter(|| {
                let mut map = BucketMap::new();
                for item in &operations {
                    if !map.remove(item.key()) {
                        map.insert(item.key(), item.clone());
                    }
                }
                black_box(map)
            })
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter(|| {
                let mut map = HashbrownMap::new();
                for item in &operations {
                    if map.remove(item.key()).is_none() {
                        map.insert(Box::<[u8]>::from(item.key()), item.clone());
                    }
                }
                black_box(map)
            })
        });
    }

    group.finish();
}

fn bench_mixed_probabilistic_zipf<Item: KeyValue, const MAX_SIZE: usize>(c: &mut Criterion) {
    const KEY_SPACE_MULTIPLIER: usize = 2;

    let mut group = c.benchmark_group(format!(
        "mixed_probabilistic_zipf_{}",
        core::any::type_name::<Item>()
    ));
    group.plot_config(PlotConfiguration::default().summary_scale(AxisScale::Logarithmic));

    let mut rng = SmallRng::from_os_rng();

    for size in SIZES[..=MAX_SIZE].iter() {
        let keys = make_items::<Item>(size * KEY_SPACE_MULTIPLIER, &mut rng);
        let key_distr = Zipf::new(keys.len() as f32 - 1.0, 1.0).unwrap();
        let op_distr = distr::Uniform::new(0u8, 10).unwrap();

        // 30% insert, 50% find, 20% remove over a Zipf-skewed key space.
        let operations = (0..size * 3)
            .map(|_| {
                let index: f32 = rng.sample(key_distr);
                (rng.sample(op_distr), index as usize)
            })
            .collect::<Vec<(u8, usize)>>();
        group.throughput(Throughput::Elements(operations.len() as u64));

        group.bench_function(format!("bucket_hash/{size}"), |b| {
            b.iter(|| {
                let mut map = BucketMap::new();
                for &(op, index) in &operations {
                    let item = &keys[index];
                    match op {
                        0..3 => {
                            black_box(map.insert(item.key(), item.clone()));
                        }
                        3..8 => {
                            black_box(map.get(item.key()));
                        }
                        _ => {
                            black_box(map.remove(item.key()));
                        }
                    }
                }
                black_box(map)
            })
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter(|| {
                let mut map = HashbrownMap::new();
                for &(op, index) in &operations {
                    let item = &keys[index];
                    match op {
                        0..3 => {
                            black_box(map.insert(Box::<[u8]>::from(item.key()), item.clone()));
                        }
                        3..8 => {
                            black_box(map.get(item.key()));
                        }
                        _ => {
                            black_box(map.remove(item.key()));
                        }
                    }
                }
                black_box(map)
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_mixed_probabilistic_zipf::<SmallItem, 8>,
    bench_mixed_probabilistic_zipf::<StringItem, 8>,
    bench_mixed_probabilistic_zipf::<LargeItem, 5>,
    bench_churn::<SmallItem, 8>,
    bench_churn::<StringItem, 8>,
    bench_churn::<LargeItem, 5>,
    bench_insert_random::<SmallItem, 8>,
    bench_insert_random::<StringItem, 8>,
    bench_insert_random::<LargeItem, 5>,
    bench_find_hit::<SmallItem, 8>,
    bench_find_hit::<StringItem, 8>,
    bench_find_hit::<LargeItem, 5>,
    bench_find_miss::<SmallItem, 8>,
    bench_find_miss::<StringItem, 8>,
    bench_find_miss::<LargeItem, 5>,
    bench_remove::<SmallItem, 8>,
    bench_remove::<StringItem, 8>,
    bench_remove::<LargeItem, 5>,
);

criterion_main!(benches);
