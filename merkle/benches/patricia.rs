use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use umbra_merkle::patricia::{root_sorted, Tree};
use umbra_transcript::Digest;

fn bench_incremental_insert(c: &mut Criterion) {
    for n in [1_000, 10_000, 100_000] {
        let mut sampler = StdRng::seed_from_u64(0);
        let keys: Vec<Digest> = (0..n).map(|_| Digest::random(&mut sampler)).collect();

        c.bench_function(&format!("{}/insert/n={}", module_path!(), n), |b| {
            b.iter(|| {
                let mut tree = Tree::new(b"bench");
                for key in &keys {
                    tree.insert(*key).unwrap();
                }
                tree.root()
            });
        });
    }
}

fn bench_delta_rehash(c: &mut Criterion) {
    for n in [10_000, 100_000] {
        let mut sampler = StdRng::seed_from_u64(0);
        let keys: Vec<Digest> = (0..n).map(|_| Digest::random(&mut sampler)).collect();
        let mut tree = Tree::new(b"bench");
        for key in &keys {
            tree.insert(*key).unwrap();
        }

        // One removal plus one insertion against a populated set, the shape
        // of a typical per-block delta.
        c.bench_function(&format!("{}/delta/n={}", module_path!(), n), |b| {
            b.iter(|| {
                let mut fork = tree.clone();
                let spent = keys[sampler.gen_range(0..keys.len())];
                fork.remove(&spent).unwrap();
                fork.insert(Digest::random(&mut sampler)).unwrap();
                fork.root()
            });
        });
    }
}

fn bench_root_sorted(c: &mut Criterion) {
    for n in [1_000, 10_000, 100_000] {
        let mut sampler = StdRng::seed_from_u64(0);
        let mut keys: Vec<Digest> = (0..n).map(|_| Digest::random(&mut sampler)).collect();
        keys.sort();

        c.bench_function(&format!("{}/scratch/n={}", module_path!(), n), |b| {
            b.iter(|| root_sorted(b"bench", &keys));
        });
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_incremental_insert, bench_delta_rehash, bench_root_sorted
}
criterion_main!(benches);
