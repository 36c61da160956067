#![allow(dead_code)]

use brute_knn::distance::euclidean;
use brute_knn::{Dataset, NeighborTable};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Points drawn uniformly from `[0, 100)^dim`.
pub fn uniform(n: usize, dim: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let coords = (0..n * dim).map(|_| rng.gen_range(0.0..100.0)).collect();
    Dataset::from_flat(coords, dim).unwrap()
}

/// Points scattered tightly around `centers` random centers.
pub fn clustered(n: usize, dim: usize, centers: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let centroids: Vec<f64> = (0..centers * dim)
        .map(|_| rng.gen_range(-50.0..50.0))
        .collect();
    let mut coords = Vec::with_capacity(n * dim);
    for _ in 0..n {
        let c = rng.gen_range(0..centers) * dim;
        for &x in &centroids[c..c + dim] {
            coords.push(x + rng.gen_range(-0.01..0.01));
        }
    }
    Dataset::from_flat(coords, dim).unwrap()
}

/// A `side x side` integer lattice in 2D. Full of equal-distance ties.
pub fn grid(side: usize) -> Dataset {
    let points: Vec<[f64; 2]> = (0..side * side)
        .map(|i| [(i % side) as f64, (i / side) as f64])
        .collect();
    Dataset::from_points(&points).unwrap()
}

/// Check `table` row by row against a sort of the true distances.
///
/// Only meaningful for datasets without coincident points.
pub fn assert_exact_knn(dataset: &Dataset, table: &NeighborTable) {
    let k = table.k();
    for (i, row) in table.rows().enumerate() {
        let q = dataset.point(i);
        let mut others: Vec<f64> = (0..dataset.len())
            .filter(|&j| j != i)
            .map(|j| euclidean(q, dataset.point(j)))
            .collect();
        others.sort_by(|a, b| a.partial_cmp(b).unwrap());

        assert!(
            !row.contains(&(i as u32)),
            "point {} lists itself: {:?}",
            i,
            row
        );
        for (m, &j) in row.iter().enumerate() {
            let d = euclidean(q, dataset.point(j as usize));
            assert_eq!(
                d, others[m],
                "point {}: neighbor #{} is {} at {}, expected distance {}",
                i, m, j, d, others[m]
            );
        }
        assert!(row.len() == k);
    }
}
