//! SMOTE: grows the minority class to the size of the majority by
//! interpolating between each drawn minority row and one of its nearest
//! minority neighbours.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use smartcore::algorithm::neighbour::linear_search::LinearKNNSearch;
use smartcore::error::Failed;
use smartcore::metrics::distance::euclidian::Euclidian;

use crate::error::ResamplingError;

pub const DEFAULT_K_NEIGHBORS: usize = 5;

/// `k` nearest minority neighbours of every minority row, excluding the row itself.
fn nearest_neighbors(points: &[Vec<f64>], k: usize) -> Result<Vec<Vec<usize>>, ResamplingError> {
    let search = LinearKNNSearch::new(points.to_vec(), Euclidian::<f64>::new()).map_err(search_failed)?;
    points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let found = search.find(p, k + 1).map_err(search_failed)?;
            Ok(found
                .into_iter()
                .map(|(j, _, _)| j)
                .filter(|&j| j != i)
                .take(k)
                .collect())
        })
        .collect()
}

fn search_failed(e: Failed) -> ResamplingError {
    ResamplingError::NeighborSearch(e.to_string())
}

/// Returns the input rows followed by the synthetic minority rows.
///
/// The neighbour count is `min(k_neighbors, minority - 1)`. Fails when the
/// partition holds one class only or fewer than two minority rows.
pub fn fit_resample(
    rows: &[Vec<f64>],
    labels: &[u8],
    k_neighbors: usize,
    seed: u64,
) -> Result<(Vec<Vec<f64>>, Vec<u8>), ResamplingError> {
    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(ResamplingError::SingleClass);
    }

    let (minority_label, minority, majority) = if positives <= negatives {
        (1u8, positives, negatives)
    } else {
        (0u8, negatives, positives)
    };
    if minority < 2 {
        return Err(ResamplingError::TooFewMinority { found: minority });
    }
    let k = k_neighbors.min(minority - 1).max(1);

    let mut out_rows = rows.to_vec();
    let mut out_labels = labels.to_vec();
    let to_generate = majority - minority;
    if to_generate == 0 {
        return Ok((out_rows, out_labels));
    }

    let points: Vec<Vec<f64>> = rows
        .iter()
        .zip(labels)
        .filter(|&(_, &l)| l == minority_label)
        .map(|(row, _)| row.clone())
        .collect();
    let neighbors = nearest_neighbors(&points, k)?;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    out_rows.reserve(to_generate);
    out_labels.reserve(to_generate);
    for _ in 0..to_generate {
        let i = rng.gen_range(0..points.len());
        let j = neighbors[i][rng.gen_range(0..neighbors[i].len())];
        let gap: f64 = rng.gen();
        let base = &points[i];
        let toward = &points[j];
        out_rows.push(
            base.iter()
                .zip(toward.iter())
                .map(|(a, b)| a + gap * (b - a))
                .collect(),
        );
        out_labels.push(minority_label);
    }

    Ok((out_rows, out_labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imbalanced() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            rows.push(vec![i as f64, 0.0]);
            labels.push(0);
        }
        for i in 0..6 {
            rows.push(vec![100.0 + i as f64, 10.0 + i as f64]);
            labels.push(1);
        }
        (rows, labels)
    }

    #[test]
    fn neighbours_exclude_the_row_itself() {
        let points = vec![vec![0.0], vec![1.0], vec![2.0], vec![10.0]];
        let neighbors = nearest_neighbors(&points, 2).unwrap();

        let sorted = |mut v: Vec<usize>| {
            v.sort_unstable();
            v
        };
        assert_eq!(sorted(neighbors[0].clone()), vec![1, 2]);
        assert_eq!(sorted(neighbors[1].clone()), vec![0, 2]);
        assert_eq!(sorted(neighbors[3].clone()), vec![1, 2]);
        assert!(neighbors.iter().enumerate().all(|(i, n)| n.len() == 2 && !n.contains(&i)));
    }

    #[test]
    fn duplicate_rows_still_get_k_neighbours() {
        let points = vec![vec![5.0, 5.0]; 4];
        let neighbors = nearest_neighbors(&points, 3).unwrap();
        for (i, n) in neighbors.iter().enumerate() {
            assert_eq!(n.len(), 3);
            assert!(!n.contains(&i));
        }
    }

    #[test]
    fn balances_to_one_to_one() {
        let (rows, labels) = imbalanced();
        let (out_rows, out_labels) = fit_resample(&rows, &labels, DEFAULT_K_NEIGHBORS, 42).unwrap();

        assert_eq!(out_rows.len(), 80);
        assert_eq!(out_labels.iter().filter(|&&l| l == 1).count(), 40);
        assert_eq!(&out_rows[..rows.len()], &rows[..]);
    }

    #[test]
    fn synthetic_rows_interpolate_minority_rows() {
        let (rows, labels) = imbalanced();
        let (out_rows, _) = fit_resample(&rows, &labels, DEFAULT_K_NEIGHBORS, 42).unwrap();

        for row in &out_rows[rows.len()..] {
            assert!((100.0..=105.0).contains(&row[0]), "x {}", row[0]);
            assert!((10.0..=15.0).contains(&row[1]), "y {}", row[1]);
        }
    }

    #[test]
    fn deterministic_for_a_seed() {
        let (rows, labels) = imbalanced();
        let a = fit_resample(&rows, &labels, 3, 1).unwrap();
        let b = fit_resample(&rows, &labels, 3, 1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn majority_of_positives_oversamples_negatives() {
        let (rows, labels) = imbalanced();
        let flipped: Vec<u8> = labels.iter().map(|l| 1 - l).collect();
        let (_, out_labels) = fit_resample(&rows, &flipped, DEFAULT_K_NEIGHBORS, 0).unwrap();
        assert_eq!(out_labels.iter().filter(|&&l| l == 0).count(), 40);
    }

    #[test]
    fn infeasible_inputs() {
        let rows = vec![vec![0.0], vec![1.0], vec![2.0]];
        assert_eq!(
            fit_resample(&rows, &[0, 0, 0], 5, 0).unwrap_err(),
            ResamplingError::SingleClass
        );
        assert_eq!(
            fit_resample(&rows, &[0, 0, 1], 5, 0).unwrap_err(),
            ResamplingError::TooFewMinority { found: 1 }
        );
    }

    #[test]
    fn balanced_input_is_returned_as_is() {
        let rows = vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]];
        let labels = vec![0, 1, 0, 1];
        let (out_rows, out_labels) = fit_resample(&rows, &labels, 5, 0).unwrap();
        assert_eq!(out_rows, rows);
        assert_eq!(out_labels, labels);
    }
}
