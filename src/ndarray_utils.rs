//! Small statistics helpers on `ndarray` grids and sorted samples.

use itertools::{Itertools, MinMaxResult};
use ndarray::{Array2, ArrayView2};

use crate::{Float, cast};

/// Copy of `grid` with every non-finite sample replaced by zero.
pub(crate) fn finite_or_zero<F: Float>(grid: ArrayView2<F>) -> Array2<F> {
    grid.mapv(|v| if v.is_finite() { v } else { F::zero() })
}

/// Every `stride`-th sample of `grid` in row-major order, at most `max_samples`, sorted ascending.
pub(crate) fn strided_sorted_samples<F: Float>(grid: ArrayView2<F>, max_samples: usize) -> Vec<F> {
    let stride = (grid.len() / max_samples.max(1)).max(1);
    grid.iter()
        .step_by(stride)
        .take(max_samples)
        .copied()
        .sorted_unstable_by(|a, b| a.partial_cmp(b).expect("found nan"))
        .collect_vec()
}

/// Median of an ascending slice. Averages the two middle values for even lengths.
pub(crate) fn median_sorted<F: Float>(sorted: &[F]) -> Option<F> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / cast::<F>(2.)),
    }
}

/// Population standard deviation.
pub(crate) fn std_dev<F: Float>(values: impl Iterator<Item = F> + Clone) -> Option<F> {
    let (n, sum) = values
        .clone()
        .fold((0usize, F::zero()), |(n, sum), v| (n + 1, sum + v));
    if n == 0 {
        return None;
    }
    let n = cast::<F>(n as f64);
    let mean = sum / n;
    let var = values.fold(F::zero(), |acc, v| acc + (v - mean) * (v - mean)) / n;
    Some(var.sqrt())
}

/// Minimum and maximum of `values`.
pub(crate) fn min_max<F: Float>(values: impl Iterator<Item = F>) -> Option<(F, F)> {
    match values.minmax_by(|a, b| a.partial_cmp(b).expect("found nan")) {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some((v, v)),
        MinMaxResult::MinMax(min, max) => Some((min, max)),
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    use super::*;

    #[test]
    fn replaces_non_finite() {
        let grid = array![[1., f64::NAN], [f64::INFINITY, -2.]];
        let clean = finite_or_zero(grid.view());

        assert_eq!(clean, array![[1., 0.], [0., -2.]]);
        assert!(grid[[0, 1]].is_nan());
    }

    #[test]
    fn strided_samples() {
        let grid = Array2::from_shape_fn((10, 10), |(y, x)| (99 - (10 * y + x)) as f64);

        let all = strided_sorted_samples(grid.view(), 1000);
        assert_eq!(all.len(), 100);
        assert_eq!(all[0], 0.);
        assert_eq!(all[99], 99.);

        let few = strided_sorted_samples(grid.view(), 10);
        assert_eq!(few, vec![9., 19., 29., 39., 49., 59., 69., 79., 89., 99.]);
    }

    #[test]
    fn median() {
        assert_eq!(median_sorted::<f64>(&[]), None);
        assert_eq!(median_sorted(&[1., 2., 7.]), Some(2.));
        assert_eq!(median_sorted(&[1., 2., 4., 7.]), Some(3.));
    }

    #[test]
    fn standard_deviation() {
        let values = [2., 4., 4., 4., 5., 5., 7., 9.];
        assert_abs_diff_eq!(std_dev(values.iter().copied()).unwrap(), 2.);
        assert_eq!(std_dev(std::iter::empty::<f64>()), None);
    }

    #[test]
    fn extremes() {
        assert_eq!(min_max([3., -1., 8.].into_iter()), Some((-1., 8.)));
        assert_eq!(min_max([3.].into_iter()), Some((3., 3.)));
        assert_eq!(min_max(std::iter::empty::<f64>()), None);
    }
}
