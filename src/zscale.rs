//! Robust display range via the ZScale algorithm.
//!
//! ZScale samples the image, sorts the samples and fits a line through them while iteratively
//! rejecting outliers. The slope of that line, divided by a contrast factor, determines how far
//! around the median the display range reaches. Bright stars and hot pixels therefore do not
//! wash out the faint background.
//!
//! The algorithm follows the IRAF `zscale` task as implemented by astropy's `ZScaleInterval`.

use itertools::Itertools;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector, SVD};
use ndarray::{Array2, ArrayView2};

use crate::ndarray_utils::{finite_or_zero, median_sorted, std_dev, strided_sorted_samples};
use crate::{Error, Float, cast, to_f64};

/// Width a collapsed display range is widened to.
pub const DEGENERATE_RANGE_EPSILON: f64 = 1e-6;

/// Display limits `(vmin, vmax)` of an image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayRange<F: Float> {
    vmin: F,
    vmax: F,
}

impl<F: Float> DisplayRange<F> {
    /// Create a new range. Both limits must be finite and `vmin <= vmax`.
    pub fn new(vmin: F, vmax: F) -> Result<Self, Error> {
        if !vmin.is_finite() || !vmax.is_finite() || vmin > vmax {
            return Err(Error::InvalidInput(format!(
                "invalid display range [{}, {}]",
                to_f64(vmin),
                to_f64(vmax)
            )));
        }
        Ok(Self { vmin, vmax })
    }

    /// Lower display limit.
    pub fn vmin(&self) -> F {
        self.vmin
    }

    /// Upper display limit.
    pub fn vmax(&self) -> F {
        self.vmax
    }

    /// `vmax - vmin`.
    pub fn width(&self) -> F {
        self.vmax - self.vmin
    }

    /// Whether both limits coincide.
    pub fn is_degenerate(&self) -> bool {
        self.vmax <= self.vmin
    }

    /// Whether `value` lies inside the range.
    pub fn contains(&self, value: F) -> bool {
        value >= self.vmin && value <= self.vmax
    }

    /// Widen a collapsed range to [`DEGENERATE_RANGE_EPSILON`] above `vmin`.
    ///
    /// Values too large for that epsilon to register are widened by a few ulps instead.
    pub fn widened(self) -> Self {
        if !self.is_degenerate() {
            return self;
        }
        let width = cast::<F>(DEGENERATE_RANGE_EPSILON)
            .max(self.vmin.abs() * F::default_epsilon() * cast::<F>(4.));
        Self {
            vmin: self.vmin,
            vmax: self.vmin + width,
        }
    }

    /// Reflect `value` about the midpoint of the range.
    pub fn invert_value(&self, value: F) -> F {
        self.vmax - value + self.vmin
    }

    /// Reflect every sample of `grid` about the midpoint of the range.
    ///
    /// Applying this twice with the same range restores the input.
    pub fn invert(&self, grid: ArrayView2<F>) -> Array2<F> {
        grid.mapv(|v| self.invert_value(v))
    }

    /// Linear stretch of `value` into `[0, 1]`, clipping outside the range.
    pub fn stretch(&self, value: F) -> Result<F, Error> {
        if self.is_degenerate() {
            return Err(Error::NormalizationDegenerate {
                value: to_f64(self.vmin),
            });
        }
        Ok((value.clamp(self.vmin, self.vmax) - self.vmin) / self.width())
    }

    /// [`stretch`](DisplayRange::stretch()) applied to every sample of `grid`.
    pub fn stretch_grid(&self, grid: ArrayView2<F>) -> Result<Array2<F>, Error> {
        if self.is_degenerate() {
            return Err(Error::NormalizationDegenerate {
                value: to_f64(self.vmin),
            });
        }
        let width = self.width();
        Ok(grid.mapv(|v| (v.clamp(self.vmin, self.vmax) - self.vmin) / width))
    }
}

/// An image ready for display.
#[derive(Clone, Debug, PartialEq)]
pub struct Normalized<F: Float> {
    /// Copy of the input with invalid samples zeroed, inverted if requested.
    pub data: Array2<F>,
    /// Display range computed before any inversion.
    pub range: DisplayRange<F>,
    /// Whether `data` was inverted.
    pub inverted: bool,
}

/// ZScale parameters.
///
/// Use `with_` functions to set parameters; the defaults match astropy's `ZScaleInterval`.
#[derive(Clone, Debug, PartialEq)]
pub struct ZScale<F: Float> {
    /// Maximum number of samples drawn from the image.
    pub n_samples: usize,
    /// Scaling factor applied to the fitted slope. Values `<= 0` leave the slope unchanged.
    pub contrast: F,
    /// Maximum fraction of samples that may be rejected before falling back to min/max.
    pub max_reject: F,
    /// Minimum number of good samples for the fit to be used.
    pub min_samples: usize,
    /// Rejection threshold in units of the residual standard deviation.
    pub sigma_clip: F,
    /// Maximum number of fit/reject iterations.
    pub max_iterations: usize,
}

impl<F: Float> Default for ZScale<F> {
    fn default() -> Self {
        Self {
            n_samples: 1000,
            contrast: cast(0.25),
            max_reject: cast(0.5),
            min_samples: 5,
            sigma_clip: cast(2.5),
            max_iterations: 5,
        }
    }
}

impl<F: Float> ZScale<F> {
    /// Create a new instance using default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of samples.
    pub fn with_n_samples(mut self, n_samples: usize) -> Self {
        self.n_samples = n_samples;
        self
    }

    /// Set the contrast factor.
    pub fn with_contrast(mut self, contrast: F) -> Self {
        self.contrast = contrast;
        self
    }

    /// Set the maximum rejected fraction.
    pub fn with_max_reject(mut self, max_reject: F) -> Self {
        self.max_reject = max_reject;
        self
    }

    /// Set the minimum number of good samples.
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    /// Set the rejection threshold.
    pub fn with_sigma_clip(mut self, sigma_clip: F) -> Self {
        self.sigma_clip = sigma_clip;
        self
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if self.n_samples == 0 {
            return Err(Error::InvalidInput("n_samples must be positive".into()));
        }
        if !self.sigma_clip.is_finite() || self.sigma_clip <= F::zero() {
            return Err(Error::InvalidInput(format!(
                "sigma_clip must be positive, got {}",
                to_f64(self.sigma_clip)
            )));
        }
        let max_reject = self.max_reject;
        if !max_reject.is_finite() || max_reject < F::zero() || max_reject > F::one() {
            return Err(Error::InvalidInput(format!(
                "max_reject must lie in [0, 1], got {}",
                to_f64(self.max_reject)
            )));
        }
        if !self.contrast.is_finite() {
            return Err(Error::InvalidInput("contrast must be finite".into()));
        }
        Ok(())
    }

    /// Raw ZScale limits `(vmin, vmax)` of `grid`, before any widening.
    ///
    /// Invalid samples are treated as zero; `grid` itself is not modified.
    pub fn limits(&self, grid: ArrayView2<F>) -> Result<(F, F), Error> {
        self.limits_of_finite(finite_or_zero(grid).view())
    }

    /// Display range of `grid`, widened if it collapsed to a single value.
    pub fn compute_range(&self, grid: ArrayView2<F>) -> Result<DisplayRange<F>, Error> {
        self.range_of_finite(finite_or_zero(grid).view())
    }

    /// Zero invalid samples, compute the display range and optionally invert the image about it.
    pub fn normalize(&self, grid: ArrayView2<F>, invert: bool) -> Result<Normalized<F>, Error> {
        let clean = finite_or_zero(grid);
        let range = self.range_of_finite(clean.view())?;
        let data = if invert {
            range.invert(clean.view())
        } else {
            clean
        };
        Ok(Normalized {
            data,
            range,
            inverted: invert,
        })
    }

    fn range_of_finite(&self, grid: ArrayView2<F>) -> Result<DisplayRange<F>, Error> {
        let (vmin, vmax) = self.limits_of_finite(grid)?;
        let range = DisplayRange::new(vmin, vmax)?;
        if range.is_degenerate() {
            warn!(
                "Display range collapsed to {}, widening it.",
                to_f64(range.vmin())
            );
        }
        Ok(range.widened())
    }

    fn limits_of_finite(&self, grid: ArrayView2<F>) -> Result<(F, F), Error> {
        self.validate()?;
        if grid.is_empty() {
            return Err(Error::InvalidInput(format!(
                "empty image of shape {:?}",
                grid.shape()
            )));
        }

        let samples = strided_sorted_samples(grid, self.n_samples);
        let npix = samples.len();
        let (mut vmin, mut vmax) = (samples[0], samples[npix - 1]);

        let minpix = self
            .min_samples
            .max((npix as f64 * to_f64(self.max_reject)) as usize);
        let ngrow = (npix / 100).max(1);

        let mut bad = vec![false; npix];
        let mut ngood = npix;
        let mut last_ngood = npix + 1;
        let mut slope = None;

        for iteration in 0..self.max_iterations {
            if ngood >= last_ngood || ngood < minpix {
                break;
            }
            let Some((s, intercept)) = fit_line(&samples, &bad) else {
                break;
            };
            slope = Some(s);

            let flat = samples
                .iter()
                .enumerate()
                .map(|(i, &v)| v - (s * cast::<F>(i as f64) + intercept))
                .collect_vec();
            let good_residuals = flat.iter().zip(&bad).filter(|(_, b)| !**b).map(|(r, _)| *r);
            let threshold = self.sigma_clip * std_dev(good_residuals).unwrap_or_else(F::zero);

            for (b, r) in bad.iter_mut().zip(&flat) {
                if *r < -threshold || *r > threshold {
                    *b = true;
                }
            }
            bad = dilate(&bad, ngrow);

            last_ngood = ngood;
            ngood = bad.iter().filter(|b| !**b).count();
            debug!(
                "ZScale iteration {}: {} of {} samples kept.",
                iteration + 1,
                ngood,
                npix
            );
        }

        if let (Some(mut slope), Some(median)) =
            (slope.filter(|_| ngood >= minpix), median_sorted(&samples))
        {
            if self.contrast > F::zero() {
                slope /= self.contrast;
            }
            let center = ((npix - 1) / 2) as f64;
            let lo = vmin.max(median - cast::<F>(center - 1.) * slope);
            let hi = vmax.min(median + cast::<F>(npix as f64 - center) * slope);
            // A slightly negative slope fitted to flat samples crosses the limits.
            (vmin, vmax) = if lo <= hi { (lo, hi) } else { (median, median) };
        } else {
            debug!("ZScale fit rejected, using sample min/max.");
        }

        debug!(
            "ZScale limits [{}, {}] from {} samples.",
            to_f64(vmin),
            to_f64(vmax),
            npix
        );
        Ok((vmin, vmax))
    }
}

/// Least squares line `value = slope * index + intercept` through the samples not marked bad.
fn fit_line<F: Float>(samples: &[F], bad: &[bool]) -> Option<(F, F)> {
    let points = samples
        .iter()
        .zip(bad)
        .enumerate()
        .filter(|(_, (_, b))| !**b)
        .map(|(i, (v, _))| (cast::<F>(i as f64), *v))
        .collect_vec();
    if points.len() < 2 {
        return None;
    }

    let a = DMatrix::from_fn(points.len(), 2, |r, c| if c == 0 { points[r].0 } else { F::one() });
    let b = DVector::from_iterator(points.len(), points.iter().map(|(_, v)| *v));
    let svd = SVD::new(a, true, true);
    let solution = svd.solve(&b, F::zero()).ok()?;
    Some((solution[0], solution[1]))
}

/// Grow every bad sample over a window of `width` samples.
///
/// Equivalent to `np.convolve(mask, ones(width), "same")`.
fn dilate(mask: &[bool], width: usize) -> Vec<bool> {
    let before = width / 2;
    let after = (width - 1) / 2;
    (0..mask.len())
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after).min(mask.len() - 1);
            mask[lo..=hi].iter().any(|b| *b)
        })
        .collect()
}

#[cfg(feature = "parallel")]
mod parallel {
    use super::*;
    use rayon::prelude::*;

    impl<F: Float> ZScale<F> {
        /// Like [`normalize`](ZScale::normalize()), sanitizing and inverting the image in parallel.
        pub fn normalize_par(
            &self,
            grid: ArrayView2<F>,
            invert: bool,
        ) -> Result<Normalized<F>, Error> {
            let mut data = grid.to_owned();
            data.par_mapv_inplace(|v| if v.is_finite() { v } else { F::zero() });
            let range = self.range_of_finite(data.view())?;
            if invert {
                data.par_mapv_inplace(|v| range.invert_value(v));
            }
            Ok(Normalized {
                data,
                range,
                inverted: invert,
            })
        }

        /// Display ranges of a batch of independent images, computed in parallel.
        pub fn compute_ranges_par(
            &self,
            grids: &[ArrayView2<F>],
        ) -> Vec<Result<DisplayRange<F>, Error>> {
            grids
                .par_iter()
                .map(|grid| self.compute_range(grid.view()))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};
    use ndarray_rand::{
        RandomExt,
        rand_distr::{Normal, Uniform},
    };

    use super::*;

    #[test]
    fn uniform_field() {
        let grid = Array2::from_elem((64, 64), 100.);
        let zscale = ZScale::new();

        assert_eq!(zscale.limits(grid.view()).unwrap(), (100., 100.));

        let range = zscale.compute_range(grid.view()).unwrap();
        assert_eq!(range.vmin(), 100.);
        assert_abs_diff_eq!(range.width(), DEGENERATE_RANGE_EPSILON, epsilon = 1e-12);
    }

    #[test]
    fn constant_fields() {
        let values = [-1e6, -5., 0., 0.1, 5., 100., 1e3, 12345.678, 1e15];

        for size in [3, 10, 32, 64] {
            for value in values {
                let grid = Array2::from_elem((size, size), value);
                let zscale = ZScale::new();

                assert_eq!(zscale.limits(grid.view()).unwrap(), (value, value));

                let range = zscale.compute_range(grid.view()).unwrap();
                assert_eq!(range.vmin(), value);
                assert!(!range.is_degenerate());
            }
        }

        let range = ZScale::new()
            .compute_range(Array2::from_elem((10, 10), 100.).view())
            .unwrap();
        assert_abs_diff_eq!(range.width(), DEGENERATE_RANGE_EPSILON, epsilon = 1e-12);
    }

    #[test]
    fn only_invalid_samples() {
        let grid = Array2::from_elem((16, 16), f64::NAN);
        let range = ZScale::new().compute_range(grid.view()).unwrap();

        assert_eq!(range.vmin(), 0.);
        assert_abs_diff_eq!(range.width(), DEGENERATE_RANGE_EPSILON, epsilon = 1e-15);
        assert!(range.stretch(0.).is_ok());
    }

    #[test]
    fn huge_constant_is_still_widened() {
        let grid = Array2::from_elem((8, 8), 1e15);
        let range = ZScale::new().compute_range(grid.view()).unwrap();

        assert!(!range.is_degenerate());
    }

    #[test]
    fn input_is_not_modified() {
        let grid = array![[1., f64::NAN], [3., 4.]];
        let normalized = ZScale::new().normalize(grid.view(), true).unwrap();

        assert!(grid[[0, 1]].is_nan());
        assert!(normalized.data.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn small_grid_uses_min_max() {
        let grid = array![[1., 2.], [3., 40.]];
        assert_eq!(ZScale::new().limits(grid.view()).unwrap(), (1., 40.));
    }

    #[test]
    fn ramp() {
        let grid = Array2::from_shape_fn((10, 10), |(y, x)| (10 * y + x) as f64);

        let (vmin, vmax) = ZScale::new().limits(grid.view()).unwrap();
        assert_abs_diff_eq!(vmin, 0.);
        assert_abs_diff_eq!(vmax, 99.);

        // Without the contrast boost the range is median -/+ slope times half the samples.
        let (vmin, vmax) = ZScale::new()
            .with_contrast(1.)
            .limits(grid.view())
            .unwrap();
        assert_abs_diff_eq!(vmin, 1.5, epsilon = 1e-6);
        assert_abs_diff_eq!(vmax, 99.);
    }

    #[test]
    fn rejects_hot_pixels() {
        let mut grid = Array2::random((200, 200), Normal::new(100., 5.).unwrap());
        for i in 0..40 {
            grid[[i * 5, i * 3]] = 1e5;
        }

        let range = ZScale::new().compute_range(grid.view()).unwrap();
        assert!(range.vmin() > 50. && range.vmin() < 100.);
        assert!(range.vmax() > 100. && range.vmax() < 150.);
    }

    #[test]
    fn double_inversion() {
        let grid = Array2::random((32, 48), Uniform::new(-50., 1000.));
        let normalized = ZScale::new().normalize(grid.view(), true).unwrap();
        let restored = normalized.range.invert(normalized.data.view());

        assert!(normalized.inverted);
        assert_abs_diff_eq!(restored, grid, epsilon = 1e-9);
    }

    #[test]
    fn inversion_reflects_about_range() {
        let range = DisplayRange::new(10., 30.).unwrap();

        assert_eq!(range.invert_value(10.), 30.);
        assert_eq!(range.invert_value(20.), 20.);
        assert_eq!(range.invert_value(45.), -5.);
    }

    #[test]
    fn stretch() {
        let range = DisplayRange::new(10., 30.).unwrap();
        assert_eq!(range.stretch(20.).unwrap(), 0.5);
        assert_eq!(range.stretch(-100.).unwrap(), 0.);
        assert_eq!(range.stretch(100.).unwrap(), 1.);

        let grid = array![[10., 15.], [30., 40.]];
        assert_eq!(
            range.stretch_grid(grid.view()).unwrap(),
            array![[0., 0.25], [1., 1.]]
        );

        let collapsed = DisplayRange::new(5., 5.).unwrap();
        assert_eq!(
            collapsed.stretch(5.),
            Err(Error::NormalizationDegenerate { value: 5. })
        );
        assert!(collapsed.widened().stretch(5.).is_ok());
    }

    #[test]
    fn invalid_range() {
        assert!(matches!(
            DisplayRange::new(2., 1.),
            Err(Error::InvalidInput(_))
        ));
        assert!(DisplayRange::new(f64::NAN, 1.).is_err());
    }

    #[test]
    fn empty_grid() {
        let grid = Array2::<f64>::zeros((0, 5));
        assert!(matches!(
            ZScale::new().compute_range(grid.view()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn invalid_configuration() {
        let grid = Array2::<f64>::zeros((4, 4));
        assert!(ZScale::new().with_n_samples(0).limits(grid.view()).is_err());
        assert!(ZScale::new().with_sigma_clip(0.).limits(grid.view()).is_err());
        assert!(ZScale::new().with_max_reject(1.5).limits(grid.view()).is_err());
    }

    #[test]
    fn dilate() {
        let mask = [false, false, false, true, false, false, false];
        assert_eq!(super::dilate(&mask, 1), mask.to_vec());
        assert_eq!(
            super::dilate(&mask, 3),
            vec![false, false, true, true, true, false, false]
        );
        assert_eq!(
            super::dilate(&mask, 4),
            vec![false, false, true, true, true, true, false]
        );
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_matches_serial() {
        let grid = Array2::random((64, 64), Normal::new(0., 1.).unwrap());
        let zscale = ZScale::new();

        let serial = zscale.normalize(grid.view(), true).unwrap();
        let parallel = zscale.normalize_par(grid.view(), true).unwrap();
        assert_eq!(serial, parallel);

        let ranges = zscale.compute_ranges_par(&[grid.view(), grid.view()]);
        assert_eq!(ranges, vec![Ok(serial.range), Ok(serial.range)]);
    }
}
