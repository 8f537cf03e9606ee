use itertools::Itertools;
use nalgebra::Vector2;

use crate::{Float, cast};

/// Rotate `v` by 90° counterclockwise.
pub(crate) fn perpendicular<F: Float>(v: &Vector2<F>) -> Vector2<F> {
    Vector2::new(-v.y, v.x)
}

/// Wrap an angle in degrees into `[0, 360)`.
pub(crate) fn wrap_degrees<F: Float>(angle: F) -> F {
    let full = cast::<F>(360.);
    let wrapped = angle % full;
    let wrapped = if wrapped < F::zero() {
        wrapped + full
    } else {
        wrapped
    };
    // `-tiny + 360` rounds up to 360 itself
    if wrapped >= full { F::zero() } else { wrapped }
}

/// Wrap an angular difference in degrees into `[-180, 180)`.
pub(crate) fn wrap_offset<F: Float>(delta: F) -> F {
    let half = cast::<F>(180.);
    wrap_degrees(delta + half) - half
}

/// Smallest arc `(start, end)` in degrees covering every angle in `angles`.
///
/// `start` lies in `[0, 360)` and `end >= start`; `end` exceeds 360 when the arc crosses 0°.
pub(crate) fn covering_arc<F: Float>(angles: &[F]) -> Option<(F, F)> {
    let sorted = angles
        .iter()
        .map(|&a| wrap_degrees(a))
        .sorted_by(|a, b| a.partial_cmp(b).expect("found nan"))
        .collect_vec();
    let first = *sorted.first()?;
    let last = *sorted.last()?;

    // The arc is the complement of the largest gap between neighbours on the circle.
    let mut gap = first + cast::<F>(360.) - last;
    let mut arc = (first, last);
    for (a, b) in sorted.iter().tuple_windows() {
        if *b - *a > gap {
            gap = *b - *a;
            arc = (*b, *a + cast::<F>(360.));
        }
    }
    Some(arc)
}

/// Great circle distance in degrees between two `(ra, dec)` positions in degrees.
pub(crate) fn angular_separation<F: Float>(a: (F, F), b: (F, F)) -> F {
    let (ra1, dec1) = (a.0.to_radians(), a.1.to_radians());
    let (ra2, dec2) = (b.0.to_radians(), b.1.to_radians());
    let two = cast::<F>(2.);

    let hav = ((dec2 - dec1) / two).sin().powi(2)
        + dec1.cos() * dec2.cos() * ((ra2 - ra1) / two).sin().powi(2);
    (two * hav.sqrt().min(F::one()).asin()).to_degrees()
}

/// `steps` evenly spaced values from `start` to `end`, both included.
pub(crate) fn linspace<F: Float>(start: F, end: F, steps: usize) -> Vec<F> {
    match steps {
        0 => Vec::new(),
        1 => vec![(start + end) / cast::<F>(2.)],
        _ => {
            let step = (end - start) / cast::<F>((steps - 1) as f64);
            (0..steps)
                .map(|i| start + step * cast::<F>(i as f64))
                .collect()
        }
    }
}

/// Degree helpers missing from [`nalgebra::RealField`].
pub(crate) trait Degrees {
    fn to_radians(self) -> Self;
    fn to_degrees(self) -> Self;
}

impl<F: Float> Degrees for F {
    fn to_radians(self) -> Self {
        self * F::pi() / cast::<F>(180.)
    }

    fn to_degrees(self) -> Self {
        self * cast::<F>(180.) / F::pi()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::vector;

    use super::*;

    #[test]
    fn perpendicular() {
        assert_eq!(super::perpendicular(&vector![0., 1.]), vector![-1., 0.]);
        assert_eq!(super::perpendicular(&vector![1., 0.]), vector![0., 1.]);
    }

    #[test]
    fn wrap() {
        assert_abs_diff_eq!(wrap_degrees(370.), 10., epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_degrees(-10.), 350., epsilon = 1e-12);
        assert_eq!(wrap_degrees(360.), 0.);
        assert_eq!(wrap_degrees(-1e-20), 0.);
        assert_abs_diff_eq!(wrap_offset(350.), -10., epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_offset(-190.), 170., epsilon = 1e-12);
    }

    #[test]
    fn arc_without_wrap() {
        let (start, end) = covering_arc(&[10., 12., 11., 10.5]).unwrap();
        assert_abs_diff_eq!(start, 10.);
        assert_abs_diff_eq!(end, 12.);
    }

    #[test]
    fn arc_across_zero() {
        let (start, end) = covering_arc(&[359., 1., 358.5, 0.5]).unwrap();
        assert_abs_diff_eq!(start, 358.5);
        assert_abs_diff_eq!(end, 361.);
        assert!(covering_arc::<f64>(&[]).is_none());
    }

    #[test]
    fn separation() {
        assert_abs_diff_eq!(angular_separation((0., 0.), (0., 1.)), 1., epsilon = 1e-9);
        assert_abs_diff_eq!(angular_separation((10., 60.), (11., 60.)), 0.5, epsilon = 1e-4);
        assert_abs_diff_eq!(angular_separation((359.5, 0.), (0.5, 0.)), 1., epsilon = 1e-9);
    }

    #[test]
    fn linspace() {
        assert_eq!(super::linspace(0., 10., 6), vec![0., 2., 4., 6., 8., 10.]);
        assert_eq!(super::linspace(0., 10., 1), vec![5.]);
        assert!(super::linspace(0., 10., 0).is_empty());
    }
}
