//! Pixel <-> sky coordinate transforms.
//!
//! The overlay only needs the [`CoordinateTransform`] trait. [`Wcs`] is a simple
//! implementation of the World Coordinate System standard covering linear plates
//! and the gnomonic (`TAN`) projection used by most survey images.

use nalgebra::{Matrix2, Vector2};

use crate::geometry::{Degrees, wrap_degrees, wrap_offset};
use crate::{Error, Float, cast, to_f64};

/// A position on the sky in degrees.
///
/// Right ascension is normalized to `[0, 360)`, declination lies in `[-90, 90]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldPoint<F: Float> {
    ra: F,
    dec: F,
}

impl<F: Float> WorldPoint<F> {
    /// Create a new point, wrapping `ra` into `[0, 360)`.
    ///
    /// Fails with [`Error::TransformFailure`] for non-finite values or a declination beyond a pole.
    pub fn new(ra: F, dec: F) -> Result<Self, Error> {
        if !ra.is_finite() || !dec.is_finite() {
            return Err(Error::TransformFailure(format!(
                "non-finite sky position ({}, {})",
                to_f64(ra),
                to_f64(dec)
            )));
        }
        if dec.abs() > cast::<F>(90.) {
            return Err(Error::TransformFailure(format!(
                "declination {} outside [-90, 90]",
                to_f64(dec)
            )));
        }
        Ok(Self {
            ra: wrap_degrees(ra),
            dec,
        })
    }

    /// Right ascension in degrees.
    pub fn ra(&self) -> F {
        self.ra
    }

    /// Declination in degrees.
    pub fn dec(&self) -> F {
        self.dec
    }
}

/// Bidirectional mapping between pixel and sky coordinates.
///
/// Pixel coordinates are zero-based `(x, y)`, with `x` along columns and `y` along rows.
pub trait CoordinateTransform<F: Float> {
    /// Transform from pixel to sky coordinates.
    fn pixel_to_world(&self, pixel: Vector2<F>) -> Result<WorldPoint<F>, Error>;

    /// Transform from sky to pixel coordinates.
    fn world_to_pixel(&self, world: WorldPoint<F>) -> Result<Vector2<F>, Error>;

    /// Image shape `(height, width)` the transform was declared for, if known.
    fn extent(&self) -> Option<(usize, usize)> {
        None
    }
}

impl<F: Float, T: CoordinateTransform<F> + ?Sized> CoordinateTransform<F> for &T {
    fn pixel_to_world(&self, pixel: Vector2<F>) -> Result<WorldPoint<F>, Error> {
        (**self).pixel_to_world(pixel)
    }

    fn world_to_pixel(&self, world: WorldPoint<F>) -> Result<Vector2<F>, Error> {
        (**self).world_to_pixel(world)
    }

    fn extent(&self) -> Option<(usize, usize)> {
        (**self).extent()
    }
}

/// Sky projection of a [`Wcs`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Projection {
    /// Intermediate world coordinates are taken directly as `(ra, dec)` offsets.
    #[default]
    Linear,
    /// Gnomonic (`TAN`) projection about `crval`.
    Gnomonic,
}

/// Relevant data for WCS transformations from FITS headers.
#[derive(Clone, Debug, PartialEq)]
pub struct Wcs<F: Float> {
    /// Reference pixel, one-based as in FITS headers.
    pub crpix: Vector2<F>,
    /// Coordinate value at `crpix` in degrees.
    pub crval: Vector2<F>,
    /// Linear transformation matrix in degrees per pixel.
    pub cd: Matrix2<F>,
    /// Projection from intermediate world coordinates to the sky.
    pub projection: Projection,
    /// Image shape `(height, width)`, i.e. `(NAXIS2, NAXIS1)`.
    pub naxis: Option<(usize, usize)>,
}

impl<F: Float> Wcs<F> {
    /// Create a new linear instance.
    pub fn new(crpix: Vector2<F>, crval: Vector2<F>, cd: Matrix2<F>) -> Self {
        Self {
            crpix,
            crval,
            cd,
            projection: Projection::Linear,
            naxis: None,
        }
    }

    /// Set the projection.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    /// Declare the image shape `(height, width)` this solution belongs to.
    pub fn with_naxis(mut self, height: usize, width: usize) -> Self {
        self.naxis = Some((height, width));
        self
    }

    fn cd_inverse(&self) -> Result<Matrix2<F>, Error> {
        self.cd.try_inverse().ok_or_else(|| {
            Error::TransformFailure(format!(
                "singular CD matrix (determinant {:e})",
                to_f64(self.cd.determinant())
            ))
        })
    }

    /// Intermediate world coordinates in degrees of a zero-based pixel.
    fn intermediate(&self, pixel: Vector2<F>) -> Vector2<F> {
        let pixel = pixel + Vector2::new(F::one(), F::one());
        self.cd * (pixel - self.crpix)
    }

    fn pixel_of_intermediate(&self, iwc: Vector2<F>) -> Result<Vector2<F>, Error> {
        let pixel = self.crpix + self.cd_inverse()? * iwc;
        Ok(pixel - Vector2::new(F::one(), F::one()))
    }
}

impl<F: Float> CoordinateTransform<F> for Wcs<F> {
    fn pixel_to_world(&self, pixel: Vector2<F>) -> Result<WorldPoint<F>, Error> {
        let iwc = self.intermediate(pixel);
        match self.projection {
            Projection::Linear => WorldPoint::new(self.crval.x + iwc.x, self.crval.y + iwc.y),
            Projection::Gnomonic => {
                let (xi, eta) = (iwc.x.to_radians(), iwc.y.to_radians());
                let (ra0, dec0) = (self.crval.x.to_radians(), self.crval.y.to_radians());

                let denom = dec0.cos() - eta * dec0.sin();
                let ra = ra0 + xi.atan2(denom);
                let dec = (dec0.sin() + eta * dec0.cos()).atan2((xi * xi + denom * denom).sqrt());
                WorldPoint::new(ra.to_degrees(), dec.to_degrees())
            }
        }
    }

    fn world_to_pixel(&self, world: WorldPoint<F>) -> Result<Vector2<F>, Error> {
        let iwc = match self.projection {
            Projection::Linear => Vector2::new(
                wrap_offset(world.ra() - self.crval.x),
                world.dec() - self.crval.y,
            ),
            Projection::Gnomonic => {
                let (ra, dec) = (world.ra().to_radians(), world.dec().to_radians());
                let (ra0, dec0) = (self.crval.x.to_radians(), self.crval.y.to_radians());
                let dra = ra - ra0;

                let cos_c = dec0.sin() * dec.sin() + dec0.cos() * dec.cos() * dra.cos();
                if cos_c <= F::zero() {
                    return Err(Error::TransformFailure(format!(
                        "({}, {}) lies behind the tangent plane",
                        to_f64(world.ra()),
                        to_f64(world.dec())
                    )));
                }
                let xi = dec.cos() * dra.sin() / cos_c;
                let eta = (dec0.cos() * dec.sin() - dec0.sin() * dec.cos() * dra.cos()) / cos_c;
                Vector2::new(xi.to_degrees(), eta.to_degrees())
            }
        };
        self.pixel_of_intermediate(iwc)
    }

    fn extent(&self) -> Option<(usize, usize)> {
        self.naxis
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rand::Rng;

    use super::*;

    fn survey_plate() -> Wcs<f64> {
        Wcs {
            crval: Vector2::new(2.711529441199E+01, -3.925398447545E+01),
            crpix: Vector2::new(5.065191000000E+02, 4.892484000000E+02),
            cd: Matrix2::new(
                1.672682044534E-04,
                1.996643749806E-06,
                -9.963899403011E-08,
                1.729743106508E-04,
            ),
            projection: Projection::Gnomonic,
            naxis: Some((1000, 1000)),
        }
    }

    #[test]
    fn world_point_normalization() {
        let p = WorldPoint::new(-10., 45.).unwrap();
        assert_abs_diff_eq!(p.ra(), 350.);
        assert_abs_diff_eq!(p.dec(), 45.);

        assert!(matches!(
            WorldPoint::new(10., 90.5),
            Err(Error::TransformFailure(_))
        ));
        assert!(WorldPoint::new(f64::NAN, 0.).is_err());
    }

    #[test]
    fn linear_plate() {
        let wcs = Wcs::new(
            Vector2::new(1., 1.),
            Vector2::new(0., 0.),
            Matrix2::new(0.01, 0., 0., 0.01),
        );

        let world = wcs.pixel_to_world(Vector2::new(50., 60.)).unwrap();
        assert_abs_diff_eq!(world.ra(), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(world.dec(), 0.6, epsilon = 1e-12);

        let pixel = wcs.world_to_pixel(world).unwrap();
        assert_abs_diff_eq!(pixel, Vector2::new(50., 60.), epsilon = 1e-9);
    }

    #[test]
    fn linear_plate_across_zero() {
        let wcs = Wcs::new(
            Vector2::new(51., 51.),
            Vector2::new(0., 10.),
            Matrix2::new(-0.01, 0., 0., 0.01),
        );

        // Columns right of the reference pixel have RA just below 360.
        let world = wcs.pixel_to_world(Vector2::new(60., 50.)).unwrap();
        assert_abs_diff_eq!(world.ra(), 359.9, epsilon = 1e-9);

        let pixel = wcs.world_to_pixel(world).unwrap();
        assert_abs_diff_eq!(pixel, Vector2::new(60., 50.), epsilon = 1e-6);
    }

    #[test]
    fn gnomonic_reference_pixel() {
        let wcs = survey_plate();
        let crpix0 = wcs.crpix - Vector2::new(1., 1.);

        let world = wcs.pixel_to_world(crpix0).unwrap();
        assert_abs_diff_eq!(world.ra(), wcs.crval.x, epsilon = 1e-10);
        assert_abs_diff_eq!(world.dec(), wcs.crval.y, epsilon = 1e-10);
    }

    #[test]
    fn consistency_check() {
        let mut rng = rand::rng();
        let wcs = survey_plate();

        for _ in 0..20 {
            let pixel = Vector2::new(rng.random_range(0.0..1000.0), rng.random_range(0.0..1000.0));
            let wc = wcs.pixel_to_world(pixel).unwrap();
            let px = wcs.world_to_pixel(wc).unwrap();

            assert_abs_diff_eq!(px, pixel, epsilon = 1e-6);
        }
    }

    #[test]
    fn behind_tangent_plane() {
        let wcs = survey_plate();
        let antipode = WorldPoint::new(wcs.crval.x + 180., -wcs.crval.y).unwrap();

        assert!(matches!(
            wcs.world_to_pixel(antipode),
            Err(Error::TransformFailure(_))
        ));
    }

    #[test]
    fn singular_cd() {
        let wcs = Wcs::new(
            Vector2::new(1., 1.),
            Vector2::new(10., 10.),
            Matrix2::new(0.01, 0.02, 0.01, 0.02),
        );
        let world = WorldPoint::new(10., 10.).unwrap();

        assert!(matches!(
            wcs.world_to_pixel(world),
            Err(Error::TransformFailure(_))
        ));
    }

    #[test]
    fn declared_extent() {
        assert_eq!(survey_plate().extent(), Some((1000, 1000)));
        assert_eq!(
            Wcs::new(Vector2::new(1., 1.), Vector2::zeros(), Matrix2::identity()).extent(),
            None
        );
    }
}
