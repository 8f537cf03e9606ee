//! Local north and east directions in pixel space.
//!
//! The calculator probes the transform a few pixels away from a reference point and turns the
//! reprojected offset into a unit vector pointing north. East is obtained by rotating north
//! by 90° counterclockwise in pixel space. Whether that matches the true east on the sky
//! depends on the handedness of the image, which is reported separately as [`Parity`].

use log::debug;
use nalgebra::Vector2;

use crate::geometry::{Degrees, angular_separation, perpendicular, wrap_offset};
use crate::wcs::{CoordinateTransform, WorldPoint};
use crate::{Error, Float, cast, to_f64};

/// Default probe distance in pixels.
pub const DEFAULT_PROBE_OFFSET: f64 = 10.;
/// Default compass position in pixels.
pub const DEFAULT_COMPASS_BASE: [f64; 2] = [50., 50.];
/// Default compass arrow length in pixels.
pub const DEFAULT_ARROW_LENGTH: f64 = 40.;

/// Probe vectors shorter than this fraction of the probe offset count as degenerate.
const DEGENERATE_FRACTION: f64 = 1e-9;

/// Compass direction of an [`OrientationVector`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Increasing declination.
    North,
    /// Increasing right ascension.
    East,
}

/// Unit vector in pixel space tagged with the direction it points to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientationVector<F: Float> {
    /// Which way this vector points on the sky.
    pub direction: Direction,
    /// Unit length direction in pixel space.
    pub vector: Vector2<F>,
}

/// Handedness of the pixel to sky mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parity {
    /// East lies counterclockwise from north in pixel space, as on the sky seen from Earth.
    Sky,
    /// The image is mirrored: east lies clockwise from north.
    Mirrored,
}

/// How the north direction is probed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProbeMode {
    /// Step along the pixel rows, map to the sky and back.
    #[default]
    PixelRow,
    /// Step towards increasing declination on the sky and map to pixels.
    Declination,
}

/// North and east at a reference pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Orientation<F: Float> {
    /// Pixel the orientation was probed at.
    pub reference: Vector2<F>,
    /// Unit vector pointing north.
    pub north: OrientationVector<F>,
    /// Unit vector pointing east, `north` rotated by 90° counterclockwise.
    pub east: OrientationVector<F>,
    /// Handedness of the transform at `reference`. `None` if the column probe does not resolve
    /// a direction independent of north.
    pub parity: Option<Parity>,
}

/// End points of the two compass arrows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompassArrows<F: Float> {
    /// Common start of both arrows.
    pub base: Vector2<F>,
    /// Tip of the north arrow.
    pub north_tip: Vector2<F>,
    /// Tip of the east arrow.
    pub east_tip: Vector2<F>,
}

impl<F: Float> Orientation<F> {
    /// Compass arrows of `length` pixels starting at `base`.
    pub fn arrows(&self, base: Vector2<F>, length: F) -> CompassArrows<F> {
        CompassArrows {
            base,
            north_tip: base + self.north.vector * length,
            east_tip: base + self.east.vector * length,
        }
    }

    /// Compass arrows at the default position and size.
    pub fn default_arrows(&self) -> CompassArrows<F> {
        self.arrows(
            Vector2::new(cast(DEFAULT_COMPASS_BASE[0]), cast(DEFAULT_COMPASS_BASE[1])),
            cast(DEFAULT_ARROW_LENGTH),
        )
    }
}

/// Derives north and east unit vectors from a [`CoordinateTransform`].
#[derive(Clone, Debug, PartialEq)]
pub struct OrientationCalculator<F: Float> {
    /// Distance in pixels between the reference point and the probe.
    ///
    /// Must be small compared to the scale on which the projection bends, but large enough to
    /// avoid cancellation.
    pub probe_offset: F,
    /// How the north direction is probed.
    pub mode: ProbeMode,
}

impl<F: Float> Default for OrientationCalculator<F> {
    fn default() -> Self {
        Self {
            probe_offset: cast(DEFAULT_PROBE_OFFSET),
            mode: ProbeMode::default(),
        }
    }
}

impl<F: Float> OrientationCalculator<F> {
    /// Create a new instance using default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the probe distance in pixels.
    pub fn with_probe_offset(mut self, probe_offset: F) -> Self {
        self.probe_offset = probe_offset;
        self
    }

    /// Set the probe mode.
    pub fn with_mode(mut self, mode: ProbeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Orientation at the center `(width / 2, height / 2)` of an image of shape `(height, width)`.
    pub fn compute_at_center<T>(
        &self,
        transform: &T,
        shape: (usize, usize),
    ) -> Result<Orientation<F>, Error>
    where
        T: CoordinateTransform<F> + ?Sized,
    {
        let (height, width) = shape;
        let center = Vector2::new(cast::<F>(width as f64 / 2.), cast::<F>(height as f64 / 2.));
        self.compute(transform, center, shape)
    }

    /// Orientation at `reference` inside an image of `shape` `(height, width)`.
    ///
    /// # Errors
    /// - [`Error::InvalidInput`] for an empty shape, a non-positive probe offset or a reference
    ///   outside the image.
    /// - [`Error::TransformFailure`] if the transform cannot map a probe point.
    /// - [`Error::OrientationDegenerate`] if the probe collapses to (nearly) a single pixel.
    pub fn compute<T>(
        &self,
        transform: &T,
        reference: Vector2<F>,
        shape: (usize, usize),
    ) -> Result<Orientation<F>, Error>
    where
        T: CoordinateTransform<F> + ?Sized,
    {
        self.validate(reference, shape)?;

        let center_world = transform.pixel_to_world(reference)?;
        let center_pixel = transform.world_to_pixel(center_world)?;
        let row_probe_world =
            transform.pixel_to_world(reference + Vector2::new(F::zero(), self.probe_offset))?;

        let raw_north = match self.mode {
            ProbeMode::PixelRow => transform.world_to_pixel(row_probe_world)? - center_pixel,
            ProbeMode::Declination => {
                // A zero step lands on the center again and fails the length check below.
                let step = angular_separation(
                    (center_world.ra(), center_world.dec()),
                    (row_probe_world.ra(), row_probe_world.dec()),
                );
                // Step south instead when the probe would cross the north pole.
                let (dec, sign) = if center_world.dec() + step <= cast::<F>(90.) {
                    (center_world.dec() + step, F::one())
                } else {
                    (center_world.dec() - step, -F::one())
                };
                let probe = WorldPoint::new(center_world.ra(), dec)?;
                (transform.world_to_pixel(probe)? - center_pixel) * sign
            }
        };

        let length = raw_north.norm();
        self.check_length(length)?;
        let north = raw_north / length;
        let east = perpendicular(&north);

        let parity = self.parity(transform, reference, center_world, row_probe_world);
        debug!(
            "North at ({}, {}) points along ({:.4}, {:.4}), parity {:?}.",
            to_f64(reference.x),
            to_f64(reference.y),
            to_f64(north.x),
            to_f64(north.y),
            parity
        );

        Ok(Orientation {
            reference,
            north: OrientationVector {
                direction: Direction::North,
                vector: north,
            },
            east: OrientationVector {
                direction: Direction::East,
                vector: east,
            },
            parity,
        })
    }

    fn validate(&self, reference: Vector2<F>, shape: (usize, usize)) -> Result<(), Error> {
        let (height, width) = shape;
        if height == 0 || width == 0 {
            return Err(Error::InvalidInput(format!("empty image shape {shape:?}")));
        }
        if !self.probe_offset.is_finite() || self.probe_offset <= F::zero() {
            return Err(Error::InvalidInput(format!(
                "probe offset must be positive, got {}",
                to_f64(self.probe_offset)
            )));
        }
        let half = cast::<F>(0.5);
        let inside =
            |v: F, n: usize| v.is_finite() && v >= -half && v <= cast::<F>(n as f64) - half;
        if !inside(reference.x, width) || !inside(reference.y, height) {
            return Err(Error::InvalidInput(format!(
                "reference pixel ({}, {}) outside image of shape {:?}",
                to_f64(reference.x),
                to_f64(reference.y),
                shape
            )));
        }
        Ok(())
    }

    fn check_length(&self, length: F) -> Result<(), Error> {
        if !length.is_finite() || length <= self.probe_offset * cast::<F>(DEGENERATE_FRACTION) {
            return Err(Error::OrientationDegenerate {
                length: to_f64(length),
            });
        }
        Ok(())
    }

    /// Sign of the Jacobian of pixel -> (ra cos dec, dec) at `reference`.
    ///
    /// Only reported alongside a valid north vector, so it never fails the whole computation.
    fn parity<T>(
        &self,
        transform: &T,
        reference: Vector2<F>,
        center: WorldPoint<F>,
        row_probe: WorldPoint<F>,
    ) -> Option<Parity>
    where
        T: CoordinateTransform<F> + ?Sized,
    {
        let column_probe = transform
            .pixel_to_world(reference + Vector2::new(self.probe_offset, F::zero()))
            .ok()?;
        let cos_dec = center.dec().to_radians().cos();
        let offset = |p: WorldPoint<F>| {
            Vector2::new(
                wrap_offset(p.ra() - center.ra()) * cos_dec,
                p.dec() - center.dec(),
            )
        };
        let d_column = offset(column_probe);
        let d_row = offset(row_probe);

        let det = d_column.x * d_row.y - d_row.x * d_column.y;
        if !det.is_finite() || det == F::zero() {
            debug!("Column probe is parallel to north, parity undetermined.");
            return None;
        }
        Some(if det < F::zero() {
            Parity::Sky
        } else {
            Parity::Mirrored
        })
    }
}
