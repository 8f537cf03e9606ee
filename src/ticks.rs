//! Tick placement for the coordinate grid.
//!
//! The planner only decides which right ascension and declination values get a grid line and
//! where each value crosses the middle of the image. Compression of RA lines near the poles and
//! label formatting are left to the renderer.

use itertools::Itertools;
use log::debug;
use nalgebra::Vector2;

use crate::geometry::{covering_arc, linspace, wrap_degrees};
use crate::ndarray_utils::min_max;
use crate::wcs::{CoordinateTransform, WorldPoint};
use crate::{Error, Float, cast, to_f64};

/// Default number of ticks per axis.
pub const DEFAULT_TICK_COUNT: usize = 6;

/// Coordinate axis of a [`Tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Longitude-like axis, wraps at 360°.
    RightAscension,
    /// Latitude-like axis.
    Declination,
}

/// A single grid value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tick<F: Float> {
    /// Axis the value belongs to.
    pub axis: Axis,
    /// World coordinate value in degrees. Right ascension is normalized to `[0, 360)`.
    pub value: F,
    /// Pixel position of the value at the middle of the other axis' extent.
    pub pixel: Vector2<F>,
}

/// Ticks of both axes, each ordered along increasing world coordinate.
#[derive(Clone, Debug, PartialEq)]
pub struct TickPlan<F: Float> {
    ticks: Vec<Tick<F>>,
    ra_span: (F, F),
    dec_span: (F, F),
}

impl<F: Float> TickPlan<F> {
    /// All ticks, right ascension first.
    pub fn ticks(&self) -> &[Tick<F>] {
        &self.ticks
    }

    /// Ticks of a single axis.
    pub fn axis(&self, axis: Axis) -> impl Iterator<Item = &Tick<F>> {
        self.ticks.iter().filter(move |t| t.axis == axis)
    }

    /// World values of a single axis.
    pub fn values(&self, axis: Axis) -> Vec<F> {
        self.axis(axis).map(|t| t.value).collect_vec()
    }

    /// Visible extent `(start, end)` of an axis in degrees.
    ///
    /// For right ascension `start` lies in `[0, 360)` and `end` may exceed 360 when the image
    /// straddles 0°.
    pub fn span(&self, axis: Axis) -> (F, F) {
        match axis {
            Axis::RightAscension => self.ra_span,
            Axis::Declination => self.dec_span,
        }
    }
}

/// Plans evenly spaced grid values over the visible sky extent of an image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickPlanner {
    /// Number of ticks per axis.
    pub target_count: usize,
}

impl Default for TickPlanner {
    fn default() -> Self {
        Self {
            target_count: DEFAULT_TICK_COUNT,
        }
    }
}

impl TickPlanner {
    /// Create a new instance with [`DEFAULT_TICK_COUNT`] ticks per axis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of ticks per axis.
    pub fn with_target_count(mut self, target_count: usize) -> Self {
        self.target_count = target_count;
        self
    }

    /// Plan the ticks for an image of `shape` `(height, width)`.
    ///
    /// Returns exactly `target_count` ticks per axis, unless the extent of an axis is a single
    /// value, in which case that axis gets one tick.
    pub fn plan<F, T>(&self, transform: &T, shape: (usize, usize)) -> Result<TickPlan<F>, Error>
    where
        F: Float,
        T: CoordinateTransform<F> + ?Sized,
    {
        if self.target_count == 0 {
            return Err(Error::InvalidInput("target tick count must be positive".into()));
        }
        let (height, width) = shape;
        if height == 0 || width == 0 {
            return Err(Error::InvalidInput(format!("empty image shape {shape:?}")));
        }

        let (mut ra_span, mut dec_span) = visible_extent(transform, shape)?;
        let mut full_circle = false;
        for pole in [90., -90.] {
            if contains_pole(transform, shape, cast(pole)) {
                debug!("Celestial pole at dec {pole} lies inside the image.");
                full_circle = true;
                ra_span = (F::zero(), cast(360.));
                dec_span = (dec_span.0.min(cast(pole)), dec_span.1.max(cast(pole)));
            }
        }
        debug!(
            "Visible extent: ra [{}, {}], dec [{}, {}].",
            to_f64(ra_span.0),
            to_f64(ra_span.1),
            to_f64(dec_span.0),
            to_f64(dec_span.1)
        );

        let ra_values = if full_circle {
            let mut values = linspace(ra_span.0, ra_span.1, self.target_count + 1);
            values.pop();
            values
        } else {
            self.values(ra_span)
        };
        let dec_values = self.values(dec_span);

        let ra_mid = wrap_degrees((ra_span.0 + ra_span.1) / cast::<F>(2.));
        let dec_mid = (dec_span.0 + dec_span.1) / cast::<F>(2.);

        let mut ticks = Vec::with_capacity(ra_values.len() + dec_values.len());
        for value in ra_values {
            let world = WorldPoint::new(value, dec_mid)?;
            ticks.push(Tick {
                axis: Axis::RightAscension,
                value: world.ra(),
                pixel: transform.world_to_pixel(world)?,
            });
        }
        for value in dec_values {
            let world = WorldPoint::new(ra_mid, value)?;
            ticks.push(Tick {
                axis: Axis::Declination,
                value,
                pixel: transform.world_to_pixel(world)?,
            });
        }

        Ok(TickPlan {
            ticks,
            ra_span,
            dec_span,
        })
    }

    fn values<F: Float>(&self, (start, end): (F, F)) -> Vec<F> {
        if end <= start {
            vec![start]
        } else {
            linspace(start, end, self.target_count)
        }
    }
}

/// Right ascension arc and declination range covered by the four image corners.
fn visible_extent<F, T>(transform: &T, shape: (usize, usize)) -> Result<((F, F), (F, F)), Error>
where
    F: Float,
    T: CoordinateTransform<F> + ?Sized,
{
    let (height, width) = shape;
    let half = cast::<F>(0.5);
    let right = cast::<F>(width as f64) - half;
    let top = cast::<F>(height as f64) - half;

    let corners = [
        Vector2::new(-half, -half),
        Vector2::new(right, -half),
        Vector2::new(-half, top),
        Vector2::new(right, top),
    ]
    .into_iter()
    .map(|pixel| transform.pixel_to_world(pixel))
    .collect::<Result<Vec<_>, _>>()?;

    let ras = corners.iter().map(|w| w.ra()).collect_vec();
    let ra_span = covering_arc(&ras)
        .ok_or_else(|| Error::InvalidInput("image has no corners".into()))?;
    let dec_span = min_max(corners.iter().map(|w| w.dec()))
        .ok_or_else(|| Error::InvalidInput("image has no corners".into()))?;
    Ok((ra_span, dec_span))
}

/// Whether the celestial pole at declination `pole` projects inside the image.
///
/// A pole the transform cannot project is not visible.
fn contains_pole<F, T>(transform: &T, shape: (usize, usize), pole: F) -> bool
where
    F: Float,
    T: CoordinateTransform<F> + ?Sized,
{
    let (height, width) = shape;
    let half = cast::<F>(0.5);
    let Ok(pixel) = WorldPoint::new(F::zero(), pole).and_then(|p| transform.world_to_pixel(p))
    else {
        return false;
    };
    pixel.x >= -half
        && pixel.x <= cast::<F>(width as f64) - half
        && pixel.y >= -half
        && pixel.y <= cast::<F>(height as f64) - half
}
