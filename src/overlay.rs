//! Main interface tying normalization, compass and grid planning together.

use log::{info, warn};
use ndarray::ArrayView2;

use crate::orientation::{Orientation, OrientationCalculator};
use crate::ticks::{TickPlan, TickPlanner};
use crate::wcs::CoordinateTransform;
use crate::zscale::{DisplayRange, Normalized, ZScale};
use crate::{Error, Float};

/// Drawing backend consuming an [`OverlayPlan`].
///
/// Implementations own everything visual: colormaps, line styles, labels and file export.
pub trait Renderer<F: Float> {
    /// Error type of the backend.
    type Error;

    /// Draw the image with a linear stretch between the limits of `range`.
    fn draw_image(
        &mut self,
        data: ArrayView2<F>,
        range: &DisplayRange<F>,
    ) -> Result<(), Self::Error>;

    /// Draw the coordinate grid. Ticks that became visually degenerate may be skipped or merged.
    fn draw_ticks(&mut self, ticks: &TickPlan<F>) -> Result<(), Self::Error>;

    /// Draw the north/east compass.
    fn draw_compass(&mut self, orientation: &Orientation<F>) -> Result<(), Self::Error>;
}

/// Everything needed to draw the overlay.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayPlan<F: Float> {
    /// Sanitized, optionally inverted image and its display range.
    pub image: Normalized<F>,
    /// North and east at the image center. `None` if the transform is degenerate there.
    pub compass: Option<Orientation<F>>,
    /// Grid values of both axes.
    pub ticks: TickPlan<F>,
}

impl<F: Float> OverlayPlan<F> {
    /// Hand the plan to `renderer`: image first, then grid, then compass if there is one.
    pub fn render<R: Renderer<F>>(&self, renderer: &mut R) -> Result<(), R::Error> {
        renderer.draw_image(self.image.data.view(), &self.image.range)?;
        renderer.draw_ticks(&self.ticks)?;
        if let Some(compass) = &self.compass {
            renderer.draw_compass(compass)?;
        }
        Ok(())
    }
}

/// The central struct of this library.
///
/// Use this in order to plan an overlay. For more details, check the crate-level documentation.
#[derive(Clone, Debug)]
pub struct SkyOverlay<'a, F: Float, T: CoordinateTransform<F>> {
    /// Raw image of shape `(height, width)`.
    grid: ArrayView2<'a, F>,
    /// Pixel <-> sky mapping of `grid`.
    transform: T,
    /// Invert the image about its display range.
    invert: bool,
    zscale: ZScale<F>,
    orientation: OrientationCalculator<F>,
    ticks: TickPlanner,
}

impl<'a, F, T> SkyOverlay<'a, F, T>
where
    F: Float,
    T: CoordinateTransform<F>,
{
    /// Create a new instance using default options.
    /// Use `with_` functions to set parameters.
    pub fn new(grid: ArrayView2<'a, F>, transform: T) -> Self {
        Self {
            grid,
            transform,
            invert: false,
            zscale: ZScale::default(),
            orientation: OrientationCalculator::default(),
            ticks: TickPlanner::default(),
        }
    }

    /// Invert the image about its display range.
    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    /// Set the ZScale parameters.
    pub fn with_zscale(mut self, zscale: ZScale<F>) -> Self {
        self.zscale = zscale;
        self
    }

    /// Set the compass parameters.
    pub fn with_orientation(mut self, orientation: OrientationCalculator<F>) -> Self {
        self.orientation = orientation;
        self
    }

    /// Set the grid planner.
    pub fn with_tick_planner(mut self, ticks: TickPlanner) -> Self {
        self.ticks = ticks;
        self
    }

    /// Set the number of ticks per axis.
    pub fn with_tick_count(mut self, count: usize) -> Self {
        self.ticks.target_count = count;
        self
    }

    /// Compute the overlay.
    ///
    /// A degenerate orientation only drops the compass; every other error aborts.
    pub fn plan(&self) -> Result<OverlayPlan<F>, Error> {
        let shape = self.validate()?;

        info!("Normalizing {}x{} image.", shape.1, shape.0);
        let image = self.zscale.normalize(self.grid, self.invert)?;

        self.finish(image, shape)
    }

    fn finish(
        &self,
        image: Normalized<F>,
        shape: (usize, usize),
    ) -> Result<OverlayPlan<F>, Error> {
        info!("Computing compass.");
        let compass = match self.orientation.compute_at_center(&self.transform, shape) {
            Ok(orientation) => Some(orientation),
            Err(Error::OrientationDegenerate { length }) => {
                warn!("Skipping compass: probe vector collapsed to {length:.3e} px.");
                None
            }
            Err(e) => return Err(e),
        };

        info!("Planning grid ticks.");
        let ticks = self.ticks.plan(&self.transform, shape)?;

        Ok(OverlayPlan {
            image,
            compass,
            ticks,
        })
    }

    fn validate(&self) -> Result<(usize, usize), Error> {
        let shape = self.grid.dim();
        if self.grid.is_empty() {
            return Err(Error::InvalidInput(format!("empty image of shape {shape:?}")));
        }
        if let Some(extent) = self.transform.extent() {
            if extent != shape {
                return Err(Error::InvalidInput(format!(
                    "image shape {shape:?} does not match transform extent {extent:?}"
                )));
            }
        }
        Ok(shape)
    }
}

#[cfg(feature = "parallel")]
mod parallel {
    use super::*;

    impl<F, T> SkyOverlay<'_, F, T>
    where
        F: Float,
        T: CoordinateTransform<F>,
    {
        /// Compute the overlay, normalizing the image in parallel.
        ///
        /// Also see [`plan`](SkyOverlay::plan()) for more details.
        pub fn plan_par(&self) -> Result<OverlayPlan<F>, Error> {
            let shape = self.validate()?;

            info!("Normalizing {}x{} image in parallel.", shape.1, shape.0);
            let image = self.zscale.normalize_par(self.grid, self.invert)?;

            self.finish(image, shape)
        }
    }
}
