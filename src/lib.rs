#![warn(missing_docs)]

//! Numeric core for overlaying a celestial coordinate grid and a compass on astronomical images. \
//! Nothing here draws pixels or decodes files: the crate turns a raw intensity grid and a
//! pixel <-> sky transform into the numbers a renderer needs.
//!
//! ## Interface
//! The central struct of this library is [`SkyOverlay`]. It takes the image and its
//! [`CoordinateTransform`] (for instance a [`Wcs`]), and produces an [`OverlayPlan`]:
//! - the sanitized (and optionally inverted) image with its ZScale [`DisplayRange`],
//! - the north/east [`Orientation`] at the image center, if it can be determined,
//! - the [`TickPlan`] of right ascension and declination grid values.
//!
//! Parameters are set via `SkyOverlay::with_*()` functions.
//!
//! Example:
//! ```rust
//! # use nalgebra::{Matrix2, Vector2};
//! # use ndarray::Array2;
//! # use skygrid::{Projection, SkyOverlay, Wcs};
//! let wcs = Wcs::new(
//!     Vector2::new(64., 64.),
//!     Vector2::new(150., 2.),
//!     Matrix2::new(-2.8e-4, 0., 0., 2.8e-4),
//! )
//! .with_projection(Projection::Gnomonic);
//! let image = Array2::from_shape_fn((128, 128), |(y, x)| (x + y) as f64);
//!
//! let plan = SkyOverlay::new(image.view(), &wcs)
//!     .with_invert(true)
//!     .with_tick_count(6)
//!     .plan()
//!     .unwrap();
//! assert!(plan.compass.is_some());
//! ```
//!
//! Each component can also be used on its own:
//! - [`ZScale`]: robust display range, following the IRAF/astropy ZScale algorithm.
//! - [`OrientationCalculator`]: local north and east unit vectors in pixel space.
//! - [`TickPlanner`]: evenly spaced world coordinate values spanning the image.
//!
//! ## Parameters
//! ZScale exposes `sigma_clip` (outlier rejection threshold), `max_iterations` (convergence cap),
//! `min_samples` (below this, plain min/max is used) and `contrast` (range-widening multiplier),
//! plus the sample size `n_samples` and the rejection cap `max_reject`.
//!
//! ## Features
//! - `parallel` (default): rayon variants `ZScale::normalize_par()`, `ZScale::compute_ranges_par()`
//!   and `SkyOverlay::plan_par()`.

mod error;
pub(crate) mod geometry;
pub(crate) mod ndarray_utils;
pub mod orientation;
pub mod overlay;
pub mod ticks;
pub mod wcs;
pub mod zscale;

pub use error::Error;
pub use orientation::{
    Direction, Orientation, OrientationCalculator, OrientationVector, Parity, ProbeMode,
};
pub use overlay::{OverlayPlan, Renderer, SkyOverlay};
pub use ticks::{Axis, Tick, TickPlan, TickPlanner};
pub use wcs::{CoordinateTransform, Projection, Wcs, WorldPoint};
pub use zscale::{DisplayRange, Normalized, ZScale};

/// A generic float trait such that all computations are generic over `f32`/`f64`.
///
/// This trait is automatically implemented for all types implementing the supertraits.
/// Particularly, this includes `f32` and `f64`.
pub trait Float: Copy + Default + nalgebra::RealField {}

impl<F> Float for F where F: Copy + Default + nalgebra::RealField {}

/// Convert an `f64` constant into `F`.
pub(crate) fn cast<F: Float>(value: f64) -> F {
    nalgebra::convert(value)
}

/// Convert `F` back into `f64` for error reporting.
pub(crate) fn to_f64<F: Float>(value: F) -> f64 {
    value.to_subset().unwrap_or(f64::NAN)
}
