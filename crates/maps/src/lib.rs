//! Time-dependent coordinate maps between the grid, distorted, and inertial
//! frames.
//!
//! - [`ElementaryMap`]: one geometric transformation with its Jacobian,
//!   inverse Jacobian, and frame velocity, such as [`RotScaleTrans`],
//!   [`Shape`], or [`ArealRadius`]
//! - [`Chain`]: statically composes elementary maps by the chain rule
//! - [`CoordinateMap`]: tags a composition with its source and target
//!   [`Frame`]s, and [`CoordinateMapBase`] erases the stages for storage
//! - [`TransitionFunction`]: the radial falloff that confines a shape
//!   deformation to a shell
//!
//! Maps hold no time-dependent state. Every evaluation reads its parameters
//! from the [`FunctionsOfTime`](chronomap_core::FunctionsOfTime) passed in.

mod coordinate_map;
mod error;
mod frame;
pub mod map;
pub mod transition;
mod ylm;

#[cfg(test)]
mod testing;

pub use coordinate_map::{CoordinateMap, CoordinateMapBase, CoordsFrameVelocityJacobians};
pub use error::MapError;
pub use frame::{Distorted, Frame, Grid, Inertial};
pub use map::{
    ArealRadius, BlockRegion, Chain, ElementaryMap, Identity, RotScaleTrans, Shape, Translation,
};
pub use transition::{Axis, SphereTransition, TransitionFunction, Wedge};
pub use ylm::{Ylm, YlmValues};
