//! Builds the time-dependent state of a spherical domain from option blocks.
//!
//! - [`options`]: one option block per map family (shape, rotation,
//!   expansion, translation), each either hard-coded or seeded from a
//!   [`VolumeFile`](options::VolumeFile) written by an earlier run
//! - [`TimeDependentMapOptions`]: combines the families, builds their
//!   initial [`FunctionsOfTime`](chronomap_core::FunctionsOfTime), and hands
//!   out the coordinate map for each block of the sphere

mod error;
pub mod options;
pub mod sphere;

#[cfg(test)]
mod testing;

pub use error::OptionsError;
pub use sphere::TimeDependentMapOptions;
