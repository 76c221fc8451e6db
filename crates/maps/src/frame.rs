//! Coordinate frames that maps connect.

use std::fmt::Debug;

/// A named coordinate frame.
///
/// Frames are zero-sized markers: they exist only so that the type system can
/// keep grid points out of functions that expect inertial ones.
pub trait Frame: Debug + Clone + Copy + PartialEq + Eq + Send + Sync + 'static {
    const NAME: &'static str;
}

/// The computational frame in which the domain blocks are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Grid;

/// An intermediate frame that carries shape deformations only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Distorted;

/// The physical frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Inertial;

impl Frame for Grid {
    const NAME: &'static str = "Grid";
}

impl Frame for Distorted {
    const NAME: &'static str = "Distorted";
}

impl Frame for Inertial {
    const NAME: &'static str = "Inertial";
}
