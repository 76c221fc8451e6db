//! Core types for the chronomap coordinate-mapping pipeline.
//!
//! This crate holds the time-dependent state that coordinate maps consume:
//!
//! - [`FunctionOfTime`]: a named parameter with stored derivatives and a
//!   bounded validity window, with concrete variants such as
//!   [`PiecewisePolynomial`] and [`QuaternionFunctionOfTime`]
//! - [`FunctionsOfTime`]: the name-ordered registry passed into every map
//!   evaluation, serializable to a binary blob
//! - [`StaticCache`]: a lazily populated cache keyed by small integer ranges
//!   and enumerations

mod error;
mod function_of_time;
mod registry;
mod static_cache;

pub use error::Error;
pub use function_of_time::{
    FixedSpeedCubic, FunctionOfTime, IntegratedFunctionOfTime, PiecewisePolynomial,
    QuaternionFunctionOfTime, SettleToConstant, SettleToConstantQuaternion,
};
pub use registry::{FunctionsOfTime, StoredFunctionOfTime};
pub use static_cache::{CacheEnumeration, CacheKey, CacheRange, StaticCache};
