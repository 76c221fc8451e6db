use thiserror::Error;

/// Errors raised while evaluating, updating, or storing functions of time.
///
/// None of these are recoverable inside the mapping pipeline: a caller that
/// receives one is working with parameters that are not valid at the
/// requested time, or with a registry that does not match what it expects.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested time lies past the current expiration.
    #[error("Attempt to evaluate at time {time}, which is after the expiration time {expiration}")]
    ExpiredEvaluation { time: f64, expiration: f64 },

    /// The requested time lies before the earliest retained segment.
    #[error("Attempt to evaluate at time {time}, which is before the earliest valid time {start}")]
    BeforeStart { time: f64, start: f64 },

    /// More derivatives were requested than the function stores.
    #[error("requested {requested} derivatives but only {available} are available")]
    InsufficientDerivatives { requested: usize, available: usize },

    /// A quaternion derivative needs a higher angle derivative than is stored.
    #[error(
        "Need more angle derivs to compute the {ordinal} derivative of the quaternion. Currently only have {available}"
    )]
    InsufficientAngleDerivatives {
        ordinal: &'static str,
        available: usize,
    },

    /// An update took effect before the current expiration.
    #[error("update at time {time} is before the current expiration {expiration}")]
    UpdateBeforeExpiration { time: f64, expiration: f64 },

    /// The new expiration lies before the time of the update.
    #[error("expiration {expiration} must not be earlier than the update time {time}")]
    InvalidExpiration { time: f64, expiration: f64 },

    /// The function is closed-form and cannot be updated.
    #[error("{kind} cannot be updated")]
    NotUpdatable { kind: &'static str },

    /// A supplied vector has the wrong number of components.
    #[error("expected {expected} components, got {actual}")]
    WrongComponentCount { expected: usize, actual: usize },

    /// A supplied derivative list has the wrong length.
    #[error("expected {expected} derivative values, got {actual}")]
    WrongDerivativeCount { expected: usize, actual: usize },

    /// A quaternion that must have unit length does not.
    #[error("initial quaternion must be normalized, but its norm is {norm}")]
    NotNormalized { norm: f64 },

    /// A decay timescale must be positive.
    #[error("decay timescale must be positive, got {timescale}")]
    InvalidTimescale { timescale: f64 },

    /// The registry already holds a function with this name.
    #[error("a function of time named `{name}` is already registered")]
    DuplicateName { name: String },

    /// The registry holds no function with this name.
    #[error("no function of time named `{name}`")]
    MissingFunction { name: String },

    /// The registered function is not of the expected concrete type.
    #[error("function of time `{name}` is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    /// The function type has no serialized representation.
    #[error("function of time `{name}` has no serialized form")]
    Unserializable { name: String },

    /// A decoded function breaks an invariant its constructor enforces.
    #[error("malformed {kind}: {reason}")]
    Malformed { kind: &'static str, reason: String },

    /// Encoding or decoding a registry blob failed.
    #[error("failed to serialize functions of time")]
    Serialization(#[from] bincode::Error),

    /// A cache key lies outside the declared key ranges.
    #[error("cache key {key} is outside the cached range")]
    InvalidCacheKey { key: String },
}
