//! Error taxonomy for the crate: config-time errors from JSON parsing, and
//! state errors from misuse of a `Session`. Shape errors (mismatched tensor
//! shapes, out-of-range indices) are programming bugs and are raised as
//! panics inside `Volume` rather than threaded through `Result` — see
//! `DESIGN.md`.

use std::io;

/// Errors raised while parsing a network description or a snapshot.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A required JSON field was absent for the given layer type.
    #[error("missing required field `{field}` for layer type `{layer_type}`")]
    MissingField {
        layer_type: String,
        field: &'static str,
    },

    /// The `type` tag did not match any known layer or optimizer.
    #[error("unknown layer type `{0}`")]
    UnknownLayerType(String),

    /// More than one trainer (`sgd`, `adam`, ...) tag appeared in one description.
    #[error("only one optimizer/trainer may be specified, found a second: `{0}`")]
    MultipleOptimizers(String),

    /// The first layer spec was not `type: "input"`.
    #[error("the first layer must be an input layer, got `{0}`")]
    FirstLayerNotInput(String),

    /// Fewer than two layers were declared (at least input + loss required).
    #[error("at least two layers are required (input and a loss layer), got {0}")]
    TooFewLayers(usize),

    /// An `activation` field named something other than relu/sigmoid/tanh/maxout.
    #[error("unsupported activation `{0}`")]
    UnknownActivation(String),

    /// The description or snapshot JSON did not parse at all.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// A network was built with no loss layer as the last layer, or more than one.
    #[error("a network must end in exactly one loss layer")]
    InvalidLossLayerPlacement,

    /// A data source (e.g. a CSV file) was malformed or empty.
    #[error("invalid data source: {0}")]
    InvalidData(String),
}

/// Errors raised when a `Session` is used in a state that doesn't support the
/// requested operation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// `start_training` was called before an optimizer was attached.
    #[error("cannot start training: no optimizer has been configured")]
    NoOptimizer,

    /// A snapshot was loaded into a session that already owns layers.
    #[error("cannot load a snapshot into a session that is not empty")]
    NonEmptySession,
}

/// The primary error type for this crate.
#[derive(thiserror::Error, Debug)]
pub enum NeuroxError {
    /// Error building a network or optimizer from a JSON description or snapshot.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error caused by calling an operation in an invalid session state.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Wrapper for standard I/O errors (CSV loading, etc).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Wrapper for JSON (de)serialization errors.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for this crate, using `NeuroxError`.
pub type NeuroxResult<T> = Result<T, NeuroxError>;
