use thiserror::Error as ThisError;

/// Error is returned by store, client and factory operations when a flag could not be read,
/// written or evaluated.
#[derive(Debug, ThisError)]
pub enum Error {
    /// FlagNotFound indicates that a write operation (or a metadata read) named a flag that does
    /// not exist in the store.
    #[error("feature flag {0} does not exist")]
    FlagNotFound(String),

    /// InvalidPercentageType indicates that a serialized percentage carried a `type` tag that no
    /// percentage variant is registered under.
    #[error("percentage type not supported: {0}")]
    InvalidPercentageType(String),

    /// InvalidBucketerType indicates that a serialized bucketer carried a `type` tag that no
    /// bucketer variant is registered under.
    #[error("bucketer type not supported: {0}")]
    InvalidBucketerType(String),

    /// InvalidOperator indicates that a check key or serialized check named an unknown operator.
    #[error("operator not supported: {0}")]
    InvalidOperator(String),

    /// IncomparableTypes indicates that an operator was given operands it cannot compare, e.g.
    /// `gt` between a string and a number, or `in` against something that is not an array.
    #[error("operator {operator} cannot compare {actual} with {expected}")]
    IncomparableTypes {
        operator: &'static str,
        actual: String,
        expected: String,
    },

    /// Serialization indicates malformed wire data.
    #[error("malformed feature flag data: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Subscriber indicates that a lifecycle event subscriber rejected an event.
    #[error("event subscriber failed: {0}")]
    Subscriber(String),

    /// Store indicates a failure inside a store backend.
    #[error("store failure: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, Error>;
