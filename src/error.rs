use thiserror::Error;

/// Why a record produced no output.
///
/// Parse problems, thin data and below-threshold readings are not failures:
/// the record is skipped for this cycle and the batch carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("{0} is missing or empty")]
    Missing(&'static str),

    #[error("{field} is malformed: {detail}")]
    Malformed { field: &'static str, detail: String },

    #[error("{prices} prices for {outcomes} outcomes")]
    LengthMismatch { prices: usize, outcomes: usize },

    #[error("only {0} outcome(s)")]
    TooFewOutcomes(usize),

    #[error("max price {max_price} below resolution threshold")]
    Indecisive { max_price: f64 },

    #[error("{have} snapshots, need {need}")]
    InsufficientSnapshots { have: usize, need: usize },

    #[error("{have} positive volume deltas, need {need}")]
    InsufficientDeltas { have: usize, need: usize },

    #[error("volume deltas have zero variance")]
    ZeroVariance,

    #[error("latest volume delta {latest} below floor {floor}")]
    BelowFloor { latest: f64, floor: f64 },

    #[error("{metric} {value} does not exceed {threshold}")]
    BelowThreshold {
        metric: &'static str,
        value: f64,
        threshold: f64,
    },

    #[error("no snapshot {0}")]
    NoSnapshot(&'static str),

    #[error("{0} snapshot has no price")]
    NoPrice(&'static str),

    #[error("earlier price is zero")]
    ZeroBaseline,

    #[error("market is not resolved")]
    Unresolved,

    #[error("market has {0} outcomes, calibration needs 2")]
    NotBinary(usize),

    #[error("price {0} outside [0, 1]")]
    OutOfRange(f64),
}

/// Outcome of evaluating a single record: a value, or the reason it was skipped.
pub type Evaluation<T> = std::result::Result<T, SkipReason>;
