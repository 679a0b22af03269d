use thiserror::Error;

/// Unified error type for `choicedesign` operations.
#[derive(Debug, Error)]
pub enum DesignError {
    /// Raised when provided arrays or matrices have incompatible dimensions.
    #[error("dimension mismatch in {context}: expected {expected} but found {found}")]
    DimensionMismatch {
        /// Human-readable context describing the operation.
        context: &'static str,
        /// The required dimension, often the layout-implied value.
        expected: usize,
        /// The dimension that was actually supplied.
        found: usize,
    },

    /// Raised when two attributes share the same name.
    #[error("attribute `{name}` is declared more than once")]
    DuplicateAttribute { name: String },

    /// Raised when an attribute has fewer than two levels.
    #[error("attribute `{name}` needs at least two levels, found {levels}")]
    TooFewLevels { name: String, levels: usize },

    /// Raised when an attribute lists the same level twice or a non-finite level.
    #[error("attribute `{name}` has an invalid or repeated level {level}")]
    InvalidLevel { name: String, level: f64 },

    /// Raised when an alternative-specific constant refers to a missing alternative.
    #[error("alternative {alternative} does not exist (valid range 1..={available})")]
    InvalidAlternative { alternative: usize, available: usize },

    /// Raised when a condition string cannot be parsed.
    #[error("cannot parse condition `{condition}` at offset {position}: {message}")]
    ConditionSyntax {
        condition: String,
        position: usize,
        message: String,
    },

    /// Raised when a condition references a name that is not a design column.
    #[error("condition `{condition}` references unknown attribute `{name}`")]
    UnknownAttribute { condition: String, name: String },

    /// Raised when the row repair pass cannot satisfy the conditions.
    #[error("conditions cannot be satisfied for row {row} after {attempts} random draws")]
    UnsatisfiableConditions { row: usize, attempts: usize },

    /// Raised when the number of blocks does not evenly divide the choice situations.
    #[error("{blocks} blocks do not evenly divide {rows} choice situations")]
    InvalidBlocks { blocks: usize, rows: usize },

    /// Raised when a run option holds an unusable value.
    #[error("invalid option `{option}`: {reason}")]
    InvalidOption {
        option: &'static str,
        reason: String,
    },

    /// Raised when prior draw weights are invalid.
    #[error("weights must be strictly positive and sum to one (slack {slack})")]
    InvalidWeights { slack: f64 },

    /// Raised when numerical routines produce NaN outside the search loop.
    #[error("encountered NaN during {context}")]
    NumericalError { context: &'static str },
}

impl DesignError {
    /// Helper to format a [`DimensionMismatch`](DesignError::DimensionMismatch) error.
    pub fn dimension_mismatch(context: &'static str, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            context,
            expected,
            found,
        }
    }

    /// Helper for rejecting a run option.
    pub fn invalid_option(option: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            option,
            reason: reason.into(),
        }
    }

    /// Helper for condition parse failures.
    pub fn syntax(condition: &str, position: usize, message: impl Into<String>) -> Self {
        Self::ConditionSyntax {
            condition: condition.to_string(),
            position,
            message: message.into(),
        }
    }
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, DesignError>;
