//! Error types for generator configuration and generation runs.

use thiserror::Error;

/// Builder validation failure. Raised before any geometry is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A required builder parameter was never set.
    #[error("{generator}: missing required parameter `{field}`")]
    Missing {
        generator: &'static str,
        field: &'static str,
    },
    /// A numeric parameter is outside its allowed range.
    #[error("{generator}: `{field}` = {value} is out of range ({expected})")]
    OutOfRange {
        generator: &'static str,
        field: &'static str,
        value: f64,
        expected: &'static str,
    },
    /// A `(min, max)` pair was given in the wrong order.
    #[error("{generator}: `{field}` range is inverted ({min} > {max})")]
    InvertedRange {
        generator: &'static str,
        field: &'static str,
        min: f64,
        max: f64,
    },
}

impl ConfigError {
    pub(crate) fn missing(generator: &'static str, field: &'static str) -> Self {
        Self::Missing { generator, field }
    }

    pub(crate) fn out_of_range(
        generator: &'static str,
        field: &'static str,
        value: f64,
        expected: &'static str,
    ) -> Self {
        Self::OutOfRange {
            generator,
            field,
            value,
            expected,
        }
    }
}

/// Check `min <= max` for a builder range.
pub(crate) fn check_range(
    generator: &'static str,
    field: &'static str,
    min: f64,
    max: f64,
) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::InvertedRange {
            generator,
            field,
            min,
            max,
        });
    }
    Ok(())
}

/// Check `lo <= value <= hi`.
pub(crate) fn check_within(
    generator: &'static str,
    field: &'static str,
    value: f64,
    lo: f64,
    hi: f64,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if !value.is_finite() || value < lo || value > hi {
        return Err(ConfigError::out_of_range(generator, field, value, expected));
    }
    Ok(())
}

/// Failure inside a generation run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    /// Configuration rejected at generation time.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Geometry could not be produced (e.g. no room above the origin).
    #[error("degenerate geometry: {0}")]
    Degenerate(String),
    /// The origin is unsuitable for this generator.
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),
}
