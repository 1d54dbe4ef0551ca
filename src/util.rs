use crate::error::ConfigError;

/// Checks that a numerical value is in the closed interval `[a,b]`
///
/// ### Example
/// ```ignore
/// check_interval("gamma", 2.0, 0.0, 1.0)?;
/// ```
/// This fails with "`gamma` must be in [0, 1], got 2".
pub(crate) fn check_interval(
    field: &'static str,
    value: f64,
    a: f64,
    b: f64,
) -> Result<(), ConfigError> {
    // NaN fails both comparisons
    if value >= a && value <= b {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min: a,
            max: b,
            min_open: false,
        })
    }
}

/// Checks that a numerical value is in the half-open interval `(a,b]`
pub(crate) fn check_left_open(
    field: &'static str,
    value: f64,
    a: f64,
    b: f64,
) -> Result<(), ConfigError> {
    if value > a && value <= b {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min: a,
            max: b,
            min_open: true,
        })
    }
}

/// Checks that a count is at least `min`
pub(crate) fn check_count(field: &'static str, value: usize, min: usize) -> Result<(), ConfigError> {
    if value >= min {
        Ok(())
    } else {
        Err(ConfigError::InvalidCount { field, value, min })
    }
}
