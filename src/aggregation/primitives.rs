//! Stateless numeric primitives composed with windowing strategies.

/// Arithmetic mean of the window, ignoring NaN values.
///
/// Returns `f64::NAN` when no valid value is available.
pub fn mean(values: &[f64]) -> f64 {
    let valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return f64::NAN;
    }
    valid.iter().sum::<f64>() / valid.len() as f64
}
