//! Ease-out curves

use std::time::Duration;

/// Fraction of `total` covered by `elapsed`, clamped to `[0, 1]`
///
/// A zero-length animation is always complete.
pub fn progress(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        1.0
    } else {
        (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
    }
}

/// Power-`power` ease-out: `1 - (1 - progress)^power`
///
/// `progress` is clamped to `[0, 1]` first, so the result is too.
pub fn ease_out(progress: f64, power: i32) -> f64 {
    let progress = progress.clamp(0.0, 1.0);
    1.0 - (1.0 - progress).powi(power)
}
