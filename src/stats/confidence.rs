// src/stats/confidence.rs

//! Wilson score interval over binomial observation counts, plus the uniform
//! exploration sample drawn between the bounds.
//!
//! The uniform draw is a deliberate stand-in for a true Beta posterior sample;
//! downstream budget and diversity weights were calibrated against it, so the
//! distribution must not change without re-tuning those weights.

use crate::error::CoreError;
use rand::Rng;

/// Fixed confidence level: z = 1.96 gives a 95% interval.
const Z: f64 = 1.96;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
    /// 1/sqrt(n+1): shrinks as evidence accumulates.
    pub exploration_weight: f64,
}

/// Wilson score interval for `successes` out of `successes + failures` trials.
/// Zero observations yield the full [0, 1] interval (maximum exploration).
pub fn bounds(successes: i64, failures: i64) -> Result<Bounds, CoreError> {
    if successes < 0 || failures < 0 {
        return Err(CoreError::Validation(format!(
            "negative observation counts: successes={successes}, failures={failures}"
        )));
    }

    let n = (successes + failures) as f64;
    if n == 0.0 {
        return Ok(Bounds {
            lower: 0.0,
            upper: 1.0,
            exploration_weight: 1.0,
        });
    }

    let p_hat = successes as f64 / n;
    let z2 = Z * Z;
    let denom = 1.0 + z2 / n;
    let center = p_hat + z2 / (2.0 * n);
    let spread = Z * (p_hat * (1.0 - p_hat) / n + z2 / (4.0 * n * n)).sqrt();

    Ok(Bounds {
        lower: ((center - spread) / denom).max(0.0),
        upper: ((center + spread) / denom).min(1.0),
        exploration_weight: 1.0 / (n + 1.0).sqrt(),
    })
}

/// Stochastic exploration sample: uniform within the Wilson interval.
pub fn sample<R: Rng + ?Sized>(
    successes: i64,
    failures: i64,
    rng: &mut R,
) -> Result<f64, CoreError> {
    let b = bounds(successes, failures)?;
    if b.upper <= b.lower {
        return Ok(b.lower);
    }
    Ok(rng.random_range(b.lower..=b.upper))
}
