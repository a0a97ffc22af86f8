// SPDX-License-Identifier: Apache-2.0
//! Logistic curves used by the propagator, learner, and pruning logic.

/// Standard logistic function `1 / (1 + e^-x)`.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + libm::expf(-x))
}

/// Soft indicator that `x` sits below the reference `r`.
///
/// `1 - sigmoid((x - r) / r)`: close to 1 well below the reference,
/// 0.5 at it, close to 0 well above. `r` must be positive; a tiny guard
/// keeps a zero reference from dividing out.
pub fn soft_below(x: f32, r: f32) -> f32 {
    1.0 - soft_above(x, r)
}

/// Complement of [`soft_below`]: soft indicator that `x` sits above `r`.
pub fn soft_above(x: f32, r: f32) -> f32 {
    let r = r.max(1e-6);
    sigmoid((x - r) / r)
}

/// Clamps `delta` smoothly into `(-bound, bound)` via
/// `bound * tanh(delta / bound)`.
pub fn soft_clamp(delta: f32, bound: f32) -> f32 {
    bound * libm::tanhf(delta / bound)
}
