// SPDX-License-Identifier: Apache-2.0
//! Deterministic math subsystem (PRNG, logistic curves).
//!
//! Everything the substrate computes with floats must be bit-stable
//! across runs on the same host given the same seed; transcendentals go
//! through `libm` rather than the platform libm, and all randomness is
//! drawn from the explicit [`Prng`] threaded through the engine.

mod logistic;
mod prng;

pub use logistic::{sigmoid, soft_above, soft_below, soft_clamp};
pub use prng::Prng;
