// Copyright (c) 2025 Felix Kahle.
//
// Permission is hereby granted, free of charge, to any person obtaining
// a copy of this software and associated documentation files (the
// "Software"), to deal in the Software without restriction, including
// without limitation the rights to use, copy, modify, merge, publish,
// distribute, sublicense, and/or sell copies of the Software, and to
// permit persons to whom the Software is furnished to do so, subject to
// the following conditions:
//
// The above copyright notice and this permission notice shall be
// included in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
// MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
// NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE
// LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION
// WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! # Deterministic State Hashing
//!
//! A thin wrapper over `rustc_hash::FxHasher` for fingerprinting solver state
//! across runs. `FxHasher` has no per-process random seed, so equal inputs
//! give equal digests on every run of the same build, which is what
//! divergence testing between two solves needs.
//!
//! Floats are hashed by bit pattern after folding `-0.0` onto `0.0` and every
//! NaN onto one canonical NaN.

use rustc_hash::FxHasher;
use std::hash::Hasher;

/// Run-stable hasher for solver state.
#[derive(Default, Clone)]
pub struct StateHasher {
    inner: FxHasher,
}

impl std::fmt::Debug for StateHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateHasher")
            .field("digest", &self.inner.finish())
            .finish()
    }
}

impl StateHasher {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.inner.write_u64(value);
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.inner.write_u32(value);
    }

    /// Widened to `u64` so digests agree across pointer widths.
    #[inline]
    pub fn write_usize(&mut self, value: usize) {
        self.inner.write_u64(value as u64);
    }

    /// Hashes the canonical bit pattern of `value`.
    #[inline]
    pub fn write_f64(&mut self, value: f64) {
        self.inner.write_u64(canonical_bits(value));
    }

    /// Hashes the length first so `[a] ++ [b]` and `[a, b]` differ.
    pub fn write_f64_slice(&mut self, values: &[f64]) {
        self.write_usize(values.len());
        for &v in values {
            self.write_f64(v);
        }
    }

    /// The digest of everything written so far. The hasher stays usable.
    #[inline]
    pub fn finish(&self) -> u64 {
        self.inner.finish()
    }
}

#[inline]
fn canonical_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0.0_f64.to_bits()
    } else {
        value.to_bits()
    }
}

/// Order-sensitive combination of two digests.
#[inline]
pub fn combine(seed: u64, value: u64) -> u64 {
    let mut hasher = StateHasher::new();
    hasher.write_u64(seed);
    hasher.write_u64(value);
    hasher.finish()
}
