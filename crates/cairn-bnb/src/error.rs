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

use cairn_model::error::ModelError;
use thiserror::Error;

/// Why a branch-and-bound solve could not run to a status.
#[derive(Error, Debug)]
pub enum BnbError {
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Invalid model: {0}")]
    InvalidModel(#[from] ModelError),

    #[error("root relaxation has {actual} columns but the problem has {expected}")]
    RootDimensionMismatch { expected: usize, actual: usize },

    #[error("initial guess has {actual} columns but the problem has {expected}")]
    GuessDimensionMismatch { expected: usize, actual: usize },

    #[error("node conservation violated: {0}")]
    ConservationViolated(String),

    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),
}

pub type BnbResult<T> = Result<T, BnbError>;
