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

//! # Cairn Model
//!
//! The problem description consumed by the exploration engine.
//!
//! * **`index`**: typed `ColumnIndex` / `RowIndex` so columns and rows cannot be mixed up.
//! * **`problem`**: the immutable `Problem` and its `ProblemBuilder`. Objectives are
//!   kept in minimisation form internally and reported back in the caller's sense.
//! * **`solution`**: `MipSolution`, an objective plus one value per column.
//! * **`error`**: `ModelError`, returned when a builder is asked to freeze invalid data.
//!
//! The constraint matrix is fixed once built. Subproblems explored by the
//! search differ from the root only in column bounds.

pub mod error;
pub mod index;
pub mod problem;
pub mod solution;
