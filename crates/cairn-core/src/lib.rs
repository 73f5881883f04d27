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

//! # Cairn Core
//!
//! Foundational building blocks for the cairn mixed-integer exploration
//! engine. Nothing in here knows about branch-and-bound; the crate only
//! provides the primitives the higher layers are written against.
//!
//! ## Modules
//!
//! - `hash`: `StateHasher`, a seedless `FxHasher` wrapper used to fingerprint
//!   solver state so two deterministic runs can be compared bit for bit.
//! - `num`: the `SolverFloat` bound alias plus integrality, fractional-part
//!   and gap helpers.
//! - `utils`: phantom-tagged indices (`TypedIndex<T>`) and a generational
//!   arena (`Arena<T>` / `Handle<T>`) whose handles detect use after removal.

pub mod hash;
pub mod num;
pub mod utils;
