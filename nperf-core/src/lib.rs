// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![deny(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unused_imports
)]

//! Worker pools, phase synchronization, and statistics for an nperf test run.
//!
//! [`sync`] is the phase barrier both client and server workers rendezvous
//! on. [`buffer`] is the per-worker page-aligned scratch area. [`cancel`]
//! is the cooperative shutdown signal used to interrupt blocking workers.
//! [`client`] and [`server`] hold the two sides' worker loops and
//! controllers; [`stats`] formats results for display.

pub mod buffer;
pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod stats;
pub mod sync;
pub mod worker;

pub use error::CoreError;
