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

//! Explicit, immutable test configuration.
//!
//! The upstream source keeps a process-wide mutable `client_config` /
//! `server_addr`; spec.md's design notes call for replacing that with a
//! value threaded through initialization instead. `ClientConfig` is built
//! once by the CLI layer and handed by reference into the controller; the
//! cached server address becomes an explicit field on the controller
//! rather than a global.

use std::net::SocketAddr;
use std::time::Duration;

use nperf_proto::mode::TestMode;
use nperf_proto::ConfidenceLevel;

use crate::stats::{PrintOptions, Verbosity};

/// Socket buffer sizes applied to data connections when nonzero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SocketBuffers {
    /// `SO_RCVBUF`, or `None` to leave the OS default.
    pub recv: Option<usize>,
    /// `SO_SNDBUF`, or `None` to leave the OS default.
    pub send: Option<usize>,
}

/// Bounds on the number of iterations the client's controller may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationBounds {
    /// Minimum iterations before a confidence target may end the run early.
    pub min: u32,
    /// Hard ceiling on iterations regardless of convergence.
    pub max: u32,
}

impl IterationBounds {
    /// A single, fixed iteration count (no early stop, no extra iterations).
    pub fn fixed(n: u32) -> Self {
        IterationBounds { min: n, max: n }
    }
}

/// An optional confidence target: stop early once the running half-width
/// falls at or below `width_percent` of the level's nominal width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceTarget {
    /// 95 or 99.
    pub level: ConfidenceLevel,
    /// Target half-width, as a percentage of the mean (spec.md §4.4).
    pub width_percent: f64,
}

impl ConfidenceTarget {
    /// The absolute half-width threshold the controller compares its
    /// running `hw` against: `0.999 × width_percent / 200.0`.
    pub fn target_half_width(&self) -> f64 {
        0.999 * self.width_percent / 200.0
    }
}

/// Full configuration for one client run, built once by the CLI layer and
/// shared read-only across iterations.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host, as given on the command line (resolved lazily and
    /// cached by the controller, not here).
    pub host: String,
    /// Server control-channel port.
    pub port: u16,
    /// `TCP_STREAM` or `TCP_RR`.
    pub mode: TestMode,
    /// Application message size in bytes.
    pub msg_size: usize,
    /// Number of parallel data connections.
    pub n_threads: u32,
    /// Wall-clock length of each iteration's `RUN` phase.
    pub test_len: Duration,
    /// Whether to set `TCP_NODELAY` on data connections.
    pub tcp_nodelay: bool,
    /// Socket buffer size overrides for data connections.
    pub buffers: SocketBuffers,
    /// Iteration count bounds.
    pub iterations: IterationBounds,
    /// Optional early-stop confidence target.
    pub confidence: Option<ConfidenceTarget>,
    /// Which result sections to print.
    pub verbosity: Verbosity,
    /// Show exact values instead of human-scaled ones.
    pub exact: bool,
    /// Scale human-readable values by 1024 instead of 1000.
    pub binary_prefix: bool,
}

impl ClientConfig {
    /// The print options derived from this config's mode, with the
    /// exact/binary-prefix overrides from the CLI applied.
    pub fn print_options(&self) -> PrintOptions {
        let mut opts = PrintOptions::for_mode(self.mode);
        opts.exact = self.exact;
        opts.binary_prefix = self.binary_prefix;
        opts
    }
}

/// Full configuration for one server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Local address to bind the control-channel listener to.
    pub bind: SocketAddr,
    /// Socket buffer size overrides applied to accepted data connections.
    pub buffers: SocketBuffers,
}
