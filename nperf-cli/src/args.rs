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

//! Command-line surfaces for `nperf` and `nperfd`, and the value parsers
//! they share (spec.md §6.3).
//!
//! The numeric-suffix convention (`common.c: parse_ulong_delim`) is kept:
//! a lowercase `k`/`m`/`g`/`t` suffix scales by powers of 1000, the
//! uppercase form by powers of 1024, and a bare number is taken literally.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use nperf_core::config::{ClientConfig, ConfidenceTarget, IterationBounds, ServerConfig, SocketBuffers};
use nperf_core::stats::Verbosity;
use nperf_proto::{ConfidenceLevel, TestMode, DEFAULT_PORT};

/// `nperf`: drives one or more iterations of a throughput or
/// transaction-rate test against a running `nperfd`.
#[derive(Parser, Debug)]
#[command(name = "nperf", about = "TCP throughput and transaction-rate benchmark client")]
pub struct ClientArgs {
    /// Server host name or address.
    pub host: String,

    /// Server control-channel port.
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Test mode: `stream` (one-way throughput) or `rr` (request/response).
    #[arg(short = 'm', long, default_value = "stream")]
    pub mode: TestMode,

    /// Application message size, accepts a k/K/m/M/g/G/t/T suffix.
    #[arg(short = 'l', long = "msg-size", default_value = "4K", value_parser = parse_size)]
    pub msg_size: u64,

    /// Length of each iteration's run phase, in seconds.
    #[arg(short = 't', long = "time", default_value_t = 10)]
    pub test_len_secs: u64,

    /// Number of parallel data connections.
    #[arg(short = 'T', long = "threads", default_value_t = 1)]
    pub n_threads: u32,

    /// `SO_RCVBUF` on data connections, accepts a numeric suffix. Left at
    /// the OS default if omitted.
    #[arg(long = "rcvbuf", value_parser = parse_size)]
    pub rcvbuf: Option<u64>,

    /// `SO_SNDBUF` on data connections, accepts a numeric suffix. Left at
    /// the OS default if omitted.
    #[arg(long = "sndbuf", value_parser = parse_size)]
    pub sndbuf: Option<u64>,

    /// Disable `TCP_NODELAY` on data connections (on by default).
    #[arg(long = "no-nodelay")]
    pub no_nodelay: bool,

    /// Iteration bounds as `min,max`. A bare `n` is shorthand for `n,n`.
    #[arg(long = "iterate", default_value = "1,1", value_parser = parse_iteration_bounds)]
    pub iterate: IterationBounds,

    /// Confidence target as `level,width`, e.g. `95,5` for a 95% interval
    /// within 5% of the mean. Omit to run a fixed iteration count.
    #[arg(long = "confidence", value_parser = parse_confidence)]
    pub confidence: Option<ConfidenceTarget>,

    /// Which result sections to print: `result`, `iter`, `thread`, `all`,
    /// `raw`, or a raw numeric bitmask.
    #[arg(short = 'v', long = "verbose", default_value = "result")]
    pub verbosity: Verbosity,

    /// Print exact values instead of human-scaled ones.
    #[arg(long)]
    pub exact: bool,

    /// Scale human-readable values by 1024 instead of 1000.
    #[arg(long = "binary")]
    pub binary_prefix: bool,
}

impl ClientArgs {
    /// Builds the immutable [`ClientConfig`] the controller runs against.
    pub fn to_config(&self) -> ClientConfig {
        ClientConfig {
            host: self.host.clone(),
            port: self.port,
            mode: self.mode,
            msg_size: self.msg_size as usize,
            n_threads: self.n_threads,
            test_len: Duration::from_secs(self.test_len_secs),
            tcp_nodelay: !self.no_nodelay,
            buffers: SocketBuffers {
                recv: self.rcvbuf.map(|v| v as usize),
                send: self.sndbuf.map(|v| v as usize),
            },
            iterations: self.iterate,
            confidence: self.confidence,
            verbosity: self.verbosity,
            exact: self.exact,
            binary_prefix: self.binary_prefix,
        }
    }
}

/// `nperfd`: accepts control connections and runs whatever test each one
/// requests.
#[derive(Parser, Debug)]
#[command(name = "nperfd", about = "TCP throughput and transaction-rate benchmark server")]
pub struct ServerArgs {
    /// Local address to bind the control-channel listener to.
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// `SO_RCVBUF` applied to accepted data connections.
    #[arg(long = "rcvbuf", value_parser = parse_size)]
    pub rcvbuf: Option<u64>,

    /// `SO_SNDBUF` applied to accepted data connections.
    #[arg(long = "sndbuf", value_parser = parse_size)]
    pub sndbuf: Option<u64>,
}

impl ServerArgs {
    /// Builds the immutable [`ServerConfig`] the control listener runs
    /// against, binding to any address on the configured port.
    pub fn to_config(&self) -> ServerConfig {
        let bind: SocketAddr = format!("[::]:{}", self.port)
            .parse()
            .expect("formatted socket address is always valid");
        ServerConfig {
            bind,
            buffers: SocketBuffers {
                recv: self.rcvbuf.map(|v| v as usize),
                send: self.sndbuf.map(|v| v as usize),
            },
        }
    }
}

/// Parses a byte count with an optional `k/K/m/M/g/G/t/T` suffix.
/// Lowercase scales by powers of 1000, uppercase by powers of 1024, and a
/// bare number is taken literally (`common.c: parse_ulong_delim`).
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, mult) = match s.chars().last() {
        Some('k') => (&s[..s.len() - 1], 1_000),
        Some('K') => (&s[..s.len() - 1], 1_024),
        Some('m') => (&s[..s.len() - 1], 1_000_000),
        Some('M') => (&s[..s.len() - 1], 1_024 * 1_024),
        Some('g') => (&s[..s.len() - 1], 1_000_000_000),
        Some('G') => (&s[..s.len() - 1], 1_024 * 1_024 * 1_024),
        Some('t') => (&s[..s.len() - 1], 1_000_000_000_000),
        Some('T') => (&s[..s.len() - 1], 1_024 * 1_024 * 1_024 * 1_024),
        _ => (s, 1),
    };
    let base: u64 = digits
        .parse()
        .map_err(|_| format!("'{s}' is not a valid size"))?;
    base.checked_mul(mult)
        .ok_or_else(|| format!("'{s}' overflows a 64-bit byte count"))
}

/// Parses `min,max` (or a bare `n` for `n,n`) into [`IterationBounds`].
pub fn parse_iteration_bounds(s: &str) -> Result<IterationBounds, String> {
    match s.split_once(',') {
        Some((min, max)) => {
            let min: u32 = min.trim().parse().map_err(|_| format!("'{min}' is not a valid iteration count"))?;
            let max: u32 = max.trim().parse().map_err(|_| format!("'{max}' is not a valid iteration count"))?;
            if min == 0 || max == 0 {
                return Err("iteration counts must be at least 1".to_string());
            }
            if min > max {
                return Err(format!("iterate min ({min}) must not exceed max ({max})"));
            }
            Ok(IterationBounds { min, max })
        }
        None => {
            let n: u32 = s.trim().parse().map_err(|_| format!("'{s}' is not a valid iteration count"))?;
            if n == 0 {
                return Err("iteration count must be at least 1".to_string());
            }
            Ok(IterationBounds::fixed(n))
        }
    }
}

/// Parses `level,width` into a [`ConfidenceTarget`], e.g. `95,5`.
pub fn parse_confidence(s: &str) -> Result<ConfidenceTarget, String> {
    let (level, width) = s
        .split_once(',')
        .ok_or_else(|| format!("'{s}' must be 'level,width', e.g. '95,5'"))?;
    let level: ConfidenceLevel = level.trim().parse()?;
    let width_percent: f64 = width
        .trim()
        .parse()
        .map_err(|_| format!("'{width}' is not a valid width percentage"))?;
    if !(width_percent > 0.0) {
        return Err("confidence width must be positive".to_string());
    }
    Ok(ConfidenceTarget { level, width_percent })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_applies_decimal_and_binary_suffixes() {
        assert_eq!(parse_size("4k").unwrap(), 4_000);
        assert_eq!(parse_size("4K").unwrap(), 4_096);
        assert_eq!(parse_size("1M").unwrap(), 1_024 * 1_024);
        assert_eq!(parse_size("64").unwrap(), 64);
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size("abc").is_err());
    }

    #[test]
    fn parse_iteration_bounds_accepts_bare_and_pair() {
        assert_eq!(parse_iteration_bounds("5").unwrap(), IterationBounds::fixed(5));
        assert_eq!(
            parse_iteration_bounds("3,10").unwrap(),
            IterationBounds { min: 3, max: 10 }
        );
    }

    #[test]
    fn parse_iteration_bounds_rejects_min_greater_than_max() {
        assert!(parse_iteration_bounds("10,3").is_err());
    }

    #[test]
    fn parse_confidence_builds_target() {
        let target = parse_confidence("95,5").unwrap();
        assert_eq!(target.level, ConfidenceLevel::L95);
        assert_eq!(target.width_percent, 5.0);
    }

    #[test]
    fn parse_confidence_rejects_unknown_level() {
        assert!(parse_confidence("90,5").is_err());
    }
}
