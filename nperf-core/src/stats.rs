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

//! Result formatting and the verbosity scheme (recovered from
//! `stats.c`/`client/cmdline.c`; the distilled interface only names
//! "verbosity level ... or bitmask").
//!
//! Three independent pieces: [`Verbosity`] (which sections to print),
//! [`PrintOptions`] (how to format one number), and a handful of
//! free functions mirroring the upstream `xfer_stats_print_*` /
//! `print_iter_result` family, each printing straight to stdout the way
//! the original tool does.

use std::fmt;
use std::str::FromStr;

use nperf_proto::{estimate, ConfidenceLevel, TestMode, XferStats};

/// Print the grand total across all threads/iterations.
pub const STATS_F_TOTAL: u32 = 1 << 0;
/// Print a line per completed iteration.
pub const STATS_F_ITER: u32 = 1 << 1;
/// Print a line per worker thread.
pub const STATS_F_THREAD: u32 = 1 << 2;
/// Print the raw call/msg/byte counters per thread.
pub const STATS_F_RAW: u32 = 1 << 3;
/// Every flag set.
pub const STATS_F_ALL: u32 = STATS_F_TOTAL | STATS_F_ITER | STATS_F_THREAD | STATS_F_RAW;

/// Which sections of output to print, as an additive bitmask.
///
/// The five named levels are each a superset of the one before, except
/// `raw`, which stands alone (matching `VERB_RAW => STATS_F_RAW` in the
/// upstream table, deliberately not `STATS_F_ALL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verbosity(pub u32);

impl Verbosity {
    /// `result`: just the final total.
    pub fn result() -> Self {
        Verbosity(STATS_F_TOTAL)
    }

    /// `iter`: total plus a line per iteration.
    pub fn iter() -> Self {
        Verbosity(STATS_F_TOTAL | STATS_F_ITER)
    }

    /// `thread`: the above plus a line per worker thread.
    pub fn thread() -> Self {
        Verbosity(STATS_F_TOTAL | STATS_F_ITER | STATS_F_THREAD)
    }

    /// `all`: every section.
    pub fn all() -> Self {
        Verbosity(STATS_F_ALL)
    }

    /// `raw`: only the raw per-thread counter dump.
    pub fn raw() -> Self {
        Verbosity(STATS_F_RAW)
    }

    /// True if every bit in `flag` is set.
    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// True if any bit in `flag` is set.
    pub fn intersects(self, flag: u32) -> bool {
        self.0 & flag != 0
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::result()
    }
}

impl FromStr for Verbosity {
    type Err = std::num::ParseIntError;

    /// Accepts the five named levels, or a raw numeric bitmask.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "result" => Ok(Verbosity::result()),
            "iter" => Ok(Verbosity::iter()),
            "thread" => Ok(Verbosity::thread()),
            "all" => Ok(Verbosity::all()),
            "raw" => Ok(Verbosity::raw()),
            other => other.parse::<u32>().map(Verbosity),
        }
    }
}

/// The unit a count or rate is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// Octets.
    Byte,
    /// Completed request/reply transactions.
    Transaction,
}

impl Unit {
    fn label(self) -> &'static str {
        match self {
            Unit::Byte => "B",
            Unit::Transaction => "tr",
        }
    }
}

/// How to format one displayed number: unit, field width, exact vs.
/// human-scaled, decimal vs. binary prefix base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintOptions {
    /// Bytes or transactions.
    pub unit: Unit,
    /// Field width used in exact mode.
    pub width: usize,
    /// Print the raw integer/float instead of human-scaled.
    pub exact: bool,
    /// Use powers of 1024 instead of 1000 when scaling.
    pub binary_prefix: bool,
}

impl PrintOptions {
    /// The mode-specific defaults (`stats.c: print_opts_setup`):
    /// `TCP_STREAM` is byte-denominated with a wide field, `TCP_RR` is
    /// transaction-denominated with a narrower one.
    pub fn for_mode(mode: TestMode) -> Self {
        match mode {
            TestMode::TcpStream => PrintOptions {
                unit: Unit::Byte,
                width: 13,
                exact: false,
                binary_prefix: false,
            },
            TestMode::TcpRr => PrintOptions {
                unit: Unit::Transaction,
                width: 9,
                exact: false,
                binary_prefix: false,
            },
        }
    }
}

const SCALE_PREFIXES: [char; 5] = [' ', 'K', 'M', 'G', 'T'];

/// Formats an integer count, human-scaled unless `opts.exact`.
pub fn format_count(val: u64, opts: &PrintOptions) -> String {
    let unit = opts.unit.label();
    if opts.exact {
        return format!("{:>width$} {}", val, unit, width = opts.width);
    }

    let base = if opts.binary_prefix { 1024u64 } else { 1000u64 };
    if val < 20 * base {
        return format!("{:>5}    {}", val, unit);
    }

    let mut dval = val as f64 / base as f64;
    let mut idx = 1;
    while dval >= 20.0 * base as f64 && idx < SCALE_PREFIXES.len() - 1 {
        dval /= base as f64;
        idx += 1;
    }
    format!("{:>7.1} {}{}", dval, SCALE_PREFIXES[idx], unit)
}

/// Formats a rate (count per second), human-scaled unless `opts.exact`.
pub fn format_rate(val: f64, opts: &PrintOptions) -> String {
    let unit = opts.unit.label();
    if opts.exact {
        return format!("{:>width$.1} {}/s", val, unit, width = opts.width);
    }

    let base = if opts.binary_prefix { 1024.0 } else { 1000.0 };
    let mut scaled = val;
    let mut idx = 0;
    while scaled >= 20_000.0 && idx < SCALE_PREFIXES.len() - 1 {
        scaled /= base;
        idx += 1;
    }
    format!("{:>7.1} {}{}/s", scaled, SCALE_PREFIXES[idx], unit)
}

/// Identifies a thread-indexed print as the cross-thread total rather
/// than a specific worker, mirroring the upstream `XFER_STATS_TOTAL`
/// sentinel without overloading the index type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    /// A specific worker's row.
    Thread(u32),
    /// The summed total row.
    Total,
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Row::Thread(id) => write!(f, "{id}"),
            Row::Total => write!(f, "total"),
        }
    }
}

/// Prints the column header for [`print_raw`] ("client" or "server").
pub fn print_raw_header(label: &str) {
    println!(
        "{:<8} {:>9} {:>9} {:>13}    {:>9} {:>9} {:>13}",
        label, "recv", "msg", "bytes", "send", "msg", "bytes"
    );
}

/// Prints one raw call/msg/byte row (`xfer_stats_print_raw`).
pub fn print_raw(stats: &XferStats, row: Row) {
    match row {
        Row::Total => print!("{:<9}", "total"),
        Row::Thread(id) => print!("{:<9}", id),
    }
    print!(
        "{:>9} {:>9} {:>13}    ",
        stats.rx.calls, stats.rx.msgs, stats.rx.bytes
    );
    println!(
        "{:>9} {:>9} {:>13}",
        stats.tx.calls, stats.tx.msgs, stats.tx.bytes
    );
}

/// Prints one per-thread summary line (`xfer_stats_print_thread`).
///
/// In RR mode the transaction-rate line is followed by the underlying
/// byte rate, formatted with `TCP_STREAM`'s print options regardless of
/// what `opts` itself specifies.
pub fn print_thread(client: &XferStats, server: &XferStats, row: Row, mode: TestMode, elapsed: f64, opts: &PrintOptions) {
    match row {
        Row::Total => print!("total     "),
        Row::Thread(id) => print!("thread {id:<3}"),
    }

    match mode {
        TestMode::TcpStream => {
            print!(" sent {}", format_count(client.tx.bytes, opts));
            print!(", rate {}", format_rate(client.tx.bytes as f64 / elapsed, opts));
            print!(", received {}", format_count(server.rx.bytes, opts));
            println!(", rate {}", format_rate(server.rx.bytes as f64 / elapsed, opts));
        }
        TestMode::TcpRr => {
            let byte_opts = PrintOptions::for_mode(TestMode::TcpStream);
            print!(" sent {}", format_count(client.tx.msgs, opts));
            print!(", rate {}", format_rate(client.tx.msgs as f64 / elapsed, opts));
            print!(", {}", format_rate(client.tx.bytes as f64 / elapsed, &byte_opts));
            print!(", received {}", format_count(client.rx.msgs, opts));
            print!(", rate {}", format_rate(client.rx.msgs as f64 / elapsed, opts));
            println!(", {}", format_rate(client.rx.bytes as f64 / elapsed, &byte_opts));
        }
    }
}

/// Prints the `thread average ..., mdev ... (xx.x%)` footer following a
/// block of per-thread lines.
pub fn print_thread_footer(sum: f64, sum_sqr: f64, n: u32, opts: &PrintOptions) {
    let avg = sum / n as f64;
    let mdev = estimate::mean_deviation(sum, sum_sqr, n);
    println!(
        "thread average {}, mdev {} ({:.1}%)",
        format_rate(avg, opts),
        format_rate(mdev, opts),
        100.0 * mdev / avg
    );
}

/// Prints one `print_iter_result` line: either a numbered iteration
/// (with its own result value) or the final total row (`iter = None`).
pub fn print_iter_result(iter: Option<u32>, n: u32, result: f64, sum: f64, sum_sqr: f64, level: ConfidenceLevel, opts: &PrintOptions) {
    match iter {
        None => {
            let width = (if opts.exact { opts.width } else { 8 }) + opts.unit.label().len();
            print!("all{:>w$}", "", w = width + 5);
        }
        Some(i) => {
            print!("{i:<3} {},", format_rate(result, opts));
        }
    }

    let avg = sum / n as f64;
    let mdev = estimate::mean_deviation(sum, sum_sqr, n);
    print!("  avg {}, mdev {}", format_rate(avg, opts), format_rate(mdev, opts));
    print!(" ({:>5.1}%)", 100.0 * mdev / avg);

    if n > 1 {
        let confid = estimate::confidence_interval(sum, sum_sqr, n, level);
        print!(", confid. +/- {}", format_rate(confid, opts));
        print!(" ({:>5.1}%)", 100.0 * confid / avg);
    }
    println!();
}

/// Prints the dual-form non-convergence warning to stderr
/// (`all_iterations`'s trailing `fprintf(stderr, ...)` block).
pub fn print_non_convergence(hw: f64, target_percent: f64) {
    eprintln!(
        "*** Failed to reach confidence target.\n\
         *** Confidence interval width is {:.4}% (+/- {:.4}%), requested {:.4}%.\n\
         *** The result is not reliable enough.",
        200.0 * hw,
        100.0 * hw,
        target_percent
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use nperf_proto::xfer_stats::XferStats1;

    #[test]
    fn verbosity_named_levels_are_additive() {
        assert!(Verbosity::thread().contains(STATS_F_TOTAL));
        assert!(Verbosity::thread().contains(STATS_F_ITER));
        assert!(Verbosity::thread().contains(STATS_F_THREAD));
        assert!(!Verbosity::thread().contains(STATS_F_RAW));
    }

    #[test]
    fn verbosity_raw_does_not_imply_total() {
        assert!(!Verbosity::raw().contains(STATS_F_TOTAL));
        assert!(Verbosity::raw().contains(STATS_F_RAW));
    }

    #[test]
    fn verbosity_parses_named_and_numeric() {
        assert_eq!("iter".parse::<Verbosity>().unwrap(), Verbosity::iter());
        assert_eq!("12".parse::<Verbosity>().unwrap().0, 12);
    }

    #[test]
    fn format_count_exact_uses_raw_value() {
        let opts = PrintOptions {
            unit: Unit::Byte,
            width: 10,
            exact: true,
            binary_prefix: false,
        };
        assert_eq!(format_count(42, &opts), "        42 B");
    }

    #[test]
    fn format_count_scales_above_threshold() {
        let opts = PrintOptions::for_mode(TestMode::TcpStream);
        let scaled = format_count(20_000, &opts);
        assert!(scaled.contains('K'));
    }

    #[test]
    fn format_rate_below_threshold_is_unscaled() {
        let opts = PrintOptions::for_mode(TestMode::TcpStream);
        let rate = format_rate(500.0, &opts);
        assert!(rate.trim_start().starts_with("500.0"));
    }

    #[test]
    fn format_count_small_values_skip_exact_path() {
        let opts = PrintOptions::for_mode(TestMode::TcpRr);
        let small = format_count(3, &opts);
        assert!(small.trim_start().starts_with('3'));
    }

    #[test]
    fn raw_total_sums_match_field_add() {
        let mut total = XferStats::default();
        let a = XferStats {
            rx: XferStats1 {
                msgs: 1,
                calls: 1,
                bytes: 64,
            },
            tx: XferStats1::default(),
        };
        total.add(&a);
        assert_eq!(total.rx.bytes, 64);
    }
}
