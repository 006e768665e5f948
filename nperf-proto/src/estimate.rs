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

//! Confidence-interval statistics for the client's iteration controller
//! (spec.md §4.4).
//!
//! `confidence_interval` and the Student-t quantile table below are an
//! original implementation: the upstream C sources this crate is otherwise
//! grounded on declare `confid_interval()` in `estimate.h` but do not ship
//! its definition. The table values are the standard two-sided Student-t
//! critical values for 95% and 99% confidence, degrees of freedom 1-30,
//! falling back to the normal quantile for larger sample counts.

use std::str::FromStr;

/// Confidence level the iteration controller targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    /// 95% two-sided confidence.
    L95,
    /// 99% two-sided confidence.
    L99,
}

impl ConfidenceLevel {
    /// The nominal percentage (95.0 or 99.0).
    pub fn percent(self) -> f64 {
        match self {
            ConfidenceLevel::L95 => 95.0,
            ConfidenceLevel::L99 => 99.0,
        }
    }

    /// Parses a confidence level from its nominal percentage. Only exactly
    /// 95 and 99 are accepted, matching the two levels the original tool
    /// supports.
    pub fn from_percent(percent: u32) -> Option<Self> {
        match percent {
            95 => Some(ConfidenceLevel::L95),
            99 => Some(ConfidenceLevel::L99),
            _ => None,
        }
    }
}

impl FromStr for ConfidenceLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let percent: u32 = s
            .parse()
            .map_err(|_| format!("'{s}' is not a confidence percentage"))?;
        ConfidenceLevel::from_percent(percent)
            .ok_or_else(|| format!("confidence level must be 95 or 99, got {percent}"))
    }
}

/// Two-sided Student-t critical values for degrees of freedom 1..=30, at
/// 95% (index 0) and 99% (index 1) confidence.
const T_TABLE: [[f64; 2]; 30] = [
    [12.706, 63.657],
    [4.303, 9.925],
    [3.182, 5.841],
    [2.776, 4.604],
    [2.571, 4.032],
    [2.447, 3.707],
    [2.365, 3.499],
    [2.306, 3.355],
    [2.262, 3.250],
    [2.228, 3.169],
    [2.201, 3.106],
    [2.179, 3.055],
    [2.160, 3.012],
    [2.145, 2.977],
    [2.131, 2.947],
    [2.120, 2.921],
    [2.110, 2.898],
    [2.101, 2.878],
    [2.093, 2.861],
    [2.086, 2.845],
    [2.080, 2.831],
    [2.074, 2.819],
    [2.069, 2.807],
    [2.064, 2.797],
    [2.060, 2.787],
    [2.056, 2.779],
    [2.052, 2.771],
    [2.048, 2.763],
    [2.045, 2.756],
    [2.042, 2.750],
];

/// Normal-distribution quantile used once degrees of freedom exceed the
/// table (the t-distribution has converged to within table precision by
/// then).
const Z_TABLE: [f64; 2] = [1.960, 2.576];

fn t_quantile(dof: u32, level: ConfidenceLevel) -> f64 {
    let col = match level {
        ConfidenceLevel::L95 => 0,
        ConfidenceLevel::L99 => 1,
    };
    if dof == 0 {
        return f64::INFINITY;
    }
    match T_TABLE.get((dof - 1) as usize) {
        Some(row) => row[col],
        None => Z_TABLE[col],
    }
}

/// The mean deviation `√(n·Σx² − (Σx)²) / n` (spec.md §4.4).
///
/// Clamped to zero under floating-point cancellation when all samples are
/// identical, since the radicand is then mathematically zero but can drift
/// slightly negative.
pub fn mean_deviation(sum: f64, sum_sqr: f64, n: u32) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    let radicand = (n * sum_sqr - sum * sum).max(0.0);
    radicand.sqrt() / n
}

/// The confidence interval half-width in the sampled quantity's own units,
/// equivalent to the original's `confid_interval(sum, sum_sqr, n, level)`.
///
/// Returns `f64::INFINITY` for `n < 2`: a single sample carries no
/// dispersion estimate, so the caller's stopping criterion never fires.
pub fn confidence_interval(sum: f64, sum_sqr: f64, n: u32, level: ConfidenceLevel) -> f64 {
    if n < 2 {
        return f64::INFINITY;
    }
    let dof = n - 1;
    let t = t_quantile(dof, level);
    let mdev = mean_deviation(sum, sum_sqr, n);
    t * mdev / (n as f64).sqrt()
}

/// The relative half-width `CI / mean` the iteration controller compares
/// against its target (spec.md §4.4: `hw = CI(...) / (sum / n)`).
///
/// Returns `f64::INFINITY` if the mean is zero, since a relative width is
/// undefined there and the controller should not mistake it for
/// convergence.
pub fn half_width(sum: f64, sum_sqr: f64, n: u32, level: ConfidenceLevel) -> f64 {
    if n == 0 {
        return f64::INFINITY;
    }
    let mean = sum / n as f64;
    if mean == 0.0 {
        return f64::INFINITY;
    }
    confidence_interval(sum, sum_sqr, n, level) / mean
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_deviation_is_zero_for_identical_samples() {
        // n samples all equal to 10.0: sum = 10n, sum_sqr = 100n.
        let n = 5;
        let sum = 50.0;
        let sum_sqr = 500.0;
        assert!(mean_deviation(sum, sum_sqr, n) < 1e-9);
    }

    #[test]
    fn confidence_interval_shrinks_as_n_grows() {
        // Fixed per-sample mean and variance, increasing n.
        let samples_small: Vec<f64> = vec![9.0, 10.0, 11.0, 9.5, 10.5];
        let samples_large: Vec<f64> = {
            let mut v = samples_small.clone();
            v.extend(samples_small.iter().cycle().take(25));
            v
        };

        let stats = |xs: &[f64]| -> (f64, f64, u32) {
            let sum: f64 = xs.iter().sum();
            let sum_sqr: f64 = xs.iter().map(|x| x * x).sum();
            (sum, sum_sqr, xs.len() as u32)
        };

        let (s1, sq1, n1) = stats(&samples_small);
        let (s2, sq2, n2) = stats(&samples_large);

        let hw_small = half_width(s1, sq1, n1, ConfidenceLevel::L95);
        let hw_large = half_width(s2, sq2, n2, ConfidenceLevel::L95);
        assert!(hw_large < hw_small);
    }

    #[test]
    fn single_sample_never_converges() {
        assert_eq!(
            confidence_interval(10.0, 100.0, 1, ConfidenceLevel::L95),
            f64::INFINITY
        );
        assert_eq!(half_width(10.0, 100.0, 1, ConfidenceLevel::L95), f64::INFINITY);
    }

    #[test]
    fn level_99_is_wider_than_level_95() {
        let sum = 100.0;
        let sum_sqr = 1050.0;
        let n = 8;
        let hw95 = half_width(sum, sum_sqr, n, ConfidenceLevel::L95);
        let hw99 = half_width(sum, sum_sqr, n, ConfidenceLevel::L99);
        assert!(hw99 > hw95);
    }

    #[test]
    fn from_percent_accepts_only_95_and_99() {
        assert_eq!(ConfidenceLevel::from_percent(95), Some(ConfidenceLevel::L95));
        assert_eq!(ConfidenceLevel::from_percent(99), Some(ConfidenceLevel::L99));
        assert_eq!(ConfidenceLevel::from_percent(90), None);
    }

    #[test]
    fn parses_from_str() {
        assert_eq!("95".parse::<ConfidenceLevel>().unwrap(), ConfidenceLevel::L95);
        assert!("50".parse::<ConfidenceLevel>().is_err());
    }
}
