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

//! The client's per-iteration lifecycle and multi-iteration loop
//! (spec.md §4.4).

use std::collections::HashMap;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nperf_proto::estimate;
use nperf_proto::framing;
use nperf_proto::messages::{ClientStart, ServerEnd, ServerStart, ThreadInfo};
use nperf_proto::{TestMode, XferStats};
use tracing::{info, warn};

use crate::cancel::Cancel;
use crate::client::worker;
use crate::config::ClientConfig;
use crate::error::{CoreError, Result};
use crate::stats::{self, Row, STATS_F_ITER, STATS_F_RAW, STATS_F_THREAD, STATS_F_TOTAL};
use crate::sync::{Phase, WorkerSync};
use crate::worker::WorkerDescriptor;

/// Everything recorded about one successfully completed iteration.
#[derive(Debug)]
pub struct IterationOutcome {
    /// Wall-clock length of the `RUN` phase.
    pub elapsed: Duration,
    /// `server.rx.bytes / elapsed` (stream mode) or
    /// `client.rx.msgs / elapsed` (RR mode), summed across all workers.
    pub aggregate: f64,
    /// Per-worker descriptors as they stood at the end of the run, in
    /// worker-id order.
    pub workers: Vec<WorkerDescriptor>,
    /// The server's per-thread counters, in the order the server reported
    /// them (accept order), already correlated back onto `workers` by
    /// `client_port`.
    pub thread_infos: Vec<ThreadInfo>,
}

/// Drives one client test end-to-end: opens a control connection each
/// iteration, negotiates the test, spawns and rendezvouses the worker
/// pool, then repeats until a confidence target is met or `max_iter` is
/// reached.
#[derive(Debug)]
pub struct IterationController<'a> {
    config: &'a ClientConfig,
    cached_addr: Option<SocketAddr>,
}

impl<'a> IterationController<'a> {
    /// Creates a controller for `config`. No network activity happens
    /// until [`IterationController::run`] is called.
    pub fn new(config: &'a ClientConfig) -> Self {
        IterationController {
            config,
            cached_addr: None,
        }
    }

    /// Runs the multi-iteration loop to completion.
    ///
    /// Returns the outcomes of every iteration that *succeeded*. If the
    /// very first iteration fails, the error is surfaced directly; a later
    /// failure is logged and the run keeps going, per spec.md §7's
    /// propagation policy — but if the *last* attempted iteration is among
    /// those failures (the run exhausts `max_iter` without a final
    /// success), that error is still surfaced once the loop ends, per
    /// spec.md §8 scenario 4.
    pub fn run(&mut self) -> Result<Vec<IterationOutcome>> {
        let bounds = self.config.iterations;
        let verbosity = self.config.verbosity;
        let opts = self.config.print_options();
        let mut outcomes = Vec::new();
        let mut sum = 0.0;
        let mut sum_sqr = 0.0;
        let mut n = 0u32;
        let mut last_err: Option<CoreError> = None;

        for attempt in 0..bounds.max {
            if verbosity.intersects(STATS_F_THREAD | STATS_F_RAW) {
                println!("iteration {}", attempt + 1);
            }

            match self.run_one_iteration() {
                Ok(outcome) => {
                    last_err = None;
                    sum += outcome.aggregate;
                    sum_sqr += outcome.aggregate * outcome.aggregate;
                    n += 1;
                    info!(iteration = attempt, aggregate = outcome.aggregate, "iteration complete");

                    self.report_iteration_detail(&outcome, verbosity, &opts);
                    if verbosity.contains(STATS_F_ITER) {
                        stats::print_iter_result(Some(n), n, outcome.aggregate, sum, sum_sqr, self.level(), &opts);
                        if verbosity.intersects(STATS_F_THREAD | STATS_F_RAW) {
                            println!();
                        }
                    }

                    outcomes.push(outcome);
                }
                Err(e) => {
                    if attempt == 0 {
                        return Err(e);
                    }
                    warn!(iteration = attempt, error = %e, "iteration failed, continuing");
                    last_err = Some(e);
                }
            }

            if let Some(target) = self.config.confidence {
                if n >= bounds.min && n >= 2 {
                    let hw = estimate::half_width(sum, sum_sqr, n, target.level);
                    if hw <= target.target_half_width() {
                        break;
                    }
                }
            }
        }

        if n == 0 {
            return Ok(outcomes);
        }

        if n > 1 && verbosity.contains(STATS_F_ITER) && verbosity.intersects(STATS_F_THREAD | STATS_F_RAW) {
            let mut resum = 0.0;
            let mut resum_sqr = 0.0;
            for (i, outcome) in outcomes.iter().enumerate() {
                resum += outcome.aggregate;
                resum_sqr += outcome.aggregate * outcome.aggregate;
                stats::print_iter_result(Some(i as u32 + 1), n, outcome.aggregate, resum, resum_sqr, self.level(), &opts);
            }
        }

        if let Some(target) = self.config.confidence {
            let hw = if n >= 2 {
                estimate::half_width(sum, sum_sqr, n, target.level)
            } else {
                f64::INFINITY
            };
            if n < 2 || hw > target.target_half_width() {
                stats::print_non_convergence(hw, target.width_percent);
            }
        }

        if verbosity.contains(STATS_F_TOTAL) {
            stats::print_iter_result(None, n, 0.0, sum, sum_sqr, self.level(), &opts);
        }

        if let Some(e) = last_err {
            return Err(e);
        }

        Ok(outcomes)
    }

    /// Prints the raw and/or per-thread sections for one iteration, per
    /// the verbosity mask (`client/main.c: collect_stats`).
    fn report_iteration_detail(&self, outcome: &IterationOutcome, verbosity: stats::Verbosity, opts: &stats::PrintOptions) {
        let show_thread = verbosity.contains(STATS_F_THREAD);
        let show_raw = verbosity.contains(STATS_F_RAW);
        if !show_thread && !show_raw {
            return;
        }

        println!("test time: {:.3}\n", outcome.elapsed.as_secs_f64());

        let by_port: HashMap<u16, &ThreadInfo> = outcome
            .thread_infos
            .iter()
            .map(|info| (info.client_port, info))
            .collect();

        let mut sum_client = XferStats::default();
        if show_raw {
            stats::print_raw_header("client");
        }
        for w in &outcome.workers {
            if show_raw {
                stats::print_raw(&w.stats, Row::Thread(w.id));
            }
            sum_client.add(&w.stats);
        }
        if show_raw {
            stats::print_raw(&sum_client, Row::Total);
            println!();
        }

        let mut sum_server = XferStats::default();
        if show_raw {
            stats::print_raw_header("server");
        }
        for w in &outcome.workers {
            let server = by_port.get(&w.client_port).map(|i| i.stats).unwrap_or_default();
            if show_raw {
                stats::print_raw(&server, Row::Thread(w.id));
            }
            sum_server.add(&server);
        }
        if show_raw {
            stats::print_raw(&sum_server, Row::Total);
            println!();
        }

        let mut sum_rslt = 0.0;
        let mut sum_rslt_sqr = 0.0;
        for w in &outcome.workers {
            let server = by_port.get(&w.client_port).map(|i| i.stats).unwrap_or_default();
            let result = w.stats.result(&server, self.config.mode, outcome.elapsed.as_secs_f64());
            sum_rslt += result;
            sum_rslt_sqr += result * result;
            if show_thread {
                stats::print_thread(&w.stats, &server, Row::Thread(w.id), self.config.mode, outcome.elapsed.as_secs_f64(), opts);
            }
        }

        if show_thread {
            stats::print_thread(&sum_client, &sum_server, Row::Total, self.config.mode, outcome.elapsed.as_secs_f64(), opts);
            stats::print_thread_footer(sum_rslt, sum_rslt_sqr, outcome.workers.len() as u32, opts);
            println!();
        }
    }

    fn level(&self) -> nperf_proto::ConfidenceLevel {
        self.config
            .confidence
            .map(|t| t.level)
            .unwrap_or(nperf_proto::ConfidenceLevel::L95)
    }

    /// Runs exactly one iteration: connect, negotiate, run workers,
    /// collect counters.
    fn run_one_iteration(&mut self) -> Result<IterationOutcome> {
        let mut control = self.connect_control()?;

        let n_threads = self.config.n_threads;
        let start = ClientStart {
            test_id: 1,
            mode: self.config.mode,
            n_threads,
            msg_size: self.config.msg_size as u32,
            tcp_nodelay: self.config.tcp_nodelay,
        };
        framing::send_block(&mut control, &start.to_be_bytes())?;

        let mut reply_buf = [0u8; ServerStart::WIRE_LEN as usize];
        framing::recv_block(&mut control, &mut reply_buf)?;
        let server_start = ServerStart::from_be_bytes(&reply_buf)?;

        let control_peer = control.peer_addr()?;
        let data_addr = SocketAddr::new(control_peer.ip(), server_start.data_port);

        let sync = Arc::new(WorkerSync::new());
        let cancel = Arc::new(Cancel::new(n_threads as usize));
        let reply = self.config.mode.expects_reply();

        let handles: Vec<_> = (0..n_threads)
            .map(|id| {
                let desc = WorkerDescriptor::new(id, self.config.msg_size, reply);
                let sync = Arc::clone(&sync);
                let cancel = Arc::clone(&cancel);
                let nodelay = self.config.tcp_nodelay;
                let buffers = self.config.buffers;
                thread::spawn(move || worker::run(desc, data_addr, nodelay, buffers, sync, cancel))
            })
            .collect();

        sync.wait_for_counter(n_threads); // INIT rendezvous
        sync.reset_counter();
        sync.set_state(Phase::Connect);
        sync.wait_for_counter(n_threads); // CONNECT rendezvous

        let t0 = Instant::now();
        sync.set_state(Phase::Run);
        sync.sleep(self.config.test_len);

        cancel.signal();
        let mut workers = Vec::with_capacity(handles.len());
        for (id, handle) in handles.into_iter().enumerate() {
            match handle.join() {
                Ok(desc) => workers.push(desc),
                Err(_) => return Err(CoreError::WorkerPanicked(id as u32)),
            }
        }
        let elapsed = t0.elapsed();

        let mut end_buf = [0u8; ServerEnd::WIRE_LEN as usize];
        framing::recv_block(&mut control, &mut end_buf)?;
        let server_end = ServerEnd::from_be_bytes(&end_buf)?;
        if server_end.status != 0 {
            return Err(CoreError::ServerFailed(server_end.status));
        }
        if server_end.n_threads != n_threads {
            return Err(CoreError::Protocol(nperf_proto::ProtoError::ThreadCountMismatch {
                got: server_end.n_threads,
                expected: n_threads,
            }));
        }

        let mut thread_infos = Vec::with_capacity(n_threads as usize);
        for _ in 0..server_end.n_threads {
            let mut info_buf = [0u8; ThreadInfo::WIRE_LEN];
            framing::recv_block(&mut control, &mut info_buf)?;
            thread_infos.push(ThreadInfo::from_be_bytes(&info_buf));
        }

        let aggregate = self.aggregate(&workers, &thread_infos, elapsed);

        Ok(IterationOutcome {
            elapsed,
            aggregate,
            workers,
            thread_infos,
        })
    }

    /// Sums per-worker client and server counters, correlated by ephemeral
    /// port, and applies spec.md §4.4's aggregate formula.
    fn aggregate(&self, workers: &[WorkerDescriptor], infos: &[ThreadInfo], elapsed: Duration) -> f64 {
        let by_port: HashMap<u16, &ThreadInfo> =
            infos.iter().map(|info| (info.client_port, info)).collect();

        let mut client_total = XferStats::default();
        let mut server_total = XferStats::default();
        for w in workers {
            client_total.add(&w.stats);
            if let Some(info) = by_port.get(&w.client_port) {
                server_total.add(&info.stats);
            }
        }

        client_total.result(&server_total, self.config.mode, elapsed.as_secs_f64())
    }

    /// Fast path: reuse the address from a prior successful iteration.
    /// Falls back to re-resolving (and trying each candidate address in
    /// turn) if the cached address no longer connects.
    fn connect_control(&mut self) -> Result<TcpStream> {
        if let Some(addr) = self.cached_addr {
            if let Ok(stream) = TcpStream::connect(addr) {
                return Ok(stream);
            }
        }

        let addrs = (self.config.host.as_str(), self.config.port).to_socket_addrs()?;
        for addr in addrs {
            if let Ok(stream) = TcpStream::connect(addr) {
                self.cached_addr = Some(addr);
                return Ok(stream);
            }
        }

        Err(CoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no address for {}:{} accepted a connection", self.config.host, self.config.port),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nperf_proto::xfer_stats::XferStats1;

    #[test]
    fn aggregate_uses_server_rx_bytes_for_stream_mode() {
        let config = ClientConfig {
            host: "localhost".into(),
            port: 1,
            mode: TestMode::TcpStream,
            msg_size: 1024,
            n_threads: 2,
            test_len: Duration::from_secs(1),
            tcp_nodelay: true,
            buffers: Default::default(),
            iterations: crate::config::IterationBounds::fixed(1),
            confidence: None,
            verbosity: crate::stats::Verbosity::result(),
            exact: false,
            binary_prefix: false,
        };
        let controller = IterationController::new(&config);

        let mut w0 = WorkerDescriptor::new(0, 1024, false);
        w0.client_port = 100;
        let mut w1 = WorkerDescriptor::new(1, 1024, false);
        w1.client_port = 200;
        let workers = vec![w0, w1];

        let infos = vec![
            ThreadInfo {
                stats: XferStats {
                    rx: XferStats1 {
                        bytes: 4096,
                        ..Default::default()
                    },
                    tx: XferStats1::default(),
                },
                status: 0,
                client_port: 100,
            },
            ThreadInfo {
                stats: XferStats {
                    rx: XferStats1 {
                        bytes: 4096,
                        ..Default::default()
                    },
                    tx: XferStats1::default(),
                },
                status: 0,
                client_port: 200,
            },
        ];

        let aggregate = controller.aggregate(&workers, &infos, Duration::from_secs(2));
        assert_eq!(aggregate, 4096.0);
    }
}
