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

//! End-to-end client/server runs over loopback TCP (spec.md §8).
//!
//! Each test spins up a real `nperfd`-style control listener on `127.0.0.1`
//! on its own thread, then drives a full [`IterationController`] run
//! against it — no mocking of the wire protocol or the worker pool.

use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use nperf_core::client::controller::IterationController;
use nperf_core::config::{ClientConfig, IterationBounds, SocketBuffers};
use nperf_core::server;
use nperf_core::stats::Verbosity;
use nperf_proto::TestMode;

fn spawn_server() -> (u16, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        // One session is all these tests need.
        if let Ok((stream, _)) = listener.accept() {
            let buffers = SocketBuffers::default();
            let _ = server::serve_session(stream, buffers);
        }
    });
    (port, handle)
}

fn base_config(port: u16, mode: TestMode) -> ClientConfig {
    ClientConfig {
        host: "127.0.0.1".into(),
        port,
        mode,
        msg_size: 4096,
        n_threads: 4,
        test_len: Duration::from_millis(300),
        tcp_nodelay: true,
        buffers: SocketBuffers::default(),
        iterations: IterationBounds::fixed(1),
        confidence: None,
        verbosity: Verbosity::result(),
        exact: false,
        binary_prefix: false,
    }
}

#[test]
fn stream_mode_completes_within_expected_bounds() {
    let (port, server_handle) = spawn_server();
    let config = base_config(port, TestMode::TcpStream);

    let mut controller = IterationController::new(&config);
    let outcomes = controller.run().expect("stream iteration should succeed");
    server_handle.join().unwrap();

    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert_eq!(outcome.workers.len(), 4);
    assert_eq!(outcome.thread_infos.len(), 4);
    assert!(outcome.elapsed >= Duration::from_millis(250));
    assert!(outcome.elapsed < Duration::from_secs(5));
    assert!(outcome.aggregate > 0.0);

    // Every worker sent at least one full message in 300ms at this size.
    for w in &outcome.workers {
        assert!(w.stats.tx.bytes > 0);
        assert_eq!(w.status, 0);
    }
}

#[test]
fn rr_mode_keeps_send_and_receive_counts_in_lockstep() {
    let (port, server_handle) = spawn_server();
    let mut config = base_config(port, TestMode::TcpRr);
    config.n_threads = 4;

    let mut controller = IterationController::new(&config);
    let outcomes = controller.run().expect("rr iteration should succeed");
    server_handle.join().unwrap();

    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert_eq!(outcome.workers.len(), 4);

    for w in &outcome.workers {
        // A client in RR mode sends, then waits for a reply; at most one
        // request can be outstanding when cancellation lands.
        let diff = w.stats.tx.msgs as i64 - w.stats.rx.msgs as i64;
        assert!((0..=1).contains(&diff), "tx/rx diverged: {diff}");
        assert_eq!(w.status, 0);
    }
}

#[test]
fn server_reports_failure_status_when_thread_count_is_zero() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            let _ = server::serve_session(stream, SocketBuffers::default());
        }
    });

    let mut config = base_config(port, TestMode::TcpStream);
    config.n_threads = 0;

    let mut controller = IterationController::new(&config);
    let result = controller.run();
    handle.join().unwrap();

    assert!(result.is_err());
}
