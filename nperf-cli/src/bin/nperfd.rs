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

//! `nperfd`: the benchmark server binary (spec.md §6.3, §4.5).
//!
//! Accepts control connections on a single listener and runs each one to
//! completion on its own thread (the upstream server forks a child per
//! connection; see `nperf_core::server::control` for why a thread
//! substitutes cleanly here). Exit code 3 means the control listener
//! itself could not be bound; individual session failures are logged and
//! do not bring the daemon down.

use std::net::TcpListener;
use std::process::ExitCode;
use std::thread;

use clap::Parser;
use tracing::{error, info, warn};

use nperf_cli::args::ServerArgs;
use nperf_core::server;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = match ServerArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.exit_code() == 0 { 0 } else { 1 };
            e.print().ok();
            return ExitCode::from(code as u8);
        }
    };
    let config = args.to_config();

    let listener = match TcpListener::bind(config.bind) {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind = %config.bind, error = %e, "failed to bind control listener");
            return ExitCode::from(3);
        }
    };
    info!(bind = %config.bind, "listening");

    for conn in listener.incoming() {
        let stream = match conn {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "failed to accept control connection");
                continue;
            }
        };
        let buffers = config.buffers;
        thread::spawn(move || {
            if let Err(e) = server::serve_session(stream, buffers) {
                warn!(error = %e, "session ended with an error");
            }
        });
    }

    ExitCode::SUCCESS
}
