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

//! `nperf`: the benchmark client binary (spec.md §6.3).
//!
//! Exit codes: 0 on a successful run, 1 on a command-line error, 2 on a
//! runtime failure reaching or negotiating with the server.

use std::process::ExitCode;

use clap::Parser;

use nperf_cli::args::ClientArgs;
use nperf_core::client::controller::IterationController;

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = match ClientArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = if e.exit_code() == 0 { 0 } else { 1 };
            e.print().ok();
            return ExitCode::from(code as u8);
        }
    };
    let config = args.to_config();

    let mut controller = IterationController::new(&config);
    match controller.run() {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("nperf: {e}");
            ExitCode::from(2)
        }
    }
}
