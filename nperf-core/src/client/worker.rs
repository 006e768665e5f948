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

//! One client-side data-plane worker thread (spec.md §4.2).
//!
//! A worker owns its data connection for the whole iteration: it connects,
//! signals readiness twice (init, then connect), runs the mode-specific
//! loop until told to stop or the peer goes away, and always closes its
//! socket on the way out.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Socket, Type};
use tracing::{debug, warn};

use crate::cancel::Cancel;
use crate::config::SocketBuffers;
use crate::sync::{Phase, WorkerSync};
use crate::worker::{recv_message, send_message, WorkerDescriptor};

/// Builds a data-plane socket and applies the configured options to it
/// *before* connecting — `client/worker.c: worker_setup()` sets
/// `SO_RCVBUF`/`SO_SNDBUF` ahead of `connect()` because the window-scale
/// factor negotiated during the handshake is fixed by the buffer size at
/// that moment; setting it afterwards can no longer affect the already
/// negotiated window.
fn connect_with_options(
    addr: SocketAddr,
    nodelay: bool,
    buffers: SocketBuffers,
) -> std::io::Result<TcpStream> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_nodelay(nodelay)?;
    if let Some(recv) = buffers.recv {
        socket.set_recv_buffer_size(recv)?;
    }
    if let Some(send) = buffers.send {
        socket.set_send_buffer_size(send)?;
    }
    socket.connect_timeout(&addr.into(), Duration::from_secs(30))?;
    Ok(socket.into())
}

/// Runs one client worker for one iteration.
///
/// `desc` is consumed and returned so its `stats`/`status`/`client_port`
/// reflect this run; the caller typically does this from inside a spawned
/// thread and recovers `desc` via `JoinHandle::join`.
///
/// Phase protocol: increments the sync counter once to report INIT-ready,
/// then again after `connect()` succeeds to report CONNECT-ready, then
/// waits for RUN before entering the send/recv loop.
pub fn run(
    mut desc: WorkerDescriptor,
    data_addr: SocketAddr,
    nodelay: bool,
    buffers: SocketBuffers,
    sync: Arc<WorkerSync>,
    cancel: Arc<Cancel>,
) -> WorkerDescriptor {
    sync.inc_counter(); // INIT ready
    sync.wait_for_state(Phase::Connect);

    let mut stream = match connect_with_options(data_addr, nodelay, buffers) {
        Ok(s) => s,
        Err(e) => {
            warn!(worker = desc.id, error = %e, "data connection failed");
            desc.status = -e.raw_os_error().unwrap_or(-1);
            sync.inc_counter(); // still rendezvous so the controller doesn't hang
            return desc;
        }
    };

    desc.client_port = stream
        .local_addr()
        .map(|a| a.port())
        .unwrap_or_default();
    cancel.register(desc.id as usize, &stream);

    sync.inc_counter(); // CONNECT ready
    sync.wait_for_state(Phase::Run);

    debug!(worker = desc.id, port = desc.client_port, "entering run loop");

    let msg_size = desc.msg_size;
    desc.status = if desc.reply {
        run_rr_loop(&mut stream, &mut desc, msg_size, &cancel)
    } else {
        run_stream_loop(&mut stream, &mut desc, msg_size, &cancel)
    };

    let _ = stream.shutdown(std::net::Shutdown::Both);
    desc
}

fn run_stream_loop(
    stream: &mut TcpStream,
    desc: &mut WorkerDescriptor,
    msg_size: usize,
    cancel: &Cancel,
) -> i32 {
    loop {
        let buf = desc.buffer.message(msg_size);
        match send_message(stream, buf, cancel, &mut desc.stats) {
            Ok(true) => continue,
            Ok(false) => return 0,
            Err(status) => return status,
        }
    }
}

fn run_rr_loop(
    stream: &mut TcpStream,
    desc: &mut WorkerDescriptor,
    msg_size: usize,
    cancel: &Cancel,
) -> i32 {
    loop {
        let buf = desc.buffer.message(msg_size);
        match send_message(stream, buf, cancel, &mut desc.stats) {
            Ok(true) => {}
            Ok(false) => return 0,
            Err(status) => return status,
        }

        let buf = desc.buffer.message_mut(msg_size);
        match recv_message(stream, buf, cancel, &mut desc.stats) {
            Ok(true) => continue,
            Ok(false) => return 0,
            Err(status) => return status,
        }
    }
}
