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

//! One client session's control thread (spec.md §4.5).
//!
//! The upstream server forks a child process per accepted control
//! connection. Rust's standard library gives a cheaper, equally isolated
//! substitute for this workload — a worker thread — so `serve_session` is
//! meant to be run on its own `std::thread::spawn`'d thread per accepted
//! control connection rather than forked.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;

use socket2::{Domain, Socket, Type};
use tracing::{info, warn};

use nperf_proto::framing;
use nperf_proto::messages::{ClientStart, ServerEnd, ServerStart, ThreadInfo};

use crate::config::SocketBuffers;
use crate::error::{CoreError, Result};
use crate::server::worker;
use crate::worker::WorkerDescriptor;

const MIN_BACKLOG: i32 = 16;
const MAX_BACKLOG: i32 = 16384;

/// Runs one client session to completion on the calling thread: reads the
/// `ClientStart`, opens a dual-stack data listener, accepts and runs
/// `n_threads` workers, then replies with `ServerEnd` and its
/// `ThreadInfo` records.
///
/// Returns once the session is fully wound down (either normally or with
/// a nonzero status already written back to the client). An `Err` means
/// the control channel itself failed before a reply could be sent.
pub fn serve_session(mut control: TcpStream, buffers: SocketBuffers) -> Result<()> {
    let peer = control.peer_addr().ok();
    info!(?peer, "session started");

    let mut start_buf = [0u8; ClientStart::WIRE_LEN as usize];
    framing::recv_block(&mut control, &mut start_buf)?;
    let start = ClientStart::from_be_bytes(&start_buf)?;

    if start.n_threads == 0 {
        return Err(CoreError::InvalidThreadCount(start.n_threads));
    }

    let reply = start.mode.expects_reply();
    let msg_size = start.msg_size as usize;

    let listener = match bind_data_listener(start.n_threads) {
        Ok(listener) => listener,
        Err(e) => {
            warn!(error = %e, "failed to open data listener");
            send_failure(&mut control, start.test_id)?;
            return Err(e.into());
        }
    };
    let data_port = listener.local_addr()?.port();

    let server_start = ServerStart {
        test_id: start.test_id,
        data_port,
    };
    framing::send_block(&mut control, &server_start.to_be_bytes())?;

    let mut handles = Vec::with_capacity(start.n_threads as usize);
    let mut accept_failed = false;
    for id in 0..start.n_threads {
        match accept_worker(&listener, id, msg_size, reply, start.tcp_nodelay, buffers) {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                warn!(worker = id, error = %e, "accept or setup failed");
                accept_failed = true;
                break;
            }
        }
    }

    let mut thread_infos = Vec::with_capacity(handles.len());
    let mut join_failed = false;
    for (id, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(desc) => thread_infos.push(ThreadInfo {
                stats: desc.stats,
                status: desc.status,
                client_port: desc.client_port,
            }),
            Err(_) => {
                warn!(worker = id, "worker thread panicked");
                join_failed = true;
            }
        }
    }

    let status = if accept_failed || join_failed { 1 } else { 0 };
    let end = ServerEnd {
        test_id: start.test_id,
        status,
        thread_info_length: ThreadInfo::WIRE_LEN as u32,
        n_threads: thread_infos.len() as u32,
    };
    framing::send_block(&mut control, &end.to_be_bytes())?;
    for info in &thread_infos {
        framing::send_block(&mut control, &info.to_be_bytes())?;
    }

    info!(peer = ?peer, n_threads = thread_infos.len(), status, "session complete");
    Ok(())
}

fn send_failure(control: &mut TcpStream, test_id: u32) -> Result<()> {
    let end = ServerEnd {
        test_id,
        status: 1,
        thread_info_length: ThreadInfo::WIRE_LEN as u32,
        n_threads: 0,
    };
    framing::send_block(control, &end.to_be_bytes())?;
    Ok(())
}

/// Opens a dual-stack (IPv4-and-IPv6) `TcpListener` on an ephemeral port,
/// with a backlog sized to the requested worker count (spec.md §4.5).
fn bind_data_listener(n_threads: u32) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::IPV6, Type::STREAM, None)?;
    socket.set_only_v6(false)?;
    socket.set_reuse_address(true)?;
    let addr: SocketAddr = "[::]:0".parse().unwrap();
    socket.bind(&addr.into())?;
    let backlog = (n_threads as i32).clamp(MIN_BACKLOG, MAX_BACKLOG);
    socket.listen(backlog)?;
    Ok(socket.into())
}

/// Accepts one data connection, applies socket options, and spawns its
/// worker thread.
fn accept_worker(
    listener: &TcpListener,
    id: u32,
    msg_size: usize,
    reply: bool,
    nodelay: bool,
    buffers: SocketBuffers,
) -> std::io::Result<thread::JoinHandle<WorkerDescriptor>> {
    let (stream, peer) = listener.accept()?;
    stream.set_nodelay(nodelay)?;
    if buffers.recv.is_some() || buffers.send.is_some() {
        let socket = Socket::from(stream.try_clone()?);
        if let Some(recv) = buffers.recv {
            socket.set_recv_buffer_size(recv)?;
        }
        if let Some(send) = buffers.send {
            socket.set_send_buffer_size(send)?;
        }
    }

    let mut desc = WorkerDescriptor::new(id, msg_size, reply);
    desc.client_port = peer.port();

    Ok(thread::spawn(move || worker::run(desc, stream)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_data_listener_clamps_backlog_to_minimum() {
        let listener = bind_data_listener(1).unwrap();
        assert!(listener.local_addr().unwrap().port() > 0);
    }
}
