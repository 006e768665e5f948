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

//! The worker descriptor and the message-level send/recv primitives shared
//! by the client and server loops (spec.md §3, §4.2, §4.3).

use std::io::{self, Read, Write};

use nperf_proto::XferStats;

use crate::buffer::Buffer;
use crate::cancel::Cancel;

/// One worker's state for the duration of one iteration.
///
/// Owned by the controlling thread, handed to the worker's thread for the
/// run, and read back (via `join`) once the worker has returned. Worker
/// identity (`id`), its scratch buffer, and `msg_size`/`reply` are fixed at
/// construction; `stats` and `status` are the outputs of a run.
#[derive(Debug)]
pub struct WorkerDescriptor {
    /// Dense index in `[0, n_threads)`.
    pub id: u32,
    /// The data connection's local ephemeral port, recorded after
    /// `connect` (client) or `accept` (server), used to correlate
    /// server-reported counters back to local workers.
    pub client_port: u16,
    /// Pre-allocated send/receive scratch area.
    pub buffer: Buffer,
    /// `true` for `TCP_RR` (alternating send/recv), `false` for
    /// `TCP_STREAM` (one direction only).
    pub reply: bool,
    /// Message granularity in bytes.
    pub msg_size: usize,
    /// This worker's transfer counters for the iteration.
    pub stats: XferStats,
    /// Terminal outcome: 0 normal, negative an OS error code, positive a
    /// protocol-level error.
    pub status: i32,
}

impl WorkerDescriptor {
    /// Builds a fresh descriptor with a zeroed buffer and counters.
    pub fn new(id: u32, msg_size: usize, reply: bool) -> Self {
        WorkerDescriptor {
            id,
            client_port: 0,
            buffer: Buffer::new(msg_size),
            reply,
            msg_size,
            stats: XferStats::default(),
            status: 0,
        }
    }

    /// Zeroes counters and status at the top of an iteration. The buffer
    /// and `id`/`reply`/`msg_size` are unchanged and reused.
    pub fn reset(&mut self) {
        self.stats.reset();
        self.status = 0;
        self.client_port = 0;
    }
}

/// Sends one full `msg_size` message, accumulating `tx` counters as it
/// goes.
///
/// Returns `Ok(true)` once the whole message has been written,
/// `Ok(false)` if the loop ended early (cancellation, peer closed for
/// reads via a broken pipe on write), or `Err(status)` for any other I/O
/// failure, where `status` is the negated `errno` per spec.md §3.
///
/// A partially written message still counts towards `stats.tx.bytes` but
/// not `stats.tx.msgs`, matching the boundary behavior in spec.md §8.
pub fn send_message<W: Write>(
    stream: &mut W,
    buf: &[u8],
    cancel: &Cancel,
    stats: &mut XferStats,
) -> Result<bool, i32> {
    let mut sent = 0;
    while sent < buf.len() {
        if cancel.finished_relaxed() {
            return Ok(false);
        }
        match stream.write(&buf[sent..]) {
            Ok(0) => return Ok(false),
            Ok(n) => {
                stats.tx.bytes += n as u64;
                stats.tx.calls += 1;
                sent += n;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(false),
            Err(e) if cancel.finished_relaxed() => {
                let _ = e;
                return Ok(false);
            }
            Err(e) => return Err(-e.raw_os_error().unwrap_or(-1)),
        }
    }
    stats.tx.msgs += 1;
    Ok(true)
}

/// Receives one full `msg_size` message into `buf`, accumulating `rx`
/// counters as it goes.
///
/// Returns `Ok(true)` once the whole message has been read, `Ok(false)`
/// on orderly peer close (`recv` returning zero) or cancellation, or
/// `Err(status)` for any other I/O failure.
pub fn recv_message<R: Read>(
    stream: &mut R,
    buf: &mut [u8],
    cancel: &Cancel,
    stats: &mut XferStats,
) -> Result<bool, i32> {
    let mut received = 0;
    while received < buf.len() {
        if cancel.finished_relaxed() {
            return Ok(false);
        }
        match stream.read(&mut buf[received..]) {
            Ok(0) => return Ok(false),
            Ok(n) => {
                stats.rx.bytes += n as u64;
                stats.rx.calls += 1;
                received += n;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if cancel.finished_relaxed() => {
                let _ = e;
                return Ok(false);
            }
            Err(e) => return Err(-e.raw_os_error().unwrap_or(-1)),
        }
    }
    stats.rx.msgs += 1;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn send_message_counts_full_message() {
        let mut out = Vec::new();
        let cancel = Cancel::new(1);
        let mut stats = XferStats::default();
        let buf = vec![7u8; 128];
        let completed = send_message(&mut out, &buf, &cancel, &mut stats).unwrap();
        assert!(completed);
        assert_eq!(stats.tx.msgs, 1);
        assert_eq!(stats.tx.bytes, 128);
        assert_eq!(out, buf);
    }

    #[test]
    fn send_message_stops_without_counting_msg_when_cancelled() {
        let mut out = Vec::new();
        let cancel = Cancel::new(1);
        cancel.signal();
        let mut stats = XferStats::default();
        let buf = vec![1u8; 64];
        let completed = send_message(&mut out, &buf, &cancel, &mut stats).unwrap();
        assert!(!completed);
        assert_eq!(stats.tx.msgs, 0);
        assert_eq!(stats.tx.bytes, 0);
    }

    #[test]
    fn recv_message_counts_full_message() {
        let data = vec![3u8; 64];
        let mut cursor = Cursor::new(data.clone());
        let cancel = Cancel::new(1);
        let mut stats = XferStats::default();
        let mut buf = vec![0u8; 64];
        let completed = recv_message(&mut cursor, &mut buf, &cancel, &mut stats).unwrap();
        assert!(completed);
        assert_eq!(stats.rx.msgs, 1);
        assert_eq!(buf, data);
    }

    #[test]
    fn recv_message_treats_eof_as_normal_end() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let cancel = Cancel::new(1);
        let mut stats = XferStats::default();
        let mut buf = vec![0u8; 64];
        let completed = recv_message(&mut cursor, &mut buf, &cancel, &mut stats).unwrap();
        assert!(!completed);
        assert_eq!(stats.rx.msgs, 0);
    }

    #[test]
    fn descriptor_reset_clears_counters_but_keeps_buffer_capacity() {
        let mut desc = WorkerDescriptor::new(0, 4096, false);
        desc.stats.tx.bytes = 10;
        desc.status = -5;
        desc.client_port = 9000;
        let cap = desc.buffer.capacity();
        desc.reset();
        assert_eq!(desc.stats.tx.bytes, 0);
        assert_eq!(desc.status, 0);
        assert_eq!(desc.client_port, 0);
        assert_eq!(desc.buffer.capacity(), cap);
    }
}
