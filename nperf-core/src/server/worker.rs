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

//! One server-side data-plane worker thread (spec.md §4.3).
//!
//! Symmetric to [`crate::client::worker`] but simpler: the socket is
//! already owned by the control thread (handed over from `accept`), there
//! is no init/connect rendezvous to perform, and the loop ends on the
//! peer's eof rather than on a local clock.

use std::net::TcpStream;

use crate::cancel::Cancel;
use crate::worker::{recv_message, send_message, WorkerDescriptor};

/// Runs one server worker to completion and returns its descriptor.
///
/// In stream mode the worker only receives; in RR mode it receives then
/// replies, alternating until the peer closes the connection. There is no
/// local notion of a test deadline on this side — spec.md §4.3 places the
/// clock on the client, so the server simply runs until `recv` reports
/// eof (or an error).
pub fn run(mut desc: WorkerDescriptor, mut stream: TcpStream) -> WorkerDescriptor {
    // No cancellation source applies to a server worker; it stops itself
    // on eof. An unsignaled `Cancel` lets it reuse the shared message
    // primitives without a cancellation path of its own.
    let cancel = Cancel::new(0);
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
        let buf = desc.buffer.message_mut(msg_size);
        match recv_message(stream, buf, cancel, &mut desc.stats) {
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
        let buf = desc.buffer.message_mut(msg_size);
        match recv_message(stream, buf, cancel, &mut desc.stats) {
            Ok(true) => {}
            Ok(false) => return 0,
            Err(status) => return status,
        }

        let buf = desc.buffer.message(msg_size);
        match send_message(stream, buf, cancel, &mut desc.stats) {
            Ok(true) => continue,
            Ok(false) => return 0,
            Err(status) => return status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn stream_mode_counts_bytes_until_peer_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            use std::io::Write;
            stream.write_all(&[9u8; 256]).unwrap();
            stream.shutdown(std::net::Shutdown::Write).unwrap();
        });

        let (stream, _) = listener.accept().unwrap();
        let desc = WorkerDescriptor::new(0, 256, false);
        let desc = run(desc, stream);

        client.join().unwrap();
        assert_eq!(desc.status, 0);
        assert_eq!(desc.stats.rx.bytes, 256);
        assert_eq!(desc.stats.rx.msgs, 1);
    }

    #[test]
    fn rr_mode_echoes_request_count() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = thread::spawn(move || {
            use std::io::{Read, Write};
            let mut stream = TcpStream::connect(addr).unwrap();
            let mut buf = [0u8; 64];
            for _ in 0..3 {
                stream.write_all(&[1u8; 64]).unwrap();
                stream.read_exact(&mut buf).unwrap();
            }
            stream.shutdown(std::net::Shutdown::Both).unwrap();
        });

        let (stream, _) = listener.accept().unwrap();
        let desc = WorkerDescriptor::new(0, 64, true);
        let desc = run(desc, stream);

        client.join().unwrap();
        assert_eq!(desc.stats.rx.msgs, 3);
        assert_eq!(desc.stats.tx.msgs, 3);
    }
}
