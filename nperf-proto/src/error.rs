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

//! Error type for the control-channel codec.

use std::io;

/// Failures that can occur while framing or decoding a control message.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// The underlying socket returned an I/O error while sending or
    /// receiving a message.
    #[error("control channel I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection before a full message was received.
    #[error("control channel closed mid-message ({received}/{expected} bytes)")]
    UnexpectedEof {
        /// Bytes actually received before EOF.
        received: usize,
        /// Bytes the message declared it would contain.
        expected: usize,
    },

    /// A message's declared `length` field did not match the length
    /// expected for its message type.
    #[error("unexpected message length {got}, expected {expected}")]
    BadLength {
        /// Length as received on the wire.
        got: u32,
        /// Length the receiver required.
        expected: u32,
    },

    /// A message's declared `version` field did not match
    /// [`crate::CTRL_VERSION`].
    #[error("protocol version mismatch: peer sent {got}, we speak {ours}")]
    VersionMismatch {
        /// Version as received on the wire.
        got: u32,
        /// Version this build implements.
        ours: u32,
    },

    /// A `mode` field on the wire did not correspond to a known
    /// [`crate::TestMode`].
    #[error("unknown test mode {0}")]
    UnknownMode(u32),

    /// The server reported a nonzero status in a `ServerEnd` message.
    #[error("server reported failure status {0}")]
    ServerStatus(u32),

    /// `ServerEnd.n_threads` or `ServerEnd.thread_info_length` did not match
    /// what the client expected.
    #[error("server reported {got} threads, expected {expected}")]
    ThreadCountMismatch {
        /// Thread count as received on the wire.
        got: u32,
        /// Thread count the client started with.
        expected: u32,
    },
}

/// Convenience alias for results carrying a [`ProtoError`].
pub type Result<T> = std::result::Result<T, ProtoError>;
