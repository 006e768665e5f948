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

//! Error type for the controller and session layers.

use std::io;

use nperf_proto::ProtoError;

/// Failures surfaced by a client or server controller.
///
/// Worker-local failures are not represented here; a worker stores its
/// outcome as a signed status code on its [`crate::worker::WorkerDescriptor`]
/// and the controller inspects that after `join`, per spec.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Failure to resolve, bind, listen, connect, or accept on a socket.
    #[error("network setup failed: {0}")]
    Io(#[from] io::Error),

    /// A control message failed to encode, decode, or satisfy its header
    /// checks.
    #[error(transparent)]
    Protocol(#[from] ProtoError),

    /// The server reported a nonzero status in its `ServerEnd` message.
    #[error("server reported test failure, status {0}")]
    ServerFailed(u32),

    /// A worker thread panicked instead of returning its descriptor.
    #[error("worker thread {0} panicked")]
    WorkerPanicked(u32),

    /// The requested thread count does not fit in the wire protocol's
    /// `n_threads` field range, or is zero.
    #[error("invalid thread count {0}")]
    InvalidThreadCount(u32),
}

/// Convenience alias for results carrying a [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
