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

#![deny(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unused_imports
)]

//! Wire protocol for the nperf control channel.
//!
//! Every message is fixed-size, big-endian, and begins with a `length` and
//! `version` header. [`framing`] implements the read/write discipline for
//! that header; [`messages`] defines the four message shapes; [`xfer_stats`]
//! is the transfer-counter algebra shared by the data plane and the wire;
//! [`estimate`] computes the confidence intervals the client's iteration
//! controller uses to decide when to stop.

pub mod error;
pub mod estimate;
pub mod framing;
pub mod messages;
pub mod mode;
pub mod xfer_stats;

pub use error::ProtoError;
pub use estimate::ConfidenceLevel;
pub use mode::TestMode;
pub use xfer_stats::{XferStats, XferStats1};

/// Protocol version carried in every control message's `version` field.
///
/// A mismatch between client and server is a fatal, hard-error condition —
/// see [`error::ProtoError::VersionMismatch`].
pub const CTRL_VERSION: u32 = 1;

/// Default control-channel TCP port.
pub const DEFAULT_PORT: u16 = 12543;
