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

//! The four fixed-size control messages (spec.md §6.1).
//!
//! Every message starts with `length` (its own encoded size) and `version`
//! (== [`crate::CTRL_VERSION`]). All multi-byte fields are big-endian;
//! padding bytes exist only for alignment and are ignored on decode.

use crate::error::ProtoError;
use crate::mode::TestMode;
use crate::xfer_stats::{XferStats, XFER_STATS_WIRE_LEN};
use crate::CTRL_VERSION;

/// client → server: describes the test to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStart {
    /// Opaque identifier echoed back by the server; currently always 1.
    pub test_id: u32,
    /// `TCP_STREAM` or `TCP_RR`.
    pub mode: TestMode,
    /// Number of parallel data connections to run.
    pub n_threads: u32,
    /// Application message size in bytes.
    pub msg_size: u32,
    /// Whether to set `TCP_NODELAY` on data connections.
    pub tcp_nodelay: bool,
}

impl ClientStart {
    /// Encoded size on the wire: six `u32` header/payload fields, plus the
    /// `tcp_nodelay` flag and 3 bytes of trailing pad to a 4-byte boundary.
    pub const WIRE_LEN: u32 = 4 * 6 + 4;

    /// Encodes to the 28-byte wire form.
    pub fn to_be_bytes(self) -> [u8; Self::WIRE_LEN as usize] {
        let mut buf = [0u8; Self::WIRE_LEN as usize];
        buf[0..4].copy_from_slice(&Self::WIRE_LEN.to_be_bytes());
        buf[4..8].copy_from_slice(&CTRL_VERSION.to_be_bytes());
        buf[8..12].copy_from_slice(&self.test_id.to_be_bytes());
        buf[12..16].copy_from_slice(&self.mode.to_wire().to_be_bytes());
        buf[16..20].copy_from_slice(&self.n_threads.to_be_bytes());
        buf[20..24].copy_from_slice(&self.msg_size.to_be_bytes());
        buf[24] = self.tcp_nodelay as u8;
        buf
    }

    /// Decodes from the wire form, validating `length` and `version`.
    pub fn from_be_bytes(buf: &[u8]) -> Result<Self, ProtoError> {
        let length = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        if length != Self::WIRE_LEN {
            return Err(ProtoError::BadLength {
                got: length,
                expected: Self::WIRE_LEN,
            });
        }
        let version = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        if version != CTRL_VERSION {
            return Err(ProtoError::VersionMismatch {
                got: version,
                ours: CTRL_VERSION,
            });
        }
        Ok(ClientStart {
            test_id: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            mode: TestMode::from_wire(u32::from_be_bytes(buf[12..16].try_into().unwrap()))?,
            n_threads: u32::from_be_bytes(buf[16..20].try_into().unwrap()),
            msg_size: u32::from_be_bytes(buf[20..24].try_into().unwrap()),
            tcp_nodelay: buf[24] != 0,
        })
    }
}

/// server → client: the ephemeral data-plane port to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStart {
    /// Echoed from the `ClientStart` that prompted this reply.
    pub test_id: u32,
    /// Ephemeral TCP port the server's data listener bound to.
    pub data_port: u16,
}

impl ServerStart {
    /// Encoded size on the wire: three `u32` header/payload fields, plus
    /// `data_port` and 2 bytes of trailing pad to a 4-byte boundary.
    pub const WIRE_LEN: u32 = 4 + 4 + 4 + 2 + 2;

    /// Encodes to the 16-byte wire form (padded to 4-byte alignment).
    pub fn to_be_bytes(self) -> [u8; Self::WIRE_LEN as usize] {
        let mut buf = [0u8; Self::WIRE_LEN as usize];
        buf[0..4].copy_from_slice(&Self::WIRE_LEN.to_be_bytes());
        buf[4..8].copy_from_slice(&CTRL_VERSION.to_be_bytes());
        buf[8..12].copy_from_slice(&self.test_id.to_be_bytes());
        buf[12..14].copy_from_slice(&self.data_port.to_be_bytes());
        buf
    }

    /// Decodes from the wire form, validating `length` and `version`.
    pub fn from_be_bytes(buf: &[u8]) -> Result<Self, ProtoError> {
        let length = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        if length != Self::WIRE_LEN {
            return Err(ProtoError::BadLength {
                got: length,
                expected: Self::WIRE_LEN,
            });
        }
        let version = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        if version != CTRL_VERSION {
            return Err(ProtoError::VersionMismatch {
                got: version,
                ours: CTRL_VERSION,
            });
        }
        Ok(ServerStart {
            test_id: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            data_port: u16::from_be_bytes(buf[12..14].try_into().unwrap()),
        })
    }
}

/// server → client: test outcome header, followed by `n_threads` many
/// [`ThreadInfo`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerEnd {
    /// Echoed from the originating `ClientStart`.
    pub test_id: u32,
    /// 0 on success, nonzero on server-side failure.
    pub status: u32,
    /// Wire size of each following `ThreadInfo`; always [`ThreadInfo::WIRE_LEN`]
    /// from a conforming peer, but checked rather than assumed.
    pub thread_info_length: u32,
    /// Number of `ThreadInfo` records that follow.
    pub n_threads: u32,
}

impl ServerEnd {
    /// Encoded size on the wire.
    pub const WIRE_LEN: u32 = 4 * 6;

    /// Encodes to the wire form.
    pub fn to_be_bytes(self) -> [u8; Self::WIRE_LEN as usize] {
        let mut buf = [0u8; Self::WIRE_LEN as usize];
        buf[0..4].copy_from_slice(&Self::WIRE_LEN.to_be_bytes());
        buf[4..8].copy_from_slice(&CTRL_VERSION.to_be_bytes());
        buf[8..12].copy_from_slice(&self.test_id.to_be_bytes());
        buf[12..16].copy_from_slice(&self.status.to_be_bytes());
        buf[16..20].copy_from_slice(&self.thread_info_length.to_be_bytes());
        buf[20..24].copy_from_slice(&self.n_threads.to_be_bytes());
        buf
    }

    /// Decodes from the wire form, validating `length` and `version`.
    pub fn from_be_bytes(buf: &[u8]) -> Result<Self, ProtoError> {
        let length = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        if length != Self::WIRE_LEN {
            return Err(ProtoError::BadLength {
                got: length,
                expected: Self::WIRE_LEN,
            });
        }
        let version = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        if version != CTRL_VERSION {
            return Err(ProtoError::VersionMismatch {
                got: version,
                ours: CTRL_VERSION,
            });
        }
        Ok(ServerEnd {
            test_id: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            status: u32::from_be_bytes(buf[12..16].try_into().unwrap()),
            thread_info_length: u32::from_be_bytes(buf[16..20].try_into().unwrap()),
            n_threads: u32::from_be_bytes(buf[20..24].try_into().unwrap()),
        })
    }
}

/// One per worker thread, following a `ServerEnd`, in accept order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    /// That worker's transfer counters.
    pub stats: XferStats,
    /// Worker's terminal status: 0 normal, negative an OS error code,
    /// positive a protocol error.
    pub status: i32,
    /// The data connection's client-side ephemeral port, used by the client
    /// to correlate this record back to a local worker.
    pub client_port: u16,
}

impl ThreadInfo {
    /// Encoded size on the wire: `XferStats` (48) + status (4) + port (2) +
    /// padding (2).
    pub const WIRE_LEN: usize = XFER_STATS_WIRE_LEN + 4 + 2 + 2;

    /// Encodes to the wire form. `ThreadInfo` is not length/version framed
    /// on its own — it's a fixed-size record inside a `ServerEnd` batch —
    /// so there is no header to write here.
    pub fn to_be_bytes(self) -> [u8; Self::WIRE_LEN] {
        let mut buf = [0u8; Self::WIRE_LEN];
        buf[0..XFER_STATS_WIRE_LEN].copy_from_slice(&self.stats.to_be_bytes());
        buf[XFER_STATS_WIRE_LEN..XFER_STATS_WIRE_LEN + 4]
            .copy_from_slice(&self.status.to_be_bytes());
        buf[XFER_STATS_WIRE_LEN + 4..XFER_STATS_WIRE_LEN + 6]
            .copy_from_slice(&self.client_port.to_be_bytes());
        buf
    }

    /// Decodes from the wire form produced by [`ThreadInfo::to_be_bytes`].
    pub fn from_be_bytes(buf: &[u8; Self::WIRE_LEN]) -> Self {
        let stats_bytes: [u8; XFER_STATS_WIRE_LEN] =
            buf[0..XFER_STATS_WIRE_LEN].try_into().unwrap();
        ThreadInfo {
            stats: XferStats::from_be_bytes(&stats_bytes),
            status: i32::from_be_bytes(
                buf[XFER_STATS_WIRE_LEN..XFER_STATS_WIRE_LEN + 4]
                    .try_into()
                    .unwrap(),
            ),
            client_port: u16::from_be_bytes(
                buf[XFER_STATS_WIRE_LEN + 4..XFER_STATS_WIRE_LEN + 6]
                    .try_into()
                    .unwrap(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_start_round_trips() {
        let msg = ClientStart {
            test_id: 1,
            mode: TestMode::TcpRr,
            n_threads: 4,
            msg_size: 64,
            tcp_nodelay: true,
        };
        let decoded = ClientStart::from_be_bytes(&msg.to_be_bytes()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn client_start_rejects_bad_version() {
        let msg = ClientStart {
            test_id: 1,
            mode: TestMode::TcpStream,
            n_threads: 1,
            msg_size: 1,
            tcp_nodelay: false,
        };
        let mut bytes = msg.to_be_bytes();
        bytes[4..8].copy_from_slice(&99u32.to_be_bytes());
        assert!(matches!(
            ClientStart::from_be_bytes(&bytes),
            Err(ProtoError::VersionMismatch { got: 99, .. })
        ));
    }

    #[test]
    fn server_start_round_trips() {
        let msg = ServerStart {
            test_id: 7,
            data_port: 54321,
        };
        let decoded = ServerStart::from_be_bytes(&msg.to_be_bytes()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn server_end_round_trips() {
        let msg = ServerEnd {
            test_id: 1,
            status: 0,
            thread_info_length: ThreadInfo::WIRE_LEN as u32,
            n_threads: 8,
        };
        let decoded = ServerEnd::from_be_bytes(&msg.to_be_bytes()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn thread_info_round_trips() {
        let info = ThreadInfo {
            stats: XferStats::default(),
            status: -32,
            client_port: 44321,
        };
        let decoded = ThreadInfo::from_be_bytes(&info.to_be_bytes());
        assert_eq!(decoded, info);
    }

    #[test]
    fn bad_length_is_rejected() {
        let mut bytes = [0u8; ServerStart::WIRE_LEN as usize];
        bytes[0..4].copy_from_slice(&999u32.to_be_bytes());
        assert!(matches!(
            ServerStart::from_be_bytes(&bytes),
            Err(ProtoError::BadLength { got: 999, .. })
        ));
    }
}
