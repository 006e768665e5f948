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

//! Transfer counters: the `XferStats` data model from spec.md §3.

/// Wire size of one [`XferStats1`] (3 × u64, big-endian).
pub const XFER_STATS_1_WIRE_LEN: usize = 24;

/// Wire size of one [`XferStats`] (rx then tx, 48 bytes total).
pub const XFER_STATS_WIRE_LEN: usize = 2 * XFER_STATS_1_WIRE_LEN;

/// One direction's worth of transfer counters.
///
/// Invariant (spec.md §3): `bytes >= msgs * msg_size - msg_size` (a
/// partially completed final message contributes bytes but not msgs), and
/// `calls >= msgs`. These invariants are maintained by the worker loops in
/// `nperf-core`, not enforced here — this type is a plain counter bag.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct XferStats1 {
    /// Completed application messages of the configured size.
    pub msgs: u64,
    /// Underlying `send`/`recv` syscalls issued.
    pub calls: u64,
    /// Octets successfully moved.
    pub bytes: u64,
}

impl XferStats1 {
    /// Adds another direction's counters into this one in place.
    pub fn add(&mut self, other: &XferStats1) {
        self.msgs += other.msgs;
        self.calls += other.calls;
        self.bytes += other.bytes;
    }

    fn encode_into(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.msgs.to_be_bytes());
        out[8..16].copy_from_slice(&self.calls.to_be_bytes());
        out[16..24].copy_from_slice(&self.bytes.to_be_bytes());
    }

    fn decode_from(buf: &[u8]) -> Self {
        XferStats1 {
            msgs: u64::from_be_bytes(buf[0..8].try_into().unwrap()),
            calls: u64::from_be_bytes(buf[8..16].try_into().unwrap()),
            bytes: u64::from_be_bytes(buf[16..24].try_into().unwrap()),
        }
    }
}

/// Both directions' transfer counters for one worker (or an aggregate over
/// several workers).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct XferStats {
    /// Bytes/messages/calls received.
    pub rx: XferStats1,
    /// Bytes/messages/calls sent.
    pub tx: XferStats1,
}

impl XferStats {
    /// Resets all counters to zero. Called at the top of each iteration;
    /// counters are otherwise append-only within an iteration.
    pub fn reset(&mut self) {
        *self = XferStats::default();
    }

    /// Adds another worker's (or aggregate's) counters into this one.
    pub fn add(&mut self, other: &XferStats) {
        self.rx.add(&other.rx);
        self.tx.add(&other.tx);
    }

    /// Serializes to the 48-byte big-endian wire form (rx then tx).
    pub fn to_be_bytes(self) -> [u8; XFER_STATS_WIRE_LEN] {
        let mut buf = [0u8; XFER_STATS_WIRE_LEN];
        self.rx.encode_into(&mut buf[0..XFER_STATS_1_WIRE_LEN]);
        self.tx.encode_into(&mut buf[XFER_STATS_1_WIRE_LEN..]);
        buf
    }

    /// Parses the 48-byte big-endian wire form produced by
    /// [`XferStats::to_be_bytes`].
    pub fn from_be_bytes(buf: &[u8; XFER_STATS_WIRE_LEN]) -> Self {
        XferStats {
            rx: XferStats1::decode_from(&buf[0..XFER_STATS_1_WIRE_LEN]),
            tx: XferStats1::decode_from(&buf[XFER_STATS_1_WIRE_LEN..]),
        }
    }

    /// The aggregate statistic for one iteration, per spec.md §4.4:
    /// bytes/sec received by the server in stream mode, replies received by
    /// the client in RR mode. `server` is the peer's reported counters for
    /// the same worker(s); `self` is the local (client) side.
    pub fn result(&self, server: &XferStats, mode: crate::mode::TestMode, elapsed: f64) -> f64 {
        match mode {
            crate::mode::TestMode::TcpStream => server.rx.bytes as f64 / elapsed,
            crate::mode::TestMode::TcpRr => self.rx.msgs as f64 / elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::TestMode;

    fn sample() -> XferStats {
        XferStats {
            rx: XferStats1 {
                msgs: 10,
                calls: 12,
                bytes: 10_240,
            },
            tx: XferStats1 {
                msgs: 20,
                calls: 25,
                bytes: 20_480,
            },
        }
    }

    #[test]
    fn round_trips_through_wire_form() {
        let stats = sample();
        let encoded = stats.to_be_bytes();
        assert_eq!(XferStats::from_be_bytes(&encoded), stats);
    }

    #[test]
    fn add_accumulates_both_directions() {
        let mut total = XferStats::default();
        total.add(&sample());
        total.add(&sample());
        assert_eq!(total.rx.bytes, 20_480);
        assert_eq!(total.tx.msgs, 40);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut stats = sample();
        stats.reset();
        assert_eq!(stats, XferStats::default());
    }

    #[test]
    fn result_uses_server_rx_bytes_for_stream_mode() {
        let client = sample();
        let server = XferStats {
            rx: XferStats1 {
                bytes: 5_000,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = client.result(&server, TestMode::TcpStream, 2.0);
        assert_eq!(result, 2_500.0);
    }

    #[test]
    fn result_uses_own_rx_msgs_for_rr_mode() {
        let client = sample();
        let server = XferStats::default();
        let result = client.result(&server, TestMode::TcpRr, 2.0);
        assert_eq!(result, 5.0);
    }
}
