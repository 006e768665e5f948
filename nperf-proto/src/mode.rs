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

//! Test mode: one-way throughput or request/response transaction rate.

use crate::error::ProtoError;

/// Which workload the data-plane workers run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestMode {
    /// One-way bulk transfer: client sends, server receives.
    TcpStream,
    /// Request/response: client sends a message, then waits for a
    /// same-size reply before sending the next one.
    TcpRr,
}

impl TestMode {
    /// Decodes the wire representation of `mode` (spec.md §6.1).
    pub fn from_wire(value: u32) -> Result<Self, ProtoError> {
        match value {
            0 => Ok(TestMode::TcpStream),
            1 => Ok(TestMode::TcpRr),
            other => Err(ProtoError::UnknownMode(other)),
        }
    }

    /// Encodes to the wire representation of `mode`.
    pub fn to_wire(self) -> u32 {
        match self {
            TestMode::TcpStream => 0,
            TestMode::TcpRr => 1,
        }
    }

    /// Whether a worker running this mode expects a reply after each send
    /// (`reply` flag on the worker descriptor in spec.md §3).
    pub fn expects_reply(self) -> bool {
        matches!(self, TestMode::TcpRr)
    }

    /// Short name used in CLI help and result headers.
    pub fn name(self) -> &'static str {
        match self {
            TestMode::TcpStream => "TCP_STREAM",
            TestMode::TcpRr => "TCP_RR",
        }
    }
}

impl std::fmt::Display for TestMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TCP_STREAM" | "STREAM" => Ok(TestMode::TcpStream),
            "TCP_RR" | "RR" => Ok(TestMode::TcpRr),
            other => Err(format!("unknown test mode '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip() {
        for mode in [TestMode::TcpStream, TestMode::TcpRr] {
            assert_eq!(TestMode::from_wire(mode.to_wire()).unwrap(), mode);
        }
    }

    #[test]
    fn unknown_wire_value_errors() {
        assert!(matches!(
            TestMode::from_wire(2),
            Err(ProtoError::UnknownMode(2))
        ));
    }

    #[test]
    fn parses_from_str_case_insensitively() {
        assert_eq!("tcp_stream".parse::<TestMode>().unwrap(), TestMode::TcpStream);
        assert_eq!("RR".parse::<TestMode>().unwrap(), TestMode::TcpRr);
        assert!("bogus".parse::<TestMode>().is_err());
    }
}
