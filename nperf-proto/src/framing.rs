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

//! Read/write discipline for the control channel.
//!
//! Every control message is a fixed-size, length+version prefixed block.
//! [`send_block`] and [`recv_block`] move exactly `buf.len()` bytes,
//! transparently retrying on [`io::ErrorKind::Interrupted`]; [`recv_header`]
//! additionally validates the `length`/`version` header before the rest of
//! the message is read, so a malformed peer is rejected before we commit to
//! reading a (possibly wrong) number of further bytes.

use std::io::{self, Read, Write};

use crate::error::ProtoError;
use crate::CTRL_VERSION;

/// Writes `buf` in full, retrying short writes and `Interrupted` errors.
///
/// Mirrors `send_block()`'s retry-on-`EINTR`, loop-until-exhausted
/// behavior; a write of zero bytes on a blocking stream would mean the
/// kernel is broken, not that we should keep looping, so `write` returning
/// `Ok(0)` is surfaced as [`io::ErrorKind::WriteZero`] like
/// `Write::write_all` already does.
pub fn send_block<W: Write>(mut w: W, buf: &[u8]) -> Result<(), ProtoError> {
    let mut rest = buf;
    while !rest.is_empty() {
        match w.write(rest) {
            Ok(0) => {
                return Err(ProtoError::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write returned Ok(0) writing control message",
                )))
            }
            Ok(n) => rest = &rest[n..],
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtoError::Io(e)),
        }
    }
    Ok(())
}

/// Reads exactly `buf.len()` bytes, retrying `Interrupted` errors.
///
/// A read of zero bytes before `buf` is full means the peer closed the
/// connection mid-message, reported as [`ProtoError::UnexpectedEof`] rather
/// than a raw I/O error so callers can distinguish a clean disconnect from
/// a protocol violation.
pub fn recv_block<R: Read>(mut r: R, buf: &mut [u8]) -> Result<(), ProtoError> {
    let total = buf.len();
    let mut filled = 0;
    while filled < total {
        match r.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(ProtoError::UnexpectedEof {
                    received: filled,
                    expected: total,
                })
            }
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtoError::Io(e)),
        }
    }
    Ok(())
}

/// Reads a fixed-size control message into `buf`, then validates its
/// `length` (first 4 bytes, big-endian) and `version` (next 4 bytes)
/// header fields before returning.
///
/// `buf.len()` must equal the expected wire length of the message type
/// being read; this is a programmer invariant upheld by the typed
/// `from_be_bytes` constructors in [`crate::messages`], not re-checked here.
pub fn recv_header<R: Read>(r: R, buf: &mut [u8]) -> Result<(), ProtoError> {
    recv_block(r, buf)?;
    let expected = buf.len() as u32;
    let length = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    if length != expected {
        return Err(ProtoError::BadLength {
            got: length,
            expected,
        });
    }
    let version = u32::from_be_bytes(buf[4..8].try_into().unwrap());
    if version != CTRL_VERSION {
        return Err(ProtoError::VersionMismatch {
            got: version,
            ours: CTRL_VERSION,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn send_then_recv_block_round_trips() {
        let payload = b"the quick brown fox";
        let mut out = Vec::new();
        send_block(&mut out, payload).unwrap();
        assert_eq!(out, payload);

        let mut buf = [0u8; 19];
        recv_block(Cursor::new(out), &mut buf).unwrap();
        assert_eq!(&buf, payload);
    }

    #[test]
    fn recv_block_reports_eof_short_of_target() {
        let mut buf = [0u8; 8];
        let err = recv_block(Cursor::new(vec![1, 2, 3]), &mut buf).unwrap_err();
        assert!(matches!(
            err,
            ProtoError::UnexpectedEof {
                received: 3,
                expected: 8
            }
        ));
    }

    #[test]
    fn recv_header_validates_length_and_version() {
        let mut buf = [0u8; 12];
        buf[0..4].copy_from_slice(&12u32.to_be_bytes());
        buf[4..8].copy_from_slice(&CTRL_VERSION.to_be_bytes());
        let mut target = [0u8; 12];
        recv_header(Cursor::new(buf), &mut target).unwrap();
        assert_eq!(target, buf);
    }

    #[test]
    fn recv_header_rejects_wrong_length() {
        let mut buf = [0u8; 12];
        buf[0..4].copy_from_slice(&999u32.to_be_bytes());
        buf[4..8].copy_from_slice(&CTRL_VERSION.to_be_bytes());
        let mut target = [0u8; 12];
        let err = recv_header(Cursor::new(buf), &mut target).unwrap_err();
        assert!(matches!(
            err,
            ProtoError::BadLength {
                got: 999,
                expected: 12
            }
        ));
    }

    #[test]
    fn recv_header_rejects_wrong_version() {
        let mut buf = [0u8; 12];
        buf[0..4].copy_from_slice(&12u32.to_be_bytes());
        buf[4..8].copy_from_slice(&7u32.to_be_bytes());
        let mut target = [0u8; 12];
        let err = recv_header(Cursor::new(buf), &mut target).unwrap_err();
        assert!(matches!(
            err,
            ProtoError::VersionMismatch { got: 7, ours: 1 }
        ));
    }
}
