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

//! Cooperative worker cancellation (spec.md §4.2, §9).
//!
//! The upstream design wakes a blocked worker by sending it a signal whose
//! handler is installed with `SA_RESTART` cleared, so the interrupted
//! syscall returns `EINTR` instead of being transparently retried. Rust's
//! standard library retries `Interrupted` internally in its `Read`/`Write`
//! implementations, which defeats that mechanism outright — exactly the
//! substitution spec.md's design notes call for: shutting the socket down
//! for read and write forces any in-progress `recv`/`send` to return
//! immediately, signal or no signal.
//!
//! `Cancel` carries both the flag and a registry of each worker's data
//! socket, so [`Cancel::signal`] can shut every one of them down in one
//! call instead of requiring the controller to track sockets itself.

use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A flag a worker checks between syscalls to cooperatively unwind its
/// loop, matching the `test_finished` field of spec.md's worker
/// descriptor, plus a registry of live sockets the controller can shut
/// down to force an in-progress blocking call to return immediately.
///
/// The flag alone only stops a worker between syscalls; a worker blocked
/// inside `send`/`recv` right now needs its socket shut down from the
/// outside; see the module docs for why this substitutes for the
/// signal-based wakeup.
#[derive(Debug, Default)]
pub struct Cancel {
    finished: AtomicBool,
    sockets: Mutex<Vec<Option<TcpStream>>>,
}

impl Cancel {
    /// Creates a fresh, unset flag with room to register `n_threads`
    /// worker sockets.
    pub fn new(n_threads: usize) -> Self {
        Cancel {
            finished: AtomicBool::new(false),
            sockets: Mutex::new((0..n_threads).map(|_| None).collect()),
        }
    }

    /// True once the controller has requested cancellation.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Registers worker `id`'s data socket so a later [`Cancel::signal`]
    /// can shut it down. Called by a worker right after it connects.
    pub fn register(&self, id: usize, stream: &TcpStream) {
        if let Ok(clone) = stream.try_clone() {
            let mut sockets = self.sockets.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = sockets.get_mut(id) {
                *slot = Some(clone);
            }
        }
    }

    /// Requests cancellation: sets the flag, then shuts down every
    /// registered socket for both directions so any worker currently
    /// blocked in `send`/`recv` returns immediately instead of waiting for
    /// its next between-syscalls check.
    pub fn signal(&self) {
        self.finished.store(true, Ordering::Release);
        let sockets = self.sockets.lock().unwrap_or_else(|e| e.into_inner());
        for socket in sockets.iter().flatten() {
            let _ = socket.shutdown(Shutdown::Both);
        }
    }

    /// Resets the flag and socket registry to a fresh, unset state. Called
    /// by the controller at the top of an iteration, before reusing this
    /// `Cancel` for the next one.
    pub fn reset(&self) {
        self.finished.store(false, Ordering::Release);
        let mut sockets = self.sockets.lock().unwrap_or_else(|e| e.into_inner());
        sockets.iter_mut().for_each(|s| *s = None);
    }

    /// A relaxed-ordering read, adequate for the hot loop's per-syscall
    /// poll: the only requirement is that the flag is eventually observed,
    /// and the controller's subsequent `join` provides the ordering the
    /// counters need.
    pub(crate) fn finished_relaxed(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset() {
        assert!(!Cancel::new(4).is_finished());
    }

    #[test]
    fn signal_then_reset_round_trips() {
        let cancel = Cancel::new(4);
        cancel.signal();
        assert!(cancel.is_finished());
        cancel.reset();
        assert!(!cancel.is_finished());
    }
}
