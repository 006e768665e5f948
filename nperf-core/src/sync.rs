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

//! Phase barrier shared by a pool of workers and its controller (spec.md
//! §4.1).
//!
//! A single condition variable carries both "rendezvous" (wait for the
//! counter to reach N) and "sleep for exactly this long regardless of
//! wall-clock changes" semantics, since [`Condvar::wait_timeout`] is always
//! measured against a monotonic clock.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A pool's lifecycle phase. Ordered: a worker's observed phases are a
/// non-decreasing subsequence of this sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Workers are allocating resources and signaling readiness.
    Init,
    /// Workers are opening (client) or accepting (server) data connections.
    Connect,
    /// Workers are running their send/recv loop.
    Run,
    /// The iteration has ended; workers are joining.
    Finished,
}

struct Inner {
    phase: Phase,
    counter: u32,
}

/// The barrier + phase broadcast + interruptible sleep primitive used by
/// both the client and server worker pools.
///
/// Outlives any single iteration and is reused across iterations; callers
/// are expected to call [`WorkerSync::reset`] at the top of each one.
#[derive(Debug)]
pub struct WorkerSync {
    inner: Mutex<Inner>,
    cv: Condvar,
}

impl Default for WorkerSync {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSync {
    /// Creates a new barrier in [`Phase::Init`] with a zeroed counter.
    pub fn new() -> Self {
        WorkerSync {
            inner: Mutex::new(Inner {
                phase: Phase::Init,
                counter: 0,
            }),
            cv: Condvar::new(),
        }
    }

    /// Resets to [`Phase::Init`] with a zeroed counter. Called by the
    /// controller at the top of each iteration.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.phase = Phase::Init;
        inner.counter = 0;
        self.cv.notify_all();
    }

    /// Writes the new phase and wakes every waiter. Called only by the
    /// controller.
    pub fn set_state(&self, phase: Phase) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.phase = phase;
        self.cv.notify_all();
    }

    /// Blocks until the phase has reached (or passed) `phase`. Called by
    /// workers.
    pub fn wait_for_state(&self, phase: Phase) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        while inner.phase < phase {
            inner = self.cv.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Zeroes the rendezvous counter without touching the phase. Called by
    /// the controller between successive rendezvous points within the same
    /// iteration (e.g. between the INIT and CONNECT counts).
    pub fn reset_counter(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.counter = 0;
        self.cv.notify_all();
    }

    /// Monotonically increments the rendezvous counter and wakes every
    /// waiter. Called by workers as they reach a phase.
    pub fn inc_counter(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.counter += 1;
        self.cv.notify_all();
    }

    /// Blocks until the rendezvous counter has reached at least `target`.
    /// Called by the controller.
    pub fn wait_for_counter(&self, target: u32) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        while inner.counter < target {
            inner = self.cv.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Sleeps for `duration`, measured against the monotonic clock used by
    /// [`Condvar::wait_timeout`]. This is the controller's test-interval
    /// timer and must not be affected by wall-clock jumps.
    ///
    /// Returns once `duration` has elapsed; spurious wakeups are absorbed
    /// by re-checking the deadline rather than propagated to the caller.
    pub fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let (guard, timeout) = self
                .cv
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
            if timeout.timed_out() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn rendezvous_releases_once_counter_reached() {
        let sync = Arc::new(WorkerSync::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let sync = Arc::clone(&sync);
            handles.push(thread::spawn(move || {
                sync.inc_counter();
            }));
        }
        sync.wait_for_counter(4);
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn wait_for_state_unblocks_on_set_state() {
        let sync = Arc::new(WorkerSync::new());
        let worker_sync = Arc::clone(&sync);
        let handle = thread::spawn(move || {
            worker_sync.wait_for_state(Phase::Run);
        });
        thread::sleep(Duration::from_millis(10));
        sync.set_state(Phase::Connect);
        sync.set_state(Phase::Run);
        handle.join().unwrap();
    }

    #[test]
    fn sleep_returns_after_duration_elapses() {
        let sync = WorkerSync::new();
        let start = Instant::now();
        sync.sleep(Duration::from_millis(30));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn reset_zeroes_counter_and_phase() {
        let sync = WorkerSync::new();
        sync.inc_counter();
        sync.inc_counter();
        sync.set_state(Phase::Run);
        sync.reset();
        sync.wait_for_counter(0);
        sync.wait_for_state(Phase::Init);
    }
}
