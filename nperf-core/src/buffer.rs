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

//! A worker's pre-allocated, page-aligned send/receive scratch area
//! (spec.md §3).
//!
//! Each worker owns exactly one `Buffer` sized to its message granularity.
//! Unlike a growable arena, this buffer never reallocates once built: its
//! capacity is fixed at `⌈msg_size / page_size⌉ × page_size` for its whole
//! lifetime.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

fn page_size() -> usize {
    // Safety: `sysconf` with `_SC_PAGESIZE` is always safe to call and
    // returns a small positive value on every platform we target.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

/// A fixed-capacity, page-aligned byte buffer used as one worker's
/// send/receive scratch area.
#[derive(Debug)]
pub struct Buffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

// Safety: `Buffer` owns its allocation exclusively and exposes no shared
// mutable aliasing; it is handed to exactly one worker thread per
// iteration and never touched concurrently.
unsafe impl Send for Buffer {}

impl Buffer {
    /// Allocates a zeroed buffer large enough for `msg_size` bytes, rounded
    /// up to a whole number of pages.
    ///
    /// Aborts the process on allocation failure, matching the teacher's
    /// `handle_alloc_error` convention: a scratch buffer failing to
    /// allocate means the host is out of memory, not a recoverable
    /// condition a worker should propagate as a `Result`.
    pub fn new(msg_size: usize) -> Self {
        let page = page_size();
        let msg_size = msg_size.max(1);
        let len = ((msg_size + page - 1) / page) * page;
        let layout = Layout::from_size_align(len, page).expect("buffer layout");

        // Safety: `layout` has nonzero size (at least one page).
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(p) => p,
            None => alloc::handle_alloc_error(layout),
        };

        Buffer { ptr, len, layout }
    }

    /// Total capacity in bytes (a whole number of pages).
    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Borrows the whole buffer for reading.
    pub fn as_slice(&self) -> &[u8] {
        // Safety: `ptr` is valid for `len` bytes for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Borrows the whole buffer for writing.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: `ptr` is valid for `len` bytes for the lifetime of `self`,
        // and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Borrows the leading `msg_size` bytes of the buffer, the portion a
    /// worker actually sends or receives into each message.
    pub fn message(&self, msg_size: usize) -> &[u8] {
        &self.as_slice()[..msg_size]
    }

    /// Mutable counterpart of [`Buffer::message`].
    pub fn message_mut(&mut self, msg_size: usize) -> &mut [u8] {
        &mut self.as_mut_slice()[..msg_size]
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // Safety: `ptr`/`layout` are exactly those used to allocate.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_capacity_up_to_a_whole_page() {
        let buf = Buffer::new(1);
        assert!(buf.capacity() >= page_size());
        assert_eq!(buf.capacity() % page_size(), 0);
    }

    #[test]
    fn exact_multiple_of_page_size_is_unchanged() {
        let page = page_size();
        let buf = Buffer::new(page * 3);
        assert_eq!(buf.capacity(), page * 3);
    }

    #[test]
    fn is_zeroed_on_allocation() {
        let buf = Buffer::new(256);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn message_slice_has_requested_length() {
        let buf = Buffer::new(4096);
        assert_eq!(buf.message(100).len(), 100);
    }
}
