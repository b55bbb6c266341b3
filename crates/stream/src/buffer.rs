//! Append-only line store shared between the reader task and the flush
//! side. Entries are never removed or rewritten, and the committed length
//! is published atomically, so a consumer may snapshot `len()` and read
//! `0..len` without holding the writer up.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct LineBuffer {
    lines: Mutex<Vec<String>>,
    len: AtomicUsize,
    finished: AtomicBool,
    failed: AtomicBool,
    error: Mutex<Option<String>>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: String) {
        let mut lines = self.lines.lock().expect("line buffer poisoned");
        lines.push(line);
        self.len.store(lines.len(), Ordering::Release);
    }

    /// Committed length; everything below it is stable.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the stable range `[start, end)`. `end` must come from a
    /// prior `len()` snapshot.
    pub fn range(&self, start: usize, end: usize) -> Vec<String> {
        let lines = self.lines.lock().expect("line buffer poisoned");
        lines[start..end].to_vec()
    }

    /// Full copy of the stable prefix.
    pub fn contents(&self) -> Vec<String> {
        let end = self.len();
        self.range(0, end)
    }

    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn mark_failed(&self, error: &str) {
        *self.error.lock().expect("line buffer poisoned") = Some(error.to_string());
        self.failed.store(true, Ordering::Release);
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().expect("line buffer poisoned").clone()
    }
}
