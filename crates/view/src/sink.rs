//! Where rendered lines go. The host UI would back this with a real
//! buffer; a small trait lets views, tests, and the CLI each plug their
//! own.

/// An ordered, addressable line destination.
pub trait Sink: Send {
    /// Whether the destination still exists (a closed buffer is invalid).
    fn is_valid(&self) -> bool;

    /// Current addressable length in lines.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn replace_all(&mut self, lines: Vec<String>);
    fn append_lines(&mut self, lines: Vec<String>);
    fn insert_lines(&mut self, at: usize, lines: Vec<String>);
    fn delete_range(&mut self, start: usize, count: usize);
}

/// A shared handle works as a sink, so the host can keep inspecting a
/// buffer it handed to a view.
impl<S: Sink> Sink for std::sync::Arc<std::sync::Mutex<S>> {
    fn is_valid(&self) -> bool {
        self.lock().expect("shared sink poisoned").is_valid()
    }

    fn len(&self) -> usize {
        self.lock().expect("shared sink poisoned").len()
    }

    fn replace_all(&mut self, lines: Vec<String>) {
        self.lock().expect("shared sink poisoned").replace_all(lines);
    }

    fn append_lines(&mut self, lines: Vec<String>) {
        self.lock().expect("shared sink poisoned").append_lines(lines);
    }

    fn insert_lines(&mut self, at: usize, lines: Vec<String>) {
        self.lock()
            .expect("shared sink poisoned")
            .insert_lines(at, lines);
    }

    fn delete_range(&mut self, start: usize, count: usize) {
        self.lock()
            .expect("shared sink poisoned")
            .delete_range(start, count);
    }
}

/// Every mutation a [`MemorySink`] has seen, for asserting flush behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    ReplaceAll { count: usize },
    Append { at: usize, count: usize },
    Insert { at: usize, count: usize },
    Delete { start: usize, count: usize },
}

/// In-memory sink that records each call; the test double for the host
/// buffer.
#[derive(Default)]
pub struct MemorySink {
    lines: Vec<String>,
    calls: Vec<SinkCall>,
    invalid: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn calls(&self) -> &[SinkCall] {
        &self.calls
    }

    /// Simulate the host closing the buffer.
    pub fn invalidate(&mut self) {
        self.invalid = true;
    }
}

impl Sink for MemorySink {
    fn is_valid(&self) -> bool {
        !self.invalid
    }

    fn len(&self) -> usize {
        self.lines.len()
    }

    fn replace_all(&mut self, lines: Vec<String>) {
        self.calls.push(SinkCall::ReplaceAll { count: lines.len() });
        self.lines = lines;
    }

    fn append_lines(&mut self, lines: Vec<String>) {
        self.calls.push(SinkCall::Append {
            at: self.lines.len(),
            count: lines.len(),
        });
        self.lines.extend(lines);
    }

    fn insert_lines(&mut self, at: usize, lines: Vec<String>) {
        self.calls.push(SinkCall::Insert {
            at,
            count: lines.len(),
        });
        self.lines.splice(at..at, lines);
    }

    fn delete_range(&mut self, start: usize, count: usize) {
        self.calls.push(SinkCall::Delete { start, count });
        self.lines.drain(start..start + count);
    }
}

/// Append-only stdout sink for the CLI. Middle edits make no sense on a
/// terminal stream, so inserts print in place and deletes are dropped.
#[derive(Default)]
pub struct StdoutSink {
    len: usize,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for StdoutSink {
    fn is_valid(&self) -> bool {
        true
    }

    fn len(&self) -> usize {
        self.len
    }

    fn replace_all(&mut self, lines: Vec<String>) {
        self.append_lines(lines);
    }

    fn append_lines(&mut self, lines: Vec<String>) {
        self.len += lines.len();
        for line in lines {
            println!("{line}");
        }
    }

    fn insert_lines(&mut self, _at: usize, lines: Vec<String>) {
        self.append_lines(lines);
    }

    fn delete_range(&mut self, _start: usize, _count: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_applies_and_records_edits() {
        let mut sink = MemorySink::new();
        sink.append_lines(vec!["a".into(), "b".into()]);
        sink.insert_lines(1, vec!["mid".into()]);
        sink.delete_range(0, 1);
        assert_eq!(sink.lines(), ["mid", "b"]);
        assert_eq!(
            sink.calls(),
            [
                SinkCall::Append { at: 0, count: 2 },
                SinkCall::Insert { at: 1, count: 1 },
                SinkCall::Delete { start: 0, count: 1 },
            ]
        );
        assert!(sink.is_valid());
        sink.invalidate();
        assert!(!sink.is_valid());
    }
}
