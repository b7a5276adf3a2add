//! Byte-oriented backlog ring for late-joining viewers
//!
//! A single fixed allocation tracked by `(head, used)`. New lines evict the
//! oldest bytes; a line at least as long as the whole ring replaces it with
//! the line's tail. Eviction is byte-granular, so the oldest retained line
//! may start mid-way.
//!
//! The ring itself is not synchronised. The console wraps it in a
//! `parking_lot::Mutex` shared between the drain loop (the only writer) and
//! viewer-connect callbacks (readers).

/// Circular byte buffer retaining the most recent `capacity` bytes
#[derive(Debug)]
pub struct Backlog {
    buf: Box<[u8]>,
    head: usize,
    used: usize,
}

impl Backlog {
    /// Allocate a backlog of `capacity` bytes; 0 disables it
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            used: 0,
        }
    }

    /// Total capacity in bytes
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently retained
    pub fn used(&self) -> usize {
        self.used
    }

    /// Whether nothing is retained
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Append a line, evicting the oldest bytes as needed
    pub fn push(&mut self, line: &[u8]) {
        let cap = self.buf.len();
        if cap == 0 || line.is_empty() {
            return;
        }

        if line.len() >= cap {
            self.buf.copy_from_slice(&line[line.len() - cap..]);
            self.head = 0;
            self.used = cap;
            return;
        }

        if self.used + line.len() > cap {
            let evict = (self.used + line.len() - cap).min(self.used);
            self.head = (self.head + evict) % cap;
            self.used -= evict;
        }

        let tail = (self.head + self.used) % cap;
        let first = line.len().min(cap - tail);
        self.buf[tail..tail + first].copy_from_slice(&line[..first]);
        if first < line.len() {
            self.buf[..line.len() - first].copy_from_slice(&line[first..]);
        }
        self.used += line.len();
    }

    /// Retained bytes in chronological order
    pub fn snapshot(&self) -> Vec<u8> {
        let cap = self.buf.len();
        let mut out = Vec::with_capacity(self.used);
        if self.used == 0 {
            return out;
        }
        let first = self.used.min(cap - self.head);
        out.extend_from_slice(&self.buf[self.head..self.head + first]);
        out.extend_from_slice(&self.buf[..self.used - first]);
        out
    }

    /// Drop all retained bytes
    pub fn clear(&mut self) {
        self.head = 0;
        self.used = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concatenation_within_capacity() {
        let mut ring = Backlog::new(64);
        let lines: [&[u8]; 3] = [b"first\n", b"second\n", b"third\n"];
        for line in lines {
            ring.push(line);
        }
        assert_eq!(ring.snapshot(), b"first\nsecond\nthird\n".to_vec());
        assert_eq!(ring.used(), 19);
    }

    #[test]
    fn test_overflow_keeps_trailing_capacity_bytes() {
        let mut ring = Backlog::new(10);
        let mut all = Vec::new();
        for i in 0..25 {
            let line = format!("l{}\n", i);
            all.extend_from_slice(line.as_bytes());
            ring.push(line.as_bytes());
            let expected_len = all.len().min(10);
            assert_eq!(ring.snapshot(), all[all.len() - expected_len..].to_vec());
        }
        assert_eq!(ring.used(), 10);
    }

    #[test]
    fn test_oversized_line_replaces_buffer() {
        let mut ring = Backlog::new(8);
        ring.push(b"abc\n");
        ring.push(b"0123456789ABCDEF\n");
        assert_eq!(ring.snapshot(), b"9ABCDEF\n".to_vec());
        assert_eq!(ring.used(), 8);

        let mut exact = Backlog::new(4);
        exact.push(b"xy");
        exact.push(b"wxyz");
        assert_eq!(exact.snapshot(), b"wxyz".to_vec());
    }

    #[test]
    fn test_wraparound_after_oversized_line() {
        let mut ring = Backlog::new(6);
        ring.push(b"abcdefgh");
        ring.push(b"12");
        assert_eq!(ring.snapshot(), b"cdefgh12"[2..].to_vec());
    }

    #[test]
    fn test_disabled_backlog() {
        let mut ring = Backlog::new(0);
        ring.push(b"ignored\n");
        assert!(ring.is_empty());
        assert!(ring.snapshot().is_empty());
    }

    #[test]
    fn test_clear() {
        let mut ring = Backlog::new(16);
        ring.push(b"hello\n");
        ring.clear();
        assert!(ring.snapshot().is_empty());
        ring.push(b"again\n");
        assert_eq!(ring.snapshot(), b"again\n".to_vec());
    }
}
