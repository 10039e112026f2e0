use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};

/// Byte queue holding native-stream data that has not been payloaded yet.
///
/// Input buffers are appended at the back; whole parse units are taken from
/// the front once the scanner has validated their boundaries. The pending
/// bytes are always contiguous, so the scanner works on a plain slice.
///
/// The timestamps of every pushed buffer are kept alongside its bytes, so the
/// front of the queue can be stamped with the buffer it came from.
#[derive(Debug, Default)]
pub struct Adapter {
    buf: BytesMut,
    marks: VecDeque<Mark>,
}

/// Start of one pushed buffer, relative to the front of the queue.
#[derive(Debug, Clone, Copy)]
struct Mark {
    offset: usize,
    pts: Option<u64>,
    dts: Option<u64>,
}

impl Adapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one input buffer with its timestamps.
    pub fn push(&mut self, data: &[u8], pts: Option<u64>, dts: Option<u64>) {
        if data.is_empty() {
            return;
        }
        self.marks.push_back(Mark {
            offset: self.buf.len(),
            pts,
            dts,
        });
        self.buf.extend_from_slice(data);
        self.prune_marks();
    }

    /// `(pts, dts)` of the buffer holding the front byte.
    pub fn timestamps(&self) -> (Option<u64>, Option<u64>) {
        self.marks
            .front()
            .map_or((None, None), |mark| (mark.pts, mark.dts))
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// All pending bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Discard up to `n` bytes from the front.
    pub fn flush(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.advance(n);
        self.consume_marks(n);
    }

    /// Remove up to `n` bytes from the front and return them.
    pub fn take(&mut self, n: usize) -> Bytes {
        let n = n.min(self.buf.len());
        let taken = self.buf.split_to(n).freeze();
        self.consume_marks(n);
        taken
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.marks.clear();
    }

    fn consume_marks(&mut self, n: usize) {
        for mark in &mut self.marks {
            mark.offset = mark.offset.saturating_sub(n);
        }
        self.prune_marks();
    }

    // Only the last mark at or before the front still owns pending bytes.
    fn prune_marks(&mut self) {
        while self.marks.get(1).is_some_and(|next| next.offset == 0) {
            self.marks.pop_front();
        }
    }
}
