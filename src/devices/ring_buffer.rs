//! Fixed-capacity ring buffer for stream framing
//!
//! Provides O(1) consume operations instead of O(n) Vec::drain().

/// Fixed-capacity byte ring buffer with O(1) advance
///
/// Generic const parameter `N` sets buffer capacity.
pub struct RingBuffer<const N: usize> {
    data: Box<[u8; N]>,
    head: usize, // Write position (next empty slot)
    tail: usize, // Read position (first valid byte)
    len: usize,
}

impl<const N: usize> RingBuffer<N> {
    pub fn new() -> Self {
        Self {
            data: Box::new([0u8; N]),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Append bytes to the buffer
    ///
    /// Bytes that would overflow are dropped; returns how many were stored.
    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        let room = (N - self.len).min(bytes.len());
        for &b in &bytes[..room] {
            self.data[self.head] = b;
            self.head = (self.head + 1) % N;
        }
        self.len += room;
        room
    }

    /// Consume n bytes from the front
    #[inline]
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.len);
        self.tail = (self.tail + n) % N;
        self.len -= n;
    }

    /// Drop everything
    #[inline]
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    /// Number of bytes available to read
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether no more bytes can be accepted
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Read byte at logical index (handles wraparound)
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        (index < self.len).then(|| self.data[(self.tail + index) % N])
    }

    /// Find a byte pattern, returns offset from tail
    pub fn find_pattern(&self, pattern: &[u8]) -> Option<usize> {
        if pattern.is_empty() || self.len < pattern.len() {
            return None;
        }
        (0..=self.len - pattern.len()).find(|&i| self.matches_at(i, pattern))
    }

    /// Check whether `pattern` sits at logical offset `start`
    pub fn matches_at(&self, start: usize, pattern: &[u8]) -> bool {
        start + pattern.len() <= self.len
            && pattern
                .iter()
                .enumerate()
                .all(|(k, &b)| self.data[(self.tail + start + k) % N] == b)
    }

    /// Copy `len` bytes starting at logical offset `start` into `out`
    ///
    /// `out` is cleared first. Returns false if the range is not available.
    pub fn copy_out(&self, start: usize, len: usize, out: &mut Vec<u8>) -> bool {
        out.clear();
        if start + len > self.len {
            return false;
        }
        let real_start = (self.tail + start) % N;
        if real_start + len <= N {
            out.extend_from_slice(&self.data[real_start..real_start + len]);
        } else {
            let first = N - real_start;
            out.extend_from_slice(&self.data[real_start..]);
            out.extend_from_slice(&self.data[..len - first]);
        }
        true
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
