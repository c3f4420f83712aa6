//! Frame reader for the binary protocol
//!
//! Control messages and point frames share one TCP stream and are told apart
//! by their magic prefix. Anything that fails validation advances the buffer
//! by a single byte so the next magic can be found.

use super::constants::*;
use super::protocol::{ControlMessage, PointFrame};
use crate::devices::ring_buffer::RingBuffer;

const RX_BUFFER_SIZE: usize = 8192;

/// Longest magic; a partial magic this long may straddle two reads
const MAX_MAGIC_LEN: usize = POINT_FRAME_MAGIC.len();

/// One decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryFrame {
    Control(ControlMessage),
    Points(PointFrame),
}

/// Buffered framer for the binary stream
pub struct FrameReader {
    rx: RingBuffer<RX_BUFFER_SIZE>,
    scratch: Vec<u8>,
    dropped: u32,
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            rx: RingBuffer::new(),
            scratch: Vec::with_capacity(POINT_FRAME_MAX_SIZE),
            dropped: 0,
        }
    }

    /// Buffer received bytes, returns how many were accepted
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        self.rx.extend(bytes)
    }

    pub fn is_full(&self) -> bool {
        self.rx.is_full()
    }

    pub fn clear(&mut self) {
        self.rx.clear();
    }

    /// Frames rejected since the last call
    pub fn take_dropped(&mut self) -> u32 {
        std::mem::take(&mut self.dropped)
    }

    fn resync(&mut self) {
        self.rx.advance(1);
        self.dropped += 1;
    }

    fn find_magic(&self) -> Option<usize> {
        (0..self.rx.len()).find(|&i| {
            self.rx.matches_at(i, &CONTROL_MAGIC) || self.rx.matches_at(i, &POINT_FRAME_MAGIC)
        })
    }

    /// Extract the next complete frame, if any
    pub fn next_frame(&mut self) -> Option<BinaryFrame> {
        loop {
            match self.find_magic() {
                Some(0) => {}
                Some(skip) => self.rx.advance(skip),
                None => {
                    // Keep a possible partial magic at the tail
                    let keep = self.rx.len().min(MAX_MAGIC_LEN - 1);
                    self.rx.advance(self.rx.len() - keep);
                    return None;
                }
            }

            if self.rx.matches_at(0, &POINT_FRAME_MAGIC) {
                match self.try_point_frame() {
                    Step::Frame(frame) => return Some(frame),
                    Step::Incomplete => return None,
                    Step::Invalid => self.resync(),
                }
            } else {
                match self.try_control() {
                    Step::Frame(frame) => return Some(frame),
                    Step::Incomplete => return None,
                    Step::Invalid => self.resync(),
                }
            }
        }
    }

    fn try_control(&mut self) -> Step {
        if !self.rx.copy_out(0, 5, &mut self.scratch) {
            return Step::Incomplete;
        }
        let Some(size) = ControlMessage::frame_size(&self.scratch) else {
            return Step::Incomplete;
        };
        if size > CONTROL_MIN_SIZE + CONTROL_MAX_DATA {
            log::debug!("Binary: implausible control length {}, resyncing", size);
            return Step::Invalid;
        }
        if !self.rx.copy_out(0, size, &mut self.scratch) {
            return Step::Incomplete;
        }
        match ControlMessage::decode(&self.scratch) {
            Some(msg) => {
                self.rx.advance(size);
                Step::Frame(BinaryFrame::Control(msg))
            }
            None => {
                log::debug!("Binary: control CRC mismatch, resyncing");
                Step::Invalid
            }
        }
    }

    fn try_point_frame(&mut self) -> Step {
        if !self.rx.copy_out(0, OFFSET_FRAME_LENGTH + 2, &mut self.scratch) {
            return Step::Incomplete;
        }
        let Some(size) = PointFrame::frame_size(&self.scratch) else {
            return Step::Incomplete;
        };
        if !(POINT_FRAME_HEADER_SIZE..=POINT_FRAME_MAX_SIZE).contains(&size) {
            log::debug!("Binary: implausible point frame length {}, resyncing", size);
            return Step::Invalid;
        }
        if !self.rx.copy_out(0, size, &mut self.scratch) {
            return Step::Incomplete;
        }
        match PointFrame::parse(&self.scratch) {
            Some(frame) => {
                self.rx.advance(size);
                Step::Frame(BinaryFrame::Points(frame))
            }
            None => {
                log::debug!("Binary: malformed point frame, resyncing");
                Step::Invalid
            }
        }
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

enum Step {
    Frame(BinaryFrame),
    Incomplete,
    Invalid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::binary::protocol::encode_point_frame;

    fn success(register: u16, data: Vec<u8>) -> Vec<u8> {
        ControlMessage {
            register,
            code: CODE_SUCCESS,
            data,
        }
        .encode()
    }

    #[test]
    fn test_reads_control_and_points() {
        let mut reader = FrameReader::new();
        let mut stream = success(REG_CONNECT_DEVICE, vec![]);
        stream.extend(encode_point_frame(4500, 250, 5, &[(100, 1); 75]));
        reader.extend(&stream);

        match reader.next_frame() {
            Some(BinaryFrame::Control(msg)) => {
                assert_eq!(msg.register, REG_CONNECT_DEVICE);
                assert!(msg.is_success());
            }
            other => panic!("expected control frame, got {:?}", other),
        }
        match reader.next_frame() {
            Some(BinaryFrame::Points(frame)) => assert_eq!(frame.distances.len(), 75),
            other => panic!("expected point frame, got {:?}", other),
        }
        assert!(reader.next_frame().is_none());
        assert_eq!(reader.take_dropped(), 0);
    }

    #[test]
    fn test_skips_garbage_prefix() {
        let mut reader = FrameReader::new();
        let mut stream = vec![0x00, 0x55, 0xAA, 0x13];
        stream.extend(success(REG_ENABLE_STREAM, vec![]));
        reader.extend(&stream);
        assert!(matches!(reader.next_frame(), Some(BinaryFrame::Control(_))));
    }

    #[test]
    fn test_partial_frame_waits_for_more() {
        let mut reader = FrameReader::new();
        let frame = encode_point_frame(0, 250, 4, &[(10, 0); 100]);
        let (a, b) = frame.split_at(frame.len() - 10);

        reader.extend(a);
        assert!(reader.next_frame().is_none());
        reader.extend(b);
        assert!(matches!(reader.next_frame(), Some(BinaryFrame::Points(_))));
    }

    #[test]
    fn test_magic_split_across_reads() {
        let mut reader = FrameReader::new();
        let mut stream = vec![0xEE; 20];
        stream.extend(success(REG_SET_TCP_MODE, vec![]));
        let (a, b) = stream.split_at(21); // first magic byte in `a`

        reader.extend(a);
        assert!(reader.next_frame().is_none());
        reader.extend(b);
        assert!(matches!(reader.next_frame(), Some(BinaryFrame::Control(_))));
    }

    #[test]
    fn test_resync_after_corruption() {
        let mut reader = FrameReader::new();
        let mut bad = success(REG_CONNECT_DEVICE, vec![1, 2, 3]);
        bad[10] ^= 0xFF;
        let mut stream = bad;
        stream.extend(success(REG_SET_TCP_MODE, vec![]));
        reader.extend(&stream);

        match reader.next_frame() {
            Some(BinaryFrame::Control(msg)) => assert_eq!(msg.register, REG_SET_TCP_MODE),
            other => panic!("expected control frame, got {:?}", other),
        }
        assert!(reader.take_dropped() >= 1);
    }
}
