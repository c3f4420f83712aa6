//! Binary protocol codec
//!
//! Control message: `[01 FE][VER][LEN_HI LEN_LO][REG_HI REG_LO][CODE_HI CODE_LO][DATA...][CRC8]`
//! Point frame: `[4D 53 02 F4 EB 90][LEN LE]...[points @ 44]`, little-endian fields.

use super::constants::*;
use crate::devices::ScanFrame;

const CRC8_POLY: u8 = 0x07;

const fn build_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC8_TABLE: [u8; 256] = build_crc8_table();

/// CRC8 (poly 0x07, init 0)
#[inline]
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &b| CRC8_TABLE[(crc ^ b) as usize])
}

#[inline]
fn read_u16_le(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

#[inline]
fn read_u16_be(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

/// Control request or response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub register: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

impl ControlMessage {
    /// Build a request for `register`
    pub fn request(register: u16, data: Vec<u8>) -> Self {
        Self {
            register,
            code: CODE_REQUEST,
            data,
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }

    /// Serialize with trailing CRC
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(CONTROL_MIN_SIZE + self.data.len());
        bytes.extend_from_slice(&CONTROL_MAGIC);
        bytes.push(PROTOCOL_VERSION);
        bytes.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&self.register.to_be_bytes());
        bytes.extend_from_slice(&self.code.to_be_bytes());
        bytes.extend_from_slice(&self.data);
        bytes.push(crc8(&bytes));
        bytes
    }

    /// Total encoded size implied by a header, if enough bytes are present
    pub fn frame_size(header: &[u8]) -> Option<usize> {
        if header.len() < 5 {
            return None;
        }
        Some(CONTROL_MIN_SIZE + read_u16_be(header, 3) as usize)
    }

    /// Parse one complete message, validating magic, length and CRC
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < CONTROL_MIN_SIZE || bytes[..2] != CONTROL_MAGIC {
            return None;
        }
        let size = Self::frame_size(bytes)?;
        if bytes.len() != size {
            return None;
        }
        let (body, crc) = bytes.split_at(size - 1);
        if crc8(body) != crc[0] {
            return None;
        }
        Some(Self {
            register: read_u16_be(bytes, 5),
            code: read_u16_be(bytes, 7),
            data: body[CONTROL_HEADER_SIZE..].to_vec(),
        })
    }

    /// Data interpreted as a big-endian unsigned integer (up to 4 bytes)
    pub fn data_as_u32(&self) -> Option<u32> {
        if self.data.is_empty() || self.data.len() > 4 {
            return None;
        }
        Some(self.data.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
    }

    /// Data interpreted as ASCII, trailing NULs and whitespace trimmed
    pub fn data_as_text(&self) -> String {
        String::from_utf8_lossy(&self.data)
            .trim_end_matches(['\0', ' ', '\r', '\n'])
            .to_string()
    }
}

/// Decoded point-cloud frame
#[derive(Debug, Clone, PartialEq)]
pub struct PointFrame {
    /// Start angle (0.01°)
    pub start_angle: u16,
    /// End angle (0.01°)
    pub end_angle: u16,
    /// Angular step between points (0.001°)
    pub angular_resolution: u16,
    pub timestamp: u32,
    pub device_state: u8,
    /// Temperature (0.01 °C)
    pub temperature: i16,
    /// Rotation speed (RPM)
    pub rotation_speed: u16,
    /// Distances in millimeters
    pub distances: Vec<u32>,
    pub intensities: Vec<u32>,
}

impl PointFrame {
    /// Total frame size declared by a header, if enough bytes are present
    pub fn frame_size(header: &[u8]) -> Option<usize> {
        (header.len() >= OFFSET_FRAME_LENGTH + 2)
            .then(|| read_u16_le(header, OFFSET_FRAME_LENGTH) as usize)
    }

    /// Parse one complete frame
    ///
    /// Returns `None` for a wrong magic, an unknown info type or a declared
    /// length that cannot hold the points.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < POINT_FRAME_HEADER_SIZE || bytes[..6] != POINT_FRAME_MAGIC {
            return None;
        }
        let declared = Self::frame_size(bytes)?;
        let count = points_for_info_type(bytes[OFFSET_INFO_TYPE])?;
        let needed = OFFSET_POINTS + count * POINT_SIZE;
        if declared < needed || bytes.len() < declared {
            return None;
        }

        let mut distances = Vec::with_capacity(count);
        let mut intensities = Vec::with_capacity(count);
        for point in bytes[OFFSET_POINTS..needed].chunks_exact(POINT_SIZE) {
            distances.push(read_u16_le(point, 0) as u32 * DISTANCE_SCALE_MM);
            intensities.push(read_u16_le(point, 2) as u32);
        }

        Some(Self {
            start_angle: read_u16_le(bytes, OFFSET_START_ANGLE),
            end_angle: read_u16_le(bytes, OFFSET_END_ANGLE),
            angular_resolution: read_u16_le(bytes, OFFSET_ANGULAR_RESOLUTION),
            timestamp: u32::from_le_bytes([
                bytes[OFFSET_TIMESTAMP],
                bytes[OFFSET_TIMESTAMP + 1],
                bytes[OFFSET_TIMESTAMP + 2],
                bytes[OFFSET_TIMESTAMP + 3],
            ]),
            device_state: bytes[OFFSET_DEVICE_STATE],
            temperature: i16::from_le_bytes([
                bytes[OFFSET_TEMPERATURE],
                bytes[OFFSET_TEMPERATURE + 1],
            ]),
            rotation_speed: read_u16_le(bytes, OFFSET_ROTATION_SPEED),
            distances,
            intensities,
        })
    }

    /// Angular buffer size implied by the resolution, `round(360° / res)`
    pub fn buffer_size(&self) -> Option<usize> {
        if self.angular_resolution == 0 {
            return None;
        }
        let step = self.angular_resolution as u32;
        Some(((FULL_TURN_MDEG as u32 + step / 2) / step) as usize)
    }

    /// Absolute angle of point `i` in degrees
    #[inline]
    pub fn point_angle(&self, i: usize) -> f32 {
        self.start_angle as f32 * ANGLE_SCALE_DEG
            + i as f32 * self.angular_resolution as f32 * RESOLUTION_SCALE_DEG
    }

    /// Absolute angle of point `i` in 0.001°
    #[inline]
    fn point_angle_mdeg(&self, i: usize) -> i64 {
        self.start_angle as i64 * 10 + i as i64 * self.angular_resolution as i64
    }

    /// Buffer index for an angle in 0.001°, `floor((angle - 45°) / 360° * size)`
    ///
    /// `None` outside `[0, size)`.
    #[inline]
    pub fn angle_to_index(angle_mdeg: i64, size: usize) -> Option<usize> {
        let index = ((angle_mdeg - INDEX_ANGLE_OFFSET_MDEG) * size as i64).div_euclid(FULL_TURN_MDEG);
        (0..size as i64).contains(&index).then_some(index as usize)
    }

    /// Write the points into `frame`, reallocating it if the resolution changed
    ///
    /// Returns true if the frame was reallocated.
    pub fn apply(&self, frame: &mut ScanFrame) -> bool {
        let Some(size) = self.buffer_size() else {
            return false;
        };
        let reallocated = size != frame.resolution();
        if reallocated {
            log::info!(
                "Binary: angular resolution {:.3}° → buffer size {} (was {})",
                self.angular_resolution as f32 * RESOLUTION_SCALE_DEG,
                size,
                frame.resolution()
            );
            frame.reallocate(size);
        }

        for (i, (&distance, &intensity)) in
            self.distances.iter().zip(&self.intensities).enumerate()
        {
            if let Some(index) = Self::angle_to_index(self.point_angle_mdeg(i), size) {
                frame.distances[index] = distance;
                frame.intensities[index] = intensity;
            }
        }

        frame.timestamp = Some(self.timestamp);
        frame.temperature = Some(self.temperature as f32 * TEMPERATURE_SCALE_C);
        frame.rotation_speed = Some(self.rotation_speed);
        reallocated
    }
}

/// Build a raw point frame (sensor simulators and tests)
pub fn encode_point_frame(
    start_angle: u16,
    angular_resolution: u16,
    info_type: u8,
    points: &[(u16, u16)],
) -> Vec<u8> {
    let count = points_for_info_type(info_type).unwrap_or(0);
    let size = OFFSET_POINTS + count * POINT_SIZE;
    let mut bytes = vec![0u8; size];
    bytes[..6].copy_from_slice(&POINT_FRAME_MAGIC);
    bytes[OFFSET_FRAME_LENGTH..OFFSET_FRAME_LENGTH + 2].copy_from_slice(&(size as u16).to_le_bytes());
    bytes[OFFSET_START_ANGLE..OFFSET_START_ANGLE + 2].copy_from_slice(&start_angle.to_le_bytes());
    let span = (count.saturating_sub(1) as u32 * angular_resolution as u32 / 10) as u16;
    bytes[OFFSET_END_ANGLE..OFFSET_END_ANGLE + 2]
        .copy_from_slice(&start_angle.wrapping_add(span).to_le_bytes());
    bytes[OFFSET_ANGULAR_RESOLUTION..OFFSET_ANGULAR_RESOLUTION + 2]
        .copy_from_slice(&angular_resolution.to_le_bytes());
    bytes[OFFSET_INFO_TYPE] = info_type;
    for (i, &(raw_distance, intensity)) in points.iter().take(count).enumerate() {
        let at = OFFSET_POINTS + i * POINT_SIZE;
        bytes[at..at + 2].copy_from_slice(&raw_distance.to_le_bytes());
        bytes[at + 2..at + 4].copy_from_slice(&intensity.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_crc8_reference() {
        assert_eq!(crc8(b"123456789"), 0xF4);
        assert_eq!(crc8(&[]), 0x00);
    }

    #[test]
    fn test_crc8_single_bit_sensitivity() {
        let data = b"\x01\xFE\x01\x00\x02\x01\x01\x01\x00\x0B\xB8".to_vec();
        let reference = crc8(&data);
        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = data.clone();
                flipped[byte] ^= 1 << bit;
                assert_ne!(crc8(&flipped), reference, "byte {} bit {}", byte, bit);
            }
        }
    }

    #[test]
    fn test_control_message_layout() {
        let msg = ControlMessage::request(REG_SET_MOTOR_SPEED, 600u16.to_be_bytes().to_vec());
        let bytes = msg.encode();
        assert_eq!(&bytes[..9], &[0x01, 0xFE, 0x01, 0x00, 0x02, 0x02, 0x01, 0x00, 0x00]);
        assert_eq!(&bytes[9..11], &[0x02, 0x58]);
        assert_eq!(bytes.len(), 12);
        assert_eq!(*bytes.last().unwrap(), crc8(&bytes[..11]));
        assert_eq!(ControlMessage::decode(&bytes), Some(msg));
    }

    #[test]
    fn test_control_decode_rejects_bad_crc() {
        let mut bytes = ControlMessage::request(REG_CONNECT_DEVICE, vec![]).encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert_eq!(ControlMessage::decode(&bytes), None);
    }

    #[test]
    fn test_control_success_code() {
        let mut msg = ControlMessage::request(REG_ENABLE_STREAM, vec![STREAM_ENABLED]);
        assert!(!msg.is_success());
        msg.code = CODE_SUCCESS;
        assert!(msg.is_success());
    }

    #[test]
    fn test_control_data_helpers() {
        let msg = ControlMessage {
            register: REG_GET_DEVICE_MODEL,
            code: CODE_SUCCESS,
            data: b"RS-200\0\0".to_vec(),
        };
        assert_eq!(msg.data_as_text(), "RS-200");

        let msg = ControlMessage {
            register: REG_GET_MOTOR_SPEED,
            code: CODE_SUCCESS,
            data: vec![0x02, 0x58],
        };
        assert_eq!(msg.data_as_u32(), Some(600));
    }

    #[test]
    fn test_point_frame_parse() {
        let points: Vec<(u16, u16)> = (0..75).map(|i| (500 + i, 10)).collect();
        let bytes = encode_point_frame(4500, 250, 5, &points);
        assert_eq!(bytes.len(), 44 + 75 * 4);

        let frame = PointFrame::parse(&bytes).unwrap();
        assert_eq!(frame.start_angle, 4500);
        assert_eq!(frame.angular_resolution, 250);
        assert_eq!(frame.distances.len(), 75);
        assert_eq!(frame.distances[0], 1000);
        assert_eq!(frame.distances[74], 1148);
        assert_eq!(frame.intensities[3], 10);
    }

    #[test]
    fn test_point_frame_rejects_unknown_info_type() {
        let mut bytes = encode_point_frame(0, 250, 5, &[]);
        bytes[OFFSET_INFO_TYPE] = 9;
        assert!(PointFrame::parse(&bytes).is_none());
    }

    #[test]
    fn test_point_frame_rejects_short_length() {
        let mut bytes = encode_point_frame(0, 250, 1, &[]);
        // Declares room for fewer than 200 points
        bytes[OFFSET_FRAME_LENGTH..OFFSET_FRAME_LENGTH + 2].copy_from_slice(&100u16.to_le_bytes());
        assert!(PointFrame::parse(&bytes).is_none());
        assert!(PointFrame::parse(&bytes[..40]).is_none());
    }

    #[test]
    fn test_buffer_size_from_resolution() {
        let frame = PointFrame::parse(&encode_point_frame(0, 250, 5, &[])).unwrap();
        assert_eq!(frame.buffer_size(), Some(1440));
        let frame = PointFrame::parse(&encode_point_frame(0, 1000, 5, &[])).unwrap();
        assert_eq!(frame.buffer_size(), Some(360));
        let frame = PointFrame::parse(&encode_point_frame(0, 0, 5, &[])).unwrap();
        assert_eq!(frame.buffer_size(), None);
    }

    #[test]
    fn test_angle_to_index() {
        assert_eq!(PointFrame::angle_to_index(45_000, 1440), Some(0));
        assert_eq!(PointFrame::angle_to_index(135_000, 1440), Some(360));
        assert_eq!(PointFrame::angle_to_index(135_249, 1440), Some(360));
        assert_eq!(PointFrame::angle_to_index(44_900, 1440), None);
        assert_eq!(PointFrame::angle_to_index(405_000, 1440), None);
    }

    #[test]
    fn test_apply_writes_indexed_points() {
        let points: Vec<(u16, u16)> = (0..75).map(|_| (400, 7)).collect();
        let frame = PointFrame::parse(&encode_point_frame(9000, 250, 5, &points)).unwrap();
        assert_relative_eq!(frame.point_angle(4), 91.0, epsilon = 1e-4);

        let mut scan = ScanFrame::new(1440);
        assert!(!frame.apply(&mut scan));
        // 90° → (90 - 45) / 360 * 1440 = 180
        assert_eq!(scan.distances[179], 0);
        assert_eq!(scan.distances[180], 800);
        assert_eq!(scan.distances[180 + 74], 800);
        assert_eq!(scan.distances[180 + 75], 0);
        assert_eq!(scan.intensities[200], 7);
        assert_eq!(scan.rotation_speed, Some(0));
    }

    #[test]
    fn test_apply_reallocates_on_resolution_change() {
        let mut scan = ScanFrame::new(1440);
        scan.distances.fill(5);

        let frame = PointFrame::parse(&encode_point_frame(4500, 1000, 5, &[(100, 1); 75])).unwrap();
        assert!(frame.apply(&mut scan));
        assert_eq!(scan.resolution(), 360);
        assert_eq!(scan.distances[0], 200);
        assert_eq!(scan.distances[74], 200);
        assert!(scan.distances[75..].iter().all(|&d| d == 0));
    }
}
