//! Constants for the binary point-cloud sensor protocol

use std::time::Duration;

// Magic bytes
pub const CONTROL_MAGIC: [u8; 2] = [0x01, 0xFE];
pub const POINT_FRAME_MAGIC: [u8; 6] = [0x4D, 0x53, 0x02, 0xF4, 0xEB, 0x90];

pub const PROTOCOL_VERSION: u8 = 0x01;

// Response codes
pub const CODE_REQUEST: u16 = 0x0000;
pub const CODE_SUCCESS: u16 = 0x0100;

// Control chain registers
pub const REG_CONNECT_DEVICE: u16 = 0x0001;
pub const REG_SET_TCP_MODE: u16 = 0x0002;
pub const REG_ENABLE_STREAM: u16 = 0x0003;

// Query registers
pub const REG_GET_MOTOR_SPEED: u16 = 0x0101;
pub const REG_GET_TRANSMISSION_PROTOCOL: u16 = 0x0102;
pub const REG_GET_WORKING_MODE: u16 = 0x0103;
pub const REG_GET_SERIAL_NUMBER: u16 = 0x0104;
pub const REG_GET_DEVICE_MODEL: u16 = 0x0105;
pub const REG_GET_FIRMWARE_VERSION: u16 = 0x0106;
pub const REG_GET_WARNING: u16 = 0x0107;
pub const REG_GET_SPECIAL_MODE: u16 = 0x0108;

// Setting registers
pub const REG_SET_MOTOR_SPEED: u16 = 0x0201; // u16 RPM, big-endian
pub const REG_SET_TRANSMISSION_PROTOCOL: u16 = 0x0202; // u8
pub const REG_SET_WORKING_MODE: u16 = 0x0203; // u8
pub const REG_SET_SPECIAL_MODE: u16 = 0x0208; // u8

// Maintenance registers
pub const REG_REBOOT: u16 = 0x0301;

/// Rotating status poll order
pub const STATUS_POLL_REGISTERS: [u16; 8] = [
    REG_GET_MOTOR_SPEED,
    REG_GET_TRANSMISSION_PROTOCOL,
    REG_GET_WORKING_MODE,
    REG_GET_SERIAL_NUMBER,
    REG_GET_DEVICE_MODEL,
    REG_GET_FIRMWARE_VERSION,
    REG_GET_WARNING,
    REG_GET_SPECIAL_MODE,
];

// Transport values for the control chain
pub const TCP_MODE_ENABLED: u8 = 0x01;
pub const STREAM_ENABLED: u8 = 0x01;

// Control message layout
pub const CONTROL_HEADER_SIZE: usize = 9; // MAGIC(2) + VER(1) + LEN(2) + REG(2) + CODE(2)
pub const CONTROL_MIN_SIZE: usize = CONTROL_HEADER_SIZE + 1; // + CRC(1)
pub const CONTROL_MAX_DATA: usize = 256;

// Point frame layout (byte offsets from the start of the magic)
pub const OFFSET_FRAME_LENGTH: usize = 6;
pub const OFFSET_START_ANGLE: usize = 8;
pub const OFFSET_END_ANGLE: usize = 10;
pub const OFFSET_ANGULAR_RESOLUTION: usize = 12;
pub const OFFSET_INFO_TYPE: usize = 14;
pub const OFFSET_TIMESTAMP: usize = 18;
pub const OFFSET_DEVICE_STATE: usize = 30;
pub const OFFSET_TEMPERATURE: usize = 31;
pub const OFFSET_ROTATION_SPEED: usize = 33;
pub const OFFSET_POINTS: usize = 44;

pub const POINT_SIZE: usize = 4; // DIST(2) + INTENSITY(2)
pub const POINT_FRAME_HEADER_SIZE: usize = OFFSET_POINTS;
pub const POINT_FRAME_MAX_SIZE: usize = OFFSET_POINTS + 200 * POINT_SIZE;

// Unit scales
pub const ANGLE_SCALE_DEG: f32 = 0.01;
pub const RESOLUTION_SCALE_DEG: f32 = 0.001;
pub const TEMPERATURE_SCALE_C: f32 = 0.01;
pub const DISTANCE_SCALE_MM: u32 = 2;

/// Angle of buffer index 0 (0.001°)
pub const INDEX_ANGLE_OFFSET_MDEG: i64 = 45_000;
pub const FULL_TURN_MDEG: i64 = 360_000;

// Timing
pub const CONTROL_RETRY_INTERVAL: Duration = Duration::from_secs(2);
pub const SETTINGS_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Points carried by a frame for a given info type
#[inline]
pub fn points_for_info_type(info_type: u8) -> Option<usize> {
    match info_type {
        1 => Some(200),
        2 => Some(150),
        3 => Some(120),
        4 => Some(100),
        5 => Some(75),
        _ => None,
    }
}
