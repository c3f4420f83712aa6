//! Sensor wire protocols
//!
//! Two protocol families are supported, each implemented as a sans-I/O
//! session that consumes received bytes and produces bytes to send:
//!
//! - [`text`]: line-oriented ASCII protocol with 6-bit value packing and a
//!   per-line checksum character (`MD`, `GD`, `GE`, `II`, ...)
//! - [`binary`]: control request/response messages with CRC8 plus
//!   fixed-layout point-cloud frames
//!
//! The link worker owns the socket and shuttles bytes in and out of a
//! [`Session`]; sessions never touch I/O themselves, which keeps them
//! testable with plain byte slices.

pub mod binary;
pub mod ring_buffer;
pub mod text;

use binary::{BinarySession, BinarySettings};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use text::{TextSession, TextSettings};

/// Which wire protocol a sensor speaks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Text,
    Binary,
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::Text => write!(f, "text"),
            SensorKind::Binary => write!(f, "binary"),
        }
    }
}

/// Angle-indexed raw reading for one sensor
///
/// `distances[i]` and `intensities[i]` hold the most recent sample for scan
/// step `i`; zero distance means no return.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanFrame {
    /// Distances in millimeters
    pub distances: Vec<u32>,
    /// Return intensities (all zero when the sensor does not report them)
    pub intensities: Vec<u32>,
    /// Device timestamp of the last decoded frame
    pub timestamp: Option<u32>,
    /// Device temperature (°C)
    pub temperature: Option<f32>,
    /// Rotation speed (RPM)
    pub rotation_speed: Option<u16>,
}

impl ScanFrame {
    /// Create a zeroed frame with `resolution` angular steps
    pub fn new(resolution: usize) -> Self {
        Self {
            distances: vec![0; resolution],
            intensities: vec![0; resolution],
            ..Default::default()
        }
    }

    /// Number of angular steps
    #[inline]
    pub fn resolution(&self) -> usize {
        self.distances.len()
    }

    /// Reset every sample to zero, keeping the resolution
    pub fn clear(&mut self) {
        self.distances.fill(0);
        self.intensities.fill(0);
        self.timestamp = None;
        self.temperature = None;
        self.rotation_speed = None;
    }

    /// Reallocate to a new resolution, zero-filled
    pub fn reallocate(&mut self, resolution: usize) {
        self.distances = vec![0; resolution];
        self.intensities = vec![0; resolution];
    }
}

/// Commands the consumer can send to a running link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkCommand {
    /// Issue the protocol's informational queries
    QueryStatus,
    /// Motor speed (text: protocol speed code, binary: RPM)
    SetMotorSpeed(u16),
    /// Laser emission on
    LaserOn,
    /// Laser emission off
    LaserOff,
    /// Reboot the sensor
    Reboot,
    /// Reset sensor status/settings
    ResetStatus,
    /// Binary protocol working mode
    SetWorkingMode(u8),
    /// Binary protocol special working mode
    SetSpecialMode(u8),
    /// Binary protocol transmission protocol
    SetTransmissionProtocol(u8),
}

/// Everything a session produced while handling one input
#[derive(Debug, Default)]
pub struct SessionOutput {
    /// Encoded commands to write to the socket, in order
    pub outgoing: Vec<Vec<u8>>,
    /// Status fields learned from the device (key, value)
    pub status: Vec<(String, String)>,
    /// The session's frame holds a complete reading ready to publish
    pub scan_ready: bool,
    /// Frames dropped because of checksum/CRC/layout errors
    pub dropped_frames: u32,
}

impl SessionOutput {
    #[inline]
    pub fn send(&mut self, bytes: Vec<u8>) {
        self.outgoing.push(bytes);
    }

    #[inline]
    pub fn status(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.status.push((key.into(), value.into()));
    }

    /// Clear for reuse without releasing capacity
    pub fn reset(&mut self) {
        self.outgoing.clear();
        self.status.clear();
        self.scan_ready = false;
        self.dropped_frames = 0;
    }
}

/// Protocol settings for both families
///
/// Both halves are kept so a sensor can switch protocol without losing the
/// other family's configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSettings {
    #[serde(default)]
    pub text: TextSettings,
    #[serde(default)]
    pub binary: BinarySettings,
}

/// Protocol session for one connection
pub enum Session {
    Text(TextSession),
    Binary(BinarySession),
}

impl Session {
    /// Build a fresh session for `kind`
    pub fn new(kind: SensorKind, resolution: usize, settings: &ProtocolSettings) -> Self {
        match kind {
            SensorKind::Text => Session::Text(TextSession::new(resolution, settings.text.clone())),
            SensorKind::Binary => {
                Session::Binary(BinarySession::new(resolution, settings.binary.clone()))
            }
        }
    }

    pub fn kind(&self) -> SensorKind {
        match self {
            Session::Text(_) => SensorKind::Text,
            Session::Binary(_) => SensorKind::Binary,
        }
    }

    /// Commands to send right after the socket connects
    pub fn start(&mut self, now: Instant, out: &mut SessionOutput) {
        match self {
            Session::Text(s) => s.start(now, out),
            Session::Binary(s) => s.start(now, out),
        }
    }

    /// Feed received bytes
    pub fn on_bytes(&mut self, bytes: &[u8], now: Instant, out: &mut SessionOutput) {
        match self {
            Session::Text(s) => s.on_bytes(bytes, out),
            Session::Binary(s) => s.on_bytes(bytes, now, out),
        }
    }

    /// Periodic protocol housekeeping (keep-alive, settings convergence)
    pub fn on_tick(&mut self, now: Instant, out: &mut SessionOutput) {
        match self {
            Session::Text(s) => s.on_tick(now, out),
            Session::Binary(s) => s.on_tick(now, out),
        }
    }

    /// Handle a consumer command
    pub fn on_command(&mut self, cmd: LinkCommand, out: &mut SessionOutput) {
        match self {
            Session::Text(s) => s.on_command(cmd, out),
            Session::Binary(s) => s.on_command(cmd, out),
        }
    }

    /// Current angle-indexed reading
    pub fn frame(&self) -> &ScanFrame {
        match self {
            Session::Text(s) => s.frame(),
            Session::Binary(s) => s.frame(),
        }
    }
}
