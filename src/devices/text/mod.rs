//! Text protocol session
//!
//! Streams distances with `MD` (or `ME` with intensities) and re-issues the
//! streaming request every `streaming_polling_interval_secs` as a keep-alive.
//! Status queries (`II`, `VV`, `PP`) are issued on consumer request.
//!
//! # Response dispatch
//!
//! | Code | Handler |
//! |------|---------|
//! | `MD`, `GD` | distances |
//! | `ME`, `GE` | distances + intensities |
//! | `II`, `VV`, `PP` | `KEY:value;` info fields |
//! | `BM`, `QT`, `CR`, `RB`, `RS` | acknowledgements |
//!
//! Anything else is ignored.

pub mod protocol;

use super::ring_buffer::RingBuffer;
use super::{LinkCommand, ScanFrame, SessionOutput};
use protocol::{
    BLOCK_DELIMITER, CMD_GET_DISTANCES, CMD_GET_DISTANCES_INTENSITIES, CMD_LASER_OFF,
    CMD_LASER_ON, CMD_MOTOR_SPEED, CMD_PARAMETER_INFO, CMD_REBOOT, CMD_RESET_STATUS,
    CMD_STATUS_INFO, CMD_STREAM_DISTANCES, CMD_STREAM_DISTANCES_INTENSITIES, CMD_VERSION_INFO,
    STATUS_OK, STATUS_STREAMING,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Receive buffer capacity; one full `ME` response is ~7KB
const RX_BUFFER_SIZE: usize = 16384;

/// Text protocol settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextSettings {
    /// First scan step requested
    #[serde(default = "default_start_step")]
    pub start_step: u16,
    /// Last scan step requested
    #[serde(default = "default_end_step")]
    pub end_step: u16,
    /// Adjacent steps merged per value
    #[serde(default = "default_cluster_count")]
    pub cluster_count: u8,
    /// Stream with intensities (`ME`) instead of distances only (`MD`)
    #[serde(default)]
    pub with_intensities: bool,
    /// Keep-alive period for re-issuing the streaming command (seconds)
    #[serde(default = "default_streaming_polling_interval")]
    pub streaming_polling_interval_secs: f32,
}

fn default_start_step() -> u16 {
    0
}

fn default_end_step() -> u16 {
    1080
}

fn default_cluster_count() -> u8 {
    1
}

fn default_streaming_polling_interval() -> f32 {
    10.0
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            start_step: default_start_step(),
            end_step: default_end_step(),
            cluster_count: default_cluster_count(),
            with_intensities: false,
            streaming_polling_interval_secs: default_streaming_polling_interval(),
        }
    }
}

/// Text protocol session for one connection
pub struct TextSession {
    settings: TextSettings,
    rx: RingBuffer<RX_BUFFER_SIZE>,
    block: Vec<u8>,
    frame: ScanFrame,
    last_stream_request: Option<Instant>,
}

impl TextSession {
    pub fn new(resolution: usize, settings: TextSettings) -> Self {
        Self {
            settings,
            rx: RingBuffer::new(),
            block: Vec::with_capacity(4096),
            frame: ScanFrame::new(resolution),
            last_stream_request: None,
        }
    }

    pub fn frame(&self) -> &ScanFrame {
        &self.frame
    }

    pub fn settings(&self) -> &TextSettings {
        &self.settings
    }

    fn stream_request(&self) -> Vec<u8> {
        let code = if self.settings.with_intensities {
            CMD_STREAM_DISTANCES_INTENSITIES
        } else {
            CMD_STREAM_DISTANCES
        };
        protocol::stream_command(
            code,
            self.settings.start_step,
            self.settings.end_step,
            self.settings.cluster_count,
        )
    }

    /// Send the streaming request
    pub fn start(&mut self, now: Instant, out: &mut SessionOutput) {
        out.send(self.stream_request());
        self.last_stream_request = Some(now);
    }

    /// Re-issue the streaming request once the keep-alive period elapses
    pub fn on_tick(&mut self, now: Instant, out: &mut SessionOutput) {
        let interval = Duration::from_secs_f32(self.settings.streaming_polling_interval_secs.max(0.0));
        let due = self
            .last_stream_request
            .is_none_or(|last| now.saturating_duration_since(last) >= interval);
        if due {
            log::trace!("Text: re-issuing streaming request");
            out.send(self.stream_request());
            self.last_stream_request = Some(now);
        }
    }

    pub fn on_command(&mut self, cmd: LinkCommand, out: &mut SessionOutput) {
        match cmd {
            LinkCommand::QueryStatus => {
                out.send(protocol::build_command(CMD_STATUS_INFO, &[]));
                out.send(protocol::build_command(CMD_VERSION_INFO, &[]));
                out.send(protocol::build_command(CMD_PARAMETER_INFO, &[]));
            }
            LinkCommand::SetMotorSpeed(speed) => {
                out.send(protocol::build_command(CMD_MOTOR_SPEED, &[(speed as u32, 2)]));
            }
            LinkCommand::LaserOn => out.send(protocol::build_command(CMD_LASER_ON, &[])),
            LinkCommand::LaserOff => out.send(protocol::build_command(CMD_LASER_OFF, &[])),
            LinkCommand::Reboot => {
                // The device only reboots on the second consecutive RB
                out.send(protocol::build_command(CMD_REBOOT, &[]));
                out.send(protocol::build_command(CMD_REBOOT, &[]));
            }
            LinkCommand::ResetStatus => {
                out.send(protocol::build_command(CMD_RESET_STATUS, &[]))
            }
            other => log::debug!("Text: command {:?} not supported, ignoring", other),
        }
    }

    /// Request a single scan (`GD`/`GE`) over the configured step range
    pub fn single_scan_request(&self) -> Vec<u8> {
        let code = if self.settings.with_intensities {
            CMD_GET_DISTANCES_INTENSITIES
        } else {
            CMD_GET_DISTANCES
        };
        protocol::single_command(
            code,
            self.settings.start_step,
            self.settings.end_step,
            self.settings.cluster_count,
        )
    }

    /// Feed received bytes; complete blocks are dispatched immediately
    pub fn on_bytes(&mut self, mut bytes: &[u8], out: &mut SessionOutput) {
        while !bytes.is_empty() {
            let stored = self.rx.extend(bytes);
            bytes = &bytes[stored..];

            while let Some(end) = self.rx.find_pattern(BLOCK_DELIMITER) {
                let mut block = std::mem::take(&mut self.block);
                self.rx.copy_out(0, end, &mut block);
                self.rx.advance(end + BLOCK_DELIMITER.len());
                self.handle_block(&block, out);
                self.block = block;
            }

            if self.rx.is_full() {
                log::warn!("Text: receive buffer full without block delimiter, resyncing");
                self.rx.clear();
                out.dropped_frames += 1;
            }
        }
    }

    fn handle_block(&mut self, block: &[u8], out: &mut SessionOutput) {
        let lines: Vec<&[u8]> = block.split(|&b| b == b'\n').collect();
        let echo = lines[0];
        if echo.len() < 2 {
            return;
        }
        let code = [echo[0], echo[1]];

        match code {
            CMD_STREAM_DISTANCES | CMD_GET_DISTANCES => self.handle_distances(&lines, false, out),
            CMD_STREAM_DISTANCES_INTENSITIES | CMD_GET_DISTANCES_INTENSITIES => {
                self.handle_distances(&lines, true, out)
            }
            CMD_STATUS_INFO | CMD_VERSION_INFO | CMD_PARAMETER_INFO => {
                Self::handle_info(&lines, out)
            }
            CMD_LASER_ON | CMD_LASER_OFF | CMD_MOTOR_SPEED | CMD_REBOOT | CMD_RESET_STATUS => {
                Self::handle_ack(code, &lines, out)
            }
            _ => log::trace!("Text: ignoring response {:?}", String::from_utf8_lossy(&code)),
        }
    }

    fn handle_distances(&mut self, lines: &[&[u8]], with_intensities: bool, out: &mut SessionOutput) {
        let Some(header) = protocol::parse_header(lines[0]) else {
            out.dropped_frames += 1;
            return;
        };
        let Some(status) = lines.get(1).and_then(|l| protocol::decode_line(l, 1)) else {
            out.dropped_frames += 1;
            return;
        };
        if status != STATUS_OK && status != STATUS_STREAMING {
            log::warn!(
                "Text: {} rejected with status {}",
                String::from_utf8_lossy(&header.command),
                String::from_utf8_lossy(status)
            );
            out.status("error", String::from_utf8_lossy(status));
            return;
        }
        // Streaming acknowledgement carries no data
        if lines.len() < 3 {
            return;
        }

        let Some(timestamp) = protocol::decode_line(lines[2], 1) else {
            out.dropped_frames += 1;
            return;
        };

        let mut data = Vec::with_capacity(lines.len() * protocol::DATA_LINE_LENGTH);
        for line in lines[3..].iter().filter(|l| !l.is_empty()) {
            let Some(payload) = protocol::decode_line(line, 1) else {
                log::debug!("Text: checksum mismatch in data line, dropping scan");
                out.dropped_frames += 1;
                return;
            };
            data.extend_from_slice(payload);
        }

        let count = header.point_count();
        let decoded = if with_intensities {
            protocol::decode_distance_intensity_block(&data, count)
        } else {
            protocol::decode_distance_block(&data, count).map(|d| (d, Vec::new()))
        };
        let Some((distances, intensities)) = decoded else {
            log::debug!(
                "Text: truncated data block ({} chars for {} points)",
                data.len(),
                count
            );
            out.dropped_frames += 1;
            return;
        };

        let cluster = header.cluster_count.max(1) as usize;
        let start = header.start_step as usize;
        for (i, &distance) in distances.iter().enumerate() {
            let step = start + i * cluster;
            if step >= self.frame.resolution() {
                break;
            }
            self.frame.distances[step] = distance;
            self.frame.intensities[step] = intensities.get(i).copied().unwrap_or(0);
        }
        self.frame.timestamp = Some(protocol::decode_value(timestamp));
        out.scan_ready = true;
    }

    fn handle_info(lines: &[&[u8]], out: &mut SessionOutput) {
        for line in lines.iter().skip(2).filter(|l| !l.is_empty()) {
            match protocol::decode_line(line, 2).and_then(protocol::parse_info_field) {
                Some((key, value)) => out.status(key, value),
                None => out.dropped_frames += 1,
            }
        }
    }

    fn handle_ack(code: [u8; 2], lines: &[&[u8]], out: &mut SessionOutput) {
        let Some(status) = lines.get(1).and_then(|l| protocol::decode_line(l, 1)) else {
            out.dropped_frames += 1;
            return;
        };
        let status = String::from_utf8_lossy(status).to_string();
        let key = match code {
            CMD_LASER_ON => "laser_on",
            CMD_LASER_OFF => "laser_off",
            CMD_MOTOR_SPEED => "motor_speed",
            CMD_REBOOT => "reboot",
            _ => "reset",
        };
        log::debug!("Text: {} acknowledged with status {}", key, status);
        out.status(key, status);
    }
}
