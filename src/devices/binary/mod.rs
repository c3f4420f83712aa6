//! Binary point-cloud protocol session
//!
//! Control chain: connect → set TCP mode → enable stream. Each step is sent
//! once the previous one is acknowledged with a success code and retried
//! after [`CONTROL_RETRY_INTERVAL`](constants::CONTROL_RETRY_INTERVAL) while
//! unanswered or refused.
//!
//! Once streaming, two independent rotations run:
//! - status polling: one "get" register per `QueryStatus` command
//! - settings check: one setting per [`SETTINGS_CHECK_INTERVAL`](constants::SETTINGS_CHECK_INTERVAL),
//!   a "set" is sent only when the desired value differs from the last known one
//!
//! Point frames accumulate into a revolution buffer that is zeroed after each
//! revolution, so a sector lost to a bad frame reads as empty rather than stale.

pub mod constants;
pub mod protocol;
pub mod reader;

use super::{LinkCommand, ScanFrame, SessionOutput};
use constants::*;
use protocol::{ControlMessage, PointFrame};
use reader::{BinaryFrame, FrameReader};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Desired device settings, enforced by the settings check loop
///
/// `None` leaves the device's own value alone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BinarySettings {
    /// Motor speed (RPM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motor_speed: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_mode: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_mode: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission_protocol: Option<u8>,
}

/// Last values reported by the device
#[derive(Clone, Debug, Default, PartialEq)]
struct KnownSettings {
    motor_speed: Option<u16>,
    working_mode: Option<u8>,
    special_mode: Option<u8>,
    transmission_protocol: Option<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlStage {
    Connecting,
    SettingTcpMode,
    EnablingStream,
    Ready,
}

impl ControlStage {
    fn request(self) -> Option<ControlMessage> {
        match self {
            ControlStage::Connecting => Some(ControlMessage::request(REG_CONNECT_DEVICE, vec![])),
            ControlStage::SettingTcpMode => Some(ControlMessage::request(
                REG_SET_TCP_MODE,
                vec![TCP_MODE_ENABLED],
            )),
            ControlStage::EnablingStream => Some(ControlMessage::request(
                REG_ENABLE_STREAM,
                vec![STREAM_ENABLED],
            )),
            ControlStage::Ready => None,
        }
    }

    fn register(self) -> Option<u16> {
        self.request().map(|msg| msg.register)
    }

    fn next(self) -> Self {
        match self {
            ControlStage::Connecting => ControlStage::SettingTcpMode,
            ControlStage::SettingTcpMode => ControlStage::EnablingStream,
            ControlStage::EnablingStream | ControlStage::Ready => ControlStage::Ready,
        }
    }
}

/// Settings visited by the check loop, in order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CheckedSetting {
    MotorSpeed,
    WorkingMode,
    SpecialMode,
    TransmissionProtocol,
}

const CHECK_ORDER: [CheckedSetting; 4] = [
    CheckedSetting::MotorSpeed,
    CheckedSetting::WorkingMode,
    CheckedSetting::SpecialMode,
    CheckedSetting::TransmissionProtocol,
];

/// Binary protocol session for one connection
pub struct BinarySession {
    desired: BinarySettings,
    known: KnownSettings,
    stage: ControlStage,
    last_control_request: Option<Instant>,
    last_settings_check: Option<Instant>,
    poll_index: usize,
    check_index: usize,
    reader: FrameReader,
    /// Last completed revolution
    frame: ScanFrame,
    /// Revolution being filled
    revolution: ScanFrame,
    /// Revolution buffer was reallocated part way through
    partial: bool,
    last_start_angle: Option<u16>,
}

impl BinarySession {
    pub fn new(resolution: usize, settings: BinarySettings) -> Self {
        Self {
            desired: settings,
            known: KnownSettings::default(),
            stage: ControlStage::Connecting,
            last_control_request: None,
            last_settings_check: None,
            poll_index: 0,
            check_index: 0,
            reader: FrameReader::new(),
            frame: ScanFrame::new(resolution),
            revolution: ScanFrame::new(resolution),
            partial: false,
            last_start_angle: None,
        }
    }

    pub fn frame(&self) -> &ScanFrame {
        &self.frame
    }

    pub fn stage(&self) -> ControlStage {
        self.stage
    }

    pub fn desired(&self) -> &BinarySettings {
        &self.desired
    }

    /// Begin the control chain
    pub fn start(&mut self, now: Instant, out: &mut SessionOutput) {
        self.stage = ControlStage::Connecting;
        self.send_stage_request(now, out);
    }

    fn send_stage_request(&mut self, now: Instant, out: &mut SessionOutput) {
        if let Some(msg) = self.stage.request() {
            log::debug!("Binary: control step {:?}", self.stage);
            out.send(msg.encode());
            self.last_control_request = Some(now);
        }
    }

    pub fn on_tick(&mut self, now: Instant, out: &mut SessionOutput) {
        if self.stage != ControlStage::Ready {
            let due = self
                .last_control_request
                .is_none_or(|t| now.saturating_duration_since(t) >= CONTROL_RETRY_INTERVAL);
            if due {
                log::warn!("Binary: no success for {:?}, retrying", self.stage);
                self.send_stage_request(now, out);
            }
            return;
        }

        let due = self
            .last_settings_check
            .is_none_or(|t| now.saturating_duration_since(t) >= SETTINGS_CHECK_INTERVAL);
        if due {
            self.last_settings_check = Some(now);
            let setting = CHECK_ORDER[self.check_index];
            self.check_index = (self.check_index + 1) % CHECK_ORDER.len();
            if let Some(msg) = self.check_setting(setting) {
                log::debug!("Binary: converging {:?}", setting);
                out.send(msg.encode());
            }
        }
    }

    /// "Set" request for `setting` if the device disagrees with the desired value
    fn check_setting(&self, setting: CheckedSetting) -> Option<ControlMessage> {
        match setting {
            CheckedSetting::MotorSpeed => {
                let want = self.desired.motor_speed?;
                (self.known.motor_speed != Some(want)).then(|| {
                    ControlMessage::request(REG_SET_MOTOR_SPEED, want.to_be_bytes().to_vec())
                })
            }
            CheckedSetting::WorkingMode => {
                let want = self.desired.working_mode?;
                (self.known.working_mode != Some(want))
                    .then(|| ControlMessage::request(REG_SET_WORKING_MODE, vec![want]))
            }
            CheckedSetting::SpecialMode => {
                let want = self.desired.special_mode?;
                (self.known.special_mode != Some(want))
                    .then(|| ControlMessage::request(REG_SET_SPECIAL_MODE, vec![want]))
            }
            CheckedSetting::TransmissionProtocol => {
                let want = self.desired.transmission_protocol?;
                (self.known.transmission_protocol != Some(want))
                    .then(|| ControlMessage::request(REG_SET_TRANSMISSION_PROTOCOL, vec![want]))
            }
        }
    }

    pub fn on_command(&mut self, cmd: LinkCommand, out: &mut SessionOutput) {
        match cmd {
            LinkCommand::QueryStatus => {
                let register = STATUS_POLL_REGISTERS[self.poll_index];
                self.poll_index = (self.poll_index + 1) % STATUS_POLL_REGISTERS.len();
                out.send(ControlMessage::request(register, vec![]).encode());
            }
            LinkCommand::SetMotorSpeed(rpm) => self.desired.motor_speed = Some(rpm),
            LinkCommand::SetWorkingMode(mode) => self.desired.working_mode = Some(mode),
            LinkCommand::SetSpecialMode(mode) => self.desired.special_mode = Some(mode),
            LinkCommand::SetTransmissionProtocol(p) => {
                self.desired.transmission_protocol = Some(p)
            }
            LinkCommand::Reboot => {
                out.send(ControlMessage::request(REG_REBOOT, vec![]).encode());
            }
            other => log::debug!("Binary: command {:?} not supported, ignoring", other),
        }
    }

    /// Feed received bytes
    pub fn on_bytes(&mut self, mut bytes: &[u8], now: Instant, out: &mut SessionOutput) {
        while !bytes.is_empty() {
            let stored = self.reader.extend(bytes);
            bytes = &bytes[stored..];

            while let Some(frame) = self.reader.next_frame() {
                match frame {
                    BinaryFrame::Control(msg) => self.on_control(msg, now, out),
                    BinaryFrame::Points(points) => self.on_points(&points, out),
                }
            }

            if self.reader.is_full() {
                log::warn!("Binary: receive buffer full without a frame, resyncing");
                self.reader.clear();
                out.dropped_frames += 1;
            }
        }
        out.dropped_frames += self.reader.take_dropped();
    }

    fn on_points(&mut self, points: &PointFrame, out: &mut SessionOutput) {
        if points.buffer_size().is_none() {
            log::debug!("Binary: point frame with zero resolution, dropping");
            out.dropped_frames += 1;
            return;
        }
        let first = self.last_start_angle.is_none();
        // A decreasing start angle means the previous revolution is complete
        let boundary = self
            .last_start_angle
            .is_some_and(|prev| points.start_angle < prev);
        self.last_start_angle = Some(points.start_angle);

        if boundary {
            if self.partial {
                log::debug!("Binary: dropping revolution with a resolution change");
                self.partial = false;
            } else {
                self.frame.clone_from(&self.revolution);
                out.scan_ready = true;
            }
            self.revolution.clear();
        }

        // Samples from the old layout are gone; this revolution is incomplete
        if points.apply(&mut self.revolution) && !boundary && !first {
            self.partial = true;
        }
    }

    fn on_control(&mut self, msg: ControlMessage, now: Instant, out: &mut SessionOutput) {
        if self.stage.register() == Some(msg.register) {
            if msg.is_success() {
                self.stage = self.stage.next();
                if self.stage == ControlStage::Ready {
                    log::info!("Binary: data stream enabled");
                    out.status("control", "streaming");
                } else {
                    self.send_stage_request(now, out);
                }
            } else {
                log::warn!(
                    "Binary: control step {:?} refused (code 0x{:04X})",
                    self.stage,
                    msg.code
                );
            }
            return;
        }

        if !msg.is_success() {
            log::debug!(
                "Binary: register 0x{:04X} refused (code 0x{:04X})",
                msg.register,
                msg.code
            );
            return;
        }

        match msg.register {
            REG_GET_MOTOR_SPEED | REG_SET_MOTOR_SPEED => {
                let value = msg
                    .data_as_u32()
                    .map(|v| v as u16)
                    .or(self.echo_desired_speed(&msg));
                self.known.motor_speed = value;
                if let Some(v) = value {
                    out.status("motor_speed", v.to_string());
                }
            }
            REG_GET_TRANSMISSION_PROTOCOL | REG_SET_TRANSMISSION_PROTOCOL => {
                let value = Self::byte_value(
                    &msg,
                    REG_SET_TRANSMISSION_PROTOCOL,
                    self.desired.transmission_protocol,
                );
                self.known.transmission_protocol = value;
                if let Some(v) = value {
                    out.status("transmission_protocol", v.to_string());
                }
            }
            REG_GET_WORKING_MODE | REG_SET_WORKING_MODE => {
                let value =
                    Self::byte_value(&msg, REG_SET_WORKING_MODE, self.desired.working_mode);
                self.known.working_mode = value;
                if let Some(v) = value {
                    out.status("working_mode", v.to_string());
                }
            }
            REG_GET_SPECIAL_MODE | REG_SET_SPECIAL_MODE => {
                let value =
                    Self::byte_value(&msg, REG_SET_SPECIAL_MODE, self.desired.special_mode);
                self.known.special_mode = value;
                if let Some(v) = value {
                    out.status("special_mode", v.to_string());
                }
            }
            REG_GET_SERIAL_NUMBER => out.status("serial_number", msg.data_as_text()),
            REG_GET_DEVICE_MODEL => out.status("device_model", msg.data_as_text()),
            REG_GET_FIRMWARE_VERSION => out.status("firmware_version", msg.data_as_text()),
            REG_GET_WARNING => {
                let warning = msg.data_as_u32().unwrap_or(0);
                if warning != 0 {
                    log::warn!("Binary: device warning 0x{:08X}", warning);
                }
                out.status("warning", format!("0x{:08X}", warning));
            }
            REG_REBOOT => {
                log::info!("Binary: reboot acknowledged");
                out.status("reboot", "ok");
            }
            other => log::trace!("Binary: ignoring register 0x{:04X}", other),
        }
    }

    /// Set acknowledgements without data confirm the value that was requested
    fn echo_desired_speed(&self, msg: &ControlMessage) -> Option<u16> {
        (msg.register == REG_SET_MOTOR_SPEED)
            .then_some(self.desired.motor_speed)
            .flatten()
    }

    fn byte_value(msg: &ControlMessage, set_register: u16, desired: Option<u8>) -> Option<u8> {
        match msg.data.first() {
            Some(&b) => Some(b),
            None if msg.register == set_register => desired,
            None => None,
        }
    }
}
