//! Sensor links
//!
//! A [`SensorLink`] owns one physical sensor: its placement, network target,
//! the background worker holding the socket and the latest decoded reading.
//!
//! # States
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──worker connected──▶ Streaming
//!      ▲                          │                               │
//!      └──── connect failed ──────┴────── EOF / socket error ─────┘
//!                        (buffers zeroed, reconnecting)
//! ```
//!
//! All timers are advanced by [`SensorLink::update`] from the consumer tick.
//! The inactivity watchdog is the only timer the worker touches.
//!
//! A restarted worker (watchdog, placement or protocol change) is detached,
//! not joined: it is told to stop, a fresh worker takes over, and the old
//! thread is reaped by a later tick once it has exited. `update` never waits
//! on a worker.

pub mod shared;
pub mod transport;
pub mod worker;

use crate::aggregator::AngleTable;
use crate::core::{Point2D, SensorPlacement};
use crate::devices::{LinkCommand, ProtocolSettings, ScanFrame, SensorKind};
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use shared::LinkShared;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use worker::{LinkEvent, WorkerContext};

/// Where a sensor lives on the network
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTarget {
    /// Host name or IP address; empty or `0.0.0.0` means unset
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
    /// Network interface name (informational)
    #[serde(default)]
    pub interface: String,
    /// Local IP the sensor is reachable from (informational)
    #[serde(default)]
    pub local_ip: String,
}

impl NetworkTarget {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            ..Default::default()
        }
    }

    /// Whether an address has been configured
    pub fn is_set(&self) -> bool {
        let address = self.address.trim();
        !address.is_empty() && address != "0.0.0.0"
    }
}

/// Connection timers (seconds)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkTimings {
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    #[serde(default = "default_reconnection_timeout")]
    pub reconnection_timeout: f32,
    #[serde(default = "default_thread_inactive_interval")]
    pub thread_inactive_interval: f32,
    #[serde(default = "default_status_interval")]
    pub status_interval: f32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: f32,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnection_timeout() -> f32 {
    3.0
}

fn default_thread_inactive_interval() -> f32 {
    5.0
}

fn default_status_interval() -> f32 {
    5.0
}

fn default_connect_timeout() -> f32 {
    2.0
}

impl Default for LinkTimings {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            reconnection_timeout: default_reconnection_timeout(),
            thread_inactive_interval: default_thread_inactive_interval(),
            status_interval: default_status_interval(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Connection state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Streaming,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Streaming => write!(f, "streaming"),
        }
    }
}

/// Fields carried over when a link is rebuilt with another protocol
#[derive(Clone, Debug, PartialEq)]
pub struct LinkSettings {
    pub name: String,
    pub target: NetworkTarget,
    pub placement: SensorPlacement,
    pub protocol: ProtocolSettings,
    pub timings: LinkTimings,
}

/// One sensor connection and its latest reading
pub struct SensorLink {
    name: String,
    kind: SensorKind,
    target: NetworkTarget,
    placement: SensorPlacement,
    protocol: ProtocolSettings,
    timings: LinkTimings,
    angles: AngleTable,

    state: ConnectionState,
    reconnecting: bool,
    reconnect_timer: f32,
    status_timer: f32,
    status: String,
    status_fields: BTreeMap<String, String>,

    frame: ScanFrame,
    new_data: bool,

    shared: Arc<LinkShared>,
    worker: Option<JoinHandle<()>>,
    /// Workers abandoned by the watchdog, still winding down
    detached: Vec<JoinHandle<()>>,
    commands: Option<Sender<LinkCommand>>,
    events: Option<Receiver<LinkEvent>>,
}

impl SensorLink {
    pub fn new(
        name: impl Into<String>,
        kind: SensorKind,
        target: NetworkTarget,
        placement: SensorPlacement,
    ) -> Self {
        Self::from_settings(
            kind,
            LinkSettings {
                name: name.into(),
                target,
                placement,
                protocol: ProtocolSettings::default(),
                timings: LinkTimings::default(),
            },
        )
    }

    /// Build a link from transferable settings
    pub fn from_settings(kind: SensorKind, settings: LinkSettings) -> Self {
        let resolution = settings.placement.angular_resolution;
        Self {
            name: settings.name,
            kind,
            target: settings.target,
            angles: AngleTable::new(resolution, settings.placement.mirror),
            placement: settings.placement,
            protocol: settings.protocol,
            timings: settings.timings,
            state: ConnectionState::Disconnected,
            reconnecting: false,
            reconnect_timer: 0.0,
            status_timer: 0.0,
            status: ConnectionState::Disconnected.to_string(),
            status_fields: BTreeMap::new(),
            frame: ScanFrame::new(resolution),
            new_data: false,
            shared: Arc::new(LinkShared::new(resolution)),
            worker: None,
            detached: Vec::new(),
            commands: None,
            events: None,
        }
    }

    pub fn with_protocol(mut self, protocol: ProtocolSettings) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_timings(mut self, timings: LinkTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Snapshot of the transferable settings
    pub fn settings(&self) -> LinkSettings {
        LinkSettings {
            name: self.name.clone(),
            target: self.target.clone(),
            placement: self.placement,
            protocol: self.protocol.clone(),
            timings: self.timings.clone(),
        }
    }

    /// Start the worker
    ///
    /// No-op when the target address is unset or a worker is already running.
    pub fn connect(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        if !self.target.is_set() {
            log::debug!("Link '{}': no address set, not connecting", self.name);
            return Ok(());
        }

        let shared = Arc::new(LinkShared::new(self.placement.angular_resolution));
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let ctx = WorkerContext {
            name: self.name.clone(),
            target: self.target.clone(),
            kind: self.kind,
            resolution: self.placement.angular_resolution,
            protocol: self.protocol.clone(),
            connect_timeout: Duration::from_secs_f32(self.timings.connect_timeout.max(0.001)),
            shared: Arc::clone(&shared),
            commands: cmd_rx,
            events: event_tx,
        };

        let handle = thread::Builder::new()
            .name(format!("link-{}", self.name))
            .spawn(move || worker::run(ctx))
            .map_err(|e| Error::ThreadSpawn(format!("link '{}': {}", self.name, e)))?;

        self.shared = shared;
        self.worker = Some(handle);
        self.commands = Some(cmd_tx);
        self.events = Some(event_rx);
        self.state = ConnectionState::Connecting;
        self.status = ConnectionState::Connecting.to_string();
        Ok(())
    }

    /// Signal the worker to stop and wait for it
    fn stop_worker(&mut self) -> Result<()> {
        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        self.shared.stop.store(true, Ordering::Release);
        let joined = handle.join().map_err(|_| Error::ThreadPanic);
        // Channels go only after the worker is gone
        self.commands = None;
        self.events = None;
        self.shared.slot.discard();
        joined
    }

    /// Abandon the worker without waiting for it
    ///
    /// Its shared state and channels are replaced, so anything it still
    /// produces is never seen.
    fn detach_worker(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.shared.stop.store(true, Ordering::Release);
        self.shared = Arc::new(LinkShared::new(self.placement.angular_resolution));
        self.commands = None;
        self.events = None;
        self.detached.push(handle);
    }

    /// Join detached workers that have exited
    fn reap_detached(&mut self) {
        if self.detached.is_empty() {
            return;
        }
        let (finished, running): (Vec<_>, Vec<_>) =
            self.detached.drain(..).partition(|h| h.is_finished());
        self.detached = running;
        for handle in finished {
            if handle.join().is_err() {
                log::error!("Link '{}': detached worker panicked", self.name);
            }
        }
    }

    /// Stop the worker and release the socket; safe to call repeatedly
    pub fn close(&mut self) -> Result<()> {
        let was_running = self.worker.is_some();
        let result = self.stop_worker();
        self.reap_detached();
        self.state = ConnectionState::Disconnected;
        self.reconnecting = false;
        self.reconnect_timer = 0.0;
        self.status = ConnectionState::Disconnected.to_string();
        self.clear_buffers();
        if was_running {
            log::info!("Link '{}': closed", self.name);
        }
        result
    }

    fn clear_buffers(&mut self) {
        self.frame.clear();
        self.new_data = false;
    }

    /// Advance timers and collect worker output; call once per tick
    pub fn update(&mut self, dt: f32) {
        self.reap_detached();
        self.drain_events();

        if self.shared.slot.take(&mut self.frame) {
            self.new_data = true;
            if self.frame.resolution() != self.placement.angular_resolution {
                self.adopt_resolution(self.frame.resolution());
            }
            self.status_fields.insert(
                "frames".to_string(),
                self.shared.frames.load(Ordering::Relaxed).to_string(),
            );
            self.status_fields.insert(
                "dropped_frames".to_string(),
                self.shared.dropped_frames.load(Ordering::Relaxed).to_string(),
            );
        }

        if self.reconnecting && self.worker.is_none() && self.timings.auto_reconnect {
            self.reconnect_timer += dt;
            if self.reconnect_timer > self.timings.reconnection_timeout {
                self.reconnect_timer = 0.0;
                log::info!("Link '{}': reconnecting", self.name);
                if let Err(e) = self.connect() {
                    log::error!("Link '{}': reconnect failed: {}", self.name, e);
                }
            }
        }

        if self.worker.is_some() {
            self.shared.inactivity.advance(dt);
            if self.shared.inactivity.elapsed_secs() > self.timings.thread_inactive_interval {
                log::warn!(
                    "Link '{}': worker inactive for {:.1}s, restarting",
                    self.name,
                    self.shared.inactivity.elapsed_secs()
                );
                self.restart();
            }
        }

        if self.state == ConnectionState::Streaming {
            self.status_timer += dt;
            if self.status_timer >= self.timings.status_interval {
                self.status_timer = 0.0;
                self.send_command(LinkCommand::QueryStatus);
            }
        }
    }

    fn drain_events(&mut self) {
        let Some(events) = self.events.clone() else {
            return;
        };
        for event in events.try_iter() {
            match event {
                LinkEvent::Connected => {
                    log::info!("Link '{}': streaming", self.name);
                    self.state = ConnectionState::Streaming;
                    self.reconnecting = false;
                    self.reconnect_timer = 0.0;
                    self.status_timer = 0.0;
                    self.status = ConnectionState::Streaming.to_string();
                }
                LinkEvent::Disconnected(reason) => self.on_disconnected(&reason),
                LinkEvent::Status { key, value } => {
                    self.status_fields.insert(key, value);
                }
            }
        }
    }

    fn on_disconnected(&mut self, reason: &str) {
        if self.state == ConnectionState::Streaming {
            log::warn!("Link '{}': connection lost: {}", self.name, reason);
        }
        if let Err(e) = self.stop_worker() {
            log::error!("Link '{}': {}", self.name, e);
        }
        self.state = ConnectionState::Disconnected;
        self.reconnecting = true;
        self.reconnect_timer = 0.0;
        self.status = format!("disconnected: {}", reason);
        self.clear_buffers();
    }

    /// Replace the worker with a fresh one
    fn restart(&mut self) {
        self.detach_worker();
        self.state = ConnectionState::Disconnected;
        self.clear_buffers();
        if let Err(e) = self.connect() {
            log::error!("Link '{}': restart failed: {}", self.name, e);
        }
    }

    fn adopt_resolution(&mut self, resolution: usize) {
        log::info!(
            "Link '{}': angular resolution {} → {}",
            self.name,
            self.placement.angular_resolution,
            resolution
        );
        self.placement.angular_resolution = resolution;
        self.angles = AngleTable::new(resolution, self.placement.mirror);
    }

    /// Queue a command for the worker; false if not connected
    pub fn send_command(&self, cmd: LinkCommand) -> bool {
        self.commands
            .as_ref()
            .is_some_and(|tx| tx.send(cmd).is_ok())
    }

    // Readings

    pub fn distances(&self) -> &[u32] {
        &self.frame.distances
    }

    pub fn intensities(&self) -> &[u32] {
        &self.frame.intensities
    }

    pub fn frame(&self) -> &ScanFrame {
        &self.frame
    }

    pub fn has_new_data(&self) -> bool {
        self.new_data
    }

    /// Read and clear the new-data flag
    pub fn take_new_data(&mut self) -> bool {
        std::mem::take(&mut self.new_data)
    }

    pub fn angles(&self) -> &AngleTable {
        &self.angles
    }

    // State

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn status_fields(&self) -> &BTreeMap<String, String> {
        &self.status_fields
    }

    pub fn timings(&self) -> &LinkTimings {
        &self.timings
    }

    // Placement

    pub fn placement(&self) -> &SensorPlacement {
        &self.placement
    }

    pub fn set_position(&mut self, position: Point2D) {
        self.placement.position = position;
    }

    pub fn set_rotation(&mut self, rotation: f32) {
        self.placement.rotation = rotation;
    }

    pub fn set_mirror(&mut self, mirror: bool) {
        self.placement.mirror = mirror;
        self.angles.set_mirror(mirror);
    }

    /// Replace the placement; a resolution change restarts a running worker
    pub fn set_placement(&mut self, placement: SensorPlacement) -> Result<()> {
        if placement.angular_resolution == 0 {
            return Err(Error::InvalidParameter(
                "angular resolution must be positive".to_string(),
            ));
        }
        let resized = placement.angular_resolution != self.placement.angular_resolution;
        let mirror = placement.mirror;
        self.placement = placement;
        if resized {
            self.angles = AngleTable::new(self.placement.angular_resolution, mirror);
            self.frame.reallocate(self.placement.angular_resolution);
            if self.worker.is_some() {
                self.restart();
            }
        } else {
            self.angles.set_mirror(mirror);
        }
        Ok(())
    }

    // Network

    pub fn target(&self) -> &NetworkTarget {
        &self.target
    }

    /// Replace the network target, reconnecting if it changed
    pub fn set_target(&mut self, target: NetworkTarget) -> Result<()> {
        if target == self.target {
            return Ok(());
        }
        self.close()?;
        self.target = target;
        self.connect()
    }

    /// Update protocol settings; a running worker restarts to apply them
    pub fn set_protocol(&mut self, protocol: ProtocolSettings) {
        if protocol == self.protocol {
            return;
        }
        self.protocol = protocol;
        if self.worker.is_some() {
            self.restart();
        }
    }

    pub fn set_timings(&mut self, timings: LinkTimings) {
        self.timings = timings;
    }

    pub fn frames_received(&self) -> u64 {
        self.shared.frames.load(Ordering::Relaxed)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.shared.dropped_frames.load(Ordering::Relaxed)
    }

    /// Install a reading directly, as if a worker had published it
    pub fn inject_frame(&mut self, frame: ScanFrame) {
        if frame.resolution() != self.placement.angular_resolution {
            self.adopt_resolution(frame.resolution());
        }
        self.frame = frame;
        self.new_data = true;
    }
}

impl Drop for SensorLink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::time::Instant;

    fn link(address: &str) -> SensorLink {
        SensorLink::new(
            "front",
            SensorKind::Text,
            NetworkTarget::new(address, 10940),
            SensorPlacement::default(),
        )
    }

    #[test]
    fn test_unset_target() {
        assert!(!NetworkTarget::default().is_set());
        assert!(!NetworkTarget::new("0.0.0.0", 10940).is_set());
        assert!(!NetworkTarget::new("  ", 10940).is_set());
        assert!(NetworkTarget::new("192.168.0.10", 10940).is_set());
    }

    #[test]
    fn test_connect_without_address_is_noop() {
        let mut link = link("0.0.0.0");
        link.connect().unwrap();
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(!link.send_command(LinkCommand::QueryStatus));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut link = link("");
        link.close().unwrap();
        link.close().unwrap();
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert!(!link.is_reconnecting());
    }

    #[test]
    fn test_take_new_data_clears_flag() {
        let mut link = link("");
        let mut frame = ScanFrame::new(1440);
        frame.distances[10] = 1000;
        link.inject_frame(frame);

        assert!(link.take_new_data());
        assert!(!link.take_new_data());
        assert_eq!(link.distances()[10], 1000);
    }

    #[test]
    fn test_injected_resolution_rebuilds_angles() {
        let mut link = link("");
        link.inject_frame(ScanFrame::new(720));
        assert_eq!(link.placement().angular_resolution, 720);
        assert_eq!(link.angles().len(), 720);
    }

    #[test]
    fn test_set_mirror_updates_angles() {
        let mut link = link("");
        let original = link.angles().clone();
        link.set_mirror(true);
        assert_ne!(link.angles(), &original);
        link.set_mirror(false);
        assert_eq!(link.angles(), &original);
    }

    #[test]
    fn test_settings_round_trip() {
        let mut link = link("10.0.0.2");
        link.set_rotation(1.5);
        let settings = link.settings();
        let rebuilt = SensorLink::from_settings(SensorKind::Binary, settings.clone());
        assert_eq!(rebuilt.kind(), SensorKind::Binary);
        assert_eq!(rebuilt.settings(), settings);
    }

    fn quick_watchdog() -> LinkTimings {
        LinkTimings {
            thread_inactive_interval: 0.1,
            ..Default::default()
        }
    }

    #[test]
    fn test_watchdog_does_not_wait_for_hung_worker() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut link = link("127.0.0.1").with_timings(quick_watchdog());
        link.target.port = port;
        // Stands in for a worker stuck in a blocking write
        link.worker = Some(thread::spawn(|| thread::sleep(Duration::from_secs(3))));
        link.state = ConnectionState::Streaming;

        let start = Instant::now();
        link.update(1.0);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(link.detached.len(), 1);
        assert!(link.worker.is_some());
        assert_eq!(link.state(), ConnectionState::Connecting);

        let start = Instant::now();
        link.close().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_detached_worker_reaped_after_exit() {
        let mut link = link("").with_timings(quick_watchdog());
        link.worker = Some(thread::spawn(|| thread::sleep(Duration::from_millis(20))));

        link.update(1.0);
        assert_eq!(link.detached.len(), 1);
        assert!(link.worker.is_none());

        thread::sleep(Duration::from_millis(200));
        link.update(0.0);
        assert!(link.detached.is_empty());
    }

    #[test]
    fn test_status_polled_only_while_streaming() {
        let mut link = link("").with_timings(LinkTimings {
            status_interval: 0.5,
            ..Default::default()
        });
        let (tx, rx) = crossbeam_channel::unbounded();
        link.commands = Some(tx);

        link.state = ConnectionState::Connecting;
        for _ in 0..5 {
            link.update(1.0);
        }
        assert!(rx.try_recv().is_err());

        link.state = ConnectionState::Streaming;
        link.update(0.2);
        link.update(0.2);
        assert!(rx.try_recv().is_err());
        link.update(0.2);
        assert_eq!(rx.try_recv().unwrap(), LinkCommand::QueryStatus);
        assert!(rx.try_recv().is_err());

        for _ in 0..10 {
            link.update(0.25);
        }
        assert_eq!(rx.try_iter().count(), 5);
    }
}
