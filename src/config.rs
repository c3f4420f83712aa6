//! Configuration for Drishti
//!
//! Loads the sensor and zone layout from a TOML file.
//!
//! ```toml
//! [tick]
//! rate_hz = 30.0
//!
//! [logging]
//! level = "info"
//!
//! [[sensors]]
//! name = "front"
//! kind = "text"
//! address = "192.168.0.10"
//! port = 10940
//! zone = "entrance"
//! x = 0.0
//! y = 0.0
//! rotation = 0.0
//!
//! [[zones]]
//! name = "entrance"
//! epsilon = 100.0
//! min_pts = 3
//! persistence = 0.5
//!
//! [[zones.shapes]]
//! kind = "quad"
//! points = [[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]]
//! mask = false
//! ```

use crate::core::{Point2D, SensorPlacement};
use crate::devices::binary::BinarySettings;
use crate::devices::text::TextSettings;
use crate::devices::{ProtocolSettings, SensorKind};
use crate::error::Result;
use crate::geofence::{Geofence, GeofenceShape, ShapeKind};
use crate::link::{LinkSettings, LinkTimings, NetworkTarget};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub tick: TickConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

/// Consumer tick
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TickConfig {
    /// Updates per second
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f32,
}

fn default_rate_hz() -> f32 {
    30.0
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_rate_hz(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One range sensor
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SensorConfig {
    pub name: String,
    pub kind: SensorKind,
    /// Zone this sensor feeds; empty for none
    #[serde(default)]
    pub zone: String,

    /// Host name or IP; empty or `0.0.0.0` leaves the sensor disconnected
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub interface: String,
    #[serde(default)]
    pub local_ip: String,

    /// Sensor origin (mm)
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    /// Radians, counter-clockwise
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub mirror: bool,
    /// Angular samples per revolution
    #[serde(default = "default_resolution")]
    pub resolution: usize,

    #[serde(default)]
    pub text: TextSettings,
    #[serde(default)]
    pub binary: BinarySettings,
    #[serde(default)]
    pub timings: LinkTimings,
}

fn default_port() -> u16 {
    10940
}

fn default_resolution() -> usize {
    1440
}

impl SensorConfig {
    pub fn target(&self) -> NetworkTarget {
        NetworkTarget {
            address: self.address.clone(),
            port: self.port,
            interface: self.interface.clone(),
            local_ip: self.local_ip.clone(),
        }
    }

    pub fn placement(&self) -> SensorPlacement {
        SensorPlacement {
            position: Point2D::new(self.x, self.y),
            rotation: self.rotation,
            mirror: self.mirror,
            angular_resolution: self.resolution,
        }
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            name: self.name.clone(),
            target: self.target(),
            placement: self.placement(),
            protocol: ProtocolSettings {
                text: self.text.clone(),
                binary: self.binary.clone(),
            },
            timings: self.timings.clone(),
        }
    }
}

/// One collection zone
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ZoneConfig {
    pub name: String,
    /// Cluster neighborhood radius (mm)
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
    /// Other points within `epsilon` needed for a core point
    #[serde(default = "default_min_pts")]
    pub min_pts: usize,
    /// Seconds an unmatched blob is kept
    #[serde(default = "default_persistence")]
    pub persistence: f32,
    #[serde(default)]
    pub shapes: Vec<ShapeConfig>,
}

fn default_epsilon() -> f32 {
    100.0
}

fn default_min_pts() -> usize {
    3
}

fn default_persistence() -> f32 {
    0.5
}

/// Geofence shape; points in meters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ShapeConfig {
    pub kind: ShapeKind,
    pub points: Vec<[f32; 2]>,
    #[serde(default)]
    pub mask: bool,
}

impl ShapeConfig {
    pub fn to_geofence(&self) -> Result<Geofence> {
        let points = self
            .points
            .iter()
            .map(|&[x, y]| Point2D::new(x, y))
            .collect();
        Ok(Geofence::new(
            GeofenceShape::from_points(self.kind, points)?,
            self.mask,
        ))
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

impl Default for AppConfig {
    /// One text sensor feeding one unfiltered zone
    fn default() -> Self {
        Self {
            tick: TickConfig::default(),
            logging: LoggingConfig::default(),
            sensors: vec![SensorConfig {
                name: "front".to_string(),
                kind: SensorKind::Text,
                zone: "main".to_string(),
                address: "192.168.0.10".to_string(),
                port: default_port(),
                interface: String::new(),
                local_ip: String::new(),
                x: 0.0,
                y: 0.0,
                rotation: 0.0,
                mirror: false,
                resolution: default_resolution(),
                text: TextSettings::default(),
                binary: BinarySettings::default(),
                timings: LinkTimings::default(),
            }],
            zones: vec![ZoneConfig {
                name: "main".to_string(),
                epsilon: default_epsilon(),
                min_pts: default_min_pts(),
                persistence: default_persistence(),
                shapes: Vec::new(),
            }],
        }
    }
}
