//! Scene: all sensor links and collection zones, driven by one tick
//!
//! [`Scene::update`] is the consumer side of the pipeline. It advances every
//! link, then re-processes each zone that has at least one sensor with a
//! fresh reading. It never blocks on the network.

use crate::config::AppConfig;
use crate::devices::SensorKind;
use crate::error::{Error, Result};
use crate::link::SensorLink;
use crate::tracking::BlobSnapshot;
use crate::zone::CollectionZone;

#[derive(Default)]
pub struct Scene {
    links: Vec<SensorLink>,
    zones: Vec<CollectionZone>,
    /// Per-link fresh flag for the current tick
    fresh: Vec<bool>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build links and zones from configuration (links are not connected)
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut scene = Scene::new();
        for zc in &config.zones {
            let mut zone = CollectionZone::new(&zc.name, zc.epsilon, zc.min_pts, zc.persistence);
            for shape in &zc.shapes {
                zone.add_geofence(shape.to_geofence()?);
            }
            scene.add_zone(zone)?;
        }
        for sc in &config.sensors {
            let link = SensorLink::from_settings(sc.kind, sc.link_settings());
            let zone = (!sc.zone.is_empty()).then_some(sc.zone.as_str());
            scene.add_sensor(link, zone)?;
        }
        Ok(scene)
    }

    pub fn add_zone(&mut self, zone: CollectionZone) -> Result<()> {
        if self.zones.iter().any(|z| z.name() == zone.name()) {
            return Err(Error::Config(format!("duplicate zone '{}'", zone.name())));
        }
        self.zones.push(zone);
        Ok(())
    }

    /// Add a link, optionally declaring the zone it feeds
    pub fn add_sensor(&mut self, link: SensorLink, zone: Option<&str>) -> Result<()> {
        if self.links.iter().any(|l| l.name() == link.name()) {
            return Err(Error::Config(format!("duplicate sensor '{}'", link.name())));
        }
        if let Some(zone) = zone {
            self.zone_mut(zone)?.add_sensor(link.name());
        }
        self.links.push(link);
        Ok(())
    }

    /// Close and remove a link; zones stop listing it
    pub fn remove_sensor(&mut self, name: &str) -> Result<SensorLink> {
        let idx = self.sensor_index(name)?;
        let mut link = self.links.remove(idx);
        for zone in &mut self.zones {
            zone.remove_sensor(name);
        }
        link.close()?;
        Ok(link)
    }

    /// Start every link; failures are logged and left to the reconnect timer
    pub fn connect_all(&mut self) {
        for link in &mut self.links {
            if let Err(e) = link.connect() {
                log::error!("Sensor '{}': connect failed: {}", link.name(), e);
            }
        }
    }

    /// Advance one tick of `dt` seconds
    pub fn update(&mut self, dt: f32) {
        for link in &mut self.links {
            link.update(dt);
        }

        self.fresh.clear();
        self.fresh
            .extend(self.links.iter_mut().map(|l| l.take_new_data()));

        for zone in &mut self.zones {
            zone.advance(dt);
            let has_fresh = self
                .links
                .iter()
                .zip(&self.fresh)
                .any(|(link, &fresh)| fresh && zone.is_fed_by(link.name()));
            if has_fresh {
                zone.process(&self.links);
            }
        }
    }

    /// Rebuild a sensor with another wire protocol, keeping its settings
    pub fn set_sensor_kind(&mut self, name: &str, kind: SensorKind) -> Result<()> {
        let idx = self.sensor_index(name)?;
        let link = &mut self.links[idx];
        if link.kind() == kind {
            return Ok(());
        }
        link.close()?;
        let mut rebuilt = SensorLink::from_settings(kind, link.settings());
        rebuilt.connect()?;
        log::info!("Sensor '{}': switched to {} protocol", name, kind);
        self.links[idx] = rebuilt;
        Ok(())
    }

    /// Close every link
    ///
    /// All links are closed even if one fails; the first error is returned.
    pub fn close(&mut self) -> Result<()> {
        let mut first_err = None;
        for link in &mut self.links {
            if let Err(e) = link.close() {
                log::error!("Sensor '{}': close failed: {}", link.name(), e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    // Sensors

    fn sensor_index(&self, name: &str) -> Result<usize> {
        self.links
            .iter()
            .position(|l| l.name() == name)
            .ok_or_else(|| Error::UnknownSensor(name.to_string()))
    }

    pub fn sensors(&self) -> &[SensorLink] {
        &self.links
    }

    pub fn sensor(&self, name: &str) -> Result<&SensorLink> {
        let idx = self.sensor_index(name)?;
        Ok(&self.links[idx])
    }

    pub fn sensor_mut(&mut self, name: &str) -> Result<&mut SensorLink> {
        let idx = self.sensor_index(name)?;
        Ok(&mut self.links[idx])
    }

    // Zones

    pub fn zones(&self) -> &[CollectionZone] {
        &self.zones
    }

    pub fn zone(&self, name: &str) -> Result<&CollectionZone> {
        self.zones
            .iter()
            .find(|z| z.name() == name)
            .ok_or_else(|| Error::UnknownZone(name.to_string()))
    }

    pub fn zone_mut(&mut self, name: &str) -> Result<&mut CollectionZone> {
        self.zones
            .iter_mut()
            .find(|z| z.name() == name)
            .ok_or_else(|| Error::UnknownZone(name.to_string()))
    }

    /// Tracked blobs of a zone
    pub fn zone_snapshot(&self, name: &str) -> Result<Vec<BlobSnapshot>> {
        Ok(self.zone(name)?.snapshot())
    }
}
