use std::{
    collections::BTreeMap,
    path::Path,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::{
    message::{DeviceAnnouncement, TrackMetadata},
    OverlayError, Result,
};

/// Source of the devices currently visible on the network.
pub trait DeviceRegistry: Send + Sync {
    /// Devices present right now, in no particular order and without
    /// duplicate numbers. An empty network yields an empty list.
    fn current_devices(&self) -> Result<Vec<DeviceAnnouncement>>;
}

/// Source of the metadata for the track loaded on each player.
pub trait MetadataCache: Send + Sync {
    /// `Ok(None)` when nothing is loaded or the metadata is not known yet.
    fn latest_metadata_for(&self, device: u8) -> Result<Option<TrackMetadata>>;
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub device: DeviceAnnouncement,
    #[serde(default)]
    pub track: Option<TrackMetadata>,
}

/// An in-memory registry and metadata cache.
///
/// Whatever keeps track of the network writes into it and the overlay
/// server reads from it. It can also be loaded from a JSON list of
/// [`SnapshotEntry`] values to serve a fixed state.
#[derive(Debug, Default)]
pub struct SnapshotSource {
    entries: RwLock<BTreeMap<u8, SnapshotEntry>>,
}

impl SnapshotSource {
    pub fn new() -> SnapshotSource {
        Default::default()
    }

    pub fn from_entries(entries: Vec<SnapshotEntry>) -> SnapshotSource {
        let source = SnapshotSource::new();
        {
            let mut map = source.entries.write().unwrap_or_else(|e| e.into_inner());
            for entry in entries {
                map.insert(entry.device.number, entry);
            }
        }
        source
    }

    pub fn from_json(json: &str) -> Result<SnapshotSource> {
        let entries: Vec<SnapshotEntry> = serde_json::from_str(json)
            .map_err(|e| anyhow!("can't parse snapshot: {}", e))?;
        Ok(Self::from_entries(entries))
    }

    pub fn load(path: &Path) -> Result<SnapshotSource> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Adds or replaces a device. A replaced device loses its track.
    pub fn insert_device(&self, device: DeviceAnnouncement) -> Result<()> {
        self.write()?.insert(
            device.number,
            SnapshotEntry {
                device,
                track: None,
            },
        );
        Ok(())
    }

    pub fn remove_device(&self, number: u8) -> Result<Option<DeviceAnnouncement>> {
        Ok(self.write()?.remove(&number).map(|entry| entry.device))
    }

    /// Records the track loaded on a device. Tracks for unknown devices
    /// are ignored.
    pub fn set_track(&self, number: u8, track: TrackMetadata) -> Result<()> {
        if let Some(entry) = self.write()?.get_mut(&number) {
            entry.track = Some(track);
        }
        Ok(())
    }

    pub fn clear_track(&self, number: u8) -> Result<()> {
        if let Some(entry) = self.write()?.get_mut(&number) {
            entry.track = None;
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<u8, SnapshotEntry>>> {
        self.entries
            .read()
            .map_err(|e| OverlayError::UpstreamUnavailable(format!("snapshot lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<u8, SnapshotEntry>>> {
        self.entries
            .write()
            .map_err(|e| OverlayError::UpstreamUnavailable(format!("snapshot lock: {}", e)))
    }
}

impl DeviceRegistry for SnapshotSource {
    fn current_devices(&self) -> Result<Vec<DeviceAnnouncement>> {
        Ok(self
            .read()?
            .values()
            .map(|entry| entry.device.clone())
            .collect())
    }
}

impl MetadataCache for SnapshotSource {
    fn latest_metadata_for(&self, device: u8) -> Result<Option<TrackMetadata>> {
        Ok(self
            .read()?
            .get(&device)
            .and_then(|entry| entry.track.clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn cdj(number: u8) -> DeviceAnnouncement {
        DeviceAnnouncement {
            number,
            name: "CDJ-3000".to_string(),
            address: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10 + number)),
        }
    }

    #[test]
    fn test_empty() {
        let source = SnapshotSource::new();
        assert!(source.current_devices().unwrap().is_empty());
        assert_eq!(source.latest_metadata_for(1).unwrap(), None);
    }

    #[test]
    fn test_devices_and_tracks() {
        let source = SnapshotSource::new();
        source.insert_device(cdj(1)).unwrap();
        source.insert_device(cdj(2)).unwrap();
        source
            .set_track(
                1,
                TrackMetadata {
                    title: "Test Track".to_string(),
                    ..Default::default()
                },
            )
            .unwrap();
        // Unknown device.
        source.set_track(9, TrackMetadata::default()).unwrap();

        assert_eq!(source.current_devices().unwrap(), vec![cdj(1), cdj(2)]);
        assert_eq!(
            source.latest_metadata_for(1).unwrap().unwrap().title,
            "Test Track"
        );
        assert_eq!(source.latest_metadata_for(2).unwrap(), None);
        assert_eq!(source.latest_metadata_for(9).unwrap(), None);

        source.clear_track(1).unwrap();
        assert_eq!(source.latest_metadata_for(1).unwrap(), None);

        assert_eq!(source.remove_device(2).unwrap(), Some(cdj(2)));
        assert_eq!(source.current_devices().unwrap(), vec![cdj(1)]);
    }

    #[test]
    fn test_from_json() {
        let source = SnapshotSource::from_json(
            r#"[
                {"device": {"number": 2, "name": "CDJ-2000NXS2", "address": "10.0.0.2"}},
                {"device": {"number": 1, "name": "CDJ-3000", "address": "10.0.0.1"},
                 "track": {"title": "Strobe", "source_slot": 3, "track_type": 1,
                           "artist": {"id": 7, "label": "deadmau5"}}}
            ]"#,
        )
        .unwrap();

        let devices = source.current_devices().unwrap();
        assert_eq!(devices.len(), 2);
        let track = source.latest_metadata_for(1).unwrap().unwrap();
        assert_eq!(track.title, "Strobe");
        assert_eq!(track.artist.unwrap().label, "deadmau5");
        assert_eq!(source.latest_metadata_for(2).unwrap(), None);

        assert!(SnapshotSource::from_json("{").is_err());
    }
}
