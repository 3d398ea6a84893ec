use std::{collections::BTreeMap, sync::Arc};

use log::warn;
use serde::Serialize;

use crate::{
    format::{
        extract_label, format_color, format_duration, format_source_slot, format_track_type,
        non_empty,
    },
    message::{DeviceAnnouncement, TrackMetadata},
    upstream::{DeviceRegistry, MetadataCache},
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackRecord {
    pub id: u32,
    pub source_slot: String,
    pub track_type: String,
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub color_name: Option<String>,
    pub color_hex: Option<String>,
    pub comment: Option<String>,
    pub date_added: Option<String>,
    pub duration: u16,
    pub duration_label: String,
    pub genre: Option<String>,
    pub key: Option<String>,
    pub label: Option<String>,
    pub original_artist: Option<String>,
    pub rating: u8,
    pub remixer: Option<String>,
    pub year: Option<u16>,
}

impl From<&TrackMetadata> for TrackRecord {
    fn from(md: &TrackMetadata) -> TrackRecord {
        let (color_name, color_hex) = format_color(md.color.as_ref());
        TrackRecord {
            id: md.rekordbox_id,
            source_slot: format_source_slot(md.source_slot),
            track_type: format_track_type(md.track_type),
            title: non_empty(&md.title),
            album: extract_label(md.album.as_ref()),
            artist: extract_label(md.artist.as_ref()),
            color_name,
            color_hex,
            comment: non_empty(&md.comment),
            date_added: non_empty(&md.date_added),
            duration: md.duration,
            duration_label: format_duration(md.duration),
            genre: extract_label(md.genre.as_ref()),
            key: extract_label(md.key.as_ref()),
            label: extract_label(md.label.as_ref()),
            original_artist: extract_label(md.original_artist.as_ref()),
            rating: md.rating,
            remixer: extract_label(md.remixer.as_ref()),
            year: if md.year == 0 { None } else { Some(md.year) },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeviceRecord {
    pub number: u8,
    pub name: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<TrackRecord>,
}

impl DeviceRecord {
    fn new(device: &DeviceAnnouncement, track: Option<TrackRecord>) -> DeviceRecord {
        DeviceRecord {
            number: device.number,
            name: device.name.clone(),
            address: device.address.to_string(),
            track,
        }
    }
}

/// Every device on the network keyed by device number.
pub type PlayersView = BTreeMap<u8, DeviceRecord>;

/// Takes a snapshot of the registry and metadata cache.
///
/// A registry failure yields an empty view and a failed metadata lookup
/// yields a device without a track; neither is reported to the caller.
pub fn build_players_view(registry: &dyn DeviceRegistry, cache: &dyn MetadataCache) -> PlayersView {
    let devices = match registry.current_devices() {
        Ok(devices) => devices,
        Err(e) => {
            warn!("device registry unavailable: {}", e);
            return PlayersView::new();
        }
    };

    let mut view = PlayersView::new();
    for device in &devices {
        let track = match cache.latest_metadata_for(device.number) {
            Ok(md) => md.as_ref().map(TrackRecord::from),
            Err(e) => {
                warn!("metadata for device {} unavailable: {}", device.number, e);
                None
            }
        };
        view.insert(device.number, DeviceRecord::new(device, track));
    }
    view
}

/// The injected collaborators the overlay reads player state from.
#[derive(Clone)]
pub struct PlayersAggregator {
    registry: Arc<dyn DeviceRegistry>,
    cache: Arc<dyn MetadataCache>,
}

impl PlayersAggregator {
    pub fn new(registry: Arc<dyn DeviceRegistry>, cache: Arc<dyn MetadataCache>) -> PlayersAggregator {
        PlayersAggregator { registry, cache }
    }

    pub fn build_players_view(&self) -> PlayersView {
        build_players_view(self.registry.as_ref(), self.cache.as_ref())
    }
}
