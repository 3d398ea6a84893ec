use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// A device as reported by the device registry.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DeviceAnnouncement {
    pub number: u8,
    pub name: String,
    pub address: IpAddr,
}

/// A database entity that carries an id and a display label (artist, album,
/// genre, key, label).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SearchableItem {
    pub id: u32,
    pub label: String,
}

impl SearchableItem {
    pub fn new(id: u32, label: &str) -> SearchableItem {
        SearchableItem {
            id,
            label: label.to_string(),
        }
    }
}

const NO_COLOR_ID: u8 = 0;

/// A rekordbox track colour. `argb` is the packed colour as the player
/// reports it; only the low 24 bits are meaningful.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ColorItem {
    pub id: u8,
    pub name: String,
    pub argb: u32,
}

impl ColorItem {
    pub fn no_color() -> ColorItem {
        ColorItem {
            id: NO_COLOR_ID,
            name: "No Color".to_string(),
            argb: 0,
        }
    }

    /// Builds the colour rekordbox assigns to a colour id. Unknown ids
    /// are reported as "No Color".
    pub fn from_id(id: u8) -> ColorItem {
        let (name, argb) = match id {
            1 => ("Pink", 0xfff8_70f8),
            2 => ("Red", 0xfff8_0000),
            3 => ("Orange", 0xfff8_a030),
            4 => ("Yellow", 0xfff8_e331),
            5 => ("Green", 0xff10_b176),
            6 => ("Aqua", 0xff20_d5fe),
            7 => ("Blue", 0xff00_50f8),
            8 => ("Purple", 0xff91_00ff),
            _ => return Self::no_color(),
        };
        ColorItem {
            id,
            name: name.to_string(),
            argb,
        }
    }

    pub fn is_no_color(&self) -> bool {
        self.id == NO_COLOR_ID
    }
}

/// Raw metadata for the track loaded on a player, as held by the metadata
/// cache. Slot and track type are the raw protocol codes.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct TrackMetadata {
    pub rekordbox_id: u32,
    pub source_slot: u8,
    pub track_type: u8,
    pub title: String,
    pub album: Option<SearchableItem>,
    pub artist: Option<SearchableItem>,
    pub color: Option<ColorItem>,
    pub comment: String,
    pub date_added: String,
    pub duration: u16,
    pub genre: Option<SearchableItem>,
    pub key: Option<SearchableItem>,
    pub label: Option<SearchableItem>,
    pub original_artist: Option<SearchableItem>,
    pub rating: u8,
    pub remixer: Option<SearchableItem>,
    pub year: u16,
}
