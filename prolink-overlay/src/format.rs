//! Conversions from raw player/track values into the strings handed to the
//! overlay templates. Every function here accepts any input the network can
//! produce and falls back to a fixed label instead of failing.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use strum::Display;

use crate::message::{ColorItem, SearchableItem};

#[derive(Clone, Copy, Debug, Display, FromPrimitive, PartialEq)]
#[repr(u8)]
pub enum TrackSourceSlot {
    #[strum(serialize = "No Track")]
    NoTrack = 0,
    #[strum(serialize = "CD Slot")]
    CdSlot = 1,
    #[strum(serialize = "SD Slot")]
    SdSlot = 2,
    #[strum(serialize = "USB Slot")]
    UsbSlot = 3,
    #[strum(serialize = "rekordbox")]
    Collection = 4,
}

#[derive(Clone, Copy, Debug, Display, FromPrimitive, PartialEq)]
#[repr(u8)]
pub enum TrackType {
    #[strum(serialize = "No Track")]
    NoTrack = 0,
    #[strum(serialize = "Rekordbox")]
    Rekordbox = 1,
    #[strum(serialize = "Unanalyzed")]
    Unanalyzed = 2,
    #[strum(serialize = "CD Digital Audio")]
    CdDigitalAudio = 5,
}

pub const UNKNOWN_SLOT: &str = "Unknown Slot";
pub const UNKNOWN_TRACK_TYPE: &str = "Unknown";

pub fn format_source_slot(code: u8) -> String {
    match TrackSourceSlot::from_u8(code) {
        Some(slot) => slot.to_string(),
        None => UNKNOWN_SLOT.to_string(),
    }
}

pub fn format_track_type(code: u8) -> String {
    match TrackType::from_u8(code) {
        Some(ty) => ty.to_string(),
        None => UNKNOWN_TRACK_TYPE.to_string(),
    }
}

/// Returns the colour name and `#rrggbb` string, or a pair of `None`s for
/// a missing colour or the "no color" entry.
pub fn format_color(color: Option<&ColorItem>) -> (Option<String>, Option<String>) {
    match color {
        Some(color) if !color.is_no_color() => (
            Some(color.name.clone()),
            Some(format!("#{:06x}", color.argb & 0x00ff_ffff)),
        ),
        _ => (None, None),
    }
}

pub fn extract_label(item: Option<&SearchableItem>) -> Option<String> {
    item.map(|item| item.label.clone())
}

/// Treats an empty string as absent.
pub fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

pub fn format_duration(seconds: u16) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
