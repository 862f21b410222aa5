//! USB HID Usage IDs on the Consumer page (0x0C).
//!
//! These are the 16-bit codes carried in the BLE remote-control report.  An
//! Android TV paired with a BLE remote interprets them the same way it would
//! interpret a physical remote: `0xE9` raises the volume, `0x223` goes home,
//! and so on.  The values are fixed by the HID Usage Tables and must not be
//! changed.
//!
//! # Consumer page vs. Keyboard page (for beginners)
//!
//! HID groups usages into *pages*.  A normal keyboard reports on page 0x07
//! where `0x04` means the letter A.  Remote controls report on page 0x0C,
//! the *Consumer* page, where the same number space holds media and
//! navigation functions:
//!
//! | Function   | Consumer usage |
//! |------------|----------------|
//! | Power      | 0x30           |
//! | Volume Up  | 0xE9           |
//! | AC Home    | 0x223          |
//! | AC Back    | 0x224          |
//!
//! The D-pad entries (0x41–0x45) are the "Menu Pick / Up / Down / Left /
//! Right" usages that Android maps onto its directional keys.
//!
//! [`ConsumerUsage::Release`] (0x0000) is not a key; it is the "nothing
//! pressed" value sent after every press.

use serde::{Deserialize, Serialize};

/// HID Consumer Control usage code (page 0x0C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ConsumerUsage {
    /// No key pressed.
    Release = 0x0000,

    Power = 0x0030,
    Menu = 0x0040,

    // Navigation (Menu Pick / Menu Up / Down / Left / Right)
    DpadCenter = 0x0041,
    DpadUp = 0x0042,
    DpadDown = 0x0043,
    DpadLeft = 0x0044,
    DpadRight = 0x0045,

    // Channel
    ChannelUp = 0x009C,
    ChannelDown = 0x009D,

    // Transport
    FastForward = 0x00B3,
    Rewind = 0x00B4,
    Stop = 0x00B7,
    PlayPause = 0x00CD,

    // Audio
    Mute = 0x00E2,
    VolumeUp = 0x00E9,
    VolumeDown = 0x00EA,

    // Application control
    Home = 0x0223,
    Back = 0x0224,
    Pair = 0x0225,
}

impl ConsumerUsage {
    /// Converts a raw usage code into a [`ConsumerUsage`].
    ///
    /// Returns `None` for codes outside the remote-control subset.
    pub fn from_u16(value: u16) -> Option<Self> {
        let usage = match value {
            0x0000 => ConsumerUsage::Release,
            0x0030 => ConsumerUsage::Power,
            0x0040 => ConsumerUsage::Menu,
            0x0041 => ConsumerUsage::DpadCenter,
            0x0042 => ConsumerUsage::DpadUp,
            0x0043 => ConsumerUsage::DpadDown,
            0x0044 => ConsumerUsage::DpadLeft,
            0x0045 => ConsumerUsage::DpadRight,
            0x009C => ConsumerUsage::ChannelUp,
            0x009D => ConsumerUsage::ChannelDown,
            0x00B3 => ConsumerUsage::FastForward,
            0x00B4 => ConsumerUsage::Rewind,
            0x00B7 => ConsumerUsage::Stop,
            0x00CD => ConsumerUsage::PlayPause,
            0x00E2 => ConsumerUsage::Mute,
            0x00E9 => ConsumerUsage::VolumeUp,
            0x00EA => ConsumerUsage::VolumeDown,
            0x0223 => ConsumerUsage::Home,
            0x0224 => ConsumerUsage::Back,
            0x0225 => ConsumerUsage::Pair,
            _ => return None,
        };
        Some(usage)
    }

    /// Returns the raw 16-bit usage code.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}
