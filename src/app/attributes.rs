//! Remote attribute table and write-payload parsing.
//!
//! ## GATT Service Layout
//!
//! | Attribute         | UUID suffix | Service  | Perms        | Payload                 |
//! |-------------------|-------------|----------|--------------|-------------------------|
//! | Pointer colour    | `…0101`     | Base     | Read+Write   | `"rrggbb[,rrggbb]"`     |
//! | Azimuth           | `…0102`     | Base     | Read+Notify  | `i32` LE                |
//! | Spawn location    | `…0103`     | Base     | Read+Write   | `"<lat>,<lon>"`         |
//! | Device info       | `…0104`     | Base     | Read+Write   | JSON (writes ignored)   |
//! | Calibrate         | `…0105`     | Base     | Write        | opaque                  |
//! | Brightness        | `…0106`     | Base     | Read+Write   | 1 byte                  |
//! | Reboot            | `…0107`     | Base     | Write        | opaque                  |
//! | Server mode       | `…0108`     | Base     | Read+Write   | 1 byte, 0=WiFi 1=BLE    |
//! | Custom model      | `…0109`     | Base     | Read+Write   | 1 byte, 0=Lite 1=GPS    |
//! | Virtual azimuth   | `…0201`     | Advanced | Write        | opaque                  |
//! | Virtual location  | `…0202`     | Advanced | Write        | opaque                  |
//!
//! Full UUIDs share the `6d630000-…-4d434f4d5041` base.

use core::fmt;
use core::fmt::Write as _;

use crate::context::{Location, Model, PointerColor, ServerMode};

// ───────────────────────────────────────────────────────────────
// UUIDs
// ───────────────────────────────────────────────────────────────

const fn uuid(short: u16) -> u128 {
    0x6d63_0000_1f3a_4b2e_9c55_4d43_4f4d_5041 | ((short as u128) << 96)
}

pub const BASE_SERVICE_UUID: u128 = uuid(0x0100);
pub const ADVANCED_SERVICE_UUID: u128 = uuid(0x0200);

/// Which GATT service an attribute lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Base,
    Advanced,
}

impl Service {
    pub const fn uuid(self) -> u128 {
        match self {
            Self::Base => BASE_SERVICE_UUID,
            Self::Advanced => ADVANCED_SERVICE_UUID,
        }
    }
}

/// Characteristic access rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub read: bool,
    pub write: bool,
    pub notify: bool,
}

const R_W: Access = Access {
    read: true,
    write: true,
    notify: false,
};
const W: Access = Access {
    read: false,
    write: true,
    notify: false,
};
const R_N: Access = Access {
    read: true,
    write: false,
    notify: true,
};

// ───────────────────────────────────────────────────────────────
// Attribute identifiers
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeId {
    Color,
    Azimuth,
    Spawn,
    DeviceInfo,
    Calibrate,
    Brightness,
    Reboot,
    ServerMode,
    CustomModel,
    VirtualAzimuth,
    VirtualLocation,
}

impl AttributeId {
    /// Registration order.  The GATT adapter creates characteristics in
    /// this order, base service first.
    pub const COUNT: usize = 11;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Color,
        Self::Azimuth,
        Self::Spawn,
        Self::DeviceInfo,
        Self::Calibrate,
        Self::Brightness,
        Self::Reboot,
        Self::ServerMode,
        Self::CustomModel,
        Self::VirtualAzimuth,
        Self::VirtualLocation,
    ];

    pub const fn uuid(self) -> u128 {
        uuid(match self {
            Self::Color => 0x0101,
            Self::Azimuth => 0x0102,
            Self::Spawn => 0x0103,
            Self::DeviceInfo => 0x0104,
            Self::Calibrate => 0x0105,
            Self::Brightness => 0x0106,
            Self::Reboot => 0x0107,
            Self::ServerMode => 0x0108,
            Self::CustomModel => 0x0109,
            Self::VirtualAzimuth => 0x0201,
            Self::VirtualLocation => 0x0202,
        })
    }

    /// Position in [`ALL`](Self::ALL).
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_uuid(uuid: u128) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.uuid() == uuid)
    }

    pub const fn service(self) -> Service {
        match self {
            Self::VirtualAzimuth | Self::VirtualLocation => Service::Advanced,
            _ => Service::Base,
        }
    }

    pub const fn access(self) -> Access {
        match self {
            Self::Azimuth => R_N,
            Self::Calibrate | Self::Reboot | Self::VirtualAzimuth | Self::VirtualLocation => W,
            _ => R_W,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Color => "Color",
            Self::Azimuth => "Azimuth",
            Self::Spawn => "Spawn",
            Self::DeviceInfo => "Info",
            Self::Calibrate => "Calibrate",
            Self::Brightness => "Brightness",
            Self::Reboot => "Reboot",
            Self::ServerMode => "Server Mode",
            Self::CustomModel => "Custom Model",
            Self::VirtualAzimuth => "Virtual Azimuth",
            Self::VirtualLocation => "Virtual Location",
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Payload errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    InvalidUtf8,
    /// Spawn payload lacks the `,` separator.
    MissingSeparator,
    InvalidNumber,
    /// Parsed coordinates outside ±90 / ±180.
    OutOfRange,
    /// Colour token is not 2–6 hex digits.
    InvalidHex,
    /// Colour payload has zero or more than two tokens.
    TokenCount,
    /// Single-byte attribute written with another length.
    BadLength { expected: usize, got: usize },
    UnknownValue(u8),
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUtf8 => write!(f, "payload is not UTF-8"),
            Self::MissingSeparator => write!(f, "invalid format, expected 'lat,lon'"),
            Self::InvalidNumber => write!(f, "invalid number format"),
            Self::OutOfRange => write!(f, "coordinates out of range"),
            Self::InvalidHex => write!(f, "colour must be 2-6 hex digits"),
            Self::TokenCount => write!(f, "expected 1 or 2 colour tokens"),
            Self::BadLength { expected, got } => {
                write!(f, "invalid length {got}, expected {expected}")
            }
            Self::UnknownValue(v) => write!(f, "unknown value {v}"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Parsers
// ───────────────────────────────────────────────────────────────

fn as_text(raw: &[u8]) -> Result<&str, PayloadError> {
    core::str::from_utf8(raw).map_err(|_| PayloadError::InvalidUtf8)
}

/// `"<lat>,<lon>"`, split on the first comma.
pub fn parse_spawn(raw: &[u8]) -> Result<Location, PayloadError> {
    let text = as_text(raw)?;
    let (lat, lon) = text.split_once(',').ok_or(PayloadError::MissingSeparator)?;
    let latitude: f64 = lat.trim().parse().map_err(|_| PayloadError::InvalidNumber)?;
    let longitude: f64 = lon.trim().parse().map_err(|_| PayloadError::InvalidNumber)?;
    let loc = Location::new(latitude, longitude);
    if !loc.is_valid() {
        return Err(PayloadError::OutOfRange);
    }
    Ok(loc)
}

/// One 24-bit colour: 2–6 hex digits, optional `0x` prefix.
pub fn parse_hex_color(token: &str) -> Result<u32, PayloadError> {
    let token = token.trim();
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    if !(2..=6).contains(&digits.len()) || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PayloadError::InvalidHex);
    }
    u32::from_str_radix(digits, 16).map_err(|_| PayloadError::InvalidHex)
}

/// Result of a colour write: each field present only if it parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorUpdate {
    pub south: Option<Result<u32, PayloadError>>,
    pub spawn: Option<Result<u32, PayloadError>>,
}

impl ColorUpdate {
    /// Overlay the fields that parsed onto `base`.  `None` when nothing did.
    pub fn merge(&self, base: PointerColor) -> Option<PointerColor> {
        let south = self.south.and_then(Result::ok);
        let spawn = self.spawn.and_then(Result::ok);
        if south.is_none() && spawn.is_none() {
            return None;
        }
        Some(PointerColor::new(
            south.unwrap_or(base.south_color),
            spawn.unwrap_or(base.spawn_color),
        ))
    }
}

/// Split a colour payload into per-field parse results.
pub fn parse_color(raw: &[u8]) -> Result<ColorUpdate, PayloadError> {
    let text = as_text(raw)?;
    if text.trim().is_empty() {
        return Err(PayloadError::TokenCount);
    }
    let mut tokens = text.split(',');
    let south = tokens.next().map(parse_hex_color);
    let spawn = tokens.next().map(parse_hex_color);
    if tokens.next().is_some() {
        return Err(PayloadError::TokenCount);
    }
    Ok(ColorUpdate { south, spawn })
}

fn single_byte(raw: &[u8]) -> Result<u8, PayloadError> {
    match raw {
        [b] => Ok(*b),
        _ => Err(PayloadError::BadLength {
            expected: 1,
            got: raw.len(),
        }),
    }
}

pub fn parse_brightness(raw: &[u8]) -> Result<u8, PayloadError> {
    single_byte(raw)
}

pub fn parse_server_mode(raw: &[u8]) -> Result<ServerMode, PayloadError> {
    let b = single_byte(raw)?;
    ServerMode::try_from(b).map_err(PayloadError::UnknownValue)
}

pub fn parse_model(raw: &[u8]) -> Result<Model, PayloadError> {
    let b = single_byte(raw)?;
    Model::try_from(b).map_err(PayloadError::UnknownValue)
}

// ───────────────────────────────────────────────────────────────
// Read-back formatting
// ───────────────────────────────────────────────────────────────

pub fn format_spawn(loc: &Location) -> heapless::String<32> {
    let mut s = heapless::String::new();
    let _ = write!(s, "{:.6},{:.6}", loc.latitude, loc.longitude);
    s
}

pub fn format_color(color: &PointerColor) -> heapless::String<16> {
    let mut s = heapless::String::new();
    let _ = write!(s, "{:06x},{:06x}", color.south_color, color.spawn_color);
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuids_unique_and_resolvable() {
        for a in AttributeId::ALL {
            assert_eq!(AttributeId::from_uuid(a.uuid()), Some(a));
        }
        for (i, a) in AttributeId::ALL.into_iter().enumerate() {
            assert_eq!(a.index(), i);
        }
        assert_eq!(AttributeId::from_uuid(BASE_SERVICE_UUID), None);
    }

    #[test]
    fn virtual_attributes_in_advanced_service() {
        assert_eq!(AttributeId::VirtualAzimuth.service(), Service::Advanced);
        assert_eq!(AttributeId::Spawn.service(), Service::Base);
        assert!(AttributeId::Azimuth.access().notify);
        assert!(!AttributeId::Reboot.access().read);
    }

    #[test]
    fn spawn_parses_first_comma_only() {
        let loc = parse_spawn(b"12.345678, 98.765432").unwrap();
        assert_eq!(loc, Location::new(12.345678, 98.765432));
        assert_eq!(parse_spawn(b"1.0,2.0,3.0"), Err(PayloadError::InvalidNumber));
    }

    #[test]
    fn spawn_rejects_malformed() {
        assert_eq!(parse_spawn(b"12.5"), Err(PayloadError::MissingSeparator));
        assert_eq!(parse_spawn(b"abc,1"), Err(PayloadError::InvalidNumber));
        assert_eq!(parse_spawn(b"91,0"), Err(PayloadError::OutOfRange));
        assert_eq!(parse_spawn(&[0xff, b',', b'1']), Err(PayloadError::InvalidUtf8));
    }

    #[test]
    fn hex_color_rules() {
        assert_eq!(parse_hex_color("1a2b3c"), Ok(0x1a2b3c));
        assert_eq!(parse_hex_color("0xff"), Ok(0xff));
        assert_eq!(parse_hex_color("f"), Err(PayloadError::InvalidHex));
        assert_eq!(parse_hex_color("1234567"), Err(PayloadError::InvalidHex));
        assert_eq!(parse_hex_color("zz"), Err(PayloadError::InvalidHex));
    }

    #[test]
    fn color_token_count() {
        assert_eq!(parse_color(b""), Err(PayloadError::TokenCount));
        assert_eq!(parse_color(b"ff,ff,ff"), Err(PayloadError::TokenCount));
        let one = parse_color(b"1a2b3c").unwrap();
        assert_eq!(one.south, Some(Ok(0x1a2b3c)));
        assert_eq!(one.spawn, None);
    }

    #[test]
    fn color_fields_independent() {
        let base = PointerColor::new(0x111111, 0x222222);
        let upd = parse_color(b"zz,00ff00").unwrap();
        assert_eq!(upd.merge(base), Some(PointerColor::new(0x111111, 0x00ff00)));

        let none = parse_color(b"zz,yy").unwrap();
        assert_eq!(none.merge(base), None);
    }

    #[test]
    fn empty_south_token_keeps_spawn_field() {
        let base = PointerColor::new(0xff0000, 0x00ff00);
        let upd = parse_color(b",0000ff").unwrap();
        assert_eq!(upd.south, Some(Err(PayloadError::InvalidHex)));
        assert_eq!(upd.merge(base), Some(PointerColor::new(0xff0000, 0x0000ff)));

        let upd = parse_color(b"00ff00,").unwrap();
        assert_eq!(upd.merge(base), Some(PointerColor::new(0x00ff00, 0x00ff00)));

        assert_eq!(parse_color(b"  "), Err(PayloadError::TokenCount));
        assert_eq!(parse_color(b",").unwrap().merge(base), None);
    }

    #[test]
    fn single_byte_attributes() {
        assert_eq!(parse_brightness(&[200]), Ok(200));
        assert_eq!(
            parse_brightness(&[1, 2]),
            Err(PayloadError::BadLength { expected: 1, got: 2 })
        );
        assert_eq!(parse_server_mode(&[0]), Ok(ServerMode::Wifi));
        assert_eq!(parse_server_mode(&[2]), Err(PayloadError::UnknownValue(2)));
        assert_eq!(parse_model(&[1]), Ok(Model::Gps));
        assert!(parse_model(&[]).is_err());
    }

    #[test]
    fn read_back_formats() {
        assert_eq!(
            format_spawn(&Location::new(12.345678, 98.765432)).as_str(),
            "12.345678,98.765432"
        );
        assert_eq!(
            format_color(&PointerColor::new(0xff0000, 0x00ff00)).as_str(),
            "ff0000,00ff00"
        );
    }
}
