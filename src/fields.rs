//! Domain values stored in records, and the codes they live under.
//!
//! Most codes are the ones Finder writes.  Settings Finder keeps in binary
//! property lists (grid spacing, bar visibility, columns) are stored here
//! under plain codes of our own, listed in the second half of [`codes`].

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, TimeZone, Utc};

use crate::record::FourCC;

/// Record codes.
pub mod codes {
    use crate::record::FourCC;

    pub const ILOC: FourCC = FourCC::new(b"Iloc");
    pub const BKGD: FourCC = FourCC::new(b"BKGD");
    pub const PICT: FourCC = FourCC::new(b"pict");
    pub const VSTL: FourCC = FourCC::new(b"vstl");
    pub const ICVO: FourCC = FourCC::new(b"icvo");
    pub const ICVT: FourCC = FourCC::new(b"icvt");
    pub const LSVT: FourCC = FourCC::new(b"lsvt");
    pub const FWSW: FourCC = FourCC::new(b"fwsw");
    pub const FWI0: FourCC = FourCC::new(b"fwi0");
    pub const CMMT: FourCC = FourCC::new(b"cmmt");
    pub const LG1S: FourCC = FourCC::new(b"lg1S");
    pub const LOGS: FourCC = FourCC::new(b"logS");
    pub const PH1S: FourCC = FourCC::new(b"ph1S");
    pub const PHYS: FourCC = FourCC::new(b"phyS");
    pub const MODD: FourCC = FourCC::new(b"moDD");
    pub const MODD_LEGACY: FourCC = FourCC::new(b"modD");

    // Not written by Finder.
    pub const LCLR: FourCC = FourCC::new(b"lclr");
    pub const GRID_SPACING: FourCC = FourCC::new(b"icgs");
    pub const SHOW_ITEM_INFO: FourCC = FourCC::new(b"icsi");
    pub const SHOW_ICON_PREVIEW: FourCC = FourCC::new(b"icpv");
    pub const SORT_BY: FourCC = FourCC::new(b"srtb");
    pub const SHOW_TOOLBAR: FourCC = FourCC::new(b"tbvs");
    pub const SHOW_SIDEBAR: FourCC = FourCC::new(b"sbvs");
    pub const SHOW_PATH_BAR: FourCC = FourCC::new(b"pbvs");
    pub const SHOW_STATUS_BAR: FourCC = FourCC::new(b"stvs");
    pub const RELATIVE_DATES: FourCC = FourCC::new(b"lsrd");
}

/// Filename under which per-directory settings are stored.
pub const DIRECTORY: &str = ".";

// ── Icon location ────────────────────────────────────────────────────────────

const ILOC_TRAILER: [u8; 8] = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00];

/// `Iloc` payload: x, y in top-left-origin coordinates, then a fixed trailer.
pub fn encode_icon_location(x: u32, y: u32) -> Vec<u8> {
    let mut out = vec![0u8; 16];
    BigEndian::write_u32(&mut out[0..4], x);
    BigEndian::write_u32(&mut out[4..8], y);
    out[8..].copy_from_slice(&ILOC_TRAILER);
    out
}

pub fn decode_icon_location(blob: &[u8]) -> Option<(u32, u32)> {
    if blob.len() < 8 {
        return None;
    }
    Some((BigEndian::read_u32(&blob[0..4]), BigEndian::read_u32(&blob[4..8])))
}

// ── Colors and background ────────────────────────────────────────────────────

/// An RGBA color with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub red:   f32,
    pub green: f32,
    pub blue:  f32,
    pub alpha: f32,
}

impl Color {
    pub fn rgb(red: f32, green: f32, blue: f32) -> Self {
        Self { red, green, blue, alpha: 1.0 }
    }

    /// From 16-bit stored channels.  Stored colors are always opaque.
    pub fn from_u16(r: u16, g: u16, b: u16) -> Self {
        let f = |c: u16| f32::from(c) / 65535.0;
        Self::rgb(f(r), f(g), f(b))
    }

    pub fn to_u16(&self) -> (u16, u16, u16) {
        let c = |v: f32| (v.clamp(0.0, 1.0) * 65535.0).round() as u16;
        (c(self.red), c(self.green), c(self.blue))
    }
}

pub const BKGD_DEFAULT: FourCC = FourCC::new(b"DefB");
pub const BKGD_COLOR:   FourCC = FourCC::new(b"ClrB");
pub const BKGD_PICTURE: FourCC = FourCC::new(b"PctB");

/// Decoded `BKGD` blob (12 bytes: kind + 8 bytes of kind-specific data).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Background {
    Default,
    Color(Color),
    /// The picture itself is referenced by a separate `pict` record.
    Picture { pict_len: u32 },
}

impl Background {
    pub fn decode(blob: &[u8]) -> Option<Self> {
        if blob.len() < 12 {
            return None;
        }
        let kind = FourCC([blob[0], blob[1], blob[2], blob[3]]);
        match kind {
            BKGD_DEFAULT => Some(Background::Default),
            BKGD_COLOR => Some(Background::Color(Color::from_u16(
                BigEndian::read_u16(&blob[4..6]),
                BigEndian::read_u16(&blob[6..8]),
                BigEndian::read_u16(&blob[8..10]),
            ))),
            BKGD_PICTURE => Some(Background::Picture { pict_len: BigEndian::read_u32(&blob[4..8]) }),
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; 12];
        match self {
            Background::Default => out[0..4].copy_from_slice(BKGD_DEFAULT.as_bytes()),
            Background::Color(c) => {
                let (r, g, b) = c.to_u16();
                out[0..4].copy_from_slice(BKGD_COLOR.as_bytes());
                BigEndian::write_u16(&mut out[4..6], r);
                BigEndian::write_u16(&mut out[6..8], g);
                BigEndian::write_u16(&mut out[8..10], b);
            }
            Background::Picture { pict_len } => {
                out[0..4].copy_from_slice(BKGD_PICTURE.as_bytes());
                BigEndian::write_u32(&mut out[4..8], *pict_len);
            }
        }
        out
    }
}

// ── Enumerations backed by 4-byte codes ──────────────────────────────────────

macro_rules! fourcc_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name { $($variant),+ }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn code(self) -> FourCC {
                match self { $($name::$variant => FourCC::new($code)),+ }
            }

            pub fn from_code(code: FourCC) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.code() == code)
            }
        }
    };
}

fourcc_enum!(
    /// Folder view style (`vstl`).
    ViewStyle {
        Icon => b"icnv",
        List => b"Nlsv",
        Column => b"clmv",
        Gallery => b"glyv",
        Coverflow => b"Flwv",
    }
);

fourcc_enum!(
    IconArrangement {
        None => b"none",
        Grid => b"grid",
    }
);

fourcc_enum!(
    LabelPosition {
        Bottom => b"botm",
        Right => b"rght",
    }
);

fourcc_enum!(
    /// Sort key for a folder.
    SortBy {
        Name => b"name",
        DateModified => b"modd",
        DateCreated => b"ascd",
        Size => b"phys",
        Kind => b"kind",
        Label => b"labl",
        DateAdded => b"dadd",
    }
);

/// Finder label colors, stored as their index 0..=7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelColor {
    None = 0,
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Grey,
}

impl LabelColor {
    pub fn from_index(i: u32) -> Option<Self> {
        use LabelColor::*;
        [None, Red, Orange, Yellow, Green, Blue, Purple, Grey].get(i as usize).copied()
    }

    pub fn index(self) -> u32 {
        self as u32
    }
}

// ── List view columns ────────────────────────────────────────────────────────

/// A list-view column.  Each column stores its width and visibility under
/// two codes derived from a 2-letter abbreviation: `cw??` and `cv??`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Name,
    DateModified,
    DateCreated,
    Size,
    Kind,
    Label,
    Version,
    Comments,
    DateAdded,
}

impl Column {
    pub const ALL: [Column; 9] = [
        Column::Name,
        Column::DateModified,
        Column::DateCreated,
        Column::Size,
        Column::Kind,
        Column::Label,
        Column::Version,
        Column::Comments,
        Column::DateAdded,
    ];

    fn abbrev(self) -> &'static [u8; 2] {
        match self {
            Column::Name         => b"nm",
            Column::DateModified => b"md",
            Column::DateCreated  => b"cd",
            Column::Size         => b"sz",
            Column::Kind         => b"kd",
            Column::Label        => b"lb",
            Column::Version      => b"vr",
            Column::Comments     => b"cm",
            Column::DateAdded    => b"ad",
        }
    }

    pub fn width_code(self) -> FourCC {
        let a = self.abbrev();
        FourCC([b'c', b'w', a[0], a[1]])
    }

    pub fn visible_code(self) -> FourCC {
        let a = self.abbrev();
        FourCC([b'c', b'v', a[0], a[1]])
    }

    /// The name used by the list view (`"name"`, `"dateModified"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            Column::Name         => "name",
            Column::DateModified => "dateModified",
            Column::DateCreated  => "dateCreated",
            Column::Size         => "size",
            Column::Kind         => "kind",
            Column::Label        => "label",
            Column::Version      => "version",
            Column::Comments     => "comments",
            Column::DateAdded    => "dateAdded",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }

    /// Whether the column shows when nothing is stored for it.
    pub fn visible_by_default(self) -> bool {
        matches!(self, Column::Name | Column::DateModified | Column::Size | Column::Kind)
    }
}

// ── Icon view options (icvo) ─────────────────────────────────────────────────

const ICV4: &[u8; 4] = b"icv4";

/// The `icv4` form of the `icvo` blob:
/// `"icv4" | u16 icon size | arrangement | label position | 12 flag bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconViewOptions {
    pub icon_size:      u16,
    pub arrangement:    IconArrangement,
    pub label_position: LabelPosition,
    pub flags:          [u8; 12],
}

impl Default for IconViewOptions {
    fn default() -> Self {
        Self {
            icon_size:      48,
            arrangement:    IconArrangement::None,
            label_position: LabelPosition::Bottom,
            flags:          [0u8; 12],
        }
    }
}

impl IconViewOptions {
    pub const LEN: usize = 26;

    pub fn decode(blob: &[u8]) -> Option<Self> {
        if blob.len() < Self::LEN || &blob[0..4] != ICV4 {
            return None;
        }
        let mut flags = [0u8; 12];
        flags.copy_from_slice(&blob[14..26]);
        Some(Self {
            icon_size:      BigEndian::read_u16(&blob[4..6]),
            arrangement:    IconArrangement::from_code(FourCC([blob[6], blob[7], blob[8], blob[9]]))?,
            label_position: LabelPosition::from_code(FourCC([blob[10], blob[11], blob[12], blob[13]]))?,
            flags,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(ICV4);
        out.extend_from_slice(&self.icon_size.to_be_bytes());
        out.extend_from_slice(self.arrangement.code().as_bytes());
        out.extend_from_slice(self.label_position.code().as_bytes());
        out.extend_from_slice(&self.flags);
        out
    }
}

// ── Window frame (fwi0) ──────────────────────────────────────────────────────

/// Folder window geometry in top-left-origin screen coordinates, plus the
/// view style the window opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFrame {
    pub top:    u16,
    pub left:   u16,
    pub bottom: u16,
    pub right:  u16,
    pub view:   FourCC,
}

impl WindowFrame {
    pub const LEN: usize = 16;

    pub fn width(&self) -> u16 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u16 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn decode(blob: &[u8]) -> Option<Self> {
        if blob.len() < 12 {
            return None;
        }
        Some(Self {
            top:    BigEndian::read_u16(&blob[0..2]),
            left:   BigEndian::read_u16(&blob[2..4]),
            bottom: BigEndian::read_u16(&blob[4..6]),
            right:  BigEndian::read_u16(&blob[6..8]),
            view:   FourCC([blob[8], blob[9], blob[10], blob[11]]),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![0u8; Self::LEN];
        BigEndian::write_u16(&mut out[0..2], self.top);
        BigEndian::write_u16(&mut out[2..4], self.left);
        BigEndian::write_u16(&mut out[4..6], self.bottom);
        BigEndian::write_u16(&mut out[6..8], self.right);
        out[8..12].copy_from_slice(self.view.as_bytes());
        out
    }
}

// ── Timestamps (dutc) ────────────────────────────────────────────────────────

/// Seconds between 1904-01-01 and 1970-01-01.
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

/// `dutc` values count 1/65536 s since 1904-01-01T00:00:00Z.
pub fn dutc_to_datetime(ticks: u64) -> Option<DateTime<Utc>> {
    let secs = (ticks >> 16) as i64 - MAC_EPOCH_OFFSET;
    let nanos = (((ticks & 0xFFFF) * 1_000_000_000) >> 16) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

/// Inverse of [`dutc_to_datetime`]; dates before 1904 clamp to 0.
pub fn datetime_to_dutc(dt: &DateTime<Utc>) -> u64 {
    let secs = dt.timestamp() + MAC_EPOCH_OFFSET;
    if secs < 0 {
        return 0;
    }
    let frac = (u64::from(dt.timestamp_subsec_nanos()) << 16) / 1_000_000_000;
    ((secs as u64) << 16) | frac
}
