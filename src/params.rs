//! Live, externally tunable render parameters.
//!
//! UI controls write here at any time (hex colours, 0–10 slider ticks); the
//! render loop reads a [`ParamSnapshot`] once per frame. Scalars and the count
//! are atomics; each colour sits behind its own short-held lock so all three
//! channels are written and read together at full precision. A frame never
//! sees a torn field. No cross-field consistency is promised.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::ParameterError;
use crate::scene::MAX_BLOBS;

/// Highest slider tick exposed by UI controls.
pub const SLIDER_MAX_TICK: f32 = 10.0;

/// Maps a UI slider tick in `[0, 10]` to the normalized `[0, 1]` range the
/// shader consumes. This is the only scalar normalization in the crate.
pub fn slider_to_scalar(tick: f32) -> f32 {
    clamp_unit(tick / SLIDER_MAX_TICK)
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// RGB colour with normalized channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: clamp_unit(r),
            g: clamp_unit(g),
            b: clamp_unit(b),
        }
    }

    pub fn from_bytes(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
        }
    }

    /// Parses `#rrggbb`, `rrggbb`, `#rgb` or `rgb`.
    pub fn from_hex(input: &str) -> Result<Self, ParameterError> {
        let invalid = || ParameterError::InvalidHex(input.to_string());
        let digits = input.trim().trim_start_matches('#');
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let expanded: String = match digits.len() {
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            6 => digits.to_string(),
            _ => return Err(invalid()),
        };
        let value = u32::from_str_radix(&expanded, 16).map_err(|_| invalid())?;
        Ok(Self::from_packed(value))
    }

    pub fn to_bytes(self) -> [u8; 3] {
        let q = |c: f32| (clamp_unit(c) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b)]
    }

    pub fn to_hex(self) -> String {
        let [r, g, b] = self.to_bytes();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }

    /// `[r, g, b, 1.0]`, ready for a vec4 uniform.
    pub fn to_vec4(self) -> [f32; 4] {
        [self.r, self.g, self.b, 1.0]
    }

    fn from_packed(v: u32) -> Self {
        Self::from_bytes((v >> 16) as u8, (v >> 8) as u8, v as u8)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Rgb::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterField {
    BackgroundColor,
    BlobColor,
    GlobalSize,
    GlobalSpeed,
    BlobCount,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Color(Rgb),
    Scalar(f32),
    Count(usize),
}

/// Plain copy of every parameter, taken at the start of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSnapshot {
    pub background_color: Rgb,
    pub blob_color: Rgb,
    pub global_size: f32,
    pub global_speed: f32,
    pub blob_count: usize,
}

pub const DEFAULT_BACKGROUND: Rgb = Rgb { r: 15.0 / 255.0, g: 23.0 / 255.0, b: 42.0 / 255.0 };
pub const DEFAULT_BLOB: Rgb = Rgb { r: 56.0 / 255.0, g: 189.0 / 255.0, b: 248.0 / 255.0 };
pub const DEFAULT_SIZE: f32 = 0.5;
pub const DEFAULT_SPEED: f32 = 0.5;
pub const DEFAULT_BLOB_COUNT: usize = 8;

/// Shared parameter store. Wrap in an `Arc` to hand it to UI writers.
#[derive(Debug)]
pub struct ParameterStore {
    background_color: Mutex<Rgb>,
    blob_color: Mutex<Rgb>,
    global_size: AtomicU32,
    global_speed: AtomicU32,
    blob_count: AtomicUsize,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self {
            background_color: Mutex::new(DEFAULT_BACKGROUND),
            blob_color: Mutex::new(DEFAULT_BLOB),
            global_size: AtomicU32::new(DEFAULT_SIZE.to_bits()),
            global_speed: AtomicU32::new(DEFAULT_SPEED.to_bits()),
            blob_count: AtomicUsize::new(DEFAULT_BLOB_COUNT),
        }
    }

    /// Type-checked setter used by the generic `set_parameter` control API.
    pub fn set(&self, field: ParameterField, value: ParamValue) -> Result<(), ParameterError> {
        match (field, value) {
            (ParameterField::BackgroundColor | ParameterField::BlobColor, ParamValue::Color(c)) => {
                self.set_color(field, c)
            }
            (ParameterField::GlobalSize | ParameterField::GlobalSpeed, ParamValue::Scalar(v)) => {
                self.set_scalar(field, v)
            }
            (ParameterField::BlobCount, ParamValue::Count(n)) => {
                self.set_blob_count(n);
                Ok(())
            }
            (ParameterField::BackgroundColor | ParameterField::BlobColor, _) => {
                Err(ParameterError::TypeMismatch { field, expected: "colour" })
            }
            (ParameterField::GlobalSize | ParameterField::GlobalSpeed, _) => {
                Err(ParameterError::TypeMismatch { field, expected: "scalar" })
            }
            (ParameterField::BlobCount, _) => {
                Err(ParameterError::TypeMismatch { field, expected: "count" })
            }
        }
    }

    /// Stores the colour as given, channels clamped to `[0, 1]`.
    pub fn set_color(&self, field: ParameterField, color: Rgb) -> Result<(), ParameterError> {
        let slot = match field {
            ParameterField::BackgroundColor => &self.background_color,
            ParameterField::BlobColor => &self.blob_color,
            _ => return Err(ParameterError::TypeMismatch { field, expected: "scalar or count" }),
        };
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Rgb::new(color.r, color.g, color.b);
        Ok(())
    }

    /// Stores a normalized scalar, clamped to `[0, 1]`.
    pub fn set_scalar(&self, field: ParameterField, value: f32) -> Result<(), ParameterError> {
        let slot = match field {
            ParameterField::GlobalSize => &self.global_size,
            ParameterField::GlobalSpeed => &self.global_speed,
            _ => return Err(ParameterError::TypeMismatch { field, expected: "colour or count" }),
        };
        slot.store(clamp_unit(value).to_bits(), Ordering::Release);
        Ok(())
    }

    /// Clamped to `MAX_BLOBS`, the array size the fragment shader is built with.
    pub fn set_blob_count(&self, count: usize) {
        if count > MAX_BLOBS {
            log::warn!("blob count {} exceeds engine limit {}; clamping", count, MAX_BLOBS);
        }
        self.blob_count.store(count.min(MAX_BLOBS), Ordering::Release);
    }

    pub fn background_color(&self) -> Rgb {
        load_color(&self.background_color)
    }

    pub fn blob_color(&self) -> Rgb {
        load_color(&self.blob_color)
    }

    pub fn global_size(&self) -> f32 {
        f32::from_bits(self.global_size.load(Ordering::Acquire))
    }

    pub fn global_speed(&self) -> f32 {
        f32::from_bits(self.global_speed.load(Ordering::Acquire))
    }

    pub fn blob_count(&self) -> usize {
        self.blob_count.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            background_color: self.background_color(),
            blob_color: self.blob_color(),
            global_size: self.global_size(),
            global_speed: self.global_speed(),
            blob_count: self.blob_count(),
        }
    }
}

fn load_color(slot: &Mutex<Rgb>) -> Rgb {
    *slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_hex_parsing() {
        let c = Rgb::from_hex("#ff8000").unwrap();
        assert_eq!(c.to_bytes(), [255, 128, 0]);
        assert_eq!(Rgb::from_hex("0f0").unwrap().to_hex(), "#00ff00");
        assert_eq!(Rgb::from_hex(" #0F172A ").unwrap().to_hex(), "#0f172a");
    }

    #[test]
    fn test_hex_rejects_garbage() {
        assert!(Rgb::from_hex("#ggg").is_err());
        assert!(Rgb::from_hex("#12345").is_err());
        assert!(Rgb::from_hex("").is_err());
    }

    #[test]
    fn test_slider_normalization() {
        assert_eq!(slider_to_scalar(0.0), 0.0);
        assert_eq!(slider_to_scalar(5.0), 0.5);
        assert_eq!(slider_to_scalar(10.0), 1.0);
        assert_eq!(slider_to_scalar(25.0), 1.0);
        assert_eq!(slider_to_scalar(f32::NAN), 0.0);
    }

    #[test]
    fn test_scalars_are_clamped() {
        let store = ParameterStore::new();
        store.set_scalar(ParameterField::GlobalSize, 4.0).unwrap();
        assert_eq!(store.global_size(), 1.0);
        store.set_scalar(ParameterField::GlobalSpeed, -1.0).unwrap();
        assert_eq!(store.global_speed(), 0.0);
    }

    #[test]
    fn test_blob_count_capped() {
        let store = ParameterStore::new();
        store.set_blob_count(500);
        assert_eq!(store.blob_count(), MAX_BLOBS);
        store.set_blob_count(0);
        assert_eq!(store.blob_count(), 0);
    }

    #[test]
    fn test_type_mismatch() {
        let store = ParameterStore::new();
        let err = store
            .set(ParameterField::BlobColor, ParamValue::Scalar(0.2))
            .unwrap_err();
        assert_eq!(
            err,
            ParameterError::TypeMismatch { field: ParameterField::BlobColor, expected: "colour" }
        );
        assert!(store.set_scalar(ParameterField::BlobCount, 1.0).is_err());
    }

    #[test]
    fn test_writes_from_other_threads_are_visible() {
        let store = Arc::new(ParameterStore::new());
        let writer = Arc::clone(&store);
        std::thread::spawn(move || {
            writer
                .set_color(ParameterField::BackgroundColor, Rgb::from_bytes(1, 2, 3))
                .unwrap();
            writer.set_blob_count(3);
        })
        .join()
        .unwrap();

        let snap = store.snapshot();
        assert_eq!(snap.background_color.to_bytes(), [1, 2, 3]);
        assert_eq!(snap.blob_count, 3);
    }

    #[test]
    fn test_colors_keep_full_precision() {
        let store = ParameterStore::new();
        let teal = Rgb::new(0.3, 0.5, 0.7);
        store
            .set(ParameterField::BlobColor, ParamValue::Color(teal))
            .unwrap();
        assert_eq!(store.blob_color(), teal);
        assert_eq!(store.snapshot().blob_color.to_vec4(), [0.3, 0.5, 0.7, 1.0]);

        let out_of_range = Rgb { r: 1.5, g: -0.2, b: 0.25 };
        store
            .set_color(ParameterField::BackgroundColor, out_of_range)
            .unwrap();
        assert_eq!(store.background_color(), Rgb::new(1.0, 0.0, 0.25));
    }

    #[test]
    fn test_rgb_serde_as_hex() {
        let c: Rgb = serde_json::from_str("\"#102030\"").unwrap();
        assert_eq!(c.to_bytes(), [16, 32, 48]);
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"#102030\"");
    }
}
