//! Catalog record entity and its append-only history snapshots

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Calendar date a snapshot was captured on (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaptureDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl CaptureDate {
    pub fn today() -> Self {
        Self::from_naive(Utc::now().date_naive())
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }
}

impl std::fmt::Display for CaptureDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Packaging options the vendor prices separately
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    TapeReel,
    CutTape,
    DigiReel,
}

impl PackageType {
    /// Maps the vendor's numeric package id. Unknown ids are ignored.
    pub const fn from_vendor_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::TapeReel),
            2 => Some(Self::CutTape),
            3 => Some(Self::DigiReel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreak {
    pub break_quantity: u64,
    pub unit_price: f64,
    pub total_price: f64,
}

/// Price tiers per package type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackagePricing {
    #[serde(default)]
    pub tape_reel: Vec<PriceBreak>,
    #[serde(default)]
    pub cut_tape: Vec<PriceBreak>,
    #[serde(default)]
    pub digi_reel: Vec<PriceBreak>,
}

impl PackagePricing {
    pub fn slot_mut(&mut self, package: PackageType) -> &mut Vec<PriceBreak> {
        match package {
            PackageType::TapeReel => &mut self.tape_reel,
            PackageType::CutTape => &mut self.cut_tape,
            PackageType::DigiReel => &mut self.digi_reel,
        }
    }
}

/// Quantity available per package type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageQuantities {
    #[serde(default)]
    pub tape_reel: u64,
    #[serde(default)]
    pub cut_tape: u64,
    #[serde(default)]
    pub digi_reel: u64,
}

impl PackageQuantities {
    pub fn slot_mut(&mut self, package: PackageType) -> &mut u64 {
        match package {
            PackageType::TapeReel => &mut self.tape_reel,
            PackageType::CutTape => &mut self.cut_tape,
            PackageType::DigiReel => &mut self.digi_reel,
        }
    }
}

/// One entry of a history sequence.
///
/// `content_hash` covers `payload` only, so two captures of identical data on
/// different days share a hash and the later one is never appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<P> {
    pub payload: P,
    pub content_hash: String,
    pub captured_on: CaptureDate,
}

pub type PriceSnapshot = Snapshot<PackagePricing>;
pub type InventorySnapshot = Snapshot<PackageQuantities>;

impl<P: Serialize> Snapshot<P> {
    pub fn capture(payload: P, captured_on: CaptureDate) -> Result<Self, serde_json::Error> {
        let content_hash = content_hash(&payload)?;
        Ok(Self {
            payload,
            content_hash,
            captured_on,
        })
    }
}

/// Hex blake3 digest of the canonical JSON form of `payload`.
///
/// Object keys are sorted recursively, so the digest is independent of
/// field declaration order and of the serde_json map backend.
pub fn content_hash<P: Serialize>(payload: &P) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(payload)?;
    let mut canonical = String::new();
    write_canonical(&value, &mut canonical)?;
    Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

/// Regulatory classifications as reported by the vendor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classifications {
    #[serde(default)]
    pub reach_status: String,
    #[serde(default)]
    pub rohs_status: String,
    #[serde(default)]
    pub moisture_sensitivity_level: String,
    #[serde(default)]
    pub export_control_class_number: String,
    #[serde(default)]
    pub htsus_code: String,
}

/// Descriptive attributes of a part. Overwritten on every update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartAttributes {
    pub product_description: String,
    pub detailed_description: String,
    pub product_url: String,
    pub datasheet_url: String,
    pub photo_url: String,
    pub video_url: String,
    pub status: String,
    pub resistance: String,
    pub resistance_tolerance: String,
    pub power: String,
    pub composition: String,
    pub features: Vec<String>,
    pub temp_coefficient: String,
    pub operating_temperature: String,
    /// Vendor's own package/case naming
    pub vendor_case_size: String,
    pub case_size: String,
    pub ratings: Vec<String>,
    pub dimensions: String,
    pub height: String,
    pub terminations_number: u32,
    pub fail_rate: String,
    pub category: String,
    pub sub_category: String,
    pub series: String,
    pub classifications: Classifications,
}

/// Normalized catalog entry keyed by `part_number`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub part_number: String,
    pub attributes: PartAttributes,
    pub pricing: Vec<PriceSnapshot>,
    pub inventory: Vec<InventorySnapshot>,
}

/// Replacement history (and refreshed attributes) for an existing record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryUpdate {
    pub part_number: String,
    pub attributes: PartAttributes,
    pub pricing: Vec<PriceSnapshot>,
    pub inventory: Vec<InventorySnapshot>,
}

impl From<CatalogRecord> for HistoryUpdate {
    fn from(record: CatalogRecord) -> Self {
        Self {
            part_number: record.part_number,
            attributes: record.attributes,
            pricing: record.pricing,
            inventory: record.inventory,
        }
    }
}
