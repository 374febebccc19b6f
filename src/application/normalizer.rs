//! Vendor product -> catalog record mapping
//!
//! Parameter lookup is a single pass over the product's parameter list into a
//! label map; scalar fields take the first value for their label, features and
//! ratings collect every value.

use std::collections::{HashMap, HashSet};

use crate::domain::catalog::{
    CaptureDate, CatalogRecord, Classifications, PackagePricing, PackageQuantities, PackageType,
    PartAttributes, PriceBreak, Snapshot,
};
use crate::domain::vendor::VendorProduct;

mod labels {
    pub const RESISTANCE: &str = "Resistance";
    pub const TOLERANCE: &str = "Tolerance";
    pub const POWER: &str = "Power (Watts)";
    pub const COMPOSITION: &str = "Composition";
    pub const FEATURES: &str = "Features";
    pub const TEMP_COEFFICIENT: &str = "Temperature Coefficient";
    pub const OPERATING_TEMPERATURE: &str = "Operating Temperature";
    pub const PACKAGE_CASE: &str = "Package / Case";
    pub const SUPPLIER_PACKAGE: &str = "Supplier Device Package";
    pub const RATINGS: &str = "Ratings";
    pub const SIZE: &str = "Size / Dimension";
    pub const HEIGHT: &str = "Height - Seated (Max)";
    pub const TERMINATIONS: &str = "Number of Terminations";
    pub const FAILURE_RATE: &str = "Failure Rate";
}

/// Stamps every snapshot with the date it was created for
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    captured_on: CaptureDate,
}

impl Normalizer {
    pub const fn new(captured_on: CaptureDate) -> Self {
        Self { captured_on }
    }

    pub fn today() -> Self {
        Self::new(CaptureDate::today())
    }

    /// Builds a record with exactly one pricing and one inventory snapshot.
    ///
    /// Fails only if a snapshot payload cannot be rendered for hashing.
    pub fn normalize(&self, product: &VendorProduct) -> Result<CatalogRecord, serde_json::Error> {
        let mut params: HashMap<&str, Vec<&str>> = HashMap::new();
        for parameter in &product.parameters {
            params
                .entry(parameter.parameter_text.as_str())
                .or_default()
                .push(parameter.value_text.as_str());
        }
        let first = |label: &str| -> String {
            params
                .get(label)
                .and_then(|values| values.first())
                .map(|v| (*v).to_string())
                .unwrap_or_default()
        };
        let all = |label: &str| -> Vec<String> {
            params
                .get(label)
                .map(|values| values.iter().map(|v| (*v).to_string()).collect())
                .unwrap_or_default()
        };

        let attributes = PartAttributes {
            product_description: product.description.product_description.clone(),
            detailed_description: product.description.detailed_description.clone(),
            product_url: product.product_url.clone().unwrap_or_default(),
            datasheet_url: product.datasheet_url.clone().unwrap_or_default(),
            photo_url: product.photo_url.clone().unwrap_or_default(),
            video_url: product.primary_video_url.clone().unwrap_or_default(),
            status: product.product_status.status.clone(),
            resistance: first(labels::RESISTANCE),
            resistance_tolerance: first(labels::TOLERANCE),
            power: first(labels::POWER),
            composition: first(labels::COMPOSITION),
            features: all(labels::FEATURES),
            temp_coefficient: first(labels::TEMP_COEFFICIENT),
            operating_temperature: first(labels::OPERATING_TEMPERATURE),
            vendor_case_size: first(labels::PACKAGE_CASE),
            case_size: first(labels::SUPPLIER_PACKAGE),
            ratings: all(labels::RATINGS),
            dimensions: first(labels::SIZE),
            height: first(labels::HEIGHT),
            terminations_number: parse_leading_int(&first(labels::TERMINATIONS)),
            fail_rate: first(labels::FAILURE_RATE),
            category: product.category.name.clone(),
            sub_category: product
                .category
                .child_categories
                .first()
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            series: product.series.name.clone(),
            classifications: Classifications {
                reach_status: product.classifications.reach_status.clone(),
                rohs_status: product.classifications.rohs_status.clone(),
                moisture_sensitivity_level: product
                    .classifications
                    .moisture_sensitivity_level
                    .clone(),
                export_control_class_number: product
                    .classifications
                    .export_control_class_number
                    .clone(),
                htsus_code: product.classifications.htsus_code.clone(),
            },
        };

        let mut pricing = PackagePricing::default();
        let mut quantities = PackageQuantities::default();
        let mut filled = HashSet::new();
        for variation in &product.product_variations {
            // First variation per package type wins
            let Some(package) = PackageType::from_vendor_id(variation.package_type.id)
                .filter(|package| filled.insert(*package))
            else {
                continue;
            };
            *pricing.slot_mut(package) = variation
                .standard_pricing
                .iter()
                .map(|b| PriceBreak {
                    break_quantity: b.break_quantity,
                    unit_price: b.unit_price,
                    total_price: b.total_price,
                })
                .collect();
            *quantities.slot_mut(package) = variation.quantity_available_for_package_type;
        }

        Ok(CatalogRecord {
            part_number: product.manufacturer_product_number.clone(),
            attributes,
            pricing: vec![Snapshot::capture(pricing, self.captured_on)?],
            inventory: vec![Snapshot::capture(quantities, self.captured_on)?],
        })
    }
}

/// Leading decimal digits of `raw`, 0 when there are none
fn parse_leading_int(raw: &str) -> u32 {
    let digits: String = raw
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vendor::{
        Category, PackageTypeRef, Parameter, ProductVariation, VendorPriceBreak,
    };

    fn param(label: &str, value: &str) -> Parameter {
        Parameter {
            parameter_id: 0,
            parameter_text: label.into(),
            value_text: value.into(),
        }
    }

    fn product() -> VendorProduct {
        serde_json::from_value(serde_json::json!({
            "ManufacturerProductNumber": "ERJ-2RKF1002X",
            "Description": {
                "ProductDescription": "RES 10K OHM 1% 1/10W 0402",
                "DetailedDescription": "10 kOhms"
            },
            "ProductUrl": "https://vendor.example/p/1",
            "ProductStatus": {"Id": 0, "Status": "Active"},
            "Category": {
                "Name": "Resistors",
                "ChildCategories": [{"Name": "Chip Resistor - Surface Mount"}]
            },
            "Series": {"Name": "ERJ"}
        }))
        .unwrap()
    }

    fn price_break(break_quantity: u64, unit_price: f64, total_price: f64) -> VendorPriceBreak {
        VendorPriceBreak { break_quantity, unit_price, total_price }
    }

    fn date() -> CaptureDate {
        CaptureDate { year: 2024, month: 5, day: 1 }
    }

    #[test]
    fn maps_descriptive_fields_and_first_scalar_wins() {
        let mut p = product();
        p.parameters = vec![
            param("Resistance", "10 kOhms"),
            param("Resistance", "ignored"),
            param("Tolerance", "±1%"),
            param("Features", "Anti-Sulfur"),
            param("Features", "Moisture Resistant"),
            param("Number of Terminations", "2"),
            param("Package / Case", "0402 (1005 Metric)"),
        ];
        let record = Normalizer::new(date()).normalize(&p).unwrap();
        let a = &record.attributes;
        assert_eq!(record.part_number, "ERJ-2RKF1002X");
        assert_eq!(a.product_description, "RES 10K OHM 1% 1/10W 0402");
        assert_eq!(a.resistance, "10 kOhms");
        assert_eq!(a.resistance_tolerance, "±1%");
        assert_eq!(a.features, vec!["Anti-Sulfur", "Moisture Resistant"]);
        assert!(a.ratings.is_empty());
        assert_eq!(a.terminations_number, 2);
        assert_eq!(a.vendor_case_size, "0402 (1005 Metric)");
        assert_eq!(a.sub_category, "Chip Resistor - Surface Mount");
        assert_eq!(a.series, "ERJ");
        assert_eq!(a.datasheet_url, "");
    }

    #[test]
    fn absent_parameters_default() {
        let record = Normalizer::new(date()).normalize(&product()).unwrap();
        assert_eq!(record.attributes.power, "");
        assert_eq!(record.attributes.terminations_number, 0);
    }

    #[test]
    fn single_snapshots_by_package_type() {
        let mut p = product();
        p.product_variations = vec![
            ProductVariation {
                package_type: PackageTypeRef { id: 1, name: "Tape & Reel (TR)".into() },
                standard_pricing: vec![price_break(10_000, 0.002, 20.0)],
                quantity_available_for_package_type: 50_000,
            },
            ProductVariation {
                package_type: PackageTypeRef { id: 2, name: "Cut Tape (CT)".into() },
                standard_pricing: vec![price_break(1, 0.1, 0.1)],
                quantity_available_for_package_type: 1_234,
            },
            ProductVariation {
                package_type: PackageTypeRef { id: 99, name: "Bulk".into() },
                standard_pricing: vec![],
                quantity_available_for_package_type: 7,
            },
        ];
        let record = Normalizer::new(date()).normalize(&p).unwrap();
        assert_eq!(record.pricing.len(), 1);
        assert_eq!(record.inventory.len(), 1);
        let pricing = &record.pricing[0].payload;
        assert_eq!(pricing.tape_reel[0].break_quantity, 10_000);
        assert_eq!(pricing.cut_tape[0].unit_price, 0.1);
        assert!(pricing.digi_reel.is_empty());
        let inventory = record.inventory[0].payload;
        assert_eq!(inventory.tape_reel, 50_000);
        assert_eq!(inventory.cut_tape, 1_234);
        assert_eq!(inventory.digi_reel, 0);
        assert_eq!(record.pricing[0].captured_on, date());
    }

    #[test]
    fn repeated_package_type_keeps_first_variation() {
        let mut p = product();
        p.product_variations = vec![
            ProductVariation {
                package_type: PackageTypeRef { id: 3, name: "Digi-Reel®".into() },
                standard_pricing: vec![price_break(1, 0.1, 0.1)],
                quantity_available_for_package_type: 100,
            },
            ProductVariation {
                package_type: PackageTypeRef { id: 3, name: "Digi-Reel®".into() },
                standard_pricing: vec![],
                quantity_available_for_package_type: 0,
            },
        ];
        let record = Normalizer::new(date()).normalize(&p).unwrap();
        assert_eq!(record.inventory[0].payload.digi_reel, 100);
        assert_eq!(record.pricing[0].payload.digi_reel.len(), 1);
    }

    #[test]
    fn identical_products_hash_identically_across_days() {
        let day1 = Normalizer::new(date()).normalize(&product()).unwrap();
        let day2 = Normalizer::new(CaptureDate { year: 2024, month: 5, day: 2 })
            .normalize(&product())
            .unwrap();
        assert_eq!(day1.pricing[0].content_hash, day2.pricing[0].content_hash);
        assert_eq!(day1.inventory[0].content_hash, day2.inventory[0].content_hash);
    }

    #[test]
    fn leading_int_parsing() {
        assert_eq!(parse_leading_int("2"), 2);
        assert_eq!(parse_leading_int(" 4 pads"), 4);
        assert_eq!(parse_leading_int("-"), 0);
        assert_eq!(parse_leading_int(""), 0);
    }

    #[test]
    fn sub_category_empty_without_children() {
        let mut p = product();
        p.category = Category {
            category_id: 1,
            name: "Resistors".into(),
            child_categories: vec![],
        };
        let record = Normalizer::new(date()).normalize(&p).unwrap();
        assert_eq!(record.attributes.sub_category, "");
    }
}
