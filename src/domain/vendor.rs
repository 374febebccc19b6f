//! Wire shapes of the vendor's keyword search API
//!
//! Everything optional on the vendor side is defaulted so a sparse product
//! still deserializes; only the part number is mandatory.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CategoryFilter {
    pub id: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterFilterRequest {
    pub category_filter: CategoryFilter,
    #[serde(default)]
    pub parameter_filters: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusFilter {
    pub id: u32,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilterOptionsRequest {
    #[serde(default)]
    pub manufacturer_filter: Vec<serde_json::Value>,
    pub minimum_quantity_available: u64,
    pub parameter_filter_request: ParameterFilterRequest,
    #[serde(default)]
    pub status_filter: Vec<StatusFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SortOptions {
    pub field: String,
    pub sort_order: String,
}

/// Search request template. Only `offset` (and `limit`) vary between pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchRequest {
    pub keywords: String,
    pub limit: u64,
    pub offset: u64,
    pub filter_options_request: FilterOptionsRequest,
    pub exclude_market_place_products: bool,
    pub sort_options: SortOptions,
}

impl SearchRequest {
    /// Copy of this template pointed at `offset`
    pub fn at_offset(&self, offset: u64) -> Self {
        Self {
            offset,
            ..self.clone()
        }
    }
}

impl Default for SearchRequest {
    /// Active, in-stock surface-mount chip resistors
    fn default() -> Self {
        Self {
            keywords: "Resistor".into(),
            limit: 50,
            offset: 0,
            filter_options_request: FilterOptionsRequest {
                manufacturer_filter: Vec::new(),
                minimum_quantity_available: 1,
                parameter_filter_request: ParameterFilterRequest {
                    category_filter: CategoryFilter {
                        id: "52".into(),
                        value: "Chip Resistor - Surface Mount".into(),
                    },
                    parameter_filters: Vec::new(),
                },
                status_filter: vec![StatusFilter {
                    id: 0,
                    value: "Active".into(),
                }],
            },
            exclude_market_place_products: false,
            sort_options: SortOptions {
                field: "None".into(),
                sort_order: "Ascending".into(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProductDescription {
    pub product_description: String,
    pub detailed_description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProductStatus {
    pub id: u32,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Parameter {
    pub parameter_id: u32,
    pub parameter_text: String,
    pub value_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PackageTypeRef {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VendorPriceBreak {
    pub break_quantity: u64,
    pub unit_price: f64,
    pub total_price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProductVariation {
    pub package_type: PackageTypeRef,
    pub standard_pricing: Vec<VendorPriceBreak>,
    #[serde(rename = "QuantityAvailableforPackageType")]
    pub quantity_available_for_package_type: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Category {
    pub category_id: u32,
    pub name: String,
    pub child_categories: Vec<Category>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Series {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VendorClassifications {
    pub reach_status: String,
    pub rohs_status: String,
    pub moisture_sensitivity_level: String,
    pub export_control_class_number: String,
    pub htsus_code: String,
}

/// A raw product as returned by the search endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VendorProduct {
    pub manufacturer_product_number: String,
    #[serde(default)]
    pub description: ProductDescription,
    #[serde(default)]
    pub product_url: Option<String>,
    #[serde(default)]
    pub datasheet_url: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub primary_video_url: Option<String>,
    #[serde(default)]
    pub product_status: ProductStatus,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub product_variations: Vec<ProductVariation>,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub series: Series,
    #[serde(default)]
    pub classifications: VendorClassifications,
}

/// Body of a search response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchResponse {
    pub products_count: u64,
    #[serde(default)]
    pub products: Vec<VendorProduct>,
}

/// A decoded search page plus the quota hint from the response headers
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub total_count: u64,
    pub products: Vec<VendorProduct>,
    /// Requests left in the credential's current window, when reported
    pub remaining_requests: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_request_serializes_in_vendor_shape() {
        let body = serde_json::to_value(SearchRequest::default().at_offset(150)).unwrap();
        assert_eq!(body["Offset"], 150);
        assert_eq!(body["Limit"], 50);
        assert_eq!(
            body["FilterOptionsRequest"]["ParameterFilterRequest"]["CategoryFilter"]["Id"],
            "52"
        );
        assert_eq!(body["FilterOptionsRequest"]["StatusFilter"][0]["Value"], "Active");
        assert_eq!(body["SortOptions"]["SortOrder"], "Ascending");
    }

    #[test]
    fn sparse_product_deserializes() {
        let json = r#"{
            "ProductsCount": 1,
            "Products": [{
                "ManufacturerProductNumber": "RC0402FR-0710KL",
                "ProductVariations": [
                    {
                        "PackageType": {"Id": 2, "Name": "Cut Tape (CT)"},
                        "QuantityAvailableforPackageType": 1200
                    }
                ]
            }]
        }"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.products_count, 1);
        let product = &response.products[0];
        assert_eq!(product.manufacturer_product_number, "RC0402FR-0710KL");
        assert_eq!(product.product_variations[0].package_type.id, 2);
        assert_eq!(product.product_variations[0].quantity_available_for_package_type, 1200);
        assert!(product.product_variations[0].standard_pricing.is_empty());
    }

    #[test]
    fn product_without_part_number_is_rejected() {
        let json = r#"{"ProductsCount": 1, "Products": [{"ProductUrl": "x"}]}"#;
        assert!(serde_json::from_str::<SearchResponse>(json).is_err());
    }
}
