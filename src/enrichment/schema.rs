//! Structured enrichment output and its validation.
//!
//! Strategies return JSON that must deserialize into these shapes before a
//! layer counts as successful; anything parseable but structurally wrong is
//! rejected as schema-invalid and cascades to the next layer.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::enrichment::EnrichmentError;

/// One market segment with its nested generation output.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MarketSegment {
    pub market: MarketProfile,
    #[serde(default)]
    pub products: Vec<ProductProfile>,
    #[serde(default)]
    pub competitors: Vec<CompetitorProfile>,
    #[serde(default)]
    pub leads: Vec<LeadProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MarketProfile {
    pub name: String,
    pub category: String,
    pub segmentation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_size: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompetitorProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LeadProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Attribute updates for the record itself; only missing values are filled
/// downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RecordFill {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_product: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// What a successful strategy attempt yields, before the layer tag is
/// attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentOutcome {
    #[serde(default)]
    pub record_fill: RecordFill,
    #[serde(default)]
    pub markets: Vec<MarketSegment>,
}

/// Market-generation output must carry at least one named market.
pub fn validate_markets(markets: &[MarketSegment]) -> Result<(), EnrichmentError> {
    if markets.is_empty() {
        return Err(EnrichmentError::schema_invalid("no markets generated"));
    }

    for segment in markets {
        if segment.market.name.trim().is_empty() {
            return Err(EnrichmentError::schema_invalid("market with empty name"));
        }
        for competitor in &segment.competitors {
            if competitor.name.trim().is_empty() {
                return Err(EnrichmentError::schema_invalid(
                    "competitor with empty name",
                ));
            }
        }
        for lead in &segment.leads {
            if lead.name.trim().is_empty() {
                return Err(EnrichmentError::schema_invalid("lead with empty name"));
            }
        }
    }

    Ok(())
}

/// A record fill must contribute at least one attribute to be worth keeping.
pub fn validate_record_fill(fill: &RecordFill) -> Result<(), EnrichmentError> {
    let has_any = fill.website.is_some()
        || fill.primary_product.is_some()
        || fill.city.is_some()
        || fill.state.is_some()
        || fill.region.is_some()
        || fill.industry_code.is_some()
        || fill.size_class.is_some()
        || fill.email.is_some()
        || fill.phone.is_some()
        || fill.latitude.is_some()
        || fill.longitude.is_some();

    if has_any {
        Ok(())
    } else {
        Err(EnrichmentError::schema_invalid("record fill is empty"))
    }
}
