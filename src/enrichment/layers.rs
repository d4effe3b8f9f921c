//! The three enrichment strategy layers, richest first.
//!
//! Layer A asks the primary model for full market segments, layer B asks a
//! cheaper model to fill only the record's own missing attributes, and layer
//! C synthesizes a minimal result from data already at hand. C has no
//! failure path, which is what guarantees the resolver always terminates
//! with a usable result.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::enrichment::completion::{CompletionClient, CompletionRequest, extract_json};
use crate::enrichment::schema::{
    EnrichmentOutcome, MarketProfile, MarketSegment, ProductProfile, RecordFill, validate_markets,
    validate_record_fill,
};
use crate::enrichment::{EnrichmentError, EnrichmentStrategy, Layer};
use crate::records::TargetRecord;

const MARKET_SYSTEM_PROMPT: &str =
    "You are a B2B market intelligence analyst. Return ONLY valid JSON.";

const FILL_SYSTEM_PROMPT: &str =
    "You are a company data specialist. Return ONLY valid JSON. Use null for unknown fields.";

/// Layer A: specialized market generation with nested competitors and leads.
pub struct MarketGenerationStrategy {
    client: Arc<dyn CompletionClient>,
    model: String,
}

impl MarketGenerationStrategy {
    pub fn new(client: Arc<dyn CompletionClient>, model: String) -> Self {
        Self { client, model }
    }

    fn prompt(record: &TargetRecord) -> String {
        format!(
            "COMPANY:\n\
             - Name: {}\n\
             - Product: {}\n\
             - Location: {}/{}\n\n\
             TASK: Identify the markets this company operates in, with competitors and leads.\n\n\
             Return ONLY a JSON object of the form:\n\
             {{\"markets\": [{{\n\
             \"market\": {{\"name\": \"...\", \"category\": \"...\", \"segmentation\": \"...\", \"estimated_size\": \"...\"}},\n\
             \"products\": [{{\"name\": \"...\", \"category\": \"...\", \"description\": \"...\"}}],\n\
             \"competitors\": [{{\"name\": \"...\", \"website\": \"...\", \"primary_product\": \"...\", \"city\": \"...\", \"state\": \"...\", \"size_class\": \"...\", \"industry_code\": \"...\", \"sector\": \"...\", \"email\": \"...\", \"phone\": \"...\", \"latitude\": -23.55, \"longitude\": -46.63}}],\n\
             \"leads\": [{{\"name\": \"...\", \"segment\": \"...\", \"potential\": \"...\", \"rationale\": \"...\", \"size_class\": \"...\", \"industry_code\": \"...\", \"city\": \"...\", \"state\": \"...\", \"latitude\": -23.55, \"longitude\": -46.63}}]\n\
             }}]}}\n\n\
             Requirements: at least 2 relevant markets, real companies, industry codes in\n\
             XXXX-X/XX format, real coordinates for every competitor and lead.",
            record.name,
            record.primary_product.as_deref().unwrap_or("unknown"),
            record.city.as_deref().unwrap_or(""),
            record.state.as_deref().unwrap_or(""),
        )
    }
}

#[async_trait]
impl EnrichmentStrategy for MarketGenerationStrategy {
    fn layer(&self) -> Layer {
        Layer::A
    }

    async fn attempt(&self, record: &TargetRecord) -> Result<EnrichmentOutcome, EnrichmentError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            system: Some(MARKET_SYSTEM_PROMPT.to_string()),
            prompt: Self::prompt(record),
            temperature: 0.2,
            max_tokens: 8_000,
        };

        let content = self.client.complete(&request).await?;
        let value = extract_json(&content)?;

        let markets: Vec<MarketSegment> = serde_json::from_value(
            value
                .get("markets")
                .cloned()
                .ok_or_else(|| EnrichmentError::schema_invalid("missing markets array"))?,
        )
        .map_err(|err| EnrichmentError::schema_invalid(format!("malformed markets: {err}")))?;

        validate_markets(&markets)?;
        debug!(record = %record.id, markets = markets.len(), "market generation succeeded");

        Ok(EnrichmentOutcome {
            record_fill: RecordFill::default(),
            markets,
        })
    }
}

/// Layer B: fill only the record's own missing attributes.
pub struct RecordFillStrategy {
    client: Arc<dyn CompletionClient>,
    model: String,
}

impl RecordFillStrategy {
    pub fn new(client: Arc<dyn CompletionClient>, model: String) -> Self {
        Self { client, model }
    }

    fn prompt(record: &TargetRecord) -> String {
        format!(
            "COMPANY:\n\
             - Name: {}\n\
             - Registration: {}\n\
             - Website: {}\n\
             - Product: {}\n\
             - City: {}\n\
             - State: {}\n\n\
             TASK: Complete the company's missing attributes.\n\n\
             Return ONLY a JSON object with the keys: website, primary_product, city, state,\n\
             region, industry_code (XXXX-X/XX), size_class, email, phone, latitude, longitude.\n\
             Use null for anything you do not know with confidence. Never invent contact data.",
            record.name,
            record.registration_id.as_deref().unwrap_or("unknown"),
            record.website.as_deref().unwrap_or("unknown"),
            record.primary_product.as_deref().unwrap_or("unknown"),
            record.city.as_deref().unwrap_or("unknown"),
            record.state.as_deref().unwrap_or("unknown"),
        )
    }
}

#[async_trait]
impl EnrichmentStrategy for RecordFillStrategy {
    fn layer(&self) -> Layer {
        Layer::B
    }

    async fn attempt(&self, record: &TargetRecord) -> Result<EnrichmentOutcome, EnrichmentError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            system: Some(FILL_SYSTEM_PROMPT.to_string()),
            prompt: Self::prompt(record),
            temperature: 0.1,
            max_tokens: 1_000,
        };

        let content = self.client.complete(&request).await?;
        let value = extract_json(&content)?;

        let record_fill: RecordFill = serde_json::from_value(value)
            .map_err(|err| EnrichmentError::schema_invalid(format!("malformed fill: {err}")))?;

        validate_record_fill(&record_fill)?;
        debug!(record = %record.id, "record fill succeeded");

        Ok(EnrichmentOutcome {
            record_fill,
            markets: Vec::new(),
        })
    }
}

/// Layer C: deterministic minimal fill with no external call.
#[derive(Default)]
pub struct MinimalFillStrategy;

impl MinimalFillStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Best-effort industry-code guess from the stated product/service text.
    fn guess_industry_code(product: &str) -> &'static str {
        let product = product.to_lowercase();

        if product.contains("embalagem")
            || product.contains("plastico")
            || product.contains("plástico")
            || product.contains("packaging")
        {
            "2229-3/99"
        } else if product.contains("alimento")
            || product.contains("agricola")
            || product.contains("agrícola")
            || product.contains("food")
        {
            "1099-6/99"
        } else if product.contains("construção")
            || product.contains("construcao")
            || product.contains("material")
            || product.contains("construction")
        {
            "2330-3/05"
        } else {
            "0000-0/00"
        }
    }

    /// Static state-to-region lookup.
    fn region_for_state(state: &str) -> Option<&'static str> {
        let region = match state.to_uppercase().as_str() {
            "SP" | "RJ" | "MG" | "ES" => "Sudeste",
            "RS" | "SC" | "PR" => "Sul",
            "BA" | "CE" | "PE" | "RN" | "PB" | "AL" | "SE" | "MA" | "PI" => "Nordeste",
            "GO" | "MT" | "MS" | "DF" => "Centro-Oeste",
            "AM" | "PA" | "RO" | "AC" | "RR" | "AP" | "TO" => "Norte",
            _ => return None,
        };
        Some(region)
    }
}

#[async_trait]
impl EnrichmentStrategy for MinimalFillStrategy {
    fn layer(&self) -> Layer {
        Layer::C
    }

    async fn attempt(&self, record: &TargetRecord) -> Result<EnrichmentOutcome, EnrichmentError> {
        let product = record.primary_product.as_deref().unwrap_or("");
        let generic_product = if product.is_empty() {
            "Industrial products".to_string()
        } else {
            product.to_string()
        };

        let record_fill = RecordFill {
            region: record
                .region
                .clone()
                .or_else(|| {
                    record
                        .state
                        .as_deref()
                        .and_then(Self::region_for_state)
                        .map(str::to_string)
                }),
            industry_code: record
                .industry_code
                .clone()
                .or_else(|| Some(Self::guess_industry_code(product).to_string())),
            size_class: record.size_class.clone().or_else(|| Some("Médio".to_string())),
            ..Default::default()
        };

        // One generic market bucket with zero competitors and leads.
        let markets = vec![MarketSegment {
            market: MarketProfile {
                name: format!("Mercado de {generic_product}"),
                category: "Indústria".to_string(),
                segmentation: "B2B".to_string(),
                estimated_size: None,
            },
            products: vec![ProductProfile {
                name: generic_product,
                category: Some("Industrial".to_string()),
                description: None,
            }],
            competitors: Vec::new(),
            leads: Vec::new(),
        }];

        Ok(EnrichmentOutcome {
            record_fill,
            markets,
        })
    }
}
