//! Enrichment strategies and the layered fallback resolver.
//!
//! Producing a complete enrichment result for one target record degrades
//! through an ordered list of strategies: rich market generation, then
//! record-attribute fill, then a deterministic minimal fill that cannot
//! fail. Downstream persistence is identical regardless of which layer
//! produced the result.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::records::TargetRecord;
use crate::retry::ErrorClass;

pub mod completion;
pub mod layers;
pub mod resolver;
pub mod schema;

pub use completion::{CompletionClient, CompletionRequest, HttpCompletionClient};
pub use resolver::FallbackResolver;
pub use schema::{EnrichmentOutcome, MarketSegment, RecordFill};

/// Errors surfaced by enrichment strategies and their collaborators.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// Network/timeout/5xx-equivalent failure from an external call.
    #[error("transient provider error: {message}")]
    TransientProvider { message: String },

    /// Denied by the rate limiter; never reaches the wrapped operation.
    #[error("rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Every retry attempt for one call was consumed.
    #[error("retries exhausted after {attempts} attempts: {message}")]
    ExhaustedRetries { attempts: u32, message: String },

    /// The strategy returned parseable but structurally wrong data.
    #[error("schema-invalid strategy output: {message}")]
    SchemaInvalid { message: String },

    /// The target record does not exist; aborts only that record.
    #[error("record {record_id} not found")]
    RecordNotFound { record_id: Uuid },

    /// Malformed input; aborts only that record, never retried.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl EnrichmentError {
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::TransientProvider {
            message: message.into(),
        }
    }

    pub fn schema_invalid<S: Into<String>>(message: S) -> Self {
        Self::SchemaInvalid {
            message: message.into(),
        }
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

impl ErrorClass for EnrichmentError {
    fn retryable(&self) -> bool {
        match self {
            // Schema-invalid output is treated like a transient provider
            // fault: the same prompt often parses on the next attempt.
            EnrichmentError::TransientProvider { .. } | EnrichmentError::SchemaInvalid { .. } => {
                true
            }
            EnrichmentError::RateLimited { .. }
            | EnrichmentError::ExhaustedRetries { .. }
            | EnrichmentError::RecordNotFound { .. }
            | EnrichmentError::InvalidInput { .. } => false,
        }
    }
}

/// The strategy layer that produced a result, richest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Layer {
    /// Specialized market generation with nested competitors/leads
    A,
    /// Record-attribute fill only
    B,
    /// Deterministic minimal fill, no external call
    C,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::A => "A",
            Layer::B => "B",
            Layer::C => "C",
        }
    }
}

/// A complete enrichment result for one record, tagged with the layer that
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub record_id: Uuid,
    pub layer_used: Layer,
    pub outcome: EnrichmentOutcome,
}

/// One method of producing enrichment output for a record.
///
/// Adding a degradation layer means appending an implementation to the
/// resolver's list, not adding branches.
#[async_trait]
pub trait EnrichmentStrategy: Send + Sync {
    /// The layer tag attached to results this strategy produces.
    fn layer(&self) -> Layer;

    /// Attempt to enrich one record.
    async fn attempt(&self, record: &TargetRecord) -> Result<EnrichmentOutcome, EnrichmentError>;
}
