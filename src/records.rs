//! Target-record store seam.
//!
//! The engine reads target-record attributes and writes enrichment output
//! through this capability; the owning application's schema stays outside
//! the engine. Writes use insert-or-update by content hash so repeated
//! enrichment runs over overlapping records never duplicate market,
//! competitor, or lead rows.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::enrichment::schema::MarketSegment;
use crate::enrichment::{EnrichmentError, EnrichmentResult};

/// Basic attributes of one enrichable record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TargetRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Read/write access to target records and their enrichment output.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load one record by id.
    async fn load(&self, record_id: Uuid) -> Result<TargetRecord, EnrichmentError>;

    /// List a project's records in stable id order, for batch iteration.
    async fn list_project_records(
        &self,
        project_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TargetRecord>, EnrichmentError>;

    /// Count a project's records.
    async fn count_project_records(&self, project_id: Uuid) -> Result<usize, EnrichmentError>;

    /// Persist one enrichment result. Markets/competitors/leads are upserted
    /// by content hash; record attributes are merged into the record row.
    async fn apply(&self, result: &EnrichmentResult) -> Result<(), EnrichmentError>;
}

/// Stable content key for upsert-by-content semantics.
pub fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.trim().to_lowercase().as_bytes());
        hasher.update([0]);
    }
    hex::encode(hasher.finalize())
}

/// In-process record store.
///
/// The default backing for tests and single-node deployments; the hosting
/// application swaps in its own implementation over its record schema.
#[derive(Default)]
pub struct InMemoryRecordStore {
    inner: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    records: HashMap<Uuid, TargetRecord>,
    /// project -> content hash -> market segment
    markets: HashMap<Uuid, HashMap<String, MarketSegment>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, replacing any existing row with the same id.
    pub fn insert(&self, record: TargetRecord) {
        let mut state = self.inner.lock().expect("record store lock");
        state.records.insert(record.id, record);
    }

    /// Markets persisted for a project, in unspecified order.
    pub fn project_markets(&self, project_id: Uuid) -> Vec<MarketSegment> {
        let state = self.inner.lock().expect("record store lock");
        state
            .markets
            .get(&project_id)
            .map(|by_hash| by_hash.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn load(&self, record_id: Uuid) -> Result<TargetRecord, EnrichmentError> {
        let state = self.inner.lock().expect("record store lock");
        state
            .records
            .get(&record_id)
            .cloned()
            .ok_or(EnrichmentError::RecordNotFound { record_id })
    }

    async fn list_project_records(
        &self,
        project_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<TargetRecord>, EnrichmentError> {
        let state = self.inner.lock().expect("record store lock");
        let mut records: Vec<_> = state
            .records
            .values()
            .filter(|record| record.project_id == project_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.id);
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_project_records(&self, project_id: Uuid) -> Result<usize, EnrichmentError> {
        let state = self.inner.lock().expect("record store lock");
        Ok(state
            .records
            .values()
            .filter(|record| record.project_id == project_id)
            .count())
    }

    async fn apply(&self, result: &EnrichmentResult) -> Result<(), EnrichmentError> {
        let mut state = self.inner.lock().expect("record store lock");

        let record = state.records.get_mut(&result.record_id).ok_or(
            EnrichmentError::RecordNotFound {
                record_id: result.record_id,
            },
        )?;
        let project_id = record.project_id;

        let fill = &result.outcome.record_fill;
        merge_option(&mut record.website, &fill.website);
        merge_option(&mut record.primary_product, &fill.primary_product);
        merge_option(&mut record.city, &fill.city);
        merge_option(&mut record.state, &fill.state);
        merge_option(&mut record.region, &fill.region);
        merge_option(&mut record.industry_code, &fill.industry_code);
        merge_option(&mut record.size_class, &fill.size_class);
        merge_option(&mut record.email, &fill.email);
        merge_option(&mut record.phone, &fill.phone);
        if record.latitude.is_none() {
            record.latitude = fill.latitude;
        }
        if record.longitude.is_none() {
            record.longitude = fill.longitude;
        }

        let project_markets = state.markets.entry(project_id).or_default();
        for segment in &result.outcome.markets {
            let key = content_hash(&[&segment.market.name, &segment.market.category]);
            project_markets.insert(key, segment.clone());
        }

        Ok(())
    }
}

/// Fill a missing attribute; existing values are never clobbered.
fn merge_option(target: &mut Option<String>, source: &Option<String>) {
    if target.is_none()
        && let Some(value) = source
        && !value.is_empty()
    {
        *target = Some(value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::schema::{EnrichmentOutcome, MarketProfile};
    use crate::enrichment::{Layer, RecordFill};

    fn segment(name: &str) -> MarketSegment {
        MarketSegment {
            market: MarketProfile {
                name: name.to_string(),
                category: "Industry".to_string(),
                segmentation: "B2B".to_string(),
                estimated_size: None,
            },
            products: Vec::new(),
            competitors: Vec::new(),
            leads: Vec::new(),
        }
    }

    fn result_for(record: &TargetRecord, markets: Vec<MarketSegment>) -> EnrichmentResult {
        EnrichmentResult {
            record_id: record.id,
            layer_used: Layer::A,
            outcome: EnrichmentOutcome {
                record_fill: RecordFill {
                    website: Some("https://example.com".to_string()),
                    ..Default::default()
                },
                markets,
            },
        }
    }

    #[tokio::test]
    async fn apply_merges_missing_attributes_only() {
        let store = InMemoryRecordStore::new();
        let record = TargetRecord {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "Acme Films".to_string(),
            website: Some("https://acme.test".to_string()),
            ..Default::default()
        };
        store.insert(record.clone());

        store.apply(&result_for(&record, Vec::new())).await.unwrap();

        let reloaded = store.load(record.id).await.unwrap();
        // Existing website wins over the fill value.
        assert_eq!(reloaded.website.as_deref(), Some("https://acme.test"));
    }

    #[tokio::test]
    async fn repeated_apply_does_not_duplicate_markets() {
        let store = InMemoryRecordStore::new();
        let record = TargetRecord {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "Acme Films".to_string(),
            ..Default::default()
        };
        store.insert(record.clone());

        let result = result_for(&record, vec![segment("Flexible Packaging")]);
        store.apply(&result).await.unwrap();
        store.apply(&result).await.unwrap();

        assert_eq!(store.project_markets(record.project_id).len(), 1);
    }

    #[tokio::test]
    async fn load_unknown_record_is_record_not_found() {
        let store = InMemoryRecordStore::new();
        let missing = Uuid::new_v4();

        let err = store.load(missing).await.unwrap_err();
        assert!(matches!(
            err,
            EnrichmentError::RecordNotFound { record_id } if record_id == missing
        ));
    }

    #[test]
    fn content_hash_normalizes_case_and_whitespace() {
        assert_eq!(
            content_hash(&["Flexible Packaging", "Industry"]),
            content_hash(&["  flexible packaging ", "industry"])
        );
        assert_ne!(
            content_hash(&["Flexible Packaging", "Industry"]),
            content_hash(&["Rigid Packaging", "Industry"])
        );
    }
}
