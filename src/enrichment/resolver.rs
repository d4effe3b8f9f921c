//! Layered fallback resolver.
//!
//! Attempts an ordered list of strategies for one record, each wrapped in
//! the model-call retry profile, and returns the first schema-valid result.
//! The last layer is a pure function, so resolution always terminates with
//! a result instead of blocking or erroring a whole job on a single
//! provider outage.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::enrichment::{EnrichmentError, EnrichmentResult, EnrichmentStrategy};
use crate::records::TargetRecord;
use crate::retry::{self, RetryPolicy};

/// Resolves one record through the configured strategy chain.
pub struct FallbackResolver {
    strategies: Vec<Arc<dyn EnrichmentStrategy>>,
    model_retry: RetryPolicy,
}

/// How resolution went, including retry attempts consumed along the way.
#[derive(Debug)]
pub struct Resolution {
    pub result: EnrichmentResult,
    pub retries_used: u32,
}

impl FallbackResolver {
    /// Build a resolver over an ordered strategy chain. The final strategy
    /// must be infallible; every chain the engine constructs ends in the
    /// minimal-fill layer.
    pub fn new(strategies: Vec<Arc<dyn EnrichmentStrategy>>, model_retry: RetryPolicy) -> Self {
        assert!(!strategies.is_empty(), "resolver needs at least one strategy");
        Self {
            strategies,
            model_retry,
        }
    }

    /// Produce an enrichment result for `record`, degrading through the
    /// strategy chain. Returns an error only if every strategy failed, which
    /// a chain ending in the minimal-fill layer rules out.
    pub async fn resolve(&self, record: &TargetRecord) -> Result<Resolution, EnrichmentError> {
        let mut retries_used = 0u32;
        let mut last_error: Option<EnrichmentError> = None;

        for strategy in &self.strategies {
            let layer = strategy.layer();
            let outcome = retry::execute(
                || strategy.attempt(record),
                &self.model_retry,
                |err, attempt, delay| {
                    retries_used += 1;
                    warn!(
                        record = %record.id,
                        layer = layer.as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "enrichment attempt failed, backing off"
                    );
                },
            )
            .await;

            match outcome {
                Ok(outcome) => {
                    counter!(
                        "enrichment_layer_used_total",
                        &[("layer", layer.as_str())]
                    )
                    .increment(1);
                    debug!(record = %record.id, layer = layer.as_str(), "record resolved");
                    return Ok(Resolution {
                        result: EnrichmentResult {
                            record_id: record.id,
                            layer_used: layer,
                            outcome,
                        },
                        retries_used,
                    });
                }
                Err(err) => {
                    let err = match err {
                        retry::RetryError::Exhausted { attempts, source } => {
                            EnrichmentError::ExhaustedRetries {
                                attempts,
                                message: source.to_string(),
                            }
                        }
                        retry::RetryError::Aborted(source) => source,
                    };
                    warn!(
                        record = %record.id,
                        layer = layer.as_str(),
                        error = %err,
                        "strategy layer failed, falling through"
                    );
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            EnrichmentError::invalid_input("strategy chain produced no result")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::layers::MinimalFillStrategy;
    use crate::enrichment::schema::EnrichmentOutcome;
    use crate::enrichment::Layer;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    struct FailingStrategy {
        layer: Layer,
        calls: AtomicU32,
        error: fn() -> EnrichmentError,
    }

    impl FailingStrategy {
        fn transient(layer: Layer) -> Self {
            Self {
                layer,
                calls: AtomicU32::new(0),
                error: || EnrichmentError::transient("provider down"),
            }
        }

        fn rate_limited(layer: Layer) -> Self {
            Self {
                layer,
                calls: AtomicU32::new(0),
                error: || EnrichmentError::RateLimited {
                    reset_at: Utc::now(),
                },
            }
        }
    }

    #[async_trait]
    impl EnrichmentStrategy for FailingStrategy {
        fn layer(&self) -> Layer {
            self.layer
        }

        async fn attempt(
            &self,
            _record: &TargetRecord,
        ) -> Result<EnrichmentOutcome, EnrichmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    fn record() -> TargetRecord {
        TargetRecord {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "Acme Films".to_string(),
            ..Default::default()
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn falls_through_to_minimal_fill_and_never_fails() {
        let layer_a = Arc::new(FailingStrategy::transient(Layer::A));
        let layer_b = Arc::new(FailingStrategy::transient(Layer::B));
        let resolver = FallbackResolver::new(
            vec![
                layer_a.clone(),
                layer_b.clone(),
                Arc::new(MinimalFillStrategy::new()),
            ],
            fast_retry(),
        );

        let resolution = resolver.resolve(&record()).await.unwrap();

        assert_eq!(resolution.result.layer_used, Layer::C);
        // Both failing layers exhausted their retry budget.
        assert_eq!(layer_a.calls.load(Ordering::SeqCst), 3);
        assert_eq!(layer_b.calls.load(Ordering::SeqCst), 3);
        assert_eq!(resolution.retries_used, 4);
    }

    #[tokio::test]
    async fn rate_limited_layer_is_not_retried_before_falling_through() {
        let layer_a = Arc::new(FailingStrategy::rate_limited(Layer::A));
        let resolver = FallbackResolver::new(
            vec![layer_a.clone(), Arc::new(MinimalFillStrategy::new())],
            fast_retry(),
        );

        let resolution = resolver.resolve(&record()).await.unwrap();

        assert_eq!(resolution.result.layer_used, Layer::C);
        assert_eq!(layer_a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolution.retries_used, 0);
    }

    #[tokio::test]
    async fn first_successful_layer_wins() {
        let resolver = FallbackResolver::new(
            vec![Arc::new(MinimalFillStrategy::new())],
            fast_retry(),
        );

        let resolution = resolver.resolve(&record()).await.unwrap();
        assert_eq!(resolution.result.layer_used, Layer::C);
        assert_eq!(resolution.result.outcome.markets.len(), 1);
    }
}
