// src/score/mod.rs
//! # Failover Invoker
//! Distributes scoring requests across the rotating model pool. Backend
//! failures are retried on the next pool entry, at most `pool.len()` attempts;
//! a full outage yields a degraded `Status::Failed` result instead of an
//! error, so the pipeline keeps advancing.

pub mod pool;
pub mod providers;
pub mod types;

use chrono::Utc;
use metrics::counter;
use tracing::{info, warn};

use pool::ModelPool;
use providers::ScoreBackend;
use types::{ScoredResult, ScoringRequest, Status};

/// Score one request with pool failover.
///
/// Each attempt advances the shared cursor exactly once; success stamps every
/// result with the backend's model name. This never returns an error: the
/// task-queue collaborator owns cross-invocation retry/backoff, so persistent
/// outages surface as a single degraded result per request.
pub async fn score_with_failover(
    pool: &ModelPool,
    backend: &dyn ScoreBackend,
    request: &ScoringRequest,
) -> Vec<ScoredResult> {
    let mut last_error = String::from("empty model pool");

    for attempt in 1..=pool.len() {
        let model = pool.next();
        match backend.score(&model, request).await {
            Ok(mut results) => {
                let now = Utc::now();
                for r in &mut results {
                    r.model_name = Some(model.name.clone());
                    r.status = Status::Ok;
                    r.scored_at = Some(now);
                }
                info!(
                    source_link = %request.source_link,
                    model = %model.name,
                    attempt,
                    roles = results.len(),
                    "scoring succeeded"
                );
                counter!("score_requests_ok_total").increment(1);
                return results;
            }
            Err(e) => {
                warn!(
                    source_link = %request.source_link,
                    model = %model.name,
                    provider = ?model.provider,
                    attempt,
                    error = ?e,
                    "scoring backend failed, rotating to next"
                );
                counter!("score_backend_errors_total").increment(1);
                last_error = format!("{e:#}");
            }
        }
    }

    counter!("score_requests_degraded_total").increment(1);
    vec![ScoredResult::failed(last_error, Utc::now())]
}

#[cfg(test)]
mod tests {
    use super::pool::{ModelDescriptor, ModelPool, Provider};
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedBackend {
        /// Model names that succeed; everything else errors.
        ok_models: Vec<&'static str>,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl ScoreBackend for ScriptedBackend {
        async fn score(
            &self,
            model: &ModelDescriptor,
            _request: &ScoringRequest,
        ) -> anyhow::Result<Vec<ScoredResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ok_models.contains(&model.name.as_str()) {
                Ok(vec![ScoredResult {
                    company_name: Some("Acme".into()),
                    ..Default::default()
                }])
            } else {
                Err(anyhow!("backend {} is down", model.name))
            }
        }
    }

    fn pool_abc() -> ModelPool {
        ModelPool::new(
            ["a", "b", "c"]
                .into_iter()
                .map(|name| ModelDescriptor {
                    provider: Provider::Groq,
                    name: name.into(),
                })
                .collect(),
        )
    }

    fn request() -> ScoringRequest {
        ScoringRequest {
            source_link: "https://example.com/p/1".into(),
            query: "rust".into(),
            post_text: "post".into(),
        }
    }

    #[tokio::test]
    async fn all_backends_failing_yields_degraded_result_and_three_rotations() {
        let pool = pool_abc();
        let backend = ScriptedBackend {
            ok_models: vec![],
            calls: AtomicU32::new(0),
        };
        let out = score_with_failover(&pool, &backend, &request()).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].status, Status::Failed);
        assert!(out[0].error.as_deref().unwrap().contains("backend c is down"));
        assert!(out[0].scored_at.is_some());
        assert_eq!(pool.cursor(), 3);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn second_backend_success_stops_after_two_attempts() {
        let pool = pool_abc();
        let backend = ScriptedBackend {
            ok_models: vec!["b"],
            calls: AtomicU32::new(0),
        };
        let out = score_with_failover(&pool, &backend, &request()).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(pool.cursor(), 2);
        assert_eq!(out[0].status, Status::Ok);
        assert_eq!(out[0].model_name.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn rotation_progresses_across_invocations() {
        let pool = pool_abc();
        let backend = ScriptedBackend {
            ok_models: vec!["a", "b", "c"],
            calls: AtomicU32::new(0),
        };
        let first = score_with_failover(&pool, &backend, &request()).await;
        let second = score_with_failover(&pool, &backend, &request()).await;
        assert_eq!(first[0].model_name.as_deref(), Some("a"));
        assert_eq!(second[0].model_name.as_deref(), Some("b"));
    }
}
