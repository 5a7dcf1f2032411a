use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::cache::{fingerprint, normalize_text, FingerprintInput};
use crate::guide::Catalog;
use crate::llm_client::ModelBackend;
use crate::recommend::prompts::{build_recommend_prompt, recommend_system, PROMPT_VERSION};
use crate::recommend::schema::parse_recommendations;
use crate::recommend::{
    RankedMatch, Recommendation, RecommendationCache, RecommendationError, UnavailableReason,
};

pub const DEFAULT_MATCH_LIMIT: usize = 8;

/// Exponential backoff for transient model failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

pub struct RecommendationService {
    backend: Option<Arc<dyn ModelBackend>>,
    cache: RecommendationCache,
    retry: RetryPolicy,
    overall_timeout: Duration,
    match_limit: usize,
}

impl RecommendationService {
    /// `backend = None` means no API key: cached results are still served.
    pub fn new(
        backend: Option<Arc<dyn ModelBackend>>,
        cache: RecommendationCache,
        retry: RetryPolicy,
        overall_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            cache,
            retry,
            overall_timeout,
            match_limit: DEFAULT_MATCH_LIMIT,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    pub fn cache(&self) -> &RecommendationCache {
        &self.cache
    }

    pub async fn recommend(
        &self,
        resume_text: &str,
        preferences: &str,
        catalog: &Catalog,
    ) -> Result<Recommendation, RecommendationError> {
        let resume = normalize_text(resume_text);
        if resume.is_empty() {
            return Err(RecommendationError::EmptyResume);
        }
        if catalog.is_empty() {
            return Err(RecommendationError::EmptyCatalog);
        }

        let params = self
            .backend
            .as_ref()
            .map(|b| b.params())
            .unwrap_or_default();
        let catalog_digest = catalog.digest();
        let fp = fingerprint(&FingerprintInput {
            resume_text: &resume,
            preferences,
            catalog_digest: &catalog_digest,
            model: params.model,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            prompt_version: PROMPT_VERSION,
            match_limit: self.match_limit,
        });

        let lookup = {
            let cache = self.cache.clone();
            let key = fp.clone();
            tokio::task::spawn_blocking(move || cache.get(&key)).await
        };
        let cached = lookup.unwrap_or_else(|e| {
            warn!(fingerprint = %fp, "Cache lookup task failed: {e}");
            None
        });
        if let Some(entry) = cached {
            info!(fingerprint = %fp, "Recommendation cache hit");
            return Ok(Recommendation {
                matches: entry.result,
                fingerprint: fp,
                cached: true,
            });
        }

        let Some(backend) = self.backend.as_deref() else {
            return Err(RecommendationError::unavailable(
                UnavailableReason::NotConfigured,
                0,
                "ANTHROPIC_API_KEY is not set",
            ));
        };

        info!(fingerprint = %fp, companies = catalog.len(), "Recommendation cache miss, calling model");
        let prompt = build_recommend_prompt(&resume, preferences, catalog, self.match_limit);
        let system = recommend_system();
        let attempts = AtomicU32::new(0);

        let matches = match timeout(
            self.overall_timeout,
            self.call_with_retry(backend, &prompt, &system, catalog, &attempts),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                let attempts = attempts.load(Ordering::SeqCst);
                warn!(fingerprint = %fp, attempts, "Recommendation timed out");
                return Err(RecommendationError::unavailable(
                    UnavailableReason::Timeout,
                    attempts,
                    format!("no answer within {}s", self.overall_timeout.as_secs()),
                ));
            }
        };

        let write = {
            let cache = self.cache.clone();
            let key = fp.clone();
            let result = matches.clone();
            tokio::task::spawn_blocking(move || cache.put(&key, result)).await
        };
        match write {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(fingerprint = %fp, "Failed to cache recommendation: {e}"),
            Err(e) => warn!(fingerprint = %fp, "Cache write task failed: {e}"),
        }

        Ok(Recommendation {
            matches,
            fingerprint: fp,
            cached: false,
        })
    }

    async fn call_with_retry(
        &self,
        backend: &dyn ModelBackend,
        prompt: &str,
        system: &str,
        catalog: &Catalog,
        attempts: &AtomicU32,
    ) -> Result<Vec<RankedMatch>, RecommendationError> {
        let max_attempts = self.retry.max_attempts.max(1);
        loop {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match backend.complete(prompt, system).await {
                Ok(text) => {
                    return parse_recommendations(&text, catalog, self.match_limit).map_err(|e| {
                        warn!(code = e.code(), attempt, "Model response rejected: {e}");
                        RecommendationError::unavailable(
                            UnavailableReason::InvalidResponse,
                            attempt,
                            format!("{}: {e}", e.code()),
                        )
                    });
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Model call failed (attempt {attempt}/{max_attempts}), retrying in {}ms: {e}",
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    warn!("Model call failed after {attempt} attempts: {e}");
                    return Err(RecommendationError::unavailable(
                        UnavailableReason::RetriesExhausted,
                        attempt,
                        e.to_string(),
                    ));
                }
                Err(e) => {
                    warn!("Model call failed permanently: {e}");
                    return Err(RecommendationError::unavailable(
                        UnavailableReason::ModelError,
                        attempt,
                        e.to_string(),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::ResultCache;
    use crate::guide::GuideExtractor;
    use crate::llm_client::{LlmError, ModelParams};
    use crate::storage::{BlobStore, MemoryStore};

    const VALID: &str = r#"{"matches": [
        {"company_name": "Globex", "match_score": 71, "rationale": "consulting"},
        {"company_name": "Acme Corp", "match_score": 88, "rationale": "Rust"}
    ]}"#;

    /// Pops one scripted reply per call; a 503 once the script runs out.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelBackend for ScriptedBackend {
        fn params(&self) -> ModelParams {
            ModelParams::default()
        }

        async fn complete(&self, _prompt: &str, _system: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().unwrap().pop_front().unwrap_or(Err(LlmError::Api {
                status: 503,
                message: "unavailable".into(),
            }))
        }
    }

    struct HangingBackend;

    #[async_trait]
    impl ModelBackend for HangingBackend {
        fn params(&self) -> ModelParams {
            ModelParams::default()
        }

        async fn complete(&self, _prompt: &str, _system: &str) -> Result<String, LlmError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(VALID.to_string())
        }
    }

    fn catalog() -> Catalog {
        GuideExtractor::default().parse_text(
            "SRC Hall A\n\
             A01  Acme Corp  Technology & IT  UG\n\
             A02  Globex  Consulting  PG\n",
        )
    }

    fn cache() -> RecommendationCache {
        ResultCache::new(Arc::new(MemoryStore::new()) as Arc<dyn BlobStore>, None)
    }

    fn service(backend: Option<Arc<dyn ModelBackend>>, cache: RecommendationCache) -> RecommendationService {
        RecommendationService::new(backend, cache, RetryPolicy::default(), Duration::from_secs(60))
    }

    fn unavailable_reason(err: RecommendationError) -> (UnavailableReason, u32) {
        match err {
            RecommendationError::Unavailable { reason, attempts, .. } => (reason, attempts),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_retry_delays_double_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_then_hit_calls_model_once() {
        let backend = ScriptedBackend::new(vec![Ok(VALID.to_string())]);
        let svc = service(Some(backend.clone()), cache());

        let first = svc.recommend("Rust developer", "fintech", &catalog()).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.matches[0].company_name, "Acme Corp");
        assert_eq!(first.matches[1].company_name, "Globex");

        let second = svc
            .recommend("  Rust\n developer ", "fintech", &catalog())
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(second.matches, first.matches);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_preferences_miss_the_cache() {
        let backend = ScriptedBackend::new(vec![Ok(VALID.to_string()), Ok(VALID.to_string())]);
        let svc = service(Some(backend.clone()), cache());

        let a = svc.recommend("Rust developer", "fintech", &catalog()).await.unwrap();
        let b = svc.recommend("Rust developer", "consulting", &catalog()).await.unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
        assert!(!b.cached);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let backend = ScriptedBackend::new(vec![Err(LlmError::Timeout), Ok(VALID.to_string())]);
        let svc = service(Some(backend.clone()), cache());

        let started = tokio::time::Instant::now();
        let rec = svc.recommend("Rust developer", "", &catalog()).await.unwrap();
        assert_eq!(rec.matches.len(), 2);
        assert_eq!(backend.calls(), 2);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_transient_exhausts_retries() {
        let backend = ScriptedBackend::new(vec![]);
        let svc = service(Some(backend.clone()), cache());

        let err = svc.recommend("Rust developer", "", &catalog()).await.unwrap_err();
        assert_eq!(unavailable_reason(err), (UnavailableReason::RetriesExhausted, 3));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Err(LlmError::Api {
            status: 401,
            message: "invalid x-api-key".into(),
        })]);
        let svc = service(Some(backend.clone()), cache());

        let err = svc.recommend("Rust developer", "", &catalog()).await.unwrap_err();
        assert_eq!(unavailable_reason(err), (UnavailableReason::ModelError, 1));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schema_violation_is_not_cached() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResultCache::new(store.clone() as Arc<dyn BlobStore>, None);
        let backend = ScriptedBackend::new(vec![Ok("no json here".to_string())]);
        let svc = service(Some(backend.clone()), cache);

        let err = svc.recommend("Rust developer", "", &catalog()).await.unwrap_err();
        assert_eq!(unavailable_reason(err), (UnavailableReason::InvalidResponse, 1));
        assert_eq!(backend.calls(), 1);
        assert!(store.keys().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_timeout() {
        let svc = service(Some(Arc::new(HangingBackend)), cache());
        let err = svc.recommend("Rust developer", "", &catalog()).await.unwrap_err();
        assert_eq!(unavailable_reason(err), (UnavailableReason::Timeout, 1));
    }

    #[tokio::test]
    async fn test_empty_inputs_are_rejected_before_the_model() {
        let backend = ScriptedBackend::new(vec![Ok(VALID.to_string())]);
        let svc = service(Some(backend.clone()), cache());

        let err = svc.recommend(" \n\t ", "", &catalog()).await.unwrap_err();
        assert!(matches!(err, RecommendationError::EmptyResume));

        let err = svc
            .recommend("Rust developer", "", &Catalog::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendationError::EmptyCatalog));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_service_serves_cache_only() {
        let shared = cache();
        let backend = ScriptedBackend::new(vec![Ok(VALID.to_string())]);
        let configured = service(Some(backend), shared.clone());
        configured.recommend("Rust developer", "", &catalog()).await.unwrap();

        let offline = service(None, shared);
        assert!(!offline.is_configured());
        let hit = offline.recommend("Rust developer", "", &catalog()).await.unwrap();
        assert!(hit.cached);

        let err = offline.recommend("Go developer", "", &catalog()).await.unwrap_err();
        assert_eq!(unavailable_reason(err), (UnavailableReason::NotConfigured, 0));
    }
}
