//! Fallback chain over same-capability providers
//!
//! An ordered list of adapters sharing one capability. `execute` attempts
//! each in turn - at most once per provider per request - and returns the
//! first success together with the attempt records. A failed attempt's
//! output is dropped on the floor; it is never merged into session state.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use echoai_core::{Capability, Error, ErrorKind, ProviderResult, Result};

/// Outcome metadata for one `execute` call.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// Attempt record of the provider that succeeded
    pub used: ProviderResult,
    /// Attempt records of the providers that failed before it, in order
    pub failures: Vec<ProviderResult>,
}

impl ChainOutcome {
    pub fn fallback_count(&self) -> usize {
        self.failures.len()
    }
}

/// Ordered providers for one capability with a shared per-attempt timeout.
pub struct FallbackChain<T: ?Sized> {
    capability: Capability,
    timeout: Duration,
    providers: Vec<(String, Arc<T>)>,
}

impl<T: ?Sized + Send + Sync> FallbackChain<T> {
    pub fn new(capability: Capability, timeout: Duration) -> Self {
        Self {
            capability,
            timeout,
            providers: Vec::new(),
        }
    }

    /// Append a provider to the end of the chain (lowest priority so far).
    pub fn push(&mut self, name: impl Into<String>, provider: Arc<T>) {
        self.providers.push((name.into(), provider));
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Attempt providers in order until one succeeds.
    ///
    /// Each attempt is bounded by the chain's timeout. Returns
    /// `AllProvidersExhausted` carrying every failure record when the whole
    /// chain fails.
    pub async fn execute<R, F, Fut>(&self, op: F) -> Result<(R, ChainOutcome)>
    where
        F: Fn(Arc<T>) -> Fut,
        Fut: Future<Output = Result<R>> + Send,
    {
        let mut failures: Vec<ProviderResult> = Vec::new();

        for (name, provider) in &self.providers {
            let start = Instant::now();
            let attempt = tokio::time::timeout(self.timeout, op(Arc::clone(provider))).await;
            let latency_ms = start.elapsed().as_millis() as u64;

            let kind = match attempt {
                Ok(Ok(value)) => {
                    let used = ProviderResult::ok(self.capability, name.clone(), latency_ms);
                    metrics::histogram!(
                        "echoai_provider_latency_ms",
                        "capability" => self.capability.as_str(),
                        "provider" => name.clone(),
                    )
                    .record(latency_ms as f64);
                    tracing::debug!(
                        capability = %self.capability,
                        provider = %name,
                        latency_ms,
                        fallbacks = failures.len(),
                        "provider attempt succeeded"
                    );
                    return Ok((value, ChainOutcome { used, failures }));
                }
                Ok(Err(err)) => err.kind().unwrap_or(ErrorKind::BadResponse),
                Err(_elapsed) => ErrorKind::Timeout,
            };

            tracing::warn!(
                capability = %self.capability,
                provider = %name,
                latency_ms,
                error = %kind,
                "provider attempt failed, advancing chain"
            );
            metrics::counter!(
                "echoai_provider_failures_total",
                "capability" => self.capability.as_str(),
                "provider" => name.clone(),
                "kind" => kind.as_str(),
            )
            .increment(1);
            failures.push(ProviderResult::failed(
                self.capability,
                name.clone(),
                latency_ms,
                kind,
            ));
        }

        metrics::counter!(
            "echoai_chain_exhausted_total",
            "capability" => self.capability.as_str(),
        )
        .increment(1);
        Err(Error::AllProvidersExhausted {
            capability: self.capability,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use echoai_core::{SpeechToText, Transcript};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedStt {
        label: String,
        fail: bool,
        calls: AtomicUsize,
    }

    impl ScriptedStt {
        fn ok(label: &str) -> Arc<Self> {
            Arc::new(Self {
                label: label.to_string(),
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(label: &str) -> Arc<Self> {
            Arc::new(Self {
                label: label.to_string(),
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SpeechToText for ScriptedStt {
        async fn transcribe(&self, _audio: &[u8]) -> Result<Transcript> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::Provider {
                    provider: self.label.clone(),
                    kind: ErrorKind::BadResponse,
                    detail: "scripted failure".into(),
                })
            } else {
                Ok(Transcript::new(format!("from {}", self.label), 0.9))
            }
        }

        fn name(&self) -> &str {
            &self.label
        }
    }

    fn chain_of(providers: Vec<Arc<ScriptedStt>>) -> FallbackChain<dyn SpeechToText> {
        let mut chain =
            FallbackChain::new(Capability::Stt, Duration::from_millis(200));
        for p in providers {
            let name = p.label.clone();
            let p: Arc<dyn SpeechToText> = p;
            chain.push(name, p);
        }
        chain
    }

    #[tokio::test]
    async fn first_success_wins_with_no_failures() {
        let chain = chain_of(vec![ScriptedStt::ok("primary"), ScriptedStt::ok("secondary")]);
        let audio = vec![0u8; 16];
        let (out, outcome) = chain
            .execute(|p| {
                let audio = audio.clone();
                async move { p.transcribe(&audio).await }
            })
            .await
            .unwrap();

        assert_eq!(out.text, "from primary");
        assert_eq!(outcome.fallback_count(), 0);
        assert!(outcome.used.success);
    }

    #[tokio::test]
    async fn k_failures_then_success_reports_k() {
        let chain = chain_of(vec![
            ScriptedStt::failing("a"),
            ScriptedStt::failing("b"),
            ScriptedStt::ok("c"),
        ]);
        let audio = vec![0u8; 16];
        let (out, outcome) = chain
            .execute(|p| {
                let audio = audio.clone();
                async move { p.transcribe(&audio).await }
            })
            .await
            .unwrap();

        assert_eq!(out.text, "from c");
        assert_eq!(outcome.fallback_count(), 2);
        assert_eq!(outcome.used.provider, "c");
        assert_eq!(outcome.failures[0].provider, "a");
        assert_eq!(outcome.failures[1].provider, "b");
    }

    #[tokio::test]
    async fn exhaustion_records_every_failure_once() {
        let providers = vec![ScriptedStt::failing("a"), ScriptedStt::failing("b")];
        let handles = providers.clone();
        let chain = chain_of(providers);
        let audio = vec![0u8; 16];

        let err = chain
            .execute(|p| {
                let audio = audio.clone();
                async move { p.transcribe(&audio).await }
            })
            .await
            .unwrap_err();

        match err {
            Error::AllProvidersExhausted {
                capability,
                failures,
            } => {
                assert_eq!(capability, Capability::Stt);
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().all(|f| !f.success));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Bounded retries: exactly one attempt per provider
        for p in handles {
            assert_eq!(p.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn slow_provider_times_out_and_chain_advances() {
        struct SlowStt;

        #[async_trait]
        impl SpeechToText for SlowStt {
            async fn transcribe(&self, _audio: &[u8]) -> Result<Transcript> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Transcript::new("too late", 1.0))
            }

            fn name(&self) -> &str {
                "slow"
            }
        }

        let mut chain: FallbackChain<dyn SpeechToText> =
            FallbackChain::new(Capability::Stt, Duration::from_millis(50));
        chain.push("slow", Arc::new(SlowStt) as Arc<dyn SpeechToText>);
        let fast: Arc<dyn SpeechToText> = ScriptedStt::ok("fast");
        chain.push("fast", fast);

        let (out, outcome) = chain
            .execute(|p| async move { p.transcribe(&[]).await })
            .await
            .unwrap();

        assert_eq!(out.text, "from fast");
        assert_eq!(outcome.failures[0].error, Some(ErrorKind::Timeout));
    }
}
