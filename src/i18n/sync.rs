use super::loader::TranslationLoader;
use super::store::TranslationMeta;
use crate::client::{ApiClient, RequestSpec};
use crate::connectivity::{is_offline, NetworkStateProvider};
use crate::error::{ApiError, I18nError};
use futures::future::join_all;
use reqwest::Method;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct MetaResponse {
    versions: BTreeMap<String, BTreeMap<String, String>>,
}

struct CheckerInner {
    client: Arc<ApiClient>,
    loader: TranslationLoader,
    network: Arc<dyn NetworkStateProvider>,
    languages: Vec<String>,
    namespaces: Vec<String>,
    // Guards against overlapping cycles: a trigger while one is active
    // no-ops instead of queueing.
    checking: AtomicBool,
}

/// Background process keeping cached translations eventually consistent with
/// the server.
///
/// Each cycle polls the lightweight version manifest (conditioned on its
/// ETag) and refreshes only the namespaces whose version changed for the
/// current language. Namespace updates run concurrently and settle
/// independently.
pub struct UpdateChecker {
    inner: Arc<CheckerInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl UpdateChecker {
    pub fn new(
        client: Arc<ApiClient>,
        loader: TranslationLoader,
        network: Arc<dyn NetworkStateProvider>,
        languages: Vec<String>,
        namespaces: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(CheckerInner {
                client,
                loader,
                network,
                languages,
                namespaces,
                checking: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        }
    }

    /// Run an immediate check, then repeat on `interval`. Calling `start`
    /// again replaces the schedule without double-scheduling; a check
    /// already in flight is left to finish on its own.
    pub fn start<F>(&self, get_language: F, interval: Duration)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        let mut task = self.task.lock().expect("update checker lock poisoned");
        if let Some(handle) = task.take() {
            handle.abort();
        }

        let inner = Arc::clone(&self.inner);
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // First tick fires immediately.
                ticker.tick().await;
                let language = get_language();
                let inner = Arc::clone(&inner);
                // Spawned separately so stop() cancels the schedule while an
                // in-flight check still completes and writes its result.
                tokio::spawn(async move {
                    match inner.checked_cycle(&language).await {
                        Ok(true) => info!("translations updated for {language}"),
                        Ok(false) => {}
                        Err(e) => warn!("scheduled translation check failed: {e}"),
                    }
                });
            }
        }));
    }

    /// Cancel the schedule. Idempotent; an in-flight check is abandoned,
    /// not cancelled.
    pub fn stop(&self) {
        if let Some(handle) = self
            .task
            .lock()
            .expect("update checker lock poisoned")
            .take()
        {
            handle.abort();
        }
    }

    /// Run one check cycle on demand (pull-to-refresh). Returns `Ok(true)`
    /// when at least one namespace was refreshed, `Ok(false)` when nothing
    /// changed or a cycle was already in progress.
    pub async fn force_check(&self, language: &str) -> Result<bool, I18nError> {
        self.inner.checked_cycle(language).await
    }
}

impl Drop for UpdateChecker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Clears the overlap flag on drop, so a caller cancelling a check
/// mid-cycle (timeout, select) releases the guard like a completed one.
struct CycleGuard<'a> {
    checking: &'a AtomicBool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.checking.store(false, Ordering::SeqCst);
    }
}

impl CheckerInner {
    async fn checked_cycle(&self, language: &str) -> Result<bool, I18nError> {
        if self.checking.swap(true, Ordering::SeqCst) {
            debug!("translation check already in progress, skipping");
            return Ok(false);
        }
        let _guard = CycleGuard {
            checking: &self.checking,
        };
        self.run_cycle(language).await
    }

    async fn run_cycle(&self, language: &str) -> Result<bool, I18nError> {
        if is_offline(self.network.as_ref()) {
            debug!("offline, skipping translation check");
            return Ok(false);
        }

        let cache = self.loader.cache();
        let cached_meta = cache.meta();
        let etag = cached_meta.as_ref().and_then(|m| m.etag.clone());

        let mut spec = RequestSpec::new(Method::GET, "/i18n/meta")
            .query("locales", &self.languages.join(","))
            .query("namespaces", &self.namespaces.join(","));
        if let Some(etag) = &etag {
            spec = spec.header("If-None-Match", etag);
        }

        let response = match self.client.send(spec).await {
            Ok(response) => response,
            Err(e) if e.status() == Some(304) => {
                debug!("translation manifest unchanged");
                return Ok(false);
            }
            Err(e) => return Err(I18nError::Network(e)),
        };

        let new_etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body: MetaResponse = response.json().await.map_err(|e| {
            I18nError::Network(ApiError::Decode {
                message: e.to_string(),
            })
        })?;
        let new_meta = TranslationMeta {
            versions: body.versions,
            etag: new_etag,
        };

        if let Some(cached) = &cached_meta {
            if cached.versions == new_meta.versions {
                if cached.etag != new_meta.etag {
                    cache.put_meta(&new_meta);
                }
                return Ok(false);
            }
        }
        cache.put_meta(&new_meta);

        // Refresh only the namespaces whose version differs from what the
        // cache holds for the current language.
        let stale: Vec<(String, String)> = self
            .namespaces
            .iter()
            .filter_map(|namespace| {
                let wanted = new_meta.version_for(language, namespace)?;
                let held = cache.get_any(language, namespace).map(|e| e.version);
                if held.as_deref() == Some(wanted) {
                    None
                } else {
                    Some((namespace.clone(), wanted.to_string()))
                }
            })
            .collect();

        if stale.is_empty() {
            return Ok(false);
        }

        let updates = stale.iter().map(|(namespace, version)| async move {
            match self
                .loader
                .fetch_with_retry(language, namespace, None)
                .await
            {
                Ok((data, etag)) => {
                    self.loader
                        .cache()
                        .put(language, namespace, &data, version, etag.as_deref());
                    true
                }
                Err(e) => {
                    warn!("namespace update failed for {language}/{namespace}: {e}");
                    false
                }
            }
        });
        let results = join_all(updates).await;

        Ok(results.into_iter().any(|updated| updated))
    }
}
