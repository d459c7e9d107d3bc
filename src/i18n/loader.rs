use super::bundled::bundled;
use super::store::TranslationCache;
use super::tree::TranslationTree;
use crate::client::{ApiClient, RequestSpec};
use crate::error::{ApiError, I18nError};
use crate::retry::{with_retry_if, RetryConfig};
use futures::future::join_all;
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where the returned translation data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Remote,
    Bundled,
}

#[derive(Debug, Clone)]
pub struct LoadedTranslation {
    pub data: TranslationTree,
    pub source: Source,
}

/// Resolves the best available translation data for a `(language, namespace)`
/// pair: cache first, then a conditional remote fetch, then the bundled
/// fallback. Also offers an additive merge mode that never loses known keys.
#[derive(Clone)]
pub struct TranslationLoader {
    client: Arc<ApiClient>,
    cache: TranslationCache,
    namespaces: Vec<String>,
    retry: RetryConfig,
}

impl TranslationLoader {
    pub fn new(client: Arc<ApiClient>, cache: TranslationCache, namespaces: Vec<String>) -> Self {
        Self {
            client,
            cache,
            namespaces,
            retry: RetryConfig::translation_fetch(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    /// Single-source resolution with strict fallback order.
    ///
    /// Cache (exact version when known) → conditional remote fetch
    /// (persisted only when `expected_version` is supplied) → bundled.
    /// A not-modified remote outcome serves the cached entry even when the
    /// entry is unversioned or expired by age.
    pub async fn load(
        &self,
        language: &str,
        namespace: &str,
        expected_version: Option<&str>,
    ) -> Result<LoadedTranslation, I18nError> {
        if let Some(entry) = self.cache.get(language, namespace, expected_version) {
            return Ok(LoadedTranslation {
                data: entry.data,
                source: Source::Cache,
            });
        }

        let etag = self
            .cache
            .get_any(language, namespace)
            .and_then(|entry| entry.etag);

        let remote_error = match self
            .fetch_with_retry(language, namespace, etag.as_deref())
            .await
        {
            Ok((data, new_etag)) => {
                // Only persist when the caller knows which version this is;
                // unversioned payloads cannot be validated against the
                // manifest later.
                if let Some(version) = expected_version {
                    self.cache
                        .put(language, namespace, &data, version, new_etag.as_deref());
                }
                return Ok(LoadedTranslation {
                    data,
                    source: Source::Remote,
                });
            }
            Err(I18nError::NotModified) => {
                if let Some(entry) = self.cache.get_any(language, namespace) {
                    return Ok(LoadedTranslation {
                        data: entry.data,
                        source: Source::Cache,
                    });
                }
                None
            }
            Err(e) => {
                warn!("remote translations unavailable for {language}/{namespace}: {e}");
                Some(e)
            }
        };

        match bundled(language, namespace) {
            Ok(data) => Ok(LoadedTranslation {
                data,
                source: Source::Bundled,
            }),
            Err(bundle_error) => Err(remote_error.unwrap_or(bundle_error)),
        }
    }

    /// Additive resolution: bundled data, overlaid with the cached entry,
    /// overlaid with fresh remote data when reachable. No failure path loses
    /// already-known keys; a not-modified outcome simply keeps the existing
    /// layers.
    pub async fn load_merged(
        &self,
        language: &str,
        namespace: &str,
        expected_version: Option<&str>,
    ) -> TranslationTree {
        let mut tree = match bundled(language, namespace) {
            Ok(tree) => tree,
            Err(e) => {
                debug!("{e}, starting merge from empty");
                TranslationTree::empty()
            }
        };

        let cached = self.cache.get_any(language, namespace);
        let etag = cached.as_ref().and_then(|entry| entry.etag.clone());
        if let Some(entry) = cached {
            tree.merge_from(&entry.data);
        }

        match self
            .fetch_with_retry(language, namespace, etag.as_deref())
            .await
        {
            Ok((remote, new_etag)) => {
                if let Some(version) = expected_version {
                    self.cache
                        .put(language, namespace, &remote, version, new_etag.as_deref());
                }
                tree.merge_from(&remote);
            }
            Err(I18nError::NotModified) => {}
            Err(e) => {
                warn!("merge load continuing without remote layer for {language}/{namespace}: {e}");
            }
        }

        tree
    }

    /// Fan out [`Self::load`] across all configured namespaces for a
    /// language. Namespace failures are independent; one failing namespace
    /// never aborts the others.
    pub async fn preload_language(
        &self,
        language: &str,
    ) -> Vec<(String, Result<LoadedTranslation, I18nError>)> {
        let meta = self.cache.meta();
        let futures = self.namespaces.iter().map(|namespace| {
            let expected = meta
                .as_ref()
                .and_then(|m| m.version_for(language, namespace))
                .map(str::to_string);
            async move {
                let result = self.load(language, namespace, expected.as_deref()).await;
                (namespace.clone(), result)
            }
        });
        join_all(futures).await
    }

    /// Fetch one namespace with bounded backoff. Validation failures and
    /// not-modified outcomes are final; only transient transport failures
    /// are retried.
    pub(crate) async fn fetch_with_retry(
        &self,
        language: &str,
        namespace: &str,
        etag: Option<&str>,
    ) -> Result<(TranslationTree, Option<String>), I18nError> {
        with_retry_if(
            &self.retry,
            &format!("translation fetch {language}/{namespace}"),
            || self.fetch_once(language, namespace, etag),
            |e: &I18nError| e.is_retryable(),
        )
        .await
    }

    async fn fetch_once(
        &self,
        language: &str,
        namespace: &str,
        etag: Option<&str>,
    ) -> Result<(TranslationTree, Option<String>), I18nError> {
        let mut spec = RequestSpec::new(Method::GET, &format!("/i18n/{language}/{namespace}"));
        if let Some(etag) = etag {
            spec = spec.header("If-None-Match", etag);
        }

        let response = match self.client.send(spec).await {
            Ok(response) => response,
            Err(e) if e.status() == Some(304) => return Err(I18nError::NotModified),
            Err(e) => return Err(I18nError::Network(e)),
        };

        let new_etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let value: serde_json::Value = response.json().await.map_err(|e| {
            I18nError::Network(ApiError::Decode {
                message: e.to_string(),
            })
        })?;

        let tree = TranslationTree::from_value(value)?;
        Ok((tree, new_etag))
    }
}
