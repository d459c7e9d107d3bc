//! Core client runtime for the RepSet fitness app: an authenticated HTTP
//! gateway with transparent token refresh, an auth token event bus, and an
//! offline-first translation pipeline (versioned cache, layered loading,
//! background sync, missing-key reporting).
//!
//! Platform shells plug in via two seams: [`storage::KeyValueStore`] for
//! durable storage and [`connectivity::NetworkStateProvider`] for the
//! device's network state. Everything else is wired up by [`Core`].

pub mod client;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod i18n;
pub mod refresh;
pub mod retry;
pub mod storage;
pub mod token;

pub use client::{ApiClient, RequestSpec};
pub use config::Config;
pub use connectivity::{is_offline, NetworkState, NetworkStateProvider, StaticNetworkState};
pub use error::{ApiError, I18nError, StorageError};
pub use i18n::{
    LoadedTranslation, MissingKeyReporter, Source, TranslationCache, TranslationLoader,
    TranslationTree, UpdateChecker,
};
pub use retry::RetryConfig;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use token::{Subscription, TokenEvent, TokenStore};

use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The assembled runtime: one of these per app process.
///
/// Owns the HTTP client, the token store, and the translation pipeline, all
/// sharing the same storage and connectivity seams.
pub struct Core {
    config: Config,
    tokens: TokenStore,
    client: Arc<ApiClient>,
    loader: TranslationLoader,
    checker: UpdateChecker,
    missing: MissingKeyReporter,
    language: Arc<Mutex<String>>,
}

impl Core {
    pub fn new(
        config: Config,
        network: Arc<dyn NetworkStateProvider>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let tokens = TokenStore::new();
        let client = Arc::new(ApiClient::new(&config, tokens.clone(), Arc::clone(&network))?);

        let cache = TranslationCache::new(Arc::clone(&store), config.cache_max_age_days);
        let loader = TranslationLoader::new(
            Arc::clone(&client),
            cache.clone(),
            config.namespaces.clone(),
        );
        let checker = UpdateChecker::new(
            Arc::clone(&client),
            loader.clone(),
            network,
            config.languages.clone(),
            config.namespaces.clone(),
        );
        let missing = MissingKeyReporter::new(
            Arc::clone(&client),
            store,
            cache,
            Duration::from_millis(config.missing_debounce_ms),
        );

        let language = Arc::new(Mutex::new(
            config
                .languages
                .first()
                .cloned()
                .unwrap_or_else(|| i18n::CANONICAL_LANGUAGE.to_string()),
        ));

        Ok(Self {
            config,
            tokens,
            client,
            loader,
            checker,
            missing,
            language,
        })
    }

    /// Build from environment variables, persisting under the configured
    /// storage directory.
    pub fn from_env(network: Arc<dyn NetworkStateProvider>) -> Result<Self> {
        let config = Config::from_env()?;
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.storage_dir)?);
        Self::new(config, network, store)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The authenticated HTTP gateway, for feature code making its own calls.
    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    // --- session ---

    pub fn set_auth_tokens(&self, access_token: &str, refresh_token: &str) {
        self.tokens.set_tokens(access_token, refresh_token);
    }

    pub fn clear_auth_tokens(&self) {
        self.tokens.clear_tokens();
    }

    pub fn subscribe_auth_tokens<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&TokenEvent) + Send + Sync + 'static,
    {
        self.tokens.subscribe(listener)
    }

    // --- language ---

    pub fn language(&self) -> String {
        self.language.lock().expect("language lock poisoned").clone()
    }

    pub fn set_language(&self, language: &str) {
        *self.language.lock().expect("language lock poisoned") = language.to_string();
    }

    // --- translations ---

    /// Best-effort single-source load, pinned to the manifest version when
    /// one is cached.
    pub async fn load_translation(
        &self,
        language: &str,
        namespace: &str,
    ) -> std::result::Result<LoadedTranslation, I18nError> {
        let expected = self.expected_version(language, namespace);
        self.loader
            .load(language, namespace, expected.as_deref())
            .await
    }

    /// Additive load: bundled, cached, and remote layers merged so no known
    /// key is ever lost.
    pub async fn load_merged_translation(
        &self,
        language: &str,
        namespace: &str,
    ) -> TranslationTree {
        let expected = self.expected_version(language, namespace);
        self.loader
            .load_merged(language, namespace, expected.as_deref())
            .await
    }

    /// Warm every configured namespace for a language.
    pub async fn preload_language(
        &self,
        language: &str,
    ) -> Vec<(String, std::result::Result<LoadedTranslation, I18nError>)> {
        self.loader.preload_language(language).await
    }

    /// Begin periodic update checks at the configured interval, following
    /// the current language as it changes.
    pub fn start_update_checker(&self) {
        let language = Arc::clone(&self.language);
        self.checker.start(
            move || language.lock().expect("language lock poisoned").clone(),
            Duration::from_secs(self.config.sync_interval_secs),
        );
    }

    pub fn stop_update_checker(&self) {
        self.checker.stop();
    }

    /// One immediate update check for the current language.
    pub async fn force_update_check(&self) -> std::result::Result<bool, I18nError> {
        self.checker.force_check(&self.language()).await
    }

    /// Record a missing translation key across all configured languages.
    pub async fn report_missing(&self, key: &str, namespace: &str, default_value: Option<&str>) {
        self.missing
            .report(key, namespace, &self.config.languages, default_value)
            .await;
    }

    /// Flush any queued missing-key reports immediately.
    pub async fn flush_missing_reports(&self) {
        self.missing.flush().await;
    }

    fn expected_version(&self, language: &str, namespace: &str) -> Option<String> {
        self.loader
            .cache()
            .meta()
            .as_ref()
            .and_then(|meta| meta.version_for(language, namespace))
            .map(str::to_string)
    }
}
