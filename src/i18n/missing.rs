use super::store::{TranslationCache, TranslationMeta};
use crate::client::ApiClient;
use crate::storage::KeyValueStore;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Storage key for the set of already-reported dedup ids.
const REPORTED_KEY: &str = "i18n:missing-reported";

/// One missing-translation observation, as sent to the server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingKey {
    pub key: String,
    pub namespace: String,
    pub languages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

#[derive(Serialize)]
struct BatchPayload<'a> {
    keys: Vec<&'a MissingKey>,
}

struct QueuedReport {
    id: String,
    item: MissingKey,
}

#[derive(Default)]
struct ReporterState {
    queue: Vec<QueuedReport>,
    reported: HashSet<String>,
    reported_loaded: bool,
    // Bumped on every enqueue; a debounce timer only flushes if it is still
    // the latest one, which restarts the window on each sighting.
    flush_generation: u64,
}

struct ReporterInner {
    client: Arc<ApiClient>,
    store: Arc<dyn KeyValueStore>,
    cache: TranslationCache,
    debounce: Duration,
    state: Mutex<ReporterState>,
}

/// Collects missing-translation sightings, deduplicates them across app
/// sessions, and ships them to the server in debounced batches.
///
/// A key is reported at most once per install and manifest version: the
/// dedup ids carry a fingerprint of the current translation versions and are
/// persisted, so the same key surfaces again after the server ships new
/// versions. When a report fails to send, its id is released so a later
/// session can try again.
#[derive(Clone)]
pub struct MissingKeyReporter {
    inner: Arc<ReporterInner>,
}

impl MissingKeyReporter {
    pub fn new(
        client: Arc<ApiClient>,
        store: Arc<dyn KeyValueStore>,
        cache: TranslationCache,
        debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                client,
                store,
                cache,
                debounce,
                state: Mutex::new(ReporterState::default()),
            }),
        }
    }

    /// Record a missing key. Duplicate sightings (same key, namespace,
    /// languages, and translation versions) are dropped; a fresh sighting
    /// queues the report and restarts the debounce window.
    pub async fn report(
        &self,
        key: &str,
        namespace: &str,
        languages: &[String],
        default_value: Option<&str>,
    ) {
        let item = MissingKey {
            key: key.to_string(),
            namespace: namespace.to_string(),
            languages: languages.to_vec(),
            default_value: default_value.map(str::to_string),
        };
        let fingerprint = version_fingerprint(
            self.inner.cache.meta().as_ref(),
            namespace,
            languages,
        );
        let id = dedup_id(&item, &fingerprint);

        let mut state = self.inner.state.lock().await;
        self.inner.ensure_reported_loaded(&mut state);
        if !state.reported.insert(id.clone()) {
            debug!("missing key already reported, skipping: {id}");
            return;
        }
        self.inner.persist_reported(&state.reported);
        state.queue.push(QueuedReport { id, item });

        state.flush_generation += 1;
        let generation = state.flush_generation;
        drop(state);

        let reporter = self.clone();
        tokio::spawn(async move {
            sleep(reporter.inner.debounce).await;
            let still_latest =
                reporter.inner.state.lock().await.flush_generation == generation;
            if still_latest {
                reporter.flush().await;
            }
        });
    }

    /// Send everything queued right now. Tries one batch request first and
    /// falls back to per-key requests when the batch endpoint is not
    /// available. Keys that could not be delivered go back on the queue with
    /// their dedup id released.
    pub async fn flush(&self) {
        let batch = {
            let mut state = self.inner.state.lock().await;
            std::mem::take(&mut state.queue)
        };
        if batch.is_empty() {
            return;
        }
        debug!("reporting {} missing translation keys", batch.len());

        let payload = BatchPayload {
            keys: batch.iter().map(|q| &q.item).collect(),
        };
        match self.inner.client.post_json("/i18n/missing/batch", &payload).await {
            Ok(_) => return,
            Err(e) => {
                warn!("batch missing-key report failed, falling back to single posts: {e}");
            }
        }

        let mut failed = Vec::new();
        for queued in batch {
            match self.inner.client.post_json("/i18n/missing", &queued.item).await {
                Ok(_) => {}
                Err(e) => {
                    warn!("missing-key report failed for {}: {e}", queued.id);
                    failed.push(queued);
                }
            }
        }

        if !failed.is_empty() {
            let mut state = self.inner.state.lock().await;
            for queued in &failed {
                state.reported.remove(&queued.id);
            }
            self.inner.persist_reported(&state.reported);
            state.queue.extend(failed);
        }
    }
}

impl ReporterInner {
    /// Lazily hydrate the persisted dedup set. Corrupt or unreadable state
    /// degrades to an empty set; re-reporting is harmless.
    fn ensure_reported_loaded(&self, state: &mut ReporterState) {
        if state.reported_loaded {
            return;
        }
        state.reported_loaded = true;
        let raw = match self.store.get(REPORTED_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!("failed to read reported-key set: {e}");
                return;
            }
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => state.reported = ids.into_iter().collect(),
            Err(e) => warn!("reported-key set is corrupt, starting fresh: {e}"),
        }
    }

    fn persist_reported(&self, reported: &HashSet<String>) {
        let mut ids: Vec<&str> = reported.iter().map(String::as_str).collect();
        ids.sort_unstable();
        let raw = match serde_json::to_string(&ids) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to serialize reported-key set: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(REPORTED_KEY, &raw) {
            warn!("failed to persist reported-key set: {e}");
        }
    }
}

/// Fingerprint of the translation versions a sighting was made against: the
/// cached manifest version per reported language. Changes whenever the
/// server ships new versions, so a still-missing key is reported again.
fn version_fingerprint(
    meta: Option<&TranslationMeta>,
    namespace: &str,
    languages: &[String],
) -> String {
    let Some(meta) = meta else {
        return String::new();
    };
    let mut languages = languages.to_vec();
    languages.sort_unstable();
    languages
        .iter()
        .map(|language| meta.version_for(language, namespace).unwrap_or("-"))
        .collect::<Vec<_>>()
        .join(",")
}

fn dedup_id(item: &MissingKey, fingerprint: &str) -> String {
    let mut languages = item.languages.clone();
    languages.sort_unstable();
    format!(
        "{}|{}|{}|{}",
        item.namespace,
        languages.join(","),
        item.key,
        fingerprint
    )
}
