//! Chunk cache: lazy, deduplicated loading of message-fragment chunks.
//!
//! Chunks arrive either from the bundle directory (the loader path) or via
//! [`ChunkStore::register`] (the ingest contract used by tests and by any
//! embedding host that already holds the data). Waiters never poll on a
//! timer: registration wakes them exactly once per arrival.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::meta::ViewerMeta;

/// Backoff before a failed chunk load clears its in-flight flag, so a
/// pending `ensure` does not hammer a broken transport.
const LOAD_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Default)]
struct StoreInner {
    cache: HashMap<usize, Arc<Vec<String>>>,
    in_flight: HashSet<usize>,
    issued: u64,
}

pub struct ChunkStore {
    meta: Arc<ViewerMeta>,
    /// Bundle directory to load chunk files from; `None` means the store is
    /// fed exclusively through [`ChunkStore::register`].
    root: Option<PathBuf>,
    inner: Mutex<StoreInner>,
    arrived: Notify,
}

impl ChunkStore {
    pub fn new(meta: Arc<ViewerMeta>, root: Option<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            meta,
            root,
            inner: Mutex::new(StoreInner::default()),
            arrived: Notify::new(),
        })
    }

    /// Awaits until every chunk covering the inclusive message range
    /// `[start, end]` (clamped to the transcript) is cached. Loads are issued
    /// only for chunks neither cached nor already in flight; a failed load
    /// clears its flag and wakes us so the request is re-issued. Resolves
    /// only on arrival; a permanently broken transport leaves the range in
    /// a perpetual loading state rather than erroring.
    pub async fn ensure(self: &Arc<Self>, start: usize, end: usize) {
        let Some((first, last)) = self.meta.chunk_span(start, end) else {
            return;
        };
        loop {
            // enable the waiter before checking the cache, otherwise a
            // registration racing the check could be missed
            let wakeup = self.arrived.notified();
            tokio::pin!(wakeup);
            wakeup.as_mut().enable();

            let mut launch = Vec::new();
            let mut missing = false;
            {
                let mut inner = self.inner.lock();
                for chunk in first..=last {
                    if inner.cache.contains_key(&chunk) {
                        continue;
                    }
                    missing = true;
                    if self.root.is_some() && inner.in_flight.insert(chunk) {
                        inner.issued += 1;
                        launch.push(chunk);
                    }
                }
            }
            if !missing {
                return;
            }
            for chunk in launch {
                tokio::spawn(Arc::clone(self).load_chunk(chunk));
            }
            wakeup.await;
        }
    }

    async fn load_chunk(self: Arc<Self>, chunk: usize) {
        let result = self.fetch_chunk(chunk).await;
        match result {
            Ok(items) => {
                tracing::debug!(chunk, items = items.len(), "chunk loaded");
                self.register(chunk, items);
            }
            Err(err) => {
                tracing::warn!(chunk, error = %err, "chunk load failed");
                tokio::time::sleep(LOAD_RETRY_DELAY).await;
                self.inner.lock().in_flight.remove(&chunk);
                self.arrived.notify_waiters();
            }
        }
    }

    async fn fetch_chunk(&self, chunk: usize) -> Result<Vec<String>> {
        let root = self.root.as_ref().context("store has no bundle directory")?;
        let locator = self
            .meta
            .chunks
            .get(chunk)
            .with_context(|| format!("chunk {chunk} has no locator"))?;
        let path = root.join(locator);
        let body = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        parse_chunk_payload(&body)
    }

    /// Ingest contract: stores a chunk and wakes everything awaiting it.
    /// Re-registering the same index is an idempotent overwrite.
    pub fn register(&self, chunk: usize, items: Vec<String>) {
        {
            let mut inner = self.inner.lock();
            inner.cache.insert(chunk, Arc::new(items));
            inner.in_flight.remove(&chunk);
        }
        self.arrived.notify_waiters();
    }

    /// Fragment at a global message index, or `None` while its chunk is
    /// absent ("not yet available", never fatal).
    pub fn item_html(&self, index: usize) -> Option<String> {
        let chunk = self.meta.chunk_of(index);
        let offset = index % self.meta.chunk_size.max(1);
        self.inner
            .lock()
            .cache
            .get(&chunk)
            .and_then(|items| items.get(offset).cloned())
    }

    pub fn chunk_items(&self, chunk: usize) -> Option<Arc<Vec<String>>> {
        self.inner.lock().cache.get(&chunk).cloned()
    }

    pub fn loaded(&self, chunk: usize) -> bool {
        self.inner.lock().cache.contains_key(&chunk)
    }

    pub fn loaded_count(&self) -> usize {
        self.inner.lock().cache.len()
    }

    /// Total load requests issued since construction.
    pub fn issued_loads(&self) -> u64 {
        self.inner.lock().issued
    }
}

/// Accepts both chunk file forms the converter has shipped: a plain JSON
/// array, or the JS wrapper `(function(){ var items = [...]; ... })();`.
pub fn parse_chunk_payload(body: &str) -> Result<Vec<String>> {
    let trimmed = body.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("parsing chunk items array");
    }
    const MARKER: &str = "var items = ";
    let at = body
        .find(MARKER)
        .context("chunk file carries no items payload")?;
    let rest = &body[at + MARKER.len()..];
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Vec<String>>();
    match stream.next() {
        Some(Ok(items)) => Ok(items),
        Some(Err(err)) => Err(err).context("parsing wrapped chunk items"),
        None => bail!("empty chunk payload"),
    }
}
