//! Streaming full-text search: a chunk-by-chunk scan bounded by the current
//! selection. No index is held; the corpus is one transcript, so a linear
//! scan that loads chunks on demand keeps memory flat and result order
//! stable (ascending message index).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::chunks::ChunkStore;
use crate::fragment::{Snippet, html_to_text, snippet_around};
use crate::meta::{MessageKind, ViewerMeta};
use crate::state::Selection;

/// Cooperative yield cadence: hand control back after this many hits.
pub const YIELD_EVERY: usize = 10;

/// Cancellation handle resolving the "new search while one streams" race:
/// the viewer cancels the old task before spawning a replacement, and the
/// old task stops at its next check without emitting anything further.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub index: usize,
    pub kind: MessageKind,
    pub ts: String,
    pub snippet: Snippet,
}

#[derive(Debug, Clone)]
pub enum SearchEvent {
    /// Status line updates ("enter a search term", running counts).
    Status(String),
    /// A batch of new hits plus the running total.
    Hits {
        found_so_far: usize,
        batch: Vec<SearchHit>,
    },
    /// Scan finished; `total` is the final hit count.
    Done { total: usize },
}

/// Runs one search to completion, emitting events through `emit`. Chunks are
/// ensured serially in ascending order so results arrive ordered and at most
/// one chunk load is pending on behalf of the search at a time.
pub async fn run_search(
    meta: Arc<ViewerMeta>,
    store: Arc<ChunkStore>,
    selection: Selection,
    query: String,
    cancel: CancelToken,
    emit: impl Fn(SearchEvent) + Send + 'static,
) {
    let query = query.trim().to_string();
    if query.is_empty() {
        emit(SearchEvent::Status("enter a search term".to_string()));
        return;
    }
    let Some((first_chunk, last_chunk)) = meta.chunk_span(selection.start, selection.end) else {
        emit(SearchEvent::Done { total: 0 });
        return;
    };
    tracing::debug!(query = %query, sel_start = selection.start, sel_end = selection.end, "search start");

    let needle = query.to_lowercase();
    let chunk_size = meta.chunk_size.max(1);
    let mut found = 0usize;
    let mut batch: Vec<SearchHit> = Vec::new();

    for chunk in first_chunk..=last_chunk {
        if cancel.is_cancelled() {
            return;
        }
        let range_start = chunk * chunk_size;
        let range_end = (range_start + chunk_size - 1).min(meta.total.saturating_sub(1));
        store.ensure(range_start, range_end).await;
        if cancel.is_cancelled() {
            return;
        }
        let Some(items) = store.chunk_items(chunk) else {
            continue;
        };
        for (offset, fragment) in items.iter().enumerate() {
            let index = range_start + offset;
            if !selection.contains(index) {
                continue;
            }
            // hit test runs on the raw fragment; snippets on its plain text
            if !fragment.to_lowercase().contains(&needle) {
                continue;
            }
            let text = html_to_text(fragment)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            let snippet =
                snippet_around(&text, &query).unwrap_or_else(|| Snippet::leading(&text));
            batch.push(SearchHit {
                index,
                kind: meta.kind_at(index),
                ts: meta.ts.get(index).cloned().unwrap_or_default(),
                snippet,
            });
            found += 1;
            if batch.len() >= YIELD_EVERY {
                emit(SearchEvent::Hits {
                    found_so_far: found,
                    batch: std::mem::take(&mut batch),
                });
                tokio::task::yield_now().await;
                if cancel.is_cancelled() {
                    return;
                }
            }
        }
        if !batch.is_empty() {
            emit(SearchEvent::Hits {
                found_so_far: found,
                batch: std::mem::take(&mut batch),
            });
        }
        tokio::task::yield_now().await;
    }
    tracing::debug!(query = %query, total = found, "search done");
    emit(SearchEvent::Done { total: found });
}
