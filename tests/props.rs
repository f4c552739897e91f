//! Property coverage for the arithmetic the viewer leans on: selection
//! clamping, bin aggregation and chunk-span computation.

use codex_transcript_viewer::meta::ViewerMeta;
use codex_transcript_viewer::state::Selection;
use codex_transcript_viewer::ui::minimap::{MinimapView, column_for_index, index_for_column};
use proptest::prelude::*;

fn meta_for(kinds: &str, chunk_size: usize) -> ViewerMeta {
    let total = kinds.len();
    let ids: Vec<String> = (0..total).map(|i| format!("msg-{i}")).collect();
    let ts: Vec<String> = (0..total)
        .map(|i| format!("2026-01-02T10:00:{:02}+00:00", i % 60))
        .collect();
    let chunk_count = if total == 0 {
        0
    } else {
        total.div_ceil(chunk_size)
    };
    let chunks: Vec<String> = (0..chunk_count)
        .map(|i| format!("chunks/chunk-{i:03}.js"))
        .collect();
    let body = serde_json::json!({
        "format": "codex-transcripts.viewer.v2",
        "total": total,
        "chunk_size": chunk_size,
        "chunks": chunks,
        "kinds": kinds,
        "ids": ids,
        "ts": ts,
        "groups": [],
    });
    ViewerMeta::parse(&body.to_string()).unwrap()
}

proptest! {
    #[test]
    fn selection_clamp_is_idempotent(a in 0usize..2000, b in 0usize..2000, total in 0usize..1500) {
        let once = Selection::clamped(a, b, total);
        let twice = Selection::clamped(once.start, once.end, total);
        prop_assert_eq!(once, twice);
        prop_assert!(once.start <= once.end);
        prop_assert!(once.end <= total.saturating_sub(1).max(0));
        if a > b {
            let expected = a.min(b).min(total.saturating_sub(1));
            prop_assert_eq!(once.start, expected);
            prop_assert_eq!(once.end, expected);
        }
    }

    #[test]
    fn handle_and_body_ops_preserve_the_invariant(
        a in 0usize..500, b in 0usize..500, total in 1usize..500,
        target in 0usize..800, delta in -500isize..500
    ) {
        let sel = Selection::clamped(a, b, total);
        for next in [
            sel.with_start(target, total),
            sel.with_end(target, total),
            sel.translated(delta, total),
        ] {
            prop_assert!(next.start <= next.end);
            prop_assert!(next.end < total);
        }
        prop_assert_eq!(sel.translated(delta, total).len(), sel.len());
    }

    #[test]
    fn bin_counts_conserve_total(kinds in "[uatrs]{1,400}", width in 1u16..200) {
        let meta = meta_for(&kinds, 50);
        let mut view = MinimapView::new();
        view.ensure_bins(&meta, width);
        let sum: u32 = view.bins().iter().flatten().sum();
        prop_assert_eq!(sum as usize, meta.total);
        prop_assert!(view.bin_count() <= meta.total.min(width as usize));
    }

    #[test]
    fn column_mapping_stays_in_range(index in 0usize..5000, cols in 1usize..300, total in 1usize..5000) {
        let col = column_for_index(index.min(total - 1), cols, total);
        prop_assert!(col < cols);
        let back = index_for_column(col, cols, total);
        prop_assert!(back < total);
    }

    #[test]
    fn chunk_span_matches_floor_division(start in 0usize..400, end in 0usize..400, chunk_size in 1usize..50) {
        let total = 400usize;
        let meta = meta_for(&"u".repeat(total), chunk_size);
        let (lo, hi) = (start.min(end), start.max(end));
        let span = meta.chunk_span(start, end).unwrap();
        prop_assert_eq!(span, (lo / chunk_size, hi / chunk_size));
    }
}
