//! Shared bundle fixtures for integration tests.

use std::path::Path;

/// Writes a complete bundle directory: `meta.json` plus JS-wrapped chunk
/// files shaped exactly like the converter's output.
pub fn write_bundle(
    dir: &Path,
    chunk_size: usize,
    kinds: &str,
    groups: serde_json::Value,
    fragment_for: impl Fn(usize) -> String,
) {
    let total = kinds.len();
    let ids: Vec<String> = (0..total)
        .map(|i| format!("msg-2026-01-02T10-00-{i:02}-000"))
        .collect();
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

    let meta = serde_json::json!({
        "format": "codex-transcripts.viewer.v2",
        "total": total,
        "chunk_size": chunk_size,
        "chunks": chunks,
        "kinds": kinds,
        "ids": ids,
        "ts": ts,
        "groups": groups,
    });
    std::fs::create_dir_all(dir.join("chunks")).unwrap();
    std::fs::write(dir.join("meta.json"), serde_json::to_string(&meta).unwrap()).unwrap();

    for (chunk, locator) in chunks.iter().enumerate() {
        let first = chunk * chunk_size;
        let items: Vec<String> = (first..(first + chunk_size).min(total))
            .map(&fragment_for)
            .collect();
        let payload = serde_json::to_string(&items).unwrap();
        let body = format!(
            "(function(){{\n  var items = {payload};\n  if (window.__VIEWER__) {{ window.__VIEWER__.registerChunk({chunk}, items); }}\n}})();\n"
        );
        std::fs::write(dir.join(locator), body).unwrap();
    }
}

pub fn default_fragment(i: usize) -> String {
    format!("<div class=\"message\"><p>message number {i}</p></div>")
}
