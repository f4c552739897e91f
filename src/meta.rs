//! Bundle metadata: the read-only index every other component queries.

use std::path::Path;

use chrono::DateTime;
use serde::Deserialize;
use thiserror::Error;

/// Format tag the companion converter writes into `meta.json`.
pub const VIEWER_FORMAT: &str = "codex-transcripts.viewer.v2";

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parsing meta.json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("inconsistent metadata: {0}")]
    Inconsistent(&'static str),
}

/// Message category, encoded as one character per message in `meta.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    User,
    Assistant,
    ToolCall,
    ToolReply,
    System,
}

impl MessageKind {
    pub fn from_code(c: char) -> Self {
        match c {
            'u' => Self::User,
            'a' => Self::Assistant,
            't' => Self::ToolCall,
            'r' => Self::ToolReply,
            _ => Self::System,
        }
    }

    pub fn code(self) -> char {
        match self {
            Self::User => 'u',
            Self::Assistant => 'a',
            Self::ToolCall => 't',
            Self::ToolReply => 'r',
            Self::System => 's',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::ToolCall => "tool call",
            Self::ToolReply => "tool reply",
            Self::System => "system",
        }
    }

    /// Minimap stacking order, bottom to top.
    pub const STACK: [MessageKind; 5] = [
        Self::System,
        Self::ToolReply,
        Self::ToolCall,
        Self::Assistant,
        Self::User,
    ];

    /// Position in [`Self::STACK`], used as an array slot for bin counts.
    pub fn slot(self) -> usize {
        match self {
            Self::System => 0,
            Self::ToolReply => 1,
            Self::ToolCall => 2,
            Self::Assistant => 3,
            Self::User => 4,
        }
    }
}

/// One conversation: an inclusive message-index range plus the prompt that
/// opened it (`None` for the leading session-start group).
#[derive(Debug, Clone, Deserialize)]
pub struct GroupSpan {
    pub start: usize,
    pub end: usize,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewerMeta {
    pub format: String,
    pub total: usize,
    pub chunk_size: usize,
    /// Relative chunk locators, position = chunk index.
    pub chunks: Vec<String>,
    kinds: String,
    pub ids: Vec<String>,
    pub ts: Vec<String>,
    pub groups: Vec<GroupSpan>,
}

impl ViewerMeta {
    /// Loads `meta.json` from a bundle directory. Missing, malformed or
    /// internally inconsistent metadata yields `None`: the viewer must
    /// degrade to a no-op rather than error out.
    pub fn load(bundle_dir: &Path) -> Option<Self> {
        let path = bundle_dir.join("meta.json");
        match Self::read(&path) {
            Ok(meta) => Some(meta),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "unusable bundle metadata");
                None
            }
        }
    }

    fn read(path: &Path) -> Result<Self, BundleError> {
        let body = std::fs::read_to_string(path).map_err(|source| BundleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&body)
    }

    pub fn parse(body: &str) -> Result<Self, BundleError> {
        let meta: Self = serde_json::from_str(body)?;
        meta.validate()?;
        Ok(meta)
    }

    fn validate(&self) -> Result<(), BundleError> {
        use BundleError::Inconsistent;
        if self.format != VIEWER_FORMAT {
            return Err(Inconsistent("unknown format tag"));
        }
        if self.kinds.chars().count() != self.total {
            return Err(Inconsistent("kinds length != total"));
        }
        if self.ids.len() != self.total || self.ts.len() != self.total {
            return Err(Inconsistent("ids/ts length != total"));
        }
        if self.total > 0 {
            if self.chunk_size == 0 {
                return Err(Inconsistent("chunk_size is zero"));
            }
            let expected = self.total.div_ceil(self.chunk_size);
            if self.chunks.len() != expected {
                return Err(Inconsistent("chunk list does not cover total"));
            }
        }
        let mut prev_end: Option<usize> = None;
        for g in &self.groups {
            if g.end < g.start || g.end >= self.total {
                return Err(Inconsistent("group range out of bounds"));
            }
            if let Some(prev) = prev_end
                && g.start <= prev
            {
                return Err(Inconsistent("groups unsorted or overlapping"));
            }
            prev_end = Some(g.end);
        }
        Ok(())
    }

    pub fn kind_at(&self, index: usize) -> MessageKind {
        MessageKind::from_code(self.kinds.as_bytes().get(index).copied().unwrap_or(b's') as char)
    }

    pub fn chunk_of(&self, index: usize) -> usize {
        index / self.chunk_size.max(1)
    }

    /// Covering chunk span for an inclusive message range, clamped to the
    /// transcript. `None` when the transcript is empty.
    pub fn chunk_span(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        if self.total == 0 {
            return None;
        }
        let max = self.total - 1;
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        Some((self.chunk_of(lo.min(max)), self.chunk_of(hi.min(max))))
    }

    /// Binary search for the group owning `index`; `None` when the index
    /// falls in a gap between groups.
    pub fn group_for(&self, index: usize) -> Option<usize> {
        let pos = self.groups.partition_point(|g| g.start <= index);
        if pos == 0 {
            return None;
        }
        let candidate = pos - 1;
        (self.groups[candidate].end >= index).then_some(candidate)
    }

    /// Resolves a stable anchor id back to its message index.
    pub fn anchor_index(&self, anchor: &str) -> Option<usize> {
        self.ids.iter().position(|id| id == anchor)
    }

    /// Display label for a group: `#N` counting prompted conversations, or
    /// `Start` for the leading session-start group.
    pub fn group_label(&self, group: usize) -> String {
        let Some(span) = self.groups.get(group) else {
            return String::new();
        };
        if span.prompt.is_none() {
            return "Start".to_string();
        }
        let n = self.groups[..=group]
            .iter()
            .filter(|g| g.prompt.is_some())
            .count();
        format!("#{n}")
    }

    /// Whitespace-normalized prompt preview, truncated to `max` chars.
    pub fn prompt_preview(&self, group: usize, max: usize) -> String {
        let prompt = self
            .groups
            .get(group)
            .and_then(|g| g.prompt.as_deref())
            .unwrap_or("(session start)");
        truncate_normalized(prompt, max)
    }

    /// Wall-clock span of a group, when both endpoint timestamps parse.
    pub fn group_duration_ms(&self, group: usize) -> Option<i64> {
        let span = self.groups.get(group)?;
        let start = parse_rfc3339(self.ts.get(span.start)?)?;
        let end = parse_rfc3339(self.ts.get(span.end)?)?;
        Some((end - start).num_milliseconds())
    }
}

pub fn truncate_normalized(text: &str, max: usize) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max {
        return normalized;
    }
    let mut out: String = normalized.chars().take(max).collect();
    out.push('…');
    out
}

pub fn parse_rfc3339(ts: &str) -> Option<DateTime<chrono::FixedOffset>> {
    DateTime::parse_from_rfc3339(ts.trim()).ok()
}

pub fn format_duration_ms(ms: Option<i64>) -> String {
    let Some(ms) = ms.filter(|ms| *ms >= 0) else {
        return "-".to_string();
    };
    let secs = ms / 1000;
    if secs < 60 {
        return format!("{secs}s");
    }
    let mins = secs / 60;
    let rem = secs % 60;
    if mins < 60 {
        return format!("{mins}m {rem:02}s");
    }
    format!("{}h {:02}m", mins / 60, mins % 60)
}


#[cfg(test)]
mod tests {
    use super::testkit::meta_json;
    use super::*;

    #[test]
    fn group_lookup_tolerates_gaps() {
        let kinds: String = "u".repeat(21);
        let body = meta_json(
            21,
            8,
            &kinds,
            r#"[{"start":0,"end":4,"prompt":"a"},{"start":5,"end":5,"prompt":"b"},{"start":10,"end":20,"prompt":"c"}]"#,
        );
        let meta = ViewerMeta::parse(&body).unwrap();
        assert_eq!(meta.group_for(0), Some(0));
        assert_eq!(meta.group_for(4), Some(0));
        assert_eq!(meta.group_for(5), Some(1));
        assert_eq!(meta.group_for(7), None);
        assert_eq!(meta.group_for(9), None);
        assert_eq!(meta.group_for(10), Some(2));
        assert_eq!(meta.group_for(20), Some(2));
        assert_eq!(meta.group_for(21), None);
    }

    #[test]
    fn malformed_metadata_is_rejected() {
        assert!(ViewerMeta::parse("{").is_err());
        // kinds shorter than total
        let body = meta_json(4, 2, "uaa", "[]");
        assert!(matches!(
            ViewerMeta::parse(&body),
            Err(BundleError::Inconsistent(_))
        ));
        // group past the end
        let body = meta_json(4, 2, "uaau", r#"[{"start":0,"end":9,"prompt":null}]"#);
        assert!(ViewerMeta::parse(&body).is_err());
        // wrong format tag
        let good = meta_json(4, 2, "uaau", "[]");
        let bad = good.replace(VIEWER_FORMAT, "codex-transcripts.viewer.v1");
        assert!(ViewerMeta::parse(&bad).is_err());
    }

    #[test]
    fn chunk_span_covers_and_clamps() {
        let body = meta_json(10, 4, &"u".repeat(10), "[]");
        let meta = ViewerMeta::parse(&body).unwrap();
        assert_eq!(meta.chunk_span(0, 9), Some((0, 2)));
        assert_eq!(meta.chunk_span(3, 4), Some((0, 1)));
        assert_eq!(meta.chunk_span(5, 5), Some((1, 1)));
        // reversed and out-of-range inputs clamp instead of failing
        assert_eq!(meta.chunk_span(9, 2), Some((0, 2)));
        assert_eq!(meta.chunk_span(0, 500), Some((0, 2)));
    }

    #[test]
    fn anchors_round_trip() {
        let body = meta_json(6, 4, "uaatrs", "[]");
        let meta = ViewerMeta::parse(&body).unwrap();
        for i in 0..6 {
            assert_eq!(meta.anchor_index(&meta.ids[i]), Some(i));
        }
        assert_eq!(meta.anchor_index("msg-nope"), None);
    }

    #[test]
    fn group_labels_count_prompted_conversations() {
        let body = meta_json(
            6,
            4,
            "saauau",
            r#"[{"start":0,"end":1,"prompt":null},{"start":2,"end":3,"prompt":"fix the bug"},{"start":4,"end":5,"prompt":"now the tests"}]"#,
        );
        let meta = ViewerMeta::parse(&body).unwrap();
        assert_eq!(meta.group_label(0), "Start");
        assert_eq!(meta.group_label(1), "#1");
        assert_eq!(meta.group_label(2), "#2");
        assert_eq!(meta.prompt_preview(0, 90), "(session start)");
        assert_eq!(meta.prompt_preview(1, 90), "fix the bug");
    }

    #[test]
    fn preview_normalizes_and_truncates() {
        let long = "  lots\nof\t\twhitespace ".repeat(20);
        let out = truncate_normalized(&long, 90);
        assert!(out.chars().count() <= 91);
        assert!(out.ends_with('…'));
        assert!(!out.contains('\n'));
    }

    #[test]
    fn duration_formatting_matches_bundle_conventions() {
        assert_eq!(format_duration_ms(None), "-");
        assert_eq!(format_duration_ms(Some(-5)), "-");
        assert_eq!(format_duration_ms(Some(42_000)), "42s");
        assert_eq!(format_duration_ms(Some(125_000)), "2m 05s");
        assert_eq!(format_duration_ms(Some(3_725_000)), "1h 02m");
    }
}
