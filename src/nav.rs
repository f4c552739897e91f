//! Keyboard navigation helpers: the pending-bracket command buffer and the
//! kind-directed scans it triggers.

use std::time::{Duration, Instant};

use crate::meta::{MessageKind, ViewerMeta};
use crate::state::Selection;

/// An armed `[`/`]` prefix expires after this much inactivity.
pub const BRACKET_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Backward,
}

/// Armed bracket prefix waiting for its kind key.
#[derive(Debug, Clone, Copy)]
pub struct PendingBracket {
    pub direction: ScanDirection,
    armed_at: Instant,
}

impl PendingBracket {
    pub fn arm(direction: ScanDirection) -> Self {
        Self {
            direction,
            armed_at: Instant::now(),
        }
    }

    pub fn expired(&self) -> bool {
        self.armed_at.elapsed() >= BRACKET_TIMEOUT
    }
}

/// Maps the key following a bracket to a message kind, case-insensitively.
pub fn kind_for_key(key: char) -> Option<MessageKind> {
    match key.to_ascii_lowercase() {
        'u' => Some(MessageKind::User),
        'a' => Some(MessageKind::Assistant),
        't' => Some(MessageKind::ToolCall),
        'r' => Some(MessageKind::ToolReply),
        's' => Some(MessageKind::System),
        _ => None,
    }
}

/// Nearest message of `kind` strictly before/after `from`, scanning only
/// inside the selection. `None` means no navigation happens.
pub fn next_of_kind(
    meta: &ViewerMeta,
    selection: Selection,
    from: usize,
    direction: ScanDirection,
    kind: MessageKind,
) -> Option<usize> {
    match direction {
        ScanDirection::Forward => {
            let begin = from.saturating_add(1).max(selection.start);
            (begin..=selection.end).find(|&i| meta.kind_at(i) == kind)
        }
        ScanDirection::Backward => {
            let stop = from.min(selection.end.saturating_add(1));
            (selection.start..stop).rev().find(|&i| meta.kind_at(i) == kind)
        }
    }
}
