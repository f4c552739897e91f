//! Shared interaction state: the selection brush range, the active message
//! and the current anchor, modeled as one explicit object instead of
//! module-level globals.

/// Inclusive message-index range gating visibility, navigation and search.
///
/// Invariant: `0 <= start <= end <= total-1` (both zero on an empty
/// transcript). Every constructor and mutator restores it by clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub fn full(total: usize) -> Self {
        Self {
            start: 0,
            end: total.saturating_sub(1),
        }
    }

    /// Clamps an arbitrary `(a, b)` pair into a valid selection. A reversed
    /// pair collapses to the single index `min(a, b)`, forced into bounds.
    pub fn clamped(a: usize, b: usize, total: usize) -> Self {
        let (start, end) = if a > b {
            let m = a.min(b);
            (m, m)
        } else {
            (a, b)
        };
        let max = total.saturating_sub(1);
        Self {
            start: start.min(max),
            end: end.min(max),
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..=self.end).contains(&index)
    }

    /// Overlap test against another inclusive range.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        start <= self.end && end >= self.start
    }

    /// Inclusive width; never zero by invariant.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Left-handle drag: moves `start`, clamped so `start <= end` holds.
    pub fn with_start(self, index: usize, total: usize) -> Self {
        Self::clamped(index.min(self.end), self.end, total)
    }

    /// Right-handle drag: moves `end`, clamped so `start <= end` holds.
    pub fn with_end(self, index: usize, total: usize) -> Self {
        Self::clamped(self.start, index.max(self.start), total)
    }

    /// Body drag: translates both bounds by `delta`, clamped so the range
    /// keeps its width and stays inside `[0, total-1]`.
    pub fn translated(self, delta: isize, total: usize) -> Self {
        let max = total.saturating_sub(1) as isize;
        let room_left = -(self.start as isize);
        let room_right = max - self.end as isize;
        let delta = delta.clamp(room_left, room_right.max(room_left));
        Self {
            start: (self.start as isize + delta) as usize,
            end: (self.end as isize + delta) as usize,
        }
    }
}

/// Interaction state shared between the brush, the navigator, the minimap
/// and the search engine. Only brush and navigator paths write to it.
#[derive(Debug, Clone)]
pub struct ViewerState {
    pub total: usize,
    pub selection: Selection,
    /// Most recently navigated-to message index.
    pub active: Option<usize>,
    /// Stable id of the active message; the permalink analog. Updated by
    /// replacement on every navigation, never stacked into a history.
    pub anchor: Option<String>,
}

impl ViewerState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            selection: Selection::full(total),
            active: None,
            anchor: None,
        }
    }

    /// Navigation target clamp: into the selection first, then into the
    /// transcript bounds.
    pub fn clamp_target(&self, index: usize) -> usize {
        let sel = self.selection;
        index
            .clamp(sel.start, sel.end)
            .min(self.total.saturating_sub(1))
    }

    pub fn set_active(&mut self, index: usize, anchor: String) {
        self.active = Some(index);
        self.anchor = Some(anchor);
    }

    pub fn reset_selection(&mut self) {
        self.selection = Selection::full(self.total);
    }
}
