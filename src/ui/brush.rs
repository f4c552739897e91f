//! Range-selection brush over the minimap: handle drags, body translation
//! and the double-click reset gesture.

use std::time::{Duration, Instant};

use crate::state::Selection;
use crate::ui::minimap::{column_for_index, index_for_column};

/// Two presses this close (in time and space) count as a double click.
const DOUBLE_CLICK: Duration = Duration::from_millis(400);
/// Handle hit zone, in cells either side of the handle column.
const HANDLE_SLOP: usize = 1;

#[derive(Debug, Clone, Copy)]
enum DragMode {
    HandleStart,
    HandleEnd,
    /// Body drag keeps the snapshot taken at press time; every motion is
    /// applied against it so the range width never drifts.
    Body { origin: Selection, grab: usize },
}

/// What a press did, so the caller knows whether to refilter groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrushAction {
    None,
    DragStarted,
    Reset,
}

#[derive(Default)]
pub struct BrushState {
    drag: Option<DragMode>,
    last_press: Option<(Instant, usize)>,
}

impl BrushState {
    /// Selection-bound handle columns for the current geometry.
    pub fn handle_columns(selection: Selection, columns: usize, total: usize) -> (usize, usize) {
        (
            column_for_index(selection.start, columns, total),
            column_for_index(selection.end, columns, total),
        )
    }

    pub fn dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn on_press(
        &mut self,
        column: usize,
        columns: usize,
        selection: &mut Selection,
        total: usize,
    ) -> BrushAction {
        if total == 0 || columns == 0 {
            return BrushAction::None;
        }
        if let Some((at, col)) = self.last_press
            && at.elapsed() < DOUBLE_CLICK
            && col.abs_diff(column) <= HANDLE_SLOP
        {
            self.last_press = None;
            self.drag = None;
            *selection = Selection::full(total);
            return BrushAction::Reset;
        }
        self.last_press = Some((Instant::now(), column));

        let (start_col, end_col) = Self::handle_columns(*selection, columns, total);
        let near_start = column.abs_diff(start_col) <= HANDLE_SLOP;
        let near_end = column.abs_diff(end_col) <= HANDLE_SLOP;
        self.drag = if near_start && near_end {
            // overlapping handles: pick by which side of the midpoint we hit
            if column <= (start_col + end_col) / 2 {
                Some(DragMode::HandleStart)
            } else {
                Some(DragMode::HandleEnd)
            }
        } else if near_start {
            Some(DragMode::HandleStart)
        } else if near_end {
            Some(DragMode::HandleEnd)
        } else if (start_col..=end_col).contains(&column) {
            Some(DragMode::Body {
                origin: *selection,
                grab: index_for_column(column, columns, total),
            })
        } else {
            None
        };
        match self.drag {
            Some(_) => BrushAction::DragStarted,
            None => BrushAction::None,
        }
    }

    /// Applies pointer motion to the selection; returns whether it changed.
    pub fn on_drag(
        &mut self,
        column: usize,
        columns: usize,
        selection: &mut Selection,
        total: usize,
    ) -> bool {
        let Some(mode) = self.drag else {
            return false;
        };
        if total == 0 || columns == 0 {
            return false;
        }
        let index = index_for_column(column, columns, total);
        let next = match mode {
            DragMode::HandleStart => selection.with_start(index, total),
            DragMode::HandleEnd => selection.with_end(index, total),
            DragMode::Body { origin, grab } => {
                let delta = index as isize - grab as isize;
                origin.translated(delta, total)
            }
        };
        if next == *selection {
            return false;
        }
        *selection = next;
        true
    }

    pub fn on_release(&mut self) {
        self.drag = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOTAL: usize = 100;
    const COLS: usize = 50;

    #[test]
    fn left_handle_drag_clamps_against_right() {
        let mut brush = BrushState::default();
        let mut sel = Selection { start: 20, end: 60 };
        let (start_col, _) = BrushState::handle_columns(sel, COLS, TOTAL);
        assert_eq!(
            brush.on_press(start_col, COLS, &mut sel, TOTAL),
            BrushAction::DragStarted
        );
        assert!(brush.on_drag(5, COLS, &mut sel, TOTAL));
        assert_eq!(sel, Selection { start: 10, end: 60 });
        // dragging past the right handle pins start at end
        brush.on_drag(COLS - 1, COLS, &mut sel, TOTAL);
        assert_eq!(sel, Selection { start: 60, end: 60 });
        brush.on_release();
        assert!(!brush.on_drag(0, COLS, &mut sel, TOTAL));
    }

    #[test]
    fn body_drag_translates_without_resizing() {
        let mut brush = BrushState::default();
        let mut sel = Selection { start: 20, end: 40 };
        // grab the middle of the body (column 15 -> index 30)
        brush.on_press(15, COLS, &mut sel, TOTAL);
        assert!(brush.on_drag(20, COLS, &mut sel, TOTAL));
        assert_eq!(sel, Selection { start: 30, end: 50 });
        // slam far right: width is preserved against the boundary
        brush.on_drag(COLS - 1, COLS, &mut sel, TOTAL);
        assert_eq!(sel.len(), 21);
        assert_eq!(sel.end, TOTAL - 1);
    }

    #[test]
    fn double_click_resets_to_full_range() {
        let mut brush = BrushState::default();
        let mut sel = Selection { start: 30, end: 40 };
        brush.on_press(17, COLS, &mut sel, TOTAL);
        brush.on_release();
        let action = brush.on_press(17, COLS, &mut sel, TOTAL);
        assert_eq!(action, BrushAction::Reset);
        assert_eq!(sel, Selection::full(TOTAL));
        assert!(!brush.dragging());
    }

    #[test]
    fn press_outside_brush_does_nothing() {
        let mut brush = BrushState::default();
        let mut sel = Selection { start: 40, end: 60 };
        let action = brush.on_press(2, COLS, &mut sel, TOTAL);
        assert_eq!(action, BrushAction::None);
        assert!(!brush.dragging());
        assert_eq!(sel, Selection { start: 40, end: 60 });
    }
}
