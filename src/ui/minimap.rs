//! Minimap: the whole transcript aggregated into fixed-width bins and
//! painted as stacked per-kind columns, with a cursor line for the active
//! message and an index mapping for hover/brush interactions.

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;

use crate::meta::{MessageKind, ViewerMeta};
use crate::ui::theme::ThemePalette;

/// Upper bound on bin count regardless of widget width.
pub const MAX_BINS: usize = 800;

/// Proportional mapping of a message index onto a bin/column.
pub fn column_for_index(index: usize, columns: usize, total: usize) -> usize {
    if total == 0 || columns == 0 {
        return 0;
    }
    ((index * columns) / total).min(columns - 1)
}

/// Inverse mapping of a column back to a message index, clamped. Ceiling
/// division picks the first index that maps back into the same column.
pub fn index_for_column(column: usize, columns: usize, total: usize) -> usize {
    if total == 0 || columns == 0 {
        return 0;
    }
    ((column * total).div_ceil(columns)).min(total - 1)
}

/// Cached bin aggregation. Rebuilt (O(total)) only when the bin count or the
/// message total changes.
pub struct MinimapView {
    bins: Vec<[u32; 5]>,
    total: usize,
}

impl Default for MinimapView {
    fn default() -> Self {
        Self::new()
    }
}

impl MinimapView {
    pub fn new() -> Self {
        Self {
            bins: Vec::new(),
            total: 0,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    pub fn bins(&self) -> &[[u32; 5]] {
        &self.bins
    }

    /// Recomputes the aggregation when geometry or data size changed.
    pub fn ensure_bins(&mut self, meta: &ViewerMeta, width_cells: u16) {
        let bin_count = (width_cells as usize).min(meta.total.min(MAX_BINS));
        if bin_count == self.bins.len() && self.total == meta.total {
            return;
        }
        self.total = meta.total;
        self.bins = vec![[0u32; 5]; bin_count];
        if bin_count == 0 {
            return;
        }
        for index in 0..meta.total {
            let bin = column_for_index(index, bin_count, meta.total);
            self.bins[bin][meta.kind_at(index).slot()] += 1;
        }
    }

    /// Paints the stacked columns into `area`. Each bin is one full-height
    /// column whose segments, bottom to top, follow [`MessageKind::STACK`]
    /// sized by that kind's share of the bin; empty bins stay blank. The
    /// active index, when present, is overlaid as a thin cursor line.
    pub fn paint(
        &self,
        area: Rect,
        buf: &mut Buffer,
        palette: ThemePalette,
        active: Option<usize>,
    ) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        let height = area.height as usize;
        for (bin, counts) in self.bins.iter().enumerate() {
            if bin >= area.width as usize {
                break;
            }
            let bin_total: u32 = counts.iter().sum();
            if bin_total == 0 {
                continue;
            }
            let x = area.x + bin as u16;
            for row in 0..height {
                // sample the stack at the cell's center, bottom row first
                let depth = ((row as f64 + 0.5) / height as f64) * bin_total as f64;
                let kind = kind_at_depth(counts, depth);
                let y = area.y + (height - 1 - row) as u16;
                if let Some(cell) = buf.cell_mut((x, y)) {
                    cell.set_char(' ');
                    cell.set_bg(palette.kind_color(kind));
                }
            }
        }
        if let Some(active) = active {
            if self.total == 0 || self.bins.is_empty() {
                return;
            }
            let col = column_for_index(active, self.bins.len().min(area.width as usize), self.total);
            let x = area.x + col as u16;
            for row in 0..area.height {
                if let Some(cell) = buf.cell_mut((x, area.y + row)) {
                    cell.set_char('│');
                    cell.set_fg(palette.fg);
                }
            }
        }
    }

    /// Tooltip lines for a hovered column: conversation label, kind,
    /// timestamp and a prompt preview.
    pub fn tooltip(&self, meta: &ViewerMeta, column: usize) -> Vec<String> {
        if meta.total == 0 || self.bins.is_empty() {
            return Vec::new();
        }
        let index = index_for_column(column, self.bins.len(), meta.total);
        let kind = meta.kind_at(index).label();
        let ts = meta.ts.get(index).cloned().unwrap_or_default();
        match meta.group_for(index) {
            Some(group) => vec![
                format!("{} · {kind} · {ts}", meta.group_label(group)),
                meta.prompt_preview(group, 90),
            ],
            None => vec![format!("– · {kind} · {ts}")],
        }
    }
}

fn kind_at_depth(counts: &[u32; 5], depth: f64) -> MessageKind {
    let mut cumulative = 0f64;
    for kind in MessageKind::STACK {
        cumulative += counts[kind.slot()] as f64;
        if depth < cumulative {
            return kind;
        }
    }
    MessageKind::User
}
