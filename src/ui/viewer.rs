//! Viewer event loop: wires the chunk store, minimap, brush, navigator and
//! search engine into one terminal session.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers,
    MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use serde::{Deserialize, Serialize};

use crate::chunks::ChunkStore;
use crate::fragment::html_to_text;
use crate::meta::{ViewerMeta, format_duration_ms, parse_rfc3339};
use crate::nav::{self, PendingBracket, ScanDirection};
use crate::search::{CancelToken, SearchEvent, SearchHit, run_search};
use crate::state::ViewerState;
use crate::ui::brush::{BrushAction, BrushState};
use crate::ui::minimap::MinimapView;
use crate::ui::theme::ThemePalette;

/// Messages appended per event-loop tick while a conversation populates.
/// Bounds per-frame work regardless of how large the range is.
pub const RENDER_BATCH: usize = 40;
const TICK_RATE: Duration = Duration::from_millis(30);
/// Terminal rows below which the minimap (and with it the brush) stands down.
const MIN_ROWS_FOR_MINIMAP: u16 = 12;

enum AppEvent {
    /// All chunks for a group's range are present.
    RangeReady {
        group: usize,
        nav_gen: u64,
        focus: Option<usize>,
    },
    Search {
        generation: u64,
        event: SearchEvent,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LineTag {
    Blank,
    Header(usize),
    Body(usize),
}

#[derive(Clone, Copy)]
struct RenderJob {
    next: usize,
    end: usize,
}

/// Per-conversation view state. `open`/`loaded`/`filtered` are the display
/// contract the selection filter and navigator operate on.
struct GroupView {
    open: bool,
    loaded: bool,
    filtered: bool,
    lines: Vec<Line<'static>>,
    tags: Vec<LineTag>,
    job: Option<RenderJob>,
}

impl GroupView {
    fn new() -> Self {
        Self {
            open: false,
            loaded: false,
            filtered: false,
            lines: Vec::new(),
            tags: Vec::new(),
            job: None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Overlay {
    None,
    Help,
    Search,
}

#[derive(Default)]
struct SearchUi {
    input: String,
    last_submitted: Option<String>,
    hits: Vec<SearchHit>,
    selected: usize,
    status: String,
    running: bool,
    generation: u64,
    cancel: Option<CancelToken>,
}

#[derive(Serialize, Deserialize, Default)]
struct ViewerStatePersisted {
    theme: Option<String>,
}

fn state_path_for(data_dir: &Path) -> PathBuf {
    // Lightweight, non-secret UI preferences only.
    data_dir.join("viewer_state.json")
}

fn load_state(path: &Path) -> ViewerStatePersisted {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn save_state(path: &Path, state: &ViewerStatePersisted) {
    if let Ok(body) = serde_json::to_string_pretty(state) {
        let _ = std::fs::write(path, body);
    }
}

pub fn footer_legend() -> &'static str {
    "? help | / search | n/p move | g/G ends | ]/[ +kind jump | o open/close | y anchor | F2 theme | q quit"
}

fn help_lines(palette: ThemePalette) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();
    let add_section = |title: &str, items: &[&str]| -> Vec<Line<'static>> {
        let mut v = Vec::new();
        v.push(Line::from(Span::styled(title.to_string(), palette.title())));
        for item in items {
            v.push(Line::from(format!("  {item}")));
        }
        v.push(Line::from(""));
        v
    };
    lines.extend(add_section(
        "Navigation",
        &[
            "n/j next message | p/k previous",
            "g first in selection | G last in selection",
            "] then a/u/t/r/s: next of kind (1s window)",
            "[ then a/u/t/r/s: previous of kind",
            "o or Enter: open/close the active conversation",
        ],
    ));
    lines.extend(add_section(
        "Minimap",
        &[
            "drag a handle to resize the selection",
            "drag the body to slide it; double-click resets to full range",
            "hover shows conversation, kind, timestamp and prompt",
        ],
    ));
    lines.extend(add_section(
        "Search",
        &[
            "/ opens search (scans only the selected range)",
            "Enter runs; Enter again jumps to the highlighted hit",
            "results stream in while later chunks still load",
        ],
    ));
    lines.extend(add_section(
        "Misc",
        &[
            "y copies the active message anchor",
            "F2 theme | arrows/PgUp/PgDn scroll | q quits",
        ],
    ));
    lines
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(r);
    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(popup_layout[1]);
    horizontal[1]
}

/// Enhancement pass for one rendered message. Failures here must never take
/// the rest of the batch down; the caller falls back to the raw timestamp.
fn enhance_timestamp(ts: &str) -> Result<String> {
    let parsed = parse_rfc3339(ts).context("unparseable timestamp")?;
    Ok(parsed
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string())
}

fn copy_to_clipboard(text: &str) -> bool {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        use std::io::Write;
        use std::process::{Command, Stdio};
        let child = Command::new("sh")
            .arg("-c")
            .arg("if command -v wl-copy >/dev/null; then wl-copy; elif command -v pbcopy >/dev/null; then pbcopy; elif command -v xclip >/dev/null; then xclip -selection clipboard; fi")
            .stdin(Stdio::piped())
            .spawn();
        if let Ok(mut child) = child
            && let Some(mut stdin) = child.stdin.take()
        {
            let _ = stdin.write_all(text.as_bytes());
            drop(stdin);
            let _ = child.wait();
            return true;
        }
        false
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = text;
        false
    }
}

struct App {
    meta: Arc<ViewerMeta>,
    store: Arc<ChunkStore>,
    rt: tokio::runtime::Handle,
    tx: Sender<AppEvent>,
    state: ViewerState,
    groups: Vec<GroupView>,
    minimap: MinimapView,
    brush: BrushState,
    overlay: Overlay,
    search: SearchUi,
    pending_bracket: Option<PendingBracket>,
    nav_gen: u64,
    /// Range loads spawned but not yet acknowledged; drives the loading
    /// indicator and the headless idle check.
    awaiting_ranges: usize,
    /// Message to scroll into view once its lines exist.
    pending_focus: Option<usize>,
    scroll: usize,
    view_height: usize,
    hover: Option<usize>,
    chart_area: Rect,
    status: String,
    theme_dark: bool,
    help_scroll: u16,
    needs_draw: bool,
    quit: bool,
}

impl App {
    fn new(
        meta: Arc<ViewerMeta>,
        store: Arc<ChunkStore>,
        rt: tokio::runtime::Handle,
        tx: Sender<AppEvent>,
        theme_dark: bool,
    ) -> Self {
        let total = meta.total;
        let groups = meta.groups.iter().map(|_| GroupView::new()).collect();
        Self {
            meta,
            store,
            rt,
            tx,
            state: ViewerState::new(total),
            groups,
            minimap: MinimapView::new(),
            brush: BrushState::default(),
            overlay: Overlay::None,
            search: SearchUi::default(),
            pending_bracket: None,
            nav_gen: 0,
            awaiting_ranges: 0,
            pending_focus: None,
            scroll: 0,
            view_height: 0,
            hover: None,
            chart_area: Rect::default(),
            status: "? for help, / to search".to_string(),
            theme_dark,
            help_scroll: 0,
            needs_draw: true,
            quit: false,
        }
    }

    fn palette(&self) -> ThemePalette {
        if self.theme_dark {
            ThemePalette::dark()
        } else {
            ThemePalette::light()
        }
    }

    // ---- navigation -----------------------------------------------------

    fn navigate_to(&mut self, index: usize) {
        if self.meta.total == 0 {
            return;
        }
        let target = self.state.clamp_target(index);
        let Some(group) = self.meta.group_for(target) else {
            self.status = format!("message {target} sits outside every conversation");
            self.needs_draw = true;
            return;
        };
        self.groups[group].open = true;
        self.nav_gen += 1;
        self.spawn_range_load(group, self.nav_gen, Some(target));
        if let Some(id) = self.meta.ids.get(target) {
            self.status = format!("→ {id}");
        }
        self.needs_draw = true;
    }

    fn spawn_range_load(&mut self, group: usize, nav_gen: u64, focus: Option<usize>) {
        self.awaiting_ranges += 1;
        let span = &self.meta.groups[group];
        let (start, end) = (span.start, span.end);
        let store = Arc::clone(&self.store);
        let tx = self.tx.clone();
        self.rt.spawn(async move {
            store.ensure(start, end).await;
            let _ = tx.send(AppEvent::RangeReady {
                group,
                nav_gen,
                focus,
            });
        });
    }

    fn toggle_group(&mut self, group: usize) {
        let mut needs_load = false;
        {
            let Some(gv) = self.groups.get_mut(group) else {
                return;
            };
            if gv.open {
                gv.open = false;
            } else {
                gv.open = true;
                gv.filtered = false;
                needs_load = !gv.loaded && gv.job.is_none();
            }
        }
        if needs_load {
            self.spawn_range_load(group, self.nav_gen, None);
        }
        self.needs_draw = true;
    }

    fn step_active(&mut self, delta: isize) {
        let from = self
            .state
            .active
            .unwrap_or(self.state.selection.start) as isize;
        let next = (from + delta).max(0) as usize;
        self.navigate_to(next);
    }

    fn jump_by_kind(&mut self, pending: PendingBracket, key: char) -> bool {
        let Some(kind) = nav::kind_for_key(key) else {
            return false;
        };
        let from = self.state.active.unwrap_or(self.state.selection.start);
        match nav::next_of_kind(&self.meta, self.state.selection, from, pending.direction, kind) {
            Some(index) => self.navigate_to(index),
            None => {
                let way = match pending.direction {
                    ScanDirection::Forward => "after this",
                    ScanDirection::Backward => "before this",
                };
                self.status = format!("no {} message {way}", kind.label());
                self.needs_draw = true;
            }
        }
        true
    }

    // ---- selection ------------------------------------------------------

    fn apply_selection_filter(&mut self) {
        let sel = self.state.selection;
        for (g, span) in self.meta.groups.iter().enumerate() {
            let visible = sel.overlaps(span.start, span.end);
            let gv = &mut self.groups[g];
            gv.filtered = !visible;
            if !visible {
                gv.open = false;
            }
        }
        self.status = format!("selection {}..{}", sel.start, sel.end);
        self.needs_draw = true;
    }

    // ---- search ---------------------------------------------------------

    fn submit_search(&mut self) {
        if let Some(token) = self.search.cancel.take() {
            token.cancel();
        }
        self.search.generation += 1;
        self.search.hits.clear();
        self.search.selected = 0;
        self.search.running = true;
        self.search.status = "searching…".to_string();
        let query = self.search.input.trim().to_string();
        self.search.last_submitted = Some(query.clone());
        let cancel = CancelToken::default();
        self.search.cancel = Some(cancel.clone());
        let generation = self.search.generation;
        let tx = self.tx.clone();
        self.rt.spawn(run_search(
            Arc::clone(&self.meta),
            Arc::clone(&self.store),
            self.state.selection,
            query,
            cancel,
            move |event| {
                let _ = tx.send(AppEvent::Search { generation, event });
            },
        ));
    }

    // ---- app events ------------------------------------------------------

    fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::RangeReady {
                group,
                nav_gen,
                focus,
            } => {
                self.awaiting_ranges = self.awaiting_ranges.saturating_sub(1);
                let needs_render = self
                    .groups
                    .get(group)
                    .is_some_and(|gv| !gv.loaded && gv.job.is_none());
                if needs_render {
                    self.start_render(group);
                }
                if let Some(index) = focus
                    && nav_gen == self.nav_gen
                {
                    let id = self.meta.ids.get(index).cloned().unwrap_or_default();
                    self.state.set_active(index, id);
                    self.pending_focus = Some(index);
                }
                self.needs_draw = true;
            }
            AppEvent::Search { generation, event } => {
                if generation != self.search.generation {
                    return; // stale stream from a superseded search
                }
                match event {
                    SearchEvent::Status(message) => {
                        self.search.running = false;
                        self.search.status = message;
                    }
                    SearchEvent::Hits {
                        found_so_far,
                        batch,
                    } => {
                        self.search.hits.extend(batch);
                        self.search.status = format!("{found_so_far} found so far…");
                    }
                    SearchEvent::Done { total } => {
                        self.search.running = false;
                        self.search.status = if total == 0 {
                            "no matches in selection".to_string()
                        } else {
                            format!("{total} matches")
                        };
                    }
                }
                self.needs_draw = true;
            }
        }
    }

    // ---- incremental rendering ------------------------------------------

    fn start_render(&mut self, group: usize) {
        let span = &self.meta.groups[group];
        let (start, end) = (span.start, span.end);
        let gv = &mut self.groups[group];
        // restart cleanly: prior content goes away before the first batch
        gv.lines.clear();
        gv.tags.clear();
        gv.loaded = false;
        gv.job = Some(RenderJob { next: start, end });
    }

    /// One batch per open job per tick.
    fn pump_render_jobs(&mut self) {
        let palette = self.palette();
        for g in 0..self.groups.len() {
            let Some(job) = self.groups[g].job else {
                continue;
            };
            let stop = (job.next + RENDER_BATCH).min(job.end + 1);
            for index in job.next..stop {
                match self.store.item_html(index) {
                    Some(fragment) => self.append_message(g, index, &fragment, palette),
                    // absent chunk: skip rather than block the batch
                    None => tracing::trace!(index, "fragment not yet available"),
                }
            }
            let gv = &mut self.groups[g];
            if stop > job.end {
                gv.job = None;
                gv.loaded = true;
                tracing::debug!(group = g, lines = gv.lines.len(), "conversation rendered");
            } else {
                gv.job = Some(RenderJob {
                    next: stop,
                    end: job.end,
                });
            }
            self.needs_draw = true;
        }
        self.resolve_pending_focus();
    }

    fn append_message(&mut self, group: usize, index: usize, fragment: &str, palette: ThemePalette) {
        let kind = self.meta.kind_at(index);
        let ts = self.meta.ts.get(index).map(String::as_str).unwrap_or("");
        let shown_ts = enhance_timestamp(ts).unwrap_or_else(|err| {
            tracing::debug!(index, error = %err, "timestamp enhancement failed");
            ts.to_string()
        });
        let gv = &mut self.groups[group];
        gv.lines.push(Line::from(vec![
            Span::styled(
                format!("▌ {}", kind.label()),
                palette.kind_style(kind).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  {shown_ts}"), palette.hint_style()),
        ]));
        gv.tags.push(LineTag::Header(index));
        let text = html_to_text(fragment);
        for line in text.lines() {
            gv.lines.push(Line::from(Span::raw(format!("  {line}"))));
            gv.tags.push(LineTag::Body(index));
        }
        gv.lines.push(Line::from(""));
        gv.tags.push(LineTag::Blank);
    }

    fn resolve_pending_focus(&mut self) {
        let Some(target) = self.pending_focus else {
            return;
        };
        let Some(group) = self.meta.group_for(target) else {
            self.pending_focus = None;
            return;
        };
        let Some(pos) = self.groups[group]
            .tags
            .iter()
            .position(|t| *t == LineTag::Header(target))
        else {
            return; // not rendered yet; retry next tick
        };
        let line = self.group_content_offset(group) + pos;
        let third = self.view_height.max(3) / 3;
        self.scroll = line.saturating_sub(third);
        self.pending_focus = None;
        self.needs_draw = true;
    }

    /// Absolute display line of a group's first content line (its header
    /// occupies the line above).
    fn group_content_offset(&self, group: usize) -> usize {
        let mut y = 0usize;
        for (g, gv) in self.groups.iter().enumerate() {
            if gv.filtered {
                continue;
            }
            y += 1; // header
            if g == group {
                return y;
            }
            if gv.open {
                y += gv.lines.len();
                if gv.job.is_some() {
                    y += 1; // loading marker
                }
            }
            y += 1; // spacer
        }
        y
    }

    fn doc_height(&self) -> usize {
        let mut y = 0usize;
        for gv in &self.groups {
            if gv.filtered {
                continue;
            }
            y += 2; // header + spacer
            if gv.open {
                y += gv.lines.len();
                if gv.job.is_some() {
                    y += 1;
                }
            }
        }
        y
    }

    fn clamp_scroll(&mut self) {
        let max = self.doc_height().saturating_sub(self.view_height.max(1));
        self.scroll = self.scroll.min(max);
    }

    fn expire_pending_bracket(&mut self) {
        if let Some(p) = self.pending_bracket
            && p.expired()
        {
            self.pending_bracket = None;
            self.needs_draw = true;
        }
    }

    // ---- input -----------------------------------------------------------

    fn handle_key(&mut self, key: KeyEvent) {
        self.needs_draw = true;
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }
        match self.overlay {
            Overlay::Help => self.handle_key_help(key),
            Overlay::Search => self.handle_key_search(key),
            Overlay::None => self.handle_key_main(key),
        }
    }

    fn handle_key_help(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc | KeyCode::Char('?') | KeyCode::F(1) => {
                self.overlay = Overlay::None;
                self.help_scroll = 0;
            }
            KeyCode::Up => self.help_scroll = self.help_scroll.saturating_sub(1),
            KeyCode::Down => self.help_scroll = self.help_scroll.saturating_add(1),
            KeyCode::PageUp => self.help_scroll = self.help_scroll.saturating_sub(5),
            KeyCode::PageDown => self.help_scroll = self.help_scroll.saturating_add(5),
            _ => {}
        }
    }

    fn handle_key_search(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.overlay = Overlay::None;
            }
            KeyCode::Enter => {
                let current = self.search.input.trim().to_string();
                let resubmit = self.search.last_submitted.as_deref() != Some(current.as_str());
                if resubmit {
                    self.submit_search();
                } else if let Some(hit) = self.search.hits.get(self.search.selected) {
                    let index = hit.index;
                    self.overlay = Overlay::None;
                    self.navigate_to(index);
                }
            }
            KeyCode::Up => {
                self.search.selected = self.search.selected.saturating_sub(1);
            }
            KeyCode::Down => {
                if self.search.selected + 1 < self.search.hits.len() {
                    self.search.selected += 1;
                }
            }
            KeyCode::Backspace => {
                self.search.input.pop();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.search.input.push(c);
            }
            _ => {}
        }
    }

    fn handle_key_main(&mut self, key: KeyEvent) {
        // an armed bracket consumes the immediately following kind key
        if let Some(pending) = self.pending_bracket.take()
            && !pending.expired()
            && let KeyCode::Char(c) = key.code
            && self.jump_by_kind(pending, c)
        {
            return;
        }
        match key.code {
            KeyCode::Char('q') => self.quit = true,
            KeyCode::Char('?') | KeyCode::F(1) => {
                self.overlay = Overlay::Help;
                self.help_scroll = 0;
            }
            KeyCode::Esc => {} // nothing open to close
            KeyCode::Char('/') => {
                self.overlay = Overlay::Search;
            }
            KeyCode::Char('n') | KeyCode::Char('j') => self.step_active(1),
            KeyCode::Char('p') | KeyCode::Char('k') => self.step_active(-1),
            KeyCode::Char('g') => self.navigate_to(self.state.selection.start),
            KeyCode::Char('G') => self.navigate_to(self.state.selection.end),
            KeyCode::Char(']') => {
                self.pending_bracket = Some(PendingBracket::arm(ScanDirection::Forward));
                self.status = "] armed: a/u/t/r/s picks the kind".to_string();
            }
            KeyCode::Char('[') => {
                self.pending_bracket = Some(PendingBracket::arm(ScanDirection::Backward));
                self.status = "[ armed: a/u/t/r/s picks the kind".to_string();
            }
            KeyCode::Char('o') | KeyCode::Enter => {
                let group = self
                    .state
                    .active
                    .and_then(|i| self.meta.group_for(i))
                    .or_else(|| {
                        self.groups
                            .iter()
                            .position(|g| !g.filtered)
                    });
                if let Some(group) = group {
                    self.toggle_group(group);
                }
            }
            KeyCode::Char('y') => {
                if let Some(anchor) = self.state.anchor.clone() {
                    if copy_to_clipboard(&anchor) {
                        self.status = format!("copied {anchor}");
                    } else {
                        self.status = "clipboard copy failed (missing tool?)".to_string();
                    }
                } else {
                    self.status = "nothing navigated yet".to_string();
                }
            }
            KeyCode::F(2) => {
                self.theme_dark = !self.theme_dark;
            }
            KeyCode::Up => {
                self.scroll = self.scroll.saturating_sub(1);
            }
            KeyCode::Down => {
                self.scroll = self.scroll.saturating_add(1);
                self.clamp_scroll();
            }
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(self.view_height.max(1)),
            KeyCode::PageDown => {
                self.scroll = self.scroll.saturating_add(self.view_height.max(1));
                self.clamp_scroll();
            }
            KeyCode::Home => self.scroll = 0,
            KeyCode::End => {
                self.scroll = usize::MAX;
                self.clamp_scroll();
            }
            _ => {}
        }
    }

    fn handle_mouse(&mut self, me: MouseEvent) {
        let chart = self.chart_area;
        let inside = chart.width > 0
            && me.column >= chart.x
            && me.column < chart.x + chart.width
            && me.row >= chart.y
            && me.row < chart.y + chart.height;
        let columns = self.minimap.bin_count().max(1);
        match me.kind {
            MouseEventKind::Down(MouseButton::Left) if inside => {
                let col = (me.column - chart.x) as usize;
                match self.brush.on_press(
                    col,
                    columns,
                    &mut self.state.selection,
                    self.meta.total,
                ) {
                    BrushAction::Reset => self.apply_selection_filter(),
                    BrushAction::DragStarted => self.needs_draw = true,
                    BrushAction::None => {}
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                if self.brush.dragging() && chart.width > 0 {
                    let col = me
                        .column
                        .clamp(chart.x, chart.x + chart.width - 1)
                        - chart.x;
                    if self.brush.on_drag(
                        col as usize,
                        columns,
                        &mut self.state.selection,
                        self.meta.total,
                    ) {
                        self.apply_selection_filter();
                    }
                }
            }
            MouseEventKind::Up(MouseButton::Left) => self.brush.on_release(),
            MouseEventKind::Moved => {
                let hover = inside.then(|| (me.column - chart.x) as usize);
                if hover != self.hover {
                    self.hover = hover;
                    self.needs_draw = true;
                }
            }
            MouseEventKind::ScrollUp => {
                self.scroll = self.scroll.saturating_sub(3);
                self.needs_draw = true;
            }
            MouseEventKind::ScrollDown => {
                self.scroll = self.scroll.saturating_add(3);
                self.clamp_scroll();
                self.needs_draw = true;
            }
            _ => {}
        }
    }

    // ---- drawing ---------------------------------------------------------

    fn draw(&mut self, f: &mut Frame) {
        let palette = self.palette();
        let area = f.area();
        let show_minimap = area.height >= MIN_ROWS_FOR_MINIMAP;
        let minimap_rows = if show_minimap { 6 } else { 0 };
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints(
                [
                    Constraint::Length(1),
                    Constraint::Length(minimap_rows),
                    Constraint::Min(0),
                    Constraint::Length(1),
                ]
                .as_ref(),
            )
            .split(area);

        self.draw_title(f, rows[0], palette);
        if show_minimap {
            self.draw_minimap(f, rows[1], palette);
        } else {
            self.chart_area = Rect::default();
        }
        self.draw_transcript(f, rows[2], palette);
        self.draw_footer(f, rows[3], palette);

        if show_minimap
            && let Some(col) = self.hover
            && !self.brush.dragging()
        {
            self.draw_tooltip(f, rows[2], col, palette);
        }
        match self.overlay {
            Overlay::Help => self.draw_help(f, palette),
            Overlay::Search => self.draw_search(f, palette),
            Overlay::None => {}
        }
    }

    fn draw_title(&self, f: &mut Frame, area: Rect, palette: ThemePalette) {
        let loading = self.awaiting_ranges > 0 || self.groups.iter().any(|g| g.job.is_some());
        let mut title = format!(
            "transcript · {} conversations · {} messages",
            self.meta.groups.len(),
            self.meta.total
        );
        if loading {
            title.push_str(" · loading…");
        }
        f.render_widget(
            Paragraph::new(Line::from(Span::styled(title, palette.title()))),
            area,
        );
    }

    fn draw_minimap(&mut self, f: &mut Frame, area: Rect, palette: ThemePalette) {
        let block = Block::default()
            .title(Span::styled("minimap", palette.hint_style()))
            .borders(Borders::ALL)
            .border_style(palette.border_style());
        let inner = block.inner(area);
        f.render_widget(block, area);
        self.chart_area = inner;
        if inner.width == 0 || inner.height == 0 {
            return;
        }
        self.minimap.ensure_bins(&self.meta, inner.width);
        let buf = f.buffer_mut();
        self.minimap
            .paint(inner, buf, palette, self.state.active);

        // brush geometry: dim everything outside the selection, bar the handles
        let columns = self.minimap.bin_count();
        if columns == 0 {
            return;
        }
        let (start_col, end_col) =
            BrushState::handle_columns(self.state.selection, columns, self.meta.total);
        for col in 0..inner.width as usize {
            let outside = col < start_col || col > end_col;
            if !outside {
                continue;
            }
            for row in 0..inner.height {
                if let Some(cell) = buf.cell_mut((inner.x + col as u16, inner.y + row)) {
                    cell.set_style(Style::default().add_modifier(Modifier::DIM));
                }
            }
        }
        for col in [start_col, end_col] {
            let x = inner.x + (col as u16).min(inner.width.saturating_sub(1));
            for row in 0..inner.height {
                if let Some(cell) = buf.cell_mut((x, inner.y + row)) {
                    cell.set_char('┃');
                    cell.set_fg(palette.accent_alt);
                }
            }
        }
    }

    fn draw_transcript(&mut self, f: &mut Frame, area: Rect, palette: ThemePalette) {
        self.view_height = area.height as usize;
        self.clamp_scroll();
        let lines = self.visible_lines(area.height as usize, palette);
        if lines.is_empty() {
            let hint = if self.meta.total == 0 {
                "empty transcript"
            } else {
                "no conversations overlap the selection (double-click the minimap to reset)"
            };
            f.render_widget(
                Paragraph::new(hint).style(palette.hint_style()),
                area,
            );
            return;
        }
        f.render_widget(Paragraph::new(lines), area);
    }

    fn visible_lines(&self, height: usize, palette: ThemePalette) -> Vec<Line<'static>> {
        let from = self.scroll;
        let to = from + height;
        let mut out: Vec<Line<'static>> = Vec::with_capacity(height);
        let mut y = 0usize;
        for (g, gv) in self.groups.iter().enumerate() {
            if gv.filtered {
                continue;
            }
            if y >= to {
                break;
            }
            if y >= from && y < to {
                out.push(self.group_header_line(g, palette));
            }
            y += 1;
            if gv.open {
                for (i, line) in gv.lines.iter().enumerate() {
                    let vy = y + i;
                    if vy >= to {
                        break;
                    }
                    if vy >= from {
                        let mut line = line.clone();
                        if let Some(active) = self.state.active
                            && gv.tags.get(i) == Some(&LineTag::Header(active))
                        {
                            line.style = Style::default().add_modifier(Modifier::REVERSED);
                        }
                        out.push(line);
                    }
                }
                y += gv.lines.len();
                if gv.job.is_some() {
                    if y >= from && y < to {
                        out.push(Line::from(Span::styled(
                            "  … loading".to_string(),
                            palette.hint_style(),
                        )));
                    }
                    y += 1;
                }
            }
            if y >= from && y < to {
                out.push(Line::from(""));
            }
            y += 1;
        }
        out
    }

    fn group_header_line(&self, group: usize, palette: ThemePalette) -> Line<'static> {
        let span = &self.meta.groups[group];
        let gv = &self.groups[group];
        let marker = if gv.open { "▾" } else { "▸" };
        let count = span.end - span.start + 1;
        let duration = format_duration_ms(self.meta.group_duration_ms(group));
        Line::from(vec![
            Span::styled(
                format!("{marker} {} ", self.meta.group_label(group)),
                palette.title(),
            ),
            Span::styled(
                format!("· {count} messages · {duration} · "),
                palette.hint_style(),
            ),
            Span::raw(self.meta.prompt_preview(group, 90)),
        ])
    }

    fn draw_footer(&self, f: &mut Frame, area: Rect, palette: ThemePalette) {
        let sel = self.state.selection;
        let anchor = self.state.anchor.as_deref().unwrap_or("-");
        let line = format!(
            "{} | sel {}..{} | anchor {} | {}",
            self.status,
            sel.start,
            sel.end,
            anchor,
            footer_legend()
        );
        f.render_widget(Paragraph::new(line).style(palette.hint_style()), area);
    }

    fn draw_tooltip(&self, f: &mut Frame, below: Rect, col: usize, palette: ThemePalette) {
        let lines = self.minimap.tooltip(&self.meta, col);
        if lines.is_empty() || below.height < 4 {
            return;
        }
        let width = lines
            .iter()
            .map(|l| l.chars().count() as u16 + 2)
            .max()
            .unwrap_or(20)
            .min(below.width.max(20))
            .max(20);
        let x = (self.chart_area.x + col as u16)
            .min(below.right().saturating_sub(width))
            .max(below.x);
        let area = Rect {
            x,
            y: below.y,
            width,
            height: (lines.len() as u16 + 2).min(below.height),
        };
        let text: Vec<Line> = lines.into_iter().map(Line::from).collect();
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new(text)
                .wrap(Wrap { trim: true })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(palette.border_style()),
                ),
            area,
        );
    }

    fn draw_help(&self, f: &mut Frame, palette: ThemePalette) {
        let popup = centered_rect(70, 70, f.area());
        let block = Block::default()
            .title(Span::styled("Help / Shortcuts", palette.title()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.accent));
        f.render_widget(Clear, popup);
        f.render_widget(
            Paragraph::new(help_lines(palette))
                .block(block)
                .wrap(Wrap { trim: true })
                .scroll((self.help_scroll, 0)),
            popup,
        );
    }

    fn draw_search(&self, f: &mut Frame, palette: ThemePalette) {
        let popup = centered_rect(70, 60, f.area());
        let block = Block::default()
            .title(Span::styled("Search (selection only)", palette.title()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(palette.accent));
        let inner = block.inner(popup);
        f.render_widget(Clear, popup);
        f.render_widget(block, popup);
        if inner.height < 3 {
            return;
        }
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints(
                [
                    Constraint::Length(1),
                    Constraint::Length(1),
                    Constraint::Min(0),
                ]
                .as_ref(),
            )
            .split(inner);
        f.render_widget(
            Paragraph::new(Line::from(vec![
                Span::styled("> ", palette.title()),
                Span::raw(self.search.input.clone()),
                Span::styled("▏", palette.hint_style()),
            ])),
            rows[0],
        );
        f.render_widget(
            Paragraph::new(self.search.status.clone()).style(palette.hint_style()),
            rows[1],
        );

        let height = rows[2].height as usize;
        let first = self
            .search
            .selected
            .saturating_sub(height.saturating_sub(1));
        let mut lines: Vec<Line> = Vec::new();
        for (i, hit) in self.search.hits.iter().enumerate().skip(first).take(height) {
            let selected = i == self.search.selected;
            let pointer = if selected { "▶ " } else { "  " };
            let snip = &hit.snippet;
            let mut spans = vec![
                Span::styled(pointer.to_string(), palette.title()),
                Span::styled(format!("{:>6} ", hit.index), palette.hint_style()),
                Span::styled(
                    format!("{:<10} ", hit.kind.label()),
                    palette.kind_style(hit.kind),
                ),
            ];
            if snip.clipped_start {
                spans.push(Span::styled("…".to_string(), palette.hint_style()));
            }
            spans.push(Span::raw(snip.before.clone()));
            if !snip.matched.is_empty() {
                spans.push(Span::styled(
                    snip.matched.clone(),
                    palette.highlight_style(),
                ));
            }
            spans.push(Span::raw(snip.after.clone()));
            if snip.clipped_end {
                spans.push(Span::styled("…".to_string(), palette.hint_style()));
            }
            let mut line = Line::from(spans);
            if selected {
                line.style = Style::default().add_modifier(Modifier::BOLD);
            }
            lines.push(line);
        }
        if lines.is_empty() && !self.search.running {
            lines.push(Line::from(Span::styled(
                "no results".to_string(),
                palette.hint_style(),
            )));
        }
        f.render_widget(Paragraph::new(lines), rows[2]);
    }
}

/// Opens a bundle in the interactive viewer. A missing or malformed bundle
/// degrades to a one-line notice instead of an error: the viewer simply
/// never activates.
pub fn run_viewer(bundle: PathBuf, anchor: Option<String>, once: bool) -> Result<()> {
    let Some(meta) = ViewerMeta::load(&bundle) else {
        println!(
            "no viewable transcript bundle at {} (missing or malformed meta.json)",
            bundle.display()
        );
        return Ok(());
    };
    let meta = Arc::new(meta);
    let rt = tokio::runtime::Runtime::new()?;
    let store = ChunkStore::new(Arc::clone(&meta), Some(bundle));
    let (tx, rx) = unbounded();

    let state_path = state_path_for(&crate::default_data_dir());
    let persisted = load_state(&state_path);
    let theme_dark = persisted.theme.as_deref() != Some("light");

    let mut app = App::new(meta, store, rt.handle().clone(), tx, theme_dark);
    if let Some(anchor) = anchor {
        match app.meta.anchor_index(&anchor) {
            Some(index) => app.navigate_to(index),
            // unresolvable anchors are silently ignored
            None => tracing::debug!(anchor = %anchor, "anchor not present in bundle"),
        }
    }

    if once {
        return run_once(&mut app, &rx);
    }

    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut app, &mut terminal, &rx);

    save_state(
        &state_path,
        &ViewerStatePersisted {
            theme: Some(if app.theme_dark { "dark" } else { "light" }.to_string()),
        },
    );
    teardown_terminal()?;
    result
}

fn event_loop(
    app: &mut App,
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    rx: &Receiver<AppEvent>,
) -> Result<()> {
    while !app.quit {
        while let Ok(ev) = rx.try_recv() {
            app.handle_app_event(ev);
        }
        app.expire_pending_bracket();
        app.pump_render_jobs();
        if app.needs_draw {
            terminal.draw(|f| app.draw(f))?;
            app.needs_draw = false;
        }
        if event::poll(TICK_RATE)? {
            match event::read()? {
                Event::Key(key) => app.handle_key(key),
                Event::Mouse(me) => app.handle_mouse(me),
                Event::Resize(_, _) => app.needs_draw = true,
                _ => {}
            }
        }
    }
    Ok(())
}

/// Headless single render for CI and scripting: pumps pending loads briefly,
/// draws one frame into an in-memory backend and prints a summary line.
fn run_once(app: &mut App, rx: &Receiver<AppEvent>) -> Result<()> {
    let deadline = Instant::now() + Duration::from_millis(750);
    loop {
        while let Ok(ev) = rx.try_recv() {
            app.handle_app_event(ev);
        }
        app.pump_render_jobs();
        let idle = app.awaiting_ranges == 0
            && app.pending_focus.is_none()
            && app.groups.iter().all(|g| g.job.is_none());
        if idle || Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(Duration::from_millis(15));
    }
    let backend = ratatui::backend::TestBackend::new(120, 36);
    let mut terminal = Terminal::new(backend)?;
    terminal.draw(|f| app.draw(f))?;
    println!(
        "{} conversations · {} messages · {} chunks loaded",
        app.meta.groups.len(),
        app.meta.total,
        app.store.loaded_count()
    );
    Ok(())
}

fn teardown_terminal() -> Result<()> {
    let mut stdout = io::stdout();
    disable_raw_mode()?;
    execute!(stdout, LeaveAlternateScreen, DisableMouseCapture)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn state_roundtrip_persists_theme() {
        let dir = TempDir::new().unwrap();
        let path = state_path_for(dir.path());
        save_state(
            &path,
            &ViewerStatePersisted {
                theme: Some("light".into()),
            },
        );
        let loaded = load_state(&path);
        assert_eq!(loaded.theme.as_deref(), Some("light"));
        // absent or corrupt files fall back to defaults
        assert!(load_state(&dir.path().join("nope.json")).theme.is_none());
    }

    #[test]
    fn footer_mentions_core_keys() {
        let legend = footer_legend();
        assert!(legend.contains("? help"));
        assert!(legend.contains("/ search"));
        assert!(legend.contains("q quit"));
    }

    #[test]
    fn timestamp_enhancement_swallows_bad_input() {
        assert!(enhance_timestamp("2026-01-02T10:00:05+00:00").is_ok());
        assert!(enhance_timestamp("garbage").is_err());
    }
}
