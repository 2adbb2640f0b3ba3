// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use dispatchdesk_app::{
    BlurOutcome, BlurPolicy, CellAddress, Column, ColumnLayout, Committed, EditableCellController,
    EditableColumns, FetchCompletion, FetchOrigin, FetchOutcome, FetchRequest, FetchSettings,
    Generation, GridDataStore, GridView, LazySelectField, NestedSelectionController, OptionSource,
    PersonalizationDocument, RowPath, SaveMode, SelectMode, SelectionKind, SelectionMode,
    ServerUpdateCompletion, ServerUpdateRequest, SortDirection, UpdateOutcome,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table};
use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

const FILTER_COLUMN: &str = "customer";
const STATUS_TTL: Duration = Duration::from_secs(4);
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const EXPANDED_MARK: &str = "▾";
const COLLAPSED_MARK: &str = "▸";
const SELECTED_MARK: &str = "●";
const NESTED_MARK: &str = "└";
const SORT_ASC_MARK: &str = "▲";
const SORT_DESC_MARK: &str = "▼";

/// Collaborators the screen reaches through while it runs.
pub trait ScreenRuntime {
    fn option_source(&self) -> Arc<dyn OptionSource>;
    fn save_layout(&mut self, layout: &ColumnLayout) -> Result<SaveMode>;
    fn update_row(&mut self, request: &ServerUpdateRequest) -> Result<()>;
    fn spawn_update(
        &mut self,
        request: ServerUpdateRequest,
        tx: Sender<ServerUpdateCompletion>,
    ) -> Result<()> {
        let result = self
            .update_row(&request)
            .map_err(|error| format!("{error:#}"));
        tx.send(ServerUpdateCompletion {
            ticket: request.ticket,
            address: request.address,
            result,
        })
        .map_err(|_| anyhow!("row update receiver closed"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenSettings {
    pub selection: SelectionMode,
    pub blur: BlurPolicy,
    pub fetch: FetchSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenMode {
    #[default]
    Nav,
    Edit,
    Filter,
}

impl ScreenMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Nav => "NAV",
            Self::Edit => "EDIT",
            Self::Filter => "FILTER",
        }
    }
}

/// One rendered line: a parent row, or a nested row under an expanded parent.
/// Indices are store indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayLine {
    Parent(usize),
    Nested { parent: usize, nested: usize },
}

impl DisplayLine {
    fn path(self) -> RowPath {
        match self {
            Self::Parent(index) => RowPath::parent(index),
            Self::Nested { parent, nested } => RowPath::nested(parent, nested),
        }
    }
}

#[derive(Debug)]
pub struct EventChannels {
    fetch_tx: Sender<FetchCompletion>,
    fetch_rx: Receiver<FetchCompletion>,
    update_tx: Sender<ServerUpdateCompletion>,
    update_rx: Receiver<ServerUpdateCompletion>,
}

impl EventChannels {
    pub fn new() -> Self {
        let (fetch_tx, fetch_rx) = mpsc::channel();
        let (update_tx, update_rx) = mpsc::channel();
        Self {
            fetch_tx,
            fetch_rx,
            update_tx,
            update_rx,
        }
    }
}

impl Default for EventChannels {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScreenState {
    title: String,
    store: GridDataStore,
    view: GridView,
    layout: ColumnLayout,
    selection: NestedSelectionController,
    editor: EditableCellController,
    filter: LazySelectField,
    expanded: BTreeSet<usize>,
    cursor_line: usize,
    cursor_column: usize,
    mode: ScreenMode,
    status: Option<(String, Instant)>,
}

impl ScreenState {
    pub fn new(
        title: impl Into<String>,
        store: GridDataStore,
        settings: ScreenSettings,
        personalization: Option<&PersonalizationDocument>,
    ) -> Self {
        let layout = ColumnLayout::resolve(store.columns(), personalization);
        let selection = NestedSelectionController::for_store(settings.selection, &store);
        let filter = LazySelectField::new(
            FetchOrigin::new(FILTER_COLUMN, Generation::unique()),
            SelectMode::Single,
            settings.fetch,
        );
        Self {
            title: title.into(),
            store,
            view: GridView::default(),
            layout,
            selection,
            editor: EditableCellController::new(EditableColumns::All, settings.blur),
            filter,
            expanded: BTreeSet::new(),
            cursor_line: 0,
            cursor_column: 0,
            mode: ScreenMode::Nav,
            status: None,
        }
    }

    pub fn store(&self) -> &GridDataStore {
        &self.store
    }

    pub fn view(&self) -> &GridView {
        &self.view
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn selection(&self) -> &NestedSelectionController {
        &self.selection
    }

    pub fn editor(&self) -> &EditableCellController {
        &self.editor
    }

    pub fn filter(&self) -> &LazySelectField {
        &self.filter
    }

    pub fn mode(&self) -> ScreenMode {
        self.mode
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.cursor_line, self.cursor_column)
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_ref().map(|(message, _)| message.as_str())
    }

    pub fn is_expanded(&self, parent: usize) -> bool {
        self.expanded.contains(&parent)
    }

    /// Swaps in a new row set. Expansion is reset and the selection is
    /// re-derived from the new rows.
    pub fn replace_rows(&mut self, rows: Vec<dispatchdesk_app::Row>) {
        self.store.set_rows(rows);
        self.expanded.clear();
        self.selection.resync(&self.store);
        self.clamp_cursor();
    }

    pub fn display_lines(&self) -> Vec<DisplayLine> {
        let mut lines = Vec::new();
        for parent in self.view.project(&self.store) {
            lines.push(DisplayLine::Parent(parent));
            if self.expanded.contains(&parent) {
                let count = self.store.nested_rows(parent).len();
                lines.extend((0..count).map(|nested| DisplayLine::Nested { parent, nested }));
            }
        }
        lines
    }

    pub fn current_line(&self) -> Option<DisplayLine> {
        self.display_lines().get(self.cursor_line).copied()
    }

    fn columns_for(&self, line: DisplayLine) -> Vec<&Column> {
        match line {
            DisplayLine::Parent(_) => self.layout.visible(),
            DisplayLine::Nested { .. } => self.layout.sub_row_columns().iter().collect(),
        }
    }

    /// The cell under the cursor. The column index is clamped to the line's
    /// own column set, since nested lines carry fewer columns.
    pub fn current_address(&self) -> Option<CellAddress> {
        let line = self.current_line()?;
        let columns = self.columns_for(line);
        let column = columns.get(self.cursor_column.min(columns.len().checked_sub(1)?))?;
        Some(CellAddress::new(line.path(), column.key.clone()))
    }

    fn set_status(&mut self, message: impl Into<String>, now: Instant) {
        self.status = Some((message.into(), now));
    }

    fn expire_status(&mut self, now: Instant) {
        if let Some((_, set_at)) = &self.status
            && now.saturating_duration_since(*set_at) >= STATUS_TTL
        {
            self.status = None;
        }
    }

    fn clamp_cursor(&mut self) {
        let lines = self.display_lines().len();
        self.cursor_line = self.cursor_line.min(lines.saturating_sub(1));
        let columns = self.layout.visible().len();
        self.cursor_column = self.cursor_column.min(columns.saturating_sub(1));
    }

    fn move_row(&mut self, delta: isize) {
        let lines = self.display_lines().len();
        if lines == 0 {
            return;
        }
        self.cursor_line = self
            .cursor_line
            .saturating_add_signed(delta)
            .min(lines - 1);
    }

    fn move_column(&mut self, delta: isize) {
        let columns = self.layout.visible().len();
        if columns == 0 {
            return;
        }
        self.cursor_column = self
            .cursor_column
            .saturating_add_signed(delta)
            .min(columns - 1);
    }

    fn toggle_expand(&mut self, now: Instant) {
        let Some(line) = self.current_line() else {
            return;
        };
        let parent = match line {
            DisplayLine::Parent(parent) => parent,
            DisplayLine::Nested { parent, .. } => parent,
        };
        if self.store.nested_rows(parent).is_empty() {
            self.set_status("no nested rows", now);
            return;
        }
        if !self.expanded.remove(&parent) {
            self.expanded.insert(parent);
        }
        if let Some(position) = self
            .display_lines()
            .iter()
            .position(|line| *line == DisplayLine::Parent(parent))
        {
            self.cursor_line = position;
        }
    }

    fn toggle_selection(&mut self, now: Instant) {
        let changed = match self.current_line() {
            Some(DisplayLine::Parent(index)) => self.selection.toggle_row_in(&self.store, index),
            Some(DisplayLine::Nested { parent, nested }) => {
                self.selection.toggle_in(&self.store, parent, nested)
            }
            None => false,
        };
        if !changed && self.selection.mode() == SelectionMode::None {
            self.set_status("selection is off (m to change)", now);
        }
    }

    fn cycle_selection_mode(&mut self, now: Instant) {
        let next = match self.selection.mode() {
            SelectionMode::None => SelectionMode::Single,
            SelectionMode::Single => SelectionMode::Multi,
            SelectionMode::Multi => SelectionMode::None,
        };
        self.selection.set_mode(next);
        self.set_status(format!("selection {}", next.as_str()), now);
    }

    fn cycle_sort(&mut self, now: Instant) {
        let Some(column) = self
            .layout
            .visible()
            .get(self.cursor_column)
            .map(|column| column.key.clone())
        else {
            return;
        };
        if !self.view.cycle_sort(&self.store, &column) {
            self.set_status(format!("{column} is not sortable"), now);
            return;
        }
        self.clamp_cursor();
    }

    fn selection_summary(&self) -> String {
        match self.selection.kind() {
            SelectionKind::None => String::new(),
            SelectionKind::Rows => format!("{} rows", self.selection.row_selection().len()),
            SelectionKind::Nested => {
                let entries = self.selection.nested_selection();
                let parent = entries
                    .first()
                    .and_then(|entry| self.store.row(entry.parent_index))
                    .and_then(|row| {
                        self.store
                            .config()
                            .row_key
                            .as_deref()
                            .map(|key| row.value(key).display())
                    })
                    .unwrap_or_default();
                format!("{} legs of {parent}", entries.len())
            }
        }
    }
}

pub fn run_app<R: ScreenRuntime>(state: &mut ScreenState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    let channels = EventChannels::new();

    let mut result = Ok(());
    loop {
        tick(state, runtime, &channels, Instant::now());

        if let Err(error) = terminal.draw(|frame| render(frame, state)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = match event::poll(POLL_INTERVAL).context("poll event") {
            Ok(has_event) => has_event,
            Err(error) => {
                result = Err(error);
                break;
            }
        };
        if has_event {
            match event::read().context("read event") {
                Ok(Event::Key(key)) => {
                    if handle_key_event(state, runtime, &channels, key, Instant::now()) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

/// Fires due debounced searches, then applies whatever background work has
/// finished.
pub fn tick<R: ScreenRuntime>(
    state: &mut ScreenState,
    runtime: &mut R,
    channels: &EventChannels,
    now: Instant,
) {
    if let Some(request) = state.filter.poll(now) {
        dispatch_fetch(state, runtime, channels, request);
    }
    process_internal_events(state, channels, now);
    state.expire_status(now);
}

fn process_internal_events(state: &mut ScreenState, channels: &EventChannels, now: Instant) {
    while let Ok(completion) = channels.fetch_rx.try_recv() {
        if let FetchOutcome::Failed(message) = state.filter.apply(completion) {
            state.set_status(format!("customer search failed: {message}"), now);
        }
    }

    while let Ok(completion) = channels.update_rx.try_recv() {
        let column = completion.address.column.clone();
        match state.editor.complete_server_update(&state.store, completion) {
            UpdateOutcome::Confirmed => state.set_status(format!("{column} saved"), now),
            UpdateOutcome::Failed(message) => {
                state.set_status(format!("{column} not saved: {message}"), now);
            }
            UpdateOutcome::Discarded => {}
        }
    }
}

fn dispatch_fetch<R: ScreenRuntime>(
    state: &mut ScreenState,
    runtime: &R,
    channels: &EventChannels,
    request: FetchRequest,
) {
    let source = runtime.option_source();
    state
        .filter
        .client_mut()
        .dispatch(request, source.as_ref(), channels.fetch_tx.clone());
}

pub fn handle_key_event<R: ScreenRuntime>(
    state: &mut ScreenState,
    runtime: &mut R,
    channels: &EventChannels,
    key: KeyEvent,
    now: Instant,
) -> bool {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    match state.mode {
        ScreenMode::Edit => {
            handle_edit_key(state, runtime, channels, key, now);
            false
        }
        ScreenMode::Filter => {
            handle_filter_key(state, runtime, channels, key, now);
            false
        }
        ScreenMode::Nav => handle_nav_key(state, runtime, channels, key, now),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NavCommand {
    Quit,
    MoveRow(isize),
    MoveColumn(isize),
    ToggleExpand,
    ToggleSelection,
    SelectAll,
    ClearSelection,
    CycleSelectionMode,
    BeginEdit,
    CycleSort,
    OpenFilter,
    ClearFilters,
    HideColumn,
    ShowAllColumns,
    ShiftColumn(isize),
}

fn nav_command_for_key(key: KeyEvent) -> Option<NavCommand> {
    match (key.code, key.modifiers) {
        (KeyCode::Char('q'), _) => Some(NavCommand::Quit),
        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(NavCommand::MoveRow(1)),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(NavCommand::MoveRow(-1)),
        (KeyCode::Char('h'), _) | (KeyCode::Left, _) => Some(NavCommand::MoveColumn(-1)),
        (KeyCode::Char('l'), _) | (KeyCode::Right, _) => Some(NavCommand::MoveColumn(1)),
        (KeyCode::Enter, _) => Some(NavCommand::ToggleExpand),
        (KeyCode::Char(' '), _) => Some(NavCommand::ToggleSelection),
        (KeyCode::Char('a'), KeyModifiers::NONE) => Some(NavCommand::SelectAll),
        (KeyCode::Esc, _) => Some(NavCommand::ClearSelection),
        (KeyCode::Char('m'), _) => Some(NavCommand::CycleSelectionMode),
        (KeyCode::Char('e'), _) | (KeyCode::Char('i'), _) => Some(NavCommand::BeginEdit),
        (KeyCode::Char('s'), _) => Some(NavCommand::CycleSort),
        (KeyCode::Char('/'), _) => Some(NavCommand::OpenFilter),
        (KeyCode::Char('c'), KeyModifiers::NONE) => Some(NavCommand::ClearFilters),
        (KeyCode::Char('x'), _) => Some(NavCommand::HideColumn),
        (KeyCode::Char('X'), _) => Some(NavCommand::ShowAllColumns),
        (KeyCode::Char('<'), _) => Some(NavCommand::ShiftColumn(-1)),
        (KeyCode::Char('>'), _) => Some(NavCommand::ShiftColumn(1)),
        _ => None,
    }
}

fn handle_nav_key<R: ScreenRuntime>(
    state: &mut ScreenState,
    runtime: &mut R,
    channels: &EventChannels,
    key: KeyEvent,
    now: Instant,
) -> bool {
    let Some(command) = nav_command_for_key(key) else {
        return false;
    };

    match command {
        NavCommand::Quit => return true,
        NavCommand::MoveRow(delta) => state.move_row(delta),
        NavCommand::MoveColumn(delta) => state.move_column(delta),
        NavCommand::ToggleExpand => state.toggle_expand(now),
        NavCommand::ToggleSelection => state.toggle_selection(now),
        NavCommand::SelectAll => {
            if !state.selection.select_all_rows(&state.store) {
                state.set_status("select all needs multi selection (m)", now);
            }
        }
        NavCommand::ClearSelection => state.selection.clear(),
        NavCommand::CycleSelectionMode => state.cycle_selection_mode(now),
        NavCommand::BeginEdit => begin_edit(state, now),
        NavCommand::CycleSort => state.cycle_sort(now),
        NavCommand::OpenFilter => {
            state.mode = ScreenMode::Filter;
            if let Some(request) = state.filter.open() {
                dispatch_fetch(state, runtime, channels, request);
            }
        }
        NavCommand::ClearFilters => {
            state.view.clear_filters();
            state.filter.clear();
            state.clamp_cursor();
            state.set_status("filters cleared", now);
        }
        NavCommand::HideColumn => {
            let Some(key) = current_parent_column(state) else {
                return false;
            };
            if state.layout.hide(&key) {
                state.clamp_cursor();
                persist_layout(state, runtime, now);
            } else {
                state.set_status("cannot hide the last column", now);
            }
        }
        NavCommand::ShowAllColumns => {
            if state.layout.show_all() {
                persist_layout(state, runtime, now);
            }
        }
        NavCommand::ShiftColumn(delta) => {
            let Some(key) = current_parent_column(state) else {
                return false;
            };
            if state.layout.move_column(&key, delta) {
                state.move_column(delta);
                persist_layout(state, runtime, now);
            }
        }
    }
    false
}

fn current_parent_column(state: &ScreenState) -> Option<String> {
    state
        .layout
        .visible()
        .get(state.cursor_column)
        .map(|column| column.key.clone())
}

fn persist_layout<R: ScreenRuntime>(state: &mut ScreenState, runtime: &mut R, now: Instant) {
    match runtime.save_layout(&state.layout) {
        Ok(mode) => tracing::debug!(mode = mode.as_str(), "column layout saved"),
        Err(error) => state.set_status(format!("layout not saved: {error:#}"), now),
    }
}

fn begin_edit(state: &mut ScreenState, now: Instant) {
    let Some(address) = state.current_address() else {
        return;
    };
    match state.editor.begin(&state.store, address) {
        Ok(()) => state.mode = ScreenMode::Edit,
        Err(error) => state.set_status(error.to_string(), now),
    }
}

fn handle_edit_key<R: ScreenRuntime>(
    state: &mut ScreenState,
    runtime: &mut R,
    channels: &EventChannels,
    key: KeyEvent,
    now: Instant,
) {
    match key.code {
        KeyCode::Char(ch) => state.editor.push_char(ch),
        KeyCode::Backspace => state.editor.backspace(),
        KeyCode::Enter => match state.editor.commit(&mut state.store, |_| Ok(())) {
            Ok(committed) => after_commit(state, runtime, channels, &committed, now),
            Err(error) => state.set_status(error.to_string(), now),
        },
        KeyCode::Esc | KeyCode::Up | KeyCode::Down | KeyCode::Tab => {
            match state.editor.blur(&mut state.store, |_| Ok(())) {
                BlurOutcome::Idle => {}
                BlurOutcome::Cancelled => state.set_status("edit cancelled", now),
                BlurOutcome::Committed(committed) => {
                    after_commit(state, runtime, channels, &committed, now);
                }
                BlurOutcome::Failed(error) => state.set_status(error.to_string(), now),
            }
            if !state.editor.is_editing() {
                match key.code {
                    KeyCode::Up => state.move_row(-1),
                    KeyCode::Down => state.move_row(1),
                    _ => {}
                }
            }
        }
        _ => {}
    }
    if !state.editor.is_editing() {
        state.mode = ScreenMode::Nav;
    }
}

fn after_commit<R: ScreenRuntime>(
    state: &mut ScreenState,
    runtime: &mut R,
    channels: &EventChannels,
    committed: &Committed,
    now: Instant,
) {
    state.selection.resync(&state.store);
    let Some(request) = state.editor.issue_server_update(&state.store, committed) else {
        return;
    };
    let column = committed.address.column.clone();
    match runtime.spawn_update(request, channels.update_tx.clone()) {
        Ok(()) => state.set_status(format!("{column} updated, saving"), now),
        Err(error) => state.set_status(format!("{column} not saved: {error:#}"), now),
    }
}

fn handle_filter_key<R: ScreenRuntime>(
    state: &mut ScreenState,
    runtime: &mut R,
    channels: &EventChannels,
    key: KeyEvent,
    now: Instant,
) {
    match key.code {
        KeyCode::Esc => {
            state.filter.close();
            state.mode = ScreenMode::Nav;
        }
        KeyCode::Char(ch) => state.filter.push_char(ch, now),
        KeyCode::Backspace => state.filter.backspace(now),
        KeyCode::Up => state.filter.move_highlight(-1),
        KeyCode::Down => {
            state.filter.move_highlight(1);
            let last = state.filter.options().len().saturating_sub(1);
            if state.filter.highlighted() == last
                && let Some(request) = state.filter.scroll_to_end()
            {
                dispatch_fetch(state, runtime, channels, request);
            }
        }
        KeyCode::PageDown | KeyCode::End => {
            if let Some(request) = state.filter.scroll_to_end() {
                dispatch_fetch(state, runtime, channels, request);
            }
        }
        KeyCode::Enter => {
            if !state.filter.pick_highlighted() {
                return;
            }
            let name = state
                .filter
                .selection()
                .first()
                .map(|choice| choice.name.clone())
                .unwrap_or_default();
            state.view.set_filter(&state.store, FILTER_COLUMN, &name);
            state.cursor_line = 0;
            state.clamp_cursor();
            state.mode = ScreenMode::Nav;
            state.set_status(format!("customer = {name}"), now);
        }
        _ => {}
    }
}

fn render(frame: &mut ratatui::Frame<'_>, state: &ScreenState) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(3)])
        .split(frame.area());

    render_table(frame, layout[0], state);

    let status = Paragraph::new(status_text(state))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[1]);

    if state.filter.is_open() {
        let area = centered_rect(50, 60, frame.area());
        frame.render_widget(Clear, area);
        let overlay = Paragraph::new(render_filter_overlay_text(state)).block(
            Block::default()
                .title("filter by customer")
                .borders(Borders::ALL),
        );
        frame.render_widget(overlay, area);
    }
}

fn header_label(state: &ScreenState, column: &Column) -> String {
    match state.view.sort() {
        Some(spec) if spec.column == column.key => {
            let mark = match spec.direction {
                SortDirection::Asc => SORT_ASC_MARK,
                SortDirection::Desc => SORT_DESC_MARK,
            };
            format!("{} {mark}", column.label)
        }
        _ => column.label.clone(),
    }
}

fn table_title(state: &ScreenState) -> String {
    let mut title = format!(
        "{} | {} of {} | select {}",
        state.title,
        state.view.project(&state.store).len(),
        state.store.len(),
        state.selection.mode().as_str()
    );
    let summary = state.selection_summary();
    if !summary.is_empty() {
        title.push_str(&format!(" ({summary})"));
    }
    if let Some(filter) = state.view.filter(FILTER_COLUMN) {
        title.push_str(&format!(" | customer ~ {filter}"));
    }
    title
}

fn line_marker(state: &ScreenState, line: DisplayLine) -> String {
    match line {
        DisplayLine::Parent(index) => {
            let selected = if state.selection.is_row_selected(index) {
                SELECTED_MARK
            } else {
                " "
            };
            let expand = if state.store.nested_rows(index).is_empty() {
                " "
            } else if state.expanded.contains(&index) {
                EXPANDED_MARK
            } else {
                COLLAPSED_MARK
            };
            format!("{selected}{expand}")
        }
        DisplayLine::Nested { parent, nested } => {
            let selected = if state.selection.is_nested_selected(parent, nested) {
                SELECTED_MARK
            } else {
                " "
            };
            selected.to_owned()
        }
    }
}

fn cell_text(state: &ScreenState, line: DisplayLine, column: &Column) -> String {
    if let Some(editing) = state.editor.editing()
        && editing.address.row == line.path()
        && editing.address.column == column.key
    {
        return format!("{}_", editing.buffer);
    }
    let value = state
        .store
        .cell(line.path(), &column.key)
        .map(|value| value.display())
        .unwrap_or_default();
    match line {
        DisplayLine::Parent(_) => value,
        DisplayLine::Nested { .. } => format!("{}: {value}", column.label),
    }
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, state: &ScreenState) {
    let columns = state.layout.visible();
    let mut widths = vec![Constraint::Length(2)];
    widths.extend(columns.iter().map(|column| match column.width {
        Some(width) => Constraint::Length(width),
        None => Constraint::Min(8),
    }));

    let header_style = Style::default()
        .fg(Color::White)
        .add_modifier(Modifier::BOLD);
    let mut header_cells = vec![Cell::from(String::new())];
    header_cells.extend(
        columns
            .iter()
            .map(|column| Cell::from(header_label(state, column)).style(header_style)),
    );
    let header = Row::new(header_cells);

    let rows = state
        .display_lines()
        .into_iter()
        .enumerate()
        .map(|(line_index, line)| {
            let on_cursor = line_index == state.cursor_line;
            let line_columns = state.columns_for(line);
            let cursor_column = state
                .cursor_column
                .min(line_columns.len().saturating_sub(1));

            let mut cells = vec![Cell::from(line_marker(state, line))];
            if let DisplayLine::Nested { nested, .. } = line {
                cells.push(Cell::from(format!("{NESTED_MARK} {}", nested + 1)));
            }
            cells.extend(line_columns.iter().enumerate().map(|(index, column)| {
                let mut style = Style::default();
                if matches!(line, DisplayLine::Nested { .. }) {
                    style = style.fg(Color::Gray);
                }
                if on_cursor {
                    style = style.bg(Color::DarkGray);
                }
                if on_cursor && index == cursor_column {
                    style = Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD);
                }
                Cell::from(cell_text(state, line, column)).style(style)
            }));
            Row::new(cells)
        });

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(table_title(state))
                .borders(Borders::ALL),
        );
    frame.render_widget(table, area);
}

fn status_text(state: &ScreenState) -> String {
    let hints = match state.mode {
        ScreenMode::Nav => {
            "j/k rows  h/l cols  enter expand  space select  e edit  s sort  / customer  x hide  q quit"
        }
        ScreenMode::Edit => "enter commit  esc leave",
        ScreenMode::Filter => "type to search  up/down move  enter pick  esc close",
    };
    let mut text = format!("{}  {hints}", state.mode.label());

    if let Some(editing) = state.editor.editing() {
        text.push_str(&format!(
            " | {} = {}_",
            editing.address.column, editing.buffer
        ));
        if let Some(error) = &editing.error {
            text.push_str(&format!(" ({error})"));
        }
    }
    if let Some(message) = state.status() {
        text.push_str(" | ");
        text.push_str(message);
    }
    text
}

fn render_filter_overlay_text(state: &ScreenState) -> String {
    let filter = &state.filter;
    let mut lines = vec![format!("search: {}_", filter.query()), String::new()];
    for (index, option) in filter.options().iter().enumerate() {
        let marker = if index == filter.highlighted() {
            ">"
        } else {
            " "
        };
        lines.push(format!("{marker} {}", option.label));
    }
    if filter.is_busy() {
        lines.push("loading...".to_owned());
    } else if filter.options().is_empty() {
        lines.push("no matches".to_owned());
    } else if filter.is_exhausted() {
        lines.push("end of results".to_owned());
    }
    lines.join("\n")
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
