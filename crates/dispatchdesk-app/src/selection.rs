// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Row-level and nested-row selection for one grid instance.
//!
//! Two kinds of selection exist and are mutually exclusive: whole parent
//! rows, or nested rows under exactly one parent. Every accepted change emits
//! the full current [`SelectionChange`] to the registered listener.

use std::fmt;

use crate::grid::GridDataStore;
use crate::model::{Row, RowIdentity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    None,
    #[default]
    Single,
    Multi,
}

impl SelectionMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Single => "single",
            Self::Multi => "multi",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "single" => Some(Self::Single),
            "multi" => Some(Self::Multi),
            _ => None,
        }
    }
}

/// Which kind of selection a consumer is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionKind {
    #[default]
    None,
    Rows,
    Nested,
}

/// Snapshot of a selected nested row. Not refreshed by later patches; call
/// [`NestedSelectionController::resync`] to re-derive from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionEntry {
    pub parent_index: usize,
    pub nested_index: usize,
    pub parent_identity: RowIdentity,
    pub parent_row: Row,
    pub nested_row: Row,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowSelectionEntry {
    pub index: usize,
    pub identity: RowIdentity,
    pub row: Row,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionChange {
    pub kind: SelectionKind,
    pub rows: Vec<RowSelectionEntry>,
    pub nested: Vec<SelectionEntry>,
}

type ChangeListener = Box<dyn FnMut(&SelectionChange)>;

#[derive(Default)]
pub struct NestedSelectionController {
    mode: SelectionMode,
    identity_key: Option<String>,
    kind: SelectionKind,
    rows: Vec<RowSelectionEntry>,
    nested: Vec<SelectionEntry>,
    listener: Option<ChangeListener>,
}

impl fmt::Debug for NestedSelectionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NestedSelectionController")
            .field("mode", &self.mode)
            .field("identity_key", &self.identity_key)
            .field("kind", &self.kind)
            .field("rows", &self.rows)
            .field("nested", &self.nested)
            .finish_non_exhaustive()
    }
}

impl NestedSelectionController {
    /// `identity_key` names the business key used to tell parent rows apart;
    /// rows without it fall back to their index.
    pub fn new(mode: SelectionMode, identity_key: Option<String>) -> Self {
        Self {
            mode,
            identity_key,
            ..Self::default()
        }
    }

    pub fn for_store(mode: SelectionMode, store: &GridDataStore) -> Self {
        Self::new(mode, store.config().row_key.clone())
    }

    pub fn on_change(&mut self, listener: impl FnMut(&SelectionChange) + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Switching modes drops the current selection.
    pub fn set_mode(&mut self, mode: SelectionMode) {
        if self.mode == mode {
            return;
        }
        self.mode = mode;
        self.clear();
    }

    pub fn kind(&self) -> SelectionKind {
        self.kind
    }

    pub fn nested_selection(&self) -> &[SelectionEntry] {
        &self.nested
    }

    pub fn row_selection(&self) -> &[RowSelectionEntry] {
        &self.rows
    }

    pub fn is_nested_selected(&self, parent_index: usize, nested_index: usize) -> bool {
        self.nested_position(parent_index, nested_index).is_some()
    }

    pub fn is_row_selected(&self, index: usize) -> bool {
        self.rows.iter().any(|entry| entry.index == index)
    }

    pub fn snapshot(&self) -> SelectionChange {
        SelectionChange {
            kind: self.kind,
            rows: self.rows.clone(),
            nested: self.nested.clone(),
        }
    }

    /// Toggles one nested row. In multi mode, touching a nested row under a
    /// different parent than the current selection starts a fresh selection
    /// holding only that row. Returns `false` when selection is disabled.
    pub fn toggle(
        &mut self,
        parent_index: usize,
        nested_index: usize,
        parent_row: &Row,
        nested_row: &Row,
    ) -> bool {
        if self.mode == SelectionMode::None {
            return false;
        }

        let parent_identity =
            RowIdentity::of(parent_row, self.identity_key.as_deref(), parent_index);
        let entry = SelectionEntry {
            parent_index,
            nested_index,
            parent_identity,
            parent_row: parent_row.clone(),
            nested_row: nested_row.clone(),
        };
        let existing = self.nested_position(parent_index, nested_index);

        let next = match self.mode {
            SelectionMode::None => return false,
            SelectionMode::Single => match existing {
                Some(_) => Vec::new(),
                None => vec![entry],
            },
            SelectionMode::Multi => {
                let same_parent = self
                    .nested
                    .first()
                    .is_some_and(|first| first.parent_identity == entry.parent_identity);
                if !same_parent {
                    if !self.nested.is_empty() {
                        tracing::debug!(
                            parent_index,
                            "nested selection moved to another parent; prior entries dropped"
                        );
                    }
                    vec![entry]
                } else {
                    let mut next = self.nested.clone();
                    match existing {
                        Some(position) => {
                            next.remove(position);
                        }
                        None => next.push(entry),
                    }
                    next
                }
            }
        };

        self.kind = if next.is_empty() {
            SelectionKind::None
        } else {
            SelectionKind::Nested
        };
        self.rows.clear();
        self.nested = next;
        self.emit();
        true
    }

    /// Toggles nested row `(parent_index, nested_index)` as currently held by
    /// `store`. Returns `false` for missing rows or disabled selection.
    pub fn toggle_in(
        &mut self,
        store: &GridDataStore,
        parent_index: usize,
        nested_index: usize,
    ) -> bool {
        let (Some(parent_row), Some(nested_row)) = (
            store.row(parent_index),
            store.nested_row(parent_index, nested_index),
        ) else {
            tracing::error!(parent_index, nested_index, "toggle addressed a missing row");
            return false;
        };
        self.toggle(parent_index, nested_index, parent_row, nested_row)
    }

    /// Toggles a whole parent row. Clears any nested selection.
    pub fn toggle_row(&mut self, index: usize, row: &Row) -> bool {
        if self.mode == SelectionMode::None {
            return false;
        }

        let entry = RowSelectionEntry {
            index,
            identity: RowIdentity::of(row, self.identity_key.as_deref(), index),
            row: row.clone(),
        };
        let existing = self.rows.iter().position(|entry| entry.index == index);

        let next = match (self.mode, existing) {
            (SelectionMode::None, _) => return false,
            (SelectionMode::Single, Some(_)) => Vec::new(),
            (SelectionMode::Single, None) => vec![entry],
            (SelectionMode::Multi, Some(position)) => {
                let mut next = self.rows.clone();
                next.remove(position);
                next
            }
            (SelectionMode::Multi, None) => {
                let mut next = self.rows.clone();
                next.push(entry);
                next
            }
        };

        self.kind = if next.is_empty() {
            SelectionKind::None
        } else {
            SelectionKind::Rows
        };
        self.nested.clear();
        self.rows = next;
        self.emit();
        true
    }

    pub fn toggle_row_in(&mut self, store: &GridDataStore, index: usize) -> bool {
        let Some(row) = store.row(index) else {
            tracing::error!(index, "toggle addressed a missing row");
            return false;
        };
        self.toggle_row(index, row)
    }

    /// Selects every parent row in `store`. Multi mode only.
    pub fn select_all_rows(&mut self, store: &GridDataStore) -> bool {
        if self.mode != SelectionMode::Multi {
            return false;
        }
        self.nested.clear();
        self.rows = store
            .rows()
            .iter()
            .enumerate()
            .map(|(index, row)| RowSelectionEntry {
                index,
                identity: RowIdentity::of(row, self.identity_key.as_deref(), index),
                row: row.clone(),
            })
            .collect();
        self.kind = if self.rows.is_empty() {
            SelectionKind::None
        } else {
            SelectionKind::Rows
        };
        self.emit();
        true
    }

    pub fn clear(&mut self) {
        if self.kind == SelectionKind::None {
            return;
        }
        self.kind = SelectionKind::None;
        self.rows.clear();
        self.nested.clear();
        self.emit();
    }

    /// Re-derives every snapshot from `store`. Entries are found again by
    /// their identity: rows carrying the business key follow that key to
    /// wherever it now sits, index-identified rows stay at their index.
    /// Entries whose rows are gone are dropped, as are nested entries whose
    /// parent no longer matches the selection's parent.
    pub fn resync(&mut self, store: &GridDataStore) {
        let key = self.identity_key.as_deref();
        let rows: Vec<RowSelectionEntry> = self
            .rows
            .iter()
            .filter_map(|entry| {
                let index = locate(store, key, &entry.identity)?;
                let row = store.row(index)?;
                Some(RowSelectionEntry {
                    index,
                    identity: RowIdentity::of(row, key, index),
                    row: row.clone(),
                })
            })
            .collect();

        let anchor = self.nested.first().map(|entry| entry.parent_identity.clone());
        let nested: Vec<SelectionEntry> = self
            .nested
            .iter()
            .filter_map(|entry| {
                let parent_index = locate(store, key, &entry.parent_identity)?;
                let parent_row = store.row(parent_index)?;
                let nested_row = store.nested_row(parent_index, entry.nested_index)?;
                let parent_identity = RowIdentity::of(parent_row, key, parent_index);
                if Some(&parent_identity) != anchor.as_ref() {
                    return None;
                }
                Some(SelectionEntry {
                    parent_index,
                    nested_index: entry.nested_index,
                    parent_identity,
                    parent_row: parent_row.clone(),
                    nested_row: nested_row.clone(),
                })
            })
            .collect();

        let dropped = self.rows.len() + self.nested.len() - rows.len() - nested.len();
        if dropped > 0 {
            tracing::debug!(dropped, "selection entries dropped on resync");
        }
        self.kind = match self.kind {
            SelectionKind::Rows if !rows.is_empty() => SelectionKind::Rows,
            SelectionKind::Nested if !nested.is_empty() => SelectionKind::Nested,
            _ => SelectionKind::None,
        };
        self.rows = rows;
        self.nested = nested;
        self.emit();
    }

    fn nested_position(&self, parent_index: usize, nested_index: usize) -> Option<usize> {
        self.nested.iter().position(|entry| {
            entry.parent_index == parent_index && entry.nested_index == nested_index
        })
    }

    fn emit(&mut self) {
        let change = self.snapshot();
        if let Some(listener) = self.listener.as_mut() {
            listener(&change);
        }
    }
}

/// Current store index of the row `identity` was taken from.
fn locate(store: &GridDataStore, key: Option<&str>, identity: &RowIdentity) -> Option<usize> {
    match identity {
        RowIdentity::Key(_) => store
            .rows()
            .iter()
            .enumerate()
            .position(|(index, row)| RowIdentity::of(row, key, index) == *identity),
        RowIdentity::Index(index) => store.row(*index).map(|_| *index),
    }
}
