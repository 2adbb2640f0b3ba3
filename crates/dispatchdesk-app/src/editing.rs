// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Inline cell editing: at most one cell per grid is in edit mode.

use anyhow::anyhow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::mpsc::Sender;
use thiserror::Error;

use crate::grid::GridDataStore;
use crate::ids::{Generation, RequestId};
use crate::model::{CellParseError, CellValue, Row, RowPath};

/// Grid-level switch for which columns may be edited at all. A column must
/// also carry its own `editable` flag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EditableColumns {
    #[default]
    All,
    Disabled,
    Only(BTreeSet<String>),
}

impl EditableColumns {
    pub fn only<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(keys.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, column: &str) -> bool {
        match self {
            Self::All => true,
            Self::Disabled => false,
            Self::Only(keys) => keys.contains(column),
        }
    }
}

/// What leaving a cell without an explicit commit does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlurPolicy {
    #[default]
    Cancel,
    Commit,
}

impl BlurPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
            Self::Commit => "commit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "cancel" => Some(Self::Cancel),
            "commit" => Some(Self::Commit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellAddress {
    pub row: RowPath,
    pub column: String,
}

impl CellAddress {
    pub fn new(row: RowPath, column: impl Into<String>) -> Self {
        Self {
            row,
            column: column.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditingCell {
    pub address: CellAddress,
    pub original: CellValue,
    pub buffer: String,
    /// Last parse or commit failure; cleared on the next keystroke.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    #[error("column {column:?} is not editable here")]
    NotEditable { column: String },
    #[error("no cell is being edited")]
    NotEditing,
    #[error("no cell at row {} column {column:?}", describe_path(.row))]
    UnknownCell { row: RowPath, column: String },
    #[error(transparent)]
    Parse(#[from] CellParseError),
    #[error("commit rejected: {0}")]
    Rejected(String),
}

fn describe_path(path: &RowPath) -> String {
    match path.nested {
        Some(nested) => format!("{}.{nested}", path.parent),
        None => path.parent.to_string(),
    }
}

/// Handed to the caller's commit handler before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRequest {
    pub address: CellAddress,
    pub previous: CellValue,
    pub value: CellValue,
    pub updated_row: Row,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    pub address: CellAddress,
    pub value: CellValue,
    pub updated_row: Row,
}

/// Payload of the inline-edit hook, fired right after the optimistic patch.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineEdit {
    pub parent_index: usize,
    pub nested_index: Option<usize>,
    pub updated_row: Row,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlurOutcome {
    Idle,
    Cancelled,
    Committed(Committed),
    Failed(EditError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerUpdateTicket {
    pub request_id: RequestId,
    pub generation: Generation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerUpdateRequest {
    pub ticket: ServerUpdateTicket,
    pub address: CellAddress,
    pub parent_row: Row,
    pub nested_row: Option<Row>,
    pub updated_data: Row,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerUpdateCompletion {
    pub ticket: ServerUpdateTicket,
    pub address: CellAddress,
    pub result: Result<(), String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Confirmed,
    /// The server rejected the edit. The optimistic patch stays in place.
    Failed(String),
    /// Rows were replaced or a newer update for the cell was issued.
    Discarded,
}

/// Collaborator that persists a committed edit.
pub trait ServerUpdate {
    fn update(&self, request: &ServerUpdateRequest) -> anyhow::Result<()>;

    fn spawn_update(
        &self,
        request: ServerUpdateRequest,
        tx: Sender<ServerUpdateCompletion>,
    ) -> anyhow::Result<()> {
        let result = self
            .update(&request)
            .map_err(|error| format!("{error:#}"));
        tx.send(ServerUpdateCompletion {
            ticket: request.ticket,
            address: request.address,
            result,
        })
        .map_err(|_| anyhow!("server update channel closed"))?;
        Ok(())
    }
}

type CellOverride = Box<dyn Fn(&CellAddress, &Row) -> bool>;
type InlineEditHook = Box<dyn FnMut(&InlineEdit)>;

#[derive(Default)]
pub struct EditableCellController {
    editable: EditableColumns,
    blur_policy: BlurPolicy,
    cell_override: Option<CellOverride>,
    on_inline_edit: Option<InlineEditHook>,
    editing: Option<EditingCell>,
    last_update: RequestId,
    pending_updates: BTreeMap<CellAddress, ServerUpdateTicket>,
}

impl fmt::Debug for EditableCellController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditableCellController")
            .field("editable", &self.editable)
            .field("blur_policy", &self.blur_policy)
            .field("editing", &self.editing)
            .field("pending_updates", &self.pending_updates)
            .finish_non_exhaustive()
    }
}

impl EditableCellController {
    pub fn new(editable: EditableColumns, blur_policy: BlurPolicy) -> Self {
        Self {
            editable,
            blur_policy,
            ..Self::default()
        }
    }

    /// Per-cell veto applied on top of the column flags.
    pub fn set_cell_override(&mut self, check: impl Fn(&CellAddress, &Row) -> bool + 'static) {
        self.cell_override = Some(Box::new(check));
    }

    pub fn on_inline_edit(&mut self, hook: impl FnMut(&InlineEdit) + 'static) {
        self.on_inline_edit = Some(Box::new(hook));
    }

    pub fn blur_policy(&self) -> BlurPolicy {
        self.blur_policy
    }

    pub fn set_blur_policy(&mut self, policy: BlurPolicy) {
        self.blur_policy = policy;
    }

    pub fn editing(&self) -> Option<&EditingCell> {
        self.editing.as_ref()
    }

    pub fn is_editing(&self) -> bool {
        self.editing.is_some()
    }

    pub fn can_edit(&self, store: &GridDataStore, address: &CellAddress) -> bool {
        self.check_editable(store, address).is_ok()
    }

    /// Enters edit mode on `address`, seeding the buffer from the stored
    /// value. Any edit already open is dropped without being written.
    pub fn begin(&mut self, store: &GridDataStore, address: CellAddress) -> Result<(), EditError> {
        self.check_editable(store, &address)?;

        if let Some(previous) = self.editing.take() {
            tracing::debug!(
                column = %previous.address.column,
                "open edit discarded by a new edit"
            );
        }

        let original = store
            .cell(address.row, &address.column)
            .cloned()
            .unwrap_or(CellValue::Null);
        self.editing = Some(EditingCell {
            buffer: original.edit_text(),
            address,
            original,
            error: None,
        });
        Ok(())
    }

    pub fn input(&mut self, text: &str) {
        if let Some(editing) = self.editing.as_mut() {
            editing.buffer = text.to_owned();
            editing.error = None;
        }
    }

    pub fn push_char(&mut self, ch: char) {
        if let Some(editing) = self.editing.as_mut() {
            editing.buffer.push(ch);
            editing.error = None;
        }
    }

    pub fn backspace(&mut self) {
        if let Some(editing) = self.editing.as_mut() {
            editing.buffer.pop();
            editing.error = None;
        }
    }

    /// Leaves edit mode without writing. Returns `false` when idle.
    pub fn cancel(&mut self) -> bool {
        self.editing.take().is_some()
    }

    /// Parses the buffer and hands it to `handler`. On success the store is
    /// patched, the inline-edit hook fires and the controller goes idle. On
    /// failure the controller stays in edit mode with the buffer intact.
    pub fn commit<F>(&mut self, store: &mut GridDataStore, handler: F) -> Result<Committed, EditError>
    where
        F: FnOnce(&CommitRequest) -> Result<(), String>,
    {
        let Some(editing) = self.editing.as_mut() else {
            return Err(EditError::NotEditing);
        };
        let address = editing.address.clone();

        let Some(column) = store.column(&address.column) else {
            self.editing = None;
            return Err(EditError::UnknownCell {
                row: address.row,
                column: address.column,
            });
        };
        let value = match column.column_type.parse_input(&editing.buffer) {
            Ok(value) => value,
            Err(error) => {
                editing.error = Some(error.to_string());
                return Err(EditError::Parse(error));
            }
        };

        let Some(row) = store.row_at(address.row) else {
            tracing::error!(column = %address.column, "edit target row no longer exists");
            self.editing = None;
            return Err(EditError::UnknownCell {
                row: address.row,
                column: address.column,
            });
        };
        let mut updated_row = row.clone();
        updated_row.set(address.column.clone(), value.clone());

        let request = CommitRequest {
            address: address.clone(),
            previous: editing.original.clone(),
            value,
            updated_row,
        };
        if let Err(reason) = handler(&request) {
            editing.error = Some(reason.clone());
            return Err(EditError::Rejected(reason));
        }

        let partial = Row::new().with(address.column.clone(), request.value.clone());
        store.patch(address.row, &partial);
        self.editing = None;

        if let Some(hook) = self.on_inline_edit.as_mut() {
            hook(&InlineEdit {
                parent_index: address.row.parent,
                nested_index: address.row.nested,
                updated_row: request.updated_row.clone(),
            });
        }

        Ok(Committed {
            address,
            value: request.value,
            updated_row: request.updated_row,
        })
    }

    /// Focus left the cell. Applies the configured [`BlurPolicy`].
    pub fn blur<F>(&mut self, store: &mut GridDataStore, handler: F) -> BlurOutcome
    where
        F: FnOnce(&CommitRequest) -> Result<(), String>,
    {
        if self.editing.is_none() {
            return BlurOutcome::Idle;
        }
        match self.blur_policy {
            BlurPolicy::Cancel => {
                self.cancel();
                BlurOutcome::Cancelled
            }
            BlurPolicy::Commit => match self.commit(store, handler) {
                Ok(committed) => BlurOutcome::Committed(committed),
                Err(error) => BlurOutcome::Failed(error),
            },
        }
    }

    /// Builds the server request for a committed edit and records it as the
    /// latest update for that cell.
    pub fn issue_server_update(
        &mut self,
        store: &GridDataStore,
        committed: &Committed,
    ) -> Option<ServerUpdateRequest> {
        let parent_row = store.row(committed.address.row.parent)?.clone();
        let nested_row = match committed.address.row.nested {
            Some(nested) => Some(store.nested_row(committed.address.row.parent, nested)?.clone()),
            None => None,
        };

        self.last_update = self.last_update.next();
        let ticket = ServerUpdateTicket {
            request_id: self.last_update,
            generation: store.generation(),
        };
        self.pending_updates
            .insert(committed.address.clone(), ticket);

        Some(ServerUpdateRequest {
            ticket,
            address: committed.address.clone(),
            parent_row,
            nested_row,
            updated_data: Row::new().with(committed.address.column.clone(), committed.value.clone()),
        })
    }

    pub fn has_pending_update(&self, address: &CellAddress) -> bool {
        self.pending_updates.contains_key(address)
    }

    pub fn complete_server_update(
        &mut self,
        store: &GridDataStore,
        completion: ServerUpdateCompletion,
    ) -> UpdateOutcome {
        if self.pending_updates.get(&completion.address) != Some(&completion.ticket) {
            tracing::debug!(
                request_id = %completion.ticket.request_id,
                "superseded server update ignored"
            );
            return UpdateOutcome::Discarded;
        }
        self.pending_updates.remove(&completion.address);

        if store.generation() != completion.ticket.generation {
            tracing::debug!(
                request_id = %completion.ticket.request_id,
                "server update finished after rows were replaced"
            );
            return UpdateOutcome::Discarded;
        }

        match completion.result {
            Ok(()) => UpdateOutcome::Confirmed,
            Err(error) => {
                tracing::warn!(
                    request_id = %completion.ticket.request_id,
                    column = %completion.address.column,
                    error = %error,
                    "server rejected inline edit"
                );
                UpdateOutcome::Failed(error)
            }
        }
    }

    fn check_editable(&self, store: &GridDataStore, address: &CellAddress) -> Result<(), EditError> {
        let unknown = || EditError::UnknownCell {
            row: address.row,
            column: address.column.clone(),
        };
        let column = store.column(&address.column).ok_or_else(unknown)?;
        let row = store.row_at(address.row).ok_or_else(unknown)?;

        let allowed = column.editable
            && self.editable.allows(&column.key)
            && self
                .cell_override
                .as_ref()
                .is_none_or(|check| check(address, row));
        if allowed {
            Ok(())
        } else {
            Err(EditError::NotEditable {
                column: address.column.clone(),
            })
        }
    }
}
