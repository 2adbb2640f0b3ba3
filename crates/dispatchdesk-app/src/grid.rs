// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::{BTreeMap, BTreeSet};

use crate::ids::Generation;
use crate::model::{CellValue, Column, Row, RowIdentity, RowPath, SortDirection};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridConfig {
    /// Key under which each parent row carries its nested collection.
    pub nested_data_key: Option<String>,
    /// Business key identifying parent rows (e.g. a document number).
    pub row_key: Option<String>,
}

/// Column keys dropped by [`GridDataStore::set_columns`] because an earlier
/// column already used them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnReport {
    pub duplicates: Vec<String>,
}

/// Row data, column configuration and loading flag for one screen.
///
/// Replacing or removing rows bumps [`generation`](Self::generation);
/// asynchronous completions compare the generation they were issued under
/// before writing back.
#[derive(Debug, Clone, Default)]
pub struct GridDataStore {
    config: GridConfig,
    columns: Vec<Column>,
    rows: Vec<Row>,
    loading: bool,
    generation: Generation,
}

impl GridDataStore {
    pub fn new(config: GridConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn set_columns(&mut self, columns: Vec<Column>) -> ColumnReport {
        let mut seen = BTreeSet::new();
        let mut report = ColumnReport::default();
        let mut kept = Vec::with_capacity(columns.len());
        for column in columns {
            if seen.insert(column.key.clone()) {
                kept.push(column);
            } else {
                tracing::error!(key = %column.key, "duplicate column key ignored");
                report.duplicates.push(column.key);
            }
        }
        self.columns = kept;
        report
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, key: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.key == key)
    }

    pub fn set_rows(&mut self, rows: Vec<Row>) {
        self.rows = rows;
        self.generation = self.generation.next();
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn nested_rows(&self, parent: usize) -> &[Row] {
        match (self.rows.get(parent), self.config.nested_data_key.as_deref()) {
            (Some(row), Some(key)) => row.nested(key),
            _ => &[],
        }
    }

    pub fn nested_row(&self, parent: usize, nested: usize) -> Option<&Row> {
        self.nested_rows(parent).get(nested)
    }

    pub fn row_at(&self, path: RowPath) -> Option<&Row> {
        match path.nested {
            Some(nested) => self.nested_row(path.parent, nested),
            None => self.row(path.parent),
        }
    }

    pub fn cell(&self, path: RowPath, key: &str) -> Option<&CellValue> {
        self.row_at(path)?.get(key)
    }

    pub fn parent_identity(&self, index: usize) -> Option<RowIdentity> {
        self.rows
            .get(index)
            .map(|row| RowIdentity::of(row, self.config.row_key.as_deref(), index))
    }

    /// Merges `partial` into the parent row at `index`. Selection snapshots
    /// taken earlier are left untouched.
    pub fn patch_row(&mut self, index: usize, partial: &Row) -> Option<&Row> {
        self.patch(RowPath::parent(index), partial)
    }

    pub fn patch_nested_row(&mut self, parent: usize, nested: usize, partial: &Row) -> Option<&Row> {
        self.patch(RowPath::nested(parent, nested), partial)
    }

    pub fn patch(&mut self, path: RowPath, partial: &Row) -> Option<&Row> {
        let nested_key = self.config.nested_data_key.clone();
        let Some(parent) = self.rows.get_mut(path.parent) else {
            tracing::error!(index = path.parent, "patch addressed a missing row");
            return None;
        };

        let Some(nested) = path.nested else {
            parent.merge(partial);
            return Some(&*parent);
        };

        let target = nested_key
            .as_deref()
            .and_then(|key| parent.nested_mut(key))
            .and_then(|rows| rows.get_mut(nested));
        match target {
            Some(row) => {
                row.merge(partial);
                Some(&*row)
            }
            None => {
                tracing::error!(
                    parent = path.parent,
                    nested,
                    "patch addressed a missing nested row"
                );
                None
            }
        }
    }

    /// Removes every row matching `predicate` and returns how many went.
    pub fn remove_rows<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(usize, &Row) -> bool,
    {
        let before = self.rows.len();
        let mut index = 0usize;
        self.rows.retain(|row| {
            let remove = predicate(index, row);
            index += 1;
            !remove
        });
        let removed = before - self.rows.len();
        if removed > 0 {
            self.generation = self.generation.next();
        }
        removed
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

/// Display-order projection over a store: an optional single-column sort and
/// per-column substring filters. Positions map back to store indices.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridView {
    sort: Option<SortSpec>,
    filters: BTreeMap<String, String>,
}

impl GridView {
    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    /// Advances the sort on `column` through asc, desc and off. Returns
    /// `false` when the column is unknown or not sortable.
    pub fn cycle_sort(&mut self, store: &GridDataStore, column: &str) -> bool {
        if !store.column(column).is_some_and(|column| column.sortable) {
            return false;
        }

        self.sort = match self.sort.take() {
            Some(spec) if spec.column == column => match spec.direction {
                SortDirection::Asc => Some(SortSpec {
                    column: spec.column,
                    direction: SortDirection::Desc,
                }),
                SortDirection::Desc => None,
            },
            _ => Some(SortSpec {
                column: column.to_owned(),
                direction: SortDirection::Asc,
            }),
        };
        true
    }

    pub fn filter(&self, column: &str) -> Option<&str> {
        self.filters.get(column).map(String::as_str)
    }

    /// Sets or clears (blank text) the filter on `column`. Returns `false`
    /// when the column is unknown or not filterable.
    pub fn set_filter(&mut self, store: &GridDataStore, column: &str, text: &str) -> bool {
        if !store.column(column).is_some_and(|column| column.filterable) {
            return false;
        }
        let text = text.trim();
        if text.is_empty() {
            self.filters.remove(column);
        } else {
            self.filters.insert(column.to_owned(), text.to_ascii_lowercase());
        }
        true
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    /// Store indices of the parent rows to display, in display order.
    pub fn project(&self, store: &GridDataStore) -> Vec<usize> {
        let mut indices: Vec<usize> = store
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, row)| self.matches(row))
            .map(|(index, _)| index)
            .collect();

        if let Some(spec) = &self.sort {
            indices.sort_by(|left, right| {
                let left = store.rows()[*left].value(&spec.column);
                let right = store.rows()[*right].value(&spec.column);
                let ordering = left.cmp_value(&right);
                match spec.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }
        indices
    }

    fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|(column, needle)| {
            row.value(column)
                .display()
                .to_ascii_lowercase()
                .contains(needle.as_str())
        })
    }
}
