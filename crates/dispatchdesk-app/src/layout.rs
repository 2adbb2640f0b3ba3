// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeSet;

use crate::model::Column;
use crate::personalization::PersonalizationDocument;

/// Orders `defaults` (key, order) by a personalized key list. Unknown and
/// repeated keys in `preferred` are skipped; keys it does not mention follow
/// in default order.
pub fn ordered_keys<'a, I>(defaults: I, preferred: Option<&[String]>) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, u32)>,
{
    let mut by_order: Vec<(usize, &'a str, u32)> = defaults
        .into_iter()
        .enumerate()
        .map(|(index, (key, order))| (index, key, order))
        .collect();
    by_order.sort_by_key(|(index, _, order)| (*order, *index));
    let known: BTreeSet<&str> = by_order.iter().map(|(_, key, _)| *key).collect();

    let mut placed = BTreeSet::new();
    let mut keys = Vec::with_capacity(by_order.len());
    for key in preferred.unwrap_or_default() {
        if known.contains(key.as_str()) && placed.insert(key.clone()) {
            keys.push(key.clone());
        } else if !known.contains(key.as_str()) {
            tracing::debug!(key = %key, "personalized key no longer configured");
        }
    }
    for (_, key, _) in by_order {
        if placed.insert(key.to_owned()) {
            keys.push(key.to_owned());
        }
    }
    keys
}

/// Resolved column presentation for one grid: parent columns in display
/// order with a hidden set, plus the columns shown in nested sub-rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnLayout {
    columns: Vec<Column>,
    hidden: BTreeSet<String>,
    sub_row: Vec<Column>,
}

impl ColumnLayout {
    pub fn resolve(columns: &[Column], document: Option<&PersonalizationDocument>) -> Self {
        let parent: Vec<&Column> = columns.iter().filter(|column| !column.sub_row).collect();
        let nested: Vec<&Column> = columns.iter().filter(|column| column.sub_row).collect();

        let parent_order = ordered_keys(
            parent.iter().map(|column| (column.key.as_str(), column.order)),
            document.and_then(|document| document.column_order.as_deref()),
        );
        let ordered = pick(&parent, &parent_order);

        let hidden = match document.and_then(|document| document.visible_fields.as_ref()) {
            Some(visible) => ordered
                .iter()
                .filter(|column| !visible.contains(&column.key))
                .map(|column| column.key.clone())
                .collect(),
            None => BTreeSet::new(),
        };

        let sub_row = match document.and_then(|document| document.sub_row_columns.as_deref()) {
            Some(keys) => {
                let listed: Vec<String> = keys
                    .iter()
                    .filter(|key| nested.iter().any(|column| &column.key == *key))
                    .cloned()
                    .collect();
                pick(&nested, &listed)
            }
            None => {
                let order = ordered_keys(
                    nested.iter().map(|column| (column.key.as_str(), column.order)),
                    None,
                );
                pick(&nested, &order)
            }
        };

        Self {
            columns: ordered,
            hidden,
            sub_row,
        }
    }

    /// Visible parent columns in display order.
    pub fn visible(&self) -> Vec<&Column> {
        self.columns
            .iter()
            .filter(|column| !self.hidden.contains(&column.key))
            .collect()
    }

    pub fn sub_row_columns(&self) -> &[Column] {
        &self.sub_row
    }

    pub fn is_hidden(&self, key: &str) -> bool {
        self.hidden.contains(key)
    }

    /// Hides a visible column. The last visible column cannot be hidden.
    pub fn hide(&mut self, key: &str) -> bool {
        let visible = self.visible();
        if visible.len() <= 1 || !visible.iter().any(|column| column.key == key) {
            return false;
        }
        self.hidden.insert(key.to_owned())
    }

    pub fn show_all(&mut self) -> bool {
        let changed = !self.hidden.is_empty();
        self.hidden.clear();
        changed
    }

    /// Swaps a column with its visible neighbour `delta` steps away
    /// (negative moves left).
    pub fn move_column(&mut self, key: &str, delta: isize) -> bool {
        let visible: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, column)| !self.hidden.contains(&column.key))
            .map(|(index, _)| index)
            .collect();
        let Some(position) = visible
            .iter()
            .position(|index| self.columns[*index].key == key)
        else {
            return false;
        };
        let Some(target) = position.checked_add_signed(delta) else {
            return false;
        };
        let Some(target) = visible.get(target).copied() else {
            return false;
        };
        self.columns.swap(visible[position], target);
        true
    }

    /// Document capturing this layout. Form-related keys of `base` are kept.
    pub fn to_document(&self, base: Option<&PersonalizationDocument>) -> PersonalizationDocument {
        let mut document = base.cloned().unwrap_or_default();
        document.column_order = Some(self.columns.iter().map(|column| column.key.clone()).collect());
        document.visible_fields = Some(
            self.visible()
                .into_iter()
                .map(|column| column.key.clone())
                .collect(),
        );
        document.sub_row_columns = Some(self.sub_row.iter().map(|column| column.key.clone()).collect());
        document
    }
}

fn pick(columns: &[&Column], keys: &[String]) -> Vec<Column> {
    keys.iter()
        .filter_map(|key| columns.iter().find(|column| &column.key == key))
        .map(|column| (*column).clone())
        .collect()
}
