// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Configuration-driven form panels.
//!
//! Each field is either controlled (the panel mirrors a value owned by the
//! caller and routes every change back out) or uncontrolled (the panel keeps
//! the buffer and hands out snapshots on request).

use anyhow::{Result, bail};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Instant;
use thiserror::Error;
use time::Date;
use time::macros::format_description;

use crate::codec::{OptionRef, SelectOption, decode_option_ref};
use crate::fetch::{
    FetchCompletion, FetchOrigin, FetchOutcome, FetchRequest, FetchSettings, OptionSource,
};
use crate::ids::Generation;
use crate::layout::ordered_keys;
use crate::lazy_select::{LazySelectField, SelectMode};
use crate::personalization::PersonalizationDocument;

#[derive(Clone)]
pub enum FieldKind {
    Text,
    TextArea,
    Number,
    Date,
    Checkbox,
    Radio { options: Vec<SelectOption> },
    Dropdown { options: Vec<SelectOption> },
    InputDropdown { options: Vec<SelectOption> },
    LazySelect {
        source: Arc<dyn OptionSource>,
        multi: bool,
    },
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Radio { options } | Self::Dropdown { options } | Self::InputDropdown { options } => f
                .debug_struct(self.as_str())
                .field("options", options)
                .finish(),
            Self::LazySelect { multi, .. } => f
                .debug_struct(self.as_str())
                .field("multi", multi)
                .finish_non_exhaustive(),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::TextArea => "textarea",
            Self::Number => "number",
            Self::Date => "date",
            Self::Checkbox => "checkbox",
            Self::Radio { .. } => "radio",
            Self::Dropdown { .. } => "dropdown",
            Self::InputDropdown { .. } => "inputdropdown",
            Self::LazySelect { .. } => "lazyselect",
        }
    }

    /// Static options; empty for free-text and lazy kinds.
    pub fn options(&self) -> &[SelectOption] {
        match self {
            Self::Radio { options } | Self::Dropdown { options } | Self::InputDropdown { options } => {
                options
            }
            _ => &[],
        }
    }

    pub fn empty_value(&self) -> FieldValue {
        match self {
            Self::LazySelect { multi: true, .. } => FieldValue::Choices(Vec::new()),
            _ => FieldValue::Empty,
        }
    }

    /// Whether `value` has the shape this kind stores.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (Self::LazySelect { multi: true, .. }, FieldValue::Choices(_)) => true,
            (Self::LazySelect { multi: true, .. }, _) => false,
            (_, FieldValue::Empty) => true,
            (Self::Text | Self::TextArea | Self::Number, FieldValue::Text(_)) => true,
            (Self::Radio { options } | Self::Dropdown { options }, FieldValue::Text(value)) => {
                options.iter().any(|option| &option.value == value)
            }
            (Self::Date, FieldValue::Date(_)) => true,
            (Self::Checkbox, FieldValue::Flag(_)) => true,
            (Self::InputDropdown { .. }, FieldValue::Composite { .. }) => true,
            (Self::LazySelect { multi: false, .. }, FieldValue::Choice(_)) => true,
            _ => false,
        }
    }

    fn select_mode(&self) -> Option<SelectMode> {
        match self {
            Self::LazySelect { multi: true, .. } => Some(SelectMode::Multi),
            Self::LazySelect { multi: false, .. } => Some(SelectMode::Single),
            _ => None,
        }
    }
}

/// A field's value, shaped by its [`FieldKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Empty,
    Text(String),
    Flag(bool),
    Date(Date),
    Composite { input: String, dropdown: String },
    Choice(OptionRef),
    Choices(Vec<OptionRef>),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn composite(input: impl Into<String>, dropdown: impl Into<String>) -> Self {
        Self::Composite {
            input: input.into(),
            dropdown: dropdown.into(),
        }
    }

    /// Mandatory-field emptiness. An unchecked checkbox counts as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(value) => value.trim().is_empty(),
            Self::Flag(value) => !value,
            Self::Date(_) => false,
            Self::Composite { input, .. } => input.trim().is_empty(),
            Self::Choice(choice) => choice.id.is_empty(),
            Self::Choices(choices) => choices.is_empty(),
        }
    }

    pub fn to_wire(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Text(value) => Value::String(value.clone()),
            Self::Flag(value) => Value::Bool(*value),
            Self::Date(value) => Value::String(value.to_string()),
            Self::Composite { input, dropdown } => json!({ "input": input, "dropdown": dropdown }),
            Self::Choice(choice) => Value::String(choice.encode()),
            Self::Choices(choices) => {
                Value::Array(choices.iter().map(|choice| Value::String(choice.encode())).collect())
            }
        }
    }

    pub fn from_wire(kind: &FieldKind, value: &Value) -> Result<Self> {
        let parsed = match (kind, value) {
            (_, Value::Null) => kind.empty_value(),
            (FieldKind::Number, Value::Number(number)) => Self::Text(number.to_string()),
            (
                FieldKind::Text
                | FieldKind::TextArea
                | FieldKind::Number
                | FieldKind::Radio { .. }
                | FieldKind::Dropdown { .. },
                Value::String(text),
            ) => Self::Text(text.clone()),
            (FieldKind::Date, Value::String(text)) => {
                match Date::parse(text, &format_description!("[year]-[month]-[day]")) {
                    Ok(date) => Self::Date(date),
                    Err(_) => bail!("date field value {text:?} must be YYYY-MM-DD"),
                }
            }
            (FieldKind::Checkbox, Value::Bool(flag)) => Self::Flag(*flag),
            (FieldKind::InputDropdown { .. }, Value::Object(object)) => Self::Composite {
                input: wire_string(object, "input")?,
                dropdown: wire_string(object, "dropdown")?,
            },
            (FieldKind::LazySelect { multi: false, .. }, Value::String(raw)) => {
                Self::Choice(decode_option_ref(raw))
            }
            (FieldKind::LazySelect { multi: true, .. }, Value::Array(items)) => {
                let mut choices = Vec::with_capacity(items.len());
                for item in items {
                    let Value::String(raw) = item else {
                        bail!("multi-select entries must be strings, got {item}");
                    };
                    choices.push(decode_option_ref(raw));
                }
                Self::Choices(choices)
            }
            _ => bail!("value {value} does not fit a {} field", kind.as_str()),
        };
        if !kind.accepts(&parsed) {
            bail!("value {value} is not one of the {} field's options", kind.as_str());
        }
        Ok(parsed)
    }

    fn selection(&self) -> Vec<OptionRef> {
        match self {
            Self::Choice(choice) => vec![choice.clone()],
            Self::Choices(choices) => choices.clone(),
            _ => Vec::new(),
        }
    }
}

fn wire_string(object: &Map<String, Value>, key: &str) -> Result<String> {
    match object.get(key) {
        Some(Value::String(value)) => Ok(value.clone()),
        None | Some(Value::Null) => Ok(String::new()),
        Some(other) => bail!("{key} must be a string, got {other}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldMode {
    Controlled,
    #[default]
    Uncontrolled,
}

#[derive(Debug, Clone)]
pub struct FieldConfig {
    pub id: String,
    pub label: String,
    pub kind: FieldKind,
    pub value: FieldValue,
    pub mandatory: bool,
    pub visible: bool,
    pub editable: bool,
    pub order: u32,
    pub width: Option<u16>,
    pub mode: FieldMode,
}

impl FieldConfig {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        let value = kind.empty_value();
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            value,
            mandatory: false,
            visible: true,
            editable: true,
            order: 0,
            width: None,
            mode: FieldMode::Uncontrolled,
        }
    }

    pub fn value(mut self, value: FieldValue) -> Self {
        self.value = value;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    pub fn order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn width(mut self, width: u16) -> Self {
        self.width = Some(width);
        self
    }

    pub fn controlled(mut self) -> Self {
        self.mode = FieldMode::Controlled;
        self
    }
}

/// The field set for one panel. Panels compare configs by `Arc` identity: a
/// new `Arc` means a new configuration and triggers a remount.
#[derive(Debug, Clone, Default)]
pub struct FormConfig {
    pub fields: Vec<FieldConfig>,
}

impl FormConfig {
    pub fn new(fields: Vec<FieldConfig>) -> Arc<Self> {
        Arc::new(Self { fields })
    }

    pub fn field(&self, id: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|field| field.id == id)
    }
}

/// Field id to value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormValues(BTreeMap<String, FieldValue>);

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<String>, value: FieldValue) -> Self {
        self.0.insert(id.into(), value);
        self
    }

    pub fn insert(&mut self, id: impl Into<String>, value: FieldValue) {
        self.0.insert(id.into(), value);
    }

    pub fn get(&self, id: &str) -> Option<&FieldValue> {
        self.0.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(id, value)| (id.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON object in the server payload shape.
    pub fn to_wire(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(id, value)| (id.clone(), value.to_wire()))
                .collect(),
        )
    }

    /// Reads a payload object against `config`. Keys without a configured
    /// field are skipped.
    pub fn from_wire(config: &FormConfig, value: &Value) -> Result<Self> {
        let Value::Object(object) = value else {
            bail!("form values must be a JSON object, got {value}");
        };
        let mut values = Self::new();
        for (id, raw) in object {
            let Some(field) = config.field(id) else {
                tracing::debug!(field = %id, "payload key has no configured field");
                continue;
            };
            let parsed = FieldValue::from_wire(&field.kind, raw)
                .map_err(|error| error.context(format!("field {id:?}")))?;
            values.insert(id.clone(), parsed);
        }
        Ok(values)
    }
}

impl FromIterator<(String, FieldValue)> for FormValues {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fix these fields: {}", .labels.join(", "))]
pub struct ValidationFailure {
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationFailure),
    #[error("save rejected: {0}")]
    Rejected(String),
}

/// A change on a controlled field, for the caller to apply to its own state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub id: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOutcome {
    Buffered,
    Routed(FieldChange),
    Ignored,
}

/// Ids that [`FormPanel::set_form_values`] could not apply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetValuesReport {
    pub ignored: Vec<String>,
    pub rejected: Vec<String>,
}

impl SetValuesReport {
    pub fn is_clean(&self) -> bool {
        self.ignored.is_empty() && self.rejected.is_empty()
    }
}

#[derive(Debug)]
pub struct FormPanel {
    config: Arc<FormConfig>,
    settings: FetchSettings,
    mount: Generation,
    values: BTreeMap<String, FieldValue>,
    lazy: BTreeMap<String, LazySelectField>,
    order: Vec<String>,
    hidden: BTreeSet<String>,
    personalization: Option<PersonalizationDocument>,
}

impl FormPanel {
    /// Mounts `config`, seeding uncontrolled fields from `initial` and
    /// controlled fields from their configured value.
    pub fn mount(config: Arc<FormConfig>, initial: &FormValues, settings: FetchSettings) -> Self {
        let mut panel = Self {
            config,
            settings,
            mount: Generation::unique(),
            values: BTreeMap::new(),
            lazy: BTreeMap::new(),
            order: Vec::new(),
            hidden: BTreeSet::new(),
            personalization: None,
        };
        panel.seed(initial);
        panel
    }

    pub fn config(&self) -> &Arc<FormConfig> {
        &self.config
    }

    /// Identifies the current mount. Unique across panels in the process and
    /// replaced on every remount.
    pub fn mount_generation(&self) -> Generation {
        self.mount
    }

    /// Swaps in a new configuration. The same `Arc` is a no-op; anything else
    /// remounts every field from `initial`, dropping buffers and in-flight
    /// option fetches.
    pub fn reconfigure(&mut self, config: Arc<FormConfig>, initial: &FormValues) -> bool {
        if Arc::ptr_eq(&self.config, &config) {
            return false;
        }
        tracing::debug!(mount = %self.mount, "form configuration changed; remounting");
        self.config = config;
        self.mount = Generation::unique();
        self.seed(initial);
        true
    }

    fn seed(&mut self, initial: &FormValues) {
        self.values.clear();
        self.lazy.clear();

        let config = Arc::clone(&self.config);
        let mut seen = BTreeSet::new();
        for field in &config.fields {
            if !seen.insert(field.id.as_str()) {
                tracing::error!(field = %field.id, "duplicate field id ignored");
                continue;
            }

            let seeded = match (field.mode, initial.get(&field.id)) {
                (FieldMode::Uncontrolled, Some(value)) if field.kind.accepts(value) => value.clone(),
                (FieldMode::Uncontrolled, Some(_)) => {
                    tracing::error!(field = %field.id, "initial value has the wrong shape");
                    self.configured_value(field)
                }
                _ => self.configured_value(field),
            };

            match field.kind.select_mode() {
                Some(mode) => {
                    let mut select = LazySelectField::new(
                        FetchOrigin::new(field.id.clone(), self.mount),
                        mode,
                        self.settings,
                    );
                    select.set_selection(seeded.selection());
                    self.lazy.insert(field.id.clone(), select);
                }
                None => {
                    self.values.insert(field.id.clone(), seeded);
                }
            }
        }
        self.resolve_layout();
    }

    fn configured_value(&self, field: &FieldConfig) -> FieldValue {
        if field.kind.accepts(&field.value) {
            field.value.clone()
        } else {
            tracing::error!(field = %field.id, "configured value has the wrong shape");
            field.kind.empty_value()
        }
    }

    pub fn field_config(&self, id: &str) -> Option<&FieldConfig> {
        self.config.field(id)
    }

    pub fn value(&self, id: &str) -> Option<FieldValue> {
        let field = self.config.field(id)?;
        if let Some(select) = self.lazy.get(id) {
            let selection = select.selection();
            return Some(match field.kind.select_mode() {
                Some(SelectMode::Multi) => FieldValue::Choices(selection.to_vec()),
                _ => selection
                    .first()
                    .cloned()
                    .map(FieldValue::Choice)
                    .unwrap_or(FieldValue::Empty),
            });
        }
        self.values.get(id).cloned()
    }

    /// User edit on a field. Controlled fields are not written; the change is
    /// returned for the caller to apply through
    /// [`set_controlled_value`](Self::set_controlled_value).
    pub fn input(&mut self, id: &str, value: FieldValue) -> InputOutcome {
        let Some(field) = self.config.field(id) else {
            tracing::error!(field = %id, "input for unknown field ignored");
            return InputOutcome::Ignored;
        };
        if !field.editable {
            tracing::debug!(field = %id, "input for read-only field ignored");
            return InputOutcome::Ignored;
        }
        if !field.kind.accepts(&value) {
            tracing::error!(field = %id, kind = field.kind.as_str(), "input has the wrong shape");
            return InputOutcome::Ignored;
        }
        match field.mode {
            FieldMode::Controlled => InputOutcome::Routed(FieldChange {
                id: id.to_owned(),
                value,
            }),
            FieldMode::Uncontrolled => {
                self.write(id, value);
                InputOutcome::Buffered
            }
        }
    }

    /// Pushes the owner's value into a controlled field.
    pub fn set_controlled_value(&mut self, id: &str, value: FieldValue) -> bool {
        let accepted = self.config.field(id).is_some_and(|field| {
            field.mode == FieldMode::Controlled && field.kind.accepts(&value)
        });
        if accepted {
            self.write(id, value);
        } else {
            tracing::error!(field = %id, "controlled value rejected");
        }
        accepted
    }

    pub fn get_form_values(&self) -> FormValues {
        let mut values = FormValues::new();
        for field in &self.config.fields {
            if values.get(&field.id).is_some() {
                continue;
            }
            if let Some(value) = self.value(&field.id) {
                values.insert(field.id.clone(), value);
            }
        }
        values
    }

    /// Replaces the values of mounted fields. Unknown ids and values of the
    /// wrong shape are skipped and reported.
    pub fn set_form_values(&mut self, values: &FormValues) -> SetValuesReport {
        let mut report = SetValuesReport::default();
        for (id, value) in values.iter() {
            let Some(field) = self.config.field(id) else {
                tracing::error!(field = %id, "set_form_values: unknown field id ignored");
                report.ignored.push(id.to_owned());
                continue;
            };
            if !field.kind.accepts(value) {
                tracing::error!(
                    field = %id,
                    kind = field.kind.as_str(),
                    "set_form_values: value has the wrong shape"
                );
                report.rejected.push(id.to_owned());
                continue;
            }
            self.write(id, value.clone());
        }
        report
    }

    fn write(&mut self, id: &str, value: FieldValue) {
        match self.lazy.get_mut(id) {
            Some(select) => select.set_selection(value.selection()),
            None => {
                self.values.insert(id.to_owned(), value);
            }
        }
    }

    /// Checks mandatory and numeric fields among the visible ones. Hidden
    /// fields are never reported.
    pub fn validate(&self) -> Result<(), ValidationFailure> {
        let mut labels = Vec::new();
        for field in self.visible_fields() {
            let value = self.value(&field.id).unwrap_or(FieldValue::Empty);
            let malformed_number = matches!(
                (&field.kind, &value),
                (FieldKind::Number, FieldValue::Text(text))
                    if !text.trim().is_empty()
                        && text.trim().replace(',', "").parse::<f64>().is_err()
            );
            if (field.mandatory && value.is_empty()) || malformed_number {
                labels.push(field.label.clone());
            }
        }
        if labels.is_empty() {
            Ok(())
        } else {
            Err(ValidationFailure { labels })
        }
    }

    /// Validates, then hands the snapshot to `handler`. Nothing is cleared on
    /// failure.
    pub fn submit<F>(&self, handler: F) -> Result<FormValues, SubmitError>
    where
        F: FnOnce(&FormValues) -> Result<(), String>,
    {
        self.validate()?;
        let values = self.get_form_values();
        if let Err(reason) = handler(&values) {
            tracing::warn!(error = %reason, "form save rejected");
            return Err(SubmitError::Rejected(reason));
        }
        Ok(values)
    }

    pub fn apply_personalization(&mut self, document: Option<PersonalizationDocument>) {
        self.personalization = document;
        self.resolve_layout();
    }

    fn resolve_layout(&mut self) {
        let document = self.personalization.as_ref();
        let mut seen = BTreeSet::new();
        let defaults: Vec<(&str, u32)> = self
            .config
            .fields
            .iter()
            .filter(|field| seen.insert(field.id.as_str()))
            .map(|field| (field.id.as_str(), field.order))
            .collect();
        let order = ordered_keys(
            defaults,
            document.and_then(|document| document.field_order.as_deref()),
        );
        let visible = document.and_then(|document| document.visible_fields.as_ref());
        let hidden = self
            .config
            .fields
            .iter()
            .filter(|field| {
                !field.visible || visible.is_some_and(|visible| !visible.contains(&field.id))
            })
            .map(|field| field.id.clone())
            .collect();
        self.order = order;
        self.hidden = hidden;
    }

    /// Visible fields in display order.
    pub fn visible_fields(&self) -> Vec<&FieldConfig> {
        self.order
            .iter()
            .filter(|id| !self.hidden.contains(*id))
            .filter_map(|id| self.config.field(id))
            .collect()
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.config.field(id).is_some() && !self.hidden.contains(id)
    }

    pub fn lazy_field(&self, id: &str) -> Option<&LazySelectField> {
        self.lazy.get(id)
    }

    pub fn lazy_field_mut(&mut self, id: &str) -> Option<&mut LazySelectField> {
        self.lazy.get_mut(id)
    }

    pub fn open_lazy(&mut self, id: &str) -> Option<FetchRequest> {
        self.lazy.get_mut(id)?.open()
    }

    pub fn type_lazy(&mut self, id: &str, text: &str, now: Instant) -> bool {
        match self.lazy.get_mut(id) {
            Some(select) => {
                select.type_query(text, now);
                true
            }
            None => false,
        }
    }

    /// Picks a loaded option. For controlled fields the resulting value is
    /// routed out instead of stored.
    pub fn pick_option(&mut self, id: &str, index: usize) -> InputOutcome {
        let Some(field) = self.config.field(id) else {
            return InputOutcome::Ignored;
        };
        let mode = field.mode;
        let editable = field.editable;
        let Some(select) = self.lazy.get_mut(id) else {
            return InputOutcome::Ignored;
        };
        let Some(choice) = select.options().get(index).map(SelectOption::to_option_ref) else {
            return InputOutcome::Ignored;
        };
        if !editable {
            return InputOutcome::Ignored;
        }

        match mode {
            FieldMode::Uncontrolled => {
                select.select(choice);
                InputOutcome::Buffered
            }
            FieldMode::Controlled => {
                let value = match select.mode() {
                    SelectMode::Single => {
                        select.close();
                        FieldValue::Choice(choice)
                    }
                    SelectMode::Multi => {
                        let mut choices = select.selection().to_vec();
                        match choices.iter().position(|entry| entry.id == choice.id) {
                            Some(position) => {
                                choices.remove(position);
                            }
                            None => choices.push(choice),
                        }
                        FieldValue::Choices(choices)
                    }
                };
                InputOutcome::Routed(FieldChange {
                    id: id.to_owned(),
                    value,
                })
            }
        }
    }

    /// Requests whose debounce window has closed, across all lazy fields.
    pub fn poll_lazy(&mut self, now: Instant) -> Vec<FetchRequest> {
        self.lazy
            .values_mut()
            .filter_map(|select| select.poll(now))
            .collect()
    }

    /// Next timer deadline across all lazy fields.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lazy
            .values()
            .filter_map(|select| select.client().next_deadline())
            .min()
    }

    /// Runs `request` through the source configured for its field.
    pub fn dispatch_fetch(&mut self, request: FetchRequest, tx: Sender<FetchCompletion>) {
        let source = match self.config.field(&request.origin.key).map(|field| &field.kind) {
            Some(FieldKind::LazySelect { source, .. }) => Arc::clone(source),
            _ => {
                tracing::error!(field = %request.origin.key, "fetch for a field without a source");
                return;
            }
        };
        if let Some(select) = self.lazy.get_mut(&request.origin.key) {
            select.client_mut().dispatch(request, source.as_ref(), tx);
        }
    }

    /// Routes a completion to its field. Completions from an earlier mount
    /// are discarded.
    pub fn apply_fetch(&mut self, completion: FetchCompletion) -> FetchOutcome {
        if completion.origin.mount != self.mount {
            tracing::debug!(
                field = %completion.origin.key,
                "option fetch from a previous mount discarded"
            );
            return FetchOutcome::Discarded;
        }
        match self.lazy.get_mut(&completion.origin.key) {
            Some(select) => select.apply(completion),
            None => FetchOutcome::Discarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FieldConfig, FieldKind, FieldValue, FormConfig, FormPanel, FormValues, InputOutcome,
        SubmitError,
    };
    use crate::codec::{OptionRef, SelectOption};
    use crate::fetch::{FetchOutcome, FetchSettings, OptionQuery};
    use crate::personalization::PersonalizationDocument;
    use anyhow::Result;
    use serde_json::json;
    use std::sync::{Arc, mpsc};
    use time::{Date, Month};

    fn customers(query: &OptionQuery) -> Result<Vec<SelectOption>> {
        Ok((query.offset..query.offset + 3)
            .map(|index| SelectOption::new(format!("Customer {index}"), format!("C-{index}")))
            .collect())
    }

    fn statuses() -> Vec<SelectOption> {
        vec![
            SelectOption::new("Open", "open"),
            SelectOption::new("Closed", "closed"),
        ]
    }

    fn config() -> Arc<FormConfig> {
        FormConfig::new(vec![
            FieldConfig::new("reference", "Reference", FieldKind::Text)
                .mandatory()
                .order(1),
            FieldConfig::new("notes", "Notes", FieldKind::TextArea).order(6),
            FieldConfig::new("weight", "Weight", FieldKind::Number).order(2),
            FieldConfig::new("pickup", "Pickup date", FieldKind::Date).order(3),
            FieldConfig::new("hazmat", "Hazmat", FieldKind::Checkbox).order(4),
            FieldConfig::new(
                "status",
                "Status",
                FieldKind::Radio {
                    options: statuses(),
                },
            )
            .controlled()
            .value(FieldValue::text("open"))
            .order(0),
            FieldConfig::new(
                "charge",
                "Charge",
                FieldKind::InputDropdown {
                    options: vec![SelectOption::new("USD", "USD")],
                },
            )
            .order(5),
            FieldConfig::new(
                "customer",
                "Customer",
                FieldKind::LazySelect {
                    source: Arc::new(customers),
                    multi: false,
                },
            )
            .mandatory()
            .order(7),
            FieldConfig::new(
                "carriers",
                "Carriers",
                FieldKind::LazySelect {
                    source: Arc::new(customers),
                    multi: true,
                },
            )
            .order(8),
            FieldConfig::new("internal", "Internal code", FieldKind::Text)
                .hidden()
                .mandatory()
                .order(9),
        ])
    }

    fn panel() -> FormPanel {
        FormPanel::mount(config(), &FormValues::new(), FetchSettings::default())
    }

    fn full_values() -> Result<FormValues> {
        Ok(FormValues::new()
            .with("reference", FieldValue::text("DB-100"))
            .with("notes", FieldValue::text("fragile"))
            .with("weight", FieldValue::text("1,200.5"))
            .with(
                "pickup",
                FieldValue::Date(Date::from_calendar_date(2026, Month::May, 4)?),
            )
            .with("hazmat", FieldValue::Flag(true))
            .with("status", FieldValue::text("closed"))
            .with("charge", FieldValue::composite("120", "USD"))
            .with(
                "customer",
                FieldValue::Choice(OptionRef::new("C-1", "ACME Freight")),
            )
            .with(
                "carriers",
                FieldValue::Choices(vec![OptionRef::new("K-1", "Kite"), OptionRef::new("K-2", "Lark")]),
            )
            .with("internal", FieldValue::text("X1")))
    }

    #[test]
    fn get_returns_exactly_what_set_pushed() -> Result<()> {
        let mut panel = panel();
        let values = full_values()?;
        assert!(panel.set_form_values(&values).is_clean());
        assert_eq!(panel.get_form_values(), values);

        let cleared = FormValues::new()
            .with("customer", FieldValue::Empty)
            .with("carriers", FieldValue::Choices(Vec::new()))
            .with("reference", FieldValue::Empty);
        panel.set_form_values(&cleared);
        let after = panel.get_form_values();
        for (id, value) in cleared.iter() {
            assert_eq!(after.get(id), Some(value), "{id}");
        }
        Ok(())
    }

    #[test]
    fn unknown_and_misshapen_values_are_reported() {
        let mut panel = panel();
        let report = panel.set_form_values(
            &FormValues::new()
                .with("ghost", FieldValue::text("boo"))
                .with("hazmat", FieldValue::text("yes"))
                .with("status", FieldValue::text("lost"))
                .with("reference", FieldValue::text("DB-7")),
        );
        assert_eq!(report.ignored, vec!["ghost".to_owned()]);
        assert_eq!(report.rejected, vec!["hazmat".to_owned(), "status".to_owned()]);
        assert_eq!(panel.value("reference"), Some(FieldValue::text("DB-7")));
        assert_eq!(panel.value("hazmat"), Some(FieldValue::Empty));
    }

    #[test]
    fn uncontrolled_fields_seed_from_initial_data_once() {
        let initial = FormValues::new().with("reference", FieldValue::text("DB-1"));
        let mut panel = FormPanel::mount(config(), &initial, FetchSettings::default());
        assert_eq!(panel.value("reference"), Some(FieldValue::text("DB-1")));

        assert_eq!(
            panel.input("reference", FieldValue::text("DB-2")),
            InputOutcome::Buffered
        );
        assert_eq!(panel.value("reference"), Some(FieldValue::text("DB-2")));
    }

    #[test]
    fn controlled_fields_route_changes_to_owner() {
        let mut panel = panel();
        let outcome = panel.input("status", FieldValue::text("closed"));
        let InputOutcome::Routed(change) = outcome else {
            panic!("controlled input should be routed, got {outcome:?}");
        };
        assert_eq!(change.value, FieldValue::text("closed"));
        assert_eq!(panel.value("status"), Some(FieldValue::text("open")));

        assert!(panel.set_controlled_value(&change.id, change.value.clone()));
        assert_eq!(panel.value("status"), Some(FieldValue::text("closed")));
        assert!(!panel.set_controlled_value("reference", FieldValue::text("x")));
    }

    #[test]
    fn same_config_identity_keeps_buffers() {
        let config = config();
        let mut panel = FormPanel::mount(Arc::clone(&config), &FormValues::new(), FetchSettings::default());
        panel.input("reference", FieldValue::text("typed"));
        assert!(!panel.reconfigure(Arc::clone(&config), &FormValues::new()));
        assert_eq!(panel.value("reference"), Some(FieldValue::text("typed")));
    }

    #[test]
    fn new_config_identity_remounts_fresh() {
        let mut panel = panel();
        panel.input("reference", FieldValue::text("typed"));
        let request = panel.open_lazy("customer").expect("first page");
        let before = panel.mount_generation();

        let initial = FormValues::new().with("notes", FieldValue::text("seeded"));
        assert!(panel.reconfigure(config(), &initial));
        assert!(panel.mount_generation() > before);
        assert_eq!(panel.value("reference"), Some(FieldValue::Empty));
        assert_eq!(panel.value("notes"), Some(FieldValue::text("seeded")));

        let (tx, rx) = mpsc::channel();
        super::OptionSource::spawn_search(&customers, request, tx).expect("channel open");
        let completion = rx.recv().expect("completion sent");
        assert_eq!(panel.apply_fetch(completion), FetchOutcome::Discarded);
        assert!(panel.lazy_field("customer").expect("mounted").options().is_empty());
    }

    #[test]
    fn dropped_panel_completions_never_reach_a_new_panel() -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let mut old = panel();
        let request = old.open_lazy("customer").expect("first page");
        old.dispatch_fetch(request, tx.clone());
        drop(old);

        let mut fresh = panel();
        let fresh_request = fresh.open_lazy("customer").expect("first page");
        let stale = rx.recv()?;
        assert_eq!(stale.request_id, fresh_request.request_id);
        assert_ne!(stale.origin.mount, fresh.mount_generation());
        assert_eq!(fresh.apply_fetch(stale), FetchOutcome::Discarded);
        assert!(fresh.lazy_field("customer").expect("mounted").options().is_empty());

        fresh.dispatch_fetch(fresh_request, tx);
        assert_eq!(
            fresh.apply_fetch(rx.recv()?),
            FetchOutcome::Applied { added: 3 }
        );
        Ok(())
    }

    #[test]
    fn validation_lists_visible_failures_only() {
        let mut panel = panel();
        panel.input("weight", FieldValue::text("heavy"));
        let failure = panel.validate().expect_err("mandatory fields empty");
        assert_eq!(
            failure.labels,
            vec![
                "Reference".to_owned(),
                "Weight".to_owned(),
                "Customer".to_owned()
            ]
        );

        panel.input("weight", FieldValue::text("1,500"));
        panel.input("reference", FieldValue::text("DB-5"));
        panel.input(
            "customer",
            FieldValue::Choice(OptionRef::new("C-1", "ACME")),
        );
        assert!(panel.validate().is_ok());
    }

    #[test]
    fn rejected_submit_keeps_values() {
        let mut panel = panel();
        assert!(matches!(
            panel.submit(|_| Ok(())),
            Err(SubmitError::Invalid(_))
        ));

        panel.input("reference", FieldValue::text("DB-5"));
        panel.input("customer", FieldValue::Choice(OptionRef::new("C-1", "ACME")));
        assert_eq!(
            panel.submit(|_| Err("duplicate reference".to_owned())),
            Err(SubmitError::Rejected("duplicate reference".to_owned()))
        );
        assert_eq!(panel.value("reference"), Some(FieldValue::text("DB-5")));

        let saved = panel.submit(|_| Ok(())).expect("valid form");
        assert_eq!(saved.get("reference"), Some(&FieldValue::text("DB-5")));
    }

    #[test]
    fn personalization_orders_and_hides_fields() {
        let mut panel = panel();
        let ids = |panel: &FormPanel| -> Vec<String> {
            panel
                .visible_fields()
                .into_iter()
                .map(|field| field.id.clone())
                .collect()
        };
        assert_eq!(ids(&panel)[..3], ["status", "reference", "weight"]);
        assert!(!panel.is_visible("internal"));

        panel.apply_personalization(Some(PersonalizationDocument {
            field_order: Some(vec!["customer".to_owned(), "reference".to_owned()]),
            visible_fields: Some(vec![
                "customer".to_owned(),
                "reference".to_owned(),
                "internal".to_owned(),
            ]),
            ..PersonalizationDocument::default()
        }));
        assert_eq!(ids(&panel), vec!["customer", "reference"]);

        panel.apply_personalization(None);
        assert_eq!(ids(&panel).len(), 9);
    }

    #[test]
    fn wire_payload_uses_piped_and_composite_shapes() -> Result<()> {
        let values = full_values()?;
        let wire = values.to_wire();
        assert_eq!(wire["customer"], json!("C-1 || ACME Freight"));
        assert_eq!(wire["carriers"], json!(["K-1 || Kite", "K-2 || Lark"]));
        assert_eq!(wire["charge"], json!({"input": "120", "dropdown": "USD"}));
        assert_eq!(wire["pickup"], json!("2026-05-04"));

        let parsed = FormValues::from_wire(&config(), &wire)?;
        assert_eq!(parsed, values);
        Ok(())
    }

    #[test]
    fn wire_values_must_fit_the_field() {
        let config = config();
        assert!(FormValues::from_wire(&config, &json!({"hazmat": "yes"})).is_err());
        assert!(FormValues::from_wire(&config, &json!({"pickup": "05/04/2026"})).is_err());
        assert!(FormValues::from_wire(&config, &json!({"status": "lost"})).is_err());
        assert!(FormValues::from_wire(&config, &json!([1, 2])).is_err());
    }

    #[test]
    fn lazy_fields_fetch_and_pick_through_the_panel() -> Result<()> {
        let mut panel = panel();
        let (tx, rx) = mpsc::channel();
        let request = panel.open_lazy("customer").expect("first page");
        panel.dispatch_fetch(request, tx);
        assert_eq!(
            panel.apply_fetch(rx.recv()?),
            FetchOutcome::Applied { added: 3 }
        );

        assert_eq!(panel.pick_option("customer", 2), InputOutcome::Buffered);
        assert_eq!(
            panel.value("customer"),
            Some(FieldValue::Choice(OptionRef::new("C-2", "Customer 2")))
        );
        assert_eq!(panel.pick_option("customer", 9), InputOutcome::Ignored);
        Ok(())
    }
}
