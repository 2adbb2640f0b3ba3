// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use thiserror::Error;
use time::Date;
use time::macros::format_description;

use crate::codec::{OptionRef, decode_option_ref};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Text,
    Badge,
    Integer,
    Decimal,
    Date,
    Checkbox,
    LazySelect,
}

impl ColumnType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Badge => "badge",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::Checkbox => "checkbox",
            Self::LazySelect => "lazyselect",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "badge" => Some(Self::Badge),
            "integer" => Some(Self::Integer),
            "decimal" => Some(Self::Decimal),
            "date" => Some(Self::Date),
            "checkbox" => Some(Self::Checkbox),
            "lazyselect" => Some(Self::LazySelect),
            _ => None,
        }
    }

    /// Converts edit-buffer text into a typed cell value. Blank input clears
    /// the cell.
    pub fn parse_input(self, raw: &str) -> Result<CellValue, CellParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(CellValue::Null);
        }

        match self {
            Self::Text | Self::Badge => Ok(CellValue::Text(raw.to_owned())),
            Self::Integer => trimmed
                .replace(',', "")
                .parse::<i64>()
                .map(CellValue::Integer)
                .map_err(|_| CellParseError::new(self, trimmed)),
            Self::Decimal => match trimmed.replace(',', "").parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(CellValue::Decimal(value)),
                _ => Err(CellParseError::new(self, trimmed)),
            },
            Self::Date => parse_date(trimmed)
                .map(CellValue::Date)
                .ok_or_else(|| CellParseError::new(self, trimmed)),
            Self::Checkbox => match trimmed.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => Ok(CellValue::Bool(true)),
                "0" | "false" | "off" | "no" => Ok(CellValue::Bool(false)),
                _ => Err(CellParseError::new(self, trimmed)),
            },
            Self::LazySelect => Ok(CellValue::Option(decode_option_ref(trimmed))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{input:?} is not a valid {} value", kind.as_str())]
pub struct CellParseError {
    pub kind: ColumnType,
    pub input: String,
}

impl CellParseError {
    fn new(kind: ColumnType, input: &str) -> Self {
        Self {
            kind,
            input: input.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub width: Option<u16>,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub filterable: bool,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub sub_row: bool,
}

impl Column {
    pub fn new(key: impl Into<String>, label: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            column_type,
            width: None,
            sortable: false,
            filterable: false,
            editable: false,
            order: 0,
            sub_row: false,
        }
    }

    pub fn width(mut self, width: u16) -> Self {
        self.width = Some(width);
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    pub fn order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn sub_row(mut self) -> Self {
        self.sub_row = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Bool(bool),
    Date(Date),
    Option(OptionRef),
    Rows(Vec<Row>),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Text(value) => value.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Decimal(value) => format!("{value:.2}"),
            Self::Bool(true) => "yes".to_owned(),
            Self::Bool(false) => "no".to_owned(),
            Self::Date(value) => value.to_string(),
            Self::Option(value) => value.name.clone(),
            Self::Rows(rows) => format!("{} rows", rows.len()),
        }
    }

    /// Text seeded into an edit buffer; parses back to the same value
    /// through [`ColumnType::parse_input`].
    pub fn edit_text(&self) -> String {
        match self {
            Self::Decimal(value) => value.to_string(),
            Self::Bool(value) => value.to_string(),
            Self::Option(value) => value.encode(),
            _ => self.display(),
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(value) => value.trim().is_empty(),
            _ => false,
        }
    }

    pub fn cmp_value(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Integer(left), Self::Integer(right)) => left.cmp(right),
            (Self::Decimal(left), Self::Decimal(right)) => left.total_cmp(right),
            (Self::Integer(left), Self::Decimal(right)) => (*left as f64).total_cmp(right),
            (Self::Decimal(left), Self::Integer(right)) => left.total_cmp(&(*right as f64)),
            (Self::Date(left), Self::Date(right)) => left.cmp(right),
            (Self::Bool(left), Self::Bool(right)) => left.cmp(right),
            (Self::Rows(left), Self::Rows(right)) => left.len().cmp(&right.len()),
            _ => self
                .display()
                .to_ascii_lowercase()
                .cmp(&other.display().to_ascii_lowercase()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Text(value) => Value::String(value.clone()),
            Self::Integer(value) => Value::Number((*value).into()),
            Self::Decimal(value) => Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Bool(value) => Value::Bool(*value),
            Self::Date(value) => Value::String(value.to_string()),
            Self::Option(value) => Value::String(value.encode()),
            Self::Rows(rows) => Value::Array(rows.iter().map(Row::to_json).collect()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Date> for CellValue {
    fn from(value: Date) -> Self {
        Self::Date(value)
    }
}

impl From<OptionRef> for CellValue {
    fn from(value: OptionRef) -> Self {
        Self::Option(value)
    }
}

/// A record in the grid: column key to value. A nested collection lives
/// under whichever key the grid is configured to treat as nested data.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    cells: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.cells.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.cells.get(key)
    }

    pub fn value(&self, key: &str) -> CellValue {
        self.cells.get(key).cloned().unwrap_or(CellValue::Null)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<CellValue>) {
        self.cells.insert(key.into(), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Shallow merge: every key present in `partial` overwrites this row.
    pub fn merge(&mut self, partial: &Row) {
        for (key, value) in &partial.cells {
            self.cells.insert(key.clone(), value.clone());
        }
    }

    pub fn nested(&self, key: &str) -> &[Row] {
        match self.cells.get(key) {
            Some(CellValue::Rows(rows)) => rows,
            _ => &[],
        }
    }

    pub fn nested_mut(&mut self, key: &str) -> Option<&mut Vec<Row>> {
        match self.cells.get_mut(key) {
            Some(CellValue::Rows(rows)) => Some(rows),
            _ => None,
        }
    }

    pub fn from_json(value: &Value, nested_key: Option<&str>) -> Result<Self> {
        let Value::Object(object) = value else {
            bail!("row must be a JSON object, got {value}");
        };

        let mut row = Row::new();
        for (key, field) in object {
            let cell = if Some(key.as_str()) == nested_key {
                let Value::Array(items) = field else {
                    bail!("nested data under {key:?} must be an array");
                };
                let rows = items
                    .iter()
                    .map(|item| Row::from_json(item, nested_key))
                    .collect::<Result<Vec<_>>>()?;
                CellValue::Rows(rows)
            } else {
                scalar_from_json(field)
            };
            row.cells.insert(key.clone(), cell);
        }
        Ok(row)
    }

    pub fn to_json(&self) -> Value {
        let object: Map<String, Value> = self
            .cells
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();
        Value::Object(object)
    }
}

fn scalar_from_json(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Null,
        Value::Bool(value) => CellValue::Bool(*value),
        Value::Number(number) => match number.as_i64() {
            Some(value) => CellValue::Integer(value),
            None => number
                .as_f64()
                .map(CellValue::Decimal)
                .unwrap_or(CellValue::Null),
        },
        Value::String(value) => CellValue::Text(value.clone()),
        other => CellValue::Text(other.to_string()),
    }
}

fn parse_date(raw: &str) -> Option<Date> {
    Date::parse(raw, &format_description!("[year]-[month]-[day]")).ok()
}

/// Position of a row in the grid: a parent row, optionally one of its
/// nested rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowPath {
    pub parent: usize,
    pub nested: Option<usize>,
}

impl RowPath {
    pub const fn parent(parent: usize) -> Self {
        Self {
            parent,
            nested: None,
        }
    }

    pub const fn nested(parent: usize, nested: usize) -> Self {
        Self {
            parent,
            nested: Some(nested),
        }
    }
}

/// Identity of a parent row: the business key when the row carries one,
/// else its index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowIdentity {
    Key(String),
    Index(usize),
}

impl RowIdentity {
    pub fn of(row: &Row, key: Option<&str>, index: usize) -> Self {
        key.and_then(|key| row.get(key))
            .filter(|value| !value.is_null())
            .map(|value| Self::Key(value.display()))
            .unwrap_or(Self::Index(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[cfg(test)]
mod tests {
    use super::{CellValue, ColumnType, Row, RowIdentity};
    use crate::codec::OptionRef;
    use anyhow::Result;
    use serde_json::json;
    use time::{Date, Month};

    #[test]
    fn parse_input_converts_typed_values() -> Result<()> {
        assert_eq!(
            ColumnType::Integer.parse_input(" 1,250 ")?,
            CellValue::Integer(1250)
        );
        assert_eq!(
            ColumnType::Decimal.parse_input("12.5")?,
            CellValue::Decimal(12.5)
        );
        assert_eq!(
            ColumnType::Date.parse_input("2026-03-01")?,
            CellValue::Date(Date::from_calendar_date(2026, Month::March, 1)?)
        );
        assert_eq!(
            ColumnType::Checkbox.parse_input("Yes")?,
            CellValue::Bool(true)
        );
        assert_eq!(
            ColumnType::LazySelect.parse_input("C-1 || ACME")?,
            CellValue::Option(OptionRef::new("C-1", "ACME"))
        );
        assert_eq!(ColumnType::Integer.parse_input("   ")?, CellValue::Null);
        Ok(())
    }

    #[test]
    fn parse_input_rejects_malformed_paste() {
        let error = ColumnType::Integer
            .parse_input("12 pallets")
            .expect_err("non-numeric paste should fail");
        assert_eq!(error.input, "12 pallets");
        assert!(ColumnType::Decimal.parse_input("NaN").is_err());
        assert!(ColumnType::Date.parse_input("03/01/2026").is_err());
        assert!(ColumnType::Checkbox.parse_input("maybe").is_err());
    }

    #[test]
    fn edit_text_round_trips_through_parse() -> Result<()> {
        let samples = [
            (ColumnType::Decimal, CellValue::Decimal(10.0)),
            (ColumnType::Integer, CellValue::Integer(-4)),
            (ColumnType::Checkbox, CellValue::Bool(false)),
            (
                ColumnType::LazySelect,
                CellValue::Option(OptionRef::new("D-7", "Driver Seven")),
            ),
        ];
        for (kind, value) in samples {
            assert_eq!(kind.parse_input(&value.edit_text())?, value);
        }
        Ok(())
    }

    #[test]
    fn merge_overwrites_only_partial_keys() {
        let mut row = Row::new().with("rate", 10_i64).with("status", "open");
        row.merge(&Row::new().with("rate", 25_i64));
        assert_eq!(row.value("rate"), CellValue::Integer(25));
        assert_eq!(row.value("status"), CellValue::text("open"));
    }

    #[test]
    fn json_conversion_builds_nested_rows() -> Result<()> {
        let raw = json!({
            "documentNo": "DB-1",
            "amount": 12.5,
            "lines": [{"lineNo": 1}, {"lineNo": 2}],
            "tags": ["a"],
        });
        let row = Row::from_json(&raw, Some("lines"))?;
        assert_eq!(row.nested("lines").len(), 2);
        assert_eq!(row.nested("lines")[1].value("lineNo"), CellValue::Integer(2));
        assert_eq!(row.value("tags"), CellValue::text("[\"a\"]"));
        assert_eq!(row.to_json()["lines"][0]["lineNo"], json!(1));
        Ok(())
    }

    #[test]
    fn json_conversion_rejects_non_array_nested_data() {
        let raw = json!({"lines": 3});
        assert!(Row::from_json(&raw, Some("lines")).is_err());
    }

    #[test]
    fn identity_prefers_business_key() {
        let keyed = Row::new().with("documentNo", "DB-9");
        let blank = Row::new().with("documentNo", "  ");
        assert_eq!(
            RowIdentity::of(&keyed, Some("documentNo"), 3),
            RowIdentity::Key("DB-9".to_owned())
        );
        assert_eq!(
            RowIdentity::of(&blank, Some("documentNo"), 3),
            RowIdentity::Index(3)
        );
        assert_eq!(RowIdentity::of(&keyed, None, 5), RowIdentity::Index(5));
    }
}
