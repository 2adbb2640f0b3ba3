// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Wire encoding for composite option selections.
//!
//! Persisted data and server payloads carry a selected option as a single
//! string `"<id> || <displayName>"`. Every encode/decode of that shape goes
//! through this module.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const OPTION_SEPARATOR: &str = " || ";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("option id {0:?} contains the reserved separator \" || \"")]
    SeparatorInId(String),
}

/// A decoded `(id, displayName)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct OptionRef {
    pub id: String,
    pub name: String,
}

impl OptionRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}{OPTION_SEPARATOR}{}", self.id, self.name)
    }

    pub fn decode(raw: &str) -> Self {
        decode_option_ref(raw)
    }
}

impl fmt::Display for OptionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<String> for OptionRef {
    fn from(value: String) -> Self {
        decode_option_ref(&value)
    }
}

impl From<OptionRef> for String {
    fn from(value: OptionRef) -> Self {
        value.encode()
    }
}

/// One entry of an option list as returned by a search collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }

    pub fn to_option_ref(&self) -> OptionRef {
        OptionRef::new(self.value.clone(), self.label.clone())
    }
}

pub fn encode_option_ref(id: &str, name: &str) -> Result<String, CodecError> {
    if id.contains(OPTION_SEPARATOR) {
        return Err(CodecError::SeparatorInId(id.to_owned()));
    }
    Ok(format!("{id}{OPTION_SEPARATOR}{name}"))
}

/// Splits on the first separator. A string without one decodes to an entry
/// whose id and name are both the raw string.
pub fn decode_option_ref(raw: &str) -> OptionRef {
    match raw.split_once(OPTION_SEPARATOR) {
        Some((id, name)) => OptionRef::new(id, name),
        None => OptionRef::new(raw, raw),
    }
}

pub fn encode_option_list(refs: &[OptionRef]) -> Vec<String> {
    refs.iter().map(OptionRef::encode).collect()
}

pub fn decode_option_list<S: AsRef<str>>(raw: &[S]) -> Vec<OptionRef> {
    raw.iter()
        .map(|entry| decode_option_ref(entry.as_ref()))
        .collect()
}
