// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use dispatchdesk_app::demo::{customer_ref, reference_date};
use dispatchdesk_app::{
    CellValue, FieldConfig, FieldKind, FieldValue, FormConfig, OptionQuery, OptionSource,
    PersonalizationBackend, PersonalizationDocument, Row, SaveMode, ScopeKey, SelectOption,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub use dispatchdesk_app::demo::{
    CustomerDirectory, NESTED_KEY, ROW_KEY, trip_columns, trip_grid_config, trip_store,
};

/// A trip with exactly `legs` nested rows and a fixed rate, for tests that
/// need to address specific cells.
pub fn fixed_trip(document_no: &str, legs: usize) -> Row {
    Row::new()
        .with(ROW_KEY, document_no)
        .with("customer", customer_ref(0))
        .with("rate", 10_i64)
        .with(
            NESTED_KEY,
            CellValue::Rows(
                (0..legs)
                    .map(|leg| {
                        Row::new()
                            .with("stop", format!("{document_no} stop {leg}"))
                            .with("eta", reference_date())
                    })
                    .collect(),
            ),
        )
}

/// Records every query before delegating.
#[derive(Debug, Default)]
pub struct RecordingSource<S> {
    inner: S,
    queries: Mutex<Vec<OptionQuery>>,
}

impl<S: OptionSource> RecordingSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<OptionQuery> {
        match self.queries.lock() {
            Ok(queries) => queries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl<S: OptionSource> OptionSource for RecordingSource<S> {
    fn search(&self, query: &OptionQuery) -> Result<Vec<SelectOption>> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.clone());
        }
        self.inner.search(query)
    }
}

/// Always fails with `message`.
#[derive(Debug, Clone)]
pub struct FailingSource {
    message: String,
}

impl FailingSource {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl OptionSource for FailingSource {
    fn search(&self, _query: &OptionQuery) -> Result<Vec<SelectOption>> {
        bail!("{}", self.message)
    }
}

/// In-memory personalization collaborator that rejects mismatched save
/// modes the way a strict remote service does.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: RefCell<BTreeMap<ScopeKey, PersonalizationDocument>>,
    saves: RefCell<Vec<(ScopeKey, SaveMode)>>,
    loads: Cell<usize>,
    fail_loads: Cell<bool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(self, scope: ScopeKey, document: PersonalizationDocument) -> Self {
        self.documents.borrow_mut().insert(scope, document);
        self
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.set(fail);
    }

    pub fn load_count(&self) -> usize {
        self.loads.get()
    }

    pub fn saves(&self) -> Vec<(ScopeKey, SaveMode)> {
        self.saves.borrow().clone()
    }

    pub fn document(&self, scope: &ScopeKey) -> Option<PersonalizationDocument> {
        self.documents.borrow().get(scope).cloned()
    }
}

impl PersonalizationBackend for MemoryBackend {
    fn load(&self, scope: &ScopeKey) -> Result<Option<PersonalizationDocument>> {
        self.loads.set(self.loads.get() + 1);
        if self.fail_loads.get() {
            bail!("personalization service unavailable");
        }
        Ok(self.documents.borrow().get(scope).cloned())
    }

    fn save(
        &self,
        scope: &ScopeKey,
        document: &PersonalizationDocument,
        mode: SaveMode,
    ) -> Result<()> {
        let mut documents = self.documents.borrow_mut();
        let exists = documents.contains_key(scope);
        match mode {
            SaveMode::Insert if exists => bail!("personalization for {scope} already exists"),
            SaveMode::Update if !exists => bail!("no personalization stored for {scope}"),
            _ => {}
        }
        documents.insert(scope.clone(), document.clone());
        self.saves.borrow_mut().push((scope.clone(), mode));
        Ok(())
    }
}

/// Draft-bill form used by the demo screen and form tests.
pub fn bill_form(customers: Arc<dyn OptionSource>) -> Arc<FormConfig> {
    FormConfig::new(vec![
        FieldConfig::new("billNo", "Bill no.", FieldKind::Text).mandatory(),
        FieldConfig::new(
            "customer",
            "Customer",
            FieldKind::LazySelect {
                source: Arc::clone(&customers),
                multi: false,
            },
        )
        .mandatory()
        .order(1),
        FieldConfig::new("billDate", "Bill date", FieldKind::Date)
            .value(FieldValue::Date(reference_date()))
            .order(2),
        FieldConfig::new("amount", "Amount", FieldKind::Number)
            .mandatory()
            .order(3),
        FieldConfig::new(
            "weight",
            "Weight",
            FieldKind::InputDropdown {
                options: options(&[("kg", "KG"), ("lb", "LB")]),
            },
        )
        .order(4),
        FieldConfig::new(
            "terms",
            "Payment terms",
            FieldKind::Dropdown {
                options: options(&[("Net 15", "N15"), ("Net 30", "N30"), ("Net 60", "N60")]),
            },
        )
        .value(FieldValue::text("N30"))
        .order(5),
        FieldConfig::new(
            "priority",
            "Priority",
            FieldKind::Radio {
                options: options(&[("Normal", "normal"), ("Rush", "rush")]),
            },
        )
        .value(FieldValue::text("normal"))
        .order(6),
        FieldConfig::new("taxable", "Taxable", FieldKind::Checkbox)
            .value(FieldValue::Flag(false))
            .order(7),
        FieldConfig::new("notes", "Notes", FieldKind::TextArea).order(8),
        FieldConfig::new(
            "copyTo",
            "Copy to",
            FieldKind::LazySelect {
                source: customers,
                multi: true,
            },
        )
        .hidden()
        .order(9),
    ])
}

fn options(pairs: &[(&str, &str)]) -> Vec<SelectOption> {
    pairs
        .iter()
        .map(|(label, value)| SelectOption::new(*label, *value))
        .collect()
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("dispatchdesk.db");
    Ok((dir, db_path))
}

pub fn scope(component: &str) -> ScopeKey {
    ScopeKey::new("dispatcher", "trips", component)
}
