// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Per-user layout preferences for one component. A missing key means
/// "derive from the column or field `order`".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalizationDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_order: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_order: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_row_columns: Option<Vec<String>>,
}

impl PersonalizationDocument {
    pub fn is_empty(&self) -> bool {
        self.column_order.is_none()
            && self.visible_fields.is_none()
            && self.field_order.is_none()
            && self.sub_row_columns.is_none()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub user: String,
    pub screen: String,
    pub component: String,
}

impl ScopeKey {
    pub fn new(
        user: impl Into<String>,
        screen: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            screen: screen.into(),
            component: component.into(),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user, self.screen, self.component)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Insert,
    Update,
}

impl SaveMode {
    /// `Update` when an earlier load produced a non-empty document.
    pub fn for_previous(previous: Option<&PersonalizationDocument>) -> Self {
        match previous {
            Some(document) if !document.is_empty() => Self::Update,
            _ => Self::Insert,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
        }
    }
}

/// External key-value collaborator that persists documents per scope.
pub trait PersonalizationBackend {
    fn load(&self, scope: &ScopeKey) -> anyhow::Result<Option<PersonalizationDocument>>;
    fn save(
        &self,
        scope: &ScopeKey,
        document: &PersonalizationDocument,
        mode: SaveMode,
    ) -> anyhow::Result<()>;
}

impl<B: PersonalizationBackend + ?Sized> PersonalizationBackend for Box<B> {
    fn load(&self, scope: &ScopeKey) -> anyhow::Result<Option<PersonalizationDocument>> {
        (**self).load(scope)
    }

    fn save(
        &self,
        scope: &ScopeKey,
        document: &PersonalizationDocument,
        mode: SaveMode,
    ) -> anyhow::Result<()> {
        (**self).save(scope, document, mode)
    }
}

type NotifyHook = Box<dyn FnMut(&ScopeKey, &str)>;

/// Write-through cache in front of a [`PersonalizationBackend`].
///
/// Load failures degrade to "no personalization" and are reported through the
/// notify hook. Save failures go back to the caller, who decides whether to
/// retry.
pub struct PersonalizationStore<B> {
    backend: B,
    cache: BTreeMap<ScopeKey, Option<PersonalizationDocument>>,
    on_load_failure: Option<NotifyHook>,
}

impl<B: fmt::Debug> fmt::Debug for PersonalizationStore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersonalizationStore")
            .field("backend", &self.backend)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<B: PersonalizationBackend> PersonalizationStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: BTreeMap::new(),
            on_load_failure: None,
        }
    }

    pub fn on_load_failure(&mut self, hook: impl FnMut(&ScopeKey, &str) + 'static) {
        self.on_load_failure = Some(Box::new(hook));
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn load(&mut self, scope: &ScopeKey) -> Option<PersonalizationDocument> {
        if let Some(cached) = self.cache.get(scope) {
            return cached.clone();
        }
        match self.backend.load(scope) {
            Ok(document) => {
                self.cache.insert(scope.clone(), document.clone());
                document
            }
            Err(error) => {
                let message = format!("{error:#}");
                tracing::warn!(
                    scope = %scope,
                    error = %message,
                    "personalization load failed; using defaults"
                );
                if let Some(hook) = self.on_load_failure.as_mut() {
                    hook(scope, &message);
                }
                None
            }
        }
    }

    /// Cached document for `scope`, without touching the backend.
    pub fn cached(&self, scope: &ScopeKey) -> Option<&PersonalizationDocument> {
        self.cache.get(scope).and_then(Option::as_ref)
    }

    pub fn save(
        &mut self,
        scope: &ScopeKey,
        document: PersonalizationDocument,
        mode: SaveMode,
    ) -> anyhow::Result<()> {
        self.backend.save(scope, &document, mode)?;
        tracing::debug!(scope = %scope, mode = mode.as_str(), "personalization saved");
        self.cache.insert(scope.clone(), Some(document));
        Ok(())
    }

    /// Loads (through the cache) to pick the save mode, then saves.
    pub fn persist(
        &mut self,
        scope: &ScopeKey,
        document: PersonalizationDocument,
    ) -> anyhow::Result<SaveMode> {
        let previous = self.load(scope);
        let mode = SaveMode::for_previous(previous.as_ref());
        self.save(scope, document, mode)?;
        Ok(mode)
    }

    pub fn invalidate(&mut self, scope: &ScopeKey) {
        self.cache.remove(scope);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        PersonalizationBackend, PersonalizationDocument, PersonalizationStore, SaveMode, ScopeKey,
    };
    use anyhow::{Result, anyhow, bail};
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use std::rc::Rc;

    #[derive(Default)]
    struct CountingBackend {
        documents: RefCell<BTreeMap<ScopeKey, PersonalizationDocument>>,
        loads: Cell<usize>,
        saves: RefCell<Vec<SaveMode>>,
        broken: Cell<bool>,
    }

    impl PersonalizationBackend for CountingBackend {
        fn load(&self, scope: &ScopeKey) -> Result<Option<PersonalizationDocument>> {
            self.loads.set(self.loads.get() + 1);
            if self.broken.get() {
                return Err(anyhow!("backend offline"));
            }
            Ok(self.documents.borrow().get(scope).cloned())
        }

        fn save(
            &self,
            scope: &ScopeKey,
            document: &PersonalizationDocument,
            mode: SaveMode,
        ) -> Result<()> {
            if self.broken.get() {
                bail!("backend offline");
            }
            self.saves.borrow_mut().push(mode);
            self.documents
                .borrow_mut()
                .insert(scope.clone(), document.clone());
            Ok(())
        }
    }

    fn scope() -> ScopeKey {
        ScopeKey::new("dispatcher", "trips", "tripGrid")
    }

    fn layout() -> PersonalizationDocument {
        PersonalizationDocument {
            column_order: Some(vec!["rate".to_owned(), "tripNo".to_owned()]),
            ..PersonalizationDocument::default()
        }
    }

    #[test]
    fn document_serializes_only_present_keys() -> Result<()> {
        let json = layout().to_json()?;
        assert_eq!(json, r#"{"columnOrder":["rate","tripNo"]}"#);
        assert_eq!(PersonalizationDocument::from_json(&json)?, layout());
        assert!(PersonalizationDocument::from_json("{}")?.is_empty());
        Ok(())
    }

    #[test]
    fn save_mode_follows_previous_load() {
        assert_eq!(SaveMode::for_previous(None), SaveMode::Insert);
        assert_eq!(
            SaveMode::for_previous(Some(&PersonalizationDocument::default())),
            SaveMode::Insert
        );
        assert_eq!(SaveMode::for_previous(Some(&layout())), SaveMode::Update);
    }

    #[test]
    fn loads_are_cached_and_saves_write_through() -> Result<()> {
        let mut store = PersonalizationStore::new(CountingBackend::default());
        assert_eq!(store.load(&scope()), None);
        assert_eq!(store.load(&scope()), None);
        assert_eq!(store.backend().loads.get(), 1);

        assert_eq!(store.persist(&scope(), layout())?, SaveMode::Insert);
        assert_eq!(store.cached(&scope()), Some(&layout()));

        let mut second = layout();
        second.visible_fields = Some(vec!["rate".to_owned()]);
        assert_eq!(store.persist(&scope(), second.clone())?, SaveMode::Update);
        assert_eq!(store.load(&scope()), Some(second));
        assert_eq!(store.backend().loads.get(), 1);
        assert_eq!(
            *store.backend().saves.borrow(),
            vec![SaveMode::Insert, SaveMode::Update]
        );
        Ok(())
    }

    #[test]
    fn load_failure_degrades_to_defaults_and_notifies() {
        let backend = CountingBackend::default();
        backend.broken.set(true);
        let seen: Rc<RefCell<Vec<String>>> = Rc::default();
        let sink = Rc::clone(&seen);
        let mut store = PersonalizationStore::new(backend);
        store.on_load_failure(move |scope, message| {
            sink.borrow_mut().push(format!("{scope}: {message}"));
        });

        assert_eq!(store.load(&scope()), None);
        assert_eq!(
            *seen.borrow(),
            vec!["dispatcher/trips/tripGrid: backend offline".to_owned()]
        );

        store.backend().broken.set(false);
        store.load(&scope());
        assert_eq!(store.backend().loads.get(), 2);
    }

    #[test]
    fn save_failure_leaves_cache_untouched() {
        let backend = CountingBackend::default();
        let mut store = PersonalizationStore::new(backend);
        store.load(&scope());
        store.backend().broken.set(true);
        assert!(store.save(&scope(), layout(), SaveMode::Insert).is_err());
        assert_eq!(store.cached(&scope()), None);
    }
}
