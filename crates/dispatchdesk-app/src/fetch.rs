// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Debounced, paginated option fetching with stale-response suppression.
//!
//! The client never performs I/O itself. It hands out [`FetchRequest`]s when
//! a debounce window closes, and the caller runs them through an
//! [`OptionSource`] and feeds the [`FetchCompletion`] back. Only the most
//! recently issued request can change state; anything older is discarded.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use crate::codec::SelectOption;
use crate::ids::{Generation, RequestId};

pub const MIN_DEBOUNCE: Duration = Duration::from_millis(250);
pub const MAX_DEBOUNCE: Duration = Duration::from_millis(400);
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    debounce: Duration,
    page_size: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl FetchSettings {
    /// Clamps the debounce window into 250..=400ms and the page size to at
    /// least one.
    pub fn new(debounce: Duration, page_size: usize) -> Self {
        Self {
            debounce: debounce.clamp(MIN_DEBOUNCE, MAX_DEBOUNCE),
            page_size: page_size.max(1),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionQuery {
    pub search_term: String,
    pub offset: usize,
    pub limit: usize,
}

/// Who issued a request. `mount` changes when the owning form remounts so
/// completions from before the remount never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FetchOrigin {
    pub key: String,
    pub mount: Generation,
}

impl FetchOrigin {
    pub fn new(key: impl Into<String>, mount: Generation) -> Self {
        Self {
            key: key.into(),
            mount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub request_id: RequestId,
    pub origin: FetchOrigin,
    pub query: OptionQuery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCompletion {
    pub request_id: RequestId,
    pub origin: FetchOrigin,
    pub query: OptionQuery,
    pub result: Result<Vec<SelectOption>, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied { added: usize },
    /// The source failed; the list was treated as an empty page.
    Failed(String),
    Discarded,
}

/// The external "search options" collaborator.
pub trait OptionSource: Send + Sync {
    fn search(&self, query: &OptionQuery) -> anyhow::Result<Vec<SelectOption>>;

    fn spawn_search(&self, request: FetchRequest, tx: Sender<FetchCompletion>) -> anyhow::Result<()> {
        let result = self
            .search(&request.query)
            .map_err(|error| format!("{error:#}"));
        tx.send(FetchCompletion {
            request_id: request.request_id,
            origin: request.origin,
            query: request.query,
            result,
        })
        .map_err(|_| anyhow!("option fetch channel closed"))?;
        Ok(())
    }
}

impl<F> OptionSource for F
where
    F: Fn(&OptionQuery) -> anyhow::Result<Vec<SelectOption>> + Send + Sync,
{
    fn search(&self, query: &OptionQuery) -> anyhow::Result<Vec<SelectOption>> {
        self(query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingQuery {
    term: String,
    due: Instant,
}

type FailureHook = Box<dyn FnMut(&FetchOrigin, &str)>;

#[derive(Default)]
pub struct OptionFetchClient {
    origin: FetchOrigin,
    settings: FetchSettings,
    term: String,
    pending: Option<PendingQuery>,
    last_issued: RequestId,
    in_flight: Option<RequestId>,
    options: Vec<SelectOption>,
    exhausted: bool,
    on_failure: Option<FailureHook>,
}

impl fmt::Debug for OptionFetchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionFetchClient")
            .field("origin", &self.origin)
            .field("term", &self.term)
            .field("pending", &self.pending)
            .field("in_flight", &self.in_flight)
            .field("options", &self.options.len())
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl OptionFetchClient {
    pub fn new(origin: FetchOrigin, settings: FetchSettings) -> Self {
        Self {
            origin,
            settings,
            ..Self::default()
        }
    }

    /// Side channel for fetch failures, which never reach the caller as
    /// errors.
    pub fn on_failure(&mut self, hook: impl FnMut(&FetchOrigin, &str) + 'static) {
        self.on_failure = Some(Box::new(hook));
    }

    pub fn origin(&self) -> &FetchOrigin {
        &self.origin
    }

    pub fn settings(&self) -> FetchSettings {
        self.settings
    }

    /// Term the accumulated option list belongs to.
    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn options(&self) -> &[SelectOption] {
        &self.options
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Restarts the debounce window for `term`. Only the last term scheduled
    /// before the window closes is fetched.
    pub fn schedule(&mut self, term: &str, now: Instant) {
        self.pending = Some(PendingQuery {
            term: term.to_owned(),
            due: now + self.settings.debounce,
        });
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.due)
    }

    /// Issues the scheduled query once its window has closed.
    pub fn poll(&mut self, now: Instant) -> Option<FetchRequest> {
        if self.pending.as_ref()?.due > now {
            return None;
        }
        let pending = self.pending.take()?;
        Some(self.issue(pending.term, 0))
    }

    /// Skips the debounce window, dropping anything scheduled.
    pub fn request_now(&mut self, term: &str) -> FetchRequest {
        self.pending = None;
        self.issue(term.to_owned(), 0)
    }

    /// Next page for the current term. `None` while a request is in flight
    /// or scheduled, or once the source ran out.
    pub fn load_more(&mut self) -> Option<FetchRequest> {
        if self.exhausted || self.in_flight.is_some() || self.pending.is_some() {
            return None;
        }
        let offset = self.options.len();
        Some(self.issue(self.term.clone(), offset))
    }

    /// Runs `request` through `source`. A source that cannot even start the
    /// request releases the busy flag and reports through the failure hook.
    pub fn dispatch(
        &mut self,
        request: FetchRequest,
        source: &dyn OptionSource,
        tx: Sender<FetchCompletion>,
    ) {
        let request_id = request.request_id;
        if let Err(error) = source.spawn_search(request, tx) {
            let message = format!("{error:#}");
            tracing::warn!(
                origin = %self.origin.key,
                %request_id,
                error = %message,
                "option fetch could not start"
            );
            if self.in_flight == Some(request_id) {
                self.in_flight = None;
            }
            self.notify(&message);
        }
    }

    pub fn complete(&mut self, completion: FetchCompletion) -> FetchOutcome {
        if completion.origin != self.origin || self.in_flight != Some(completion.request_id) {
            tracing::debug!(
                origin = %completion.origin.key,
                request_id = %completion.request_id,
                "stale option fetch discarded"
            );
            return FetchOutcome::Discarded;
        }
        self.in_flight = None;

        let FetchCompletion { query, result, .. } = completion;
        let starts_fresh = query.offset == 0 || query.search_term != self.term;
        match result {
            Ok(page) => {
                if starts_fresh {
                    self.options.clear();
                    self.term = query.search_term;
                }
                self.exhausted = page.len() < query.limit;
                let added = page.len();
                self.options.extend(page);
                FetchOutcome::Applied { added }
            }
            Err(error) => {
                tracing::warn!(
                    origin = %self.origin.key,
                    search_term = %query.search_term,
                    offset = query.offset,
                    error = %error,
                    "option fetch failed; showing no further results"
                );
                if starts_fresh {
                    self.options.clear();
                    self.term = query.search_term;
                }
                self.exhausted = true;
                self.notify(&error);
                FetchOutcome::Failed(error)
            }
        }
    }

    /// Drops the scheduled query and makes any in-flight response stale.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.in_flight = None;
    }

    pub fn reset(&mut self) {
        self.cancel();
        self.options.clear();
        self.term.clear();
        self.exhausted = false;
    }

    fn issue(&mut self, term: String, offset: usize) -> FetchRequest {
        self.last_issued = self.last_issued.next();
        self.in_flight = Some(self.last_issued);
        FetchRequest {
            request_id: self.last_issued,
            origin: self.origin.clone(),
            query: OptionQuery {
                search_term: term,
                offset,
                limit: self.settings.page_size,
            },
        }
    }

    fn notify(&mut self, message: &str) {
        if let Some(hook) = self.on_failure.as_mut() {
            hook(&self.origin, message);
        }
    }
}
