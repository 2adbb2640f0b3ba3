// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! A dropdown whose options arrive page by page from an [`OptionSource`].
//!
//! The committed value (option ids) is kept apart from what the field shows:
//! while open it shows the typed query, while closed the selected names.
//!
//! [`OptionSource`]: crate::fetch::OptionSource

use std::time::Instant;

use crate::codec::{OptionRef, SelectOption};
use crate::fetch::{
    FetchCompletion, FetchOrigin, FetchOutcome, FetchRequest, FetchSettings, OptionFetchClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectMode {
    #[default]
    Single,
    Multi,
}

#[derive(Debug)]
pub struct LazySelectField {
    mode: SelectMode,
    client: OptionFetchClient,
    open: bool,
    query: String,
    highlighted: usize,
    selection: Vec<OptionRef>,
}

impl LazySelectField {
    pub fn new(origin: FetchOrigin, mode: SelectMode, settings: FetchSettings) -> Self {
        Self {
            mode,
            client: OptionFetchClient::new(origin, settings),
            open: false,
            query: String::new(),
            highlighted: 0,
            selection: Vec::new(),
        }
    }

    pub fn mode(&self) -> SelectMode {
        self.mode
    }

    pub fn client(&self) -> &OptionFetchClient {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut OptionFetchClient {
        &mut self.client
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_busy(&self) -> bool {
        self.client.is_busy()
    }

    pub fn is_exhausted(&self) -> bool {
        self.client.is_exhausted()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn options(&self) -> &[SelectOption] {
        self.client.options()
    }

    pub fn highlighted(&self) -> usize {
        self.highlighted
    }

    pub fn selection(&self) -> &[OptionRef] {
        &self.selection
    }

    /// Opens the dropdown and asks for the first page of the current query
    /// straight away.
    pub fn open(&mut self) -> Option<FetchRequest> {
        if self.open {
            return None;
        }
        self.open = true;
        self.highlighted = 0;
        Some(self.client.request_now(&self.query))
    }

    /// Closes the dropdown. Anything still in flight finishes harmlessly;
    /// its result is discarded.
    pub fn close(&mut self) {
        self.open = false;
        self.client.cancel();
    }

    pub fn type_query(&mut self, text: &str, now: Instant) {
        if !self.open {
            self.open = true;
        }
        text.clone_into(&mut self.query);
        self.highlighted = 0;
        self.client.schedule(text, now);
    }

    pub fn push_char(&mut self, ch: char, now: Instant) {
        let mut query = self.query.clone();
        query.push(ch);
        self.type_query(&query, now);
    }

    pub fn backspace(&mut self, now: Instant) {
        let mut query = self.query.clone();
        if query.pop().is_some() {
            self.type_query(&query, now);
        }
    }

    pub fn poll(&mut self, now: Instant) -> Option<FetchRequest> {
        if !self.open {
            return None;
        }
        self.client.poll(now)
    }

    /// Asks for the next page once the list has been scrolled to its end.
    pub fn scroll_to_end(&mut self) -> Option<FetchRequest> {
        if !self.open {
            return None;
        }
        self.client.load_more()
    }

    pub fn apply(&mut self, completion: FetchCompletion) -> FetchOutcome {
        if !self.open {
            return FetchOutcome::Discarded;
        }
        let outcome = self.client.complete(completion);
        let len = self.client.options().len();
        if len == 0 {
            self.highlighted = 0;
        } else if self.highlighted >= len {
            self.highlighted = len - 1;
        }
        outcome
    }

    pub fn move_highlight(&mut self, delta: isize) {
        let len = self.client.options().len();
        if len == 0 {
            return;
        }
        let target = self
            .highlighted
            .saturating_add_signed(delta)
            .min(len - 1);
        self.highlighted = target;
    }

    /// Picks the option at `index`. Single mode replaces the value and
    /// closes; multi mode toggles membership and stays open.
    pub fn pick(&mut self, index: usize) -> bool {
        let Some(option) = self.client.options().get(index) else {
            return false;
        };
        let choice = option.to_option_ref();
        self.select(choice);
        true
    }

    pub fn pick_highlighted(&mut self) -> bool {
        self.pick(self.highlighted)
    }

    pub fn select(&mut self, choice: OptionRef) {
        match self.mode {
            SelectMode::Single => {
                self.selection = vec![choice];
                self.close();
                self.query.clear();
            }
            SelectMode::Multi => {
                match self.selection.iter().position(|entry| entry.id == choice.id) {
                    Some(position) => {
                        self.selection.remove(position);
                    }
                    None => self.selection.push(choice),
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.selection.clear();
    }

    /// Replaces the committed value. Single mode keeps only the first entry.
    pub fn set_selection(&mut self, mut selection: Vec<OptionRef>) {
        if self.mode == SelectMode::Single {
            selection.truncate(1);
        }
        self.selection = selection;
    }

    /// Text the field shows: the query while open, else the selected names.
    pub fn displayed_label(&self) -> String {
        if self.open {
            return self.query.clone();
        }
        self.selection
            .iter()
            .map(|entry| entry.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
