// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use dispatchdesk_app::{
    ColumnLayout, OptionSource, PersonalizationBackend, PersonalizationStore, SaveMode, ScopeKey,
    ServerUpdate, ServerUpdateCompletion, ServerUpdateRequest,
};
use dispatchdesk_remote::RowUpdateClient;
use dispatchdesk_tui::ScreenRuntime;
use std::sync::Arc;
use std::sync::mpsc::Sender;

/// Runtime behind the trips screen: layout saves go to the personalization
/// store, searches to `options`, committed edits to the remote service when
/// one is configured.
pub struct DeskRuntime<B> {
    personalization: PersonalizationStore<B>,
    scope: ScopeKey,
    options: Arc<dyn OptionSource>,
    row_updates: Option<RowUpdateClient>,
}

impl<B: PersonalizationBackend> DeskRuntime<B> {
    pub fn new(
        personalization: PersonalizationStore<B>,
        scope: ScopeKey,
        options: Arc<dyn OptionSource>,
        row_updates: Option<RowUpdateClient>,
    ) -> Self {
        Self {
            personalization,
            scope,
            options,
            row_updates,
        }
    }
}

impl<B: PersonalizationBackend> ScreenRuntime for DeskRuntime<B> {
    fn option_source(&self) -> Arc<dyn OptionSource> {
        Arc::clone(&self.options)
    }

    fn save_layout(&mut self, layout: &ColumnLayout) -> Result<SaveMode> {
        let document = layout.to_document(self.personalization.cached(&self.scope));
        self.personalization.persist(&self.scope, document)
    }

    fn update_row(&mut self, request: &ServerUpdateRequest) -> Result<()> {
        match &self.row_updates {
            Some(client) => client.update(request),
            None => {
                tracing::debug!(
                    column = %request.address.column,
                    "no remote configured; edit kept locally"
                );
                Ok(())
            }
        }
    }

    fn spawn_update(
        &mut self,
        request: ServerUpdateRequest,
        tx: Sender<ServerUpdateCompletion>,
    ) -> Result<()> {
        if let Some(client) = &self.row_updates {
            return client.spawn_update(request, tx);
        }
        let result = self
            .update_row(&request)
            .map_err(|error| format!("{error:#}"));
        tx.send(ServerUpdateCompletion {
            ticket: request.ticket,
            address: request.address,
            result,
        })
        .map_err(|_| anyhow!("row update receiver closed"))
    }
}
