// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use dispatchdesk_app::{
    FetchCompletion, FetchRequest, OptionQuery, OptionSource, PersonalizationBackend,
    PersonalizationDocument, SaveMode, ScopeKey, SelectOption, ServerUpdate,
    ServerUpdateCompletion, ServerUpdateRequest,
};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;
use url::Url;

/// Base URL, timeout and HTTP client shared by every endpoint client.
#[derive(Debug, Clone)]
pub struct Endpoint {
    base_url: Url,
    timeout: Duration,
    http: HttpClient,
}

impl Endpoint {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            bail!("remote.base_url must not be empty");
        }
        let base_url = Url::parse(trimmed)
            .with_context(|| format!("remote.base_url {trimmed:?} is not a valid URL"))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            bail!(
                "remote.base_url {trimmed:?} uses scheme {:?}; use http or https",
                base_url.scheme()
            );
        }
        if base_url.cannot_be_a_base() {
            bail!("remote.base_url {trimmed:?} cannot carry a path");
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("remote.base_url {} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(clean_error_response(status, &body))
    }
}

/// Option search over HTTP: `GET {base}/options/{source}`.
#[derive(Debug, Clone)]
pub struct OptionClient {
    endpoint: Endpoint,
    source: String,
}

impl OptionClient {
    pub fn new(endpoint: Endpoint, source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            bail!("option source name must not be empty");
        }
        Ok(Self {
            endpoint,
            source: source.to_owned(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn search_url(&self, query: &OptionQuery) -> Result<Url> {
        let mut url = self.endpoint.url(&["options", &self.source])?;
        url.query_pairs_mut()
            .append_pair("searchTerm", &query.search_term)
            .append_pair("offset", &query.offset.to_string())
            .append_pair("limit", &query.limit.to_string());
        Ok(url)
    }
}

impl OptionSource for OptionClient {
    fn search(&self, query: &OptionQuery) -> Result<Vec<SelectOption>> {
        let url = self.search_url(query)?;
        let response = self
            .endpoint
            .http
            .get(url)
            .send()
            .map_err(|error| connection_error(self.endpoint.base_url(), error))?;
        let response = self.endpoint.check(response)?;
        response
            .json::<Vec<SelectOption>>()
            .with_context(|| format!("decode options from source {:?}", self.source))
    }

    fn spawn_search(&self, request: FetchRequest, tx: Sender<FetchCompletion>) -> Result<()> {
        let client = self.clone();
        thread::Builder::new()
            .name(format!("options-{}", self.source))
            .spawn(move || {
                let result = client
                    .search(&request.query)
                    .map_err(|error| format!("{error:#}"));
                let completion = FetchCompletion {
                    request_id: request.request_id,
                    origin: request.origin,
                    query: request.query,
                    result,
                };
                if tx.send(completion).is_err() {
                    tracing::debug!(
                        source = %client.source,
                        "option fetch finished after receiver closed"
                    );
                }
            })
            .context("spawn option fetch thread")?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersonalizationEnvelope {
    user: String,
    screen: String,
    component: String,
    document: PersonalizationDocument,
}

/// Personalization over HTTP. `GET` answers 404 when nothing is stored,
/// `POST` creates and `PUT` replaces.
#[derive(Debug, Clone)]
pub struct PersonalizationClient {
    endpoint: Endpoint,
}

impl PersonalizationClient {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }
}

impl PersonalizationBackend for PersonalizationClient {
    fn load(&self, scope: &ScopeKey) -> Result<Option<PersonalizationDocument>> {
        let mut url = self.endpoint.url(&["personalization"])?;
        url.query_pairs_mut()
            .append_pair("user", &scope.user)
            .append_pair("screen", &scope.screen)
            .append_pair("component", &scope.component);
        let response = self
            .endpoint
            .http
            .get(url)
            .send()
            .map_err(|error| connection_error(self.endpoint.base_url(), error))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: PersonalizationEnvelope = self
            .endpoint
            .check(response)?
            .json()
            .with_context(|| format!("decode personalization for {scope}"))?;
        Ok(Some(envelope.document))
    }

    fn save(
        &self,
        scope: &ScopeKey,
        document: &PersonalizationDocument,
        mode: SaveMode,
    ) -> Result<()> {
        let url = self.endpoint.url(&["personalization"])?;
        let body = PersonalizationEnvelope {
            user: scope.user.clone(),
            screen: scope.screen.clone(),
            component: scope.component.clone(),
            document: document.clone(),
        };
        let request = match mode {
            SaveMode::Insert => self.endpoint.http.post(url),
            SaveMode::Update => self.endpoint.http.put(url),
        };
        let response = request
            .json(&body)
            .send()
            .map_err(|error| connection_error(self.endpoint.base_url(), error))?;
        self.endpoint
            .check(response)
            .with_context(|| format!("{} personalization for {scope}", mode.as_str()))?;
        Ok(())
    }
}

/// Persists committed cell edits: `PATCH {base}/rows/{resource}`.
#[derive(Debug, Clone)]
pub struct RowUpdateClient {
    endpoint: Endpoint,
    resource: String,
}

impl RowUpdateClient {
    pub fn new(endpoint: Endpoint, resource: &str) -> Self {
        Self {
            endpoint,
            resource: resource.to_owned(),
        }
    }
}

impl ServerUpdate for RowUpdateClient {
    fn update(&self, request: &ServerUpdateRequest) -> Result<()> {
        let url = self.endpoint.url(&["rows", &self.resource])?;
        let body = json!({
            "column": request.address.column,
            "parentRow": request.parent_row.to_json(),
            "nestedRow": request.nested_row.as_ref().map(|row| row.to_json()),
            "updatedData": request.updated_data.to_json(),
        });
        let response = self
            .endpoint
            .http
            .patch(url)
            .json(&body)
            .send()
            .map_err(|error| connection_error(self.endpoint.base_url(), error))?;
        self.endpoint.check(response)?;
        Ok(())
    }

    fn spawn_update(
        &self,
        request: ServerUpdateRequest,
        tx: Sender<ServerUpdateCompletion>,
    ) -> Result<()> {
        let client = self.clone();
        thread::Builder::new()
            .name(format!("update-{}", self.resource))
            .spawn(move || {
                let result = client
                    .update(&request)
                    .map_err(|error| format!("{error:#}"));
                let _ = tx.send(ServerUpdateCompletion {
                    ticket: request.ticket,
                    address: request.address,
                    result,
                });
            })
            .context("spawn row update thread")?;
        Ok(())
    }
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "cannot reach {} -- check [remote].base_url or start the service ({})",
        base_url,
        error
    )
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<String>,
    message: Option<String>,
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<ErrorEnvelope>(body)
        && let Some(message) = parsed.error.or(parsed.message)
        && !message.is_empty()
    {
        return anyhow!("server error ({}): {}", status.as_u16(), message);
    }

    if body.len() < 100 && !body.contains('{') && !body.trim().is_empty() {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("server returned {}", status.as_u16())
}
