// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use dispatchdesk_app::{
    CellAddress, EditableCellController, FetchOrigin, FetchOutcome, FetchSettings, GridDataStore,
    OptionFetchClient, OptionQuery, OptionSource, PersonalizationBackend, PersonalizationDocument,
    RowPath, SaveMode, ScopeKey, SelectOption, ServerUpdate, UpdateOutcome,
};
use dispatchdesk_remote::{Endpoint, OptionClient, PersonalizationClient, RowUpdateClient};
use dispatchdesk_testkit::{fixed_trip, trip_columns, trip_grid_config};
use serde_json::Value;
use std::io::Read;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Request, Response, Server};

fn json_response(body: &str, status: u16) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body)
        .with_status_code(status)
        .with_header(
            Header::from_bytes("Content-Type", "application/json")
                .expect("valid content type header"),
        )
}

fn read_body(request: &mut Request) -> Value {
    let mut body = String::new();
    request
        .as_reader()
        .read_to_string(&mut body)
        .expect("request body should be readable");
    serde_json::from_str(&body).expect("request body should be JSON")
}

fn mock_server() -> Result<(Server, String)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());
    Ok((server, addr))
}

#[test]
fn unreachable_service_error_is_actionable() -> Result<()> {
    let endpoint = Endpoint::new("http://127.0.0.1:1", Duration::from_millis(50))?;
    let client = OptionClient::new(endpoint, "customers")?;

    let error = client
        .search(&OptionQuery {
            search_term: String::new(),
            offset: 0,
            limit: 20,
        })
        .expect_err("search should fail for unreachable endpoint");
    assert!(error.to_string().contains("check [remote].base_url"));
    Ok(())
}

#[test]
fn search_sends_query_parameters_and_decodes_options() -> Result<()> {
    let (server, addr) = mock_server()?;
    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert_eq!(*request.method(), Method::Get);
        assert_eq!(
            request.url(),
            "/options/customers?searchTerm=acme&offset=40&limit=20"
        );
        request
            .respond(json_response(
                r#"[{"label":"Acme Freight","value":"CUST-001"}]"#,
                200,
            ))
            .expect("response should succeed");
    });

    let client = OptionClient::new(Endpoint::new(&addr, Duration::from_secs(1))?, "customers")?;
    let options = client.search(&OptionQuery {
        search_term: "acme".to_owned(),
        offset: 40,
        limit: 20,
    })?;
    assert_eq!(options, vec![SelectOption::new("Acme Freight", "CUST-001")]);

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn background_search_completes_through_channel() -> Result<()> {
    let (server, addr) = mock_server()?;
    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        assert!(request.url().starts_with("/options/customers?searchTerm=ac&offset=0"));
        request
            .respond(json_response(
                r#"[{"label":"Acme Freight","value":"CUST-001"},{"label":"Acorn Logistics","value":"CUST-002"}]"#,
                200,
            ))
            .expect("response should succeed");
    });

    let source = OptionClient::new(Endpoint::new(&addr, Duration::from_secs(1))?, "customers")?;
    let mut fetch = OptionFetchClient::new(
        FetchOrigin::new("customer", Default::default()),
        FetchSettings::default(),
    );
    let (tx, rx) = mpsc::channel();

    let request = fetch.request_now("ac");
    let request_id = request.request_id;
    fetch.dispatch(request, &source, tx);
    let completion = rx.recv_timeout(Duration::from_secs(5))?;

    assert_eq!(completion.request_id, request_id);
    assert_eq!(fetch.complete(completion), FetchOutcome::Applied { added: 2 });
    assert!(fetch.is_exhausted());
    assert!(!fetch.is_busy());

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn server_error_surfaces_as_failed_fetch() -> Result<()> {
    let (server, addr) = mock_server()?;
    let handle = thread::spawn(move || {
        let request = server.recv().expect("request expected");
        request
            .respond(json_response(r#"{"error":"customer index offline"}"#, 502))
            .expect("response should succeed");
    });

    let source = OptionClient::new(Endpoint::new(&addr, Duration::from_secs(1))?, "customers")?;
    let mut fetch = OptionFetchClient::new(
        FetchOrigin::new("customer", Default::default()),
        FetchSettings::default(),
    );
    let (tx, rx) = mpsc::channel();

    let request = fetch.request_now("");
    fetch.dispatch(request, &source, tx);
    let outcome = fetch.complete(rx.recv_timeout(Duration::from_secs(5))?);

    match outcome {
        FetchOutcome::Failed(message) => {
            assert!(message.contains("server error (502): customer index offline"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(fetch.options().is_empty());

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn personalization_uses_post_then_put() -> Result<()> {
    let (server, addr) = mock_server()?;
    let handle = thread::spawn(move || {
        let request = server.recv().expect("initial load expected");
        assert_eq!(*request.method(), Method::Get);
        assert_eq!(
            request.url(),
            "/personalization?user=ana&screen=trips&component=grid"
        );
        request
            .respond(json_response(r#"{"error":"not found"}"#, 404))
            .expect("response should succeed");

        let mut request = server.recv().expect("insert expected");
        assert_eq!(*request.method(), Method::Post);
        assert_eq!(request.url(), "/personalization");
        let body = read_body(&mut request);
        assert_eq!(body["user"], "ana");
        assert_eq!(body["document"]["columnOrder"][0], "rate");
        request
            .respond(json_response("{}", 201))
            .expect("response should succeed");

        let request = server.recv().expect("reload expected");
        request
            .respond(json_response(
                r#"{"user":"ana","screen":"trips","component":"grid","document":{"columnOrder":["rate"]}}"#,
                200,
            ))
            .expect("response should succeed");

        let mut request = server.recv().expect("update expected");
        assert_eq!(*request.method(), Method::Put);
        let body = read_body(&mut request);
        assert_eq!(body["document"]["visibleFields"][0], "rate");
        request
            .respond(json_response("{}", 200))
            .expect("response should succeed");
    });

    let client = PersonalizationClient::new(Endpoint::new(&addr, Duration::from_secs(1))?);
    let scope = ScopeKey::new("ana", "trips", "grid");
    let document = PersonalizationDocument {
        column_order: Some(vec!["rate".to_owned()]),
        ..PersonalizationDocument::default()
    };

    assert_eq!(client.load(&scope)?, None);
    client.save(&scope, &document, SaveMode::Insert)?;
    assert_eq!(client.load(&scope)?, Some(document.clone()));
    let updated = PersonalizationDocument {
        visible_fields: Some(vec!["rate".to_owned()]),
        ..document
    };
    client.save(&scope, &updated, SaveMode::Update)?;

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn committed_edit_is_patched_to_server() -> Result<()> {
    let (server, addr) = mock_server()?;
    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("patch expected");
        assert_eq!(*request.method(), Method::Patch);
        assert_eq!(request.url(), "/rows/trips");
        let body = read_body(&mut request);
        assert_eq!(body["column"], "rate");
        assert_eq!(body["updatedData"]["rate"], 25);
        assert_eq!(body["parentRow"]["documentNo"], "TRP-A");
        assert!(body["nestedRow"].is_null());
        request
            .respond(json_response("{}", 200))
            .expect("response should succeed");
    });

    let mut store = GridDataStore::new(trip_grid_config());
    store.set_columns(trip_columns());
    store.set_rows(vec![fixed_trip("TRP-A", 2)]);

    let mut editor = EditableCellController::default();
    editor.begin(&store, CellAddress::new(RowPath::parent(0), "rate"))?;
    editor.input("25");
    let committed = editor.commit(&mut store, |_| Ok(()))?;
    let request = editor
        .issue_server_update(&store, &committed)
        .ok_or_else(|| anyhow!("row should exist"))?;

    let client = RowUpdateClient::new(Endpoint::new(&addr, Duration::from_secs(1))?, "trips");
    let (tx, rx) = mpsc::channel();
    client.spawn_update(request, tx)?;
    let completion = rx.recv_timeout(Duration::from_secs(5))?;
    assert_eq!(
        editor.complete_server_update(&store, completion),
        UpdateOutcome::Confirmed
    );

    handle.join().expect("server thread should join");
    Ok(())
}
