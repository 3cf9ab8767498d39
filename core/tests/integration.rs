//! Full lifecycle test against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives every facade operation
//! over real HTTP with `UreqTransport`. Validates that request building,
//! transport and interpretation agree with a server speaking the `winstrom`
//! dialect.

use serde_json::{json, Map, Value};

use std::io::{Read, Write};

use flexibee_core::{Config, FlexibeeClient, FlexibeeError, HttpMethod, Identifier, QueryOptions, UreqTransport};

/// Start the mock server in the background and return its base URL.
fn spawn_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

/// Answer the next request with `200 OK` and `body`, then close.
fn serve_once(body: Vec<u8>) -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        // The client may hang up early when it enforces a limit.
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(&body);
    });

    format!("http://{addr}")
}

fn config(url: &str, evidence: &str) -> Config {
    Config::new(url, "demo", "winstrom", "winstrom", evidence).unwrap()
}

fn record(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("not an object"),
    }
}

#[test]
fn evidence_lifecycle() {
    let url = spawn_server();
    let client = FlexibeeClient::new(config(&url, "adresar"));
    let none = QueryOptions::new();

    // Step 1: empty evidence.
    assert!(client.all_in_evidence().unwrap().is_empty());
    assert_eq!(client.count_in_evidence().unwrap(), 0);

    // Step 2: create two records.
    let saved = client
        .save(record(json!({"kod": "FIRMA1", "nazev": "První"})), None, false, &none)
        .unwrap();
    assert!(saved.success);
    assert_eq!(saved.affected, 1);
    let first_id = saved.ids()[0];
    client
        .save(record(json!({"kod": "FIRMA2", "nazev": "Druhá"})), None, false, &none)
        .unwrap();

    // Step 3: lookups by id and code.
    let fetched = client.get_by_id(first_id, &none).unwrap();
    assert_eq!(fetched.get_str("nazev"), Some("První"));
    let by_code = client.get_by_code("FIRMA2", &none).unwrap();
    assert_eq!(by_code.get_str("nazev"), Some("Druhá"));

    // Step 4: listing, counting, paging, searching.
    assert_eq!(client.all_in_evidence().unwrap().len(), 2);
    assert_eq!(client.count_in_evidence().unwrap(), 2);
    let chunk = client.chunk_in_evidence(1, 1).unwrap();
    assert_eq!(chunk.len(), 1);
    assert_eq!(chunk[0].get_str("kod"), Some("FIRMA2"));
    let page = client.paginated_in_evidence(0, 1).unwrap();
    assert_eq!(page.row_count, Some(2));
    assert_eq!(page.results.len(), 1);
    let hits = client.search_in_evidence("kod = 'FIRMA1'", &none).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(client.search_in_evidence("kod = 'NIKDO'", &none).unwrap().is_empty());

    // Step 5: update through save with an id.
    let updated = client
        .save(record(json!({"nazev": "Přejmenovaná"})), Some(first_id), false, &none)
        .unwrap();
    assert_eq!(updated.affected, 1);
    assert_eq!(
        client.get_by_id(first_id, &none).unwrap().get_str("nazev"),
        Some("Přejmenovaná")
    );

    // Step 6: dry-run save leaves the evidence untouched.
    client
        .save(record(json!({"kod": "DRY"})), None, true, &none)
        .unwrap();
    assert_eq!(client.count_in_evidence().unwrap(), 2);

    // Step 7: pdf.
    let pdf = client.get_pdf_by_id(first_id, &none).unwrap();
    assert!(pdf.starts_with(b"%PDF"));

    // Step 8: delete, then lookups miss.
    client.delete_by_id(first_id, false).unwrap();
    assert_eq!(
        client.get_by_id(first_id, &none).unwrap_err(),
        FlexibeeError::NoEvidenceResult
    );
    assert!(client.find_by_id(first_id, &none).unwrap().is_empty());
    client.delete_by_code("FIRMA2", true).unwrap();
    assert!(!client.find_by_code("FIRMA2", &none).unwrap().is_empty());
    client.delete_by_code("FIRMA2", false).unwrap();
    assert!(client.find_by_code("FIRMA2", &none).unwrap().is_empty());
    assert!(client.all_in_evidence().unwrap().is_empty());
}

#[test]
fn failures_are_classified() {
    let url = spawn_server();
    let none = QueryOptions::new();

    let wrong = Config::new(&url, "demo", "winstrom", "spatne", "adresar").unwrap();
    assert_eq!(
        FlexibeeClient::new(wrong).all_in_evidence().unwrap_err(),
        FlexibeeError::InvalidAuthorization
    );

    let forbidden = FlexibeeClient::new(config(&url, mock_server::FORBIDDEN_EVIDENCE));
    assert_eq!(forbidden.all_in_evidence().unwrap_err(), FlexibeeError::Forbidden);

    let client = FlexibeeClient::new(config(&url, "adresar"));
    let err = client
        .call_request(HttpMethod::Post, &Identifier::All, &none, None)
        .unwrap_err();
    assert_eq!(err, FlexibeeError::MethodNotAllowed);

    let err = client
        .save(record(json!({"nazev": "Bez kódu"})), None, false, &none)
        .unwrap_err();
    assert!(matches!(err, FlexibeeError::RequestFailed { status: 400, .. }));

    let err = client.search_in_evidence("kod like 'A'", &none).unwrap_err();
    assert!(matches!(err, FlexibeeError::RequestFailed { status: 400, .. }));

    // An empty batch is not a failure for the generic call: the stats come
    // back as the single result.
    let outcome = client
        .call_request(HttpMethod::Put, &Identifier::All, &none, Some(json!({"adresar": []})))
        .map(|results| results.len());
    assert_eq!(outcome, Ok(1));

    let err = client
        .save(Map::new(), Some(999), false, &none)
        .unwrap_err();
    assert!(matches!(err, FlexibeeError::RequestFailed { status: 400, .. }));
}

#[test]
fn connection_failure_is_reported() {
    // Bind and drop to get a port nobody listens on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
    let client = FlexibeeClient::new(config(&format!("http://{addr}"), "adresar"));
    assert!(matches!(
        client.all_in_evidence().unwrap_err(),
        FlexibeeError::ConnectionFailed(_)
    ));
}

#[test]
fn backup_larger_than_ten_megabytes_is_read_whole() {
    let size = 11 * 1024 * 1024;
    let url = serve_once(vec![b'x'; size]);
    let client = FlexibeeClient::new(config(&url, "adresar"));
    let backup = client.backup().unwrap();
    assert_eq!(backup.len(), size);
}

#[test]
fn body_limit_is_configurable() {
    let url = serve_once(vec![b'x'; 1024]);
    let transport = UreqTransport::new().with_body_limit(16);
    let client = FlexibeeClient::with_transport(config(&url, "adresar"), transport);
    assert!(matches!(
        client.backup().unwrap_err(),
        FlexibeeError::ConnectionFailed(_)
    ));
}

#[test]
fn session_login_backup_and_changes() {
    let url = spawn_server();
    let client = FlexibeeClient::new(config(&url, "adresar"));

    let tokens = client.auth_and_refresh_token().unwrap();
    let session = tokens.envelope.get("authSessionId").and_then(Value::as_str).unwrap().to_string();
    let session_client = FlexibeeClient::new(config(&url, "adresar").with_auth_session_id(&session));
    session_client
        .save(record(json!({"kod": "SES"})), None, false, &QueryOptions::new())
        .unwrap();

    assert!(client.is_allowed_changes_api().unwrap());
    let changes = client.changes_for_evidence("adresar").unwrap();
    assert_eq!(
        changes.envelope.get("changes").and_then(Value::as_array).map(Vec::len),
        Some(1)
    );
    let later = client.all_changes(Some("1")).unwrap();
    assert_eq!(
        later.envelope.get("changes").and_then(Value::as_array).map(Vec::len),
        Some(0)
    );

    let backup = client.backup().unwrap();
    client
        .save(record(json!({"kod": "PO-ZALOZE"})), None, false, &QueryOptions::new())
        .unwrap();
    assert_eq!(client.count_in_evidence().unwrap(), 2);
    client.restore("demo", backup).unwrap();
    assert_eq!(client.count_in_evidence().unwrap(), 1);
}

#[test]
fn invoice_compositions() {
    let url = spawn_server();
    let invoices = FlexibeeClient::new(config(&url, "faktura-vydana"));
    let none = QueryOptions::new();

    let proforma = invoices
        .save(record(json!({"kod": "ZF1", "typDokl": "code:ZALOHA"})), None, false, &none)
        .unwrap()
        .ids()[0];
    let issued = invoices
        .save(record(json!({"kod": "VF1", "typDokl": "code:FAKTURA"})), None, false, &none)
        .unwrap()
        .ids()[0];

    let deduction = invoices.create_deduction_from_proforma(proforma, issued, 250.0).unwrap();
    assert_eq!(deduction.affected, 1);
    let stored = invoices.get_by_id(issued, &none).unwrap();
    assert_eq!(stored.get("odpocty-zaloh").unwrap()["odpocet"]["doklad"], json!(proforma));

    invoices.add_user_relation(issued, proforma, 10.0, 1, Some("záloha")).unwrap();
    let relations = invoices.user_relations(issued).unwrap();
    assert_eq!(
        relations.get("uzivatelska-vazba").unwrap()["object"],
        json!("code:ZF1")
    );
}
