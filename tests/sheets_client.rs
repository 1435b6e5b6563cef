use mailpixel::error::TrackerError;
use mailpixel::row::{columns, default_header, TrackingRow};
use mailpixel::sheets::SheetsClient;
use mailpixel::{SheetsConfig, TrackingConfig, TrackingIdentifier, TrackingStore};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DOCUMENT_ID: &str = "doc-1";
const FIXTURE: &str = include_str!("fixtures/service_account.json");

/// Service-account key from the fixture, pointed at the mock token endpoint.
fn credentials_for(server: &MockServer) -> String {
    let mut key: Value = serde_json::from_str(FIXTURE).unwrap();
    key["token_uri"] = json!(format!("{}/token", server.uri()));
    key.to_string()
}

fn client_for(server: &MockServer) -> SheetsClient {
    let sheets = SheetsConfig {
        credentials_json: Some(credentials_for(server)),
        document_id: Some(DOCUMENT_ID.to_string()),
        api_base: server.uri(),
        request_timeout_secs: 5,
        ..SheetsConfig::default()
    };
    let tracking = TrackingConfig {
        load_attempts: 3,
        retry_delay_ms: 10,
        ..TrackingConfig::default()
    };
    SheetsClient::connect(&sheets, &tracking).unwrap()
}

async fn mount_token(server: &MockServer) {
    mount_token_expecting(server, 1).await;
}

async fn mount_token_expecting(server: &MockServer, exchanges: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(exchanges)
        .mount(server)
        .await;
}

async fn mount_document(server: &MockServer, titles: &[&str]) {
    let sheets: Vec<Value> = titles
        .iter()
        .map(|t| json!({ "properties": { "title": t } }))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/v4/spreadsheets/{}", DOCUMENT_ID)))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spreadsheetId": DOCUMENT_ID,
            "sheets": sheets,
        })))
        .mount(server)
        .await;
}

fn identifier() -> TrackingIdentifier {
    TrackingIdentifier::new("Acme", "bob@acme.io", "Hi", "Initial", None)
}

fn grid() -> Value {
    let header = default_header();
    let id = identifier();
    let row = TrackingRow::initial(2, &id.encode(), &id);
    json!({
        "range": "'Email Tracking Log'!A1:Z2",
        "majorDimension": "ROWS",
        "values": [header.clone(), row.to_values(&header)],
    })
}

#[tokio::test]
async fn load_document_retries_transient_failures() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/v4/spreadsheets/{}", DOCUMENT_ID)))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "code": 503, "message": "The service is currently unavailable." }
        })))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&server)
        .await;
    mount_document(&server, &["Overview", "Email Tracking Log"]).await;

    let document = client_for(&server).load_document().await.unwrap();
    assert_eq!(document.id, DOCUMENT_ID);
    assert_eq!(document.sheet_titles, vec!["Overview", "Email Tracking Log"]);
    assert_eq!(
        document.resolve_sheet("email tracking log").unwrap(),
        "Email Tracking Log"
    );
}

#[tokio::test]
async fn load_document_gives_up_after_attempts() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/v4/spreadsheets/{}", DOCUMENT_ID)))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = client_for(&server).load_document().await.unwrap_err();
    assert!(matches!(err, TrackerError::Api { status: 500, .. }));
}

#[tokio::test]
async fn permission_error_is_not_retried() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/v4/spreadsheets/{}", DOCUMENT_ID)))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "The caller does not have permission" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    match client_for(&server).load_document().await.unwrap_err() {
        TrackerError::Api { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "The caller does not have permission");
        }
        other => panic!("expected api error, got {:?}", other),
    }
}

#[tokio::test]
async fn unauthorized_response_is_retried_with_fresh_token() {
    let server = MockServer::start().await;
    // Each rejected attempt drops the cached token
    mount_token_expecting(&server, 3).await;
    Mock::given(method("GET"))
        .and(path(format!("/v4/spreadsheets/{}", DOCUMENT_ID)))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": 401, "message": "Request had invalid authentication credentials." }
        })))
        .expect(3)
        .mount(&server)
        .await;

    let err = client_for(&server).load_document().await.unwrap_err();
    assert!(matches!(err, TrackerError::Auth(_)));
}

#[tokio::test]
async fn rejected_assertion_is_retried_then_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .expect(3)
        .mount(&server)
        .await;

    let err = client_for(&server).load_document().await.unwrap_err();
    assert!(matches!(err, TrackerError::Auth(_)));
}

#[tokio::test]
async fn expired_token_recovers_on_next_attempt() {
    let server = MockServer::start().await;
    mount_token_expecting(&server, 2).await;
    Mock::given(method("GET"))
        .and(path(format!("/v4/spreadsheets/{}", DOCUMENT_ID)))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_document(&server, &["Email Tracking Log"]).await;

    let document = client_for(&server).load_document().await.unwrap();
    assert_eq!(document.sheet_titles, vec!["Email Tracking Log"]);
}

#[tokio::test]
async fn open_sheet_loads_rows_with_token_reuse() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_document(&server, &["EMAIL TRACKING LOG"]).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/doc-1/values/'EMAIL%20TRACKING%20LOG'$"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grid()))
        .expect(1)
        .mount(&server)
        .await;

    let sheet = client_for(&server).open_sheet().await.unwrap();
    assert_eq!(sheet.title, "EMAIL TRACKING LOG");
    assert_eq!(sheet.header, default_header());
    assert_eq!(sheet.rows.len(), 1);
    assert_eq!(sheet.rows[0].row_number(), 2);
    assert_eq!(sheet.rows[0].get(columns::EMAIL_ID), "bob@acme.io");
    assert_eq!(sheet.rows[0].get(columns::TOTAL_OPENS), "0");
}

#[tokio::test]
async fn open_sheet_reports_missing_worksheet() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_document(&server, &["Sheet1"]).await;

    let err = client_for(&server).open_sheet().await.unwrap_err();
    assert!(matches!(err, TrackerError::SheetNotFound(name) if name == "Email Tracking Log"));
}

#[tokio::test]
async fn open_sheet_rejects_incomplete_header() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_document(&server, &["Email Tracking Log"]).await;
    Mock::given(method("GET"))
        .and(path_regex(r"/values/'Email%20Tracking%20Log'$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [["CID", "Company Name", "Email ID"]]
        })))
        .mount(&server)
        .await;

    match client_for(&server).open_sheet().await.unwrap_err() {
        TrackerError::Schema { missing } => {
            assert!(missing.contains(&"Total Opens".to_string()));
            assert!(!missing.contains(&"CID".to_string()));
        }
        other => panic!("expected schema error, got {:?}", other),
    }
}

#[tokio::test]
async fn insert_row_uses_append_range() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_document(&server, &["Email Tracking Log"]).await;
    Mock::given(method("GET"))
        .and(path_regex(r"/values/'Email%20Tracking%20Log'$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grid()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/values/'Email%20Tracking%20Log':append$"))
        .and(query_param("valueInputOption", "RAW"))
        .and(query_param("insertDataOption", "INSERT_ROWS"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "spreadsheetId": DOCUMENT_ID,
            "updates": { "updatedRange": "'Email Tracking Log'!A7:Z7", "updatedRows": 1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let mut sheet = client.open_sheet().await.unwrap();
    let id = TrackingIdentifier::new("Acme", "carol@acme.io", "Hi", "Initial", None);
    let row = client
        .insert_row(&mut sheet, TrackingRow::initial(0, &id.encode(), &id))
        .await
        .unwrap();

    assert_eq!(row.row_number(), 7);
    assert_eq!(sheet.rows.len(), 2);
    assert_eq!(sheet.rows[1].row_number(), 7);

    let requests = server.received_requests().await.unwrap();
    let append = requests
        .iter()
        .find(|r| r.method.as_str() == "POST" && r.url.path().ends_with(":append"))
        .unwrap();
    let body: Value = serde_json::from_slice(&append.body).unwrap();
    let values = body["values"][0].as_array().unwrap();
    assert_eq!(values.len(), default_header().len());
    assert_eq!(values[0], json!(id.encode()));
    assert_eq!(values[2], json!("carol@acme.io"));
    assert_eq!(values[6], json!(0));
}

#[tokio::test]
async fn persist_writes_single_row_range() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_document(&server, &["Email Tracking Log"]).await;
    Mock::given(method("GET"))
        .and(path_regex(r"/values/'Email%20Tracking%20Log'$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grid()))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"/values/'Email%20Tracking%20Log'!A2:Z2$"))
        .and(query_param("valueInputOption", "RAW"))
        .and(body_partial_json(json!({ "majorDimension": "ROWS" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updatedRows": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let sheet = client.open_sheet().await.unwrap();
    let mut row = sheet.rows[0].clone();
    row.set(columns::TOTAL_OPENS, "1");

    client.persist(&sheet, &row).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let put = requests
        .iter()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    let body: Value = serde_json::from_slice(&put.body).unwrap();
    let values = body["values"][0].as_array().unwrap();
    assert_eq!(values[0], json!(row.get(columns::CID)));
    assert_eq!(values[6], json!(1));
    assert_eq!(values[7], json!(""));
}

#[tokio::test]
async fn persist_leaves_unnamed_columns_untouched() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_document(&server, &["Email Tracking Log"]).await;
    let mut header = default_header();
    header.insert(1, String::new());
    let id = identifier();
    let mut values = TrackingRow::initial(2, &id.encode(), &id).to_values(&header);
    values[1] = "call back Friday".to_string();
    Mock::given(method("GET"))
        .and(path_regex(r"/values/'Email%20Tracking%20Log'$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [header.clone(), values],
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"/values/'Email%20Tracking%20Log'!A2:AA2$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updatedRows": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let sheet = client.open_sheet().await.unwrap();
    let mut row = sheet.rows[0].clone();
    row.set(columns::TOTAL_OPENS, "1");
    client.persist(&sheet, &row).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let put = requests
        .iter()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    let body: Value = serde_json::from_slice(&put.body).unwrap();
    let cells = body["values"][0].as_array().unwrap();
    assert_eq!(cells.len(), 27);
    assert_eq!(cells[0], json!(id.encode()));
    assert_eq!(cells[1], Value::Null);
    assert_eq!(cells[7], json!(1));
}
