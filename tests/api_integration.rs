//! Integration tests for the upload / preview / send REST flow.
//!
//! Each test serves the router on a random port and talks to it with
//! reqwest, uploading a real workbook written with umya-spreadsheet.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use secrecy::SecretString;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::time::timeout;

use report_digest::config::AppConfig;
use report_digest::error::DispatchError;
use report_digest::mail::{Connector, Mailer, OutgoingMail, SenderAccount, SmtpSettings};
use report_digest::web::{AppState, router};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const HEADERS: [&str; 8] = [
    "Título",
    "Dominio",
    "Data Owner",
    "Data Steward",
    "Visible",
    "Endorsement",
    "Correo Enviado",
    "Fecha envío",
];

const ROWS: [[&str; 8]; 5] = [
    ["Ventas", "Comercial", "ana@corp.com", "luis@corp.com", "Sí", "Promoted", "No", ""],
    ["Costos", "Finanzas", "ana@corp.com", "", "No", "", "No", ""],
    ["Margen", "Finanzas", "bruno@corp.com", "", "Sí", "Certified", "No", ""],
    ["Inventario", "Operaciones", "carla@corp.com", "", "No", "", "No", ""],
    ["Sin dueño", "Operaciones", "", "", "No", "", "No", ""],
];

const SEAL_HEADERS: [&str; 7] = [
    "Título",
    "Dominio",
    "Data Owner",
    "Visible",
    "Sello Técnico",
    "Sello Negocio",
    "Sello Seguridad",
];

const SEAL_ROWS: [[&str; 7]; 3] = [
    ["Ventas", "Comercial", "ana@corp.com", "Sí", "Sí", "Sí", "Sí"],
    ["Costos", "Finanzas", "ana@corp.com", "Sí", "Sí", "", ""],
    ["Inventario", "Operaciones", "carla@corp.com", "No", "", "", ""],
];

/// Mail transport stub: records deliveries, rejects one address.
struct StubMailer {
    reject: Option<String>,
    delay: Duration,
    delivered: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl Mailer for StubMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), DispatchError> {
        std::thread::sleep(self.delay);
        if self.reject.as_deref() == Some(mail.to.as_str()) {
            return Err(DispatchError::Send {
                recipient: mail.to.clone(),
                reason: "550 mailbox unavailable".into(),
            });
        }
        self.delivered.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

struct StubConnector {
    refuse: bool,
    reject: Option<String>,
    delay: Duration,
    delivered: Arc<Mutex<Vec<OutgoingMail>>>,
}

impl Connector for StubConnector {
    fn connect(
        &self,
        settings: &SmtpSettings,
        _account: &SenderAccount,
    ) -> Result<Box<dyn Mailer>, DispatchError> {
        if self.refuse {
            return Err(DispatchError::Connect {
                host: settings.host.clone(),
                reason: "connection refused".into(),
            });
        }
        Ok(Box::new(StubMailer {
            reject: self.reject.clone(),
            delay: self.delay,
            delivered: Arc::clone(&self.delivered),
        }))
    }
}

struct TestServer {
    base: String,
    delivered: Arc<Mutex<Vec<OutgoingMail>>>,
    _dir: TempDir,
    workbook: Vec<u8>,
}

fn write_workbook<const N: usize>(path: &Path, headers: [&str; N], rows: &[[&str; N]]) {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_by_name_mut("Sheet1").unwrap();
    let columns = ["A", "B", "C", "D", "E", "F", "G", "H"];
    for (col, header) in columns.iter().zip(headers) {
        sheet.get_cell_mut(format!("{col}1").as_str()).set_value(header);
    }
    for (idx, row) in rows.iter().enumerate() {
        for (col, value) in columns.iter().zip(row) {
            if !value.is_empty() {
                let address = format!("{col}{}", idx + 2);
                sheet.get_cell_mut(address.as_str()).set_value(*value);
            }
        }
    }
    umya_spreadsheet::writer::xlsx::write(&book, path).unwrap();
}

/// Start the API on a random port with one sender account.
async fn start_server(refuse: bool, reject: Option<&str>) -> TestServer {
    start_server_with_delay(refuse, reject, Duration::ZERO).await
}

async fn start_server_with_delay(refuse: bool, reject: Option<&str>, delay: Duration) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let workbook_path = dir.path().join("estado.xlsx");
    write_workbook(&workbook_path, HEADERS, &ROWS);
    let workbook = std::fs::read(&workbook_path).unwrap();

    let config = AppConfig {
        upload_dir: dir.path().join("uploads"),
        smtp: SmtpSettings {
            accounts: vec![SenderAccount {
                id: "gobierno".into(),
                address: "gobierno@corp.com".into(),
                label: "Gobierno de Datos".into(),
                password: SecretString::from("unused"),
            }],
            ..Default::default()
        },
        ..Default::default()
    };
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let connector = StubConnector {
        refuse,
        reject: reject.map(str::to_string),
        delay,
        delivered: Arc::clone(&delivered),
    };
    let state = AppState::new(config, Arc::new(connector)).unwrap();
    let app = router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        delivered,
        _dir: dir,
        workbook,
    }
}

async fn upload(server: &TestServer, file_name: &str, sheet: Option<&str>) -> reqwest::Response {
    upload_bytes(server, server.workbook.clone(), file_name, sheet).await
}

async fn upload_bytes(
    server: &TestServer,
    bytes: Vec<u8>,
    file_name: &str,
    sheet: Option<&str>,
) -> reqwest::Response {
    let part = Part::bytes(bytes).file_name(file_name.to_string());
    let mut form = Form::new().part("file", part);
    if let Some(sheet) = sheet {
        form = form.text("sheet", sheet.to_string());
    }
    reqwest::Client::new()
        .post(format!("{}/api/uploads", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

async fn upload_session(server: &TestServer) -> String {
    let resp = upload(server, "estado.xlsx", None).await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    body["session_id"].as_str().unwrap().to_string()
}

// ── Upload ───────────────────────────────────────────────────────────

#[tokio::test]
async fn health_and_accounts() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, None).await;

        let health: Value = reqwest::get(format!("{}/health", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");

        let accounts: Value = reqwest::get(format!("{}/api/accounts", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(accounts[0]["id"], "gobierno");
        assert_eq!(accounts[0]["label"], "Gobierno de Datos");
        assert!(accounts[0].get("password").is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn upload_returns_summary() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, None).await;

        let resp = upload(&server, "estado.xlsx", None).await;
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();

        assert_eq!(body["file_name"], "estado.xlsx");
        assert_eq!(body["sheet"], "Sheet1");
        assert_eq!(body["summary"]["total_reports"], 5);
        assert_eq!(body["summary"]["pending_reports"], 3);
        assert_eq!(body["summary"]["domains"], 3);
        assert_eq!(body["summary"]["data_owners"], 3);
        assert_eq!(body["summary"]["skipped_rows"], 1);
        assert_eq!(body["columns"]["owner"]["header"], "Data Owner");

        // The staged file is removed once parsed.
        let staged = std::fs::read_dir(server._dir.path().join("uploads"))
            .unwrap()
            .count();
        assert_eq!(staged, 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn upload_rejects_non_xlsx_and_unknown_sheet() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, None).await;

        let resp = upload(&server, "estado.csv", None).await;
        assert_eq!(resp.status(), 422);

        let resp = upload(&server, "estado.xlsx", Some("Estado Reportes")).await;
        assert_eq!(resp.status(), 422);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("Estado Reportes"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn upload_accepts_sheet_without_endorsement_column() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, None).await;
        let path = server._dir.path().join("sellos.xlsx");
        write_workbook(&path, SEAL_HEADERS, &SEAL_ROWS);
        let bytes = std::fs::read(&path).unwrap();

        let resp = upload_bytes(&server, bytes, "sellos.xlsx", None).await;
        assert_eq!(resp.status(), 201);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["variant"], "endorsement");
        assert_eq!(body["summary"]["total_reports"], 3);
        assert!(body["summary"]["pending_reports"].is_null());
        assert_eq!(body["summary"]["missing_columns"][0], "endorsement");
        let session = body["session_id"].as_str().unwrap();

        // The default variant cannot classify this sheet.
        let resp = reqwest::get(format!("{}/api/sessions/{session}/preview", server.base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 422);

        let body: Value = reqwest::get(format!(
            "{}/api/sessions/{session}/preview?variant=seal-completeness",
            server.base
        ))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
        assert_eq!(body["summary"]["pending_reports"], 2);
        let digests = body["digests"].as_array().unwrap();
        assert_eq!(digests[0]["recipient"], "ana@corp.com");
        assert_eq!(
            digests[0]["domains"]["Finanzas"]["buckets"][0]["status_key"],
            "needs_certification"
        );
        assert_eq!(
            digests[1]["domains"]["Operaciones"]["buckets"][0]["status_key"],
            "needs_publishing"
        );

        let html = reqwest::get(format!(
            "{}/api/sessions/{session}/preview/ANA@corp.com?variant=seal-completeness",
            server.base
        ))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
        assert!(html.contains("Sellos Actuales"));
        assert!(html.contains("<td>Tecnología</td>"));
        assert!(html.contains("<td>Sin información</td>"));
    })
    .await
    .expect("test timed out");
}

// ── Preview ──────────────────────────────────────────────────────────

#[tokio::test]
async fn preview_groups_by_owner_and_domain() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, None).await;
        let session = upload_session(&server).await;

        let body: Value = reqwest::get(format!("{}/api/sessions/{session}/preview", server.base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["variant"], "endorsement");
        let digests = body["digests"].as_array().unwrap();
        let recipients: Vec<&str> = digests
            .iter()
            .map(|d| d["recipient"].as_str().unwrap())
            .collect();
        assert_eq!(recipients, vec!["ana@corp.com", "carla@corp.com"]);

        let ana = &digests[0];
        assert_eq!(ana["subject"], "Estado de Reportes - Comercial, Finanzas");
        assert_eq!(
            ana["domains"]["Comercial"]["buckets"][0]["status_key"],
            "needs_certification"
        );
        assert_eq!(
            ana["domains"]["Finanzas"]["buckets"][0]["status_key"],
            "needs_promotion and needs_publishing"
        );
        assert_eq!(ana["domains"]["Finanzas"]["buckets"][0]["titles"][0], "Costos");
        assert_eq!(body["skipped"][0]["reason"], "no_recipient");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn preview_overrides_and_recipient_html() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, None).await;
        let session = upload_session(&server).await;

        let body: Value = reqwest::get(format!(
            "{}/api/sessions/{session}/preview?secondary=true&cc=true",
            server.base
        ))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
        let recipients: Vec<&str> = body["digests"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["recipient"].as_str().unwrap())
            .collect();
        assert_eq!(recipients, vec!["ana@corp.com", "carla@corp.com", "luis@corp.com"]);
        assert_eq!(body["digests"][0]["cc"][0], "luis@corp.com");

        let resp = reqwest::get(format!(
            "{}/api/sessions/{session}/preview/ana@corp.com",
            server.base
        ))
        .await
        .unwrap();
        assert_eq!(resp.status(), 200);
        let html = resp.text().await.unwrap();
        assert!(html.contains("Dominio: Finanzas"));
        assert!(html.contains("Por promocionar y por publicar"));

        let resp = reqwest::get(format!(
            "{}/api/sessions/{session}/preview/bruno@corp.com",
            server.base
        ))
        .await
        .unwrap();
        assert_eq!(resp.status(), 404);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_session_is_404() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, None).await;
        let id = uuid::Uuid::new_v4();

        let resp = reqwest::get(format!("{}/api/sessions/{id}/preview", server.base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        let resp = reqwest::get(format!("{}/api/sessions/not-a-uuid/history", server.base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    })
    .await
    .expect("test timed out");
}

// ── Send ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn send_records_history_and_marks_rows() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(false, Some("carla@corp.com")).await;
        let session = upload_session(&server).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/api/sessions/{session}/send", server.base))
            .json(&serde_json::json!({"account": "gobierno"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let history: Value = resp.json().await.unwrap();
        assert_eq!(history["sender"], "gobierno@corp.com");
        assert_eq!(history["sent"].as_array().unwrap().len(), 1);
        assert_eq!(history["sent"][0]["recipient"], "ana@corp.com");
        assert_eq!(history["sent"][0]["report_count"], 2);
        assert_eq!(history["errors"].as_array().unwrap().len(), 1);

        {
            let delivered = server.delivered.lock().unwrap();
            assert_eq!(delivered.len(), 1);
            assert_eq!(delivered[0].to, "ana@corp.com");
            assert!(delivered[0].html.contains("1. Ventas"));
        }

        let histories: Value =
            reqwest::get(format!("{}/api/sessions/{session}/history", server.base))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
        assert_eq!(histories.as_array().unwrap().len(), 1);

        // Ana's rows are now marked as sent; follow-up leaves only Carla.
        let body: Value = reqwest::get(format!(
            "{}/api/sessions/{session}/preview?follow_up=true",
            server.base
        ))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
        let recipients: Vec<&str> = body["digests"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["recipient"].as_str().unwrap())
            .collect();
        assert_eq!(recipients, vec!["carla@corp.com"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn overlapping_sends_do_not_repeat_deliveries() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server_with_delay(false, None, Duration::from_millis(300)).await;
        let session = upload_session(&server).await;
        let client = reqwest::Client::new();
        let url = format!("{}/api/sessions/{session}/send", server.base);
        let body = serde_json::json!({"account": "gobierno", "follow_up": true});

        let (first, second) = tokio::join!(
            client.post(&url).json(&body).send(),
            client.post(&url).json(&body).send(),
        );
        let first = first.unwrap();
        let second = second.unwrap();
        assert_eq!(first.status(), 200);
        assert_eq!(second.status(), 200);

        let first: Value = first.json().await.unwrap();
        let second: Value = second.json().await.unwrap();
        let sent = first["sent"].as_array().unwrap().len() + second["sent"].as_array().unwrap().len();
        assert_eq!(sent, 2);

        let mut recipients: Vec<String> = server
            .delivered
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.to.clone())
            .collect();
        recipients.sort();
        assert_eq!(recipients, vec!["ana@corp.com", "carla@corp.com"]);

        let histories: Value =
            reqwest::get(format!("{}/api/sessions/{session}/history", server.base))
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
        assert_eq!(histories.as_array().unwrap().len(), 2);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn send_failures_map_to_status() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(true, None).await;
        let session = upload_session(&server).await;
        let client = reqwest::Client::new();
        let url = format!("{}/api/sessions/{session}/send", server.base);

        let resp = client
            .post(&url)
            .json(&serde_json::json!({"account": "otra"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = client
            .post(&url)
            .json(&serde_json::json!({"account": "gobierno"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 502);
        assert!(server.delivered.lock().unwrap().is_empty());

        let resp = client
            .delete(format!("{}/api/sessions/{session}", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 204);

        let resp = client
            .post(&url)
            .json(&serde_json::json!({"account": "gobierno"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    })
    .await
    .expect("test timed out");
}
