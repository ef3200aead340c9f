//! End-to-end server integration tests
//!
//! Tests the full HTTP flow: mock gateway + in-memory ledger -> API server
//! -> reqwest client.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use denuncia_core::{
    encrypt_package, BatchConfig, ContentId, LedgerError, LedgerReader, LedgerRecordRef,
    ResolverConfig,
};
use denuncia_server::{NoLedger, ServerBuilder};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(19400);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

const PASSWORD: &str = "correct horse battery staple";

fn cid(n: u32) -> String {
    format!("QmServerE2e{:034}", n)
}

struct MemoryLedger {
    records: Vec<LedgerRecordRef>,
}

impl LedgerReader for MemoryLedger {
    async fn total_records(&self) -> Result<u64, LedgerError> {
        Ok(self.records.len() as u64)
    }

    async fn record_at(&self, index: u64) -> Result<LedgerRecordRef, LedgerError> {
        self.records
            .get(index as usize)
            .cloned()
            .ok_or_else(|| LedgerError::Rpc(format!("no record {}", index)))
    }

    async fn record_events(&self, _from: u64, _to: u64) -> Result<Vec<LedgerRecordRef>, LedgerError> {
        Ok(Vec::new())
    }

    async fn head_block(&self) -> Result<u64, LedgerError> {
        Ok(0)
    }
}

type Blobs = Arc<HashMap<String, String>>;

async fn blob(State(blobs): State<Blobs>, Path(cid): Path<String>) -> (StatusCode, String) {
    match blobs.get(&cid) {
        Some(body) => (StatusCode::OK, body.clone()),
        None => (StatusCode::NOT_FOUND, String::new()),
    }
}

async fn bind(router: Router) -> (String, tokio::sync::oneshot::Sender<()>) {
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let port = next_port();
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let listener = TcpListener::bind(addr).await.expect("Bind should succeed");

    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    (format!("http://127.0.0.1:{}", port), shutdown_tx)
}

/// Test harness for running E2E server tests
pub struct TestHarness {
    pub server_url: String,
    pub http: Client,
    _shutdown: Vec<tokio::sync::oneshot::Sender<()>>,
}

impl TestHarness {
    fn blobs() -> HashMap<String, String> {
        let pkg = encrypt_package("denuncia cifrada", PASSWORD).to_json();
        let wrapped = json!({ "encryptedContent": pkg.clone() }).to_string();

        let mut blobs = HashMap::new();
        blobs.insert(cid(0), r#"{"titulo":"Basura en el parque"}"#.to_string());
        blobs.insert(cid(1), pkg);
        blobs.insert(cid(2), wrapped);
        blobs.insert(cid(3), "texto plano".to_string());
        blobs
    }

    fn config(gateway_url: String) -> ResolverConfig {
        ResolverConfig::default()
            .with_gateways([format!("{}/ipfs/", gateway_url)])
            .with_attempt_timeout(Duration::from_secs(2))
            .with_batch(BatchConfig::immediate(2))
    }

    async fn gateway() -> (String, tokio::sync::oneshot::Sender<()>) {
        let router = Router::new()
            .route("/ipfs/{cid}", get(blob))
            .with_state(Arc::new(Self::blobs()));
        bind(router).await
    }

    /// Server with a ledger holding `records`
    pub async fn with_ledger(records: Vec<LedgerRecordRef>) -> Self {
        let (gateway_url, gateway_shutdown) = Self::gateway().await;
        let server = ServerBuilder::new(Self::config(gateway_url))
            .ledger(MemoryLedger { records })
            .build()
            .expect("Server should build");
        let (server_url, server_shutdown) = bind(server.router()).await;
        Self::ready(server_url, vec![gateway_shutdown, server_shutdown]).await
    }

    /// Server resolving content only
    pub async fn without_ledger() -> Self {
        let (gateway_url, gateway_shutdown) = Self::gateway().await;
        let server = ServerBuilder::<NoLedger>::new(Self::config(gateway_url))
            .build()
            .expect("Server should build");
        let (server_url, server_shutdown) = bind(server.router()).await;
        Self::ready(server_url, vec![gateway_shutdown, server_shutdown]).await
    }

    async fn ready(server_url: String, shutdown: Vec<tokio::sync::oneshot::Sender<()>>) -> Self {
        let http = Client::new();
        for _ in 0..10 {
            if http
                .get(format!("{}/health", server_url))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Self {
            server_url,
            http,
            _shutdown: shutdown,
        }
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        let resp = self
            .http
            .get(format!("{}{}", self.server_url, path))
            .send()
            .await
            .expect("Request should succeed");
        Self::read(resp).await
    }

    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .http
            .post(format!("{}{}", self.server_url, path))
            .json(&body)
            .send()
            .await
            .expect("Request should succeed");
        Self::read(resp).await
    }

    async fn read(resp: reqwest::Response) -> (StatusCode, Value) {
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        let text = resp.text().await.unwrap();
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        (status, body)
    }
}

fn record(index: u64, secs: i64) -> LedgerRecordRef {
    LedgerRecordRef {
        index,
        content_id: ContentId::parse(cid(index as u32)).unwrap(),
        author_ref: "0x00000000000000000000000000000000000000Ab".into(),
        created_at: Utc.timestamp_opt(secs, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_health() {
    let harness = TestHarness::without_ledger().await;
    let (status, body) = harness.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["ledgerConfigured"], false);
    assert_eq!(body["gateways"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_plain_content() {
    let harness = TestHarness::without_ledger().await;
    let (status, body) = harness.get(&format!("/content/{}", cid(3))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isEncrypted"], false);
    assert_eq!(body["plaintext"], "texto plano");
    assert_eq!(body["state"], "plain");
}

#[tokio::test]
async fn test_encrypted_content_awaits_passphrase() {
    let harness = TestHarness::without_ledger().await;
    let (status, body) = harness.get(&format!("/content/{}", cid(1))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isEncrypted"], true);
    assert_eq!(body["state"], "awaiting_passphrase");
    assert!(body.get("plaintext").is_none());
}

#[tokio::test]
async fn test_decrypt_direct_and_wrapped() {
    let harness = TestHarness::without_ledger().await;
    for n in [1, 2] {
        let (status, body) = harness
            .post(
                &format!("/content/{}/decrypt", cid(n)),
                json!({ "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "cid {}: {}", n, body);
        assert_eq!(body["state"], "decrypted");
        assert_eq!(body["plaintext"], "denuncia cifrada");
    }
}

#[tokio::test]
async fn test_decrypt_wrong_password() {
    let harness = TestHarness::without_ledger().await;
    let (status, body) = harness
        .post(
            &format!("/content/{}/decrypt", cid(1)),
            json!({ "password": "not it" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "DecryptionFailed");
    assert_eq!(body["state"], "decryption_failed");
    assert!(body.get("plaintext").is_none());
}

#[tokio::test]
async fn test_decrypt_plain_content_is_invalid_json() {
    let harness = TestHarness::without_ledger().await;
    let (status, body) = harness
        .post(
            &format!("/content/{}/decrypt", cid(3)),
            json!({ "password": PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "InvalidJson");
}

#[tokio::test]
async fn test_missing_content_is_resolution_failure() {
    let harness = TestHarness::without_ledger().await;
    let (status, body) = harness.get(&format!("/content/{}", cid(99))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "AllEndpointsExhausted");
    assert_eq!(body["state"], "resolution_failed");
}

#[tokio::test]
async fn test_invalid_content_id_rejected() {
    let harness = TestHarness::without_ledger().await;
    let (status, _) = harness.get("/content/short").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = harness
        .post(&format!("/content/{}/decrypt", cid(1)), json!({ "password": "" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_inspect() {
    let harness = TestHarness::without_ledger().await;
    let pkg = encrypt_package("x", "pw").to_json();
    let escaped = serde_json::to_string(&pkg).unwrap();
    let raw = format!(r#"{{"encryptedContent":{}}}"#, serde_json::to_string(&escaped).unwrap());

    let (status, body) = harness.post("/inspect", json!({ "raw": raw })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isEncrypted"], true);
    assert_eq!(body["shape"], "encrypted_package");
    assert_eq!(body["canonical"], pkg);

    let (_, body) = harness.post("/inspect", json!({ "raw": "hola" })).await;
    assert_eq!(body["isEncrypted"], false);
    assert_eq!(body["shape"], "plain_text");
    assert!(body.get("canonical").is_none());
}

#[tokio::test]
async fn test_records_with_previews() {
    let harness =
        TestHarness::with_ledger(vec![record(0, 100), record(1, 300), record(2, 200)]).await;
    let (status, body) = harness.get("/records").await;
    assert_eq!(status, StatusCode::OK);

    let listing = &body["listing"];
    assert_eq!(listing["status"], "listed");
    assert_eq!(listing["source"], "indexed");
    let order: Vec<u64> = listing["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["index"].as_u64().unwrap())
        .collect();
    assert_eq!(order, vec![1, 2, 0]);

    let previews = body["previews"].as_array().unwrap();
    assert_eq!(previews.len(), 3);
    assert_eq!(previews[0]["state"], "awaiting_passphrase");
    assert_eq!(previews[1]["state"], "awaiting_passphrase");
    assert_eq!(previews[2]["preview"], "Basura en el parque");
    assert_eq!(previews[2]["contentId"], cid(0));
}

#[tokio::test]
async fn test_records_without_previews() {
    let harness = TestHarness::with_ledger(vec![record(0, 100)]).await;
    let (status, body) = harness.get("/records?previews=false").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("previews").is_none());
    assert_eq!(body["listing"]["records"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_records_empty_ledger() {
    let harness = TestHarness::with_ledger(vec![]).await;
    let (status, body) = harness.get("/records").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["listing"]["status"], "no_records_yet");
    assert!(body.get("previews").is_none());
}

#[tokio::test]
async fn test_records_without_ledger() {
    let harness = TestHarness::without_ledger().await;
    let (status, _) = harness.get("/records").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = harness.get("/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
