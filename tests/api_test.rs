use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use wifi_manager::command::testing::ScriptedRunner;
use wifi_manager::config::{AuthConfig, Interfaces};
use wifi_manager::server::router;
use wifi_manager::{SavedNetworkLedger, TomlLedger, WifiManager};

const ACTIVE: &str = "nmcli -t -f NAME,TYPE,DEVICE connection show --active";

struct TestApp {
    router: Router,
    ledger: Arc<TomlLedger>,
    _dir: TempDir,
}

impl TestApp {
    fn new(nmcli: ScriptedRunner) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(TomlLedger::new(dir.path().join("saved.toml")));
        let manager = WifiManager::new(Arc::new(nmcli), ledger.clone(), &Interfaces::default());
        let auth = AuthConfig {
            username: "operator".to_string(),
            password: "s3cret".to_string(),
        };

        Self {
            router: router(Arc::new(manager), auth),
            ledger,
            _dir: dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self
            .send(authorized(Request::builder().uri(uri)).body(Body::empty()).unwrap())
            .await;
        (status, serde_json::from_str(&body).unwrap())
    }

    async fn post(&self, uri: &str, payload: Value) -> (StatusCode, Value) {
        let request = authorized(Request::builder().method("POST").uri(uri))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, body) = self.send(request).await;
        (status, serde_json::from_str(&body).unwrap())
    }
}

fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

fn authorized(builder: axum::http::request::Builder) -> axum::http::request::Builder {
    builder.header(header::AUTHORIZATION, basic("operator", "s3cret"))
}

#[tokio::test]
async fn test_requests_without_credentials_are_rejected() {
    let app = TestApp::new(ScriptedRunner::new());

    let (status, _) = app
        .send(Request::builder().uri("/api/scan").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/api/scan")
        .header(header::AUTHORIZATION, basic("operator", "guess"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unauthorized_response_asks_for_basic_auth() {
    let app = TestApp::new(ScriptedRunner::new());

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let challenge = response.headers().get(header::WWW_AUTHENTICATE).unwrap();
    assert!(challenge.to_str().unwrap().starts_with("Basic"));
}

#[tokio::test]
async fn test_index_page_renders() {
    let app = TestApp::new(ScriptedRunner::new());

    let (status, body) = app
        .send(authorized(Request::builder().uri("/")).body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("WiFi Manager"));
    assert!(body.contains("client wlan0"));
}

#[tokio::test]
async fn test_scan_returns_sorted_unique_networks() {
    let app = TestApp::new(ScriptedRunner::new().ok(
        "nmcli -t -f SSID,SIGNAL,SECURITY device wifi list ifname wlan0",
        "Cafe:70:WPA2\nCafe:70:\nHome:95:",
    ));

    let (status, body) = app.get("/api/scan").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": true,
            "networks": [
                { "ssid": "Home", "signal": 95, "security": "Open" },
                { "ssid": "Cafe", "signal": 70, "security": "Secured" },
            ]
        })
    );
}

#[tokio::test]
async fn test_connect_requires_ssid() {
    let app = TestApp::new(ScriptedRunner::new());

    let (status, body) = app.post("/api/connect", json!({ "password": "x" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "success": false, "message": "SSID is required" }));

    let (status, _) = app.post("/api/forget", json!({ "ssid": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_connect_records_saved_network() {
    let app = TestApp::new(
        ScriptedRunner::new().ok("nmcli device wifi connect Cafe password latte ifname wlan0", ""),
    );

    let (status, body) = app
        .post("/api/connect", json!({ "ssid": "Cafe", "password": "latte" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "message": "Connected successfully" }));

    let (_, saved) = app.get("/api/saved").await;
    assert_eq!(saved["networks"][0]["ssid"], "Cafe");
    assert!(saved["networks"][0]["last_used"].is_string());
}

#[tokio::test]
async fn test_failed_connect_reports_tool_error() {
    let app = TestApp::new(ScriptedRunner::new().fail(
        "nmcli device wifi connect Cafe ifname wlan0",
        "Error: No network with SSID 'Cafe' found.",
    ));

    let (status, body) = app.post("/api/connect", json!({ "ssid": "Cafe" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Error: No network with SSID 'Cafe' found.");
    assert!(!app.ledger.exists("Cafe").unwrap());
}

#[tokio::test]
async fn test_forget_active_network_is_refused() {
    let app = TestApp::new(
        ScriptedRunner::new()
            .ok(ACTIVE, "Home:802-11-wireless:wlan0")
            .ok(
                "nmcli -t -f 802-11-wireless.ssid connection show Home",
                "802-11-wireless.ssid:Home",
            ),
    );
    app.ledger.add_or_touch("Home").unwrap();

    let (status, body) = app.post("/api/forget", json!({ "ssid": "Home" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "success": false, "message": "Cannot forget currently active network" })
    );
    assert!(app.ledger.exists("Home").unwrap());
}

#[tokio::test]
async fn test_forget_inactive_network() {
    let app = TestApp::new(ScriptedRunner::new().ok(ACTIVE, ""));
    app.ledger.add_or_touch("Cafe").unwrap();

    let (_, body) = app.post("/api/forget", json!({ "ssid": "Cafe" })).await;

    assert_eq!(body, json!({ "success": true, "message": "Network forgotten" }));
    assert!(!app.ledger.exists("Cafe").unwrap());
}

#[tokio::test]
async fn test_current_and_status() {
    let app = TestApp::new(
        ScriptedRunner::new()
            .ok(ACTIVE, "Home:802-11-wireless:wlan0")
            .ok(
                "nmcli -t -f 802-11-wireless.ssid connection show Home",
                "802-11-wireless.ssid:Home",
            )
            .ok("ip -4 addr show wlan0", "    inet 192.168.4.20/24 scope global wlan0"),
    );
    app.ledger.add_or_touch("Home").unwrap();

    let (_, current) = app.get("/api/current").await;
    assert_eq!(current["current"]["ssid"], "Home");
    assert_eq!(current["ip"], "192.168.4.20");

    let (_, status) = app.get("/api/status").await;
    assert_eq!(status["saved_count"], 1);
    assert_eq!(status["current"]["connection_name"], "Home");
}

#[tokio::test]
async fn test_diagnostics_degrade_per_field() {
    let app = TestApp::new(
        ScriptedRunner::new()
            .ok("ip link show wlan0", "3: wlan0: <UP,LOWER_UP> mtu 1500 state UP")
            .ok("nmcli -t -f IP4.DNS device show wlan0", "IP4.DNS[1]:192.168.4.1"),
    );

    let (status, body) = app.get("/api/diagnostics").await;
    let diagnostics = &body["diagnostics"];

    assert_eq!(status, StatusCode::OK);
    assert_eq!(diagnostics["interfaces"]["wlan0"]["status"], "Up");
    assert_eq!(diagnostics["interfaces"]["wlan1"]["status"], "Missing");
    assert_eq!(diagnostics["gateway"], "Unknown");
    assert_eq!(diagnostics["dns_servers"], json!(["192.168.4.1"]));
}

#[tokio::test]
async fn test_ping_defaults() {
    let app = TestApp::new(ScriptedRunner::new().ok(
        "ping -c 4 8.8.8.8",
        "4 packets transmitted, 4 received, 0% packet loss, time 3004ms",
    ));

    let (status, body) = app.post("/api/ping", json!({})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["host"], "8.8.8.8");
    assert_eq!(body["packet_loss"], "0%");
    assert!(body.get("avg_time").is_none());
}
