//! In-process stand-in for the vendor API.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde_json::Value;
use songguo::config::VendorConfig;
use tokio::net::TcpListener;

#[derive(Default)]
struct Replies {
    list: String,
    command: String,
    requests: Vec<(&'static str, Value)>,
}

/// Serves `/list` and `/command` on an ephemeral port, replying with
/// percent-encoded bodies the way the vendor does.
#[derive(Clone)]
pub struct FakeVendor {
    addr: SocketAddr,
    replies: Arc<Mutex<Replies>>,
}

impl FakeVendor {
    pub async fn start() -> Self {
        let replies = Arc::new(Mutex::new(Replies {
            list: r#"{"deviceslist":[]}"#.to_string(),
            command: r#"{"status":"0"}"#.to_string(),
            requests: Vec::new(),
        }));

        let app = Router::new()
            .route("/list", post(list))
            .route("/command", post(command))
            .with_state(replies.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, replies }
    }

    pub fn config(&self) -> VendorConfig {
        VendorConfig {
            command_url: format!("http://{}/command", self.addr),
            list_url: format!("http://{}/list", self.addr),
            timeout_secs: 5,
            scan_interval_secs: 30,
        }
    }

    /// Set the raw (unencoded) JSON returned by the listing endpoint
    pub fn reply_list(&self, body: &str) {
        self.replies.lock().unwrap().list = body.to_string();
    }

    /// Set the raw (unencoded) JSON returned by the command endpoint
    pub fn reply_command(&self, body: &str) {
        self.replies.lock().unwrap().command = body.to_string();
    }

    /// Requests received so far, tagged with the endpoint that got them
    pub fn requests(&self) -> Vec<(&'static str, Value)> {
        self.replies.lock().unwrap().requests.clone()
    }
}

async fn list(State(replies): State<Arc<Mutex<Replies>>>, Json(body): Json<Value>) -> String {
    let mut replies = replies.lock().unwrap();
    replies.requests.push(("list", body));
    urlencoding::encode(&replies.list).into_owned()
}

async fn command(State(replies): State<Arc<Mutex<Replies>>>, Json(body): Json<Value>) -> String {
    let mut replies = replies.lock().unwrap();
    replies.requests.push(("command", body));
    urlencoding::encode(&replies.command).into_owned()
}

/// A config pointing at a port nothing listens on
pub async fn unreachable_config() -> VendorConfig {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    VendorConfig {
        command_url: format!("http://{}/command", addr),
        list_url: format!("http://{}/list", addr),
        timeout_secs: 5,
        scan_interval_secs: 30,
    }
}
