use std::collections::HashMap;
use std::io::Read as _;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Status(u16, String),
}

/// Replies keyed by model name; unknown models get a 404.
#[derive(Debug, Clone, Default)]
pub struct StubConfig {
    pub replies: HashMap<String, Reply>,
}

impl StubConfig {
    pub fn reply(mut self, model: &str, reply: Reply) -> Self {
        self.replies.insert(model.to_owned(), reply);
        self
    }
}

/// Speaks just enough of the Gemini `generateContent` and OpenAI-compatible
/// chat completions APIs for the fallback chain.
pub struct ProviderStub {
    pub gemini_base_url: String,
    pub groq_base_url: String,
    hits: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ProviderStub {
    pub fn spawn(config: StubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start provider stub server");
        let addr = server.server_addr();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_hits = Arc::clone(&hits);
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }
                let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

                let (vendor, model) = if let Some(rest) = path.strip_prefix("/gemini/models/") {
                    let model = rest.split(':').next().unwrap_or_default().to_owned();
                    ("gemini", model)
                } else if path == "/groq/chat/completions" {
                    let model = parsed
                        .get("model")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_owned();
                    ("groq", model)
                } else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                };
                thread_hits
                    .lock()
                    .expect("lock hits")
                    .push(format!("{vendor}:{model}"));

                let (status, body) = match config.replies.get(&model) {
                    Some(Reply::Text(text)) if vendor == "gemini" => (
                        200,
                        serde_json::json!({
                            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
                        }),
                    ),
                    Some(Reply::Text(text)) => (
                        200,
                        serde_json::json!({
                            "choices": [{ "message": { "role": "assistant", "content": text } }]
                        }),
                    ),
                    Some(Reply::Status(status, message)) => (
                        *status,
                        serde_json::json!({ "error": { "code": status, "message": message } }),
                    ),
                    None => (
                        404,
                        serde_json::json!({ "error": { "message": format!("model {model} not found") } }),
                    ),
                };

                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                        .expect("build header");
                let response = tiny_http::Response::from_string(body.to_string())
                    .with_status_code(status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            gemini_base_url: format!("http://{addr}/gemini"),
            groq_base_url: format!("http://{addr}/groq"),
            hits,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// `vendor:model` for every request served, in order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().expect("lock hits").clone()
    }
}

impl Drop for ProviderStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
