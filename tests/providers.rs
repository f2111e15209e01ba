use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use politiko::agent::{AgentError, ChatModel, PerplexityClient};
use politiko::translate::{GoogleTranslator, TranslationError, Translator};
use politiko::Config;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// Scripted upstream: answers in order, repeating the last answer once the
/// script runs out. Every request is recorded.
struct Upstream {
    replies: Vec<(u16, String)>,
    delay: Duration,
    requests: Mutex<Vec<(HeaderMap, Value)>>,
}

impl Upstream {
    fn new(replies: &[(u16, &str)]) -> Self {
        Self {
            replies: replies
                .iter()
                .map(|(status, body)| (*status, body.to_string()))
                .collect(),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, n: usize) -> (HeaderMap, Value) {
        self.requests.lock().unwrap()[n].clone()
    }
}

async fn respond(
    State(upstream): State<Arc<Upstream>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    let n = {
        let mut requests = upstream.requests.lock().unwrap();
        requests.push((headers, serde_json::from_str(&body).unwrap_or(Value::Null)));
        requests.len() - 1
    };
    if !upstream.delay.is_zero() {
        tokio::time::sleep(upstream.delay).await;
    }
    let (status, body) = upstream.replies[n.min(upstream.replies.len() - 1)].clone();
    (
        StatusCode::from_u16(status).unwrap(),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
}

/// Serve `upstream` on a random port and return its URL
async fn start(upstream: Upstream) -> (String, Arc<Upstream>) {
    let upstream = Arc::new(upstream);
    let app = Router::new()
        .route("/", post(respond))
        .with_state(upstream.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/", addr), upstream)
}

fn completion(content: &str) -> String {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]}).to_string()
}

fn model_config(endpoint: &str, max_retries: u32) -> Config {
    let mut config = Config::default();
    config.agent.endpoint = endpoint.to_string();
    config.agent.max_retries = max_retries;
    config.agent.retry_backoff_ms = 1;
    config.api.perplexity_key = Some("pplx-test".to_string());
    config
}

fn translation_config(endpoint: &str, max_retries: u32) -> Config {
    let mut config = Config::default();
    config.translation.endpoint = endpoint.to_string();
    config.translation.max_retries = max_retries;
    config.translation.retry_backoff_ms = 1;
    config.api.translate_key = Some("gt-test".to_string());
    config
}

#[tokio::test]
async fn test_completion_sends_bearer_key_and_decoding_parameters() {
    let reply = completion(r#"{"description": "Senator"}"#);
    let (url, upstream) = start(Upstream::new(&[(200, reply.as_str())])).await;
    let client = PerplexityClient::new(&model_config(&url, 0)).unwrap();

    let text = client.complete("Who is Juan Dela Cruz?").await.unwrap();
    assert_eq!(text, r#"{"description": "Senator"}"#);

    let (headers, body) = upstream.request(0);
    assert_eq!(headers["authorization"], "Bearer pplx-test");
    assert_eq!(body["model"], "sonar");
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][1]["content"], "Who is Juan Dela Cruz?");
}

#[tokio::test]
async fn test_rate_limits_and_server_errors_are_retried() {
    let reply = completion("{}");
    let (url, upstream) = start(Upstream::new(&[
        (429, r#"{"error": "slow down"}"#),
        (503, "unavailable"),
        (200, reply.as_str()),
    ]))
    .await;
    let client = PerplexityClient::new(&model_config(&url, 2)).unwrap();

    assert_eq!(client.complete("prompt").await.unwrap(), "{}");
    assert_eq!(upstream.calls(), 3);
}

#[tokio::test]
async fn test_server_errors_exhaust_the_retry_budget() {
    let (url, upstream) = start(Upstream::new(&[(500, "boom")])).await;
    let client = PerplexityClient::new(&model_config(&url, 2)).unwrap();

    let err = client.complete("prompt").await.unwrap_err();
    assert!(matches!(err, AgentError::Status { status: 500, .. }));
    assert_eq!(upstream.calls(), 3);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let (url, upstream) = start(Upstream::new(&[(401, r#"{"error": "bad key"}"#)])).await;
    let client = PerplexityClient::new(&model_config(&url, 2)).unwrap();

    match client.complete("prompt").await.unwrap_err() {
        AgentError::Status { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("bad key"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn test_empty_choices_is_an_upstream_error() {
    let (url, upstream) = start(Upstream::new(&[(200, r#"{"choices": []}"#)])).await;
    let client = PerplexityClient::new(&model_config(&url, 0)).unwrap();

    let err = client.complete("prompt").await.unwrap_err();
    assert!(matches!(err, AgentError::Upstream(_)));
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn test_slow_model_times_out() {
    let reply = completion("{}");
    let (url, upstream) =
        start(Upstream::new(&[(200, reply.as_str())]).slow(Duration::from_secs(5))).await;
    let mut config = model_config(&url, 0);
    config.agent.timeout_secs = 1;
    let client = PerplexityClient::new(&config).unwrap();

    let err = client.complete("prompt").await.unwrap_err();
    assert!(matches!(err, AgentError::Timeout(d) if d == Duration::from_secs(1)));
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn test_translation_sends_api_key_header() {
    let reply = json!({"data": {"translations": [{"translatedText": "Senador"}]}}).to_string();
    let (url, upstream) = start(Upstream::new(&[(200, reply.as_str())])).await;
    let translator = GoogleTranslator::new(&translation_config(&url, 0)).unwrap();

    assert_eq!(translator.translate("Senator", "fil").await.unwrap(), "Senador");

    let (headers, body) = upstream.request(0);
    assert_eq!(headers["x-goog-api-key"], "gt-test");
    assert!(headers.get("authorization").is_none());
    assert_eq!(body, json!({"q": "Senator", "target": "fil", "format": "text"}));
}

#[tokio::test]
async fn test_malformed_translation_reply_is_a_provider_fault() {
    let (url, upstream) = start(Upstream::new(&[(200, r#"{"unexpected": true}"#)])).await;
    let translator = GoogleTranslator::new(&translation_config(&url, 2)).unwrap();

    let err = translator.translate("Senator", "fil").await.unwrap_err();
    assert!(matches!(err, TranslationError::Provider(_)));
    assert_eq!(upstream.calls(), 1);

    let (url, _) = start(Upstream::new(&[(200, r#"{"data": {"translations": []}}"#)])).await;
    let translator = GoogleTranslator::new(&translation_config(&url, 2)).unwrap();
    let err = translator.translate("Senator", "fil").await.unwrap_err();
    assert!(matches!(err, TranslationError::Provider(_)));
}

#[tokio::test]
async fn test_translation_retries_follow_translation_settings() {
    let reply = json!({"data": {"translations": [{"translatedText": "Senador"}]}}).to_string();
    let (url, upstream) = start(Upstream::new(&[(503, ""), (200, reply.as_str())])).await;
    let mut config = translation_config(&url, 1);
    config.agent.max_retries = 0;
    let translator = GoogleTranslator::new(&config).unwrap();

    assert_eq!(translator.translate("Senator", "fil").await.unwrap(), "Senador");
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_translation_client_errors_surface_status() {
    let (url, upstream) = start(Upstream::new(&[(403, r#"{"error": "forbidden"}"#)])).await;
    let translator = GoogleTranslator::new(&translation_config(&url, 2)).unwrap();

    let err = translator.translate("Senator", "fil").await.unwrap_err();
    assert!(matches!(err, TranslationError::Status { status: 403, .. }));
    assert_eq!(upstream.calls(), 1);
}
