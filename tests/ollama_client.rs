use bug_digest::{
    config::Config,
    engine::{CompletionError, Engine, ollama::OllamaEngine},
};
use serde_json::json;
use std::net::TcpListener;
use tokio::runtime::Runtime;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, method, path},
};

fn engine_for(base_url: &str) -> OllamaEngine {
    let mut cfg = Config::default();
    cfg.llm.base_url = base_url.to_string();
    cfg.llm.model = "stub-model".to_string();
    cfg.llm.request_timeout_seconds = 5;
    OllamaEngine::new(&cfg).expect("engine")
}

/// Server answering every `POST /api/chat` with `template`.
fn chat_server(rt: &Runtime, template: ResponseTemplate) -> MockServer {
    rt.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    })
}

#[test]
fn service_unavailable_is_transient_status() {
    let rt = Runtime::new().unwrap();
    let server = chat_server(&rt, ResponseTemplate::new(503).set_body_string("loading model"));
    let engine = engine_for(&server.uri());

    let err = engine.complete("sys", "prompt").unwrap_err();
    match &err {
        CompletionError::Status { code, body } => {
            assert_eq!(*code, 503);
            assert_eq!(body, "loading model");
        }
        other => panic!("expected HTTP status error, got {other:?}"),
    }
    assert!(err.is_transient());
}

#[test]
fn bad_request_is_not_retried() {
    let rt = Runtime::new().unwrap();
    let server = chat_server(
        &rt,
        ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid options"}"#),
    );
    let engine = engine_for(&server.uri());

    let err = engine.complete("sys", "prompt").unwrap_err();
    assert!(matches!(err, CompletionError::Status { code: 400, .. }));
    assert!(!err.is_transient());
}

#[test]
fn closed_port_is_transport_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let engine = engine_for(&format!("http://127.0.0.1:{port}"));

    let err = engine.complete("sys", "prompt").unwrap_err();
    assert!(matches!(err, CompletionError::Transport(_)), "{err:?}");
    assert!(err.is_transient());
}

#[test]
fn success_returns_message_content() {
    let rt = Runtime::new().unwrap();
    let server = rt.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "stub-model",
                "stream": false,
                "messages": [
                    {"role": "system", "content": "sys"},
                    {"role": "user", "content": "prompt"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "stub-model",
                "message": {"role": "assistant", "content": "## Summary\n- ok"},
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;
        server
    });
    let engine = engine_for(&format!("{}/", server.uri()));

    assert_eq!(engine.complete("sys", "prompt").unwrap(), "## Summary\n- ok");
}

#[test]
fn success_without_message_is_malformed() {
    let rt = Runtime::new().unwrap();
    let server = chat_server(
        &rt,
        ResponseTemplate::new(200).set_body_json(json!({"model": "stub-model", "done": true})),
    );
    let engine = engine_for(&server.uri());

    let err = engine.complete("sys", "prompt").unwrap_err();
    assert!(matches!(err, CompletionError::Malformed(_)));
    assert!(!err.is_transient());
}

#[test]
fn model_listing_is_sorted() {
    let rt = Runtime::new().unwrap();
    let server = rt.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    {"name": "mistral:7b", "size": 4},
                    {"name": "llama3.1:8b", "size": 5}
                ]
            })))
            .mount(&server)
            .await;
        server
    });
    let engine = engine_for(&server.uri());

    let models = engine.list_models().unwrap();
    let ids: Vec<&str> = models.iter().map(|m| m.id()).collect();
    assert_eq!(ids, ["llama3.1:8b", "mistral:7b"]);
}
