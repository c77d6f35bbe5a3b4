use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use autowriter_adapters::{AdapterError, ChatCompletionClient, PROBE_MAX_TOKENS};
use autowriter_core::{ChatMessage, CompletionClient, GenerationRequest, SamplingParams};
use serde_json::Value;

const OK_BODY: &str = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"第三次成功"}}]}"#;

/// Answers one connection per scripted reply, then stops listening.
struct LoopbackServer {
    url: String,
    handle: JoinHandle<Vec<String>>,
}

impl LoopbackServer {
    fn start(script: Vec<(u16, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let url = format!("http://{}", listener.local_addr().expect("local addr"));
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in script {
                let Ok((mut stream, _)) = listener.accept() else {
                    break;
                };
                seen.push(read_request(&mut stream));
                let response = format!(
                    "HTTP/1.1 {status} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
            seen
        });
        Self { url, handle }
    }

    /// Raw requests received, in order.
    fn finish(self) -> Vec<String> {
        self.handle.join().expect("server thread panicked")
    }
}

fn read_request(stream: &mut TcpStream) -> String {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let read = stream.read(&mut chunk).unwrap_or(0);
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(header_end) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buffer.len() >= header_end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

fn body_of(raw: &str) -> Value {
    let (_, body) = raw.split_once("\r\n\r\n").expect("request body");
    serde_json::from_str(body).expect("json body")
}

fn recording_client(url: &str) -> (ChatCompletionClient, Arc<Mutex<Vec<Duration>>>) {
    let delays = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&delays);
    let client = ChatCompletionClient::new("sk-test", url, "deepseek-chat")
        .expect("client")
        .with_timeouts(Duration::from_secs(2), Duration::from_secs(10))
        .with_retry_delay(Duration::from_secs(1))
        .with_sleeper(move |delay| recorder.lock().expect("delays").push(delay));
    (client, delays)
}

fn request() -> GenerationRequest {
    GenerationRequest::new(
        vec![ChatMessage::system("你是作家"), ChatMessage::user("写一段开头")],
        1_500,
        SamplingParams::default(),
    )
}

#[test]
fn always_failing_server_is_tried_exactly_max_attempts_times() {
    let server = LoopbackServer::start(vec![(500, r#"{"error":"overloaded"}"#); 3]);
    let (client, delays) = recording_client(&server.url);

    let response = client.complete(&request(), 3);

    assert!(response.is_none());
    assert_eq!(server.finish().len(), 3);
    let delays = delays.lock().expect("delays").clone();
    assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(3)]);
    assert!(delays.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn succeeds_on_third_attempt_and_stops() {
    let server = LoopbackServer::start(vec![
        (500, r#"{"error":"busy"}"#),
        (503, "unavailable"),
        (200, OK_BODY),
    ]);
    let (client, delays) = recording_client(&server.url);

    let response = client.complete(&request(), 5).expect("response");

    assert_eq!(response.content, "第三次成功");
    assert_eq!(response.attempts, 3);
    assert_eq!(server.finish().len(), 3);
    assert_eq!(delays.lock().expect("delays").len(), 2);
}

#[test]
fn sends_wire_body_with_bearer_key() {
    let server = LoopbackServer::start(vec![(200, OK_BODY)]);
    let (client, _) = recording_client(&server.url);

    client.complete(&request(), 1).expect("response");

    let requests = server.finish();
    let raw = &requests[0];
    let head = raw.to_ascii_lowercase();
    assert!(raw.starts_with("POST /v1/chat/completions "));
    assert!(head.contains("authorization: bearer sk-test"));

    let body = body_of(raw);
    assert_eq!(body["model"], "deepseek-chat");
    assert_eq!(body["max_tokens"], 1_500);
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["messages"][1]["content"], "写一段开头");
    assert!((body["temperature"].as_f64().expect("temperature") - 0.7).abs() < 1e-6);
    assert!((body["top_p"].as_f64().expect("top_p") - 0.9).abs() < 1e-6);
}

#[test]
fn ok_status_without_content_is_retried() {
    let server = LoopbackServer::start(vec![(200, r#"{"choices":[]}"#), (200, OK_BODY)]);
    let (client, _) = recording_client(&server.url);

    let response = client.complete(&request(), 3).expect("response");

    assert_eq!(response.attempts, 2);
    assert_eq!(server.finish().len(), 2);
}

#[test]
fn other_success_codes_count_as_failures() {
    let server = LoopbackServer::start(vec![(201, OK_BODY), (200, OK_BODY)]);
    let (client, _) = recording_client(&server.url);

    let response = client.complete(&request(), 2).expect("response");

    assert_eq!(response.attempts, 2);
    server.finish();
}

#[test]
fn probe_makes_a_single_short_attempt() {
    let server = LoopbackServer::start(vec![(401, r#"{"error":"invalid key"}"#)]);
    let (client, delays) = recording_client(&server.url);

    let error = client.probe().expect_err("probe should fail");

    match &error {
        AdapterError::RetryExhausted { attempts, .. } => assert_eq!(*attempts, 1),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(error.diagnostic(200).starts_with("HTTP 401"));

    let requests = server.finish();
    assert_eq!(requests.len(), 1);
    assert_eq!(body_of(&requests[0])["max_tokens"], PROBE_MAX_TOKENS);
    assert!(delays.lock().expect("delays").is_empty());
}
