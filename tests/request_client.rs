//! Real-path tests for the chat completion client against a local stub server.

mod common;

use std::time::{Duration, Instant};

use common::{Stall, StubResponse, StubServer, TestHarness, free_port};
use serde_json::json;
use toolcall_harness::catalog::{SYSTEM_PROMPT, default_tools};
use toolcall_harness::client::{RequestClient, RequestOptions};

const TIMEOUT: Duration = Duration::from_secs(10);

fn client_for(server: &StubServer) -> RequestClient {
    RequestClient::new(server.base_url(), RequestOptions::default()).expect("client")
}

#[test]
fn synchronous_completion_round_trip() {
    let harness = TestHarness::new("synchronous_completion_round_trip");
    let server = StubServer::openai(|_| {
        StubResponse::json(&json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Tokyo\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 120, "completion_tokens": 18, "total_tokens": 138}
        }))
    });

    let tools = default_tools();
    let response = client_for(&server)
        .send("What is the weather in Tokyo?", &tools, false, TIMEOUT)
        .expect("send");
    harness.log().info_ctx("verify", "Response", |ctx| {
        ctx.push(("response".into(), format!("{response:?}")));
    });

    let choice = response.choice.expect("choice");
    assert_eq!(choice.tool_calls().len(), 1);
    assert_eq!(choice.tool_calls()[0].name, "get_weather");
    assert_eq!(choice.tool_calls()[0].arguments, r#"{"city":"Tokyo"}"#);
    assert_eq!(choice.finish_reason(), "tool_calls");
    assert_eq!(response.usage.total_tokens, Some(138));

    let requests = server.completion_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    let body = requests[0].json();
    assert_eq!(body["stream"], false);
    assert_eq!(body["tool_choice"], "auto");
    assert_eq!(body["max_tokens"], 512);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
    assert_eq!(body["messages"][1]["content"], "What is the weather in Tokyo?");
    assert_eq!(body["tools"].as_array().map(Vec::len), Some(tools.len()));
    assert_eq!(body["tools"][0]["type"], "function");
}

#[test]
fn streamed_completion_is_reduced() {
    let server = StubServer::openai(|_| {
        StubResponse::sse(&[
            json!({"choices": [{"index": 0, "delta": {"role": "assistant", "tool_calls": [
                {"index": 0, "id": "call_7", "type": "function", "function": {"name": "calculate", "arguments": ""}}
            ]}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"expression\": "}}
            ]}}]}),
            json!({"choices": [{"index": 0, "delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "\"99 * 101\"}"}}
            ]}}]}),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}]}),
        ])
    });

    let response = client_for(&server)
        .send("Please calculate 99 * 101 using the tool", &default_tools(), true, TIMEOUT)
        .expect("send");

    let choice = response.choice.expect("choice");
    let calls = choice.tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_7");
    assert_eq!(calls[0].name, "calculate");
    assert_eq!(calls[0].arguments, r#"{"expression": "99 * 101"}"#);
    assert_eq!(choice.content(), "");
    assert_eq!(choice.finish_reason(), "tool_calls");

    let body = server.completion_requests()[0].json();
    assert_eq!(body["stream"], true);
}

#[test]
fn stream_without_done_sentinel_still_finishes() {
    let server = StubServer::openai(|_| {
        StubResponse::raw_sse(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hello\"}}]}\n\n\
             data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\" there\"},\"finish_reason\":\"stop\"}]}\n\n",
        )
    });

    let response = client_for(&server)
        .send("hi", &default_tools(), true, TIMEOUT)
        .expect("send");
    let choice = response.choice.expect("choice");
    assert!(choice.tool_calls.is_none());
    assert_eq!(choice.content(), "Hello there");
}

#[test]
fn non_success_status_is_a_transport_error() {
    let server = StubServer::openai(|_| StubResponse::status(500, "model crashed"));

    let err = client_for(&server)
        .send("hi", &default_tools(), false, TIMEOUT)
        .unwrap_err();

    assert!(err.is_transport());
    let text = err.to_string();
    assert!(text.contains("HTTP 500"), "{text}");
    assert!(text.contains("model crashed"), "{text}");
}

#[test]
fn malformed_body_is_a_protocol_error() {
    let server = StubServer::openai(|_| StubResponse {
        status: 200,
        content_type: "application/json",
        body: "{\"choices\": [".to_string(),
        stall: None,
    });

    let err = client_for(&server)
        .send("hi", &default_tools(), false, TIMEOUT)
        .unwrap_err();
    assert_eq!(err.kind(), "protocol");
}

#[test]
fn malformed_stream_chunk_is_a_protocol_error() {
    let server = StubServer::openai(|_| StubResponse::raw_sse("data: {oops\n\ndata: [DONE]\n\n"));

    let err = client_for(&server)
        .send("hi", &default_tools(), true, TIMEOUT)
        .unwrap_err();
    assert_eq!(err.kind(), "protocol");
    assert!(err.to_string().contains("Malformed stream chunk"));
}

#[test]
fn refused_connection_is_a_transport_error() {
    let port = free_port();
    let client = RequestClient::for_port(port, RequestOptions::default()).expect("client");

    let err = client
        .send("hi", &default_tools(), false, Duration::from_secs(2))
        .unwrap_err();

    assert!(err.is_transport());
    assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
}

#[test]
fn empty_choices_normalize_to_none() {
    let server = StubServer::openai(|_| StubResponse::json(&json!({"choices": []})));
    let response = client_for(&server)
        .send("hi", &default_tools(), false, TIMEOUT)
        .expect("send");
    assert!(response.choice.is_none());
}

#[test]
fn silent_server_times_out_as_transport_error() {
    let harness = TestHarness::new("silent_server_times_out_as_transport_error");
    let server = StubServer::openai(|_| {
        StubResponse::json(&json!({"choices": []})).stalled(Stall::BeforeHead(Duration::from_secs(3)))
    });

    let started = Instant::now();
    let err = client_for(&server)
        .send("hi", &default_tools(), false, Duration::from_secs(1))
        .unwrap_err();
    let waited = started.elapsed();
    harness.log().info_ctx("verify", "Timeout", |ctx| {
        ctx.push(("error".into(), err.to_string()));
        ctx.push(("waited".into(), format!("{waited:?}")));
    });

    assert_eq!(err.kind(), "transport");
    assert!(err.to_string().contains("timed out"), "{err}");
    assert!(waited >= Duration::from_secs(1));
    assert!(waited < Duration::from_millis(2500));
}

#[test]
fn stream_stalling_mid_body_times_out_as_transport_error() {
    let harness = TestHarness::new("stream_stalling_mid_body_times_out_as_transport_error");
    let first = "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Let me\"}}]}\n\n";
    let body = format!(
        "{first}data: {{\"choices\":[{{\"index\":0,\"delta\":{{}},\"finish_reason\":\"stop\"}}]}}\n\ndata: [DONE]\n\n"
    );
    let server = StubServer::openai(move |_| {
        StubResponse::raw_sse(body.clone()).stalled(Stall::MidBody {
            after: first.len(),
            pause: Duration::from_secs(3),
        })
    });

    let started = Instant::now();
    let err = client_for(&server)
        .send("hi", &default_tools(), true, Duration::from_secs(1))
        .unwrap_err();
    let waited = started.elapsed();
    harness.log().info_ctx("verify", "Timeout", |ctx| {
        ctx.push(("error".into(), err.to_string()));
        ctx.push(("waited".into(), format!("{waited:?}")));
    });

    assert_eq!(err.kind(), "transport");
    let text = err.to_string();
    assert!(text.contains("Stream read failed"), "{text}");
    assert!(text.contains("timed out"), "{text}");
    assert!(waited < Duration::from_millis(2500));
}
