//! Chat-completion client for the server under test.
//!
//! One [`RequestClient::send`] call issues one `POST /v1/chat/completions`, synchronous or
//! streamed, and returns a [`NormalizedResponse`]. Connection failures, non-2xx statuses and
//! malformed bodies come back as transport-class errors so callers can record them as failed
//! cases instead of aborting.

use std::fmt::Write as _;
use std::io;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::catalog::{SYSTEM_PROMPT, ToolDefinition};
use crate::error::{Error, Result};
use crate::model::{ChatCompletionBody, NormalizedResponse};
use crate::sse::SseReader;
use crate::stream::{Flow, StreamAggregator};

const ERROR_BODY_LIMIT: usize = 500;

/// Per-request generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_tokens: 512,
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: [ChatMessage<'a>; 2],
    tools: Vec<Value>,
    tool_choice: &'static str,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
}

/// Blocking client bound to one server base URL.
#[derive(Debug, Clone)]
pub struct RequestClient {
    client: Client,
    base_url: String,
    options: RequestOptions,
}

impl RequestClient {
    /// Client for a server listening on `127.0.0.1:<port>`.
    pub fn for_port(port: u16, options: RequestOptions) -> Result<Self> {
        Self::new(format!("http://127.0.0.1:{port}"), options)
    }

    pub fn new(base_url: impl Into<String>, options: RequestOptions) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            options,
        })
    }

    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn body<'a>(&'a self, prompt: &'a str, tools: &[ToolDefinition], stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.options.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            tools: tools.iter().map(ToolDefinition::to_openai).collect(),
            tool_choice: "auto",
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            stream,
        }
    }

    /// Issue one chat completion; `stream` selects SSE transport.
    pub fn send(
        &self,
        prompt: &str,
        tools: &[ToolDefinition],
        stream: bool,
        timeout: Duration,
    ) -> Result<NormalizedResponse> {
        let url = self.completions_url();
        let body = self.body(prompt, tools, stream);
        let start = Instant::now();

        let mut request = self.client.post(&url).timeout(timeout).json(&body);
        if stream {
            request = request.header(ACCEPT, HeaderValue::from_static("text/event-stream"));
        }
        let response = request
            .send()
            .map_err(|err| Error::transport(&url, describe(&err)))?;
        let response = check_status(&url, response)?;
        debug!(url = %url, stream, status = %response.status(), "Chat completion accepted");

        if stream {
            read_stream(&url, response, start)
        } else {
            read_body(&url, response, start)
        }
    }
}

fn check_status(url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    Err(Error::transport(url, format!("HTTP {status}: {excerpt}")))
}

fn read_body(url: &str, response: Response, start: Instant) -> Result<NormalizedResponse> {
    let text = response
        .text()
        .map_err(|err| Error::transport(url, describe(&err)))?;
    let elapsed = start.elapsed();
    let body: ChatCompletionBody = serde_json::from_str(&text)
        .map_err(|err| Error::protocol(format!("Malformed response body from {url}: {err}")))?;
    Ok(body.into_normalized(elapsed))
}

fn read_stream(url: &str, response: Response, start: Instant) -> Result<NormalizedResponse> {
    let mut aggregator = StreamAggregator::new();
    for event in SseReader::new(response) {
        let event = event.map_err(|err| {
            Error::transport(url, format!("Stream read failed: {}", describe_read(&err)))
        })?;
        if aggregator.push_data(&event.data)? == Flow::Done {
            break;
        }
    }
    debug!(
        url = %url,
        chunks = aggregator.chunks(),
        done = aggregator.is_done(),
        "Stream reduced"
    );
    Ok(aggregator.finish(start.elapsed()))
}

/// Render an error with its source chain; reqwest's top-level message omits the cause.
pub(crate) fn describe(err: &reqwest::Error) -> String {
    with_timeout_note(chain(err), err.is_timeout())
}

/// Body read errors arrive wrapped in `io::Error`, which hides reqwest's timeout flag.
fn describe_read(err: &io::Error) -> String {
    let timed_out = err.kind() == io::ErrorKind::TimedOut
        || err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
            .is_some_and(reqwest::Error::is_timeout);
    with_timeout_note(chain(err), timed_out)
}

fn chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            let _ = write!(text, ": {cause_text}");
        }
        source = cause.source();
    }
    text
}

fn with_timeout_note(mut text: String, timed_out: bool) -> String {
    if timed_out && !text.contains("timed out") {
        text.push_str(" (operation timed out)");
    }
    text
}
