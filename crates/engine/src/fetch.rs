//! Background fetch worker: retry, timeout, abort, streaming consumption.
//!
//! Workers never touch the document. They stream response bytes back to the
//! engine task over the message channel; the engine feeds its fragment reader
//! and mutates the DOM from its own loop.

use crate::core::EngineMsg;
use crate::syslog;
use core::time::Duration;
use dom::NodeId;
use futures::StreamExt as _;
use futures::future::{AbortHandle, Abortable};
use log::Level;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Response};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout as tokio_timeout;

pub type CallId = u64;

/// Everything a worker needs to perform one call. Built on the engine task
/// (body collection and URL composition read the document); consumed on a
/// background task.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    pub call: CallId,
    pub node: NodeId,
    pub method: Method,
    pub url: String,
    /// Form body for non-GET methods; GET encodes it into the URL instead.
    pub body: Option<String>,
    /// `None` never times out.
    pub timeout: Option<Duration>,
    /// Attempts beyond the first.
    pub retries: u32,
}

/// Stream events sent back to the engine, tagged with the call id so
/// superseded calls can be dropped on arrival.
#[derive(Debug)]
pub enum FetchEvent {
    Chunk(bytes::Bytes),
    /// A retry attempt is starting after an earlier attempt already
    /// streamed part of its body; buffered bytes from that attempt are
    /// stale and must be discarded.
    Restarted,
    End { emit: Option<EmitDirective> },
    Failed { message: String },
}

/// Parsed `Emit: name[; delay=MS]` response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitDirective {
    pub signal: String,
    pub delay: Option<Duration>,
}

/// Parse the `Emit` header value. A malformed delay is logged and treated as
/// absent; a missing signal name voids the directive.
#[must_use]
pub fn parse_emit_header(value: &str) -> Option<EmitDirective> {
    let mut parts = value.split(';');
    let signal = parts.next()?.trim();
    if signal.is_empty() {
        return None;
    }
    let mut delay = None;
    for part in parts {
        if let Some(raw) = part.trim().strip_prefix("delay=") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => delay = Some(Duration::from_millis(ms)),
                Err(_) => {
                    syslog!(Level::Warn, "ignoring malformed Emit delay {raw:?}");
                }
            }
        }
    }
    Some(EmitDirective {
        signal: signal.to_owned(),
        delay,
    })
}

/// Spawn a worker for the plan. The returned handle aborts it silently; an
/// aborted call sends nothing further, so the engine never sees `Failed` for
/// a superseded call.
pub fn spawn(client: Client, plan: RequestPlan, tx: UnboundedSender<EngineMsg>) -> AbortHandle {
    let (handle, registration) = AbortHandle::new_pair();
    let worker = Abortable::new(run(client, plan, tx), registration);
    tokio::spawn(async move {
        // Aborted is the supersession path; nothing to report.
        drop(worker.await);
    });
    handle
}

async fn run(client: Client, plan: RequestPlan, tx: UnboundedSender<EngineMsg>) {
    let call = plan.call;
    let mut last_error = String::from("request failed");
    // Whether any attempt has already streamed body bytes to the engine.
    let mut streamed = false;
    for attempt in 0..=plan.retries {
        match attempt_once(&client, &plan).await {
            Ok(response) => {
                if streamed
                    && tx
                        .send(EngineMsg::Stream {
                            call,
                            event: FetchEvent::Restarted,
                        })
                        .is_err()
                {
                    return;
                }
                let emit = response
                    .headers()
                    .get("emit")
                    .and_then(|value| value.to_str().ok())
                    .and_then(parse_emit_header);
                let mut body = response.bytes_stream();
                let mut broken = false;
                while let Some(item) = body.next().await {
                    match item {
                        Ok(chunk) => {
                            streamed = true;
                            if tx
                                .send(EngineMsg::Stream {
                                    call,
                                    event: FetchEvent::Chunk(chunk),
                                })
                                .is_err()
                            {
                                return;
                            }
                        }
                        Err(err) => {
                            last_error = err.to_string();
                            broken = true;
                            break;
                        }
                    }
                }
                if !broken {
                    drop(tx.send(EngineMsg::Stream {
                        call,
                        event: FetchEvent::End { emit },
                    }));
                    return;
                }
            }
            Err(message) => last_error = message,
        }
        syslog!(
            Level::Warn,
            "attempt {}/{} for {} failed: {last_error}",
            attempt + 1,
            plan.retries + 1,
            plan.url
        );
    }
    drop(tx.send(EngineMsg::Stream {
        call,
        event: FetchEvent::Failed {
            message: last_error,
        },
    }));
}

async fn attempt_once(client: &Client, plan: &RequestPlan) -> Result<Response, String> {
    let mut request = client.request(plan.method.clone(), plan.url.as_str());
    if plan.method != Method::GET
        && let Some(body) = &plan.body
    {
        request = request
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body.clone());
    }
    let send = request.send();
    let response = match plan.timeout {
        Some(limit) => match tokio_timeout(limit, send).await {
            Ok(sent) => sent.map_err(|err| err.to_string())?,
            Err(_) => return Err(String::from("Request timed out")),
        },
        None => send.await.map_err(|err| err.to_string())?,
    };
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }
    Ok(response)
}
