//! Newline-delimited JSON bridge to the browser side over stdio.
//!
//! Inbound lines carry host events, replies to our calls, and consumer
//! requests. Outbound lines carry host calls and consumer responses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use vidtap_core::{TabId, TabSnapshot};
use vidtap_engine::{
    BrowserHost, ConsumerReply, ConsumerRequest, HostError, HostEvent, VideoDownloader,
};
use vidtap_logging::{tap_debug, tap_error, tap_info, tap_warn};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("stdio error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One line read from stdin.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    Event {
        event: HostEvent,
    },
    Reply {
        id: u64,
        ok: bool,
        #[serde(default)]
        value: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    Request {
        id: u64,
        request: ConsumerRequest,
    },
}

/// Operations asked of the browser side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostCall {
    Attach { tab_id: TabId },
    Detach { tab_id: TabId },
    EnableNetwork { tab_id: TabId },
    GetResponseBody { tab_id: TabId, request_id: String },
    GetTab { tab_id: TabId },
    SendMessage { tab_id: TabId, message: Value },
}

#[derive(Debug)]
struct CallReply {
    ok: bool,
    value: Option<Value>,
    error: Option<String>,
}

/// [`BrowserHost`] backed by the stdio protocol.
///
/// Each call gets an id and waits for the matching `reply` line, up to the
/// call timeout.
pub struct StdioHost {
    outbound: mpsc::UnboundedSender<String>,
    pending: Mutex<HashMap<u64, oneshot::Sender<CallReply>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    call_timeout: Duration,
}

impl StdioHost {
    pub fn new(outbound: mpsc::UnboundedSender<String>, call_timeout: Duration) -> Self {
        Self {
            outbound,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            call_timeout,
        }
    }

    /// Completes the call waiting on `id`.
    fn resolve(&self, id: u64, reply: CallReply) {
        let waiter = self.pending_calls().remove(&id);
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(reply);
            }
            None => tap_debug!("reply {} matches no pending call", id),
        }
    }

    /// Sends the answer to consumer request `id`.
    pub fn respond(&self, id: u64, reply: &ConsumerReply) {
        let line = serde_json::to_value(reply).and_then(|value| {
            let mut fields = match value {
                Value::Object(fields) => fields,
                _ => Map::new(),
            };
            fields.insert("type".into(), "response".into());
            fields.insert("id".into(), id.into());
            serde_json::to_string(&fields)
        });
        match line {
            Ok(line) => {
                if self.outbound.send(line).is_err() {
                    tap_warn!("stdout closed; dropping response {}", id);
                }
            }
            Err(err) => tap_error!("could not encode response {}: {}", id, err),
        }
    }

    /// Fails every pending call and rejects new ones.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let dropped = std::mem::take(&mut *self.pending_calls());
        if !dropped.is_empty() {
            tap_info!("abandoning {} host calls without reply", dropped.len());
        }
    }

    pub fn pending(&self) -> usize {
        self.pending_calls().len()
    }

    fn pending_calls(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<CallReply>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn call(&self, call: HostCall) -> Result<Value, HostError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HostError::Disconnected);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = call_line(id, &call).map_err(|err| HostError::Failed(err.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending_calls().insert(id, tx);
        if self.outbound.send(line).is_err() {
            self.pending_calls().remove(&id);
            return Err(HostError::Disconnected);
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(reply)) if reply.ok => Ok(reply.value.unwrap_or(Value::Null)),
            Ok(Ok(reply)) => Err(HostError::from_message(
                reply.error.as_deref().unwrap_or("unknown host error"),
            )),
            Ok(Err(_)) => Err(HostError::Disconnected),
            Err(_) => {
                self.pending_calls().remove(&id);
                tap_warn!("host call {} ({:?}) timed out", id, call);
                Err(HostError::Timeout)
            }
        }
    }
}

#[async_trait]
impl BrowserHost for StdioHost {
    async fn attach(&self, tab_id: TabId) -> Result<(), HostError> {
        self.call(HostCall::Attach { tab_id }).await.map(drop)
    }

    async fn detach(&self, tab_id: TabId) -> Result<(), HostError> {
        self.call(HostCall::Detach { tab_id }).await.map(drop)
    }

    async fn enable_network(&self, tab_id: TabId) -> Result<(), HostError> {
        self.call(HostCall::EnableNetwork { tab_id }).await.map(drop)
    }

    async fn response_body(&self, tab_id: TabId, request_id: &str) -> Result<String, HostError> {
        let value = self
            .call(HostCall::GetResponseBody {
                tab_id,
                request_id: request_id.to_string(),
            })
            .await?;
        match value {
            Value::String(body) => Ok(body),
            Value::Object(mut fields) => match fields.remove("body") {
                Some(Value::String(body)) => Ok(body),
                _ => Err(HostError::Failed("reply carried no body".into())),
            },
            _ => Err(HostError::Failed("reply carried no body".into())),
        }
    }

    async fn send_message(&self, tab_id: TabId, message: &Value) -> Result<(), HostError> {
        self.call(HostCall::SendMessage {
            tab_id,
            message: message.clone(),
        })
        .await
        .map(drop)
    }

    async fn tab(&self, tab_id: TabId) -> Result<Option<TabSnapshot>, HostError> {
        match self.call(HostCall::GetTab { tab_id }).await? {
            Value::Null => Ok(None),
            value => serde_json::from_value(value)
                .map(Some)
                .map_err(|err| HostError::Failed(format!("bad tab snapshot: {err}"))),
        }
    }
}

fn call_line(id: u64, call: &HostCall) -> Result<String, serde_json::Error> {
    let mut fields = match serde_json::to_value(call)? {
        Value::Object(fields) => fields,
        _ => Map::new(),
    };
    fields.insert("type".into(), "call".into());
    fields.insert("id".into(), id.into());
    serde_json::to_string(&fields)
}

/// Reads protocol lines until EOF, then waits for running downloads.
///
/// Events go to `events`; replies complete pending host calls; consumer
/// requests run on their own tasks and answer through `host`.
pub async fn serve_input<R>(
    input: R,
    host: Arc<StdioHost>,
    downloader: Arc<VideoDownloader>,
    events: mpsc::UnboundedSender<HostEvent>,
) -> Result<(), BridgeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut requests = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Inbound>(line) {
            Ok(Inbound::Event { event }) => {
                if events.send(event).is_err() {
                    tap_warn!("coordinator stopped; ignoring further events");
                }
            }
            Ok(Inbound::Reply {
                id,
                ok,
                value,
                error,
            }) => host.resolve(id, CallReply { ok, value, error }),
            Ok(Inbound::Request { id, request }) => {
                let host = host.clone();
                let downloader = downloader.clone();
                requests.spawn(async move {
                    let reply = downloader.handle(request).await;
                    host.respond(id, &reply);
                });
            }
            Err(err) => tap_warn!("ignoring malformed bridge line: {}", err),
        }
        while let Some(joined) = requests.try_join_next() {
            if let Err(err) = joined {
                tap_error!("request task failed: {}", err);
            }
        }
    }

    if !requests.is_empty() {
        tap_info!("stdin closed; finishing {} requests", requests.len());
    }
    while let Some(joined) = requests.join_next().await {
        if let Err(err) = joined {
            tap_error!("request task failed: {}", err);
        }
    }
    Ok(())
}

/// Writes queued lines to `out` until every sender is gone.
pub async fn write_lines<W>(
    mut out: W,
    mut lines: mpsc::UnboundedReceiver<String>,
) -> Result<(), BridgeError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
    }
    Ok(())
}
