//! WebSocket subscriptions.
//!
//! A binding with `socket` opens a connection at registration. Inbound
//! messages are normalized to text and routed to the engine task, which
//! applies them to the element's targets. The connection is torn down when
//! the element leaves the tree.

use crate::core::EngineMsg;
use crate::syslog;
use dom::NodeId;
use futures::StreamExt as _;
use futures::future::{AbortHandle, Abortable};
use log::Level;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Connect and pump messages until closed or aborted.
pub fn spawn(node: NodeId, url: String, tx: UnboundedSender<EngineMsg>) -> AbortHandle {
    let (handle, registration) = AbortHandle::new_pair();
    let pump = Abortable::new(run(node, url, tx), registration);
    tokio::spawn(async move {
        drop(pump.await);
    });
    handle
}

async fn run(node: NodeId, url: String, tx: UnboundedSender<EngineMsg>) {
    match connect_async(url.as_str()).await {
        Ok((mut stream, _response)) => {
            syslog!(Level::Debug, "socket open: {url}");
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if tx.send(EngineMsg::SocketText { node, text }).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Binary(data)) => {
                        let text = String::from_utf8_lossy(&data).into_owned();
                        if tx.send(EngineMsg::SocketText { node, text }).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        syslog!(Level::Warn, "socket error on {url}: {err}");
                        break;
                    }
                }
            }
        }
        Err(err) => {
            syslog!(Level::Warn, "socket connect failed for {url}: {err}");
        }
    }
    drop(tx.send(EngineMsg::SocketClosed { node }));
}
