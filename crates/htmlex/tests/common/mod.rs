#![allow(dead_code)]
//! Shared harness for the integration suites: in-process axum servers plus
//! engine construction helpers.

use axum::Router;
use dom::{Document, NodeId};
use engine::{Engine, EngineConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Spin up an in-process server on an ephemeral port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server error");
    });
    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(20)).await;
    addr
}

/// Build an engine over the given markup, based at the test server.
pub fn engine_for(html: &str, addr: SocketAddr) -> Engine {
    let doc = Document::parse(html);
    let base = Url::parse(&format!("http://{addr}/")).expect("base url");
    Engine::new(doc, base, EngineConfig::default())
}

/// Shorthand: the element with the given id, which must exist.
pub fn by_id(engine: &Engine, id: &str) -> NodeId {
    engine
        .document()
        .get_element_by_id(id)
        .unwrap_or_else(|| panic!("no element with id {id:?}"))
}

/// Shorthand: serialized children of the element with the given id.
pub fn inner(engine: &Engine, id: &str) -> String {
    let node = by_id(engine, id);
    engine.document().inner_html(node)
}
