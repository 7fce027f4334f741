//! Sequential FIFO delivery, signal chaining, and streaming-mode bypass.

use axum::Router;
use axum::body::Body;
use axum::routing::get;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;

mod common;

#[tokio::test]
async fn sequential_updates_land_in_issue_order_with_spacing() {
    common::init_logging();
    let ordinal = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ordinal);
    let router = Router::new().route(
        "/tick",
        get(move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                format!("<fragment target=\"#out(append)\"><i>{n}</i></fragment>")
            }
        }),
    );
    let addr = common::serve(router).await;

    let mut engine = common::engine_for(
        "<html><body>\
         <button id=\"b\" GET=\"/tick\" target=\"#out(append)\" sequential=\"250\"></button>\
         <div id=\"out\"></div>\
         </body></html>",
        addr,
    );
    engine.initialize();
    let button = common::by_id(&engine, "b");

    engine.dispatch_click(button);
    engine.run_for(Duration::from_millis(30)).await;
    engine.dispatch_click(button);
    engine.run_for(Duration::from_millis(30)).await;
    engine.dispatch_click(button);

    // The first update applies as soon as its call completes; the rest are
    // spaced by the 250ms inter-update delay.
    engine.run_for(Duration::from_millis(100)).await;
    assert_eq!(common::inner(&engine, "out"), "<i>1</i>");

    engine.run_for(Duration::from_millis(1200)).await;
    assert_eq!(common::inner(&engine, "out"), "<i>1</i><i>2</i><i>3</i>");
}

#[tokio::test]
async fn signal_chain_fires_in_order() {
    common::init_logging();
    let order = Arc::new(Mutex::new(Vec::<u32>::new()));
    let mut router = Router::new();
    for n in 1..=5u32 {
        let order = Arc::clone(&order);
        router = router.route(
            &format!("/step/{n}"),
            get(move || {
                let order = Arc::clone(&order);
                async move {
                    order.lock().unwrap().push(n);
                    format!("<fragment target=\"#out(append)\"><b>{n}</b></fragment>")
                }
            }),
        );
    }
    let addr = common::serve(router).await;

    let mut engine = common::engine_for(
        "<html><body>\
         <button id=\"go\" publish=\"s1\"></button>\
         <div subscribe=\"s1\" GET=\"/step/1\" target=\"#out(append)\" publish=\"s2\"></div>\
         <div subscribe=\"s2\" GET=\"/step/2\" target=\"#out(append)\" publish=\"s3\"></div>\
         <div subscribe=\"s3\" GET=\"/step/3\" target=\"#out(append)\" publish=\"s4\"></div>\
         <div subscribe=\"s4\" GET=\"/step/4\" target=\"#out(append)\" publish=\"s5\"></div>\
         <div subscribe=\"s5\" GET=\"/step/5\" target=\"#out(append)\"></div>\
         <div id=\"out\"></div>\
         </body></html>",
        addr,
    );
    engine.initialize();
    let button = common::by_id(&engine, "go");

    engine.dispatch_click(button);
    engine.run_for(Duration::from_millis(1500)).await;

    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    assert_eq!(
        common::inner(&engine, "out"),
        "<b>1</b><b>2</b><b>3</b><b>4</b><b>5</b>"
    );
}

fn streaming_route() -> Router {
    Router::new().route(
        "/stream",
        get(|| async {
            let (tx, rx) = tokio::sync::mpsc::channel::<Result<String, std::convert::Infallible>>(8);
            tokio::spawn(async move {
                for n in 1..=3u32 {
                    let chunk =
                        format!("<fragment target=\"#out(append)\"><i>{n}</i></fragment>");
                    if tx.send(Ok(chunk)).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(60)).await;
                }
            });
            Body::from_stream(ReceiverStream::new(rx))
        }),
    )
}

#[tokio::test]
async fn multi_chunk_responses_apply_as_they_arrive() {
    common::init_logging();
    let addr = common::serve(streaming_route()).await;

    let mut engine = common::engine_for(
        "<html><body>\
         <button id=\"b\" GET=\"/stream\" target=\"#out(append)\"></button>\
         <div id=\"out\"></div>\
         </body></html>",
        addr,
    );
    engine.initialize();
    let button = common::by_id(&engine, "b");

    engine.dispatch_click(button);
    engine.run_for(Duration::from_millis(500)).await;
    assert_eq!(common::inner(&engine, "out"), "<i>1</i><i>2</i><i>3</i>");
}

#[tokio::test]
async fn streaming_bypasses_the_sequential_queue() {
    common::init_logging();
    let addr = common::serve(streaming_route()).await;

    let mut engine = common::engine_for(
        "<html><body>\
         <button id=\"b\" GET=\"/stream\" target=\"#out(append)\" sequential=\"5000\"></button>\
         <div id=\"out\"></div>\
         </body></html>",
        addr,
    );
    engine.initialize();
    let button = common::by_id(&engine, "b");

    engine.dispatch_click(button);
    // Far sooner than the 5s sequential delay could deliver three updates.
    engine.run_for(Duration::from_millis(600)).await;

    let content = common::inner(&engine, "out");
    // The first chunk predates streaming mode, so it rides the sequential
    // queue and lands last, when the call completes; later chunks apply on
    // arrival.
    assert_eq!(content, "<i>2</i><i>3</i><i>1</i>");
}

#[tokio::test]
async fn emit_header_publishes_a_signal() {
    common::init_logging();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let router = Router::new()
        .route(
            "/first",
            get(|| async { ([("Emit", "refresh")], "<p>ok</p>") }),
        )
        .route(
            "/second",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    "<fragment target=\"#log(append)\"><i>r</i></fragment>"
                }
            }),
        );
    let addr = common::serve(router).await;

    let mut engine = common::engine_for(
        "<html><body>\
         <button id=\"b\" GET=\"/first\" target=\"#main(innerHTML)\"></button>\
         <div subscribe=\"refresh\" GET=\"/second\" target=\"#log(append)\"></div>\
         <div id=\"main\"></div><div id=\"log\"></div>\
         </body></html>",
        addr,
    );
    engine.initialize();
    let button = common::by_id(&engine, "b");

    engine.dispatch_click(button);
    engine.run_for(Duration::from_millis(500)).await;

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(common::inner(&engine, "log"), "<i>r</i>");
}

#[tokio::test]
async fn emit_header_delay_defers_the_signal() {
    common::init_logging();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let router = Router::new()
        .route(
            "/first",
            get(|| async { ([("Emit", "later; delay=300")], "<p>ok</p>") }),
        )
        .route(
            "/second",
            get(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    "done"
                }
            }),
        );
    let addr = common::serve(router).await;

    let mut engine = common::engine_for(
        "<html><body>\
         <button id=\"b\" GET=\"/first\" target=\"#main(innerHTML)\"></button>\
         <div subscribe=\"later\" GET=\"/second\" target=\"#main(innerHTML)\"></div>\
         <div id=\"main\"></div>\
         </body></html>",
        addr,
    );
    engine.initialize();
    let button = common::by_id(&engine, "b");

    engine.dispatch_click(button);
    engine.run_for(Duration::from_millis(150)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0, "signal must wait out its delay");

    engine.run_for(Duration::from_millis(500)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
