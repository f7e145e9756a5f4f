//! Connect to a frame-protocol peer, send one frame and close.
//!
//! This example demonstrates:
//! - Building a session with a listener
//! - Sending through the codec with `with_codec`
//! - Reading incoming frames from the codec's channel
//! - Closing gracefully and waiting for the terminal state
//!
//! # Running
//!
//! ```text
//! cargo run --example connect -- broker.local 5672
//! ```

use std::sync::Arc;
use std::time::Duration;

use sessionwire::protocol::FrameCodec;
use sessionwire::{Session, SessionConfig, SessionListener};

/// Prints every lifecycle event.
struct Printer;

impl SessionListener<FrameCodec> for Printer {
    fn on_error(&self, session: &Session<FrameCodec>, message: &str) {
        eprintln!("session {}: error: {}", session.id(), message);
    }

    fn on_connected(&self, session: &Session<FrameCodec>) {
        match session.peer_addr() {
            Some(peer) => println!("session {}: connected to {}", session.id(), peer),
            None => println!("session {}: connected", session.id()),
        }
    }

    fn on_closed(&self, session: &Session<FrameCodec>) {
        println!("session {}: closed", session.id());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => 5672,
    };

    // Optional JSON overrides, e.g. SESSIONWIRE_CONFIG='{"connect_timeout_ms": 2000}'
    let config = match std::env::var("SESSIONWIRE_CONFIG") {
        Ok(json) => SessionConfig::from_json(&json)?,
        Err(_) => SessionConfig {
            connect_timeout_ms: Some(3_000),
            ..SessionConfig::default()
        },
    };

    let (codec, mut inbox) = FrameCodec::channel();
    let session = Session::builder(codec, Arc::new(Printer))
        .config(config)
        .connect(host.as_str(), port);

    session.with_codec(|codec, out| {
        if let Err(e) = codec.send(1, 1, b"hello", out) {
            eprintln!("send failed: {}", e);
        }
    })?;

    // Print whatever arrives for a moment, then close
    let _ = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(frame) = inbox.recv().await {
            println!(
                "frame method={} request={} {} bytes",
                frame.method_id(),
                frame.request_id(),
                frame.payload().len()
            );
        }
    })
    .await;

    session.close();
    let state = session.wait_terminal().await;
    println!("session {} finished as {:?}", session.id(), state);

    Ok(())
}
