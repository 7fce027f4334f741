//! Headless HTMLeX host.
//!
//! Loads a document from a file or URL, initializes the engine, drives the
//! event loop, and optionally prints a JSON snapshot of the resulting tree.

use anyhow::{Error, anyhow};
use dom::Document;
use engine::{Engine, EngineConfig};
use env_logger::init as env_logger_init;
use log::error;
use std::process::exit;
use std::time::Duration;
use tokio::runtime::Runtime;
use url::Url;

fn main() {
    env_logger_init();
    if let Err(err) = run() {
        error!("htmlex failed: {err:#}");
        exit(1);
    }
}

fn run() -> Result<(), Error> {
    let mut args = std::env::args().skip(1);
    let Some(source) = args.next() else {
        return Err(anyhow!(
            "usage: htmlex <file-or-url> [--run-ms N] [--snapshot]"
        ));
    };
    let mut run_ms: Option<u64> = None;
    let mut snapshot = false;
    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--run-ms" => {
                let value = args.next().ok_or_else(|| anyhow!("--run-ms needs a value"))?;
                run_ms = Some(value.parse()?);
            }
            "--snapshot" => snapshot = true,
            other => return Err(anyhow!("unknown flag {other:?}")),
        }
    }

    let runtime = Runtime::new()?;
    let (html, base) = runtime.block_on(load(&source))?;
    let doc = Document::parse(&html);
    let mut engine = Engine::new(doc, base, EngineConfig::from_env());
    engine.initialize();
    runtime.block_on(async {
        match run_ms {
            Some(ms) => engine.run_for(Duration::from_millis(ms)).await,
            None => {
                engine
                    .run_until_idle(Duration::from_millis(200), Duration::from_secs(10))
                    .await;
            }
        }
    });
    if snapshot {
        println!("{}", engine.document().to_json_string());
    }
    Ok(())
}

/// Fetch the document markup and derive the engine's base URL.
async fn load(source: &str) -> Result<(String, Url), Error> {
    if let Ok(url) = Url::parse(source) {
        match url.scheme() {
            "http" | "https" => {
                let response = reqwest::get(url.clone())
                    .await
                    .map_err(|err| anyhow!("failed to fetch {url}: {err}"))?;
                if !response.status().is_success() {
                    return Err(anyhow!("failed to fetch {url}: {}", response.status()));
                }
                return Ok((response.text().await?, url));
            }
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|()| anyhow!("invalid file url {url}"))?;
                return Ok((tokio::fs::read_to_string(path).await?, url));
            }
            _ => return Err(anyhow!("unsupported url scheme {}", url.scheme())),
        }
    }
    let path = std::fs::canonicalize(source)?;
    let url = Url::from_file_path(&path)
        .map_err(|()| anyhow!("cannot build a file url for {}", path.display()))?;
    Ok((tokio::fs::read_to_string(path).await?, url))
}
