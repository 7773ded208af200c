//! # minhchung
//!
//! Evidence-code registry: HTTP server and CLI.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   apps/minhchung                         │
//! │                                                          │
//! │   ┌─────────────┐   ┌─────────────┐   ┌──────────────┐   │
//! │   │    CLI      │   │  HTTP API   │   │ HTTP client  │   │
//! │   │   (clap)    │   │   (axum)    │   │  (reqwest)   │   │
//! │   └──────┬──────┘   └──────┬──────┘   └──────────────┘   │
//! │          └────────┬────────┘                             │
//! │                   ▼                                      │
//! │          ┌─────────────────┐                             │
//! │          │ minhchung-core  │                             │
//! │          │ (Registry/redb) │                             │
//! │          └─────────────────┘                             │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! minhchung department add CNTT "Công nghệ thông tin"
//! minhchung criterion add 1.1 "Tiêu chí 1.1"
//! minhchung generate -d 1 -C 1 -m "Biên bản họp khoa"
//! minhchung server --config minhchung.toml
//! ```

use clap::Parser;
use minhchung::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // MINHCHUNG_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("MINHCHUNG_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "minhchung=info,minhchung_core=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  ███╗   ███╗ ██████╗
  ████╗ ████║██╔════╝   minhchung v{}
  ██╔████╔██║██║        evidence-code registry
  ██║╚██╔╝██║██║
  ██║ ╚═╝ ██║╚██████╗   MC-DEPT-CRITERION-SEQ-YYYY-MM
  ╚═╝     ╚═╝ ╚═════╝
"#,
        env!("CARGO_PKG_VERSION")
    );
}
