//! entwine demo CLI.
//!
//! Runs the example scenarios and logs their results.
//!
//! # Usage
//!
//! ```bash
//! entwine-demo [--dev] [--json]
//! ```
//!
//! `--dev` enables dev-mode diagnostics, so the cache middleware that skips
//! `next` is reported. `--json` switches the log output to JSON.

use std::sync::Arc;

use entwine_state::config::ConfigContext;
use entwine_tracing::{TracingFormat, TracingSetup};
use example::{Demo, increment_answer};
use tracing::Level;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let dev = args.iter().any(|arg| arg == "--dev");
    let format = if args.iter().any(|arg| arg == "--json") {
        TracingFormat::Json
    } else {
        TracingFormat::Compact
    };

    let config = Arc::new(ConfigContext::new());
    if let Err(e) = TracingSetup::new()
        .with_level(if dev { Level::DEBUG } else { Level::INFO })
        .with_format(format)
        .with_diagnostics(dev)
        .with_context(Arc::clone(&config))
        .init()
    {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    match increment_answer(Arc::clone(&config)) {
        Ok((seen, result)) => tracing::info!(?seen, %result, "answer"),
        Err(e) => eprintln!("Error: {e}"),
    }

    let demo = match Demo::new(config) {
        Ok(demo) => demo,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    match demo.styled_button("Save") {
        Ok((class, html)) => tracing::info!(%class, %html, "styled button"),
        Err(e) => eprintln!("Error: {e}"),
    }

    for name in ["ada", "admin"] {
        match demo.cached_greeting(name) {
            Ok(greeting) => tracing::info!(name, %greeting, "greeting"),
            Err(e) => eprintln!("Error: {e}"),
        }
    }
}
