//! attache entrypoint.
//!
//! stdin/stdout belong to the wire protocol, so all logging goes to stderr;
//! the first stderr line after startup is the literal `ready` handshake the
//! editor-side plugin waits for.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use core_proto::Codec;
use core_runtime::{Agent, AgentConfig};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "attache", version, about = "Editor companion agent")]
struct Args {
    /// Envelope codec: json, cbor or msgpack.
    #[arg(long, default_value = "json")]
    codec: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let codec = match Codec::from_name(&args.codec) {
        Ok(codec) => codec,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Log panics before the default hook prints them, so crashes show up in
    // the same stream the editor collects.
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(target: "agent.panic", ?info, "panic");
        default_panic(info);
    }));

    let agent = Agent::new(AgentConfig {
        codec,
        ..AgentConfig::default()
    });
    agent.run().await
}
