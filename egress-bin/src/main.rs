use anyhow::Result;
use clap::Parser;

use egress_core::{logging, Config, Endpoint, IfaceSpec, Server};

/// A SOCKS5 proxy that spreads outbound connections across several local
/// source addresses, weighted by metric.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Listening endpoint as addr:port; may repeat.
    /// Defaults to 127.0.0.1:1080 and [::1]:1080.
    #[arg(long = "bind", value_name = "ADDR:PORT")]
    bind: Vec<Endpoint>,

    /// Outgoing source addresses as ADDR[@METRIC]; bracket IPv6 addresses.
    #[arg(value_name = "ADDR@METRIC")]
    ifaces: Vec<IfaceSpec>,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level);

    let config = Config::new(args.bind, args.ifaces);
    let server = Server::bind(&config)?;

    let cancel = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            cancel.cancel();
        }
    });

    server.run().await;
    Ok(())
}
