//! Link server - answers registration and echo commands.
//!
//! ```sh
//! RUST_LOG=framelink=debug cargo run --example server -- 8266
//! ```
//!
//! An optional JSON config file can be given instead of the port:
//!
//! ```sh
//! cargo run --example server -- config.json
//! ```

use std::sync::Arc;

use framelink::{ServerBuilder, ServerConfig, SystemRtc, TcpTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish(),
    )?;

    let config = match std::env::args().nth(1) {
        Some(arg) => match arg.parse::<u16>() {
            Ok(port) => ServerConfig {
                port,
                ..ServerConfig::default()
            },
            Err(_) => ServerConfig::from_json_str(&std::fs::read_to_string(&arg)?)?,
        },
        None => ServerConfig::default(),
    };

    let transport = Arc::new(TcpTransport::new());
    let server = ServerBuilder::new()
        .config(config)
        .start(transport.clone(), Arc::new(SystemRtc::new()))
        .await?;

    if let Some(addr) = transport.local_addr() {
        println!("listening on {}", addr);
    }

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.shutdown();
        }
    });

    server.run().await;
    transport.shutdown();
    Ok(())
}
