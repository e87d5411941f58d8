//! Serve a directory over HTTP until Ctrl-C.
//!
//! Usage: `cargo run --example static_server -- [ROOT] [PORT] [CONFIG.json]`

use filehttp_rs::{HttpServer, ServerConfig, ServerEvent};
use log::info;
use tokio::sync::mpsc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the logger
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let root = args.next().unwrap_or_else(|| ".".to_string());
    let port: u16 = args.next().map(|p| p.parse()).transpose()?.unwrap_or(8080);
    let config = match args.next() {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };

    let runtime = config.build_runtime()?;
    runtime.block_on(async move {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let server = HttpServer::new(config).with_events(tx);

        // Print what the server reports
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    ServerEvent::Log(line) => println!("{line}"),
                    ServerEvent::Started(addr) => println!("Serving on http://{addr}"),
                    ServerEvent::Stopped => {
                        println!("Stopped");
                        break;
                    }
                }
            }
        });

        server.start(root, port).await?;
        tokio::signal::ctrl_c().await?;
        info!("Ctrl-C received, stopping");
        server.stop().await;

        drop(server);
        let _ = printer.await;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
