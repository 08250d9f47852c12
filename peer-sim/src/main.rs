mod pins;

use anyhow::Result;
use clap::Parser;
use linkbrain_protocol::limits::MAX_RESPONSE_SIZE;
use linkbrain_protocol::{decode_command, RecordDecoder, Response};
use pins::PinTable;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "peer-sim", version, about = "Simulated GPIO peer speaking the command protocol over TCP")]
struct Cli {
    #[arg(long, env = "PEER_SIM_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let listener = TcpListener::bind(cli.listen).await?;
    info!("Peer simulator listening on {}", cli.listen);

    let table = Arc::new(PinTable::new());
    loop {
        let (socket, addr) = listener.accept().await?;
        info!("Connection from: {}", addr);

        let table = table.clone();
        tokio::spawn(async move {
            if let Err(e) = serve(socket, addr, &table).await {
                error!("Connection {} failed: {}", addr, e);
            }
        });
    }
}

async fn serve(mut socket: TcpStream, addr: SocketAddr, table: &PinTable) -> Result<()> {
    let mut decoder = RecordDecoder::new();
    let mut buf = vec![0u8; MAX_RESPONSE_SIZE];

    loop {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            info!("Client disconnected: {}", addr);
            return Ok(());
        }
        decoder.extend(&buf[..n]);

        while let Some(record) = decoder.next_record() {
            debug!("{} -> {}", addr, record);
            let reply = match decode_command(&record) {
                Ok(command) => table.handle(&command).await,
                Err(e) => Response::error(e.to_string()),
            };
            let wire = reply.to_wire();
            debug!("{} <- {}", addr, wire);
            socket.write_all(format!("{}\n", wire).as_bytes()).await?;
        }

        if decoder.buffer_len() > MAX_RESPONSE_SIZE {
            warn!("Dropping {}: record exceeds {} bytes", addr, MAX_RESPONSE_SIZE);
            return Ok(());
        }
    }
}
