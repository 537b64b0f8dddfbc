use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};
use usrecon_core::pipeline::Reconstructor;

use crate::handler::handle_line;

/// Accepts connections forever, one task per connection.
pub async fn serve(listener: TcpListener, reconstructor: Arc<Reconstructor>) -> io::Result<()> {
    info!(addr = %listener.local_addr()?, "listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "connection accepted");
        let reconstructor = Arc::clone(&reconstructor);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, reconstructor).await {
                warn!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}

/// Answers each request line on `stream` with one reply line, in order.
pub async fn handle_connection(
    stream: TcpStream,
    reconstructor: Arc<Reconstructor>,
) -> io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_line(&line, Arc::clone(&reconstructor)).await;
        let mut bytes = serde_json::to_vec(&reply)?;
        bytes.push(b'\n');
        write.write_all(&bytes).await?;
    }
    Ok(())
}
