//! Demo target: echoes every byte back on the same connection.
//!
//! cargo run -p unicorn --example echo_server -- 127.0.0.1:9527

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9527".to_string());
    let listener = TcpListener::bind(&addr).await?;
    println!("Echo server listening on {}", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if socket.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        eprintln!("[{}] read error: {}", peer, e);
                        break;
                    }
                }
            }
        });
    }
}
