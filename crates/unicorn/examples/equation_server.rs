//! Demo target for the equation plugin: reads newline-terminated JSON
//! equations and answers each with its result.
//!
//! cargo run -p unicorn --example equation_server -- 127.0.0.1:9527

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use unicorn::plugins::equation::answer_line;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:9527".to_string());
    let listener = TcpListener::bind(&addr).await?;
    println!("Equation server listening on {}", addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let (read_half, mut write_half) = socket.into_split();
            let mut lines = BufReader::new(read_half);
            let mut line = Vec::new();
            loop {
                line.clear();
                match lines.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        eprintln!("[{}] Server: Req Read Error: {}", peer, e);
                        break;
                    }
                }
                let reply = match answer_line(&line) {
                    Ok(reply) => reply,
                    Err(e) => {
                        eprintln!("[{}] Server: Resp Marshal Error: {}", peer, e);
                        break;
                    }
                };
                if write_half.write_all(&reply).await.is_err() {
                    break;
                }
            }
        });
    }
}
