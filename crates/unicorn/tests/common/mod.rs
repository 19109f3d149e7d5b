#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use unicorn::CallResult;

/// Accept connections forever, handing each to `handle`.
async fn serve<F, Fut>(handle: F) -> (SocketAddr, Arc<AtomicUsize>)
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(handle(socket));
        }
    });
    (addr, accepted)
}

/// Echoes every read back after `delay`.
pub async fn echo_server(delay: Duration) -> (SocketAddr, Arc<AtomicUsize>) {
    serve(move |mut socket| async move {
        let mut buf = [0u8; 4096];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if socket.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
    })
    .await
}

/// Answers every read with `reply`.
pub async fn fixed_reply_server(reply: Vec<u8>) -> SocketAddr {
    let reply = Arc::new(reply);
    let (addr, _) = serve(move |mut socket| {
        let reply = Arc::clone(&reply);
        async move {
            let mut buf = [0u8; 4096];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if socket.write_all(&reply).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    })
    .await;
    addr
}

/// Accepts connections and reads from them, but never answers.
pub async fn silent_server() -> SocketAddr {
    let (addr, _) = serve(|mut socket| async move {
        let mut buf = [0u8; 4096];
        while let Ok(n) = socket.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
    })
    .await;
    addr
}

/// Drain the sink until the engine closes it. Panics if that takes longer
/// than `limit`.
pub async fn collect(mut rx: mpsc::Receiver<CallResult>, limit: Duration) -> Vec<CallResult> {
    tokio::time::timeout(limit, async move {
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    })
    .await
    .expect("engine did not close the result sink in time")
}
