//! Shared setup: a real server and client over loopback

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use quictun::bridge::reset_tcp;
use quictun::Server;
use quictun_client::{Config, TunnelClient};

pub struct Tunnel {
    pub server: Arc<Server>,
    pub client: Arc<TunnelClient>,
    pub listen: SocketAddr,
    pub client_run: JoinHandle<anyhow::Result<()>>,
}

pub async fn start_server(
    destination: SocketAddr,
    configure: impl FnOnce(&mut quictun::Config),
) -> (Arc<Server>, SocketAddr) {
    let mut config = quictun::Config::default();
    config.server.listen = "127.0.0.1:0".to_string();
    config.server.destination = destination.to_string();
    config.keylog.enabled = false;
    configure(&mut config);

    let server = Arc::new(Server::new(Arc::new(config)).await.unwrap());
    let addr = server.local_addr().unwrap();

    let running = server.clone();
    tokio::spawn(async move { running.run().await });

    (server, addr)
}

pub async fn start_tunnel(destination: SocketAddr) -> Tunnel {
    start_tunnel_with(destination, |_| {}).await
}

/// Like `start_tunnel`, with the server config adjusted first
pub async fn start_tunnel_with(
    destination: SocketAddr,
    configure: impl FnOnce(&mut quictun::Config),
) -> Tunnel {
    let (server, server_addr) = start_server(destination, configure).await;

    let mut config = Config::default();
    config.client.listen = "127.0.0.1:0".to_string();
    config.client.remote = server_addr.to_string();
    config.keylog.enabled = false;

    let client = Arc::new(TunnelClient::new(Arc::new(config)).await.unwrap());
    let listen = client.local_addr().unwrap();

    let running = client.clone();
    let client_run = tokio::spawn(async move { running.run().await });

    Tunnel {
        server,
        client,
        listen,
        client_run,
    }
}

/// Echo every connection until the peer half-closes
pub async fn echo_destination() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(echo(socket, Vec::new()));
        }
    });

    addr
}

/// Echo, except connections starting with `reset` are reset on the spot
pub async fn resetting_destination() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut prefix = [0u8; 5];
                if socket.read_exact(&mut prefix).await.is_err() {
                    return;
                }
                if &prefix == b"reset" {
                    let _ = reset_tcp(&socket);
                    return;
                }
                echo(socket, prefix.to_vec()).await;
            });
        }
    });

    addr
}

async fn echo(mut socket: tokio::net::TcpStream, already_read: Vec<u8>) {
    if socket.write_all(&already_read).await.is_err() {
        return;
    }
    let (mut read, mut write) = socket.split();
    let _ = tokio::io::copy(&mut read, &mut write).await;
    let _ = write.shutdown().await;
}
