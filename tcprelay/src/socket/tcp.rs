use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::SockRef;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::time::timeout;

use super::SOCKET_KEEPALIVE;
use crate::flow::*;

async fn dial_addr(dest: SocketAddr) -> io::Result<TcpStream> {
    let socket = match dest {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    let stream = socket.connect(dest).await?;
    stream.set_nodelay(true)?;
    SockRef::from(&stream).set_tcp_keepalive(SOCKET_KEEPALIVE)?;
    Ok(stream)
}

async fn dial_any(addr: &str) -> io::Result<(TcpStream, SocketAddr)> {
    let mut last_err = None;
    for dest in lookup_host(addr).await? {
        match dial_addr(dest).await {
            Ok(stream) => return Ok((stream, dest)),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "the host name does not resolve to any address",
        )
    }))
}

/// Connects to `addr`, trying every resolved address in order.
pub async fn dial_stream(
    addr: &str,
    connect_timeout: Option<Duration>,
) -> RelayResult<(TcpStream, SocketAddr)> {
    let res = match connect_timeout {
        Some(limit) => timeout(limit, dial_any(addr)).await.unwrap_or_else(|_| {
            Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connection not established within {:?}", limit),
            ))
        }),
        None => dial_any(addr).await,
    };
    res.map_err(|source| RelayError::Dial {
        addr: addr.to_owned(),
        source,
    })
}
