use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;

use super::ACCEPT_ERROR_DELAY;
use crate::config::{RelayConfig, SessionOptions};
use crate::flow::*;
use crate::forward::{RelayStat, Session, StatGuard};
use crate::log::{EventSink, RelayEvent};

pub struct RelayListener {
    listener: TcpListener,
    remote: Arc<str>,
    options: Arc<SessionOptions>,
    sink: Arc<dyn EventSink>,
    stat: RelayStat,
    next_id: u64,
}

/// Errors that only concern the connection being accepted. The listener itself
/// is still healthy.
fn is_connection_error(e: &io::Error) -> bool {
    use io::ErrorKind::*;
    matches!(
        e.kind(),
        ConnectionRefused | ConnectionAborted | ConnectionReset | Interrupted | WouldBlock
    )
}

impl RelayListener {
    pub async fn bind(config: &RelayConfig, sink: Arc<dyn EventSink>) -> RelayResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.listen.as_str())
            .await
            .map_err(|source| RelayError::Bind {
                addr: config.listen.clone(),
                source,
            })?;
        sink.emit(RelayEvent::Started {
            local: listener.local_addr()?,
            remote: config.remote.clone(),
        });
        Ok(Self {
            listener,
            remote: config.remote.as_str().into(),
            options: Arc::new(config.session.clone()),
            sink,
            stat: Default::default(),
            next_id: 0,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stat(&self) -> RelayStat {
        self.stat.clone()
    }

    /// Accepts connections forever, one spawned session each.
    pub async fn run(mut self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => self.spawn_session(stream, peer),
                Err(e) => {
                    self.sink.emit(RelayEvent::AcceptFailed {
                        error: e.to_string(),
                    });
                    if !is_connection_error(&e) {
                        sleep(ACCEPT_ERROR_DELAY).await;
                    }
                }
            }
        }
    }

    fn spawn_session(&mut self, inbound: TcpStream, peer: SocketAddr) {
        self.next_id += 1;
        // Latency over throughput on both legs, like the dialed side.
        let _ = inbound.set_nodelay(true);
        let guard = StatGuard::new(self.stat.clone());
        let session = Session {
            id: self.next_id,
            inbound,
            peer,
            remote: self.remote.clone(),
            options: self.options.clone(),
            sink: self.sink.clone(),
        };
        tokio::spawn(async move {
            // Outcome is already reported through the sink.
            let _ = session.run().await;
            drop(guard);
        });
    }
}
