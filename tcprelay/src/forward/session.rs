use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::timeout;

use super::{copy_oneway, CopyOutcome, IdleWatch, SessionStat, StatsReporter};
use crate::config::SessionOptions;
use crate::flow::*;
use crate::log::{EventSink, RelayEvent};
use crate::socket::dial_stream;

/// One accepted connection paired with its connection to the remote target.
pub struct Session {
    pub id: u64,
    pub inbound: TcpStream,
    pub peer: SocketAddr,
    pub remote: Arc<str>,
    pub options: Arc<SessionOptions>,
    pub sink: Arc<dyn EventSink>,
}

#[derive(Debug)]
pub struct SessionSummary {
    pub uploaded: u64,
    pub downloaded: u64,
    pub upload_error: Option<RelayError>,
    pub download_error: Option<RelayError>,
}

impl Session {
    /// Relays until both directions have finished.
    ///
    /// Once the upload direction ends, the download direction is given
    /// [`SessionOptions::drain_timeout`] of silence before it is cancelled.
    ///
    /// Only a failure to reach the remote target is returned as an error.
    /// Copy failures are reported to the sink and recorded in the summary.
    pub async fn run(self) -> RelayResult<SessionSummary> {
        let Self {
            id,
            inbound,
            peer,
            remote,
            options,
            sink,
        } = self;
        sink.emit(RelayEvent::Accepted { id, peer });

        let (outbound, remote_addr) = match dial_stream(&remote, options.connect_timeout).await {
            Ok(r) => r,
            Err(e) => {
                sink.emit(RelayEvent::DialFailed {
                    id,
                    remote: remote.to_string(),
                    error: e.to_string(),
                });
                sink.emit(RelayEvent::Disconnected {
                    id,
                    peer,
                    remote: None,
                });
                return Err(e);
            }
        };
        sink.emit(RelayEvent::Connected {
            id,
            remote: remote_addr,
        });

        let stat = Arc::new(SessionStat::default());
        let (exit_tx, exit_rx) = oneshot::channel();
        let reporter = tokio::spawn(
            StatsReporter {
                id,
                stat: stat.clone(),
                period: options.tick_period,
                sink: sink.clone(),
            }
            .run(exit_rx),
        );

        let (mut inbound_rx, mut inbound_tx) = inbound.into_split();
        let (mut outbound_rx, mut outbound_tx) = outbound.into_split();
        let idle_timeout = options.idle_timeout;

        let mut download = tokio::spawn({
            let stat = stat.clone();
            let sink = sink.clone();
            async move {
                let idle = idle_timeout.map(|limit| IdleWatch { limit, stat: &stat });
                let outcome = copy_oneway(
                    &mut outbound_rx,
                    &mut inbound_tx,
                    &stat.downlink_written,
                    idle,
                )
                .await;
                if let Err(e) = &outcome.result {
                    sink.emit(RelayEvent::CopyFailed {
                        id,
                        direction: Direction::Download,
                        error: e.to_string(),
                    });
                    let _ = inbound_tx.shutdown().await;
                }
                // Hand the halves back so that they are closed at teardown.
                (outcome, outbound_rx, inbound_tx)
            }
        });

        let idle = idle_timeout.map(|limit| IdleWatch { limit, stat: &stat });
        let upload = copy_oneway(
            &mut inbound_rx,
            &mut outbound_tx,
            &stat.uplink_written,
            idle,
        )
        .await;
        if let Err(e) = &upload.result {
            sink.emit(RelayEvent::CopyFailed {
                id,
                direction: Direction::Upload,
                error: e.to_string(),
            });
            // Unblock the remote so that the download direction can finish.
            let _ = outbound_tx.shutdown().await;
        }

        // The inbound side is done. Keep draining the remote while it still
        // sends, but do not wait on a remote that holds its side open silently.
        let drain_timeout = options.drain_timeout;
        let joined = loop {
            let seen = stat.downlink_written.load(Ordering::Relaxed);
            match timeout(drain_timeout, &mut download).await {
                Ok(joined) => break joined,
                Err(_) if stat.downlink_written.load(Ordering::Relaxed) != seen => continue,
                Err(_) => {
                    download.abort();
                    break download.await;
                }
            }
        };
        let (download, _halves) = match joined {
            Ok((outcome, outbound_rx, inbound_tx)) => (outcome, Some((outbound_rx, inbound_tx))),
            Err(e) => {
                let error = if e.is_cancelled() {
                    RelayError::Timeout(drain_timeout)
                } else {
                    io::Error::new(io::ErrorKind::Other, e).into()
                };
                sink.emit(RelayEvent::CopyFailed {
                    id,
                    direction: Direction::Download,
                    error: error.to_string(),
                });
                (
                    CopyOutcome {
                        written: stat.downlink_written.load(Ordering::Relaxed),
                        result: Err(error),
                    },
                    None,
                )
            }
        };

        sink.emit(RelayEvent::Finished {
            id,
            uploaded: upload.written,
            downloaded: download.written,
        });
        let _ = exit_tx.send(());
        let _ = reporter.await;
        sink.emit(RelayEvent::Disconnected {
            id,
            peer,
            remote: Some(remote_addr),
        });

        Ok(SessionSummary {
            uploaded: upload.written,
            downloaded: download.written,
            upload_error: upload.result.err(),
            download_error: download.result.err(),
        })
    }
}
