use std::future::Future;
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use super::SessionStat;
use crate::flow::*;

pub const COPY_BUF_SIZE: usize = 32 * 1024;

/// Terminal state of one copy direction.
#[derive(Debug)]
pub struct CopyOutcome {
    /// Bytes accepted by the destination.
    pub written: u64,
    /// `Ok` on clean end of stream.
    pub result: RelayResult<()>,
}

/// Idle limit shared by both directions of a session.
///
/// An operation only times out when neither direction moved a byte during the
/// whole `limit`.
#[derive(Debug, Clone, Copy)]
pub struct IdleWatch<'a> {
    pub limit: Duration,
    pub stat: &'a SessionStat,
}

impl IdleWatch<'_> {
    fn progress(&self) -> u64 {
        self.stat.uplink_written.load(Ordering::Relaxed)
            + self.stat.downlink_written.load(Ordering::Relaxed)
    }
}

async fn with_deadline<T>(
    idle: Option<IdleWatch<'_>>,
    fut: impl Future<Output = io::Result<T>>,
) -> RelayResult<T> {
    let idle = match idle {
        Some(idle) => idle,
        None => return Ok(fut.await?),
    };
    tokio::pin!(fut);
    loop {
        let seen = idle.progress();
        match timeout(idle.limit, fut.as_mut()).await {
            Ok(r) => return Ok(r?),
            Err(_) if idle.progress() != seen => continue,
            Err(_) => return Err(RelayError::Timeout(idle.limit)),
        }
    }
}

fn is_interrupted(e: &RelayError) -> bool {
    matches!(e, RelayError::Io(e) if e.kind() == ErrorKind::Interrupted)
}

async fn forward_oneway<R, W>(
    rx: &mut R,
    tx: &mut W,
    buf: &mut [u8],
    counter: &AtomicU64,
    written: &mut u64,
    idle: Option<IdleWatch<'_>>,
) -> RelayResult<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    loop {
        let nr = match with_deadline(idle, rx.read(buf)).await {
            Ok(0) => break,
            Ok(nr) => nr,
            Err(e) if is_interrupted(&e) => continue,
            Err(e) => return Err(e),
        };
        let mut chunk = &buf[..nr];
        while !chunk.is_empty() {
            let nw = match with_deadline(idle, tx.write(chunk)).await {
                Ok(nw) => nw,
                Err(e) if is_interrupted(&e) => continue,
                Err(e) => return Err(e),
            };
            if nw > chunk.len() {
                return Err(RelayError::InvalidWrite);
            }
            if nw == 0 {
                return Err(RelayError::ShortWrite);
            }
            *written += nw as u64;
            counter.fetch_add(nw as u64, Ordering::Relaxed);
            chunk = &chunk[nw..];
        }
        with_deadline(idle, tx.flush()).await?;
    }

    // Let the far side observe EOF so that the opposite direction can drain.
    // The peer may have gone away already.
    let _ = tx.shutdown().await;
    Ok(())
}

/// Moves bytes from `rx` to `tx` until `rx` reaches EOF or either side fails.
///
/// `counter` is bumped after every accepted write so that progress can be
/// observed while the copy is running. A write accepting zero bytes fails with
/// [`RelayError::ShortWrite`], one claiming more than it was given with
/// [`RelayError::InvalidWrite`]. On clean EOF the write half of `tx` is shut
/// down. With `idle` set, a read or write fails with [`RelayError::Timeout`]
/// once the whole session has been silent for the limit.
pub async fn copy_oneway<R, W>(
    rx: &mut R,
    tx: &mut W,
    counter: &AtomicU64,
    idle: Option<IdleWatch<'_>>,
) -> CopyOutcome
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut written = 0;
    let result = forward_oneway(rx, tx, &mut buf, counter, &mut written, idle).await;
    CopyOutcome { written, result }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use tokio::io::ReadBuf;

    use super::*;

    /// Yields a scripted sequence of reads, then EOF.
    struct ScriptedReader(VecDeque<io::Result<Vec<u8>>>);

    impl AsyncRead for ScriptedReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.0.pop_front() {
                Some(Ok(data)) => {
                    buf.put_slice(&data);
                    Poll::Ready(Ok(()))
                }
                Some(Err(e)) => Poll::Ready(Err(e)),
                None => Poll::Ready(Ok(())),
            }
        }
    }

    /// Accepts up to `capacity` bytes in total, then reports zero-length writes.
    #[derive(Default)]
    struct LimitedWriter {
        data: Vec<u8>,
        capacity: usize,
        overreport: bool,
        shutdown: bool,
    }

    impl AsyncWrite for LimitedWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.overreport {
                return Poll::Ready(Ok(buf.len() + 1));
            }
            let len = buf.len().min(self.capacity - self.data.len());
            self.data.extend_from_slice(&buf[..len]);
            Poll::Ready(Ok(len))
        }
        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
        fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.shutdown = true;
            Poll::Ready(Ok(()))
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_copy_until_eof() {
        let data = payload(100_000);
        let mut rx = &data[..];
        let mut tx = LimitedWriter {
            capacity: usize::MAX,
            ..Default::default()
        };
        let counter = AtomicU64::new(0);
        let outcome = copy_oneway(&mut rx, &mut tx, &counter, None).await;
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.written, 100_000);
        assert_eq!(counter.load(Ordering::Relaxed), 100_000);
        assert_eq!(tx.data, data);
        assert!(tx.shutdown);
    }

    #[tokio::test]
    async fn test_copy_empty_source() {
        let mut rx = &b""[..];
        let mut tx = Vec::new();
        let counter = AtomicU64::new(0);
        let outcome = copy_oneway(&mut rx, &mut tx, &counter, None).await;
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.written, 0);
        assert!(tx.is_empty());
    }

    #[tokio::test]
    async fn test_copy_short_write() {
        let data = payload(100);
        let mut rx = &data[..];
        let mut tx = LimitedWriter {
            capacity: 10,
            ..Default::default()
        };
        let counter = AtomicU64::new(0);
        let outcome = copy_oneway(&mut rx, &mut tx, &counter, None).await;
        assert!(matches!(outcome.result, Err(RelayError::ShortWrite)));
        assert_eq!(outcome.written, 10);
        assert_eq!(counter.load(Ordering::Relaxed), 10);
        assert_eq!(tx.data, &data[..10]);
        assert!(!tx.shutdown);
    }

    #[tokio::test]
    async fn test_copy_invalid_write() {
        let mut rx = &b"hello"[..];
        let mut tx = LimitedWriter {
            capacity: usize::MAX,
            overreport: true,
            ..Default::default()
        };
        let counter = AtomicU64::new(0);
        let outcome = copy_oneway(&mut rx, &mut tx, &counter, None).await;
        assert!(matches!(outcome.result, Err(RelayError::InvalidWrite)));
        assert_eq!(outcome.written, 0);
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_copy_read_error_keeps_progress() {
        let mut rx = ScriptedReader(VecDeque::from([
            Ok(b"abc".to_vec()),
            Err(io::Error::new(ErrorKind::Interrupted, "retry")),
            Ok(b"de".to_vec()),
            Err(io::Error::new(ErrorKind::ConnectionReset, "reset")),
            Ok(b"never".to_vec()),
        ]));
        let mut tx = Vec::new();
        let counter = AtomicU64::new(0);
        let outcome = copy_oneway(&mut rx, &mut tx, &counter, None).await;
        match outcome.result {
            Err(RelayError::Io(e)) => assert_eq!(e.kind(), ErrorKind::ConnectionReset),
            r => panic!("unexpected result {:?}", r),
        }
        assert_eq!(outcome.written, 5);
        assert_eq!(counter.load(Ordering::Relaxed), 5);
        assert_eq!(tx, b"abcde");
    }

    #[tokio::test]
    async fn test_copy_counter_accumulates_across_writes() {
        let mut rx = ScriptedReader(VecDeque::from([
            Ok(vec![1; COPY_BUF_SIZE]),
            Ok(vec![2; 7]),
        ]));
        let mut tx = Vec::new();
        let counter = AtomicU64::new(0);
        let outcome = copy_oneway(&mut rx, &mut tx, &counter, None).await;
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.written, COPY_BUF_SIZE as u64 + 7);
        assert_eq!(counter.load(Ordering::Relaxed), outcome.written);
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_idle_timeout() {
        // Keep the peer end open without ever writing into it.
        let (mut rx, _peer) = tokio::io::duplex(64);
        let mut tx = Vec::new();
        let stat = SessionStat::default();
        let limit = Duration::from_secs(30);
        let idle = IdleWatch { limit, stat: &stat };
        let outcome = copy_oneway(&mut rx, &mut tx, &stat.uplink_written, Some(idle)).await;
        assert!(matches!(outcome.result, Err(RelayError::Timeout(l)) if l == limit));
        assert_eq!(outcome.written, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_idle_timeout_counts_opposite_direction() {
        let (mut rx, _peer) = tokio::io::duplex(64);
        let mut tx = Vec::new();
        let stat = Arc::new(SessionStat::default());
        // The opposite direction moves a byte every 500ms for 3s.
        let ticker = tokio::spawn({
            let stat = stat.clone();
            async move {
                for _ in 0..6 {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    stat.downlink_written.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
        let started = tokio::time::Instant::now();
        let idle = IdleWatch {
            limit: Duration::from_secs(1),
            stat: &stat,
        };
        let outcome = copy_oneway(&mut rx, &mut tx, &stat.uplink_written, Some(idle)).await;
        assert!(matches!(outcome.result, Err(RelayError::Timeout(_))));
        assert!(started.elapsed() >= Duration::from_secs(4));
        ticker.await.unwrap();
    }

    #[tokio::test]
    async fn test_copy_through_duplex() {
        let data = payload(200_000);
        let (mut client, mut relay_in) = tokio::io::duplex(4096);
        let (mut relay_out, mut server) = tokio::io::duplex(4096);
        let writer = {
            let data = data.clone();
            tokio::spawn(async move {
                client.write_all(&data).await.unwrap();
                client.shutdown().await.unwrap();
            })
        };
        let reader = tokio::spawn(async move {
            let mut received = Vec::new();
            server.read_to_end(&mut received).await.unwrap();
            received
        });
        let counter = AtomicU64::new(0);
        let outcome = copy_oneway(&mut relay_in, &mut relay_out, &counter, None).await;
        assert!(outcome.result.is_ok());
        writer.await.unwrap();
        assert_eq!(reader.await.unwrap(), data);
        assert_eq!(counter.load(Ordering::Relaxed), 200_000);
    }
}
