//! Bidirectional bridge between one TCP socket and one QUIC stream

use std::fmt;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument, trace};

use super::halves::{Sink, Source};
use crate::metrics::METRICS;

const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// Copy direction, named from the TCP side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Socket to stream
    Upstream,
    /// Stream to socket
    Downstream,
}

impl Direction {
    fn record(self, bytes: u64) {
        match self {
            Direction::Upstream => METRICS.upstream(bytes),
            Direction::Downstream => METRICS.downstream(bytes),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => f.write_str("upstream"),
            Direction::Downstream => f.write_str("downstream"),
        }
    }
}

/// Terminal state of one copy direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Source reached end of input and the sink was closed gracefully
    Finished,
    /// A read or write failed and the sink was released abruptly
    Aborted,
    /// Stopped because the other direction aborted
    Canceled,
}

/// Outcome of a finished bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeReport {
    pub upstream: Termination,
    pub downstream: Termination,
    pub upstream_bytes: u64,
    pub downstream_bytes: u64,
}

impl BridgeReport {
    /// Both directions ended with a graceful close
    pub fn is_clean(&self) -> bool {
        self.upstream == Termination::Finished && self.downstream == Termination::Finished
    }
}

/// Exclusive pairing of one TCP socket with one QUIC stream
///
/// Both endpoints are moved in, so nothing else can touch them while the
/// bridge runs. A clean end of input in one direction half-closes the
/// other side and keeps the opposite direction running; any failure tears
/// down the whole pairing.
pub struct Bridge<W, R> {
    socket: TcpStream,
    send: W,
    recv: R,
    peer: Option<SocketAddr>,
}

impl<W: Sink, R: Source> Bridge<W, R> {
    pub fn new(socket: TcpStream, send: W, recv: R) -> Self {
        let peer = socket.peer_addr().ok();
        Self {
            socket,
            send,
            recv,
            peer,
        }
    }

    /// Forward until both directions are terminal, then release everything
    #[instrument(name = "bridge", skip(self), fields(peer = ?self.peer))]
    pub async fn run(self) -> BridgeReport {
        METRICS.bridge_opened();

        let Bridge {
            socket,
            mut send,
            mut recv,
            ..
        } = self;
        let (mut tcp_read, mut tcp_write) = socket.into_split();
        let mut upstream_bytes = 0u64;
        let mut downstream_bytes = 0u64;

        let (upstream, downstream) = {
            let up = pump(&mut tcp_read, &mut send, &mut upstream_bytes, Direction::Upstream);
            let down = pump(
                &mut recv,
                &mut tcp_write,
                &mut downstream_bytes,
                Direction::Downstream,
            );
            tokio::pin!(up, down);

            let mut up_done = None;
            let mut down_done = None;
            loop {
                tokio::select! {
                    t = &mut up, if up_done.is_none() => up_done = Some(t),
                    t = &mut down, if down_done.is_none() => down_done = Some(t),
                }
                match (up_done, down_done) {
                    (Some(up), Some(down)) => break (up, down),
                    // Dropping the sibling future here cancels it
                    (Some(Termination::Aborted), None) => {
                        break (Termination::Aborted, Termination::Canceled)
                    }
                    (None, Some(Termination::Aborted)) => {
                        break (Termination::Canceled, Termination::Aborted)
                    }
                    _ => {}
                }
            }
        };

        let report = BridgeReport {
            upstream,
            downstream,
            upstream_bytes,
            downstream_bytes,
        };

        if !report.is_clean() {
            // A finished stream must not be reset: that would discard data
            // the peer has not acknowledged yet.
            if upstream != Termination::Finished {
                send.abort();
            }
            recv.abort();
            tcp_write.abort();
        }
        drop(send);
        drop(recv);
        // Reunite first: dropping a lone write half sends FIN, which would
        // precede the reset.
        drop(tcp_read.reunite(tcp_write));

        METRICS.bridge_closed(!report.is_clean());
        debug!(
            upstream_bytes,
            downstream_bytes,
            upstream = ?report.upstream,
            downstream = ?report.downstream,
            "Bridge closed"
        );

        report
    }
}

/// Copy one direction until end of input or failure, then release the sink
async fn pump<S: Source, D: Sink>(
    source: &mut S,
    sink: &mut D,
    total: &mut u64,
    direction: Direction,
) -> Termination {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(%direction, error = %e, "Read failed");
                sink.abort();
                return Termination::Aborted;
            }
        };

        if let Err(e) = sink.write_all(&buf[..n]).await {
            debug!(%direction, error = %e, "Write failed");
            sink.abort();
            return Termination::Aborted;
        }

        *total += n as u64;
        direction.record(n as u64);
    }

    match sink.close() {
        Ok(()) => {
            trace!(%direction, bytes = *total, "End of input");
            Termination::Finished
        }
        Err(e) => {
            debug!(%direction, error = %e, "Graceful close failed");
            sink.abort();
            Termination::Aborted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
    use tokio::net::TcpListener;

    use crate::bridge::reset_tcp;

    #[derive(Default)]
    struct SinkLog {
        written: Vec<u8>,
        closed: bool,
        aborted: bool,
    }

    /// Stream write half that records what happened to it
    struct MockSink {
        log: Arc<Mutex<SinkLog>>,
        fail_writes: bool,
    }

    impl AsyncWrite for MockSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.fail_writes {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "stopped by peer",
                )));
            }
            self.log.lock().written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    impl Sink for MockSink {
        fn close(&mut self) -> io::Result<()> {
            self.log.lock().closed = true;
            Ok(())
        }

        fn abort(&mut self) {
            self.log.lock().aborted = true;
        }
    }

    /// Stream read half fed from any reader
    struct MockSource {
        inner: Box<dyn AsyncRead + Unpin + Send>,
        aborted: Arc<AtomicBool>,
    }

    impl AsyncRead for MockSource {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
        }
    }

    impl Source for MockSource {
        fn abort(&mut self) {
            self.aborted.store(true, Ordering::SeqCst);
        }
    }

    fn mock_source(inner: impl AsyncRead + Unpin + Send + 'static) -> (MockSource, Arc<AtomicBool>) {
        let aborted = Arc::new(AtomicBool::new(false));
        let source = MockSource {
            inner: Box::new(inner),
            aborted: aborted.clone(),
        };
        (source, aborted)
    }

    fn mock_sink(fail_writes: bool) -> (MockSink, Arc<Mutex<SinkLog>>) {
        let log = Arc::new(Mutex::new(SinkLog::default()));
        let sink = MockSink {
            log: log.clone(),
            fail_writes,
        };
        (sink, log)
    }

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (accepted.unwrap().0, client.unwrap())
    }

    async fn finished(handle: tokio::task::JoinHandle<BridgeReport>) -> BridgeReport {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("bridge did not finish")
            .unwrap()
    }

    #[tokio::test]
    async fn test_half_close_keeps_other_direction() {
        let (local, mut peer) = socket_pair().await;
        let (sink, log) = mock_sink(false);
        let (stream_end, mut feeder) = tokio::io::duplex(1024);
        let (source, source_aborted) = mock_source(stream_end);

        let handle = tokio::spawn(Bridge::new(local, sink, source).run());

        peer.write_all(b"from tcp").await.unwrap();
        peer.shutdown().await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while !log.lock().closed {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("stream was not closed");

        // The socket side is half-closed; stream data must still arrive
        feeder.write_all(b"from stream").await.unwrap();
        drop(feeder);

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"from stream");

        let report = finished(handle).await;
        assert!(report.is_clean());
        assert_eq!(report.upstream_bytes, 8);
        assert_eq!(report.downstream_bytes, 11);

        let log = log.lock();
        assert_eq!(log.written, b"from tcp");
        assert!(!log.aborted);
        assert!(!source_aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_socket_reset_aborts_stream() {
        let (local, peer) = socket_pair().await;
        let (sink, log) = mock_sink(false);
        let (stream_end, _feeder) = tokio::io::duplex(1024);
        let (source, source_aborted) = mock_source(stream_end);

        let handle = tokio::spawn(Bridge::new(local, sink, source).run());

        reset_tcp(&peer).unwrap();
        drop(peer);

        let report = finished(handle).await;
        assert_eq!(report.upstream, Termination::Aborted);
        assert_eq!(report.downstream, Termination::Canceled);

        let log = log.lock();
        assert!(log.aborted);
        assert!(!log.closed);
        assert!(source_aborted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stream_failure_resets_socket() {
        let (local, mut peer) = socket_pair().await;
        let (sink, log) = mock_sink(false);
        let script = tokio_test::io::Builder::new()
            .read(b"partial")
            .wait(Duration::from_millis(50))
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"))
            .build();
        let (source, _) = mock_source(script);

        let handle = tokio::spawn(Bridge::new(local, sink, source).run());

        let mut partial = [0u8; 7];
        peer.read_exact(&mut partial).await.unwrap();
        assert_eq!(&partial, b"partial");

        let mut buf = [0u8; 16];
        let err = peer.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);

        let report = finished(handle).await;
        assert_eq!(report.downstream, Termination::Aborted);
        assert_eq!(report.upstream, Termination::Canceled);
        assert_eq!(report.downstream_bytes, 7);
        assert!(log.lock().aborted);
    }

    #[tokio::test]
    async fn test_stream_write_failure_resets_socket() {
        let (local, mut peer) = socket_pair().await;
        let (sink, log) = mock_sink(true);
        let (stream_end, _feeder) = tokio::io::duplex(1024);
        let (source, source_aborted) = mock_source(stream_end);

        let handle = tokio::spawn(Bridge::new(local, sink, source).run());

        peer.write_all(b"data").await.unwrap();

        let mut buf = [0u8; 16];
        let err = peer.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);

        let report = finished(handle).await;
        assert_eq!(report.upstream, Termination::Aborted);
        assert_eq!(report.downstream, Termination::Canceled);
        assert!(log.lock().aborted);
        assert!(source_aborted.load(Ordering::SeqCst));
    }
}
