//! The two kinds of endpoint half a bridge copies between
//!
//! A [`Sink`] is what a direction writes into and a [`Source`] is what it
//! reads from. Each knows how to release itself gracefully (end of data)
//! or abruptly (failure), for both QUIC stream halves and TCP socket halves.

use quinn::{RecvStream, SendStream};
use socket2::SockRef;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::protocol::ABORT_CODE;

/// Destination of one copy direction
pub trait Sink: AsyncWrite + Unpin + Send {
    /// Signal that no more data follows; the peer sees a clean end of input.
    fn close(&mut self) -> io::Result<()>;

    /// Release after a failure; the peer sees an abnormal termination.
    fn abort(&mut self);
}

/// Origin of one copy direction
pub trait Source: AsyncRead + Unpin + Send {
    /// Stop reading after a failure elsewhere in the bridge.
    fn abort(&mut self);
}

impl Sink for SendStream {
    fn close(&mut self) -> io::Result<()> {
        self.finish()
            .map_err(|e| io::Error::new(io::ErrorKind::NotConnected, e))
    }

    fn abort(&mut self) {
        // Already reset or stopped by the peer is fine.
        let _ = self.reset(ABORT_CODE);
    }
}

impl Source for RecvStream {
    fn abort(&mut self) {
        let _ = self.stop(ABORT_CODE);
    }
}

impl Sink for OwnedWriteHalf {
    fn close(&mut self) -> io::Result<()> {
        SockRef::from(self.as_ref()).shutdown(std::net::Shutdown::Write)
    }

    fn abort(&mut self) {
        let _ = reset_tcp(self.as_ref());
    }
}

impl Source for OwnedReadHalf {
    fn abort(&mut self) {
        let _ = reset_tcp(self.as_ref());
    }
}

/// Force linger to zero so closing the socket emits RST instead of FIN.
pub fn reset_tcp(stream: &TcpStream) -> io::Result<()> {
    SockRef::from(stream).set_linger(Some(Duration::ZERO))
}

/// Cancel both halves of a stream with [`ABORT_CODE`].
pub fn abort_stream<W: Sink, R: Source>(send: &mut W, recv: &mut R) {
    send.abort();
    recv.abort();
}
