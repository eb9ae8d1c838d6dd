//! Newline-framed channel over any async byte stream.

use super::{ChannelError, PeerChannel};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, instrument, trace, warn};

/// Longest line accepted from a peer, excluding the newline.
pub const MAX_LINE_LENGTH: usize = 1024;

/// Lines buffered per peer before the reader stops draining the socket.
pub const INBOUND_CAPACITY: usize = 16;

/// Write half of a game connection, plain TCP or TLS.
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Line channel over a game connection.
pub type NetChannel = LineChannel<BoxedWriter>;

/// Peer channel that frames messages as newline-terminated lines.
///
/// A dedicated reader task drains the socket into a bounded queue, so
/// inbound data is consumed even while the session is busy with the other
/// peer. A line longer than [`MAX_LINE_LENGTH`] ends the connection.
#[derive(Debug)]
pub struct LineChannel<W> {
    writer: W,
    inbound: mpsc::Receiver<String>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl LineChannel<BoxedWriter> {
    /// Wraps an accepted connection, TLS-wrapped or not.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        Self::new(read, Box::new(write))
    }
}

impl<W> LineChannel<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a channel and spawns its reader task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<R>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, inbound) = mpsc::channel(INBOUND_CAPACITY);
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_lines(reader, tx, Arc::clone(&closed)));
        Self {
            writer,
            inbound,
            closed,
            reader,
        }
    }
}

async fn read_lines<R>(reader: R, tx: mpsc::Sender<String>, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    loop {
        match lines.next().await {
            Some(Ok(line)) => {
                let line = line.trim_end_matches('\r').to_string();
                trace!(%line, "Line received");
                // Waits while the queue is full, which stops reading the socket.
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                warn!(limit = MAX_LINE_LENGTH, "Peer sent an over-long line, disconnecting");
                break;
            }
            Some(Err(LinesCodecError::Io(err))) => {
                debug!(error = %err, "Peer read failed");
                break;
            }
            None => {
                debug!("Peer closed connection");
                break;
            }
        }
    }
    closed.store(true, Ordering::Release);
}

#[async_trait]
impl<W> PeerChannel for LineChannel<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    #[instrument(skip(self, text))]
    async fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Disconnected);
        }
        let mut frame = String::with_capacity(text.len() + 1);
        frame.push_str(text);
        frame.push('\n');
        self.writer.write_all(frame.as_bytes()).await.map_err(|err| {
            debug!(error = %err, "Write failed");
            ChannelError::Disconnected
        })?;
        self.writer
            .flush()
            .await
            .map_err(|_| ChannelError::Disconnected)
    }

    async fn receive(&mut self, deadline: Duration) -> Result<String, ChannelError> {
        match tokio::time::timeout(deadline, self.inbound.recv()).await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(ChannelError::Disconnected),
            Err(_) => Err(ChannelError::Timeout),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn close(&mut self) {
        if let Err(err) = self.writer.shutdown().await {
            debug!(error = %err, "Shutdown after peer already gone");
        }
        self.reader.abort();
    }
}

impl<W> Drop for LineChannel<W> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

    type Client = (BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>);

    fn channel_pair() -> (LineChannel<WriteHalf<DuplexStream>>, Client) {
        let (server, client) = tokio::io::duplex(1024);
        let (server_read, server_write) = tokio::io::split(server);
        let (client_read, client_write) = tokio::io::split(client);
        (
            LineChannel::new(server_read, server_write),
            (BufReader::new(client_read), client_write),
        )
    }

    #[tokio::test]
    async fn test_send_appends_newline() {
        let (mut channel, (mut client_read, _client_write)) = channel_pair();
        channel.send("hello").await.unwrap();

        let mut line = String::new();
        client_read.read_line(&mut line).await.unwrap();
        assert_eq!(line, "hello\n");
    }

    #[tokio::test]
    async fn test_receive_strips_carriage_return() {
        let (mut channel, (_client_read, mut client_write)) = channel_pair();
        client_write.write_all(b"5\r\n").await.unwrap();

        let line = channel.receive(Duration::from_secs(5)).await.unwrap();
        assert_eq!(line, "5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_times_out() {
        let (mut channel, _client) = channel_pair();
        let result = channel.receive(Duration::from_secs(10)).await;
        assert_eq!(result, Err(ChannelError::Timeout));
        assert!(!channel.is_closed());
    }

    #[tokio::test]
    async fn test_buffered_lines_survive_disconnect() {
        let (mut channel, (client_read, mut client_write)) = channel_pair();
        client_write.write_all(b"7\n").await.unwrap();
        drop(client_write);
        drop(client_read);

        assert_eq!(channel.receive(Duration::from_secs(5)).await.unwrap(), "7");
        assert_eq!(
            channel.receive(Duration::from_secs(5)).await,
            Err(ChannelError::Disconnected)
        );
        assert!(channel.is_closed());
        assert_eq!(channel.send("anyone?").await, Err(ChannelError::Disconnected));
    }

    #[tokio::test]
    async fn test_over_long_line_disconnects() {
        let (mut channel, (_client_read, mut client_write)) = channel_pair();
        let flood = vec![b'7'; MAX_LINE_LENGTH * 2];
        client_write.write_all(&flood).await.unwrap();

        assert_eq!(
            channel.receive(Duration::from_secs(5)).await,
            Err(ChannelError::Disconnected)
        );
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_line_at_limit_is_accepted() {
        let (mut channel, (_client_read, mut client_write)) = channel_pair();
        let mut line = vec![b'1'; MAX_LINE_LENGTH];
        line.push(b'\n');
        client_write.write_all(&line).await.unwrap();

        let received = channel.receive(Duration::from_secs(5)).await.unwrap();
        assert_eq!(received.len(), MAX_LINE_LENGTH);
    }

    #[tokio::test]
    async fn test_queue_beyond_capacity_loses_nothing() {
        let (mut channel, (_client_read, mut client_write)) = channel_pair();
        let writer = tokio::spawn(async move {
            for n in 0..100 {
                client_write
                    .write_all(format!("{}\n", n).as_bytes())
                    .await
                    .unwrap();
            }
            client_write
        });

        for n in 0..100 {
            let line = channel.receive(Duration::from_secs(5)).await.unwrap();
            assert_eq!(line, n.to_string());
        }
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_from_stream_wraps_any_duplex() {
        let (server, client) = tokio::io::duplex(1024);
        let mut channel = NetChannel::from_stream(server);
        let (client_read, mut client_write) = tokio::io::split(client);

        client_write.write_all(b"bob\n").await.unwrap();
        assert_eq!(channel.receive(Duration::from_secs(5)).await.unwrap(), "bob");

        channel.send("Waiting for an opponent").await.unwrap();
        let mut line = String::new();
        BufReader::new(client_read).read_line(&mut line).await.unwrap();
        assert_eq!(line, "Waiting for an opponent\n");
    }
}
