use anyhow::Context;
use async_trait::async_trait;
use hww_codec::{LineDecoder, encode_line};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::{trace, warn};

use crate::error::ChannelError;

const READ_CHUNK: usize = 1024;

/// Receiving half of a byte link.
#[async_trait]
pub trait LinkReader: Send {
    /// Next chunk of bytes. An empty chunk means the peer closed the link.
    async fn read(&mut self) -> anyhow::Result<Vec<u8>>;
}

/// Sending half of a byte link.
#[async_trait]
pub trait LinkWriter: Send {
    async fn write(&mut self, chunk: &[u8]) -> anyhow::Result<()>;
    async fn close(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
impl<T: LinkReader + ?Sized> LinkReader for Box<T> {
    async fn read(&mut self) -> anyhow::Result<Vec<u8>> {
        (**self).read().await
    }
}

#[async_trait]
impl<T: LinkWriter + ?Sized> LinkWriter for Box<T> {
    async fn write(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
        (**self).write(chunk).await
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        (**self).close().await
    }
}

/// Adapts any tokio reader (tty file, TCP half, duplex pipe) to [`LinkReader`].
pub struct StreamReader<R> {
    inner: R,
    buf: Box<[u8]>,
}

impl<R> StreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: vec![0u8; READ_CHUNK].into_boxed_slice(),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> LinkReader for StreamReader<R> {
    async fn read(&mut self) -> anyhow::Result<Vec<u8>> {
        let n = self
            .inner
            .read(&mut self.buf)
            .await
            .context("link read failed")?;
        Ok(self.buf[..n].to_vec())
    }
}

/// Adapts any tokio writer to [`LinkWriter`].
pub struct StreamWriter<W> {
    inner: W,
}

impl<W> StreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> LinkWriter for StreamWriter<W> {
    async fn write(&mut self, chunk: &[u8]) -> anyhow::Result<()> {
        self.inner
            .write_all(chunk)
            .await
            .context("link write failed")?;
        self.inner.flush().await.context("link flush failed")?;
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.inner.shutdown().await.context("link shutdown failed")
    }
}

pub fn split_stream<S>(stream: S) -> (StreamReader<ReadHalf<S>>, StreamWriter<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite,
{
    let (read, write) = tokio::io::split(stream);
    (StreamReader::new(read), StreamWriter::new(write))
}

/// Yields complete text lines from a [`LinkReader`].
pub struct LineReader<L> {
    link: L,
    decoder: LineDecoder,
    closed: bool,
}

impl<L: LinkReader> LineReader<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            decoder: LineDecoder::new(),
            closed: false,
        }
    }

    /// Next line, or `Ok(None)` once the link is closed and drained.
    ///
    /// Undecodable lines are dropped with a warning. A read failure is
    /// returned once; later calls report the link as closed.
    pub async fn next_line(&mut self) -> Result<Option<String>, ChannelError> {
        loop {
            match self.decoder.try_next() {
                Ok(Some(line)) => return Ok(Some(line)),
                Ok(None) => {}
                Err(err) => {
                    warn!(%err, "dropping undecodable line");
                    continue;
                }
            }

            if self.closed {
                if self.decoder.pending() > 0 {
                    trace!(bytes = self.decoder.pending(), "discarding unterminated tail");
                }
                return Ok(None);
            }

            match self.link.read().await {
                Ok(chunk) if chunk.is_empty() => self.closed = true,
                Ok(chunk) => self.decoder.push(&chunk),
                Err(err) => {
                    self.closed = true;
                    return Err(ChannelError::Link(err));
                }
            }
        }
    }

    pub fn into_inner(self) -> L {
        self.link
    }
}

/// Writes newline-terminated lines to a [`LinkWriter`].
pub struct LineWriter<W> {
    link: W,
}

impl<W: LinkWriter> LineWriter<W> {
    pub fn new(link: W) -> Self {
        Self { link }
    }

    pub async fn write_line(&mut self, line: &str) -> Result<(), ChannelError> {
        self.link.write(&encode_line(line)).await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), ChannelError> {
        self.link.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_cross_a_duplex_pipe() {
        let (host, device) = tokio::io::duplex(64);
        let (_, host_writer) = split_stream(host);
        let (device_reader, _) = split_stream(device);

        let mut writer = LineWriter::new(host_writer);
        let mut reader = LineReader::new(device_reader);

        writer.write_line("LOG one").await.unwrap();
        writer.write_line("LOG two").await.unwrap();

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("LOG one"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("LOG two"));
    }

    #[tokio::test]
    async fn closed_link_drains_then_ends() {
        let (host, device) = tokio::io::duplex(64);
        let mut reader = LineReader::new(StreamReader::new(device));

        let mut host = StreamWriter::new(host);
        host.write(b"LOG last\npartial").await.unwrap();
        host.close().await.unwrap();

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("LOG last"));
        assert_eq!(reader.next_line().await.unwrap(), None);
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    struct FailingReader;

    #[async_trait]
    impl LinkReader for FailingReader {
        async fn read(&mut self) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("port unplugged")
        }
    }

    #[tokio::test]
    async fn read_error_is_reported_once() {
        let mut reader = LineReader::new(FailingReader);
        assert!(matches!(
            reader.next_line().await,
            Err(ChannelError::Link(_))
        ));
        assert_eq!(reader.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn bad_lines_are_skipped() {
        let (host, device) = tokio::io::duplex(64);
        let mut reader = LineReader::new(StreamReader::new(device));
        let mut host = StreamWriter::new(host);
        host.write(&[0xff, b'\n']).await.unwrap();
        host.write(b"LOG fine\n").await.unwrap();
        host.close().await.unwrap();

        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("LOG fine"));
    }
}
