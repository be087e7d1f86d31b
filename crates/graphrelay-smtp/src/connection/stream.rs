//! Low-level SMTP stream handling.

use crate::error::Result;
use crate::types::Reply;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum bytes read per step while collecting DATA.
const DATA_CHUNK: u64 = 8 * 1024;

/// Result of reading one command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A complete line without its line ending.
    Text(String),
    /// The line exceeded the limit; the excess has been discarded.
    TooLong,
    /// The peer closed the connection.
    Eof,
}

/// Result of reading a DATA body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataBody {
    /// The complete, dot-unstuffed message.
    Complete(Vec<u8>),
    /// The message exceeded the size limit; it was read to the terminator
    /// and discarded.
    TooLarge,
    /// The peer closed the connection before the terminator.
    Eof,
}

/// Buffered SMTP stream over any duplex transport.
#[derive(Debug)]
pub struct SmtpStream<S> {
    inner: BufReader<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SmtpStream<S> {
    /// Wraps a transport.
    pub fn new(stream: S) -> Self {
        Self {
            inner: BufReader::new(stream),
        }
    }

    /// Reads a command line of at most `limit` bytes including CRLF.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn read_line(&mut self, limit: usize) -> Result<Line> {
        let mut buf = Vec::new();
        let n = (&mut self.inner)
            .take(limit as u64)
            .read_until(b'\n', &mut buf)
            .await?;

        if n == 0 {
            return Ok(Line::Eof);
        }

        if !buf.ends_with(b"\n") {
            if n < limit {
                // EOF in the middle of a line
                return Ok(Line::Eof);
            }
            self.discard_line().await?;
            return Ok(Line::TooLong);
        }

        let text = String::from_utf8_lossy(&buf);
        Ok(Line::Text(text.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Skips input up to and including the next LF.
    async fn discard_line(&mut self) -> Result<()> {
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            if let Some(pos) = available.iter().position(|&b| b == b'\n') {
                self.inner.consume(pos + 1);
                return Ok(());
            }
            let len = available.len();
            self.inner.consume(len);
        }
    }

    /// Reads a DATA body up to the `.` terminator line, removing
    /// dot-stuffing (RFC 5321 section 4.5.2).
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn read_data(&mut self, max_bytes: usize) -> Result<DataBody> {
        let mut body = Vec::new();
        let mut chunk = Vec::new();
        let mut at_line_start = true;
        let mut too_large = false;

        loop {
            chunk.clear();
            let n = (&mut self.inner)
                .take(DATA_CHUNK)
                .read_until(b'\n', &mut chunk)
                .await?;
            if n == 0 {
                return Ok(DataBody::Eof);
            }

            if at_line_start && matches!(chunk.as_slice(), b".\r\n" | b".\n") {
                break;
            }

            let content = if at_line_start && chunk.starts_with(b".") {
                &chunk[1..]
            } else {
                &chunk[..]
            };

            if !too_large {
                if body.len() + content.len() > max_bytes {
                    too_large = true;
                    body = Vec::new();
                } else {
                    body.extend_from_slice(content);
                }
            }

            at_line_start = chunk.ends_with(b"\n");
        }

        Ok(if too_large {
            DataBody::TooLarge
        } else {
            DataBody::Complete(body)
        })
    }

    /// Writes a reply and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_reply(&mut self, reply: &Reply) -> Result<()> {
        let stream = self.inner.get_mut();
        stream.write_all(&reply.to_wire()).await?;
        stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;
    use crate::types::ReplyCode;
    use tokio::io::duplex;

    async fn stream_with(input: &[u8]) -> SmtpStream<tokio::io::DuplexStream> {
        let (client, server) = duplex(64 * 1024);
        let mut client = client;
        client.write_all(input).await.unwrap();
        drop(client);
        SmtpStream::new(server)
    }

    #[tokio::test]
    async fn test_read_lines() {
        let mut stream = stream_with(b"EHLO a\r\nNOOP\n").await;
        assert_eq!(stream.read_line(512).await.unwrap(), Line::Text("EHLO a".into()));
        assert_eq!(stream.read_line(512).await.unwrap(), Line::Text("NOOP".into()));
        assert_eq!(stream.read_line(512).await.unwrap(), Line::Eof);
    }

    #[tokio::test]
    async fn test_line_too_long_is_discarded() {
        let mut input = vec![b'A'; 100];
        input.extend_from_slice(b"\r\nQUIT\r\n");
        let mut stream = stream_with(&input).await;
        assert_eq!(stream.read_line(20).await.unwrap(), Line::TooLong);
        assert_eq!(stream.read_line(20).await.unwrap(), Line::Text("QUIT".into()));
    }

    #[tokio::test]
    async fn test_partial_line_at_eof() {
        let mut stream = stream_with(b"QUI").await;
        assert_eq!(stream.read_line(512).await.unwrap(), Line::Eof);
    }

    #[tokio::test]
    async fn test_read_data_unstuffs_dots() {
        let mut stream =
            stream_with(b"Subject: x\r\n\r\n..leading dot\r\n.\r\nQUIT\r\n").await;
        let body = stream.read_data(1024).await.unwrap();
        assert_eq!(
            body,
            DataBody::Complete(b"Subject: x\r\n\r\n.leading dot\r\n".to_vec())
        );
        assert_eq!(stream.read_line(512).await.unwrap(), Line::Text("QUIT".into()));
    }

    #[tokio::test]
    async fn test_read_data_too_large() {
        let mut stream = stream_with(b"0123456789\r\n0123456789\r\n.\r\nNOOP\r\n").await;
        assert_eq!(stream.read_data(15).await.unwrap(), DataBody::TooLarge);
        assert_eq!(stream.read_line(512).await.unwrap(), Line::Text("NOOP".into()));
    }

    #[tokio::test]
    async fn test_read_data_eof() {
        let mut stream = stream_with(b"partial message\r\n").await;
        assert_eq!(stream.read_data(1024).await.unwrap(), DataBody::Eof);
    }

    #[tokio::test]
    async fn test_long_data_line_is_not_a_terminator() {
        let mut input = vec![b'x'; 20_000];
        input.extend_from_slice(b".\r\n.\r\n");
        let mut stream = stream_with(&input).await;
        let DataBody::Complete(body) = stream.read_data(1 << 20).await.unwrap() else {
            panic!("expected complete body");
        };
        assert_eq!(body.len(), 20_003);
        assert!(body.ends_with(b"x.\r\n"));
    }

    #[tokio::test]
    async fn test_write_reply() {
        let (client, server) = duplex(1024);
        let mut stream = SmtpStream::new(server);
        stream
            .write_reply(&Reply::single(ReplyCode::SERVICE_READY, "ready"))
            .await
            .unwrap();
        drop(stream);

        let mut client = client;
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "220 ready\r\n");
    }
}
