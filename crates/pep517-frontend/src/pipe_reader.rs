//! A `\r\n`-terminated line reader.
//!
//! This is the framing the backend host's request loop reads its stdin with (see
//! `host.py`'s `read_line`). It is exposed here, tested against the exact scenarios the
//! protocol design is built around, so `WireCodec`'s request encoding can be checked for
//! a true round trip without spawning a Python process.

use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A complete line, or whatever was accumulated before EOF cut it short.
    Data(Vec<u8>),
    /// EOF reached before any bytes were read at all.
    EndOfStream,
}

#[derive(Debug)]
pub struct PipeReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> PipeReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read one line, stripping the trailing `\r\n`.
    pub async fn read_line(&mut self) -> std::io::Result<Line> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.inner.read(&mut byte).await?;
            if n == 0 {
                return Ok(if buf.is_empty() {
                    Line::EndOfStream
                } else {
                    Line::Data(buf)
                });
            }
            if byte[0] == b'\n' && buf.last() == Some(&b'\r') {
                buf.pop();
                return Ok(Line::Data(buf));
            }
            buf.push(byte[0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt};

    #[tokio::test]
    async fn reads_crlf_terminated_line() {
        let (mut w, r) = duplex(64);
        w.write_all(b"this is a line\r\n").await.unwrap();
        drop(w);
        let mut reader = PipeReader::new(r);
        assert_eq!(
            reader.read_line().await.unwrap(),
            Line::Data(b"this is a line".to_vec())
        );
    }

    #[tokio::test]
    async fn eof_mid_line_returns_partial_buffer() {
        let (mut w, r) = duplex(64);
        w.write_all(b"this is a line").await.unwrap();
        drop(w);
        let mut reader = PipeReader::new(r);
        assert_eq!(
            reader.read_line().await.unwrap(),
            Line::Data(b"this is a line".to_vec())
        );
    }

    #[tokio::test]
    async fn eof_at_start_signals_end_of_stream() {
        let (w, r) = duplex(64);
        drop(w);
        let mut reader = PipeReader::new(r);
        assert_eq!(reader.read_line().await.unwrap(), Line::EndOfStream);
    }

    #[tokio::test]
    async fn bare_lf_is_not_a_terminator() {
        let (mut w, r) = duplex(64);
        w.write_all(b"a\nb\r\n").await.unwrap();
        drop(w);
        let mut reader = PipeReader::new(r);
        assert_eq!(reader.read_line().await.unwrap(), Line::Data(b"a\nb".to_vec()));
    }
}
