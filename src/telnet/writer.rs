//! Outbound telnet framing.
//!
//! User data gets IAC bytes doubled; commands and subnegotiations are
//! framed verbatim. `write` reports the number of *input* bytes consumed,
//! not the escaped length on the wire.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::consts::{IAC, SB, SE};

pub struct TelnetWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> TelnetWriter<W> {
    pub fn new(inner: W) -> Self {
        TelnetWriter { inner }
    }

    /// Write user data, doubling any IAC bytes.
    pub async fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        if !data.contains(&IAC) {
            self.inner.write_all(data).await?;
            self.inner.flush().await?;
            return Ok(data.len());
        }

        let mut escaped = BytesMut::with_capacity(data.len() + data.len() / 10);
        for &b in data {
            escaped.put_u8(b);
            if b == IAC {
                escaped.put_u8(IAC);
            }
        }
        self.inner.write_all(&escaped).await?;
        self.inner.flush().await?;
        Ok(data.len())
    }

    /// Send `IAC <cmds...>`, e.g. `write_command(&[WILL, ECHO])`.
    pub async fn write_command(&mut self, cmds: &[u8]) -> std::io::Result<()> {
        let mut frame = BytesMut::with_capacity(1 + cmds.len());
        frame.put_u8(IAC);
        frame.put_slice(cmds);
        self.inner.write_all(&frame).await?;
        self.inner.flush().await
    }

    /// Send `IAC SB <opt> <data> IAC SE`. The payload is written verbatim.
    pub async fn write_subnegotiation(&mut self, opt: u8, data: &[u8]) -> std::io::Result<()> {
        let mut frame = BytesMut::with_capacity(5 + data.len());
        frame.put_slice(&[IAC, SB, opt]);
        frame.put_slice(data);
        frame.put_slice(&[IAC, SE]);
        self.inner.write_all(&frame).await?;
        self.inner.flush().await
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.inner.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telnet::consts::{ECHO, WILL};
    use crate::telnet::reader::TelnetReader;

    #[tokio::test]
    async fn plain_data_unchanged() {
        let mut sink = Vec::new();
        let mut writer = TelnetWriter::new(&mut sink);
        let n = writer.write(b"hello").await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(sink, b"hello");
    }

    #[tokio::test]
    async fn iac_bytes_doubled_but_input_count_reported() {
        let mut sink = Vec::new();
        let mut writer = TelnetWriter::new(&mut sink);
        let n = writer.write(&[0x01, IAC, 0x02]).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(sink, vec![0x01, IAC, IAC, 0x02]);
    }

    #[tokio::test]
    async fn command_framing() {
        let mut sink = Vec::new();
        let mut writer = TelnetWriter::new(&mut sink);
        writer.write_command(&[WILL, ECHO]).await.unwrap();
        assert_eq!(sink, vec![IAC, WILL, ECHO]);
    }

    #[tokio::test]
    async fn subnegotiation_framing() {
        let mut sink = Vec::new();
        let mut writer = TelnetWriter::new(&mut sink);
        writer.write_subnegotiation(24, &[1]).await.unwrap();
        assert_eq!(sink, vec![IAC, SB, 24, 1, IAC, SE]);
    }

    #[tokio::test]
    async fn escaper_round_trips_through_reader() {
        // Writer escaping fed straight into the demuxer must reproduce the
        // original bytes for any input.
        let cases: Vec<Vec<u8>> = vec![
            b"plain".to_vec(),
            vec![IAC],
            vec![IAC, IAC, IAC],
            vec![0x00, IAC, 0x7F, IAC],
            (0u8..=255).collect(),
        ];
        for input in cases {
            let mut sink = Vec::new();
            let mut writer = TelnetWriter::new(&mut sink);
            writer.write(&input).await.unwrap();

            let mut reader = TelnetReader::new();
            reader.feed(&sink);
            assert!(reader.process().is_empty());
            let mut out = vec![0u8; reader.available()];
            reader.take(&mut out);
            assert_eq!(out, input);
        }
    }
}
