//! Inbound telnet stream demultiplexer.
//!
//! Splits a raw byte stream into user data and protocol events. Two buffers:
//! `raw` holds socket bytes not yet classified, `ready` holds user data
//! waiting for the application. After [`TelnetReader::process`], `raw`
//! contains at most one incomplete escape sequence and `ready` contains only
//! post-escape user data in stream order.

use bytes::{Buf, Bytes, BytesMut};

use super::consts::{DO, DONT, IAC, SB, SE, WILL, WONT};

/// A protocol event lifted out of the data stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// `IAC <cmd>` or `IAC <WILL|WONT|DO|DONT> <opt>`; plain commands carry
    /// option 0.
    Command { cmd: u8, opt: u8 },
    /// `IAC SB <opt> <data> IAC SE`.
    SubNegotiation { opt: u8, data: Bytes },
}

#[derive(Debug, Default)]
pub struct TelnetReader {
    raw: BytesMut,
    ready: BytesMut,
}

impl TelnetReader {
    pub fn new() -> Self {
        TelnetReader::default()
    }

    /// Append freshly read socket bytes.
    pub fn feed(&mut self, data: &[u8]) {
        self.raw.extend_from_slice(data);
    }

    /// Bytes of user data currently available.
    pub fn available(&self) -> usize {
        self.ready.len()
    }

    /// Move up to `buf.len()` bytes of decoded user data out.
    pub fn take(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.ready.len());
        buf[..n].copy_from_slice(&self.ready[..n]);
        self.ready.advance(n);
        n
    }

    /// Scan `raw`, moving user data to `ready` and lifting out protocol
    /// events. Returns the events in stream order. A partial escape at the
    /// end of the buffer is left in place for the next feed.
    pub fn process(&mut self) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();

        loop {
            let Some(iac_index) = self.raw.iter().position(|&b| b == IAC) else {
                // No IAC: everything is user data.
                let rest = self.raw.split();
                self.ready.unsplit(rest);
                return events;
            };

            if iac_index > 0 {
                let data = self.raw.split_to(iac_index);
                self.ready.unsplit(data);
            }

            // raw[0] is IAC; is the command byte here yet?
            if self.raw.len() < 2 {
                return events;
            }
            let cmd = self.raw[1];

            match cmd {
                // Escaped 0xFF data byte.
                IAC => {
                    self.ready.extend_from_slice(&[IAC]);
                    self.raw.advance(2);
                }
                WILL | WONT | DO | DONT => {
                    if self.raw.len() < 3 {
                        return events;
                    }
                    let opt = self.raw[2];
                    events.push(ProtocolEvent::Command { cmd, opt });
                    self.raw.advance(3);
                }
                SB => {
                    // IAC SB OPT ... IAC SE
                    let Some(se_index) = self
                        .raw
                        .windows(2)
                        .position(|w| w == [IAC, SE])
                    else {
                        return events;
                    };
                    if se_index < 3 {
                        // Degenerate "IAC SB IAC SE": no option byte, drop it.
                        self.raw.advance(se_index + 2);
                        continue;
                    }
                    let opt = self.raw[2];
                    let data = Bytes::copy_from_slice(&self.raw[3..se_index]);
                    events.push(ProtocolEvent::SubNegotiation { opt, data });
                    self.raw.advance(se_index + 2);
                }
                _ => {
                    events.push(ProtocolEvent::Command { cmd, opt: 0 });
                    self.raw.advance(2);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telnet::consts::{AYT, ECHO, NAWS};

    fn drain(reader: &mut TelnetReader) -> Vec<u8> {
        let mut buf = vec![0u8; reader.available()];
        reader.take(&mut buf);
        buf
    }

    #[test]
    fn plain_data_passes_through() {
        let mut reader = TelnetReader::new();
        reader.feed(b"hello");
        assert!(reader.process().is_empty());
        assert_eq!(drain(&mut reader), b"hello");
    }

    #[test]
    fn escaped_iac_becomes_single_byte() {
        let mut reader = TelnetReader::new();
        reader.feed(&[b'a', IAC, IAC, b'b']);
        assert!(reader.process().is_empty());
        assert_eq!(drain(&mut reader), &[b'a', 0xFF, b'b']);
    }

    #[test]
    fn negotiation_command_is_lifted_out() {
        let mut reader = TelnetReader::new();
        reader.feed(&[b'x', IAC, DO, ECHO, b'y']);
        let events = reader.process();
        assert_eq!(events, vec![ProtocolEvent::Command { cmd: DO, opt: ECHO }]);
        assert_eq!(drain(&mut reader), b"xy");
    }

    #[test]
    fn simple_command_consumes_two_bytes() {
        let mut reader = TelnetReader::new();
        reader.feed(&[IAC, AYT]);
        let events = reader.process();
        assert_eq!(events, vec![ProtocolEvent::Command { cmd: AYT, opt: 0 }]);
        assert_eq!(reader.available(), 0);
    }

    #[test]
    fn subnegotiation_payload_extracted() {
        let mut reader = TelnetReader::new();
        reader.feed(&[IAC, SB, NAWS, 0x00, 0x50, 0x00, 0x18, IAC, SE]);
        let events = reader.process();
        assert_eq!(
            events,
            vec![ProtocolEvent::SubNegotiation {
                opt: NAWS,
                data: Bytes::from_static(&[0x00, 0x50, 0x00, 0x18]),
            }]
        );
    }

    #[test]
    fn partial_sequences_wait_for_more_bytes() {
        let mut reader = TelnetReader::new();

        reader.feed(&[IAC]);
        assert!(reader.process().is_empty());

        reader.feed(&[DO]);
        assert!(reader.process().is_empty());

        reader.feed(&[ECHO]);
        assert_eq!(
            reader.process(),
            vec![ProtocolEvent::Command { cmd: DO, opt: ECHO }]
        );
    }

    #[test]
    fn partial_subnegotiation_waits_for_terminator() {
        let mut reader = TelnetReader::new();
        reader.feed(&[IAC, SB, NAWS, 0x00, 0x50]);
        assert!(reader.process().is_empty());

        reader.feed(&[0x00, 0x18, IAC, SE, b'z']);
        let events = reader.process();
        assert_eq!(events.len(), 1);
        assert_eq!(drain(&mut reader), b"z");
    }
}
