//! Telnet connection: option negotiation and the read/write surface.
//!
//! Each accepted socket gets wrapped here. The reader-driven negotiation
//! handler owns the option state; replies it generates share the same
//! writer lock as session output, so the two write sources never
//! interleave mid-frame.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use super::consts::{
    command_name, option_name, AO, AYT, BRK, DO, DONT, ECHO, IP, IS, NAWS, SEND, SGA,
    TRANSMIT_BINARY, TTYPE, WILL, WONT,
};
use super::reader::{ProtocolEvent, TelnetReader};
use super::writer::TelnetWriter;
use crate::logutil::escape_log;
use crate::nodes::{Connection, TerminalInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptionState {
    Disabled,
    Enabled,
}

/// Per-connection negotiation state. `sent_will` / `sent_do` suppress
/// request loops: a WILL/DO for an option goes out at most once until the
/// matching WONT/DONT clears it.
#[derive(Debug, Default)]
struct OptionTable {
    local: HashMap<u8, OptionState>,
    remote: HashMap<u8, OptionState>,
    sent_will: HashSet<u8>,
    sent_do: HashSet<u8>,
}

struct ReadState<S> {
    sock: ReadHalf<S>,
    demux: TelnetReader,
}

pub struct TelnetConnection<S> {
    peer: SocketAddr,
    read: Mutex<ReadState<S>>,
    writer: Mutex<TelnetWriter<WriteHalf<S>>>,
    options: StdMutex<OptionTable>,
    info: StdRwLock<TerminalInfo>,
}

impl<S: AsyncRead + AsyncWrite + Send + 'static> TelnetConnection<S> {
    pub fn new(stream: S, peer: SocketAddr) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        TelnetConnection {
            peer,
            read: Mutex::new(ReadState {
                sock: read_half,
                demux: TelnetReader::new(),
            }),
            writer: Mutex::new(TelnetWriter::new(write_half)),
            options: StdMutex::new(OptionTable::default()),
            info: StdRwLock::new(TerminalInfo::default()),
        }
    }

    /// Kick off the server side of the handshake: we will echo and
    /// suppress go-ahead, and we want the peer's window size and terminal
    /// type.
    pub async fn begin_negotiation(&self) -> std::io::Result<()> {
        self.send_will(ECHO).await?;
        self.send_will(SGA).await?;
        self.send_do(NAWS).await?;
        self.send_do(TTYPE).await?;
        Ok(())
    }

    pub fn is_local_option_enabled(&self, opt: u8) -> bool {
        let table = self.options.lock().expect("option table lock poisoned");
        table.local.get(&opt) == Some(&OptionState::Enabled)
    }

    pub fn is_remote_option_enabled(&self, opt: u8) -> bool {
        let table = self.options.lock().expect("option table lock poisoned");
        table.remote.get(&opt) == Some(&OptionState::Enabled)
    }

    pub fn enable_local_option(&self, opt: u8) {
        self.set_option(opt, OptionState::Enabled, true);
    }

    pub fn disable_local_option(&self, opt: u8) {
        self.set_option(opt, OptionState::Disabled, true);
    }

    pub fn enable_remote_option(&self, opt: u8) {
        self.set_option(opt, OptionState::Enabled, false);
    }

    pub fn disable_remote_option(&self, opt: u8) {
        self.set_option(opt, OptionState::Disabled, false);
    }

    fn set_option(&self, opt: u8, state: OptionState, local: bool) {
        let mut table = self.options.lock().expect("option table lock poisoned");
        let side = if local {
            &mut table.local
        } else {
            &mut table.remote
        };
        side.insert(opt, state);
    }

    /// Send `IAC WILL <opt>` unless one is already outstanding.
    pub async fn send_will(&self, opt: u8) -> std::io::Result<()> {
        {
            let mut table = self.options.lock().expect("option table lock poisoned");
            if !table.sent_will.insert(opt) {
                return Ok(());
            }
        }
        self.log_command("OUT", WILL, opt);
        self.writer.lock().await.write_command(&[WILL, opt]).await
    }

    /// Send `IAC WONT <opt>`, clearing the WILL suppression flag so a later
    /// re-negotiation can go out.
    pub async fn send_wont(&self, opt: u8) -> std::io::Result<()> {
        {
            let mut table = self.options.lock().expect("option table lock poisoned");
            table.sent_will.remove(&opt);
        }
        self.log_command("OUT", WONT, opt);
        self.writer.lock().await.write_command(&[WONT, opt]).await
    }

    /// Send `IAC DO <opt>` unless one is already outstanding.
    pub async fn send_do(&self, opt: u8) -> std::io::Result<()> {
        {
            let mut table = self.options.lock().expect("option table lock poisoned");
            if !table.sent_do.insert(opt) {
                return Ok(());
            }
        }
        self.log_command("OUT", DO, opt);
        self.writer.lock().await.write_command(&[DO, opt]).await
    }

    /// Send `IAC DONT <opt>`, clearing the DO suppression flag.
    pub async fn send_dont(&self, opt: u8) -> std::io::Result<()> {
        {
            let mut table = self.options.lock().expect("option table lock poisoned");
            table.sent_do.remove(&opt);
        }
        self.log_command("OUT", DONT, opt);
        self.writer.lock().await.write_command(&[DONT, opt]).await
    }

    pub async fn send_subnegotiation(&self, opt: u8, data: &[u8]) -> std::io::Result<()> {
        debug!(
            "telnet subnegotiation [OUT] opt={} len={}",
            option_name(opt),
            data.len()
        );
        self.writer
            .lock()
            .await
            .write_subnegotiation(opt, data)
            .await
    }

    async fn handle_event(&self, event: ProtocolEvent) -> std::io::Result<()> {
        match event {
            ProtocolEvent::Command { cmd, opt } => self.handle_command(cmd, opt).await,
            ProtocolEvent::SubNegotiation { opt, data } => {
                self.handle_subnegotiation(opt, &data);
                Ok(())
            }
        }
    }

    async fn handle_command(&self, cmd: u8, opt: u8) -> std::io::Result<()> {
        self.log_command("IN", cmd, opt);

        match cmd {
            DO => match opt {
                ECHO | SGA | TRANSMIT_BINARY => {
                    if !self.is_local_option_enabled(opt) {
                        self.enable_local_option(opt);
                        self.send_will(opt).await?;
                    }
                }
                _ => self.send_wont(opt).await?,
            },
            DONT => match opt {
                ECHO => {
                    if self.is_local_option_enabled(ECHO) {
                        self.disable_local_option(ECHO);
                        self.send_wont(ECHO).await?;
                    }
                }
                _ => {
                    self.disable_local_option(opt);
                    self.send_wont(opt).await?;
                }
            },
            WILL => match opt {
                SGA | TRANSMIT_BINARY => {
                    if !self.is_remote_option_enabled(opt) {
                        self.enable_remote_option(opt);
                        self.send_do(opt).await?;
                    }
                }
                NAWS => {
                    if !self.is_remote_option_enabled(NAWS) {
                        self.enable_remote_option(NAWS);
                        self.send_do(NAWS).await?;
                        // The peer volunteers SB NAWS on its own after this.
                    }
                }
                TTYPE => {
                    if !self.is_remote_option_enabled(TTYPE) {
                        self.enable_remote_option(TTYPE);
                        self.send_do(TTYPE).await?;
                        // Terminal type must be asked for explicitly.
                        self.send_subnegotiation(TTYPE, &[SEND]).await?;
                    }
                }
                _ => self.send_dont(opt).await?,
            },
            WONT => {
                if self.is_remote_option_enabled(opt) {
                    self.disable_remote_option(opt);
                    self.send_dont(opt).await?;
                }
            }
            AYT => {
                self.writer.lock().await.write(b"\r\n[Yes]\r\n").await?;
            }
            IP => info!("telnet IP (interrupt process) received"),
            AO => info!("telnet AO (abort output) received"),
            BRK => info!("telnet BRK (break) received"),
            _ => {}
        }
        Ok(())
    }

    fn handle_subnegotiation(&self, opt: u8, data: &[u8]) {
        debug!(
            "telnet subnegotiation [IN] opt={} len={}",
            option_name(opt),
            data.len()
        );

        match opt {
            NAWS => {
                // RFC 1073: 16-bit width, 16-bit height, big endian.
                if data.len() < 4 {
                    warn!("telnet NAWS payload too short len={}", data.len());
                    return;
                }
                let width = u16::from_be_bytes([data[0], data[1]]);
                let height = u16::from_be_bytes([data[2], data[3]]);
                {
                    let mut info = self.info.write().expect("terminal info lock poisoned");
                    info.width = width;
                    info.height = height;
                }
                debug!("telnet window size dims={width}x{height}");
            }
            TTYPE => {
                // RFC 1091: IS followed by the terminal type string.
                if data.len() > 1 && data[0] == IS {
                    let ttype = String::from_utf8_lossy(&data[1..]).into_owned();
                    debug!("telnet terminal type type={}", escape_log(&ttype));
                    let mut info = self.info.write().expect("terminal info lock poisoned");
                    info.term_type = ttype;
                } else {
                    warn!("telnet TTYPE payload malformed len={}", data.len());
                }
            }
            _ => {}
        }
    }

    fn log_command(&self, direction: &str, cmd: u8, opt: u8) {
        debug!(
            "telnet command [{direction}] cmd={} opt={}",
            command_name(cmd),
            option_name(opt)
        );
    }

    /// Watch for negotiation to settle (terminal type and window size both
    /// reported), then log one connection summary. Gives up after `timeout`
    /// and logs whatever arrived.
    pub fn start_negotiation_logger(self: &Arc<Self>, timeout: Duration) {
        let conn = Arc::clone(self);
        tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + timeout;
            let mut poll = tokio::time::interval(Duration::from_millis(100));
            loop {
                if tokio::time::Instant::now() >= deadline {
                    break;
                }
                let settled = {
                    let info = conn.info.read().expect("terminal info lock poisoned");
                    !info.term_type.is_empty() && info.width > 0
                };
                if settled {
                    break;
                }
                poll.tick().await;
            }
            conn.log_connection_info();
        });
    }

    fn log_connection_info(&self) {
        let info = self.info.read().expect("terminal info lock poisoned");
        let ttype = if info.term_type.is_empty() {
            "UNKNOWN".to_string()
        } else {
            escape_log(&info.term_type)
        };
        let dims = if info.width == 0 || info.height == 0 {
            "UNKNOWN".to_string()
        } else {
            format!("{}x{}", info.width, info.height)
        };
        info!(
            "telnet connection established addr={} terminal={ttype} window={dims}",
            self.peer
        );
    }
}

#[async_trait]
impl<S: AsyncRead + AsyncWrite + Send + 'static> Connection for TelnetConnection<S> {
    /// Read user data, transparently servicing protocol traffic. Blocks
    /// until data arrives; `Ok(0)` means the peer hung up.
    async fn read(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = self.read.lock().await;
        loop {
            if state.demux.available() > 0 {
                return Ok(state.demux.take(buf));
            }

            let mut chunk = [0u8; 4096];
            let n = state.sock.read(&mut chunk).await?;
            if n == 0 {
                return Ok(0);
            }
            state.demux.feed(&chunk[..n]);
            for event in state.demux.process() {
                self.handle_event(event).await?;
            }
        }
    }

    async fn write(&self, data: &[u8]) -> std::io::Result<usize> {
        self.writer.lock().await.write(data).await
    }

    async fn send_line(&self, msg: &str) -> std::io::Result<()> {
        let mut line = msg.as_bytes().to_vec();
        line.extend_from_slice(b"\r\n");
        self.writer.lock().await.write(&line).await.map(|_| ())
    }

    async fn close(&self) {
        let _ = self.writer.lock().await.shutdown().await;
    }

    fn remote_addr(&self) -> SocketAddr {
        self.peer
    }

    fn terminal_info(&self) -> TerminalInfo {
        self.info.read().expect("terminal info lock poisoned").clone()
    }

    /// Telnet callers are assumed to be legacy terminals that want
    /// code-page-native bytes.
    fn is_utf8(&self) -> bool {
        false
    }
}
