//! Telnet protocol constants (RFC 854 and friends).
//!
//! This implementation aims to be "complete enough" for what BBS and MUD
//! clients actually send, not a general telnet stack. Options outside the
//! accepted set are refused during negotiation.
//!
//! RFCs of interest: 854 (protocol), 856 (binary), 857 (echo), 858
//! (suppress go-ahead), 1073 (window size), 1091 (terminal type).

// Commands.
pub const SE: u8 = 240; // Subnegotiation End
pub const NOP: u8 = 241;
pub const DM: u8 = 242; // Data Mark
pub const BRK: u8 = 243; // Break
pub const IP: u8 = 244; // Interrupt Process
pub const AO: u8 = 245; // Abort Output
pub const AYT: u8 = 246; // Are You There?
pub const EC: u8 = 247; // Erase Character
pub const EL: u8 = 248; // Erase Line
pub const GA: u8 = 249; // Go Ahead
pub const SB: u8 = 250; // Subnegotiation Begin
pub const WILL: u8 = 251;
pub const WONT: u8 = 252;
pub const DO: u8 = 253;
pub const DONT: u8 = 254;
pub const IAC: u8 = 255; // Interpret As Command

// Subnegotiation verbs.
pub const IS: u8 = 0;
pub const SEND: u8 = 1;

// Options.
pub const TRANSMIT_BINARY: u8 = 0; // RFC 856
pub const ECHO: u8 = 1; // RFC 857
pub const SGA: u8 = 3; // RFC 858
pub const STATUS: u8 = 5; // RFC 859
pub const TIMING_MARK: u8 = 6; // RFC 860
pub const TTYPE: u8 = 24; // RFC 1091
pub const EOR: u8 = 25; // RFC 885
pub const NAWS: u8 = 31; // RFC 1073
pub const TERMINAL_SPEED: u8 = 32; // RFC 1079
pub const LINEMODE: u8 = 34; // RFC 1184
pub const NEW_ENVIRON: u8 = 39; // RFC 1572
pub const MSSP: u8 = 70; // MUD Server Status Protocol
pub const GMCP: u8 = 201; // Generic MUD Communication Protocol

/// Human-readable command name for log lines.
pub fn command_name(cmd: u8) -> &'static str {
    match cmd {
        SE => "SE",
        NOP => "NOP",
        DM => "DM",
        BRK => "BRK",
        IP => "IP",
        AO => "AO",
        AYT => "AYT",
        EC => "EC",
        EL => "EL",
        GA => "GA",
        SB => "SB",
        WILL => "WILL",
        WONT => "WONT",
        DO => "DO",
        DONT => "DONT",
        IAC => "IAC",
        _ => "Unknown",
    }
}

/// Human-readable option name for log lines.
pub fn option_name(opt: u8) -> &'static str {
    match opt {
        TRANSMIT_BINARY => "TransmitBinary",
        ECHO => "Echo",
        SGA => "SGA",
        STATUS => "Status",
        TIMING_MARK => "TimingMark",
        TTYPE => "TType",
        EOR => "EOR",
        NAWS => "NAWS",
        TERMINAL_SPEED => "TerminalSpeed",
        LINEMODE => "Linemode",
        NEW_ENVIRON => "NewEnviron",
        MSSP => "MSSP",
        GMCP => "GMCP",
        _ => "Unknown",
    }
}
