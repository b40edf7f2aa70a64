//! TFTP packet serialization and deserialization
//!
//! All multi-byte fields are big-endian on the wire:
//!
//! ```text
//! RRQ/WRQ  | opcode(2) | filename | 0 | mode | 0 |
//! DATA     | opcode(2) | block(2) | payload (0..=block size) |
//! ACK      | opcode(2) | block(2) |
//! ERROR    | opcode(2) | code(2)  | message | 0 |
//! ```

use std::fmt;

use super::error::{Result, TftpError};

/// Longest filename a request may carry, in bytes
pub const MAX_FILENAME_LEN: usize = 511;

/// Header size shared by DATA, ACK and ERROR packets
pub const HEADER_LEN: usize = 4;

/// Packet opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    Rrq = 1,
    Wrq = 2,
    Data = 3,
    Ack = 4,
    Error = 5,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Rrq),
            2 => Some(Self::Wrq),
            3 => Some(Self::Data),
            4 => Some(Self::Ack),
            5 => Some(Self::Error),
            _ => None,
        }
    }
}

/// TFTP error codes (RFC 1350 appendix)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotDefined,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTransferId,
    FileExists,
    NoSuchUser,
    /// Code outside the RFC table, kept as received
    Other(u16),
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        match self {
            Self::NotDefined => 0,
            Self::FileNotFound => 1,
            Self::AccessViolation => 2,
            Self::DiskFull => 3,
            Self::IllegalOperation => 4,
            Self::UnknownTransferId => 5,
            Self::FileExists => 6,
            Self::NoSuchUser => 7,
            Self::Other(code) => code,
        }
    }

    pub fn from_u16(code: u16) -> Self {
        match code {
            0 => Self::NotDefined,
            1 => Self::FileNotFound,
            2 => Self::AccessViolation,
            3 => Self::DiskFull,
            4 => Self::IllegalOperation,
            5 => Self::UnknownTransferId,
            6 => Self::FileExists,
            7 => Self::NoSuchUser,
            other => Self::Other(other),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::NotDefined => "not defined",
            Self::FileNotFound => "file not found",
            Self::AccessViolation => "access violation",
            Self::DiskFull => "disk full",
            Self::IllegalOperation => "illegal operation",
            Self::UnknownTransferId => "unknown transfer id",
            Self::FileExists => "file already exists",
            Self::NoSuchUser => "no such user",
            Self::Other(_) => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_u16(), self.describe())
    }
}

/// A decoded TFTP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Read request
    Rrq { filename: String, mode: String },
    /// Write request
    Wrq { filename: String, mode: String },
    /// File content block
    Data { block_num: u16, data: Vec<u8> },
    /// Acknowledgment of a block
    Ack(u16),
    /// Error report, ends the transfer
    Error { code: ErrorCode, msg: String },
}

impl Packet {
    pub fn opcode(&self) -> Opcode {
        match self {
            Packet::Rrq { .. } => Opcode::Rrq,
            Packet::Wrq { .. } => Opcode::Wrq,
            Packet::Data { .. } => Opcode::Data,
            Packet::Ack(_) => Opcode::Ack,
            Packet::Error { .. } => Opcode::Error,
        }
    }

    /// Short name used in logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Rrq { .. } => "RRQ",
            Packet::Wrq { .. } => "WRQ",
            Packet::Data { .. } => "DATA",
            Packet::Ack(_) => "ACK",
            Packet::Error { .. } => "ERROR",
        }
    }

    /// Build an ERROR packet
    pub fn error(code: ErrorCode, msg: impl Into<String>) -> Self {
        Packet::Error {
            code,
            msg: msg.into(),
        }
    }

    /// Serialize into a wire datagram
    ///
    /// Fails only for requests whose filename is too long or holds a NUL byte.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let opcode = (self.opcode() as u16).to_be_bytes();

        let buf = match self {
            Packet::Rrq { filename, mode } | Packet::Wrq { filename, mode } => {
                check_filename(filename)?;
                if mode.as_bytes().contains(&0) {
                    return Err(TftpError::MalformedPacket(
                        "mode contains a NUL byte".to_string(),
                    ));
                }
                let mut buf = Vec::with_capacity(4 + filename.len() + mode.len());
                buf.extend_from_slice(&opcode);
                buf.extend_from_slice(filename.as_bytes());
                buf.push(0);
                buf.extend_from_slice(mode.as_bytes());
                buf.push(0);
                buf
            }
            Packet::Data { block_num, data } => {
                let mut buf = Vec::with_capacity(HEADER_LEN + data.len());
                buf.extend_from_slice(&opcode);
                buf.extend_from_slice(&block_num.to_be_bytes());
                buf.extend_from_slice(data);
                buf
            }
            Packet::Ack(block_num) => {
                let mut buf = Vec::with_capacity(HEADER_LEN);
                buf.extend_from_slice(&opcode);
                buf.extend_from_slice(&block_num.to_be_bytes());
                buf
            }
            Packet::Error { code, msg } => {
                let mut buf = Vec::with_capacity(HEADER_LEN + msg.len() + 1);
                buf.extend_from_slice(&opcode);
                buf.extend_from_slice(&code.as_u16().to_be_bytes());
                // An embedded NUL would end the message early on the peer side
                buf.extend(msg.bytes().filter(|&b| b != 0));
                buf.push(0);
                buf
            }
        };

        Ok(buf)
    }

    /// Parse a wire datagram
    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(malformed(format!(
                "{} byte datagram is shorter than an opcode",
                buf.len()
            )));
        }

        let raw = u16::from_be_bytes([buf[0], buf[1]]);
        let opcode =
            Opcode::from_u16(raw).ok_or_else(|| malformed(format!("illegal opcode {}", raw)))?;
        let body = &buf[2..];

        match opcode {
            Opcode::Rrq | Opcode::Wrq => {
                let (filename, rest) = take_cstr(body, "filename")?;
                let (mode, _) = take_cstr(rest, "mode")?;
                if filename.len() > MAX_FILENAME_LEN {
                    return Err(malformed(format!(
                        "filename is {} bytes, limit is {}",
                        filename.len(),
                        MAX_FILENAME_LEN
                    )));
                }
                let (filename, mode) = (filename.to_string(), mode.to_string());
                Ok(if opcode == Opcode::Rrq {
                    Packet::Rrq { filename, mode }
                } else {
                    Packet::Wrq { filename, mode }
                })
            }
            Opcode::Data => {
                if buf.len() < HEADER_LEN {
                    return Err(malformed("DATA packet without block number".to_string()));
                }
                Ok(Packet::Data {
                    block_num: u16::from_be_bytes([buf[2], buf[3]]),
                    data: buf[HEADER_LEN..].to_vec(),
                })
            }
            Opcode::Ack => {
                if buf.len() != HEADER_LEN {
                    return Err(malformed(format!(
                        "ACK packet is {} bytes, expected {}",
                        buf.len(),
                        HEADER_LEN
                    )));
                }
                Ok(Packet::Ack(u16::from_be_bytes([buf[2], buf[3]])))
            }
            Opcode::Error => {
                if buf.len() < HEADER_LEN {
                    return Err(malformed("ERROR packet without error code".to_string()));
                }
                let code = ErrorCode::from_u16(u16::from_be_bytes([buf[2], buf[3]]));
                let text = &buf[HEADER_LEN..];
                let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
                Ok(Packet::Error {
                    code,
                    msg: String::from_utf8_lossy(&text[..end]).into_owned(),
                })
            }
        }
    }
}

fn malformed(reason: String) -> TftpError {
    TftpError::MalformedPacket(reason)
}

fn check_filename(filename: &str) -> Result<()> {
    if filename.len() > MAX_FILENAME_LEN {
        return Err(malformed(format!(
            "filename is {} bytes, limit is {}",
            filename.len(),
            MAX_FILENAME_LEN
        )));
    }
    if filename.as_bytes().contains(&0) {
        return Err(malformed("filename contains a NUL byte".to_string()));
    }
    Ok(())
}

/// Split a NUL-terminated UTF-8 field off the front of `buf`
fn take_cstr<'a>(buf: &'a [u8], field: &str) -> Result<(&'a str, &'a [u8])> {
    let end = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| malformed(format!("{} is not NUL-terminated", field)))?;
    let text = std::str::from_utf8(&buf[..end])
        .map_err(|_| malformed(format!("{} is not valid UTF-8", field)))?;
    Ok((text, &buf[end + 1..]))
}
