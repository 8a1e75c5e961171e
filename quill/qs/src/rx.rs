//! Receive side: decoding host-to-target command frames.
//!
//! Commands arrive over the same framing as the transmit side (escape
//! 0x7D, terminator 0x7E, trailing checksum). The parser is fed one byte
//! at a time from the transport's RX path and yields a command per
//! well-formed frame; bad checksums drop the frame and count.

use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::buffer::{ESC, ESC_XOR, FLAG};

/// Command ids on the wire.
mod cmd {
    pub const RESET: u8 = 0x00;
    pub const INFO: u8 = 0x01;
    pub const TICK: u8 = 0x02;
    pub const GLB_FILTER: u8 = 0x03;
    pub const LOC_FILTER: u8 = 0x04;
    pub const USER: u8 = 0x05;
}

/// A decoded host command.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QsRxCommand {
    /// Reset the target.
    Reset,
    /// Re-send the target-info record.
    Info,
    /// Advance the given tick rate by one tick.
    Tick { rate: u8 },
    /// Replace the 128-bit global record filter.
    GlbFilter { mask: u128 },
    /// Replace the 128-bit local object filter.
    LocFilter { mask: u128 },
    /// Application command with one parameter.
    User { cmd: u8, param: u32 },
}

const MAX_FRAME: usize = 24;

/// Streaming decoder for host command frames.
pub struct QsRx {
    frame: Vec<u8, MAX_FRAME>,
    escaped: bool,
    /// Frames discarded for bad checksum, overflow, or malformed payload.
    errors: u16,
}

impl QsRx {
    pub const fn new() -> Self {
        Self {
            frame: Vec::new(),
            escaped: false,
            errors: 0,
        }
    }

    pub fn errors(&self) -> u16 {
        self.errors
    }

    /// Feeds one received byte; returns a command when a frame completes.
    pub fn feed(&mut self, byte: u8) -> Option<QsRxCommand> {
        if byte == FLAG {
            let done = self.decode();
            self.frame.clear();
            self.escaped = false;
            return done;
        }
        if byte == ESC {
            self.escaped = true;
            return None;
        }
        let byte = if self.escaped {
            self.escaped = false;
            byte ^ ESC_XOR
        } else {
            byte
        };
        if self.frame.push(byte).is_err() {
            // Oversized frame; wait for the terminator and discard.
            self.frame.clear();
            self.errors = self.errors.saturating_add(1);
        }
        None
    }

    fn decode(&mut self) -> Option<QsRxCommand> {
        // Frame: seq, cmd, params…, checksum. Sum of all bytes must be 0xFF.
        if self.frame.len() < 3 {
            if !self.frame.is_empty() {
                self.errors = self.errors.saturating_add(1);
            }
            return None;
        }
        let sum = self.frame.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != 0xFF {
            self.errors = self.errors.saturating_add(1);
            return None;
        }
        let body = &self.frame[1..self.frame.len() - 1];
        let (op, params) = body.split_first()?;
        let parsed = match *op {
            cmd::RESET if params.is_empty() => Some(QsRxCommand::Reset),
            cmd::INFO if params.is_empty() => Some(QsRxCommand::Info),
            cmd::TICK if params.len() == 1 => Some(QsRxCommand::Tick { rate: params[0] }),
            cmd::GLB_FILTER if params.len() == 16 => Some(QsRxCommand::GlbFilter {
                mask: u128::from_le_bytes(params.try_into().ok()?),
            }),
            cmd::LOC_FILTER if params.len() == 16 => Some(QsRxCommand::LocFilter {
                mask: u128::from_le_bytes(params.try_into().ok()?),
            }),
            cmd::USER if params.len() == 5 => Some(QsRxCommand::User {
                cmd: params[0],
                param: u32::from_le_bytes(params[1..5].try_into().ok()?),
            }),
            _ => None,
        };
        if parsed.is_none() {
            self.errors = self.errors.saturating_add(1);
        }
        parsed
    }
}

impl Default for QsRx {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a command frame the way a host tool would (loopback tests,
/// hosted tooling).
pub fn encode_command(seq: u8, command: &QsRxCommand, out: &mut dyn FnMut(u8)) {
    let mut payload: Vec<u8, MAX_FRAME> = Vec::new();
    let _ = payload.push(seq);
    match command {
        QsRxCommand::Reset => {
            let _ = payload.push(cmd::RESET);
        }
        QsRxCommand::Info => {
            let _ = payload.push(cmd::INFO);
        }
        QsRxCommand::Tick { rate } => {
            let _ = payload.push(cmd::TICK);
            let _ = payload.push(*rate);
        }
        QsRxCommand::GlbFilter { mask } => {
            let _ = payload.push(cmd::GLB_FILTER);
            let _ = payload.extend_from_slice(&mask.to_le_bytes());
        }
        QsRxCommand::LocFilter { mask } => {
            let _ = payload.push(cmd::LOC_FILTER);
            let _ = payload.extend_from_slice(&mask.to_le_bytes());
        }
        QsRxCommand::User { cmd: c, param } => {
            let _ = payload.push(cmd::USER);
            let _ = payload.push(*c);
            let _ = payload.extend_from_slice(&param.to_le_bytes());
        }
    }
    let sum = payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    let _ = payload.push(!sum);
    for &b in payload.iter() {
        if b == FLAG || b == ESC {
            out(ESC);
            out(b ^ ESC_XOR);
        } else {
            out(b);
        }
    }
    out(FLAG);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(command: QsRxCommand) -> Option<QsRxCommand> {
        let mut rx = QsRx::new();
        let mut decoded = None;
        encode_command(42, &command, &mut |b| {
            if let Some(c) = rx.feed(b) {
                decoded = Some(c);
            }
        });
        decoded
    }

    #[test]
    fn commands_round_trip() {
        for command in [
            QsRxCommand::Reset,
            QsRxCommand::Info,
            QsRxCommand::Tick { rate: 1 },
            QsRxCommand::GlbFilter { mask: 0x7D7E_0055 },
            QsRxCommand::LocFilter { mask: u128::MAX },
            QsRxCommand::User {
                cmd: 9,
                param: 0xDEAD_BEEF,
            },
        ] {
            assert_eq!(round_trip(command), Some(command));
        }
    }

    #[test]
    fn corrupted_checksum_is_dropped() {
        let mut bytes = std::vec::Vec::new();
        encode_command(1, &QsRxCommand::Reset, &mut |b| bytes.push(b));
        bytes[0] ^= 0x01;

        let mut rx = QsRx::new();
        let mut decoded = None;
        for b in bytes {
            if let Some(c) = rx.feed(b) {
                decoded = Some(c);
            }
        }
        assert_eq!(decoded, None);
        assert_eq!(rx.errors(), 1);
    }

    #[test]
    fn garbage_between_frames_is_tolerated() {
        let mut rx = QsRx::new();
        for b in [0x00, 0x11, 0x22] {
            assert!(rx.feed(b).is_none());
        }
        // Terminator flushes the garbage; the next frame decodes cleanly.
        assert!(rx.feed(FLAG).is_none());

        let mut decoded = None;
        encode_command(7, &QsRxCommand::Tick { rate: 0 }, &mut |b| {
            if let Some(c) = rx.feed(b) {
                decoded = Some(c);
            }
        });
        assert_eq!(decoded, Some(QsRxCommand::Tick { rate: 0 }));
    }
}
