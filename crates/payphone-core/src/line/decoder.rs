use super::{HardwareEvent, LineCommand};
use crate::config::LineSymbols;
use tracing::warn;

/// Stateless translator between wire bytes and typed line signals
///
/// The decoder only holds the symbol table, so it is cloned into each serial
/// worker instance and needs no synchronization.
#[derive(Debug, Clone, Default)]
pub struct LineEventDecoder {
    symbols: LineSymbols,
}

impl LineEventDecoder {
    pub fn new(symbols: LineSymbols) -> Self {
        Self { symbols }
    }

    pub fn symbols(&self) -> &LineSymbols {
        &self.symbols
    }

    /// Decode one received byte
    ///
    /// Bytes outside the inbound alphabet are logged and discarded.
    pub fn decode(&self, byte: u8) -> Option<HardwareEvent> {
        let c = byte as char;

        if byte.is_ascii() && self.symbols.is_dial_digit(c) {
            Some(HardwareEvent::Digit(c))
        } else if c == self.symbols.on_hook {
            Some(HardwareEvent::HookDown)
        } else if c == self.symbols.off_hook {
            Some(HardwareEvent::HookUp)
        } else if c == self.symbols.follow_key {
            Some(HardwareEvent::FollowKeyPressed)
        } else {
            warn!("Discarding unknown line byte 0x{:02x}", byte);
            None
        }
    }

    /// Encode an outbound command
    pub fn encode(&self, command: LineCommand) -> u8 {
        let c = match command {
            LineCommand::RingStart => self.symbols.ring_start,
            LineCommand::RingStop => self.symbols.ring_stop,
        };
        // ascii-ness is enforced by config validation
        c as u8
    }
}
