//! Line-oriented console on top of the CDC data endpoints
//!
//! Writes are best effort: while the host has not configured the device they
//! are dropped, and the `Result` they return may be ignored by contract.
//! Reading blocks cooperatively, servicing the channel on every pass.

use ufmt::{uDisplay, uwrite};

use super::fmt::{format_line, Fixed5, Hex, LineBuf};
use crate::config::{CDC_RX_ENDPOINT, CDC_TX_ENDPOINT};
use crate::error::{Error, Result};
use crate::logger::Log;
use crate::protocol::{ChannelState, PacketChannel, Selected};

pub const NEWLINE: &str = "\r\n";

const OVERFLOW_MESSAGE: &str = "\r\nError reading input: Buffer too small!\r\n";

// Text sizes from the value ranges, plus the terminator slot LineBuf keeps
const I16_TEXT: usize = "-32768".len() + 1;
const I32_TEXT: usize = "-2147483648".len() + 1;
const HEX_BYTE_TEXT: usize = "ff".len() + 1;
const FLOAT_TEXT: usize = "-4294967295.99999".len() + 1;

pub struct SerialConsole<C, L> {
    channel: C,
    log: L,
    last_state: ChannelState,
    // rest of an overflowed line still to be thrown away
    discarding: bool,
}

impl<C: PacketChannel, L: Log> SerialConsole<C, L> {
    pub fn new(channel: C, log: L) -> Self {
        let last_state = channel.state();
        Self {
            channel,
            log,
            last_state,
            discarding: false,
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn log(&mut self) -> &mut L {
        &mut self.log
    }

    /// Run pending USB housekeeping, logging device state changes
    pub fn service(&mut self) {
        self.channel.service();

        let state = self.channel.state();
        if state != self.last_state {
            info!(self.log, "usb {} -> {}", self.last_state.as_str(), state.as_str());
            self.last_state = state;
        }
    }

    pub fn write_str(&mut self, s: &str) -> Result<()> {
        transmit(&mut self.channel, s.as_bytes())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        transmit(&mut self.channel, data)
    }

    pub fn write_char(&mut self, byte: u8) -> Result<()> {
        transmit(&mut self.channel, &[byte])
    }

    pub fn write_line(&mut self, s: &str) -> Result<()> {
        self.write_str(s)?;
        self.write_str(NEWLINE)
    }

    pub fn write_int(&mut self, value: i16) -> Result<()> {
        self.write_number::<I16_TEXT>(value)
    }

    pub fn write_long(&mut self, value: i32) -> Result<()> {
        self.write_number::<I32_TEXT>(value)
    }

    /// Lowercase hex without padding
    pub fn write_hex_byte(&mut self, value: u8) -> Result<()> {
        self.write_number::<HEX_BYTE_TEXT>(Hex::minimal(value))
    }

    /// Five fixed decimals
    pub fn write_float(&mut self, value: f32) -> Result<()> {
        self.write_number::<FLOAT_TEXT>(Fixed5(value))
    }

    fn write_number<const N: usize>(&mut self, value: impl uDisplay) -> Result<()> {
        match format_line::<N>(|w| uwrite!(w, "{}", value)) {
            Ok(text) => self.write_bytes(text.as_bytes()),
            // sized for the full range of every type above
            Err(_) => Err(Error::Overflow),
        }
    }

    /// Read one line into `buf`, echoing it back as it arrives.
    ///
    /// Returns the line length with a 0 stored after the last character.
    /// A line that cannot fit together with its terminator is dropped: the
    /// host gets an error message, the last slot of `buf` is set to 0 and
    /// the return value is 0. Input up to the dropped line's terminator is
    /// skipped, here or on the next call, so its tail never reads as a line
    /// of its own. Blocks until a line or an overflow arrives.
    pub fn read_line(&mut self, buf: &mut [u8]) -> usize {
        let capacity = buf.len();
        if capacity == 0 {
            return 0;
        }

        let mut pos = 0;
        loop {
            self.service();

            if self.channel.state() != ChannelState::Configured {
                continue;
            }

            let mut rx = Selected::new(&mut self.channel, CDC_RX_ENDPOINT);
            if !rx.is_out_received() {
                continue;
            }

            if self.discarding {
                self.discarding = !skip_to_terminator(&mut *rx);
                rx.clear_out();
                continue;
            }

            let available = rx.bytes_in_endpoint();
            if pos + available >= capacity {
                self.discarding = !skip_to_terminator(&mut *rx);
                rx.clear_out();
                transmit(&mut *rx, OVERFLOW_MESSAGE.as_bytes()).ok();
                drop(rx);
                warn!(self.log, "line overflow: {} + {} bytes, capacity {}", pos, available, capacity);
                buf[capacity - 1] = 0;
                return 0;
            }

            for _ in 0..available {
                let byte = rx.read_byte();
                if is_terminator(byte) {
                    rx.clear_out();
                    transmit(&mut *rx, NEWLINE.as_bytes()).ok();
                    buf[pos] = 0;
                    return pos;
                }
                transmit(&mut *rx, &[byte]).ok();
                buf[pos] = byte;
                pos += 1;
            }
            rx.clear_out();
        }
    }
}

fn is_terminator(byte: u8) -> bool {
    byte == b'\r' || byte == b'\n'
}

/// Consume the current OUT packet up to and including a line terminator.
/// Returns whether one was found.
fn skip_to_terminator<C: PacketChannel>(rx: &mut C) -> bool {
    while rx.bytes_in_endpoint() > 0 {
        if is_terminator(rx.read_byte()) {
            return true;
        }
    }
    false
}

/// Send `data` on the device-to-host endpoint.
///
/// Full packets are handed over as they fill up. If the final packet is
/// exactly full, a zero-length packet follows so the host passes the data on
/// instead of waiting for more.
fn transmit<C: PacketChannel>(channel: &mut C, data: &[u8]) -> Result<()> {
    if channel.state() != ChannelState::Configured {
        return Err(Error::Disconnected);
    }

    let mut tx = Selected::new(channel, CDC_TX_ENDPOINT);
    for &byte in data {
        if !tx.is_read_write_allowed() {
            tx.clear_in();
            tx.wait_until_ready()?;
        }
        tx.write_byte(byte);
    }

    let full = tx.bytes_in_endpoint() == tx.max_packet_size();
    tx.clear_in();

    if full {
        tx.wait_until_ready()?;
        tx.clear_in();
    }
    Ok(())
}

/// Format a line into `N` bytes and write it, or the matching fallback
pub(crate) fn write_formatted<C, L, const N: usize>(
    console: &mut SerialConsole<C, L>,
    f: impl FnOnce(&mut LineBuf<N>) -> core::result::Result<(), super::fmt::FormatError>,
) where
    C: PacketChannel,
    L: Log,
{
    use super::fmt::FormatError;

    let outcome = match format_line::<N>(f) {
        Ok(line) => console.write_bytes(line.as_bytes()),
        Err(FormatError::Encoding) => console.write_line("Format error!"),
        Err(FormatError::Truncated) => console.write_line("Output error!"),
    };
    outcome.ok();
}
