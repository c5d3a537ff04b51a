//! Fixed-capacity text formatting for console output
//!
//! `LineBuf` behaves like `snprintf`: it keeps what fits, counts everything
//! it was asked to write, and lets the caller compare the count against the
//! capacity. One slot of the capacity is reserved the way a C string keeps
//! room for its terminator, so a line of `N - 1` characters is the longest
//! that passes.

use core::str;

use ufmt::{uDisplay, uWrite, Formatter};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// Non-ASCII text; the console protocol is 7-bit
    Encoding,
    /// Output did not fit the buffer
    Truncated,
}

pub struct LineBuf<const N: usize> {
    buf: [u8; N],
    len: usize,
    count: usize,
}

impl<const N: usize> LineBuf<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            count: 0,
        }
    }

    /// Characters requested so far, including those that did not fit
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn as_str(&self) -> &str {
        // only ASCII is ever stored
        str::from_utf8(self.as_bytes()).unwrap_or("")
    }
}

impl<const N: usize> Default for LineBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> uWrite for LineBuf<N> {
    type Error = FormatError;

    fn write_str(&mut self, s: &str) -> Result<(), FormatError> {
        if !s.is_ascii() {
            return Err(FormatError::Encoding);
        }
        for &byte in s.as_bytes() {
            if self.len + 1 < N {
                self.buf[self.len] = byte;
                self.len += 1;
            }
            self.count += 1;
        }
        Ok(())
    }
}

/// Format into a fresh `LineBuf<N>`, rejecting output that does not fit
pub fn format_line<const N: usize>(
    f: impl FnOnce(&mut LineBuf<N>) -> Result<(), FormatError>,
) -> Result<LineBuf<N>, FormatError> {
    let mut line = LineBuf::new();
    f(&mut line)?;
    if line.count >= N {
        return Err(FormatError::Truncated);
    }
    Ok(line)
}

/// Lowercase hexadecimal, zero padded to `width` digits
#[derive(Debug, Clone, Copy)]
pub struct Hex {
    value: u32,
    width: u8,
}

impl Hex {
    pub fn padded(value: impl Into<u32>, width: u8) -> Self {
        Self {
            value: value.into(),
            width: width.min(8),
        }
    }

    pub fn minimal(value: impl Into<u32>) -> Self {
        Self::padded(value, 1)
    }
}

impl uDisplay for Hex {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        let mut digits = [0u8; 8];
        let mut n = 0;
        let mut value = self.value;
        loop {
            digits[n] = HEX_DIGITS[(value & 0xF) as usize];
            n += 1;
            value >>= 4;
            if value == 0 && n >= self.width as usize {
                break;
            }
        }
        digits[..n].reverse();
        f.write_str(str::from_utf8(&digits[..n]).unwrap_or(""))
    }
}

/// Float with five fixed decimals
#[derive(Debug, Clone, Copy)]
pub struct Fixed5(pub f32);

impl Fixed5 {
    const SCALE: f32 = 100_000.0;
    const DECIMALS: usize = 5;
}

impl uDisplay for Fixed5 {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        let value = self.0;
        if value.is_nan() {
            return f.write_str("nan");
        }
        if value.is_infinite() {
            return f.write_str(if value < 0.0 { "-inf" } else { "inf" });
        }

        let magnitude = if value < 0.0 { -value } else { value };
        // 2^32: the integer part has to fit a u32
        if magnitude >= 4_294_967_296.0 {
            return f.write_str("ovf");
        }

        let mut whole = magnitude as u32;
        let mut frac = ((magnitude - whole as f32) * Self::SCALE + 0.5) as u32;
        if frac >= Self::SCALE as u32 {
            frac -= Self::SCALE as u32;
            whole = match whole.checked_add(1) {
                Some(whole) => whole,
                None => return f.write_str("ovf"),
            };
        }

        if value < 0.0 {
            f.write_str("-")?;
        }
        uDisplay::fmt(&whole, f)?;
        f.write_str(".")?;

        let mut digits = [b'0'; Self::DECIMALS];
        for slot in digits.iter_mut().rev() {
            *slot = b'0' + (frac % 10) as u8;
            frac /= 10;
        }
        f.write_str(str::from_utf8(&digits).unwrap_or(""))
    }
}
