//! Crate-wide error type

use ufmt::{uDisplay, uWrite, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Channel is not in the configured state
    Disconnected,
    /// USB device could not be built from its descriptors
    Setup,
    /// Endpoint never became ready
    Timeout,
    /// Incoming data does not fit the caller's buffer
    Overflow,
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub fn as_str(&self) -> &'static str {
        match self {
            Error::Disconnected => "disconnected",
            Error::Setup => "setup",
            Error::Timeout => "timeout",
            Error::Overflow => "overflow",
        }
    }
}

impl uDisplay for Error {
    fn fmt<W>(&self, f: &mut Formatter<'_, W>) -> core::result::Result<(), W::Error>
    where
        W: uWrite + ?Sized,
    {
        f.write_str(self.as_str())
    }
}
