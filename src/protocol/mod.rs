//! Packet channel boundary between the console and the USB stack

pub mod transport;

pub use transport::{PacketChannel, Selected};

/// Endpoint address, bit 7 set for device-to-host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint(u8);

impl Endpoint {
    pub const DIR_IN: u8 = 0x80;
    pub const CONTROL: Endpoint = Endpoint(0);

    pub const fn new(address: u8) -> Self {
        Self(address)
    }

    pub const fn address(self) -> u8 {
        self.0
    }

    pub const fn number(self) -> u8 {
        self.0 & 0x0F
    }
}

/// Device state as tracked by the USB stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unattached,
    Default,
    Addressed,
    Configured,
    Suspended,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Unattached => "unattached",
            ChannelState::Default => "default",
            ChannelState::Addressed => "addressed",
            ChannelState::Configured => "configured",
            ChannelState::Suspended => "suspended",
        }
    }
}
