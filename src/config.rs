//! Configuration constants for the OpenHR2 master firmware

use crate::bootloader::BootTarget;
use crate::protocol::Endpoint;

/// CPU frequency in Hz
pub const CPU_FREQ_HZ: u32 = 16_000_000;

/// Diagnostic log baud rate (USART1, `debug` feature)
pub const LOG_BAUD: u32 = 57_600;

/// USB identity
pub const USB_VID: u16 = 0x03EB;
pub const USB_PID: u16 = 0x2044;
pub const USB_MANUFACTURER: &str = "OpenHR2";
pub const USB_PRODUCT: &str = "OpenHR2 Master";
pub const USB_SERIAL: &str = "0001";

/// Console data endpoints as the console selects them
pub const CDC_TX_ENDPOINT: Endpoint = Endpoint::new(Endpoint::DIR_IN | 3);
pub const CDC_RX_ENDPOINT: Endpoint = Endpoint::new(4);

/// Maximum packet size of both console data endpoints
pub const CDC_TXRX_EPSIZE: usize = 16;

/// Line buffer of the command menu; commands are a single character
pub const COMMAND_BUFFER_LEN: usize = 10;

#[cfg(feature = "atmega32u4")]
mod chip {
    /// Last byte address of program memory
    pub const FLASHEND: u32 = 0x7FFF;
    /// BOOTSZ0 and BOOTSZ1 masks in the high fuse
    pub const BOOTSZ: Option<(u8, u8)> = Some((1 << 1, 1 << 2));
}

// Unknown part: no boot section layout to rely on
#[cfg(not(feature = "atmega32u4"))]
mod chip {
    pub const FLASHEND: u32 = 0x7FFF;
    pub const BOOTSZ: Option<(u8, u8)> = None;
}

pub use chip::FLASHEND;

/// Boot section locator, present only when the chip defines the BOOTSZ fuses
pub const BOOTLOADER: Option<BootTarget> = match chip::BOOTSZ {
    Some((bootsz0, bootsz1)) => Some(BootTarget::new(FLASHEND, bootsz0, bootsz1)),
    None => None,
};
