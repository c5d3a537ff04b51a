pub mod fuses;
pub mod uart;
pub mod usb;
pub mod watchdog;

// Re-export commonly used types
pub use fuses::{BootJump, Fuses};
pub use uart::Uart;
pub use usb::UsbBus;
pub use watchdog::{clock_prescale_none, Watchdog};
