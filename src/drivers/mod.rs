pub mod fmt;
pub mod serial_console;
pub mod usb_channel;

pub use fmt::{FormatError, Hex, LineBuf};
pub use serial_console::SerialConsole;
pub use usb_channel::{CdcChannel, Detach};
