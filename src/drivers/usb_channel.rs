//! Console channel over the `usb-device` stack
//!
//! Enumeration, control requests and the CDC class requests are handled by
//! `usb-device` and `usbd_serial::CdcAcmClass`. This adapter gives the
//! console its bank-level view of the two data endpoints: bytes are staged
//! in one packet buffer per direction and handed to the class as whole
//! packets, so packet boundaries (and the zero-length packet) stay under the
//! console's control.

use usb_device::bus::{UsbBus, UsbBusAllocator};
use usb_device::device::{StringDescriptors, UsbDevice, UsbDeviceBuilder, UsbDeviceState, UsbVidPid};
use usb_device::{LangID, UsbError};
use usbd_serial::{CdcAcmClass, USB_CLASS_CDC};

use crate::config::{
    CDC_RX_ENDPOINT, CDC_TXRX_EPSIZE, CDC_TX_ENDPOINT, USB_MANUFACTURER, USB_PID, USB_PRODUCT,
    USB_SERIAL, USB_VID,
};
use crate::error::{Error, Result};
use crate::protocol::{ChannelState, Endpoint, PacketChannel};

/// Service passes before `wait_until_ready` gives up on the host
const READY_SPINS: u16 = 0xFFFF;

/// Bus that can drop off the USB and power its controller down
pub trait Detach {
    fn detach(&self);
}

pub struct CdcChannel<'a, B: UsbBus> {
    device: UsbDevice<'a, B>,
    class: CdcAcmClass<'a, B>,
    selected: Endpoint,
    tx: [u8; CDC_TXRX_EPSIZE],
    tx_len: usize,
    // staged packet handed over but not yet accepted by the endpoint
    tx_pending: bool,
    rx: [u8; CDC_TXRX_EPSIZE],
    rx_len: usize,
    rx_read: usize,
    rx_full: bool,
    detached: bool,
}

impl<'a, B: UsbBus> CdcChannel<'a, B> {
    pub fn new(alloc: &'a UsbBusAllocator<B>) -> Result<Self> {
        // class endpoints must be allocated before the device freezes the bus
        let class = CdcAcmClass::new(alloc, CDC_TXRX_EPSIZE as u16);
        let device = UsbDeviceBuilder::new(alloc, UsbVidPid(USB_VID, USB_PID))
            .strings(&[StringDescriptors::new(LangID::EN_US)
                .manufacturer(USB_MANUFACTURER)
                .product(USB_PRODUCT)
                .serial_number(USB_SERIAL)])
            .map_err(|_| Error::Setup)?
            .device_class(USB_CLASS_CDC)
            .build();

        Ok(Self {
            device,
            class,
            selected: Endpoint::CONTROL,
            tx: [0; CDC_TXRX_EPSIZE],
            tx_len: 0,
            tx_pending: false,
            rx: [0; CDC_TXRX_EPSIZE],
            rx_len: 0,
            rx_read: 0,
            rx_full: false,
            detached: false,
        })
    }

    fn is_tx(&self) -> bool {
        self.selected.number() == CDC_TX_ENDPOINT.number()
    }

    fn is_rx(&self) -> bool {
        self.selected.number() == CDC_RX_ENDPOINT.number()
    }

    fn reset_banks(&mut self) {
        self.tx_len = 0;
        self.tx_pending = false;
        self.rx_len = 0;
        self.rx_read = 0;
        self.rx_full = false;
    }

    fn flush_tx(&mut self) {
        if !self.tx_pending {
            return;
        }
        match self.class.write_packet(&self.tx[..self.tx_len]) {
            Ok(_) => {
                self.tx_len = 0;
                self.tx_pending = false;
            }
            Err(UsbError::WouldBlock) => {}
            // the packet cannot go out on this endpoint at all
            Err(_) => {
                self.tx_len = 0;
                self.tx_pending = false;
            }
        }
    }

    fn fetch_rx(&mut self) {
        if self.rx_full {
            return;
        }
        if let Ok(len) = self.class.read_packet(&mut self.rx) {
            self.rx_len = len;
            self.rx_read = 0;
            self.rx_full = true;
        }
    }
}

impl<B: UsbBus + Detach> PacketChannel for CdcChannel<'_, B> {
    fn max_packet_size(&self) -> usize {
        self.class.max_packet_size() as usize
    }

    fn state(&self) -> ChannelState {
        if self.detached {
            return ChannelState::Unattached;
        }
        match self.device.state() {
            UsbDeviceState::Default => ChannelState::Default,
            UsbDeviceState::Addressed => ChannelState::Addressed,
            UsbDeviceState::Configured => ChannelState::Configured,
            UsbDeviceState::Suspend => ChannelState::Suspended,
        }
    }

    fn service(&mut self) {
        if self.detached {
            return;
        }
        self.device.poll(&mut [&mut self.class]);

        if self.device.state() != UsbDeviceState::Configured {
            self.reset_banks();
            return;
        }
        self.flush_tx();
        self.fetch_rx();
    }

    fn selected(&self) -> Endpoint {
        self.selected
    }

    fn select(&mut self, endpoint: Endpoint) {
        self.selected = endpoint;
    }

    fn is_read_write_allowed(&self) -> bool {
        if self.is_tx() {
            !self.tx_pending && self.tx_len < self.max_packet_size()
        } else if self.is_rx() {
            self.rx_read < self.rx_len
        } else {
            false
        }
    }

    fn write_byte(&mut self, byte: u8) {
        if self.is_tx() && !self.tx_pending && self.tx_len < self.tx.len() {
            self.tx[self.tx_len] = byte;
            self.tx_len += 1;
        }
    }

    fn bytes_in_endpoint(&self) -> usize {
        if self.is_tx() {
            self.tx_len
        } else if self.is_rx() {
            self.rx_len - self.rx_read
        } else {
            0
        }
    }

    fn clear_in(&mut self) {
        if !self.is_tx() || self.tx_pending {
            return;
        }
        // an empty bank goes out as a zero-length packet
        self.tx_pending = true;
        self.flush_tx();
    }

    fn wait_until_ready(&mut self) -> Result<()> {
        for _ in 0..READY_SPINS {
            if self.state() != ChannelState::Configured {
                return Err(Error::Disconnected);
            }
            let ready = if self.is_tx() {
                !self.tx_pending
            } else {
                self.rx_full
            };
            if ready {
                return Ok(());
            }
            self.service();
        }
        Err(Error::Timeout)
    }

    fn is_out_received(&self) -> bool {
        self.is_rx() && self.rx_full
    }

    fn read_byte(&mut self) -> u8 {
        if !self.is_rx() || self.rx_read >= self.rx_len {
            return 0;
        }
        let byte = self.rx[self.rx_read];
        self.rx_read += 1;
        byte
    }

    fn clear_out(&mut self) {
        if self.is_rx() {
            self.rx_len = 0;
            self.rx_read = 0;
            self.rx_full = false;
        }
    }

    fn disable(&mut self) {
        self.device.bus().detach();
        self.detached = true;
        self.reset_banks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::SerialConsole;
    use crate::logger::NoLog;
    use crate::protocol::Selected;
    use crate::testing::FakeBus;

    // SET_CONFIGURATION(1), host to device, standard, device recipient
    const SET_CONFIGURATION: [u8; 8] = [0x00, 0x09, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];

    fn configure(channel: &mut CdcChannel<'_, FakeBus>) {
        channel.device.bus().queue_setup(SET_CONFIGURATION);
        channel.service();
        assert_eq!(channel.state(), ChannelState::Configured);
    }

    #[test]
    fn starts_in_default_with_class_packet_size() {
        let alloc = UsbBusAllocator::new(FakeBus::default());
        let channel = CdcChannel::new(&alloc).unwrap();

        assert_eq!(channel.state(), ChannelState::Default);
        assert_eq!(channel.max_packet_size(), CDC_TXRX_EPSIZE);
    }

    #[test]
    fn nothing_moves_before_configuration() {
        let alloc = UsbBusAllocator::new(FakeBus::default());
        let mut channel = CdcChannel::new(&alloc).unwrap();
        channel.device.bus().queue_out(b"h\r");

        channel.service();

        let mut rx = Selected::new(&mut channel, CDC_RX_ENDPOINT);
        assert!(!rx.is_out_received());
        assert_eq!(rx.wait_until_ready(), Err(Error::Disconnected));
    }

    #[test]
    fn clear_in_hands_the_packet_to_the_class() {
        let alloc = UsbBusAllocator::new(FakeBus::default());
        let mut channel = CdcChannel::new(&alloc).unwrap();
        configure(&mut channel);

        let mut tx = Selected::new(&mut channel, CDC_TX_ENDPOINT);
        for &byte in b"abc" {
            assert!(tx.is_read_write_allowed());
            tx.write_byte(byte);
        }
        assert_eq!(tx.bytes_in_endpoint(), 3);
        tx.clear_in();
        assert_eq!(tx.bytes_in_endpoint(), 0);
        drop(tx);

        assert_eq!(channel.device.bus().written(), vec![b"abc".to_vec()]);
    }

    #[test]
    fn busy_endpoint_keeps_the_packet_until_service() {
        let alloc = UsbBusAllocator::new(FakeBus::default());
        let mut channel = CdcChannel::new(&alloc).unwrap();
        configure(&mut channel);
        channel.device.bus().set_busy(1);

        let mut tx = Selected::new(&mut channel, CDC_TX_ENDPOINT);
        tx.write_byte(b'x');
        tx.clear_in();
        assert!(!tx.is_read_write_allowed());
        tx.service();
        assert!(tx.is_read_write_allowed());
        drop(tx);

        assert_eq!(channel.device.bus().written(), vec![b"x".to_vec()]);
    }

    #[test]
    fn full_packet_is_closed_with_an_empty_one() {
        let alloc = UsbBusAllocator::new(FakeBus::default());
        let mut channel = CdcChannel::new(&alloc).unwrap();
        configure(&mut channel);
        channel.device.bus().set_busy(3);
        let mut console = SerialConsole::new(channel, NoLog);

        console.write_str("0123456789abcdef").unwrap();

        let written = console.channel().device.bus().written();
        assert_eq!(written, vec![b"0123456789abcdef".to_vec(), Vec::new()]);
    }

    #[test]
    fn service_fetches_one_out_packet_at_a_time() {
        let alloc = UsbBusAllocator::new(FakeBus::default());
        let mut channel = CdcChannel::new(&alloc).unwrap();
        configure(&mut channel);
        channel.device.bus().queue_out(b"hi");
        channel.device.bus().queue_out(b"!");

        channel.service();
        channel.service();

        let mut rx = Selected::new(&mut channel, CDC_RX_ENDPOINT);
        assert!(rx.is_out_received());
        assert_eq!(rx.bytes_in_endpoint(), 2);
        assert_eq!(rx.read_byte(), b'h');
        assert_eq!(rx.read_byte(), b'i');
        assert!(!rx.is_read_write_allowed());
        rx.clear_out();
        assert!(!rx.is_out_received());

        rx.service();
        assert_eq!(rx.bytes_in_endpoint(), 1);
        assert_eq!(rx.read_byte(), b'!');
    }

    #[test]
    fn console_reads_a_line_through_the_class() {
        let alloc = UsbBusAllocator::new(FakeBus::default());
        let mut channel = CdcChannel::new(&alloc).unwrap();
        configure(&mut channel);
        channel.device.bus().queue_out(b"S\r");
        let mut console = SerialConsole::new(channel, NoLog);
        let mut buf = [0u8; 10];

        assert_eq!(console.read_line(&mut buf), 1);
        assert_eq!(&buf[..2], b"S\0");
        // echo, then the line end
        let written = console.channel().device.bus().written();
        assert_eq!(written, vec![b"S".to_vec(), b"\r\n".to_vec()]);
    }

    #[test]
    fn disable_detaches_the_bus() {
        let alloc = UsbBusAllocator::new(FakeBus::default());
        let mut channel = CdcChannel::new(&alloc).unwrap();
        configure(&mut channel);

        channel.disable();
        channel.service();

        assert!(channel.device.bus().is_detached());
        assert_eq!(channel.state(), ChannelState::Unattached);
        let mut tx = Selected::new(&mut channel, CDC_TX_ENDPOINT);
        assert_eq!(tx.wait_until_ready(), Err(Error::Disconnected));
    }
}
