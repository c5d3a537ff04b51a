//! `usb-device` bus for the ATmega32U4 USB device controller
//!
//! Polled: bus events and endpoint flags are gathered in `poll`, which the
//! device stack runs from the main loop. Register access happens inside
//! `interrupt::free` since every bus method takes `&self`.

use core::cell::Cell;

use avr_device::atmega32u4::{PLL, USB_DEVICE};
use avr_device::interrupt::{self, Mutex};
use usb_device::bus::PollResult;
use usb_device::endpoint::{EndpointAddress, EndpointType};
use usb_device::{UsbDirection, UsbError};

use crate::drivers::usb_channel::Detach;

// UHWCON
const UVREGE: u8 = 1 << 0;
// USBCON
const USBE: u8 = 1 << 7;
const FRZCLK: u8 = 1 << 5;
const OTGPADE: u8 = 1 << 4;
// UDCON
const DETACH: u8 = 1 << 0;
// UDINT
const SUSPI: u8 = 1 << 0;
const EORSTI: u8 = 1 << 3;
const WAKEUPI: u8 = 1 << 4;
// UDADDR
const ADDEN: u8 = 1 << 7;
// UEINTX
const TXINI: u8 = 1 << 0;
const RXOUTI: u8 = 1 << 2;
const RXSTPI: u8 = 1 << 3;
const FIFOCON: u8 = 1 << 7;
// UECONX
const EPEN: u8 = 1 << 0;
const STALLRQC: u8 = 1 << 4;
const STALLRQ: u8 = 1 << 5;
// UECFG0X / UECFG1X
const EPDIR: u8 = 1 << 0;
const ALLOC: u8 = 1 << 1;
// PLLCSR / PLLFRQ
const PLOCK: u8 = 1 << 0;
const PLLE: u8 = 1 << 1;
const PINDIV: u8 = 1 << 4;
const PDIV_48MHZ: u8 = 1 << 2;

const ENDPOINTS: usize = 7;

#[derive(Clone, Copy, Default)]
struct EndpointSlot {
    allocated: bool,
    // UECFG0X EPTYPE bits and direction
    config0: u8,
    // UECFG1X EPSIZE bits
    size_code: u8,
    max_packet_size: u16,
}

fn type_bits(ep_type: EndpointType) -> u8 {
    match ep_type {
        EndpointType::Control => 0b00,
        EndpointType::Isochronous { .. } => 0b01,
        EndpointType::Bulk => 0b10,
        EndpointType::Interrupt => 0b11,
    }
}

fn size_code(size: u16) -> Option<u8> {
    match size {
        8 => Some(0),
        16 => Some(1),
        32 => Some(2),
        64 => Some(3),
        _ => None,
    }
}

pub struct UsbBus {
    usb: Mutex<USB_DEVICE>,
    pll: Mutex<PLL>,
    endpoints: [EndpointSlot; ENDPOINTS],
    // IN endpoints written to and not yet reported complete
    pending_ins: Mutex<Cell<u8>>,
    // UDADDR holds an address that applies after the status stage
    address_pending: Mutex<Cell<bool>>,
    suspended: Mutex<Cell<bool>>,
}

impl UsbBus {
    pub fn new(usb: USB_DEVICE, pll: PLL) -> Self {
        Self {
            usb: Mutex::new(usb),
            pll: Mutex::new(pll),
            endpoints: [EndpointSlot::default(); ENDPOINTS],
            pending_ins: Mutex::new(Cell::new(0)),
            address_pending: Mutex::new(Cell::new(false)),
            suspended: Mutex::new(Cell::new(false)),
        }
    }

    fn select(&self, usb: &USB_DEVICE, index: usize) -> usb_device::Result<()> {
        if index >= ENDPOINTS || !self.endpoints[index].allocated {
            return Err(UsbError::InvalidEndpoint);
        }
        usb.uenum.write(|w| unsafe { w.bits(index as u8) });
        Ok(())
    }

    fn configure(&self, usb: &USB_DEVICE, index: usize) {
        let slot = &self.endpoints[index];
        usb.uenum.write(|w| unsafe { w.bits(index as u8) });
        usb.ueconx.write(|w| unsafe { w.bits(EPEN) });
        usb.uecfg0x.write(|w| unsafe { w.bits(slot.config0) });
        usb.uecfg1x.write(|w| unsafe { w.bits((slot.size_code << 4) | ALLOC) });
    }
}

// Interrupt flags clear by writing 0; writing 1 leaves them untouched
fn clear_ueintx(usb: &USB_DEVICE, mask: u8) {
    usb.ueintx.write(|w| unsafe { w.bits(!mask) });
}

fn clear_udint(usb: &USB_DEVICE, mask: u8) {
    usb.udint.write(|w| unsafe { w.bits(!mask) });
}

fn read_bank(usb: &USB_DEVICE, buf: &mut [u8]) -> usb_device::Result<usize> {
    let len = usb.uebclx.read().bits() as usize;
    if len > buf.len() {
        return Err(UsbError::BufferOverflow);
    }
    for byte in &mut buf[..len] {
        *byte = usb.uedatx.read().bits();
    }
    Ok(len)
}

fn write_bank(usb: &USB_DEVICE, buf: &[u8]) {
    for &byte in buf {
        usb.uedatx.write(|w| unsafe { w.bits(byte) });
    }
}

impl usb_device::bus::UsbBus for UsbBus {
    // UDADDR must be loaded while the status stage is still ahead
    const QUIRK_SET_ADDRESS_BEFORE_STATUS: bool = true;

    fn alloc_ep(
        &mut self,
        ep_dir: UsbDirection,
        ep_addr: Option<EndpointAddress>,
        ep_type: EndpointType,
        max_packet_size: u16,
        _interval: u8,
    ) -> usb_device::Result<EndpointAddress> {
        let index = match ep_addr {
            Some(addr) => addr.index(),
            None => (1..ENDPOINTS)
                .find(|&i| !self.endpoints[i].allocated)
                .ok_or(UsbError::EndpointOverflow)?,
        };
        if index >= ENDPOINTS {
            return Err(UsbError::InvalidEndpoint);
        }

        let slot = &mut self.endpoints[index];
        // EP0 is bidirectional and gets allocated once per direction
        if slot.allocated && index != 0 {
            return Err(UsbError::InvalidEndpoint);
        }
        let size_code = size_code(max_packet_size).ok_or(UsbError::EndpointMemoryOverflow)?;
        let direction = match ep_dir {
            UsbDirection::In if index != 0 => EPDIR,
            _ => 0,
        };

        *slot = EndpointSlot {
            allocated: true,
            config0: (type_bits(ep_type) << 6) | direction,
            size_code,
            max_packet_size,
        };
        Ok(EndpointAddress::from_parts(index, ep_dir))
    }

    fn enable(&mut self) {
        interrupt::free(|cs| {
            let usb = self.usb.borrow(cs);
            let pll = self.pll.borrow(cs);

            usb.uhwcon.write(|w| unsafe { w.bits(UVREGE) });
            usb.usbcon.write(|w| unsafe { w.bits(USBE | FRZCLK) });

            pll.pllfrq.write(|w| unsafe { w.bits(PDIV_48MHZ) });
            pll.pllcsr.write(|w| unsafe { w.bits(PINDIV | PLLE) });
            while pll.pllcsr.read().bits() & PLOCK == 0 {}

            usb.usbcon.write(|w| unsafe { w.bits(USBE | OTGPADE) });
            usb.udcon.write(|w| unsafe { w.bits(0x00) });
        });
    }

    fn reset(&self) {
        interrupt::free(|cs| {
            let usb = self.usb.borrow(cs);
            for index in 0..ENDPOINTS {
                if self.endpoints[index].allocated {
                    self.configure(usb, index);
                }
            }
            usb.uenum.write(|w| unsafe { w.bits(0) });
            self.pending_ins.borrow(cs).set(0);
            self.address_pending.borrow(cs).set(false);
        });
    }

    fn set_device_address(&self, addr: u8) {
        interrupt::free(|cs| {
            let usb = self.usb.borrow(cs);
            usb.udaddr.write(|w| unsafe { w.bits(addr & 0x7F) });
            self.address_pending.borrow(cs).set(true);
        });
    }

    fn write(&self, ep_addr: EndpointAddress, buf: &[u8]) -> usb_device::Result<usize> {
        let index = ep_addr.index();
        interrupt::free(|cs| {
            let usb = self.usb.borrow(cs);
            self.select(usb, index)?;
            if buf.len() > self.endpoints[index].max_packet_size as usize {
                return Err(UsbError::BufferOverflow);
            }
            if usb.ueintx.read().bits() & TXINI == 0 {
                return Err(UsbError::WouldBlock);
            }

            if index == 0 {
                write_bank(usb, buf);
                clear_ueintx(usb, TXINI);
            } else {
                clear_ueintx(usb, TXINI);
                write_bank(usb, buf);
                clear_ueintx(usb, FIFOCON);
            }
            let pending = self.pending_ins.borrow(cs);
            pending.set(pending.get() | 1 << index);
            Ok(buf.len())
        })
    }

    fn read(&self, ep_addr: EndpointAddress, buf: &mut [u8]) -> usb_device::Result<usize> {
        let index = ep_addr.index();
        interrupt::free(|cs| {
            let usb = self.usb.borrow(cs);
            self.select(usb, index)?;
            let flags = usb.ueintx.read().bits();

            if index == 0 {
                let flag = if flags & RXSTPI != 0 {
                    RXSTPI
                } else if flags & RXOUTI != 0 {
                    RXOUTI
                } else {
                    return Err(UsbError::WouldBlock);
                };
                let len = read_bank(usb, buf)?;
                clear_ueintx(usb, flag);
                return Ok(len);
            }

            if flags & RXOUTI == 0 {
                return Err(UsbError::WouldBlock);
            }
            clear_ueintx(usb, RXOUTI);
            let len = read_bank(usb, buf);
            clear_ueintx(usb, FIFOCON);
            len
        })
    }

    fn set_stalled(&self, ep_addr: EndpointAddress, stalled: bool) {
        interrupt::free(|cs| {
            let usb = self.usb.borrow(cs);
            if self.select(usb, ep_addr.index()).is_ok() {
                usb.ueconx.modify(|r, w| unsafe {
                    if stalled {
                        w.bits(r.bits() | STALLRQ)
                    } else {
                        w.bits((r.bits() & !STALLRQ) | STALLRQC)
                    }
                });
            }
        });
    }

    fn is_stalled(&self, ep_addr: EndpointAddress) -> bool {
        interrupt::free(|cs| {
            let usb = self.usb.borrow(cs);
            self.select(usb, ep_addr.index()).is_ok() && usb.ueconx.read().bits() & STALLRQ != 0
        })
    }

    fn suspend(&self) {
        interrupt::free(|cs| {
            let usb = self.usb.borrow(cs);
            usb.usbcon.modify(|r, w| unsafe { w.bits(r.bits() | FRZCLK) });
            self.suspended.borrow(cs).set(true);
        });
    }

    fn resume(&self) {
        interrupt::free(|cs| {
            let usb = self.usb.borrow(cs);
            usb.usbcon.modify(|r, w| unsafe { w.bits(r.bits() & !FRZCLK) });
            clear_udint(usb, WAKEUPI);
            self.suspended.borrow(cs).set(false);
        });
    }

    fn poll(&self) -> PollResult {
        interrupt::free(|cs| {
            let usb = self.usb.borrow(cs);
            let udint = usb.udint.read().bits();

            if udint & EORSTI != 0 {
                clear_udint(usb, EORSTI);
                return PollResult::Reset;
            }
            if udint & SUSPI != 0 {
                clear_udint(usb, SUSPI);
                return PollResult::Suspend;
            }
            if udint & WAKEUPI != 0 {
                // the flag cannot be cleared with the clock frozen; resume does it
                if self.suspended.borrow(cs).get() {
                    return PollResult::Resume;
                }
                clear_udint(usb, WAKEUPI);
            }

            let pending = self.pending_ins.borrow(cs);
            let mut ep_out = 0u16;
            let mut ep_in_complete = 0u16;
            let mut ep_setup = 0u16;

            for index in 0..ENDPOINTS {
                if !self.endpoints[index].allocated {
                    continue;
                }
                usb.uenum.write(|w| unsafe { w.bits(index as u8) });
                let flags = usb.ueintx.read().bits();
                let bit = 1u16 << index;

                if flags & RXSTPI != 0 {
                    ep_setup |= bit;
                } else if flags & RXOUTI != 0 {
                    ep_out |= bit;
                }
                if pending.get() & (1 << index) != 0 && flags & TXINI != 0 {
                    pending.set(pending.get() & !(1 << index));
                    ep_in_complete |= bit;

                    let address_pending = self.address_pending.borrow(cs);
                    if index == 0 && address_pending.get() {
                        usb.udaddr.modify(|r, w| unsafe { w.bits(r.bits() | ADDEN) });
                        address_pending.set(false);
                    }
                }
            }

            if ep_out | ep_in_complete | ep_setup == 0 {
                PollResult::None
            } else {
                PollResult::Data {
                    ep_out,
                    ep_in_complete,
                    ep_setup,
                }
            }
        })
    }
}

impl Detach for UsbBus {
    fn detach(&self) {
        interrupt::free(|cs| {
            let usb = self.usb.borrow(cs);
            let pll = self.pll.borrow(cs);

            usb.udcon.write(|w| unsafe { w.bits(DETACH) });
            usb.usbcon.write(|w| unsafe { w.bits(FRZCLK) });
            pll.pllcsr.write(|w| unsafe { w.bits(0x00) });
            usb.uhwcon.write(|w| unsafe { w.bits(0x00) });
        });
    }
}
