use core::convert::Infallible;

use avr_device::atmega32u4::USART1;
use embedded_hal::serial;

use crate::config::CPU_FREQ_HZ;

// UCSR1A
const U2X1: u8 = 1 << 1;
const UDRE1: u8 = 1 << 5;
// UCSR1B
const TXEN1: u8 = 1 << 3;
// UCSR1C: asynchronous, 8 data bits, no parity, 1 stop bit
const FRAME_8N1: u8 = (1 << 2) | (1 << 1);

/// Double-speed divisor, rounded to nearest
const fn ubrr(baud: u32) -> u16 {
    ((CPU_FREQ_HZ + 4 * baud) / (8 * baud) - 1) as u16
}

/// Transmit-only USART1, used for the diagnostic log on the TXD1 pin
pub struct Uart {
    usart: USART1,
}

impl Uart {
    pub fn new(usart: USART1, baud: u32) -> Self {
        usart.ubrr1.write(|w| unsafe { w.bits(ubrr(baud)) });
        usart.ucsr1a.write(|w| unsafe { w.bits(U2X1) });
        usart.ucsr1c.write(|w| unsafe { w.bits(FRAME_8N1) });
        usart.ucsr1b.write(|w| unsafe { w.bits(TXEN1) });

        Self { usart }
    }

    fn data_register_empty(&self) -> bool {
        self.usart.ucsr1a.read().bits() & UDRE1 != 0
    }
}

impl serial::Write<u8> for Uart {
    type Error = Infallible;

    fn write(&mut self, byte: u8) -> nb::Result<(), Self::Error> {
        if !self.data_register_empty() {
            return Err(nb::Error::WouldBlock);
        }
        self.usart.udr1.write(|w| unsafe { w.bits(byte) });
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        if self.data_register_empty() {
            Ok(())
        } else {
            Err(nb::Error::WouldBlock)
        }
    }
}
