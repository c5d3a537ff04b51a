//! Fuse and lock bit readback, and the jump into the boot section

use core::arch::asm;

use crate::bootloader::{Fuse, FuseReader, Handoff};

// SPMCSR bits; the register sits at I/O address 0x37
const SPMEN: u8 = 1 << 0;
const BLBSET: u8 = 1 << 3;

/// Z pointer value selecting each byte for an LPM after BLBSET
fn z_address(fuse: Fuse) -> u16 {
    match fuse {
        Fuse::Low => 0x0000,
        Fuse::Lock => 0x0001,
        Fuse::Extended => 0x0002,
        Fuse::High => 0x0003,
    }
}

pub struct Fuses {
    _private: (),
}

impl Fuses {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for Fuses {
    fn default() -> Self {
        Self::new()
    }
}

impl FuseReader for Fuses {
    /// The LPM has to follow the SPMCSR write within three cycles, so callers
    /// go through `with_interrupts_masked`.
    fn read(&self, fuse: Fuse) -> u8 {
        let value: u8;
        unsafe {
            asm!(
                "out 0x37, {flags}",
                "lpm {value}, Z",
                flags = in(reg) SPMEN | BLBSET,
                value = out(reg) value,
                in("Z") z_address(fuse),
            );
        }
        value
    }

    fn with_interrupts_masked<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        avr_device::interrupt::free(|_| f(self))
    }
}

pub struct BootJump;

impl Handoff for BootJump {
    fn mask_interrupts(&mut self) {
        avr_device::interrupt::disable();
    }

    fn jump(&mut self, word_address: u16) -> ! {
        unsafe {
            asm!("ijmp", in("Z") word_address, options(noreturn));
        }
    }
}
