use avr_device::atmega32u4::{CPU, WDT};
use avr_device::interrupt;

// MCUSR
const WDRF: u8 = 1 << 3;
// WDTCSR
const WDE: u8 = 1 << 3;
const WDCE: u8 = 1 << 4;
// CLKPR
const CLKPCE: u8 = 1 << 7;

pub struct Watchdog {
    _private: (),
}

impl Watchdog {
    #[inline]
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Stop a watchdog left running across a reset.
    ///
    /// WDRF has to be cleared first, it forces WDE on while set.
    pub fn disable(&mut self, cpu: &CPU, wdt: &WDT) {
        interrupt::free(|_| {
            avr_device::asm::wdr();
            cpu.mcusr.modify(|r, w| unsafe { w.bits(r.bits() & !WDRF) });
            // Timed sequence: both writes within four cycles
            wdt.wdtcsr.write(|w| unsafe { w.bits(WDCE | WDE) });
            wdt.wdtcsr.write(|w| unsafe { w.bits(0x00) });
        });
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the core at the full crystal frequency (the CKDIV8 fuse may have
/// left a divider of 8 in place)
pub fn clock_prescale_none(cpu: &CPU) {
    interrupt::free(|_| {
        cpu.clkpr.write(|w| unsafe { w.bits(CLKPCE) });
        cpu.clkpr.write(|w| unsafe { w.bits(0x00) });
    });
}
