//! Round-robin main loop
//!
//! There is one task besides the USB housekeeping: the command menu. Both run
//! in turn from a single loop, and the menu keeps the channel serviced while
//! it waits for input.

use core::cell::Cell;

use crate::application::Menu;
use crate::bootloader::{FuseReader, Handoff};
use crate::drivers::SerialConsole;
use crate::logger::Log;
use crate::protocol::PacketChannel;

pub struct Scheduler {
    tick_count: Cell<u32>,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tick_count: Cell::new(0),
        }
    }

    /// Completed passes through the loop
    #[inline]
    pub fn get_ticks(&self) -> u32 {
        self.tick_count.get()
    }

    /// One pass: USB housekeeping, then the menu
    pub fn step<C, L, F, H>(&self, console: &mut SerialConsole<C, L>, menu: &mut Menu<F, H>)
    where
        C: PacketChannel,
        L: Log,
        F: FuseReader,
        H: Handoff,
    {
        console.service();
        menu.tick(console);
        self.tick_count.set(self.tick_count.get().wrapping_add(1));
    }

    pub fn run<C, L, F, H>(&self, console: &mut SerialConsole<C, L>, menu: &mut Menu<F, H>) -> !
    where
        C: PacketChannel,
        L: Log,
        F: FuseReader,
        H: Handoff,
    {
        info!(*console.log(), "menu running");
        loop {
            self.step(console, menu);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
