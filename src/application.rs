//! Command menu served over the USB console
//!
//! Each tick reads one line and acts on its first character. Nothing is
//! kept between ticks.

use ufmt::uwrite;

use crate::bootloader::{self, BootTarget, FuseReader, Handoff, Region};
use crate::config::{COMMAND_BUFFER_LEN, FLASHEND};
use crate::drivers::serial_console::{write_formatted, SerialConsole};
use crate::drivers::Hex;
use crate::logger::Log;
use crate::protocol::PacketChannel;

const HELP: [&str; 4] = [
    "OpenHR2 master menu",
    " h: print this message",
    " b: enter Bootloader mode",
    " S: print current settings",
];

const UNSUPPORTED: &str = "Unknown chip. Don't know where to find the bootloader.";

// Capacities of the formatted settings lines, terminator slot included
const ADDRESS_TEXT: usize = 9;
const FUSES_TEXT: usize = 55;
const FLASHEND_TEXT: usize = 19;
const BLSIZE_TEXT: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Bootloader,
    Settings,
}

impl Command {
    /// Classify a line by its first character; anything unknown is `Help`
    pub fn parse(line: &[u8]) -> Self {
        match line.first() {
            Some(b'b') => Command::Bootloader,
            Some(b'S') => Command::Settings,
            _ => Command::Help,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Bootloader => "bootloader",
            Command::Settings => "settings",
        }
    }
}

pub struct Menu<F, H> {
    fuses: F,
    handoff: H,
    bootloader: Option<BootTarget>,
}

impl<F: FuseReader, H: Handoff> Menu<F, H> {
    /// `bootloader` is `None` on parts whose boot section layout is unknown
    pub fn new(fuses: F, handoff: H, bootloader: Option<BootTarget>) -> Self {
        Self {
            fuses,
            handoff,
            bootloader,
        }
    }

    /// Serve one line. Blocks in the read until the host sends one.
    pub fn tick<C: PacketChannel, L: Log>(&mut self, console: &mut SerialConsole<C, L>) {
        let mut line = [0u8; COMMAND_BUFFER_LEN];
        let len = console.read_line(&mut line);
        if len == 0 {
            return;
        }
        self.dispatch(console, &line[..len]);
    }

    pub fn dispatch<C: PacketChannel, L: Log>(
        &mut self,
        console: &mut SerialConsole<C, L>,
        line: &[u8],
    ) {
        let command = Command::parse(line);
        debug!(*console.log(), "command {}", command.as_str());

        match command {
            Command::Bootloader => self.enter_bootloader(console),
            Command::Settings => self.print_settings(console),
            Command::Help => print_help(console),
        }
    }

    fn enter_bootloader<C: PacketChannel, L: Log>(&mut self, console: &mut SerialConsole<C, L>) {
        let target = match self.bootloader {
            Some(target) => target,
            None => {
                console.write_line(UNSUPPORTED).ok();
                return;
            }
        };

        info!(*console.log(), "jumping to boot section");
        bootloader::enter(console.channel_mut(), &self.fuses, &mut self.handoff, &target)
    }

    fn print_settings<C: PacketChannel, L: Log>(&mut self, console: &mut SerialConsole<C, L>) {
        let region: Option<Region> = self.bootloader.map(|target| target.locate(&self.fuses));

        console.write_str("Alternate region address: ").ok();
        match region {
            Some(region) => write_formatted::<_, _, ADDRESS_TEXT>(console, |w| {
                uwrite!(w, "0x{}\r\n", Hex::padded(region.address, 4))
            }),
            None => {
                console.write_line("unknown").ok();
            }
        }

        let fuses = self.fuses.snapshot();
        write_formatted::<_, _, FUSES_TEXT>(console, |w| {
            uwrite!(
                w,
                "Fuses: lfuse:0x{}, hfuse:0x{}, efuse:0x{}, lock:0x{}\r\n",
                Hex::padded(fuses.low, 2),
                Hex::padded(fuses.high, 2),
                Hex::padded(fuses.extended, 2),
                Hex::padded(fuses.lock, 2)
            )
        });

        let flash_end = self.bootloader.map_or(FLASHEND, |target| target.flash_end());
        write_formatted::<_, _, FLASHEND_TEXT>(console, |w| {
            uwrite!(w, "FLASHEND: 0x{}\r\n", Hex::padded(flash_end, 4))
        });

        match region {
            Some(region) => write_formatted::<_, _, BLSIZE_TEXT>(console, |w| {
                uwrite!(w, "blsize: 0x{}\r\n", Hex::padded(region.size, 4))
            }),
            None => {
                console.write_line("blsize: unknown").ok();
            }
        }
    }
}

fn print_help<C: PacketChannel, L: Log>(console: &mut SerialConsole<C, L>) {
    for line in HELP {
        console.write_line(line).ok();
    }
}
