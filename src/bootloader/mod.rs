//! Boot section location and the jump into it
//!
//! The boot section sits at the end of flash and its size is chosen by the
//! BOOTSZ1..0 bits of the high fuse. Addresses here are word addresses, the
//! unit the CPU uses for program memory.

use crate::protocol::PacketChannel;

/// Smallest boot section in words (BOOTSZ index 3)
const MIN_BOOT_WORDS: u16 = 256;
// last byte address whose word address still fits 16 bits
const MAX_FLASH_END: u32 = 0x1FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fuse {
    Low,
    High,
    Extended,
    Lock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuseSet {
    pub low: u8,
    pub high: u8,
    pub extended: u8,
    pub lock: u8,
}

/// Access to the fuse and lock bytes
pub trait FuseReader {
    fn read(&self, fuse: Fuse) -> u8;

    /// Run `f` with interrupts disabled, restoring them afterwards
    fn with_interrupts_masked<R>(&self, f: impl FnOnce(&Self) -> R) -> R;

    /// All four bytes read inside one masked section
    fn snapshot(&self) -> FuseSet {
        self.with_interrupts_masked(|fuses| FuseSet {
            low: fuses.read(Fuse::Low),
            high: fuses.read(Fuse::High),
            extended: fuses.read(Fuse::Extended),
            lock: fuses.read(Fuse::Lock),
        })
    }
}

/// Non-returning transfer of control to another firmware image
pub trait Handoff {
    /// Disable interrupts for good
    fn mask_interrupts(&mut self);
    fn jump(&mut self, word_address: u16) -> !;
}

/// Boot section start and size, both in words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub address: u16,
    pub size: u16,
}

/// Chip layout needed to find the boot section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootTarget {
    flash_end: u32,
    bootsz0: u8,
    bootsz1: u8,
}

impl BootTarget {
    /// Panics unless the flash holds the largest boot section and every
    /// boot section address fits a 16-bit word address.
    pub const fn new(flash_end: u32, bootsz0: u8, bootsz1: u8) -> Self {
        assert!(flash_end <= MAX_FLASH_END, "flash end beyond 16-bit word addressing");
        assert!(
            (flash_end >> 1) + 1 >= (MIN_BOOT_WORDS as u32) << 3,
            "flash smaller than the largest boot section"
        );
        Self {
            flash_end,
            bootsz0,
            bootsz1,
        }
    }

    pub fn flash_end(&self) -> u32 {
        self.flash_end
    }

    /// Boot section size in words.
    ///
    /// A programmed fuse bit reads as 0; BOOTSZ0 gives bit 0 of the index and
    /// BOOTSZ1 bit 1, and the size is `256 << (3 - index)`.
    pub fn size_words(&self, high_fuse: u8) -> u16 {
        let index = (high_fuse & self.bootsz0 == 0) as u8
            | ((high_fuse & self.bootsz1 == 0) as u8) << 1;
        MIN_BOOT_WORDS << (3 - index)
    }

    /// First word of the boot section
    pub fn address(&self, high_fuse: u8) -> u16 {
        let last_word = self.flash_end >> 1;
        (last_word + 1 - self.size_words(high_fuse) as u32) as u16
    }

    /// Size and address from a single masked read of the high fuse
    pub fn locate<F: FuseReader>(&self, fuses: &F) -> Region {
        let high = fuses.with_interrupts_masked(|f| f.read(Fuse::High));
        Region {
            address: self.address(high),
            size: self.size_words(high),
        }
    }
}

/// Leave the application for the boot section. Never returns.
pub fn enter<C, F, H>(channel: &mut C, fuses: &F, handoff: &mut H, target: &BootTarget) -> !
where
    C: PacketChannel,
    F: FuseReader,
    H: Handoff,
{
    channel.disable();
    handoff.mask_interrupts();

    let region = target.locate(fuses);
    handoff.jump(region.address)
}
