#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "avr", feature(asm_experimental_arch))]

#[macro_use]
pub mod logger;

pub mod application;
pub mod bootloader;
pub mod config;
pub mod drivers;
pub mod error;
pub mod os;
pub mod protocol;

#[cfg(target_arch = "avr")]
pub mod hal;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
