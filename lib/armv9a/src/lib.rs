#![no_std]
#![warn(rust_2018_idioms)]

#[macro_use]
pub mod r#macro;

pub mod regs;
pub use regs::*;

// re-exported so that users decode run-page values without naming tock_registers
pub use tock_registers::interfaces::{Readable, Writeable};
pub use tock_registers::registers::InMemoryRegister;

pub const fn bits_in_reg(mask: u64, val: u64) -> u64 {
    (val << (mask.trailing_zeros())) & mask
}
