/*
 * Copyright 2018 Ian Johnson
 *
 * This is free software, distributed under the MIT license.  A copy of the
 * license can be found in the LICENSE file in the project root, or at
 * https://opensource.org/licenses/MIT.
 */

//! A Chip-8 emulator core.
//!
//! The machine itself lives in the `interpreter` module; the other modules
//! provide the pieces it is built from (instruction decoding, the display
//! surface, the keypad, memory permission checks and execution pacing).
//! Everything host-facing (windowing, audio, key mapping) belongs to the
//! front-end binary, which talks to the core only through `Interpreter`.

#[macro_use]
extern crate enum_primitive;
extern crate failure;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;
extern crate num;
extern crate rand;

/// The size of the Chip-8's memory, in bytes.
pub const MEM_SIZE: usize = 0x1000;
/// The address where programs should be loaded.
pub const PROG_START: usize = 0x200;
/// The maximum size of a Chip-8 program, in bytes.
pub const PROG_SIZE: usize = MEM_SIZE - PROG_START;

pub mod display;
pub mod input;
pub mod instruction;
pub mod interpreter;
pub mod memory;
mod timer;

pub use instruction::{Address, AddressMisalignedError, AddressOutOfBoundsError, AlignedAddress,
                      Instruction, Opcode, Register};
pub use interpreter::{Interpreter, Options};
pub use memory::MemoryUsage;
