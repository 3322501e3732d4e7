/*
 * Copyright 2018 Ian Johnson
 *
 * This is free software, distributed under the MIT license.  A copy of the
 * license can be found in the LICENSE file in the project root, or at
 * https://opensource.org/licenses/MIT.
 */

//! The Chip-8 interpreter.
//!
//! The main focus of this module is the `Interpreter` struct, which contains
//! the entire state of the emulated machine (memory, registers, call stack,
//! timers, screen and keypad) and provides the interface used by the
//! front-end.  Execution is driven through `tick`, which converts elapsed
//! wall-clock time into instruction cycles and timer decrements at two
//! independent fixed rates, so emulated speed does not depend on the host
//! frame rate.
//!
//! Every instruction either completes fully or returns an error before any
//! state has been touched; errors are integrity violations of the running
//! program (bad jumps, stack misuse, illegal memory accesses) and have no
//! recovery path, so the caller is expected to stop the machine and report
//! them.

use std::default::Default;
use std::io::Read;
use std::num::Wrapping;
use std::u8;

use failure::{Error, ResultExt};
use rand;

use MEM_SIZE;
use PROG_START;
use PROG_SIZE;
use Register;
use display::{Screen, FONT_SPRITES, GLYPH_HEIGHT};
use input::{self, Key};
use instruction::{Address, AlignedAddress, Instruction, Opcode};
use memory::{self, MemoryUsage};
use timer::Pacer;

/// The location of the font sprites in reserved memory.
const FONT_START: usize = 0x0;
/// The maximum number of nested subroutine calls.
pub const STACK_SIZE: usize = 16;

/// An error resulting from a bad `RET` instruction.
#[derive(Debug, Fail)]
#[fail(display = "no subroutine to return from")]
pub struct StackUnderflowError;

/// An error resulting from exceeding the maximum subroutine call depth.
#[derive(Debug, Fail)]
#[fail(display = "subroutine call depth exceeds {}", _0)]
pub struct StackOverflowError(pub usize);

/// An error resulting from an input program being too large.
#[derive(Debug, Fail)]
#[fail(display = "input program is too large")]
pub struct ProgramTooLargeError;

/// An error resulting from overflowing the 16-bit register `I`.
#[derive(Debug, Fail)]
#[fail(display = "register 'I' overflowed")]
pub struct AddressRegisterOverflowError;

/// An error resulting from a digit with no font glyph.
#[derive(Debug, Fail)]
#[fail(display = "no font glyph for digit {:#04X}", _0)]
pub struct InvalidDigitError(pub u8);

/// Options for the interpreter.
pub struct Options {
    /// The frequency at which to execute instructions, in Hz (default 500).
    pub cpu_freq: u32,
    /// The frequency at which the delay and sound timers tick down, in Hz
    /// (default 60).
    pub timer_freq: u32,
}

impl Options {
    /// Returns the default set of options.
    pub fn new() -> Self {
        Options {
            cpu_freq: 500,
            timer_freq: 60,
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::new()
    }
}

/// A Chip-8 interpreter.
///
/// This struct contains the entire state of a Chip-8 machine and provides
/// all the expected methods for interacting with it, such as stepping
/// through execution and inspecting the internal state.
pub struct Interpreter {
    /// The internal memory.
    mem: [u8; MEM_SIZE],
    /// The display surface.
    screen: Screen,
    /// The input state.
    input: input::State,
    /// The general-purpose registers `V0`-`VF`.
    regs: [Wrapping<u8>; 16],
    /// The special register `I`.
    reg_i: u16,
    /// The delay timer.
    reg_dt: u8,
    /// The sound timer.
    reg_st: u8,
    /// The program counter.
    pc: AlignedAddress,
    /// The call stack (for returning from subroutines).
    call_stack: Vec<AlignedAddress>,
    /// The memory offset of each font glyph, by digit.
    font_offsets: [u16; 16],
    /// Pacing for instruction execution.
    cpu_pacer: Pacer,
    /// Pacing for the delay and sound timers.
    timer_pacer: Pacer,
}

impl Interpreter {
    /// Returns a new interpreter with the default options.
    pub fn new() -> Self {
        Interpreter::with_options(Options::default())
    }

    /// Returns a new interpreter using the given options.
    pub fn with_options(options: Options) -> Self {
        let mut interpreter = Interpreter {
            mem: [0; MEM_SIZE],
            screen: Screen::new(),
            input: input::State::new(),
            regs: [Wrapping(0); 16],
            reg_i: 0,
            reg_dt: 0,
            reg_st: 0,
            pc: Address::from_usize(PROG_START).unwrap().aligned().unwrap(),
            call_stack: Vec::with_capacity(STACK_SIZE),
            font_offsets: [0; 16],
            cpu_pacer: Pacer::new(options.cpu_freq),
            timer_pacer: Pacer::new(options.timer_freq),
        };

        // Copy the font sprites into reserved memory and remember where each
        // glyph landed.
        for (i, sprite) in FONT_SPRITES.iter().enumerate() {
            let start = FONT_START + i * GLYPH_HEIGHT;
            interpreter.mem[start..start + sprite.len()].copy_from_slice(sprite);
            interpreter.font_offsets[i] = start as u16;
        }

        interpreter
    }

    /// Loads program data from the specified source.
    pub fn load_program<R: Read>(&mut self, input: &mut R) -> Result<(), Error> {
        let read = input.read(&mut self.mem[PROG_START..])?;
        if read == PROG_SIZE {
            // Try to see if we missed part of the file.
            let mut tmp = [0u8];
            if input.read(&mut tmp)? == 1 {
                return Err(ProgramTooLargeError.into());
            }
        }
        Ok(())
    }

    /// Returns a reference to the display surface.
    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Returns a reference to the input state.
    pub fn input(&self) -> &input::State {
        &self.input
    }

    /// Returns a mutable reference to the input state.
    pub fn input_mut(&mut self) -> &mut input::State {
        &mut self.input
    }

    /// Returns a reference to the internal memory.
    pub fn mem(&self) -> &[u8; MEM_SIZE] {
        &self.mem
    }

    /// Returns a mutable reference to the internal memory.
    pub fn mem_mut(&mut self) -> &mut [u8; MEM_SIZE] {
        &mut self.mem
    }

    /// Returns the value of register `I`.
    pub fn i(&self) -> u16 {
        self.reg_i
    }

    /// Sets the value of register `I`.
    pub fn set_i(&mut self, val: u16) {
        self.reg_i = val;
    }

    /// Returns the value of the delay timer.
    pub fn dt(&self) -> u8 {
        self.reg_dt
    }

    /// Sets the value of the delay timer.
    pub fn set_dt(&mut self, val: u8) {
        self.reg_dt = val;
    }

    /// Returns the value of the sound timer.
    pub fn st(&self) -> u8 {
        self.reg_st
    }

    /// Sets the value of the sound timer.
    pub fn set_st(&mut self, val: u8) {
        self.reg_st = val;
    }

    /// Returns the value in the given register.
    pub fn register(&self, reg: Register) -> u8 {
        self.regs[reg as usize].0
    }

    /// Sets the given register to the given value.
    pub fn set_register(&mut self, reg: Register, val: u8) {
        self.regs[reg as usize].0 = val
    }

    /// Returns the value of the program counter.
    pub fn pc(&self) -> AlignedAddress {
        self.pc
    }

    /// Returns the current subroutine call depth.
    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Advances emulated time by the given number of milliseconds.
    ///
    /// Instructions execute at the configured CPU frequency and the delay and
    /// sound timers tick down at the timer frequency, independently of each
    /// other and of how often this method is called.  A long delta catches up
    /// by running however many instructions and timer decrements it covers.
    pub fn tick(&mut self, elapsed_ms: f64) -> Result<(), Error> {
        for _ in 0..self.timer_pacer.advance(elapsed_ms) {
            self.tick_timers();
        }
        for _ in 0..self.cpu_pacer.advance(elapsed_ms) {
            self.step()?;
        }
        Ok(())
    }

    /// Fetches, decodes and executes a single instruction.
    pub fn step(&mut self) -> Result<(), Error> {
        memory::check_range(self.pc.addr() as u16, 2, MemoryUsage::Execute)?;
        let instr = self.current_instruction()?;
        self.execute(instr)
    }

    /// Returns the instruction at the program counter.
    pub fn current_instruction(&self) -> Result<Instruction, Error> {
        let pc = self.pc;
        Ok(Instruction::from_opcode(self.current_opcode())
            .with_context(|_| format!("could not decode instruction at {}", pc))?)
    }

    /// Returns the opcode at the program counter.
    pub fn current_opcode(&self) -> Opcode {
        let high = self.mem[self.pc.addr()];
        let low = self.mem[self.pc.addr() + 1];
        Opcode::from_bytes(high, low)
    }

    /// Executes the given instruction in the current interpreter context.
    ///
    /// The interpreter will behave as if the given instruction were executed
    /// at the current program location in memory.
    pub fn execute(&mut self, ins: Instruction) -> Result<(), Error> {
        use self::Instruction::*;

        match ins {
            Cls => self.screen.clear(),
            Ret => {
                let ret = self.call_stack
                    .pop()
                    .ok_or(StackUnderflowError)
                    .with_context(|_| format!("error executing {}", ins))?;
                self.pc = (ret + 2).context("program counter overflowed")?;
                return Ok(());
            }
            // Machine-code routines don't exist here, so SYS has nothing to
            // jump into; programs in the wild only use it as filler.
            Sys(addr) => debug!("ignoring SYS {}", addr),
            Jp(addr) => {
                self.check_jump_target(addr)
                    .with_context(|_| format!("error executing {}", ins))?;
                self.pc = addr;
                return Ok(());
            }
            Call(addr) => {
                self.check_jump_target(addr)
                    .with_context(|_| format!("error executing {}", ins))?;
                if self.call_stack.len() == STACK_SIZE {
                    return Err(StackOverflowError(STACK_SIZE).into());
                }
                self.call_stack.push(self.pc);
                self.pc = addr;
                return Ok(());
            }
            SeByte(reg, b) => {
                let skip = self.register(reg) == b;
                return self.skip_if(skip);
            }
            SneByte(reg, b) => {
                let skip = self.register(reg) != b;
                return self.skip_if(skip);
            }
            SeReg(reg1, reg2) => {
                let skip = self.register(reg1) == self.register(reg2);
                return self.skip_if(skip);
            }
            LdByte(reg, b) => self.set_register(reg, b),
            // Unlike `ADD Vx, Vy`, the byte form never touches `VF`.
            AddByte(reg, b) => self.regs[reg as usize] += Wrapping(b),
            LdReg(reg1, reg2) => {
                let r2 = self.register(reg2);
                self.set_register(reg1, r2);
            }
            Or(reg1, reg2) => {
                let r1 = self.register(reg1);
                let r2 = self.register(reg2);
                self.set_register(reg1, r1 | r2);
            }
            And(reg1, reg2) => {
                let r1 = self.register(reg1);
                let r2 = self.register(reg2);
                self.set_register(reg1, r1 & r2);
            }
            Xor(reg1, reg2) => {
                let r1 = self.register(reg1);
                let r2 = self.register(reg2);
                self.set_register(reg1, r1 ^ r2);
            }
            AddReg(reg1, reg2) => {
                let r2 = self.register(reg2);
                self.add(reg1, r2);
            }
            Sub(reg1, reg2) => {
                let r2 = self.register(reg2);
                self.sub(reg1, r2);
            }
            Shr(reg, _) => self.shr(reg),
            Subn(reg1, reg2) => {
                let r2 = self.register(reg2);
                self.subn(reg1, r2);
            }
            Shl(reg, _) => self.shl(reg),
            SneReg(reg1, reg2) => {
                let skip = self.register(reg1) != self.register(reg2);
                return self.skip_if(skip);
            }
            LdI(addr) => self.reg_i = addr.addr() as u16,
            JpV0(addr) => {
                let target = (addr + self.register(Register::V0) as usize)
                    .context("attempted to jump to out of bounds address")?
                    .aligned()
                    .context("attempted to jump to misaligned address")?;
                self.check_jump_target(target)
                    .with_context(|_| format!("error executing {}", ins))?;
                self.pc = target;
                return Ok(());
            }
            Rnd(reg, b) => self.set_register(reg, rand::random::<u8>() & b),
            Drw(reg1, reg2, n) => {
                let collision = self.drw(reg1, reg2, n)
                    .with_context(|_| format!("error executing {}", ins))?;
                self.set_register(Register::VF, collision as u8);
            }
            Skp(reg) => {
                let key = Key::from_byte(self.register(reg))
                    .with_context(|_| format!("error executing {}", ins))?;
                let skip = self.input.is_pressed(key);
                return self.skip_if(skip);
            }
            Sknp(reg) => {
                let key = Key::from_byte(self.register(reg))
                    .with_context(|_| format!("error executing {}", ins))?;
                let skip = !self.input.is_pressed(key);
                return self.skip_if(skip);
            }
            LdRegDt(reg) => {
                let dt = self.dt();
                self.set_register(reg, dt);
            }
            // Waiting for input parks the machine on this instruction: with
            // no key down the program counter is left in place, so the same
            // instruction runs again on the next cycle while the timers keep
            // draining.
            LdKey(reg) => match self.input.first_pressed() {
                Some(key) => self.set_register(reg, key as u8),
                None => return Ok(()),
            },
            LdDtReg(reg) => {
                let r = self.register(reg);
                self.set_dt(r);
            }
            LdSt(reg) => {
                let r = self.register(reg);
                self.set_st(r);
            }
            AddI(reg) => self.add_i(reg)
                .with_context(|_| format!("error executing {}", ins))?,
            LdF(reg) => self.ld_f(reg)
                .with_context(|_| format!("error executing {}", ins))?,
            LdB(reg) => self.ld_b(reg)
                .with_context(|_| format!("error executing {}", ins))?,
            LdDerefIReg(reg) => self.ld_deref_i_reg(reg)
                .with_context(|_| format!("error executing {}", ins))?,
            LdRegDerefI(reg) => self.ld_reg_deref_i(reg)
                .with_context(|_| format!("error executing {}", ins))?,
        }

        self.pc = (self.pc + 2).context("program counter overflowed")?;
        Ok(())
    }

    /// Adds the given byte to the given register, setting `VF` to 1 on carry
    /// or 0 otherwise.
    fn add(&mut self, reg: Register, val: u8) {
        let carry = val > u8::MAX - self.register(reg);
        self.regs[reg as usize] += Wrapping(val);
        self.set_register(Register::VF, carry as u8);
    }

    /// Implements the `ADD I, Vx` operation.
    ///
    /// Register `I` is 16 bits wide; unlike the V-register adds, carrying it
    /// past 0xFFFF does not wrap.
    fn add_i(&mut self, reg: Register) -> Result<(), AddressRegisterOverflowError> {
        let sum = self.reg_i as u32 + self.register(reg) as u32;
        if sum > 0xFFFF {
            return Err(AddressRegisterOverflowError);
        }
        self.reg_i = sum as u16;
        Ok(())
    }

    /// Checks that a jump destination lies in executable memory.
    fn check_jump_target(&self, addr: AlignedAddress) -> Result<(), memory::MemoryAccessError> {
        memory::check_range(addr.addr() as u16, 2, MemoryUsage::Execute)
    }

    /// Implements the `DRW` operation, returning whether there was a
    /// collision.
    fn drw(&mut self, reg1: Register, reg2: Register, n: u8) -> Result<bool, memory::MemoryAccessError> {
        if n == 0 {
            return Ok(false);
        }
        memory::check_range(self.reg_i, n as u16, MemoryUsage::Read)?;

        let start = self.reg_i as usize;
        let x = self.register(reg1) as usize;
        let y = self.register(reg2) as usize;
        Ok(self.screen
            .draw_sprite(&self.mem[start..start + n as usize], x, y))
    }

    /// Implements the `LD F, Vx` operation.
    fn ld_f(&mut self, reg: Register) -> Result<(), InvalidDigitError> {
        let digit = self.register(reg);
        if digit as usize >= self.font_offsets.len() {
            return Err(InvalidDigitError(digit));
        }
        self.reg_i = self.font_offsets[digit as usize];
        Ok(())
    }

    /// Implements the `LD B, Vx` operation.
    fn ld_b(&mut self, reg: Register) -> Result<(), memory::MemoryAccessError> {
        memory::check_range(self.reg_i, 3, MemoryUsage::Write)?;

        let val = self.register(reg);
        let addr = self.reg_i as usize;
        self.mem[addr] = val / 100;
        self.mem[addr + 1] = val % 100 / 10;
        self.mem[addr + 2] = val % 10;
        Ok(())
    }

    /// Implements the `LD [I], Vx` operation.
    fn ld_deref_i_reg(&mut self, reg: Register) -> Result<(), memory::MemoryAccessError> {
        let count = reg as usize + 1;
        memory::check_range(self.reg_i, count as u16, MemoryUsage::Write)?;

        let start = self.reg_i as usize;
        for (dest, src) in self.mem[start..start + count]
            .iter_mut()
            .zip(self.regs[..count].iter())
        {
            *dest = src.0;
        }
        Ok(())
    }

    /// Implements the `LD Vx, [I]` operation.
    fn ld_reg_deref_i(&mut self, reg: Register) -> Result<(), memory::MemoryAccessError> {
        let count = reg as usize + 1;
        memory::check_range(self.reg_i, count as u16, MemoryUsage::Read)?;

        let start = self.reg_i as usize;
        for (dest, src) in self.regs[..count]
            .iter_mut()
            .zip(self.mem[start..start + count].iter())
        {
            *dest = Wrapping(*src);
        }
        Ok(())
    }

    /// Sets `reg` to `reg >> 1`, setting `VF` to the old lowest bit.
    fn shr(&mut self, reg: Register) {
        let old = self.register(reg);
        self.set_register(reg, old >> 1);
        self.set_register(Register::VF, old & 1);
    }

    /// Sets `reg` to `reg << 1`, setting `VF` to the old highest bit.
    fn shl(&mut self, reg: Register) {
        let old = self.register(reg);
        self.set_register(reg, old << 1);
        self.set_register(Register::VF, old >> 7);
    }

    /// Implements the skip behavior shared by `SE`, `SNE`, `SKP` and `SKNP`:
    /// both candidate successor slots must be executable, then the program
    /// counter moves past the next instruction if `skip` holds.
    fn skip_if(&mut self, skip: bool) -> Result<(), Error> {
        memory::check_range(self.pc.addr() as u16, 6, MemoryUsage::Execute)?;
        let width = if skip { 4 } else { 2 };
        self.pc = (self.pc + width).context("program counter overflowed")?;
        Ok(())
    }

    /// Subtracts the given byte from the given register, setting `VF` to 1 if
    /// the register's value was strictly greater than the byte or 0
    /// otherwise.
    fn sub(&mut self, reg: Register, val: u8) {
        let not_borrow = self.register(reg) > val;
        self.regs[reg as usize] -= Wrapping(val);
        self.set_register(Register::VF, not_borrow as u8);
    }

    /// Sets `reg` to `val - reg`, setting `VF` to 1 if the byte was strictly
    /// greater than the register's value or 0 otherwise.
    fn subn(&mut self, reg: Register, val: u8) {
        let not_borrow = val > self.register(reg);
        self.regs[reg as usize] = Wrapping(val) - self.regs[reg as usize];
        self.set_register(Register::VF, not_borrow as u8);
    }

    /// Decrements the delay and sound timers, stopping at zero.
    fn tick_timers(&mut self) {
        if self.reg_dt > 0 {
            self.reg_dt -= 1;
        }
        if self.reg_st > 0 {
            self.reg_st -= 1;
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}
