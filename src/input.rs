/*
 * Copyright 2018 Ian Johnson
 *
 * This is free software, distributed under the MIT license.  A copy of the
 * license can be found in the LICENSE file in the project root, or at
 * https://opensource.org/licenses/MIT.
 */

//! Input handling for the Chip-8 interpreter.
//!
//! The controller is a 16-key pad, keys `0`-`F`.  The front-end maps host key
//! events onto `press`/`release`; the interpreter queries the state when
//! executing the key-dependent instructions.

use std::default::Default;

use num::traits::FromPrimitive;

/// The number of keys on the Chip-8 controller.
const N_KEYS: usize = 16;

/// An error resulting from a byte that names no key.
#[derive(Debug, Fail, PartialEq, Eq)]
#[fail(display = "invalid key identifier: {:#04X}", _0)]
pub struct InvalidKeyError(pub u8);

enum_from_primitive! {
/// The keys on the Chip-8 controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    K0 = 0,
    K1,
    K2,
    K3,
    K4,
    K5,
    K6,
    K7,
    K8,
    K9,
    KA,
    KB,
    KC,
    KD,
    KE,
    KF
}
}

impl Key {
    /// Returns the key identified by the given byte, or an error if the byte
    /// is not in the range `0`-`15`.
    pub fn from_byte(b: u8) -> Result<Key, InvalidKeyError> {
        Key::from_u8(b).ok_or(InvalidKeyError(b))
    }
}

/// Represents the state of the input device.
///
/// Key states are held as a bitmask, bit `k` being set while key `k` is down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct State {
    /// The pressed-key bitmask.
    keys: u16,
}

impl State {
    /// Returns a new input state with all keys unpressed.
    pub fn new() -> Self {
        State::default()
    }

    /// Returns the lowest-numbered key that is pressed, and releases it.
    ///
    /// Releasing the key on read means a single press satisfies at most one
    /// wait; returns `None` when no key is down, which is how a "wait for
    /// key" caller polls without blocking.
    pub fn first_pressed(&mut self) -> Option<Key> {
        for k in 0..N_KEYS {
            let mask = 1 << k;
            if self.keys & mask != 0 {
                self.keys &= !mask;
                return Some(Key::from_usize(k).unwrap());
            }
        }
        None
    }

    /// Returns whether the given key is pressed.
    pub fn is_pressed(&self, key: Key) -> bool {
        self.keys & (1 << key as u16) != 0
    }

    /// Presses the given key.
    pub fn press(&mut self, key: Key) {
        self.set_pressed(key, true);
    }

    /// Releases the given key.
    pub fn release(&mut self, key: Key) {
        self.set_pressed(key, false);
    }

    /// Sets the given key's state; repeating the current state is a no-op.
    pub fn set_pressed(&mut self, key: Key, pressed: bool) {
        let mask = 1u16 << key as u16;
        if pressed {
            self.keys |= mask;
        } else {
            self.keys &= !mask;
        }
    }
}
