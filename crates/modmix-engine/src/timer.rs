//! Row-tick timer: a down-counter fed by the mixing clock.
//!
//! `clock()` runs in the mixing context, every other method in the control
//! context. Period changes are latched and consumed by the next `clock()` so
//! the mixing path never observes a torn value.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

pub struct Timer {
    counter: u32,
    period: u32,
    new_period: AtomicU32,
    load_new_period: AtomicBool,
    fire_counter: AtomicU8,
    fire_counter_last: u8,
}

impl Timer {
    pub fn new(period: u32) -> Self {
        let period = period.max(1);
        Self {
            counter: period,
            period,
            new_period: AtomicU32::new(period),
            load_new_period: AtomicBool::new(false),
            fire_counter: AtomicU8::new(0),
            fire_counter_last: 0,
        }
    }

    pub fn reset(&mut self, period: u32) {
        let period = period.max(1);
        self.period = period;
        self.counter = period;
        self.new_period.store(period, Ordering::Relaxed);
        self.load_new_period.store(false, Ordering::Relaxed);
        self.fire_counter.store(0, Ordering::Relaxed);
        self.fire_counter_last = 0;
    }

    /// The most recently requested period.
    pub fn period(&self) -> u32 {
        self.new_period.load(Ordering::Relaxed)
    }

    /// Request a new period, taking effect at the next `clock()`.
    ///
    /// A still-pending latch is overwritten rather than waited on: in a
    /// cooperative driver nothing can consume the latch while the control
    /// path holds the engine, and before the next `clock()` only the last
    /// requested period matters anyway.
    pub fn set_period(&mut self, period: u32) {
        self.new_period.store(period.max(1), Ordering::Relaxed);
        self.load_new_period.store(true, Ordering::Relaxed);
    }

    /// Advance one mixing sample. Called from the interrupt path.
    pub fn clock(&mut self) {
        if self.load_new_period.load(Ordering::Relaxed) {
            self.period = self.new_period.load(Ordering::Relaxed);
            self.counter = self.period;
            self.load_new_period.store(false, Ordering::Relaxed);
        }

        self.counter -= 1;
        if self.counter == 0 {
            self.counter = self.period;
            let fired = self.fire_counter.load(Ordering::Relaxed);
            self.fire_counter.store(fired.wrapping_add(1), Ordering::Relaxed);
        }
    }

    /// True exactly once per fire, regardless of how the calls interleave.
    pub fn is_fired(&mut self) -> bool {
        let counter = self.fire_counter.load(Ordering::Relaxed);
        if counter == self.fire_counter_last {
            return false;
        }
        self.fire_counter_last = counter;
        true
    }
}
