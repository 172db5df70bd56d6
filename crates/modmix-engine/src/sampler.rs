//! Per-channel sample playback.
//!
//! A sampler owns a fixed-point phase accumulator over one instrument's byte
//! range and emits one signed, volume-scaled value per mixing clock.
//! `fetch_sample` runs in the mixing context; everything else runs in the
//! control context and hands off through the active/sampling flags.

use core::sync::atomic::{AtomicBool, Ordering};

use arrayvec::ArrayString;

use crate::config::Tuning;
use crate::format::SAMPLE_NAME_LEN;

/// Fractional bits of the phase accumulator and increment.
pub const PHASE_FRAC_BITS: u32 = 16;

/// One of the up-to-31 instrument waveforms, bound to its byte range inside
/// the song blob. Built once at load time, immutable afterwards.
#[derive(Clone, Copy, Debug)]
pub struct SampleInfo<'a> {
    pub name: ArrayString<SAMPLE_NAME_LEN>,
    /// The sample's bytes (signed 8-bit PCM).
    pub data: &'a [u8],
    /// Loop start, bytes from the sample start.
    pub loop_begin: u32,
    /// Loop end, bytes from the sample start. May reach past `data` when the
    /// song header lies; reads past the end come back as silence.
    pub loop_end: u32,
    /// Finetune nibble, 0..=15.
    pub finetune: u8,
    /// Default volume, 0..=64.
    pub volume: u8,
}

impl<'a> SampleInfo<'a> {
    pub fn empty() -> Self {
        Self {
            name: ArrayString::new(),
            data: &[],
            loop_begin: 0,
            loop_end: 0,
            finetune: 0,
            volume: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Phase-accumulating player for a single channel.
pub struct Sampler<'a> {
    // Handoff between control and mixing contexts
    active: AtomicBool,
    sampling: AtomicBool,

    finetune: u8,
    volume: i16,

    // One-entry cache keyed on (period, finetune); recomputing the increment
    // is the expensive part of a period change.
    cached_period: u16,
    cached_finetune: u8,

    loopless: bool,

    data: &'a [u8],
    // All X.16 fixed point, offsets from the start of `data`
    end: usize,
    loop_begin: usize,
    loop_end: usize,
    phase: usize,
    phase_increment: usize,

    output: i16,

    tuning: Tuning,
}

impl<'a> Sampler<'a> {
    pub fn new(tuning: Tuning) -> Self {
        Self {
            active: AtomicBool::new(false),
            sampling: AtomicBool::new(false),
            finetune: 0,
            volume: 0,
            cached_period: 0,
            cached_finetune: 0,
            loopless: false,
            data: &[],
            end: 0,
            loop_begin: 0,
            loop_end: 0,
            phase: 0,
            phase_increment: 0,
            output: 0,
            tuning,
        }
    }

    /// Back to the inactive state. Safe to call before any sample is bound.
    pub fn init(&mut self) {
        self.active.store(false, Ordering::Relaxed);
        self.sampling.store(false, Ordering::Relaxed);
        self.output = 0;
        self.cached_period = 0;
        self.cached_finetune = 0;
    }

    /// Deactivate, waiting out an in-flight fetch.
    ///
    /// After this returns, no future `fetch_sample` touches the old sample
    /// data. On a preemptive target the wait covers a fetch the interrupt
    /// already entered; in a cooperative driver fetches always complete
    /// before control runs, so the wait never spins.
    pub fn reset(&mut self) {
        if self.active.load(Ordering::Relaxed) {
            self.active.store(false, Ordering::Relaxed);
            while self.sampling.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }

        self.init();
    }

    /// Bind a sample and start playing it from `sample_offset` (256-byte
    /// units, saturated at the sample end). An absent or empty sample leaves
    /// the sampler inactive; the volume is applied either way.
    pub fn retrig(
        &mut self,
        sample: Option<&SampleInfo<'a>>,
        period: u16,
        sample_offset: u8,
        volume: u8,
    ) {
        self.reset();
        self.set_volume(volume);

        let Some(sample) = sample else { return };
        if sample.is_empty() {
            return;
        }

        self.finetune = sample.finetune;
        self.internal_set_period(period);

        self.data = sample.data;
        let mut phase = 0usize;
        let end = sample.data.len();
        // Headers may declare loop points past the sample; the wrap
        // arithmetic needs loop_begin <= loop_end <= end
        let loop_begin = (sample.loop_begin as usize).min(end);
        let mut loop_end = (sample.loop_end as usize).min(end);

        // Too-short loops cannot be serviced inside the per-sample budget;
        // play the sample through once and park on the loop start.
        if loop_end - loop_begin < self.tuning.min_loop_len {
            self.loopless = true;
            loop_end = loop_begin + 1;
        } else {
            self.loopless = false;
        }

        if sample_offset != 0 {
            phase = (usize::from(sample_offset) * 256).min(end);
        }

        self.phase = phase << PHASE_FRAC_BITS;
        self.end = end << PHASE_FRAC_BITS;
        self.loop_begin = loop_begin << PHASE_FRAC_BITS;
        self.loop_end = loop_end << PHASE_FRAC_BITS;

        self.active.store(true, Ordering::Relaxed);
    }

    /// Set the playback volume (0..=64), pre-attenuated by the configured
    /// shift.
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = i16::from(volume >> self.tuning.volume_shift);
    }

    /// Change the playback period of the bound sample.
    pub fn set_period(&mut self, period: u16) {
        if self.active.load(Ordering::Relaxed) {
            self.internal_set_period(period);
        }
    }

    /// Emit the next sample value. The hot path: one byte read, one multiply,
    /// one add, loop wrap-around.
    pub fn fetch_sample(&mut self) {
        if !self.active.load(Ordering::Relaxed) {
            return;
        }

        self.sampling.store(true, Ordering::Relaxed);

        let byte = self
            .data
            .get(self.phase >> PHASE_FRAC_BITS)
            .copied()
            .unwrap_or(0);
        // byte as signed in [-128, 127], volume in [0, 64]: output in [-8192, 8128]
        self.output = i16::from(byte as i8) * self.volume;

        self.phase += self.phase_increment;

        if self.phase >= self.end {
            if self.loopless {
                self.phase = self.loop_begin;
            } else {
                self.phase -= self.end - self.loop_begin;
            }
            // Subsequent laps run on the loop region only
            self.end = self.loop_end;
        }

        self.sampling.store(false, Ordering::Relaxed);
    }

    /// The last scaled output, in [-8192, 8128].
    pub fn sample(&self) -> i16 {
        self.output
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    fn internal_set_period(&mut self, period: u16) {
        let period = self.tuning.clamp_period(period);

        if period == self.cached_period && self.finetune == self.cached_finetune {
            return;
        }

        self.cached_period = period;
        self.cached_finetune = self.finetune;

        // 18.14 speed constant / integer period = 2.14 playback speed,
        // promoted to X.16 for the phase accumulator
        let speed = self.tuning.speed_table[usize::from(self.finetune)] / u32::from(period);
        self.phase_increment = (speed as usize) << 2;
    }
}
