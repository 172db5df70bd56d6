//! Engine configuration and the tuning tables derived from it.
//!
//! The reference hardware computes these tables at compile time from the PWM
//! carrier frequency. Here the mixing rate is chosen by the caller, so the
//! tables are derived once when the player is constructed.

use crate::format::NUM_FINETUNES;

/// Amiga Paula DMA clock divided by two (PAL): one sample fetch per two
/// clocks, so `PAULA_CLOCK / period` is the playback rate in Hz.
pub const PAULA_CLOCK: u32 = 3_546_894;

/// Amiga vertical-blank interrupt rate (PAL), the default tick rate.
pub const VBLANK_HZ: u32 = 50;

/// Default mixing frequency: phase-correct PWM on a 16 MHz AVR.
pub const DEFAULT_MIXING_FREQ: u32 = 16_000_000 / 256 / 2;

/// Finetune correction factors in 2.14 fixed point, indexed by the MOD
/// finetune nibble: 0..=7 are +0..+87.5 cents, 8..=15 are -100..-12.5 cents.
const FINETUNE_FACTORS: [u32; NUM_FINETUNES] = [
    16384, 16502, 16622, 16742, 16864, 16986, 17109, 17233, // 0 .. +7
    15464, 15576, 15689, 15803, 15917, 16032, 16149, 16266, // -8 .. -1
];

const MAX_SPEED_INDEX: usize = 7;

/// How channel fetches are spread over mixing ticks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Downsampling {
    /// All four channels fetched every mixing tick.
    #[default]
    Off,
    /// Channel pairs fetched on alternating ticks; the control rate is half
    /// the mixing rate. `lerp` interpolates the output between full points.
    Half { lerp: bool },
}

impl Downsampling {
    pub const fn factor(self) -> u32 {
        match self {
            Downsampling::Off => 1,
            Downsampling::Half { .. } => 2,
        }
    }
}

/// Caller-chosen engine parameters.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Output rate in Hz. One `Player::tick()` per output sample.
    pub mixing_freq: u32,
    /// Channel fetch interleaving.
    pub downsampling: Downsampling,
    /// Binary logarithm of an extra volume attenuation applied per channel.
    pub volume_shift: u8,
    /// Clamp periods to the Paula hardware range 113..856 instead of the
    /// widened range the reference allows by default.
    pub amiga_period_limits: bool,
    /// Treat the F00 command as "stop playback".
    pub stop_on_f00: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mixing_freq: DEFAULT_MIXING_FREQ,
            downsampling: Downsampling::Off,
            volume_shift: 0,
            amiga_period_limits: false,
            stop_on_f00: false,
        }
    }
}

impl Config {
    pub fn with_mixing_freq(mixing_freq: u32) -> Self {
        Self {
            mixing_freq,
            ..Self::default()
        }
    }
}

/// Tables and limits derived from a [`Config`]. Cheap to copy; each sampler
/// and channel keeps its own.
#[derive(Clone, Copy, Debug)]
pub struct Tuning {
    /// Rate at which channel samplers advance (mixing rate / factor).
    pub sampling_freq: u32,
    /// Timer period for the default 125 BPM tick rate.
    pub samples_per_vblank: u32,
    pub min_period: u16,
    pub max_period: u16,
    /// Loops shorter than this many bytes are played loopless; servicing them
    /// would exceed the per-sample interrupt budget.
    pub min_loop_len: usize,
    /// `PAULA_CLOCK / sampling_freq` scaled per finetune, 18.14 fixed point.
    pub speed_table: [u32; NUM_FINETUNES],
    pub volume_shift: u8,
}

impl Tuning {
    pub fn new(config: &Config) -> Self {
        let factor = config.downsampling.factor();
        let sampling_freq = (config.mixing_freq / factor).max(1);

        let speed_constant = fixp_ratio(PAULA_CLOCK, sampling_freq, 14);
        let mut speed_table = [0u32; NUM_FINETUNES];
        for (speed, factor) in speed_table.iter_mut().zip(FINETUNE_FACTORS) {
            *speed = (u64::from(speed_constant) * u64::from(factor) / 16384) as u32;
        }

        let (min_period, max_period) = if config.amiga_period_limits {
            (113, 856)
        } else {
            (28 * factor as u16, 3424)
        };

        let min_loop_len =
            (speed_table[MAX_SPEED_INDEX] / u32::from(min_period) / 16384 + 1) as usize;

        Self {
            sampling_freq,
            samples_per_vblank: sampling_freq / VBLANK_HZ,
            min_period,
            max_period,
            min_loop_len,
            speed_table,
            volume_shift: config.volume_shift,
        }
    }

    pub fn clamp_period(&self, period: u16) -> u16 {
        period.clamp(self.min_period, self.max_period)
    }

    /// Timer period for an F-command BPM parameter (32..=255).
    ///
    /// 125 BPM at the default speed is 50 ticks per second, one Amiga VBLANK:
    /// ticks/s = bpm * 2 / 5, so the period is `sampling_freq * 5 / (2 * bpm)`.
    pub fn bpm_to_timer_period(&self, bpm: u8) -> u32 {
        (5 * self.sampling_freq / u32::from(bpm) / 2).max(1)
    }
}

/// `(numerator / denominator)` as a fixed-point value with `frac_bits`
/// fractional bits.
const fn fixp_ratio(numerator: u32, denominator: u32, frac_bits: u32) -> u32 {
    let integer = numerator / denominator;
    let fraction = ((numerator % denominator) as u64 * (1 << frac_bits) as u64
        / denominator as u64) as u32;
    (integer << frac_bits) | fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_constant_at_reference_rate() {
        // 3546894 / 31250 = 113.50 -> 113 * 16384 + 8201 in 18.14
        let tuning = Tuning::new(&Config::default());
        assert_eq!(tuning.sampling_freq, 31_250);
        assert_eq!(tuning.speed_table[0], 1_859_593);
    }

    #[test]
    fn min_loop_length_matches_reference_build() {
        // The reference static_asserts this value for its default build.
        let tuning = Tuning::new(&Config::default());
        assert_eq!(tuning.min_loop_len, 5);
    }

    #[test]
    fn finetune_orders_speed_table() {
        let tuning = Tuning::new(&Config::default());
        // +7 eighth-semitones is the fastest, -8 the slowest
        assert!(tuning.speed_table[7] > tuning.speed_table[0]);
        assert!(tuning.speed_table[8] < tuning.speed_table[15]);
        assert!(tuning.speed_table[15] < tuning.speed_table[0]);
    }

    #[test]
    fn downsampling_halves_sampling_freq() {
        let config = Config {
            mixing_freq: 31_250,
            downsampling: Downsampling::Half { lerp: true },
            ..Config::default()
        };
        let tuning = Tuning::new(&config);
        assert_eq!(tuning.sampling_freq, 15_625);
        assert_eq!(tuning.min_period, 56);
    }

    #[test]
    fn bpm_timer_period() {
        let tuning = Tuning::new(&Config::with_mixing_freq(48_000));
        assert_eq!(tuning.bpm_to_timer_period(125), 960);
        assert_eq!(tuning.bpm_to_timer_period(80), 1500);
        assert_eq!(tuning.samples_per_vblank, 960);
    }

    #[test]
    fn amiga_limits_narrow_the_period_range() {
        let config = Config {
            amiga_period_limits: true,
            ..Config::default()
        };
        let tuning = Tuning::new(&config);
        assert_eq!((tuning.min_period, tuning.max_period), (113, 856));
        assert_eq!(tuning.clamp_period(1000), 856);
        assert_eq!(tuning.clamp_period(50), 113);
    }
}
