//! Playback engine for 4-channel Amiga Protracker MOD tunes.
//!
//! The engine ingests a borrowed MOD blob and produces stereo 16-bit PCM one
//! mixing sample at a time. It is split along the two execution contexts the
//! format demands: [`Player::tick`] is the fast mixing path, fit for a timer
//! interrupt, and [`Player::update`] is the slow control path that walks the
//! order/pattern/row structure and runs the per-channel effect machines.
//!
//! No heap allocation anywhere, no I/O, no panicking paths during playback;
//! the host supplies the bytes and consumes the output bus.

#![cfg_attr(not(feature = "std"), no_std)]

mod channel;
mod config;
mod error;
mod events;
mod format;
mod frame;
mod player;
mod sampler;
mod timer;

pub use channel::Channel;
pub use config::{Config, Downsampling, Tuning, DEFAULT_MIXING_FREQ, PAULA_CLOCK, VBLANK_HZ};
pub use error::LoadError;
pub use events::{Message, NullEvents, PlayerEvents};
pub use format::{
    Cell, SongData, INITIAL_BPM, INITIAL_SPEED, MAX_FINETUNE, MAX_TICKS_PER_ROW, MAX_VOLUME,
    NUM_CHANNELS, NUM_ORDERS, NUM_ROWS, NUM_SAMPLES, SAMPLE_NAME_LEN, TITLE_LEN,
};
pub use frame::Frame;
pub use player::{Mode, Player, Position, SongInfo, Stats, Update};
pub use sampler::{SampleInfo, Sampler, PHASE_FRAC_BITS};
pub use timer::Timer;
