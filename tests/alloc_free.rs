//! Allocation-free playback path tests.
//!
//! The mixing path runs at interrupt level and the control path inside a
//! cooperative loop; neither may touch the heap. These tests drive both for
//! several seconds of output and abort on any allocation.
//!
//! Just run `cargo test` — no feature flags needed.

mod common;

use assert_no_alloc::{assert_no_alloc, AllocDisabler};
use common::{ModBuilder, SampleDef};
use modmix_engine::{Config, Downsampling, Mode, Player};

#[cfg(debug_assertions)]
#[global_allocator]
static A: AllocDisabler = AllocDisabler;

fn busy_song() -> Vec<u8> {
    let wave: Vec<u8> = (0..2048u32).map(|i| (i * 7) as u8).collect();
    let mut builder = ModBuilder::new()
        .sample(SampleDef::new(wave).looped(0, 1024))
        .sample(SampleDef::new(vec![0x40; 256]));

    // One of everything the effect engine supports
    builder = builder
        .cell(0, 0, 0, 1, 428, 0x0, 0x47) // arpeggio
        .cell(0, 0, 1, 1, 214, 0x4, 0x86) // vibrato
        .cell(0, 0, 2, 2, 320, 0x9, 0x01) // sample offset
        .cell(0, 0, 3, 1, 453, 0x7, 0x53) // tremolo
        .cell(0, 4, 0, 0, 214, 0x3, 0x20) // tone portamento
        .cell(0, 4, 1, 0, 0, 0xA, 0x04) // volume slide
        .cell(0, 8, 2, 0, 0, 0xE, 0x92) // retrigger
        .cell(0, 8, 3, 0, 0, 0xE, 0xC3) // note cut
        .cell(0, 12, 0, 1, 428, 0xE, 0xD2) // note delay
        .cell(0, 16, 1, 0, 0, 0xE, 0x60) // loop start
        .cell(0, 20, 1, 0, 0, 0xE, 0x62) // loop twice
        .cell(0, 24, 0, 0, 0, 0xF, 0x03) // speed
        .cell(0, 28, 0, 0, 0, 0xF, 0x90) // tempo
        .cell(0, 30, 0, 0, 0, 0xE, 0xE1); // pattern delay
    builder.build()
}

/// Drive `frames` mixing samples plus the interleaved control path,
/// aborting on any heap allocation.
fn assert_playback_alloc_free(config: Config, frames: usize) {
    let data = busy_song();
    let mut player = Player::new(config);
    player.load(&data).unwrap();
    player.set_mode(Mode::Loop);

    assert_no_alloc(|| {
        for _ in 0..frames {
            player.tick();
            player.update();
        }
    });

    assert!(player.is_playing());
}

#[test]
fn playback_is_alloc_free() {
    assert_playback_alloc_free(Config::with_mixing_freq(48_000), 48_000 * 5);
}

#[test]
fn downsampled_playback_is_alloc_free() {
    let config = Config {
        mixing_freq: 31_250,
        downsampling: Downsampling::Half { lerp: true },
        ..Config::default()
    };
    assert_playback_alloc_free(config, 31_250 * 5);
}

#[test]
fn load_and_stop_are_alloc_free() {
    let data = busy_song();
    let mut player = Player::new(Config::with_mixing_freq(48_000));

    assert_no_alloc(|| {
        player.load(&data).unwrap();
        for _ in 0..10_000 {
            player.tick();
            player.update();
        }
        player.stop();
    });

    assert!(!player.is_playing());
}
