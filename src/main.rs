//! modmix CLI — headless WAV rendering and live playback of MOD files.
//!
//! Usage:
//!   modmix path/to/file.mod
//!   modmix path/to/file.mod --wav output.wav
//!   modmix path/to/file.mod --mode loop --max-seconds 60

mod wav;

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use modmix_audio::{AudioOutput, CpalOutput};
use modmix_engine::{
    Config, Frame, Message, Mode, Player, PlayerEvents, SampleInfo, SongInfo,
};

#[derive(clap::Parser)]
#[command(about = "Amiga Protracker MOD player")]
struct Args {
    /// MOD file to play
    mod_path: PathBuf,

    /// Render to a WAV file instead of playing
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Mixing frequency for WAV renders (live playback uses the device rate)
    #[arg(short = 'r', long, default_value_t = 48_000)]
    rate: u32,

    /// What to do at the song end / on backwards jumps
    #[arg(short, long, value_enum, default_value_t = ModeArg::PlayOnce)]
    mode: ModeArg,

    /// Cap the rendered or played duration, for looping songs
    #[arg(long, default_value_t = 300)]
    max_seconds: u32,

    /// Stop playback on an F00 command
    #[arg(long)]
    stop_on_f00: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    PlayOnce,
    LoopOnce,
    Loop,
    LoopPattern,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::PlayOnce => Mode::PlayOnce,
            ModeArg::LoopOnce => Mode::LoopOnce,
            ModeArg::Loop => Mode::Loop,
            ModeArg::LoopPattern => Mode::LoopPattern,
        }
    }
}

/// Routes engine observability callbacks into the log facade.
struct LogEvents;

impl PlayerEvents for LogEvents {
    fn on_song_load(&mut self, song: &SongInfo) {
        log::info!(
            "Loaded '{}': {} orders, {} patterns",
            song.name,
            song.order_count,
            song.pattern_count
        );
    }

    fn on_song_load_error(&mut self, song: &SongInfo) {
        log::error!("Failed to load '{}'", song.name);
    }

    fn on_sample_load(&mut self, index: u8, sample: &SampleInfo<'_>) {
        log::debug!(
            "Sample {:02}: '{}' {} bytes, loop {}..{}, finetune {}, volume {}",
            index,
            sample.name,
            sample.len(),
            sample.loop_begin,
            sample.loop_end,
            sample.finetune,
            sample.volume
        );
    }

    fn on_play_pattern(&mut self, order: u8, pattern: u8) {
        log::debug!("Order {:02X} -> pattern {:02X}", order, pattern);
    }

    fn on_play_note(&mut self, channel: u8, period: u16, sample: u8, effect: u8, param: u8) {
        log::trace!(
            "ch{} period={} sample={:02X} effect={:X}{:02X}",
            channel,
            period,
            sample,
            effect,
            param
        );
    }

    fn on_play_song_end(&mut self, song: &SongInfo) {
        log::info!("Song end: '{}'", song.name);
    }

    fn on_message(&mut self, kind: Message, args: &[u16]) {
        log::warn!("{:?}: {:?}", kind, args);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .init();

    let args = Args::parse();

    let data = fs::read(&args.mod_path)
        .with_context(|| format!("failed to read {}", args.mod_path.display()))?;

    match &args.wav {
        Some(path) => render_to_wav(&args, &data, path),
        None => play_audio(&args, &data),
    }
}

fn load_player<'a>(
    data: &'a [u8],
    args: &Args,
    mixing_freq: u32,
) -> anyhow::Result<Player<'a, LogEvents>> {
    let config = Config {
        mixing_freq,
        stop_on_f00: args.stop_on_f00,
        ..Config::default()
    };

    let mut player = Player::with_events(config, LogEvents);
    player
        .load(data)
        .with_context(|| format!("failed to parse {}", args.mod_path.display()))?;
    player.set_mode(args.mode.into());

    let song = player.song();
    println!("Title:    {}", song.name);
    println!(
        "Format:   {}",
        song.tag.iter().map(|&b| b as char).collect::<String>()
    );
    println!("Orders:   {}", song.order_count);
    println!("Patterns: {}", song.pattern_count);
    let samples_with_data = (0..modmix_engine::NUM_SAMPLES)
        .filter(|&i| !player.sample(i).is_empty())
        .count();
    println!("Samples:  {} (with data)", samples_with_data);
    println!();

    Ok(player)
}

fn play_audio(args: &Args, data: &[u8]) -> anyhow::Result<()> {
    let mut output = CpalOutput::new()?;
    let sample_rate = output.sample_rate();
    println!("Sample rate: {} Hz", sample_rate);

    let mut player = load_player(data, args, sample_rate)?;
    output.start()?;

    println!("Playing...");
    println!();

    let max_frames = u64::from(sample_rate) * u64::from(args.max_seconds);
    let print_interval = u64::from(sample_rate) / 10;
    let mut frame_count: u64 = 0;

    while player.is_playing() && frame_count < max_frames {
        player.tick();
        output.write_frame(Frame {
            left: player.output_left(),
            right: player.output_right(),
        });
        player.update();

        frame_count += 1;
        if frame_count % print_interval == 0 {
            let pos = player.position();
            print!(
                "\rOrd: {:02X} | Pat: {:02X} | Row: {:02X}",
                pos.order, pos.pattern, pos.row
            );
            let _ = std::io::stdout().flush();
        }
    }

    // Short tail of silence so the ring buffer drains before the stream stops
    for _ in 0..sample_rate / 10 {
        output.write_frame(Frame::silence());
    }
    output.stop()?;

    println!("\rDone.          ");
    print_stats(&player, frame_count, sample_rate);
    Ok(())
}

fn render_to_wav(args: &Args, data: &[u8], path: &Path) -> anyhow::Result<()> {
    let mut player = load_player(data, args, args.rate)?;

    println!("Rendering to {} at {} Hz...", path.display(), args.rate);

    let max_frames = args.rate as usize * args.max_seconds as usize;
    let mut frames: Vec<Frame> = Vec::new();
    while player.is_playing() && frames.len() < max_frames {
        player.tick();
        frames.push(Frame {
            left: player.output_left(),
            right: player.output_right(),
        });
        player.update();
    }

    let file = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = std::io::BufWriter::new(file);
    wav::write_wav(&mut writer, &frames, args.rate).context("failed to write WAV")?;

    print_stats(&player, frames.len() as u64, args.rate);
    println!("Done.");
    Ok(())
}

fn print_stats(player: &Player<'_, LogEvents>, frames: u64, sample_rate: u32) {
    let stats = player.stats();
    println!(
        "Rendered {} frames ({:.1}s), max BPM {}",
        frames,
        frames as f64 / f64::from(sample_rate),
        stats.max_bpm
    );
}
