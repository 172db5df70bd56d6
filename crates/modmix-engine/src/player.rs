//! Top-level scheduler: song loading, the order/pattern/row walk, effect
//! decoding, and the four-channel mix onto the stereo bus.
//!
//! `tick()` is the mixing path, called once per output sample at interrupt
//! level. `update()` is the control path, called cooperatively at least once
//! per row-tick period. The two only meet through the timer and the
//! per-channel sampler handshakes.

use core::sync::atomic::{AtomicBool, Ordering};

use arrayvec::ArrayString;

use crate::channel::Channel;
use crate::config::{Config, Tuning};
use crate::error::LoadError;
use crate::events::{Message, NullEvents, PlayerEvents};
use crate::format::{
    self, Cell, SongData, HEADER_LEN, INITIAL_BPM, INITIAL_SPEED, MAX_FINETUNE,
    MAX_TICKS_PER_ROW, MAX_VOLUME, NUM_CHANNELS, NUM_ORDERS, NUM_ROWS, NUM_SAMPLES, PATTERN_LEN,
    ROW_LEN, SAMPLE_HEADERS_OFFSET, SAMPLE_HEADER_LEN, TITLE_LEN,
};
use crate::sampler::SampleInfo;
use crate::timer::Timer;

// Pending row actions, applied when the current row is exhausted
const ACTION_JUMP_TO_ROW: u8 = 1 << 0;
const ACTION_STOP: u8 = 1 << 1;
const ACTION_JUMP_TO_ORDER: u8 = 1 << 2;
const ACTION_PATTERN_BREAK: u8 = 1 << 3;

/// Parsed song header.
#[derive(Clone, Debug, Default)]
pub struct SongInfo {
    pub name: ArrayString<TITLE_LEN>,
    pub tag: [u8; 4],
    pub order_count: u8,
    pub pattern_count: u8,
}

/// What happens when playback runs off the end of the order list or a
/// position jump goes backwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Stop at the song end; backwards jumps stop playback.
    #[default]
    PlayOnce,
    /// Honor exactly one backwards jump, then stop.
    LoopOnce,
    /// Loop forever.
    Loop,
    /// Stay inside the current pattern.
    LoopPattern,
}

/// Result of a control-path call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Update {
    /// Not playing.
    Inactive,
    /// The row-tick timer has not fired since the last call.
    Idle,
    /// A row tick was processed.
    Tick,
}

/// Playback statistics.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
    /// Highest BPM seen in an F command (param > 31).
    pub max_bpm: u8,
    /// Output samples produced, saturating.
    pub playback_duration: u32,
}

/// Current playback position, for hosts that display progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub order: u8,
    pub pattern: u8,
    pub row: u8,
}

#[derive(Default)]
struct SongState {
    mode: Mode,
    loop_counter: u8,
    order: u8,
    pattern: u8,
    row: u8,
    ticks_per_row: u8,
}

#[derive(Clone, Copy, Default)]
struct PatternLoopState {
    loop_start_row: u8,
    loop_counter: u8,
}

#[derive(Default)]
struct RowState {
    tick: u8,
    /// Extra repeats of the current row (EEx pattern delay).
    delay: u8,
}

#[derive(Default)]
struct RowActions {
    actions: u8,
    jump_to_order: u8,
    jump_to_row: u8,
}

/// MOD player. Borrows the song data for its lifetime; owns four channels
/// and the row-tick timer.
pub struct Player<'a, E: PlayerEvents = NullEvents> {
    config: Config,
    tuning: Tuning,
    events: E,

    playing: AtomicBool,

    output_left: i16,
    output_right: i16,
    mixing_counter: u8,
    slope_left: i16,
    slope_right: i16,

    tick_timer: Timer,

    song_info: SongInfo,
    samples: [SampleInfo<'a>; NUM_SAMPLES],
    channels: [Channel<'a>; NUM_CHANNELS],

    song: SongData<'a>,
    /// Byte offset of the current pattern inside the song data.
    pattern_offset: usize,

    song_state: SongState,
    pattern_loops: [PatternLoopState; NUM_CHANNELS],
    row_state: RowState,
    row_actions: RowActions,

    stats: Stats,
}

impl<'a> Player<'a, NullEvents> {
    pub fn new(config: Config) -> Self {
        Self::with_events(config, NullEvents)
    }
}

impl<'a, E: PlayerEvents> Player<'a, E> {
    pub fn with_events(config: Config, events: E) -> Self {
        let tuning = Tuning::new(&config);
        let mut player = Self {
            config,
            tuning,
            events,
            playing: AtomicBool::new(false),
            output_left: 0,
            output_right: 0,
            mixing_counter: config.downsampling.factor() as u8,
            slope_left: 0,
            slope_right: 0,
            tick_timer: Timer::new(tuning.samples_per_vblank.max(1)),
            song_info: SongInfo::default(),
            samples: [SampleInfo::empty(); NUM_SAMPLES],
            channels: core::array::from_fn(|_| Channel::new(tuning)),
            song: SongData::empty(),
            pattern_offset: 0,
            song_state: SongState::default(),
            pattern_loops: [PatternLoopState::default(); NUM_CHANNELS],
            row_state: RowState::default(),
            row_actions: RowActions::default(),
            stats: Stats::default(),
        };
        for channel in &mut player.channels {
            channel.init();
        }
        player
    }

    /// Parse the MOD blob and arm playback at order 0, row 0.
    ///
    /// On success the player starts producing audio on the next `tick()`.
    /// Fatal problems return an error after firing the matching
    /// observability events; recoverable ones are clamped and reported.
    pub fn load(&mut self, data: &'a [u8]) -> Result<(), LoadError> {
        self.playing.store(false, Ordering::Relaxed);

        for channel in &mut self.channels {
            channel.reset();
        }
        self.pattern_loops = [PatternLoopState::default(); NUM_CHANNELS];
        self.output_left = 0;
        self.output_right = 0;
        self.mixing_counter = self.config.downsampling.factor() as u8;
        self.slope_left = 0;
        self.slope_right = 0;
        self.song_info = SongInfo::default();
        self.samples = [SampleInfo::empty(); NUM_SAMPLES];

        if data.len() < HEADER_LEN {
            return Err(LoadError::UnexpectedEof);
        }
        let song = SongData::new(data);

        self.song_info.name = header_string(&song, 0, TITLE_LEN);
        let tag = [
            song.byte(format::TAG_OFFSET),
            song.byte(format::TAG_OFFSET + 1),
            song.byte(format::TAG_OFFSET + 2),
            song.byte(format::TAG_OFFSET + 3),
        ];
        self.song_info.tag = tag;

        if !format::SUPPORTED_TAGS.contains(&tag) {
            self.events.on_song_load_error(&self.song_info);
            self.events.on_message(
                Message::UnsupportedFormat,
                &[
                    u16::from(tag[0]),
                    u16::from(tag[1]),
                    u16::from(tag[2]),
                    u16::from(tag[3]),
                ],
            );
            return Err(LoadError::UnsupportedFormat { tag });
        }

        // 16-bit phase offsets cannot address a larger blob.
        #[cfg(target_pointer_width = "16")]
        if data.len() > 65535 {
            self.events.on_song_load_error(&self.song_info);
            self.events.on_message(Message::SongSize, &[]);
            return Err(LoadError::SongTooBig);
        }

        self.song_info.order_count = song.byte(format::ORDER_COUNT_OFFSET);

        // Some trackers leave unused patterns in the song; scan every order
        // slot, not just the first order_count, to find them all.
        let mut max_pattern = 0u8;
        for i in 0..NUM_ORDERS {
            max_pattern = max_pattern.max(song.byte(format::ORDERS_OFFSET + i));
        }
        self.song_info.pattern_count = max_pattern + 1;

        self.events.on_song_load(&self.song_info);

        self.load_samples(&song)?;

        self.song_state = SongState {
            ticks_per_row: INITIAL_SPEED,
            ..SongState::default()
        };
        self.row_state = RowState::default();
        self.row_actions = RowActions::default();
        self.stats = Stats {
            max_bpm: INITIAL_BPM,
            playback_duration: 0,
        };

        self.tick_timer.reset(self.tuning.samples_per_vblank.max(1));

        self.song = song;
        self.fetch_pattern();
        self.fetch_row();

        self.playing.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn load_samples(&mut self, song: &SongData<'a>) -> Result<(), LoadError> {
        // Sample payloads follow the patterns, concatenated in slot order.
        let mut cursor =
            HEADER_LEN + usize::from(self.song_info.pattern_count) * PATTERN_LEN;

        for i in 0..NUM_SAMPLES {
            let header = SAMPLE_HEADERS_OFFSET + i * SAMPLE_HEADER_LEN;
            let sample_no = (i + 1) as u8;

            let length = usize::from(song.word_be(header + 22)) * 2;

            let mut volume = song.byte(header + 25);
            if volume > MAX_VOLUME {
                self.events.on_message(
                    Message::SampleVolume,
                    &[u16::from(sample_no), u16::from(volume)],
                );
                volume = MAX_VOLUME;
            }

            // Lengths of 0 or 2 are placeholder headers; some songs also
            // declare samples past the end of the file.
            let Some(data) = song
                .slice(cursor, length)
                .filter(|_| length > 2)
            else {
                // A declared payload that falls outside the file is worth a
                // warning; placeholder lengths of 0 or 2 are routine.
                if length > 2 {
                    self.events.on_message(
                        Message::SampleBoundaries,
                        &[u16::from(sample_no), 1],
                    );
                }
                let sample = &mut self.samples[i];
                sample.volume = volume;
                // Placeholder headers with a volume still announce themselves
                if volume != 0 {
                    self.events.on_sample_load(sample_no, sample);
                }
                continue;
            };

            let mut finetune = song.byte(header + 24);
            if finetune > MAX_FINETUNE {
                self.events.on_message(
                    Message::SampleFinetune,
                    &[u16::from(sample_no), u16::from(finetune)],
                );
                finetune = MAX_FINETUNE;
            }

            let loop_start = usize::from(song.word_be(header + 26)) * 2;
            if cursor + loop_start > song.len() {
                self.events.on_message(
                    Message::SampleBoundaries,
                    &[u16::from(sample_no), 2],
                );
                return Err(LoadError::SampleBoundaries { sample: sample_no });
            }

            let loop_length = usize::from(song.word_be(header + 28)) * 2;
            if cursor + loop_start + loop_length > song.len() {
                self.events.on_message(
                    Message::SampleBoundaries,
                    &[u16::from(sample_no), 3],
                );
                return Err(LoadError::SampleBoundaries { sample: sample_no });
            }

            if loop_length < self.tuning.min_loop_len && loop_start != 0 {
                self.events.on_message(
                    Message::SampleLoopLength,
                    &[
                        u16::from(sample_no),
                        loop_length as u16,
                        self.tuning.min_loop_len as u16,
                    ],
                );
                return Err(LoadError::LoopLength {
                    sample: sample_no,
                    length: loop_length as u16,
                    min: self.tuning.min_loop_len as u16,
                });
            }

            self.samples[i] = SampleInfo {
                name: header_string(song, header, format::SAMPLE_NAME_LEN),
                data,
                loop_begin: loop_start as u32,
                loop_end: (loop_start + loop_length) as u32,
                finetune,
                volume,
            };
            cursor += length;
            self.events.on_sample_load(sample_no, &self.samples[i]);
        }

        Ok(())
    }

    /// Produce one mixing sample onto the stereo bus and advance the tick
    /// timer. Called once per output sample from the interrupt context.
    ///
    /// Channels 0 and 3 feed the left bus, 1 and 2 the right; the stereo
    /// split is fixed, as on the hardware. Without interpolation the bus
    /// carries `(a + b) * 2`, exactly spanning i16. With downsampling and
    /// interpolation the *2 gain is dropped and the bus ramps by
    /// `(new - old) / factor` each mixing sample, i.e. at half scale.
    pub fn tick(&mut self) {
        if !self.playing.load(Ordering::Relaxed) {
            return;
        }

        match self.config.downsampling {
            crate::config::Downsampling::Off => {
                for channel in &mut self.channels {
                    channel.fetch_sample();
                }

                let left = self.channels[0].sampler().sample() + self.channels[3].sampler().sample();
                let right =
                    self.channels[1].sampler().sample() + self.channels[2].sampler().sample();
                // Each bus is the sum of two [-8192, 8128] values: *2 fits i16
                self.output_left = left * 2;
                self.output_right = right * 2;

                self.tick_timer.clock();
            }

            crate::config::Downsampling::Half { lerp } => {
                if lerp {
                    self.output_left = self.output_left.saturating_add(self.slope_left);
                    self.output_right = self.output_right.saturating_add(self.slope_right);
                }

                // Interleave: one stereo pair per mixing tick
                if self.mixing_counter & 1 != 0 {
                    self.channels[0].fetch_sample();
                    self.channels[3].fetch_sample();
                } else {
                    self.channels[1].fetch_sample();
                    self.channels[2].fetch_sample();
                }

                self.mixing_counter -= 1;
                if self.mixing_counter != 0 {
                    return;
                }
                self.mixing_counter = 2;

                let left = self.channels[0].sampler().sample() + self.channels[3].sampler().sample();
                let right =
                    self.channels[1].sampler().sample() + self.channels[2].sampler().sample();

                if lerp {
                    self.slope_left = ((i32::from(left) - i32::from(self.output_left)) / 2) as i16;
                    self.slope_right =
                        ((i32::from(right) - i32::from(self.output_right)) / 2) as i16;
                } else {
                    self.output_left = left * 2;
                    self.output_right = right * 2;
                }

                self.tick_timer.clock();
            }
        }
    }

    /// Run the control path once. Cheap when the timer has not fired.
    pub fn update(&mut self) -> Update {
        if !self.playing.load(Ordering::Relaxed) {
            return Update::Inactive;
        }

        if !self.tick_timer.is_fired() {
            return Update::Idle;
        }

        self.stats.playback_duration = self.stats.playback_duration.saturating_add(
            self.tick_timer.period() * self.config.downsampling.factor(),
        );

        self.row_state.tick += 1;
        if self.row_state.tick >= self.song_state.ticks_per_row {
            self.row_state.tick = 0;

            if self.row_state.delay != 0 {
                self.row_state.delay -= 1;
            } else if !self.internal_fetch_next_row() {
                self.stop();
                return Update::Tick;
            }
        }

        for channel in &mut self.channels {
            channel.tick();
        }

        Update::Tick
    }

    /// Stop playback and release the channels.
    pub fn stop(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }

        self.playing.store(false, Ordering::Relaxed);

        self.events.on_play_song_end(&self.song_info);
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.song_state.mode = mode;
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    /// Left bus sample. See [`tick`](Self::tick) for the gain structure.
    pub fn output_left(&self) -> i16 {
        self.output_left
    }

    /// Right bus sample. See [`tick`](Self::tick) for the gain structure.
    pub fn output_right(&self) -> i16 {
        self.output_right
    }

    pub fn song(&self) -> &SongInfo {
        &self.song_info
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn position(&self) -> Position {
        Position {
            order: self.song_state.order,
            pattern: self.song_state.pattern,
            row: self.song_state.row,
        }
    }

    /// Current row-tick timer period in mixing samples.
    pub fn tick_period(&self) -> u32 {
        self.tick_timer.period()
    }

    pub fn ticks_per_row(&self) -> u8 {
        self.song_state.ticks_per_row
    }

    pub fn channel(&self, index: usize) -> &Channel<'a> {
        &self.channels[index]
    }

    pub fn sample(&self, index: usize) -> &SampleInfo<'a> {
        &self.samples[index]
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    // ------------------------------------------------------------------

    /// Advance to the next row, honoring pending row actions. Returns false
    /// when playback should stop.
    fn internal_fetch_next_row(&mut self) -> bool {
        if self.row_actions.actions & ACTION_STOP != 0 {
            return false;
        }

        if self.row_actions.actions & ACTION_JUMP_TO_ROW != 0 {
            // Pattern loop target, always within the current pattern
            self.song_state.row = self.row_actions.jump_to_row;
        } else {
            self.song_state.row += 1;
            let pattern_done = self.song_state.row == NUM_ROWS as u8
                || self.row_actions.actions & (ACTION_PATTERN_BREAK | ACTION_JUMP_TO_ORDER) != 0;

            if pattern_done {
                if self.song_state.mode != Mode::LoopPattern {
                    if self.row_actions.actions & ACTION_JUMP_TO_ORDER != 0 {
                        if self.row_actions.jump_to_order <= self.song_state.order {
                            // Backwards jump: the song is restarting
                            if self.song_state.mode == Mode::PlayOnce {
                                return false;
                            }
                            if self.song_state.mode == Mode::LoopOnce {
                                let loops = self.song_state.loop_counter;
                                self.song_state.loop_counter += 1;
                                if loops == 1 {
                                    return false;
                                }
                            }
                        } else if self.row_actions.jump_to_order >= self.song_info.order_count {
                            return false;
                        }

                        self.song_state.order = self.row_actions.jump_to_order;
                    } else {
                        self.song_state.order += 1;
                        if self.song_state.order == self.song_info.order_count {
                            self.song_state.order = 0;
                            if self.song_state.mode != Mode::Loop {
                                return false;
                            }
                        }
                    }
                }

                self.pattern_loops = [PatternLoopState::default(); NUM_CHANNELS];

                if self.row_actions.actions & ACTION_PATTERN_BREAK != 0 {
                    if self.row_actions.jump_to_row >= NUM_ROWS as u8 {
                        return false;
                    }
                    self.song_state.row = self.row_actions.jump_to_row;
                } else {
                    self.song_state.row = 0;
                }

                self.fetch_pattern();
            }
        }

        self.row_actions.actions = 0;
        self.fetch_row();
        true
    }

    fn fetch_pattern(&mut self) {
        let pattern = self
            .song
            .byte(format::ORDERS_OFFSET + usize::from(self.song_state.order));

        if pattern >= self.song_info.pattern_count {
            self.events.on_message(Message::Pattern, &[u16::from(pattern)]);
        }

        self.song_state.pattern = pattern;
        self.pattern_offset = HEADER_LEN + usize::from(pattern) * PATTERN_LEN;

        self.events
            .on_play_pattern(self.song_state.order, pattern);
    }

    /// Decode the current row into channel calls and pending row actions.
    fn fetch_row(&mut self) {
        use format::{hi_nibble, lo_nibble};

        self.events.on_play_row_begin(self.song_state.row);

        let row_offset = self.pattern_offset + usize::from(self.song_state.row) * ROW_LEN;

        for i in 0..NUM_CHANNELS {
            let cell_offset = row_offset + i * format::CELL_LEN;
            let cell = Cell::unpack([
                self.song.byte(cell_offset),
                self.song.byte(cell_offset + 1),
                self.song.byte(cell_offset + 2),
                self.song.byte(cell_offset + 3),
            ]);

            self.events.on_play_note(
                i as u8,
                cell.period,
                cell.sample,
                cell.effect,
                cell.param,
            );

            self.channels[i].reset_row();

            if cell.sample == 0 {
                // Keep whatever sample is playing
            } else if usize::from(cell.sample) <= NUM_SAMPLES {
                let sample = self.samples[usize::from(cell.sample) - 1];
                self.channels[i].set_sample(Some(sample));
            } else {
                self.events
                    .on_message(Message::SampleNumber, &[u16::from(cell.sample)]);
            }

            if cell.period != 0
                && !(self.tuning.min_period..=self.tuning.max_period).contains(&cell.period)
            {
                self.events.on_message(Message::Period, &[cell.period]);
            }
            self.channels[i].set_period(cell.period);

            let param = cell.param;
            match cell.effect {
                // Normal play or arpeggio
                0x0 => {
                    if param != 0 {
                        self.channels[i].use_arpeggio(hi_nibble(param), lo_nibble(param));
                    }
                }

                // Portamento up
                0x1 => self.channels[i].use_period_dec(param),

                // Portamento down
                0x2 => self.channels[i].use_period_inc(param),

                // Tone portamento
                0x3 => self.channels[i].use_period_portamento(param),

                // Vibrato
                0x4 => {
                    self.channels[i].use_period_vibrato(hi_nibble(param), lo_nibble(param));
                }

                // Tone portamento + volume slide: only one nibble is nonzero
                // in a well-formed tune
                0x5 => {
                    self.channels[i].use_volume_dec(lo_nibble(param));
                    self.channels[i].use_volume_inc(hi_nibble(param));
                    self.channels[i].use_period_portamento(0);
                }

                // Vibrato + volume slide
                0x6 => {
                    self.channels[i].use_volume_dec(lo_nibble(param));
                    self.channels[i].use_volume_inc(hi_nibble(param));
                    self.channels[i].use_period_vibrato(0, 0);
                }

                // Tremolo
                0x7 => {
                    self.channels[i].use_volume_tremolo(hi_nibble(param), lo_nibble(param));
                }

                // Sample offset
                0x9 => self.channels[i].set_sample_offset(param),

                // Volume slide
                0xA => {
                    self.channels[i].use_volume_dec(lo_nibble(param));
                    self.channels[i].use_volume_inc(hi_nibble(param));
                }

                // Position jump
                0xB => {
                    if param >= self.song_info.order_count {
                        self.events
                            .on_message(Message::EffectParam, &[u16::from(cell.effect), u16::from(param)]);
                    }
                    self.row_actions.actions |= ACTION_JUMP_TO_ORDER;
                    self.row_actions.jump_to_order = param;
                }

                // Set volume
                0xC => self.channels[i].set_volume(param),

                // Pattern break: row argument is decimal x*10+y, not x*16+y
                0xD => {
                    let row = hi_nibble(param) * 10 + lo_nibble(param);
                    if row >= NUM_ROWS as u8 {
                        self.events
                            .on_message(Message::EffectParam, &[u16::from(cell.effect), u16::from(param)]);
                    }
                    self.row_actions.actions |= ACTION_PATTERN_BREAK;
                    self.row_actions.jump_to_row = row;
                }

                0xE => self.fetch_extended_effect(i, param),

                // Speed / tempo
                0xF => {
                    if param == 0 {
                        if self.config.stop_on_f00 {
                            self.row_actions.actions |= ACTION_STOP;
                        }
                    } else if param <= MAX_TICKS_PER_ROW {
                        self.song_state.ticks_per_row = param;
                    } else {
                        self.stats.max_bpm = self.stats.max_bpm.max(param);
                        self.tick_timer
                            .set_period(self.tuning.bpm_to_timer_period(param));
                    }
                }

                // Panning is hardware-assigned; 8xx and the rest are ignored
                _ => {
                    self.events.on_message(
                        Message::UnsupportedEffect,
                        &[u16::from(cell.effect), u16::from(param)],
                    );
                }
            }
        }

        self.events.on_play_row_end();
    }

    fn fetch_extended_effect(&mut self, channel: usize, param: u8) {
        use format::{hi_nibble, lo_nibble};

        let ext_param = lo_nibble(param);
        match hi_nibble(param) {
            // Fine portamento up
            0x1 => self.channels[channel].dec_period(ext_param),

            // Fine portamento down
            0x2 => self.channels[channel].inc_period(ext_param),

            // Pattern loop: E60 marks the loop start, E6x jumps back x times.
            // The start defaults to row 0, so a loop cannot span patterns.
            0x6 => {
                let row = self.song_state.row;
                let state = &mut self.pattern_loops[channel];

                if ext_param == 0 {
                    state.loop_start_row = row;
                } else if state.loop_counter == 0 {
                    state.loop_counter = ext_param;
                    self.row_actions.actions |= ACTION_JUMP_TO_ROW;
                    self.row_actions.jump_to_row = state.loop_start_row;
                } else {
                    state.loop_counter -= 1;
                    if state.loop_counter != 0 {
                        self.row_actions.actions |= ACTION_JUMP_TO_ROW;
                        self.row_actions.jump_to_row = state.loop_start_row;
                    }
                }
            }

            // Retrigger note
            0x9 => self.channels[channel].use_note_repeat(ext_param),

            // Fine volume slide up / down
            0xA => self.channels[channel].inc_volume(ext_param),
            0xB => self.channels[channel].dec_volume(ext_param),

            // Note cut / delay
            0xC => self.channels[channel].use_note_cut(ext_param),
            0xD => self.channels[channel].use_note_delay(ext_param),

            // Pattern delay
            0xE => self.row_state.delay = ext_param,

            // Set filter, glissando, waveforms, finetune, panning, invert loop
            _ => {
                self.events.on_message(
                    Message::UnsupportedEffect,
                    &[0xE, u16::from(param)],
                );
            }
        }
    }
}

fn header_string<const N: usize>(song: &SongData<'_>, offset: usize, len: usize) -> ArrayString<N> {
    let mut out = ArrayString::new();
    for i in 0..len.min(N) {
        let byte = song.byte(offset + i);
        if byte == 0 {
            break;
        }
        let printable = if (0x20..0x7F).contains(&byte) {
            byte as char
        } else {
            ' '
        };
        let _ = out.try_push(printable);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Downsampling;

    /// Minimal valid blob: one order, one pattern, sample 1 is 512 bytes of
    /// 0x40 at full volume, and `cell` sits at pattern 0 row 0 channel 0.
    fn tiny_song(cell: [u8; 4]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN + PATTERN_LEN + 512];
        data[..4].copy_from_slice(b"tiny");
        // Sample 1 header: 256 words long, volume 64, loop 0 length 1 word
        data[SAMPLE_HEADERS_OFFSET + 22] = 1;
        data[SAMPLE_HEADERS_OFFSET + 25] = 64;
        data[SAMPLE_HEADERS_OFFSET + 29] = 1;
        data[format::ORDER_COUNT_OFFSET] = 1;
        data[format::TAG_OFFSET..format::TAG_OFFSET + 4].copy_from_slice(b"M.K.");
        data[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&cell);
        for byte in &mut data[HEADER_LEN + PATTERN_LEN..] {
            *byte = 0x40;
        }
        data
    }

    /// C-2 (period 428) on sample 1, no effect.
    const NOTE_C2: [u8; 4] = [0x01, 0xAC, 0x10, 0x00];

    fn run_until_tick<E: PlayerEvents>(player: &mut Player<'_, E>) {
        for _ in 0..100_000 {
            player.tick();
            if player.update() == Update::Tick {
                return;
            }
        }
        panic!("timer never fired");
    }

    #[test]
    fn inactive_player_ignores_both_paths() {
        let mut player = Player::new(Config::with_mixing_freq(31_250));
        assert!(!player.is_playing());
        player.tick();
        assert_eq!(player.update(), Update::Inactive);
        assert_eq!(player.output_left(), 0);
    }

    #[test]
    fn update_is_idle_between_fires() {
        let data = tiny_song(NOTE_C2);
        let mut player = Player::new(Config::with_mixing_freq(31_250));
        player.load(&data).unwrap();

        player.tick();
        assert_eq!(player.update(), Update::Idle);
        assert_eq!(player.update(), Update::Idle);
    }

    #[test]
    fn header_fields_are_parsed() {
        let data = tiny_song(NOTE_C2);
        let mut player = Player::new(Config::with_mixing_freq(31_250));
        player.load(&data).unwrap();

        let song = player.song();
        assert_eq!(song.name.as_str(), "tiny");
        assert_eq!(&song.tag, b"M.K.");
        assert_eq!(song.order_count, 1);
        assert_eq!(song.pattern_count, 1);
        assert_eq!(player.sample(0).len(), 512);
        assert_eq!(player.sample(0).volume, 64);
    }

    #[test]
    fn full_rate_mix_applies_x2_gain() {
        let data = tiny_song(NOTE_C2);
        let mut player = Player::new(Config::with_mixing_freq(31_250));
        player.load(&data).unwrap();

        run_until_tick(&mut player);
        player.tick();
        // 0x40 * volume 64, channel 0 to the left bus, x2 output gain
        assert_eq!(player.output_left(), 0x40 * 64 * 2);
        assert_eq!(player.output_right(), 0);
    }

    #[test]
    fn downsampled_mix_computes_every_other_sample() {
        let config = Config {
            mixing_freq: 31_250,
            downsampling: Downsampling::Half { lerp: false },
            ..Config::default()
        };
        let data = tiny_song(NOTE_C2);
        let mut player = Player::new(config);
        player.load(&data).unwrap();

        run_until_tick(&mut player);
        // First tick of the pair fetches the right-bus channels only
        player.tick();
        assert_eq!(player.output_left(), 0);
        // Second tick completes the pair and publishes the bus
        player.tick();
        assert_eq!(player.output_left(), 0x40 * 64 * 2);
    }

    #[test]
    fn lerp_ramps_between_full_rate_points() {
        let config = Config {
            mixing_freq: 31_250,
            downsampling: Downsampling::Half { lerp: true },
            ..Config::default()
        };
        let data = tiny_song(NOTE_C2);
        let mut player = Player::new(config);
        player.load(&data).unwrap();

        run_until_tick(&mut player);
        // Pair 1 computes the slope toward 0x40 * 64 without x2 gain
        player.tick();
        player.tick();
        assert_eq!(player.output_left(), 0);
        // Pair 2 walks the bus up in two half steps
        player.tick();
        assert_eq!(player.output_left(), 0x40 * 64 / 2);
        player.tick();
        assert_eq!(player.output_left(), 0x40 * 64);
    }

    #[test]
    fn stop_releases_the_channels() {
        let data = tiny_song(NOTE_C2);
        let mut player = Player::new(Config::with_mixing_freq(31_250));
        player.load(&data).unwrap();

        run_until_tick(&mut player);
        assert!(player.channel(0).sampler().is_active());

        player.stop();
        assert!(!player.is_playing());
        assert!(!player.channel(0).sampler().is_active());
        assert_eq!(player.update(), Update::Inactive);
    }

    #[test]
    fn reload_restarts_from_the_top() {
        let data = tiny_song(NOTE_C2);
        let mut player = Player::new(Config::with_mixing_freq(31_250));
        player.load(&data).unwrap();
        for _ in 0..10 {
            run_until_tick(&mut player);
        }
        assert_ne!(player.position(), Position::default());

        player.load(&data).unwrap();
        assert_eq!(player.position(), Position::default());
        assert_eq!(player.stats().playback_duration, 0);
    }
}
