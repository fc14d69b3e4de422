//! The host's transport information, translated into a single format-independent structure. Every
//! wrapper fills in a fresh [`TimePos`] at the start of each block from whatever the host provides.

/// The tick resolution used when the host only reports positions in quarter notes.
pub const TICKS_PER_BEAT: f64 = 1920.0;

/// The transport state for the current block. This is only ever read by the plugin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePos {
    /// Whether the host's transport is rolling.
    pub playing: bool,
    /// The position of the first sample in this block, in samples.
    pub frame: u64,
    /// The current tempo, in quarter notes per minute. Only meaningful if `bbt.valid` is set.
    pub bpm: f64,
    pub bbt: TimePosBbt,
}

/// Musical position information. Bars and beats are one-indexed, ticks are zero-indexed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePosBbt {
    /// Whether the host provided enough information to fill in the other fields. When this is
    /// `false` the other fields contain their defaults and should be ignored.
    pub valid: bool,
    pub bar: i32,
    pub beat: i32,
    pub tick: f64,
    /// The number of ticks since the start of the song at the start of the current bar.
    pub bar_start_tick: f64,
    /// The time signature's numerator.
    pub beats_per_bar: f32,
    /// The time signature's denominator.
    pub beat_type: f32,
    pub ticks_per_beat: f64,
}

impl Default for TimePos {
    fn default() -> Self {
        Self {
            playing: false,
            frame: 0,
            bpm: 120.0,
            bbt: TimePosBbt::default(),
        }
    }
}

impl Default for TimePosBbt {
    fn default() -> Self {
        Self {
            valid: false,
            bar: 1,
            beat: 1,
            tick: 0.0,
            bar_start_tick: 0.0,
            beats_per_bar: 4.0,
            beat_type: 4.0,
            ticks_per_beat: TICKS_PER_BEAT,
        }
    }
}

impl TimePos {
    /// Clear the BBT information if the host reported a time signature or tempo that cannot be
    /// used to compute musical positions. Every wrapper calls this after filling in the struct.
    pub fn validate_bbt(&mut self) {
        if !self.bbt.valid {
            return;
        }

        let signature_ok = self.bbt.beats_per_bar > 0.0 && self.bbt.beat_type > 0.0;
        let tempo_ok = self.bpm.is_finite() && self.bpm > 0.0;
        let ticks_ok = self.bbt.ticks_per_beat.is_finite() && self.bbt.ticks_per_beat > 0.0;
        if !(signature_ok && tempo_ok && ticks_ok) {
            self.bbt = TimePosBbt::default();
        }
    }
}

impl TimePosBbt {
    /// Compute bar, beat, and tick information from a song position in quarter notes, the way VST2,
    /// VST3, CLAP, and AU hosts report it. `beats_per_bar` and `beat_type` form the current time
    /// signature. Returns an invalid position if the signature or the position are not usable.
    ///
    /// This assumes the time signature has not changed since the start of the song, which is the
    /// same assumption every host makes when it only reports a single quarter note position.
    /// Negative positions (a pre-roll) count down from bar 0.
    pub fn from_quarter_notes(qn_pos: f64, beats_per_bar: f32, beat_type: f32) -> Self {
        if !(qn_pos.is_finite() && beats_per_bar > 0.0 && beat_type > 0.0) {
            return Self::default();
        }

        let beats_per_bar_f64 = beats_per_bar as f64;
        let qn_per_beat = 4.0 / beat_type as f64;
        let qn_per_bar = beats_per_bar_f64 * qn_per_beat;

        let bar_index = (qn_pos / qn_per_bar).floor();
        let qn_in_bar = (qn_pos - bar_index * qn_per_bar).max(0.0);
        let beats_in_bar = (qn_in_bar / qn_per_beat).min(beats_per_bar_f64);
        let beat_index = beats_in_bar.floor();

        let bar = bar_index as i32 + 1;
        Self {
            valid: true,
            bar,
            beat: beat_index as i32 + 1,
            tick: (beats_in_bar - beat_index) * TICKS_PER_BEAT,
            bar_start_tick: TICKS_PER_BEAT * beats_per_bar_f64 * (bar - 1) as f64,
            beats_per_bar,
            beat_type,
            ticks_per_beat: TICKS_PER_BEAT,
        }
    }

    /// The song position in quarter notes, the inverse of
    /// [`from_quarter_notes()`][Self::from_quarter_notes()]. Used by formats that report
    /// bar/beat/tick positions and need a quarter note position for other hosts' conventions.
    pub fn quarter_notes(&self) -> f64 {
        if !self.valid || self.beat_type <= 0.0 || self.ticks_per_beat <= 0.0 {
            return 0.0;
        }

        let qn_per_beat = 4.0 / self.beat_type as f64;
        let beats = (self.bar - 1) as f64 * self.beats_per_bar as f64
            + (self.beat - 1) as f64
            + self.tick / self.ticks_per_beat;

        beats * qn_per_beat
    }
}
