//! LV2 hosts only send a `time:Position` object when something changes, so the last known position
//! has to be carried over and advanced from block to block.

use super::atom::{Atom, NumberTypes};
use crate::transport::{TimePos, TimePosBbt, TICKS_PER_BEAT};

/// The URIDs of the `time:Position` properties we read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionKeys {
    pub bar: u32,
    pub bar_beat: u32,
    pub beat_unit: u32,
    pub beats_per_bar: u32,
    pub beats_per_minute: u32,
    pub frame: u32,
    pub speed: u32,
}

/// The last position the host sent, advanced by every processed block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lv2Position {
    /// Zero-indexed, as in LV2.
    bar: Option<f64>,
    /// Zero-indexed and fractional.
    bar_beat: Option<f64>,
    beat_unit: Option<f64>,
    beats_per_bar: Option<f64>,
    beats_per_minute: Option<f64>,
    frame: f64,
    speed: f64,
}

impl Lv2Position {
    /// Apply a single property from a `time:Position` object. Unknown keys and non-numeric values
    /// are ignored.
    pub fn apply(&mut self, key: u32, value: Atom<'_>, keys: &PositionKeys, types: &NumberTypes) {
        let Some(value) = value.number(types) else {
            return;
        };

        if key == keys.bar {
            self.bar = Some(value);
        } else if key == keys.bar_beat {
            self.bar_beat = Some(value);
        } else if key == keys.beat_unit {
            self.beat_unit = Some(value);
        } else if key == keys.beats_per_bar {
            self.beats_per_bar = Some(value);
        } else if key == keys.beats_per_minute {
            self.beats_per_minute = Some(value);
        } else if key == keys.frame {
            self.frame = value;
        } else if key == keys.speed {
            self.speed = value;
        }
    }

    pub fn time_pos(&self) -> TimePos {
        let mut time_pos = TimePos {
            playing: self.speed != 0.0,
            frame: self.frame.max(0.0) as u64,
            ..TimePos::default()
        };

        if let (Some(bar), Some(bar_beat), Some(beat_unit), Some(beats_per_bar), Some(bpm)) = (
            self.bar,
            self.bar_beat,
            self.beat_unit,
            self.beats_per_bar,
            self.beats_per_minute,
        ) {
            let beat = bar_beat.max(0.0).floor();

            time_pos.bpm = bpm;
            time_pos.bbt = TimePosBbt {
                valid: true,
                bar: bar as i32 + 1,
                beat: beat as i32 + 1,
                tick: (bar_beat.max(0.0) - beat) * TICKS_PER_BEAT,
                bar_start_tick: bar * beats_per_bar * TICKS_PER_BEAT,
                beats_per_bar: beats_per_bar as f32,
                beat_type: beat_unit as f32,
                ticks_per_beat: TICKS_PER_BEAT,
            };
        }

        time_pos.validate_bbt();
        time_pos
    }

    /// Move the position forward by a block of `frames` samples at the current speed.
    pub fn advance(&mut self, frames: u32, sample_rate: f64) {
        if self.speed == 0.0 {
            return;
        }

        self.frame += self.speed * frames as f64;

        if let (Some(bar), Some(bar_beat), Some(beats_per_bar), Some(bpm)) = (
            self.bar,
            self.bar_beat,
            self.beats_per_bar,
            self.beats_per_minute,
        ) {
            if beats_per_bar <= 0.0 || sample_rate <= 0.0 {
                return;
            }

            let bar_beat = bar_beat + self.speed * frames as f64 / sample_rate * bpm / 60.0;
            let bars = (bar_beat / beats_per_bar).floor();
            self.bar = Some(bar + bars);
            self.bar_beat = Some(bar_beat - bars * beats_per_bar);
        }
    }
}
