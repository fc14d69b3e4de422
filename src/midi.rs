//! Constants and definitions surrounding MIDI support.
//!
//! Events are stored in the host's wire format rather than as a decoded enum, since every plugin
//! format the bridge targets speaks raw MIDI bytes and the plugin is free to interpret them
//! however it wants. Messages of up to four bytes are stored inline. Longer messages (SysEx)
//! borrow the host's buffer for the duration of a single block.

use midi_consts::channel_event as midi;

pub use midi_consts::channel_event::control_change;

/// The maximum number of events a single block can hold. Events beyond this are dropped.
pub const MAX_MIDI_EVENTS: usize = 512;

/// The number of bytes that are stored inline in a [`MidiEvent`].
pub const MIDI_INLINE_DATA_SIZE: usize = 4;

/// A single timestamped MIDI message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiEvent<'a> {
    /// The sample offset within the current block, always smaller than the block's length.
    pub frame: u32,
    /// The message's length in bytes.
    pub size: u32,
    /// The message's bytes if `size <= 4`. Unused bytes are zero.
    pub data: [u8; MIDI_INLINE_DATA_SIZE],
    /// The message's bytes if `size > 4`.
    pub data_ext: Option<&'a [u8]>,
}

impl MidiEvent<'static> {
    /// An empty placeholder event, used to initialize fixed size event lists.
    pub const EMPTY: MidiEvent<'static> = MidiEvent {
        frame: 0,
        size: 0,
        data: [0; MIDI_INLINE_DATA_SIZE],
        data_ext: None,
    };
}

impl<'a> MidiEvent<'a> {
    /// Wrap a raw MIDI message. Returns `None` for empty messages. Messages of up to four bytes are
    /// copied, longer messages keep a reference to `bytes`.
    pub fn from_bytes(frame: u32, bytes: &'a [u8]) -> Option<Self> {
        match bytes.len() {
            0 => None,
            len if len <= MIDI_INLINE_DATA_SIZE => {
                let mut data = [0; MIDI_INLINE_DATA_SIZE];
                data[..len].copy_from_slice(bytes);

                Some(Self {
                    frame,
                    size: len as u32,
                    data,
                    data_ext: None,
                })
            }
            len => Some(Self {
                frame,
                size: len as u32,
                data: [0; MIDI_INLINE_DATA_SIZE],
                data_ext: Some(bytes),
            }),
        }
    }

    /// Build a channel voice message from its status nibble, channel, and data bytes. Returns
    /// `None` if `channel` is not a valid zero-indexed MIDI channel or if the status nibble is not
    /// a channel voice message. The message's size is derived from the status.
    pub fn from_channel_message(frame: u32, status: u8, channel: u8, data1: u8, data2: u8) -> Option<Self> {
        if channel > midi::MIDI_CHANNEL_MASK {
            return None;
        }

        let size = match status & midi::EVENT_TYPE_MASK {
            midi::NOTE_OFF
            | midi::NOTE_ON
            | midi::POLYPHONIC_KEY_PRESSURE
            | midi::CONTROL_CHANGE
            | midi::PITCH_BEND_CHANGE => 3,
            midi::PROGRAM_CHANGE | midi::CHANNEL_KEY_PRESSURE => 2,
            _ => return None,
        };

        let mut data = [
            (status & midi::EVENT_TYPE_MASK) | channel,
            data1 & 0x7f,
            data2 & 0x7f,
            0,
        ];
        if size == 2 {
            data[2] = 0;
        }

        Some(Self {
            frame,
            size,
            data,
            data_ext: None,
        })
    }

    /// A note on message. Velocities and notes are seven bit values.
    pub fn note_on(frame: u32, channel: u8, note: u8, velocity: u8) -> Option<Self> {
        Self::from_channel_message(frame, midi::NOTE_ON, channel, note, velocity)
    }

    /// A note off message.
    pub fn note_off(frame: u32, channel: u8, note: u8, velocity: u8) -> Option<Self> {
        Self::from_channel_message(frame, midi::NOTE_OFF, channel, note, velocity)
    }

    /// A pitch bend message. `value` is centered around zero, in the range `[-8192, 8191]`.
    pub fn pitch_bend(frame: u32, channel: u8, value: i16) -> Option<Self> {
        let value = (value.clamp(-8192, 8191) as i32 + 8192) as u16;
        Self::from_channel_message(
            frame,
            midi::PITCH_BEND_CHANGE,
            channel,
            (value & 0x7f) as u8,
            ((value >> 7) & 0x7f) as u8,
        )
    }

    /// The message's bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self.data_ext {
            Some(data) => data,
            None => &self.data[..(self.size as usize).min(MIDI_INLINE_DATA_SIZE)],
        }
    }

    /// The status byte's upper nibble.
    pub fn status(&self) -> u8 {
        self.as_bytes().first().copied().unwrap_or(0) & midi::EVENT_TYPE_MASK
    }

    /// The message's zero-indexed channel, if this is a channel voice message.
    pub fn channel(&self) -> Option<u8> {
        let status = self.as_bytes().first().copied()?;
        if (0x80..0xf0).contains(&status) {
            Some(status & midi::MIDI_CHANNEL_MASK)
        } else {
            None
        }
    }

    /// Whether this is a note on with a non-zero velocity.
    pub fn is_note_on(&self) -> bool {
        self.size == 3 && self.status() == midi::NOTE_ON && self.data[2] != 0
    }

    /// Whether this is a note off, or a note on with zero velocity.
    pub fn is_note_off(&self) -> bool {
        self.size == 3
            && (self.status() == midi::NOTE_OFF
                || (self.status() == midi::NOTE_ON && self.data[2] == 0))
    }
}

/// A fixed capacity list of events for a single block. This lives on the audio thread's stack so
/// decoding events never allocates.
pub struct MidiEventList<'a> {
    events: [MidiEvent<'a>; MAX_MIDI_EVENTS],
    len: usize,
}

impl Default for MidiEventList<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> MidiEventList<'a> {
    pub fn new() -> Self {
        Self {
            events: [MidiEvent::EMPTY; MAX_MIDI_EVENTS],
            len: 0,
        }
    }

    /// Append an event. Returns `false` and drops the event when the list is full.
    pub fn push(&mut self, event: MidiEvent<'a>) -> bool {
        if self.len >= MAX_MIDI_EVENTS {
            hb_debug_assert_failure!("The MIDI event list is full, dropping event");
            return false;
        }

        self.events[self.len] = event;
        self.len += 1;

        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn as_slice(&self) -> &[MidiEvent<'a>] {
        &self.events[..self.len]
    }

    /// Sort the events by their timing. The sort is stable, so events at the same frame keep the
    /// order the host sent them in. This is an insertion sort since the host's events are almost
    /// always already sorted, and `slice::sort_by_key()` may allocate.
    pub fn sort_by_frame(&mut self) {
        let events = &mut self.events[..self.len];
        for i in 1..events.len() {
            let mut j = i;
            while j > 0 && events[j - 1].frame > events[j].frame {
                events.swap(j - 1, j);
                j -= 1;
            }
        }
    }

    /// Clamp all events' timings so they fall within a block of `frames` samples.
    pub fn clamp_timing(&mut self, frames: u32) {
        for event in &mut self.events[..self.len] {
            event.frame = crate::wrapper::util::clamp_input_event_timing(event.frame, frames);
        }
    }
}
