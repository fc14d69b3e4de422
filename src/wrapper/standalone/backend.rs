use anyhow::Result;

use crate::midi::MidiEvent;
use crate::transport::TimePos;

#[cfg(test)]
pub use self::dummy::Dummy;
pub use self::jack::{time_pos_from_jack, Jack};

#[cfg(test)]
mod dummy;
mod jack;

/// A single block of audio and MIDI produced by a backend.
pub struct BackendBlock<'a> {
    pub inputs: &'a [&'a [f32]],
    pub outputs: &'a mut [&'a mut [f32]],
    pub frames: u32,
    /// Sorted by frame.
    pub events: &'a [MidiEvent<'a>],
    /// The transport as reported by the backend. The BBT information may be invalid.
    pub time_pos: TimePos,
}

/// An audio+MIDI backend for the standalone wrapper.
pub trait Backend: 'static + Send {
    fn sample_rate(&self) -> f64;

    /// The largest block the backend will ever pass to the process callback.
    fn max_buffer_size(&self) -> u32;

    /// Start processing audio and MIDI. The process callback will be called whenever there's a new
    /// block of audio to be processed, possibly on another thread. This blocks until the process
    /// callback returns `false` or until the backend shuts down.
    fn run(&mut self, cb: impl FnMut(BackendBlock) -> bool + 'static + Send) -> Result<()>;
}
