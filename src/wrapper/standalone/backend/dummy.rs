use anyhow::Result;

use super::{Backend, BackendBlock};
use crate::midi::MidiEvent;
use crate::transport::TimePos;

/// This backend runs a fixed number of blocks as fast as possible on the calling thread, without
/// any real audio or MIDI. Every input sample is `input_value`. The outputs of the last block are
/// kept around so they can be inspected afterwards.
pub struct Dummy {
    pub sample_rate: f64,
    pub period_size: u32,
    pub num_inputs: u32,
    pub num_outputs: u32,
    pub input_value: f32,
    /// Note on events as `(block, frame, note)`.
    pub notes: Vec<(usize, u32, u8)>,
    pub blocks: usize,

    pub last_outputs: Vec<Vec<f32>>,
    pub blocks_processed: usize,
}

impl Backend for Dummy {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn max_buffer_size(&self) -> u32 {
        self.period_size
    }

    fn run(&mut self, mut cb: impl FnMut(BackendBlock) -> bool + 'static + Send) -> Result<()> {
        let period_size = self.period_size as usize;
        let input_channels = vec![vec![self.input_value; period_size]; self.num_inputs as usize];
        let mut output_channels = vec![vec![0.0f32; period_size]; self.num_outputs as usize];

        let mut frame = 0;
        for block in 0..self.blocks {
            let note_bytes: Vec<[u8; 3]> = self
                .notes
                .iter()
                .filter(|(note_block, _, _)| *note_block == block)
                .map(|(_, _, note)| [0x90, *note, 100])
                .collect();
            let events: Vec<MidiEvent> = self
                .notes
                .iter()
                .filter(|(note_block, _, _)| *note_block == block)
                .zip(&note_bytes)
                .filter_map(|((_, frame, _), bytes)| MidiEvent::from_bytes(*frame, bytes))
                .collect();

            let inputs: Vec<&[f32]> = input_channels.iter().map(|c| c.as_slice()).collect();
            let mut outputs: Vec<&mut [f32]> =
                output_channels.iter_mut().map(|c| c.as_mut_slice()).collect();

            let keep_going = cb(BackendBlock {
                inputs: &inputs,
                outputs: &mut outputs,
                frames: self.period_size,
                events: &events,
                time_pos: TimePos {
                    playing: true,
                    frame,
                    ..TimePos::default()
                },
            });

            self.blocks_processed += 1;
            frame += self.period_size as u64;
            if !keep_going {
                break;
            }
        }

        self.last_outputs = output_channels;

        Ok(())
    }
}
