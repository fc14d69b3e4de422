use anyhow::Result;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::backend::{Backend, BackendBlock};
use super::config::WrapperConfig;
use crate::context::PluginApi;
use crate::midi::{MidiEvent, MidiEventList};
use crate::plugin::{Plugin, PluginConfig};
use crate::sync::ParamSync;
use crate::transport::{TimePos, TimePosBbt};
use crate::wrapper::block::{BlockProcessor, HostBlock};
use crate::wrapper::util::process_wrapper;

pub struct Wrapper<P: Plugin, B: Backend> {
    backend: B,
    processor: BlockProcessor<P>,
    config: WrapperConfig,

    /// The latency last reported by the plugin. There is no host to report this to, but it's
    /// logged when it changes.
    latency: Arc<AtomicU32>,
}

/// The standalone target has no host automation. Only the backend's MIDI reaches the plugin.
struct StandaloneBlock<'a> {
    events: &'a [MidiEvent<'a>],
    latency: Option<u32>,
}

impl<'a> HostBlock<'a> for StandaloneBlock<'a> {
    fn control_value(&self, _index: u32) -> Option<f32> {
        None
    }

    fn decode_events(&mut self, events: &mut MidiEventList<'a>) {
        for event in self.events {
            events.push(*event);
        }
    }

    fn write_output(&mut self, _index: u32, _value: f32) {}

    fn write_latency(&mut self, latency: u32) {
        self.latency = Some(latency);
    }
}

/// Fill in the configured tempo and time signature when the backend's transport does not have any
/// BBT information. The musical position is then derived from the sample position.
pub fn apply_transport_fallback(time_pos: &mut TimePos, config: &WrapperConfig, sample_rate: f64) {
    if time_pos.bbt.valid || sample_rate <= 0.0 {
        return;
    }

    time_pos.bpm = config.tempo;
    let quarter_notes = time_pos.frame as f64 / sample_rate * (config.tempo / 60.0);
    time_pos.bbt = TimePosBbt::from_quarter_notes(
        quarter_notes,
        config.timesig_num as f32,
        config.timesig_denom as f32,
    );
    time_pos.validate_bbt();
}

impl<P: Plugin, B: Backend> Wrapper<P, B> {
    /// Instantiate the plugin for the backend's sample rate and buffer size.
    pub fn new(backend: B, config: WrapperConfig) -> Self {
        let processor = BlockProcessor::new(
            PluginApi::Standalone,
            PluginConfig::new(backend.max_buffer_size(), backend.sample_rate()),
        );
        let latency = Arc::new(AtomicU32::new(processor.adapter().latency()));

        Self {
            backend,
            processor,
            config,

            latency,
        }
    }

    pub fn sync(&self) -> &Arc<ParamSync> {
        self.processor.sync()
    }

    /// Start processing audio, and block this thread until the backend stops. The plugin is moved
    /// to the audio thread while this is running, and it's deactivated and dropped afterwards.
    pub fn run(self) -> Result<B> {
        let Self {
            mut backend,
            mut processor,
            config,
            latency,
        } = self;

        let sample_rate = backend.sample_rate();
        processor.adapter_mut().activate();

        backend.run(move |block: BackendBlock| {
            let BackendBlock {
                inputs,
                outputs,
                frames,
                events,
                mut time_pos,
            } = block;

            apply_transport_fallback(&mut time_pos, &config, sample_rate);

            let mut host = StandaloneBlock {
                events,
                latency: None,
            };
            process_wrapper(|| processor.process(&mut host, inputs, outputs, frames, &time_pos));

            if let Some(new_latency) = host.latency {
                if latency.swap(new_latency, Ordering::Relaxed) != new_latency {
                    hb_trace!("The plugin's latency changed to {} samples", new_latency);
                }
            }

            true
        })?;

        Ok(backend)
    }

    /// The latency last reported by the plugin, in samples.
    pub fn latency_handle(&self) -> Arc<AtomicU32> {
        self.latency.clone()
    }
}
