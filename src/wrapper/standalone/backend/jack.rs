use anyhow::{Context, Result};
use crossbeam::sync::Parker;
use jack::{
    AsyncClient, AudioIn, AudioOut, Client, ClientOptions, ClientStatus, ClosureProcessHandler,
    Control, MidiIn, Port, PortSpec, TransportBBT, TransportState,
};
use std::ptr;

use super::{Backend, BackendBlock};
use crate::midi::{MidiEvent, MidiEventList};
use crate::plugin::{Plugin, PluginFeatures};
use crate::transport::{TimePos, TimePosBbt};
use crate::wrapper::block::AudioBuffers;
use crate::wrapper::standalone::config::WrapperConfig;

/// Uses JACK audio and MIDI.
pub struct Jack {
    config: WrapperConfig,
    /// The JACK client, wrapped in an option since it needs to be transformed into an `AsyncClient`
    /// and then back into a regular `Client`.
    client: Option<Client>,

    inputs: Vec<Port<AudioIn>>,
    outputs: Vec<Port<AudioOut>>,
    midi_input: Option<Port<MidiIn>>,
}

/// Send wrapper for the channel pointer vectors, so they can be preallocated outside of the
/// process callback.
struct ChannelPointers<T>(Vec<T>);

unsafe impl<T> Send for ChannelPointers<T> {}

/// Translate JACK's transport to a [`TimePos`]. JACK's bars and beats are already one-indexed.
pub fn time_pos_from_jack(playing: bool, frame: u32, bbt: Option<&TransportBBT>) -> TimePos {
    let mut time_pos = TimePos {
        playing,
        frame: frame as u64,
        ..TimePos::default()
    };

    if let Some(bbt) = bbt {
        time_pos.bpm = bbt.bpm;
        time_pos.bbt = TimePosBbt {
            valid: true,
            bar: bbt.bar as i32,
            beat: bbt.beat as i32,
            tick: bbt.tick as f64,
            bar_start_tick: bbt.bar_start_tick,
            beats_per_bar: bbt.sig_num,
            beat_type: bbt.sig_denom,
            ticks_per_beat: bbt.ticks_per_beat,
        };
    }

    time_pos.validate_bbt();
    time_pos
}

impl Backend for Jack {
    fn sample_rate(&self) -> f64 {
        self.client
            .as_ref()
            .map(|client| client.sample_rate() as f64)
            .unwrap_or_default()
    }

    fn max_buffer_size(&self) -> u32 {
        self.client
            .as_ref()
            .map(|client| client.buffer_size())
            .unwrap_or_default()
    }

    fn run(&mut self, mut cb: impl FnMut(BackendBlock) -> bool + 'static + Send) -> Result<()> {
        let client = self
            .client
            .take()
            .context("The JACK backend is already running")?;
        let buffer_size = client.buffer_size();

        let input_names = port_names(&self.inputs)?;
        let output_names = port_names(&self.outputs)?;
        let midi_input_name = match &self.midi_input {
            Some(port) => Some(port.name().context("Could not query the MIDI port's name")?),
            None => None,
        };

        let mut buffers = AudioBuffers::new(
            self.inputs.len() as u32,
            self.outputs.len() as u32,
            buffer_size,
        );
        let mut input_ptrs = ChannelPointers(vec![ptr::null::<f32>(); self.inputs.len()]);
        let mut output_ptrs = ChannelPointers(vec![ptr::null_mut::<f32>(); self.outputs.len()]);

        // This thread needs to be blocked until processing is finished
        let parker = Parker::new();
        let unparker = parker.unparker().clone();

        let inputs = std::mem::take(&mut self.inputs);
        let mut outputs = std::mem::take(&mut self.outputs);
        let midi_input = self.midi_input.take();
        let process_handler = ClosureProcessHandler::new(move |client, ps| {
            // JACK never chops up periods, so anything larger than the buffer size means the buffer
            // size changed under us
            let frames = ps.n_frames();
            if frames > buffer_size {
                hb_error!(
                    "Buffer size changed from {} to {}, which is not supported",
                    buffer_size,
                    frames
                );
                unparker.unpark();
                return Control::Quit;
            }

            for (input_ptr, port) in input_ptrs.0.iter_mut().zip(inputs.iter()) {
                *input_ptr = port.as_slice(ps).as_ptr();
            }
            for (output_ptr, port) in output_ptrs.0.iter_mut().zip(outputs.iter_mut()) {
                *output_ptr = port.as_mut_slice(ps).as_mut_ptr();
            }

            let mut events = MidiEventList::new();
            if let Some(midi_input) = &midi_input {
                for midi in midi_input.iter(ps) {
                    if let Some(event) = MidiEvent::from_bytes(midi.time, midi.bytes) {
                        events.push(event);
                    }
                }
            }

            let time_pos = match client.transport().query() {
                Ok(transport) => time_pos_from_jack(
                    transport.state == TransportState::Rolling,
                    transport.pos.frame(),
                    transport.pos.bbt().as_ref(),
                ),
                Err(_) => TimePos::default(),
            };

            // SAFETY: The port buffers stay valid for the duration of this callback
            let (inputs, outputs) =
                unsafe { buffers.slices(&input_ptrs.0, &output_ptrs.0, frames as usize) };
            if cb(BackendBlock {
                inputs,
                outputs,
                frames,
                events: events.as_slice(),
                time_pos,
            }) {
                Control::Continue
            } else {
                unparker.unpark();
                Control::Quit
            }
        });

        // JACK2 only allows connecting ports while the client is active, and the connections
        // disappear when the client is deactivated
        let async_client = client
            .activate_async((), process_handler)
            .context("Could not activate the JACK client")?;
        if let Err(err) =
            self.connect_ports(&async_client, &input_names, &output_names, midi_input_name)
        {
            hb_error!("Error connecting JACK ports: {:#}", err);
        }

        // The process callback happens on another thread, so we need to block this thread until we
        // get the request to shut down or until the process callback runs into an error
        parker.park();

        let (client, _, _) = async_client
            .deactivate()
            .context("Could not deactivate the JACK client")?;
        self.client = Some(client);

        Ok(())
    }
}

impl Jack {
    /// Initialize the JACK backend. Returns an error if this failed for whatever reason. The plugin
    /// type determines the client's name and its ports.
    pub fn new<P: Plugin>(config: WrapperConfig) -> Result<Self> {
        let client_name = config.client_name(P::NAME);
        let (client, status) = Client::new(&client_name, ClientOptions::NO_START_SERVER)
            .context("Error while initializing the JACK client")?;
        if status.intersects(ClientStatus::FAILURE | ClientStatus::SERVER_ERROR) {
            anyhow::bail!("The JACK server returned an error: {:?}", status);
        }

        if config.connect_inputs.is_none() && P::NUM_INPUTS > 0 {
            hb_log!(
                "Audio inputs are not connected automatically to prevent feedback. Set \
                 HOSTBRIDGE_CONNECT_INPUTS to connect the input ports."
            )
        }

        let mut inputs = Vec::new();
        for port_no in 1..=P::NUM_INPUTS {
            inputs.push(
                client
                    .register_port(&format!("in{port_no}"), AudioIn::default())
                    .with_context(|| format!("Could not register input port {port_no}"))?,
            );
        }

        // The outputs are connected just after activating the client in `run()`
        let mut outputs = Vec::new();
        for port_no in 1..=P::NUM_OUTPUTS {
            outputs.push(
                client
                    .register_port(&format!("out{port_no}"), AudioOut::default())
                    .with_context(|| format!("Could not register output port {port_no}"))?,
            );
        }

        let midi_input = if P::FEATURES.contains(PluginFeatures::IS_SYNTH) {
            Some(
                client
                    .register_port("events-in", MidiIn::default())
                    .context("Could not register the MIDI input port")?,
            )
        } else {
            None
        };

        Ok(Self {
            config,
            client: Some(client),

            inputs,
            outputs,
            midi_input,
        })
    }

    /// With JACK2 ports can only be connected while the client is active, and they'll be
    /// disconnected automatically on deactivation.
    fn connect_ports<N, H>(
        &self,
        async_client: &AsyncClient<N, H>,
        input_names: &[String],
        output_names: &[String],
        midi_input_name: Option<String>,
    ) -> Result<()> {
        let client = async_client.as_client();

        // We don't connect the inputs automatically to avoid feedback loops, but this should be
        // safe. And if this fails, then that's fine.
        for (i, output_name) in output_names.iter().enumerate() {
            // The system ports are 1-indexed
            let system_playback_port_name = format!("system:playback_{}", i + 1);
            let _ = client.connect_ports_by_name(output_name, &system_playback_port_name);
        }

        // This can either be a single port all inputs should be connected to, or a comma separated
        // list of ports
        if let Some(port_name) = &self.config.connect_inputs {
            if port_name.contains(',') {
                for (port_name, input_name) in port_name.split(',').zip(input_names) {
                    client
                        .connect_ports_by_name(port_name.trim(), input_name)
                        .with_context(|| format!("Could not connect to '{port_name}'"))?;
                }
            } else {
                for input_name in input_names {
                    client
                        .connect_ports_by_name(port_name, input_name)
                        .with_context(|| format!("Could not connect to '{port_name}'"))?;
                }
            }
        }

        if let (Some(input_name), Some(port_name)) =
            (midi_input_name, &self.config.connect_midi_input)
        {
            client
                .connect_ports_by_name(port_name, &input_name)
                .with_context(|| format!("Could not connect to '{port_name}'"))?;
        }

        Ok(())
    }
}

fn port_names<T: PortSpec>(ports: &[Port<T>]) -> Result<Vec<String>> {
    ports
        .iter()
        .map(|port| port.name().context("Could not query a port's name"))
        .collect()
}
