//! A single LADSPA plugin instance and the C callbacks that operate on it. The DSSI wrapper reuses
//! these, it only adds its own callbacks on top.

use std::os::raw::c_ulong;
use std::ptr;

use super::sys::*;
use crate::context::PluginApi;
use crate::midi::MidiEventList;
use crate::plugin::{Plugin, PluginConfig};
use crate::transport::TimePos;
use crate::util::permit_alloc;
use crate::wrapper::block::{AudioBuffers, BlockProcessor, HostBlock, PortKind, PortLayout};
use crate::wrapper::dssi::sys::snd_seq_event_t;
use crate::wrapper::dssi::ProgramSlot;
use crate::wrapper::util::{process_wrapper, DEFAULT_BUFFER_SIZE};

/// Stored in the descriptor's `ImplementationData` so `instantiate()` knows which format and port
/// layout it is creating an instance for.
#[derive(Debug, Clone, Copy)]
pub struct InstanceConfig {
    pub plugin_api: PluginApi,
    pub layout: PortLayout,
}

pub struct Instance<P: Plugin> {
    pub(crate) processor: BlockProcessor<P>,
    layout: PortLayout,

    audio_inputs: Vec<*const f32>,
    audio_outputs: Vec<*mut f32>,
    /// One port per parameter, null until the host connects it.
    controls: Vec<*mut f32>,
    latency_port: *mut f32,
    sample_rate_port: *mut f32,
    buffers: AudioBuffers,

    /// The last program returned from DSSI's `get_program()`.
    pub(crate) program_slot: ProgramSlot,
}

/// The host side of a LADSPA or DSSI block. Control values are read straight from the ports.
struct PortBlock<'a> {
    controls: &'a [*mut f32],
    latency_port: *mut f32,
    events: &'a [snd_seq_event_t],
}

impl<'a> HostBlock<'a> for PortBlock<'a> {
    fn control_value(&self, index: u32) -> Option<f32> {
        match self.controls.get(index as usize) {
            Some(port) if !port.is_null() => Some(unsafe { **port }),
            _ => None,
        }
    }

    fn decode_events(&mut self, events: &mut MidiEventList<'a>) {
        for event in self.events {
            if let Some(event) = crate::wrapper::dssi::decode_seq_event(event) {
                events.push(event);
            }
        }
    }

    fn write_output(&mut self, index: u32, value: f32) {
        if let Some(port) = self.controls.get(index as usize) {
            if !port.is_null() {
                unsafe { **port = value };
            }
        }
    }

    fn write_latency(&mut self, latency: u32) {
        if !self.latency_port.is_null() {
            unsafe { *self.latency_port = latency as f32 };
        }
    }
}

impl<P: Plugin> Instance<P> {
    pub fn new(config: InstanceConfig, sample_rate: f64) -> Self {
        let layout = config.layout;

        Self {
            processor: BlockProcessor::new(
                config.plugin_api,
                PluginConfig::new(DEFAULT_BUFFER_SIZE, sample_rate),
            ),
            layout,

            audio_inputs: vec![ptr::null(); layout.audio_inputs as usize],
            audio_outputs: vec![ptr::null_mut(); layout.audio_outputs as usize],
            controls: vec![ptr::null_mut(); layout.parameters as usize],
            latency_port: ptr::null_mut(),
            sample_rate_port: ptr::null_mut(),
            buffers: AudioBuffers::new(
                layout.audio_inputs,
                layout.audio_outputs,
                DEFAULT_BUFFER_SIZE,
            ),

            program_slot: ProgramSlot::default(),
        }
    }

    pub fn connect_port(&mut self, port: u32, data: *mut f32) {
        match self.layout.kind(port) {
            Some(PortKind::AudioInput(channel)) => {
                self.audio_inputs[channel as usize] = data as *const f32
            }
            Some(PortKind::AudioOutput(channel)) => self.audio_outputs[channel as usize] = data,
            Some(PortKind::Latency) => self.latency_port = data,
            Some(PortKind::SampleRate) => self.sample_rate_port = data,
            Some(PortKind::Parameter(index)) => self.controls[index as usize] = data,
            Some(PortKind::EventInput | PortKind::EventOutput) | None => {
                hb_debug_assert_failure!("Unknown port index {}", port)
            }
        }
    }

    /// Write the cached parameter values back to the input control ports. Used after loading a
    /// program, since the host would otherwise overwrite the new values on the next block.
    pub fn write_controls(&mut self) {
        for (index, port) in self.controls.iter().enumerate() {
            let index = index as u32;
            if !port.is_null() && !self.processor.adapter().is_parameter_output(index) {
                unsafe { **port = self.processor.host_value(index) };
            }
        }
    }

    /// Process a block. `events` is empty for LADSPA.
    pub fn run(&mut self, frames: u32, events: &[snd_seq_event_t]) {
        if frames > self.processor.adapter().buffer_size() {
            // This reallocates on the audio thread, which should show up while debugging
            hb_debug_assert_failure!(
                "The host sent a block of {} samples, growing the buffers to match",
                frames
            );
            self.processor.request_buffer_size(frames);
            permit_alloc(|| self.buffers.resize(frames));
        }

        if !self.sample_rate_port.is_null() {
            unsafe { *self.sample_rate_port = self.processor.adapter().sample_rate() as f32 };
        }

        let Self {
            processor,
            audio_inputs,
            audio_outputs,
            controls,
            latency_port,
            buffers,
            ..
        } = self;

        process_wrapper(|| {
            let (inputs, outputs) =
                unsafe { buffers.slices(audio_inputs, audio_outputs, frames as usize) };
            let mut host = PortBlock {
                controls,
                latency_port: *latency_port,
                events,
            };

            processor.process(&mut host, inputs, outputs, frames, &TimePos::default());
        });
    }
}

pub unsafe extern "C" fn instantiate<P: Plugin>(
    descriptor: *const LADSPA_Descriptor,
    sample_rate: c_ulong,
) -> LADSPA_Handle {
    check_null_ptr!(ptr::null_mut(), descriptor, (*descriptor).ImplementationData);
    if sample_rate == 0 {
        hb_error!("The host tried to instantiate the plugin with a sample rate of 0");
        return ptr::null_mut();
    }

    let config = *((*descriptor).ImplementationData as *const InstanceConfig);
    Box::into_raw(Box::new(Instance::<P>::new(config, sample_rate as f64))) as LADSPA_Handle
}

pub unsafe extern "C" fn connect_port<P: Plugin>(
    instance: LADSPA_Handle,
    port: c_ulong,
    data: *mut LADSPA_Data,
) {
    check_null_ptr!((), instance);

    (*(instance as *mut Instance<P>)).connect_port(port as u32, data);
}

pub unsafe extern "C" fn activate<P: Plugin>(instance: LADSPA_Handle) {
    check_null_ptr!((), instance);

    let instance = &mut *(instance as *mut Instance<P>);
    instance.processor.apply_pending_config();
    instance.processor.adapter_mut().activate();
}

pub unsafe extern "C" fn run<P: Plugin>(instance: LADSPA_Handle, sample_count: c_ulong) {
    check_null_ptr!((), instance);

    (*(instance as *mut Instance<P>)).run(sample_count as u32, &[]);
}

pub unsafe extern "C" fn deactivate<P: Plugin>(instance: LADSPA_Handle) {
    check_null_ptr!((), instance);

    (*(instance as *mut Instance<P>)).processor.adapter_mut().deactivate();
}

pub unsafe extern "C" fn cleanup<P: Plugin>(instance: LADSPA_Handle) {
    check_null_ptr!((), instance);

    drop(Box::from_raw(instance as *mut Instance<P>));
}
