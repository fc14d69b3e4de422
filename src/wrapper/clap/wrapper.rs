use atomic_refcell::AtomicRefCell;
use clap_sys::events::{
    clap_event_header, clap_event_midi, clap_event_midi_sysex, clap_event_note,
    clap_event_param_value, clap_event_transport, clap_input_events, clap_output_events,
    CLAP_CORE_EVENT_SPACE_ID, CLAP_EVENT_MIDI, CLAP_EVENT_MIDI_SYSEX, CLAP_EVENT_NOTE_OFF,
    CLAP_EVENT_NOTE_ON, CLAP_EVENT_PARAM_VALUE, CLAP_TRANSPORT_HAS_BEATS_TIMELINE,
    CLAP_TRANSPORT_HAS_SECONDS_TIMELINE, CLAP_TRANSPORT_HAS_TEMPO,
    CLAP_TRANSPORT_HAS_TIME_SIGNATURE, CLAP_TRANSPORT_IS_PLAYING,
};
use clap_sys::ext::audio_ports::{
    clap_audio_port_info, clap_plugin_audio_ports, CLAP_AUDIO_PORT_IS_MAIN, CLAP_EXT_AUDIO_PORTS,
    CLAP_PORT_MONO, CLAP_PORT_STEREO,
};
use clap_sys::ext::latency::{clap_host_latency, clap_plugin_latency, CLAP_EXT_LATENCY};
use clap_sys::ext::note_ports::{
    clap_note_port_info, clap_plugin_note_ports, CLAP_EXT_NOTE_PORTS, CLAP_NOTE_DIALECT_CLAP,
    CLAP_NOTE_DIALECT_MIDI,
};
use clap_sys::ext::params::{
    clap_host_params, clap_param_info, clap_plugin_params, CLAP_EXT_PARAMS,
    CLAP_PARAM_IS_AUTOMATABLE, CLAP_PARAM_IS_READONLY, CLAP_PARAM_IS_STEPPED,
    CLAP_PARAM_RESCAN_VALUES,
};
use clap_sys::ext::state::{clap_plugin_state, CLAP_EXT_STATE};
use clap_sys::fixedpoint::{CLAP_BEATTIME_FACTOR, CLAP_SECTIME_FACTOR};
use clap_sys::host::clap_host;
use clap_sys::id::{clap_id, CLAP_INVALID_ID};
use clap_sys::plugin::clap_plugin;
use clap_sys::process::{
    clap_process, clap_process_status, CLAP_PROCESS_CONTINUE, CLAP_PROCESS_ERROR,
};
use clap_sys::stream::{clap_istream, clap_ostream};
use midi_consts::channel_event as midi;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::mem;
use std::os::raw::c_char;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use super::descriptor::PluginDescriptor;
use super::util::{read_state_chunk, write_state_chunk, ClapPtr};
use crate::context::PluginApi;
use crate::midi::{MidiEvent, MidiEventList};
use crate::param::{Parameter, ParameterHints};
use crate::plugin::{ClapPlugin, PluginConfig, PluginFeatures};
use crate::sync::ParamSync;
use crate::transport::{TimePos, TimePosBbt};
use crate::wrapper::adapter::PluginInfo;
use crate::wrapper::block::{AudioBuffers, BlockProcessor, HostBlock};
use crate::wrapper::state;
use crate::wrapper::util::{
    hash_param_id, process_wrapper, strlcpy, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE,
};

/// Stable IDs for the main audio ports. Inputs come before outputs.
const MAIN_INPUT_PORT_ID: clap_id = 0;
const MAIN_OUTPUT_PORT_ID: clap_id = 1;

/// All of these are needed to compute a bar/beat/tick position.
const WANTED_TRANSPORT_FLAGS: u32 =
    CLAP_TRANSPORT_HAS_BEATS_TIMELINE | CLAP_TRANSPORT_HAS_TEMPO | CLAP_TRANSPORT_HAS_TIME_SIGNATURE;

pub struct Wrapper<P: ClapPlugin> {
    /// The wrapped plugin. The audio thread only ever tries to lock this. If the host is restoring
    /// state at the same time, the block is skipped and the outputs are cleared.
    processor: Mutex<BlockProcessor<P>>,
    /// Only borrowed from the audio thread, and from `activate()` which the host never calls while
    /// processing.
    scratch: AtomicRefCell<ProcessScratch>,
    /// Parameter values as last seen by the plugin, readable without locking the processor.
    sync: Arc<ParamSync>,
    info: PluginInfo,

    /// The parameter ID hashes, indexed by parameter index.
    param_hashes: Vec<u32>,
    /// The inverse of `param_hashes`.
    param_index_by_hash: HashMap<u32, u32>,

    /// Whether the plugin is currently processing audio, as set by `start_processing()` and
    /// `stop_processing()`.
    is_processing: AtomicBool,
    /// The current latency in samples, as last reported by the plugin.
    current_latency: AtomicU32,
    /// Set from the audio thread when the latency changed. The host is informed from
    /// `on_main_thread()`.
    latency_changed: AtomicBool,

    host_callback: ClapPtr<clap_host>,

    /// Needs to be boxed because the plugin object is supposed to contain a static reference to
    /// this.
    _plugin_descriptor: Box<PluginDescriptor>,
    pub clap_plugin: AtomicRefCell<clap_plugin>,

    clap_plugin_audio_ports: clap_plugin_audio_ports,

    clap_plugin_latency: clap_plugin_latency,
    host_latency: AtomicRefCell<Option<ClapPtr<clap_host_latency>>>,

    clap_plugin_note_ports: clap_plugin_note_ports,

    clap_plugin_params: clap_plugin_params,
    host_params: AtomicRefCell<Option<ClapPtr<clap_host_params>>>,

    clap_plugin_state: clap_plugin_state,
}

struct ProcessScratch {
    buffers: AudioBuffers,
    /// The last value the host set for every parameter during the current block, if any.
    param_changes: Box<[Option<f32>]>,
    /// The last value sent to the host for every output parameter.
    output_values: Box<[f32]>,
}

/// The host side of a single process or flush call.
struct ClapBlock<'a> {
    in_events: Option<&'a clap_input_events>,
    out_events: Option<&'a clap_output_events>,

    param_hashes: &'a [u32],
    param_changes: &'a [Option<f32>],
    output_values: &'a mut [f32],
    latency: Option<u32>,
}

impl<'a> HostBlock<'a> for ClapBlock<'a> {
    fn control_value(&self, index: u32) -> Option<f32> {
        self.param_changes.get(index as usize).copied().flatten()
    }

    fn decode_events(&mut self, events: &mut MidiEventList<'a>) {
        let Some(in_events) = self.in_events else {
            return;
        };

        unsafe {
            let num_events = clap_call! { in_events=>size(in_events) };
            for event_idx in 0..num_events {
                let event: *const clap_event_header = clap_call! { in_events=>get(in_events, event_idx) };
                if event.is_null() {
                    hb_debug_assert_failure!("The host returned a null event at index {}", event_idx);
                    continue;
                }

                if let Some(event) = decode_event(&*event) {
                    events.push(event);
                }
            }
        }
    }

    fn write_output(&mut self, index: u32, value: f32) {
        let (Some(out), Some(&param_hash)) = (self.out_events, self.param_hashes.get(index as usize))
        else {
            return;
        };
        if self.output_values[index as usize] == value {
            return;
        }

        let event = clap_event_param_value {
            header: clap_event_header {
                size: mem::size_of::<clap_event_param_value>() as u32,
                time: 0,
                space_id: CLAP_CORE_EVENT_SPACE_ID,
                type_: CLAP_EVENT_PARAM_VALUE,
                flags: 0,
            },
            param_id: param_hash,
            cookie: ptr::null_mut(),
            note_id: -1,
            port_index: -1,
            channel: -1,
            key: -1,
            value: value as f64,
        };

        if unsafe { clap_call! { out=>try_push(out, &event.header) } } {
            self.output_values[index as usize] = value;
        }
    }

    fn write_latency(&mut self, latency: u32) {
        self.latency = Some(latency);
    }
}

/// Convert a CLAP note or MIDI event to a MIDI message. Parameter and transport events are
/// handled separately, and everything else is skipped.
unsafe fn decode_event(header: &clap_event_header) -> Option<MidiEvent<'_>> {
    if header.space_id != CLAP_CORE_EVENT_SPACE_ID {
        return None;
    }

    let frame = header.time;
    let to_7bit = |value: f64| (value * 127.0).round().clamp(0.0, 127.0) as u8;
    let event_ptr = header as *const clap_event_header;
    match header.type_ {
        CLAP_EVENT_NOTE_ON => {
            let event = &*(event_ptr as *const clap_event_note);
            let (channel, key) = midi_key(event.channel, event.key)?;

            // A velocity of zero would turn this into a note off
            MidiEvent::note_on(frame, channel, key, to_7bit(event.velocity).max(1))
        }
        CLAP_EVENT_NOTE_OFF => {
            let event = &*(event_ptr as *const clap_event_note);
            let (channel, key) = midi_key(event.channel, event.key)?;

            MidiEvent::note_off(frame, channel, key, to_7bit(event.velocity))
        }
        CLAP_EVENT_MIDI => {
            let event = &*(event_ptr as *const clap_event_midi);

            MidiEvent::from_channel_message(
                frame,
                event.data[0] & midi::EVENT_TYPE_MASK,
                event.data[0] & midi::MIDI_CHANNEL_MASK,
                event.data[1],
                event.data[2],
            )
        }
        CLAP_EVENT_MIDI_SYSEX => {
            let event = &*(event_ptr as *const clap_event_midi_sysex);
            if event.buffer.is_null() {
                return None;
            }

            MidiEvent::from_bytes(
                frame,
                std::slice::from_raw_parts(event.buffer, event.size as usize),
            )
        }
        _ => None,
    }
}

/// CLAP uses -1 as a wildcard for note events. Those can't be expressed as MIDI.
fn midi_key(channel: i16, key: i16) -> Option<(u8, u8)> {
    if (0..16).contains(&channel) && (0..128).contains(&key) {
        Some((channel as u8, key as u8))
    } else {
        None
    }
}

/// Convert the host's transport event to the plugin's transport information. Bar, beat, and tick
/// are only filled in when the host provides the musical position, the tempo, and the time
/// signature.
pub fn time_pos_from_transport(transport: &clap_event_transport, sample_rate: f64) -> TimePos {
    let mut time_pos = TimePos {
        playing: transport.flags & CLAP_TRANSPORT_IS_PLAYING != 0,
        ..TimePos::default()
    };

    if transport.flags & CLAP_TRANSPORT_HAS_SECONDS_TIMELINE != 0 {
        let seconds = transport.song_pos_seconds as f64 / CLAP_SECTIME_FACTOR as f64;
        time_pos.frame = (seconds * sample_rate).round().max(0.0) as u64;
    }
    if transport.flags & CLAP_TRANSPORT_HAS_TEMPO != 0 {
        time_pos.bpm = transport.tempo;
    }
    if transport.flags & WANTED_TRANSPORT_FLAGS == WANTED_TRANSPORT_FLAGS {
        time_pos.bbt = TimePosBbt::from_quarter_notes(
            transport.song_pos_beats as f64 / CLAP_BEATTIME_FACTOR as f64,
            transport.tsig_num as f32,
            transport.tsig_denom as f32,
        );
    }

    time_pos.validate_bbt();
    time_pos
}

/// The text shown for a parameter's value. CLAP does not have a separate unit field, so the unit
/// is included here.
fn format_value(parameter: &Parameter, value: f32) -> String {
    let value = if parameter
        .hints
        .intersects(ParameterHints::BOOLEAN | ParameterHints::INTEGER)
    {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    };

    if parameter.unit.is_empty() {
        value
    } else {
        format!("{} {}", value, parameter.unit)
    }
}

impl<P: ClapPlugin> Wrapper<P> {
    /// # Safety
    ///
    /// `host_callback` needs to outlive the returned object.
    pub unsafe fn new(host_callback: *const clap_host) -> Arc<Self> {
        let processor = BlockProcessor::<P>::new(
            PluginApi::Clap,
            PluginConfig::new(DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE),
        );
        let sync = processor.sync().clone();
        let info = processor.adapter().info().clone();
        let latency = processor.adapter().latency();

        let param_hashes: Vec<u32> = info
            .parameters
            .iter()
            .map(|parameter| hash_param_id(&parameter.symbol))
            .collect();
        let param_index_by_hash: HashMap<u32, u32> = param_hashes
            .iter()
            .enumerate()
            .map(|(index, &hash)| (hash, index as u32))
            .collect();
        hb_debug_assert_eq!(
            param_index_by_hash.len(),
            param_hashes.len(),
            "Parameter symbols must be unique"
        );

        let num_params = info.parameters.len();
        let plugin_descriptor: Box<PluginDescriptor> =
            Box::new(PluginDescriptor::for_plugin::<P>());

        let wrapper = Self {
            processor: Mutex::new(processor),
            scratch: AtomicRefCell::new(ProcessScratch {
                buffers: AudioBuffers::new(P::NUM_INPUTS, P::NUM_OUTPUTS, DEFAULT_BUFFER_SIZE),
                param_changes: vec![None; num_params].into(),
                output_values: vec![f32::NAN; num_params].into(),
            }),
            sync,
            info,

            param_hashes,
            param_index_by_hash,

            is_processing: AtomicBool::new(false),
            current_latency: AtomicU32::new(latency),
            latency_changed: AtomicBool::new(false),

            host_callback: ClapPtr::new(host_callback),

            clap_plugin: AtomicRefCell::new(clap_plugin {
                desc: plugin_descriptor.clap_plugin_descriptor(),
                // This pointer will be set to point at our wrapper instance later
                plugin_data: ptr::null_mut(),
                init: Some(Self::init),
                destroy: Some(Self::destroy),
                activate: Some(Self::activate),
                deactivate: Some(Self::deactivate),
                start_processing: Some(Self::start_processing),
                stop_processing: Some(Self::stop_processing),
                reset: Some(Self::reset),
                process: Some(Self::process),
                get_extension: Some(Self::get_extension),
                on_main_thread: Some(Self::on_main_thread),
            }),
            _plugin_descriptor: plugin_descriptor,

            clap_plugin_audio_ports: clap_plugin_audio_ports {
                count: Some(Self::ext_audio_ports_count),
                get: Some(Self::ext_audio_ports_get),
            },

            clap_plugin_latency: clap_plugin_latency {
                get: Some(Self::ext_latency_get),
            },
            host_latency: AtomicRefCell::new(None),

            clap_plugin_note_ports: clap_plugin_note_ports {
                count: Some(Self::ext_note_ports_count),
                get: Some(Self::ext_note_ports_get),
            },

            clap_plugin_params: clap_plugin_params {
                count: Some(Self::ext_params_count),
                get_info: Some(Self::ext_params_get_info),
                get_value: Some(Self::ext_params_get_value),
                value_to_text: Some(Self::ext_params_value_to_text),
                text_to_value: Some(Self::ext_params_text_to_value),
                flush: Some(Self::ext_params_flush),
            },
            host_params: AtomicRefCell::new(None),

            clap_plugin_state: clap_plugin_state {
                save: Some(Self::ext_state_save),
                load: Some(Self::ext_state_load),
            },
        };

        // The `clap_plugin::plugin_data` field needs to point to this wrapper so we can access it
        // from the vtable functions
        let wrapper = Arc::new(wrapper);
        wrapper.clap_plugin.borrow_mut().plugin_data = Arc::as_ptr(&wrapper) as *mut _;

        wrapper
    }

    fn has_note_input() -> bool {
        P::FEATURES.contains(PluginFeatures::IS_SYNTH)
    }

    fn param_index(&self, hash: clap_id) -> Option<u32> {
        self.param_index_by_hash.get(&hash).copied()
    }

    /// Called from the audio thread with the plugin's latency after every block. The host is
    /// asked to call `on_main_thread()` when it changed.
    fn update_latency(&self, latency: u32) {
        if self.current_latency.swap(latency, Ordering::Relaxed) != latency {
            self.latency_changed.store(true, Ordering::Release);
            unsafe_clap_call! { &*self.host_callback=>request_callback(&*self.host_callback) };
        }
    }

    /// Find the last value the host sent for every parameter in this event list. Values are
    /// written to `param_changes`, which should be reset by the caller.
    unsafe fn collect_param_changes(
        &self,
        in_events: &clap_input_events,
        param_changes: &mut [Option<f32>],
    ) {
        let num_events = clap_call! { in_events=>size(in_events) };
        for event_idx in 0..num_events {
            let event: *const clap_event_header = clap_call! { in_events=>get(in_events, event_idx) };
            if event.is_null()
                || (*event).space_id != CLAP_CORE_EVENT_SPACE_ID
                || (*event).type_ != CLAP_EVENT_PARAM_VALUE
            {
                continue;
            }

            let event = &*(event as *const clap_event_param_value);
            match self.param_index(event.param_id) {
                Some(index) => param_changes[index as usize] = Some(event.value as f32),
                None => hb_debug_assert_failure!(
                    "The host sent a value for unknown parameter {}",
                    event.param_id
                ),
            }
        }
    }

    /// Clear the host's outputs. Used when the plugin cannot be locked for this block.
    unsafe fn clear_outputs(process: &clap_process) {
        if process.audio_outputs_count == 0 || process.audio_outputs.is_null() {
            return;
        }

        let outputs = &*process.audio_outputs;
        if outputs.data32.is_null() {
            return;
        }

        for channel in 0..outputs.channel_count as usize {
            let channel = *outputs.data32.add(channel);
            if !channel.is_null() {
                ptr::write_bytes(channel as *mut f32, 0, process.frames_count as usize);
            }
        }
    }

    unsafe extern "C" fn init(plugin: *const clap_plugin) -> bool {
        check_null_ptr!(false, plugin, (*plugin).plugin_data);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        // We weren't allowed to query these in the constructor, so we need to do it now instead.
        *wrapper.host_latency.borrow_mut() =
            query_host_extension::<clap_host_latency>(&wrapper.host_callback, CLAP_EXT_LATENCY);
        *wrapper.host_params.borrow_mut() =
            query_host_extension::<clap_host_params>(&wrapper.host_callback, CLAP_EXT_PARAMS);

        true
    }

    unsafe extern "C" fn destroy(plugin: *const clap_plugin) {
        assert!(!plugin.is_null() && !(*plugin).plugin_data.is_null());
        let this = Arc::from_raw((*plugin).plugin_data as *mut Self);
        hb_debug_assert_eq!(Arc::strong_count(&this), 1);

        drop(this);
    }

    unsafe extern "C" fn activate(
        plugin: *const clap_plugin,
        sample_rate: f64,
        _min_frames_count: u32,
        max_frames_count: u32,
    ) -> bool {
        check_null_ptr!(false, plugin, (*plugin).plugin_data);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        let mut processor = wrapper.processor.lock();
        processor.request_sample_rate(sample_rate);
        processor.request_buffer_size(max_frames_count);
        processor.apply_pending_config();
        processor.adapter_mut().activate();

        // This preallocates enough space for hosts that pass null or aliased buffers
        wrapper.scratch.borrow_mut().buffers.resize(max_frames_count);

        true
    }

    unsafe extern "C" fn deactivate(plugin: *const clap_plugin) {
        check_null_ptr!((), plugin, (*plugin).plugin_data);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        wrapper.processor.lock().adapter_mut().deactivate();
    }

    unsafe extern "C" fn start_processing(plugin: *const clap_plugin) -> bool {
        // We just need to keep track of our processing state so the latency can be reported the
        // right way
        check_null_ptr!(false, plugin, (*plugin).plugin_data);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        wrapper.is_processing.store(true, Ordering::SeqCst);

        true
    }

    unsafe extern "C" fn stop_processing(plugin: *const clap_plugin) {
        check_null_ptr!((), plugin, (*plugin).plugin_data);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        wrapper.is_processing.store(false, Ordering::SeqCst);
    }

    unsafe extern "C" fn reset(_plugin: *const clap_plugin) {}

    unsafe extern "C" fn process(
        plugin: *const clap_plugin,
        process: *const clap_process,
    ) -> clap_process_status {
        check_null_ptr!(CLAP_PROCESS_ERROR, plugin, (*plugin).plugin_data, process);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        // Panic on allocations if the `assert_process_allocs` feature has been enabled, and make
        // sure that FTZ is set up correctly
        process_wrapper(|| {
            let process = &*process;

            let Some(mut processor) = wrapper.processor.try_lock() else {
                Self::clear_outputs(process);
                return CLAP_PROCESS_CONTINUE;
            };
            let Ok(mut scratch) = wrapper.scratch.try_borrow_mut() else {
                hb_debug_assert_failure!("Concurrent process calls");
                return CLAP_PROCESS_ERROR;
            };
            let ProcessScratch {
                buffers,
                param_changes,
                output_values,
            } = &mut *scratch;

            let in_events = process.in_events.as_ref();
            param_changes.fill(None);
            if let Some(in_events) = in_events {
                wrapper.collect_param_changes(in_events, param_changes);
            }

            let mut host = ClapBlock {
                in_events: if Self::has_note_input() { in_events } else { None },
                out_events: process.out_events.as_ref(),

                param_hashes: &wrapper.param_hashes,
                param_changes,
                output_values,
                latency: None,
            };

            let time_pos = match process.transport.as_ref() {
                Some(transport) => {
                    time_pos_from_transport(transport, processor.adapter().sample_rate())
                }
                None => TimePos::default(),
            };

            let (input_ptrs, num_inputs) =
                if process.audio_inputs_count > 0 && !process.audio_inputs.is_null() {
                    let port = &*process.audio_inputs;
                    (port.data32 as *const *const f32, port.channel_count as usize)
                } else {
                    (ptr::null(), 0)
                };
            let (output_ptrs, num_outputs) =
                if process.audio_outputs_count > 0 && !process.audio_outputs.is_null() {
                    let port = &*process.audio_outputs;
                    (port.data32 as *const *mut f32, port.channel_count as usize)
                } else {
                    (ptr::null(), 0)
                };

            let frames = process.frames_count;
            let (inputs, outputs) = buffers.slices_from_arrays(
                input_ptrs,
                num_inputs,
                output_ptrs,
                num_outputs,
                frames as usize,
            );
            processor.process(&mut host, inputs, outputs, frames, &time_pos);

            if let Some(latency) = host.latency {
                wrapper.update_latency(latency);
            }

            CLAP_PROCESS_CONTINUE
        })
    }

    unsafe extern "C" fn get_extension(
        plugin: *const clap_plugin,
        id: *const c_char,
    ) -> *const c_void {
        check_null_ptr!(ptr::null(), plugin, (*plugin).plugin_data, id);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        let id = CStr::from_ptr(id);

        if id == CLAP_EXT_AUDIO_PORTS {
            &wrapper.clap_plugin_audio_ports as *const _ as *const c_void
        } else if id == CLAP_EXT_LATENCY {
            &wrapper.clap_plugin_latency as *const _ as *const c_void
        } else if id == CLAP_EXT_NOTE_PORTS && Self::has_note_input() {
            &wrapper.clap_plugin_note_ports as *const _ as *const c_void
        } else if id == CLAP_EXT_PARAMS {
            &wrapper.clap_plugin_params as *const _ as *const c_void
        } else if id == CLAP_EXT_STATE {
            &wrapper.clap_plugin_state as *const _ as *const c_void
        } else {
            hb_trace!("Host tried to query unknown extension {:?}", id);
            ptr::null()
        }
    }

    unsafe extern "C" fn on_main_thread(plugin: *const clap_plugin) {
        check_null_ptr!((), plugin, (*plugin).plugin_data);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        if wrapper.latency_changed.swap(false, Ordering::Acquire) {
            // The host may only be told about latency changes while the plugin is deactivated
            if wrapper.is_processing.load(Ordering::SeqCst) {
                unsafe_clap_call! { &*wrapper.host_callback=>request_restart(&*wrapper.host_callback) };
            } else {
                match &*wrapper.host_latency.borrow() {
                    Some(host_latency) => {
                        unsafe_clap_call! { host_latency=>changed(&*wrapper.host_callback) }
                    }
                    None => hb_log!("The host does not support the latency extension"),
                }
            }
        }
    }

    unsafe extern "C" fn ext_audio_ports_count(_plugin: *const clap_plugin, is_input: bool) -> u32 {
        let channels = if is_input { P::NUM_INPUTS } else { P::NUM_OUTPUTS };

        (channels > 0) as u32
    }

    unsafe extern "C" fn ext_audio_ports_get(
        plugin: *const clap_plugin,
        index: u32,
        is_input: bool,
        info: *mut clap_audio_port_info,
    ) -> bool {
        check_null_ptr!(false, plugin, info);

        if index >= Self::ext_audio_ports_count(plugin, is_input) {
            hb_debug_assert_failure!(
                "Host tried to query information for out of bounds audio port {} (input: {})",
                index,
                is_input
            );

            return false;
        }

        let (channel_count, stable_id, pair_stable_id, name) = if is_input {
            let pair = if P::NUM_OUTPUTS > 0 { MAIN_OUTPUT_PORT_ID } else { CLAP_INVALID_ID };
            (P::NUM_INPUTS, MAIN_INPUT_PORT_ID, pair, "Input")
        } else {
            let pair = if P::NUM_INPUTS > 0 { MAIN_INPUT_PORT_ID } else { CLAP_INVALID_ID };
            (P::NUM_OUTPUTS, MAIN_OUTPUT_PORT_ID, pair, "Output")
        };

        let port_type = match channel_count {
            1 => CLAP_PORT_MONO.as_ptr(),
            2 => CLAP_PORT_STEREO.as_ptr(),
            _ => ptr::null(),
        };

        *info = mem::zeroed();

        let info = &mut *info;
        info.id = stable_id;
        strlcpy(&mut info.name, name);
        info.flags = CLAP_AUDIO_PORT_IS_MAIN;
        info.channel_count = channel_count;
        info.port_type = port_type;
        info.in_place_pair = pair_stable_id;

        true
    }

    unsafe extern "C" fn ext_latency_get(plugin: *const clap_plugin) -> u32 {
        check_null_ptr!(0, plugin, (*plugin).plugin_data);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        wrapper.current_latency.load(Ordering::SeqCst)
    }

    unsafe extern "C" fn ext_note_ports_count(_plugin: *const clap_plugin, is_input: bool) -> u32 {
        (is_input && Self::has_note_input()) as u32
    }

    unsafe extern "C" fn ext_note_ports_get(
        _plugin: *const clap_plugin,
        index: u32,
        is_input: bool,
        info: *mut clap_note_port_info,
    ) -> bool {
        check_null_ptr!(false, info);

        match (index, is_input) {
            (0, true) if Self::has_note_input() => {
                *info = mem::zeroed();

                let info = &mut *info;
                info.id = 0;
                // NOTE: REAPER won't send us SysEx if we don't support the MIDI dialect
                info.supported_dialects = CLAP_NOTE_DIALECT_CLAP | CLAP_NOTE_DIALECT_MIDI;
                info.preferred_dialect = CLAP_NOTE_DIALECT_CLAP;
                strlcpy(&mut info.name, "Note Input");

                true
            }
            _ => false,
        }
    }

    unsafe extern "C" fn ext_params_count(plugin: *const clap_plugin) -> u32 {
        check_null_ptr!(0, plugin, (*plugin).plugin_data);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        wrapper.param_hashes.len() as u32
    }

    unsafe extern "C" fn ext_params_get_info(
        plugin: *const clap_plugin,
        param_index: u32,
        param_info: *mut clap_param_info,
    ) -> bool {
        check_null_ptr!(false, plugin, (*plugin).plugin_data, param_info);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        let Some(parameter) = wrapper.info.parameters.get(param_index as usize) else {
            return false;
        };

        *param_info = mem::zeroed();

        // Values are exchanged as plain values, so the host can show the plugin's own ranges
        let param_info = &mut *param_info;
        param_info.id = wrapper.param_hashes[param_index as usize];
        param_info.flags = 0;
        if parameter.is_automatable() {
            param_info.flags |= CLAP_PARAM_IS_AUTOMATABLE;
        }
        if parameter.is_output() {
            param_info.flags |= CLAP_PARAM_IS_READONLY;
        }
        if parameter
            .hints
            .intersects(ParameterHints::BOOLEAN | ParameterHints::INTEGER)
        {
            param_info.flags |= CLAP_PARAM_IS_STEPPED;
        }
        param_info.cookie = ptr::null_mut();
        strlcpy(&mut param_info.name, &parameter.name);
        strlcpy(&mut param_info.module, "");
        param_info.min_value = parameter.ranges.min as f64;
        param_info.max_value = parameter.ranges.max as f64;
        param_info.default_value = parameter.ranges.def as f64;

        true
    }

    unsafe extern "C" fn ext_params_get_value(
        plugin: *const clap_plugin,
        param_id: clap_id,
        value: *mut f64,
    ) -> bool {
        check_null_ptr!(false, plugin, (*plugin).plugin_data, value);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        match wrapper.param_index(param_id) {
            Some(index) => {
                *value = wrapper.sync.published_value(index) as f64;

                true
            }
            None => false,
        }
    }

    unsafe extern "C" fn ext_params_value_to_text(
        plugin: *const clap_plugin,
        param_id: clap_id,
        value: f64,
        display: *mut c_char,
        size: u32,
    ) -> bool {
        check_null_ptr!(false, plugin, (*plugin).plugin_data, display);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        let dest = std::slice::from_raw_parts_mut(display, size as usize);

        match wrapper.param_index(param_id) {
            Some(index) => {
                let parameter = &wrapper.info.parameters[index as usize];
                strlcpy(dest, &format_value(parameter, value as f32));

                true
            }
            None => false,
        }
    }

    unsafe extern "C" fn ext_params_text_to_value(
        plugin: *const clap_plugin,
        param_id: clap_id,
        display: *const c_char,
        value: *mut f64,
    ) -> bool {
        check_null_ptr!(false, plugin, (*plugin).plugin_data, display, value);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        let display = match CStr::from_ptr(display).to_str() {
            Ok(s) => s,
            Err(_) => return false,
        };

        let Some(index) = wrapper.param_index(param_id) else {
            return false;
        };
        let parameter = &wrapper.info.parameters[index as usize];

        // The unit may or may not be included
        let number = display
            .trim()
            .trim_end_matches(parameter.unit.as_str())
            .trim();
        match number.parse::<f32>() {
            Ok(parsed) => {
                *value = parameter.ranges.fixed_value(parsed) as f64;

                true
            }
            Err(_) => false,
        }
    }

    unsafe extern "C" fn ext_params_flush(
        plugin: *const clap_plugin,
        in_: *const clap_input_events,
        out: *const clap_output_events,
    ) {
        check_null_ptr!((), plugin, (*plugin).plugin_data);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        // This may be called from the audio thread while the plugin is processing audio, or from
        // the main thread when it isn't
        let Some(mut processor) = wrapper.processor.try_lock() else {
            hb_debug_assert_failure!("Could not lock the plugin for a parameter flush");
            return;
        };
        let Ok(mut scratch) = wrapper.scratch.try_borrow_mut() else {
            hb_debug_assert_failure!("Parameter flush during a process call");
            return;
        };
        let ProcessScratch {
            buffers,
            param_changes,
            output_values,
        } = &mut *scratch;

        param_changes.fill(None);
        if let Some(in_) = in_.as_ref() {
            wrapper.collect_param_changes(in_, param_changes);
        }
        for (index, value) in param_changes.iter().enumerate() {
            if let Some(value) = value {
                processor.set_parameter_value(index as u32, *value);
            }
        }

        // A block without any audio only writes the output parameters back to the host
        let mut host = ClapBlock {
            in_events: None,
            out_events: out.as_ref(),

            param_hashes: &wrapper.param_hashes,
            param_changes: &[],
            output_values,
            latency: None,
        };
        let (inputs, outputs) =
            buffers.slices_from_arrays(ptr::null(), 0, ptr::null(), 0, 0);
        processor.process(&mut host, inputs, outputs, 0, &TimePos::default());
    }

    unsafe extern "C" fn ext_state_save(
        plugin: *const clap_plugin,
        stream: *const clap_ostream,
    ) -> bool {
        check_null_ptr!(false, plugin, (*plugin).plugin_data, stream);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        let serialized = state::serialize_json(&wrapper.info, &wrapper.sync, None);
        match serialized {
            Ok(serialized) => {
                if !write_state_chunk(&*stream, &serialized) {
                    hb_warn!("The host's stream did not accept the state");
                    return false;
                }

                hb_trace!("Saved state ({} bytes)", serialized.len());
                true
            }
            Err(err) => {
                hb_debug_assert_failure!("Could not save state: {:#}", err);
                false
            }
        }
    }

    unsafe extern "C" fn ext_state_load(
        plugin: *const clap_plugin,
        stream: *const clap_istream,
    ) -> bool {
        check_null_ptr!(false, plugin, (*plugin).plugin_data, stream);
        let wrapper = &*((*plugin).plugin_data as *const Self);

        let data = match read_state_chunk(&*stream) {
            Some(data) => data,
            None => {
                hb_warn!("The state stream ended early");
                return false;
            }
        };

        match state::deserialize_json(&mut *wrapper.processor.lock(), &data) {
            Ok(_) => {
                hb_trace!("Loaded state ({} bytes)", data.len());

                // All parameter values may have changed
                if let Some(host_params) = &*wrapper.host_params.borrow() {
                    unsafe_clap_call! {
                        host_params=>rescan(&*wrapper.host_callback, CLAP_PARAM_RESCAN_VALUES)
                    };
                }

                true
            }
            Err(err) => {
                hb_warn!("Could not load state: {:#}", err);
                false
            }
        }
    }
}

/// Convenience function to query an extension from the host.
///
/// # Safety
///
/// The extension type `T` must match the extension's name `name`.
unsafe fn query_host_extension<T>(
    host_callback: &ClapPtr<clap_host>,
    name: &CStr,
) -> Option<ClapPtr<T>> {
    let extension_ptr =
        clap_call! { host_callback=>get_extension(&**host_callback, name.as_ptr()) };
    if !extension_ptr.is_null() {
        Some(ClapPtr::new(extension_ptr as *const T))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use clap_sys::audio_buffer::clap_audio_buffer;
    use clap_sys::version::CLAP_VERSION;
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::test_plugin::{RecordingPlugin, GAIN, LATENCY, LEVEL, PANIC};

    unsafe extern "C" fn host_get_extension(
        _host: *const clap_host,
        _extension_id: *const c_char,
    ) -> *const c_void {
        ptr::null()
    }

    unsafe extern "C" fn host_request(_host: *const clap_host) {}

    /// A host without any extensions. This needs to outlive the plugin, so it's simply leaked.
    fn test_host() -> &'static clap_host {
        Box::leak(Box::new(clap_host {
            clap_version: CLAP_VERSION,
            host_data: ptr::null_mut(),
            name: b"Test Host\0".as_ptr() as *const c_char,
            vendor: b"hostbridge\0".as_ptr() as *const c_char,
            url: b"\0".as_ptr() as *const c_char,
            version: b"0.0.0\0".as_ptr() as *const c_char,
            get_extension: Some(host_get_extension),
            request_restart: Some(host_request),
            request_process: Some(host_request),
            request_callback: Some(host_request),
        }))
    }

    fn make_wrapper() -> (Arc<Wrapper<RecordingPlugin>>, *const clap_plugin) {
        let wrapper = unsafe { Wrapper::<RecordingPlugin>::new(test_host()) };
        let plugin = wrapper.clap_plugin.as_ptr() as *const clap_plugin;
        unsafe {
            assert!(Wrapper::<RecordingPlugin>::init(plugin));
        }

        (wrapper, plugin)
    }

    unsafe extern "C" fn input_events_size(list: *const clap_input_events) -> u32 {
        (*((*list).ctx as *const Vec<*const clap_event_header>)).len() as u32
    }

    unsafe extern "C" fn input_events_get(
        list: *const clap_input_events,
        index: u32,
    ) -> *const clap_event_header {
        (&(*((*list).ctx as *const Vec<*const clap_event_header>)))
            .get(index as usize)
            .copied()
            .unwrap_or(ptr::null())
    }

    fn input_events(events: &Vec<*const clap_event_header>) -> clap_input_events {
        clap_input_events {
            ctx: events as *const _ as *mut c_void,
            size: Some(input_events_size),
            get: Some(input_events_get),
        }
    }

    unsafe extern "C" fn output_events_try_push(
        list: *const clap_output_events,
        event: *const clap_event_header,
    ) -> bool {
        let values = &*((*list).ctx as *const RefCell<Vec<(clap_id, f64)>>);
        if (*event).type_ == CLAP_EVENT_PARAM_VALUE {
            let event = &*(event as *const clap_event_param_value);
            values.borrow_mut().push((event.param_id, event.value));
        }

        true
    }

    fn output_events(values: &RefCell<Vec<(clap_id, f64)>>) -> clap_output_events {
        clap_output_events {
            ctx: values as *const _ as *mut c_void,
            try_push: Some(output_events_try_push),
        }
    }

    fn param_value_event(param_id: clap_id, value: f64) -> clap_event_param_value {
        clap_event_param_value {
            header: clap_event_header {
                size: mem::size_of::<clap_event_param_value>() as u32,
                time: 0,
                space_id: CLAP_CORE_EVENT_SPACE_ID,
                type_: CLAP_EVENT_PARAM_VALUE,
                flags: 0,
            },
            param_id,
            cookie: ptr::null_mut(),
            note_id: -1,
            port_index: -1,
            channel: -1,
            key: -1,
            value,
        }
    }

    fn note_event(type_: u16, time: u32, channel: i16, key: i16, velocity: f64) -> clap_event_note {
        clap_event_note {
            header: clap_event_header {
                size: mem::size_of::<clap_event_note>() as u32,
                time,
                space_id: CLAP_CORE_EVENT_SPACE_ID,
                type_,
                flags: 0,
            },
            note_id: -1,
            port_index: 0,
            channel,
            key,
            velocity,
        }
    }

    unsafe extern "C" fn ostream_write(
        stream: *const clap_ostream,
        buffer: *const c_void,
        size: u64,
    ) -> i64 {
        let data = &*((*stream).ctx as *const RefCell<Vec<u8>>);
        data.borrow_mut()
            .extend_from_slice(std::slice::from_raw_parts(buffer as *const u8, size as usize));

        size as i64
    }

    struct ReadStream {
        data: Vec<u8>,
        pos: Cell<usize>,
    }

    /// Only hands out a few bytes at a time, like some hosts do.
    unsafe extern "C" fn istream_read(
        stream: *const clap_istream,
        buffer: *mut c_void,
        size: u64,
    ) -> i64 {
        let stream = &*((*stream).ctx as *const ReadStream);
        let pos = stream.pos.get();
        let len = (size as usize).min(16).min(stream.data.len() - pos);
        ptr::copy_nonoverlapping(stream.data.as_ptr().add(pos), buffer as *mut u8, len);
        stream.pos.set(pos + len);

        len as i64
    }

    #[test]
    fn parameter_info() {
        let (wrapper, plugin) = make_wrapper();

        unsafe {
            assert_eq!(Wrapper::<RecordingPlugin>::ext_params_count(plugin), 3);

            let mut info: clap_param_info = mem::zeroed();
            assert!(Wrapper::<RecordingPlugin>::ext_params_get_info(plugin, GAIN, &mut info));
            assert_eq!(info.id, hash_param_id("gain"));
            assert_eq!(info.flags, CLAP_PARAM_IS_AUTOMATABLE);
            assert_eq!(info.default_value, 0.5);
            assert_eq!(
                CStr::from_ptr(info.name.as_ptr()).to_str(),
                Ok("Gain")
            );

            assert!(Wrapper::<RecordingPlugin>::ext_params_get_info(plugin, PANIC, &mut info));
            assert_eq!(info.flags, CLAP_PARAM_IS_STEPPED);

            assert!(Wrapper::<RecordingPlugin>::ext_params_get_info(plugin, LEVEL, &mut info));
            assert_eq!(info.flags, CLAP_PARAM_IS_READONLY);

            assert!(!Wrapper::<RecordingPlugin>::ext_params_get_info(plugin, 3, &mut info));
        }

        drop(wrapper);
    }

    #[test]
    fn value_text_conversion() {
        let (_wrapper, plugin) = make_wrapper();
        let level_id = hash_param_id("level");

        unsafe {
            let mut display = [0 as c_char; 64];
            assert!(Wrapper::<RecordingPlugin>::ext_params_value_to_text(
                plugin,
                level_id,
                0.5,
                display.as_mut_ptr(),
                display.len() as u32
            ));
            assert_eq!(
                CStr::from_ptr(display.as_ptr()).to_str(),
                Ok("0.50 dB")
            );

            let mut value = 0.0;
            assert!(Wrapper::<RecordingPlugin>::ext_params_text_to_value(
                plugin,
                level_id,
                b"0.75 dB\0".as_ptr() as *const c_char,
                &mut value
            ));
            assert_eq!(value, 0.75);
            assert!(!Wrapper::<RecordingPlugin>::ext_params_text_to_value(
                plugin,
                level_id,
                b"loud\0".as_ptr() as *const c_char,
                &mut value
            ));
            assert!(!Wrapper::<RecordingPlugin>::ext_params_get_value(plugin, 1234, &mut value));
        }
    }

    #[test]
    fn process_applies_parameters_and_reports_outputs() {
        let (wrapper, plugin) = make_wrapper();

        unsafe {
            assert!(Wrapper::<RecordingPlugin>::activate(plugin, 48000.0, 1, 64));
            assert!(Wrapper::<RecordingPlugin>::start_processing(plugin));

            let gain_event = param_value_event(hash_param_id("gain"), 0.25);
            let events = vec![&gain_event.header as *const clap_event_header];
            let in_events = input_events(&events);
            let output_values = RefCell::new(Vec::new());
            let out_events = output_events(&output_values);

            let mut input = [vec![1.0f32; 32], vec![-1.0f32; 32]];
            let mut output = [vec![0.0f32; 32], vec![0.0f32; 32]];
            let mut input_ptrs = [input[0].as_mut_ptr(), input[1].as_mut_ptr()];
            let mut output_ptrs = [output[0].as_mut_ptr(), output[1].as_mut_ptr()];
            let audio_input = clap_audio_buffer {
                data32: input_ptrs.as_mut_ptr() as *const *const f32,
                data64: ptr::null_mut(),
                channel_count: 2,
                latency: 0,
                constant_mask: 0,
            };
            let mut audio_output = clap_audio_buffer {
                data32: output_ptrs.as_mut_ptr() as *const *const f32,
                data64: ptr::null_mut(),
                channel_count: 2,
                latency: 0,
                constant_mask: 0,
            };

            let process = clap_process {
                steady_time: -1,
                frames_count: 32,
                transport: ptr::null(),
                audio_inputs: &audio_input,
                audio_outputs: &mut audio_output,
                audio_inputs_count: 1,
                audio_outputs_count: 1,
                in_events: &in_events,
                out_events: &out_events,
            };
            assert_eq!(
                Wrapper::<RecordingPlugin>::process(plugin, &process),
                CLAP_PROCESS_CONTINUE
            );

            assert!(output[0].iter().all(|&sample| sample == 0.25));
            assert!(output[1].iter().all(|&sample| sample == -0.25));
            assert_eq!(
                *output_values.borrow(),
                vec![(hash_param_id("level"), 0.25)]
            );

            let mut value = 0.0;
            assert!(Wrapper::<RecordingPlugin>::ext_params_get_value(
                plugin,
                hash_param_id("gain"),
                &mut value
            ));
            assert_eq!(value, 0.25);

            // The new latency is picked up on the main thread
            assert!(wrapper.latency_changed.load(Ordering::Relaxed));
            assert_eq!(Wrapper::<RecordingPlugin>::ext_latency_get(plugin), LATENCY);
            Wrapper::<RecordingPlugin>::stop_processing(plugin);
            Wrapper::<RecordingPlugin>::on_main_thread(plugin);
            assert!(!wrapper.latency_changed.load(Ordering::Relaxed));
        }
    }

    #[test]
    fn flush_without_processing() {
        let (wrapper, plugin) = make_wrapper();

        let gain_event = param_value_event(hash_param_id("gain"), 0.75);
        let events = vec![&gain_event.header as *const clap_event_header];
        let in_events = input_events(&events);
        let output_values = RefCell::new(Vec::new());
        let out_events = output_events(&output_values);

        unsafe {
            Wrapper::<RecordingPlugin>::ext_params_flush(plugin, &in_events, &out_events);
        }

        assert_eq!(wrapper.sync.published_value(GAIN), 0.75);
        assert_eq!(*output_values.borrow(), vec![(hash_param_id("level"), 0.0)]);
        assert!(wrapper.processor.lock().adapter().plugin().calls.is_empty());
    }

    #[test]
    fn state_roundtrip() {
        let (wrapper, plugin) = make_wrapper();
        wrapper.processor.lock().set_parameter_value(GAIN, 0.125);
        wrapper.processor.lock().set_state("file", "/tmp/a.wav");

        let saved = RefCell::new(Vec::new());
        let ostream = clap_ostream {
            ctx: &saved as *const _ as *mut c_void,
            write: Some(ostream_write),
        };
        unsafe {
            assert!(Wrapper::<RecordingPlugin>::ext_state_save(plugin, &ostream));
        }

        let (other, other_plugin) = make_wrapper();
        let read_stream = ReadStream {
            data: saved.into_inner(),
            pos: Cell::new(0),
        };
        let istream = clap_istream {
            ctx: &read_stream as *const _ as *mut c_void,
            read: Some(istream_read),
        };
        unsafe {
            assert!(Wrapper::<RecordingPlugin>::ext_state_load(other_plugin, &istream));
        }

        assert_eq!(other.sync.published_value(GAIN), 0.125);
        assert_eq!(
            other.processor.lock().adapter().state_value(0),
            "/tmp/a.wav"
        );
    }

    #[test]
    fn state_save_while_processing() {
        let (wrapper, plugin) = make_wrapper();
        wrapper.sync.request_parameter_value(GAIN, 0.25);
        wrapper.sync.request_state("file", "/tmp/b.wav");

        // The audio thread holds the plugin for the duration of a block
        let processor = wrapper.processor.lock();
        let saved = RefCell::new(Vec::new());
        let ostream = clap_ostream {
            ctx: &saved as *const _ as *mut c_void,
            write: Some(ostream_write),
        };
        unsafe {
            assert!(Wrapper::<RecordingPlugin>::ext_state_save(plugin, &ostream));
        }
        drop(processor);

        let saved = saved.into_inner();
        let state: state::PluginState = serde_json::from_slice(&saved[8..]).unwrap();
        assert_eq!(state.parameters["gain"], 0.25);
        assert_eq!(state.state["file"], "/tmp/b.wav");
    }

    #[test]
    fn truncated_state() {
        let (wrapper, plugin) = make_wrapper();

        let mut data = 100u64.to_le_bytes().to_vec();
        data.extend_from_slice(b"{\"parameters\":");
        let read_stream = ReadStream {
            data,
            pos: Cell::new(0),
        };
        let istream = clap_istream {
            ctx: &read_stream as *const _ as *mut c_void,
            read: Some(istream_read),
        };
        unsafe {
            assert!(!Wrapper::<RecordingPlugin>::ext_state_load(plugin, &istream));
        }

        assert_eq!(wrapper.sync.published_value(GAIN), 0.5);
    }

    #[test]
    fn note_and_midi_events() {
        let note_on = note_event(CLAP_EVENT_NOTE_ON, 3, 1, 60, 1.0);
        let event = unsafe { decode_event(&note_on.header) }.unwrap();
        assert_eq!(event.frame, 3);
        assert_eq!(event.as_bytes(), &[0x91, 60, 127]);

        // Zero velocity note ons are still note ons
        let quiet = note_event(CLAP_EVENT_NOTE_ON, 0, 0, 60, 0.0);
        assert_eq!(unsafe { decode_event(&quiet.header) }.unwrap().as_bytes(), &[0x90, 60, 1]);

        let note_off = note_event(CLAP_EVENT_NOTE_OFF, 0, 0, 61, 0.5);
        assert_eq!(unsafe { decode_event(&note_off.header) }.unwrap().as_bytes(), &[0x80, 61, 64]);

        let wildcard = note_event(CLAP_EVENT_NOTE_OFF, 0, -1, 61, 0.5);
        assert!(unsafe { decode_event(&wildcard.header) }.is_none());

        let program_change = clap_event_midi {
            header: clap_event_header {
                size: mem::size_of::<clap_event_midi>() as u32,
                time: 7,
                space_id: CLAP_CORE_EVENT_SPACE_ID,
                type_: CLAP_EVENT_MIDI,
                flags: 0,
            },
            port_index: 0,
            data: [0xc2, 5, 0],
        };
        let event = unsafe { decode_event(&program_change.header) }.unwrap();
        assert_eq!(event.as_bytes(), &[0xc2, 5]);

        let sysex_data = [0xf0u8, 0x7e, 0x7f, 0x06, 0x01, 0xf7];
        let sysex = clap_event_midi_sysex {
            header: clap_event_header {
                size: mem::size_of::<clap_event_midi_sysex>() as u32,
                time: 1,
                space_id: CLAP_CORE_EVENT_SPACE_ID,
                type_: CLAP_EVENT_MIDI_SYSEX,
                flags: 0,
            },
            port_index: 0,
            buffer: sysex_data.as_ptr(),
            size: sysex_data.len() as u32,
        };
        let event = unsafe { decode_event(&sysex.header) }.unwrap();
        assert_eq!(event.as_bytes(), &sysex_data);
    }

    #[test]
    fn transport_conversion() {
        let mut transport: clap_event_transport = unsafe { mem::zeroed() };
        transport.flags = CLAP_TRANSPORT_IS_PLAYING
            | CLAP_TRANSPORT_HAS_SECONDS_TIMELINE
            | WANTED_TRANSPORT_FLAGS;
        transport.song_pos_seconds = 2 * CLAP_SECTIME_FACTOR;
        transport.song_pos_beats = 13 * CLAP_BEATTIME_FACTOR / 2;
        transport.tempo = 140.0;
        transport.tsig_num = 4;
        transport.tsig_denom = 4;

        let time_pos = time_pos_from_transport(&transport, 44100.0);
        assert!(time_pos.playing);
        assert_eq!(time_pos.frame, 88200);
        assert_eq!(time_pos.bpm, 140.0);
        assert!(time_pos.bbt.valid);
        assert_eq!(time_pos.bbt.bar, 2);
        assert_eq!(time_pos.bbt.beat, 3);

        transport.flags = CLAP_TRANSPORT_HAS_TEMPO;
        let time_pos = time_pos_from_transport(&transport, 44100.0);
        assert!(!time_pos.playing);
        assert_eq!(time_pos.frame, 0);
        assert!(!time_pos.bbt.valid);
    }
}
