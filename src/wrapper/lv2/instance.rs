//! A single LV2 plugin instance, the core callbacks, and the state and programs extensions.

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::os::raw::{c_char, c_void};
use std::ptr;

use super::atom::{object_properties, sequence_body, sequence_events, NumberTypes};
use super::position::{Lv2Position, PositionKeys};
use super::sys::*;
use crate::context::PluginApi;
use crate::midi::{MidiEvent, MidiEventList};
use crate::plugin::{Lv2Plugin, PluginConfig, PluginFeatures};
use crate::program::real_program;
use crate::util::permit_alloc;
use crate::wrapper::block::{AudioBuffers, BlockProcessor, HostBlock, PortKind, PortLayout};
use crate::wrapper::util::{process_wrapper, DEFAULT_BUFFER_SIZE};

/// Every URID the instance needs, mapped once during instantiation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Urids {
    pub atom_blank: u32,
    pub atom_object: u32,
    pub atom_sequence: u32,
    pub atom_string: u32,
    pub numbers: NumberTypes,
    pub midi_event: u32,
    pub time_position: u32,
    pub position_keys: PositionKeys,
    pub max_block_length: u32,
    pub nominal_block_length: u32,
}

impl Urids {
    /// Map all URIs through the host's `urid:map` feature. Returns `None` if the feature is
    /// missing its callback.
    pub unsafe fn new(map: &LV2_URID_Map) -> Option<Self> {
        let map_fn = map.map?;
        let map_uri = |uri: &[u8]| map_fn(map.handle, uri.as_ptr() as *const c_char);

        Some(Self {
            atom_blank: map_uri(LV2_ATOM__Blank),
            atom_object: map_uri(LV2_ATOM__Object),
            atom_sequence: map_uri(LV2_ATOM__Sequence),
            atom_string: map_uri(LV2_ATOM__String),
            numbers: NumberTypes {
                int: map_uri(LV2_ATOM__Int),
                long: map_uri(LV2_ATOM__Long),
                float: map_uri(LV2_ATOM__Float),
                double: map_uri(LV2_ATOM__Double),
            },
            midi_event: map_uri(LV2_MIDI__MidiEvent),
            time_position: map_uri(LV2_TIME__Position),
            position_keys: PositionKeys {
                bar: map_uri(LV2_TIME__bar),
                bar_beat: map_uri(LV2_TIME__barBeat),
                beat_unit: map_uri(LV2_TIME__beatUnit),
                beats_per_bar: map_uri(LV2_TIME__beatsPerBar),
                beats_per_minute: map_uri(LV2_TIME__beatsPerMinute),
                frame: map_uri(LV2_TIME__frame),
                speed: map_uri(LV2_TIME__speed),
            },
            max_block_length: map_uri(LV2_BUF_SIZE__maxBlockLength),
            nominal_block_length: map_uri(LV2_BUF_SIZE__nominalBlockLength),
        })
    }
}

/// Find a host feature by URI. `uri` must include the NUL terminator.
unsafe fn find_feature(features: *const *const LV2_Feature, uri: &[u8]) -> Option<*mut c_void> {
    if features.is_null() {
        return None;
    }

    let mut current = features;
    while !(*current).is_null() {
        let feature = &**current;
        if !feature.URI.is_null() && CStr::from_ptr(feature.URI).to_bytes_with_nul() == uri {
            return Some(feature.data);
        }

        current = current.add(1);
    }

    None
}

/// Read the host's maximum block size from the options feature, if it provides one. The nominal
/// block size is used as a fallback.
unsafe fn block_length_option(options: *const LV2_Options_Option, urids: &Urids) -> Option<u32> {
    let mut nominal = None;
    let mut current = options;
    while !((*current).key == 0 && (*current).value.is_null()) {
        let option = &*current;
        if option.type_ == urids.numbers.int && !option.value.is_null() {
            let value = *(option.value as *const i32);
            if value > 0 {
                if option.key == urids.max_block_length {
                    return Some(value as u32);
                } else if option.key == urids.nominal_block_length {
                    nominal = Some(value as u32);
                }
            }
        }

        current = current.add(1);
    }

    nominal
}

pub struct Instance<P: Lv2Plugin> {
    pub(crate) processor: BlockProcessor<P>,
    layout: PortLayout,
    urids: Urids,
    /// The URIDs of `<plugin URI>#<key>` for every state entry.
    state_keys: Vec<u32>,

    audio_inputs: Vec<*const f32>,
    audio_outputs: Vec<*mut f32>,
    controls: Vec<*mut f32>,
    latency_port: *mut f32,
    events_in: *const LV2_Atom_Sequence,
    events_out: *mut LV2_Atom_Sequence,
    buffers: AudioBuffers,

    position: Lv2Position,

    /// Backs the pointer returned from `get_program()`. It stays valid until the next call.
    program_name: CString,
    program_descriptor: LV2_Program_Descriptor,
}

/// The host side of an LV2 block. Control values come from the ports and MIDI from the atom
/// sequence.
struct AtomBlock<'a> {
    controls: &'a [*mut f32],
    latency_port: *mut f32,
    events: &'a [u8],
    midi_event: u32,
}

impl<'a> HostBlock<'a> for AtomBlock<'a> {
    fn control_value(&self, index: u32) -> Option<f32> {
        match self.controls.get(index as usize) {
            Some(port) if !port.is_null() => Some(unsafe { **port }),
            _ => None,
        }
    }

    fn decode_events(&mut self, events: &mut MidiEventList<'a>) {
        for (frames, atom) in sequence_events(self.events) {
            if atom.type_ != self.midi_event {
                continue;
            }

            if let Some(event) = MidiEvent::from_bytes(frames.max(0) as u32, atom.body) {
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

impl<P: Lv2Plugin> Instance<P> {
    pub fn new(urids: Urids, buffer_size: u32, sample_rate: f64) -> Self {
        let layout = PortLayout::lv2::<P>();

        Self {
            processor: BlockProcessor::new(
                PluginApi::Lv2,
                PluginConfig::new(buffer_size, sample_rate),
            ),
            layout,
            urids,
            state_keys: Vec::new(),

            audio_inputs: vec![ptr::null(); layout.audio_inputs as usize],
            audio_outputs: vec![ptr::null_mut(); layout.audio_outputs as usize],
            controls: vec![ptr::null_mut(); layout.parameters as usize],
            latency_port: ptr::null_mut(),
            events_in: ptr::null(),
            events_out: ptr::null_mut(),
            buffers: AudioBuffers::new(layout.audio_inputs, layout.audio_outputs, buffer_size),

            position: Lv2Position::default(),

            program_name: CString::default(),
            program_descriptor: LV2_Program_Descriptor {
                bank: 0,
                program: 0,
                name: ptr::null(),
            },
        }
    }

    pub fn connect_port(&mut self, port: u32, data: *mut c_void) {
        match self.layout.kind(port) {
            Some(PortKind::AudioInput(channel)) => {
                self.audio_inputs[channel as usize] = data as *const f32
            }
            Some(PortKind::AudioOutput(channel)) => {
                self.audio_outputs[channel as usize] = data as *mut f32
            }
            Some(PortKind::EventInput) => self.events_in = data as *const LV2_Atom_Sequence,
            Some(PortKind::EventOutput) => self.events_out = data as *mut LV2_Atom_Sequence,
            Some(PortKind::Latency) => self.latency_port = data as *mut f32,
            Some(PortKind::Parameter(index)) => self.controls[index as usize] = data as *mut f32,
            Some(PortKind::SampleRate) | None => {
                hb_debug_assert_failure!("Unknown port index {}", port)
            }
        }
    }

    /// Write the cached parameter values back to the input control ports after loading a program.
    fn write_controls(&mut self) {
        for (index, port) in self.controls.iter().enumerate() {
            let index = index as u32;
            if !port.is_null() && !self.processor.adapter().is_parameter_output(index) {
                unsafe { **port = self.processor.host_value(index) };
            }
        }
    }

    pub fn run(&mut self, frames: u32) {
        if frames > self.processor.adapter().buffer_size() {
            // This reallocates on the audio thread, which should show up while debugging
            hb_debug_assert_failure!(
                "The host sent a block of {} samples, growing the buffers to match",
                frames
            );
            self.processor.request_buffer_size(frames);
            permit_alloc(|| self.buffers.resize(frames));
        }

        let events: &[u8] = if self.events_in.is_null() {
            &[]
        } else {
            unsafe { sequence_body(self.events_in) }
        };

        // Position updates apply to the entire block
        for (_, atom) in sequence_events(events) {
            if atom.type_ != self.urids.atom_object && atom.type_ != self.urids.atom_blank {
                continue;
            }

            if let Some((otype, properties)) = object_properties(atom.body) {
                if otype == self.urids.time_position {
                    for (key, value) in properties {
                        self.position.apply(
                            key,
                            value,
                            &self.urids.position_keys,
                            &self.urids.numbers,
                        );
                    }
                }
            }
        }
        let time_pos = self.position.time_pos();

        let Self {
            processor,
            urids,
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
            let mut host = AtomBlock {
                controls,
                latency_port: *latency_port,
                events,
                midi_event: urids.midi_event,
            };

            processor.process(&mut host, inputs, outputs, frames, &time_pos);
        });

        self.position
            .advance(frames, self.processor.adapter().sample_rate());

        // Nothing is sent to the host, but the output sequence still needs a valid empty header
        if !self.events_out.is_null() {
            unsafe {
                (*self.events_out).atom.size =
                    std::mem::size_of::<LV2_Atom_Sequence_Body>() as u32;
                (*self.events_out).atom.type_ = self.urids.atom_sequence;
                (*self.events_out).body.unit = 0;
                (*self.events_out).body.pad = 0;
            }
        }
    }
}

pub unsafe extern "C" fn instantiate<P: Lv2Plugin>(
    _descriptor: *const LV2_Descriptor,
    sample_rate: f64,
    _bundle_path: *const c_char,
    features: *const *const LV2_Feature,
) -> LV2_Handle {
    if sample_rate <= 0.0 {
        hb_error!(
            "The host tried to instantiate the plugin with a sample rate of {}",
            sample_rate
        );
        return ptr::null_mut();
    }

    let map = match find_feature(features, LV2_URID__map) {
        Some(map) if !map.is_null() => &*(map as *const LV2_URID_Map),
        _ => {
            hb_error!("The host does not provide the required 'urid:map' feature");
            return ptr::null_mut();
        }
    };
    let Some(urids) = Urids::new(map) else {
        hb_error!("The host's 'urid:map' feature does not contain a map function");
        return ptr::null_mut();
    };

    let buffer_size = match find_feature(features, LV2_OPTIONS__options) {
        Some(options) if !options.is_null() => {
            block_length_option(options as *const LV2_Options_Option, &urids)
        }
        _ => None,
    }
    .unwrap_or(DEFAULT_BUFFER_SIZE);

    let mut instance = Instance::<P>::new(urids, buffer_size, sample_rate);

    // State keys are namespaced with the plugin's URI so they can't clash with other plugins'
    let adapter = instance.processor.adapter();
    let mut state_keys = Vec::with_capacity(adapter.state_count() as usize);
    for index in 0..adapter.state_count() {
        let key = format!("{}#{}", P::LV2_URI, adapter.state_key(index));
        let key = CString::new(key).unwrap_or_default();
        state_keys.push(map.map.map_or(0, |map_fn| map_fn(map.handle, key.as_ptr())));
    }
    instance.state_keys = state_keys;

    Box::into_raw(Box::new(instance)) as LV2_Handle
}

pub unsafe extern "C" fn connect_port<P: Lv2Plugin>(
    instance: LV2_Handle,
    port: u32,
    data: *mut c_void,
) {
    check_null_ptr!((), instance);

    (*(instance as *mut Instance<P>)).connect_port(port, data);
}

pub unsafe extern "C" fn activate<P: Lv2Plugin>(instance: LV2_Handle) {
    check_null_ptr!((), instance);

    let instance = &mut *(instance as *mut Instance<P>);
    instance.processor.apply_pending_config();
    instance.processor.adapter_mut().activate();
}

pub unsafe extern "C" fn run<P: Lv2Plugin>(instance: LV2_Handle, sample_count: u32) {
    check_null_ptr!((), instance);

    (*(instance as *mut Instance<P>)).run(sample_count);
}

pub unsafe extern "C" fn deactivate<P: Lv2Plugin>(instance: LV2_Handle) {
    check_null_ptr!((), instance);

    (*(instance as *mut Instance<P>)).processor.adapter_mut().deactivate();
}

pub unsafe extern "C" fn cleanup<P: Lv2Plugin>(instance: LV2_Handle) {
    check_null_ptr!((), instance);

    drop(Box::from_raw(instance as *mut Instance<P>));
}

/// The extension interfaces, as constants so they can be handed out as `'static` references.
struct Extensions<P>(PhantomData<P>);

impl<P: Lv2Plugin> Extensions<P> {
    const STATE: LV2_State_Interface = LV2_State_Interface {
        save: Some(state_save::<P>),
        restore: Some(state_restore::<P>),
    };

    const PROGRAMS: LV2_Programs_Interface = LV2_Programs_Interface {
        get_program: Some(get_program::<P>),
        select_program: Some(select_program::<P>),
    };
}

pub unsafe extern "C" fn extension_data<P: Lv2Plugin>(uri: *const c_char) -> *const c_void {
    check_null_ptr!(ptr::null(), uri);

    let uri = CStr::from_ptr(uri).to_bytes_with_nul();
    if uri == LV2_STATE__interface && P::FEATURES.contains(PluginFeatures::WANT_STATE) {
        let interface: &'static LV2_State_Interface = &Extensions::<P>::STATE;
        interface as *const _ as *const c_void
    } else if uri == LV2_PROGRAMS__Interface && P::FEATURES.contains(PluginFeatures::WANT_PROGRAMS)
    {
        let interface: &'static LV2_Programs_Interface = &Extensions::<P>::PROGRAMS;
        interface as *const _ as *const c_void
    } else {
        ptr::null()
    }
}

unsafe extern "C" fn state_save<P: Lv2Plugin>(
    instance: LV2_Handle,
    store: LV2_State_Store_Function,
    handle: LV2_State_Handle,
    _flags: u32,
    _features: *const *const LV2_Feature,
) -> LV2_State_Status {
    check_null_ptr!(LV2_STATE_ERR_UNKNOWN, instance);
    let Some(store) = store else {
        return LV2_STATE_ERR_UNKNOWN;
    };

    let instance = &*(instance as *const Instance<P>);
    let adapter = instance.processor.adapter();
    for (index, key) in instance.state_keys.iter().enumerate() {
        // Stored as a NUL-terminated string atom, like any other LV2 string
        let Ok(value) = CString::new(adapter.state_value(index as u32)) else {
            hb_warn!(
                "Not saving state '{}', its value contains a null byte",
                adapter.state_key(index as u32)
            );
            continue;
        };

        store(
            handle,
            *key,
            value.as_ptr() as *const c_void,
            value.as_bytes_with_nul().len(),
            instance.urids.atom_string,
            LV2_STATE_IS_POD | LV2_STATE_IS_PORTABLE,
        );
    }

    LV2_STATE_SUCCESS
}

unsafe extern "C" fn state_restore<P: Lv2Plugin>(
    instance: LV2_Handle,
    retrieve: LV2_State_Retrieve_Function,
    handle: LV2_State_Handle,
    _flags: u32,
    _features: *const *const LV2_Feature,
) -> LV2_State_Status {
    check_null_ptr!(LV2_STATE_ERR_UNKNOWN, instance);
    let Some(retrieve) = retrieve else {
        return LV2_STATE_ERR_UNKNOWN;
    };

    let instance = &mut *(instance as *mut Instance<P>);
    for index in 0..instance.state_keys.len() {
        let mut size = 0;
        let mut type_ = 0;
        let mut flags = 0;
        let data = retrieve(
            handle,
            instance.state_keys[index],
            &mut size,
            &mut type_,
            &mut flags,
        );
        // Missing keys keep their current value
        if data.is_null() || type_ != instance.urids.atom_string {
            continue;
        }

        let bytes = std::slice::from_raw_parts(data as *const u8, size);
        let bytes = bytes.strip_suffix(b"\0").unwrap_or(bytes);
        let key = instance.processor.adapter().state_key(index as u32).to_owned();
        match std::str::from_utf8(bytes) {
            Ok(value) => {
                instance.processor.set_state(&key, value);
            }
            Err(_) => hb_warn!("Ignoring non-UTF-8 state for '{}'", key),
        }
    }

    LV2_STATE_SUCCESS
}

unsafe extern "C" fn get_program<P: Lv2Plugin>(
    instance: LV2_Handle,
    index: u32,
) -> *const LV2_Program_Descriptor {
    check_null_ptr!(ptr::null(), instance);

    let instance = &mut *(instance as *mut Instance<P>);
    let adapter = instance.processor.adapter();
    if index >= adapter.program_count() {
        return ptr::null();
    }

    let (bank, program) = crate::program::bank_and_program(index);
    instance.program_name = CString::new(adapter.program_name(index)).unwrap_or_default();
    instance.program_descriptor = LV2_Program_Descriptor {
        bank,
        program,
        name: instance.program_name.as_ptr(),
    };

    &instance.program_descriptor
}

unsafe extern "C" fn select_program<P: Lv2Plugin>(instance: LV2_Handle, bank: u32, program: u32) {
    check_null_ptr!((), instance);

    let instance = &mut *(instance as *mut Instance<P>);
    let Some(index) = real_program(bank, program, instance.processor.adapter().program_count())
    else {
        return;
    };

    if instance.processor.load_program(index) {
        instance.write_controls();
    }
}
