use atomic_float::AtomicF32;
use atomic_refcell::AtomicRefCell;
use crossbeam::atomic::AtomicCell;
use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::ffi::c_void;
use std::os::raw::c_char;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use super::sys::*;
use crate::context::PluginApi;
use crate::midi::{MidiEvent, MidiEventList, MAX_MIDI_EVENTS};
use crate::param::{Parameter, ParameterHints};
use crate::plugin::{Plugin, PluginConfig, PluginFeatures};
use crate::sync::ParamSync;
use crate::transport::{TimePos, TimePosBbt};
use crate::wrapper::adapter::PluginInfo;
use crate::wrapper::block::{AudioBuffers, BlockProcessor, HostBlock};
use crate::wrapper::state;
use crate::wrapper::util::{process_wrapper, strlcpy, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE};

/// The largest MIDI message, SysEx included, that can be queued for the next render call.
pub const MAX_QUEUED_MIDI_SIZE: usize = 256;

/// Sentinel for [`Wrapper::current_program`] when no program has been loaded yet.
const NO_PROGRAM: u32 = u32::MAX;

/// The version of [`AuInterface`]. Bumped whenever its layout changes.
pub const AU_INTERFACE_VERSION: u32 = 1;

/// The functions the native AudioUnit component calls into. Every function except `create` takes
/// the handle returned from `create` as its first argument.
#[repr(C)]
pub struct AuInterface {
    pub version: u32,

    pub create: unsafe extern "C" fn() -> *mut c_void,
    pub destroy: unsafe extern "C" fn(*mut c_void),
    pub initialize: unsafe extern "C" fn(*mut c_void, f64, u32) -> OSStatus,
    pub uninitialize: unsafe extern "C" fn(*mut c_void),
    pub set_host_callbacks: unsafe extern "C" fn(*mut c_void, *const HostCallbackInfo),

    pub render: unsafe extern "C" fn(
        *mut c_void,
        *mut AudioUnitRenderActionFlags,
        *const AudioTimeStamp,
        u32,
        *const AudioBufferList,
        *mut AudioBufferList,
    ) -> OSStatus,
    /// `MusicDeviceMIDIEvent()`: status, data 1, data 2, sample offset.
    pub midi_event: unsafe extern "C" fn(*mut c_void, u32, u32, u32, u32) -> OSStatus,
    /// `MusicDeviceSysEx()`.
    pub sysex: unsafe extern "C" fn(*mut c_void, *const u8, u32) -> OSStatus,

    pub parameter_count: unsafe extern "C" fn(*mut c_void) -> u32,
    pub parameter_info:
        unsafe extern "C" fn(*mut c_void, AudioUnitParameterID, *mut AuParameterInfo) -> OSStatus,
    pub get_parameter: unsafe extern "C" fn(*mut c_void, AudioUnitParameterID, *mut f32) -> OSStatus,
    pub set_parameter: unsafe extern "C" fn(*mut c_void, AudioUnitParameterID, f32) -> OSStatus,

    pub program_count: unsafe extern "C" fn(*mut c_void) -> u32,
    pub program_name: unsafe extern "C" fn(*mut c_void, u32, *mut c_char, u32) -> OSStatus,
    pub set_program: unsafe extern "C" fn(*mut c_void, u32) -> OSStatus,
    /// The last loaded program, or -1.
    pub current_program: unsafe extern "C" fn(*mut c_void) -> i32,

    /// Serialize the plugin's state and return its size in bytes. The data can then be fetched
    /// with `get_state`.
    pub state_size: unsafe extern "C" fn(*mut c_void) -> u32,
    pub get_state: unsafe extern "C" fn(*mut c_void, *mut u8, u32) -> u32,
    pub set_state: unsafe extern "C" fn(*mut c_void, *const u8, u32) -> OSStatus,

    pub latency_samples: unsafe extern "C" fn(*mut c_void) -> u32,
    /// Returns `true` once after the plugin's latency changed, so the component can notify
    /// property listeners.
    pub take_latency_changed: unsafe extern "C" fn(*mut c_void) -> bool,

    pub input_channels: unsafe extern "C" fn(*mut c_void) -> u32,
    pub output_channels: unsafe extern "C" fn(*mut c_void) -> u32,
    pub accepts_midi: unsafe extern "C" fn(*mut c_void) -> bool,
}

/// A parameter's description, translated to `AudioUnitParameterInfo` by the component.
#[repr(C)]
pub struct AuParameterInfo {
    pub name: [c_char; 52],
    pub unit_name: [c_char; 32],
    /// One of the `kAudioUnitParameterUnit_*` constants.
    pub unit: u32,
    pub min_value: f32,
    pub max_value: f32,
    pub default_value: f32,
    /// A combination of the `kAudioUnitParameterFlag_*` constants.
    pub flags: u32,
}

#[derive(Clone, Copy)]
struct QueuedMidi {
    frame: u32,
    size: u32,
    data: [u8; MAX_QUEUED_MIDI_SIZE],
}

pub struct Wrapper<P: Plugin> {
    /// The wrapped plugin. The render thread only ever tries to lock this.
    processor: Mutex<BlockProcessor<P>>,
    /// Only borrowed from the render thread, and from `initialize()` which the host never calls
    /// while rendering.
    scratch: AtomicRefCell<RenderScratch>,
    sync: Arc<ParamSync>,
    info: PluginInfo,

    /// Values set through `AudioUnitSetParameter()`. These are applied at the start of the next
    /// render call, and only if the matching flag in `host_values_changed` is set.
    host_values: Box<[AtomicF32]>,
    host_values_changed: Box<[AtomicBool]>,

    /// Events from `MusicDeviceMIDIEvent()` and `MusicDeviceSysEx()` for the next render call.
    midi_queue: ArrayQueue<QueuedMidi>,
    host_callbacks: AtomicCell<Option<HostCallbackInfo>>,

    initialized: AtomicBool,
    max_frames: AtomicU32,
    current_program: AtomicU32,
    current_latency: AtomicU32,
    latency_changed: AtomicBool,

    /// The state serialized by the last `state_size()` call.
    saved_state: Mutex<Vec<u8>>,
}

struct RenderScratch {
    buffers: AudioBuffers,
    /// Buffers handed to the host when it passes output buffers without any data.
    output_storage: Vec<Vec<f32>>,
    input_ptrs: Vec<*const f32>,
    output_ptrs: Vec<*mut f32>,
    events: Vec<QueuedMidi>,
}

/// The host side of a single render call.
struct AuBlock<'a> {
    host_values: &'a [AtomicF32],
    host_values_changed: &'a [AtomicBool],
    events: &'a [QueuedMidi],
    latency: Option<u32>,
}

impl<'a> HostBlock<'a> for AuBlock<'a> {
    fn control_value(&self, index: u32) -> Option<f32> {
        let changed = self.host_values_changed.get(index as usize)?;
        if changed.swap(false, Ordering::AcqRel) {
            Some(self.host_values[index as usize].load(Ordering::Relaxed))
        } else {
            None
        }
    }

    fn decode_events(&mut self, events: &mut MidiEventList<'a>) {
        for event in self.events {
            if let Some(event) = MidiEvent::from_bytes(event.frame, &event.data[..event.size as usize]) {
                events.push(event);
            }
        }
    }

    // AudioUnit hosts poll output parameters through `AudioUnitGetParameter()`
    fn write_output(&mut self, _index: u32, _value: f32) {}

    fn write_latency(&mut self, latency: u32) {
        self.latency = Some(latency);
    }
}

/// Query the host's transport through the host callbacks. Bar, beat, and tick are only filled in
/// when both the beat and tempo and the musical time location callbacks succeed. `sample_time` is
/// used as the song position if the host doesn't provide a transport state callback.
///
/// # Safety
///
/// The callbacks must be valid to call from the current thread.
pub unsafe fn time_pos_from_host_callbacks(
    callbacks: &HostCallbackInfo,
    sample_time: f64,
) -> TimePos {
    let mut time_pos = TimePos {
        frame: sample_time.max(0.0) as u64,
        ..TimePos::default()
    };
    let user_data = callbacks.hostUserData;

    let mut is_playing: Boolean = 0;
    let mut is_recording: Boolean = 0;
    let mut state_changed: Boolean = 0;
    let mut sample_in_timeline = 0.0f64;
    let mut is_cycling: Boolean = 0;
    let mut cycle_start = 0.0f64;
    let mut cycle_end = 0.0f64;
    let transport_status = if let Some(transport_state) = callbacks.transportStateProc2 {
        transport_state(
            user_data,
            &mut is_playing,
            &mut is_recording,
            &mut state_changed,
            &mut sample_in_timeline,
            &mut is_cycling,
            &mut cycle_start,
            &mut cycle_end,
        )
    } else if let Some(transport_state) = callbacks.transportStateProc {
        transport_state(
            user_data,
            &mut is_playing,
            &mut state_changed,
            &mut sample_in_timeline,
            &mut is_cycling,
            &mut cycle_start,
            &mut cycle_end,
        )
    } else {
        kAudioUnitErr_CannotDoInCurrentContext
    };
    if transport_status == noErr {
        time_pos.playing = is_playing != 0;
        time_pos.frame = sample_in_timeline.max(0.0) as u64;
    }

    let mut beat = 0.0f64;
    let mut tempo = 0.0f64;
    let has_beat_and_tempo = match callbacks.beatAndTempoProc {
        Some(beat_and_tempo) => beat_and_tempo(user_data, &mut beat, &mut tempo) == noErr,
        None => false,
    };
    if has_beat_and_tempo {
        time_pos.bpm = tempo;
    }

    let mut offset_to_next_beat = 0u32;
    let mut numerator = 0.0f32;
    let mut denominator = 0u32;
    let mut measure_downbeat = 0.0f64;
    let has_time_signature = match callbacks.musicalTimeLocationProc {
        Some(musical_time_location) => {
            musical_time_location(
                user_data,
                &mut offset_to_next_beat,
                &mut numerator,
                &mut denominator,
                &mut measure_downbeat,
            ) == noErr
        }
        None => false,
    };

    if has_beat_and_tempo && has_time_signature {
        time_pos.bbt = TimePosBbt::from_quarter_notes(beat, numerator, denominator as f32);
    }

    time_pos.validate_bbt();
    time_pos
}

/// The AudioUnit unit for a parameter. The unit's name is always passed along as well.
fn parameter_unit(parameter: &Parameter) -> u32 {
    if parameter.hints.contains(ParameterHints::BOOLEAN) {
        kAudioUnitParameterUnit_Boolean
    } else if parameter.hints.contains(ParameterHints::INTEGER) {
        kAudioUnitParameterUnit_Indexed
    } else {
        match parameter.unit.as_str() {
            "dB" => kAudioUnitParameterUnit_Decibels,
            "Hz" => kAudioUnitParameterUnit_Hertz,
            "ms" => kAudioUnitParameterUnit_Milliseconds,
            _ => kAudioUnitParameterUnit_Generic,
        }
    }
}

impl<P: Plugin> Wrapper<P> {
    pub const INTERFACE: AuInterface = AuInterface {
        version: AU_INTERFACE_VERSION,

        create: Self::create,
        destroy: Self::destroy,
        initialize: Self::initialize,
        uninitialize: Self::uninitialize,
        set_host_callbacks: Self::set_host_callbacks,

        render: Self::render,
        midi_event: Self::midi_event,
        sysex: Self::sysex,

        parameter_count: Self::parameter_count,
        parameter_info: Self::parameter_info,
        get_parameter: Self::get_parameter,
        set_parameter: Self::set_parameter,

        program_count: Self::program_count,
        program_name: Self::program_name,
        set_program: Self::set_program,
        current_program: Self::current_program,

        state_size: Self::state_size,
        get_state: Self::get_state,
        set_state: Self::set_state,

        latency_samples: Self::latency_samples,
        take_latency_changed: Self::take_latency_changed,

        input_channels: Self::input_channels,
        output_channels: Self::output_channels,
        accepts_midi: Self::accepts_midi,
    };

    pub fn new() -> Self {
        let processor = BlockProcessor::<P>::new(
            PluginApi::Au,
            PluginConfig::new(DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE),
        );
        let sync = processor.sync().clone();
        let info = processor.adapter().info().clone();
        let latency = processor.adapter().latency();

        let host_values = info
            .parameters
            .iter()
            .map(|parameter| AtomicF32::new(parameter.ranges.def))
            .collect();
        let host_values_changed = info
            .parameters
            .iter()
            .map(|_| AtomicBool::new(false))
            .collect();

        Self {
            processor: Mutex::new(processor),
            scratch: AtomicRefCell::new(RenderScratch {
                buffers: AudioBuffers::new(P::NUM_INPUTS, P::NUM_OUTPUTS, DEFAULT_BUFFER_SIZE),
                output_storage: vec![vec![0.0; DEFAULT_BUFFER_SIZE as usize]; P::NUM_OUTPUTS as usize],
                input_ptrs: vec![ptr::null(); P::NUM_INPUTS as usize],
                output_ptrs: vec![ptr::null_mut(); P::NUM_OUTPUTS as usize],
                events: Vec::with_capacity(MAX_MIDI_EVENTS),
            }),
            sync,
            info,

            host_values,
            host_values_changed,

            midi_queue: ArrayQueue::new(MAX_MIDI_EVENTS),
            host_callbacks: AtomicCell::new(None),

            initialized: AtomicBool::new(false),
            max_frames: AtomicU32::new(DEFAULT_BUFFER_SIZE),
            current_program: AtomicU32::new(NO_PROGRAM),
            current_latency: AtomicU32::new(latency),
            latency_changed: AtomicBool::new(false),

            saved_state: Mutex::new(Vec::new()),
        }
    }

    fn queue_midi(&self, frame: u32, bytes: &[u8]) -> OSStatus {
        if bytes.is_empty() || bytes.len() > MAX_QUEUED_MIDI_SIZE {
            hb_warn!("Ignoring a {} byte MIDI message", bytes.len());
            return kAudioUnitErr_InvalidParameter;
        }

        let mut event = QueuedMidi {
            frame,
            size: bytes.len() as u32,
            data: [0; MAX_QUEUED_MIDI_SIZE],
        };
        event.data[..bytes.len()].copy_from_slice(bytes);
        if self.midi_queue.push(event).is_err() {
            hb_trace!("The MIDI queue is full, dropping an event");
        }

        noErr
    }

    /// Zero the host's output buffers. Used when the plugin cannot be locked for this block.
    unsafe fn clear_outputs(outputs: &mut AudioBufferList, frames: u32) {
        for index in 0..outputs.mNumberBuffers as usize {
            let buffer = outputs.buffer_mut(index);
            if !buffer.mData.is_null() {
                ptr::write_bytes(buffer.mData as *mut f32, 0, frames as usize);
            }
        }
    }

    unsafe extern "C" fn create() -> *mut c_void {
        Box::into_raw(Box::new(Self::new())) as *mut c_void
    }

    unsafe extern "C" fn destroy(handle: *mut c_void) {
        check_null_ptr!((), handle);

        drop(Box::from_raw(handle as *mut Self));
    }

    unsafe extern "C" fn initialize(handle: *mut c_void, sample_rate: f64, max_frames: u32) -> OSStatus {
        check_null_ptr!(kAudioUnitErr_InvalidParameter, handle);
        let wrapper = &*(handle as *const Self);

        if !(sample_rate > 0.0) || max_frames == 0 {
            return kAudioUnitErr_InvalidPropertyValue;
        }

        let mut processor = wrapper.processor.lock();
        processor.request_sample_rate(sample_rate);
        processor.request_buffer_size(max_frames);
        processor.apply_pending_config();
        processor.adapter_mut().activate();

        let mut scratch = wrapper.scratch.borrow_mut();
        scratch.buffers.resize(max_frames);
        for channel in &mut scratch.output_storage {
            channel.resize(max_frames as usize, 0.0);
        }

        wrapper.max_frames.store(max_frames, Ordering::Relaxed);
        wrapper.initialized.store(true, Ordering::SeqCst);

        noErr
    }

    unsafe extern "C" fn uninitialize(handle: *mut c_void) {
        check_null_ptr!((), handle);
        let wrapper = &*(handle as *const Self);

        wrapper.initialized.store(false, Ordering::SeqCst);
        wrapper.processor.lock().adapter_mut().deactivate();
    }

    unsafe extern "C" fn set_host_callbacks(handle: *mut c_void, callbacks: *const HostCallbackInfo) {
        check_null_ptr!((), handle);
        let wrapper = &*(handle as *const Self);

        wrapper.host_callbacks.store(callbacks.as_ref().copied());
    }

    unsafe extern "C" fn render(
        handle: *mut c_void,
        action_flags: *mut AudioUnitRenderActionFlags,
        timestamp: *const AudioTimeStamp,
        frames: u32,
        inputs: *const AudioBufferList,
        outputs: *mut AudioBufferList,
    ) -> OSStatus {
        check_null_ptr!(kAudioUnitErr_InvalidParameter, handle, outputs);
        let wrapper = &*(handle as *const Self);

        if !wrapper.initialized.load(Ordering::SeqCst) {
            return kAudioUnitErr_Uninitialized;
        }
        if frames > wrapper.max_frames.load(Ordering::Relaxed) {
            return kAudioUnitErr_TooManyFramesToProcess;
        }

        // Panic on allocations if the `assert_process_allocs` feature has been enabled, and make
        // sure that FTZ is set up correctly
        process_wrapper(|| {
            let outputs = &mut *outputs;
            let Some(mut processor) = wrapper.processor.try_lock() else {
                Self::clear_outputs(outputs, frames);
                return noErr;
            };
            let Ok(mut scratch) = wrapper.scratch.try_borrow_mut() else {
                hb_debug_assert_failure!("Concurrent render calls");
                return kAudioUnitErr_CannotDoInCurrentContext;
            };
            let RenderScratch {
                buffers,
                output_storage,
                input_ptrs,
                output_ptrs,
                events,
            } = &mut *scratch;

            // Anything that doesn't fit stays queued for the next block
            events.clear();
            while events.len() < events.capacity() {
                match wrapper.midi_queue.pop() {
                    Some(event) => events.push(event),
                    None => break,
                }
            }

            let sample_time = match timestamp.as_ref() {
                Some(timestamp) if timestamp.mFlags & kAudioTimeStampSampleTimeValid != 0 => {
                    timestamp.mSampleTime
                }
                _ => 0.0,
            };
            let time_pos = match wrapper.host_callbacks.load() {
                Some(callbacks) => time_pos_from_host_callbacks(&callbacks, sample_time),
                None => TimePos {
                    frame: sample_time.max(0.0) as u64,
                    ..TimePos::default()
                },
            };

            // Only non-interleaved buffers are supported, with one channel per buffer
            let inputs = inputs.as_ref();
            for (channel, input_ptr) in input_ptrs.iter_mut().enumerate() {
                *input_ptr = match inputs {
                    Some(inputs) if channel < inputs.mNumberBuffers as usize => {
                        let buffer = inputs.buffer(channel);
                        hb_debug_assert_eq!(buffer.mNumberChannels, 1);
                        buffer.mData as *const f32
                    }
                    _ => ptr::null(),
                };
            }
            for (channel, output_ptr) in output_ptrs.iter_mut().enumerate() {
                *output_ptr = if channel < outputs.mNumberBuffers as usize {
                    let buffer = outputs.buffer_mut(channel);
                    if buffer.mData.is_null() {
                        buffer.mData = output_storage[channel].as_mut_ptr() as *mut c_void;
                        buffer.mDataByteSize = frames * std::mem::size_of::<f32>() as u32;
                    }

                    buffer.mData as *mut f32
                } else {
                    ptr::null_mut()
                };
            }

            let mut host = AuBlock {
                host_values: &wrapper.host_values,
                host_values_changed: &wrapper.host_values_changed,
                events,
                latency: None,
            };
            let (inputs, outputs) = buffers.slices(input_ptrs, output_ptrs, frames as usize);
            processor.process(&mut host, inputs, outputs, frames, &time_pos);

            if let Some(action_flags) = action_flags.as_mut() {
                if outputs.iter().all(|channel| channel.iter().all(|sample| *sample == 0.0)) {
                    *action_flags |= kAudioUnitRenderAction_OutputIsSilence;
                } else {
                    *action_flags &= !kAudioUnitRenderAction_OutputIsSilence;
                }
            }

            if let Some(latency) = host.latency {
                if wrapper.current_latency.swap(latency, Ordering::Relaxed) != latency {
                    wrapper.latency_changed.store(true, Ordering::Release);
                }
            }

            noErr
        })
    }

    unsafe extern "C" fn midi_event(
        handle: *mut c_void,
        status: u32,
        data1: u32,
        data2: u32,
        offset_sample_frame: u32,
    ) -> OSStatus {
        check_null_ptr!(kAudioUnitErr_InvalidParameter, handle);
        let wrapper = &*(handle as *const Self);

        let status = status as u8;
        match MidiEvent::from_channel_message(
            offset_sample_frame,
            status & 0xf0,
            status & 0x0f,
            data1 as u8,
            data2 as u8,
        ) {
            Some(event) => wrapper.queue_midi(event.frame, event.as_bytes()),
            None => {
                hb_trace!("Ignoring MIDI status byte {:#x}", status);
                noErr
            }
        }
    }

    unsafe extern "C" fn sysex(handle: *mut c_void, data: *const u8, length: u32) -> OSStatus {
        check_null_ptr!(kAudioUnitErr_InvalidParameter, handle, data);
        let wrapper = &*(handle as *const Self);

        wrapper.queue_midi(0, std::slice::from_raw_parts(data, length as usize))
    }

    unsafe extern "C" fn parameter_count(handle: *mut c_void) -> u32 {
        check_null_ptr!(0, handle);
        let wrapper = &*(handle as *const Self);

        wrapper.info.parameters.len() as u32
    }

    unsafe extern "C" fn parameter_info(
        handle: *mut c_void,
        id: AudioUnitParameterID,
        info: *mut AuParameterInfo,
    ) -> OSStatus {
        check_null_ptr!(kAudioUnitErr_InvalidParameter, handle, info);
        let wrapper = &*(handle as *const Self);

        let Some(parameter) = wrapper.info.parameters.get(id as usize) else {
            return kAudioUnitErr_InvalidParameter;
        };

        *info = std::mem::zeroed();

        let info = &mut *info;
        strlcpy(&mut info.name, &parameter.name);
        strlcpy(&mut info.unit_name, &parameter.unit);
        info.unit = parameter_unit(parameter);
        info.min_value = parameter.ranges.min;
        info.max_value = parameter.ranges.max;
        info.default_value = parameter.ranges.def;
        info.flags = kAudioUnitParameterFlag_IsReadable;
        if parameter.is_output() {
            info.flags |= kAudioUnitParameterFlag_MeterReadOnly;
        } else {
            info.flags |= kAudioUnitParameterFlag_IsWritable;
        }
        if parameter.hints.contains(ParameterHints::LOGARITHMIC) {
            info.flags |= kAudioUnitParameterFlag_DisplayLogarithmic;
        }

        noErr
    }

    unsafe extern "C" fn get_parameter(
        handle: *mut c_void,
        id: AudioUnitParameterID,
        value: *mut f32,
    ) -> OSStatus {
        check_null_ptr!(kAudioUnitErr_InvalidParameter, handle, value);
        let wrapper = &*(handle as *const Self);

        let Some(changed) = wrapper.host_values_changed.get(id as usize) else {
            return kAudioUnitErr_InvalidParameter;
        };

        // Values the plugin hasn't seen yet take precedence, so the host reads back what it set
        *value = if changed.load(Ordering::Acquire) {
            wrapper.host_values[id as usize].load(Ordering::Relaxed)
        } else {
            wrapper.sync.published_value(id)
        };

        noErr
    }

    unsafe extern "C" fn set_parameter(
        handle: *mut c_void,
        id: AudioUnitParameterID,
        value: f32,
    ) -> OSStatus {
        check_null_ptr!(kAudioUnitErr_InvalidParameter, handle);
        let wrapper = &*(handle as *const Self);

        let Some(parameter) = wrapper.info.parameters.get(id as usize) else {
            return kAudioUnitErr_InvalidParameter;
        };
        if parameter.is_output() {
            return kAudioUnitErr_InvalidParameter;
        }

        let value = parameter.ranges.fixed_value(value);

        // Outside of rendering the plugin can be updated right away
        if !wrapper.initialized.load(Ordering::SeqCst) {
            if let Some(mut processor) = wrapper.processor.try_lock() {
                processor.set_parameter_value(id, value);
                return noErr;
            }
        }

        wrapper.host_values[id as usize].store(value, Ordering::Relaxed);
        wrapper.host_values_changed[id as usize].store(true, Ordering::Release);
        // Saving state reads the published values
        wrapper.sync.publish_value(id, value);

        noErr
    }

    unsafe extern "C" fn program_count(handle: *mut c_void) -> u32 {
        check_null_ptr!(0, handle);
        let wrapper = &*(handle as *const Self);

        if P::FEATURES.contains(PluginFeatures::WANT_PROGRAMS) {
            wrapper.info.program_names.len() as u32
        } else {
            0
        }
    }

    unsafe extern "C" fn program_name(
        handle: *mut c_void,
        index: u32,
        name: *mut c_char,
        size: u32,
    ) -> OSStatus {
        check_null_ptr!(kAudioUnitErr_InvalidParameter, handle, name);
        let wrapper = &*(handle as *const Self);

        if index >= Self::program_count(handle) {
            return kAudioUnitErr_InvalidPropertyValue;
        }

        let dest = std::slice::from_raw_parts_mut(name, size as usize);
        strlcpy(dest, &wrapper.info.program_names[index as usize]);

        noErr
    }

    unsafe extern "C" fn set_program(handle: *mut c_void, index: u32) -> OSStatus {
        check_null_ptr!(kAudioUnitErr_InvalidParameter, handle);
        let wrapper = &*(handle as *const Self);

        if index >= Self::program_count(handle) {
            return kAudioUnitErr_InvalidPropertyValue;
        }

        if wrapper.processor.lock().load_program(index) {
            wrapper.current_program.store(index, Ordering::Relaxed);
            noErr
        } else {
            kAudioUnitErr_InvalidPropertyValue
        }
    }

    unsafe extern "C" fn current_program(handle: *mut c_void) -> i32 {
        check_null_ptr!(-1, handle);
        let wrapper = &*(handle as *const Self);

        match wrapper.current_program.load(Ordering::Relaxed) {
            NO_PROGRAM => -1,
            program => program as i32,
        }
    }

    unsafe extern "C" fn state_size(handle: *mut c_void) -> u32 {
        check_null_ptr!(0, handle);
        let wrapper = &*(handle as *const Self);

        let program = match wrapper.current_program.load(Ordering::Relaxed) {
            NO_PROGRAM => None,
            program => Some(program),
        };
        let serialized = state::serialize_json(&wrapper.info, &wrapper.sync, program);
        let mut saved_state = wrapper.saved_state.lock();
        match serialized {
            Ok(serialized) => {
                *saved_state = serialized;
                saved_state.len() as u32
            }
            Err(err) => {
                hb_debug_assert_failure!("Could not save state: {:#}", err);
                saved_state.clear();
                0
            }
        }
    }

    unsafe extern "C" fn get_state(handle: *mut c_void, data: *mut u8, size: u32) -> u32 {
        check_null_ptr!(0, handle, data);
        let wrapper = &*(handle as *const Self);

        let saved_state = wrapper.saved_state.lock();
        let length = saved_state.len().min(size as usize);
        ptr::copy_nonoverlapping(saved_state.as_ptr(), data, length);

        length as u32
    }

    unsafe extern "C" fn set_state(handle: *mut c_void, data: *const u8, size: u32) -> OSStatus {
        check_null_ptr!(kAudioUnitErr_InvalidParameter, handle, data);
        let wrapper = &*(handle as *const Self);

        let data = std::slice::from_raw_parts(data, size as usize);
        let result = state::deserialize_json(&mut *wrapper.processor.lock(), data);
        match result {
            Ok(program) => {
                if let Some(program) = program {
                    if program < wrapper.info.program_names.len() as u32 {
                        wrapper.current_program.store(program, Ordering::Relaxed);
                    }
                }

                hb_trace!("Loaded state ({} bytes)", data.len());
                noErr
            }
            Err(err) => {
                hb_warn!("Could not load state: {:#}", err);
                kAudioUnitErr_InvalidPropertyValue
            }
        }
    }

    unsafe extern "C" fn latency_samples(handle: *mut c_void) -> u32 {
        check_null_ptr!(0, handle);
        let wrapper = &*(handle as *const Self);

        wrapper.current_latency.load(Ordering::Relaxed)
    }

    unsafe extern "C" fn take_latency_changed(handle: *mut c_void) -> bool {
        check_null_ptr!(false, handle);
        let wrapper = &*(handle as *const Self);

        wrapper.latency_changed.swap(false, Ordering::Acquire)
    }

    unsafe extern "C" fn input_channels(_handle: *mut c_void) -> u32 {
        P::NUM_INPUTS
    }

    unsafe extern "C" fn output_channels(_handle: *mut c_void) -> u32 {
        P::NUM_OUTPUTS
    }

    unsafe extern "C" fn accepts_midi(_handle: *mut c_void) -> bool {
        P::FEATURES.contains(PluginFeatures::IS_SYNTH)
    }
}

impl<P: Plugin> Default for Wrapper<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use super::*;
    use crate::test_plugin::{RecordingPlugin, GAIN, LATENCY, LEVEL, PANIC};

    const FRAMES: u32 = 16;

    /// An `AudioBufferList` with room for two buffers.
    #[repr(C)]
    struct StereoBufferList {
        number_buffers: u32,
        buffers: [AudioBuffer; 2],
    }

    impl StereoBufferList {
        fn new(left: *mut f32, right: *mut f32) -> Self {
            let buffer = |data: *mut f32| AudioBuffer {
                mNumberChannels: 1,
                mDataByteSize: if data.is_null() { 0 } else { FRAMES * 4 },
                mData: data as *mut c_void,
            };

            Self {
                number_buffers: 2,
                buffers: [buffer(left), buffer(right)],
            }
        }

        fn as_list(&mut self) -> *mut AudioBufferList {
            self as *mut Self as *mut AudioBufferList
        }
    }

    struct Instance {
        handle: *mut c_void,
    }

    impl Instance {
        const INTERFACE: AuInterface = Wrapper::<RecordingPlugin>::INTERFACE;

        fn new() -> Self {
            Self {
                handle: unsafe { (Self::INTERFACE.create)() },
            }
        }

        fn wrapper(&self) -> &Wrapper<RecordingPlugin> {
            unsafe { &*(self.handle as *const Wrapper<RecordingPlugin>) }
        }

        fn get_parameter(&self, id: u32) -> f32 {
            let mut value = f32::NAN;
            assert_eq!(
                unsafe { (Self::INTERFACE.get_parameter)(self.handle, id, &mut value) },
                noErr
            );

            value
        }

        /// Render a block of ones. Returns the output, and whether the silence flag was set.
        fn render(&self, timestamp: Option<&AudioTimeStamp>) -> (Vec<f32>, Vec<f32>, bool) {
            let mut left_in = vec![1.0f32; FRAMES as usize];
            let mut right_in = vec![-1.0f32; FRAMES as usize];
            let mut inputs = StereoBufferList::new(left_in.as_mut_ptr(), right_in.as_mut_ptr());

            // The right output is left to the plugin
            let mut left_out = vec![f32::NAN; FRAMES as usize];
            let mut outputs = StereoBufferList::new(left_out.as_mut_ptr(), ptr::null_mut());

            let mut action_flags = 0;
            let status = unsafe {
                (Self::INTERFACE.render)(
                    self.handle,
                    &mut action_flags,
                    timestamp.map(|t| t as *const _).unwrap_or(ptr::null()),
                    FRAMES,
                    inputs.as_list(),
                    outputs.as_list(),
                )
            };
            assert_eq!(status, noErr);

            let right_out = outputs.buffers[1].mData as *const f32;
            assert!(!right_out.is_null());
            let right_out = unsafe { std::slice::from_raw_parts(right_out, FRAMES as usize) }.to_vec();

            (
                left_out,
                right_out,
                action_flags & kAudioUnitRenderAction_OutputIsSilence != 0,
            )
        }
    }

    impl Drop for Instance {
        fn drop(&mut self) {
            unsafe { (Self::INTERFACE.destroy)(self.handle) };
        }
    }

    unsafe extern "C" fn beat_and_tempo(
        _user_data: *mut c_void,
        beat: *mut f64,
        tempo: *mut f64,
    ) -> OSStatus {
        *beat = 6.5;
        *tempo = 140.0;
        noErr
    }

    unsafe extern "C" fn musical_time_location(
        _user_data: *mut c_void,
        _offset_to_next_beat: *mut u32,
        numerator: *mut f32,
        denominator: *mut u32,
        _measure_downbeat: *mut f64,
    ) -> OSStatus {
        *numerator = 4.0;
        *denominator = 4;
        noErr
    }

    unsafe extern "C" fn transport_state(
        _user_data: *mut c_void,
        is_playing: *mut Boolean,
        _state_changed: *mut Boolean,
        sample_in_timeline: *mut f64,
        _is_cycling: *mut Boolean,
        _cycle_start: *mut f64,
        _cycle_end: *mut f64,
    ) -> OSStatus {
        *is_playing = 1;
        *sample_in_timeline = 4096.0;
        noErr
    }

    fn host_callbacks() -> HostCallbackInfo {
        HostCallbackInfo {
            hostUserData: ptr::null_mut(),
            beatAndTempoProc: Some(beat_and_tempo),
            musicalTimeLocationProc: Some(musical_time_location),
            transportStateProc: Some(transport_state),
            transportStateProc2: None,
        }
    }

    #[test]
    fn render_requires_initialization() {
        let instance = Instance::new();
        let mut outputs = StereoBufferList::new(ptr::null_mut(), ptr::null_mut());

        unsafe {
            assert_eq!(
                (Instance::INTERFACE.render)(
                    instance.handle,
                    ptr::null_mut(),
                    ptr::null(),
                    FRAMES,
                    ptr::null(),
                    outputs.as_list(),
                ),
                kAudioUnitErr_Uninitialized
            );

            assert_eq!((Instance::INTERFACE.initialize)(instance.handle, 48000.0, 8), noErr);
            assert_eq!(
                (Instance::INTERFACE.render)(
                    instance.handle,
                    ptr::null_mut(),
                    ptr::null(),
                    FRAMES,
                    ptr::null(),
                    outputs.as_list(),
                ),
                kAudioUnitErr_TooManyFramesToProcess
            );
            assert_eq!(
                (Instance::INTERFACE.initialize)(instance.handle, 0.0, 8),
                kAudioUnitErr_InvalidPropertyValue
            );
        }
    }

    #[test]
    fn render_applies_parameters_and_midi() {
        let instance = Instance::new();

        unsafe {
            assert_eq!((Instance::INTERFACE.initialize)(instance.handle, 48000.0, 256), noErr);
            assert_eq!((Instance::INTERFACE.set_parameter)(instance.handle, GAIN, 0.25), noErr);
            assert_eq!(
                (Instance::INTERFACE.set_parameter)(instance.handle, LEVEL, 0.25),
                kAudioUnitErr_InvalidParameter
            );
            assert_eq!(
                (Instance::INTERFACE.set_parameter)(instance.handle, 7, 0.25),
                kAudioUnitErr_InvalidParameter
            );

            assert_eq!((Instance::INTERFACE.midi_event)(instance.handle, 0x91, 60, 100, 3), noErr);
            // System messages are not passed to the plugin
            assert_eq!((Instance::INTERFACE.midi_event)(instance.handle, 0xf8, 0, 0, 0), noErr);
            let sysex = [0xf0, 0x7e, 0x7f, 0x06, 0x01, 0xf7];
            assert_eq!(
                (Instance::INTERFACE.sysex)(instance.handle, sysex.as_ptr(), sysex.len() as u32),
                noErr
            );
        }

        // The host reads back its own value before the plugin has seen it
        assert_eq!(instance.get_parameter(GAIN), 0.25);
        assert_eq!(unsafe { (Instance::INTERFACE.latency_samples)(instance.handle) }, 0);

        let (left, right, silent) = instance.render(None);
        assert!(left.iter().all(|sample| *sample == 0.25));
        assert!(right.iter().all(|sample| *sample == -0.25));
        assert!(!silent);

        assert_eq!(instance.get_parameter(GAIN), 0.25);
        assert_eq!(instance.get_parameter(LEVEL), 0.25);

        unsafe {
            assert_eq!((Instance::INTERFACE.latency_samples)(instance.handle), LATENCY);
            assert!((Instance::INTERFACE.take_latency_changed)(instance.handle));
            assert!(!(Instance::INTERFACE.take_latency_changed)(instance.handle));
        }

        let processor = instance.wrapper().processor.lock();
        let plugin = processor.adapter().plugin();
        assert_eq!(
            plugin.midi,
            vec![
                (0, sysex_bytes()),
                (3, vec![0x91, 60, 100]),
            ]
        );
        assert_eq!(plugin.last_transport, Some((false, false)));
    }

    fn sysex_bytes() -> Vec<u8> {
        vec![0xf0, 0x7e, 0x7f, 0x06, 0x01, 0xf7]
    }

    #[test]
    fn silence_flag() {
        let instance = Instance::new();

        unsafe {
            assert_eq!((Instance::INTERFACE.set_parameter)(instance.handle, GAIN, 0.0), noErr);
            assert_eq!((Instance::INTERFACE.initialize)(instance.handle, 44100.0, 64), noErr);
        }

        let (left, _, silent) = instance.render(None);
        assert!(left.iter().all(|sample| *sample == 0.0));
        assert!(silent);
    }

    #[test]
    fn parameters_before_initialization() {
        let instance = Instance::new();

        unsafe {
            assert_eq!((Instance::INTERFACE.parameter_count)(instance.handle), 3);
            assert_eq!((Instance::INTERFACE.set_parameter)(instance.handle, GAIN, 0.75), noErr);
        }

        // This goes straight to the plugin
        assert_eq!(instance.get_parameter(GAIN), 0.75);
        assert!(!instance.wrapper().host_values_changed[GAIN as usize].load(Ordering::Relaxed));
    }

    #[test]
    fn parameter_info() {
        let instance = Instance::new();

        let info = |id: u32| unsafe {
            let mut info: AuParameterInfo = std::mem::zeroed();
            assert_eq!(
                (Instance::INTERFACE.parameter_info)(instance.handle, id, &mut info),
                noErr
            );

            info
        };

        let gain = info(GAIN);
        assert_eq!(unsafe { CStr::from_ptr(gain.name.as_ptr()) }.to_str(), Ok("Gain"));
        assert_eq!(gain.unit, kAudioUnitParameterUnit_Generic);
        assert_eq!(gain.default_value, 0.5);
        assert_eq!(
            gain.flags,
            kAudioUnitParameterFlag_IsReadable | kAudioUnitParameterFlag_IsWritable
        );

        assert_eq!(info(PANIC).unit, kAudioUnitParameterUnit_Boolean);

        let level = info(LEVEL);
        assert_eq!(level.unit, kAudioUnitParameterUnit_Decibels);
        assert_eq!(unsafe { CStr::from_ptr(level.unit_name.as_ptr()) }.to_str(), Ok("dB"));
        assert_eq!(
            level.flags,
            kAudioUnitParameterFlag_IsReadable | kAudioUnitParameterFlag_MeterReadOnly
        );

        unsafe {
            let mut out_of_range: AuParameterInfo = std::mem::zeroed();
            assert_eq!(
                (Instance::INTERFACE.parameter_info)(instance.handle, 3, &mut out_of_range),
                kAudioUnitErr_InvalidParameter
            );
        }
    }

    #[test]
    fn programs_and_state() {
        let instance = Instance::new();

        unsafe {
            assert_eq!((Instance::INTERFACE.program_count)(instance.handle), 2);
            assert_eq!((Instance::INTERFACE.current_program)(instance.handle), -1);

            let mut name = [0 as c_char; 32];
            assert_eq!(
                (Instance::INTERFACE.program_name)(instance.handle, 1, name.as_mut_ptr(), 32),
                noErr
            );
            assert_eq!(CStr::from_ptr(name.as_ptr()).to_str(), Ok("Loud"));
            assert_eq!(
                (Instance::INTERFACE.program_name)(instance.handle, 2, name.as_mut_ptr(), 32),
                kAudioUnitErr_InvalidPropertyValue
            );

            assert_eq!((Instance::INTERFACE.set_program)(instance.handle, 1), noErr);
            assert_eq!((Instance::INTERFACE.current_program)(instance.handle), 1);
        }
        assert_eq!(instance.get_parameter(GAIN), 1.0);

        let state = unsafe {
            let size = (Instance::INTERFACE.state_size)(instance.handle);
            assert!(size > 0);

            let mut state = vec![0u8; size as usize];
            assert_eq!(
                (Instance::INTERFACE.get_state)(instance.handle, state.as_mut_ptr(), size),
                size
            );

            state
        };

        let other = Instance::new();
        unsafe {
            assert_eq!(
                (Instance::INTERFACE.set_state)(other.handle, state.as_ptr(), state.len() as u32),
                noErr
            );
            assert_eq!((Instance::INTERFACE.current_program)(other.handle), 1);

            let garbage = b"not json";
            assert_eq!(
                (Instance::INTERFACE.set_state)(other.handle, garbage.as_ptr(), garbage.len() as u32),
                kAudioUnitErr_InvalidPropertyValue
            );
        }
        assert_eq!(other.get_parameter(GAIN), 1.0);
    }

    #[test]
    fn transport_from_host_callbacks() {
        let time_pos = unsafe { time_pos_from_host_callbacks(&host_callbacks(), 0.0) };
        assert!(time_pos.playing);
        assert_eq!(time_pos.frame, 4096);
        assert_eq!(time_pos.bpm, 140.0);
        assert!(time_pos.bbt.valid);
        assert_eq!(time_pos.bbt.bar, 2);
        assert_eq!(time_pos.bbt.beat, 3);

        // Without any callbacks only the sample time is known
        let no_callbacks = HostCallbackInfo {
            hostUserData: ptr::null_mut(),
            beatAndTempoProc: None,
            musicalTimeLocationProc: None,
            transportStateProc: None,
            transportStateProc2: None,
        };
        let time_pos = unsafe { time_pos_from_host_callbacks(&no_callbacks, 512.0) };
        assert!(!time_pos.playing);
        assert_eq!(time_pos.frame, 512);
        assert!(!time_pos.bbt.valid);
    }

    #[test]
    fn render_uses_host_callbacks() {
        let instance = Instance::new();
        let callbacks = host_callbacks();

        unsafe {
            (Instance::INTERFACE.set_host_callbacks)(instance.handle, &callbacks);
            assert_eq!((Instance::INTERFACE.initialize)(instance.handle, 48000.0, 64), noErr);
        }

        let timestamp = AudioTimeStamp {
            mSampleTime: 128.0,
            mFlags: kAudioTimeStampSampleTimeValid,
            ..AudioTimeStamp::default()
        };
        instance.render(Some(&timestamp));

        let processor = instance.wrapper().processor.lock();
        assert_eq!(processor.adapter().plugin().last_transport, Some((true, true)));
    }

    #[test]
    fn oversized_sysex() {
        let instance = Instance::new();
        let sysex = [0u8; MAX_QUEUED_MIDI_SIZE + 1];

        unsafe {
            assert_eq!(
                (Instance::INTERFACE.sysex)(instance.handle, sysex.as_ptr(), sysex.len() as u32),
                kAudioUnitErr_InvalidParameter
            );
            assert_eq!(
                (Instance::INTERFACE.sysex)(instance.handle, sysex.as_ptr(), 0),
                kAudioUnitErr_InvalidParameter
            );
        }
        assert!(instance.wrapper().midi_queue.is_empty());
    }
}
