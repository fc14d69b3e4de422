use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use super::sys::*;
use crate::context::PluginApi;
use crate::midi::{MidiEvent, MidiEventList};
use crate::param::ParameterRanges;
use crate::plugin::{Plugin, PluginConfig, PluginFeatures};
use crate::state::{decode_chunk, encode_chunk};
use crate::sync::ParamSync;
use crate::transport::{TimePos, TimePosBbt};
use crate::ui::{UiAdapter, UiConfig, UiHost};
use crate::util::permit_alloc;
use crate::wrapper::block::{AudioBuffers, BlockProcessor, HostBlock};
use crate::wrapper::util::{
    process_wrapper, strlcpy, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE,
};

/// The time info flags we ask the host to fill in.
const WANTED_TIME_FLAGS: i32 = kVstPpqPosValid | kVstTempoValid | kVstTimeSigValid;

/// A VST2 plugin instance. The host only ever holds a pointer to the [`AEffect`], which is why it
/// needs to be the first field. Its `object` field points back to the wrapper.
#[repr(C)]
pub struct Wrapper<P: Plugin> {
    effect: AEffect,
    audio_master: audioMasterCallback,

    pub(crate) processor: BlockProcessor<P>,
    /// A clone of the processor's sync object and the parameters' ranges. `getParameter()` and
    /// `setParameter()` can be called from any thread at any time, so they only touch these.
    sync: Arc<ParamSync>,
    ranges: Box<[ParameterRanges]>,

    current_program: u32,
    /// The events from the last `effProcessEvents` call. The host keeps these alive until the end
    /// of the next `processReplacing()` call.
    events: *const VstEvents,
    audio_inputs: Vec<*const f32>,
    audio_outputs: Vec<*mut f32>,
    buffers: AudioBuffers,

    /// The chunk handed out by `effGetChunk`. This needs to stay alive until the next call.
    chunk: Vec<u8>,

    editor: Option<UiAdapter<P::Ui>>,
    /// `effEditGetRect` returns a pointer to this.
    editor_rect: ERect,
}

/// The host side of a VST2 block. Parameter changes reach the plugin through the sync object's
/// pending values, so there are no control values to read here.
struct EventBlock<'a> {
    events: Option<&'a VstEvents>,
    initial_delay: &'a mut i32,
}

impl<'a> HostBlock<'a> for EventBlock<'a> {
    fn control_value(&self, _index: u32) -> Option<f32> {
        None
    }

    fn decode_events(&mut self, events: &mut MidiEventList<'a>) {
        let Some(vst_events) = self.events else {
            return;
        };

        // SAFETY: `events` is a variable length array with `numEvents` elements
        let pointers = unsafe {
            std::slice::from_raw_parts(
                vst_events.events.as_ptr(),
                vst_events.numEvents.max(0) as usize,
            )
        };
        for &event in pointers {
            if let Some(event) = unsafe { decode_event(event) } {
                events.push(event);
            }
        }
    }

    // Hosts poll output parameters through `getParameter()`
    fn write_output(&mut self, _index: u32, _value: f32) {}

    fn write_latency(&mut self, latency: u32) {
        *self.initial_delay = latency as i32;
    }
}

/// Decode a single MIDI or SysEx event. Everything else is skipped.
///
/// # Safety
///
/// `event` must be null or point to a valid event that outlives `'a`.
unsafe fn decode_event<'a>(event: *const VstEvent) -> Option<MidiEvent<'a>> {
    let header = event.as_ref()?;
    let frame = header.deltaFrames.max(0) as u32;

    match header.type_ {
        kVstMidiType => {
            let event = &*(event as *const VstMidiEvent);
            let [status, data1, data2, _] = event.midiData;

            MidiEvent::from_channel_message(frame, status & 0xf0, status & 0x0f, data1, data2)
        }
        kVstSysExType => {
            let event = &*(event as *const VstMidiSysexEvent);
            if event.sysexDump.is_null() || event.dumpBytes <= 0 {
                return None;
            }

            let bytes = std::slice::from_raw_parts(
                event.sysexDump as *const u8,
                event.dumpBytes as usize,
            );
            MidiEvent::from_bytes(frame, bytes)
        }
        _ => None,
    }
}

/// Translate the host's time info. Musical positions are only used when the host provided the
/// quarter note position, the tempo, and the time signature.
pub fn time_pos_from_info(info: &VstTimeInfo) -> TimePos {
    let mut time_pos = TimePos {
        playing: info.flags & kVstTransportPlaying != 0,
        frame: info.samplePos.max(0.0) as u64,
        ..TimePos::default()
    };

    if info.flags & kVstTempoValid != 0 {
        time_pos.bpm = info.tempo;
    }
    if info.flags & WANTED_TIME_FLAGS == WANTED_TIME_FLAGS {
        time_pos.bbt = TimePosBbt::from_quarter_notes(
            info.ppqPos,
            info.timeSigNumerator as f32,
            info.timeSigDenominator as f32,
        );
    }

    time_pos.validate_bbt();
    time_pos
}

/// Forwards the editor's requests to the host.
struct Vst2UiHost {
    effect: *mut AEffect,
    audio_master: audioMasterCallback,
    sync: Arc<ParamSync>,
    ranges: Box<[ParameterRanges]>,
}

// SAFETY: The effect outlives the editor, and VST2 hosts expect these callbacks from the GUI
//         thread
unsafe impl Send for Vst2UiHost {}
unsafe impl Sync for Vst2UiHost {}

impl Vst2UiHost {
    fn call(&self, opcode: i32, index: i32, value: isize, opt: f32) -> isize {
        unsafe { (self.audio_master)(self.effect, opcode, index, value, ptr::null_mut(), opt) }
    }
}

impl UiHost for Vst2UiHost {
    fn edit_parameter(&self, index: u32, started: bool) {
        let opcode = if started {
            audioMasterBeginEdit
        } else {
            audioMasterEndEdit
        };
        self.call(opcode, index as i32, 0, 0.0);
    }

    fn set_parameter_value(&self, index: u32, value: f32) {
        let Some(ranges) = self.ranges.get(index as usize) else {
            return;
        };

        self.sync.request_parameter_value(index, value);
        self.call(audioMasterAutomate, index as i32, 0, ranges.normalize(value));
    }

    fn set_state(&self, key: &str, value: &str) {
        UiHost::set_state(&*self.sync, key, value);
    }

    fn send_note(&self, channel: u8, note: u8, velocity: u8) {
        self.sync.send_note(channel, note, velocity);
    }

    fn resize(&self, width: u32, height: u32) {
        self.call(audioMasterSizeWindow, width as i32, height as isize, 0.0);
    }
}

impl<P: Plugin> Wrapper<P> {
    fn new(audio_master: audioMasterCallback, buffer_size: u32, sample_rate: f64) -> Self {
        let processor = BlockProcessor::<P>::new(
            PluginApi::Vst2,
            PluginConfig::new(buffer_size, sample_rate),
        );
        let sync = processor.sync().clone();
        let ranges = (0..P::PARAMETER_COUNT)
            .map(|index| processor.adapter().parameter_ranges(index))
            .collect();

        let mut flags = effFlagsCanReplacing;
        if P::FEATURES.contains(PluginFeatures::HAS_UI) {
            flags |= effFlagsHasEditor;
        }
        if P::FEATURES.contains(PluginFeatures::WANT_STATE) {
            flags |= effFlagsProgramChunks;
        }
        if P::FEATURES.contains(PluginFeatures::IS_SYNTH) {
            flags |= effFlagsIsSynth;
        }

        let effect = AEffect {
            magic: kEffectMagic,
            dispatcher: Some(dispatcher::<P>),
            process: Some(process_replacing::<P>),
            setParameter: Some(set_parameter::<P>),
            getParameter: Some(get_parameter::<P>),
            numPrograms: P::PROGRAM_COUNT as i32,
            numParams: P::PARAMETER_COUNT as i32,
            numInputs: P::NUM_INPUTS as i32,
            numOutputs: P::NUM_OUTPUTS as i32,
            flags,
            resvd1: 0,
            resvd2: 0,
            initialDelay: processor.adapter().latency() as i32,
            realQualities: 0,
            offQualities: 0,
            ioRatio: 1.0,
            object: ptr::null_mut(),
            user: ptr::null_mut(),
            uniqueID: P::UNIQUE_ID as i32,
            version: P::VERSION as i32,
            processReplacing: Some(process_replacing::<P>),
            processDoubleReplacing: None,
            future: [0; 56],
        };

        Self {
            effect,
            audio_master,

            processor,
            sync,
            ranges,

            current_program: 0,
            events: ptr::null(),
            audio_inputs: vec![ptr::null(); P::NUM_INPUTS as usize],
            audio_outputs: vec![ptr::null_mut(); P::NUM_OUTPUTS as usize],
            buffers: AudioBuffers::new(P::NUM_INPUTS, P::NUM_OUTPUTS, buffer_size),

            chunk: Vec::new(),

            editor: None,
            editor_rect: ERect::default(),
        }
    }

    fn effect_ptr(&self) -> *mut AEffect {
        &self.effect as *const AEffect as *mut AEffect
    }

    fn parameter_index(&self, index: i32) -> Option<u32> {
        (index >= 0 && (index as u32) < P::PARAMETER_COUNT).then_some(index as u32)
    }

    fn host_sample_rate(&self) -> Option<f64> {
        let sample_rate = unsafe {
            (self.audio_master)(
                self.effect_ptr(),
                audioMasterGetSampleRate,
                0,
                0,
                ptr::null_mut(),
                0.0,
            )
        };

        (sample_rate > 0).then_some(sample_rate as f64)
    }

    fn create_editor(&self, parent_window: Option<usize>) -> UiAdapter<P::Ui> {
        let host = Arc::new(Vst2UiHost {
            effect: self.effect_ptr(),
            audio_master: self.audio_master,
            sync: self.sync.clone(),
            ranges: self.ranges.clone(),
        });

        UiAdapter::new(
            host,
            Some(self.sync.clone()),
            UiConfig {
                plugin_api: PluginApi::Vst2,
                parameter_count: P::PARAMETER_COUNT,
                sample_rate: self
                    .host_sample_rate()
                    .unwrap_or_else(|| self.processor.adapter().sample_rate()),
                parent_window,
            },
        )
    }

    /// Handle every opcode except for `effClose`, which frees the wrapper.
    unsafe fn dispatch(
        &mut self,
        opcode: i32,
        index: i32,
        value: isize,
        ptr: *mut c_void,
        opt: f32,
    ) -> isize {
        match opcode {
            effSetProgram => {
                if value < 0 || !self.processor.load_program(value as u32) {
                    return 0;
                }

                self.current_program = value as u32;
                1
            }
            effGetProgram => self.current_program as isize,
            effGetProgramName => {
                self.copy_program_name(self.current_program as i32, ptr)
            }
            effGetProgramNameIndexed => self.copy_program_name(index, ptr),
            effGetParamLabel | effGetParamName | effGetParamDisplay => {
                check_null_ptr!(0, ptr);
                let Some(index) = self.parameter_index(index) else {
                    return 0;
                };

                let adapter = self.processor.adapter();
                let display;
                let text = match opcode {
                    effGetParamLabel => adapter.parameter_unit(index),
                    effGetParamName => adapter.parameter_name(index),
                    _ => {
                        display = format!("{:.6}", self.sync.published_value(index));
                        display.as_str()
                    }
                };

                let dest = std::slice::from_raw_parts_mut(ptr as *mut c_char, kVstMaxParamStrLen);
                strlcpy(dest, text);
                1
            }
            effSetSampleRate => {
                if opt > 0.0 {
                    self.processor.request_sample_rate(opt as f64);
                    if !self.processor.adapter().is_active() {
                        self.processor.apply_pending_config();
                    }
                }
                0
            }
            effSetBlockSize => {
                if value > 0 {
                    self.processor.request_buffer_size(value as u32);
                    self.buffers.resize(value as u32);
                    if !self.processor.adapter().is_active() {
                        self.processor.apply_pending_config();
                    }
                }
                0
            }
            effMainsChanged => {
                if value != 0 {
                    self.processor.apply_pending_config();
                    self.processor.adapter_mut().activate();
                    self.effect.initialDelay = self.processor.adapter().latency() as i32;
                } else {
                    self.processor.adapter_mut().deactivate();
                    self.events = ptr::null();
                }
                0
            }
            effEditGetRect => {
                check_null_ptr!(0, ptr);
                if !P::FEATURES.contains(PluginFeatures::HAS_UI) {
                    return 0;
                }

                // Hosts ask for the size before opening the editor, so this needs a temporary UI
                let (width, height) = match &self.editor {
                    Some(editor) => (editor.width(), editor.height()),
                    None => {
                        let editor = self.create_editor(None);
                        (editor.width(), editor.height())
                    }
                };
                self.editor_rect = ERect {
                    top: 0,
                    left: 0,
                    bottom: height.min(i16::MAX as u32) as i16,
                    right: width.min(i16::MAX as u32) as i16,
                };

                *(ptr as *mut *mut ERect) = &mut self.editor_rect;
                1
            }
            effEditOpen => {
                if !P::FEATURES.contains(PluginFeatures::HAS_UI) || self.editor.is_some() {
                    return 0;
                }

                let parent_window = (!ptr.is_null()).then_some(ptr as usize);
                let mut editor = self.create_editor(parent_window);
                editor.idle();
                self.editor = Some(editor);
                1
            }
            effEditClose => self.editor.take().is_some() as isize,
            effEditIdle => {
                if let Some(editor) = &mut self.editor {
                    editor.idle();
                }
                0
            }
            effGetChunk => {
                check_null_ptr!(0, ptr);

                self.chunk = encode_chunk(
                    self.processor
                        .adapter()
                        .states()
                        .iter()
                        .map(|state| (state.key.as_str(), state.value.as_str())),
                );
                *(ptr as *mut *mut c_void) = self.chunk.as_mut_ptr() as *mut c_void;
                self.chunk.len() as isize
            }
            effSetChunk => {
                check_null_ptr!(0, ptr);
                if value <= 0 {
                    return 0;
                }

                let chunk = std::slice::from_raw_parts(ptr as *const u8, value as usize);
                match decode_chunk(chunk) {
                    Ok(entries) => {
                        for (key, value) in entries {
                            if !self.processor.set_state(&key, &value) {
                                hb_warn!("Ignoring unknown state key '{}'", key);
                            }
                        }
                        1
                    }
                    Err(err) => {
                        hb_error!("Could not restore the plugin's state: {}", err);
                        0
                    }
                }
            }
            effProcessEvents => {
                self.events = ptr as *const VstEvents;
                1
            }
            effCanBeAutomated => self
                .parameter_index(index)
                .and_then(|index| self.processor.adapter().parameter(index))
                .map_or(0, |parameter| parameter.is_automatable() as isize),
            effGetPlugCategory => {
                if P::FEATURES.contains(PluginFeatures::IS_SYNTH) {
                    kPlugCategSynth
                } else {
                    kPlugCategEffect
                }
            }
            effGetEffectName => copy_string(ptr, kVstMaxEffectNameLen, P::NAME),
            effGetVendorString => copy_string(ptr, kVstMaxVendorStrLen, P::MAKER),
            effGetProductString => copy_string(ptr, kVstMaxProductStrLen, P::LABEL),
            effGetVendorVersion => P::VERSION as isize,
            effCanDo => {
                check_null_ptr!(0, ptr);

                let can_do = match CStr::from_ptr(ptr as *const c_char).to_str() {
                    Ok("receiveVstEvents" | "receiveVstMidiEvent") => {
                        P::FEATURES.contains(PluginFeatures::IS_SYNTH)
                    }
                    Ok("receiveVstTimeInfo") => P::FEATURES.contains(PluginFeatures::WANT_TIMEPOS),
                    _ => false,
                };
                can_do as isize
            }
            effGetVstVersion => kVstVersion,
            effOpen | effStartProcess | effStopProcess => 0,
            _ => 0,
        }
    }

    unsafe fn copy_program_name(&self, index: i32, ptr: *mut c_void) -> isize {
        let adapter = self.processor.adapter();
        if index < 0 || index as u32 >= adapter.program_count() {
            return 0;
        }

        copy_string(ptr, kVstMaxProgNameLen, adapter.program_name(index as u32))
    }

    fn time_pos(&self) -> TimePos {
        if !P::FEATURES.contains(PluginFeatures::WANT_TIMEPOS) {
            return TimePos::default();
        }

        let info = unsafe {
            (self.audio_master)(
                self.effect_ptr(),
                audioMasterGetTime,
                0,
                WANTED_TIME_FLAGS as isize,
                ptr::null_mut(),
                0.0,
            ) as *const VstTimeInfo
        };

        match unsafe { info.as_ref() } {
            Some(info) => time_pos_from_info(info),
            None => TimePos::default(),
        }
    }

    /// # Safety
    ///
    /// `inputs` and `outputs` must be null or contain one pointer to `frames` samples per channel.
    unsafe fn process(&mut self, inputs: *const *const f32, outputs: *const *mut f32, frames: u32) {
        if frames > self.processor.adapter().buffer_size() {
            // This reallocates on the audio thread, which should show up while debugging
            hb_debug_assert_failure!(
                "The host sent a block of {} samples, growing the buffers to match",
                frames
            );
            self.processor.request_buffer_size(frames);
            permit_alloc(|| self.buffers.resize(frames));
        }

        for (channel, input) in self.audio_inputs.iter_mut().enumerate() {
            *input = if inputs.is_null() {
                ptr::null()
            } else {
                *inputs.add(channel)
            };
        }
        for (channel, output) in self.audio_outputs.iter_mut().enumerate() {
            *output = if outputs.is_null() {
                ptr::null_mut()
            } else {
                *outputs.add(channel)
            };
        }

        let time_pos = self.time_pos();
        let events = std::mem::replace(&mut self.events, ptr::null());

        let Self {
            effect,
            processor,
            audio_inputs,
            audio_outputs,
            buffers,
            ..
        } = self;

        process_wrapper(|| {
            let (inputs, outputs) = buffers.slices(audio_inputs, audio_outputs, frames as usize);
            let mut host = EventBlock {
                events: events.as_ref(),
                initial_delay: &mut effect.initialDelay,
            };

            processor.process(&mut host, inputs, outputs, frames, &time_pos);
        });
    }
}

unsafe fn copy_string(ptr: *mut c_void, len: usize, value: &str) -> isize {
    check_null_ptr!(0, ptr);

    strlcpy(std::slice::from_raw_parts_mut(ptr as *mut c_char, len), value);
    1
}

/// Create a new instance. Returns a null pointer if the host does not implement the VST 2.4
/// `audioMasterVersion` call.
///
/// # Safety
///
/// `audio_master` must be the callback the host passed to `VSTPluginMain()`.
pub unsafe fn create_effect<P: Plugin>(audio_master: audioMasterCallback) -> *mut AEffect {
    let host_call = |opcode| audio_master(ptr::null_mut(), opcode, 0, 0, ptr::null_mut(), 0.0);
    if host_call(audioMasterVersion) == 0 {
        hb_error!("The host does not support VST 2.4");
        return ptr::null_mut();
    }

    let buffer_size = match host_call(audioMasterGetBlockSize) {
        buffer_size if buffer_size > 0 => buffer_size as u32,
        _ => DEFAULT_BUFFER_SIZE,
    };
    let sample_rate = match host_call(audioMasterGetSampleRate) {
        sample_rate if sample_rate > 0 => sample_rate as f64,
        _ => DEFAULT_SAMPLE_RATE,
    };

    let wrapper = Box::into_raw(Box::new(Wrapper::<P>::new(
        audio_master,
        buffer_size,
        sample_rate,
    )));
    (*wrapper).effect.object = wrapper as *mut c_void;

    &mut (*wrapper).effect
}

unsafe extern "C" fn dispatcher<P: Plugin>(
    effect: *mut AEffect,
    opcode: i32,
    index: i32,
    value: isize,
    ptr: *mut c_void,
    opt: f32,
) -> isize {
    check_null_ptr!(0, effect, (*effect).object);

    let wrapper = (*effect).object as *mut Wrapper<P>;
    if opcode == effClose {
        drop(Box::from_raw(wrapper));
        return 1;
    }

    (*wrapper).dispatch(opcode, index, value, ptr, opt)
}

unsafe extern "C" fn process_replacing<P: Plugin>(
    effect: *mut AEffect,
    inputs: *mut *mut f32,
    outputs: *mut *mut f32,
    frames: i32,
) {
    check_null_ptr!((), effect, (*effect).object);

    let wrapper = &mut *((*effect).object as *mut Wrapper<P>);
    wrapper.process(inputs as *const *const f32, outputs, frames.max(0) as u32);
}

unsafe extern "C" fn set_parameter<P: Plugin>(effect: *mut AEffect, index: i32, value: f32) {
    check_null_ptr!((), effect, (*effect).object);

    let wrapper = &*((*effect).object as *const Wrapper<P>);
    let Some(index) = wrapper.parameter_index(index) else {
        return;
    };
    if wrapper.processor.adapter().is_parameter_output(index) {
        return;
    }

    let plain = wrapper.ranges[index as usize].unnormalize(value);
    wrapper.sync.request_parameter_value(index, plain);
}

unsafe extern "C" fn get_parameter<P: Plugin>(effect: *mut AEffect, index: i32) -> f32 {
    check_null_ptr!(0.0, effect, (*effect).object);

    let wrapper = &*((*effect).object as *const Wrapper<P>);
    match wrapper.parameter_index(index) {
        Some(index) => {
            wrapper.ranges[index as usize].normalize(wrapper.sync.published_value(index))
        }
        None => 0.0,
    }
}
