use midi_consts::channel_event as midi;
use std::ffi::c_void;
use std::mem::{self, MaybeUninit};
use std::ptr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use vst3_sys::base::{kInvalidArgument, kNoInterface, kResultFalse, kResultOk, tresult, TBool};
use vst3_sys::base::{IBStream, IPluginBase};
use vst3_sys::utils::SharedVstPtr;
use vst3_sys::vst::{
    IAudioProcessor, IComponent, IEditController, IEventList, IParamValueQueue, IParameterChanges,
    ProcessContext, RestartFlags, TChar,
};
use vst3_sys::VST3;
use widestring::U16CStr;

use super::inner::{ProcessScratch, WrapperInner};
use super::util::{u16strlcpy, VstPtr, PROGRAM_PARAM_HASH};
use super::view::WrapperView;
use crate::midi::{MidiEvent, MidiEventList};
use crate::param::{Parameter, ParameterHints, ParameterRanges};
use crate::plugin::{PluginFeatures, Vst3Plugin};
use crate::transport::{TimePos, TimePosBbt};
use crate::wrapper::block::HostBlock;
use crate::wrapper::util::process_wrapper;

// Alias needed for the VST3 attribute macro
use vst3_sys as vst3_com;

// These constants are missing from vst3-sys, see:
// https://steinbergmedia.github.io/vst3_doc/vstinterfaces/structSteinberg_1_1Vst_1_1ProcessContext.html
const K_PLAYING: u32 = 1 << 1;
const K_PROJECT_TIME_MUSIC_VALID: u32 = 1 << 9;
const K_TEMPO_VALID: u32 = 1 << 10;
const K_TIME_SIG_VALID: u32 = 1 << 13;

/// All of these are needed to compute a bar/beat/tick position.
const WANTED_CONTEXT_FLAGS: u32 = K_PROJECT_TIME_MUSIC_VALID | K_TEMPO_VALID | K_TIME_SIG_VALID;

#[VST3(implements(IComponent, IEditController, IAudioProcessor))]
pub(crate) struct Wrapper<P: Vst3Plugin> {
    inner: Arc<WrapperInner<P>>,
}

/// The host side of a single process call.
struct Vst3Block<'a> {
    input_changes: Option<vst3_sys::VstPtr<dyn IParameterChanges>>,
    output_changes: Option<vst3_sys::VstPtr<dyn IParameterChanges>>,
    input_events: Option<vst3_sys::VstPtr<dyn IEventList>>,

    param_hashes: &'a [u32],
    ranges: &'a [ParameterRanges],
    output_values: &'a mut [f32],
    latency: Option<u32>,
}

impl<'a, 'e> HostBlock<'e> for Vst3Block<'a> {
    fn control_value(&self, index: u32) -> Option<f32> {
        let changes = self.input_changes.as_ref()?;
        let hash = *self.param_hashes.get(index as usize)?;

        unsafe { last_point(changes, hash) }
            .map(|normalized| self.ranges[index as usize].unnormalize(normalized as f32))
    }

    fn decode_events(&mut self, events: &mut MidiEventList<'e>) {
        let Some(event_list) = &self.input_events else {
            return;
        };

        unsafe {
            let num_events = event_list.get_event_count();
            let mut event = MaybeUninit::uninit();
            for i in 0..num_events {
                if event_list.get_event(i, event.as_mut_ptr()) != kResultOk {
                    hb_debug_assert_failure!("Could not read event {} from the host", i);
                    continue;
                }

                if let Some(event) = decode_event(event.assume_init_ref()) {
                    events.push(event);
                }
            }
        }
    }

    fn write_output(&mut self, index: u32, value: f32) {
        let (Some(changes), Some(&hash)) = (&self.output_changes, self.param_hashes.get(index as usize))
        else {
            return;
        };

        let normalized = self.ranges[index as usize].normalize(value);
        if self.output_values[index as usize] == normalized {
            return;
        }

        unsafe {
            let mut queue_index = 0;
            let queue = changes.add_parameter_data(&hash, &mut queue_index);
            match queue.upgrade() {
                Some(queue) => {
                    let mut point_index = 0;
                    if queue.add_point(0, normalized as f64, &mut point_index) == kResultOk {
                        self.output_values[index as usize] = normalized;
                    }
                }
                None => hb_debug_assert_failure!("The host did not create a parameter queue"),
            }
        }
    }

    fn write_latency(&mut self, latency: u32) {
        self.latency = Some(latency);
    }
}

/// The last normalized value the host sent for a parameter during this block.
unsafe fn last_point(changes: &vst3_sys::VstPtr<dyn IParameterChanges>, hash: u32) -> Option<f64> {
    for queue_index in 0..changes.get_parameter_count() {
        let Some(queue) = changes.get_parameter_data(queue_index).upgrade() else {
            continue;
        };
        if queue.get_parameter_id() != hash {
            continue;
        }

        let num_points = queue.get_point_count();
        let mut sample_offset = 0i32;
        let mut value = 0.0f64;
        if num_points > 0 && queue.get_point(num_points - 1, &mut sample_offset, &mut value) == kResultOk
        {
            return Some(value);
        }
    }

    None
}

/// Convert a note or polyphonic pressure event to MIDI. Everything else is skipped.
fn decode_event(event: &vst3_sys::vst::Event) -> Option<MidiEvent<'static>> {
    let frame = event.sample_offset.max(0) as u32;
    let to_7bit = |value: f32| (value * 127.0).round().clamp(0.0, 127.0) as u8;

    unsafe {
        if event.type_ == vst3_sys::vst::EventTypes::kNoteOnEvent as u16 {
            let event = event.event.note_on;
            let (channel, note) = midi_key(event.channel, event.pitch)?;

            // A velocity of zero would turn this into a note off
            MidiEvent::note_on(frame, channel, note, to_7bit(event.velocity).max(1))
        } else if event.type_ == vst3_sys::vst::EventTypes::kNoteOffEvent as u16 {
            let event = event.event.note_off;
            let (channel, note) = midi_key(event.channel, event.pitch)?;

            MidiEvent::note_off(frame, channel, note, to_7bit(event.velocity))
        } else if event.type_ == vst3_sys::vst::EventTypes::kPolyPressureEvent as u16 {
            let event = event.event.poly_pressure;
            let (channel, note) = midi_key(event.channel, event.pitch)?;

            MidiEvent::from_channel_message(
                frame,
                midi::POLYPHONIC_KEY_PRESSURE,
                channel,
                note,
                to_7bit(event.pressure),
            )
        } else {
            None
        }
    }
}

fn midi_key(channel: i16, pitch: i16) -> Option<(u8, u8)> {
    if (0..16).contains(&channel) && (0..128).contains(&pitch) {
        Some((channel as u8, pitch as u8))
    } else {
        None
    }
}

/// Convert the host's process context to the plugin's transport information. Bar, beat, and tick
/// are only filled in when the host provides the musical position, the tempo, and the time
/// signature.
pub fn time_pos_from_context(context: &ProcessContext) -> TimePos {
    let mut time_pos = TimePos {
        playing: context.state & K_PLAYING != 0,
        frame: context.project_time_samples.max(0) as u64,
        ..TimePos::default()
    };

    if context.state & K_TEMPO_VALID != 0 {
        time_pos.bpm = context.tempo;
    }
    if context.state & WANTED_CONTEXT_FLAGS == WANTED_CONTEXT_FLAGS {
        time_pos.bbt = TimePosBbt::from_quarter_notes(
            context.project_time_music,
            context.time_sig_num as f32,
            context.time_sig_den as f32,
        );
    }

    time_pos.validate_bbt();
    time_pos
}

/// The text shown for a parameter's value.
fn format_value(parameter: &Parameter, value: f32) -> String {
    if parameter
        .hints
        .intersects(ParameterHints::BOOLEAN | ParameterHints::INTEGER)
    {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

/// The number of discrete steps the host should show for a parameter, or 0 for continuous
/// parameters.
fn step_count(parameter: &Parameter) -> i32 {
    if parameter.hints.contains(ParameterHints::BOOLEAN) {
        1
    } else if parameter.hints.contains(ParameterHints::INTEGER) {
        (parameter.ranges.max - parameter.ranges.min).round().max(0.0) as i32
    } else {
        0
    }
}

impl<P: Vst3Plugin> Wrapper<P> {
    pub fn new() -> Box<Self> {
        Self::allocate(WrapperInner::new())
    }

    fn audio_bus_channels(&self, dir: vst3_sys::vst::BusDirection) -> u32 {
        if dir == vst3_sys::vst::BusDirections::kInput as i32 {
            P::NUM_INPUTS
        } else {
            P::NUM_OUTPUTS
        }
    }

    fn has_midi_input() -> bool {
        P::FEATURES.contains(PluginFeatures::IS_SYNTH)
    }

    /// Clear the host's outputs. Used when the plugin cannot be locked for this block.
    unsafe fn clear_outputs(data: &vst3_sys::vst::ProcessData) {
        if data.num_outputs <= 0 || data.outputs.is_null() {
            return;
        }

        let outputs = &*data.outputs;
        let channels = outputs.buffers as *const *mut f32;
        if channels.is_null() {
            return;
        }

        for channel in 0..outputs.num_channels.max(0) as usize {
            let channel = *channels.add(channel);
            if !channel.is_null() {
                ptr::write_bytes(channel, 0, data.num_samples.max(0) as usize);
            }
        }
    }
}

impl<P: Vst3Plugin> IPluginBase for Wrapper<P> {
    unsafe fn initialize(&self, _context: *mut c_void) -> tresult {
        kResultOk
    }

    unsafe fn terminate(&self) -> tresult {
        kResultOk
    }
}

impl<P: Vst3Plugin> IComponent for Wrapper<P> {
    unsafe fn get_controller_class_id(&self, _tuid: *mut vst3_sys::IID) -> tresult {
        // The component is its own edit controller
        kNoInterface
    }

    unsafe fn set_io_mode(&self, _mode: vst3_sys::vst::IoMode) -> tresult {
        kResultOk
    }

    unsafe fn get_bus_count(
        &self,
        type_: vst3_sys::vst::MediaType,
        dir: vst3_sys::vst::BusDirection,
    ) -> i32 {
        match type_ {
            x if x == vst3_sys::vst::MediaTypes::kAudio as i32 => {
                (self.audio_bus_channels(dir) > 0) as i32
            }
            x if x == vst3_sys::vst::MediaTypes::kEvent as i32
                && dir == vst3_sys::vst::BusDirections::kInput as i32
                && Self::has_midi_input() =>
            {
                1
            }
            _ => 0,
        }
    }

    unsafe fn get_bus_info(
        &self,
        type_: vst3_sys::vst::MediaType,
        dir: vst3_sys::vst::BusDirection,
        index: i32,
        info: *mut vst3_sys::vst::BusInfo,
    ) -> tresult {
        check_null_ptr!(kInvalidArgument, info);

        match (type_, index) {
            (t, 0) if t == vst3_sys::vst::MediaTypes::kAudio as i32 => {
                let num_channels = self.audio_bus_channels(dir);
                if num_channels == 0 {
                    return kInvalidArgument;
                }

                *info = mem::zeroed();

                let info = &mut *info;
                info.media_type = vst3_sys::vst::MediaTypes::kAudio as i32;
                info.bus_type = vst3_sys::vst::BusTypes::kMain as i32;
                info.flags = vst3_sys::vst::BusFlags::kDefaultActive as u32;
                info.direction = dir;
                info.channel_count = num_channels as i32;
                if dir == vst3_sys::vst::BusDirections::kInput as i32 {
                    u16strlcpy(&mut info.name, "Input");
                } else {
                    u16strlcpy(&mut info.name, "Output");
                }

                kResultOk
            }
            (t, 0)
                if t == vst3_sys::vst::MediaTypes::kEvent as i32
                    && dir == vst3_sys::vst::BusDirections::kInput as i32
                    && Self::has_midi_input() =>
            {
                *info = mem::zeroed();

                let info = &mut *info;
                info.media_type = vst3_sys::vst::MediaTypes::kEvent as i32;
                info.direction = vst3_sys::vst::BusDirections::kInput as i32;
                info.channel_count = 16;
                u16strlcpy(&mut info.name, "MIDI");
                info.bus_type = vst3_sys::vst::BusTypes::kMain as i32;
                info.flags = vst3_sys::vst::BusFlags::kDefaultActive as u32;

                kResultOk
            }
            _ => kInvalidArgument,
        }
    }

    unsafe fn get_routing_info(
        &self,
        in_info: *mut vst3_sys::vst::RoutingInfo,
        out_info: *mut vst3_sys::vst::RoutingInfo,
    ) -> tresult {
        check_null_ptr!(kInvalidArgument, in_info, out_info);

        *out_info = mem::zeroed();

        let in_info = &*in_info;
        let out_info = &mut *out_info;
        match (in_info.media_type, in_info.bus_index) {
            (t, 0) if t == vst3_sys::vst::MediaTypes::kAudio as i32 && P::NUM_OUTPUTS > 0 => {
                out_info.media_type = vst3_sys::vst::MediaTypes::kAudio as i32;
                out_info.bus_index = in_info.bus_index;
                out_info.channel = in_info.channel;

                kResultOk
            }
            _ => kResultFalse,
        }
    }

    unsafe fn activate_bus(
        &self,
        type_: vst3_sys::vst::MediaType,
        dir: vst3_sys::vst::BusDirection,
        index: i32,
        _state: TBool,
    ) -> tresult {
        match (type_, index) {
            (t, 0)
                if t == vst3_sys::vst::MediaTypes::kAudio as i32
                    && self.audio_bus_channels(dir) > 0 =>
            {
                kResultOk
            }
            (t, 0)
                if t == vst3_sys::vst::MediaTypes::kEvent as i32
                    && dir == vst3_sys::vst::BusDirections::kInput as i32
                    && Self::has_midi_input() =>
            {
                kResultOk
            }
            _ => kInvalidArgument,
        }
    }

    unsafe fn set_active(&self, state: TBool) -> tresult {
        let latency = {
            let mut processor = self.inner.processor.lock();
            if state != 0 {
                processor.apply_pending_config();
                processor.adapter_mut().activate();
            } else {
                processor.adapter_mut().deactivate();
            }

            processor.adapter().latency()
        };

        self.inner.update_latency(latency);
        self.inner.notify_host();

        kResultOk
    }

    unsafe fn set_state(&self, state: SharedVstPtr<dyn IBStream>) -> tresult {
        check_null_ptr!(kInvalidArgument, state);
        let Some(state) = state.upgrade() else {
            return kInvalidArgument;
        };

        // We need to know how large the state is before we can read it. The current position can be
        // zero, but it can also be something else. Bitwig prepends the preset header in the stream,
        // while some other hosts don't expose that to the plugin.
        let mut current_pos = 0;
        let mut eof_pos = 0;
        if state.tell(&mut current_pos) != kResultOk
            || state.seek(0, vst3_sys::base::kIBSeekEnd, &mut eof_pos) != kResultOk
            || state.seek(current_pos, vst3_sys::base::kIBSeekSet, ptr::null_mut()) != kResultOk
        {
            hb_debug_assert_failure!("Could not get the stream length");
            return kResultFalse;
        }

        let stream_byte_size = (eof_pos - current_pos).max(0) as usize;
        let mut num_bytes_read = 0;
        let mut read_buffer: Vec<u8> = vec![0; stream_byte_size];
        state.read(
            read_buffer.as_mut_ptr() as *mut c_void,
            read_buffer.len() as i32,
            &mut num_bytes_read,
        );

        // If the size is zero, some hosts will always return `kResultFalse` even if the read was
        // 'successful', so we can't check the return value but we can check the number of bytes
        // read.
        if num_bytes_read as usize != stream_byte_size {
            hb_debug_assert_failure!("Unexpected stream length");
            return kResultFalse;
        }

        match self.inner.load_state(&read_buffer) {
            Ok(()) => {
                self.inner
                    .restart_component(RestartFlags::kParamValuesChanged as i32);
                self.inner.notify_host();

                kResultOk
            }
            Err(err) => {
                hb_error!("Could not restore the plugin's state: {}", err);
                kResultFalse
            }
        }
    }

    unsafe fn get_state(&self, state: SharedVstPtr<dyn IBStream>) -> tresult {
        check_null_ptr!(kInvalidArgument, state);
        let Some(state) = state.upgrade() else {
            return kInvalidArgument;
        };

        match self.inner.save_state() {
            Ok(serialized) => {
                let mut num_bytes_written = 0;
                let result = state.write(
                    serialized.as_ptr() as *const c_void,
                    serialized.len() as i32,
                    &mut num_bytes_written,
                );

                hb_debug_assert_eq!(result, kResultOk);
                hb_debug_assert_eq!(num_bytes_written as usize, serialized.len());
                kResultOk
            }
            Err(err) => {
                hb_debug_assert_failure!("Could not save state: {}", err);
                kResultFalse
            }
        }
    }
}

impl<P: Vst3Plugin> IEditController for Wrapper<P> {
    unsafe fn set_component_state(&self, _state: SharedVstPtr<dyn IBStream>) -> tresult {
        // We have a single file component, so we don't need to do anything here
        kResultOk
    }

    unsafe fn set_state(&self, _state: SharedVstPtr<dyn IBStream>) -> tresult {
        // The plugin's state will have been restored through the component
        kResultOk
    }

    unsafe fn get_state(&self, _state: SharedVstPtr<dyn IBStream>) -> tresult {
        kResultOk
    }

    unsafe fn get_parameter_count(&self) -> i32 {
        // The program list parameter comes after the plugin's own parameters
        self.inner.param_hashes.len() as i32 + self.inner.has_programs() as i32
    }

    unsafe fn get_parameter_info(
        &self,
        param_index: i32,
        info: *mut vst3_sys::vst::ParameterInfo,
    ) -> tresult {
        check_null_ptr!(kInvalidArgument, info);

        if param_index < 0 || param_index >= self.get_parameter_count() {
            return kInvalidArgument;
        }

        *info = mem::zeroed();

        let info = &mut *info;
        info.unit_id = vst3_sys::vst::kRootUnitId;
        match self.inner.info.parameters.get(param_index as usize) {
            Some(parameter) => {
                info.id = self.inner.param_hashes[param_index as usize];
                u16strlcpy(&mut info.title, &parameter.name);
                u16strlcpy(&mut info.short_title, &parameter.name);
                u16strlcpy(&mut info.units, &parameter.unit);
                info.step_count = step_count(parameter);
                info.default_normalized_value = parameter.ranges.normalized_default() as f64;
                info.flags = if parameter.is_output() {
                    vst3_sys::vst::ParameterFlags::kIsReadOnly as i32
                } else if parameter.is_automatable() {
                    vst3_sys::vst::ParameterFlags::kCanAutomate as i32
                } else {
                    0
                };
            }
            None => {
                info.id = *PROGRAM_PARAM_HASH;
                u16strlcpy(&mut info.title, "Program");
                u16strlcpy(&mut info.short_title, "Program");
                info.step_count = self.inner.program_count() as i32 - 1;
                info.default_normalized_value = 0.0;
                info.flags = vst3_sys::vst::ParameterFlags::kCanAutomate as i32
                    | vst3_sys::vst::ParameterFlags::kIsList as i32
                    | 1 << 15; // kIsProgramChange
            }
        }

        kResultOk
    }

    unsafe fn get_param_string_by_value(
        &self,
        id: u32,
        value_normalized: f64,
        string: *mut TChar,
    ) -> tresult {
        check_null_ptr!(kInvalidArgument, string);

        // Somehow there's no length there, so we'll assume our own maximum
        let dest = &mut *(string as *mut [TChar; 128]);

        if id == *PROGRAM_PARAM_HASH && self.inner.has_programs() {
            let program = self.inner.normalized_to_program(value_normalized);
            u16strlcpy(dest, &self.inner.info.program_names[program as usize]);

            kResultOk
        } else if let Some(index) = self.inner.param_index(id) {
            let parameter = &self.inner.info.parameters[index as usize];
            let value = parameter.ranges.unnormalize(value_normalized as f32);
            u16strlcpy(dest, &format_value(parameter, value));

            kResultOk
        } else {
            kInvalidArgument
        }
    }

    unsafe fn get_param_value_by_string(
        &self,
        id: u32,
        string: *const TChar,
        value_normalized: *mut f64,
    ) -> tresult {
        check_null_ptr!(kInvalidArgument, string, value_normalized);

        let string = match U16CStr::from_ptr_str(string as *const u16).to_string() {
            Ok(s) => s,
            Err(_) => return kInvalidArgument,
        };

        if id == *PROGRAM_PARAM_HASH && self.inner.has_programs() {
            match self
                .inner
                .info
                .program_names
                .iter()
                .position(|name| name == &string)
            {
                Some(program) => {
                    *value_normalized = self.inner.program_to_normalized(program as u32);
                    kResultOk
                }
                None => kResultFalse,
            }
        } else if let Some(index) = self.inner.param_index(id) {
            let ranges = &self.inner.ranges[index as usize];
            match string.trim().parse::<f32>() {
                Ok(value) => {
                    *value_normalized = ranges.normalize(value) as f64;
                    kResultOk
                }
                Err(_) => kResultFalse,
            }
        } else {
            kInvalidArgument
        }
    }

    unsafe fn normalized_param_to_plain(&self, id: u32, value_normalized: f64) -> f64 {
        if id == *PROGRAM_PARAM_HASH && self.inner.has_programs() {
            self.inner.normalized_to_program(value_normalized) as f64
        } else if let Some(index) = self.inner.param_index(id) {
            self.inner.ranges[index as usize].unnormalize(value_normalized as f32) as f64
        } else {
            0.5
        }
    }

    unsafe fn plain_param_to_normalized(&self, id: u32, plain_value: f64) -> f64 {
        if id == *PROGRAM_PARAM_HASH && self.inner.has_programs() {
            self.inner
                .program_to_normalized(plain_value.round().max(0.0) as u32)
        } else if let Some(index) = self.inner.param_index(id) {
            self.inner.ranges[index as usize].normalize(plain_value as f32) as f64
        } else {
            0.5
        }
    }

    unsafe fn get_param_normalized(&self, id: u32) -> f64 {
        if id == *PROGRAM_PARAM_HASH && self.inner.has_programs() {
            self.inner
                .program_to_normalized(self.inner.current_program().unwrap_or(0))
        } else if let Some(index) = self.inner.param_index(id) {
            self.inner.normalized_value(index) as f64
        } else {
            0.5
        }
    }

    unsafe fn set_param_normalized(&self, id: u32, value: f64) -> tresult {
        // If the plugin is currently processing audio, then this parameter change will also be sent
        // to the process function
        if self.inner.is_processing.load(Ordering::SeqCst) {
            return kResultOk;
        }

        if id == *PROGRAM_PARAM_HASH && self.inner.has_programs() {
            let program = self.inner.normalized_to_program(value);
            if self.inner.current_program() != Some(program) {
                self.inner.load_program(program);
            }

            kResultOk
        } else if let Some(index) = self.inner.param_index(id) {
            if !self.inner.info.parameters[index as usize].is_output() {
                self.inner.set_normalized_value(index, value as f32);
            }

            kResultOk
        } else {
            kInvalidArgument
        }
    }

    unsafe fn set_component_handler(
        &self,
        handler: SharedVstPtr<dyn vst3_sys::vst::IComponentHandler>,
    ) -> tresult {
        *self.inner.component_handler.write() = handler.upgrade().map(VstPtr::from);

        kResultOk
    }

    unsafe fn create_view(&self, _name: vst3_sys::base::FIDString) -> *mut c_void {
        if P::FEATURES.contains(PluginFeatures::HAS_UI) {
            Box::into_raw(WrapperView::new(self.inner.clone())) as *mut vst3_sys::c_void
        } else {
            ptr::null_mut()
        }
    }
}

impl<P: Vst3Plugin> IAudioProcessor for Wrapper<P> {
    unsafe fn set_bus_arrangements(
        &self,
        inputs: *mut vst3_sys::vst::SpeakerArrangement,
        num_ins: i32,
        outputs: *mut vst3_sys::vst::SpeakerArrangement,
        num_outs: i32,
    ) -> tresult {
        // The plugin has a fixed channel layout, so the only arrangement we accept is our own
        let matches = |arrangements: *mut vst3_sys::vst::SpeakerArrangement,
                       count: i32,
                       num_channels: u32| {
            if num_channels == 0 {
                count == 0
            } else {
                count == 1 && !arrangements.is_null() && (*arrangements).count_ones() == num_channels
            }
        };

        if matches(inputs, num_ins, P::NUM_INPUTS) && matches(outputs, num_outs, P::NUM_OUTPUTS) {
            kResultOk
        } else {
            kResultFalse
        }
    }

    unsafe fn get_bus_arrangement(
        &self,
        dir: vst3_sys::vst::BusDirection,
        index: i32,
        arr: *mut vst3_sys::vst::SpeakerArrangement,
    ) -> tresult {
        check_null_ptr!(kInvalidArgument, arr);

        let num_channels = self.audio_bus_channels(dir);
        if index != 0 || num_channels == 0 {
            return kInvalidArgument;
        }

        *arr = match num_channels {
            1 => vst3_sys::vst::kMono,
            2 => vst3_sys::vst::kStereo,
            n => (1 << n) - 1,
        };

        kResultOk
    }

    unsafe fn can_process_sample_size(&self, symbolic_sample_size: i32) -> tresult {
        if symbolic_sample_size == vst3_sys::vst::SymbolicSampleSizes::kSample32 as i32 {
            kResultOk
        } else {
            kResultFalse
        }
    }

    unsafe fn get_latency_samples(&self) -> u32 {
        self.inner.current_latency.load(Ordering::Relaxed)
    }

    unsafe fn setup_processing(&self, setup: *const vst3_sys::vst::ProcessSetup) -> tresult {
        check_null_ptr!(kInvalidArgument, setup);

        let setup = &*setup;
        if setup.symbolic_sample_size != vst3_sys::vst::SymbolicSampleSizes::kSample32 as i32 {
            return kResultFalse;
        }

        let max_buffer_size = setup.max_samples_per_block.max(1) as u32;
        {
            let mut processor = self.inner.processor.lock();
            processor.request_sample_rate(setup.sample_rate);
            self.inner
                .current_sample_rate
                .store(setup.sample_rate, Ordering::Relaxed);
            processor.request_buffer_size(max_buffer_size);
            if !processor.adapter().is_active() {
                processor.apply_pending_config();
            }
        }

        match self.inner.scratch.try_borrow_mut() {
            Ok(mut scratch) => scratch.buffers.resize(max_buffer_size),
            Err(_) => hb_debug_assert_failure!("The host called setupProcessing() while processing"),
        }

        kResultOk
    }

    unsafe fn set_processing(&self, state: TBool) -> tresult {
        self.inner.is_processing.store(state != 0, Ordering::SeqCst);
        if state == 0 {
            self.inner.notify_host();
        }

        kResultOk
    }

    unsafe fn process(&self, data: *mut vst3_sys::vst::ProcessData) -> tresult {
        check_null_ptr!(kInvalidArgument, data);

        // Panic on allocations if the `assert_process_allocs` feature has been enabled, and make
        // sure that FTZ is set up correctly
        process_wrapper(|| {
            let data = &*data;
            hb_debug_assert_eq!(
                data.symbolic_sample_size,
                vst3_sys::vst::SymbolicSampleSizes::kSample32 as i32
            );

            let Some(mut processor) = self.inner.processor.try_lock() else {
                Self::clear_outputs(data);
                return kResultOk;
            };
            let Ok(mut scratch) = self.inner.scratch.try_borrow_mut() else {
                hb_debug_assert_failure!("Concurrent process calls");
                return kResultFalse;
            };
            let ProcessScratch {
                buffers,
                output_values,
            } = &mut *scratch;

            let mut host = Vst3Block {
                input_changes: data.input_param_changes.upgrade(),
                output_changes: data.output_param_changes.upgrade(),
                input_events: if Self::has_midi_input() {
                    data.input_events.upgrade()
                } else {
                    None
                },

                param_hashes: &self.inner.param_hashes,
                ranges: &self.inner.ranges,
                output_values,
                latency: None,
            };

            if self.inner.has_programs() {
                if let Some(normalized) = host
                    .input_changes
                    .as_ref()
                    .and_then(|changes| last_point(changes, *PROGRAM_PARAM_HASH))
                {
                    let program = self.inner.normalized_to_program(normalized);
                    if self.inner.current_program() != Some(program) && processor.load_program(program) {
                        self.inner.current_program.store(program, Ordering::Relaxed);
                    }
                }
            }

            let time_pos = if data.context.is_null() {
                TimePos::default()
            } else {
                time_pos_from_context(&*data.context)
            };

            // Parameter flushes come without any audio buses
            let frames = data.num_samples.max(0) as u32;
            let (input_ptrs, num_inputs) = if data.num_inputs > 0 && !data.inputs.is_null() {
                let bus = &*data.inputs;
                (bus.buffers as *const *const f32, bus.num_channels.max(0) as usize)
            } else {
                (ptr::null(), 0)
            };
            let (output_ptrs, num_outputs) = if data.num_outputs > 0 && !data.outputs.is_null() {
                let bus = &*data.outputs;
                (bus.buffers as *const *mut f32, bus.num_channels.max(0) as usize)
            } else {
                (ptr::null(), 0)
            };
            let frames = if num_outputs == 0 && P::NUM_OUTPUTS > 0 { 0 } else { frames };

            let (inputs, outputs) = buffers.slices_from_arrays(
                input_ptrs,
                num_inputs,
                output_ptrs,
                num_outputs,
                frames as usize,
            );
            processor.process(&mut host, inputs, outputs, frames, &time_pos);

            if let Some(latency) = host.latency {
                self.inner.update_latency(latency);
            }

            kResultOk
        })
    }

    unsafe fn get_tail_samples(&self) -> u32 {
        0
    }
}
