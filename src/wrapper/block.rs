//! The per-block processing sequence shared by every wrapper. A wrapper only has to implement
//! [`HostBlock`] for its host's way of passing control values and events. [`BlockProcessor`] then
//! makes sure parameter changes, events, the actual processing, and the output flush always
//! happen in the same order regardless of the plugin format.

use std::ptr;
use std::sync::Arc;

use crate::context::PluginApi;
use crate::midi::{MidiEvent, MidiEventList};
use crate::plugin::{Plugin, PluginConfig, PluginFeatures};
use crate::sync::{ParamSync, SyncNote};
use crate::transport::TimePos;
use crate::util::permit_alloc;
use crate::wrapper::adapter::PluginAdapter;

/// The host side of a single block. Implemented by every wrapper for its own port or event
/// representation.
pub trait HostBlock<'e> {
    /// The host's current value for a non-output parameter, if the host provides one for this
    /// block. Port based formats always return the port's value, event based formats only return
    /// values the host changed during this block.
    fn control_value(&self, index: u32) -> Option<f32>;

    /// Decode the host's events for this block into `events`. Unsupported events should be
    /// skipped. The events don't have to be sorted, and their timings are clamped afterwards.
    fn decode_events(&mut self, events: &mut MidiEventList<'e>);

    /// Write an output parameter's value back to the host.
    fn write_output(&mut self, index: u32, value: f32);

    /// Report the plugin's latency to the host. Only called for plugins with
    /// [`PluginFeatures::WANT_LATENCY`].
    fn write_latency(&mut self, _latency: u32) {}
}

/// The stages of [`BlockProcessor::process()`]. Every block starts and ends in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStage {
    Idle,
    ParametersApplied,
    AudioProcessed,
    OutputsFlushed,
}

/// What a port in a fixed port layout is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortKind {
    AudioInput(u32),
    AudioOutput(u32),
    EventInput,
    EventOutput,
    Latency,
    SampleRate,
    Parameter(u32),
}

/// Port numbering for formats that expose everything as numbered ports (LADSPA, DSSI, and LV2).
/// Ports always come in the order audio inputs, audio outputs, event ports, latency, sample rate,
/// and finally the parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortLayout {
    pub audio_inputs: u32,
    pub audio_outputs: u32,
    pub event_input: bool,
    pub event_output: bool,
    pub latency: bool,
    pub sample_rate: bool,
    pub parameters: u32,
}

impl PortLayout {
    pub fn ladspa<P: Plugin>() -> Self {
        Self {
            audio_inputs: P::NUM_INPUTS,
            audio_outputs: P::NUM_OUTPUTS,
            event_input: false,
            event_output: false,
            latency: P::FEATURES.contains(PluginFeatures::WANT_LATENCY),
            sample_rate: false,
            parameters: P::PARAMETER_COUNT,
        }
    }

    /// The LADSPA layout, plus a sample rate readout port for plugins with a UI. The out of
    /// process UI uses that to learn the host's sample rate.
    pub fn dssi<P: Plugin>() -> Self {
        Self {
            sample_rate: P::FEATURES.contains(PluginFeatures::HAS_UI),
            ..Self::ladspa::<P>()
        }
    }

    pub fn lv2<P: Plugin>() -> Self {
        Self {
            event_input: P::FEATURES.intersects(
                PluginFeatures::IS_SYNTH | PluginFeatures::WANT_STATE | PluginFeatures::WANT_TIMEPOS,
            ),
            event_output: P::FEATURES.contains(PluginFeatures::WANT_STATE),
            ..Self::ladspa::<P>()
        }
    }

    /// The index of the first parameter port.
    pub fn parameter_offset(&self) -> u32 {
        self.audio_inputs
            + self.audio_outputs
            + self.event_input as u32
            + self.event_output as u32
            + self.latency as u32
            + self.sample_rate as u32
    }

    pub fn port_count(&self) -> u32 {
        self.parameter_offset() + self.parameters
    }

    pub fn parameter_port(&self, index: u32) -> u32 {
        self.parameter_offset() + index
    }

    /// The port index of the latency port, if there is one.
    pub fn latency_port(&self) -> Option<u32> {
        self.latency.then(|| {
            self.audio_inputs + self.audio_outputs + self.event_input as u32 + self.event_output as u32
        })
    }

    /// The port index of the sample rate readout port, if there is one.
    pub fn sample_rate_port(&self) -> Option<u32> {
        self.sample_rate
            .then(|| self.parameter_offset() - 1)
    }

    pub fn kind(&self, port: u32) -> Option<PortKind> {
        let mut start = 0;
        if port < start + self.audio_inputs {
            return Some(PortKind::AudioInput(port - start));
        }
        start += self.audio_inputs;

        if port < start + self.audio_outputs {
            return Some(PortKind::AudioOutput(port - start));
        }
        start += self.audio_outputs;

        let single_ports = [
            (self.event_input, PortKind::EventInput),
            (self.event_output, PortKind::EventOutput),
            (self.latency, PortKind::Latency),
            (self.sample_rate, PortKind::SampleRate),
        ];
        for (exists, kind) in single_ports {
            if exists {
                if port == start {
                    return Some(kind);
                }
                start += 1;
            }
        }

        if port < start + self.parameters {
            Some(PortKind::Parameter(port - start))
        } else {
            None
        }
    }
}

/// Turns the host's raw channel pointers into the slices passed to the plugin without allocating.
/// Inputs that alias an output (in-place processing) and inputs the host did not connect are
/// backed by our own storage, so the plugin never sees overlapping slices.
pub struct AudioBuffers {
    /// The `'static` lifetimes are shortened to the borrow of `self` in
    /// [`slices()`][Self::slices()].
    input_slices: Vec<&'static [f32]>,
    output_slices: Vec<&'static mut [f32]>,

    input_storage: Vec<Vec<f32>>,
    /// Written to in place of outputs the host did not connect.
    output_storage: Vec<Vec<f32>>,
}

// SAFETY: The slices are only ever populated inside of `slices()`, and they cannot outlive the
//         borrow returned from it.
unsafe impl Send for AudioBuffers {}
unsafe impl Sync for AudioBuffers {}

impl AudioBuffers {
    pub fn new(num_inputs: u32, num_outputs: u32, max_buffer_size: u32) -> Self {
        let max_buffer_size = max_buffer_size as usize;

        Self {
            input_slices: Vec::with_capacity(num_inputs as usize),
            output_slices: Vec::with_capacity(num_outputs as usize),

            input_storage: vec![vec![0.0; max_buffer_size]; num_inputs as usize],
            output_storage: vec![vec![0.0; max_buffer_size]; num_outputs as usize],
        }
    }

    /// Resize the backing storage. This allocates, so it must not be called from the audio
    /// thread.
    pub fn resize(&mut self, max_buffer_size: u32) {
        for channel in self.input_storage.iter_mut().chain(self.output_storage.iter_mut()) {
            channel.resize(max_buffer_size as usize, 0.0);
        }
    }

    /// Create slices of `frames` samples for the host's channel pointers. Null pointers are
    /// allowed.
    ///
    /// # Safety
    ///
    /// Every non-null pointer must point to at least `frames` samples that remain valid for the
    /// lifetime of the returned slices. Output pointers must not alias each other.
    pub unsafe fn slices<'a>(
        &'a mut self,
        inputs: &[*const f32],
        outputs: &[*mut f32],
        frames: usize,
    ) -> (&'a [&'a [f32]], &'a mut [&'a mut [f32]]) {
        hb_debug_assert_eq!(inputs.len(), self.input_storage.len());
        hb_debug_assert_eq!(outputs.len(), self.output_storage.len());

        self.slices_with(
            |channel| inputs.get(channel).copied().unwrap_or(ptr::null()),
            |channel| outputs.get(channel).copied().unwrap_or(ptr::null_mut()),
            frames,
        )
    }

    /// The same as [`slices()`][Self::slices()], but for a host that passes a pointer to an array
    /// of `num_inputs` and `num_outputs` channel pointers. Channels the host does not provide are
    /// treated as disconnected.
    ///
    /// # Safety
    ///
    /// The arrays must be null or contain the given number of pointers, with the same requirements
    /// as [`slices()`][Self::slices()].
    pub unsafe fn slices_from_arrays<'a>(
        &'a mut self,
        inputs: *const *const f32,
        num_inputs: usize,
        outputs: *const *mut f32,
        num_outputs: usize,
        frames: usize,
    ) -> (&'a [&'a [f32]], &'a mut [&'a mut [f32]]) {
        self.slices_with(
            |channel| {
                if inputs.is_null() || channel >= num_inputs {
                    ptr::null()
                } else {
                    *inputs.add(channel)
                }
            },
            |channel| {
                if outputs.is_null() || channel >= num_outputs {
                    ptr::null_mut()
                } else {
                    *outputs.add(channel)
                }
            },
            frames,
        )
    }

    unsafe fn slices_with<'a>(
        &'a mut self,
        input: impl Fn(usize) -> *const f32,
        output: impl Fn(usize) -> *mut f32,
        frames: usize,
    ) -> (&'a [&'a [f32]], &'a mut [&'a mut [f32]]) {
        // Hosts are allowed to exceed the maximum block size they announced
        if self
            .input_storage
            .iter()
            .chain(self.output_storage.iter())
            .any(|channel| channel.len() < frames)
        {
            hb_debug_assert_failure!(
                "The host exceeded its maximum block size ({} samples)",
                frames
            );
            permit_alloc(|| self.resize(frames as u32));
        }

        let num_outputs = self.output_storage.len();

        self.input_slices.clear();
        for (channel, storage) in self.input_storage.iter_mut().enumerate() {
            let input = input(channel);
            let storage = &mut storage[..frames];
            if input.is_null() {
                storage.fill(0.0);
            } else if (0..num_outputs).any(|channel| output(channel) as *const f32 == input) {
                storage.copy_from_slice(std::slice::from_raw_parts(input, frames));
            } else {
                self.input_slices
                    .push(std::slice::from_raw_parts(input, frames));
                continue;
            }

            self.input_slices
                .push(&*(storage as *const [f32]));
        }

        self.output_slices.clear();
        for (channel, storage) in self.output_storage.iter_mut().enumerate() {
            let output = output(channel);
            if output.is_null() {
                self.output_slices
                    .push(&mut *(&mut storage[..frames] as *mut [f32]));
            } else {
                self.output_slices
                    .push(std::slice::from_raw_parts_mut(output, frames));
            }
        }

        // SAFETY: Shortening the slices' lifetimes is sound, `&mut` is just invariant over them
        let output_slices: &'a mut [&'a mut [f32]] =
            std::mem::transmute(self.output_slices.as_mut_slice());

        (self.input_slices.as_slice(), output_slices)
    }
}

/// Drives a [`PluginAdapter`] through the per-block sequence and keeps the host facing parameter
/// cache in sync with both the host and the UI.
pub struct BlockProcessor<P: Plugin> {
    adapter: PluginAdapter<P>,
    sync: Arc<ParamSync>,

    /// The last value the host sent for every parameter, or the last value the plugin produced
    /// for output parameters.
    host_values: Box<[f32]>,
    /// Reused when swapping in state values from the UI.
    state_scratch: String,

    pending_buffer_size: Option<u32>,
    pending_sample_rate: Option<f64>,

    stage: BlockStage,
}

impl<P: Plugin> BlockProcessor<P> {
    pub fn new(plugin_api: PluginApi, config: PluginConfig) -> Self {
        let adapter = PluginAdapter::new(plugin_api, config);
        let sync = Arc::new(ParamSync::new(adapter.info()));
        let host_values = (0..adapter.parameter_count())
            .map(|index| adapter.parameter_value(index))
            .collect();

        Self {
            adapter,
            sync,

            host_values,
            state_scratch: String::new(),

            pending_buffer_size: None,
            pending_sample_rate: None,

            stage: BlockStage::Idle,
        }
    }

    pub fn adapter(&self) -> &PluginAdapter<P> {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut PluginAdapter<P> {
        &mut self.adapter
    }

    /// The DSP to UI channel for this instance.
    pub fn sync(&self) -> &Arc<ParamSync> {
        &self.sync
    }

    pub fn stage(&self) -> BlockStage {
        self.stage
    }

    /// The cached host value for a parameter. After a program change this is the value the host's
    /// port should be updated to.
    pub fn host_value(&self, index: u32) -> f32 {
        self.host_values.get(index as usize).copied().unwrap_or(0.0)
    }

    /// Change the maximum block size at the start of the next block.
    pub fn request_buffer_size(&mut self, buffer_size: u32) {
        self.pending_buffer_size = Some(buffer_size);
    }

    /// Change the sample rate at the start of the next block.
    pub fn request_sample_rate(&mut self, sample_rate: f64) {
        self.pending_sample_rate = Some(sample_rate);
    }

    /// Apply pending buffer size and sample rate changes right away. Used by formats that have
    /// their own non-realtime point for this, like a deactivated plugin.
    pub fn apply_pending_config(&mut self) {
        if let Some(buffer_size) = self.pending_buffer_size.take() {
            self.adapter.set_buffer_size(buffer_size);
        }
        if let Some(sample_rate) = self.pending_sample_rate.take() {
            self.adapter.set_sample_rate(sample_rate);
        }
    }

    /// Load a program, and refresh the cached value of every non-output parameter. Out of range
    /// indices are ignored. Returns whether the program was loaded.
    pub fn load_program(&mut self, index: u32) -> bool {
        if !self.adapter.load_program(index) {
            return false;
        }

        for (parameter_index, host_value) in self.host_values.iter_mut().enumerate() {
            let parameter_index = parameter_index as u32;
            let value = self.adapter.parameter_value(parameter_index);
            if !self.adapter.is_parameter_output(parameter_index) {
                *host_value = value;
            }

            self.sync.publish_value(parameter_index, value);
        }
        self.sync.publish_program(index);

        true
    }

    /// Restore a piece of state from the host. This allocates and locks, so it must not be called
    /// from the audio thread.
    pub fn set_state(&mut self, key: &str, value: &str) -> bool {
        match self.adapter.set_state(key, value) {
            Some(index) => {
                self.sync.publish_state(index, value);
                true
            }
            None => false,
        }
    }

    /// Set a parameter from a non-realtime host thread, for instance while restoring state.
    pub fn set_parameter_value(&mut self, index: u32, value: f32) {
        if self.adapter.is_parameter_output(index) {
            return;
        }

        self.adapter.set_parameter_value(index, value);
        let value = self.adapter.parameter_value(index);
        if let Some(host_value) = self.host_values.get_mut(index as usize) {
            *host_value = value;
        }
        self.sync.publish_value(index, value);
    }

    /// Process a single block. `inputs` and `outputs` contain `frames` samples per channel. With
    /// `frames == 0` only the output parameters are flushed.
    pub fn process<'e, H: HostBlock<'e>>(
        &mut self,
        host: &mut H,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: u32,
        time_pos: &TimePos,
    ) {
        hb_debug_assert_eq!(self.stage, BlockStage::Idle);

        if frames > 0 {
            self.apply_pending_config();
            self.apply_parameters(host);

            let mut events = MidiEventList::new();
            self.collect_events(host, &mut events, frames);
            self.adapter
                .run(inputs, outputs, frames, events.as_slice(), time_pos);
            self.stage = BlockStage::AudioProcessed;
        }

        self.flush_outputs(host);
        self.stage = BlockStage::Idle;
    }

    fn apply_parameters<'e, H: HostBlock<'e>>(&mut self, host: &H) {
        for index in 0..self.adapter.parameter_count() {
            if self.adapter.is_parameter_output(index) {
                continue;
            }

            // The UI's edits take precedence over the host's value for this block
            let value = match self.sync.take_pending_value(index) {
                Some(value) => Some(value),
                None => host
                    .control_value(index)
                    .filter(|&value| value != self.host_values[index as usize]),
            };

            if let Some(value) = value {
                self.host_values[index as usize] = value;
                self.adapter.set_parameter_value(index, value);

                // A UI edit that arrived after the pending slot was checked wins until next block
                if !self.sync.has_pending_value(index) {
                    self.sync
                        .publish_value(index, self.adapter.parameter_value(index));
                }
            }
        }

        for index in 0..self.adapter.state_count() {
            if self.sync.swap_pending_state(index, &mut self.state_scratch) {
                self.adapter
                    .swap_state_value(index, &mut self.state_scratch);
            }
        }

        self.stage = BlockStage::ParametersApplied;
    }

    fn collect_events<'e, H: HostBlock<'e>>(
        &self,
        host: &mut H,
        events: &mut MidiEventList<'e>,
        frames: u32,
    ) {
        // Notes played on the UI go first, they have been waiting since the last block
        while let Some(note) = self.sync.pop_ui_note() {
            let event = if note.velocity > 0 {
                MidiEvent::note_on(0, note.channel, note.note, note.velocity)
            } else {
                MidiEvent::note_off(0, note.channel, note.note, 0)
            };

            if let Some(event) = event {
                events.push(event);
            }
        }
        let ui_note_count = events.len();

        host.decode_events(events);
        events.clamp_timing(frames);

        for event in &events.as_slice()[ui_note_count..] {
            if event.is_note_on() || event.is_note_off() {
                self.sync.publish_note(SyncNote {
                    channel: event.data[0] & 0x0f,
                    note: event.data[1],
                    velocity: if event.is_note_on() { event.data[2] } else { 0 },
                });
            }
        }

        events.sort_by_frame();
    }

    /// Input parameters are published when they change, so only the outputs are handled here.
    /// Republishing an input would overwrite a UI edit the audio thread has not picked up yet.
    fn flush_outputs<'e, H: HostBlock<'e>>(&mut self, host: &mut H) {
        for index in 0..self.adapter.parameter_count() {
            if !self.adapter.is_parameter_output(index) {
                continue;
            }

            let value = self.adapter.parameter_value(index);
            self.host_values[index as usize] = value;
            host.write_output(index, value);
            self.sync.publish_value(index, value);
        }

        if P::FEATURES.contains(PluginFeatures::WANT_LATENCY) {
            host.write_latency(self.adapter.latency());
        }

        self.stage = BlockStage::OutputsFlushed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_plugin::{Call, RecordingPlugin, GAIN, LATENCY, LEVEL, PANIC};

    /// A port based host, the way LADSPA hands out control values.
    struct TestHost {
        controls: Vec<f32>,
        events: Vec<(u32, [u8; 3])>,
        outputs: Vec<(u32, f32)>,
        latency: Option<u32>,
    }

    impl TestHost {
        fn new() -> Self {
            Self {
                controls: vec![0.5, 0.0, 0.0],
                events: Vec::new(),
                outputs: Vec::new(),
                latency: None,
            }
        }
    }

    impl<'e> HostBlock<'e> for TestHost {
        fn control_value(&self, index: u32) -> Option<f32> {
            self.controls.get(index as usize).copied()
        }

        fn decode_events(&mut self, events: &mut MidiEventList<'e>) {
            for (frame, data) in &self.events {
                if let Some(event) = MidiEvent::from_channel_message(
                    *frame,
                    data[0] & 0xf0,
                    data[0] & 0x0f,
                    data[1],
                    data[2],
                ) {
                    events.push(event);
                }
            }
        }

        fn write_output(&mut self, index: u32, value: f32) {
            self.outputs.push((index, value));
        }

        fn write_latency(&mut self, latency: u32) {
            self.latency = Some(latency);
        }
    }

    fn make_processor() -> BlockProcessor<RecordingPlugin> {
        BlockProcessor::new(PluginApi::Ladspa, PluginConfig::new(64, 44100.0))
    }

    fn run_block(processor: &mut BlockProcessor<RecordingPlugin>, host: &mut TestHost, frames: usize) -> Vec<f32> {
        let input = vec![1.0f32; frames];
        let mut left = vec![0.0f32; frames];
        let mut right = vec![0.0f32; frames];
        processor.process(
            host,
            &[&input, &input],
            &mut [&mut left, &mut right],
            frames as u32,
            &TimePos::default(),
        );

        left
    }

    #[test]
    fn port_layouts() {
        let ladspa = PortLayout::ladspa::<RecordingPlugin>();
        assert_eq!(ladspa.latency_port(), Some(4));
        assert_eq!(ladspa.parameter_offset(), 5);
        assert_eq!(ladspa.port_count(), 8);
        assert_eq!(ladspa.kind(1), Some(PortKind::AudioInput(1)));
        assert_eq!(ladspa.kind(3), Some(PortKind::AudioOutput(1)));
        assert_eq!(ladspa.kind(4), Some(PortKind::Latency));
        assert_eq!(ladspa.kind(7), Some(PortKind::Parameter(LEVEL)));
        assert_eq!(ladspa.kind(8), None);

        // The test plugin has no UI, so there's no sample rate port
        assert_eq!(PortLayout::dssi::<RecordingPlugin>(), ladspa);

        let lv2 = PortLayout::lv2::<RecordingPlugin>();
        assert_eq!(lv2.kind(4), Some(PortKind::EventInput));
        assert_eq!(lv2.kind(5), Some(PortKind::EventOutput));
        assert_eq!(lv2.latency_port(), Some(6));
        assert_eq!(lv2.parameter_port(GAIN), 7);
    }

    #[test]
    fn sample_rate_port_precedes_parameters() {
        let layout = PortLayout {
            sample_rate: true,
            ..PortLayout::ladspa::<RecordingPlugin>()
        };
        assert_eq!(layout.sample_rate_port(), Some(5));
        assert_eq!(layout.kind(5), Some(PortKind::SampleRate));
        assert_eq!(layout.kind(6), Some(PortKind::Parameter(GAIN)));
    }

    #[test]
    fn host_values_are_applied() {
        let mut processor = make_processor();
        let mut host = TestHost::new();
        host.controls[GAIN as usize] = 0.25;

        let output = run_block(&mut processor, &mut host, 4);
        assert_eq!(output, [0.25; 4]);
        assert_eq!(host.outputs, [(LEVEL, 0.25)]);
        assert_eq!(host.latency, Some(LATENCY));
        assert_eq!(processor.sync().published_value(GAIN), 0.25);
        assert_eq!(processor.stage(), BlockStage::Idle);
    }

    #[test]
    fn ui_values_update_the_host_cache() {
        let mut processor = make_processor();
        let mut host = TestHost::new();
        run_block(&mut processor, &mut host, 4);

        processor.sync().request_parameter_value(GAIN, 0.75);
        assert_eq!(run_block(&mut processor, &mut host, 4), [0.75; 4]);
        assert_eq!(processor.host_value(GAIN), 0.75);

        // The host echoing the UI's value back is not a change
        host.controls[GAIN as usize] = 0.75;
        assert_eq!(run_block(&mut processor, &mut host, 4), [0.75; 4]);

        host.controls[GAIN as usize] = 0.5;
        assert_eq!(run_block(&mut processor, &mut host, 4), [0.5; 4]);
    }

    #[test]
    fn empty_block_keeps_pending_ui_values() {
        let mut processor = make_processor();
        let mut host = TestHost::new();
        run_block(&mut processor, &mut host, 4);

        processor.sync().request_parameter_value(GAIN, 0.75);
        run_block(&mut processor, &mut host, 0);
        assert_eq!(processor.sync().published_value(GAIN), 0.75);
        assert_eq!(processor.adapter().parameter_value(GAIN), 0.5);

        assert_eq!(run_block(&mut processor, &mut host, 4), [0.75; 4]);
        assert_eq!(processor.sync().published_value(GAIN), 0.75);
    }

    #[test]
    #[should_panic(expected = "exceeded its maximum block size")]
    fn oversized_blocks_are_reported() {
        let mut buffers = AudioBuffers::new(1, 1, 4);
        let input = [1.0f32; 8];
        let mut output = [0.0f32; 8];
        unsafe {
            buffers.slices(&[input.as_ptr()], &[output.as_mut_ptr()], 8);
        }
    }

    #[test]
    fn empty_block_flushes_outputs() {
        let mut processor = make_processor();
        let mut host = TestHost::new();
        run_block(&mut processor, &mut host, 0);

        assert_eq!(host.outputs, [(LEVEL, 0.0)]);
        assert!(processor.adapter().plugin().calls.is_empty());
    }

    #[test]
    fn same_frame_events_keep_host_order() {
        let mut processor = make_processor();
        let mut host = TestHost::new();
        host.events = vec![
            (3, [0x90, 64, 100]),
            (1, [0x90, 60, 100]),
            (3, [0x80, 62, 0]),
            (1, [0xb0, 7, 127]),
        ];
        run_block(&mut processor, &mut host, 4);

        assert_eq!(
            processor.adapter().plugin().midi,
            [
                (1, vec![0x90, 60, 100]),
                (1, vec![0xb0, 7, 127]),
                (3, vec![0x90, 64, 100]),
                (3, vec![0x80, 62, 0]),
            ]
        );
    }

    #[test]
    fn ui_notes_come_first() {
        let mut processor = make_processor();
        let mut host = TestHost::new();
        host.events = vec![(0, [0x90, 60, 100])];
        processor.sync().request_note(SyncNote {
            channel: 2,
            note: 72,
            velocity: 0,
        });
        run_block(&mut processor, &mut host, 4);

        assert_eq!(
            processor.adapter().plugin().midi,
            [(0, vec![0x82, 72, 0]), (0, vec![0x90, 60, 100])]
        );

        // Only the host's note gets forwarded to the UI
        assert_eq!(
            processor.sync().pop_input_note(),
            Some(SyncNote {
                channel: 0,
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(processor.sync().pop_input_note(), None);
    }

    #[test]
    fn pending_config_applies_at_block_start() {
        let mut processor = make_processor();
        let mut host = TestHost::new();
        processor.request_buffer_size(128);
        assert_eq!(processor.adapter().buffer_size(), 64);

        run_block(&mut processor, &mut host, 4);
        assert_eq!(processor.adapter().buffer_size(), 128);
        assert_eq!(
            processor.adapter().plugin().calls,
            [Call::BufferSizeChanged(128), Call::Activate, Call::Run(4)]
        );
    }

    #[test]
    fn program_refreshes_caches() {
        let mut processor = make_processor();
        assert!(!processor.load_program(2));
        assert_eq!(processor.sync().take_program(), None);

        assert!(processor.load_program(1));
        assert_eq!(processor.host_value(GAIN), 1.0);
        assert_eq!(processor.sync().published_value(GAIN), 1.0);
        assert_eq!(processor.sync().take_program(), Some(1));
    }

    #[test]
    fn ui_state_is_swapped_in() {
        let mut processor = make_processor();
        let mut host = TestHost::new();
        processor.sync().request_state("file", "/tmp/a.wav");
        run_block(&mut processor, &mut host, 4);

        assert_eq!(processor.adapter().state_value(0), "/tmp/a.wav");
    }

    #[test]
    fn host_state_is_published() {
        let mut processor = make_processor();
        assert!(processor.set_state("file", "/tmp/b.wav"));

        let mut seen = Vec::new();
        processor
            .sync()
            .drain_published_states(|key, value| seen.push((key.to_owned(), value.to_owned())));
        assert_eq!(seen, [("file".to_owned(), "/tmp/b.wav".to_owned())]);
    }

    #[test]
    fn panicking_plugin_is_muted() {
        let mut processor = make_processor();
        let mut host = TestHost::new();
        host.controls[PANIC as usize] = 1.0;

        assert_eq!(run_block(&mut processor, &mut host, 4), [0.0; 4]);
        assert_eq!(processor.stage(), BlockStage::Idle);
    }

    #[test]
    fn aliased_buffers_are_copied() {
        let mut buffers = AudioBuffers::new(1, 1, 8);
        let mut data = [1.0f32, 2.0, 3.0, 4.0];
        let ptr = data.as_mut_ptr();

        let (inputs, outputs) = unsafe { buffers.slices(&[ptr as *const f32], &[ptr], 4) };
        outputs[0].fill(0.0);
        assert_eq!(inputs[0], [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(data, [0.0; 4]);
    }

    #[test]
    fn null_buffers_are_replaced() {
        let mut buffers = AudioBuffers::new(1, 1, 8);
        let (inputs, outputs) =
            unsafe { buffers.slices(&[std::ptr::null()], &[std::ptr::null_mut()], 4) };
        assert_eq!(inputs[0], [0.0; 4]);
        assert_eq!(outputs[0].len(), 4);
    }
}
