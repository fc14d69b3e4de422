//! Drives the format independent parts of the bridge the same way a wrapper would.

use std::sync::Arc;

use approx::assert_relative_eq;
use hostbridge::midi::MidiEventList;
use hostbridge::prelude::*;
use hostbridge::program::real_program;
use hostbridge::state::{decode_chunk, encode_chunk};
use hostbridge::sync::SyncNote;
use hostbridge::ui::{UiAdapter, UiConfig};
use hostbridge::wrapper::adapter::PluginAdapter;
use hostbridge::wrapper::block::{BlockProcessor, HostBlock};

const VOLUME: u32 = 0;
const MODE: u32 = 1;
const METER: u32 = 2;

/// Multiplies the input by `volume`, and remembers every MIDI event it received.
struct Volume {
    volume: f32,
    mode: f32,
    meter: f32,
    preset_path: String,
    midi: Vec<(u32, Vec<u8>)>,
    runs: u32,
}

impl Plugin for Volume {
    type Ui = MeterUi;

    const NAME: &'static str = "Volume";
    const LABEL: &'static str = "volume";
    const MAKER: &'static str = "hostbridge";
    const LICENSE: &'static str = "ISC";
    const VERSION: u32 = version(0, 1, 0);
    const UNIQUE_ID: u32 = cconst(b'h', b'b', b'V', b'o');

    const NUM_INPUTS: u32 = 1;
    const NUM_OUTPUTS: u32 = 1;

    const FEATURES: PluginFeatures = PluginFeatures::from_bits_truncate(
        PluginFeatures::WANT_PROGRAMS.bits()
            | PluginFeatures::WANT_STATE.bits()
            | PluginFeatures::HAS_UI.bits(),
    );

    const PARAMETER_COUNT: u32 = 3;
    const PROGRAM_COUNT: u32 = 3;
    const STATE_COUNT: u32 = 1;

    fn new(_config: &PluginConfig) -> Self {
        Self {
            volume: 1.0,
            mode: 0.0,
            meter: 0.0,
            preset_path: String::new(),
            midi: Vec::new(),
            runs: 0,
        }
    }

    fn init_parameter(&mut self, index: u32, parameter: &mut Parameter) {
        match index {
            VOLUME => {
                parameter.hints = ParameterHints::AUTOMATABLE;
                parameter.name = String::from("Volume");
                parameter.symbol = String::from("volume");
                parameter.ranges = ParameterRanges::new(1.0, 0.0, 2.0);
            }
            MODE => {
                parameter.hints = ParameterHints::AUTOMATABLE | ParameterHints::INTEGER;
                parameter.name = String::from("Mode");
                parameter.symbol = String::from("mode");
                parameter.ranges = ParameterRanges::new(0.0, 0.0, 3.0);
            }
            _ => {
                parameter.hints = ParameterHints::OUTPUT;
                parameter.name = String::from("Meter");
                parameter.symbol = String::from("meter");
            }
        }
    }

    fn init_program_name(&mut self, index: u32, name: &mut String) {
        name.push_str(["Unity", "Half", "Double"][index as usize]);
    }

    fn init_state(&mut self, _index: u32, state: &mut StateEntry) {
        state.key = String::from("preset_path");
        state.value = String::from("/tmp/default");
    }

    fn parameter_value(&self, index: u32) -> f32 {
        match index {
            VOLUME => self.volume,
            MODE => self.mode,
            _ => self.meter,
        }
    }

    fn set_parameter_value(&mut self, index: u32, value: f32) {
        match index {
            VOLUME => self.volume = value,
            _ => self.mode = value,
        }
    }

    fn load_program(&mut self, index: u32) {
        self.volume = [1.0, 0.5, 2.0][index as usize];
    }

    fn set_state(&mut self, key: &str, value: &str) {
        if key == "preset_path" {
            self.preset_path = value.to_owned();
        }
    }

    fn run(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        midi_events: &[MidiEvent],
        _context: &mut ProcessContext,
    ) {
        self.runs += 1;
        for event in midi_events {
            self.midi.push((event.frame, event.as_bytes().to_vec()));
        }

        let mut peak: f32 = 0.0;
        for (i, o) in inputs[0].iter().zip(outputs[0].iter_mut()) {
            *o = i * self.volume;
            peak = peak.max(o.abs());
        }
        self.meter = peak;
    }
}

/// Remembers every notification, in order.
struct MeterUi {
    handle: UiHandle,
    parameters: Vec<(u32, f32)>,
    programs: Vec<u32>,
    states: Vec<(String, String)>,
    notes: Vec<(u8, u8, u8)>,
}

impl Ui for MeterUi {
    fn new(handle: UiHandle) -> Self {
        Self {
            handle,
            parameters: Vec::new(),
            programs: Vec::new(),
            states: Vec::new(),
            notes: Vec::new(),
        }
    }

    fn width(&self) -> u32 {
        200
    }

    fn height(&self) -> u32 {
        100
    }

    fn parameter_changed(&mut self, index: u32, value: f32) {
        self.parameters.push((index, value));
    }

    fn program_changed(&mut self, index: u32) {
        self.programs.push(index);
    }

    fn state_changed(&mut self, key: &str, value: &str) {
        self.states.push((key.to_owned(), value.to_owned()));
    }

    fn note_received(&mut self, channel: u8, note: u8, velocity: u8) {
        self.notes.push((channel, note, velocity));
    }
}

/// An event based host. Control values are only reported when they changed during the block.
#[derive(Default)]
struct EventHost {
    changes: Vec<(u32, f32)>,
    midi: Vec<(u32, Vec<u8>)>,
    outputs: Vec<(u32, f32)>,
}

impl<'e> HostBlock<'e> for EventHost {
    fn control_value(&self, index: u32) -> Option<f32> {
        self.changes
            .iter()
            .rev()
            .find(|(i, _)| *i == index)
            .map(|(_, value)| *value)
    }

    fn decode_events(&mut self, events: &mut MidiEventList<'e>) {
        // Short messages are stored inline, so they don't borrow from the host
        for (frame, bytes) in &self.midi {
            let mut data = [0; 4];
            data[..bytes.len()].copy_from_slice(bytes);
            events.push(MidiEvent {
                frame: *frame,
                size: bytes.len() as u32,
                data,
                data_ext: None,
            });
        }
    }

    fn write_output(&mut self, index: u32, value: f32) {
        self.outputs.push((index, value));
    }
}

fn processor() -> BlockProcessor<Volume> {
    BlockProcessor::new(PluginApi::Clap, PluginConfig::new(64, 48000.0))
}

fn process(processor: &mut BlockProcessor<Volume>, host: &mut EventHost, frames: usize) -> Vec<f32> {
    let input = vec![0.5f32; frames];
    let mut output = vec![0.0f32; frames];
    processor.process(
        host,
        &[&input],
        &mut [&mut output],
        frames as u32,
        &TimePos::default(),
    );

    output
}

fn ui_config() -> UiConfig {
    UiConfig {
        plugin_api: PluginApi::Clap,
        parameter_count: Volume::PARAMETER_COUNT,
        sample_rate: 48000.0,
        parent_window: None,
    }
}

#[test]
fn adapter_describes_the_plugin() {
    let adapter = PluginAdapter::<Volume>::new(PluginApi::Lv2, PluginConfig::new(64, 48000.0));

    assert_eq!(adapter.parameter_count(), 3);
    assert_eq!(adapter.parameter_symbol(MODE), "mode");
    assert!(adapter.is_parameter_output(METER));
    assert!(!adapter.is_parameter_output(VOLUME));
    assert_eq!(adapter.program_count(), 3);
    assert_eq!(adapter.program_name(2), "Double");
    assert_eq!(adapter.state_count(), 1);
    assert_eq!(adapter.state_key(0), "preset_path");
    assert_eq!(adapter.state_value(0), "/tmp/default");
    assert_eq!(adapter.info().parameter_index("volume"), Some(VOLUME));
}

#[test]
fn adapter_clamps_parameter_values() {
    let mut adapter = PluginAdapter::<Volume>::new(PluginApi::Lv2, PluginConfig::new(64, 48000.0));

    adapter.set_parameter_value(VOLUME, 5.0);
    assert_eq!(adapter.parameter_value(VOLUME), 2.0);
    adapter.set_parameter_value(VOLUME, -1.0);
    assert_eq!(adapter.parameter_value(VOLUME), 0.0);

    let ranges = adapter.parameter_ranges(VOLUME);
    assert_relative_eq!(ranges.normalize(1.5), 0.75);
    assert_relative_eq!(ranges.unnormalize(0.25), 0.5);
    assert_eq!(ranges.unnormalize(ranges.normalize(7.0)), 2.0);
    assert_eq!(ranges.normalize(-3.0), 0.0);
}

#[test]
fn adapter_programs_and_state() {
    let mut adapter = PluginAdapter::<Volume>::new(PluginApi::Lv2, PluginConfig::new(64, 48000.0));

    assert!(adapter.load_program(1));
    assert_eq!(adapter.parameter_value(VOLUME), 0.5);
    assert!(!adapter.load_program(3));
    assert_eq!(adapter.parameter_value(VOLUME), 0.5);

    assert_eq!(adapter.set_state("preset_path", "/home/user/a.preset"), Some(0));
    assert_eq!(adapter.state_value(0), "/home/user/a.preset");
    assert_eq!(adapter.plugin().preset_path, "/home/user/a.preset");
    assert_eq!(adapter.set_state("unknown", "value"), None);
}

#[test]
fn adapter_activation_is_idempotent() {
    let mut adapter = PluginAdapter::<Volume>::new(PluginApi::Lv2, PluginConfig::new(64, 48000.0));
    assert!(!adapter.is_active());

    let input = [1.0f32; 8];
    let mut output = [0.0f32; 8];
    adapter.run(&[&input], &mut [&mut output], 8, &[], &TimePos::default());
    assert!(adapter.is_active());
    assert_eq!(output, [1.0; 8]);
    assert_eq!(adapter.plugin().runs, 1);

    adapter.deactivate();
    adapter.deactivate();
    assert!(!adapter.is_active());
}

#[test]
fn processor_applies_host_changes_and_reports_outputs() {
    let mut processor = processor();
    let mut host = EventHost {
        changes: vec![(VOLUME, 0.5), (VOLUME, 3.0)],
        ..EventHost::default()
    };

    // The last change wins, and is clamped to the parameter's range
    assert_eq!(process(&mut processor, &mut host, 4), [1.0; 4]);
    assert_eq!(processor.adapter().parameter_value(VOLUME), 2.0);
    assert_eq!(host.outputs, [(METER, 1.0)]);
    assert_eq!(processor.sync().published_value(METER), 1.0);
}

#[test]
fn zero_frame_blocks_only_flush_outputs() {
    let mut processor = processor();
    let mut host = EventHost {
        changes: vec![(VOLUME, 0.25)],
        ..EventHost::default()
    };

    let output = process(&mut processor, &mut host, 0);
    assert!(output.is_empty());
    assert_eq!(processor.adapter().parameter_value(VOLUME), 1.0);
    assert_eq!(host.outputs, [(METER, 0.0)]);
}

#[test]
fn midi_is_sorted_and_clamped() {
    let mut processor = processor();
    let mut host = EventHost {
        midi: vec![
            (2, vec![0x90, 60, 100]),
            (2, vec![0x90, 64, 100]),
            (1, vec![0x80, 55, 0]),
            (100, vec![0xb0, 7, 127]),
        ],
        ..EventHost::default()
    };

    process(&mut processor, &mut host, 8);
    assert_eq!(
        processor.adapter().plugin().midi,
        [
            (1, vec![0x80, 55, 0]),
            (2, vec![0x90, 60, 100]),
            (2, vec![0x90, 64, 100]),
            (7, vec![0xb0, 7, 127]),
        ]
    );
}

#[test]
fn ui_edits_reach_the_plugin() {
    let mut processor = processor();
    let sync = processor.sync().clone();
    let ui = UiAdapter::<MeterUi>::new(sync.clone(), Some(sync.clone()), ui_config());

    ui.ui().handle.set_parameter_value(VOLUME, 0.5);
    ui.ui().handle.set_state("preset_path", "/srv/b.preset");
    ui.ui().handle.send_note(0, 48, 90);

    let mut host = EventHost::default();
    assert_eq!(process(&mut processor, &mut host, 4), [0.25; 4]);
    assert_eq!(processor.adapter().state_value(0), "/srv/b.preset");
    assert_eq!(
        processor.adapter().plugin().midi,
        [(0, vec![0x90, 48, 90])]
    );
}

#[test]
fn ui_edits_are_not_echoed_back() {
    let mut processor = processor();
    let sync = processor.sync().clone();
    let mut ui = UiAdapter::<MeterUi>::new(sync.clone(), Some(sync), ui_config());
    let mut host = EventHost::default();
    process(&mut processor, &mut host, 4);
    ui.idle();
    let delivered = ui.ui().parameters.len();

    // An empty block between the edit and the block that applies it must not publish the old value
    ui.ui().handle.set_parameter_value(VOLUME, 0.25);
    process(&mut processor, &mut host, 0);
    ui.idle();
    assert_eq!(ui.ui().parameters.len(), delivered);

    process(&mut processor, &mut host, 4);
    ui.idle();
    assert_eq!(processor.adapter().parameter_value(VOLUME), 0.25);
    assert!(ui.ui().parameters[delivered..]
        .iter()
        .all(|&(index, _)| index == METER));
}

#[test]
fn ui_converges_within_one_idle() {
    let mut processor = processor();
    let sync = processor.sync().clone();
    let mut ui = UiAdapter::<MeterUi>::new(sync.clone(), Some(sync), ui_config());

    // Opening the UI sends the current values
    assert_eq!(ui.ui().parameters, [(VOLUME, 1.0), (MODE, 0.0), (METER, 0.0)]);
    assert_eq!(
        ui.ui().states,
        [(String::from("preset_path"), String::from("/tmp/default"))]
    );

    processor.set_parameter_value(MODE, 1.0);
    processor.set_parameter_value(MODE, 2.0);
    processor.set_parameter_value(MODE, 3.0);
    processor.set_state("preset_path", "/srv/c.preset");

    let mut host = EventHost {
        midi: vec![(0, vec![0x92, 72, 80])],
        ..EventHost::default()
    };
    process(&mut processor, &mut host, 4);

    ui.idle();
    let parameters = &ui.ui().parameters[3..];
    assert_eq!(parameters, [(MODE, 3.0), (METER, 0.5)]);
    assert_eq!(
        ui.ui().states[1..],
        [(String::from("preset_path"), String::from("/srv/c.preset"))]
    );
    assert_eq!(ui.ui().notes, [(2, 72, 80)]);

    // Nothing changed since, so nothing is delivered
    ui.idle();
    assert_eq!(ui.ui().parameters.len(), 5);
}

#[test]
fn program_changes_resync_the_ui() {
    let mut processor = processor();
    let sync = processor.sync().clone();
    let mut ui = UiAdapter::<MeterUi>::new(sync.clone(), Some(sync), ui_config());

    assert!(processor.load_program(2));
    assert_eq!(processor.host_value(VOLUME), 2.0);
    assert!(!processor.load_program(3));

    ui.idle();
    assert_eq!(ui.ui().programs, [2]);
    assert!(ui.ui().parameters.contains(&(VOLUME, 2.0)));
}

#[test]
fn ui_notes_are_forwarded_directly() {
    let sync = Arc::new(hostbridge::sync::ParamSync::new(
        PluginAdapter::<Volume>::new(PluginApi::Dssi, PluginConfig::DESCRIBE_ONLY).info(),
    ));
    let mut ui = UiAdapter::<MeterUi>::new(sync.clone(), None, ui_config());

    // Process isolated UIs only receive what the wrapper passes along
    assert!(ui.ui().parameters.is_empty());
    sync.publish_note(SyncNote {
        channel: 0,
        note: 60,
        velocity: 100,
    });
    ui.idle();
    assert!(ui.ui().notes.is_empty());

    ui.note_received(0, 60, 100);
    ui.parameter_changed(VOLUME, 0.75);
    assert_eq!(ui.ui().notes, [(0, 60, 100)]);
    assert_eq!(ui.ui().parameters, [(VOLUME, 0.75)]);
}

#[test]
fn state_chunks() {
    assert_eq!(encode_chunk(Vec::<(&str, &str)>::new()), [0]);
    assert!(decode_chunk(&[0]).unwrap().is_empty());

    let chunk = encode_chunk([("preset_path", "/a"), ("mode", "")]);
    assert_eq!(chunk, b"preset_path\0/a\0mode\0\0");
    assert_eq!(
        decode_chunk(&chunk).unwrap(),
        [
            (String::from("preset_path"), String::from("/a")),
            (String::from("mode"), String::new()),
        ]
    );
    assert!(decode_chunk(b"key\0value\0orphan").is_err());
}

#[test]
fn bank_and_program_addressing() {
    assert_eq!(real_program(0, 2, Volume::PROGRAM_COUNT), Some(2));
    assert_eq!(real_program(0, 3, Volume::PROGRAM_COUNT), None);
    assert_eq!(real_program(1, 0, 200), Some(128));
    assert_eq!(real_program(u32::MAX, 0, 200), None);
}
