//! A small plugin used by the unit tests. It records every lifecycle call so tests can check the
//! exact sequence the bridge produced.

use crate::context::ProcessContext;
use crate::midi::MidiEvent;
use crate::param::{Parameter, ParameterHints, ParameterRanges};
use crate::plugin::{
    cconst, version, ClapPlugin, Lv2Plugin, Plugin, PluginConfig, PluginFeatures, Vst3Plugin,
};
use crate::state::StateEntry;
use crate::ui::NoUi;

pub const GAIN: u32 = 0;
pub const PANIC: u32 = 1;
pub const LEVEL: u32 = 2;

pub const LATENCY: u32 = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Activate,
    Deactivate,
    Run(u32),
    BufferSizeChanged(u32),
    SampleRateChanged(f64),
    SetState(String, String),
}

pub struct RecordingPlugin {
    pub calls: Vec<Call>,
    /// Every MIDI event seen during `run()`, as `(frame, bytes)`.
    pub midi: Vec<(u32, Vec<u8>)>,
    /// The `playing` flag and BBT validity of the last block's transport.
    pub last_transport: Option<(bool, bool)>,

    gain: f32,
    panic: f32,
    level: f32,
}

impl Plugin for RecordingPlugin {
    type Ui = NoUi;

    const NAME: &'static str = "Recording Plugin";
    const LABEL: &'static str = "recording";
    const MAKER: &'static str = "hostbridge";
    const LICENSE: &'static str = "ISC";
    const VERSION: u32 = version(1, 2, 3);
    const UNIQUE_ID: u32 = cconst(b'h', b'b', b'R', b'c');

    const NUM_INPUTS: u32 = 2;
    const NUM_OUTPUTS: u32 = 2;

    const FEATURES: PluginFeatures = PluginFeatures::from_bits_truncate(
        PluginFeatures::WANT_PROGRAMS.bits()
            | PluginFeatures::WANT_STATE.bits()
            | PluginFeatures::WANT_LATENCY.bits(),
    );

    const PARAMETER_COUNT: u32 = 3;
    const PROGRAM_COUNT: u32 = 2;
    const STATE_COUNT: u32 = 1;

    fn new(_config: &PluginConfig) -> Self {
        Self {
            calls: Vec::new(),
            midi: Vec::new(),
            last_transport: None,

            gain: 0.5,
            panic: 0.0,
            level: 0.0,
        }
    }

    fn init_parameter(&mut self, index: u32, parameter: &mut Parameter) {
        match index {
            GAIN => {
                parameter.hints = ParameterHints::AUTOMATABLE;
                parameter.name = String::from("Gain");
                parameter.symbol = String::from("gain");
                parameter.ranges = ParameterRanges::new(0.5, 0.0, 1.0);
            }
            PANIC => {
                parameter.hints = ParameterHints::BOOLEAN;
                parameter.name = String::from("Panic");
                parameter.symbol = String::from("panic");
            }
            LEVEL => {
                parameter.hints = ParameterHints::OUTPUT;
                parameter.name = String::from("Level");
                parameter.symbol = String::from("level");
                parameter.unit = String::from("dB");
            }
            _ => unreachable!(),
        }
    }

    fn init_program_name(&mut self, index: u32, name: &mut String) {
        name.push_str(match index {
            0 => "Default",
            _ => "Loud",
        });
    }

    fn init_state(&mut self, _index: u32, state: &mut StateEntry) {
        state.key = String::from("file");
    }

    fn parameter_value(&self, index: u32) -> f32 {
        match index {
            GAIN => self.gain,
            PANIC => self.panic,
            _ => self.level,
        }
    }

    fn set_parameter_value(&mut self, index: u32, value: f32) {
        match index {
            GAIN => self.gain = value,
            PANIC => self.panic = value,
            _ => unreachable!("Output parameters are never set"),
        }
    }

    fn load_program(&mut self, index: u32) {
        self.gain = if index == 1 { 1.0 } else { 0.5 };
    }

    fn set_state(&mut self, key: &str, value: &str) {
        self.calls
            .push(Call::SetState(key.to_owned(), value.to_owned()));
    }

    fn activate(&mut self) {
        self.calls.push(Call::Activate);
    }

    fn deactivate(&mut self) {
        self.calls.push(Call::Deactivate);
    }

    fn buffer_size_changed(&mut self, new_buffer_size: u32) {
        self.calls.push(Call::BufferSizeChanged(new_buffer_size));
    }

    fn sample_rate_changed(&mut self, new_sample_rate: f64) {
        self.calls.push(Call::SampleRateChanged(new_sample_rate));
    }

    fn run(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        midi_events: &[MidiEvent],
        context: &mut ProcessContext,
    ) {
        self.calls.push(Call::Run(context.frames()));
        if self.panic >= 0.5 {
            panic!("Asked to panic");
        }

        for event in midi_events {
            self.midi.push((event.frame, event.as_bytes().to_vec()));
        }
        let time_pos = context.time_pos();
        self.last_transport = Some((time_pos.playing, time_pos.bbt.valid));

        let mut peak: f32 = 0.0;
        for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
            for (i, o) in input.iter().zip(output.iter_mut()) {
                *o = i * self.gain;
                peak = peak.max(o.abs());
            }
        }

        self.level = peak;
        context.set_latency(LATENCY);
    }
}

impl Lv2Plugin for RecordingPlugin {
    const LV2_URI: &'static str = "urn:hostbridge:recording";
}

impl ClapPlugin for RecordingPlugin {
    const CLAP_ID: &'static str = "org.hostbridge.recording";
}

impl Vst3Plugin for RecordingPlugin {
    const VST3_CLASS_ID: [u8; 16] = *b"HbRecordingPlugn";
}
