use hostbridge::prelude::*;

pub const GAIN: u32 = 0;
pub const PEAK: u32 = 1;

/// A stereo gain plugin with a peak meter.
pub struct Gain {
    gain_db: f32,
    /// The linear gain for `gain_db`, so it doesn't need to be recomputed for every block.
    gain: f32,
    peak_db: f32,
}

impl Gain {
    fn set_gain_db(&mut self, gain_db: f32) {
        self.gain_db = gain_db;
        self.gain = util::db_to_gain(gain_db);
    }
}

impl Plugin for Gain {
    type Ui = NoUi;

    const NAME: &'static str = "Gain";
    const LABEL: &'static str = "gain";
    const MAKER: &'static str = "hostbridge";
    const LICENSE: &'static str = "ISC";
    const VERSION: u32 = version(0, 1, 0);
    const UNIQUE_ID: u32 = cconst(b'h', b'b', b'G', b'n');

    const NUM_INPUTS: u32 = 2;
    const NUM_OUTPUTS: u32 = 2;

    const FEATURES: PluginFeatures = PluginFeatures::WANT_PROGRAMS;

    const PARAMETER_COUNT: u32 = 2;
    const PROGRAM_COUNT: u32 = 2;

    fn new(_config: &PluginConfig) -> Self {
        Self {
            gain_db: 0.0,
            gain: 1.0,
            peak_db: util::MINUS_INFINITY_DB,
        }
    }

    fn init_parameter(&mut self, index: u32, parameter: &mut Parameter) {
        match index {
            GAIN => {
                parameter.hints = ParameterHints::AUTOMATABLE;
                parameter.name = String::from("Gain");
                parameter.symbol = String::from("gain");
                parameter.unit = String::from("dB");
                parameter.ranges = ParameterRanges::new(0.0, -30.0, 30.0);
                parameter.ranges.step = 0.1;
            }
            PEAK => {
                parameter.hints = ParameterHints::OUTPUT;
                parameter.name = String::from("Peak");
                parameter.symbol = String::from("peak");
                parameter.unit = String::from("dB");
                parameter.ranges = ParameterRanges::new(
                    util::MINUS_INFINITY_DB,
                    util::MINUS_INFINITY_DB,
                    6.0,
                );
            }
            _ => (),
        }
    }

    fn init_program_name(&mut self, index: u32, name: &mut String) {
        name.push_str(match index {
            0 => "Unity",
            _ => "Quiet",
        });
    }

    fn parameter_value(&self, index: u32) -> f32 {
        match index {
            GAIN => self.gain_db,
            _ => self.peak_db,
        }
    }

    fn set_parameter_value(&mut self, index: u32, value: f32) {
        if index == GAIN {
            self.set_gain_db(value);
        }
    }

    fn load_program(&mut self, index: u32) {
        self.set_gain_db(if index == 0 { 0.0 } else { -12.0 });
    }

    fn run(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        _midi_events: &[MidiEvent],
        _context: &mut ProcessContext,
    ) {
        let mut peak: f32 = 0.0;
        for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
            for (input_sample, output_sample) in input.iter().zip(output.iter_mut()) {
                *output_sample = input_sample * self.gain;
                peak = peak.max(output_sample.abs());
            }
        }

        self.peak_db = util::gain_to_db(peak).min(6.0);
    }
}

impl ClapPlugin for Gain {
    const CLAP_ID: &'static str = "org.hostbridge.gain";
    const CLAP_DESCRIPTION: Option<&'static str> = Some("A gain example plugin with a peak meter");
    const CLAP_URL: Option<&'static str> = None;
}

impl Lv2Plugin for Gain {
    const LV2_URI: &'static str = "urn:hostbridge:gain";
}

impl Vst3Plugin for Gain {
    const VST3_CLASS_ID: [u8; 16] = *b"HostbridgeGainPl";
}

// This also exports the LADSPA entry point
hb_export_dssi!(Gain);
hb_export_lv2!(Gain);
hb_export_vst2!(Gain);
hb_export_vst3!(Gain);
hb_export_clap!(Gain);
hb_export_au!(Gain);
