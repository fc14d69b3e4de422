//! The format independent half of every wrapper. [`PluginAdapter`] owns the plugin instance along
//! with its parameter, program, and state descriptions, and makes sure the plugin only ever sees
//! valid indices, clamped values, and properly bracketed activation calls.

use std::panic::{self, AssertUnwindSafe};

use crate::context::{PluginApi, ProcessContext};
use crate::midi::MidiEvent;
use crate::param::{Parameter, ParameterHints, ParameterRanges};
use crate::plugin::{Plugin, PluginConfig, PluginFeatures};
use crate::state::StateEntry;
use crate::transport::TimePos;

/// The static description of a plugin, gathered from a short-lived instance created with
/// [`PluginConfig::DESCRIBE_ONLY`]. Wrappers use this to build descriptors and port tables without
/// having to keep an instance around.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub parameters: Box<[Parameter]>,
    pub program_names: Box<[String]>,
    pub states: Box<[StateEntry]>,
}

impl PluginInfo {
    pub fn describe<P: Plugin>() -> Self {
        let mut plugin = P::new(&PluginConfig::DESCRIBE_ONLY);

        Self::from_plugin(&mut plugin)
    }

    fn from_plugin<P: Plugin>(plugin: &mut P) -> Self {
        let parameters: Box<[Parameter]> = (0..P::PARAMETER_COUNT)
            .map(|index| {
                let mut parameter = Parameter::default();
                plugin.init_parameter(index, &mut parameter);

                hb_debug_assert!(
                    parameter.ranges.is_valid(),
                    "Parameter {} ('{}') has an invalid range: {:?}",
                    index,
                    parameter.symbol,
                    parameter.ranges
                );
                hb_debug_assert!(
                    !(parameter.hints.contains(ParameterHints::OUTPUT)
                        && parameter.hints.contains(ParameterHints::AUTOMATABLE)),
                    "Output parameter {} is marked as automatable",
                    index
                );

                parameter
            })
            .collect();

        let program_names: Box<[String]> = if P::FEATURES.contains(PluginFeatures::WANT_PROGRAMS) {
            (0..P::PROGRAM_COUNT)
                .map(|index| {
                    let mut name = String::new();
                    plugin.init_program_name(index, &mut name);

                    name
                })
                .collect()
        } else {
            hb_debug_assert_eq!(
                P::PROGRAM_COUNT,
                0,
                "PROGRAM_COUNT is ignored without PluginFeatures::WANT_PROGRAMS"
            );
            Box::new([])
        };

        let states: Box<[StateEntry]> = if P::FEATURES.contains(PluginFeatures::WANT_STATE) {
            (0..P::STATE_COUNT)
                .map(|index| {
                    let mut state = StateEntry::default();
                    plugin.init_state(index, &mut state);
                    hb_debug_assert!(!state.key.is_empty(), "State {} has an empty key", index);

                    state
                })
                .collect()
        } else {
            hb_debug_assert_eq!(
                P::STATE_COUNT,
                0,
                "STATE_COUNT is ignored without PluginFeatures::WANT_STATE"
            );
            Box::new([])
        };

        Self {
            parameters,
            program_names,
            states,
        }
    }

    /// The index of the state with the given key, if it exists.
    pub fn state_index(&self, key: &str) -> Option<usize> {
        self.states.iter().position(|state| state.key == key)
    }

    /// The index of the parameter with the given symbol, if it exists.
    pub fn parameter_index(&self, symbol: &str) -> Option<u32> {
        self.parameters
            .iter()
            .position(|parameter| parameter.symbol == symbol)
            .map(|index| index as u32)
    }
}

/// Owns a fully initialized plugin instance. All wrappers go through this instead of calling the
/// plugin directly.
pub struct PluginAdapter<P: Plugin> {
    plugin: P,
    plugin_api: PluginApi,
    info: PluginInfo,

    is_active: bool,
    buffer_size: u32,
    sample_rate: f64,
    latency: u32,

    /// Set when the plugin's `run()` function panicked during the current activation. The plugin
    /// only outputs silence until it is reactivated.
    run_panicked: bool,
}

impl<P: Plugin> PluginAdapter<P> {
    pub fn new(plugin_api: PluginApi, config: PluginConfig) -> Self {
        hb_debug_assert!(config.buffer_size > 0);
        hb_debug_assert!(config.sample_rate > 0.0);

        let mut plugin = P::new(&config);
        let info = PluginInfo::from_plugin(&mut plugin);

        Self {
            plugin,
            plugin_api,
            info,

            is_active: false,
            buffer_size: config.buffer_size,
            sample_rate: config.sample_rate,
            latency: 0,

            run_panicked: false,
        }
    }

    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    pub fn plugin_api(&self) -> PluginApi {
        self.plugin_api
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn activate(&mut self) {
        if self.is_active {
            return;
        }

        self.is_active = true;
        self.run_panicked = false;
        self.plugin.activate();
    }

    pub fn deactivate(&mut self) {
        if !self.is_active {
            return;
        }

        self.is_active = false;
        self.plugin.deactivate();
    }

    /// Process a block. Activates the plugin first if the host did not. With `frames == 0` this
    /// does not call the plugin at all.
    ///
    /// Panics from the plugin's `run()` function are caught here. The outputs are cleared and the
    /// plugin is not run again until it has been reactivated.
    pub fn run(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: u32,
        midi_events: &[MidiEvent],
        time_pos: &TimePos,
    ) {
        if !self.is_active {
            self.activate();
        }

        if frames == 0 {
            return;
        }

        hb_debug_assert_eq!(inputs.len(), P::NUM_INPUTS as usize);
        hb_debug_assert_eq!(outputs.len(), P::NUM_OUTPUTS as usize);

        if self.run_panicked {
            clear_outputs(outputs);
            return;
        }

        let plugin = &mut self.plugin;
        let mut context = ProcessContext::new(
            self.plugin_api,
            time_pos,
            frames,
            self.sample_rate,
            &mut self.latency,
        );
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            plugin.run(inputs, outputs, midi_events, &mut context)
        }));

        if result.is_err() {
            // The panic itself has already been logged by the panic hook
            hb_error!("The plugin panicked while processing audio, it will be muted until it is reactivated");
            self.run_panicked = true;
            clear_outputs(outputs);
        }
    }

    pub fn parameter_count(&self) -> u32 {
        self.info.parameters.len() as u32
    }

    pub fn parameter(&self, index: u32) -> Option<&Parameter> {
        let parameter = self.info.parameters.get(index as usize);
        hb_debug_assert!(parameter.is_some(), "Parameter index {} is out of range", index);

        parameter
    }

    pub fn parameter_hints(&self, index: u32) -> ParameterHints {
        self.parameter(index).map(|p| p.hints).unwrap_or_default()
    }

    pub fn parameter_name(&self, index: u32) -> &str {
        self.parameter(index).map(|p| p.name.as_str()).unwrap_or("")
    }

    pub fn parameter_symbol(&self, index: u32) -> &str {
        self.parameter(index).map(|p| p.symbol.as_str()).unwrap_or("")
    }

    pub fn parameter_unit(&self, index: u32) -> &str {
        self.parameter(index).map(|p| p.unit.as_str()).unwrap_or("")
    }

    pub fn parameter_ranges(&self, index: u32) -> ParameterRanges {
        self.parameter(index).map(|p| p.ranges).unwrap_or_default()
    }

    pub fn is_parameter_output(&self, index: u32) -> bool {
        self.parameter(index).map(Parameter::is_output).unwrap_or(false)
    }

    pub fn parameter_value(&self, index: u32) -> f32 {
        match self.parameter(index) {
            Some(_) => self.plugin.parameter_value(index),
            None => 0.0,
        }
    }

    /// Set a parameter's value, clamping it to the parameter's range first. Writes to output
    /// parameters and out of range indices are ignored.
    pub fn set_parameter_value(&mut self, index: u32, value: f32) {
        let parameter = match self.info.parameters.get(index as usize) {
            Some(parameter) => parameter,
            None => {
                hb_debug_assert_failure!("Parameter index {} is out of range", index);
                return;
            }
        };
        if parameter.is_output() {
            hb_debug_assert_failure!("Tried to set output parameter {}", index);
            return;
        }

        let value = parameter.ranges.fixed_value(value);
        self.plugin.set_parameter_value(index, value);
    }

    pub fn program_count(&self) -> u32 {
        self.info.program_names.len() as u32
    }

    pub fn program_name(&self, index: u32) -> &str {
        let name = self.info.program_names.get(index as usize);
        hb_debug_assert!(name.is_some(), "Program index {} is out of range", index);

        name.map(String::as_str).unwrap_or("")
    }

    /// Load a program. Out of range indices are ignored. Returns whether the program was loaded.
    pub fn load_program(&mut self, index: u32) -> bool {
        if index >= self.program_count() {
            return false;
        }

        self.plugin.load_program(index);
        true
    }

    pub fn state_count(&self) -> u32 {
        self.info.states.len() as u32
    }

    pub fn state_key(&self, index: u32) -> &str {
        let state = self.info.states.get(index as usize);
        hb_debug_assert!(state.is_some(), "State index {} is out of range", index);

        state.map(|s| s.key.as_str()).unwrap_or("")
    }

    /// The current value for a state, starting out as the default from `init_state()`.
    pub fn state_value(&self, index: u32) -> &str {
        let state = self.info.states.get(index as usize);
        hb_debug_assert!(state.is_some(), "State index {} is out of range", index);

        state.map(|s| s.value.as_str()).unwrap_or("")
    }

    pub fn states(&self) -> &[StateEntry] {
        &self.info.states
    }

    /// Change a piece of state. Unknown keys are ignored. Returns the state's index if the key was
    /// known. This allocates, so it should only be called from non-realtime threads.
    pub fn set_state(&mut self, key: &str, value: &str) -> Option<u32> {
        let index = match self.info.state_index(key) {
            Some(index) => index,
            None => {
                hb_debug_assert_failure!("Unknown state key '{}'", key);
                return None;
            }
        };

        let state = &mut self.info.states[index];
        state.value.clear();
        state.value.push_str(value);
        self.plugin.set_state(&state.key, &state.value);

        Some(index as u32)
    }

    /// Replace a state's value with `value` by swapping the two strings, and inform the plugin.
    /// `value` contains the old value afterwards. This does not allocate, so it can be used on the
    /// audio thread.
    pub fn swap_state_value(&mut self, index: u32, value: &mut String) {
        let state = match self.info.states.get_mut(index as usize) {
            Some(state) => state,
            None => {
                hb_debug_assert_failure!("State index {} is out of range", index);
                return;
            }
        };

        std::mem::swap(&mut state.value, value);
        self.plugin.set_state(&state.key, &state.value);
    }

    pub fn latency(&self) -> u32 {
        self.latency
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Change the maximum block size. If the plugin is active it gets deactivated around the
    /// callback. Does nothing if the value did not change.
    pub fn set_buffer_size(&mut self, buffer_size: u32) {
        hb_debug_assert!(buffer_size > 0);
        if buffer_size == self.buffer_size || buffer_size == 0 {
            return;
        }

        self.buffer_size = buffer_size;

        let was_active = self.is_active;
        self.deactivate();
        self.plugin.buffer_size_changed(buffer_size);
        if was_active {
            self.activate();
        }
    }

    /// Change the sample rate. If the plugin is active it gets deactivated around the callback.
    /// Does nothing if the value did not change.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        hb_debug_assert!(sample_rate > 0.0);
        if sample_rate == self.sample_rate || sample_rate <= 0.0 {
            return;
        }

        self.sample_rate = sample_rate;

        let was_active = self.is_active;
        self.deactivate();
        self.plugin.sample_rate_changed(sample_rate);
        if was_active {
            self.activate();
        }
    }

    /// The wrapped plugin instance.
    pub fn plugin(&self) -> &P {
        &self.plugin
    }
}

fn clear_outputs(outputs: &mut [&mut [f32]]) {
    for channel in outputs.iter_mut() {
        channel.fill(0.0);
    }
}
