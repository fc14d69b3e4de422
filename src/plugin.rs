// nih-plug: plugins, but rewritten in Rust
// Copyright (C) 2022 Robbert van der Helm
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use bitflags::bitflags;

use crate::context::ProcessContext;
use crate::midi::MidiEvent;
use crate::param::Parameter;
use crate::state::StateEntry;
use crate::ui::Ui;

mod clap;
mod lv2;
mod vst3;

pub use self::clap::ClapPlugin;
pub use self::lv2::Lv2Plugin;
pub use self::vst3::Vst3Plugin;

bitflags! {
    /// The optional capabilities of a plugin. The wrappers check these at run time to decide which
    /// ports, extensions, and opcodes to expose.
    #[repr(transparent)]
    #[derive(Default)]
    pub struct PluginFeatures: u32 {
        /// The plugin is an instrument. Implies MIDI input.
        const IS_SYNTH = 1 << 0;
        /// The plugin has factory presets, see [`Plugin::PROGRAM_COUNT`].
        const WANT_PROGRAMS = 1 << 1;
        /// The plugin stores key/value state, see [`Plugin::STATE_COUNT`].
        const WANT_STATE = 1 << 2;
        /// The plugin reports latency through [`ProcessContext::set_latency()`].
        const WANT_LATENCY = 1 << 3;
        /// The plugin wants the host's transport information.
        const WANT_TIMEPOS = 1 << 4;
        /// The plugin has a UI. [`Plugin::Ui`] must not be [`NoUi`][crate::ui::NoUi].
        const HAS_UI = 1 << 5;
    }
}

/// Build a four character code the way C `'abcd'` multi-character constants do. LADSPA, DSSI, and
/// VST2 identify plugins with these.
pub const fn cconst(a: u8, b: u8, c: u8, d: u8) -> u32 {
    ((a as u32) << 24) | ((b as u32) << 16) | ((c as u32) << 8) | (d as u32)
}

/// Encode a version as `0xMMmmpp`, for the formats that expose a single integer version.
pub const fn version(major: u8, minor: u8, micro: u8) -> u32 {
    ((major as u32) << 16) | ((minor as u32) << 8) | (micro as u32)
}

/// The configuration a plugin is constructed with. Wrappers pass the host's current values, or
/// [`PluginConfig::DESCRIBE_ONLY`] when the instance is only created to read the plugin's
/// parameters, programs, and state keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PluginConfig {
    /// The maximum block size the host will use. Hosts may still call `run()` with fewer samples,
    /// and some hosts exceed this.
    pub buffer_size: u32,
    pub sample_rate: f64,
    /// Set when this instance will never process audio.
    pub describe_only: bool,
}

impl PluginConfig {
    /// The configuration used for instances that only describe the plugin to the host.
    pub const DESCRIBE_ONLY: PluginConfig = PluginConfig {
        buffer_size: 512,
        sample_rate: 44100.0,
        describe_only: true,
    };

    pub fn new(buffer_size: u32, sample_rate: f64) -> Self {
        Self {
            buffer_size,
            sample_rate,
            describe_only: false,
        }
    }
}

/// Basic functionality that needs to be implemented by a plugin. The wrappers will use this to
/// expose the plugin in a particular plugin format.
///
/// Parameters, programs, and state are all identified by contiguous indices. Their metadata is
/// queried once through the `init_*()` functions directly after the plugin has been constructed.
/// The plugin itself only has to store the parameter values.
///
/// Any of the functions can be called from the audio thread, with the exception of `new()` and the
/// `init_*()` functions. They should thus not allocate or block.
#[allow(unused_variables)]
pub trait Plugin: Send + 'static {
    /// The plugin's UI. Use [`NoUi`][crate::ui::NoUi] if the plugin does not have one.
    type Ui: Ui;

    /// The human readable name of the plugin.
    const NAME: &'static str;
    /// A short, restricted name consisting of only `_`, `a-z`, `A-Z`, and `0-9` characters. LADSPA
    /// and DSSI hosts use this to identify the plugin within a library.
    const LABEL: &'static str;
    const MAKER: &'static str;
    /// A single line license name or URL. Also used as the LADSPA copyright field.
    const LICENSE: &'static str;
    /// See [`version()`].
    const VERSION: u32;
    /// See [`cconst()`]. Used by LADSPA, DSSI, and VST2.
    const UNIQUE_ID: u32;

    const NUM_INPUTS: u32;
    const NUM_OUTPUTS: u32;

    const FEATURES: PluginFeatures = PluginFeatures::empty();

    const PARAMETER_COUNT: u32 = 0;
    /// Only used when [`PluginFeatures::WANT_PROGRAMS`] is set.
    const PROGRAM_COUNT: u32 = 0;
    /// Only used when [`PluginFeatures::WANT_STATE`] is set.
    const STATE_COUNT: u32 = 0;

    /// Create the plugin. This happens both for instances that will process audio and for
    /// short-lived instances that are only used to describe the plugin, see
    /// [`PluginConfig::describe_only`]. Don't do any expensive initialization in the latter case.
    fn new(config: &PluginConfig) -> Self;

    /// Fill in the metadata for parameter `index`. Called once for every parameter after `new()`.
    fn init_parameter(&mut self, index: u32, parameter: &mut Parameter) {}

    /// Set the name of program `index`. Called once for every program after `new()`.
    fn init_program_name(&mut self, index: u32, name: &mut String) {}

    /// Set the key and default value for state `index`. Called once for every state after `new()`.
    fn init_state(&mut self, index: u32, state: &mut StateEntry) {}

    /// Get the current value of a parameter. Output parameters are read after every block.
    fn parameter_value(&self, index: u32) -> f32;

    /// Change a parameter's value. The value is always within the parameter's range. This is never
    /// called for output parameters.
    fn set_parameter_value(&mut self, index: u32, value: f32);

    /// Load program `index`, changing the parameter values accordingly. The index is always valid.
    fn load_program(&mut self, index: u32) {}

    /// Change a piece of state. `key` is always one of the keys from `init_state()`.
    fn set_state(&mut self, key: &str, value: &str) {}

    fn activate(&mut self) {}

    fn deactivate(&mut self) {}

    /// Called while the plugin is deactivated when the maximum block size changes.
    fn buffer_size_changed(&mut self, new_buffer_size: u32) {}

    /// Called while the plugin is deactivated when the sample rate changes.
    fn sample_rate_changed(&mut self, new_sample_rate: f64) {}

    /// Process a block of audio. `inputs` contains [`NUM_INPUTS`][Self::NUM_INPUTS] channels and
    /// `outputs` contains [`NUM_OUTPUTS`][Self::NUM_OUTPUTS] channels, all with
    /// [`context.frames()`][ProcessContext::frames()] samples. `midi_events` is sorted by frame.
    fn run(
        &mut self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        midi_events: &[MidiEvent],
        context: &mut ProcessContext,
    );
}
