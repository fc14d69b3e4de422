//! Information the wrappers hand to the plugin during processing.

use std::fmt::Display;

use crate::transport::TimePos;

/// The currently active plugin API. This may be useful to display in an about screen in the
/// plugin's UI for debugging purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginApi {
    Ladspa,
    Dssi,
    Lv2,
    Vst2,
    Vst3,
    Clap,
    Au,
    Standalone,
}

impl Display for PluginApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginApi::Ladspa => write!(f, "LADSPA"),
            PluginApi::Dssi => write!(f, "DSSI"),
            PluginApi::Lv2 => write!(f, "LV2"),
            PluginApi::Vst2 => write!(f, "VST2"),
            PluginApi::Vst3 => write!(f, "VST3"),
            PluginApi::Clap => write!(f, "CLAP"),
            PluginApi::Au => write!(f, "AudioUnit"),
            PluginApi::Standalone => write!(f, "standalone"),
        }
    }
}

/// Passed to [`Plugin::run()`][crate::plugin::Plugin::run()]. Contains the transport information
/// for the current block, and lets the plugin report its latency.
pub struct ProcessContext<'a> {
    pub(crate) plugin_api: PluginApi,
    pub(crate) time_pos: &'a TimePos,
    pub(crate) frames: u32,
    pub(crate) sample_rate: f64,
    pub(crate) latency: &'a mut u32,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        plugin_api: PluginApi,
        time_pos: &'a TimePos,
        frames: u32,
        sample_rate: f64,
        latency: &'a mut u32,
    ) -> Self {
        Self {
            plugin_api,
            time_pos,
            frames,
            sample_rate,
            latency,
        }
    }

    /// The plugin API the plugin is currently being run under.
    pub fn plugin_api(&self) -> PluginApi {
        self.plugin_api
    }

    /// The host's transport information for this block. Only filled in with meaningful values if
    /// the plugin sets [`PluginFeatures::WANT_TIMEPOS`][crate::plugin::PluginFeatures::WANT_TIMEPOS].
    pub fn time_pos(&self) -> &TimePos {
        self.time_pos
    }

    /// The number of samples in this block. Every channel slice has this length.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// The latency currently reported to the host, in samples.
    pub fn latency(&self) -> u32 {
        *self.latency
    }

    /// Change the latency reported to the host. The host is informed after the current block. Only
    /// has an effect if the plugin sets
    /// [`PluginFeatures::WANT_LATENCY`][crate::plugin::PluginFeatures::WANT_LATENCY].
    pub fn set_latency(&mut self, samples: u32) {
        *self.latency = samples;
    }
}
