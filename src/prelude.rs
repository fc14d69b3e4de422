// Re-export the macros
pub use crate::debug::*;

pub use crate::hb_export_au;
pub use crate::hb_export_clap;
pub use crate::hb_export_dssi;
pub use crate::hb_export_ladspa;
pub use crate::hb_export_lv2;
pub use crate::hb_export_vst2;
#[cfg(feature = "vst3")]
pub use crate::hb_export_vst3;
#[cfg(feature = "standalone")]
pub use crate::wrapper::standalone::hb_export_standalone;

pub use crate::util;

pub use crate::context::{PluginApi, ProcessContext};
pub use crate::midi::{control_change, MidiEvent};
pub use crate::param::{Parameter, ParameterHints, ParameterRanges};
pub use crate::plugin::{
    cconst, version, ClapPlugin, Lv2Plugin, Plugin, PluginConfig, PluginFeatures, Vst3Plugin,
};
pub use crate::state::StateEntry;
pub use crate::transport::{TimePos, TimePosBbt};
pub use crate::ui::{NoUi, Ui, UiEvent, UiHandle};
