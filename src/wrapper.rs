//! Wrappers for different plugin types. Each wrapper has an entry point macro that you can pass the
//! name of a type that implements `Plugin` to. The macro will handle the rest.
//!
//! All wrappers share the same core: [`adapter::PluginAdapter`] owns the plugin, and
//! [`block::BlockProcessor`] turns one host callback into one `Plugin::run()` call.

#[macro_use]
pub(crate) mod util;

pub mod adapter;
pub mod block;
pub(crate) mod state;

pub mod au;
pub mod clap;
pub mod dssi;
pub mod ladspa;
pub mod lv2;
#[cfg(feature = "standalone")]
pub mod standalone;
pub mod vst2;
#[cfg(feature = "vst3")]
pub mod vst3;

pub use self::util::setup_logger;
