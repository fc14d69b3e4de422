#![cfg_attr(feature = "docs", feature(doc_auto_cfg))]

#[macro_use]
pub mod debug;

/// Everything you'd need to write a plugin. Import this with `use hostbridge::prelude::*;`.
pub mod prelude;

pub mod context;
pub mod midi;
pub mod param;
pub mod plugin;
pub mod program;
pub mod state;
pub mod sync;
pub mod transport;
pub mod ui;
pub mod util;
pub mod wrapper;

#[cfg(test)]
mod test_plugin;

// Used by the logging macros
#[doc(hidden)]
pub use log;
