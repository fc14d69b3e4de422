//! A standalone plugin target that directly connects to JACK instead of relying on a plugin host.
//! The plugin gets one JACK port per audio channel, and synths also get a MIDI input port. The
//! standalone does not take any command line options, see [`WrapperConfig`] for the environment
//! variables it reads instead.

use anyhow::Context;

use self::backend::Backend;
use self::wrapper::Wrapper;
use super::util::setup_logger;
use crate::plugin::Plugin;

mod backend;
mod config;
mod wrapper;

pub use self::backend::time_pos_from_jack;
pub use self::config::WrapperConfig;
pub use self::wrapper::apply_transport_fallback;

/// Open a plugin as a standalone JACK application. This blocks until the JACK client stops
/// processing, or until the process is interrupted. In order to use this, you will first need to
/// make your plugin's main struct `pub` and expose a `lib` artifact in addition to your plugin's
/// `cdylib`:
///
/// ```toml
/// # Cargo.toml
///
/// [lib]
/// # The `lib` artifact is needed for the standalone target
/// crate-type = ["cdylib", "lib"]
/// ```
///
/// You can then create a `src/main.rs` file that calls this function:
///
/// ```ignore
/// // src/main.rs
///
/// use plugin_name::PluginName;
///
/// fn main() {
///     std::process::exit(if hostbridge::wrapper::standalone::hb_export_standalone::<PluginName>() { 0 } else { 1 });
/// }
/// ```
///
/// Returns `false` if the JACK client could not be set up.
pub fn hb_export_standalone<P: Plugin>() -> bool {
    setup_logger();

    let config = WrapperConfig::from_env();
    match run::<P>(config) {
        Ok(()) => true,
        Err(err) => {
            hb_error!("{:#}", err);
            false
        }
    }
}

fn run<P: Plugin>(config: WrapperConfig) -> anyhow::Result<()> {
    let backend = backend::Jack::new::<P>(config.clone())
        .context("Could not initialize the JACK backend")?;
    hb_log!(
        "Running '{}' at {} Hz with a buffer size of {} samples",
        P::NAME,
        backend.sample_rate(),
        backend.max_buffer_size()
    );

    Wrapper::<P, _>::new(backend, config)
        .run()
        .context("Error while processing audio")?;

    Ok(())
}
