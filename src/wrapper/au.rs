//! The AudioUnit v2 wrapper. The native component glue that registers the component with the
//! system and dispatches `AudioUnitGetProperty()` and friends lives outside of this crate. It
//! fetches an [`AuInterface`] from the plugin library and forwards to it. Parameters are identified
//! by their indices, and values are exchanged unnormalized.

pub mod sys;
mod wrapper;

pub use self::wrapper::{
    time_pos_from_host_callbacks, AuInterface, AuParameterInfo, Wrapper, AU_INTERFACE_VERSION,
    MAX_QUEUED_MIDI_SIZE,
};

/// Export an AudioUnit plugin from this library using the provided plugin type. The component glue
/// finds the plugin through the `hb_au_interface()` symbol.
#[macro_export]
macro_rules! hb_export_au {
    ($plugin_ty:ty) => {
        /// The AudioUnit bridge entry point.
        #[no_mangle]
        pub extern "C" fn hb_au_interface() -> *const $crate::wrapper::au::AuInterface {
            static INTERFACE: $crate::wrapper::au::AuInterface =
                $crate::wrapper::au::Wrapper::<$plugin_ty>::INTERFACE;

            $crate::wrapper::setup_logger();

            &INTERFACE
        }
    };
}
