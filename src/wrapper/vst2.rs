//! The VST2 wrapper. VST2 hosts load a single plugin per library through `VSTPluginMain()`.
//! Parameters are exposed in the normalized `[0, 1]` range, and state is stored as a chunk of
//! NUL-separated key/value pairs.

pub mod sys;
mod wrapper;

pub use self::wrapper::{create_effect, time_pos_from_info};

/// Export a VST2 plugin from this library using the provided plugin type.
#[macro_export]
macro_rules! hb_export_vst2 {
    ($plugin_ty:ty) => {
        #[doc(hidden)]
        mod vst2 {
            use super::*;

            /// The VST2 plugin's entry point.
            ///
            /// # Safety
            ///
            /// Must only be called by a VST2 host with its `audioMaster` callback.
            #[no_mangle]
            pub unsafe extern "C" fn VSTPluginMain(
                audio_master: $crate::wrapper::vst2::sys::audioMasterCallback,
            ) -> *mut $crate::wrapper::vst2::sys::AEffect {
                $crate::wrapper::setup_logger();

                $crate::wrapper::vst2::create_effect::<$plugin_ty>(audio_master)
            }
        }
    };
}
