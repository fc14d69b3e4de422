//! The CLAP wrapper. Parameters are exchanged as plain values and identified by a hash of their
//! symbols. Programs are not exposed since CLAP handles presets on the host side.

#[macro_use]
mod util;

mod descriptor;
mod wrapper;

/// Re-export for the macro
pub use self::descriptor::PluginDescriptor;
pub use self::wrapper::{time_pos_from_transport, Wrapper};
pub use clap_sys::entry::clap_plugin_entry;
pub use clap_sys::plugin_factory::{clap_plugin_factory, CLAP_PLUGIN_FACTORY_ID};
pub use clap_sys::host::clap_host;
pub use clap_sys::plugin::{clap_plugin, clap_plugin_descriptor};
pub use clap_sys::version::CLAP_VERSION;

/// Export one or more CLAP plugins from this library using the provided plugin types.
#[macro_export]
macro_rules! hb_export_clap {
    ($($plugin_ty:ty),+) => {
        #[doc(hidden)]
        mod clap {
            // The plugin types live in the parent module
            use super::*;

            const CLAP_PLUGIN_FACTORY: $crate::wrapper::clap::clap_plugin_factory =
                $crate::wrapper::clap::clap_plugin_factory {
                    get_plugin_count: Some(get_plugin_count),
                    get_plugin_descriptor: Some(get_plugin_descriptor),
                    create_plugin: Some(create_plugin),
                };

            const PLUGIN_COUNT: usize = [$(stringify!($plugin_ty)),+].len();

            // Descriptor `i` belongs to the `i`th plugin type. These contain heap allocated
            // strings, so they're built on first use
            static PLUGIN_DESCRIPTORS: ::std::sync::OnceLock<
                [$crate::wrapper::clap::PluginDescriptor; PLUGIN_COUNT]
            > = ::std::sync::OnceLock::new();

            fn plugin_descriptors() -> &'static [$crate::wrapper::clap::PluginDescriptor; PLUGIN_COUNT] {
                PLUGIN_DESCRIPTORS.get_or_init(|| {
                    let descriptors = [$($crate::wrapper::clap::PluginDescriptor::for_plugin::<$plugin_ty>()),+];

                    if cfg!(debug_assertions) {
                        let unique_plugin_ids: std::collections::HashSet<_>
                            = descriptors.iter().map(|d| d.clap_id()).collect();
                        $crate::hb_debug_assert_eq!(
                            unique_plugin_ids.len(),
                            descriptors.len(),
                            "Duplicate plugin IDs found in `hb_export_clap!()` call"
                        );
                    }

                    descriptors
                })
            }

            unsafe extern "C" fn get_plugin_count(
                _factory: *const $crate::wrapper::clap::clap_plugin_factory,
            ) -> u32 {
                plugin_descriptors().len() as u32
            }

            unsafe extern "C" fn get_plugin_descriptor (
                _factory: *const $crate::wrapper::clap::clap_plugin_factory,
                index: u32,
            ) -> *const $crate::wrapper::clap::clap_plugin_descriptor  {
                match plugin_descriptors().get(index as usize) {
                    Some(descriptor) => descriptor.clap_plugin_descriptor(),
                    None => std::ptr::null()
                }
            }

            unsafe extern "C" fn create_plugin (
                factory: *const $crate::wrapper::clap::clap_plugin_factory,
                host: *const $crate::wrapper::clap::clap_host,
                plugin_id: *const ::std::os::raw::c_char,
            ) -> *const $crate::wrapper::clap::clap_plugin  {
                if plugin_id.is_null() {
                    return ::std::ptr::null();
                }
                let plugin_id_cstr = ::std::ffi::CStr::from_ptr(plugin_id);

                let descriptors = plugin_descriptors();
                let mut descriptor_idx = 0;
                $({
                    let descriptor = &descriptors[descriptor_idx];
                    if plugin_id_cstr == descriptor.clap_id() {
                        // Reclaimed in `Wrapper::destroy()`
                        return (*::std::sync::Arc::into_raw($crate::wrapper::clap::Wrapper::<$plugin_ty>::new(host)))
                            .clap_plugin
                            .as_ptr();
                    }

                    descriptor_idx += 1;
                })+

                std::ptr::null()
            }

            pub extern "C" fn init(_plugin_path: *const ::std::os::raw::c_char) -> bool {
                $crate::wrapper::setup_logger();
                true
            }

            pub extern "C" fn deinit() {}

            pub extern "C" fn get_factory(
                factory_id: *const ::std::os::raw::c_char,
            ) -> *const ::std::ffi::c_void {
                if !factory_id.is_null()
                    && unsafe { ::std::ffi::CStr::from_ptr(factory_id) }
                        == $crate::wrapper::clap::CLAP_PLUGIN_FACTORY_ID
                {
                    &CLAP_PLUGIN_FACTORY as *const _ as *const ::std::ffi::c_void
                } else {
                    std::ptr::null()
                }
            }
        }

        /// The CLAP plugin's entry point.
        #[no_mangle]
        #[used]
        pub static clap_entry: $crate::wrapper::clap::clap_plugin_entry =
            $crate::wrapper::clap::clap_plugin_entry {
                clap_version: $crate::wrapper::clap::CLAP_VERSION,
                init: Some(self::clap::init),
                deinit: Some(self::clap::deinit),
                get_factory: Some(self::clap::get_factory),
            };
    };
}
