//! The LADSPA wrapper. LADSPA exposes everything as numbered ports, see
//! [`PortLayout`][crate::wrapper::block::PortLayout] for their order. There is no MIDI, state, or
//! transport support, plugins that need those should be exported as DSSI or LV2 instead.

mod descriptor;
pub(crate) mod instance;
pub mod sys;

/// Re-export for the macro
pub use self::descriptor::LadspaDescriptor;

use self::sys::*;
use crate::param::ParameterRanges;

/// Pick the LADSPA default hint that best describes a parameter's default value. LADSPA can only
/// express a handful of exact values, and otherwise approximates the default as a point between the
/// range's minimum and maximum.
pub fn default_hint(ranges: &ParameterRanges) -> LADSPA_PortRangeHintDescriptor {
    let def = ranges.def;
    if def == 0.0 {
        LADSPA_HINT_DEFAULT_0
    } else if def == 1.0 {
        LADSPA_HINT_DEFAULT_1
    } else if def == 100.0 {
        LADSPA_HINT_DEFAULT_100
    } else if def == 440.0 {
        LADSPA_HINT_DEFAULT_440
    } else if def == ranges.min {
        LADSPA_HINT_DEFAULT_MINIMUM
    } else if def == ranges.max {
        LADSPA_HINT_DEFAULT_MAXIMUM
    } else {
        let middle = ranges.min / 2.0 + ranges.max / 2.0;
        let middle_low = (ranges.min / 2.0 + middle / 2.0) / 2.0 + middle / 2.0;
        let middle_high = (ranges.max / 2.0 + middle / 2.0) / 2.0 + middle / 2.0;

        if def < middle_low {
            LADSPA_HINT_DEFAULT_LOW
        } else if def > middle_high {
            LADSPA_HINT_DEFAULT_HIGH
        } else {
            LADSPA_HINT_DEFAULT_MIDDLE
        }
    }
}

/// Export one or more LADSPA plugins from this library using the provided plugin types.
#[macro_export]
macro_rules! hb_export_ladspa {
    ($($plugin_ty:ty),+) => {
        #[doc(hidden)]
        mod ladspa {
            // Because the `$plugin_ty`s are likely defined in the enclosing scope. This works even
            // if the types are not public because this is a child module.
            use super::*;

            const PLUGIN_COUNT: usize = [$(stringify!($plugin_ty)),+].len();

            static DESCRIPTORS: ::std::sync::OnceLock<
                [$crate::wrapper::ladspa::LadspaDescriptor; PLUGIN_COUNT]
            > = ::std::sync::OnceLock::new();

            /// The LADSPA plugin's entry point. Hosts call this with increasing indices until it
            /// returns a null pointer.
            #[no_mangle]
            pub extern "C" fn ladspa_descriptor(
                index: ::std::os::raw::c_ulong,
            ) -> *const $crate::wrapper::ladspa::sys::LADSPA_Descriptor {
                let descriptors = DESCRIPTORS.get_or_init(|| {
                    $crate::wrapper::setup_logger();

                    [$($crate::wrapper::ladspa::LadspaDescriptor::for_plugin::<$plugin_ty>(
                        $crate::context::PluginApi::Ladspa,
                        $crate::wrapper::block::PortLayout::ladspa::<$plugin_ty>(),
                    )),+]
                });

                match descriptors.get(index as usize) {
                    Some(descriptor) => descriptor.ladspa_descriptor(),
                    None => ::std::ptr::null(),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;

    use super::*;
    use crate::context::PluginApi;
    use crate::test_plugin::RecordingPlugin;
    use crate::wrapper::block::PortLayout;

    fn ranges(def: f32, min: f32, max: f32) -> ParameterRanges {
        ParameterRanges::new(def, min, max)
    }

    #[test]
    fn exact_defaults() {
        assert_eq!(default_hint(&ranges(0.0, -1.0, 1.0)), LADSPA_HINT_DEFAULT_0);
        assert_eq!(default_hint(&ranges(1.0, 0.0, 1.0)), LADSPA_HINT_DEFAULT_1);
        assert_eq!(default_hint(&ranges(100.0, 0.0, 200.0)), LADSPA_HINT_DEFAULT_100);
        assert_eq!(default_hint(&ranges(440.0, 20.0, 20000.0)), LADSPA_HINT_DEFAULT_440);
        assert_eq!(default_hint(&ranges(-10.0, -10.0, 10.0)), LADSPA_HINT_DEFAULT_MINIMUM);
        assert_eq!(default_hint(&ranges(10.0, -10.0, 10.0)), LADSPA_HINT_DEFAULT_MAXIMUM);
    }

    #[test]
    fn approximate_defaults() {
        // For `[0, 1]` the boundaries lie at 0.375 and 0.625
        assert_eq!(default_hint(&ranges(0.3, 0.0, 1.0)), LADSPA_HINT_DEFAULT_LOW);
        assert_eq!(default_hint(&ranges(0.5, 0.0, 1.0)), LADSPA_HINT_DEFAULT_MIDDLE);
        assert_eq!(default_hint(&ranges(0.625, 0.0, 1.0)), LADSPA_HINT_DEFAULT_MIDDLE);
        assert_eq!(default_hint(&ranges(0.7, 0.0, 1.0)), LADSPA_HINT_DEFAULT_HIGH);
    }

    #[test]
    fn port_table() {
        let descriptor = LadspaDescriptor::for_plugin::<RecordingPlugin>(
            PluginApi::Ladspa,
            PortLayout::ladspa::<RecordingPlugin>(),
        );
        let descriptor = unsafe { &*descriptor.ladspa_descriptor() };
        assert_eq!(descriptor.PortCount, 8);

        let port_descriptors = unsafe { std::slice::from_raw_parts(descriptor.PortDescriptors, 8) };
        assert_eq!(port_descriptors[0], LADSPA_PORT_AUDIO | LADSPA_PORT_INPUT);
        assert_eq!(port_descriptors[3], LADSPA_PORT_AUDIO | LADSPA_PORT_OUTPUT);
        assert_eq!(port_descriptors[4], LADSPA_PORT_CONTROL | LADSPA_PORT_OUTPUT);
        assert_eq!(port_descriptors[5], LADSPA_PORT_CONTROL | LADSPA_PORT_INPUT);
        assert_eq!(port_descriptors[7], LADSPA_PORT_CONTROL | LADSPA_PORT_OUTPUT);

        let port_names = unsafe { std::slice::from_raw_parts(descriptor.PortNames, 8) };
        assert_eq!(unsafe { CStr::from_ptr(port_names[4]) }.to_str(), Ok("_latency"));
        assert_eq!(unsafe { CStr::from_ptr(port_names[5]) }.to_str(), Ok("Gain"));

        let hints = unsafe { std::slice::from_raw_parts(descriptor.PortRangeHints, 8) };
        assert_eq!(
            hints[6].HintDescriptor & LADSPA_HINT_TOGGLED,
            LADSPA_HINT_TOGGLED
        );
        assert_eq!(
            hints[5].HintDescriptor & LADSPA_HINT_DEFAULT_MASK,
            LADSPA_HINT_DEFAULT_MIDDLE
        );
        assert_eq!(unsafe { CStr::from_ptr(descriptor.Label) }.to_str(), Ok("recording"));
    }

    #[test]
    fn run_through_ports() {
        let owned = LadspaDescriptor::for_plugin::<RecordingPlugin>(
            PluginApi::Ladspa,
            PortLayout::ladspa::<RecordingPlugin>(),
        );
        let descriptor = unsafe { &*owned.ladspa_descriptor() };

        let input = [1.0f32; 4];
        let mut left = [0.0f32; 4];
        let mut right = [0.0f32; 4];
        let mut latency = 0.0f32;
        let mut gain = 0.25f32;
        let mut panic = 0.0f32;
        let mut level = 0.0f32;

        unsafe {
            let handle = (descriptor.instantiate.unwrap())(descriptor, 44100);
            assert!(!handle.is_null());

            let connect_port = descriptor.connect_port.unwrap();
            connect_port(handle, 0, input.as_ptr() as *mut f32);
            connect_port(handle, 1, input.as_ptr() as *mut f32);
            connect_port(handle, 2, left.as_mut_ptr());
            connect_port(handle, 3, right.as_mut_ptr());
            connect_port(handle, 4, &mut latency);
            connect_port(handle, 5, &mut gain);
            connect_port(handle, 6, &mut panic);
            connect_port(handle, 7, &mut level);

            (descriptor.activate.unwrap())(handle);
            (descriptor.run.unwrap())(handle, 4);
            (descriptor.deactivate.unwrap())(handle);
            (descriptor.cleanup.unwrap())(handle);
        }

        assert_eq!(left, [0.25; 4]);
        assert_eq!(right, [0.25; 4]);
        assert_eq!(level, 0.25);
        assert_eq!(latency, 64.0);
    }
}
