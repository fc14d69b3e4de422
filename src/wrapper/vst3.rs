//! The VST3 wrapper. The plugin is exposed as a single component that is also its own edit
//! controller. Parameters are identified by a hash of their symbols, and programs are exposed
//! through an additional list parameter.

mod factory;
mod inner;
mod util;
mod view;
mod wrapper;

/// Re-export for the macro
pub use self::factory::Factory;
pub use self::wrapper::time_pos_from_context;
pub use vst3_sys;

/// Export a VST3 plugin from this library using the provided plugin type.
#[macro_export]
macro_rules! hb_export_vst3 {
    ($plugin_ty:ty) => {
        /// The VST3 plugin factory entry point.
        #[no_mangle]
        pub extern "system" fn GetPluginFactory() -> *mut ::std::ffi::c_void {
            let factory = $crate::wrapper::vst3::Factory::<$plugin_ty>::new();

            Box::into_raw(factory) as *mut ::std::ffi::c_void
        }

        // These two entry points are used on Linux, and they would theoretically also be used on
        // the BSDs:
        // https://github.com/steinbergmedia/vst3_public_sdk/blob/c3948deb407bdbff89de8fb6ab8500ea4df9d6d9/source/main/linuxmain.cpp#L47-L52
        #[allow(missing_docs)]
        #[no_mangle]
        #[cfg(all(target_family = "unix", not(target_os = "macos")))]
        pub extern "C" fn ModuleEntry(_lib_handle: *mut ::std::ffi::c_void) -> bool {
            $crate::wrapper::setup_logger();
            true
        }

        #[allow(missing_docs)]
        #[no_mangle]
        #[cfg(all(target_family = "unix", not(target_os = "macos")))]
        pub extern "C" fn ModuleExit() -> bool {
            true
        }

        // These two entry points are used on macOS:
        // https://github.com/steinbergmedia/vst3_public_sdk/blob/bc459feee68803346737901471441fd4829ec3f9/source/main/macmain.cpp#L60-L61
        #[allow(missing_docs)]
        #[no_mangle]
        #[cfg(target_os = "macos")]
        pub extern "C" fn bundleEntry(_lib_handle: *mut ::std::ffi::c_void) -> bool {
            $crate::wrapper::setup_logger();
            true
        }

        #[allow(missing_docs)]
        #[no_mangle]
        #[cfg(target_os = "macos")]
        pub extern "C" fn bundleExit() -> bool {
            true
        }

        // And these two entry points are used on Windows:
        // https://github.com/steinbergmedia/vst3_public_sdk/blob/bc459feee68803346737901471441fd4829ec3f9/source/main/dllmain.cpp#L59-L60
        #[allow(missing_docs)]
        #[no_mangle]
        #[cfg(target_os = "windows")]
        pub extern "system" fn InitDll() -> bool {
            $crate::wrapper::setup_logger();
            true
        }

        #[allow(missing_docs)]
        #[no_mangle]
        #[cfg(target_os = "windows")]
        pub extern "system" fn ExitDll() -> bool {
            true
        }
    };
}

#[cfg(test)]
mod tests {
    use std::ffi::CStr;
    use std::mem;
    use vst3_sys::base::{kInvalidArgument, kResultFalse, kResultOk, IPluginFactory};
    use vst3_sys::vst::{
        IAudioProcessor, IComponent, IEditController, ParameterFlags, ParameterInfo,
        ProcessContext,
    };
    use widestring::U16CStr;

    use super::factory::version_string;
    use super::util::PROGRAM_PARAM_HASH;
    use super::wrapper::Wrapper;
    use super::*;
    use crate::plugin::Vst3Plugin;
    use crate::test_plugin::{RecordingPlugin, GAIN, LEVEL, PANIC};
    use crate::wrapper::util::hash_param_id;

    fn parameter_info(wrapper: &Wrapper<RecordingPlugin>, index: i32) -> ParameterInfo {
        unsafe {
            let mut info: ParameterInfo = mem::zeroed();
            assert_eq!(wrapper.get_parameter_info(index, &mut info), kResultOk);

            info
        }
    }

    fn title(info: &ParameterInfo) -> String {
        unsafe { U16CStr::from_ptr_str(info.title.as_ptr() as *const u16) }.to_string_lossy()
    }

    #[test]
    fn factory_describes_one_class() {
        let factory = Factory::<RecordingPlugin>::new();

        unsafe {
            assert_eq!(factory.count_classes(), 1);

            let mut info = mem::zeroed();
            assert_eq!(factory.get_class_info(0, &mut info), kResultOk);
            assert_eq!(info.cid.data, RecordingPlugin::PLATFORM_VST3_CLASS_ID);
            assert_eq!(
                CStr::from_ptr(info.name.as_ptr()).to_str(),
                Ok("Recording Plugin")
            );
            assert_eq!(
                CStr::from_ptr(info.category.as_ptr()).to_str(),
                Ok("Audio Module Class")
            );

            assert_eq!(factory.get_class_info(1, &mut info), kInvalidArgument);
        }

        assert_eq!(version_string::<RecordingPlugin>(), "1.2.3");
    }

    #[test]
    fn parameters_and_program_list() {
        let wrapper = Wrapper::<RecordingPlugin>::new();
        assert_eq!(unsafe { wrapper.get_parameter_count() }, 4);

        let gain = parameter_info(&wrapper, GAIN as i32);
        assert_eq!(gain.id, hash_param_id("gain"));
        assert_eq!(title(&gain), "Gain");
        assert_eq!(gain.step_count, 0);
        assert_eq!(gain.default_normalized_value, 0.5);
        assert_eq!(gain.flags, ParameterFlags::kCanAutomate as i32);

        let panic = parameter_info(&wrapper, PANIC as i32);
        assert_eq!(panic.step_count, 1);

        let level = parameter_info(&wrapper, LEVEL as i32);
        assert_eq!(level.flags, ParameterFlags::kIsReadOnly as i32);

        let program = parameter_info(&wrapper, 3);
        assert_eq!(program.id, *PROGRAM_PARAM_HASH);
        assert_eq!(title(&program), "Program");
        assert_eq!(program.step_count, 1);
        assert_ne!(program.flags & ParameterFlags::kIsList as i32, 0);

        unsafe {
            let mut info = mem::zeroed();
            assert_eq!(wrapper.get_parameter_info(4, &mut info), kInvalidArgument);
        }
    }

    #[test]
    fn program_changes_from_the_controller() {
        let wrapper = Wrapper::<RecordingPlugin>::new();
        let gain_id = hash_param_id("gain");

        unsafe {
            assert_eq!(wrapper.get_param_normalized(gain_id), 0.5);
            assert_eq!(wrapper.set_param_normalized(*PROGRAM_PARAM_HASH, 1.0), kResultOk);
            assert_eq!(wrapper.get_param_normalized(*PROGRAM_PARAM_HASH), 1.0);
            assert_eq!(wrapper.get_param_normalized(gain_id), 1.0);

            assert_eq!(wrapper.set_param_normalized(gain_id, 0.25), kResultOk);
            assert_eq!(wrapper.get_param_normalized(gain_id), 0.25);
            assert_eq!(wrapper.set_param_normalized(12345, 0.25), kInvalidArgument);
        }
    }

    #[test]
    fn value_strings() {
        let wrapper = Wrapper::<RecordingPlugin>::new();

        unsafe {
            let mut string = [0u16; 128];
            assert_eq!(
                wrapper.get_param_string_by_value(*PROGRAM_PARAM_HASH, 1.0, string.as_mut_ptr() as *mut _),
                kResultOk
            );
            assert_eq!(
                U16CStr::from_ptr_str(string.as_ptr()).to_string_lossy(),
                "Loud"
            );

            assert_eq!(
                wrapper.get_param_string_by_value(hash_param_id("gain"), 0.25, string.as_mut_ptr() as *mut _),
                kResultOk
            );
            assert_eq!(
                U16CStr::from_ptr_str(string.as_ptr()).to_string_lossy(),
                "0.25"
            );

            let input: Vec<u16> = "0.75\0".encode_utf16().collect();
            let mut value = 0.0;
            assert_eq!(
                wrapper.get_param_value_by_string(hash_param_id("gain"), input.as_ptr() as *const _, &mut value),
                kResultOk
            );
            assert_eq!(value, 0.75);
        }
    }

    #[test]
    fn fixed_bus_layout() {
        let wrapper = Wrapper::<RecordingPlugin>::new();

        unsafe {
            let audio = vst3_sys::vst::MediaTypes::kAudio as i32;
            let event = vst3_sys::vst::MediaTypes::kEvent as i32;
            let input = vst3_sys::vst::BusDirections::kInput as i32;
            assert_eq!(wrapper.get_bus_count(audio, input), 1);
            assert_eq!(wrapper.get_bus_count(event, input), 0);

            let mut stereo = vst3_sys::vst::kStereo;
            let mut mono = vst3_sys::vst::kMono;
            assert_eq!(wrapper.set_bus_arrangements(&mut stereo, 1, &mut stereo, 1), kResultOk);
            assert_eq!(wrapper.set_bus_arrangements(&mut mono, 1, &mut stereo, 1), kResultFalse);

            // The plugin only reports its latency once it has processed audio
            assert_eq!(wrapper.get_latency_samples(), 0);
        }
    }

    #[test]
    fn transport_from_context() {
        let mut context: ProcessContext = unsafe { mem::zeroed() };
        context.state = (1 << 1) | (1 << 9) | (1 << 10) | (1 << 13);
        context.project_time_samples = 96000;
        context.project_time_music = 6.5;
        context.tempo = 120.0;
        context.time_sig_num = 4;
        context.time_sig_den = 4;

        let time_pos = time_pos_from_context(&context);
        assert!(time_pos.playing);
        assert_eq!(time_pos.frame, 96000);
        assert_eq!(time_pos.bpm, 120.0);
        assert!(time_pos.bbt.valid);
        assert_eq!(time_pos.bbt.bar, 2);
        assert_eq!(time_pos.bbt.beat, 3);

        // Without a time signature there's no way to compute bars and beats
        context.state = 1 << 10;
        let time_pos = time_pos_from_context(&context);
        assert!(!time_pos.playing);
        assert!(!time_pos.bbt.valid);
    }
}
