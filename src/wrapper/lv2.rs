//! The LV2 wrapper. Ports follow [`PortLayout::lv2()`][crate::wrapper::block::PortLayout::lv2()],
//! and the plugin's `.ttl` manifest has to be written to match. MIDI and the host's transport
//! arrive through the atom event input port. State and programs are exposed through the state and
//! programs extensions.

use std::ffi::CString;

use self::sys::*;
use crate::plugin::{Lv2Plugin, PluginFeatures};

mod atom;
pub(crate) mod instance;
mod position;
pub mod sys;

/// An LV2 descriptor. The host identifies plugins by the descriptor's URI.
pub struct Lv2Descriptor {
    uri: CString,
    descriptor: LV2_Descriptor,
}

unsafe impl Send for Lv2Descriptor {}
unsafe impl Sync for Lv2Descriptor {}

impl Lv2Descriptor {
    pub fn for_plugin<P: Lv2Plugin>() -> Self {
        if P::FEATURES.contains(PluginFeatures::HAS_UI) && P::LV2_UI_URI.is_none() {
            hb_warn!(
                "'{}' has a UI but no 'LV2_UI_URI', the UI will not be available",
                P::NAME
            );
        }

        let uri = CString::new(P::LV2_URI).expect("`LV2_URI` contained null bytes");

        // NOTE: This is safe without pinning this struct because the URI's data is on the heap
        let descriptor = LV2_Descriptor {
            URI: uri.as_ptr(),
            instantiate: Some(instance::instantiate::<P>),
            connect_port: Some(instance::connect_port::<P>),
            activate: Some(instance::activate::<P>),
            run: Some(instance::run::<P>),
            deactivate: Some(instance::deactivate::<P>),
            cleanup: Some(instance::cleanup::<P>),
            extension_data: Some(instance::extension_data::<P>),
        };

        Self { uri, descriptor }
    }

    pub fn uri(&self) -> &str {
        self.uri.to_str().unwrap_or_default()
    }

    pub fn lv2_descriptor(&self) -> *const LV2_Descriptor {
        &self.descriptor
    }
}

/// Export one or more LV2 plugins from this library using the provided plugin types.
#[macro_export]
macro_rules! hb_export_lv2 {
    ($($plugin_ty:ty),+) => {
        #[doc(hidden)]
        mod lv2 {
            // Because the `$plugin_ty`s are likely defined in the enclosing scope. This works even
            // if the types are not public because this is a child module.
            use super::*;

            const PLUGIN_COUNT: usize = [$(stringify!($plugin_ty)),+].len();

            static DESCRIPTORS: ::std::sync::OnceLock<
                [$crate::wrapper::lv2::Lv2Descriptor; PLUGIN_COUNT]
            > = ::std::sync::OnceLock::new();

            /// The LV2 plugin's entry point. Hosts call this with increasing indices until it
            /// returns a null pointer.
            #[no_mangle]
            pub extern "C" fn lv2_descriptor(
                index: u32,
            ) -> *const $crate::wrapper::lv2::sys::LV2_Descriptor {
                let descriptors = DESCRIPTORS.get_or_init(|| {
                    $crate::wrapper::setup_logger();

                    [$($crate::wrapper::lv2::Lv2Descriptor::for_plugin::<$plugin_ty>()),+]
                });

                match descriptors.get(index as usize) {
                    Some(descriptor) => descriptor.lv2_descriptor(),
                    None => ::std::ptr::null(),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::ffi::CStr;
    use std::os::raw::{c_char, c_void};
    use std::ptr;

    use super::atom::test_util::SequenceBuilder;
    use super::instance::Instance;
    use super::*;
    use crate::test_plugin::{Call, RecordingPlugin, GAIN};

    type SavedState = Vec<(u32, Vec<u8>, u32)>;

    unsafe extern "C" fn map_uri(handle: *mut c_void, uri: *const c_char) -> u32 {
        let uris = &*(handle as *const RefCell<Vec<CString>>);
        let uri = CStr::from_ptr(uri);

        let mut uris = uris.borrow_mut();
        match uris.iter().position(|known| known.as_c_str() == uri) {
            Some(index) => index as u32 + 1,
            None => {
                uris.push(uri.to_owned());
                uris.len() as u32
            }
        }
    }

    unsafe extern "C" fn store(
        handle: *mut c_void,
        key: u32,
        value: *const c_void,
        size: usize,
        type_: u32,
        _flags: u32,
    ) -> LV2_State_Status {
        let saved = &mut *(handle as *mut SavedState);
        let value = std::slice::from_raw_parts(value as *const u8, size).to_vec();
        saved.push((key, value, type_));

        LV2_STATE_SUCCESS
    }

    unsafe extern "C" fn retrieve(
        handle: *mut c_void,
        key: u32,
        size: *mut usize,
        type_: *mut u32,
        flags: *mut u32,
    ) -> *const c_void {
        let saved = &*(handle as *const SavedState);
        match saved.iter().find(|(saved_key, ..)| *saved_key == key) {
            Some((_, value, saved_type)) => {
                *size = value.len();
                *type_ = *saved_type;
                *flags = LV2_STATE_IS_POD;
                value.as_ptr() as *const c_void
            }
            None => ptr::null(),
        }
    }

    /// The parts of an LV2 host the wrapper needs: a URID map and the feature list.
    struct TestHost {
        _uris: Box<RefCell<Vec<CString>>>,
        map: Box<LV2_URID_Map>,
        feature: Box<LV2_Feature>,
        descriptor: Lv2Descriptor,
    }

    impl TestHost {
        fn new() -> Self {
            let uris = Box::new(RefCell::new(Vec::new()));
            let map = Box::new(LV2_URID_Map {
                handle: &*uris as *const RefCell<Vec<CString>> as *mut c_void,
                map: Some(map_uri),
            });
            let feature = Box::new(LV2_Feature {
                URI: LV2_URID__map.as_ptr() as *const c_char,
                data: &*map as *const LV2_URID_Map as *mut c_void,
            });

            Self {
                _uris: uris,
                map,
                feature,
                descriptor: Lv2Descriptor::for_plugin::<RecordingPlugin>(),
            }
        }

        fn urid(&self, uri: &[u8]) -> u32 {
            unsafe { map_uri(self.map.handle, uri.as_ptr() as *const c_char) }
        }

        fn descriptor(&self) -> &LV2_Descriptor {
            unsafe { &*self.descriptor.lv2_descriptor() }
        }

        fn instantiate(&self) -> LV2_Handle {
            let features = [&*self.feature as *const LV2_Feature, ptr::null()];
            unsafe {
                (self.descriptor().instantiate.unwrap())(
                    self.descriptor(),
                    44100.0,
                    ptr::null(),
                    features.as_ptr(),
                )
            }
        }

        fn plugin(&self, handle: LV2_Handle) -> &RecordingPlugin {
            unsafe { (*(handle as *const Instance<RecordingPlugin>)).processor.adapter().plugin() }
        }
    }

    #[test]
    fn descriptor_uri() {
        let descriptor = Lv2Descriptor::for_plugin::<RecordingPlugin>();
        assert_eq!(descriptor.uri(), "urn:hostbridge:recording");
        assert_eq!(
            unsafe { CStr::from_ptr((*descriptor.lv2_descriptor()).URI) }.to_str(),
            Ok("urn:hostbridge:recording")
        );
    }

    #[test]
    fn urid_map_is_required() {
        let host = TestHost::new();
        let features = [ptr::null::<LV2_Feature>()];
        let handle = unsafe {
            (host.descriptor().instantiate.unwrap())(
                host.descriptor(),
                44100.0,
                ptr::null(),
                features.as_ptr(),
            )
        };

        assert!(handle.is_null());
    }

    #[test]
    fn run_with_midi_and_transport() {
        let host = TestHost::new();
        let handle = host.instantiate();
        assert!(!handle.is_null());

        let float = |value: f32| value.to_ne_bytes().to_vec();
        let float_type = host.urid(LV2_ATOM__Float);
        let mut events_in = SequenceBuilder::new()
            .object(
                0,
                host.urid(LV2_ATOM__Object),
                host.urid(LV2_TIME__Position),
                &[
                    (host.urid(LV2_TIME__bar), float_type, float(0.0)),
                    (host.urid(LV2_TIME__barBeat), float_type, float(0.0)),
                    (host.urid(LV2_TIME__beatUnit), float_type, float(4.0)),
                    (host.urid(LV2_TIME__beatsPerBar), float_type, float(4.0)),
                    (host.urid(LV2_TIME__beatsPerMinute), float_type, float(120.0)),
                    (host.urid(LV2_TIME__speed), float_type, float(1.0)),
                ],
            )
            .event(1, host.urid(LV2_MIDI__MidiEvent), &[0x90, 60, 100])
            .event(2, host.urid(LV2_MIDI__MidiEvent), &[0x80, 60, 0])
            .build(host.urid(LV2_ATOM__Sequence));
        let mut events_out = [0u64; 8];

        let input = [1.0f32; 4];
        let mut left = [0.0f32; 4];
        let mut right = [0.0f32; 4];
        let mut latency = 0.0f32;
        let mut gain = 0.25f32;
        let mut panic = 0.0f32;
        let mut level = 0.0f32;

        let descriptor = host.descriptor();
        unsafe {
            let connect_port = descriptor.connect_port.unwrap();
            connect_port(handle, 0, input.as_ptr() as *mut c_void);
            connect_port(handle, 1, input.as_ptr() as *mut c_void);
            connect_port(handle, 2, left.as_mut_ptr() as *mut c_void);
            connect_port(handle, 3, right.as_mut_ptr() as *mut c_void);
            connect_port(handle, 4, events_in.as_mut_ptr() as *mut c_void);
            connect_port(handle, 5, events_out.as_mut_ptr() as *mut c_void);
            connect_port(handle, 6, &mut latency as *mut f32 as *mut c_void);
            connect_port(handle, 7, &mut gain as *mut f32 as *mut c_void);
            connect_port(handle, 8, &mut panic as *mut f32 as *mut c_void);
            connect_port(handle, 9, &mut level as *mut f32 as *mut c_void);

            (descriptor.activate.unwrap())(handle);
            (descriptor.run.unwrap())(handle, 4);
        }

        assert_eq!(left, [0.25; 4]);
        assert_eq!(level, 0.25);
        assert_eq!(latency, 64.0);

        let plugin = host.plugin(handle);
        assert_eq!(
            plugin.midi,
            [(1, vec![0x90, 60, 100]), (2, vec![0x80, 60, 0])]
        );
        assert_eq!(plugin.last_transport, Some((true, true)));

        // The output sequence is reset to an empty sequence
        let header = unsafe { &*(events_out.as_ptr() as *const LV2_Atom_Sequence) };
        assert_eq!(header.atom.size, 8);
        assert_eq!(header.atom.type_, host.urid(LV2_ATOM__Sequence));

        unsafe {
            (descriptor.deactivate.unwrap())(handle);
            (descriptor.cleanup.unwrap())(handle);
        }
    }

    #[test]
    fn state_roundtrip() {
        let host = TestHost::new();
        let handle = host.instantiate();
        let extension_data = host.descriptor().extension_data.unwrap();
        let interface = unsafe {
            &*(extension_data(LV2_STATE__interface.as_ptr() as *const c_char)
                as *const LV2_State_Interface)
        };

        let mut saved: SavedState = Vec::new();
        let saved_ptr = &mut saved as *mut SavedState as *mut c_void;
        unsafe {
            let instance = &mut *(handle as *mut Instance<RecordingPlugin>);
            assert!(instance.processor.set_state("file", "/tmp/a.wav"));
            (interface.save.unwrap())(handle, Some(store), saved_ptr, 0, ptr::null());
        }

        let key = host.urid(b"urn:hostbridge:recording#file\0");
        assert_eq!(
            saved,
            [(key, b"/tmp/a.wav\0".to_vec(), host.urid(LV2_ATOM__String))]
        );

        let other = host.instantiate();
        unsafe {
            (interface.restore.unwrap())(other, Some(retrieve), saved_ptr, 0, ptr::null());
        }
        let restored = unsafe { &*(other as *const Instance<RecordingPlugin>) };
        assert_eq!(restored.processor.adapter().state_value(0), "/tmp/a.wav");
        assert_eq!(
            host.plugin(other).calls,
            [Call::SetState("file".to_owned(), "/tmp/a.wav".to_owned())]
        );

        unsafe {
            (host.descriptor().cleanup.unwrap())(handle);
            (host.descriptor().cleanup.unwrap())(other);
        }
    }

    #[test]
    fn programs_extension() {
        let host = TestHost::new();
        let handle = host.instantiate();
        let extension_data = host.descriptor().extension_data.unwrap();
        let interface = unsafe {
            &*(extension_data(LV2_PROGRAMS__Interface.as_ptr() as *const c_char)
                as *const LV2_Programs_Interface)
        };
        assert!(unsafe { extension_data(b"urn:unknown\0".as_ptr() as *const c_char) }.is_null());

        let mut gain = 0.25f32;
        unsafe {
            (host.descriptor().connect_port.unwrap())(
                handle,
                7,
                &mut gain as *mut f32 as *mut c_void,
            );

            let program = &*(interface.get_program.unwrap())(handle, 1);
            assert_eq!((program.bank, program.program), (0, 1));
            assert_eq!(CStr::from_ptr(program.name).to_str(), Ok("Loud"));
            assert!((interface.get_program.unwrap())(handle, 2).is_null());

            // Out of range programs are ignored
            (interface.select_program.unwrap())(handle, 1, 0);
            assert_eq!(gain, 0.25);

            (interface.select_program.unwrap())(handle, 0, 1);
            assert_eq!(gain, 1.0);
            let instance = &*(handle as *const Instance<RecordingPlugin>);
            assert_eq!(instance.processor.host_value(GAIN), 1.0);

            (host.descriptor().cleanup.unwrap())(handle);
        }
    }
}
