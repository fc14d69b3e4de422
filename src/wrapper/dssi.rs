//! The DSSI wrapper. DSSI is LADSPA with MIDI input, programs, `configure()` for state, and an
//! out-of-process UI that talks to the host over OSC. The plugin side reuses the LADSPA instance,
//! the UI side lives in [`remote`].

use midi_consts::channel_event as midi;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_ulong};
use std::ptr;

use self::sys::*;
use crate::context::PluginApi;
use crate::midi::MidiEvent;
use crate::plugin::Plugin;
use crate::program::{bank_and_program, real_program};
use crate::wrapper::block::PortLayout;
use crate::wrapper::ladspa::instance::Instance;
use crate::wrapper::ladspa::sys::LADSPA_Handle;
use crate::wrapper::ladspa::LadspaDescriptor;

pub mod osc;
#[cfg(feature = "remote_ui")]
pub mod remote;
pub mod sys;

/// A DSSI descriptor, which embeds a LADSPA descriptor using the DSSI port layout.
pub struct DssiDescriptor {
    ladspa: Box<LadspaDescriptor>,
    descriptor: DSSI_Descriptor,
}

unsafe impl Send for DssiDescriptor {}
unsafe impl Sync for DssiDescriptor {}

impl DssiDescriptor {
    pub fn for_plugin<P: Plugin>() -> Self {
        let ladspa = Box::new(LadspaDescriptor::for_plugin::<P>(
            PluginApi::Dssi,
            PortLayout::dssi::<P>(),
        ));

        // NOTE: This is safe without pinning this struct because the LADSPA descriptor is boxed
        let descriptor = DSSI_Descriptor {
            DSSI_API_Version: DSSI_API_VERSION,
            LADSPA_Plugin: ladspa.ladspa_descriptor(),
            configure: Some(configure::<P>),
            get_program: Some(get_program::<P>),
            select_program: Some(select_program::<P>),
            get_midi_controller_for_port: Some(get_midi_controller_for_port),
            run_synth: Some(run_synth::<P>),
            run_synth_adding: None,
            run_multiple_synths: None,
            run_multiple_synths_adding: None,
        };

        Self { ladspa, descriptor }
    }

    pub fn ladspa_descriptor(&self) -> *const crate::wrapper::ladspa::sys::LADSPA_Descriptor {
        self.ladspa.ladspa_descriptor()
    }

    pub fn dssi_descriptor(&self) -> *const DSSI_Descriptor {
        &self.descriptor
    }
}

/// Backs the pointer returned from `get_program()`. It stays valid until the next call.
pub(crate) struct ProgramSlot {
    name: CString,
    descriptor: DSSI_Program_Descriptor,
}

impl Default for ProgramSlot {
    fn default() -> Self {
        Self {
            name: CString::default(),
            descriptor: DSSI_Program_Descriptor {
                Bank: 0,
                Program: 0,
                Name: ptr::null(),
            },
        }
    }
}

impl ProgramSlot {
    fn update(&mut self, index: u32, name: &str) -> *const DSSI_Program_Descriptor {
        let (bank, program) = bank_and_program(index);
        self.name = CString::new(name).unwrap_or_default();
        self.descriptor = DSSI_Program_Descriptor {
            Bank: bank as c_ulong,
            Program: program as c_ulong,
            Name: self.name.as_ptr(),
        };

        &self.descriptor
    }
}

/// Decode an ALSA sequencer event. Program changes are handled by the host through
/// `select_program()`, and other event types are not supported.
pub fn decode_seq_event(event: &snd_seq_event_t) -> Option<MidiEvent<'static>> {
    let frame = event.time.tick;
    match event.type_ {
        SND_SEQ_EVENT_NOTEON => {
            let (channel, note, velocity) = event.note();
            MidiEvent::note_on(frame, channel, note, velocity)
        }
        SND_SEQ_EVENT_NOTEOFF => {
            let (channel, note, _) = event.note();
            MidiEvent::note_off(frame, channel, note, 0)
        }
        SND_SEQ_EVENT_KEYPRESS => {
            let (channel, note, pressure) = event.note();
            MidiEvent::from_channel_message(
                frame,
                midi::POLYPHONIC_KEY_PRESSURE,
                channel,
                note,
                pressure,
            )
        }
        SND_SEQ_EVENT_CONTROLLER => {
            let (channel, param, value) = event.control();
            if param >= 128 {
                return None;
            }

            MidiEvent::from_channel_message(
                frame,
                midi::CONTROL_CHANGE,
                channel,
                param as u8,
                value.clamp(0, 127) as u8,
            )
        }
        SND_SEQ_EVENT_CHANPRESS => {
            let (channel, _, value) = event.control();
            MidiEvent::from_channel_message(
                frame,
                midi::CHANNEL_KEY_PRESSURE,
                channel,
                value.clamp(0, 127) as u8,
                0,
            )
        }
        SND_SEQ_EVENT_PITCHBEND => {
            let (channel, _, value) = event.control();
            MidiEvent::pitch_bend(frame, channel, value.clamp(-8192, 8191) as i16)
        }
        _ => None,
    }
}

unsafe extern "C" fn configure<P: Plugin>(
    instance: LADSPA_Handle,
    key: *const c_char,
    value: *const c_char,
) -> *mut c_char {
    check_null_ptr!(ptr::null_mut(), instance, key, value);

    let instance = &mut *(instance as *mut Instance<P>);
    let (key, value) = match (CStr::from_ptr(key).to_str(), CStr::from_ptr(value).to_str()) {
        (Ok(key), Ok(value)) => (key, value),
        _ => {
            hb_warn!("Ignoring a 'configure()' call with non-UTF-8 data");
            return ptr::null_mut();
        }
    };

    if key.starts_with(DSSI_RESERVED_CONFIGURE_PREFIX)
        || key.starts_with(DSSI_GLOBAL_CONFIGURE_PREFIX)
    {
        return ptr::null_mut();
    }

    if instance.processor.adapter().info().state_index(key).is_some() {
        instance.processor.set_state(key, value);
    } else {
        hb_warn!("Ignoring unknown configure key '{}'", key);
    }

    ptr::null_mut()
}

unsafe extern "C" fn get_program<P: Plugin>(
    instance: LADSPA_Handle,
    index: c_ulong,
) -> *const DSSI_Program_Descriptor {
    check_null_ptr!(ptr::null(), instance);

    let instance = &mut *(instance as *mut Instance<P>);
    let index = index as u32;
    if index >= instance.processor.adapter().program_count() {
        return ptr::null();
    }

    let Instance {
        processor,
        program_slot,
        ..
    } = instance;
    program_slot.update(index, processor.adapter().program_name(index))
}

unsafe extern "C" fn select_program<P: Plugin>(
    instance: LADSPA_Handle,
    bank: c_ulong,
    program: c_ulong,
) {
    check_null_ptr!((), instance);

    let instance = &mut *(instance as *mut Instance<P>);
    let program_count = instance.processor.adapter().program_count();
    let index = match real_program(bank as u32, program as u32, program_count) {
        Some(index) => index,
        None => return,
    };

    if instance.processor.load_program(index) {
        instance.write_controls();
    }
}

unsafe extern "C" fn get_midi_controller_for_port(
    _instance: LADSPA_Handle,
    _port: c_ulong,
) -> c_int {
    DSSI_NONE
}

unsafe extern "C" fn run_synth<P: Plugin>(
    instance: LADSPA_Handle,
    sample_count: c_ulong,
    events: *mut snd_seq_event_t,
    event_count: c_ulong,
) {
    check_null_ptr!((), instance);

    let events = if events.is_null() || event_count == 0 {
        &[][..]
    } else {
        std::slice::from_raw_parts(events, event_count as usize)
    };

    (*(instance as *mut Instance<P>)).run(sample_count as u32, events);
}

/// Export one or more DSSI plugins from this library using the provided plugin types. This also
/// exports the plugins as LADSPA plugins using the DSSI port layout, so this cannot be combined with
/// [`hb_export_ladspa!()`][crate::hb_export_ladspa!()] in the same library.
#[macro_export]
macro_rules! hb_export_dssi {
    ($($plugin_ty:ty),+) => {
        #[doc(hidden)]
        mod dssi {
            // Because the `$plugin_ty`s are likely defined in the enclosing scope. This works even
            // if the types are not public because this is a child module.
            use super::*;

            const PLUGIN_COUNT: usize = [$(stringify!($plugin_ty)),+].len();

            static DESCRIPTORS: ::std::sync::OnceLock<
                [$crate::wrapper::dssi::DssiDescriptor; PLUGIN_COUNT]
            > = ::std::sync::OnceLock::new();

            fn descriptors() -> &'static [$crate::wrapper::dssi::DssiDescriptor; PLUGIN_COUNT] {
                DESCRIPTORS.get_or_init(|| {
                    $crate::wrapper::setup_logger();

                    [$($crate::wrapper::dssi::DssiDescriptor::for_plugin::<$plugin_ty>()),+]
                })
            }

            #[no_mangle]
            pub extern "C" fn ladspa_descriptor(
                index: ::std::os::raw::c_ulong,
            ) -> *const $crate::wrapper::ladspa::sys::LADSPA_Descriptor {
                match descriptors().get(index as usize) {
                    Some(descriptor) => descriptor.ladspa_descriptor(),
                    None => ::std::ptr::null(),
                }
            }

            /// The DSSI plugin's entry point.
            #[no_mangle]
            pub extern "C" fn dssi_descriptor(
                index: ::std::os::raw::c_ulong,
            ) -> *const $crate::wrapper::dssi::sys::DSSI_Descriptor {
                match descriptors().get(index as usize) {
                    Some(descriptor) => descriptor.dssi_descriptor(),
                    None => ::std::ptr::null(),
                }
            }
        }
    };
}
