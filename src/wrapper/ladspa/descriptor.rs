use std::ffi::CString;
use std::os::raw::{c_char, c_ulong, c_void};
use std::ptr;

use super::instance::{self, InstanceConfig};
use super::sys::*;
use crate::context::PluginApi;
use crate::param::ParameterHints;
use crate::plugin::{Plugin, PluginFeatures};
use crate::wrapper::adapter::PluginInfo;
use crate::wrapper::block::{PortKind, PortLayout};

/// A static LADSPA descriptor for a plugin, along with the strings and port tables it points to.
/// DSSI descriptors embed one of these with the DSSI port layout.
///
/// This cannot be cloned or moved out of its heap allocations, as the descriptor contains pointers
/// to the other fields.
pub struct LadspaDescriptor {
    label: CString,
    name: CString,
    maker: CString,
    copyright: CString,

    port_descriptors: Vec<LADSPA_PortDescriptor>,
    port_names: Vec<CString>,
    port_name_ptrs: Vec<*const c_char>,
    port_range_hints: Vec<LADSPA_PortRangeHint>,
    config: Box<InstanceConfig>,

    descriptor: Option<LADSPA_Descriptor>,
}

unsafe impl Send for LadspaDescriptor {}
unsafe impl Sync for LadspaDescriptor {}

impl LadspaDescriptor {
    pub fn for_plugin<P: Plugin>(plugin_api: PluginApi, layout: PortLayout) -> Self {
        let info = PluginInfo::describe::<P>();
        if plugin_api == PluginApi::Ladspa {
            if P::FEATURES.contains(PluginFeatures::WANT_STATE) {
                hb_warn!("'{}' stores state, but LADSPA cannot save it", P::NAME);
            }
            if P::FEATURES.contains(PluginFeatures::IS_SYNTH) {
                hb_warn!("'{}' is an instrument, but LADSPA has no MIDI input", P::NAME);
            }
        }

        let mut port_descriptors = Vec::with_capacity(layout.port_count() as usize);
        let mut port_names = Vec::with_capacity(layout.port_count() as usize);
        let mut port_range_hints = Vec::with_capacity(layout.port_count() as usize);
        for port in 0..layout.port_count() {
            let (descriptor, name, hint) = match layout.kind(port) {
                Some(PortKind::AudioInput(channel)) => (
                    LADSPA_PORT_AUDIO | LADSPA_PORT_INPUT,
                    format!("Audio Input {}", channel + 1),
                    unbounded_hint(),
                ),
                Some(PortKind::AudioOutput(channel)) => (
                    LADSPA_PORT_AUDIO | LADSPA_PORT_OUTPUT,
                    format!("Audio Output {}", channel + 1),
                    unbounded_hint(),
                ),
                Some(PortKind::Latency) => (
                    LADSPA_PORT_CONTROL | LADSPA_PORT_OUTPUT,
                    String::from("_latency"),
                    unbounded_hint(),
                ),
                Some(PortKind::SampleRate) => (
                    LADSPA_PORT_CONTROL | LADSPA_PORT_OUTPUT,
                    String::from("_sample-rate"),
                    unbounded_hint(),
                ),
                Some(PortKind::Parameter(index)) => {
                    let parameter = &info.parameters[index as usize];
                    let direction = if parameter.is_output() {
                        LADSPA_PORT_OUTPUT
                    } else {
                        LADSPA_PORT_INPUT
                    };

                    let mut hint_descriptor = LADSPA_HINT_BOUNDED_BELOW
                        | LADSPA_HINT_BOUNDED_ABOVE
                        | super::default_hint(&parameter.ranges);
                    if parameter.hints.contains(ParameterHints::BOOLEAN) {
                        hint_descriptor |= LADSPA_HINT_TOGGLED;
                    }
                    if parameter.hints.contains(ParameterHints::INTEGER) {
                        hint_descriptor |= LADSPA_HINT_INTEGER;
                    }
                    if parameter.hints.contains(ParameterHints::LOGARITHMIC) {
                        hint_descriptor |= LADSPA_HINT_LOGARITHMIC;
                    }

                    (
                        LADSPA_PORT_CONTROL | direction,
                        parameter.name.clone(),
                        LADSPA_PortRangeHint {
                            HintDescriptor: hint_descriptor,
                            LowerBound: parameter.ranges.min,
                            UpperBound: parameter.ranges.max,
                        },
                    )
                }
                // LADSPA has no event ports, and `PortLayout::ladspa()` and `PortLayout::dssi()`
                // never contain them
                Some(PortKind::EventInput | PortKind::EventOutput) | None => unreachable!(),
            };

            port_descriptors.push(descriptor);
            port_names.push(CString::new(name).expect("Port name contained null bytes"));
            port_range_hints.push(hint);
        }

        let mut descriptor = Self {
            label: CString::new(P::LABEL).expect("`LABEL` contained null bytes"),
            name: CString::new(P::NAME).expect("`NAME` contained null bytes"),
            maker: CString::new(P::MAKER).expect("`MAKER` contained null bytes"),
            copyright: CString::new(P::LICENSE).expect("`LICENSE` contained null bytes"),

            port_descriptors,
            port_names,
            port_name_ptrs: Vec::new(),
            port_range_hints,
            config: Box::new(InstanceConfig { plugin_api, layout }),

            descriptor: None,
        };

        // NOTE: This is safe without pinning this struct because all of the data is already stored
        //       on the heap
        descriptor.port_name_ptrs = descriptor
            .port_names
            .iter()
            .map(|name| name.as_ptr())
            .collect();
        descriptor.descriptor = Some(LADSPA_Descriptor {
            UniqueID: P::UNIQUE_ID as c_ulong,
            Label: descriptor.label.as_ptr(),
            Properties: LADSPA_PROPERTY_REALTIME | LADSPA_PROPERTY_HARD_RT_CAPABLE,
            Name: descriptor.name.as_ptr(),
            Maker: descriptor.maker.as_ptr(),
            Copyright: descriptor.copyright.as_ptr(),
            PortCount: descriptor.port_descriptors.len() as c_ulong,
            PortDescriptors: descriptor.port_descriptors.as_ptr(),
            PortNames: descriptor.port_name_ptrs.as_ptr(),
            PortRangeHints: descriptor.port_range_hints.as_ptr(),
            ImplementationData: &*descriptor.config as *const InstanceConfig as *mut c_void,
            instantiate: Some(instance::instantiate::<P>),
            connect_port: Some(instance::connect_port::<P>),
            activate: Some(instance::activate::<P>),
            run: Some(instance::run::<P>),
            run_adding: None,
            set_run_adding_gain: None,
            deactivate: Some(instance::deactivate::<P>),
            cleanup: Some(instance::cleanup::<P>),
        });

        descriptor
    }

    pub fn ladspa_descriptor(&self) -> *const LADSPA_Descriptor {
        self.descriptor
            .as_ref()
            .map(|descriptor| descriptor as *const LADSPA_Descriptor)
            .unwrap_or(ptr::null())
    }
}

fn unbounded_hint() -> LADSPA_PortRangeHint {
    LADSPA_PortRangeHint {
        HintDescriptor: 0,
        LowerBound: 0.0,
        UpperBound: 0.0,
    }
}
