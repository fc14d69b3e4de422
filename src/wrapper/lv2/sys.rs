//! Declarations from the LV2 core headers and the extensions the wrapper uses, along with the
//! KXStudio programs extension.

#![allow(non_camel_case_types, non_snake_case)]

use std::os::raw::{c_char, c_void};

pub type LV2_Handle = *mut c_void;
pub type LV2_URID = u32;
pub type LV2_URID_Map_Handle = *mut c_void;
pub type LV2_State_Handle = *mut c_void;
pub type LV2_State_Status = u32;

pub const LV2_URID__map: &[u8] = b"http://lv2plug.in/ns/ext/urid#map\0";
pub const LV2_OPTIONS__options: &[u8] = b"http://lv2plug.in/ns/ext/options#options\0";
pub const LV2_STATE__interface: &[u8] = b"http://lv2plug.in/ns/ext/state#interface\0";
pub const LV2_PROGRAMS__Interface: &[u8] = b"http://kxstudio.sf.net/ns/lv2ext/programs#Interface\0";

pub const LV2_ATOM__Blank: &[u8] = b"http://lv2plug.in/ns/ext/atom#Blank\0";
pub const LV2_ATOM__Double: &[u8] = b"http://lv2plug.in/ns/ext/atom#Double\0";
pub const LV2_ATOM__Float: &[u8] = b"http://lv2plug.in/ns/ext/atom#Float\0";
pub const LV2_ATOM__Int: &[u8] = b"http://lv2plug.in/ns/ext/atom#Int\0";
pub const LV2_ATOM__Long: &[u8] = b"http://lv2plug.in/ns/ext/atom#Long\0";
pub const LV2_ATOM__Object: &[u8] = b"http://lv2plug.in/ns/ext/atom#Object\0";
pub const LV2_ATOM__Sequence: &[u8] = b"http://lv2plug.in/ns/ext/atom#Sequence\0";
pub const LV2_ATOM__String: &[u8] = b"http://lv2plug.in/ns/ext/atom#String\0";
pub const LV2_BUF_SIZE__maxBlockLength: &[u8] =
    b"http://lv2plug.in/ns/ext/buf-size#maxBlockLength\0";
pub const LV2_BUF_SIZE__nominalBlockLength: &[u8] =
    b"http://lv2plug.in/ns/ext/buf-size#nominalBlockLength\0";
pub const LV2_MIDI__MidiEvent: &[u8] = b"http://lv2plug.in/ns/ext/midi#MidiEvent\0";
pub const LV2_TIME__Position: &[u8] = b"http://lv2plug.in/ns/ext/time#Position\0";
pub const LV2_TIME__bar: &[u8] = b"http://lv2plug.in/ns/ext/time#bar\0";
pub const LV2_TIME__barBeat: &[u8] = b"http://lv2plug.in/ns/ext/time#barBeat\0";
pub const LV2_TIME__beatUnit: &[u8] = b"http://lv2plug.in/ns/ext/time#beatUnit\0";
pub const LV2_TIME__beatsPerBar: &[u8] = b"http://lv2plug.in/ns/ext/time#beatsPerBar\0";
pub const LV2_TIME__beatsPerMinute: &[u8] = b"http://lv2plug.in/ns/ext/time#beatsPerMinute\0";
pub const LV2_TIME__frame: &[u8] = b"http://lv2plug.in/ns/ext/time#frame\0";
pub const LV2_TIME__speed: &[u8] = b"http://lv2plug.in/ns/ext/time#speed\0";

pub const LV2_STATE_SUCCESS: LV2_State_Status = 0;
pub const LV2_STATE_ERR_UNKNOWN: LV2_State_Status = 1;
pub const LV2_STATE_IS_POD: u32 = 1;
pub const LV2_STATE_IS_PORTABLE: u32 = 2;

#[repr(C)]
pub struct LV2_Feature {
    pub URI: *const c_char,
    pub data: *mut c_void,
}

#[repr(C)]
pub struct LV2_Descriptor {
    pub URI: *const c_char,
    pub instantiate: Option<
        unsafe extern "C" fn(
            descriptor: *const LV2_Descriptor,
            sample_rate: f64,
            bundle_path: *const c_char,
            features: *const *const LV2_Feature,
        ) -> LV2_Handle,
    >,
    pub connect_port: Option<unsafe extern "C" fn(instance: LV2_Handle, port: u32, data: *mut c_void)>,
    pub activate: Option<unsafe extern "C" fn(instance: LV2_Handle)>,
    pub run: Option<unsafe extern "C" fn(instance: LV2_Handle, sample_count: u32)>,
    pub deactivate: Option<unsafe extern "C" fn(instance: LV2_Handle)>,
    pub cleanup: Option<unsafe extern "C" fn(instance: LV2_Handle)>,
    pub extension_data: Option<unsafe extern "C" fn(uri: *const c_char) -> *const c_void>,
}

#[repr(C)]
pub struct LV2_URID_Map {
    pub handle: LV2_URID_Map_Handle,
    pub map: Option<unsafe extern "C" fn(handle: LV2_URID_Map_Handle, uri: *const c_char) -> LV2_URID>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LV2_Atom {
    pub size: u32,
    pub type_: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LV2_Atom_Sequence_Body {
    pub unit: u32,
    pub pad: u32,
}

#[repr(C)]
pub struct LV2_Atom_Sequence {
    pub atom: LV2_Atom,
    pub body: LV2_Atom_Sequence_Body,
}

#[repr(C)]
pub struct LV2_Options_Option {
    pub context: u32,
    pub subject: u32,
    pub key: LV2_URID,
    pub size: u32,
    pub type_: LV2_URID,
    pub value: *const c_void,
}

pub type LV2_State_Store_Function = Option<
    unsafe extern "C" fn(
        handle: LV2_State_Handle,
        key: u32,
        value: *const c_void,
        size: usize,
        type_: u32,
        flags: u32,
    ) -> LV2_State_Status,
>;

pub type LV2_State_Retrieve_Function = Option<
    unsafe extern "C" fn(
        handle: LV2_State_Handle,
        key: u32,
        size: *mut usize,
        type_: *mut u32,
        flags: *mut u32,
    ) -> *const c_void,
>;

#[repr(C)]
pub struct LV2_State_Interface {
    pub save: Option<
        unsafe extern "C" fn(
            instance: LV2_Handle,
            store: LV2_State_Store_Function,
            handle: LV2_State_Handle,
            flags: u32,
            features: *const *const LV2_Feature,
        ) -> LV2_State_Status,
    >,
    pub restore: Option<
        unsafe extern "C" fn(
            instance: LV2_Handle,
            retrieve: LV2_State_Retrieve_Function,
            handle: LV2_State_Handle,
            flags: u32,
            features: *const *const LV2_Feature,
        ) -> LV2_State_Status,
    >,
}

#[repr(C)]
pub struct LV2_Program_Descriptor {
    pub bank: u32,
    pub program: u32,
    pub name: *const c_char,
}

#[repr(C)]
pub struct LV2_Programs_Interface {
    pub get_program:
        Option<unsafe extern "C" fn(instance: LV2_Handle, index: u32) -> *const LV2_Program_Descriptor>,
    pub select_program: Option<unsafe extern "C" fn(instance: LV2_Handle, bank: u32, program: u32)>,
}
