//! Declarations from `dssi.h`, and the parts of ALSA's `seq_event.h` it uses.

#![allow(non_camel_case_types, non_snake_case)]

use std::os::raw::{c_char, c_int, c_uchar, c_ulong};

use crate::wrapper::ladspa::sys::{LADSPA_Descriptor, LADSPA_Handle};

pub const DSSI_API_VERSION: c_int = 1;

/// Returned from `get_midi_controller_for_port()` for ports without a MIDI mapping.
pub const DSSI_NONE: c_int = -1;

/// Keys starting with this prefix are reserved for the DSSI specification itself.
pub const DSSI_RESERVED_CONFIGURE_PREFIX: &str = "DSSI:";
/// Keys starting with this prefix are sent to all instances of a plugin.
pub const DSSI_GLOBAL_CONFIGURE_PREFIX: &str = "GLOBAL:";

pub const SND_SEQ_EVENT_NOTEON: c_uchar = 6;
pub const SND_SEQ_EVENT_NOTEOFF: c_uchar = 7;
pub const SND_SEQ_EVENT_KEYPRESS: c_uchar = 8;
pub const SND_SEQ_EVENT_CONTROLLER: c_uchar = 10;
pub const SND_SEQ_EVENT_PGMCHANGE: c_uchar = 11;
pub const SND_SEQ_EVENT_CHANPRESS: c_uchar = 12;
pub const SND_SEQ_EVENT_PITCHBEND: c_uchar = 13;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct snd_seq_addr_t {
    pub client: c_uchar,
    pub port: c_uchar,
}

/// `snd_seq_timestamp_t` is a union of a tick time and a real time. DSSI only ever uses the tick
/// time, which holds the event's frame offset.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct snd_seq_timestamp_t {
    pub tick: u32,
    pub _real_time_nsec: u32,
}

/// The event data union. Only the note and controller variants are used, see the accessors on
/// [`snd_seq_event_t`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct snd_seq_event_data_t {
    pub raw32: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct snd_seq_event_t {
    pub type_: c_uchar,
    pub flags: c_uchar,
    pub tag: c_uchar,
    pub queue: c_uchar,
    pub time: snd_seq_timestamp_t,
    pub source: snd_seq_addr_t,
    pub dest: snd_seq_addr_t,
    pub data: snd_seq_event_data_t,
}

impl snd_seq_event_t {
    fn data_bytes(&self) -> [u8; 12] {
        let mut bytes = [0; 12];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.data.raw32) {
            chunk.copy_from_slice(&word.to_ne_bytes());
        }

        bytes
    }

    /// `snd_seq_ev_note_t`'s `(channel, note, velocity)`.
    pub fn note(&self) -> (u8, u8, u8) {
        let bytes = self.data_bytes();
        (bytes[0], bytes[1], bytes[2])
    }

    /// `snd_seq_ev_ctrl_t`'s `(channel, param, value)`.
    pub fn control(&self) -> (u8, u32, i32) {
        (
            self.data_bytes()[0],
            self.data.raw32[1],
            self.data.raw32[2] as i32,
        )
    }
}

#[repr(C)]
pub struct DSSI_Program_Descriptor {
    pub Bank: c_ulong,
    pub Program: c_ulong,
    pub Name: *const c_char,
}

#[repr(C)]
pub struct DSSI_Descriptor {
    pub DSSI_API_Version: c_int,
    pub LADSPA_Plugin: *const LADSPA_Descriptor,
    pub configure: Option<
        unsafe extern "C" fn(
            instance: LADSPA_Handle,
            key: *const c_char,
            value: *const c_char,
        ) -> *mut c_char,
    >,
    pub get_program: Option<
        unsafe extern "C" fn(instance: LADSPA_Handle, index: c_ulong) -> *const DSSI_Program_Descriptor,
    >,
    pub select_program:
        Option<unsafe extern "C" fn(instance: LADSPA_Handle, bank: c_ulong, program: c_ulong)>,
    pub get_midi_controller_for_port:
        Option<unsafe extern "C" fn(instance: LADSPA_Handle, port: c_ulong) -> c_int>,
    pub run_synth: Option<
        unsafe extern "C" fn(
            instance: LADSPA_Handle,
            sample_count: c_ulong,
            events: *mut snd_seq_event_t,
            event_count: c_ulong,
        ),
    >,
    pub run_synth_adding: Option<
        unsafe extern "C" fn(
            instance: LADSPA_Handle,
            sample_count: c_ulong,
            events: *mut snd_seq_event_t,
            event_count: c_ulong,
        ),
    >,
    pub run_multiple_synths: Option<
        unsafe extern "C" fn(
            instance_count: c_ulong,
            instances: *mut LADSPA_Handle,
            sample_count: c_ulong,
            events: *mut *mut snd_seq_event_t,
            event_counts: *mut c_ulong,
        ),
    >,
    pub run_multiple_synths_adding: Option<
        unsafe extern "C" fn(
            instance_count: c_ulong,
            instances: *mut LADSPA_Handle,
            sample_count: c_ulong,
            events: *mut *mut snd_seq_event_t,
            event_counts: *mut c_ulong,
        ),
    >,
}
