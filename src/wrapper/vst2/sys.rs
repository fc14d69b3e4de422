//! The subset of the VST 2.4 ABI the wrapper uses. Names follow the original headers so they can be
//! cross-referenced with host code.

#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals)]

use std::os::raw::{c_char, c_void};

use crate::plugin::cconst;

pub type AEffectDispatcherProc = unsafe extern "C" fn(
    effect: *mut AEffect,
    opcode: i32,
    index: i32,
    value: isize,
    ptr: *mut c_void,
    opt: f32,
) -> isize;
pub type AEffectProcessProc =
    unsafe extern "C" fn(effect: *mut AEffect, inputs: *mut *mut f32, outputs: *mut *mut f32, frames: i32);
pub type AEffectProcessDoubleProc =
    unsafe extern "C" fn(effect: *mut AEffect, inputs: *mut *mut f64, outputs: *mut *mut f64, frames: i32);
pub type AEffectSetParameterProc =
    unsafe extern "C" fn(effect: *mut AEffect, index: i32, parameter: f32);
pub type AEffectGetParameterProc = unsafe extern "C" fn(effect: *mut AEffect, index: i32) -> f32;

/// The host's callback, passed to `VSTPluginMain()`.
pub type audioMasterCallback = unsafe extern "C" fn(
    effect: *mut AEffect,
    opcode: i32,
    index: i32,
    value: isize,
    ptr: *mut c_void,
    opt: f32,
) -> isize;

pub const kEffectMagic: i32 = cconst(b'V', b's', b't', b'P') as i32;
pub const kVstVersion: isize = 2400;

#[repr(C)]
pub struct AEffect {
    pub magic: i32,
    pub dispatcher: Option<AEffectDispatcherProc>,
    pub process: Option<AEffectProcessProc>,
    pub setParameter: Option<AEffectSetParameterProc>,
    pub getParameter: Option<AEffectGetParameterProc>,
    pub numPrograms: i32,
    pub numParams: i32,
    pub numInputs: i32,
    pub numOutputs: i32,
    pub flags: i32,
    pub resvd1: isize,
    pub resvd2: isize,
    pub initialDelay: i32,
    pub realQualities: i32,
    pub offQualities: i32,
    pub ioRatio: f32,
    pub object: *mut c_void,
    pub user: *mut c_void,
    pub uniqueID: i32,
    pub version: i32,
    pub processReplacing: Option<AEffectProcessProc>,
    pub processDoubleReplacing: Option<AEffectProcessDoubleProc>,
    pub future: [c_char; 56],
}

pub const effFlagsHasEditor: i32 = 1 << 0;
pub const effFlagsCanReplacing: i32 = 1 << 4;
pub const effFlagsProgramChunks: i32 = 1 << 5;
pub const effFlagsIsSynth: i32 = 1 << 8;
pub const effFlagsNoSoundInStop: i32 = 1 << 9;

pub const effOpen: i32 = 0;
pub const effClose: i32 = 1;
pub const effSetProgram: i32 = 2;
pub const effGetProgram: i32 = 3;
pub const effSetProgramName: i32 = 4;
pub const effGetProgramName: i32 = 5;
pub const effGetParamLabel: i32 = 6;
pub const effGetParamDisplay: i32 = 7;
pub const effGetParamName: i32 = 8;
pub const effSetSampleRate: i32 = 10;
pub const effSetBlockSize: i32 = 11;
pub const effMainsChanged: i32 = 12;
pub const effEditGetRect: i32 = 13;
pub const effEditOpen: i32 = 14;
pub const effEditClose: i32 = 15;
pub const effEditIdle: i32 = 19;
pub const effGetChunk: i32 = 23;
pub const effSetChunk: i32 = 24;
pub const effProcessEvents: i32 = 25;
pub const effCanBeAutomated: i32 = 26;
pub const effGetProgramNameIndexed: i32 = 29;
pub const effGetPlugCategory: i32 = 35;
pub const effGetEffectName: i32 = 45;
pub const effGetVendorString: i32 = 47;
pub const effGetProductString: i32 = 48;
pub const effGetVendorVersion: i32 = 49;
pub const effCanDo: i32 = 51;
pub const effGetVstVersion: i32 = 58;
pub const effStartProcess: i32 = 71;
pub const effStopProcess: i32 = 72;

pub const audioMasterAutomate: i32 = 0;
pub const audioMasterVersion: i32 = 1;
pub const audioMasterGetTime: i32 = 7;
pub const audioMasterIOChanged: i32 = 13;
pub const audioMasterSizeWindow: i32 = 15;
pub const audioMasterGetSampleRate: i32 = 16;
pub const audioMasterGetBlockSize: i32 = 17;
pub const audioMasterBeginEdit: i32 = 43;
pub const audioMasterEndEdit: i32 = 44;

pub const kPlugCategEffect: isize = 1;
pub const kPlugCategSynth: isize = 2;

pub const kVstMaxProgNameLen: usize = 24;
pub const kVstMaxParamStrLen: usize = 8;
pub const kVstMaxVendorStrLen: usize = 64;
pub const kVstMaxProductStrLen: usize = 64;
pub const kVstMaxEffectNameLen: usize = 32;

pub const kVstMidiType: i32 = 1;
pub const kVstSysExType: i32 = 6;

/// A list of events. `events` is a variable length array of `numEvents` pointers.
#[repr(C)]
pub struct VstEvents {
    pub numEvents: i32,
    pub reserved: isize,
    pub events: [*mut VstEvent; 2],
}

/// The common header of every event type.
#[repr(C)]
pub struct VstEvent {
    pub type_: i32,
    pub byteSize: i32,
    pub deltaFrames: i32,
    pub flags: i32,
    pub data: [c_char; 16],
}

#[repr(C)]
pub struct VstMidiEvent {
    pub type_: i32,
    pub byteSize: i32,
    pub deltaFrames: i32,
    pub flags: i32,
    pub noteLength: i32,
    pub noteOffset: i32,
    pub midiData: [u8; 4],
    pub detune: c_char,
    pub noteOffVelocity: c_char,
    pub reserved1: c_char,
    pub reserved2: c_char,
}

#[repr(C)]
pub struct VstMidiSysexEvent {
    pub type_: i32,
    pub byteSize: i32,
    pub deltaFrames: i32,
    pub flags: i32,
    pub dumpBytes: i32,
    pub resvd1: isize,
    pub sysexDump: *mut c_char,
    pub resvd2: isize,
}

pub const kVstTransportChanged: i32 = 1;
pub const kVstTransportPlaying: i32 = 1 << 1;
pub const kVstNanosValid: i32 = 1 << 8;
pub const kVstPpqPosValid: i32 = 1 << 9;
pub const kVstTempoValid: i32 = 1 << 10;
pub const kVstBarsValid: i32 = 1 << 11;
pub const kVstTimeSigValid: i32 = 1 << 13;

#[repr(C)]
pub struct VstTimeInfo {
    pub samplePos: f64,
    pub sampleRate: f64,
    pub nanoSeconds: f64,
    pub ppqPos: f64,
    pub tempo: f64,
    pub barStartPos: f64,
    pub cycleStartPos: f64,
    pub cycleEndPos: f64,
    pub timeSigNumerator: i32,
    pub timeSigDenominator: i32,
    pub smpteOffset: i32,
    pub smpteFrameRate: i32,
    pub samplesToNextClock: i32,
    pub flags: i32,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ERect {
    pub top: i16,
    pub left: i16,
    pub bottom: i16,
    pub right: i16,
}
