//! The subset of the CoreAudio and AudioUnit v2 C API the bridge touches. These are declared by
//! hand so the bridge can be built and tested on every platform. The native component glue passes
//! these structs through unchanged.

#![allow(non_camel_case_types, non_upper_case_globals)]

use std::ffi::c_void;

pub type OSStatus = i32;
pub type Boolean = u8;
pub type AudioUnitParameterID = u32;
pub type AudioUnitRenderActionFlags = u32;

pub const noErr: OSStatus = 0;
pub const kAudioUnitErr_InvalidProperty: OSStatus = -10879;
pub const kAudioUnitErr_InvalidParameter: OSStatus = -10878;
pub const kAudioUnitErr_InvalidElement: OSStatus = -10877;
pub const kAudioUnitErr_TooManyFramesToProcess: OSStatus = -10874;
pub const kAudioUnitErr_InvalidPropertyValue: OSStatus = -10851;
pub const kAudioUnitErr_Uninitialized: OSStatus = -10867;
pub const kAudioUnitErr_CannotDoInCurrentContext: OSStatus = -10863;
pub const kAudioUnitErr_InvalidOfflineRender: OSStatus = -10848;

/// Set by the plugin when every output sample is zero.
pub const kAudioUnitRenderAction_OutputIsSilence: AudioUnitRenderActionFlags = 1 << 4;

pub const kAudioUnitParameterUnit_Generic: u32 = 0;
pub const kAudioUnitParameterUnit_Indexed: u32 = 1;
pub const kAudioUnitParameterUnit_Boolean: u32 = 2;
pub const kAudioUnitParameterUnit_Decibels: u32 = 13;
pub const kAudioUnitParameterUnit_Hertz: u32 = 8;
pub const kAudioUnitParameterUnit_Milliseconds: u32 = 24;

pub const kAudioUnitParameterFlag_MeterReadOnly: u32 = 1 << 15;
pub const kAudioUnitParameterFlag_DisplayLogarithmic: u32 = 1 << 22;
pub const kAudioUnitParameterFlag_IsReadable: u32 = 1 << 30;
pub const kAudioUnitParameterFlag_IsWritable: u32 = 1 << 31;

pub const kAudioTimeStampSampleTimeValid: u32 = 1 << 0;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AudioBuffer {
    pub mNumberChannels: u32,
    pub mDataByteSize: u32,
    pub mData: *mut c_void,
}

/// A variable length list of buffers. `mBuffers` contains `mNumberBuffers` elements.
#[repr(C)]
pub struct AudioBufferList {
    pub mNumberBuffers: u32,
    pub mBuffers: [AudioBuffer; 1],
}

impl AudioBufferList {
    /// # Safety
    ///
    /// `index` must be smaller than `mNumberBuffers`.
    pub unsafe fn buffer(&self, index: usize) -> &AudioBuffer {
        &*self.mBuffers.as_ptr().add(index)
    }

    /// # Safety
    ///
    /// `index` must be smaller than `mNumberBuffers`.
    pub unsafe fn buffer_mut(&mut self, index: usize) -> &mut AudioBuffer {
        &mut *self.mBuffers.as_mut_ptr().add(index)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SMPTETime {
    pub mSubframes: i16,
    pub mSubframeDivisor: i16,
    pub mCounter: u32,
    pub mType: u32,
    pub mFlags: u32,
    pub mHours: i16,
    pub mMinutes: i16,
    pub mSeconds: i16,
    pub mFrames: i16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioTimeStamp {
    pub mSampleTime: f64,
    pub mHostTime: u64,
    pub mRateScalar: f64,
    pub mWordClockTime: u64,
    pub mSMPTETime: SMPTETime,
    pub mFlags: u32,
    pub mReserved: u32,
}

pub type HostCallback_GetBeatAndTempo = unsafe extern "C" fn(
    inHostUserData: *mut c_void,
    outCurrentBeat: *mut f64,
    outCurrentTempo: *mut f64,
) -> OSStatus;

pub type HostCallback_GetMusicalTimeLocation = unsafe extern "C" fn(
    inHostUserData: *mut c_void,
    outDeltaSampleOffsetToNextBeat: *mut u32,
    outTimeSig_Numerator: *mut f32,
    outTimeSig_Denominator: *mut u32,
    outCurrentMeasureDownBeat: *mut f64,
) -> OSStatus;

pub type HostCallback_GetTransportState = unsafe extern "C" fn(
    inHostUserData: *mut c_void,
    outIsPlaying: *mut Boolean,
    outTransportStateChanged: *mut Boolean,
    outCurrentSampleInTimeLine: *mut f64,
    outIsCycling: *mut Boolean,
    outCycleStartBeat: *mut f64,
    outCycleEndBeat: *mut f64,
) -> OSStatus;

pub type HostCallback_GetTransportState2 = unsafe extern "C" fn(
    inHostUserData: *mut c_void,
    outIsPlaying: *mut Boolean,
    outIsRecording: *mut Boolean,
    outTransportStateChanged: *mut Boolean,
    outCurrentSampleInTimeLine: *mut f64,
    outIsCycling: *mut Boolean,
    outCycleStartBeat: *mut f64,
    outCycleEndBeat: *mut f64,
) -> OSStatus;

/// The value of `kAudioUnitProperty_HostCallbacks`. Any of the procs may be missing.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HostCallbackInfo {
    pub hostUserData: *mut c_void,
    pub beatAndTempoProc: Option<HostCallback_GetBeatAndTempo>,
    pub musicalTimeLocationProc: Option<HostCallback_GetMusicalTimeLocation>,
    pub transportStateProc: Option<HostCallback_GetTransportState>,
    pub transportStateProc2: Option<HostCallback_GetTransportState2>,
}

unsafe impl Send for HostCallbackInfo {}
unsafe impl Sync for HostCallbackInfo {}
