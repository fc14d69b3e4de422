use atomic_float::AtomicF64;
use atomic_refcell::AtomicRefCell;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use vst3_sys::vst::{IComponentHandler, RestartFlags};

use super::util::{VstPtr, PROGRAM_PARAM_HASH, PROGRAM_PARAM_ID};
use crate::context::PluginApi;
use crate::param::ParameterRanges;
use crate::plugin::{PluginConfig, PluginFeatures, Vst3Plugin};
use crate::state::StateError;
use crate::sync::ParamSync;
use crate::wrapper::adapter::PluginInfo;
use crate::wrapper::block::{AudioBuffers, BlockProcessor};
use crate::wrapper::state;
use crate::wrapper::util::{hash_param_id, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE};

/// Sentinel for [`WrapperInner::current_program`] when no program has been loaded yet.
const NO_PROGRAM: u32 = u32::MAX;

/// The actual wrapper bits. This is shared between the component and its views, and since we can't
/// combine that with VST3's interior reference counting this just has to be moved to its own
/// struct.
pub(crate) struct WrapperInner<P: Vst3Plugin> {
    /// The wrapped plugin. The audio thread only ever tries to lock this. If the host is restoring
    /// state at the same time, the block is skipped and the outputs are cleared.
    pub processor: Mutex<BlockProcessor<P>>,
    /// Only borrowed by the process call and by `IAudioProcessor::setupProcessing()`, which the host
    /// never calls while processing.
    pub scratch: AtomicRefCell<ProcessScratch>,
    /// A clone of the processor's channel to the UI. The edit controller reads parameter values
    /// from here so it never has to wait for the audio thread.
    pub sync: Arc<ParamSync>,
    /// Parameter, program, and state descriptions.
    pub info: PluginInfo,
    pub ranges: Box<[ParameterRanges]>,

    /// The host's `IComponentHandler` instance, if passed through
    /// `IEditController::set_component_handler`.
    pub component_handler: RwLock<Option<VstPtr<dyn IComponentHandler>>>,

    /// Whether the plugin is currently processing audio. In other words, the last state
    /// `IAudioProcessor::setProcessing()` has been called with.
    pub is_processing: AtomicBool,
    /// The last loaded program, or [`NO_PROGRAM`].
    pub current_program: AtomicU32,
    /// The sample rate from the last `IAudioProcessor::setupProcessing()` call, so the editor can
    /// read it without locking the plugin.
    pub current_sample_rate: AtomicF64,
    /// The current latency in samples, as last reported by the plugin.
    pub current_latency: AtomicU32,
    /// Set from the audio thread when the latency changed. The host is informed the next time it
    /// calls into the component from the main thread.
    pub latency_changed: AtomicBool,

    /// The parameter ID hashes, indexed by parameter index. Parameter IDs are hashed from the
    /// parameters' symbols so automation survives reordering parameters.
    pub param_hashes: Vec<u32>,
    /// The inverse of `param_hashes`.
    pub param_index_by_hash: HashMap<u32, u32>,
}

pub(crate) struct ProcessScratch {
    pub buffers: AudioBuffers,
    /// The last value sent to the host for every output parameter, so unchanged values are not
    /// sent again.
    pub output_values: Box<[f32]>,
}

impl<P: Vst3Plugin> WrapperInner<P> {
    pub fn new() -> Arc<Self> {
        let processor = BlockProcessor::<P>::new(
            PluginApi::Vst3,
            PluginConfig::new(DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE),
        );
        let sync = processor.sync().clone();
        let info = processor.adapter().info().clone();
        let ranges = info.parameters.iter().map(|p| p.ranges).collect();
        let latency = processor.adapter().latency();
        let sample_rate = processor.adapter().sample_rate();

        let param_hashes: Vec<u32> = info
            .parameters
            .iter()
            .map(|parameter| hash_param_id(&parameter.symbol))
            .collect();
        let param_index_by_hash: HashMap<u32, u32> = param_hashes
            .iter()
            .enumerate()
            .map(|(index, &hash)| (hash, index as u32))
            .collect();
        hb_debug_assert_eq!(
            param_index_by_hash.len(),
            param_hashes.len(),
            "Parameter symbols must be unique"
        );
        hb_debug_assert!(
            !param_index_by_hash.contains_key(&*PROGRAM_PARAM_HASH),
            "The parameter symbol '{}' is reserved for the wrapper's program parameter",
            PROGRAM_PARAM_ID
        );

        Arc::new(Self {
            processor: Mutex::new(processor),
            scratch: AtomicRefCell::new(ProcessScratch {
                buffers: AudioBuffers::new(P::NUM_INPUTS, P::NUM_OUTPUTS, DEFAULT_BUFFER_SIZE),
                output_values: vec![f32::NAN; P::PARAMETER_COUNT as usize].into(),
            }),
            sync,
            info,
            ranges,

            component_handler: RwLock::new(None),

            is_processing: AtomicBool::new(false),
            current_program: AtomicU32::new(NO_PROGRAM),
            current_sample_rate: AtomicF64::new(sample_rate),
            current_latency: AtomicU32::new(latency),
            latency_changed: AtomicBool::new(false),

            param_hashes,
            param_index_by_hash,
        })
    }

    /// Whether the plugin's programs are exposed through the program list parameter.
    pub fn has_programs(&self) -> bool {
        P::FEATURES.contains(PluginFeatures::WANT_PROGRAMS) && !self.info.program_names.is_empty()
    }

    pub fn program_count(&self) -> u32 {
        self.info.program_names.len() as u32
    }

    pub fn current_program(&self) -> Option<u32> {
        match self.current_program.load(Ordering::Relaxed) {
            NO_PROGRAM => None,
            program => Some(program),
        }
    }

    pub fn param_index(&self, hash: u32) -> Option<u32> {
        self.param_index_by_hash.get(&hash).copied()
    }

    /// The program list parameter's normalized value for a program index.
    pub fn program_to_normalized(&self, program: u32) -> f64 {
        match self.program_count() {
            0 | 1 => 0.0,
            count => program.min(count - 1) as f64 / (count - 1) as f64,
        }
    }

    pub fn normalized_to_program(&self, normalized: f64) -> u32 {
        match self.program_count() {
            0 => 0,
            count => (normalized.clamp(0.0, 1.0) * (count - 1) as f64).round() as u32,
        }
    }

    /// The parameter's current value as seen by the UI and the host, normalized.
    pub fn normalized_value(&self, index: u32) -> f32 {
        self.ranges[index as usize].normalize(self.sync.published_value(index))
    }

    /// Set a parameter from the edit controller. The value is applied at the start of the next
    /// block, the same way a UI edit is.
    pub fn set_normalized_value(&self, index: u32, normalized: f32) {
        let value = self.ranges[index as usize].unnormalize(normalized);
        self.sync.request_parameter_value(index, value);
    }

    /// Load a program from the edit controller while the plugin is not processing audio.
    pub fn load_program(&self, program: u32) -> bool {
        let loaded = self.processor.lock().load_program(program);
        if loaded {
            self.current_program.store(program, Ordering::Relaxed);
        }

        loaded
    }

    /// Serialize the plugin's state, as stored in the host's project.
    pub fn save_state(&self) -> Result<Vec<u8>, StateError> {
        state::serialize_json(&self.info, &self.sync, self.current_program())
    }

    /// Restore state produced by [`save_state()`][Self::save_state()].
    pub fn load_state(&self, data: &[u8]) -> Result<(), StateError> {
        let program = state::deserialize_json(&mut *self.processor.lock(), data)?;
        if let Some(program) = program {
            if program < self.program_count() {
                self.current_program.store(program, Ordering::Relaxed);
            }
        }

        Ok(())
    }

    /// Called from the audio thread with the plugin's latency after every block.
    pub fn update_latency(&self, latency: u32) {
        if self.current_latency.swap(latency, Ordering::Relaxed) != latency {
            self.latency_changed.store(true, Ordering::Release);
        }
    }

    /// Inform the host about changes that happened on the audio thread. Must be called from the
    /// main thread.
    pub fn notify_host(&self) {
        if self.latency_changed.swap(false, Ordering::Acquire) {
            self.restart_component(RestartFlags::kLatencyChanged as i32);
        }
    }

    /// Ask the host to rescan parts of the component. This is a bit set of the flags from
    /// [`vst3_sys::vst::RestartFlags`].
    pub fn restart_component(&self, flags: i32) {
        match &*self.component_handler.read() {
            Some(handler) => unsafe {
                handler.restart_component(flags);
            },
            None => hb_log!("No component handler has been set, not restarting the component"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_plugin::{RecordingPlugin, GAIN, LEVEL};

    #[test]
    fn parameter_hashes_are_stable() {
        let inner = WrapperInner::<RecordingPlugin>::new();

        assert_eq!(inner.param_hashes.len(), 3);
        assert_eq!(inner.param_hashes[GAIN as usize], hash_param_id("gain"));
        assert_eq!(inner.param_index(hash_param_id("level")), Some(LEVEL));
        assert_eq!(inner.param_index(*PROGRAM_PARAM_HASH), None);
    }

    #[test]
    fn program_parameter_mapping() {
        let inner = WrapperInner::<RecordingPlugin>::new();

        assert!(inner.has_programs());
        assert_eq!(inner.program_to_normalized(1), 1.0);
        assert_eq!(inner.normalized_to_program(0.4), 0);
        assert_eq!(inner.normalized_to_program(0.6), 1);
        assert_eq!(inner.current_program(), None);

        assert!(inner.load_program(1));
        assert_eq!(inner.current_program(), Some(1));
        assert_eq!(inner.normalized_value(GAIN), 1.0);
        assert!(!inner.load_program(2));
    }

    #[test]
    fn state_roundtrip() {
        let inner = WrapperInner::<RecordingPlugin>::new();
        inner.set_normalized_value(GAIN, 0.25);
        inner.processor.lock().set_state("file", "/tmp/b.wav");

        let saved = inner.save_state().unwrap();

        let other = WrapperInner::<RecordingPlugin>::new();
        other.load_state(&saved).unwrap();
        assert_eq!(other.normalized_value(GAIN), 0.25);
        assert_eq!(other.processor.lock().adapter().state_value(0), "/tmp/b.wav");
        assert!(other.load_state(b"not json").is_err());
    }

    #[test]
    fn controller_edits_do_not_wait_for_the_audio_thread() {
        let inner = WrapperInner::<RecordingPlugin>::new();

        let processor = inner.processor.lock();
        inner.set_normalized_value(GAIN, 0.75);
        assert_eq!(inner.normalized_value(GAIN), 0.75);
        assert!(inner.save_state().is_ok());
        assert_eq!(
            inner.current_sample_rate.load(Ordering::Relaxed),
            processor.adapter().sample_rate()
        );
        drop(processor);

        assert_eq!(inner.sync.take_pending_value(GAIN), Some(0.75));
    }

    #[test]
    fn latency_changes_are_reported_once() {
        let inner = WrapperInner::<RecordingPlugin>::new();

        inner.update_latency(inner.current_latency.load(Ordering::Relaxed));
        assert!(!inner.latency_changed.load(Ordering::Relaxed));

        inner.update_latency(128);
        assert!(inner.latency_changed.load(Ordering::Relaxed));
        inner.notify_host();
        assert!(!inner.latency_changed.load(Ordering::Relaxed));
    }
}
