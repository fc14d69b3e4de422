//! The channel between the audio thread and the UI for formats where both live in the same process.
//! Neither direction ever blocks the audio thread. Values overwrite each other instead of being
//! queued, so the UI always sees the latest value, and it sees it at most one idle period late.
//!
//! - UI to DSP: parameter edits go into per-parameter pending slots, state edits go into
//!   per-key slots that the audio thread only ever `try_lock()`s, and notes go into a bounded
//!   lock-free queue. The audio thread applies all of these at the start of the next block.
//! - DSP to UI: input parameters are published whenever the plugin's value changes, and output
//!   parameters after every block. The UI compares these against its own last observed values
//!   while idling. Program changes use a
//!   single "next program" slot, and state restored by the host is published from the
//!   (non-realtime) thread that restored it.

use atomic_float::AtomicF32;
use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::state::StateEntry;
use crate::ui::UiHost;
use crate::wrapper::adapter::PluginInfo;

/// The number of notes that can be in flight between two blocks in either direction.
const NOTE_QUEUE_CAPACITY: usize = 128;

/// A note on or note off sent from the UI to the plugin, or from the plugin's input to the UI. A
/// velocity of zero means note off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncNote {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
}

/// A single state value shared between two threads. The `String`s are reused, so once the slot has
/// been written to once handing values back and forth does not allocate on the audio thread.
#[derive(Debug, Default)]
struct StateSlot {
    value: String,
    dirty: bool,
}

/// Shared between a plugin instance's audio thread and its UI. Wrappers create one per instance,
/// see the module docs for the protocol.
pub struct ParamSync {
    /// Values requested by the UI that have not yet been applied by the audio thread.
    pending_values: Box<[AtomicF32]>,
    pending_dirty: Box<[AtomicBool]>,
    /// State values requested by the UI, indexed the same way as the plugin's states.
    pending_states: Box<[Mutex<StateSlot>]>,
    ui_notes: ArrayQueue<SyncNote>,

    /// The last value for each parameter as seen by the audio thread.
    published_values: Box<[AtomicF32]>,
    /// The last program index loaded by the host, or -1.
    next_program: AtomicI32,
    /// State values changed by the host.
    published_states: Box<[Mutex<StateSlot>]>,
    input_notes: ArrayQueue<SyncNote>,

    state_keys: Box<[String]>,
}

impl ParamSync {
    /// Create the channel for a plugin. The published values start out at the parameters'
    /// defaults, and the state slots are empty.
    pub fn new(info: &PluginInfo) -> Self {
        let parameter_count = info.parameters.len();
        let state_count = info.states.len();

        Self {
            pending_values: (0..parameter_count).map(|_| AtomicF32::new(0.0)).collect(),
            pending_dirty: (0..parameter_count).map(|_| AtomicBool::new(false)).collect(),
            pending_states: (0..state_count)
                .map(|_| Mutex::new(StateSlot::default()))
                .collect(),
            ui_notes: ArrayQueue::new(NOTE_QUEUE_CAPACITY),

            published_values: info
                .parameters
                .iter()
                .map(|parameter| AtomicF32::new(parameter.ranges.def))
                .collect(),
            next_program: AtomicI32::new(-1),
            published_states: info
                .states
                .iter()
                .map(|state| {
                    Mutex::new(StateSlot {
                        value: state.value.clone(),
                        dirty: false,
                    })
                })
                .collect(),
            input_notes: ArrayQueue::new(NOTE_QUEUE_CAPACITY),

            state_keys: info.states.iter().map(|state| state.key.clone()).collect(),
        }
    }

    pub fn parameter_count(&self) -> u32 {
        self.published_values.len() as u32
    }

    pub fn state_count(&self) -> u32 {
        self.state_keys.len() as u32
    }

    pub fn state_key(&self, index: u32) -> Option<&str> {
        self.state_keys.get(index as usize).map(String::as_str)
    }

    pub fn state_index(&self, key: &str) -> Option<u32> {
        self.state_keys
            .iter()
            .position(|k| k == key)
            .map(|index| index as u32)
    }

    //
    // UI to DSP
    //

    /// Request a new value for a parameter from the UI thread. The value is also published right
    /// away so the UI does not see its old value again before the audio thread has caught up.
    pub fn request_parameter_value(&self, index: u32, value: f32) {
        let index = index as usize;
        match (self.pending_values.get(index), self.pending_dirty.get(index)) {
            (Some(pending_value), Some(pending_dirty)) => {
                pending_value.store(value, Ordering::Relaxed);
                pending_dirty.store(true, Ordering::Release);
                self.published_values[index].store(value, Ordering::Relaxed);
            }
            _ => hb_debug_assert_failure!("Parameter index {} is out of range", index),
        }
    }

    /// Take the pending value for a parameter if the UI has changed it since the last call. Called
    /// from the audio thread.
    pub fn take_pending_value(&self, index: u32) -> Option<f32> {
        let index = index as usize;
        let pending_dirty = self.pending_dirty.get(index)?;
        if pending_dirty.swap(false, Ordering::Acquire) {
            Some(self.pending_values[index].load(Ordering::Relaxed))
        } else {
            None
        }
    }

    /// Whether the UI has requested a value for this parameter that the audio thread has not yet
    /// taken.
    pub fn has_pending_value(&self, index: u32) -> bool {
        self.pending_dirty
            .get(index as usize)
            .map(|dirty| dirty.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Request a state change from the UI thread. Returns `false` if the key is unknown. The value
    /// also becomes the published value, without marking it as changed for the UI.
    pub fn request_state(&self, key: &str, value: &str) -> bool {
        let index = match self.state_index(key) {
            Some(index) => index as usize,
            None => {
                hb_debug_assert_failure!("Unknown state key '{}'", key);
                return false;
            }
        };

        {
            let mut slot = self.pending_states[index].lock();
            slot.value.clear();
            slot.value.push_str(value);
            slot.dirty = true;
        }

        let mut published = self.published_states[index].lock();
        published.value.clear();
        published.value.push_str(value);

        true
    }

    /// If the UI has changed state `index`, swap its new value into `value` and return `true`. The
    /// old contents of `value` are kept around in the slot for the next request. If the UI thread
    /// is currently writing to the slot this returns `false` and the value is picked up during the
    /// next block. Called from the audio thread.
    pub fn swap_pending_state(&self, index: u32, value: &mut String) -> bool {
        let mut slot = match self
            .pending_states
            .get(index as usize)
            .and_then(|slot| slot.try_lock())
        {
            Some(slot) => slot,
            None => return false,
        };

        if !slot.dirty {
            return false;
        }

        std::mem::swap(&mut slot.value, value);
        slot.dirty = false;

        true
    }

    /// Send a note from the UI to the plugin. Returns `false` if the queue is full.
    pub fn request_note(&self, note: SyncNote) -> bool {
        self.ui_notes.push(note).is_ok()
    }

    /// Take the next note sent by the UI. Called from the audio thread.
    pub fn pop_ui_note(&self) -> Option<SyncNote> {
        self.ui_notes.pop()
    }

    //
    // DSP to UI
    //

    /// Publish a parameter's current value so the UI can pick it up during its next idle call.
    pub fn publish_value(&self, index: u32, value: f32) {
        if let Some(published_value) = self.published_values.get(index as usize) {
            published_value.store(value, Ordering::Relaxed);
        }
    }

    pub fn published_value(&self, index: u32) -> f32 {
        self.published_values
            .get(index as usize)
            .map(|value| value.load(Ordering::Relaxed))
            .unwrap_or(0.0)
    }

    /// Inform the UI that the host loaded a program. Only the last program is kept.
    pub fn publish_program(&self, index: u32) {
        self.next_program.store(index as i32, Ordering::Release);
    }

    /// Take the last program the host loaded, if it has changed since the last call.
    pub fn take_program(&self) -> Option<u32> {
        let index = self.next_program.swap(-1, Ordering::Acquire);
        (index >= 0).then_some(index as u32)
    }

    /// Inform the UI about a state value restored by the host. This locks, so it must not be called
    /// from the audio thread.
    pub fn publish_state(&self, index: u32, value: &str) {
        if let Some(slot) = self.published_states.get(index as usize) {
            let mut slot = slot.lock();
            slot.value.clear();
            slot.value.push_str(value);
            slot.dirty = true;
        }
    }

    /// Call `f` for every state value the host changed since the last call. Called from the UI
    /// thread.
    pub fn drain_published_states(&self, mut f: impl FnMut(&str, &str)) {
        for (key, slot) in self.state_keys.iter().zip(self.published_states.iter()) {
            let mut slot = slot.lock();
            if slot.dirty {
                slot.dirty = false;
                f(key, &slot.value);
            }
        }
    }

    /// The last known value for every state, for when a UI is first opened.
    pub fn current_states(&self) -> Vec<StateEntry> {
        self.state_keys
            .iter()
            .zip(self.published_states.iter())
            .map(|(key, slot)| StateEntry::new(key.as_str(), slot.lock().value.as_str()))
            .collect()
    }

    /// Forward an incoming note to the UI. Notes are dropped when the UI is not draining the queue.
    /// Called from the audio thread.
    pub fn publish_note(&self, note: SyncNote) {
        let _ = self.input_notes.push(note);
    }

    pub fn pop_input_note(&self) -> Option<SyncNote> {
        self.input_notes.pop()
    }
}

/// An in-process UI talks to the plugin through the channel directly. Wrappers whose hosts want to
/// know about gestures or resizes wrap this in their own [`UiHost`].
impl UiHost for ParamSync {
    fn edit_parameter(&self, _index: u32, _started: bool) {}

    fn set_parameter_value(&self, index: u32, value: f32) {
        self.request_parameter_value(index, value);
    }

    fn set_state(&self, key: &str, value: &str) {
        self.request_state(key, value);
    }

    fn send_note(&self, channel: u8, note: u8, velocity: u8) {
        if !self.request_note(SyncNote {
            channel,
            note,
            velocity,
        }) {
            hb_trace!("The UI note queue is full, dropping a note");
        }
    }

    fn resize(&self, _width: u32, _height: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_plugin::RecordingPlugin;

    fn make_sync() -> ParamSync {
        ParamSync::new(&PluginInfo::describe::<RecordingPlugin>())
    }

    #[test]
    fn pending_values_are_taken_once() {
        let sync = make_sync();
        assert_eq!(sync.take_pending_value(0), None);

        sync.request_parameter_value(0, 0.25);
        sync.request_parameter_value(0, 0.75);
        assert_eq!(sync.published_value(0), 0.75);
        assert_eq!(sync.take_pending_value(0), Some(0.75));
        assert_eq!(sync.take_pending_value(0), None);
    }

    #[test]
    fn published_values_start_at_defaults() {
        let sync = make_sync();
        assert_eq!(sync.published_value(0), 0.5);
        assert_eq!(sync.published_value(99), 0.0);
    }

    #[test]
    fn program_slot_is_last_writer_wins() {
        let sync = make_sync();
        assert_eq!(sync.take_program(), None);

        sync.publish_program(0);
        sync.publish_program(1);
        assert_eq!(sync.take_program(), Some(1));
        assert_eq!(sync.take_program(), None);
    }

    #[test]
    fn state_swap_reuses_strings() {
        let sync = make_sync();
        assert!(sync.request_state("file", "/tmp/a.wav"));

        let mut value = String::from("old");
        assert!(sync.swap_pending_state(0, &mut value));
        assert_eq!(value, "/tmp/a.wav");
        assert!(!sync.swap_pending_state(0, &mut value));

        // The slot now holds the audio thread's old string
        assert!(sync.request_state("file", "/tmp/b.wav"));
        assert!(sync.swap_pending_state(0, &mut value));
        assert_eq!(value, "/tmp/b.wav");
    }

    #[test]
    fn ui_state_is_published_silently() {
        let sync = make_sync();
        assert!(sync.request_state("file", "/tmp/ui.wav"));
        assert_eq!(sync.current_states()[0].value, "/tmp/ui.wav");

        let mut seen = 0;
        sync.drain_published_states(|_, _| seen += 1);
        assert_eq!(seen, 0);
    }

    #[test]
    fn locked_state_slot_is_skipped() {
        let sync = make_sync();
        assert!(sync.request_state("file", "x"));

        let _guard = sync.pending_states[0].lock();
        let mut value = String::new();
        assert!(!sync.swap_pending_state(0, &mut value));
    }

    #[test]
    fn published_states_drain_once() {
        let sync = make_sync();
        sync.publish_state(0, "restored");

        let mut seen = Vec::new();
        sync.drain_published_states(|key, value| seen.push((key.to_owned(), value.to_owned())));
        sync.drain_published_states(|key, value| seen.push((key.to_owned(), value.to_owned())));
        assert_eq!(seen, [("file".to_owned(), "restored".to_owned())]);
        assert_eq!(sync.current_states()[0].value, "restored");
    }

    #[test]
    fn note_queue_is_bounded() {
        let sync = make_sync();
        let note = SyncNote {
            channel: 0,
            note: 60,
            velocity: 100,
        };
        for _ in 0..NOTE_QUEUE_CAPACITY {
            assert!(sync.request_note(note));
        }
        assert!(!sync.request_note(note));
        assert_eq!(sync.pop_ui_note(), Some(note));
    }
}
