//! The plugin's optional control surface. A UI is written once against the [`Ui`] trait, and the
//! wrappers host it either in the host's process (driven by the host's idle callbacks) or in a
//! separate process that talks to the host over OSC.
//!
//! The bridge never draws anything itself. A UI only has to report its size, repaint when idling,
//! and react to the notifications below. All outward communication goes through the [`UiHandle`]
//! passed to [`Ui::new()`].

use atomic_float::AtomicF32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::context::PluginApi;
use crate::sync::ParamSync;

/// How often a UI should be idled when the bridge runs its own event loop.
pub const IDLE_INTERVAL: Duration = Duration::from_millis(30);

/// Window events forwarded by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    Show,
    Hide,
}

/// A plugin UI. None of these functions are ever called from the audio thread.
#[allow(unused_variables)]
pub trait Ui: 'static {
    /// Create the UI. Everything the UI needs to know about its host is available through
    /// `handle`, including the parent window it should embed itself into.
    fn new(handle: UiHandle) -> Self
    where
        Self: Sized;

    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Called periodically, roughly every [`IDLE_INTERVAL`]. This is where the UI should repaint.
    fn idle(&mut self) {}

    /// The host resized the UI's window.
    fn resize(&mut self, width: u32, height: u32) {}

    /// A window event from the host. Returns whether the event was handled.
    fn on_event(&mut self, event: UiEvent) -> bool {
        false
    }

    /// A parameter changed, either because the host automated it or because the plugin changed an
    /// output parameter. This is not called for changes the UI made itself.
    fn parameter_changed(&mut self, index: u32, value: f32);

    /// The host loaded a program. This is followed by `parameter_changed()` calls for every
    /// parameter.
    fn program_changed(&mut self, index: u32) {}

    /// The host restored a piece of state.
    fn state_changed(&mut self, key: &str, value: &str) {}

    /// A note was received on the plugin's MIDI input. A velocity of zero means note off.
    fn note_received(&mut self, channel: u8, note: u8, velocity: u8) {}
}

/// A placeholder for plugins without a UI.
pub struct NoUi;

impl Ui for NoUi {
    fn new(_handle: UiHandle) -> Self {
        NoUi
    }

    fn width(&self) -> u32 {
        0
    }

    fn height(&self) -> u32 {
        0
    }

    fn parameter_changed(&mut self, _index: u32, _value: f32) {}
}

/// The callbacks from a UI to its host. Wrappers implement this for the way their format
/// communicates edits, e.g. by writing to the [`ParamSync`] and informing the host about gestures,
/// or by sending OSC messages to a DSSI host.
pub trait UiHost: Send + Sync {
    /// Begin (`started == true`) or end an automation gesture for a parameter.
    fn edit_parameter(&self, index: u32, started: bool);
    fn set_parameter_value(&self, index: u32, value: f32);
    fn set_state(&self, key: &str, value: &str);
    /// Send a note to the plugin. A velocity of zero means note off.
    fn send_note(&self, channel: u8, note: u8, velocity: u8);
    /// Ask the host to resize the UI's window.
    fn resize(&self, width: u32, height: u32);
}

/// Everything a UI needs to know about its host at construction time.
#[derive(Debug, Clone, Copy)]
pub struct UiConfig {
    pub plugin_api: PluginApi,
    pub parameter_count: u32,
    pub sample_rate: f64,
    /// A platform window handle (an X11 window ID, an `HWND`, or an `NSView` pointer) the UI
    /// should embed itself into, if the host provided one.
    pub parent_window: Option<usize>,
}

struct UiHandleInner {
    host: Arc<dyn UiHost>,
    config: UiConfig,
    /// The last value the UI has seen or set for every parameter.
    ui_values: Box<[AtomicF32]>,
    close_requested: AtomicBool,
}

/// The UI's connection to its host. This can be cloned freely.
#[derive(Clone)]
pub struct UiHandle {
    inner: Arc<UiHandleInner>,
}

impl UiHandle {
    fn new(host: Arc<dyn UiHost>, config: UiConfig) -> Self {
        Self {
            inner: Arc::new(UiHandleInner {
                host,
                config,
                ui_values: (0..config.parameter_count)
                    .map(|_| AtomicF32::new(0.0))
                    .collect(),
                close_requested: AtomicBool::new(false),
            }),
        }
    }

    pub fn plugin_api(&self) -> PluginApi {
        self.inner.config.plugin_api
    }

    pub fn sample_rate(&self) -> f64 {
        self.inner.config.sample_rate
    }

    pub fn parent_window(&self) -> Option<usize> {
        self.inner.config.parent_window
    }

    /// Begin or end an automation gesture. Wrap calls to
    /// [`set_parameter_value()`][Self::set_parameter_value()] in these when the user drags a
    /// control.
    pub fn edit_parameter(&self, index: u32, started: bool) {
        if index >= self.inner.config.parameter_count {
            hb_debug_assert_failure!("Parameter index {} is out of range", index);
            return;
        }

        self.inner.host.edit_parameter(index, started);
    }

    /// Change a parameter's value. The UI will not receive a `parameter_changed()` call for this
    /// change.
    pub fn set_parameter_value(&self, index: u32, value: f32) {
        let ui_value = match self.inner.ui_values.get(index as usize) {
            Some(ui_value) => ui_value,
            None => {
                hb_debug_assert_failure!("Parameter index {} is out of range", index);
                return;
            }
        };

        ui_value.store(value, Ordering::Relaxed);
        self.inner.host.set_parameter_value(index, value);
    }

    pub fn set_state(&self, key: &str, value: &str) {
        self.inner.host.set_state(key, value);
    }

    /// Send a note on, or a note off if `velocity` is zero. All values must be valid MIDI values.
    pub fn send_note(&self, channel: u8, note: u8, velocity: u8) {
        if channel > 15 || note > 127 || velocity > 127 {
            hb_debug_assert_failure!(
                "Invalid note: channel {}, note {}, velocity {}",
                channel,
                note,
                velocity
            );
            return;
        }

        self.inner.host.send_note(channel, note, velocity);
    }

    /// Ask the host to resize the UI's window.
    pub fn set_size(&self, width: u32, height: u32) {
        self.inner.host.resize(width, height);
    }

    /// Ask the wrapper to close the UI. Hosts that own the window may ignore this.
    pub fn request_close(&self) {
        self.inner.close_requested.store(true, Ordering::Relaxed);
    }

    fn ui_value(&self, index: u32) -> f32 {
        self.inner.ui_values[index as usize].load(Ordering::Relaxed)
    }

    fn set_ui_value(&self, index: u32, value: f32) {
        self.inner.ui_values[index as usize].store(value, Ordering::Relaxed);
    }
}

/// Owns a UI instance and drives it. Notifications only ever reach the UI from
/// [`idle()`][Self::idle()] or from the `*_changed()` functions below, which the wrappers only call
/// from the UI thread.
pub struct UiAdapter<U: Ui> {
    ui: U,
    handle: UiHandle,
    /// Set for in-process UIs. Process-isolated UIs receive their notifications through the
    /// `*_changed()` functions instead.
    sync: Option<Arc<ParamSync>>,
}

impl<U: Ui> UiAdapter<U> {
    /// Create the UI. When `sync` is set, the UI immediately receives the current value of every
    /// parameter and state.
    pub fn new(host: Arc<dyn UiHost>, sync: Option<Arc<ParamSync>>, config: UiConfig) -> Self {
        let handle = UiHandle::new(host, config);
        let ui = U::new(handle.clone());

        let mut adapter = Self { ui, handle, sync };
        if let Some(sync) = adapter.sync.clone() {
            adapter.resync_parameters(&sync);
            for state in sync.current_states() {
                adapter.ui.state_changed(&state.key, &state.value);
            }
        }

        adapter
    }

    pub fn width(&self) -> u32 {
        self.ui.width()
    }

    pub fn height(&self) -> u32 {
        self.ui.height()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.ui.resize(width, height);
    }

    pub fn on_event(&mut self, event: UiEvent) -> bool {
        self.ui.on_event(event)
    }

    /// Whether the UI asked to be closed through [`UiHandle::request_close()`].
    pub fn is_close_requested(&self) -> bool {
        self.handle.inner.close_requested.load(Ordering::Relaxed)
    }

    /// Deliver everything the plugin published since the last call, and then let the UI repaint.
    pub fn idle(&mut self) {
        if let Some(sync) = self.sync.clone() {
            if let Some(program) = sync.take_program() {
                self.ui.program_changed(program);
                self.resync_parameters(&sync);
            }

            for index in 0..self.handle.inner.config.parameter_count {
                let value = sync.published_value(index);
                if value != self.handle.ui_value(index) {
                    self.handle.set_ui_value(index, value);
                    self.ui.parameter_changed(index, value);
                }
            }

            let ui = &mut self.ui;
            sync.drain_published_states(|key, value| ui.state_changed(key, value));

            while let Some(note) = sync.pop_input_note() {
                self.ui.note_received(note.channel, note.note, note.velocity);
            }
        }

        self.ui.idle();
    }

    /// A parameter changed in the plugin. Used by wrappers that receive changes as messages.
    pub fn parameter_changed(&mut self, index: u32, value: f32) {
        if index >= self.handle.inner.config.parameter_count {
            hb_debug_assert_failure!("Parameter index {} is out of range", index);
            return;
        }

        self.handle.set_ui_value(index, value);
        self.ui.parameter_changed(index, value);
    }

    pub fn program_changed(&mut self, index: u32) {
        self.ui.program_changed(index);
    }

    pub fn state_changed(&mut self, key: &str, value: &str) {
        self.ui.state_changed(key, value);
    }

    pub fn note_received(&mut self, channel: u8, note: u8, velocity: u8) {
        self.ui.note_received(channel, note, velocity);
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    /// Send every parameter's current value to the UI.
    fn resync_parameters(&mut self, sync: &ParamSync) {
        for index in 0..self.handle.inner.config.parameter_count {
            let value = sync.published_value(index);
            self.handle.set_ui_value(index, value);
            self.ui.parameter_changed(index, value);
        }
    }
}
