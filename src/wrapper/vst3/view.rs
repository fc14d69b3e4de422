use crossbeam::atomic::AtomicCell;
use parking_lot::{Mutex, RwLock};
use std::ffi::{c_void, CStr};
use std::mem;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use vst3_sys::base::{kInvalidArgument, kResultFalse, kResultOk, tresult, TBool};
use vst3_sys::gui::{IPlugFrame, IPlugView, ViewRect};
use vst3_sys::utils::SharedVstPtr;
use vst3_sys::VST3;

use super::inner::WrapperInner;
use super::util::VstPtr;
use crate::context::PluginApi;
use crate::plugin::{Plugin, Vst3Plugin};
use crate::sync::SyncNote;
use crate::ui::{UiAdapter, UiConfig, UiHost};

// Alias needed for the VST3 attribute macro
use vst3_sys as vst3_com;

// NOTE: This should also be used on the BSDs, but vst3-sys exposes these interfaces only for Linux
#[cfg(target_os = "linux")]
use vst3_sys::gui::linux::{IRunLoop, ITimerHandler};

#[cfg(target_os = "linux")]
use crate::ui::IDLE_INTERVAL;

// Window handle type constants missing from vst3-sys
#[allow(unused)]
const VST3_PLATFORM_HWND: &str = "HWND";
#[allow(unused)]
const VST3_PLATFORM_NSVIEW: &str = "NSView";
#[allow(unused)]
const VST3_PLATFORM_X11_WINDOW: &str = "X11EmbedWindowID";

#[cfg(all(target_family = "unix", not(target_os = "macos")))]
const VST3_PLATFORM: &str = VST3_PLATFORM_X11_WINDOW;
#[cfg(target_os = "macos")]
const VST3_PLATFORM: &str = VST3_PLATFORM_NSVIEW;
#[cfg(target_os = "windows")]
const VST3_PLATFORM: &str = VST3_PLATFORM_HWND;

type SharedEditor<P> = Arc<Mutex<Option<UiAdapter<<P as Plugin>::Ui>>>>;

/// The plugin's [`IPlugView`] instance created in `IEditController::create_view()` if `P` has a
/// UI. The UI itself only exists while the view is attached to a parent window.
#[VST3(implements(IPlugView))]
pub(crate) struct WrapperView<P: Vst3Plugin> {
    inner: Arc<WrapperInner<P>>,
    editor: SharedEditor<P>,
    /// A size the UI asked for. Applied from the UI thread during the next idle call.
    pending_resize: Arc<AtomicCell<Option<(u32, u32)>>>,

    /// The `IPlugFrame` instance passed by the host during [`IPlugView::set_frame()`].
    plug_frame: RwLock<Option<VstPtr<dyn IPlugFrame>>>,
    /// Idles the UI from the host's GUI thread. On Linux the host's `IRunLoop` is the only way to
    /// get periodic callbacks on that thread.
    #[cfg(target_os = "linux")]
    idle_timer: RwLock<Option<(VstPtr<dyn IRunLoop>, Box<IdleTimer<P>>)>>,
}

// This doesn't need to be a separate struct, but vst3-sys does not let us implement interfaces
// conditionally and the interface is only exposed when compiling on Linux
#[cfg(target_os = "linux")]
#[VST3(implements(ITimerHandler))]
struct IdleTimer<P: Vst3Plugin> {
    /// The view unregisters this timer before it is dropped.
    view: *const WrapperView<P>,
}

/// Forwards the UI's requests to the host's `IComponentHandler`.
struct Vst3UiHost<P: Vst3Plugin> {
    inner: Arc<WrapperInner<P>>,
    pending_resize: Arc<AtomicCell<Option<(u32, u32)>>>,
}

impl<P: Vst3Plugin> UiHost for Vst3UiHost<P> {
    fn edit_parameter(&self, index: u32, started: bool) {
        let Some(&hash) = self.inner.param_hashes.get(index as usize) else {
            return;
        };

        if let Some(handler) = &*self.inner.component_handler.read() {
            unsafe {
                if started {
                    handler.begin_edit(hash);
                } else {
                    handler.end_edit(hash);
                }
            }
        }
    }

    fn set_parameter_value(&self, index: u32, value: f32) {
        let Some(&hash) = self.inner.param_hashes.get(index as usize) else {
            return;
        };

        self.inner.sync.request_parameter_value(index, value);
        if let Some(handler) = &*self.inner.component_handler.read() {
            let normalized = self.inner.ranges[index as usize].normalize(value);
            unsafe { handler.perform_edit(hash, normalized as f64) };
        }
    }

    fn set_state(&self, key: &str, value: &str) {
        if !self.inner.sync.request_state(key, value) {
            hb_warn!("The UI tried to set an unknown state key '{}'", key);
        }
    }

    fn send_note(&self, channel: u8, note: u8, velocity: u8) {
        self.inner.sync.request_note(SyncNote {
            channel,
            note,
            velocity,
        });
    }

    fn resize(&self, width: u32, height: u32) {
        self.pending_resize.store(Some((width, height)));
    }
}

impl<P: Vst3Plugin> WrapperView<P> {
    pub fn new(inner: Arc<WrapperInner<P>>) -> Box<Self> {
        Self::allocate(
            inner,
            Arc::new(Mutex::new(None)),
            Arc::new(AtomicCell::new(None)),
            RwLock::new(None),
            #[cfg(target_os = "linux")]
            RwLock::new(None),
        )
    }

    fn create_editor(&self, parent_window: Option<usize>) -> UiAdapter<P::Ui> {
        let host = Arc::new(Vst3UiHost {
            inner: self.inner.clone(),
            pending_resize: self.pending_resize.clone(),
        });

        UiAdapter::new(
            host,
            Some(self.inner.sync.clone()),
            UiConfig {
                plugin_api: PluginApi::Vst3,
                parameter_count: P::PARAMETER_COUNT,
                sample_rate: self.inner.current_sample_rate.load(Ordering::Relaxed),
                parent_window,
            },
        )
    }

    /// Deliver the plugin's changes to the UI, and apply resize requests. Called from the host's
    /// GUI thread.
    pub fn idle(&self) {
        self.inner.notify_host();

        if let Some(editor) = self.editor.lock().as_mut() {
            editor.idle();
        }

        if let Some((width, height)) = self.pending_resize.take() {
            if !self.request_resize(width, height) {
                hb_log!("The host rejected a resize to {}x{}", width, height);
            }
        }
    }

    /// Ask the host to resize the view. Will return false if the host doesn't like you.
    fn request_resize(&self, width: u32, height: u32) -> bool {
        match &*self.plug_frame.read() {
            Some(plug_frame) => {
                let mut size = ViewRect {
                    right: width as i32,
                    bottom: height as i32,
                    ..Default::default()
                };

                // The argument types are a bit wonky here because you can't construct a
                // `SharedVstPtr`. This _should_ work however.
                let plug_view: SharedVstPtr<dyn IPlugView> = unsafe { mem::transmute(self) };
                let result = unsafe { plug_frame.resize_view(plug_view, &mut size) };

                result == kResultOk
            }
            None => false,
        }
    }

    #[cfg(target_os = "linux")]
    fn start_idle_timer(&self) {
        let run_loop = match &*self.plug_frame.read() {
            Some(plug_frame) => plug_frame.cast::<dyn IRunLoop>(),
            None => None,
        };
        let Some(run_loop) = run_loop else {
            hb_warn!("The host does not provide an IRunLoop, the UI will not be idled");
            return;
        };

        let timer = IdleTimer::allocate(self as *const Self);
        let handler: SharedVstPtr<dyn ITimerHandler> = unsafe { mem::transmute(&*timer) };
        let result =
            unsafe { run_loop.register_timer(handler, IDLE_INTERVAL.as_millis() as u64) };
        if result == kResultOk {
            *self.idle_timer.write() = Some((VstPtr::from(run_loop), timer));
        } else {
            hb_debug_assert_failure!("Could not register the idle timer");
        }
    }

    #[cfg(target_os = "linux")]
    fn stop_idle_timer(&self) {
        if let Some((run_loop, timer)) = self.idle_timer.write().take() {
            let handler: SharedVstPtr<dyn ITimerHandler> = unsafe { mem::transmute(&*timer) };
            unsafe { run_loop.unregister_timer(handler) };
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn start_idle_timer(&self) {
        // Outside of Linux the UI drives its own platform event loop
    }

    #[cfg(not(target_os = "linux"))]
    fn stop_idle_timer(&self) {}
}

impl<P: Vst3Plugin> IPlugView for WrapperView<P> {
    unsafe fn is_platform_type_supported(&self, type_: vst3_sys::base::FIDString) -> tresult {
        check_null_ptr!(kInvalidArgument, type_);

        let type_ = CStr::from_ptr(type_);
        match type_.to_str() {
            Ok(type_) if type_ == VST3_PLATFORM => kResultOk,
            _ => {
                hb_debug_assert_failure!("Invalid window handle type: {:?}", type_);
                kResultFalse
            }
        }
    }

    unsafe fn attached(&self, parent: *mut c_void, type_: vst3_sys::base::FIDString) -> tresult {
        check_null_ptr!(kInvalidArgument, parent, type_);

        if CStr::from_ptr(type_).to_str() != Ok(VST3_PLATFORM) {
            hb_debug_assert_failure!("Unknown window handle type: {:?}", CStr::from_ptr(type_));
            return kInvalidArgument;
        }

        if self.editor.lock().is_some() {
            hb_debug_assert_failure!(
                "Host tried to attach editor while the editor is already attached"
            );
            return kResultFalse;
        }

        let editor = self.create_editor(Some(parent as usize));
        *self.editor.lock() = Some(editor);
        self.start_idle_timer();

        kResultOk
    }

    unsafe fn removed(&self) -> tresult {
        self.stop_idle_timer();
        match self.editor.lock().take() {
            Some(_) => kResultOk,
            None => {
                hb_debug_assert_failure!("Host tried to remove the editor without an active editor");
                kResultFalse
            }
        }
    }

    unsafe fn on_wheel(&self, _distance: f32) -> tresult {
        // The UI uses the OS' input mechanisms because very few hosts implement these functions
        kResultOk
    }

    unsafe fn on_key_down(
        &self,
        _key: vst3_sys::base::char16,
        _key_code: i16,
        _modifiers: i16,
    ) -> tresult {
        kResultOk
    }

    unsafe fn on_key_up(
        &self,
        _key: vst3_sys::base::char16,
        _key_code: i16,
        _modifiers: i16,
    ) -> tresult {
        kResultOk
    }

    unsafe fn get_size(&self, size: *mut ViewRect) -> tresult {
        check_null_ptr!(kInvalidArgument, size);

        // Hosts ask for the size before attaching the view, in which case a short lived UI is
        // created to answer the question
        let (width, height) = match self.editor.lock().as_ref() {
            Some(editor) => (editor.width(), editor.height()),
            None => {
                let editor = self.create_editor(None);
                (editor.width(), editor.height())
            }
        };

        *size = mem::zeroed();

        let size = &mut *size;
        size.right = width as i32;
        size.bottom = height as i32;

        kResultOk
    }

    unsafe fn on_size(&self, new_size: *mut ViewRect) -> tresult {
        check_null_ptr!(kInvalidArgument, new_size);

        let width = ((*new_size).right - (*new_size).left).max(0) as u32;
        let height = ((*new_size).bottom - (*new_size).top).max(0) as u32;
        if let Some(editor) = self.editor.lock().as_mut() {
            editor.resize(width, height);
        }

        kResultOk
    }

    unsafe fn on_focus(&self, _state: TBool) -> tresult {
        kResultOk
    }

    unsafe fn set_frame(&self, frame: *mut c_void) -> tresult {
        // The correct argument type is missing from the bindings
        let frame: SharedVstPtr<dyn IPlugFrame> = mem::transmute(frame);
        *self.plug_frame.write() = frame.upgrade().map(VstPtr::from);

        kResultOk
    }

    unsafe fn can_resize(&self) -> tresult {
        // Only the UI can initiate resizes
        kResultFalse
    }

    unsafe fn check_size_constraint(&self, rect: *mut ViewRect) -> tresult {
        check_null_ptr!(kInvalidArgument, rect);

        if (*rect).right - (*rect).left > 0 && (*rect).bottom - (*rect).top > 0 {
            kResultOk
        } else {
            kResultFalse
        }
    }
}

#[cfg(target_os = "linux")]
impl<P: Vst3Plugin> ITimerHandler for IdleTimer<P> {
    unsafe fn on_timer(&self) {
        (*self.view).idle();
    }
}
