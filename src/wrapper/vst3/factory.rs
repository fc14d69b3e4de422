use std::ffi::c_void;
use std::marker::PhantomData;
use std::mem;
use vst3_sys::base::{kInvalidArgument, kResultOk, tresult};
use vst3_sys::base::{IPluginFactory, IPluginFactory2, IPluginFactory3, IUnknown};
use vst3_sys::VST3;

// Alias needed for the VST3 attribute macro
use vst3_sys as vst3_com;

use super::util::u16strlcpy;
use super::wrapper::Wrapper;
use crate::plugin::Vst3Plugin;
use crate::wrapper::util::strlcpy;

/// The VST3 SDK version this is roughly based on. The bindings include some VST 3.7 things but not
/// everything, so we'll play it safe.
const VST3_SDK_VERSION: &str = "VST 3.6.14";

const CATEGORY: &str = "Audio Module Class";

#[doc(hidden)]
#[VST3(implements(IPluginFactory, IPluginFactory2, IPluginFactory3))]
pub struct Factory<P: Vst3Plugin> {
    /// The type will be used for constructing plugin instances later.
    _phantom: PhantomData<P>,
}

impl<P: Vst3Plugin> Factory<P> {
    pub fn new() -> Box<Self> {
        Self::allocate(PhantomData)
    }
}

/// The plugin's version as a dotted string, decoded from [`Plugin::VERSION`][crate::plugin::Plugin::VERSION].
pub fn version_string<P: Vst3Plugin>() -> String {
    let version = P::VERSION;
    format!(
        "{}.{}.{}",
        (version >> 16) & 0xff,
        (version >> 8) & 0xff,
        version & 0xff
    )
}

impl<P: Vst3Plugin> IPluginFactory for Factory<P> {
    unsafe fn get_factory_info(&self, info: *mut vst3_sys::base::PFactoryInfo) -> tresult {
        check_null_ptr!(kInvalidArgument, info);

        *info = mem::zeroed();

        let info = &mut *info;
        strlcpy(&mut info.vendor, P::MAKER);
        info.flags = vst3_sys::base::FactoryFlags::kUnicode as i32;

        kResultOk
    }

    unsafe fn count_classes(&self) -> i32 {
        // The component and the edit controller are the same object
        1
    }

    unsafe fn get_class_info(&self, index: i32, info: *mut vst3_sys::base::PClassInfo) -> tresult {
        check_null_ptr!(kInvalidArgument, info);
        if index != 0 {
            return kInvalidArgument;
        }

        *info = mem::zeroed();

        let info = &mut *info;
        info.cid.data = P::PLATFORM_VST3_CLASS_ID;
        info.cardinality = vst3_sys::base::ClassCardinality::kManyInstances as i32;
        strlcpy(&mut info.category, CATEGORY);
        strlcpy(&mut info.name, P::NAME);

        kResultOk
    }

    unsafe fn create_instance(
        &self,
        cid: *const vst3_sys::IID,
        iid: *const vst3_sys::IID,
        obj: *mut *mut vst3_sys::c_void,
    ) -> tresult {
        check_null_ptr!(kInvalidArgument, cid, iid, obj);

        if (*cid).data != P::PLATFORM_VST3_CLASS_ID {
            return kInvalidArgument;
        }

        let wrapper = Wrapper::<P>::new();

        // The VST3 query interface always increments the reference count and returns an owned
        // reference, so the reference from `wrapper` needs to be released and the `Box` leaked
        let result = wrapper.query_interface(iid, obj);
        if result == kResultOk {
            wrapper.release();
            Box::leak(wrapper);
        }

        result
    }
}

impl<P: Vst3Plugin> IPluginFactory2 for Factory<P> {
    unsafe fn get_class_info2(
        &self,
        index: i32,
        info: *mut vst3_sys::base::PClassInfo2,
    ) -> tresult {
        check_null_ptr!(kInvalidArgument, info);
        if index != 0 {
            return kInvalidArgument;
        }

        *info = mem::zeroed();

        let info = &mut *info;
        info.cid.data = P::PLATFORM_VST3_CLASS_ID;
        info.cardinality = vst3_sys::base::ClassCardinality::kManyInstances as i32;
        strlcpy(&mut info.category, CATEGORY);
        strlcpy(&mut info.name, P::NAME);
        info.class_flags = 1 << 1; // kSimpleModeSupported
        strlcpy(&mut info.subcategories, P::vst3_categories());
        strlcpy(&mut info.vendor, P::MAKER);
        strlcpy(&mut info.version, &version_string::<P>());
        strlcpy(&mut info.sdk_version, VST3_SDK_VERSION);

        kResultOk
    }
}

impl<P: Vst3Plugin> IPluginFactory3 for Factory<P> {
    unsafe fn get_class_info_unicode(
        &self,
        index: i32,
        info: *mut vst3_sys::base::PClassInfoW,
    ) -> tresult {
        check_null_ptr!(kInvalidArgument, info);
        if index != 0 {
            return kInvalidArgument;
        }

        *info = mem::zeroed();

        let info = &mut *info;
        info.cid.data = P::PLATFORM_VST3_CLASS_ID;
        info.cardinality = vst3_sys::base::ClassCardinality::kManyInstances as i32;
        strlcpy(&mut info.category, CATEGORY);
        u16strlcpy(&mut info.name, P::NAME);
        info.class_flags = 1 << 1; // kSimpleModeSupported
        strlcpy(&mut info.subcategories, P::vst3_categories());
        u16strlcpy(&mut info.vendor, P::MAKER);
        u16strlcpy(&mut info.version, &version_string::<P>());
        u16strlcpy(&mut info.sdk_version, VST3_SDK_VERSION);

        kResultOk
    }

    unsafe fn set_host_context(&self, _context: *mut c_void) -> tresult {
        kResultOk
    }
}
