use clap_sys::plugin::clap_plugin_descriptor;
use clap_sys::version::CLAP_VERSION;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::plugin::ClapPlugin;

/// A static descriptor for a plugin. This is used in both the factory and on the plugin object
/// itself.
///
/// This cannot be cloned as `plugin_descriptor` contains pointers to the other fields.
pub struct PluginDescriptor {
    // We need [CString]s for all of `ClapPlugin`'s `&str` fields. The descriptor points into
    // their heap allocations, which don't move when the strings themselves are moved.
    clap_id: CString,
    _name: CString,
    _vendor: CString,
    _url: Option<CString>,
    _version: CString,
    _description: Option<CString>,
    _features: Vec<CString>,
    /// An environ-like list of pointers to the strings in `_features`, terminated by a null
    /// pointer.
    _features_ptrs: Vec<*const c_char>,

    plugin_descriptor: clap_plugin_descriptor,
}

unsafe impl Send for PluginDescriptor {}
unsafe impl Sync for PluginDescriptor {}

/// The plugin's version as a dotted string, decoded from
/// [`Plugin::VERSION`][crate::plugin::Plugin::VERSION].
pub fn version_string(version: u32) -> String {
    format!(
        "{}.{}.{}",
        (version >> 16) & 0xff,
        (version >> 8) & 0xff,
        version & 0xff
    )
}

fn optional_ptr(string: &Option<CString>) -> *const c_char {
    string.as_ref().map(|s| s.as_ptr()).unwrap_or(ptr::null())
}

impl PluginDescriptor {
    /// Construct the plugin descriptor for a specific CLAP plugin.
    pub fn for_plugin<P: ClapPlugin>() -> Self {
        let clap_id = CString::new(P::CLAP_ID).expect("`CLAP_ID` contained null bytes");
        let name = CString::new(P::NAME).expect("`NAME` contained null bytes");
        let vendor = CString::new(P::MAKER).expect("`MAKER` contained null bytes");
        let url = P::CLAP_URL.map(|url| CString::new(url).expect("`CLAP_URL` contained null bytes"));
        let version = CString::new(version_string(P::VERSION)).expect("Invalid version string");
        let description = P::CLAP_DESCRIPTION.map(|description| {
            CString::new(description).expect("`CLAP_DESCRIPTION` contained null bytes")
        });
        let features: Vec<CString> = P::clap_features()
            .iter()
            .map(|feature| CString::new(*feature).expect("`clap_features()` contained null bytes"))
            .collect();

        let mut features_ptrs: Vec<*const c_char> =
            features.iter().map(|feature| feature.as_ptr()).collect();
        features_ptrs.push(ptr::null());

        let plugin_descriptor = clap_plugin_descriptor {
            clap_version: CLAP_VERSION,
            id: clap_id.as_ptr(),
            name: name.as_ptr(),
            vendor: vendor.as_ptr(),
            url: optional_ptr(&url),
            manual_url: ptr::null(),
            support_url: ptr::null(),
            version: version.as_ptr(),
            description: optional_ptr(&description),
            features: features_ptrs.as_ptr(),
        };

        Self {
            clap_id,
            _name: name,
            _vendor: vendor,
            _url: url,
            _version: version,
            _description: description,
            _features: features,
            _features_ptrs: features_ptrs,

            plugin_descriptor,
        }
    }

    pub fn clap_plugin_descriptor(&self) -> &clap_plugin_descriptor {
        &self.plugin_descriptor
    }

    pub fn clap_id(&self) -> &CStr {
        self.clap_id.as_c_str()
    }
}
