use super::Plugin;

/// Provides auxiliary metadata needed for an LV2 plugin. The `.ttl` manifest itself has to be
/// written separately, and its port indices must follow
/// [`PortLayout::lv2()`][crate::wrapper::block::PortLayout::lv2()].
pub trait Lv2Plugin: Plugin {
    /// The plugin's URI, as used in its manifest.
    const LV2_URI: &'static str;
    /// The URI of the plugin's UI, if it has one. This must match the manifest.
    const LV2_UI_URI: Option<&'static str> = None;
}
