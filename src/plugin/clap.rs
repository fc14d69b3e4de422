use super::{Plugin, PluginFeatures};

/// Provides auxiliary metadata needed for a CLAP plugin.
pub trait ClapPlugin: Plugin {
    /// A unique ID that identifies this particular plugin. This is usually in reverse domain name
    /// notation, e.g. `com.manufacturer.plugin-name`.
    const CLAP_ID: &'static str;
    /// An optional short description for the plugin.
    const CLAP_DESCRIPTION: Option<&'static str> = None;
    /// The URL to the plugin's home page, if available.
    const CLAP_URL: Option<&'static str> = None;

    /// Keywords describing the plugin. The host may use this to classify the plugin in its plugin
    /// browser. Defaults to `instrument` or `audio-effect` depending on
    /// [`PluginFeatures::IS_SYNTH`].
    fn clap_features() -> &'static [&'static str] {
        if Self::FEATURES.contains(PluginFeatures::IS_SYNTH) {
            &["instrument", "synthesizer"]
        } else {
            &["audio-effect"]
        }
    }
}
