//! Parameter descriptions. Parameters are identified by a contiguous index in
//! `[0, Plugin::PARAMETER_COUNT)`. Their metadata is filled in once through
//! [`Plugin::init_parameter()`][crate::plugin::Plugin::init_parameter()] and never changes
//! afterwards, while the values themselves live in the plugin adapter.

use bitflags::bitflags;

pub mod range;

pub use self::range::ParameterRanges;

bitflags! {
    /// Hints describing how a parameter behaves.
    #[repr(transparent)]
    #[derive(Default)]
    pub struct ParameterHints: u32 {
        /// The host may automate this parameter.
        const AUTOMATABLE = 1 << 0;
        /// The parameter only has two states, `min` and `max`.
        const BOOLEAN = 1 << 1;
        /// The parameter only takes integer values.
        const INTEGER = 1 << 2;
        /// The parameter should be displayed on a logarithmic scale.
        const LOGARITHMIC = 1 << 3;
        /// The plugin writes this parameter, and the host only reads it. Think meters and other
        /// readouts.
        const OUTPUT = 1 << 4;
    }
}

/// A single parameter's metadata. The plugin fills this in from
/// [`Plugin::init_parameter()`][crate::plugin::Plugin::init_parameter()].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameter {
    pub hints: ParameterHints,
    /// The human readable name shown by hosts.
    pub name: String,
    /// A short, unique, ASCII-only identifier. This is used as a port symbol for LV2 and as the
    /// key when persisting parameter values in the JSON state format.
    pub symbol: String,
    /// The unit shown next to the value, e.g. `dB`. Can be empty.
    pub unit: String,
    pub ranges: ParameterRanges,
}

impl Parameter {
    /// Whether the plugin writes this parameter instead of the host.
    pub fn is_output(&self) -> bool {
        self.hints.contains(ParameterHints::OUTPUT)
    }

    /// Whether the host may automate this parameter. Output parameters are never automatable.
    pub fn is_automatable(&self) -> bool {
        self.hints.contains(ParameterHints::AUTOMATABLE) && !self.is_output()
    }
}
