use std::str::FromStr;

/// Configuration for a standalone plugin that would normally be provided by the host. Everything
/// is read from `HOSTBRIDGE_*` environment variables, there are no command line options.
#[derive(Debug, Clone, PartialEq)]
pub struct WrapperConfig {
    /// The JACK client's name. Defaults to the plugin's name. `HOSTBRIDGE_CLIENT_NAME`.
    pub client_name: Option<String>,

    /// If set to a port name (`foo:bar_1`), then all inputs will be connected to that port. If
    /// this is a comma separated list of port names (`foo:bar_1,foo:bar_2`) then the input ports
    /// will be connected in that order. `HOSTBRIDGE_CONNECT_INPUTS`.
    pub connect_inputs: Option<String>,
    /// If set, the plugin's MIDI input port is connected to this JACK MIDI output port.
    /// `HOSTBRIDGE_CONNECT_MIDI_INPUT`.
    pub connect_midi_input: Option<String>,

    /// The tempo used when JACK does not report any BBT information. `HOSTBRIDGE_TEMPO`.
    pub tempo: f64,
    /// The time signature's numerator. `HOSTBRIDGE_TIMESIG_NUM`.
    pub timesig_num: u32,
    /// The time signature's denominator. `HOSTBRIDGE_TIMESIG_DENOM`.
    pub timesig_denom: u32,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            client_name: None,
            connect_inputs: None,
            connect_midi_input: None,

            tempo: 120.0,
            timesig_num: 4,
            timesig_denom: 4,
        }
    }
}

impl WrapperConfig {
    /// Read the configuration from the process' environment.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build the configuration from a variable lookup function. Values that cannot be parsed are
    /// ignored with a warning.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let string = |name: &str| var(name).filter(|value| !value.trim().is_empty());

        Self {
            client_name: string("HOSTBRIDGE_CLIENT_NAME"),
            connect_inputs: string("HOSTBRIDGE_CONNECT_INPUTS"),
            connect_midi_input: string("HOSTBRIDGE_CONNECT_MIDI_INPUT"),

            tempo: parse_var(&var, "HOSTBRIDGE_TEMPO", |tempo: &f64| {
                tempo.is_finite() && *tempo > 0.0
            })
            .unwrap_or(defaults.tempo),
            timesig_num: parse_var(&var, "HOSTBRIDGE_TIMESIG_NUM", |num: &u32| *num > 0)
                .unwrap_or(defaults.timesig_num),
            timesig_denom: parse_var(&var, "HOSTBRIDGE_TIMESIG_DENOM", |denom: &u32| {
                denom.is_power_of_two()
            })
            .unwrap_or(defaults.timesig_denom),
        }
    }

    /// The JACK client's name for a plugin called `plugin_name`.
    pub fn client_name(&self, plugin_name: &str) -> String {
        match &self.client_name {
            Some(name) => name.clone(),
            None => plugin_name.to_lowercase().replace(' ', "_"),
        }
    }
}

fn parse_var<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
    is_valid: impl Fn(&T) -> bool,
) -> Option<T> {
    let value = var(name)?;
    match value.trim().parse::<T>() {
        Ok(parsed) if is_valid(&parsed) => Some(parsed),
        _ => {
            hb_warn!("Ignoring invalid value '{}' for {}", value, name);
            None
        }
    }
}
