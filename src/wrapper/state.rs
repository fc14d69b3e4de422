// nih-plug: plugins, but rewritten in Rust
// Copyright (C) 2022 Robbert van der Helm
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Utilities for saving a plugin's state in the formats that store state as an opaque blob.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::plugin::Plugin;
use crate::state::StateError;
use crate::sync::ParamSync;
use crate::wrapper::adapter::PluginInfo;
use crate::wrapper::block::BlockProcessor;

/// A plugin's state so it can be restored at a later point.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct PluginState {
    /// The plugin's parameter values, keyed by their symbols. These are stored unnormalized, so the
    /// old values will be recalled when a parameter's range gets increased. Output parameters are
    /// not stored.
    #[serde(default)]
    pub parameters: BTreeMap<String, f32>,
    /// The plugin's key/value state.
    #[serde(default)]
    pub state: BTreeMap<String, String>,
    /// The last program loaded by the host, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<u32>,
}

/// Serialize the plugin's current state to JSON. This only reads the values published to `sync`,
/// so it never has to wait for, or block, the audio thread.
pub(crate) fn serialize_json(
    info: &PluginInfo,
    sync: &ParamSync,
    program: Option<u32>,
) -> Result<Vec<u8>, StateError> {
    let parameters = info
        .parameters
        .iter()
        .enumerate()
        .filter(|(_, parameter)| !parameter.is_output())
        .map(|(index, parameter)| {
            (
                parameter.symbol.clone(),
                parameter.ranges.fixed_value(sync.published_value(index as u32)),
            )
        })
        .collect();
    let state = sync
        .current_states()
        .into_iter()
        .map(|entry| (entry.key, entry.value))
        .collect();

    serde_json::to_vec(&PluginState {
        parameters,
        state,
        program,
    })
    .map_err(|err| StateError::Json(err.to_string()))
}

/// Restore state produced by [`serialize_json()`]. A stored program is loaded first so the stored
/// parameter values take precedence over the program's. Unknown parameters and state keys are
/// skipped. Returns the stored program, if any.
pub(crate) fn deserialize_json<P: Plugin>(
    processor: &mut BlockProcessor<P>,
    data: &[u8],
) -> Result<Option<u32>, StateError> {
    let state: PluginState =
        serde_json::from_slice(data).map_err(|err| StateError::Json(err.to_string()))?;

    if let Some(program) = state.program {
        if !processor.load_program(program) {
            hb_warn!("Ignoring stored program {}, it is out of range", program);
        }
    }

    for (symbol, value) in &state.parameters {
        match processor.adapter().info().parameter_index(symbol) {
            Some(index) => processor.set_parameter_value(index, *value),
            None => hb_warn!("Ignoring unknown parameter '{}' in stored state", symbol),
        }
    }

    for (key, value) in &state.state {
        if processor.adapter().info().state_index(key).is_some() {
            processor.set_state(key, value);
        } else {
            hb_warn!("Ignoring unknown state key '{}' in stored state", key);
        }
    }

    Ok(state.program)
}
