//! Value ranges for parameters.

/// The range, default, and step sizes for a single parameter. Values stored in the canonical model
/// are always plain values within `[min, max]`. Wrappers for formats that only deal in normalized
/// values use [`normalize()`][Self::normalize()] and [`unnormalize()`][Self::unnormalize()] at the
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterRanges {
    /// The default value. Must lie within `[min, max]`.
    pub def: f32,
    pub min: f32,
    pub max: f32,
    /// The regular step size used by hosts and UIs for incrementing the value.
    pub step: f32,
    pub step_small: f32,
    pub step_large: f32,
}

impl Default for ParameterRanges {
    fn default() -> Self {
        Self {
            def: 0.0,
            min: 0.0,
            max: 1.0,
            step: 0.001,
            step_small: 0.00001,
            step_large: 0.01,
        }
    }
}

impl ParameterRanges {
    /// Create a range with the default step sizes.
    pub fn new(def: f32, min: f32, max: f32) -> Self {
        Self {
            def,
            min,
            max,
            ..Self::default()
        }
    }

    /// Whether `min <= def <= max` holds. Checked once by the plugin adapter after the plugin has
    /// described its parameters.
    pub fn is_valid(&self) -> bool {
        self.min <= self.max && self.def >= self.min && self.def <= self.max
    }

    /// Clamp a plain value to this range.
    pub fn fixed_value(&self, value: f32) -> f32 {
        // `f32::clamp()` panics on `min > max`, and a misconfigured range should not be able to
        // take down the host
        if value <= self.min {
            self.min
        } else if value >= self.max {
            self.max
        } else {
            value
        }
    }

    /// Map a plain value to `[0, 1]`. Values outside of the range are clamped first. A range with
    /// `min == max` always normalizes to zero.
    pub fn normalize(&self, plain: f32) -> f32 {
        let range = self.max - self.min;
        if range <= 0.0 {
            return 0.0;
        }

        ((self.fixed_value(plain) - self.min) / range).clamp(0.0, 1.0)
    }

    /// The inverse of [`normalize()`][Self::normalize()]. The normalized value is clamped to
    /// `[0, 1]`.
    pub fn unnormalize(&self, normalized: f32) -> f32 {
        let normalized = normalized.clamp(0.0, 1.0);
        self.fixed_value(self.min + normalized * (self.max - self.min))
    }

    /// The default value, normalized.
    pub fn normalized_default(&self) -> f32 {
        self.normalize(self.def)
    }
}
