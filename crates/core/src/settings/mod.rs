//! Per-mode setting schemas and the values they hold.
//!
//! A mode publishes a static schema describing every key it understands. The
//! values themselves live in [`Settings`] and are only ever changed through
//! [`Settings::apply`], which clamps numbers into range and reports whether the
//! change alters the mode's structure (and therefore needs a re-init).

mod color;

pub use color::{Rgb, Rgba};

use serde::{Deserialize, Serialize};

/// Type and valid range of a single setting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SettingKind {
    Number {
        min: f32,
        max: f32,
        step: f32,
        default: f32,
    },
    Color {
        default: Rgb,
    },
    Boolean {
        default: bool,
    },
}

impl SettingKind {
    pub fn default_value(&self) -> SettingValue {
        match *self {
            SettingKind::Number { default, .. } => SettingValue::Number(default),
            SettingKind::Color { default } => SettingValue::Color(default),
            SettingKind::Boolean { default } => SettingValue::Boolean(default),
        }
    }
}

/// Schema entry for one key.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SettingSpec {
    pub key: &'static str,
    pub label: &'static str,
    #[serde(flatten)]
    pub kind: SettingKind,
    /// Changing this setting reallocates the mode's internal state.
    pub structural: bool,
}

impl SettingSpec {
    pub const fn number(
        key: &'static str,
        label: &'static str,
        min: f32,
        max: f32,
        step: f32,
        default: f32,
    ) -> Self {
        Self {
            key,
            label,
            kind: SettingKind::Number {
                min,
                max,
                step,
                default,
            },
            structural: false,
        }
    }

    pub const fn color(key: &'static str, label: &'static str, default: Rgb) -> Self {
        Self {
            key,
            label,
            kind: SettingKind::Color { default },
            structural: false,
        }
    }

    pub const fn toggle(key: &'static str, label: &'static str, default: bool) -> Self {
        Self {
            key,
            label,
            kind: SettingKind::Boolean { default },
            structural: false,
        }
    }

    pub const fn structural(mut self) -> Self {
        self.structural = true;
        self
    }

    /// Coerces `value` into this setting's domain. Numbers are snapped to the
    /// grid `min + k * step` (the range-input convention, so `min` is always
    /// reachable) and then clamped to `[min, max]`; mismatched types yield
    /// `None`.
    pub fn normalise(&self, value: &SettingValue) -> Option<SettingValue> {
        match (self.kind, value) {
            (SettingKind::Number { min, max, step, .. }, SettingValue::Number(raw)) => {
                if !raw.is_finite() {
                    return None;
                }
                let snapped = if step > 0.0 {
                    min + ((raw - min) / step).round() * step
                } else {
                    *raw
                };
                Some(SettingValue::Number(snapped.clamp(min, max)))
            }
            (SettingKind::Color { .. }, SettingValue::Color(color)) => {
                Some(SettingValue::Color(*color))
            }
            (SettingKind::Boolean { .. }, SettingValue::Boolean(flag)) => {
                Some(SettingValue::Boolean(*flag))
            }
            _ => None,
        }
    }

    /// Parses a textual value (CLI flags, config files) for this setting.
    pub fn parse(&self, text: &str) -> Option<SettingValue> {
        let text = text.trim();
        let value = match self.kind {
            SettingKind::Number { .. } => SettingValue::Number(text.parse().ok()?),
            SettingKind::Color { .. } => SettingValue::Color(text.parse().ok()?),
            SettingKind::Boolean { .. } => SettingValue::Boolean(text.parse().ok()?),
        };
        self.normalise(&value)
    }
}

/// A concrete setting value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Number(f32),
    Boolean(bool),
    Color(Rgb),
}

impl From<f32> for SettingValue {
    fn from(value: f32) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Rgb> for SettingValue {
    fn from(value: Rgb) -> Self {
        Self::Color(value)
    }
}

/// Message asking a mode to change one of its settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingUpdate {
    pub key: String,
    pub value: SettingValue,
}

impl SettingUpdate {
    pub fn new(key: impl Into<String>, value: impl Into<SettingValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// What [`Settings::apply`] did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Unknown key, mismatched type, or no change.
    Ignored,
    /// A continuous parameter changed; visible on the next frame.
    Applied,
    /// A structural parameter changed; the mode must re-initialise.
    Structural,
}

/// Current values for a fixed schema.
#[derive(Debug, Clone)]
pub struct Settings {
    schema: &'static [SettingSpec],
    values: Vec<SettingValue>,
}

impl Settings {
    pub fn defaults(schema: &'static [SettingSpec]) -> Self {
        Self {
            schema,
            values: schema.iter().map(|spec| spec.kind.default_value()).collect(),
        }
    }

    pub fn schema(&self) -> &'static [SettingSpec] {
        self.schema
    }

    pub fn spec(&self, key: &str) -> Option<&'static SettingSpec> {
        self.schema.iter().find(|spec| spec.key == key)
    }

    pub fn get(&self, key: &str) -> Option<SettingValue> {
        self.index(key).map(|index| self.values[index])
    }

    /// Numeric value of `key`, or `0.0` when the key is not numeric.
    pub fn number(&self, key: &str) -> f32 {
        match self.get(key) {
            Some(SettingValue::Number(value)) => value,
            _ => 0.0,
        }
    }

    /// Numeric value rounded to a count.
    pub fn count(&self, key: &str) -> usize {
        self.number(key).round().max(0.0) as usize
    }

    pub fn color(&self, key: &str) -> Rgb {
        match self.get(key) {
            Some(SettingValue::Color(color)) => color,
            _ => Rgb::BLACK,
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(SettingValue::Boolean(true)))
    }

    pub fn apply(&mut self, key: &str, value: &SettingValue) -> UpdateOutcome {
        let Some(index) = self.index(key) else {
            return UpdateOutcome::Ignored;
        };
        let spec = &self.schema[index];
        let Some(value) = spec.normalise(value) else {
            return UpdateOutcome::Ignored;
        };
        if self.values[index] == value {
            return UpdateOutcome::Ignored;
        }
        self.values[index] = value;
        if spec.structural {
            UpdateOutcome::Structural
        } else {
            UpdateOutcome::Applied
        }
    }

    /// Key/value pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, SettingValue)> + '_ {
        self.schema
            .iter()
            .zip(self.values.iter())
            .map(|(spec, value)| (spec.key, *value))
    }

    fn index(&self, key: &str) -> Option<usize> {
        self.schema.iter().position(|spec| spec.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &[SettingSpec] = &[
        SettingSpec::number("barCount", "Bar Count", 64.0, 512.0, 2.0, 256.0).structural(),
        SettingSpec::number("lineWidth", "Line Width", 1.0, 10.0, 0.0, 3.0),
        SettingSpec::color("lineColor", "Line Color", Rgb::new(0, 255, 255)),
        SettingSpec::toggle("trail", "Trail Effect", true),
    ];

    #[test]
    fn starts_from_schema_defaults() {
        let settings = Settings::defaults(SCHEMA);
        assert_eq!(settings.count("barCount"), 256);
        assert_eq!(settings.number("lineWidth"), 3.0);
        assert_eq!(settings.color("lineColor"), Rgb::new(0, 255, 255));
        assert!(settings.flag("trail"));
    }

    #[test]
    fn clamps_out_of_range_numbers() {
        let mut settings = Settings::defaults(SCHEMA);
        assert_eq!(
            settings.apply("lineWidth", &SettingValue::Number(99.0)),
            UpdateOutcome::Applied
        );
        assert_eq!(settings.number("lineWidth"), 10.0);

        settings.apply("lineWidth", &SettingValue::Number(-4.0));
        assert_eq!(settings.number("lineWidth"), 1.0);
    }

    #[test]
    fn snaps_to_step_grid_and_flags_structure() {
        let mut settings = Settings::defaults(SCHEMA);
        let outcome = settings.apply("barCount", &SettingValue::Number(100.6));
        assert_eq!(outcome, UpdateOutcome::Structural);
        assert_eq!(settings.count("barCount"), 100);

        // 101 sits 18.5 steps above the minimum and rounds away from it.
        settings.apply("barCount", &SettingValue::Number(101.0));
        assert_eq!(settings.count("barCount"), 102);
    }

    #[test]
    fn step_grid_starts_at_the_minimum() {
        let spec = SettingSpec::number("odd", "Odd", 5.0, 95.0, 10.0, 5.0);
        assert_eq!(spec.normalise(&SettingValue::Number(22.0)), Some(SettingValue::Number(25.0)));
        assert_eq!(spec.normalise(&SettingValue::Number(99.0)), Some(SettingValue::Number(95.0)));
    }

    #[test]
    fn ignores_unknown_keys_and_mismatched_types() {
        let mut settings = Settings::defaults(SCHEMA);
        assert_eq!(
            settings.apply("nope", &SettingValue::Number(1.0)),
            UpdateOutcome::Ignored
        );
        assert_eq!(
            settings.apply("lineColor", &SettingValue::Number(1.0)),
            UpdateOutcome::Ignored
        );
        assert_eq!(
            settings.apply("lineWidth", &SettingValue::Number(f32::NAN)),
            UpdateOutcome::Ignored
        );
        assert_eq!(settings.color("lineColor"), Rgb::new(0, 255, 255));
    }

    #[test]
    fn repeated_value_is_not_a_change() {
        let mut settings = Settings::defaults(SCHEMA);
        assert_eq!(
            settings.apply("barCount", &SettingValue::Number(256.0)),
            UpdateOutcome::Ignored
        );
    }

    #[test]
    fn parses_text_values_per_kind() {
        let settings = Settings::defaults(SCHEMA);
        let bar_count = settings.spec("barCount").unwrap();
        assert_eq!(bar_count.parse("1000"), Some(SettingValue::Number(512.0)));
        let color = settings.spec("lineColor").unwrap();
        assert_eq!(
            color.parse("#102030"),
            Some(SettingValue::Color(Rgb::new(0x10, 0x20, 0x30)))
        );
        let trail = settings.spec("trail").unwrap();
        assert_eq!(trail.parse("false"), Some(SettingValue::Boolean(false)));
        assert_eq!(trail.parse("maybe"), None);
    }

    #[test]
    fn untagged_values_deserialize_by_shape() {
        let update: SettingUpdate =
            serde_json::from_str(r##"{ "key": "lineColor", "value": "#ff00ff" }"##).unwrap();
        assert_eq!(update.value, SettingValue::Color(Rgb::new(255, 0, 255)));
        let update: SettingUpdate =
            serde_json::from_str(r#"{ "key": "lineWidth", "value": 4.5 }"#).unwrap();
        assert_eq!(update.value, SettingValue::Number(4.5));
    }
}
