//! Sound profiles: the declarative input to the engine.
//!
//! A profile is plain configuration: display fields plus a `config` object
//! whose `type` selects the sound program and whose remaining keys are that
//! program's parameters. Profiles are shared read-only behind an `Arc` and
//! never mutated by the engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EngineError;

// ── Profile ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    pub config: ProfileConfig,
}

impl SoundProfile {
    /// A profile with only an id and a config; handy for hosts and tests.
    pub fn new(id: impl Into<String>, config: ProfileConfig) -> Self {
        let id = id.into();
        SoundProfile {
            name: id.clone(),
            id,
            description: String::new(),
            icon: String::new(),
            config,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Variant tag plus the variant's untyped parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ProfileConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        ProfileConfig {
            kind: kind.into(),
            params: Map::new(),
        }
    }

    /// Builder-style parameter insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Deserialize the parameters into a variant's typed config.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, EngineError> {
        serde_json::from_value(Value::Object(self.params.clone()))
            .map_err(|e| EngineError::invalid_config(&self.kind, e.to_string()))
    }
}

// ── Catalog ─────────────────────────────────────────────────

/// Profiles keyed by id, as loaded from a catalog JSON object.
#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    profiles: BTreeMap<String, Arc<SoundProfile>>,
}

impl ProfileCatalog {
    /// Parse `{ "<id>": { id, name, description, icon, config }, ... }`.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let raw: BTreeMap<String, SoundProfile> = serde_json::from_str(json)?;
        let profiles = raw
            .into_iter()
            .map(|(key, profile)| (key, Arc::new(profile)))
            .collect();
        Ok(ProfileCatalog { profiles })
    }

    pub fn get(&self, id: &str) -> Option<Arc<SoundProfile>> {
        self.profiles.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

// ── Range checks ────────────────────────────────────────────

pub(crate) fn check_probability(kind: &str, name: &str, p: f64) -> Result<f64, EngineError> {
    if (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(EngineError::invalid_config(kind, format!("{name} must be within [0, 1], got {p}")))
    }
}

pub(crate) fn check_positive(kind: &str, name: &str, v: f64) -> Result<f64, EngineError> {
    if v.is_finite() && v > 0.0 {
        Ok(v)
    } else {
        Err(EngineError::invalid_config(kind, format!("{name} must be positive, got {v}")))
    }
}

// ── Pitch ───────────────────────────────────────────────────

/// Parse a note name like `"C4"`, `"F#3"` or `"Bb2"` to a MIDI number.
pub fn note_to_midi(note: &str) -> Option<i32> {
    let mut chars = note.trim().chars().peekable();
    let mut semitone = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    match chars.peek() {
        Some('#') => {
            semitone += 1;
            chars.next();
        }
        Some('b') => {
            semitone -= 1;
            chars.next();
        }
        _ => {}
    }
    let octave: i32 = chars.collect::<String>().parse().ok()?;
    Some((octave + 1) * 12 + semitone)
}

pub fn midi_to_frequency(midi: i32) -> f64 {
    440.0 * 2.0_f64.powf((midi as f64 - 69.0) / 12.0)
}

pub fn note_to_frequency(note: &str) -> Option<f64> {
    note_to_midi(note).map(midi_to_frequency)
}

/// Resolve a list of note names, naming the first bad one in the error.
pub(crate) fn notes_to_frequencies(kind: &str, notes: &[String]) -> Result<Vec<f64>, EngineError> {
    if notes.is_empty() {
        return Err(EngineError::invalid_config(kind, "note set is empty"));
    }
    notes
        .iter()
        .map(|n| {
            note_to_frequency(n)
                .ok_or_else(|| EngineError::invalid_config(kind, format!("bad note name '{n}'")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "rain": {
            "id": "rain",
            "name": "Rain",
            "description": "Steady rain with distant thunder",
            "icon": "🌧",
            "config": { "type": "rain", "volume": -14, "dropProbability": 0.4, "thunder": true }
        },
        "deep-focus": {
            "id": "deep-focus",
            "name": "Deep Focus",
            "config": { "type": "phasing", "intervals": [17, 19, 23] }
        }
    }"#;

    #[test]
    fn catalog_parses_profiles() {
        let catalog = ProfileCatalog::from_json(CATALOG).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["deep-focus", "rain"]);

        let rain = catalog.get("rain").unwrap();
        assert_eq!(rain.config.kind, "rain");
        assert_eq!(rain.config.params["thunder"], Value::Bool(true));
        assert!(!rain.config.params.contains_key("type"));

        let focus = catalog.get("deep-focus").unwrap();
        assert_eq!(focus.description, "");
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn malformed_catalog_is_an_error() {
        assert!(matches!(
            ProfileCatalog::from_json(r#"{"x": {"id": "x"}}"#),
            Err(EngineError::Catalog(_))
        ));
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    struct Params {
        volume: f64,
        drop_probability: f64,
    }

    impl Default for Params {
        fn default() -> Self {
            Params {
                volume: -20.0,
                drop_probability: 0.1,
            }
        }
    }

    #[test]
    fn typed_params_fill_defaults() {
        let config = ProfileConfig::new("rain").with("dropProbability", 0.5);
        let params: Params = config.parse().unwrap();
        assert_eq!(params.volume, -20.0);
        assert_eq!(params.drop_probability, 0.5);

        let bad = ProfileConfig::new("rain").with("volume", "loud");
        let err = bad.parse::<Params>().unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig { ref kind, .. } if kind == "rain"));
    }

    #[test]
    fn round_trips_type_tag() {
        let config = ProfileConfig::new("noise").with("color", "brown");
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "noise");
        assert_eq!(json["color"], "brown");
    }

    #[test]
    fn note_names() {
        assert_eq!(note_to_midi("A4"), Some(69));
        assert_eq!(note_to_midi("C4"), Some(60));
        assert_eq!(note_to_midi("F#3"), Some(54));
        assert_eq!(note_to_midi("Bb2"), Some(46));
        assert_eq!(note_to_midi("C-1"), Some(0));
        assert_eq!(note_to_midi("H2"), None);
        assert_eq!(note_to_midi("C"), None);
        assert!((note_to_frequency("A3").unwrap() - 220.0).abs() < 1e-9);
    }

    #[test]
    fn range_checks() {
        assert!(check_probability("rain", "p", 1.0).is_ok());
        assert!(check_probability("rain", "p", 1.5).is_err());
        assert!(check_positive("drone", "bpm", 0.0).is_err());
        assert!(notes_to_frequencies("drone", &[]).is_err());
        assert!(notes_to_frequencies("drone", &["C3".into(), "X".into()]).is_err());
    }
}
