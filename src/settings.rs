//! User settings record.
//!
//! Stored as one composite JSON document under [`SETTINGS_KEY`]. Loading merges
//! whatever was stored over the defaults field by field; a field with the wrong
//! type or an out-of-set value is dropped and the corrected record is written
//! back by the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tubepace_core_types::{Category, PlaybackRate};

pub const SETTINGS_KEY: &str = "settings";

/// Per-category enable flags. Regular content has no flag and is always on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryToggles {
    pub live: bool,
    pub premiere: bool,
    pub shorts: bool,
    pub music: bool,
}

impl Default for CategoryToggles {
    fn default() -> Self {
        Self {
            live: false,
            premiere: false,
            shorts: true,
            music: false,
        }
    }
}

impl CategoryToggles {
    pub fn enabled(&self, category: Category) -> bool {
        match category {
            Category::Live => self.live,
            Category::Premiere => self.premiere,
            Category::Shorts => self.shorts,
            Category::Music => self.music,
            Category::Regular => true,
        }
    }

    /// Returns false for `Regular`, which cannot be changed.
    pub fn set(&mut self, category: Category, enabled: bool) -> bool {
        let slot = match category {
            Category::Live => &mut self.live,
            Category::Premiere => &mut self.premiere,
            Category::Shorts => &mut self.shorts,
            Category::Music => &mut self.music,
            Category::Regular => return false,
        };
        *slot = enabled;
        true
    }

    /// Flip a flag and return its new value; `None` for `Regular`.
    pub fn toggle(&mut self, category: Category) -> Option<bool> {
        if !category.is_toggleable() {
            return None;
        }
        let next = !self.enabled(category);
        self.set(category, next);
        Some(next)
    }
}

const RECORD_FIELDS: [&str; 3] = ["target_rate", "categories", "debug_enabled"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub target_rate: PlaybackRate,
    pub categories: CategoryToggles,
    pub debug_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_rate: PlaybackRate::DEFAULT,
            categories: CategoryToggles::default(),
            debug_enabled: false,
        }
    }
}

impl Settings {
    /// Merge a stored record over the defaults.
    ///
    /// Returns the merged settings and whether any field was missing, invalid
    /// or unknown, in which case the record should be written back. Numbers
    /// compare by value, so a stored `1` is as good as `1.0`.
    pub fn from_stored(value: &Value) -> (Settings, bool) {
        let mut merged = Settings::default();
        let Some(record) = value.as_object() else {
            return (merged, true);
        };
        let mut corrected = record.keys().any(|key| !RECORD_FIELDS.contains(&key.as_str()));

        match record
            .get("target_rate")
            .and_then(Value::as_f64)
            .and_then(|raw| PlaybackRate::new(raw).ok())
        {
            Some(rate) => merged.target_rate = rate,
            None => corrected = true,
        }

        match record.get("categories").and_then(Value::as_object) {
            Some(stored) => {
                corrected |= stored.keys().any(|key| {
                    !Category::TOGGLEABLE.iter().any(|category| category.name() == key)
                });
                for category in Category::TOGGLEABLE {
                    match stored.get(category.name()).and_then(Value::as_bool) {
                        Some(flag) => {
                            merged.categories.set(category, flag);
                        }
                        None => corrected = true,
                    }
                }
            }
            None => corrected = true,
        }

        match record.get("debug_enabled").and_then(Value::as_bool) {
            Some(flag) => merged.debug_enabled = flag,
            None => corrected = true,
        }

        (merged, corrected)
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "target_rate": self.target_rate.value(),
            "categories": {
                "live": self.categories.live,
                "premiere": self.categories.premiere,
                "shorts": self.categories.shorts,
                "music": self.categories.music,
            },
            "debug_enabled": self.debug_enabled,
        })
    }

    pub fn is_enabled(&self, category: Category) -> bool {
        self.categories.enabled(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_the_documented_record() {
        let settings = Settings::default();
        assert_eq!(settings.target_rate.value(), 1.0);
        assert!(settings.is_enabled(Category::Shorts));
        assert!(!settings.is_enabled(Category::Live));
        assert!(!settings.is_enabled(Category::Premiere));
        assert!(!settings.is_enabled(Category::Music));
        assert!(settings.is_enabled(Category::Regular));
        assert!(!settings.debug_enabled);
    }

    #[test]
    fn valid_record_loads_without_correction() {
        let stored = json!({
            "target_rate": 1.5,
            "categories": {"live": true, "premiere": false, "shorts": false, "music": true},
            "debug_enabled": true,
        });
        let (settings, corrected) = Settings::from_stored(&stored);
        assert!(!corrected);
        assert_eq!(settings.target_rate.value(), 1.5);
        assert!(settings.is_enabled(Category::Live));
        assert!(!settings.is_enabled(Category::Shorts));
        assert!(settings.debug_enabled);
    }

    #[test]
    fn out_of_set_rate_falls_back_to_default() {
        let stored = json!({
            "target_rate": 3.0,
            "categories": {"live": true, "premiere": false, "shorts": true, "music": false},
            "debug_enabled": false,
        });
        let (settings, corrected) = Settings::from_stored(&stored);
        assert!(corrected);
        assert_eq!(settings.target_rate, PlaybackRate::DEFAULT);
        assert!(settings.is_enabled(Category::Live));
    }

    #[test]
    fn wrongly_typed_fields_are_discarded_individually() {
        let stored = json!({
            "target_rate": "fast",
            "categories": {"live": "yes", "music": true},
            "debug_enabled": 1,
            "legacy": "ignored",
        });
        let (settings, corrected) = Settings::from_stored(&stored);
        assert!(corrected);
        assert_eq!(settings.target_rate, PlaybackRate::DEFAULT);
        assert!(!settings.is_enabled(Category::Live));
        assert!(settings.is_enabled(Category::Music));
        assert!(!settings.debug_enabled);
    }

    #[test]
    fn integer_rate_is_a_valid_record() {
        let stored = json!({
            "target_rate": 1,
            "categories": {"live": false, "premiere": false, "shorts": true, "music": false},
            "debug_enabled": false,
        });
        let (settings, corrected) = Settings::from_stored(&stored);
        assert!(!corrected);
        assert_eq!(settings, Settings::default());

        let stored = json!({"target_rate": 2, "categories": {}, "debug_enabled": false});
        let (settings, corrected) = Settings::from_stored(&stored);
        assert!(corrected);
        assert_eq!(settings.target_rate.value(), 2.0);
    }

    #[test]
    fn unknown_category_key_is_corrected() {
        let stored = json!({
            "target_rate": 1.0,
            "categories": {"live": false, "premiere": false, "shorts": true, "music": false, "regular": false},
            "debug_enabled": false,
        });
        assert!(Settings::from_stored(&stored).1);
    }

    #[test]
    fn non_object_record_is_replaced() {
        let (settings, corrected) = Settings::from_stored(&json!("garbage"));
        assert!(corrected);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn regular_cannot_be_toggled() {
        let mut toggles = CategoryToggles::default();
        assert_eq!(toggles.toggle(Category::Regular), None);
        assert_eq!(toggles.toggle(Category::Live), Some(true));
        assert!(toggles.enabled(Category::Live));
        assert!(!toggles.set(Category::Regular, false));
    }
}
