// Configuration records for the harmonizer and part writer.
//
// Three records, all serde-loadable from JSON with every field defaulted, so
// a config file names only what it changes:
//
// - `HarmonizerParameters`: which rule-table sets are enabled, whether
//   progressions are enforced, modulation, caching.
// - `PartWriterParameters`: the result-ordering strategy.
// - `PartWritingParameters`: hard-rule settings, enabled preferences and the
//   preference order used for lexicographic ranking. Callers can register
//   extra rules and preferences in code; `with_*` methods return a new value
//   and never touch the defaults.
//
// See also: `rules.rs` and `preferences.rs` for the registries these
// settings select from, `tables.rs` for the named rule-table sets.

use crate::error::HarmonyError;
use crate::preferences::{self, Preference};
use crate::rules::{self, HardRule};
use crate::tables::{RuleTables, SET_NAMES};
use chorale_theory::{Interval, Mode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Harmonizer
// ---------------------------------------------------------------------------

/// A key the harmonizer may modulate to, relative to the current tonic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modulation {
    /// Upward distance from the current tonic to the new one.
    pub interval: Interval,
    pub mode: Mode,
}

/// Every major and minor key, one spelling per chromatic step.
pub fn all_modulations() -> Vec<Modulation> {
    const STEPS: [Interval; 12] = [
        Interval::UNISON,
        Interval::MINOR_SECOND,
        Interval::MAJOR_SECOND,
        Interval::MINOR_THIRD,
        Interval::MAJOR_THIRD,
        Interval::PERFECT_FOURTH,
        Interval::from_parts(3, 6),  // A4
        Interval::PERFECT_FIFTH,
        Interval::from_parts(5, 8),  // m6
        Interval::from_parts(5, 9),  // M6
        Interval::MINOR_SEVENTH,
        Interval::MAJOR_SEVENTH,
    ];
    STEPS
        .into_iter()
        .flat_map(|interval| {
            [Mode::Major, Mode::Minor]
                .into_iter()
                .map(move |mode| Modulation { interval, mode })
        })
        .collect()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HarmonizerParameters {
    pub enabled_progressions: Vec<String>,
    pub enabled_expansions: Vec<String>,
    pub enabled_substitutions: Vec<String>,
    /// Off: supplied roman numerals are accepted even when no progression
    /// rule reaches them.
    pub use_progressions: bool,
    pub can_modulate: bool,
    pub modulations_allowed: Vec<Modulation>,
    pub disable_caching: bool,
    /// Explicit tables; when set, the enabled-set names are ignored.
    #[serde(skip)]
    pub tables: Option<RuleTables>,
}

impl Default for HarmonizerParameters {
    fn default() -> Self {
        let all: Vec<String> = SET_NAMES.iter().map(|s| s.to_string()).collect();
        HarmonizerParameters {
            enabled_progressions: all.clone(),
            enabled_expansions: all.clone(),
            enabled_substitutions: all,
            use_progressions: true,
            can_modulate: false,
            modulations_allowed: all_modulations(),
            disable_caching: false,
            tables: None,
        }
    }
}

impl HarmonizerParameters {
    /// Only the named sets for every kind of rule.
    pub fn with_sets(sets: &[&str]) -> Self {
        let names: Vec<String> = sets.iter().map(|s| s.to_string()).collect();
        HarmonizerParameters {
            enabled_progressions: names.clone(),
            enabled_expansions: names.clone(),
            enabled_substitutions: names,
            ..HarmonizerParameters::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, HarmonyError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The tables this configuration selects.
    pub fn resolve_tables(&self) -> Result<RuleTables, HarmonyError> {
        match &self.tables {
            Some(tables) => Ok(tables.clone()),
            None => RuleTables::from_names(
                &self.enabled_progressions,
                &self.enabled_expansions,
                &self.enabled_substitutions,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Part writer
// ---------------------------------------------------------------------------

/// How finished voicings are ordered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum YieldOrdering {
    /// Depth-first search order.
    #[serde(rename = "greedy")]
    Greedy,
    /// Siblings sorted by preference score at every level.
    #[default]
    #[serde(rename = "default")]
    GlobalBest,
    /// Like `GlobalBest`, ties broken by the best child's score.
    #[serde(rename = "depth")]
    DepthBest,
}

impl std::str::FromStr for YieldOrdering {
    type Err = HarmonyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greedy" => Ok(YieldOrdering::Greedy),
            "default" | "best" => Ok(YieldOrdering::GlobalBest),
            "depth" => Ok(YieldOrdering::DepthBest),
            _ => Err(HarmonyError::Input(format!("unknown ordering {s:?}"))),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartWriterParameters {
    pub yield_ordering: YieldOrdering,
}

// ---------------------------------------------------------------------------
// Part writing rules
// ---------------------------------------------------------------------------

/// A hard rule's configuration: `false` disables it, `true` enables it
/// with its default parameter, a number enables it with that look-back
/// scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSetting {
    Enabled(bool),
    Scope(u32),
}

impl RuleSetting {
    pub fn is_enabled(self) -> bool {
        !matches!(self, RuleSetting::Enabled(false))
    }

    pub fn scope_or(self, default: u32) -> u32 {
        match self {
            RuleSetting::Scope(scope) => scope,
            RuleSetting::Enabled(_) => default,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartWritingParameters {
    /// Overrides by rule name; unnamed rules run with their defaults.
    pub rules: BTreeMap<String, RuleSetting>,
    /// Overrides by preference name; unnamed preferences are enabled.
    pub preferences: BTreeMap<String, bool>,
    /// Lexicographic priority, highest first.
    pub preference_order: Vec<String>,
    #[serde(skip)]
    pub extra_rules: Vec<HardRule>,
    #[serde(skip)]
    pub extra_preferences: Vec<Preference>,
}

impl Default for PartWritingParameters {
    fn default() -> Self {
        PartWritingParameters {
            rules: BTreeMap::new(),
            preferences: BTreeMap::new(),
            preference_order: preferences::DEFAULT_ORDER.iter().map(|s| s.to_string()).collect(),
            extra_rules: Vec::new(),
            extra_preferences: Vec::new(),
        }
    }
}

impl PartWritingParameters {
    pub fn load(path: &Path) -> Result<Self, HarmonyError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn with_setting(mut self, rule: &str, setting: RuleSetting) -> Self {
        self.rules.insert(rule.to_string(), setting);
        self
    }

    pub fn without_rule(self, rule: &str) -> Self {
        self.with_setting(rule, RuleSetting::Enabled(false))
    }

    /// Register a rule, replacing any built-in rule of the same name.
    pub fn with_rule(mut self, rule: HardRule) -> Self {
        self.extra_rules.retain(|r| r.name != rule.name);
        self.extra_rules.push(rule);
        self
    }

    /// Register a preference and append it to the evaluation order.
    pub fn with_preference(mut self, preference: Preference) -> Self {
        if !self.preference_order.iter().any(|p| *p == preference.name) {
            self.preference_order.push(preference.name.clone());
        }
        self.extra_preferences.retain(|p| p.name != preference.name);
        self.extra_preferences.push(preference);
        self
    }

    pub fn with_preference_order(mut self, order: &[&str]) -> Self {
        self.preference_order = order.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Built-in rules with registered extras applied, in registration
    /// order.
    pub fn registered_rules(&self) -> Vec<HardRule> {
        let mut registered = rules::default_rules();
        for extra in &self.extra_rules {
            match registered.iter_mut().find(|r| r.name == extra.name) {
                Some(existing) => *existing = extra.clone(),
                None => registered.push(extra.clone()),
            }
        }
        registered
    }

    pub fn registered_preferences(&self) -> Vec<Preference> {
        let mut registered = preferences::default_preferences();
        for extra in &self.extra_preferences {
            match registered.iter_mut().find(|p| p.name == extra.name) {
                Some(existing) => *existing = extra.clone(),
                None => registered.push(extra.clone()),
            }
        }
        registered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let params: HarmonizerParameters =
            serde_json::from_str(r#"{ "canModulate": true, "enabledExpansions": [] }"#).unwrap();
        assert!(params.can_modulate);
        assert!(params.use_progressions, "unnamed fields keep defaults");
        assert!(params.enabled_expansions.is_empty());
        assert_eq!(params.modulations_allowed.len(), 24);
        let tables = params.resolve_tables().unwrap();
        assert!(tables.expansions.is_empty());
        assert!(!tables.progressions.is_empty());
    }

    #[test]
    fn test_modulation_entries() {
        let params: HarmonizerParameters = serde_json::from_str(
            r#"{ "modulationsAllowed": [{ "interval": "P5", "mode": "major" }] }"#,
        )
        .unwrap();
        assert_eq!(
            params.modulations_allowed,
            [Modulation {
                interval: Interval::PERFECT_FIFTH,
                mode: Mode::Major
            }]
        );
    }

    #[test]
    fn test_unknown_set_is_an_error() {
        let params = HarmonizerParameters::with_sets(&["basic", "jazz"]);
        assert!(matches!(params.resolve_tables(), Err(HarmonyError::UnknownRuleSet(name)) if name == "jazz"));
    }

    #[test]
    fn test_rule_settings_are_tri_valued() {
        let params: PartWritingParameters = serde_json::from_str(
            r#"{ "rules": { "hidden_fifths": false, "voice_range": true, "seventh_resolution": 3 } }"#,
        )
        .unwrap();
        assert_eq!(params.rules["hidden_fifths"], RuleSetting::Enabled(false));
        assert!(!params.rules["hidden_fifths"].is_enabled());
        assert_eq!(params.rules["voice_range"].scope_or(2), 2);
        assert_eq!(params.rules["seventh_resolution"].scope_or(2), 3);
    }

    #[test]
    fn test_ordering_names() {
        let params: PartWriterParameters = serde_json::from_str(r#"{ "yieldOrdering": "depth" }"#).unwrap();
        assert_eq!(params.yield_ordering, YieldOrdering::DepthBest);
        assert_eq!("greedy".parse::<YieldOrdering>().unwrap(), YieldOrdering::Greedy);
        assert_eq!(PartWriterParameters::default().yield_ordering, YieldOrdering::GlobalBest);
    }

    #[test]
    fn test_with_methods_leave_defaults_alone() {
        let defaults = PartWritingParameters::default();
        let custom = defaults.clone().without_rule("hidden_fifths");
        assert!(defaults.rules.is_empty());
        assert_eq!(custom.rules.len(), 1);
    }
}
