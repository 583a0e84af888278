//! Phrase table for voice commands
//!
//! Built once at startup and read-only afterwards. Two reserved phrases map
//! to sign-in/sign-out; every integer in the configured range gets a
//! "Set IPD to V" phrase. The range is deliberately wider than the valid IPD
//! range so that out-of-range requests are recognised and then rejected.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

pub const SIGN_IN_PHRASE: &str = "Sign in to device portal";
pub const SIGN_OUT_PHRASE: &str = "Sign out from device portal";

/// Default range of spoken IPD values
pub const DEFAULT_PHRASE_RANGE: RangeInclusive<u32> = 50..=80;

/// What a recognised phrase asks for
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum VoiceAction {
    SignIn,
    SignOut,
    SetIpd { value: f32 },
}

/// Immutable phrase → action table
#[derive(Debug, Clone)]
pub struct VoiceCommands {
    table: HashMap<String, VoiceAction>,
    phrases: Vec<String>,
}

impl VoiceCommands {
    pub fn build(range: RangeInclusive<u32>) -> Self {
        let mut commands = Self {
            table: HashMap::new(),
            phrases: Vec::new(),
        };

        commands.insert(SIGN_IN_PHRASE.to_string(), VoiceAction::SignIn);
        commands.insert(SIGN_OUT_PHRASE.to_string(), VoiceAction::SignOut);
        for value in range {
            commands.insert(
                set_ipd_phrase(value),
                VoiceAction::SetIpd {
                    value: value as f32,
                },
            );
        }

        commands
    }

    fn insert(&mut self, phrase: String, action: VoiceAction) {
        self.table.insert(normalize(&phrase), action);
        self.phrases.push(phrase);
    }

    /// Look up a recognised phrase; case and spacing are ignored
    pub fn lookup(&self, phrase: &str) -> Option<VoiceAction> {
        self.table.get(&normalize(phrase)).copied()
    }

    /// Canonical phrases, for grammar registration
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for VoiceCommands {
    fn default() -> Self {
        Self::build(DEFAULT_PHRASE_RANGE)
    }
}

fn set_ipd_phrase(value: u32) -> String {
    format!("Set IPD to {value}")
}

fn normalize(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_phrases() {
        let commands = VoiceCommands::default();
        assert_eq!(commands.lookup(SIGN_IN_PHRASE), Some(VoiceAction::SignIn));
        assert_eq!(commands.lookup(SIGN_OUT_PHRASE), Some(VoiceAction::SignOut));
    }

    #[test]
    fn test_generated_phrases_cover_range() {
        let commands = VoiceCommands::build(50..=80);
        assert_eq!(commands.len(), 2 + 31);
        assert_eq!(
            commands.lookup("Set IPD to 62"),
            Some(VoiceAction::SetIpd { value: 62.0 })
        );
        assert_eq!(
            commands.lookup("Set IPD to 80"),
            Some(VoiceAction::SetIpd { value: 80.0 })
        );
        assert_eq!(commands.lookup("Set IPD to 81"), None);
    }

    #[test]
    fn test_lookup_ignores_case_and_spacing() {
        let commands = VoiceCommands::default();
        assert_eq!(
            commands.lookup("  set ipd   TO 70 "),
            Some(VoiceAction::SetIpd { value: 70.0 })
        );
    }

    #[test]
    fn test_unknown_phrase() {
        let commands = VoiceCommands::default();
        assert_eq!(commands.lookup("make it bigger"), None);
        assert_eq!(commands.lookup("Set IPD to sixty"), None);
    }

    #[test]
    fn test_phrases_listed_in_canonical_form() {
        let commands = VoiceCommands::build(60..=61);
        assert_eq!(
            commands.phrases(),
            &[
                SIGN_IN_PHRASE.to_string(),
                SIGN_OUT_PHRASE.to_string(),
                "Set IPD to 60".to_string(),
                "Set IPD to 61".to_string(),
            ]
        );
    }
}
