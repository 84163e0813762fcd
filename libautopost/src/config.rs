//! Configuration management for Autopost
//!
//! The configuration is a single JSON document (`config.json`) split into
//! typed sections. Every load merges the file over the full default document,
//! so keys added in newer versions are backfilled and a partial file never
//! causes a lookup failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::credentials::{self, Redactor, Secret};
use crate::error::{AutopostError, ConfigError, Result};
use crate::types::NoteArticle;

/// Environment variable overriding the data directory
pub const HOME_ENV: &str = "AUTOPOST_HOME";

/// Primary model used when none is configured
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Upper bound for ratios and style weights; keeps weight sums within `u32`
pub const MAX_WEIGHT: u32 = 10_000;

/// Section names accepted by [`ConfigStore::update_section`]
pub const SECTIONS: &[&str] = &[
    "api_keys",
    "persona",
    "prompt_settings",
    "sources",
    "schedule",
    "post_type",
    "note_promotion",
    "last_tab",
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api_keys: ApiKeys,
    pub persona: Persona,
    pub prompt_settings: PromptSettings,
    pub sources: Sources,
    pub schedule: ScheduleConfig,
    pub post_type: PostTypeConfig,
    pub note_promotion: NotePromotion,
    pub last_tab: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub gemini_api_key: Secret,
    pub gemini_model: String,
    pub x_api_key: Secret,
    pub x_api_secret: Secret,
    pub x_access_token: Secret,
    pub x_access_token_secret: Secret,
    pub threads_api_key: Secret,
}

impl Default for ApiKeys {
    fn default() -> Self {
        Self {
            gemini_api_key: Secret::default(),
            gemini_model: DEFAULT_MODEL.to_string(),
            x_api_key: Secret::default(),
            x_api_secret: Secret::default(),
            x_access_token: Secret::default(),
            x_access_token_secret: Secret::default(),
            threads_api_key: Secret::default(),
        }
    }
}

impl ApiKeys {
    /// Configured model name, falling back to the default when blank
    pub fn model(&self) -> &str {
        let model = self.gemini_model.trim();
        if model.is_empty() {
            DEFAULT_MODEL
        } else {
            model
        }
    }

    pub fn has_gemini(&self) -> bool {
        !self.gemini_api_key.is_empty()
    }

    /// X needs all four OAuth 1.0a values
    pub fn has_x(&self) -> bool {
        self.missing_x_fields().is_empty()
    }

    pub fn has_threads(&self) -> bool {
        !self.threads_api_key.is_empty()
    }

    pub fn missing_x_fields(&self) -> Vec<&'static str> {
        [
            ("x_api_key", &self.x_api_key),
            ("x_api_secret", &self.x_api_secret),
            ("x_access_token", &self.x_access_token),
            ("x_access_token_secret", &self.x_access_token_secret),
        ]
        .into_iter()
        .filter(|(_, secret)| secret.is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Fail fast when the Gemini key is absent
    pub fn require_gemini(&self) -> Result<&str> {
        if self.has_gemini() {
            Ok(self.gemini_api_key.expose())
        } else {
            Err(ConfigError::MissingCredential(
                "gemini_api_key is not set. Suggestion: Add a Gemini API key in the settings."
                    .to_string(),
            )
            .into())
        }
    }

    /// Redactor covering every configured credential
    pub fn redactor(&self) -> Redactor {
        Redactor::new([
            self.gemini_api_key.expose(),
            self.x_api_key.expose(),
            self.x_api_secret.expose(),
            self.x_access_token.expose(),
            self.x_access_token_secret.expose(),
            self.threads_api_key.expose(),
        ])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Persona {
    pub gender: String,
    pub age: String,
    pub occupation: String,
    pub background: String,
    pub hobbies: String,
    pub personality: String,
    pub first_person: String,
    pub speech_style: String,
    pub other: String,
    pub generated_text: String,
}

impl Persona {
    /// Persona description used in prompts
    ///
    /// Prefers the generated persona text and falls back to the raw profile
    /// fields when nothing has been generated yet.
    pub fn summary(&self) -> String {
        if !self.generated_text.trim().is_empty() {
            return self.generated_text.clone();
        }
        self.profile_fields()
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn profile_fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("gender", self.gender.as_str()),
            ("age", self.age.as_str()),
            ("occupation", self.occupation.as_str()),
            ("background", self.background.as_str()),
            ("hobbies", self.hobbies.as_str()),
            ("personality", self.personality.as_str()),
            ("first_person", self.first_person.as_str()),
            ("speech_style", self.speech_style.as_str()),
            ("other", self.other.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    pub writing_guidelines: String,
    pub ng_expressions: String,
    pub writing_styles: Vec<WritingStyle>,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            writing_guidelines: DEFAULT_GUIDELINES.to_string(),
            ng_expressions: DEFAULT_NG_EXPRESSIONS.to_string(),
            writing_styles: default_writing_styles(),
        }
    }
}

/// A named writing template selectable by weight
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WritingStyle {
    pub name: String,
    pub weight: u32,
    pub char_range: String,
    pub description: String,
    pub structure: String,
    pub example: String,
}

impl Default for WritingStyle {
    fn default() -> Self {
        Self {
            name: String::new(),
            weight: 1,
            char_range: String::new(),
            description: String::new(),
            structure: String::new(),
            example: String::new(),
        }
    }
}

impl WritingStyle {
    /// Style used when no styles are configured
    pub fn freeform() -> Self {
        Self {
            name: "Freeform".to_string(),
            weight: 1,
            char_range: "80-200 characters".to_string(),
            description: "Write in any shape that suits the topic.".to_string(),
            structure: "Free structure".to_string(),
            example: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Sources {
    pub rss_urls: Vec<String>,
    pub blacklist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Local times of day in `HH:MM`
    pub fixed_times: Vec<String>,
    pub jitter_minutes: u32,
    pub post_to_x: bool,
    pub post_to_threads: bool,
    /// Monday = 0 ... Sunday = 6
    pub active_days: Vec<u8>,
    /// Unix time of the last Threads token refresh
    pub threads_token_issued: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            fixed_times: vec!["09:00".to_string(), "18:00".to_string()],
            jitter_minutes: 15,
            post_to_x: true,
            post_to_threads: false,
            active_days: (0..7).collect(),
            threads_token_issued: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostTypeConfig {
    pub type_a_ratio: u32,
    pub type_b_ratio: u32,
    pub type_c_ratio: u32,
    pub type_a_styles: Vec<String>,
    pub type_b_styles: Vec<String>,
}

impl Default for PostTypeConfig {
    fn default() -> Self {
        Self {
            type_a_ratio: 3,
            type_b_ratio: 1,
            type_c_ratio: 1,
            type_a_styles: vec![STYLE_HOOK.to_string(), STYLE_NEWS.to_string()],
            type_b_styles: vec![
                STYLE_EPISODE.to_string(),
                STYLE_BREAKDOWN.to_string(),
                STYLE_REDEFINE.to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotePromotion {
    pub articles: Vec<NoteArticle>,
    pub promotion_styles: Vec<PromotionStyle>,
}

impl Default for NotePromotion {
    fn default() -> Self {
        Self {
            articles: Vec::new(),
            promotion_styles: default_promotion_styles(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromotionStyle {
    pub name: String,
    pub weight: u32,
    pub prompt: String,
}

impl Default for PromotionStyle {
    fn default() -> Self {
        Self {
            name: String::new(),
            weight: 1,
            prompt: String::new(),
        }
    }
}

impl PromotionStyle {
    /// Style used when no promotion styles are configured
    pub fn understated() -> Self {
        Self {
            name: "Understated mention".to_string(),
            weight: 1,
            prompt: "Touch lightly on what the article covers and mention it in passing."
                .to_string(),
        }
    }
}

const STYLE_HOOK: &str = "One-line hook";
const STYLE_NEWS: &str = "Headline plus one remark";
const STYLE_EPISODE: &str = "Relatable episode";
const STYLE_BREAKDOWN: &str = "Structural breakdown";
const STYLE_REDEFINE: &str = "Redefinition";

const DEFAULT_GUIDELINES: &str = "\
## How to write
1. Open with a hook: a surprising fact, a concrete number, or the opposite of common sense.
2. Talk about one thing only: connect the topic with one part of the persona's background.
3. Break lines for phone screens: one sentence per line, two or three blocks separated by a blank line.
4. End on an afterimage: a plain observation, never a lesson or a call to action.
5. Keep the vocabulary simple enough for a teenager.

## Self-check before answering
- No wall of text without line breaks.
- No more than three blocks.
- No summary or moral at the end.";

const DEFAULT_NG_EXPRESSIONS: &str = "\
- Overblown metaphors and poetic flourishes
- Questions aimed at the reader (\"What do you think?\")
- Lessons (\"I learned that...\", \"What matters is...\")
- Hashtags
- Business jargon and needless loanwords
- More than one theme per post
- Anything over 500 characters";

fn default_writing_styles() -> Vec<WritingStyle> {
    vec![
        WritingStyle {
            name: STYLE_HOOK.to_string(),
            weight: 5,
            char_range: "80-140 characters".to_string(),
            description: "Compress the topic into one line from the persona's working life. Conclusion first, no explanation.".to_string(),
            structure: "[one-sentence hook] -> [one dry remark]".to_string(),
            example: "Everyone is talking about the digital transformation.\n\nOur team still copies tickets into a spreadsheet by hand.".to_string(),
        },
        WritingStyle {
            name: STYLE_NEWS.to_string(),
            weight: 4,
            char_range: "80-140 characters".to_string(),
            description: "Quote the news in one line and add a single short opinion.".to_string(),
            structure: "[one-line news summary] -> [one-line comment]".to_string(),
            example: "Handheld consoles went up by another 30 dollars.\n\nThe exchange rate has reached my hobbies now.".to_string(),
        },
        WritingStyle {
            name: STYLE_EPISODE.to_string(),
            weight: 3,
            char_range: "140-250 characters".to_string(),
            description: "Cut out one concrete past experience and connect it to the topic. Realism is everything.".to_string(),
            structure: "[hook with a number] -> [episode in two or three sentences] -> [abrupt afterimage]".to_string(),
            example: "\"The deadline cannot move,\" they said. So my sleep schedule moved instead.\nIn at nine, out at four in the morning. Spec version 8.3.\n\nI did not love numbers.\nI just liked a world with one right answer.".to_string(),
        },
        WritingStyle {
            name: STYLE_BREAKDOWN.to_string(),
            weight: 2,
            char_range: "140-280 characters".to_string(),
            description: "Explain why the event happens through its structure. No emotion, just cause and effect.".to_string(),
            structure: "[counter-intuitive hook] -> [two or three sentences of structure] -> [afterimage]".to_string(),
            example: "Big-company IT projects do not fail on technology.\nThey fail on the number of approval stamps.\n\nFive approval stages, each adding edits so nobody can say they were not told.\n\nI used to call it telephone-game development.\nNobody laughed.".to_string(),
        },
        WritingStyle {
            name: STYLE_REDEFINE.to_string(),
            weight: 3,
            char_range: "140-250 characters".to_string(),
            description: "Offer a new definition of a familiar theme based on the persona's experience (X is really Y).".to_string(),
            structure: "[the topic] -> [the redefinition] -> [two or three sentences of reasoning] -> [afterimage]".to_string(),
            example: "Another headline about AI productivity.\n\nAdopting AI is not a magic wand. It is the start of very manual debugging.\nBehind every demo someone is squashing surprises one at a time.\n\nThe people who still use their hands win.".to_string(),
        },
    ]
}

fn default_promotion_styles() -> Vec<PromotionStyle> {
    vec![
        PromotionStyle {
            name: "Understated mention".to_string(),
            weight: 3,
            prompt: "Touch lightly on the article and mention that you wrote about it. Zero pushiness.".to_string(),
        },
        PromotionStyle {
            name: "Resurfacing".to_string(),
            weight: 2,
            prompt: "Present it as an older article worth another look, opening with something like \"an old post of mine is getting read again\".".to_string(),
        },
        PromotionStyle {
            name: "Episode link".to_string(),
            weight: 2,
            prompt: "Tell a short personal episode (two or three sentences) related to the article and lead naturally into it.".to_string(),
        },
        PromotionStyle {
            name: "Open question".to_string(),
            weight: 2,
            prompt: "Raise one question or problem the article deals with, then say you wrote the details up.".to_string(),
        },
        PromotionStyle {
            name: "Lesson shared".to_string(),
            weight: 2,
            prompt: "Share one insight gained while writing the article, without talking down to the reader.".to_string(),
        },
    ]
}

impl Config {
    /// Cap every ratio and weight at [`MAX_WEIGHT`]
    pub fn clamp_weights(&mut self) {
        let post_type = &mut self.post_type;
        for ratio in [
            &mut post_type.type_a_ratio,
            &mut post_type.type_b_ratio,
            &mut post_type.type_c_ratio,
        ] {
            *ratio = (*ratio).min(MAX_WEIGHT);
        }
        for style in &mut self.prompt_settings.writing_styles {
            style.weight = style.weight.min(MAX_WEIGHT);
        }
        for style in &mut self.note_promotion.promotion_styles {
            style.weight = style.weight.min(MAX_WEIGHT);
        }
    }

    /// Configuration as JSON with credentials masked for display
    pub fn to_masked_json(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self).map_err(ConfigError::ParseError)?;
        if let Some(api_keys) = value.get_mut("api_keys") {
            credentials::map_secret_fields(api_keys, credentials::mask);
        }
        Ok(value)
    }

    /// Configuration as JSON with plaintext credentials
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self).map_err(ConfigError::ParseError)?)
    }
}

/// Merge `overlay` into `base`, recursing into objects present on both sides
///
/// Keys missing from `overlay` keep their value from `base`. Any other value
/// in `overlay`, including arrays, replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// File-backed configuration store
///
/// Reads and writes are not coordinated between callers; the last writer
/// wins.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, creating the file with defaults if it is missing
    pub fn load(&self) -> Result<Config> {
        let value = self.load_value()?;
        let mut config: Config = serde_json::from_value(value).map_err(ConfigError::ParseError)?;
        config.clamp_weights();
        Ok(config)
    }

    /// Merged configuration document with plaintext credentials
    pub fn load_value(&self) -> Result<Value> {
        let mut merged = default_value()?;

        if !self.path.exists() {
            info!("No config at {}, writing defaults", self.path.display());
            self.save(&Config::default())?;
            return Ok(merged);
        }

        let content = std::fs::read_to_string(&self.path).map_err(ConfigError::ReadError)?;
        let mut stored: Value = serde_json::from_str(&content).map_err(ConfigError::ParseError)?;
        if let Some(api_keys) = stored.get_mut("api_keys") {
            credentials::map_secret_fields(api_keys, credentials::reveal);
        }

        deep_merge(&mut merged, stored);
        Ok(merged)
    }

    /// Write the configuration with credentials obscured
    pub fn save(&self, config: &Config) -> Result<()> {
        let mut value = serde_json::to_value(config).map_err(ConfigError::ParseError)?;
        if let Some(api_keys) = value.get_mut("api_keys") {
            credentials::map_secret_fields(api_keys, credentials::obfuscate);
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::WriteError)?;
        }
        let body = serde_json::to_string_pretty(&value).map_err(ConfigError::ParseError)?;
        std::fs::write(&self.path, body).map_err(ConfigError::WriteError)?;
        debug!("Saved config to {}", self.path.display());
        Ok(())
    }

    /// Restore the default configuration
    pub fn reset(&self) -> Result<Config> {
        let config = Config::default();
        self.save(&config)?;
        Ok(config)
    }

    /// Replace whole top-level sections with the values in `patch`
    pub fn update(&self, patch: Value) -> Result<Config> {
        let Value::Object(patch) = patch else {
            return Err(AutopostError::InvalidInput("No data provided".to_string()));
        };
        if patch.is_empty() {
            return Err(AutopostError::InvalidInput("No data provided".to_string()));
        }

        let mut current = self.load_value()?;
        if let Value::Object(map) = &mut current {
            for (key, value) in patch {
                map.insert(key, value);
            }
        }
        self.store_value(current)
    }

    /// Merge `patch` into a single section, key by key
    pub fn update_section(&self, section: &str, patch: Value) -> Result<Config> {
        if !SECTIONS.contains(&section) {
            return Err(ConfigError::UnknownSection(section.to_string()).into());
        }
        if patch.is_null() || patch.as_object().is_some_and(|m| m.is_empty()) {
            return Err(AutopostError::InvalidInput("No data provided".to_string()));
        }

        let mut current = self.load_value()?;
        if let Value::Object(map) = &mut current {
            let merge_keys = matches!(
                (map.get(section), &patch),
                (Some(Value::Object(_)), Value::Object(_))
            );
            if !merge_keys {
                map.insert(section.to_string(), patch);
            } else if let (Some(Value::Object(existing)), Value::Object(patch)) =
                (map.get_mut(section), patch)
            {
                for (key, value) in patch {
                    existing.insert(key, value);
                }
            }
        }
        self.store_value(current)
    }

    fn store_value(&self, value: Value) -> Result<Config> {
        let mut config: Config = serde_json::from_value(value).map_err(|e| {
            AutopostError::InvalidInput(format!("Invalid configuration value: {}", e))
        })?;
        config.clamp_weights();
        self.save(&config)?;
        Ok(config)
    }
}

fn default_value() -> Result<Value> {
    Ok(serde_json::to_value(Config::default()).map_err(ConfigError::ParseError)?)
}

/// Locations of every file Autopost keeps on disk
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve the data directory
    ///
    /// `AUTOPOST_HOME` wins when set (with `~` expanded), otherwise the
    /// platform data directory is used.
    pub fn resolve() -> Result<Self> {
        if let Ok(path) = std::env::var(HOME_ENV) {
            if !path.trim().is_empty() {
                return Ok(Self::new(shellexpand::tilde(&path).to_string()));
            }
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

        Ok(Self::new(data_dir.join("autopost")))
    }

    /// Create the data and inbox directories
    pub fn ensure(&self) -> Result<()> {
        std::fs::create_dir_all(self.inbox_dir()).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.root.join("post_history.json")
    }

    pub fn overview_file(&self) -> PathBuf {
        self.root.join("daily_overview.json")
    }

    pub fn analysis_cache_file(&self) -> PathBuf {
        self.root.join("analysis_cache.json")
    }

    pub fn note_cache_file(&self) -> PathBuf {
        self.root.join("note_cache.json")
    }

    /// Drop folder scanned for analytics CSV exports
    pub fn inbox_dir(&self) -> PathBuf {
        self.root.join("inbox")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, ConfigStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::new(temp_dir.path().join("config.json"));
        (temp_dir, store)
    }

    #[test]
    fn test_load_creates_default_file() {
        let (_dir, store) = store();
        assert!(!store.path().exists());

        let config = store.load().unwrap();
        assert!(store.path().exists());
        assert_eq!(config.api_keys.model(), DEFAULT_MODEL);
        assert_eq!(config.schedule.fixed_times, vec!["09:00", "18:00"]);
        assert_eq!(config.schedule.active_days, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(config.prompt_settings.writing_styles.len(), 5);
        assert_eq!(config.note_promotion.promotion_styles.len(), 5);
    }

    #[test]
    fn test_oversized_weights_are_clamped() {
        let (_dir, store) = store();
        std::fs::write(
            store.path(),
            r#"{"post_type": {"type_a_ratio": 4000000000, "type_b_ratio": 4000000000, "type_c_ratio": 1},
                "prompt_settings": {"writing_styles": [
                    {"name": "a", "weight": 4294967295},
                    {"name": "b", "weight": 4294967295}
                ]}}"#,
        )
        .unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.post_type.type_a_ratio, MAX_WEIGHT);
        assert_eq!(config.post_type.type_c_ratio, 1);
        assert!(config
            .prompt_settings
            .writing_styles
            .iter()
            .all(|s| s.weight == MAX_WEIGHT));

        let mut rng = rand::thread_rng();
        crate::generator::selection::select_post_kind(&config.post_type, &mut rng);
        crate::generator::selection::select_style(&config.prompt_settings.writing_styles, &mut rng);
    }

    #[test]
    fn test_update_section_clamps_weights() {
        let (_dir, store) = store();
        let config = store
            .update_section("post_type", serde_json::json!({"type_b_ratio": 99_999_999}))
            .unwrap();
        assert_eq!(config.post_type.type_b_ratio, MAX_WEIGHT);
        assert_eq!(store.load().unwrap().post_type.type_b_ratio, MAX_WEIGHT);
    }

    #[test]
    fn test_partial_file_is_backfilled() {
        let (_dir, store) = store();
        std::fs::write(
            store.path(),
            r#"{"schedule": {"jitter_minutes": 0}, "persona": {"age": "40"}}"#,
        )
        .unwrap();

        let config = store.load().unwrap();
        assert_eq!(config.schedule.jitter_minutes, 0);
        assert_eq!(config.schedule.fixed_times, vec!["09:00", "18:00"]);
        assert!(config.schedule.post_to_x);
        assert_eq!(config.persona.age, "40");
        assert_eq!(config.post_type.type_a_ratio, 3);
    }

    #[test]
    fn test_save_load_roundtrip_keeps_every_default_key() {
        let (_dir, store) = store();
        std::fs::write(store.path(), r#"{"sources": {"rss_urls": ["https://a/rss"]}}"#).unwrap();

        let loaded = store.load().unwrap();
        store.save(&loaded).unwrap();

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        let defaults = serde_json::to_value(Config::default()).unwrap();
        for (section, body) in defaults.as_object().unwrap() {
            assert!(written.get(section).is_some(), "missing section {}", section);
            if let Some(fields) = body.as_object() {
                for key in fields.keys() {
                    assert!(
                        written[section].get(key).is_some(),
                        "missing key {}.{}",
                        section,
                        key
                    );
                }
            }
        }
        assert_eq!(written["sources"]["rss_urls"], json!(["https://a/rss"]));
    }

    #[test]
    fn test_secrets_are_obscured_on_disk() {
        let (_dir, store) = store();
        let mut config = Config::default();
        config.api_keys.gemini_api_key = Secret::new("AIza-secret-key");
        store.save(&config).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("AIza-secret-key"));
        assert!(raw.contains(credentials::OBFUSCATION_PREFIX));

        let loaded = store.load().unwrap();
        assert_eq!(loaded.api_keys.gemini_api_key.expose(), "AIza-secret-key");
    }

    #[test]
    fn test_plaintext_secret_on_disk_is_accepted() {
        let (_dir, store) = store();
        std::fs::write(store.path(), r#"{"api_keys": {"threads_api_key": "plain"}}"#).unwrap();
        let config = store.load().unwrap();
        assert_eq!(config.api_keys.threads_api_key.expose(), "plain");
    }

    #[test]
    fn test_masked_json() {
        let mut config = Config::default();
        config.api_keys.x_api_key = Secret::new("1234567890abcdef");
        config.api_keys.threads_api_key = Secret::new("short");
        let masked = config.to_masked_json().unwrap();
        assert_eq!(masked["api_keys"]["x_api_key"], "1234***cdef");
        assert_eq!(masked["api_keys"]["threads_api_key"], "***");
        assert_eq!(masked["api_keys"]["gemini_api_key"], "");
        assert_eq!(masked["api_keys"]["gemini_model"], DEFAULT_MODEL);
    }

    #[test]
    fn test_update_replaces_top_level_section() {
        let (_dir, store) = store();
        let config = store
            .update(json!({"sources": {"rss_urls": ["https://b/feed"]}}))
            .unwrap();
        assert_eq!(config.sources.rss_urls, vec!["https://b/feed"]);
        assert!(config.sources.blacklist.is_empty());
    }

    #[test]
    fn test_update_rejects_empty_patch() {
        let (_dir, store) = store();
        assert!(matches!(
            store.update(json!({})),
            Err(AutopostError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_update_section_merges_keys() {
        let (_dir, store) = store();
        let config = store
            .update_section("schedule", json!({"jitter_minutes": 5}))
            .unwrap();
        assert_eq!(config.schedule.jitter_minutes, 5);
        assert_eq!(config.schedule.fixed_times, vec!["09:00", "18:00"]);
    }

    #[test]
    fn test_update_section_rejects_unknown_section() {
        let (_dir, store) = store();
        let result = store.update_section("nope", json!({"a": 1}));
        assert!(matches!(
            result,
            Err(AutopostError::Config(ConfigError::UnknownSection(_)))
        ));
    }

    #[test]
    fn test_update_section_rejects_wrong_types() {
        let (_dir, store) = store();
        let result = store.update_section("schedule", json!({"jitter_minutes": "lots"}));
        assert!(matches!(result, Err(AutopostError::InvalidInput(_))));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let (_dir, store) = store();
        store
            .update_section("persona", json!({"age": "33"}))
            .unwrap();
        let config = store.reset().unwrap();
        assert_eq!(config.persona.age, "");
        assert_eq!(store.load().unwrap().persona.age, "");
    }

    #[test]
    fn test_deep_merge_arrays_replace() {
        let mut base = json!({"a": {"b": [1, 2], "c": 1}});
        deep_merge(&mut base, json!({"a": {"b": [3]}}));
        assert_eq!(base, json!({"a": {"b": [3], "c": 1}}));
    }

    #[test]
    fn test_api_keys_requirements() {
        let mut keys = ApiKeys::default();
        assert!(!keys.has_x());
        assert_eq!(keys.missing_x_fields().len(), 4);
        assert!(keys.require_gemini().is_err());

        keys.gemini_api_key = Secret::new("k");
        assert_eq!(keys.require_gemini().unwrap(), "k");
    }

    #[test]
    fn test_persona_summary_falls_back_to_fields() {
        let persona = Persona {
            age: "35".to_string(),
            occupation: "engineer".to_string(),
            ..Default::default()
        };
        assert_eq!(persona.summary(), "age: 35\noccupation: engineer");

        let persona = Persona {
            generated_text: "You are a tired engineer.".to_string(),
            ..persona
        };
        assert_eq!(persona.summary(), "You are a tired engineer.");
    }

    #[test]
    #[serial_test::serial]
    fn test_data_paths_env_override() {
        std::env::set_var(HOME_ENV, "/tmp/autopost-test-home");
        let paths = DataPaths::resolve().unwrap();
        assert_eq!(paths.root(), Path::new("/tmp/autopost-test-home"));
        assert_eq!(
            paths.history_file(),
            PathBuf::from("/tmp/autopost-test-home/post_history.json")
        );
        std::env::remove_var(HOME_ENV);
    }
}
