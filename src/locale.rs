//! Per-field language resolution.
//!
//! Translated attributes live side by side on an entity, sharing a base name
//! and differing by a language suffix (`title_uz`, `title_ru`, `title_en`).
//! Every display surface picks the active value with the same rule: the
//! requested language if it has a value, then the default language, then "".

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

/// Languages the site is published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Language {
    #[default]
    Uz,
    Ru,
    En,
}

/// Fallback language for every translated field.
pub const DEFAULT_LANGUAGE: Language = Language::Uz;

impl Language {
    pub fn all() -> &'static [Language] {
        &[Language::Uz, Language::Ru, Language::En]
    }

    /// Field suffix, also the ISO 639-1 code.
    pub fn code(&self) -> &'static str {
        match self {
            Language::Uz => "uz",
            Language::Ru => "ru",
            Language::En => "en",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Uz => "O'zbekcha",
            Language::Ru => "Русский",
            Language::En => "English",
        }
    }

    pub fn parse(code: &str) -> Option<Language> {
        match code.trim().to_ascii_lowercase().as_str() {
            "uz" => Some(Language::Uz),
            "ru" => Some(Language::Ru),
            "en" => Some(Language::En),
            _ => None,
        }
    }

    /// Language switcher order.
    pub fn next(&self) -> Language {
        match self {
            Language::Uz => Language::Ru,
            Language::Ru => Language::En,
            Language::En => Language::Uz,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Anything that can hand out the textual value of a named attribute.
pub trait FieldSource {
    fn field(&self, key: &str) -> Option<String>;
}

impl FieldSource for Map<String, Value> {
    fn field(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl FieldSource for HashMap<String, String> {
    fn field(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

pub fn field_key(base: &str, lang: Language) -> String {
    format!("{}_{}", base, lang.code())
}

/// Resolve `base` for `lang`, falling back to [`DEFAULT_LANGUAGE`].
pub fn resolve<S: FieldSource + ?Sized>(entity: &S, base: &str, lang: Language) -> String {
    resolve_with(entity, base, lang, DEFAULT_LANGUAGE)
}

pub fn resolve_with<S: FieldSource + ?Sized>(
    entity: &S,
    base: &str,
    lang: Language,
    default: Language,
) -> String {
    let present = |l: Language| entity.field(&field_key(base, l)).filter(|v| !v.is_empty());
    present(lang).or_else(|| present(default)).unwrap_or_default()
}

/// Form label for one language variant, e.g. `Name (RU)`.
pub fn field_label(base: &str, lang: Language) -> String {
    let mut chars = base.replace('_', " ").chars().collect::<Vec<char>>();
    if let Some(first) = chars.first_mut() {
        *first = first.to_ascii_uppercase();
    }
    format!(
        "{} ({})",
        chars.into_iter().collect::<String>(),
        lang.code().to_ascii_uppercase()
    )
}
