//! Localized user-facing messages.
//!
//! Catalogs are embedded at compile time. Lookups use dotted keys
//! (`main.input_prompt`); a missing key renders as the key itself so a gap
//! in a catalog never breaks output.

use serde_json::Value;

use super::config::DEFAULT_LOCALE;

const CATALOGS: [(&str, &str); 2] = [
    ("zh-CN", include_str!("../../resources/i18n/zh-CN.json")),
    ("en-US", include_str!("../../resources/i18n/en-US.json")),
];

/// Startup banner.
pub const BANNER: &str = include_str!("../../resources/banner.txt");

/// Message catalog for one locale.
#[derive(Debug, Clone)]
pub struct I18n {
    locale: String,
    catalog: Value,
}

impl I18n {
    /// Load the catalog for `locale`, falling back to the default locale.
    pub fn new(locale: &str) -> Self {
        let (locale, source) = CATALOGS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(locale))
            .or_else(|| CATALOGS.iter().find(|(name, _)| *name == DEFAULT_LOCALE))
            .map_or((DEFAULT_LOCALE, "{}"), |(name, source)| (*name, *source));

        let catalog = serde_json::from_str(source).unwrap_or_else(|e| {
            tracing::warn!(locale, error = %e, "Message catalog is not valid JSON");
            Value::Null
        });

        Self { locale: locale.to_string(), catalog }
    }

    /// The locale actually in use.
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Locales with an embedded catalog.
    pub fn available() -> impl Iterator<Item = &'static str> {
        CATALOGS.iter().map(|(name, _)| *name)
    }

    /// Translate a dotted key.
    pub fn t(&self, key: &str) -> String {
        key.split('.')
            .try_fold(&self.catalog, |node, part| node.get(part))
            .and_then(Value::as_str)
            .map_or_else(|| key.to_string(), str::to_string)
    }

    /// Translate a dotted key and substitute `{name}` placeholders.
    pub fn t_with(&self, key: &str, args: &[(&str, &str)]) -> String {
        args.iter().fold(self.t(key), |text, (name, value)| {
            text.replace(&format!("{{{}}}", name), value)
        })
    }

    /// Name of the locale's language, used to steer model replies.
    pub fn language_name(&self) -> String {
        self.t("prompt.language")
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::new(DEFAULT_LOCALE)
    }
}
