//! Core types and functionality for AgentDNS.
//!
//! Configuration and localized messages.

mod config;
mod i18n;

pub use config::{
    resolve_locale, CompletionConfig, Config, DiscoveryConfig, ToolServiceConfig, CONFIG_ENV,
    DEFAULT_LOCALE, LANG_ENV,
};
pub use i18n::{I18n, BANNER};
