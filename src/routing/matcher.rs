//! Rule-based category matching.
//!
//! Maps decomposed subtasks to the service categories AgentDNS advertises,
//! using a static keyword table from the configuration. Matching is pure:
//! no I/O, no failure modes.

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Everything that is neither a word character nor a CJK ideograph.
static STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\x{4e00}-\x{9fff}]+").unwrap());

/// Category names advertised by the discovery service.
pub type CategorySet = BTreeSet<String>;

/// Case-fold and drop punctuation and whitespace so keyword lookups are
/// insensitive to formatting.
pub fn normalize(text: &str) -> String {
    STRIP.replace_all(&text.to_lowercase(), "").into_owned()
}

/// The category assigned to a subtask.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    /// A category advertised by the discovery service
    Known(String),
    /// No supported rule matched
    Unknown,
}

impl Category {
    /// Whether a rule matched.
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// The category name, `unknown` for the sentinel.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(name) => name,
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keywords for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    /// Category name
    pub category: String,
    /// Normalized, non-empty keywords
    pub keywords: Vec<String>,
}

impl CategoryRule {
    /// Create a rule, normalizing its keywords.
    ///
    /// Keywords that normalize to nothing are dropped; an empty keyword
    /// would match every subtask.
    pub fn new<I, S>(category: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| normalize(k.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();
        Self { category: category.into(), keywords }
    }

    fn matches(&self, normalized_subtask: &str) -> bool {
        self.keywords.iter().any(|k| normalized_subtask.contains(k.as_str()))
    }
}

/// Ordered keyword table. Table order is the tie-break when several
/// categories match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryRules {
    rules: Vec<CategoryRule>,
}

impl CategoryRules {
    /// Build a table from rules in priority order.
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }

    /// Iterate rules in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &CategoryRule> {
        self.rules.iter()
    }

    /// Number of categories in the table.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'de> Deserialize<'de> for CategoryRules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RulesVisitor;

        impl<'de> Visitor<'de> for RulesVisitor {
            type Value = CategoryRules;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of category names to keyword lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut rules = Vec::new();
                while let Some((category, keywords)) = map.next_entry::<String, Vec<String>>()? {
                    rules.push(CategoryRule::new(category, keywords));
                }
                Ok(CategoryRules { rules })
            }
        }

        deserializer.deserialize_map(RulesVisitor)
    }
}

impl Serialize for CategoryRules {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rules.len()))?;
        for rule in &self.rules {
            map.serialize_entry(&rule.category, &rule.keywords)?;
        }
        map.end()
    }
}

/// Subtask → category, in decomposition order.
///
/// Behaves like a map keyed by subtask text: a repeated subtask keeps the
/// position of its first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryAssignment {
    entries: Vec<(String, Category)>,
}

impl CategoryAssignment {
    fn insert(&mut self, subtask: String, category: Category) {
        match self.entries.iter_mut().find(|(s, _)| *s == subtask) {
            Some(entry) => entry.1 = category,
            None => self.entries.push((subtask, category)),
        }
    }

    /// Category assigned to a subtask.
    pub fn get(&self, subtask: &str) -> Option<&Category> {
        self.entries.iter().find(|(s, _)| s == subtask).map(|(_, c)| c)
    }

    /// Iterate entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Category)> {
        self.entries.iter().map(|(s, c)| (s.as_str(), c))
    }

    /// Number of distinct subtasks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was assigned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when no subtask matched a category. Vacuously true when there
    /// are no subtasks at all.
    pub fn all_unknown(&self) -> bool {
        self.entries.iter().all(|(_, c)| !c.is_known())
    }
}

/// Matches subtasks against the rule table.
#[derive(Debug, Clone)]
pub struct CategoryMatcher {
    rules: CategoryRules,
}

impl CategoryMatcher {
    /// Create a matcher over a rule table.
    pub fn new(rules: CategoryRules) -> Self {
        Self { rules }
    }

    /// Match one subtask. Categories absent from `supported` are skipped even
    /// when the table lists them.
    pub fn match_one(&self, subtask: &str, supported: &CategorySet) -> Category {
        let normalized = normalize(subtask);

        self.rules
            .iter()
            .filter(|rule| supported.contains(&rule.category))
            .find(|rule| rule.matches(&normalized))
            .map_or(Category::Unknown, |rule| Category::Known(rule.category.clone()))
    }

    /// Match every subtask.
    pub fn assign<S: AsRef<str>>(
        &self,
        subtasks: &[S],
        supported: &CategorySet,
    ) -> CategoryAssignment {
        let mut assignment = CategoryAssignment::default();
        for subtask in subtasks {
            let subtask = subtask.as_ref();
            let category = self.match_one(subtask, supported);
            tracing::debug!(subtask, category = %category, "Subtask matched");
            assignment.insert(subtask.to_string(), category);
        }
        assignment
    }
}
