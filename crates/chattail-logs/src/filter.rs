use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

use chattail_types::{Category, Entry};

/// Predicate deciding which entries a publisher keeps
pub type FilterFn = Box<dyn Fn(&Entry) -> bool + Send + Sync>;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid filter pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Compiled filter for chat entries
#[derive(Clone)]
pub struct CompiledFilter {
    /// Regex over the message body (if any)
    regex: Option<Regex>,

    /// Original pattern string
    pattern: String,

    /// Categories to include (empty = all)
    categories: HashSet<Category>,

    /// Channel owners to include (empty = all)
    senders: HashSet<String>,

    /// Only keep player-authored entries
    require_display_name: bool,

    /// Whether to invert match
    invert: bool,

    /// Case sensitivity
    case_insensitive: bool,
}

impl CompiledFilter {
    /// A filter that matches every entry
    pub fn any() -> Self {
        Self {
            regex: None,
            pattern: String::new(),
            categories: HashSet::new(),
            senders: HashSet::new(),
            require_display_name: false,
            invert: false,
            case_insensitive: false,
        }
    }

    /// Create a new filter from a pattern string
    pub fn new(pattern: &str) -> Result<Self, FilterError> {
        Self::any().with_pattern(pattern, false)
    }

    /// Create a case-insensitive filter
    pub fn new_case_insensitive(pattern: &str) -> Result<Self, FilterError> {
        Self::any().with_pattern(pattern, true)
    }

    /// Replace the message pattern; an empty pattern matches any text
    pub fn with_pattern(mut self, pattern: &str, case_insensitive: bool) -> Result<Self, FilterError> {
        let expr = if case_insensitive {
            format!("(?i){}", pattern)
        } else {
            pattern.to_string()
        };
        self.regex = compile(&expr, pattern)?;
        self.pattern = pattern.to_string();
        self.case_insensitive = case_insensitive;
        Ok(self)
    }

    /// Set categories to filter by
    pub fn with_categories(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.categories.extend(categories);
        self
    }

    /// Set channel owners to filter by
    pub fn with_senders(mut self, senders: impl IntoIterator<Item = String>) -> Self {
        self.senders.extend(senders);
        self
    }

    /// Drop entries without an author
    pub fn requiring_display_name(mut self) -> Self {
        self.require_display_name = true;
        self
    }

    /// Invert the match
    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    /// Check if an entry matches this filter
    pub fn matches(&self, entry: &Entry) -> bool {
        if !self.categories.is_empty() && !self.categories.contains(&entry.category) {
            return self.invert;
        }

        if !self.senders.is_empty() {
            let known = entry
                .sender
                .as_ref()
                .is_some_and(|sender| self.senders.contains(sender));
            if !known {
                return self.invert;
            }
        }

        if self.require_display_name && entry.display_name.is_none() {
            return self.invert;
        }

        let text_match = match &self.regex {
            Some(re) => re.is_match(&entry.value),
            None => true,
        };

        if self.invert { !text_match } else { text_match }
    }

    /// Box this filter as a publisher predicate
    pub fn into_predicate(self) -> FilterFn {
        Box::new(move |entry| self.matches(entry))
    }

    /// Get the original pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Check if filter is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        self.regex.is_none()
            && self.categories.is_empty()
            && self.senders.is_empty()
            && !self.require_display_name
            && !self.invert
    }

    /// Check if filter is case insensitive
    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

fn compile(expr: &str, pattern: &str) -> Result<Option<Regex>, FilterError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(expr)
        .map(Some)
        .map_err(|source| FilterError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

impl std::fmt::Debug for CompiledFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFilter")
            .field("pattern", &self.pattern)
            .field("categories", &self.categories)
            .field("senders", &self.senders)
            .field("require_display_name", &self.require_display_name)
            .field("invert", &self.invert)
            .finish()
    }
}

/// Quick filter presets
pub struct FilterPresets;

impl FilterPresets {
    /// Player-authored public chat only
    pub fn public_chat() -> CompiledFilter {
        CompiledFilter::any()
            .with_categories([Category::PublicChat])
            .requiring_display_name()
    }

    /// Clan chat and clan announcements
    pub fn clan() -> CompiledFilter {
        CompiledFilter::any().with_categories([Category::ClanChat, Category::ClanAnnouncement])
    }

    /// Engine and game messages
    pub fn game_messages() -> CompiledFilter {
        CompiledFilter::any().with_categories([Category::GameMessage])
    }
}
