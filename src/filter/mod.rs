use std::collections::HashSet;

use regex::Regex;
use thiserror::Error;

use crate::scanner::ScanResult;

// the raw rule set as configured. content rules (regex and keywords) only see
// a body when it was captured, see `ResultFilter::include`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterRules {
    pub status_codes: Vec<u16>,
    pub exclude_status: Vec<u16>,
    pub min_size: u64,
    pub max_size: u64,
    pub include_regex: Option<String>,
    pub exclude_regex: Option<String>,
    pub include_words: Vec<String>,
    pub exclude_words: Vec<String>,
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid {kind} regex '{pattern}': {source}")]
    Regex {
        kind: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("min size {min} is larger than max size {max}")]
    SizeRange { min: u64, max: u64 },
}

#[derive(Clone, Debug, Default)]
pub struct ResultFilter {
    allow_status: HashSet<u16>,
    deny_status: HashSet<u16>,
    min_size: u64,
    max_size: u64,
    include_regex: Option<Regex>,
    exclude_regex: Option<Regex>,
    include_words: Vec<String>,
    exclude_words: Vec<String>,
}

impl ResultFilter {
    pub fn new(rules: &FilterRules) -> Result<Self, FilterError> {
        if rules.min_size > 0 && rules.max_size > 0 && rules.min_size > rules.max_size {
            return Err(FilterError::SizeRange {
                min: rules.min_size,
                max: rules.max_size,
            });
        }
        Ok(Self {
            allow_status: rules.status_codes.iter().copied().collect(),
            deny_status: rules.exclude_status.iter().copied().collect(),
            min_size: rules.min_size,
            max_size: rules.max_size,
            include_regex: compile("include", rules.include_regex.as_deref())?,
            exclude_regex: compile("exclude", rules.exclude_regex.as_deref())?,
            include_words: non_empty(&rules.include_words),
            exclude_words: non_empty(&rules.exclude_words),
        })
    }

    pub fn include(&self, result: &ScanResult) -> bool {
        let status = result.status_code();
        if !self.allow_status.is_empty() && !self.allow_status.contains(&status) {
            return false;
        }
        if self.deny_status.contains(&status) {
            return false;
        }

        let size = result.size();
        if self.min_size > 0 && size < self.min_size {
            return false;
        }
        if self.max_size > 0 && size > self.max_size {
            return false;
        }

        // an uncaptured body never matches anything
        let body = result.body();
        if let Some(re) = self.include_regex.as_ref() {
            if !body.map_or(false, |b| re.is_match(b)) {
                return false;
            }
        }
        if let Some(re) = self.exclude_regex.as_ref() {
            if body.map_or(false, |b| re.is_match(b)) {
                return false;
            }
        }
        if !self.include_words.is_empty()
            && !body.map_or(false, |b| self.include_words.iter().any(|w| b.contains(w)))
        {
            return false;
        }
        if body.map_or(false, |b| self.exclude_words.iter().any(|w| b.contains(w))) {
            return false;
        }
        true
    }

    pub fn has_content_rules(&self) -> bool {
        self.include_regex.is_some()
            || self.exclude_regex.is_some()
            || !self.include_words.is_empty()
            || !self.exclude_words.is_empty()
    }
}

fn compile(kind: &'static str, pattern: Option<&str>) -> Result<Option<Regex>, FilterError> {
    match pattern.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => Regex::new(p).map(Some).map_err(|e| FilterError::Regex {
            kind,
            pattern: p.to_string(),
            source: e,
        }),
        None => Ok(None),
    }
}

fn non_empty(words: &[String]) -> Vec<String> {
    words
        .iter()
        .filter(|w| !w.is_empty())
        .cloned()
        .collect()
}
