//! JSON rule table: site-local overrides matched against window properties.
//!
//! Each rule tests one window key with one predicate and, on match, names the
//! desktop entry to use. The table is loaded once at startup from a JSON
//! document shipped with the desktop or dropped in by an admin.

use regex::RegexBuilder;
use serde::Deserialize;
use tracing::warn;

use crate::error::DockResult;
use crate::window::{BackendData, WindowRecord};

/// Window property a rule can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKey {
    WmClass,
    WmInstance,
    Title,
    AppId,
    Exe,
}

/// Match predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOp {
    Equals,
    Contains,
    Regex,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub key: RuleKey,
    pub op: RuleOp,
    pub value: String,
    #[serde(default)]
    pub case_sensitive: bool,
    /// Desktop-entry id (preferred) or absolute path to resolve to.
    pub result: String,
}

impl Rule {
    /// Apply the predicate to the window's value for `key`.
    pub fn matches(&self, window: &WindowRecord, exe: &str) -> bool {
        let value = match self.key {
            RuleKey::Title => window.title.clone(),
            RuleKey::Exe => exe.to_string(),
            RuleKey::WmClass => match &window.backend {
                BackendData::X11(data) => data.wm_class.clone(),
                BackendData::Wayland(_) => String::new(),
            },
            RuleKey::WmInstance => match &window.backend {
                BackendData::X11(data) => data.wm_instance.clone(),
                BackendData::Wayland(_) => String::new(),
            },
            RuleKey::AppId => match &window.backend {
                BackendData::X11(data) => data.gtk_app_id.clone(),
                BackendData::Wayland(data) => data.app_id.clone(),
            },
        };
        if value.is_empty() {
            return false;
        }
        self.matches_value(&value)
    }

    fn matches_value(&self, value: &str) -> bool {
        match self.op {
            RuleOp::Equals => {
                if self.case_sensitive {
                    value == self.value
                } else {
                    value.eq_ignore_ascii_case(&self.value)
                }
            }
            RuleOp::Contains => {
                if self.case_sensitive {
                    value.contains(&self.value)
                } else {
                    value.to_lowercase().contains(&self.value.to_lowercase())
                }
            }
            RuleOp::Regex => {
                match RegexBuilder::new(&self.value)
                    .case_insensitive(!self.case_sensitive)
                    .build()
                {
                    Ok(re) => re.is_match(value),
                    Err(e) => {
                        warn!(rule = %self.value, "invalid rule regex: {e}");
                        false
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a JSON array of rules.
    pub fn from_json(json: &str) -> DockResult<Self> {
        let rules: Vec<Rule> = serde_json::from_str(json)?;
        Ok(Self { rules })
    }

    /// First rule matching the window, in table order.
    pub fn first_match(&self, window: &WindowRecord, exe: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.matches(window, exe))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
