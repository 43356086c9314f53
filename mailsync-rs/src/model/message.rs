use crate::model::flags::{CanonicalFlag, FlagRecord};
use serde::{Deserialize, Serialize};

/// A label attached to messages: canonical, or display-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub account_id: i64,
    /// Canonical name, `None` for display-only categories
    pub name: Option<CanonicalFlag>,
    pub display_name: String,
}

/// What a flag record asks for, before it is resolved to a category row
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CategoryRef {
    Canonical(CanonicalFlag),
    Display(String),
}

impl CategoryRef {
    /// Value stored in `categories.name` (empty for display-only)
    pub fn name(&self) -> &str {
        match self {
            CategoryRef::Canonical(flag) => flag.as_str(),
            CategoryRef::Display(_) => "",
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            CategoryRef::Canonical(flag) => flag.as_str(),
            CategoryRef::Display(name) => name,
        }
    }
}

impl FlagRecord {
    pub fn category_refs(&self) -> Vec<CategoryRef> {
        self.canonical_flags
            .iter()
            .map(|flag| CategoryRef::Canonical(*flag))
            .chain(
                self.custom_flags
                    .iter()
                    .map(|label| CategoryRef::Display(label.clone())),
            )
            .collect()
    }
}

/// A logical mail item and its derived state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub account_id: i64,
    pub is_draft: bool,
    pub is_read: bool,
    pub is_starred: bool,
    pub categories: Vec<Category>,
}

impl Message {
    pub fn canonical_names(&self) -> Vec<&'static str> {
        self.categories
            .iter()
            .filter_map(|c| c.name.map(|n| n.as_str()))
            .collect()
    }

    pub fn display_names(&self) -> Vec<&str> {
        self.categories
            .iter()
            .map(|c| c.display_name.as_str())
            .collect()
    }

    pub fn has_category(&self, flag: CanonicalFlag) -> bool {
        self.categories.iter().any(|c| c.name == Some(flag))
    }
}

/// A message as seen in one remote folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUid {
    pub id: i64,
    pub account_id: i64,
    pub folder_id: i64,
    pub msg_uid: u32,
    pub message_id: i64,
    pub has_draft_marker: bool,
    pub is_seen: bool,
    pub is_starred: bool,
    pub is_deleted: bool,
    pub extra_flags: Vec<String>,
}
