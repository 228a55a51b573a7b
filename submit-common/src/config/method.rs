use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Backend type used when a method does not name one
pub const DEFAULT_KIND: &str = "sendmail";

fn default_kind() -> String {
    DEFAULT_KIND.to_string()
}

/// A named delivery method with its routing and backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,

    /// Backend tag resolved by the deliverer registry
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,

    /// Envelope senders allowed to use this method. Entries starting with
    /// `@` match every address in that domain.
    #[serde(default)]
    pub from: Option<Vec<String>>,

    /// Recipient domains carried by this method; unset matches everything
    #[serde(default)]
    pub domains: Option<Vec<String>>,

    /// Domains added to the defaults of the `local` method
    #[serde(default)]
    pub extra_domains: Option<Vec<String>>,

    /// Password cache lifetime in minutes
    #[serde(default)]
    pub expire: Option<u64>,

    /// Backend specific settings and default credentials
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

impl Method {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: default_kind(),
            from: None,
            domains: None,
            extra_domains: None,
            expire: None,
            settings: HashMap::new(),
        }
    }

    /// Whether `envelope_from` may be submitted through this method
    pub fn accepts_sender(&self, envelope_from: &str) -> bool {
        self.from.as_ref().is_none_or(|allowed| {
            allowed.iter().map(|entry| entry.trim()).any(|entry| {
                if entry.starts_with('@') {
                    envelope_from.ends_with(entry)
                } else {
                    envelope_from == entry
                }
            })
        })
    }
}
