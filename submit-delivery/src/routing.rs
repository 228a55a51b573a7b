//! Recipient routing
//!
//! Methods are evaluated in a fixed order: the implicit `local` method, the
//! configured methods in declaration order, and finally the implicit
//! `remote` method. A method whose `from` allow-list excludes the envelope
//! sender is skipped. Every recipient goes to the first method whose domains
//! match it; addresses without a domain always go to `local`, and anything
//! left over goes to `remote`.
//!
//! The resulting plan lists the methods in reverse: `remote` first and
//! `local` last, since local delivery is the most likely to succeed.

use std::collections::{BTreeSet, HashMap};

use submit_common::{Config, LOCAL_METHOD, Message, REMOTE_METHOD, host};

/// Recipients assigned to one delivery method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub method: String,
    pub recipients: Vec<String>,
}

impl PlanEntry {
    pub fn new<I, S>(method: impl Into<String>, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method: method.into(),
            recipients: recipients.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered delivery methods with the recipients each one carries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryPlan {
    entries: Vec<PlanEntry>,
}

impl DeliveryPlan {
    /// A plan authenticating `method`, or every configured method when
    /// `None`, without any recipients
    pub fn unlock(config: &Config, method: Option<&str>) -> Self {
        let entries = match method {
            Some(method) => vec![PlanEntry::new(method, Vec::<String>::new())],
            None => config
                .get_methods()
                .into_iter()
                .map(|method| PlanEntry::new(method, Vec::<String>::new()))
                .collect(),
        };
        Self { entries }
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.method.as_str())
    }
}

/// Domains a method carries
#[derive(Debug)]
enum Domains {
    Any,
    Only(BTreeSet<String>),
}

impl Domains {
    fn matches(&self, recipient: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(domains) => domains
                .iter()
                .any(|domain| recipient.ends_with(&format!("@{domain}"))),
        }
    }
}

/// Builds [`DeliveryPlan`]s from a configuration.
pub struct Router<'a> {
    config: &'a Config,
    local_defaults: Vec<String>,
}

impl<'a> Router<'a> {
    /// A router whose `local` method defaults to this host's names
    pub fn new(config: &'a Config) -> Self {
        Self::with_local_defaults(
            config,
            vec![host::hostname(), host::fqdn(), "localhost".to_string()],
        )
    }

    /// A router whose `local` method defaults to `local_defaults` unless
    /// the configuration lists its domains explicitly
    pub fn with_local_defaults(config: &'a Config, local_defaults: Vec<String>) -> Self {
        Self {
            config,
            local_defaults,
        }
    }

    /// Methods in evaluation order
    fn evaluation_order(&self) -> Vec<&'a str> {
        std::iter::once(LOCAL_METHOD)
            .chain(
                self.config
                    .get_methods()
                    .into_iter()
                    .filter(|&name| name != LOCAL_METHOD && name != REMOTE_METHOD),
            )
            .chain(std::iter::once(REMOTE_METHOD))
            .collect()
    }

    fn local_domains(&self) -> BTreeSet<String> {
        let section = self.config.method(LOCAL_METHOD);
        let mut domains: BTreeSet<String> = section
            .and_then(|m| m.domains.clone())
            .unwrap_or_else(|| self.local_defaults.clone())
            .into_iter()
            .collect();

        if let Some(extra) = section.and_then(|m| m.extra_domains.as_ref()) {
            domains.extend(extra.iter().cloned());
        }

        domains
            .into_iter()
            .map(|domain| domain.trim().to_string())
            .filter(|domain| !domain.is_empty())
            .collect()
    }

    fn domains(&self, method: &str) -> Domains {
        if method == LOCAL_METHOD {
            return Domains::Only(self.local_domains());
        }

        match self.config.method(method).and_then(|m| m.domains.as_ref()) {
            Some(domains) => Domains::Only(
                domains
                    .iter()
                    .map(|domain| domain.trim().to_string())
                    .collect(),
            ),
            None => Domains::Any,
        }
    }

    fn accepts_sender(&self, method: &str, envelope_from: &str) -> bool {
        self.config
            .method(method)
            .is_none_or(|m| m.accepts_sender(envelope_from))
    }

    /// Assign every recipient of `message` to a delivery method
    pub fn route(&self, message: &Message) -> DeliveryPlan {
        let order = self.evaluation_order();
        let candidates: Vec<(&str, Domains)> = order
            .iter()
            .copied()
            .filter(|method| self.accepts_sender(method, message.envelope_from()))
            .map(|method| (method, self.domains(method)))
            .collect();

        let mut assigned: HashMap<&str, Vec<String>> = HashMap::new();
        for recipient in message.recipients() {
            let method = if recipient.contains('@') {
                candidates
                    .iter()
                    .find(|(_, domains)| domains.matches(recipient))
                    .map_or(REMOTE_METHOD, |(method, _)| *method)
            } else {
                LOCAL_METHOD
            };
            assigned.entry(method).or_default().push(recipient.clone());
        }

        let entries = order
            .iter()
            .rev()
            .filter_map(|method| {
                assigned
                    .remove(method)
                    .map(|recipients| PlanEntry::new(*method, recipients))
            })
            .collect();

        DeliveryPlan { entries }
    }
}
