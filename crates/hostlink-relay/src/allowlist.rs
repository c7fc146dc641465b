//! Registration allow-list
//!
//! Maps known client identities to the capability set granted at
//! registration. A capability names a domain action the identity
//! handles; the relay resolves an inbound action to its owning
//! identity through this map. The relay only reads the allow-list,
//! never mutates it.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Allowlist {
    // BTreeMap keeps owner resolution deterministic when two
    // identities declare the same capability
    entries: BTreeMap<String, Vec<String>>,
}

impl Allowlist {
    /// Empty allow-list; every registration is rejected
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Builder-style entry insertion
    pub fn with_entry(mut self, identity: impl Into<String>, capabilities: &[&str]) -> Self {
        self.insert(
            identity.into(),
            capabilities.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn insert(&mut self, identity: String, capabilities: Vec<String>) {
        self.entries.insert(identity, capabilities);
    }

    /// Capability set granted to `identity`, or None if the identity
    /// is not permitted to register
    pub fn capabilities(&self, identity: &str) -> Option<&[String]> {
        self.entries.get(identity).map(|caps| caps.as_slice())
    }

    /// The identity whose capability set contains `action`
    pub fn owner_of(&self, action: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, caps)| caps.iter().any(|c| c == action))
            .map(|(identity, _)| identity.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Allowlist {
    /// Built-in identities of the stock plugin deployment: the panel
    /// handles generation notifications, the host script handles
    /// editor actions.
    fn default() -> Self {
        Allowlist::new()
            .with_entry(
                "sfx-panel",
                &["generation.progress", "generation.complete"],
            )
            .with_entry(
                "host-script",
                &[
                    "timeline.place-audio",
                    "sequence.info",
                    "project.import-file",
                ],
            )
    }
}
