// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Credential registry
//
// Maps the public model name a client asks for onto the agent API key that
// serves it. Reads vastly outnumber refreshes, so the map sits behind an
// `RwLock` and a refresh swaps the whole map at once.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

/// An upstream API key. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if self.0.chars().count() > 8 {
            write!(f, "Credential(***{tail})")
        } else {
            f.write_str("Credential(***)")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("model \"{model}\" is not configured (known models: {})", .known.join(", "))]
    NotFound { model: String, known: Vec<String> },
}

/// Resolves a model name to the credential that serves it.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, model: &str) -> Result<Credential, RegistryError>;

    /// Configured model names, sorted.
    fn model_names(&self) -> Vec<String>;
}

/// In-memory registry refreshed from configuration.
#[derive(Debug, Default)]
pub struct CredentialRegistry {
    entries: RwLock<BTreeMap<String, Credential>>,
}

impl CredentialRegistry {
    pub fn new(entries: BTreeMap<String, Credential>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Replace every entry at once.
    pub fn refresh(&self, entries: BTreeMap<String, Credential>) {
        let count = entries.len();
        match self.entries.write() {
            Ok(mut guard) => *guard = entries,
            Err(poisoned) => *poisoned.into_inner() = entries,
        }
        tracing::info!(models = count, "credential registry refreshed");
    }

    pub fn len(&self) -> usize {
        self.read(|map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read<T>(&self, f: impl FnOnce(&BTreeMap<String, Credential>) -> T) -> T {
        match self.entries.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }
}

impl CredentialResolver for CredentialRegistry {
    fn resolve(&self, model: &str) -> Result<Credential, RegistryError> {
        self.read(|map| {
            map.get(model).cloned().ok_or_else(|| RegistryError::NotFound {
                model: model.to_string(),
                known: map.keys().cloned().collect(),
            })
        })
    }

    fn model_names(&self) -> Vec<String> {
        self.read(|map| map.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn registry(pairs: &[(&str, &str)]) -> CredentialRegistry {
        CredentialRegistry::new(
            pairs
                .iter()
                .map(|(m, k)| (m.to_string(), Credential::new(*k)))
                .collect(),
        )
    }

    #[test]
    fn resolves_known_model() {
        let reg = registry(&[("agent-a", "app-aaaa"), ("agent-b", "app-bbbb")]);
        assert_eq!(reg.resolve("agent-b").unwrap().expose(), "app-bbbb");
        assert_eq!(reg.model_names(), vec!["agent-a", "agent-b"]);
    }

    #[test]
    fn unknown_model_lists_known_names() {
        let reg = registry(&[("b", "k1"), ("a", "k2")]);
        let err = reg.resolve("c").unwrap_err();
        assert_eq!(
            err,
            RegistryError::NotFound {
                model: "c".to_string(),
                known: vec!["a".to_string(), "b".to_string()],
            }
        );
        assert!(err.to_string().contains("known models: a, b"));
    }

    #[test]
    fn refresh_replaces_all_entries() {
        let reg = registry(&[("old", "k")]);
        reg.refresh(
            [("new".to_string(), Credential::new("k2"))]
                .into_iter()
                .collect(),
        );
        assert!(reg.resolve("old").is_err());
        assert_eq!(reg.resolve("new").unwrap().expose(), "k2");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn debug_redacts_key() {
        let shown = format!("{:?}", Credential::new("app-verysecretkey1234"));
        assert_eq!(shown, "Credential(***1234)");
        assert!(!format!("{:?}", Credential::new("short")).contains("short"));
    }

    #[test]
    fn concurrent_reads_during_refresh() {
        let reg = Arc::new(registry(&[("m", "k0")]));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let key = reg.resolve("m").unwrap();
                        assert!(key.expose().starts_with('k'));
                    }
                })
            })
            .collect();
        for i in 0..100 {
            reg.refresh(
                [("m".to_string(), Credential::new(format!("k{i}")))]
                    .into_iter()
                    .collect(),
            );
        }
        for r in readers {
            r.join().unwrap();
        }
    }
}
