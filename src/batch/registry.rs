//! Known entity kinds a batch may touch

use crate::config::BatchConfig;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct EntityRegistry {
    kinds: BTreeSet<String>,
}

impl EntityRegistry {
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kinds: kinds.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.known_entities.iter().cloned())
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.kinds.contains(entity)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().map(String::as_str)
    }
}
