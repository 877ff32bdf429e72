//! Prefixes for inlined definitions and artifact-wide name bookkeeping.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::WeaveError;

/// How a fragment's module name becomes the prefix of its definitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceStrategy {
    /// Last module path component: `library.common.utils` → `utils`
    #[default]
    Stem,
    /// Every module path component: `library.common.utils` → `library_common_utils`
    Qualified,
}

impl NamespaceStrategy {
    /// Prefix for definitions of `module_name`.
    #[must_use]
    pub fn prefix(self, module_name: &str) -> String {
        match self {
            Self::Stem => module_name.rsplit('.').next().unwrap_or(module_name).to_string(),
            Self::Qualified => module_name.replace('.', "_"),
        }
    }

    /// Final name of `symbol` defined in `module_name`.
    #[must_use]
    pub fn prefixed(self, module_name: &str, symbol: &str) -> String {
        format!("{}_{symbol}", self.prefix(module_name))
    }
}

/// Every top-level name of an artifact and who introduced it.
///
/// A name may be registered again by the same owner (a fragment reassigning its own
/// constant, two fragments hoisting the same import) but never by a different one.
#[derive(Debug, Default)]
pub struct NameRegistry {
    owners: HashMap<String, String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name` for `owner`.
    ///
    /// Fails with [`WeaveError::SymbolCollision`] naming both owners when another owner
    /// already holds it.
    pub fn register(&mut self, name: &str, owner: &str) -> Result<()> {
        match self.owners.get(name) {
            Some(existing) if existing != owner => Err(WeaveError::SymbolCollision {
                name: name.to_string(),
                first: existing.clone(),
                second: owner.to_string(),
            }
            .into()),
            Some(_) => Ok(()),
            None => {
                self.owners.insert(name.to_string(), owner.to_string());
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.owners.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(NamespaceStrategy::Stem.prefixed("library.common.utils", "doit"), "utils_doit");
        assert_eq!(
            NamespaceStrategy::Qualified.prefixed("library.common.utils", "doit"),
            "library_common_utils_doit"
        );
        assert_eq!(NamespaceStrategy::Stem.prefix("calc"), "calc");
    }

    #[test]
    fn test_registry_collision_names_both_owners() {
        let mut registry = NameRegistry::new();
        registry.register("utils_doit", "a/utils.py").unwrap();
        registry.register("utils_doit", "a/utils.py").unwrap();
        let err = registry.register("utils_doit", "b/utils.py").unwrap_err();
        match err.downcast_ref::<WeaveError>() {
            Some(WeaveError::SymbolCollision {
                name,
                first,
                second,
            }) => {
                assert_eq!(name, "utils_doit");
                assert_eq!(first, "a/utils.py");
                assert_eq!(second, "b/utils.py");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(registry.len(), 1);
    }
}
