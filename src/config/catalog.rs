use super::traits::{invalid, ConfigSection};
use crate::error::AutopipeError;
use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Overrides applied when the typed catalog is built
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Only these components, when set
    pub components: Option<Vec<String>>,
    pub exclude: Vec<String>,
    /// Replacement domains keyed `Owner.param`
    pub params: BTreeMap<String, Vec<Value>>,
}

impl ConfigSection for CatalogConfig {
    fn section_name() -> &'static str {
        "catalog"
    }

    // Names are checked against the registry when the catalog is built.
    fn validate(&self) -> Result<(), AutopipeError> {
        if self.components.as_ref().is_some_and(|c| c.is_empty()) {
            return Err(invalid(Self::section_name(), "components whitelist is empty"));
        }
        if let Some((key, _)) = self.params.iter().find(|(_, values)| values.is_empty()) {
            return Err(invalid(Self::section_name(), format!("'{}' has an empty domain", key)));
        }
        if let Some((key, _)) = self.params.iter().find(|(_, values)| has_repeated_value(values)) {
            return Err(invalid(
                Self::section_name(),
                format!("'{}' lists the same value more than once", key),
            ));
        }
        Ok(())
    }
}

/// True if some value appears twice in a domain
pub fn has_repeated_value(values: &[Value]) -> bool {
    values
        .iter()
        .enumerate()
        .any(|(i, value)| values[..i].contains(value))
}
