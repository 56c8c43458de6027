//! Module manifests: namespaces defined in a YAML or JSON file.
//!
//! ```yaml
//! WideDiag:
//!   base: rusty_spoc.reducers.basic.Diag
//!   defaults:
//!     num_values: 5
//! ```
//!
//! Every entry derives a new class from an existing one, replacing some of
//! its declared defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::component::ParamValue;
use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    /// `module_reference.ClassName` of the class being derived from.
    pub base: String,
    #[serde(default)]
    pub defaults: BTreeMap<String, ParamValue>,
}

impl ManifestEntry {
    /// Split `base` into its module reference and class name.
    pub fn split_base(&self) -> Option<(&str, &str)> {
        self.base
            .rsplit_once('.')
            .filter(|(module, class)| !module.is_empty() && !class.is_empty())
    }
}

pub type Manifest = BTreeMap<String, ManifestEntry>;

/// Read and parse a manifest. JSON files go through the YAML parser too.
pub fn load_manifest(path: &Path) -> ConfigResult<Manifest> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::ModuleLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_manifest(&text).map_err(|e| ConfigError::ModuleLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

pub fn parse_manifest(text: &str) -> Result<Manifest, serde_yaml::Error> {
    if text.trim().is_empty() {
        return Ok(Manifest::new());
    }
    serde_yaml::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_and_json_manifests() {
        let yaml = "WideDiag:\n  base: rusty_spoc.reducers.basic.Diag\n  \
                    defaults:\n    num_values: 5\n";
        let manifest = parse_manifest(yaml).unwrap();
        let entry = &manifest["WideDiag"];
        assert_eq!(entry.split_base(), Some(("rusty_spoc.reducers.basic", "Diag")));
        assert_eq!(entry.defaults["num_values"], ParamValue::Integer(5));

        let json = r#"{"Cov": {"base": "rusty_spoc.statistics.basic.Covariance"}}"#;
        let manifest = parse_manifest(json).unwrap();
        assert!(manifest["Cov"].defaults.is_empty());
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(parse_manifest("X:\n  base: a.B\n  extra: 1\n").is_err());
        let entry = ManifestEntry {
            base: "NoModule".to_string(),
            defaults: BTreeMap::new(),
        };
        assert_eq!(entry.split_base(), None);
    }
}
