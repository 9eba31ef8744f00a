//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
source:
  url: https://source.supabase.co
  key: src
destination:
  url: https://dest.supabase.co
  key: dst
"#;

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.source.schema, "public");
        assert_eq!(config.clone.page_size, 50);
        assert_eq!(config.clone.chunk_size, 20);
        assert_eq!(config.clone.max_attempts, 5);
        assert_eq!(config.clone.retry_delay_ms, 2000);
        assert_eq!(config.schema.sample_size, 10);
        assert_eq!(config.entities.tables_file, Path::new("supabase_tables.txt"));
        assert_eq!(config.logging.dir, Path::new("logs"));
        assert!(!config.clone.require_clean_destination);
    }

    #[test]
    fn test_overrides_and_manual_schemas() {
        let yaml = format!(
            "{}{}",
            MINIMAL,
            r#"
schema:
  overrides:
    inventory_stock:
      stock: float8
  manual:
    block_change_pending:
      - { name: reference, type: uuid }
      - { name: status, type: text }
clone:
  page_size: 100
  conflict_keys:
    orders: ref
"#
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.schema.overrides["inventory_stock"]["stock"], "float8");
        let manual = &config.schema.manual["block_change_pending"];
        assert_eq!(manual.len(), 2);
        assert_eq!(manual[0].r#type, "uuid");
        assert_eq!(config.clone.page_size, 100);
        assert_eq!(config.clone.conflict_keys["orders"], "ref");
    }

    #[test]
    fn test_infinite_backoff_rejected() {
        let yaml = format!("{}clone:\n  backoff_factor: .inf\n", MINIMAL);
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("backoff_factor"));
    }

    #[test]
    fn test_invalid_yaml_rejected() {
        assert!(Config::from_yaml("source: [").is_err());
    }
}
