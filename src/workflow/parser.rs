//! Catalog Parser
//!
//! Handles loading and saving catalog definitions as YAML. Loaded catalogs
//! are always validated before they are handed to the engine.

use std::error::Error;
use std::fs;

use log::{debug, info};

use super::model::Catalog;
use super::validator::validate_catalog;

/// Loads a catalog from a YAML file.
///
/// This function:
/// 1. Reads and parses the YAML file
/// 2. Normalizes id lists (comma-separated strings become integer lists)
/// 3. Validates referential integrity
///
/// # Example
///
/// ```rust,no_run
/// use flowgate::workflow::load_catalog;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let catalog = load_catalog("demos/onboarding.yaml")?;
///     println!("Loaded {} flow types", catalog.flow_types.len());
///     Ok(())
/// }
/// ```
pub fn load_catalog(path: &str) -> Result<Catalog, Box<dyn Error>> {
    info!("Loading catalog from: {}", path);

    let yaml_content = fs::read_to_string(path).map_err(|e| {
        format!(
            "Failed to read catalog file '{}': {}. Check that the file exists and is readable.",
            path, e
        )
    })?;

    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    parse_catalog(&yaml_content)
}

/// Parses and validates a catalog from YAML text.
pub fn parse_catalog(yaml_content: &str) -> Result<Catalog, Box<dyn Error>> {
    let catalog: Catalog = serde_yaml::from_str(yaml_content)
        .map_err(|e| format!("Failed to parse catalog YAML: {}. Check the file format.", e))?;

    info!(
        "Parsed {} fields, {} steps, {} sequences, {} flow types",
        catalog.fields.len(),
        catalog.steps.len(),
        catalog.sequences.len(),
        catalog.flow_types.len()
    );

    validate_catalog(&catalog)?;

    Ok(catalog)
}

/// Saves a catalog to a YAML file.
pub fn save_catalog(catalog: &Catalog, path: &str) -> Result<(), Box<dyn Error>> {
    let yaml_content = serde_yaml::to_string(catalog)?;
    fs::write(path, yaml_content)?;
    info!("Catalog saved to: {}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::StepKind;
    use tempfile::tempdir;

    const BASIC_YAML: &str = r#"
fields:
  - id: 1
    message: Enter your full name
    client_pattern: "^[a-zA-Z ]{2,50}$"
  - id: 2
    message: Enter your email
    data_type: email
steps:
  - id: 1
    kind: data_form
    fields: "1,2"
  - id: 2
    kind: user_registration
    fields: [1, 2]
sequences:
  - id: 1
    steps: [1]
  - id: 2
    steps: "2"
flow_types:
  - id: 1
    name: Basic
    sequences: [1, 2]
    start_sequence: 1
    end_sequence: 2
"#;

    #[test]
    fn test_parse_valid_catalog() {
        let catalog = parse_catalog(BASIC_YAML).unwrap();

        assert_eq!(catalog.fields.len(), 2);
        assert_eq!(catalog.step(1).unwrap().fields, vec![1, 2]);
        assert_eq!(catalog.step(2).unwrap().kind, StepKind::UserRegistration);
        assert_eq!(catalog.sequence(2).unwrap().steps, vec![2]);
        assert_eq!(catalog.field(2).unwrap().data_type, "email");
    }

    #[test]
    fn test_parse_rejects_broken_references() {
        let yaml = BASIC_YAML.replace("steps: [1]", "steps: [9]");
        let err = parse_catalog(&yaml).unwrap_err();
        assert!(err.to_string().contains("unknown step 9"));
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        let yaml = BASIC_YAML.replace("kind: data_form", "kind: teleport");
        assert!(parse_catalog(&yaml).is_err());
    }

    #[test]
    fn test_load_catalog_file_not_found() {
        let result = load_catalog("/nonexistent/path/catalog.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_catalog_invalid_yaml() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("bad.yaml");
        std::fs::write(&path, "this is not valid yaml: [[[").unwrap();

        assert!(load_catalog(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("catalog.yaml");
        let path = path.to_str().unwrap();

        let catalog = parse_catalog(BASIC_YAML).unwrap();
        save_catalog(&catalog, path).unwrap();

        let reloaded = load_catalog(path).unwrap();
        assert_eq!(reloaded, catalog);
    }

    #[test]
    fn test_demo_catalog_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/onboarding.yaml");
        let catalog = load_catalog(path).unwrap();

        assert_eq!(catalog.flow_types.len(), 2);
        assert_eq!(catalog.fields.len(), 8);
        assert_eq!(catalog.steps.len(), 8);
        assert_eq!(catalog.step_kinds().len(), StepKind::ALL.len());
    }
}
