//! Flowgate - Data-Gated Workflow Engine
//!
//! Advances workflow instances sequence by sequence. A sequence runs only
//! once every field its steps require has a value; until then the engine
//! reports exactly which fields are missing and waits for the caller to
//! submit them.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`workflow`]: Catalog definitions, YAML parsing, validation, instance state
//! - [`store`]: Persistence contracts and the in-memory implementation
//! - [`execution`]: Preparation, step dispatch, resolution, and orchestration
//! - [`config`]: Paths and engine options
//! - [`error`]: Error kinds shared by every layer
//!
//! # Example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use flowgate::{load_catalog, FlowEngine, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load flow definitions from YAML
//!     let catalog = load_catalog("demos/onboarding.yaml")?;
//!
//!     // Create the engine over an in-memory store
//!     let engine = FlowEngine::with_builtin_handlers(Arc::new(MemoryStore::new(catalog)));
//!
//!     // Start a flow, then answer what it asks for
//!     let outcome = engine.start(1).await;
//!     for field in &outcome.required_fields {
//!         println!("{}: {}", field.id, field.message);
//!     }
//!
//!     let answers = HashMap::from([(1, "Ana Diaz".to_string())]);
//!     let outcome = engine.process(outcome.instance_id, answers).await;
//!     println!("{}", outcome.message);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod store;
pub mod workflow;

// Re-export commonly used types
pub use error::{FlowError, FlowResult};
pub use execution::{FlowEngine, HandlerRegistry, Outcome};
pub use store::{FlowStore, MemoryStore};
pub use workflow::model::{Catalog, StepKind};
pub use workflow::parser::load_catalog;
pub use workflow::state::{FlowInstance, FlowStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Flowgate";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "Flowgate");
    }

    #[test]
    fn test_module_exports_catalog() {
        let catalog = Catalog::new();
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_module_exports_status() {
        assert!(FlowStatus::Completed.is_terminal());
        assert_eq!(StepKind::ALL.len(), 7);
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
