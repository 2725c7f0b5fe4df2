//! Service boundary: component traits and the in-memory backend.

pub mod memory;
mod traits;

pub use memory::InMemorySenzing;
pub use traits::{
    Reinitialize, SzAbstractFactory, SzConfig, SzConfigManager, SzDiagnostic, SzEngine, SzProduct,
};
