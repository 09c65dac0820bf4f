pub mod browser;
pub mod core;
pub mod extract;
pub mod fetch;
pub mod pipeline;
pub mod probe;

// --- Primary exports ---
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::Config;
pub use crate::pipeline::ClausePipeline;
pub use crate::probe::EnvironmentSnapshot;
