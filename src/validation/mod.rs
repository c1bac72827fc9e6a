pub mod module_validator;
pub mod version_validator;

pub use module_validator::ModuleValidator;
pub use version_validator::{VersionValidationResult, VersionValidator};
