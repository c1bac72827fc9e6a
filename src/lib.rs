pub mod core;
pub mod orchestration;
pub mod plugins;
pub mod security;
pub mod validation;

pub use core::*;
pub use orchestration::{ReleaseCoordinator, ReleaseFilter, ReleaseReport};
pub use security::{CommandError, CredentialStore, SafeCommandExecutor};
