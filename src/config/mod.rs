//! Configuration loading and validation.
//!
//! Defines the [`ConfigSource`] trait for config backends. Submodules
//! provide the data model, validation logic, and the file-backed source.
//! Targets are fixed once the proxy starts; there is no reload.

pub mod model;
pub mod sources;
pub mod validation;

use async_trait::async_trait;

use crate::error::RelaycastError;
use model::Config;

// async_trait is required here because ConfigSource is used as Box<dyn ConfigSource>
// and native async fn in traits does not support dyn dispatch.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn load(&self) -> Result<Config, RelaycastError>;
}
