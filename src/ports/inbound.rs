//! Inbound port. UI (adapter) calls into the application.

use crate::domain::DomainError;

/// Input port: console/chat front end drives the use cases until the user quits.
#[async_trait::async_trait]
pub trait InputPort: Send + Sync {
    async fn run(&self) -> Result<(), DomainError>;
}
