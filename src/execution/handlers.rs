//! Built-in Step Handlers
//!
//! One logging handler per step kind. With simulated latency each handler
//! sleeps for the nominal duration of the work it stands in for.

use std::time::Duration;

use async_trait::async_trait;
use log::info;

use crate::config::Latency;
use crate::error::FlowResult;
use crate::workflow::StepKind;

use super::step::{StepContext, StepHandler};

/// Nominal duration of the work behind a step kind.
pub fn nominal_duration(kind: StepKind) -> Duration {
    let millis = match kind {
        StepKind::UserRegistration => 1000,
        StepKind::SendEmail => 500,
        StepKind::DataForm => 300,
        StepKind::EmailConfirmation => 200,
        StepKind::DocumentUpload => 1500,
        StepKind::ThirdPartyLookup => 800,
        StepKind::ExternalService => 2000,
    };
    Duration::from_millis(millis)
}

fn action(kind: StepKind) -> (&'static str, &'static str) {
    match kind {
        StepKind::UserRegistration => ("Registering user", "User registered"),
        StepKind::SendEmail => ("Sending email", "Email sent"),
        StepKind::DataForm => ("Processing data form", "Data form processed"),
        StepKind::EmailConfirmation => ("Confirming email", "Email confirmed"),
        StepKind::DocumentUpload => ("Uploading document", "Document uploaded"),
        StepKind::ThirdPartyLookup => ("Querying third-party service", "Third-party lookup done"),
        StepKind::ExternalService => ("Calling external service", "External service responded"),
    }
}

/// Logs the step's values and optionally simulates its latency.
#[derive(Debug, Clone)]
pub struct SimulatedHandler {
    kind: StepKind,
    delay: Option<Duration>,
}

impl SimulatedHandler {
    pub fn new(kind: StepKind, latency: Latency) -> Self {
        let delay = match latency {
            Latency::Simulated => Some(nominal_duration(kind)),
            Latency::None => None,
        };
        Self { kind, delay }
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }
}

#[async_trait]
impl StepHandler for SimulatedHandler {
    async fn execute(&self, ctx: &StepContext) -> FlowResult<()> {
        let (started, finished) = action(self.kind);
        info!("{} (step {}): {}", started, ctx.step_id, ctx.describe_values());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        info!("{} (step {})", finished, ctx.step_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Instant;

    fn ctx(kind: StepKind) -> StepContext {
        StepContext {
            step_id: 1,
            kind,
            values: HashMap::from([(1, "Ana".to_string())]),
        }
    }

    #[test]
    fn test_nominal_durations() {
        assert_eq!(nominal_duration(StepKind::UserRegistration), Duration::from_millis(1000));
        assert_eq!(nominal_duration(StepKind::EmailConfirmation), Duration::from_millis(200));
        assert_eq!(nominal_duration(StepKind::ExternalService), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_handler_without_latency_returns_immediately() {
        let handler = SimulatedHandler::new(StepKind::ExternalService, Latency::None);
        let start = Instant::now();
        handler.execute(&ctx(StepKind::ExternalService)).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert_eq!(handler.kind(), StepKind::ExternalService);
    }

    #[tokio::test]
    async fn test_handler_simulates_latency() {
        let handler = SimulatedHandler::new(StepKind::DataForm, Latency::Simulated);
        let start = Instant::now();
        handler.execute(&ctx(StepKind::DataForm)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
