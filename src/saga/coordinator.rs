use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::dispatcher::DispatchError;
use crate::saga::{SagaStore, StoreError};
use crate::types::SagaStatus;

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Rejected(String),
}

/// One forward action of a saga and the action that semantically undoes it.
#[async_trait]
pub trait SagaStep: Send + Sync {
    fn name(&self) -> &str;

    /// Performs the step and returns the id of the entity it produced.
    async fn execute(&self, ctx: &SagaContext) -> Result<String, StepError>;

    /// Undoes a committed step given the id its `execute` produced.
    async fn compensate(&self, entity_id: &str) -> Result<(), StepError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: String,
    pub entity_id: String,
    pub committed: bool,
}

/// What earlier steps of the running saga produced.
#[derive(Debug, Clone)]
pub struct SagaContext {
    saga_id: Uuid,
    committed: Vec<StepOutcome>,
}

impl SagaContext {
    pub fn new(saga_id: Uuid) -> Self {
        Self {
            saga_id,
            committed: Vec::new(),
        }
    }

    pub fn saga_id(&self) -> Uuid {
        self.saga_id
    }

    pub fn committed(&self) -> &[StepOutcome] {
        &self.committed
    }

    pub fn entity_id(&self, step: &str) -> Option<&str> {
        self.committed
            .iter()
            .find(|outcome| outcome.step == step)
            .map(|outcome| outcome.entity_id.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SagaOutcome {
    pub saga_id: Uuid,
    pub steps: Vec<StepOutcome>,
}

impl SagaOutcome {
    pub fn entity_id(&self, step: &str) -> Option<&str> {
        self.steps
            .iter()
            .find(|outcome| outcome.step == step)
            .map(|outcome| outcome.entity_id.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CompensationFailure {
    pub step: String,
    pub entity_id: String,
    pub error: String,
}

#[derive(Debug, Error)]
pub enum SagaError {
    #[error("failed to record saga start: {0}")]
    Persistence(#[source] StoreError),
    #[error("saga {saga_id} failed at step {step} and was rolled back: {source}")]
    StepFailed {
        saga_id: Uuid,
        step: String,
        #[source]
        source: StepError,
        compensation_failures: Vec<CompensationFailure>,
    },
    #[error("failed to finalize saga {saga_id}: {source}")]
    Finalize {
        saga_id: Uuid,
        #[source]
        source: StoreError,
    },
}

/// Runs ordered steps, compensating committed ones in reverse on failure.
pub struct SagaCoordinator {
    store: Arc<dyn SagaStore>,
}

impl SagaCoordinator {
    pub fn new(store: Arc<dyn SagaStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SagaStore> {
        &self.store
    }

    pub async fn run_saga(&self, steps: &[Arc<dyn SagaStep>]) -> Result<SagaOutcome, SagaError> {
        let saga_id = Uuid::new_v4();
        self.store
            .create(saga_id, SagaStatus::Started)
            .await
            .map_err(SagaError::Persistence)?;
        tracing::info!(%saga_id, steps = steps.len(), "saga started");

        let mut ctx = SagaContext::new(saga_id);

        for step in steps {
            match step.execute(&ctx).await {
                Ok(entity_id) => {
                    tracing::info!(%saga_id, step = step.name(), entity_id = %entity_id, "saga step committed");
                    ctx.committed.push(StepOutcome {
                        step: step.name().to_string(),
                        entity_id,
                        committed: true,
                    });
                }
                Err(source) => {
                    tracing::error!(%saga_id, step = step.name(), error = %source, "saga step failed");
                    let compensation_failures = compensate(steps, &ctx).await;
                    // The triggering step error is what the caller sees; finalize logs its own failure.
                    let _ = self.finalize(saga_id, SagaStatus::Failed).await;
                    return Err(SagaError::StepFailed {
                        saga_id,
                        step: step.name().to_string(),
                        source,
                        compensation_failures,
                    });
                }
            }
        }

        self.finalize(saga_id, SagaStatus::Completed)
            .await
            .map_err(|source| SagaError::Finalize { saga_id, source })?;

        Ok(SagaOutcome {
            saga_id,
            steps: ctx.committed,
        })
    }

    async fn finalize(&self, saga_id: Uuid, status: SagaStatus) -> Result<(), StoreError> {
        match self.store.update(saga_id, status).await {
            Ok(record) => {
                tracing::info!(%saga_id, status = ?record.status, "saga finalized");
                Ok(())
            }
            Err(err) => {
                tracing::error!(%saga_id, status = ?status, error = %err, "failed to finalize saga");
                Err(err)
            }
        }
    }
}

/// Compensates committed steps most-recent first. Each compensation runs once;
/// a failure is logged and the walk continues.
async fn compensate(steps: &[Arc<dyn SagaStep>], ctx: &SagaContext) -> Vec<CompensationFailure> {
    let mut failures = Vec::new();

    // Steps commit strictly in order, so committed[i] belongs to steps[i].
    for (step, outcome) in steps.iter().zip(ctx.committed.iter()).rev() {
        if !outcome.committed {
            continue;
        }
        match step.compensate(&outcome.entity_id).await {
            Ok(()) => {
                tracing::info!(
                    saga_id = %ctx.saga_id,
                    step = %outcome.step,
                    entity_id = %outcome.entity_id,
                    "saga step compensated"
                );
            }
            Err(err) => {
                tracing::error!(
                    saga_id = %ctx.saga_id,
                    step = %outcome.step,
                    entity_id = %outcome.entity_id,
                    error = %err,
                    "saga compensation failed"
                );
                failures.push(CompensationFailure {
                    step: outcome.step.clone(),
                    entity_id: outcome.entity_id.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    failures
}
