mod config;
mod coordinator;
mod steps;
mod store;

pub use config::SagaConfig;
pub use coordinator::{
    CompensationFailure, SagaContext, SagaCoordinator, SagaError, SagaOutcome, SagaStep,
    StepError, StepOutcome,
};
pub use steps::{CREATE_POST_STEP, CREATE_USER_STEP, CreatePostStep, CreateUserStep, user_post_steps};
pub use store::{SagaStore, SqliteSagaStore, StoreError};
