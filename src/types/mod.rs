pub mod api_error;
pub mod circuit_state;
pub mod saga;
pub mod service_instance;
pub mod status;

#[allow(unused_imports)]
pub use api_error::{ApiErrorCode, ApiErrorResponse};
#[allow(unused_imports)]
pub use circuit_state::{CircuitSnapshot, CircuitStatus, ListBreakersResponse};
#[allow(unused_imports)]
pub use saga::{CreateSagaRequest, CreateSagaResponse, GetSagaResponse, SagaRecord, SagaStatus};
#[allow(unused_imports)]
pub use service_instance::{HealthStatus, SelfDescriptor, ServiceInstance};
#[allow(unused_imports)]
pub use status::GatewayStatusResponse;
