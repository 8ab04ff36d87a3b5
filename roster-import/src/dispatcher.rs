use std::sync::Arc;

use async_trait::async_trait;
use roster_proto::usermgmt::v2::withus_student_service_client::WithusStudentServiceClient;
use tonic::Status;
use tracing::debug;

use crate::error::DispatchError;
use crate::payload::ImportRequest;
use crate::propagator::AuthenticatedChannel;

/// The downstream import endpoint, one unary call per payload.
#[async_trait]
pub trait ImportService: Send + Sync {
    async fn import(&self, request: ImportRequest) -> Result<(), Status>;
}

/// `usermgmt.v2.WithusStudentService/ImportWithusManagaraBaseCSV` over an intercepted channel.
#[derive(Clone)]
pub struct GrpcImportService {
    client: WithusStudentServiceClient<AuthenticatedChannel>,
}

impl GrpcImportService {
    pub fn new(channel: AuthenticatedChannel) -> Self {
        Self {
            client: WithusStudentServiceClient::new(channel),
        }
    }
}

#[async_trait]
impl ImportService for GrpcImportService {
    async fn import(&self, request: ImportRequest) -> Result<(), Status> {
        let mut client = self.client.clone();
        client.import_withus_managara_base_csv(request).await?;
        Ok(())
    }
}

/// Acknowledged import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub payload_bytes: usize,
}

pub struct ImportDispatcher {
    service: Arc<dyn ImportService>,
}

impl ImportDispatcher {
    pub fn new(service: Arc<dyn ImportService>) -> Self {
        Self { service }
    }

    /// Exactly one attempt. The caller decides what a failure means for the tick.
    pub async fn dispatch(&self, request: ImportRequest) -> Result<ImportOutcome, DispatchError> {
        let payload_bytes = request.payload.len();
        debug!(payload_bytes, "dispatching import");

        self.service.import(request).await?;
        Ok(ImportOutcome { payload_bytes })
    }
}
