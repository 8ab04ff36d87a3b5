use std::sync::Arc;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as AwsS3SdkClient;
use common_s3::{S3Client, S3Impl};
use eyre::{Result, WrapErr};
use health::{HealthHandle, HealthRegistry};
use tonic::transport::{Channel, Endpoint};
use tracing::info;

use crate::broker::{CredentialBroker, GrpcTokenExchanger};
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::dispatcher::{GrpcImportService, ImportDispatcher};
use crate::fetcher::{ObjectFetcher, SystemClock};
use crate::http::ServerState;
use crate::pipeline::Pipeline;
use crate::propagator::TokenInterceptor;
use crate::scheduler::PipelineScheduler;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Wires the pipeline and its status endpoints together from configuration.
pub struct AppContext {
    pub pipeline: Arc<Pipeline>,
    pub store: CredentialStore,
    pub liveness: HealthRegistry,
    pub scheduler_liveness: HealthHandle,
    pub tick_interval: Duration,
    pub run_on_start: bool,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self> {
        let store = CredentialStore::new();
        let interceptor =
            TokenInterceptor::new(store.clone(), &config.client_pkg, &config.client_version)?;

        let user_modifier = lazy_channel(&config.user_modifier_url, config.request_timeout())?;
        let import_service = lazy_channel(&config.import_service_url, config.request_timeout())?;

        let broker = CredentialBroker::new(
            &config.identity_url,
            &config.identity_api_key,
            config.request_timeout(),
            Arc::new(GrpcTokenExchanger::new(interceptor.wrap(user_modifier))),
        )?;

        let fetcher = ObjectFetcher::new(
            s3_client(config).await,
            config.s3_bucket.clone(),
            config.object_naming(),
            Arc::new(SystemClock::new(config.time_zone())),
        );

        let dispatcher =
            ImportDispatcher::new(Arc::new(GrpcImportService::new(interceptor.wrap(import_service))));

        let pipeline = Pipeline::new(
            config.organization,
            config.tenant_credential(),
            broker,
            store.clone(),
            fetcher,
            dispatcher,
        )
        .with_token_max_age(config.token_max_age())
        .with_tick_timeout(config.tick_timeout());

        // A tick may legitimately run for its whole timeout before the loop reports again.
        let liveness = HealthRegistry::new("liveness");
        let scheduler_liveness = liveness
            .register(
                "scheduler".to_string(),
                config.tick_interval().max(config.tick_timeout()) * 4,
            )
            .await;

        info!(
            organization = %config.organization,
            bucket = %config.s3_bucket,
            user_modifier_url = %config.user_modifier_url,
            import_service_url = %config.import_service_url,
            "roster import configured"
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            store,
            liveness,
            scheduler_liveness,
            tick_interval: config.tick_interval(),
            run_on_start: config.run_on_start,
        })
    }

    pub fn scheduler(&self) -> PipelineScheduler {
        PipelineScheduler::new(
            self.pipeline.clone(),
            self.tick_interval,
            self.run_on_start,
            self.scheduler_liveness.clone(),
        )
    }

    pub fn server_state(&self) -> ServerState {
        ServerState {
            liveness: self.liveness.clone(),
            store: self.store.clone(),
        }
    }
}

fn lazy_channel(url: &str, timeout: Duration) -> Result<Channel> {
    let channel = Endpoint::from_shared(url.to_owned())
        .wrap_err_with(|| format!("invalid gRPC url {url}"))?
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .connect_lazy();
    Ok(channel)
}

async fn s3_client(config: &Config) -> Arc<dyn S3Client> {
    let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(config.s3_region.clone()));

    if let Some(endpoint) = &config.s3_endpoint {
        aws_config_builder = aws_config_builder.endpoint_url(endpoint);
    }

    let aws_config = aws_config_builder.load().await;

    let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);
    if config.s3_endpoint.is_some() {
        s3_config_builder = s3_config_builder.force_path_style(true);
    }

    Arc::new(S3Impl::new(AwsS3SdkClient::from_conf(
        s3_config_builder.build(),
    )))
}
