pub mod app_context;
pub mod broker;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod metrics_consts;
pub mod object_name;
pub mod payload;
pub mod pipeline;
pub mod propagator;
pub mod scheduler;
pub mod test_utils;
