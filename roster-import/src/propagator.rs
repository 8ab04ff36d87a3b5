use thiserror::Error;
use tonic::codegen::InterceptedService;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::Interceptor;
use tonic::transport::Channel;
use tonic::{Request, Status};

use crate::credentials::CredentialStore;

pub const PKG_KEY: &str = "pkg";
pub const VERSION_KEY: &str = "version";
pub const TOKEN_KEY: &str = "token";

/// A channel whose every call goes through a [`TokenInterceptor`].
pub type AuthenticatedChannel = InterceptedService<Channel, TokenInterceptor>;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("{key} is not valid gRPC metadata")]
pub struct InvalidClientIdentity {
    pub key: &'static str,
}

/// Stamps outbound gRPC calls with the fixed client identity and the service token
/// that is live in the [`CredentialStore`] at the moment of the call.
///
/// Built once and cloned into every client; clones share the store, so publishing a new
/// token is picked up by the next call on any client.
#[derive(Clone)]
pub struct TokenInterceptor {
    store: CredentialStore,
    pkg: MetadataValue<Ascii>,
    version: MetadataValue<Ascii>,
}

impl TokenInterceptor {
    pub fn new(
        store: CredentialStore,
        pkg: &str,
        version: &str,
    ) -> Result<Self, InvalidClientIdentity> {
        let pkg: MetadataValue<Ascii> = pkg
            .parse()
            .map_err(|_| InvalidClientIdentity { key: PKG_KEY })?;
        let version: MetadataValue<Ascii> = version
            .parse()
            .map_err(|_| InvalidClientIdentity { key: VERSION_KEY })?;
        Ok(Self {
            store,
            pkg,
            version,
        })
    }

    pub fn wrap(&self, channel: Channel) -> AuthenticatedChannel {
        InterceptedService::new(channel, self.clone())
    }
}

impl Interceptor for TokenInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let metadata = request.metadata_mut();
        metadata.insert(PKG_KEY, self.pkg.clone());
        metadata.insert(VERSION_KEY, self.version.clone());

        // Nothing to attach before the first exchange has completed.
        if let Some(token) = self.store.current() {
            let value: MetadataValue<Ascii> = token
                .as_str()
                .parse()
                .map_err(|_| Status::unauthenticated("service token is not valid metadata"))?;
            metadata.insert(TOKEN_KEY, value);
        }

        Ok(request)
    }
}
