//! Calls through the real intercepted channel against an in-process gRPC server,
//! checking the metadata each RPC actually carries on the wire.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use roster_import::broker::{GrpcTokenExchanger, IdentityToken, TokenExchanger};
use roster_import::credentials::{CredentialStore, ServiceToken};
use roster_import::dispatcher::{GrpcImportService, ImportService};
use roster_import::error::AuthError;
use roster_import::payload::ImportRequest;
use roster_import::propagator::{TokenInterceptor, PKG_KEY, TOKEN_KEY, VERSION_KEY};
use roster_proto::bob::v1::user_modifier_service_server::{
    UserModifierService, UserModifierServiceServer,
};
use roster_proto::bob::v1::{ExchangeTokenRequest, ExchangeTokenResponse};
use roster_proto::usermgmt::v2::withus_student_service_server::{
    WithusStudentService, WithusStudentServiceServer,
};
use roster_proto::usermgmt::v2::ImportWithusManagaraBaseCsvResponse;
use tokio::net::TcpListener;
use tonic::transport::{Endpoint, Server};
use tonic::{Request, Response, Status};

const PKG: &str = "com.manabie.liz";
const VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Seen {
    rpc: &'static str,
    pkg: Option<String>,
    version: Option<String>,
    token: Option<String>,
    body: Vec<u8>,
}

/// Stands in for both downstream services, recording every call it receives.
#[derive(Clone, Default)]
struct RecordingServer {
    seen: Arc<Mutex<Vec<Seen>>>,
    issued_token: Arc<Mutex<String>>,
}

impl RecordingServer {
    fn issuing(token: &str) -> Self {
        let server = Self::default();
        server.issue(token);
        server
    }

    fn issue(&self, token: &str) {
        *self.issued_token.lock().unwrap() = token.to_string();
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn record<T>(&self, rpc: &'static str, request: &Request<T>, body: Vec<u8>) {
        let header = |key: &str| {
            request
                .metadata()
                .get(key)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned)
        };
        self.seen.lock().unwrap().push(Seen {
            rpc,
            pkg: header(PKG_KEY),
            version: header(VERSION_KEY),
            token: header(TOKEN_KEY),
            body,
        });
    }
}

#[tonic::async_trait]
impl UserModifierService for RecordingServer {
    async fn exchange_token(
        &self,
        request: Request<ExchangeTokenRequest>,
    ) -> Result<Response<ExchangeTokenResponse>, Status> {
        let identity = request.get_ref().token.clone().into_bytes();
        self.record("exchange_token", &request, identity);
        let token = self.issued_token.lock().unwrap().clone();
        Ok(Response::new(ExchangeTokenResponse { token }))
    }
}

#[tonic::async_trait]
impl WithusStudentService for RecordingServer {
    async fn import_withus_managara_base_csv(
        &self,
        request: Request<ImportRequest>,
    ) -> Result<Response<ImportWithusManagaraBaseCsvResponse>, Status> {
        let payload = request.get_ref().payload.to_vec();
        self.record("import", &request, payload);
        Ok(Response::new(ImportWithusManagaraBaseCsvResponse {}))
    }
}

struct Clients {
    store: CredentialStore,
    exchanger: GrpcTokenExchanger,
    import: GrpcImportService,
}

async fn serve(server: RecordingServer) -> Clients {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(UserModifierServiceServer::new(server.clone()))
            .add_service(WithusStudentServiceServer::new(server))
            .serve_with_incoming(tokio_stream::wrappers::TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    let channel = Endpoint::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .expect("Failed to connect to test server");

    let store = CredentialStore::new();
    let interceptor = TokenInterceptor::new(store.clone(), PKG, VERSION).unwrap();

    Clients {
        store,
        exchanger: GrpcTokenExchanger::new(interceptor.wrap(channel.clone())),
        import: GrpcImportService::new(interceptor.wrap(channel)),
    }
}

fn import_request(payload: &'static [u8]) -> ImportRequest {
    ImportRequest {
        payload: payload.into(),
    }
}

#[tokio::test]
async fn test_both_rpcs_carry_live_token() {
    let server = RecordingServer::issuing("Y");
    let clients = serve(server.clone()).await;

    // Exchange runs before any token is published
    let token = clients
        .exchanger
        .exchange_token(&IdentityToken::new("identity-1"))
        .await
        .unwrap();
    assert_eq!(token, ServiceToken::new("Y"));
    clients.store.publish(token);

    clients
        .import
        .import(import_request(b"student_id\tname\n1\tA\n"))
        .await
        .unwrap();

    clients.store.publish(ServiceToken::new("Z"));
    clients.import.import(import_request(b"x\n")).await.unwrap();
    server.issue("W");
    clients
        .exchanger
        .exchange_token(&IdentityToken::new("identity-2"))
        .await
        .unwrap();

    let seen = server.seen();
    let pkg = Some(PKG.to_string());
    let version = Some(VERSION.to_string());
    assert_eq!(
        seen,
        vec![
            Seen {
                rpc: "exchange_token",
                pkg: pkg.clone(),
                version: version.clone(),
                token: None,
                body: b"identity-1".to_vec(),
            },
            Seen {
                rpc: "import",
                pkg: pkg.clone(),
                version: version.clone(),
                token: Some("Y".to_string()),
                body: b"student_id\tname\n1\tA\n".to_vec(),
            },
            Seen {
                rpc: "import",
                pkg: pkg.clone(),
                version: version.clone(),
                token: Some("Z".to_string()),
                body: b"x\n".to_vec(),
            },
            Seen {
                rpc: "exchange_token",
                pkg,
                version,
                token: Some("Z".to_string()),
                body: b"identity-2".to_vec(),
            },
        ]
    );
}

#[tokio::test]
async fn test_empty_exchanged_token_is_malformed() {
    let server = RecordingServer::issuing("");
    let clients = serve(server.clone()).await;

    let err = clients
        .exchanger
        .exchange_token(&IdentityToken::new("identity-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::MalformedResponse(_)));
    assert!(!clients.store.has_token());
    assert_eq!(server.seen().len(), 1);
}
