// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! A stub core server: answers `SessionService`/`ControlService`/`VersionService` RPCs with
//! pre-canned responses over real HTTP/2, for testing anything that talks to the core over the
//! wire (spec §6) without standing up a whole `core_server` process.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use parking_lot::Mutex;
use protos::control_service_server::{ControlService, ControlServiceServer};
use protos::session_service_server::{SessionService, SessionServiceServer};
use protos::version_service_server::{VersionService, VersionServiceServer};
use protos::*;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

type Canned<T> = Mutex<Option<Result<T, Status>>>;

fn canned<T>() -> Canned<T> {
    Mutex::new(None)
}

fn take<T: Clone>(slot: &Canned<T>, rpc: &str) -> Result<Response<T>, Status> {
    match slot.lock().clone() {
        Some(result) => result.map(Response::new),
        None => Err(Status::unimplemented(format!(
            "no canned response configured for {rpc}"
        ))),
    }
}

/// The queue of responses this stub will return, one slot per unary RPC. Set a slot with
/// `*responses.create_session.lock() = Some(Ok(...))` before the client under test issues the
/// call; an unset slot answers `UNIMPLEMENTED`.
#[derive(Default)]
pub struct CannedResponses {
    pub create_session: Canned<CreateSessionResponse>,
    pub run_session: Canned<RunSessionResponse>,
    pub get_session: Canned<GetSessionResponse>,
    pub get_all_sessions: Canned<GetAllSessionsResponse>,
    pub notify_session: Canned<NotifySessionResponse>,
    pub notify_all_sessions: Canned<NotifyAllSessionsResponse>,
    pub abort_sessions: Canned<AbortSessionsResponse>,
    pub kill_server: Canned<KillServerResponse>,
    pub heartbeat: Canned<HeartbeatResponse>,
    pub set_log_level: Canned<SetLogLevelResponse>,
    pub get_version: Canned<GetVersionResponse>,
    /// Names of the RPCs received, in order, for assertions like
    /// `assert_eq!(received(), vec!["create_session"])`.
    pub received: Mutex<Vec<String>>,
}

impl CannedResponses {
    fn record(&self, rpc: &str) {
        self.received.lock().push(rpc.to_owned());
    }
}

struct Stub(Arc<CannedResponses>);

#[tonic::async_trait]
impl SessionService for Stub {
    async fn create_session(
        &self,
        _request: Request<CreateSessionRequest>,
    ) -> Result<Response<CreateSessionResponse>, Status> {
        self.0.record("create_session");
        take(&self.0.create_session, "create_session")
    }

    async fn run_session(
        &self,
        _request: Request<RunSessionRequest>,
    ) -> Result<Response<RunSessionResponse>, Status> {
        self.0.record("run_session");
        take(&self.0.run_session, "run_session")
    }

    async fn get_session(
        &self,
        _request: Request<GetSessionRequest>,
    ) -> Result<Response<GetSessionResponse>, Status> {
        self.0.record("get_session");
        take(&self.0.get_session, "get_session")
    }

    async fn get_all_sessions(
        &self,
        _request: Request<GetAllSessionsRequest>,
    ) -> Result<Response<GetAllSessionsResponse>, Status> {
        self.0.record("get_all_sessions");
        take(&self.0.get_all_sessions, "get_all_sessions")
    }

    type SubscribeSessionStream =
        Pin<Box<dyn Stream<Item = Result<SubscribeSessionResponse, Status>> + Send + 'static>>;

    async fn subscribe_session(
        &self,
        _request: Request<tonic::Streaming<SubscribeSessionRequest>>,
    ) -> Result<Response<Self::SubscribeSessionStream>, Status> {
        self.0.record("subscribe_session");
        Ok(Response::new(Box::pin(futures::stream::empty())))
    }

    async fn notify_session(
        &self,
        _request: Request<NotifySessionRequest>,
    ) -> Result<Response<NotifySessionResponse>, Status> {
        self.0.record("notify_session");
        take(&self.0.notify_session, "notify_session")
    }

    async fn notify_all_sessions(
        &self,
        _request: Request<NotifyAllSessionsRequest>,
    ) -> Result<Response<NotifyAllSessionsResponse>, Status> {
        self.0.record("notify_all_sessions");
        take(&self.0.notify_all_sessions, "notify_all_sessions")
    }

    async fn abort_sessions(
        &self,
        _request: Request<AbortSessionsRequest>,
    ) -> Result<Response<AbortSessionsResponse>, Status> {
        self.0.record("abort_sessions");
        take(&self.0.abort_sessions, "abort_sessions")
    }
}

#[tonic::async_trait]
impl ControlService for Stub {
    async fn kill_server(
        &self,
        _request: Request<KillServerRequest>,
    ) -> Result<Response<KillServerResponse>, Status> {
        self.0.record("kill_server");
        take(&self.0.kill_server, "kill_server")
    }

    async fn heartbeat(
        &self,
        _request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        self.0.record("heartbeat");
        take(&self.0.heartbeat, "heartbeat")
    }

    async fn set_log_level(
        &self,
        _request: Request<SetLogLevelRequest>,
    ) -> Result<Response<SetLogLevelResponse>, Status> {
        self.0.record("set_log_level");
        take(&self.0.set_log_level, "set_log_level")
    }

    type GetLogStream =
        Pin<Box<dyn Stream<Item = Result<GetLogResponse, Status>> + Send + 'static>>;

    async fn get_log(
        &self,
        _request: Request<tonic::Streaming<GetLogRequest>>,
    ) -> Result<Response<Self::GetLogStream>, Status> {
        self.0.record("get_log");
        Ok(Response::new(Box::pin(futures::stream::empty())))
    }
}

#[tonic::async_trait]
impl VersionService for Stub {
    async fn get_version(
        &self,
        _request: Request<GetVersionRequest>,
    ) -> Result<Response<GetVersionResponse>, Status> {
        self.0.record("get_version");
        take(&self.0.get_version, "get_version")
    }
}

/// A running stub core server bound to a local port. Dropping it stops the server.
pub struct TestServer {
    pub responses: Arc<CannedResponses>,
    local_addr: SocketAddr,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> TestServer {
        let responses = Arc::new(CannedResponses::default());
        let stub = Stub(responses.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind a local port");
        let local_addr = listener.local_addr().expect("bound listener has a local address");
        let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let session_service = SessionServiceServer::new(Stub(responses.clone()));
        let control_service = ControlServiceServer::new(Stub(responses.clone()));
        let version_service = VersionServiceServer::new(stub);

        tokio::spawn(async move {
            Server::builder()
                .add_service(session_service)
                .add_service(control_service)
                .add_service(version_service)
                .serve_with_incoming_shutdown(incoming, async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("stub core server failed");
        });

        TestServer {
            responses,
            local_addr,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn address(&self) -> String {
        format!("http://{}", self.local_addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answers_a_canned_get_version_response() {
        let server = TestServer::start().await;
        *server.responses.get_version.lock() = Some(Ok(GetVersionResponse {
            version: "1.2.3".to_owned(),
        }));

        let channel = grpc_util::Channel::new(None, server.address().parse().unwrap())
            .await
            .unwrap();
        let mut client = protos::version_service_client::VersionServiceClient::new(channel);
        let response = client.get_version(GetVersionRequest {}).await.unwrap();

        assert_eq!(response.into_inner().version, "1.2.3");
        assert_eq!(*server.responses.received.lock(), vec!["get_version".to_owned()]);
    }

    #[tokio::test]
    async fn an_unset_slot_answers_unimplemented() {
        let server = TestServer::start().await;
        let channel = grpc_util::Channel::new(None, server.address().parse().unwrap())
            .await
            .unwrap();
        let mut client = protos::control_service_client::ControlServiceClient::new(channel);

        let err = client
            .heartbeat(HeartbeatRequest {
                client_id: "c1".to_owned(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unimplemented);
    }
}
