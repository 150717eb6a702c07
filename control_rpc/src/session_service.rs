// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The `SessionService` RPC facade (spec §4.3, §6): a thin adapter from tonic request/response
//! primitives onto `session_manager::SessionManager`.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use grpc_util::core_error::CoreError;
use session_manager::{SessionManager, SessionManagerError};
use tonic::{Request, Response, Status};

use crate::convert::{config_from_proto, field_mask_from_proto, filter_from_proto, session_to_proto};
use protos::session_service_server::SessionService;
use protos::*;

impl From<SessionManagerError> for CoreError {
    fn from(error: SessionManagerError) -> CoreError {
        match error {
            SessionManagerError::NotFound(id) => CoreError::not_found(format!("no such session: {id}")),
            SessionManagerError::InvalidArgument(msg) => CoreError::invalid_argument(msg),
        }
    }
}

pub struct SessionServiceImpl {
    manager: Arc<SessionManager>,
}

impl SessionServiceImpl {
    pub fn new(manager: Arc<SessionManager>) -> SessionServiceImpl {
        SessionServiceImpl { manager }
    }
}

#[tonic::async_trait]
impl SessionService for SessionServiceImpl {
    async fn create_session(
        &self,
        request: Request<CreateSessionRequest>,
    ) -> Result<Response<CreateSessionResponse>, Status> {
        let req = request.into_inner();
        let client_id = (!req.client_id.is_empty()).then_some(req.client_id);
        let (session, _finished) = self
            .manager
            .add_session(config_from_proto(req.config), client_id);
        Ok(Response::new(CreateSessionResponse {
            session: Some(session_to_proto(&session)),
        }))
    }

    async fn run_session(
        &self,
        request: Request<RunSessionRequest>,
    ) -> Result<Response<RunSessionResponse>, Status> {
        let req = request.into_inner();
        let client_id = (!req.client_id.is_empty()).then_some(req.client_id);
        let (session, mut finished) = self
            .manager
            .add_session(config_from_proto(req.config), client_id);
        let _ = session;

        // Deferred-completion unary call (spec §6 "RunSession (unary with deferred completion)"):
        // block until the session reaches FINISHED before responding.
        loop {
            if let Some(done) = finished.borrow().clone() {
                return Ok(Response::new(RunSessionResponse {
                    session: Some(session_to_proto(&done)),
                }));
            }
            if finished.changed().await.is_err() {
                return Err(Status::internal("session result channel closed unexpectedly"));
            }
        }
    }

    async fn get_session(
        &self,
        request: Request<GetSessionRequest>,
    ) -> Result<Response<GetSessionResponse>, Status> {
        let req = request.into_inner();
        let mask = field_mask_from_proto(req.field_mask);
        let session = self
            .manager
            .get_session(&req.session_id, &mask)
            .map_err(CoreError::from)?;
        Ok(Response::new(GetSessionResponse {
            session: Some(session_to_proto(&session)),
        }))
    }

    async fn get_all_sessions(
        &self,
        request: Request<GetAllSessionsRequest>,
    ) -> Result<Response<GetAllSessionsResponse>, Status> {
        let req = request.into_inner();
        let mask = field_mask_from_proto(req.field_mask);
        let filter = filter_from_proto(req.filter);
        let sessions = self
            .manager
            .get_all_sessions(&mask, &filter)
            .iter()
            .map(session_to_proto)
            .collect();
        Ok(Response::new(GetAllSessionsResponse { sessions }))
    }

    type SubscribeSessionStream =
        Pin<Box<dyn Stream<Item = Result<SubscribeSessionResponse, Status>> + Send + 'static>>;

    async fn subscribe_session(
        &self,
        request: Request<tonic::Streaming<SubscribeSessionRequest>>,
    ) -> Result<Response<Self::SubscribeSessionStream>, Status> {
        let mut inbound = request.into_inner();
        let mut updates = self.manager.subscribe();

        // Seed the selection from the first request the client sends (spec §4.3
        // "client-driven selection of sessions to subscribe to").
        let mut selection = Vec::new();
        let mut mask = session_manager::FieldMask::everything();
        if let Ok(Some(first)) = inbound.message().await {
            selection = first.session_ids;
            mask = field_mask_from_proto(first.field_mask);
        }

        let outbound = async_stream::stream! {
            loop {
                tokio::select! {
                    update = updates.recv() => {
                        match update {
                            Ok(session) => {
                                if selection.is_empty() || selection.contains(&session.session_id) {
                                    yield Ok(SubscribeSessionResponse {
                                        session: Some(session_to_proto(&mask.apply(&session))),
                                    });
                                }
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        }
                    }
                    next = inbound.message() => {
                        match next {
                            Ok(Some(req)) => {
                                selection = req.session_ids;
                                mask = field_mask_from_proto(req.field_mask);
                            }
                            _ => break,
                        }
                    }
                }
            }
        };

        Ok(Response::new(Box::pin(outbound)))
    }

    async fn notify_session(
        &self,
        request: Request<NotifySessionRequest>,
    ) -> Result<Response<NotifySessionResponse>, Status> {
        let req = request.into_inner();
        let delivered = self.manager.notify_sessions(&req.session_ids, &req.notification);
        Ok(Response::new(NotifySessionResponse {
            delivered_session_ids: delivered,
        }))
    }

    async fn notify_all_sessions(
        &self,
        request: Request<NotifyAllSessionsRequest>,
    ) -> Result<Response<NotifyAllSessionsResponse>, Status> {
        let req = request.into_inner();
        let ids: Vec<String> = self
            .manager
            .get_all_sessions(&session_manager::FieldMask::everything(), &session_manager::SessionFilter::default())
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        let delivered = self.manager.notify_sessions(&ids, &req.notification);
        Ok(Response::new(NotifyAllSessionsResponse {
            delivered_session_ids: delivered,
        }))
    }

    async fn abort_sessions(
        &self,
        request: Request<AbortSessionsRequest>,
    ) -> Result<Response<AbortSessionsResponse>, Status> {
        let req = request.into_inner();
        self.manager.abort_sessions(&req.session_ids);
        Ok(Response::new(AbortSessionsResponse {
            aborted_session_ids: req.session_ids,
        }))
    }
}
