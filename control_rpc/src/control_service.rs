// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The `ControlService` RPC facade (spec §4.4): kill-server, get-log, set-log-level, heartbeat.

use std::sync::Arc;

use async_latch::AsyncLatch;
use session_manager::{FieldMask, SessionFilter, SessionManager, SessionStatus};
use tokio::sync::mpsc;
use tonic::{Request, Response, Status};

use crate::alive_clients::AliveClients;
use crate::log_tap::{filter_batch, LogSubscription, StreamFilter};
use protos::control_service_server::ControlService;
use protos::*;

/// Grace period between the soft and forced shutdown of `KillServer` (spec §4.4 "~3 s").
pub const FORCED_SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(3);

pub struct ControlServiceImpl {
    manager: Arc<SessionManager>,
    alive_clients: Arc<AliveClients>,
    shutdown: AsyncLatch,
}

impl ControlServiceImpl {
    pub fn new(manager: Arc<SessionManager>, alive_clients: Arc<AliveClients>, shutdown: AsyncLatch) -> ControlServiceImpl {
        ControlServiceImpl {
            manager,
            alive_clients,
            shutdown,
        }
    }

    /// Unfinished session ids belonging to `client_id` (spec §4.4 "abort every unfinished
    /// session belonging to the caller").
    fn unfinished_session_ids_for(&self, client_id: &str) -> Vec<String> {
        let filter = SessionFilter {
            client_id_include: Some(client_id.to_owned()),
            ..Default::default()
        };
        self.manager
            .get_all_sessions(&FieldMask::everything(), &filter)
            .into_iter()
            .filter(|s| s.status != SessionStatus::Finished)
            .map(|s| s.session_id)
            .collect()
    }
}

#[tonic::async_trait]
impl ControlService for ControlServiceImpl {
    async fn kill_server(
        &self,
        request: Request<KillServerRequest>,
    ) -> Result<Response<KillServerResponse>, Status> {
        let client_id = request.into_inner().client_id;

        if let Some(client_id) = &client_id {
            let ids = self.unfinished_session_ids_for(client_id);
            self.manager.abort_sessions(&ids);
        }

        // Aborting a session only requests cancellation; it stays unfinished (and blocks
        // shutdown) until its driver actually returns and the session reaches FINISHED.
        let unfinished_session_ids: Vec<String> = self
            .manager
            .get_all_sessions(&FieldMask::everything(), &SessionFilter::default())
            .into_iter()
            .filter(|s| s.status != SessionStatus::Finished)
            .map(|s| s.session_id)
            .collect();

        let remaining_clients = match &client_id {
            Some(client_id) => self.alive_clients.remove_and_list_remaining(client_id),
            None => Vec::new(),
        };

        let should_shut_down = unfinished_session_ids.is_empty() && remaining_clients.is_empty();
        if should_shut_down {
            self.shutdown.trigger();
        }

        Ok(Response::new(KillServerResponse {
            shut_down: should_shut_down,
            server_pid: std::process::id() as i32,
            unfinished_session_ids,
            alive_client_ids: remaining_clients,
        }))
    }

    async fn heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        self.alive_clients.heartbeat(&request.into_inner().client_id);
        Ok(Response::new(HeartbeatResponse {}))
    }

    async fn set_log_level(
        &self,
        request: Request<SetLogLevelRequest>,
    ) -> Result<Response<SetLogLevelResponse>, Status> {
        logging::CoreLogger::parse_and_set_level(&request.into_inner().level)
            .map_err(|e| Status::invalid_argument(e))?;
        Ok(Response::new(SetLogLevelResponse {}))
    }

    type GetLogStream = std::pin::Pin<Box<dyn futures::Stream<Item = Result<GetLogResponse, Status>> + Send + 'static>>;

    async fn get_log(
        &self,
        request: Request<tonic::Streaming<GetLogRequest>>,
    ) -> Result<Response<Self::GetLogStream>, Status> {
        let mut inbound = request.into_inner();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscription = LogSubscription::new(tx);
        let filter = Arc::new(StreamFilter::default());

        let outbound = async_stream::stream! {
            let _subscription = subscription;
            loop {
                tokio::select! {
                    record = rx.recv() => {
                        let Some(record) = record else { break };
                        let mut batch = vec![record];
                        while let Ok(more) = rx.try_recv() {
                            batch.push(more);
                        }
                        let current_filter = filter.client_id.lock().clone();
                        let accepted = filter_batch(&batch, current_filter.as_deref());
                        if !accepted.is_empty() {
                            yield Ok(GetLogResponse {
                                records: accepted.into_iter().map(to_proto_log_record).collect(),
                            });
                        }
                    }
                    next = inbound.message() => {
                        match next {
                            Ok(Some(req)) => {
                                if req.enable {
                                    filter.set(req.client_id);
                                    _subscription.enable();
                                } else {
                                    _subscription.disable();
                                }
                            }
                            _ => break,
                        }
                    }
                }
            }
        };

        Ok(Response::new(Box::pin(outbound)))
    }
}

fn to_proto_log_record(record: &logging::LogRecord) -> protos::LogRecord {
    protos::LogRecord {
        level: record.level.to_string(),
        timestamp: Some(prost_types::Timestamp {
            seconds: record.timestamp.timestamp(),
            nanos: record.timestamp.timestamp_subsec_nanos() as i32,
        }),
        message: record.message.clone(),
        importance: format!("{:?}", record.importance),
        client_id: record.client_id.clone(),
        session_id: record.session_id.clone(),
    }
}
