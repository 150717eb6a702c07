// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! `core_client`: a thin CLI over the core's RPC facade (spec §4.4, §6).

use std::collections::HashMap;

use clap::{Parser, Subcommand};
use grpc_util::Channel;
use http::Uri;
use protos::control_service_client::ControlServiceClient;
use protos::session_service_client::SessionServiceClient;
use protos::version_service_client::VersionServiceClient;
use protos::{
    AbortSessionsRequest, CreateSessionRequest, GetAllSessionsRequest, GetSessionRequest,
    GetVersionRequest, HeartbeatRequest, KillServerRequest, NotifyAllSessionsRequest,
    NotifySessionRequest, SetLogLevelRequest,
};

#[derive(Parser, Debug)]
#[command(name = "core_client", about = "Talk to a running core server")]
struct Cli {
    /// The core server's address, e.g. http://127.0.0.1:50051.
    #[arg(long, default_value = "http://127.0.0.1:50051")]
    address: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a new session and return immediately.
    CreateSession {
        #[arg(long, value_parser = parse_key_val)]
        config: Vec<(String, String)>,
        #[arg(long)]
        client_id: Option<String>,
    },
    GetSession {
        session_id: String,
    },
    GetAllSessions,
    NotifySession {
        #[arg(long = "session-id")]
        session_ids: Vec<String>,
        notification: String,
    },
    NotifyAllSessions {
        notification: String,
    },
    AbortSessions {
        #[arg(long = "session-id")]
        session_ids: Vec<String>,
    },
    KillServer {
        #[arg(long)]
        client_id: Option<String>,
    },
    Heartbeat {
        client_id: String,
    },
    SetLogLevel {
        level: String,
    },
    GetVersion,
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {raw}"))?;
    Ok((key.to_owned(), value.to_owned()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let uri: Uri = cli.address.parse()?;
    let channel = Channel::new(None, uri).await?;

    match cli.command {
        Command::CreateSession { config, client_id } => {
            let mut client = SessionServiceClient::new(channel);
            let response = client
                .create_session(CreateSessionRequest {
                    config: config.into_iter().collect::<HashMap<_, _>>(),
                    client_id: client_id.unwrap_or_default(),
                })
                .await?;
            println!("{:#?}", response.into_inner());
        }
        Command::GetSession { session_id } => {
            let mut client = SessionServiceClient::new(channel);
            let response = client
                .get_session(GetSessionRequest {
                    session_id,
                    field_mask: None,
                })
                .await?;
            println!("{:#?}", response.into_inner());
        }
        Command::GetAllSessions => {
            let mut client = SessionServiceClient::new(channel);
            let response = client
                .get_all_sessions(GetAllSessionsRequest {
                    field_mask: None,
                    filter: None,
                })
                .await?;
            println!("{:#?}", response.into_inner());
        }
        Command::NotifySession {
            session_ids,
            notification,
        } => {
            let mut client = SessionServiceClient::new(channel);
            let response = client
                .notify_session(NotifySessionRequest {
                    session_ids,
                    notification,
                })
                .await?;
            println!("{:#?}", response.into_inner());
        }
        Command::NotifyAllSessions { notification } => {
            let mut client = SessionServiceClient::new(channel);
            let response = client
                .notify_all_sessions(NotifyAllSessionsRequest { notification })
                .await?;
            println!("{:#?}", response.into_inner());
        }
        Command::AbortSessions { session_ids } => {
            let mut client = SessionServiceClient::new(channel);
            let response = client
                .abort_sessions(AbortSessionsRequest { session_ids })
                .await?;
            println!("{:#?}", response.into_inner());
        }
        Command::KillServer { client_id } => {
            let mut client = ControlServiceClient::new(channel);
            let response = client.kill_server(KillServerRequest { client_id }).await?;
            println!("{:#?}", response.into_inner());
        }
        Command::Heartbeat { client_id } => {
            let mut client = ControlServiceClient::new(channel);
            client.heartbeat(HeartbeatRequest { client_id }).await?;
            println!("ok");
        }
        Command::SetLogLevel { level } => {
            let mut client = ControlServiceClient::new(channel);
            client.set_log_level(SetLogLevelRequest { level }).await?;
            println!("ok");
        }
        Command::GetVersion => {
            let mut client = VersionServiceClient::new(channel);
            let response = client.get_version(GetVersionRequest {}).await?;
            println!("{}", response.into_inner().version);
        }
    }

    Ok(())
}
