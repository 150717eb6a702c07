// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! `VersionService` (spec §4.4 "`GetVersion` returning a string `LAB_VERSION = …`").

use tonic::{Request, Response, Status};

use protos::version_service_server::VersionService;
use protos::{GetVersionRequest, GetVersionResponse};

#[derive(Default)]
pub struct VersionServiceImpl;

#[tonic::async_trait]
impl VersionService for VersionServiceImpl {
    async fn get_version(
        &self,
        _request: Request<GetVersionRequest>,
    ) -> Result<Response<GetVersionResponse>, Status> {
        Ok(Response::new(GetVersionResponse {
            version: format!("LAB_VERSION = {}", env!("CARGO_PKG_VERSION")),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_the_crate_version() {
        let service = VersionServiceImpl;
        let response = service
            .get_version(Request::new(GetVersionRequest {}))
            .await
            .unwrap();
        assert!(response.into_inner().version.starts_with("LAB_VERSION = "));
    }
}
