// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The error taxonomy of spec §7, and its mapping onto gRPC status codes (spec §7
//! "Propagation policy").

use std::fmt;

/// The closed set of error kinds a caller of the core may observe.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    NotFound,
    Duplicated,
    ConfigParseError,
    InvalidArgument,
    ResolveTimeout,
    ResolveFileError,
    PublishError,
    MultipleMatches,
    Internal,
}

/// An error carrying both a `kind` (used for RPC status mapping and caller-visible behavior) and
/// a human-readable message.
#[derive(Clone, Debug)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> CoreError {
        CoreError {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> CoreError {
        CoreError::new(ErrorKind::NotFound, message)
    }

    pub fn duplicated(message: impl Into<String>) -> CoreError {
        CoreError::new(ErrorKind::Duplicated, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> CoreError {
        CoreError::new(ErrorKind::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> CoreError {
        CoreError::new(ErrorKind::Internal, message)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CoreError {}

impl From<CoreError> for tonic::Status {
    fn from(error: CoreError) -> tonic::Status {
        // Spec's propagation policy collapses everything but these two kinds to INTERNAL; callers
        // distinguish error causes via `message`, not status code.
        let code = match error.kind {
            ErrorKind::InvalidArgument => tonic::Code::InvalidArgument,
            ErrorKind::NotFound => tonic::Code::NotFound,
            ErrorKind::Duplicated
            | ErrorKind::ConfigParseError
            | ErrorKind::ResolveTimeout
            | ErrorKind::ResolveFileError
            | ErrorKind::PublishError
            | ErrorKind::MultipleMatches
            | ErrorKind::Internal => tonic::Code::Internal,
        };
        tonic::Status::new(code, error.message)
    }
}
