//! gRPC transport.
//!
//! [`GrpcAbstractFactory`] implements the service traits against a remote
//! service; [`SzServices`] exposes any implementation of them as a gRPC
//! server. Engine errors cross the wire as a status whose message is the
//! `SENZnnnn|message` form, so both sides agree on error classification.

mod client;
mod server;

use tonic::{Code, Status};

use crate::error::{EngineError, SzError, TransportError};

pub use client::{GrpcAbstractFactory, GrpcConfig, GrpcConfigManager, GrpcDiagnostic, GrpcEngine, GrpcProduct};
pub use server::{serve_incoming, serve_with_shutdown, SzServices};

pub mod proto {
    //! Generated message and service types.
    #![allow(missing_docs, clippy::pedantic)]

    pub mod szconfig {
        tonic::include_proto!("szconfig");
    }
    pub mod szconfigmanager {
        tonic::include_proto!("szconfigmanager");
    }
    pub mod szdiagnostic {
        tonic::include_proto!("szdiagnostic");
    }
    pub mod szengine {
        tonic::include_proto!("szengine");
    }
    pub mod szproduct {
        tonic::include_proto!("szproduct");
    }
}

/// Rebuilds an error from a gRPC status.
///
/// A `SENZnnnn|` prefix in the message always wins; otherwise the status code
/// decides between a connection failure and a generic RPC failure.
#[must_use]
pub fn status_to_error(status: &Status) -> SzError {
    if let Some(engine) = EngineError::parse_wire(status.message()) {
        return engine.into();
    }
    match status.code() {
        Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled => TransportError::ConnectionFailed {
            message: status.message().to_string(),
        }
        .into(),
        code => TransportError::Rpc {
            code: format!("{code:?}"),
            message: status.message().to_string(),
        }
        .into(),
    }
}

/// Encodes an error as a gRPC status.
#[must_use]
pub fn error_to_status(err: &SzError) -> Status {
    match err {
        SzError::Engine(e) => engine_status(e),
        SzError::Validation(v) => engine_status(&EngineError::BadInput {
            message: v.to_string(),
        }),
        SzError::Transport(t) => Status::unavailable(t.to_string()),
        SzError::Internal { message } => Status::internal(message.clone()),
    }
}

fn engine_status(err: &EngineError) -> Status {
    let code = match err {
        EngineError::DuplicateDataSource { .. } => Code::AlreadyExists,
        EngineError::ReplaceConflict { .. } => Code::FailedPrecondition,
        EngineError::UnknownDataSource { .. } | EngineError::NotFound { .. } => Code::NotFound,
        EngineError::BadInput { .. } => Code::InvalidArgument,
        EngineError::Retryable { .. } => Code::Unavailable,
        EngineError::General { .. } => Code::Unknown,
    };
    Status::new(code, err.wire_message())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_survive_the_wire() {
        let original = EngineError::DuplicateDataSource {
            message: "Data source code [TEST] already exists.".to_string(),
        };
        let status = error_to_status(&original.clone().into());
        assert_eq!(status.code(), Code::AlreadyExists);
        assert!(status_to_error(&status).is_duplicate());

        let conflict = error_to_status(
            &EngineError::ReplaceConflict {
                message: "moved".to_string(),
            }
            .into(),
        );
        assert_eq!(conflict.code(), Code::FailedPrecondition);
        assert!(status_to_error(&conflict).is_replace_conflict());
    }

    #[test]
    fn test_unavailable_without_code_is_connection_failure() {
        let err = status_to_error(&Status::unavailable("connection refused"));
        assert!(err.is_transport());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_status_is_rpc_failure() {
        let err = status_to_error(&Status::permission_denied("nope"));
        match err {
            SzError::Transport(TransportError::Rpc { code, message }) => {
                assert_eq!(code, "PermissionDenied");
                assert_eq!(message, "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validation_becomes_bad_input() {
        let err: SzError = crate::error::ValidationError::MissingField {
            field: "RECORD_ID".to_string(),
        }
        .into();
        let back = status_to_error(&error_to_status(&err));
        assert!(matches!(back, SzError::Engine(EngineError::BadInput { .. })));
    }
}
