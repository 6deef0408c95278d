use aws_sdk_rds::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use snapshot_migration_core::contract::{ErrorKind, MigrationError};

/// Maps an AWS error code onto the migration error taxonomy. RDS cluster
/// codes carry a `Fault` suffix that instance codes lack, so it is ignored.
pub fn error_kind_for_code(code: &str) -> ErrorKind {
    let code = code.strip_suffix("Fault").unwrap_or(code);
    match code {
        "DBSnapshotAlreadyExists" | "DBClusterSnapshotAlreadyExists" | "AlreadyExistsException" => {
            ErrorKind::AlreadyExists
        }
        "DBSnapshotNotFound" | "DBClusterSnapshotNotFound" | "NotFoundException" => {
            ErrorKind::NotFound
        }
        "InvalidDBSnapshotState" | "InvalidDBClusterSnapshotState" => ErrorKind::InvalidState,
        "SnapshotQuotaExceeded" | "LimitExceededException" => ErrorKind::QuotaExceeded,
        "KMSKeyNotAccessible"
        | "AccessDeniedException"
        | "DisabledException"
        | "KMSInvalidStateException" => ErrorKind::KeyInaccessible,
        "Throttling"
        | "ThrottlingException"
        | "RequestLimitExceeded"
        | "ServiceUnavailable"
        | "InternalFailure"
        | "KMSInternalException"
        | "DependencyTimeoutException" => ErrorKind::Transient,
        _ => ErrorKind::Unknown,
    }
}

/// Classifies any SDK failure. Transport failures without a service code
/// (timeouts, dispatch errors, unparseable responses) count as transient.
pub fn classify_sdk_error<E, R>(operation: &str, error: &SdkError<E, R>) -> MigrationError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let kind = match error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ErrorKind::Transient
        }
        _ => error.code().map(error_kind_for_code).unwrap_or(ErrorKind::Unknown),
    };
    MigrationError::new(
        kind,
        format!("{operation} failed: {}", DisplayErrorContext(error)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_and_cluster_codes_share_a_kind() {
        assert_eq!(
            error_kind_for_code("DBSnapshotAlreadyExists"),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            error_kind_for_code("DBClusterSnapshotAlreadyExistsFault"),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            error_kind_for_code("InvalidDBClusterSnapshotStateFault"),
            ErrorKind::InvalidState
        );
        assert_eq!(error_kind_for_code("DBSnapshotNotFound"), ErrorKind::NotFound);
    }

    #[test]
    fn quota_key_and_throttling_codes() {
        assert_eq!(
            error_kind_for_code("SnapshotQuotaExceeded"),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            error_kind_for_code("KMSKeyNotAccessibleFault"),
            ErrorKind::KeyInaccessible
        );
        assert_eq!(error_kind_for_code("Throttling"), ErrorKind::Transient);
        assert!(error_kind_for_code("ThrottlingException").is_retryable());
    }

    #[test]
    fn unrecognized_codes_are_unknown() {
        assert_eq!(
            error_kind_for_code("CustomAvailabilityZoneNotFound"),
            ErrorKind::Unknown
        );
        assert_eq!(error_kind_for_code(""), ErrorKind::Unknown);
    }
}
