//! Error capture at the daemon's fault boundaries.

use relaunch_events::ErrorInfo;
use tracing::warn;

/// Log `err` with its cause chain and turn it into an event-log payload.
pub fn capture_error(context: &str, err: &(dyn std::error::Error + 'static)) -> ErrorInfo {
    let info = ErrorInfo::from_error(err).with_context(context);
    warn!(context, error = %info, "captured daemon error");
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetryError;
    use relaunch_infra::WorkspaceError;

    #[test]
    fn keeps_the_source_chain() {
        let err = RetryError::from(WorkspaceError::LocationUnavailable {
            name: "etl_location".into(),
            reason: "grpc server down".into(),
        });

        let info = capture_error("retrying run", &err);

        assert_eq!(info.context.as_deref(), Some("retrying run"));
        assert!(info.message.starts_with("workspace: "));
        assert_eq!(
            info.causes,
            vec!["code location etl_location is unavailable: grpc server down".to_string()]
        );
    }
}
