use crate::core::{ErrorKind, PersistError};

/// Retry decision for one error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub retryable: bool,
}

impl Classification {
    const fn retryable(kind: ErrorKind) -> Self {
        Self {
            kind,
            retryable: true,
        }
    }

    const fn fatal(kind: ErrorKind) -> Self {
        Self {
            kind,
            retryable: false,
        }
    }
}

// Structural and permission failures. Matched before anything transient.
const FATAL_PATTERNS: &[(&str, ErrorKind)] = &[
    ("duplicate key", ErrorKind::ConstraintViolation),
    ("foreign key", ErrorKind::ConstraintViolation),
    ("unique constraint", ErrorKind::ConstraintViolation),
    ("not-null", ErrorKind::ConstraintViolation),
    ("not null", ErrorKind::ConstraintViolation),
    ("violates", ErrorKind::ConstraintViolation),
    ("constraint", ErrorKind::ConstraintViolation),
    ("invalid input syntax", ErrorKind::Validation),
    ("permission denied", ErrorKind::Unknown),
    ("permission", ErrorKind::Unknown),
    ("authentication", ErrorKind::Unknown),
    ("unauthorized", ErrorKind::Unknown),
    ("access denied", ErrorKind::Unknown),
];

const TRANSIENT_PATTERNS: &[(&str, ErrorKind)] = &[
    ("connection", ErrorKind::Connection),
    ("network", ErrorKind::Connection),
    ("econnreset", ErrorKind::Connection),
    ("econnrefused", ErrorKind::Connection),
    ("socket", ErrorKind::Connection),
    ("broken pipe", ErrorKind::Connection),
    ("timeout", ErrorKind::Timeout),
    ("timed out", ErrorKind::Timeout),
    ("deadlock", ErrorKind::Deadlock),
    ("could not serialize access", ErrorKind::Serialization),
    ("serialization failure", ErrorKind::Serialization),
];

/// Classifies a free-form error message.
pub fn classify_message(message: &str) -> Classification {
    let lower = message.to_lowercase();

    if let Some((_, kind)) = FATAL_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
    {
        return Classification::fatal(*kind);
    }

    TRANSIENT_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, kind)| Classification::retryable(*kind))
        .unwrap_or(Classification::fatal(ErrorKind::Unknown))
}

/// Classifies an error: typed fatal variants first, then message patterns
/// (fatal before transient), then typed transient variants.
pub fn classify_error(err: &PersistError) -> Classification {
    match err {
        PersistError::Retry { last_error, .. } => return classify_error(last_error),
        PersistError::ParentNotFound(_) | PersistError::Constraint(_) => {
            return Classification::fatal(ErrorKind::ConstraintViolation);
        }
        PersistError::Schema { .. } => return Classification::fatal(ErrorKind::Schema),
        PersistError::Validation { .. } => return Classification::fatal(ErrorKind::Validation),
        PersistError::Config(_) | PersistError::Unsupported(_) | PersistError::Serialization(_) => {
            return Classification::fatal(ErrorKind::Unknown);
        }
        _ => {}
    }

    let message = err.to_string();
    let by_message = classify_message(&message);
    if is_fatal_text(&message) {
        return by_message;
    }

    match err {
        PersistError::Connection(_) => Classification::retryable(ErrorKind::Connection),
        PersistError::Timeout(_) => Classification::retryable(ErrorKind::Timeout),
        PersistError::Verification { .. } => Classification::retryable(ErrorKind::Serialization),
        _ => by_message,
    }
}

fn is_fatal_text(message: &str) -> bool {
    let lower = message.to_lowercase();
    FATAL_PATTERNS
        .iter()
        .any(|(pattern, _)| lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_messages() {
        for (message, kind) in [
            ("read ECONNRESET", ErrorKind::Connection),
            ("connection reset by peer", ErrorKind::Connection),
            ("network unreachable", ErrorKind::Connection),
            ("query timed out", ErrorKind::Timeout),
            ("deadlock detected", ErrorKind::Deadlock),
            (
                "could not serialize access due to concurrent update",
                ErrorKind::Serialization,
            ),
        ] {
            let classification = classify_message(message);
            assert!(classification.retryable, "{message}");
            assert_eq!(classification.kind, kind, "{message}");
        }
    }

    #[test]
    fn test_fatal_messages_win_over_transient() {
        let classification =
            classify_message("duplicate key value violates unique constraint on connection 4");
        assert!(!classification.retryable);
        assert_eq!(classification.kind, ErrorKind::ConstraintViolation);

        let auth = classify_message("password authentication failed; connection closed");
        assert!(!auth.retryable);

        let syntax = classify_message("invalid input syntax for type uuid");
        assert_eq!(syntax, Classification::fatal(ErrorKind::Validation));
    }

    #[test]
    fn test_unknown_defaults_to_fatal() {
        assert_eq!(
            classify_message("something odd happened"),
            Classification::fatal(ErrorKind::Unknown)
        );
    }

    #[test]
    fn test_typed_errors() {
        assert!(classify_error(&PersistError::Connection("pool exhausted".into())).retryable);
        assert!(classify_error(&PersistError::Timeout(30_000)).retryable);
        assert_eq!(
            classify_error(&PersistError::Verification {
                expected: 3,
                actual: 0
            }),
            Classification::retryable(ErrorKind::Serialization)
        );
        assert!(!classify_error(&PersistError::ParentNotFound("page".into())).retryable);
        assert_eq!(
            classify_error(&PersistError::Schema { issues: Vec::new() }).kind,
            ErrorKind::Schema
        );
        assert!(!classify_error(&PersistError::Serialization("bad json".into())).retryable);
    }

    #[test]
    fn test_typed_connection_with_auth_failure_is_fatal() {
        let err = PersistError::Connection("authentication failed for user 'cms'".into());
        assert!(!classify_error(&err).retryable);
    }

    #[test]
    fn test_store_errors_use_messages() {
        assert!(classify_error(&PersistError::Store("connection reset".into())).retryable);
        assert!(!classify_error(&PersistError::Store("duplicate key value".into())).retryable);
        assert!(!classify_error(&PersistError::Store("disk full".into())).retryable);
    }

    #[test]
    fn test_retry_wrapper_classifies_inner_error() {
        let err = PersistError::Retry {
            attempts: 4,
            last_error: Box::new(PersistError::Store("deadlock detected".into())),
        };
        assert_eq!(classify_error(&err), Classification::retryable(ErrorKind::Deadlock));
    }
}
