//! Tipos de erro para escritas no espelho.
//!
//! Define [`MirrorError`] com variantes para status HTTP, timeout e erros de
//! rede. Nenhum deles chega a quem pediu a transição: a replicação conta cada
//! um como tentativa falha e tenta de novo dentro do orçamento.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MirrorError {
    /// The mirror answered with a non-2xx status.
    #[error("mirror returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The push did not finish within the configured timeout.
    #[error("mirror write timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failure raised by a non-HTTP mirror implementation.
    #[error("mirror unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        let err = MirrorError::Status {
            status: 401,
            message: "Permission denied".into(),
        };
        assert_eq!(err.to_string(), "mirror returned status 401: Permission denied");
    }

    #[test]
    fn timeout_display() {
        let err = MirrorError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "mirror write timed out after 250ms");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MirrorError>();
    }
}
