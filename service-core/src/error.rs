use thiserror::Error;

/// Startup and infrastructure errors shared by service binaries.
///
/// Request-level failures are modelled by each service; this type only covers
/// what can go wrong before a service starts accepting traffic.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_keep_their_message() {
        let err = AppError::from(config::ConfigError::Message("bad port".to_string()));
        assert!(matches!(err, AppError::ConfigError(_)));
        assert_eq!(err.to_string(), "Configuration error: bad port");
    }

    #[test]
    fn io_errors_convert() {
        let err: AppError = std::io::Error::other("address in use").into();
        assert!(err.to_string().contains("address in use"));
    }
}
