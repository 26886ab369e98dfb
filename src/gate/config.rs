//! Gate configuration.

use std::time::Duration;

/// Configuration for a [`Gate`](super::Gate).
#[derive(Debug, Clone, Default)]
pub struct GateConfig {
    /// Give up on a request after this long. Default: wait forever.
    pub request_timeout: Option<Duration>,
    /// Answer requests for unknown actions with an `UnhandledAction` error
    /// instead of dropping them. Default: false.
    pub reject_unhandled: bool,
    /// Give up on the bootstrap handshake after this long. Default: wait forever.
    pub handshake_timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        assert!(config.request_timeout.is_none());
        assert!(!config.reject_unhandled);
        assert!(config.handshake_timeout.is_none());
    }
}
