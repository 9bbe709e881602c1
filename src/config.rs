//! Configuration types for the peer session manager

use serde::{Deserialize, Serialize};

/// Configuration for [`PeerSessionManager`](crate::PeerSessionManager)
///
/// Connectivity is STUN-assisted only: there is no TURN/relay fallback, so
/// peers behind symmetric NATs may fail to connect. Reconnection is a
/// caller-level decision and is never attempted automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RtcConfig {
    /// STUN server URLs used for NAT traversal (at least one required)
    pub stun_servers: Vec<String>,

    /// Fixed capture width for local video (default: 640)
    pub video_width: u32,

    /// Fixed capture height for local video (default: 480)
    pub video_height: u32,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            video_width: 640,
            video_height: 480,
        }
    }
}

impl RtcConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `stun_servers` is empty or contains a non-STUN URL
    /// - `video_width` or `video_height` is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        for url in &self.stun_servers {
            if !url.starts_with("stun:") {
                return Err(Error::InvalidConfig(format!(
                    "STUN server URL must start with stun:, got {}",
                    url
                )));
            }
        }

        if self.video_width == 0 || self.video_height == 0 {
            return Err(Error::InvalidConfig(format!(
                "Video resolution must be non-zero, got {}x{}",
                self.video_width, self.video_height
            )));
        }

        Ok(())
    }

    /// Replace the STUN server list
    ///
    /// Useful for chaining after `RtcConfig::default()`.
    pub fn with_stun_servers(mut self, stun_servers: Vec<String>) -> Self {
        self.stun_servers = stun_servers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RtcConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.video_width, 640);
        assert_eq!(config.video_height, 480);
    }

    #[test]
    fn test_empty_stun_servers_fails() {
        let mut config = RtcConfig::default();
        config.stun_servers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_stun_url_fails() {
        let config =
            RtcConfig::default().with_stun_servers(vec!["turn:turn.example.com".to_string()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_resolution_fails() {
        let mut config = RtcConfig::default();
        config.video_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = RtcConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RtcConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.stun_servers, deserialized.stun_servers);
    }
}
