//! Environment-variable configuration, loaded once at process start.

use crate::error::Result;

const DEFAULT_SIGNALLING_HOST: &str = "localhost";
const DEFAULT_SIGNALLING_PORT: u16 = 8080;
const DEFAULT_TCP_PORT: u16 = 2502;
const DEFAULT_UDP_PORT: u16 = 2503;

/// Runtime configuration, sourced from environment variables with
/// hardcoded fallbacks. Loading never hard-fails: a malformed port
/// variable falls back to its default rather than aborting startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host the signalling server listens on / clients connect to.
    pub signalling_server_host: String,
    /// Port the signalling server listens on / clients connect to.
    pub signalling_server_port: u16,
    /// Port the receiver listens on for direct peer connections.
    pub tcp_port: u16,
    /// Reserved for a future UDP transport; unused by this implementation.
    pub udp_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            signalling_server_host: DEFAULT_SIGNALLING_HOST.to_string(),
            signalling_server_port: DEFAULT_SIGNALLING_PORT,
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults
    /// for any variable that is unset or fails to parse.
    ///
    /// # Errors
    ///
    /// This never fails in the current implementation; it returns
    /// `Result` so future validation (e.g. rejecting port 0) can be
    /// added without changing the call signature.
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            signalling_server_host: std::env::var("SIGNALLING_SERVER_HOST")
                .unwrap_or(defaults.signalling_server_host),
            signalling_server_port: env_port("SIGNALLING_SERVER_PORT", defaults.signalling_server_port),
            tcp_port: env_port("TCP_PORT", defaults.tcp_port),
            udp_port: env_port("UDP_PORT", defaults.udp_port),
        })
    }

    /// The `host:port` address clients use to reach the signalling server.
    #[must_use]
    pub fn signalling_server_addr(&self) -> String {
        format!("{}:{}", self.signalling_server_host, self.signalling_server_port)
    }
}

fn env_port(var: &str, default: u16) -> u16 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.signalling_server_host, "localhost");
        assert_eq!(cfg.signalling_server_port, 8080);
        assert_eq!(cfg.tcp_port, 2502);
        assert_eq!(cfg.udp_port, 2503);
    }

    #[test]
    fn load_falls_back_to_defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in ["SIGNALLING_SERVER_HOST", "SIGNALLING_SERVER_PORT", "TCP_PORT", "UDP_PORT"] {
            std::env::remove_var(var);
        }
        let cfg = Config::load().unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn load_reads_overrides_and_ignores_malformed_port() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("SIGNALLING_SERVER_HOST", "example.com");
        std::env::set_var("SIGNALLING_SERVER_PORT", "9999");
        std::env::set_var("TCP_PORT", "not-a-number");
        std::env::remove_var("UDP_PORT");

        let cfg = Config::load().unwrap();
        assert_eq!(cfg.signalling_server_host, "example.com");
        assert_eq!(cfg.signalling_server_port, 9999);
        assert_eq!(cfg.tcp_port, 2502);
        assert_eq!(cfg.udp_port, 2503);

        std::env::remove_var("SIGNALLING_SERVER_HOST");
        std::env::remove_var("SIGNALLING_SERVER_PORT");
        std::env::remove_var("TCP_PORT");
    }

    #[test]
    fn signalling_server_addr_formats_host_and_port() {
        let cfg = Config::default();
        assert_eq!(cfg.signalling_server_addr(), "localhost:8080");
    }
}
