/// Monitor configuration, resolved in layers: built-in defaults, then the
/// key=value env file, then the process environment. CLI flags override on
/// top of the loaded result (see `main.rs`).
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 18790;
const DEFAULT_LOG_DIR: &str = "/tmp/openclaw";

/// Default restart pipeline: tear down the launchd job, make sure the
/// gateway process is really gone, then relaunch.
const DEFAULT_RESTART_CMD: &str = "launchctl bootout gui/$(id -u)/ai.openclaw.gateway 2>&1; \
     sleep 2; pkill -9 -f openclaw-gateway 2>&1; sleep 1; openclaw gateway --force";

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub port: u16,
    /// Gateway state root (sessions, transcripts, openclaw.json).
    pub home: PathBuf,
    /// Directory holding the daily rotating log files.
    pub log_dir: PathBuf,
    /// Opaque shell command that restarts the gateway.
    pub restart_cmd: String,
}

impl MonitorConfig {
    /// Load the env file (missing file is fine) and resolve from the
    /// process environment.
    pub fn load(env_file: Option<&Path>) -> Self {
        match env_file {
            Some(path) => {
                if let Err(e) = dotenvy::from_path(path) {
                    tracing::warn!(path = %path.display(), error = %e, "could not load env file");
                }
            }
            None => {
                let _ = dotenvy::dotenv(); // default .env, absent in most setups
            }
        }
        Self::resolve(|key| std::env::var(key).ok())
    }

    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let home = lookup("OPENCLAW_HOME").map(PathBuf::from).unwrap_or_else(|| {
            lookup("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".openclaw")
        });
        let log_dir = lookup("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
        let restart_cmd =
            lookup("RESTART_CMD").unwrap_or_else(|| DEFAULT_RESTART_CMD.to_string());

        Self {
            port,
            home,
            log_dir,
            restart_cmd,
        }
    }

    /// The keyed session registry.
    pub fn sessions_file(&self) -> PathBuf {
        self.sessions_dir().join("sessions.json")
    }

    /// Directory holding per-session JSONL transcripts.
    pub fn sessions_dir(&self) -> PathBuf {
        self.home.join("agents/main/sessions")
    }

    /// The gateway's primary JSON configuration (model providers, primary
    /// model pointer).
    pub fn gateway_config(&self) -> PathBuf {
        self.home.join("openclaw.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(vars: &[(&str, &str)]) -> MonitorConfig {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        MonitorConfig::resolve(|key| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = resolve(&[("HOME", "/home/me")]);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.home, PathBuf::from("/home/me/.openclaw"));
        assert_eq!(config.log_dir, PathBuf::from("/tmp/openclaw"));
        assert!(config.restart_cmd.contains("openclaw gateway"));
    }

    #[test]
    fn test_env_overrides() {
        let config = resolve(&[
            ("PORT", "9000"),
            ("OPENCLAW_HOME", "/srv/claw"),
            ("LOG_DIR", "/var/log/claw"),
            ("RESTART_CMD", "systemctl restart claw"),
        ]);
        assert_eq!(config.port, 9000);
        assert_eq!(config.home, PathBuf::from("/srv/claw"));
        assert_eq!(config.log_dir, PathBuf::from("/var/log/claw"));
        assert_eq!(config.restart_cmd, "systemctl restart claw");
    }

    #[test]
    fn test_unparseable_port_falls_back() {
        let config = resolve(&[("PORT", "not-a-port"), ("HOME", "/home/me")]);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_derived_paths() {
        let config = resolve(&[("OPENCLAW_HOME", "/srv/claw")]);
        assert_eq!(
            config.sessions_file(),
            PathBuf::from("/srv/claw/agents/main/sessions/sessions.json")
        );
        assert_eq!(
            config.sessions_dir(),
            PathBuf::from("/srv/claw/agents/main/sessions")
        );
        assert_eq!(
            config.gateway_config(),
            PathBuf::from("/srv/claw/openclaw.json")
        );
    }
}
