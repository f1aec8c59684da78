use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3169;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_SHELL: &str = "/bin/bash";

/// Without a heartbeat for this long the server shuts itself down.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_TICK: Duration = Duration::from_secs(5);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Runtime knobs for one server process.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub heartbeat_timeout: Duration,
    /// Must be strictly shorter than `heartbeat_timeout`.
    pub heartbeat_tick: Duration,
    /// How long in-flight requests get to drain once shutdown starts.
    pub shutdown_grace: Duration,
    /// Interpreter every action script is handed to as `<shell> -c <script>`.
    pub shell: PathBuf,
    /// Start with the heartbeat timeout suppressed.
    pub inhibit_shutdown: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            heartbeat_tick: DEFAULT_HEARTBEAT_TICK,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            shell: PathBuf::from(DEFAULT_SHELL),
            inhibit_shutdown: false,
        }
    }
}

impl ServerSettings {
    /// Clamp the tick so the monitor samples at least twice per timeout window.
    pub fn normalized(mut self) -> Self {
        if self.heartbeat_timeout.is_zero() {
            tracing::warn!("heartbeat timeout of zero is not allowed, using the default");
            self.heartbeat_timeout = DEFAULT_HEARTBEAT_TIMEOUT;
        }
        if self.heartbeat_tick.is_zero() || self.heartbeat_tick >= self.heartbeat_timeout {
            let tick = self.heartbeat_timeout / 2;
            tracing::warn!(
                tick_ms = self.heartbeat_tick.as_millis() as u64,
                timeout_ms = self.heartbeat_timeout.as_millis() as u64,
                clamped_ms = tick.as_millis() as u64,
                "heartbeat tick must be shorter than the timeout, clamping"
            );
            self.heartbeat_tick = tick;
        }
        self
    }
}
