//! Supervised Chrome subprocess for the persistent-profile session.
//!
//! Chrome is started with a remote debugging port and a profile directory
//! that survives between runs, so cookies earned by passing a challenge are
//! reused next time. Readiness is the DevTools `/json/version` endpoint
//! answering with a websocket URL.

use crate::error::SessionError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Poll the DevTools endpoint on `port` until it answers, at most `attempts` times
pub fn devtools_endpoint(port: u16, attempts: u32, interval: Duration) -> Result<String, SessionError> {
    let url = format!("http://127.0.0.1:{}/json/version", port);
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    for attempt in 1..=attempts.max(1) {
        match client.get(&url).send().and_then(|r| r.json::<VersionInfo>()) {
            Ok(info) => return Ok(info.web_socket_debugger_url),
            Err(e) => debug!(attempt, "DevTools not ready on port {}: {}", port, e),
        }
        if attempt < attempts {
            thread::sleep(interval);
        }
    }

    Err(SessionError::Unreachable {
        port,
        attempts: attempts.max(1),
    })
}

pub struct ChromeProcess {
    child: Child,
    port: u16,
}

impl ChromeProcess {
    pub fn args(port: u16, profile_dir: &Path, headless: bool) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", port),
            format!("--user-data-dir={}", profile_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--window-size=1920,1080".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
        ];
        if headless {
            args.push("--headless=new".to_string());
        }
        args.push("about:blank".to_string());
        args
    }

    pub fn start(executable: &Path, port: u16, profile_dir: &Path, headless: bool) -> Result<Self, SessionError> {
        std::fs::create_dir_all(profile_dir)?;
        info!("🚀 Starting Chrome on port {} with profile {}", port, profile_dir.display());

        let child = Command::new(executable)
            .args(Self::args(port, profile_dir, headless))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(Self { child, port })
    }

    /// Wait for DevTools to come up, failing early if Chrome dies first
    pub fn wait_ready(&mut self, attempts: u32, interval: Duration) -> Result<String, SessionError> {
        for attempt in 1..=attempts.max(1) {
            if let Some(status) = self.child.try_wait()? {
                return Err(SessionError::Exited(status.to_string()));
            }
            if let Ok(ws) = devtools_endpoint(self.port, 1, Duration::ZERO) {
                debug!(attempt, "DevTools ready");
                return Ok(ws);
            }
            thread::sleep(interval);
        }
        self.terminate();
        Err(SessionError::Unreachable {
            port: self.port,
            attempts: attempts.max(1),
        })
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub fn terminate(&mut self) {
        if !self.is_running() {
            return;
        }
        if let Err(e) = self.child.kill() {
            warn!("failed to stop Chrome (pid {}): {}", self.child.id(), e);
        }
        let _ = self.child.wait();
    }
}

impl Drop for ChromeProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Executable from configuration, else the one headless_chrome would pick
pub fn resolve_executable(configured: Option<&Path>) -> Result<PathBuf, SessionError> {
    match configured {
        Some(path) => Ok(path.to_path_buf()),
        None => headless_chrome::browser::default_executable().map_err(SessionError::NoExecutable),
    }
}
