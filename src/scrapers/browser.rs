use crate::scrapers::chrome_process::{devtools_endpoint, resolve_executable, ChromeProcess};
use crate::scrapers::traits::{PageProvider, RenderedPage};
use anyhow::{anyhow, Context, Result};
use headless_chrome::browser::tab::point::Point;
use headless_chrome::protocol::cdp::{Emulation, Page};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Browser connections idle longer than this are dropped by headless_chrome
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// How a platform gets its browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Attach to (or start) a long-lived Chrome with an on-disk profile
    Persistent,
    /// Fresh sandboxed instance per page
    Ephemeral,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub executable: Option<PathBuf>,
    pub debug_port: u16,
    pub profile_dir: PathBuf,
    pub headless: bool,
    pub startup_attempts: u32,
    pub startup_interval: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            debug_port: 9222,
            profile_dir: PathBuf::from(".chrome-profile"),
            headless: true,
            startup_attempts: 20,
            startup_interval: Duration::from_millis(500),
        }
    }
}

/// Desktop Chrome identity shared by browser tabs and direct requests
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// What the page claims to be: a French desktop Chrome
#[derive(Debug, Clone)]
pub struct FingerprintProfile {
    pub user_agent: String,
    pub accept_language: String,
    pub platform: String,
    pub locale: String,
    pub timezone: String,
    pub languages: Vec<String>,
}

impl Default for FingerprintProfile {
    fn default() -> Self {
        Self {
            user_agent: DESKTOP_USER_AGENT.to_string(),
            accept_language: "fr-FR,fr;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
            platform: "MacIntel".to_string(),
            locale: "fr-FR".to_string(),
            timezone: "Europe/Paris".to_string(),
            languages: vec!["fr-FR".into(), "fr".into(), "en-US".into(), "en".into()],
        }
    }
}

impl FingerprintProfile {
    /// Runs before any page script in every new document
    pub fn init_script(&self) -> String {
        let languages = serde_json::to_string(&self.languages).unwrap_or_else(|_| "[]".to_string());
        format!(
            r#"
Object.defineProperty(navigator, 'webdriver', {{ get: () => false }});
window.chrome = window.chrome || {{ runtime: {{}} }};
Object.defineProperty(navigator, 'plugins', {{ get: () => [1, 2, 3, 4, 5] }});
Object.defineProperty(navigator, 'languages', {{ get: () => {languages} }});
"#
        )
    }

    pub fn apply(&self, tab: &Tab) -> Result<()> {
        tab.enable_stealth_mode().context("Failed to enable stealth mode")?;
        tab.set_user_agent(&self.user_agent, Some(&self.accept_language), Some(&self.platform))
            .context("Failed to set user agent")?;
        tab.call_method(Emulation::SetTimezoneOverride {
            timezone_id: self.timezone.clone(),
        })
        .context("Failed to override timezone")?;
        tab.call_method(Emulation::SetLocaleOverride {
            locale: Some(self.locale.clone()),
        })
        .context("Failed to override locale")?;
        tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
            source: self.init_script(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        })
        .context("Failed to install init script")?;
        Ok(())
    }
}

/// Hands out Chrome tabs in either session mode
pub struct BrowserSession {
    config: BrowserConfig,
    fingerprint: FingerprintProfile,
    attached: Mutex<Option<Browser>>,
    process: Mutex<Option<ChromeProcess>>,
}

impl BrowserSession {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            fingerprint: FingerprintProfile::default(),
            attached: Mutex::new(None),
            process: Mutex::new(None),
        }
    }

    /// The long-lived browser, attaching or starting it on first use
    fn persistent(&self) -> Result<Browser> {
        let mut attached = self
            .attached
            .lock()
            .map_err(|_| anyhow!("browser session lock poisoned"))?;
        if let Some(browser) = attached.as_ref() {
            return Ok(browser.clone());
        }

        let port = self.config.debug_port;
        let ws_url = match devtools_endpoint(port, 1, Duration::ZERO) {
            Ok(ws_url) => {
                info!("🔗 Attaching to Chrome already listening on port {}", port);
                ws_url
            }
            Err(_) => {
                let executable = resolve_executable(self.config.executable.as_deref())?;
                let mut process =
                    ChromeProcess::start(&executable, port, &self.config.profile_dir, false)?;
                let ws_url =
                    process.wait_ready(self.config.startup_attempts, self.config.startup_interval)?;
                *self
                    .process
                    .lock()
                    .map_err(|_| anyhow!("browser process lock poisoned"))? = Some(process);
                ws_url
            }
        };

        let browser = Browser::connect_with_timeout(ws_url, IDLE_TIMEOUT)
            .context("Failed to attach to Chrome")?;
        *attached = Some(browser.clone());
        Ok(browser)
    }

    fn ephemeral(&self) -> Result<Browser> {
        let executable = resolve_executable(self.config.executable.as_deref())?;
        let options = LaunchOptions::default_builder()
            .headless(self.config.headless)
            .sandbox(true)
            .path(Some(executable))
            .window_size(Some((1440, 900)))
            .args(vec![OsStr::new("--disable-blink-features=AutomationControlled")])
            .idle_browser_timeout(IDLE_TIMEOUT)
            .build()
            .context("Failed to build launch options")?;

        Browser::new(options).context("Failed to launch Chrome browser")
    }

    /// Forget the attached browser so the next acquisition reconnects
    fn detach(&self) {
        if let Ok(mut attached) = self.attached.lock() {
            attached.take();
        }
    }

    /// Drop the attached connection and stop Chrome if this session started it
    pub fn shutdown(&self) {
        self.detach();
        if let Ok(mut process) = self.process.lock() {
            if let Some(mut process) = process.take() {
                process.terminate();
            }
        }
    }
}

impl PageProvider for BrowserSession {
    fn acquire(&self, mode: SessionMode) -> Result<Arc<dyn RenderedPage>> {
        let browser = match mode {
            SessionMode::Persistent => self.persistent()?,
            SessionMode::Ephemeral => self.ephemeral()?,
        };

        let tab = match browser.new_tab() {
            Ok(tab) => tab,
            Err(e) => {
                if mode == SessionMode::Persistent {
                    self.detach();
                }
                return Err(e.context("Failed to open tab"));
            }
        };
        self.fingerprint.apply(&tab)?;
        debug!(?mode, "page acquired");

        Ok(Arc::new(ChromePage { tab, _browser: browser }))
    }

    fn release(&self, page: Arc<dyn RenderedPage>) {
        if let Err(e) = page.close() {
            debug!("tab close failed: {:#}", e);
        }
    }
}

/// A Chrome tab; holds its browser so an ephemeral instance lives as long as the page
pub struct ChromePage {
    tab: Arc<Tab>,
    _browser: Browser,
}

impl RenderedPage for ChromePage {
    fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        self.tab.set_default_timeout(timeout);
        self.tab
            .navigate_to(url)
            .with_context(|| format!("Failed to navigate to {}", url))?;
        self.tab
            .wait_until_navigated()
            .with_context(|| format!("Navigation to {} did not settle", url))?;
        Ok(())
    }

    fn title(&self) -> Result<String> {
        self.tab.get_title()
    }

    fn content(&self) -> Result<String> {
        self.tab.get_content()
    }

    fn wait_for(&self, selector: &str, timeout: Duration) -> bool {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .is_ok()
    }

    fn run_script(&self, script: &str) -> Result<()> {
        self.tab.evaluate(script, false)?;
        Ok(())
    }

    fn move_pointer(&self, x: f64, y: f64) -> Result<()> {
        self.tab.move_mouse_to_point(Point { x, y })?;
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<u8>> {
        self.tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .context("Failed to capture screenshot")
    }

    fn close(&self) -> Result<()> {
        if let Err(e) = self.tab.close(false) {
            warn!("tab did not close cleanly: {:#}", e);
        }
        Ok(())
    }
}
