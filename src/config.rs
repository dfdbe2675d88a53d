//! Layered client configuration.
//!
//! Layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. User config ($XDG_CONFIG_HOME/dce/dce.toml)
//! 3. An explicitly named config file
//! 4. Environment (`DCE_SOCKET_URL`, `DCE_DEBUG`)
//! 5. Caller overrides (command-line flags)

pub mod settings;
pub mod user;

pub use settings::{ClientSettings, DEBUG_ENV, SOCKET_URL_ENV, merge_all, parse_flag};
pub use user::{UserConfigError, UserConfigResult, load_user_config, user_config_path};

use std::fs;
use std::path::Path;
use std::time::Duration;

use url::Url;

use crate::error::{DceError, DceResult};
use crate::readiness::{DEFAULT_OPEN_POLL_INTERVAL, DEFAULT_READY_POLL_INTERVAL};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsEventKind {
    Info,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingsEvent {
    pub kind: SettingsEventKind,
    pub message: String,
}

impl SettingsEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            kind: SettingsEventKind::Warning,
            message: message.into(),
        }
    }

    /// Forward the event to the log facade.
    pub fn log(&self) {
        match self.kind {
            SettingsEventKind::Info => log::info!(target: "dce::config", "{}", self.message),
            SettingsEventKind::Warning => log::warn!(target: "dce::config", "{}", self.message),
        }
    }
}

#[derive(Default, Debug)]
pub struct SettingsLoadOutcome {
    pub settings: ClientSettings,
    pub events: Vec<SettingsEvent>,
}

/// Programmed defaults: no endpoint, debug off, standard poll intervals.
pub fn default_settings() -> ClientSettings {
    ClientSettings {
        socket_url: None,
        debug: Some(false),
        open_poll_interval_ms: Some(DEFAULT_OPEN_POLL_INTERVAL.as_millis() as u64),
        ready_poll_interval_ms: Some(DEFAULT_READY_POLL_INTERVAL.as_millis() as u64),
    }
}

/// Load and merge every configuration layer.
///
/// Problems with individual layers never fail the load; they are reported
/// as warning events and the layer is skipped.
pub fn load_settings(
    config_file: Option<&Path>,
    overrides: ClientSettings,
) -> SettingsLoadOutcome {
    let mut events = Vec::new();

    let defaults = Some(default_settings());
    let user_config = load_user_config_with_events(&mut events);
    let file_settings = config_file.and_then(|path| load_toml_settings(path, &mut events));
    let env_settings = Some(env_settings(&mut events));

    let settings = merge_all(&[
        defaults,
        user_config,
        file_settings,
        env_settings,
        Some(overrides),
    ]);

    SettingsLoadOutcome { settings, events }
}

fn load_user_config_with_events(events: &mut Vec<SettingsEvent>) -> Option<ClientSettings> {
    match load_user_config() {
        Ok(Some(settings)) => {
            events.push(SettingsEvent::info("Loaded user config"));
            Some(settings)
        }
        Ok(None) => None,
        Err(err) => {
            events.push(SettingsEvent::warning(format!(
                "Failed to load user config: {}",
                err
            )));
            None
        }
    }
}

fn load_toml_settings(path: &Path, events: &mut Vec<SettingsEvent>) -> Option<ClientSettings> {
    match fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<ClientSettings>(&contents) {
            Ok(settings) => {
                events.push(SettingsEvent::info(format!(
                    "Loaded config file: {}",
                    path.display()
                )));
                Some(settings)
            }
            Err(err) => {
                events.push(SettingsEvent::warning(format!(
                    "Failed to parse {}: {}",
                    path.display(),
                    err
                )));
                None
            }
        },
        Err(err) => {
            events.push(SettingsEvent::warning(format!(
                "Failed to read {}: {}",
                path.display(),
                err
            )));
            None
        }
    }
}

/// Read the environment layer.
pub fn env_settings(events: &mut Vec<SettingsEvent>) -> ClientSettings {
    let socket_url = std::env::var(SOCKET_URL_ENV)
        .ok()
        .filter(|url| !url.trim().is_empty());

    let debug = std::env::var(DEBUG_ENV).ok().and_then(|raw| {
        let parsed = parse_flag(&raw);
        if parsed.is_none() {
            events.push(SettingsEvent::warning(format!(
                "Ignoring {}={:?}: expected a boolean",
                DEBUG_ENV, raw
            )));
        }
        parsed
    });

    ClientSettings {
        socket_url,
        debug,
        ..Default::default()
    }
}

/// Validated settings ready to connect with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub socket_url: Url,
    pub debug: bool,
    pub open_poll_interval: Duration,
    pub ready_poll_interval: Duration,
}

impl ResolvedConfig {
    /// Validate merged settings.
    ///
    /// A missing endpoint is a client error; an endpoint that is not a
    /// `ws://` or `wss://` URL is a configuration error.
    pub fn from_settings(settings: &ClientSettings) -> DceResult<Self> {
        let raw_url = settings
            .socket_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| DceError::client(format!("{} undefined.", SOCKET_URL_ENV)))?;

        let socket_url = Url::parse(raw_url.trim())
            .map_err(|e| DceError::config(format!("invalid socket url {:?}: {}", raw_url, e)))?;
        if !matches!(socket_url.scheme(), "ws" | "wss") {
            return Err(DceError::config(format!(
                "socket url must use ws or wss, got {}",
                socket_url.scheme()
            )));
        }

        Ok(Self {
            socket_url,
            debug: settings.debug.unwrap_or(false),
            open_poll_interval: poll_interval(
                "openPollIntervalMs",
                settings.open_poll_interval_ms,
                DEFAULT_OPEN_POLL_INTERVAL,
            )?,
            ready_poll_interval: poll_interval(
                "readyPollIntervalMs",
                settings.ready_poll_interval_ms,
                DEFAULT_READY_POLL_INTERVAL,
            )?,
        })
    }
}

/// Interval in milliseconds; zero is rejected.
fn poll_interval(key: &str, millis: Option<u64>, default: Duration) -> DceResult<Duration> {
    match millis {
        Some(0) => Err(DceError::config(format!("{} must be at least 1", key))),
        Some(millis) => Ok(Duration::from_millis(millis)),
        None => Ok(default),
    }
}
