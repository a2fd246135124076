//! Configuration file loading
//!
//! The file is TOML with the sections `[Serial]`, `[SIP]` and `[Debug]`, plus
//! optional `[Controller]` and `[Symbols]` tuning sections:
//!
//! ```toml
//! [Serial]
//! port = "/dev/ttyAMA0"
//! baudrate = 9600
//!
//! [SIP]
//! server = "pbx.example.org"
//! username = "payphone"
//! secret = "secret"
//!
//! [Debug]
//! console_debug = false
//! console_level = "INFO"
//! file_debug = true
//! file_level = "DEBUG"
//! log_file = "./PayPhone.log"
//! ```

use anyhow::{bail, Context, Result};
use payphone_core::{ControllerConfig, LineSymbols, SerialConfig, SipAccount};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// `[Debug]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub console_debug: bool,
    pub console_level: String,
    pub file_debug: bool,
    pub file_level: String,
    pub log_file: String,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            console_debug: false,
            console_level: "INFO".to_string(),
            file_debug: false,
            file_level: "DEBUG".to_string(),
            log_file: "./PayPhone.log".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    #[serde(rename = "Serial")]
    serial: Option<SerialConfig>,
    #[serde(rename = "SIP")]
    sip: Option<SipAccount>,
    #[serde(rename = "Debug")]
    debug: Option<DebugSettings>,
    #[serde(rename = "Controller")]
    controller: Option<ControllerConfig>,
    #[serde(rename = "Symbols")]
    symbols: Option<LineSymbols>,
}

/// Resolved gateway settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub serial: SerialConfig,
    pub account: SipAccount,
    pub debug: DebugSettings,
    pub controller: ControllerConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Reading config file {}", path.display());
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not load settings file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawSettings = toml::from_str(text)?;

        if raw.serial.is_none()
            && raw.sip.is_none()
            && raw.debug.is_none()
            && raw.controller.is_none()
            && raw.symbols.is_none()
        {
            bail!("no config loaded");
        }

        let Some(account) = raw.sip else {
            bail!("missing [SIP] section");
        };
        if account.server.is_empty() {
            bail!("SIP.server must not be empty");
        }

        let mut controller = raw.controller.unwrap_or_default();
        if let Some(symbols) = raw.symbols {
            controller = controller.with_symbols(symbols);
        }
        controller.validate()?;

        Ok(Self {
            serial: raw.serial.unwrap_or_default(),
            account,
            debug: raw.debug.unwrap_or_default(),
            controller,
        })
    }
}
