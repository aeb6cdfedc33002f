// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Device lab controller for Android and iOS farms.
#[derive(Debug, Clone, Parser)]
#[command(name = "corral", version, about)]
pub struct Config {
    /// HTTP/WebSocket port to listen on.
    #[arg(long, env = "PORT", default_value = "5000")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "CORRAL_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Deployment environment (production or development).
    #[arg(long, env = "CORRAL_ENV", default_value = "development")]
    pub env: String,

    /// Cross-origin allow-list entry for the web UI.
    #[arg(long, env = "CORRAL_FRONTEND_URL")]
    pub frontend_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "CORRAL_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (json or text).
    #[arg(long, env = "CORRAL_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Automation driver binary, invoked by name or path.
    #[arg(long, env = "CORRAL_DRIVER_BINARY", default_value = "appium")]
    pub driver_binary: String,

    /// First port of the driver-server allocation range.
    #[arg(long, env = "CORRAL_BASE_PORT", default_value = "4723")]
    pub base_port: u16,

    /// Number of ports in the driver-server range.
    #[arg(long, env = "CORRAL_PORT_RANGE", default_value = "100")]
    pub port_range: u16,

    /// Seconds between discovery cycles.
    #[arg(long, env = "CORRAL_DISCOVERY_INTERVAL", default_value = "30")]
    pub discovery_interval: u64,

    /// Seconds between system-health broadcasts.
    #[arg(long, env = "CORRAL_HEALTH_INTERVAL", default_value = "30")]
    pub health_interval: u64,

    /// Seconds between reservation-deadline sweeps (0 = disabled).
    #[arg(long, env = "CORRAL_REAPER_INTERVAL", default_value = "60")]
    pub reaper_interval: u64,

    /// Staging directory for uploaded app artifacts.
    #[arg(long, env = "CORRAL_UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,

    /// Seed a handful of synthetic offline devices at startup (demo mode).
    #[arg(long, env = "CORRAL_SEED_DEMO_DEVICES", default_value = "false")]
    pub seed_demo_devices: bool,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port_range == 0 {
            anyhow::bail!("--port-range must be at least 1");
        }
        if u32::from(self.base_port) + u32::from(self.port_range) > 65536 {
            anyhow::bail!("driver port range exceeds 65535");
        }
        if self.discovery_interval == 0 {
            anyhow::bail!("--discovery-interval must be at least 1 second");
        }
        match self.env.as_str() {
            "production" | "development" => {}
            other => anyhow::bail!("invalid environment: {other}"),
        }
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    pub fn production(&self) -> bool {
        self.env == "production"
    }

    /// Staging directory for uploads, defaulting under the system temp dir.
    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(|| std::env::temp_dir().join("corral-uploads"))
    }
}

impl Default for Config {
    fn default() -> Self {
        // Parse from an empty argv so clap fills in the defaults.
        <Self as Parser>::parse_from(["corral"])
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
