//! Runtime configuration
//!
//! Command-line flags (with environment fallbacks) and the timing tunables
//! they resolve to.

use clap::Parser;
use std::time::Duration;

/// Timing knobs shared by the creation workflow, the tracker and the
/// one-shot refresher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    /// Every n-th answered poll posts a "current status" notification.
    pub progress_every: u32,
    pub refresh_delay: Duration,
    pub reload_delay: Duration,
    pub toast_ttl: Duration,
    pub long_toast_ttl: Duration,
    pub tracking_toast_ttl: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        // 120 polls at 10s is roughly 20 minutes
        TrackerConfig {
            poll_interval: Duration::from_secs(10),
            max_attempts: 120,
            progress_every: 6,
            refresh_delay: Duration::from_secs(4),
            reload_delay: Duration::from_secs(3),
            toast_ttl: Duration::from_millis(2600),
            long_toast_ttl: Duration::from_millis(6000),
            tracking_toast_ttl: Duration::from_millis(4000),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "provtrack", version, about)]
pub struct Args {
    /// Base URL of the provisioning panel
    #[arg(long, env = "PROVTRACK_URL", default_value = "http://127.0.0.1:5000")]
    pub url: String,

    /// Admin user for the creation endpoint
    #[arg(long, env = "PROVTRACK_ADMIN_USER", default_value = "admin")]
    pub admin_user: String,

    #[arg(long, env = "PROVTRACK_ADMIN_PASS", hide_env_values = true)]
    pub admin_pass: Option<String>,

    /// Per-request HTTP timeout
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    pub request_timeout: Duration,

    /// Delay between status polls of a tracked creation
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    pub poll_interval: Duration,

    /// Polls before a creation is reported as timed out
    #[arg(long, default_value_t = 120, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: u32,

    /// Post a progress notification every n-th poll
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(1..))]
    pub progress_every: u32,

    /// Wait before the single status check that follows a quick action
    #[arg(long, default_value = "4s", value_parser = humantime::parse_duration)]
    pub refresh_delay: Duration,

    /// Grace period between a successful creation and the reload
    #[arg(long, default_value = "3s", value_parser = humantime::parse_duration)]
    pub reload_delay: Duration,

    /// Default notification lifetime
    #[arg(long, default_value = "2600ms", value_parser = humantime::parse_duration)]
    pub toast_ttl: Duration,
}

impl Args {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            poll_interval: self.poll_interval,
            max_attempts: self.max_attempts,
            progress_every: self.progress_every,
            refresh_delay: self.refresh_delay,
            reload_delay: self.reload_delay,
            toast_ttl: self.toast_ttl,
            ..TrackerConfig::default()
        }
    }
}
