use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser};
use tracing::level_filters::LevelFilter;

use super::{storage::favicon::DEFAULT_FAVICON_TEMPLATE, HostSettings};

/// Tunables shared by `sitetime-host` and `sitetime serve`.
#[derive(Args, Debug, Clone)]
pub struct HostArgs {
    /// Seconds between heartbeats.
    #[arg(
        long,
        env = "SITETIME_HEARTBEAT_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(2..)
    )]
    pub heartbeat: u64,
    /// Seconds of inactivity after which the browser reports the user as idle.
    #[arg(
        long = "idle-detection",
        env = "SITETIME_IDLE_DETECTION_SECS",
        default_value_t = 120,
        value_parser = clap::value_parser!(u64).range(15..)
    )]
    pub idle_detection: u64,
    /// Icon reference recorded for new sites, `{domain}` is substituted. Empty disables icons.
    #[arg(
        long = "favicon-template",
        env = "SITETIME_FAVICON_TEMPLATE",
        default_value = DEFAULT_FAVICON_TEMPLATE
    )]
    pub favicon_template: String,
}

impl HostArgs {
    pub fn settings(&self) -> HostSettings {
        HostSettings {
            heartbeat: Duration::from_secs(self.heartbeat),
            idle_detection: Duration::from_secs(self.idle_detection),
            favicon_template: self.favicon_template.clone(),
        }
    }
}

/// Arguments of the binary launched by the browser.
#[derive(Parser)]
pub struct DaemonArgs {
    /// Whatever the browser passes to identify the caller, e.g. the extension origin.
    pub origin: Vec<String>,
    /// Handle of the window that started the host. Passed by Chromium on Windows.
    #[arg(long = "parent-window")]
    pub parent_window: Option<String>,
    #[arg(long, env = "SITETIME_DIR")]
    pub dir: Option<PathBuf>,
    #[command(flatten)]
    pub host: HostArgs,
    /// Mirrors logs to stderr. This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use super::DaemonArgs;

    #[test]
    fn test_browser_invocations() {
        let chromium = DaemonArgs::parse_from([
            "sitetime-host",
            "chrome-extension://abcdefgh/",
            "--parent-window=42",
        ]);
        assert_eq!(chromium.origin, vec!["chrome-extension://abcdefgh/"]);
        assert_eq!(chromium.parent_window.as_deref(), Some("42"));

        let firefox = DaemonArgs::parse_from([
            "sitetime-host",
            "/usr/lib/mozilla/native-messaging-hosts/sitetime.json",
            "sitetime@example.org",
        ]);
        assert_eq!(firefox.origin.len(), 2);
        assert!(firefox.parent_window.is_none());
    }

    #[test]
    fn test_host_settings_bounds() {
        let args = DaemonArgs::parse_from(["sitetime-host", "--heartbeat", "10"]);
        let settings = args.host.settings();
        assert_eq!(settings.heartbeat, Duration::from_secs(10));
        assert!(DaemonArgs::try_parse_from(["sitetime-host", "--heartbeat", "1"]).is_err());
        assert!(DaemonArgs::try_parse_from(["sitetime-host", "--idle-detection", "5"]).is_err());
    }
}
