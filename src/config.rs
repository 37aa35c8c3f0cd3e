//! Runtime configuration parsed from the environment.
//!
//! Every numeric input is parsed and validated exactly once at startup.
//! A malformed value is a fatal, named error rather than a silent fallback
//! to some default, so bad deployments fail loudly before a browser is
//! ever launched.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default radar center and zoom (Extremadura, Spain).
const DEFAULT_LAT: f64 = 39.418;
const DEFAULT_LON: f64 = -5.160;
const DEFAULT_ZOOM: u8 = 6;

const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_RENDER_WAIT_MS: u64 = 30_000;
const DEFAULT_WIDTH: u32 = 1920;
const DEFAULT_HEIGHT: u32 = 1080;

/// Below this many bytes a capture almost certainly failed to render.
/// Empirically tuned against known-good captures; override with
/// `CAPTURE_MIN_BYTES` rather than editing.
const DEFAULT_MIN_VALID_BYTES: u64 = 10_000;

const DEFAULT_KEEP_LAST: usize = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("missing X API credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),
}

/// Browser viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Map overlay, center, and zoom used to build the Windy URL (and the
/// tweet link).
#[derive(Debug, Clone, PartialEq)]
pub struct RadarLocation {
    /// Windy overlay layer, e.g. `radar` or `rain`.
    pub overlay: String,
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
}

impl RadarLocation {
    /// The map view URL Windy encodes as query parameters.
    pub fn windy_url(&self) -> String {
        format!(
            "https://www.windy.com/?{},{},{},{}",
            self.overlay, self.lat, self.lon, self.zoom
        )
    }
}

/// Immutable per-run capture settings.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Page to capture. Built from [`RadarLocation`] unless `WINDY_URL` overrides it.
    pub target_url: String,
    pub location: RadarLocation,
    pub captures_dir: PathBuf,
    /// Upper bound on browser launch and navigation.
    pub overall_timeout: Duration,
    /// Unconditional settle time for asynchronous tile rendering.
    pub render_wait: Duration,
    pub viewport: Viewport,
    /// Minimum output file size accepted as a plausible render.
    pub min_valid_bytes: u64,
    /// How many captures to keep when pruning old files.
    pub keep_last: usize,
}

impl CaptureConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let location = RadarLocation {
            overlay: get("RADAR_OVERLAY")
                .filter(|overlay| !overlay.trim().is_empty())
                .unwrap_or_else(|| "radar".to_string()),
            lat: parse_or(&get, "RADAR_LAT", DEFAULT_LAT)?,
            lon: parse_or(&get, "RADAR_LON", DEFAULT_LON)?,
            zoom: parse_or(&get, "RADAR_ZOOM", DEFAULT_ZOOM)?,
        };

        let target_url = get("WINDY_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| location.windy_url());

        let captures_dir = get("LOCAL_CAPTURES_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./captures"));

        Ok(Self {
            target_url,
            location,
            captures_dir,
            overall_timeout: Duration::from_millis(parse_or(
                &get,
                "WINDY_TIMEOUT_MS",
                DEFAULT_TIMEOUT_MS,
            )?),
            render_wait: Duration::from_millis(parse_or(
                &get,
                "WINDY_WAIT_MS",
                DEFAULT_RENDER_WAIT_MS,
            )?),
            viewport: Viewport {
                width: parse_or(&get, "CAPTURE_WIDTH", DEFAULT_WIDTH)?,
                height: parse_or(&get, "CAPTURE_HEIGHT", DEFAULT_HEIGHT)?,
            },
            min_valid_bytes: parse_or(&get, "CAPTURE_MIN_BYTES", DEFAULT_MIN_VALID_BYTES)?,
            keep_last: parse_or(&get, "CAPTURE_KEEP_LAST", DEFAULT_KEEP_LAST)?,
        })
    }
}

/// The four OAuth 1.0a user-context credentials.
#[derive(Debug, Clone)]
pub struct TwitterCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_secret: String,
}

const CREDENTIAL_VARS: [&str; 4] = [
    "TWITTER_API_KEY",
    "TWITTER_API_SECRET",
    "TWITTER_ACCESS_TOKEN",
    "TWITTER_ACCESS_SECRET",
];

impl TwitterCredentials {
    /// Reads all four credentials, reporting every missing variable at once.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut fetch = |var: &'static str| {
            get(var)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| {
                    missing.push(var);
                    String::new()
                })
        };

        let credentials = Self {
            api_key: fetch(CREDENTIAL_VARS[0]),
            api_secret: fetch(CREDENTIAL_VARS[1]),
            access_token: fetch(CREDENTIAL_VARS[2]),
            access_secret: fetch(CREDENTIAL_VARS[3]),
        };

        if missing.is_empty() {
            Ok(credentials)
        } else {
            Err(ConfigError::MissingCredentials(missing))
        }
    }
}

/// Publisher settings: credentials plus message options.
#[derive(Debug, Clone)]
pub struct TwitterConfig {
    pub credentials: TwitterCredentials,
    /// Include the Windy URL in the templated message.
    pub include_link: bool,
    /// Replaces the whole templated message when set.
    pub custom_message: Option<String>,
    /// Post as a reply to this tweet id when set.
    pub reply_to: Option<String>,
}

impl TwitterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let credentials = TwitterCredentials::from_lookup(&get)?;
        Ok(Self {
            credentials,
            include_link: get("TWITTER_INCLUDE_LINK").as_deref() != Some("false"),
            custom_message: get("TWITTER_CUSTOM_MESSAGE").filter(|m| !m.trim().is_empty()),
            reply_to: get("TWITTER_REPLY_TO").filter(|id| !id.trim().is_empty()),
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            var,
            value: raw,
            reason: err.to_string(),
        }),
    }
}
