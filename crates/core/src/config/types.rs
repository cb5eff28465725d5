use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub portal: PortalConfig,
    #[serde(default)]
    pub downloads: DownloadConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("harvester.db")
}

/// Remote portal configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortalConfig {
    /// Listing page URL (e.g., "https://search.ipindia.gov.in/IPOJournal/Journal/Trademark")
    pub base_url: String,
    /// Request timeout for listing fetches in seconds (default: 60)
    #[serde(default = "default_portal_timeout")]
    pub timeout_secs: u64,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_portal_timeout() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("harvester/{}", env!("CARGO_PKG_VERSION"))
}

/// Download manager configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Root of the `<root>/<publication_id>/<file_name>` tree.
    #[serde(default = "default_download_root")]
    pub root: PathBuf,
    /// Wall-clock limit for a single file download in seconds (default: 300)
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            root: default_download_root(),
            timeout_secs: default_download_timeout(),
        }
    }
}

fn default_download_root() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_download_timeout() -> u64 {
    300
}

/// Text extraction configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// Wall-clock limit for extracting one file in seconds (default: 600)
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
    /// Path to the pdftotext binary.
    #[serde(default = "default_pdftotext")]
    pub pdftotext: String,
    /// Path to the pdfinfo binary.
    #[serde(default = "default_pdfinfo")]
    pub pdfinfo: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_extraction_timeout(),
            pdftotext: default_pdftotext(),
            pdfinfo: default_pdfinfo(),
        }
    }
}

fn default_extraction_timeout() -> u64 {
    600
}

fn default_pdftotext() -> String {
    "pdftotext".to_string()
}

fn default_pdfinfo() -> String {
    "pdfinfo".to_string()
}

/// Run coordinator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinatorConfig {
    /// Number of newest listings processed per run (default: 1)
    #[serde(default = "default_max_publications")]
    pub max_publications: usize,
    /// Capacity of the progress broadcast channel.
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_publications: default_max_publications(),
            progress_capacity: default_progress_capacity(),
        }
    }
}

fn default_max_publications() -> usize {
    1
}

fn default_progress_capacity() -> usize {
    256
}

/// Weekly scheduler configuration.
///
/// The fire time is expressed in a fixed UTC offset; the default is Monday
/// 09:00 at +05:30.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_day", with = "weekday_serde")]
    pub day: Weekday,
    #[serde(default = "default_hour")]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            day: default_day(),
            hour: default_hour(),
            minute: 0,
            utc_offset_minutes: default_utc_offset(),
        }
    }
}

impl SchedulerConfig {
    /// Human readable schedule, e.g. "Every Monday at 09:00 (UTC+05:30)".
    pub fn describe(&self) -> String {
        let sign = if self.utc_offset_minutes < 0 { '-' } else { '+' };
        let offset = self.utc_offset_minutes.abs();
        format!(
            "Every {} at {:02}:{:02} (UTC{}{:02}:{:02})",
            weekday_name(self.day),
            self.hour,
            self.minute,
            sign,
            offset / 60,
            offset % 60
        )
    }
}

fn default_true() -> bool {
    true
}

fn default_day() -> Weekday {
    Weekday::Mon
}

fn default_hour() -> u32 {
    9
}

fn default_utc_offset() -> i32 {
    330
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Serializes weekdays as lowercase full names ("monday").
mod weekday_serde {
    use chrono::Weekday;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(day: &Weekday, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::weekday_name(*day).to_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Weekday, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<Weekday>()
            .map_err(|_| D::Error::custom(format!("invalid weekday: {}", raw)))
    }
}
