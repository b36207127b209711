use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    #[serde(default)]
    pub allow_origins: Vec<String>,
    #[serde(default = "default_cors_max_age")]
    pub max_age: u64,
}

fn default_cors_max_age() -> u64 {
    3600
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: Vec::new(),
            max_age: default_cors_max_age(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    /// Bootstrap admin created on startup when all three are set.
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub admin_email: Option<String>,
}

fn default_token_ttl_hours() -> i64 {
    24 * 7
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Maximum size of one uploaded file, in bytes.
    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/blobs")
}
fn default_max_blob_size() -> u64 {
    32 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_blob_size: default_max_blob_size(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RatingConfig {
    #[serde(default = "default_initial_rating")]
    pub initial_rating: i32,
    #[serde(default = "default_k_factor")]
    pub k_factor: f64,
    /// Fewer entrants than this resolve the challenge without touching ratings.
    #[serde(default = "default_min_rated_entrants")]
    pub min_rated_entrants: usize,
}

fn default_initial_rating() -> i32 {
    1200
}
fn default_k_factor() -> f64 {
    32.0
}
fn default_min_rated_entrants() -> usize {
    2
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            initial_rating: default_initial_rating(),
            k_factor: default_k_factor(),
            min_rated_entrants: default_min_rated_entrants(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VotingConfig {
    #[serde(default = "default_allow_anonymous")]
    pub allow_anonymous: bool,
}

fn default_allow_anonymous() -> bool {
    true
}

impl Default for VotingConfig {
    fn default() -> Self {
        Self {
            allow_anonymous: default_allow_anonymous(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct JobsConfig {
    #[serde(default = "default_jobs_enabled")]
    pub enabled: bool,
    #[serde(default = "default_result_submission_interval")]
    pub result_submission_interval_secs: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_notification_interval")]
    pub notification_interval_secs: u64,
    /// How long before `end_date` the upload reminder goes out.
    #[serde(default = "default_reminder_lead_hours")]
    pub reminder_lead_hours: i64,
    /// Archived challenges older than this are pruned. 0 keeps them forever.
    #[serde(default)]
    pub archive_retention_days: i64,
}

fn default_jobs_enabled() -> bool {
    true
}
fn default_result_submission_interval() -> u64 {
    60
}
fn default_cleanup_interval() -> u64 {
    3600
}
fn default_notification_interval() -> u64 {
    300
}
fn default_reminder_lead_hours() -> i64 {
    24
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            enabled: default_jobs_enabled(),
            result_submission_interval_secs: default_result_submission_interval(),
            cleanup_interval_secs: default_cleanup_interval(),
            notification_interval_secs: default_notification_interval(),
            reminder_lead_hours: default_reminder_lead_hours(),
            archive_retention_days: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_email_from")]
    pub from: String,
    /// HTTP endpoint accepting `OutgoingEmail` JSON. Mail is only logged when unset.
    pub relay_url: Option<String>,
    /// Base URL used for links inside emails.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_email_from() -> String {
    "SkillChallenge <noreply@skillchallenge.local>".into()
}
fn default_public_url() -> String {
    "http://localhost:3000".into()
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            from: default_email_from(),
            relay_url: None,
            public_url: default_public_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub rating: RatingConfig,
    #[serde(default)]
    pub voting: VotingConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., SKILLCHALLENGE__AUTH__JWT_SECRET)
            .add_source(Environment::with_prefix("SKILLCHALLENGE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
