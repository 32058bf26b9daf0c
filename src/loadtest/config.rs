//! TOML-based load profile configuration.
//!
//! A profile is a `[settings]` table plus a weighted list of `[[task]]`
//! request templates. Each template names a GET path, an optional query
//! parameter and the literal values substituted on every iteration.
//!
//! # Example TOML
//!
//! ```toml
//! [settings]
//! users = 500
//! throughput_per_user = 0.1
//! duration_secs = 60
//!
//! [[task]]
//! name = "get_id"
//! weight = 100
//! path = "/rest/{value}"
//! values = [1, 20, 30, 40, 50, 60]
//!
//! [[task]]
//! name = "get_titel"
//! weight = 200
//! path = "/rest"
//! query = "titel"
//! values = ["a", "l", "t", "i", "p"]
//! ```
//!
//! The target host is NOT part of the profile. It is passed on the command
//! line so one profile can be pointed at several deployments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::loadtest::error::LoadTestError;

/// Placeholder replaced by the literal value in path-parameter templates.
pub const VALUE_PLACEHOLDER: &str = "{value}";

/// Top-level load profile parsed from a TOML file.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoadTestConfig {
    /// General execution settings.
    pub settings: Settings,
    /// Weighted request templates. The TOML key is `task` because
    /// `[[task]]` array-of-tables syntax creates a key called `task`.
    pub task: Vec<TaskTemplate>,
}

/// General settings controlling population, pacing and timeouts.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Fixed number of concurrently running virtual users.
    pub users: u32,
    /// Maximum iterations per second for a single user.
    pub throughput_per_user: f64,
    /// Total test duration in seconds.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Users started per second. `None` starts the whole population at once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_rate: Option<f64>,
    /// Skip TLS certificate verification (self-signed target certificates).
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
    /// Expected interval between requests, used for coordinated omission
    /// correction in the latency histograms.
    #[serde(default = "default_expected_interval")]
    pub expected_interval_ms: u64,
}

fn default_duration_secs() -> u64 {
    60
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_accept_invalid_certs() -> bool {
    true
}

/// One pacing period at the default throughput of 0.1 iterations/s.
fn default_expected_interval() -> u64 {
    10_000
}

/// A literal value substituted into a request template.
///
/// TOML lists may hold integers (book IDs) or strings (title fragments,
/// ISBNs); both render through [`fmt::Display`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer literal, e.g. a book ID.
    Int(i64),
    /// String literal, e.g. an ISBN.
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// A weighted GET request template.
///
/// Exactly one of two shapes is valid:
/// - path parameter: `path` contains `{value}` and `query` is absent
/// - query parameter: `query` names the parameter and `path` is static
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TaskTemplate {
    /// Statistics label for this task.
    pub name: String,
    /// Scheduling weight relative to the other tasks.
    pub weight: u32,
    /// Request path, starting with `/`.
    pub path: String,
    /// Query parameter name, for query-parameter templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Literal values; one request per value per iteration, in list order.
    pub values: Vec<ParamValue>,
}

/// A fully rendered request: statistics name plus absolute URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Relative request name, e.g. `/rest/20` or `/rest?isbn=978-0-201-63361-0`.
    pub name: String,
    /// Absolute URL sent on the wire.
    pub url: Url,
}

impl LoadTestConfig {
    /// The built-in profile for the Buch REST API.
    ///
    /// 500 users at 0.1 iterations/s each, mixing ID lookups, title-substring
    /// searches and ISBN searches at 100:200:150.
    pub fn buch_profile() -> Self {
        Self {
            settings: Settings {
                users: 500,
                throughput_per_user: 0.1,
                duration_secs: default_duration_secs(),
                timeout_ms: default_timeout_ms(),
                spawn_rate: None,
                accept_invalid_certs: true,
                expected_interval_ms: default_expected_interval(),
            },
            task: vec![
                TaskTemplate {
                    name: "get_id".to_string(),
                    weight: 100,
                    path: "/rest/{value}".to_string(),
                    query: None,
                    values: [1, 20, 30, 40, 50, 60]
                        .into_iter()
                        .map(ParamValue::from)
                        .collect(),
                },
                TaskTemplate {
                    name: "get_titel".to_string(),
                    weight: 200,
                    path: "/rest".to_string(),
                    query: Some("titel".to_string()),
                    values: ["a", "l", "t", "i", "p"]
                        .into_iter()
                        .map(ParamValue::from)
                        .collect(),
                },
                TaskTemplate {
                    name: "get_isbn".to_string(),
                    weight: 150,
                    path: "/rest".to_string(),
                    query: Some("isbn".to_string()),
                    values: [
                        "978-3-897-22583-1",
                        "978-3-827-31552-6",
                        "978-0-201-63361-0",
                        "978-0-007-09732-6",
                        "978-3-824-40481-0",
                        "978-3-540-43081-0",
                    ]
                    .into_iter()
                    .map(ParamValue::from)
                    .collect(),
                },
            ],
        }
    }

    /// Parse a TOML string into a validated [`LoadTestConfig`].
    pub fn from_toml(content: &str) -> Result<Self, LoadTestError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a [`LoadTestConfig`] from a file path.
    ///
    /// Returns [`LoadTestError::ConfigIo`] if the file cannot be read,
    /// [`LoadTestError::ConfigParse`] if the TOML is malformed, or
    /// [`LoadTestError::ConfigValidation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadTestError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Serialize the profile back to TOML.
    pub fn to_toml(&self) -> Result<String, LoadTestError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Sum of all task weights.
    pub fn total_weight(&self) -> u64 {
        self.task.iter().map(|t| u64::from(t.weight)).sum()
    }

    /// Fraction of iterations expected to select `task` (0.0..=1.0).
    pub fn expected_share(&self, task: &TaskTemplate) -> f64 {
        let total = self.total_weight();
        if total == 0 {
            return 0.0;
        }
        f64::from(task.weight) / total as f64
    }

    /// Weighted mean of requests issued per iteration.
    pub fn mean_requests_per_iteration(&self) -> f64 {
        let total = self.total_weight();
        if total == 0 {
            return 0.0;
        }
        let weighted: u64 = self
            .task
            .iter()
            .map(|t| u64::from(t.weight) * t.values.len() as u64)
            .sum();
        weighted as f64 / total as f64
    }

    /// Steady-state iterations per second across the whole population.
    pub fn expected_iteration_rate(&self) -> f64 {
        f64::from(self.settings.users) * self.settings.throughput_per_user
    }

    /// Steady-state requests per second across the whole population.
    pub fn expected_request_rate(&self) -> f64 {
        self.expected_iteration_rate() * self.mean_requests_per_iteration()
    }

    /// Look up a task by name.
    pub fn find_task(&self, name: &str) -> Option<&TaskTemplate> {
        self.task.iter().find(|t| t.name == name)
    }

    /// Validate that the profile is semantically correct.
    ///
    /// Checks:
    /// - At least one task is defined and total weight is greater than zero
    /// - Every task has a non-empty value list and a consistent path/query shape
    /// - Task names are unique
    /// - Users, duration and throughput are positive; spawn rate if set is positive
    pub fn validate(&self) -> Result<(), LoadTestError> {
        let invalid = |message: String| Err(LoadTestError::ConfigValidation { message });

        if self.task.is_empty() {
            return invalid("Profile must contain at least one [[task]] block".to_string());
        }
        if self.total_weight() == 0 {
            return invalid("Total task weights must be greater than 0".to_string());
        }

        for (i, task) in self.task.iter().enumerate() {
            task.validate()
                .map_err(|message| LoadTestError::ConfigValidation {
                    message: format!("Task {} ('{}'): {message}", i + 1, task.name),
                })?;
            if self.task[..i].iter().any(|t| t.name == task.name) {
                return invalid(format!("Duplicate task name '{}'", task.name));
            }
        }

        let settings = &self.settings;
        if settings.users == 0 {
            return invalid("settings.users must be greater than 0".to_string());
        }
        if settings.duration_secs == 0 {
            return invalid("settings.duration_secs must be greater than 0".to_string());
        }
        if !(settings.throughput_per_user.is_finite() && settings.throughput_per_user > 0.0) {
            return invalid(format!(
                "settings.throughput_per_user must be a positive number, got {}",
                settings.throughput_per_user
            ));
        }
        if let Some(rate) = settings.spawn_rate {
            if !(rate.is_finite() && rate > 0.0) {
                return invalid(format!(
                    "settings.spawn_rate must be a positive number, got {rate}"
                ));
            }
        }

        Ok(())
    }
}

impl Settings {
    /// Convert the `timeout_ms` field to a [`Duration`].
    pub fn timeout_as_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay between consecutive user spawns, or zero when all start at once.
    pub fn spawn_interval(&self) -> Duration {
        match self.spawn_rate {
            Some(rate) if rate > 0.0 => Duration::from_secs_f64(1.0 / rate),
            _ => Duration::ZERO,
        }
    }
}

impl TaskTemplate {
    /// Returns `true` if the value is sent as a query parameter.
    pub fn is_query(&self) -> bool {
        self.query.is_some()
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if !self.path.starts_with('/') {
            return Err(format!("path '{}' must start with '/'", self.path));
        }
        if self.values.is_empty() {
            return Err("values must contain at least one entry".to_string());
        }
        let has_placeholder = self.path.contains(VALUE_PLACEHOLDER);
        match &self.query {
            Some(param) if param.trim().is_empty() => {
                Err("query parameter name must not be empty".to_string())
            },
            Some(_) if has_placeholder => Err(format!(
                "path must not contain {VALUE_PLACEHOLDER} when 'query' is set"
            )),
            None if !has_placeholder => Err(format!(
                "path must contain {VALUE_PLACEHOLDER} when 'query' is not set"
            )),
            _ => Ok(()),
        }
    }

    /// Relative request name for one value, as shown in statistics.
    pub fn request_name(&self, value: &ParamValue) -> String {
        match &self.query {
            Some(param) => format!("{}?{param}={value}", self.path),
            None => self.path.replace(VALUE_PLACEHOLDER, &value.to_string()),
        }
    }

    /// Render the absolute URL for one value against `base_url`.
    ///
    /// The path is appended to the base URL verbatim (a trailing `/` on the
    /// base is dropped), so a base with a path prefix keeps its prefix.
    pub fn render(&self, base_url: &str, value: &ParamValue) -> Result<Url, LoadTestError> {
        let path = match &self.query {
            Some(_) => self.path.clone(),
            None => self.path.replace(VALUE_PLACEHOLDER, &value.to_string()),
        };
        let raw = format!("{}{}", base_url.trim_end_matches('/'), path);
        let mut url = Url::parse(&raw).map_err(|e| LoadTestError::InvalidTarget {
            url: raw.clone(),
            message: e.to_string(),
        })?;
        if let Some(param) = &self.query {
            url.query_pairs_mut()
                .append_pair(param, &value.to_string());
        }
        Ok(url)
    }

    /// Render every value into an [`Endpoint`], preserving list order.
    pub fn endpoints(&self, base_url: &str) -> Result<Vec<Endpoint>, LoadTestError> {
        self.values
            .iter()
            .map(|value| {
                Ok(Endpoint {
                    name: self.request_name(value),
                    url: self.render(base_url, value)?,
                })
            })
            .collect()
    }
}

/// Check that `base_url` is an absolute http(s) URL with a host.
pub fn validate_base_url(base_url: &str) -> Result<Url, LoadTestError> {
    let url = Url::parse(base_url).map_err(|e| LoadTestError::InvalidTarget {
        url: base_url.to_string(),
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadTestError::InvalidTarget {
            url: base_url.to_string(),
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(LoadTestError::InvalidTarget {
            url: base_url.to_string(),
            message: "missing host".to_string(),
        });
    }
    Ok(url)
}
