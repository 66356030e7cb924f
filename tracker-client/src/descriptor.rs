//! Externally supplied descriptors: the platform's application descriptor and
//! the operator's optional overrides.

use serde_json::{Map, Value};
use std::fs::File;
use std::io;
use std::path::Path;

/// Platform provided JSON application descriptor.
pub const APPLICATION_ENV: &str = "VCAP_APPLICATION";

/// Operator provided JSON override descriptor.
pub const OVERRIDE_ENV: &str = "DEPLOYMENT_TRACKER";

const APPLICATION_NAME: &str = "application_name";
const APPLICATION_VERSION: &str = "application_version";
const APPLICATION_URIS: &str = "application_uris";
const SPACE_ID: &str = "space_id";
const APPLICATION_ID: &str = "application_id";
const INSTANCE_INDEX: &str = "instance_index";

const REPOSITORY_URL: &str = "repository_url";
const CODE_VERSION: &str = "code_version";
const CUSTOM_TRACKER_URL: &str = "custom_tracker_url";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("VCAP_APPLICATION is not set")]
    Absent,
    #[error("descriptor is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("descriptor is not a JSON object")]
    NotAnObject,
    #[error("application descriptor is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("override `{0}` must be a string")]
    InvalidOverride(&'static str),
    #[error("could not read override file: {0}")]
    Io(#[from] io::Error),
    #[error("override file is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    /// Short, stable label used to tag metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::Absent => "absent",
            ConfigError::Malformed(_) | ConfigError::NotAnObject | ConfigError::Yaml(_) => {
                "malformed"
            }
            ConfigError::MissingField(_) => "missing_field",
            ConfigError::InvalidOverride(_) => "invalid_override",
            ConfigError::Io(_) => "io",
        }
    }
}

/// Raw descriptor strings as found in the environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Descriptors {
    pub application: Option<String>,
    pub overrides: Option<String>,
}

impl Descriptors {
    pub fn from_env() -> Self {
        Descriptors {
            application: std::env::var(APPLICATION_ENV).ok(),
            overrides: std::env::var(OVERRIDE_ENV).ok(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationDescriptor {
    pub application_name: String,
    pub application_version: String,
    pub application_uris: Vec<String>,
    pub space_id: String,
    // Only shown on the status page, never sent.
    pub application_id: Option<String>,
    pub instance_index: Option<u64>,
}

impl ApplicationDescriptor {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(obj) = value else {
            return Err(ConfigError::NotAnObject);
        };

        Ok(ApplicationDescriptor {
            application_name: required_str(&obj, APPLICATION_NAME)?,
            application_version: required_str(&obj, APPLICATION_VERSION)?,
            application_uris: required_str_list(&obj, APPLICATION_URIS)?,
            space_id: required_str(&obj, SPACE_ID)?,
            application_id: obj
                .get(APPLICATION_ID)
                .and_then(Value::as_str)
                .map(str::to_owned),
            instance_index: obj.get(INSTANCE_INDEX).and_then(Value::as_u64),
        })
    }
}

fn required_str(obj: &Map<String, Value>, field: &'static str) -> Result<String, ConfigError> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(ConfigError::MissingField(field))
}

fn required_str_list(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Vec<String>, ConfigError> {
    let items = obj
        .get(field)
        .and_then(Value::as_array)
        .ok_or(ConfigError::MissingField(field))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .ok_or(ConfigError::MissingField(field))
        })
        .collect()
}

/// The operator overrides that are trusted. Anything else in an override
/// descriptor is dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    pub repository_url: Option<String>,
    pub code_version: Option<String>,
    /// Routing metadata only, never part of the payload.
    pub custom_tracker_url: Option<String>,
}

impl Overrides {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Loads overrides from a packaged YAML file. A missing file is not an error.
    pub fn from_yaml_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_yaml::from_reader(file)?;
        Self::from_value(value).map(Some)
    }

    /// Keys are matched case-insensitively against the allow-list.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let map = match value {
            Value::Object(map) => map,
            Value::Null => return Ok(Overrides::default()),
            _ => return Err(ConfigError::NotAnObject),
        };

        let mut overrides = Overrides::default();
        for (key, value) in map {
            let (slot, field) = if key.eq_ignore_ascii_case(REPOSITORY_URL) {
                (&mut overrides.repository_url, REPOSITORY_URL)
            } else if key.eq_ignore_ascii_case(CODE_VERSION) {
                (&mut overrides.code_version, CODE_VERSION)
            } else if key.eq_ignore_ascii_case(CUSTOM_TRACKER_URL) {
                (&mut overrides.custom_tracker_url, CUSTOM_TRACKER_URL)
            } else {
                tracing::debug!(key = %key, "ignoring unrecognized override");
                continue;
            };

            match value {
                Value::String(s) => *slot = Some(s),
                Value::Null => {}
                _ => return Err(ConfigError::InvalidOverride(field)),
            }
        }

        Ok(overrides)
    }

    /// Combines two override sets. Values present in `other` win.
    pub fn merge(self, other: Overrides) -> Overrides {
        Overrides {
            repository_url: other.repository_url.or(self.repository_url),
            code_version: other.code_version.or(self.code_version),
            custom_tracker_url: other.custom_tracker_url.or(self.custom_tracker_url),
        }
    }
}
