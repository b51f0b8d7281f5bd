// Channel identity and metadata
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A channel is unique per backend; `"backend/name"` is its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId {
    pub backend: String,
    pub name: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum ChannelIdError {
    #[error("channel id '{0}' is missing the backend separator '/'")]
    MissingSeparator(String),
    #[error("channel id '{0}' has an empty backend or name")]
    EmptyPart(String),
}

impl ChannelId {
    pub fn new(backend: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.backend, self.name)
    }
}

impl FromStr for ChannelId {
    type Err = ChannelIdError;

    // Backends never contain '/', channel names may.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (backend, name) = s
            .split_once('/')
            .ok_or_else(|| ChannelIdError::MissingSeparator(s.to_string()))?;
        if backend.is_empty() || name.is_empty() {
            return Err(ChannelIdError::EmptyPart(s.to_string()));
        }
        Ok(Self::new(backend, name))
    }
}

/// Declared value type of a channel, as reported by the query backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    #[serde(other)]
    Unknown,
}

impl DataType {
    pub fn is_string(&self) -> bool {
        matches!(self, DataType::String)
    }
}

/// Full channel metadata as returned by a backend's channel search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub backend: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub data_type: DataType,
    #[serde(default)]
    pub data_shape: Vec<u32>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl Channel {
    pub fn new(backend: impl Into<String>, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            backend: backend.into(),
            name: name.into(),
            description: None,
            data_type,
            data_shape: Vec::new(),
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn id(&self) -> ChannelId {
        ChannelId::new(self.backend.clone(), self.name.clone())
    }

    pub fn matches(&self, id: &ChannelId) -> bool {
        self.backend == id.backend && self.name == id.name
    }
}

/// Live status of a channel on its backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    pub connected: bool,
    pub recording: bool,
    #[serde(default)]
    pub latest_event_date: Option<String>,
}
