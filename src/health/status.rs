// src/health/status.rs
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Key reserved for the live status when a record is serialized.
pub const STATUS_KEY: &str = "status";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Status {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN")]
    Down,
    #[serde(rename = "OUT OF SERVICE")]
    OutOfService,
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Up => "UP",
            Status::Down => "DOWN",
            Status::OutOfService => "OUT OF SERVICE",
            Status::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One health outcome: a status plus an open bag of annotations.
///
/// Setters borrow mutably and hand the record back so calls can be chained:
///
/// ```
/// use health_aggregator::health::Health;
///
/// let mut health = Health::new();
/// health.down().add_info("code", 503).add_info("error", "timeout");
/// assert!(health.is_down());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Health {
    status: Status,
    info: Map<String, Value>,
}

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn up(&mut self) -> &mut Self {
        self.status = Status::Up;
        self
    }

    pub fn down(&mut self) -> &mut Self {
        self.status = Status::Down;
        self
    }

    pub fn out_of_service(&mut self) -> &mut Self {
        self.status = Status::OutOfService;
        self
    }

    pub fn unknown(&mut self) -> &mut Self {
        self.status = Status::Unknown;
        self
    }

    pub fn is_up(&self) -> bool {
        self.status == Status::Up
    }

    pub fn is_down(&self) -> bool {
        self.status == Status::Down
    }

    pub fn is_out_of_service(&self) -> bool {
        self.status == Status::OutOfService
    }

    pub fn is_unknown(&self) -> bool {
        self.status == Status::Unknown
    }

    /// Inserts an annotation, replacing any previous value under `key`.
    pub fn add_info(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.info.insert(key.into(), value.into());
        self
    }

    pub fn get_info(&self, key: &str) -> Option<&Value> {
        self.info.get(key)
    }

    pub fn info(&self) -> &Map<String, Value> {
        &self.info
    }
}

// Flat object: annotations first, the live status last. An annotation named
// "status" is skipped so it can never shadow the real one.
impl Serialize for Health {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let shadowed = usize::from(self.info.contains_key(STATUS_KEY));
        let mut map = serializer.serialize_map(Some(self.info.len() - shadowed + 1))?;
        for (key, value) in self.info.iter().filter(|(k, _)| k.as_str() != STATUS_KEY) {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(STATUS_KEY, &self.status)?;
        map.end()
    }
}

impl From<Health> for Value {
    fn from(health: Health) -> Self {
        let mut object = health.info;
        object.insert(STATUS_KEY.to_string(), Value::from(health.status.as_str()));
        Value::Object(object)
    }
}
