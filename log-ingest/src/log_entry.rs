use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One entry as returned by the logging backend's `entries:list` call.
///
/// Field names follow the REST representation (camelCase). Payload variants are
/// kept as separate optional fields because the backend only ever sets one of
/// them; use [`LogEntry::payload`] to get at whichever is present.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub log_name: String,

    #[serde(default)]
    pub text_payload: Option<String>,

    #[serde(default)]
    pub json_payload: Option<Map<String, Value>>,

    #[serde(default)]
    pub proto_payload: Option<Value>,

    #[serde(default)]
    pub insert_id: String,

    #[serde(default)]
    pub resource: Option<MonitoredResource>,

    #[serde(default)]
    pub http_request: Option<HttpRequest>,

    #[serde(default)]
    pub trace: String,

    #[serde(default)]
    pub span_id: String,

    #[serde(default)]
    pub source_location: Option<SourceLocation>,

    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
}

/// Borrowed view over whichever payload the entry carries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload<'a> {
    Text(&'a str),
    Json(&'a Map<String, Value>),
    Proto(&'a Value),
    None,
}

impl LogEntry {
    pub fn payload(&self) -> Payload<'_> {
        if let Some(text) = &self.text_payload {
            Payload::Text(text)
        } else if let Some(json) = &self.json_payload {
            Payload::Json(json)
        } else if let Some(proto) = &self.proto_payload {
            Payload::Proto(proto)
        } else {
            Payload::None
        }
    }

    pub fn resource_type(&self) -> &str {
        self.resource.as_ref().map_or("", |r| r.resource_type.as_str())
    }

    pub fn resource_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.resource.as_ref().and_then(|r| r.labels.as_ref())
    }

    /// The Cloud Run service that emitted this entry, or empty if the resource
    /// carries no `service_name` label.
    pub fn service_name(&self) -> &str {
        self.resource_labels()
            .and_then(|labels| labels.get("service_name"))
            .map_or("", String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MonitoredResource {
    #[serde(rename = "type", default)]
    pub resource_type: String,

    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
}

/// Entry severity. Codes outside the known set are kept as `Other` and
/// rendered as their decimal value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    #[default]
    Default,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
    Other(i64),
}

impl Severity {
    const KNOWN: [Severity; 9] = [
        Severity::Default,
        Severity::Debug,
        Severity::Info,
        Severity::Notice,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
        Severity::Alert,
        Severity::Emergency,
    ];

    pub fn name(&self) -> Option<&'static str> {
        match self {
            Severity::Default => Some("DEFAULT"),
            Severity::Debug => Some("DEBUG"),
            Severity::Info => Some("INFO"),
            Severity::Notice => Some("NOTICE"),
            Severity::Warning => Some("WARNING"),
            Severity::Error => Some("ERROR"),
            Severity::Critical => Some("CRITICAL"),
            Severity::Alert => Some("ALERT"),
            Severity::Emergency => Some("EMERGENCY"),
            Severity::Other(_) => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Severity::Default => 0,
            Severity::Debug => 100,
            Severity::Info => 200,
            Severity::Notice => 300,
            Severity::Warning => 400,
            Severity::Error => 500,
            Severity::Critical => 600,
            Severity::Alert => 700,
            Severity::Emergency => 800,
            Severity::Other(code) => *code,
        }
    }

    pub fn from_code(code: i64) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|s| s.code() == code)
            .unwrap_or(Severity::Other(code))
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::KNOWN
            .into_iter()
            .find(|s| s.name().is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.code()),
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Code(i64),
        }

        // Names outside the enum are not valid JSON for it; codes always are.
        match Repr::deserialize(deserializer)? {
            Repr::Name(name) => Severity::from_name(&name).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown log severity: {name}"))
            }),
            Repr::Code(code) => Ok(Severity::from_code(code)),
        }
    }
}

/// HTTP request metadata attached to an entry.
///
/// Serialization uses the proto field names and always emits every field,
/// 64-bit integers as decimal strings, matching the proto3 JSON mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRequest {
    #[serde(alias = "requestMethod")]
    pub request_method: String,
    #[serde(alias = "requestUrl")]
    pub request_url: String,
    #[serde(alias = "requestSize", with = "int64_string")]
    pub request_size: i64,
    pub status: i32,
    #[serde(alias = "responseSize", with = "int64_string")]
    pub response_size: i64,
    #[serde(alias = "userAgent")]
    pub user_agent: String,
    #[serde(alias = "remoteIp")]
    pub remote_ip: String,
    #[serde(alias = "serverIp")]
    pub server_ip: String,
    pub referer: String,
    // Duration in its JSON form ("0.25s"); null when unset.
    pub latency: Option<String>,
    #[serde(alias = "cacheLookup")]
    pub cache_lookup: bool,
    #[serde(alias = "cacheHit")]
    pub cache_hit: bool,
    #[serde(alias = "cacheValidatedWithOriginServer")]
    pub cache_validated_with_origin_server: bool,
    #[serde(alias = "cacheFillBytes", with = "int64_string")]
    pub cache_fill_bytes: i64,
    pub protocol: String,
}

impl HttpRequest {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceLocation {
    pub file: String,
    #[serde(with = "int64_string")]
    pub line: i64,
    pub function: String,
}

impl SourceLocation {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// proto3 renders int64 as a JSON string but accepts either form when parsing.
mod int64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(i64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
