//! The normalized service request consumed by the intent compiler.
//!
//! An [`Intent`] keeps the document it was parsed from so that downstream
//! artifacts can embed it verbatim for audit and replay.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// `targetSite` value that expands to every configured site.
pub const ALL_SITES: &str = "all";

/// Longest accepted `intentId`; resource names append a site suffix and
/// must stay within the 253-character object-name limit.
const MAX_ID_LEN: usize = 200;

/// Legacy spelling of [`ALL_SITES`] still emitted by older intent producers.
const BOTH_SITES: &str = "both";

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("failed to read intent {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("intent is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("intent must be a JSON object")]
    NotAnObject,

    #[error("intent is missing mandatory field `{0}`")]
    MissingField(String),

    #[error("intent field `{field}` is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Service category, which selects a resource-profile row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Embb,
    Urllc,
    Mmtc,
    Generic,
}

impl ServiceType {
    /// Resolve a service type from its short tag or long-form name.
    pub fn resolve(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "embb" | "enhanced-mobile-broadband" => Some(Self::Embb),
            "urllc" | "ultra-reliable-low-latency" => Some(Self::Urllc),
            "mmtc" | "massive-machine-type" => Some(Self::Mmtc),
            "generic" => Some(Self::Generic),
            _ => None,
        }
    }

    /// Key used for the `[profiles.<key>]` table in edgeflow.toml.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Embb => "embb",
            Self::Urllc => "urllc",
            Self::Mmtc => "mmtc",
            Self::Generic => "generic",
        }
    }

    /// Long-form name used in resource labels.
    pub fn canonical_name(&self) -> &'static str {
        match self {
            Self::Embb => "enhanced-mobile-broadband",
            Self::Urllc => "ultra-reliable-low-latency",
            Self::Mmtc => "massive-machine-type",
            Self::Generic => "generic",
        }
    }
}

/// Service-level requirements attached to an intent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sla {
    /// Availability in percent, e.g. `99.99`.
    pub availability: Option<f64>,
    /// Maximum latency in milliseconds.
    pub latency: Option<f64>,
    /// Minimum throughput in Mbps.
    pub throughput: Option<f64>,
    /// Maximum concurrent connections.
    pub connections: Option<u64>,
}

/// A parsed intent document.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    /// `intentId`, validated as a single path component.
    pub id: String,
    /// `serviceType` as written; resolved by the compiler, which falls back
    /// to eMBB with a warning when the value is unknown.
    pub service_type: Option<String>,
    /// `targetSite`: a site name, `all` or `both`. `None` defers to the
    /// configured default for the service type.
    pub target_site: Option<String>,
    /// `resourceProfile`, carried into resource labels.
    pub resource_profile: Option<String>,
    pub sla: Option<Sla>,
    /// Every top-level field not modelled above.
    pub raw_attributes: Map<String, Value>,
    document: Value,
}

impl Intent {
    /// Read and parse an intent JSON file.
    pub fn from_file(path: &Path) -> Result<Self, IntentError> {
        Self::from_value(Self::read_document(path)?)
    }

    /// Read a JSON document from `path` without interpreting it.
    pub fn read_document(path: &Path) -> Result<Value, IntentError> {
        let content = std::fs::read_to_string(path).map_err(|source| IntentError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Parse an intent from JSON text.
    pub fn from_json_str(s: &str) -> Result<Self, IntentError> {
        Self::from_value(serde_json::from_str(s)?)
    }

    /// Build an intent from a JSON document.
    ///
    /// Only `intentId` is mandatory. `sla` must be an object when present;
    /// its numeric fields are validated individually.
    pub fn from_value(document: Value) -> Result<Self, IntentError> {
        let object = document.as_object().ok_or(IntentError::NotAnObject)?;

        let id = match object.get("intentId") {
            Some(Value::String(id)) if !id.trim().is_empty() => {
                check_id(id)?;
                id.clone()
            }
            Some(Value::String(_)) | None | Some(Value::Null) => {
                return Err(IntentError::MissingField("intentId".to_string()));
            }
            Some(other) => {
                return Err(IntentError::InvalidField {
                    field: "intentId",
                    reason: format!("expected a string, got {other}"),
                });
            }
        };

        let sla = match object.get("sla") {
            None | Some(Value::Null) => None,
            Some(value @ Value::Object(_)) => Some(
                serde_json::from_value::<Sla>(value.clone()).map_err(|e| {
                    IntentError::InvalidField {
                        field: "sla",
                        reason: e.to_string(),
                    }
                })?,
            ),
            Some(other) => {
                return Err(IntentError::InvalidField {
                    field: "sla",
                    reason: format!("expected an object, got {other}"),
                });
            }
        };

        let raw_attributes = object
            .iter()
            .filter(|(k, _)| {
                !matches!(
                    k.as_str(),
                    "intentId" | "serviceType" | "targetSite" | "resourceProfile" | "sla"
                )
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            id,
            service_type: string_field(object, "serviceType")?,
            target_site: string_field(object, "targetSite")?,
            resource_profile: string_field(object, "resourceProfile")?,
            sla,
            raw_attributes,
            document,
        })
    }

    /// The document this intent was parsed from, unchanged.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Top-level fields from `required` that the document lacks.
    pub fn missing_fields<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|field| self.document.get(field.as_str()).is_none())
            .map(String::as_str)
            .collect()
    }

    /// Whether `targetSite` names every configured site.
    pub fn targets_all_sites(target: &str) -> bool {
        target == ALL_SITES || target == BOTH_SITES
    }
}

/// `intentId` ends up in resource and file names, so it must be a single
/// path component: ASCII alphanumerics plus `-`, `_` and `.`, starting with
/// an alphanumeric and never containing `..`.
fn check_id(id: &str) -> Result<(), IntentError> {
    let invalid = |reason: &str| IntentError::InvalidField {
        field: "intentId",
        reason: format!("{id:?} {reason}"),
    };
    if !id.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid("must start with a letter or digit"));
    }
    if let Some(c) = id.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))) {
        return Err(invalid(&format!("contains {c:?}")));
    }
    if id.contains("..") {
        return Err(invalid("contains `..`"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(invalid(&format!("is longer than {MAX_ID_LEN} characters")));
    }
    Ok(())
}

fn string_field(object: &Map<String, Value>, field: &'static str) -> Result<Option<String>, IntentError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(IntentError::InvalidField {
            field,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_fields_and_keeps_the_rest() {
        let intent = Intent::from_value(json!({
            "intentId": "i1",
            "serviceType": "eMBB",
            "targetSite": "edge1",
            "sla": { "latency": 5, "availability": 99.9 },
            "intentExpectations": [{ "id": "e1" }],
        }))
        .unwrap();

        assert_eq!(intent.id, "i1");
        assert_eq!(intent.service_type.as_deref(), Some("eMBB"));
        assert_eq!(intent.sla.as_ref().unwrap().latency, Some(5.0));
        assert!(intent.raw_attributes.contains_key("intentExpectations"));
        assert!(!intent.raw_attributes.contains_key("intentId"));
    }

    #[test]
    fn missing_id_is_rejected() {
        let err = Intent::from_value(json!({ "serviceType": "eMBB" })).unwrap_err();
        assert!(matches!(err, IntentError::MissingField(f) if f == "intentId"));

        let err = Intent::from_value(json!({ "intentId": "  " })).unwrap_err();
        assert!(matches!(err, IntentError::MissingField(_)));
    }

    #[test]
    fn path_like_ids_are_rejected() {
        for id in ["../../pwned", "a/b", "a\\b", ".hidden", "x..y", "edge 1", "-lead"] {
            let err = Intent::from_value(json!({ "intentId": id })).unwrap_err();
            assert!(
                matches!(err, IntentError::InvalidField { field: "intentId", .. }),
                "{id} accepted"
            );
        }
        let err = Intent::from_value(json!({ "intentId": "a".repeat(MAX_ID_LEN + 1) })).unwrap_err();
        assert!(matches!(err, IntentError::InvalidField { field: "intentId", .. }));
    }

    #[test]
    fn conventional_ids_are_accepted() {
        for id in ["i1", "intent_123456", "test-intent-001", "Intent.v2"] {
            assert_eq!(Intent::from_value(json!({ "intentId": id })).unwrap().id, id);
        }
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(matches!(
            Intent::from_value(json!(["i1"])).unwrap_err(),
            IntentError::NotAnObject
        ));
    }

    #[test]
    fn malformed_sla_is_rejected() {
        let err = Intent::from_value(json!({ "intentId": "i1", "sla": "fast" })).unwrap_err();
        assert!(matches!(err, IntentError::InvalidField { field: "sla", .. }));

        let err = Intent::from_value(json!({ "intentId": "i1", "sla": { "latency": "low" } }))
            .unwrap_err();
        assert!(matches!(err, IntentError::InvalidField { field: "sla", .. }));
    }

    #[test]
    fn service_type_aliases() {
        assert_eq!(ServiceType::resolve("enhanced-mobile-broadband"), Some(ServiceType::Embb));
        assert_eq!(ServiceType::resolve("URLLC"), Some(ServiceType::Urllc));
        assert_eq!(ServiceType::resolve("massive-machine-type"), Some(ServiceType::Mmtc));
        assert_eq!(ServiceType::resolve("generic"), Some(ServiceType::Generic));
        assert_eq!(ServiceType::resolve("holographic"), None);
    }

    #[test]
    fn missing_required_fields() {
        let intent = Intent::from_value(json!({ "intentId": "i1" })).unwrap();
        let required = vec!["intentId".to_string(), "intentExpectations".to_string()];
        assert_eq!(intent.missing_fields(&required), vec!["intentExpectations"]);
    }

    #[test]
    fn both_is_an_alias_for_all() {
        assert!(Intent::targets_all_sites("all"));
        assert!(Intent::targets_all_sites("both"));
        assert!(!Intent::targets_all_sites("edge1"));
    }
}
