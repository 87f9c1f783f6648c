//! Intent to resource-bundle translation.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use edgeflow_core::{EdgeflowConfig, Intent, ServiceType};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{CompileError, CompileResult, CompileWarning};
use crate::resources::{ResourceBundle, SiteContext, build_bundle};

/// Output of one translation: a bundle per site plus any warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct Compilation {
    pub intent_id: String,
    /// RFC 3339 timestamp stamped into every resource.
    pub timestamp: String,
    /// Service type after alias resolution and fallback.
    pub service_type: ServiceType,
    /// Keyed and ordered by site name.
    pub bundles: BTreeMap<String, ResourceBundle>,
    pub warnings: Vec<CompileWarning>,
}

impl Compilation {
    /// Site names in bundle order.
    pub fn sites(&self) -> Vec<&str> {
        self.bundles.keys().map(String::as_str).collect()
    }

    /// Resources across every bundle.
    pub fn resource_count(&self) -> usize {
        self.bundles.values().map(|b| b.resources.len()).sum()
    }
}

/// Deterministic translator from intents to per-site bundles.
///
/// Given the same intent, configuration and timestamp, every call returns
/// identical bundles. The timestamp is the only input not derived from the
/// intent and is fixed at construction.
#[derive(Debug, Clone)]
pub struct IntentCompiler {
    config: EdgeflowConfig,
    timestamp: String,
}

impl IntentCompiler {
    pub fn new(config: EdgeflowConfig) -> Self {
        Self::with_timestamp(config, Utc::now())
    }

    pub fn with_timestamp(config: EdgeflowConfig, timestamp: DateTime<Utc>) -> Self {
        Self {
            config,
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    pub fn config(&self) -> &EdgeflowConfig {
        &self.config
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Parse and translate a raw intent document.
    pub fn translate_value(&self, document: Value) -> CompileResult<Compilation> {
        let intent = Intent::from_value(document)?;
        self.translate(&intent)
    }

    /// Translate an intent for the sites named by its `targetSite`.
    pub fn translate(&self, intent: &Intent) -> CompileResult<Compilation> {
        let sites = self.intent_targets(intent)?;
        let (service, warnings) = self.resolve_service(intent);
        self.compile(intent, service, warnings, &sites)
    }

    /// Sites an intent is compiled for when no explicit list is given: its
    /// `targetSite`, or the configured default for its service type.
    pub fn intent_targets(&self, intent: &Intent) -> CompileResult<Vec<String>> {
        let service = intent
            .service_type
            .as_deref()
            .and_then(ServiceType::resolve)
            .unwrap_or(ServiceType::Embb);
        let target = intent
            .target_site
            .as_deref()
            .unwrap_or_else(|| self.config.default_target(service));
        self.resolve_target(target)
    }

    /// Translate an intent for an explicit site list, ignoring its
    /// `targetSite`.
    pub fn translate_for(&self, intent: &Intent, sites: &[String]) -> CompileResult<Compilation> {
        let (service, warnings) = self.resolve_service(intent);
        let mut resolved = Vec::with_capacity(sites.len());
        for site in sites {
            resolved.extend(self.resolve_target(site)?);
        }
        resolved.sort();
        resolved.dedup();
        self.compile(intent, service, warnings, &resolved)
    }

    /// Expand a `targetSite` value to configured site names.
    pub fn resolve_target(&self, target: &str) -> CompileResult<Vec<String>> {
        if Intent::targets_all_sites(target) {
            return Ok(self.config.site_names());
        }
        if self.config.sites.contains_key(target) {
            return Ok(vec![target.to_string()]);
        }
        Err(CompileError::UnknownSite {
            site: target.to_string(),
            known: self.config.site_names().join(", "),
        })
    }

    fn resolve_service(&self, intent: &Intent) -> (ServiceType, Vec<CompileWarning>) {
        let Some(raw) = intent.service_type.as_deref() else {
            return (ServiceType::Embb, Vec::new());
        };
        match ServiceType::resolve(raw) {
            Some(service) => (service, Vec::new()),
            None => {
                let warning = CompileWarning::UnknownServiceType {
                    given: raw.to_string(),
                    fallback: ServiceType::Embb,
                };
                warn!(intent = %intent.id, "{warning}");
                (ServiceType::Embb, vec![warning])
            }
        }
    }

    fn compile(
        &self,
        intent: &Intent,
        service: ServiceType,
        warnings: Vec<CompileWarning>,
        sites: &[String],
    ) -> CompileResult<Compilation> {
        let profile = self
            .config
            .profile(service)
            .ok_or(CompileError::MissingProfile(service.key()))?;

        info!(intent = %intent.id, service = service.key(), sites = ?sites, "translating intent");

        let mut bundles = BTreeMap::new();
        for site in sites {
            let site_config = self.config.sites.get(site).ok_or_else(|| CompileError::UnknownSite {
                site: site.clone(),
                known: self.config.site_names().join(", "),
            })?;
            let ctx = SiteContext {
                intent,
                site,
                site_config,
                service,
                profile,
                config: &self.config,
                timestamp: &self.timestamp,
            };
            let bundle = build_bundle(&ctx)?;
            debug!(%site, resources = bundle.resources.len(), "generated bundle");
            bundles.insert(site.clone(), bundle);
        }

        let compilation = Compilation {
            intent_id: intent.id.clone(),
            timestamp: self.timestamp.clone(),
            service_type: service,
            bundles,
            warnings,
        };
        info!(
            intent = %intent.id,
            resources = compilation.resource_count(),
            sites = compilation.bundles.len(),
            "translation complete"
        );
        Ok(compilation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceKind;
    use chrono::TimeZone;
    use serde_json::json;

    fn compiler() -> IntentCompiler {
        let ts = Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap();
        IntentCompiler::with_timestamp(EdgeflowConfig::default(), ts)
    }

    fn intent(value: Value) -> Intent {
        Intent::from_value(value).unwrap()
    }

    fn rendered(c: &Compilation) -> Vec<(String, String)> {
        c.bundles
            .values()
            .flat_map(|b| b.render().unwrap())
            .map(|f| (f.file_name, f.contents))
            .collect()
    }

    #[test]
    fn both_expands_to_every_site_with_slice_in_low_latency_class() {
        let c = compiler()
            .translate(&intent(json!({
                "intentId": "i1",
                "serviceType": "enhanced-mobile-broadband",
                "targetSite": "both",
                "sla": { "latency": 5 },
            })))
            .unwrap();

        assert_eq!(c.sites(), vec!["edge1", "edge2"]);
        for bundle in c.bundles.values() {
            let slice = bundle.get(ResourceKind::NetworkSlice).unwrap();
            assert_eq!(slice.document["spec"]["qos"]["5qi"], 5);
            assert_eq!(slice.document["spec"]["sliceType"], "eMBB");
        }
        assert!(c.warnings.is_empty());
    }

    #[test]
    fn translation_is_deterministic() {
        let doc = json!({
            "intentId": "i2",
            "serviceType": "URLLC",
            "targetSite": "all",
            "sla": { "latency": 1, "availability": 99.999, "throughput": 50 },
        });
        let a = compiler().translate(&intent(doc.clone())).unwrap();
        let b = compiler().translate(&intent(doc)).unwrap();
        assert_eq!(rendered(&a), rendered(&b));
    }

    #[test]
    fn all_equals_union_of_single_sites() {
        let base = json!({ "intentId": "i3", "serviceType": "mMTC", "sla": { "connections": 5000 } });
        let with_target = |t: &str| {
            let mut doc = base.clone();
            doc["targetSite"] = json!(t);
            compiler().translate(&intent(doc)).unwrap()
        };

        let all = with_target("all");
        let edge1 = with_target("edge1");
        let edge2 = with_target("edge2");

        // The ConfigMap embeds the intent verbatim, including targetSite,
        // so compare the remaining resources.
        let strip = |b: &ResourceBundle| -> Vec<Value> {
            b.resources
                .iter()
                .filter(|r| r.kind != ResourceKind::ConfigMap)
                .map(|r| r.document.clone())
                .collect()
        };
        assert_eq!(strip(&all.bundles["edge1"]), strip(&edge1.bundles["edge1"]));
        assert_eq!(strip(&all.bundles["edge2"]), strip(&edge2.bundles["edge2"]));
        assert_eq!(edge1.bundles.len(), 1);
    }

    #[test]
    fn unknown_site_is_fatal() {
        let err = compiler()
            .translate(&intent(json!({ "intentId": "i4", "targetSite": "edge9" })))
            .unwrap_err();
        assert!(matches!(err, CompileError::UnknownSite { site, .. } if site == "edge9"));
    }

    #[test]
    fn unknown_service_type_falls_back_with_warning() {
        let c = compiler()
            .translate(&intent(json!({ "intentId": "i5", "serviceType": "holographic", "targetSite": "edge1" })))
            .unwrap();
        assert_eq!(c.service_type, ServiceType::Embb);
        assert_eq!(
            c.warnings,
            vec![CompileWarning::UnknownServiceType {
                given: "holographic".into(),
                fallback: ServiceType::Embb
            }]
        );
        let pr = c.bundles["edge1"].get(ResourceKind::ProvisioningRequest).unwrap();
        assert_eq!(pr.document["spec"]["resourceRequirements"]["cpu"], "8");
    }

    #[test]
    fn missing_id_aborts_translation() {
        let err = compiler()
            .translate_value(json!({ "serviceType": "eMBB" }))
            .unwrap_err();
        assert!(matches!(err, CompileError::MalformedIntent(_)));
    }

    #[test]
    fn path_like_id_aborts_translation() {
        for id in ["../../pwned", "edge/1", ".."] {
            let err = compiler()
                .translate_value(json!({ "intentId": id, "targetSite": "edge1" }))
                .unwrap_err();
            assert!(matches!(err, CompileError::MalformedIntent(_)), "{id}: {err}");
        }
    }

    #[test]
    fn missing_target_uses_service_default() {
        let mut config = EdgeflowConfig::default();
        config.defaults.target_site = "all".into();
        config.defaults.target_site_by_service.insert("urllc".into(), "edge1".into());
        let compiler = IntentCompiler::new(config);

        let urllc = intent(json!({ "intentId": "u1", "serviceType": "URLLC" }));
        assert_eq!(compiler.intent_targets(&urllc).unwrap(), vec!["edge1"]);
        assert_eq!(compiler.translate(&urllc).unwrap().sites(), vec!["edge1"]);

        let embb = intent(json!({ "intentId": "e1" }));
        assert_eq!(compiler.intent_targets(&embb).unwrap(), vec!["edge1", "edge2"]);

        let pinned = intent(json!({ "intentId": "u2", "serviceType": "URLLC", "targetSite": "edge2" }));
        assert_eq!(compiler.intent_targets(&pinned).unwrap(), vec!["edge2"]);
    }

    #[test]
    fn bundle_without_sla_has_no_slice() {
        let c = compiler()
            .translate(&intent(json!({ "intentId": "i6", "targetSite": "edge2" })))
            .unwrap();
        let bundle = &c.bundles["edge2"];
        let kinds: Vec<_> = bundle.resources.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::ProvisioningRequest,
                ResourceKind::ConfigMap,
                ResourceKind::Kustomization
            ]
        );
        let kust = bundle.get(ResourceKind::Kustomization).unwrap();
        assert_eq!(
            kust.document["resources"],
            json!(["i6-edge2-provisioning-request.yaml", "intent-i6-edge2-configmap.yaml"])
        );
    }

    #[test]
    fn config_map_embeds_intent_verbatim() {
        let doc = json!({ "intentId": "i7", "targetSite": "edge1", "custom": { "x": [1, 2] } });
        let c = compiler().translate(&intent(doc.clone())).unwrap();
        let cm = c.bundles["edge1"].get(ResourceKind::ConfigMap).unwrap();
        let embedded: Value =
            serde_json::from_str(cm.document["data"]["intent.json"].as_str().unwrap()).unwrap();
        assert_eq!(embedded, doc);
    }

    #[test]
    fn names_are_derived_from_intent_site_and_kind() {
        let c = compiler()
            .translate(&intent(json!({ "intentId": "i8", "targetSite": "all", "sla": {} })))
            .unwrap();
        let mut names: Vec<String> = c
            .bundles
            .values()
            .flat_map(|b| b.resources.iter().map(|r| r.name.clone()))
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total, "resource names collide across sites");
        assert!(names.contains(&"slice-i8-edge1".to_string()));
    }

    #[test]
    fn translate_for_overrides_target_site() {
        let c = compiler()
            .translate_for(
                &intent(json!({ "intentId": "i9", "targetSite": "edge1" })),
                &["edge2".to_string()],
            )
            .unwrap();
        assert_eq!(c.sites(), vec!["edge2"]);
    }

    #[test]
    fn timestamp_is_injected() {
        let c = compiler()
            .translate(&intent(json!({ "intentId": "i10", "targetSite": "edge1" })))
            .unwrap();
        let pr = c.bundles["edge1"].get(ResourceKind::ProvisioningRequest).unwrap();
        assert_eq!(pr.document["metadata"]["annotations"]["timestamp"], "2025-09-01T12:00:00Z");
    }
}
