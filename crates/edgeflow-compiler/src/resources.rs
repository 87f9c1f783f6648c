//! KRM resource documents generated for one site.
//!
//! Documents are built as `serde_json::Value` objects. Their maps are
//! key-sorted, which makes the YAML rendering of a bundle a pure function of
//! its inputs.

use edgeflow_core::{EdgeflowConfig, Intent, ServiceProfile, ServiceType, SiteConfig};
use serde_json::{Value, json};

use crate::error::{CompileError, CompileResult};
use crate::sla;

/// The four resource kinds a bundle can contain, in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    ProvisioningRequest,
    ConfigMap,
    NetworkSlice,
    Kustomization,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProvisioningRequest => "ProvisioningRequest",
            Self::ConfigMap => "ConfigMap",
            Self::NetworkSlice => "NetworkSlice",
            Self::Kustomization => "Kustomization",
        }
    }

    /// Deterministic resource name for `(intent, site, kind)`.
    pub fn resource_name(&self, intent_id: &str, site: &str) -> String {
        match self {
            Self::ProvisioningRequest => format!("{intent_id}-{site}"),
            Self::ConfigMap => format!("intent-{intent_id}-{site}"),
            Self::NetworkSlice => format!("slice-{intent_id}-{site}"),
            Self::Kustomization => format!("kustomization-{intent_id}-{site}"),
        }
    }

    /// File name the resource is written to inside its site directory.
    pub fn file_name(&self, resource_name: &str) -> String {
        match self {
            Self::ProvisioningRequest => format!("{resource_name}-provisioning-request.yaml"),
            Self::ConfigMap => format!("{resource_name}-configmap.yaml"),
            Self::NetworkSlice => format!("{resource_name}-networkslice.yaml"),
            Self::Kustomization => "kustomization.yaml".to_string(),
        }
    }
}

/// One typed resource document.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub kind: ResourceKind,
    pub name: String,
    pub document: Value,
}

impl Resource {
    pub fn file_name(&self) -> String {
        self.kind.file_name(&self.name)
    }

    pub fn to_yaml(&self) -> CompileResult<String> {
        serde_yaml::to_string(&self.document).map_err(|source| CompileError::Render {
            name: self.name.clone(),
            source,
        })
    }
}

/// A file ready to be written into a site directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub file_name: String,
    pub kind: ResourceKind,
    pub contents: String,
}

/// Every resource generated for exactly one site.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBundle {
    pub site: String,
    pub resources: Vec<Resource>,
}

impl ResourceBundle {
    pub fn get(&self, kind: ResourceKind) -> Option<&Resource> {
        self.resources.iter().find(|r| r.kind == kind)
    }

    /// Render every resource to YAML, in bundle order.
    pub fn render(&self) -> CompileResult<Vec<RenderedFile>> {
        self.resources
            .iter()
            .map(|r| {
                Ok(RenderedFile {
                    file_name: r.file_name(),
                    kind: r.kind,
                    contents: r.to_yaml()?,
                })
            })
            .collect()
    }
}

/// Inputs for generating one site's bundle.
pub(crate) struct SiteContext<'a> {
    pub intent: &'a Intent,
    pub site: &'a str,
    pub site_config: &'a SiteConfig,
    pub service: ServiceType,
    pub profile: &'a ServiceProfile,
    pub config: &'a EdgeflowConfig,
    pub timestamp: &'a str,
}

impl SiteContext<'_> {
    fn name(&self, kind: ResourceKind) -> String {
        kind.resource_name(&self.intent.id, self.site)
    }

    fn labels(&self) -> Value {
        json!({
            "intent-id": self.intent.id,
            "service-type": self.service.canonical_name(),
            "target-site": self.site,
        })
    }
}

pub(crate) fn build_bundle(ctx: &SiteContext<'_>) -> CompileResult<ResourceBundle> {
    let mut resources = vec![provisioning_request(ctx), intent_config_map(ctx)?];
    if ctx.intent.sla.is_some() {
        resources.push(network_slice(ctx));
    }
    resources.push(kustomization(ctx, &resources));

    Ok(ResourceBundle {
        site: ctx.site.to_string(),
        resources,
    })
}

fn provisioning_request(ctx: &SiteContext<'_>) -> Resource {
    let kind = ResourceKind::ProvisioningRequest;
    let name = ctx.name(kind);
    let site = ctx.site_config;

    let mut spec = json!({
        "description": format!(
            "Provisioning request for {} service at {}",
            ctx.service.canonical_name(),
            ctx.site
        ),
        "networkConfig": {
            "gnbId": site.gnb_id,
            "networkProfile": ctx.profile.network_profile,
            "plmnId": site.plmn_id,
            "sliceType": ctx.profile.slice_type,
            "tac": site.tac,
        },
        "resourceRequirements": {
            "cpu": ctx.profile.cpu,
            "memory": ctx.profile.memory,
            "storage": ctx.profile.storage,
        },
        "targetCluster": site.cluster,
    });
    if let Some(sla) = &ctx.intent.sla {
        spec["slaRequirements"] = sla::sla_requirements(sla);
    }

    let document = json!({
        "apiVersion": "o2ims.provisioning.oran.org/v1alpha1",
        "kind": kind.as_str(),
        "metadata": {
            "annotations": {
                "generated-by": "edgeflow-compiler",
                "resource-profile": ctx.intent.resource_profile.as_deref().unwrap_or("standard"),
                "timestamp": ctx.timestamp,
            },
            "labels": ctx.labels(),
            "name": name,
            "namespace": site.namespace,
        },
        "spec": spec,
    });

    Resource { kind, name, document }
}

fn intent_config_map(ctx: &SiteContext<'_>) -> CompileResult<Resource> {
    let kind = ResourceKind::ConfigMap;
    let name = ctx.name(kind);

    let document = json!({
        "apiVersion": "v1",
        "kind": kind.as_str(),
        "data": {
            "intent.json": serde_json::to_string_pretty(ctx.intent.document())?,
            "serviceType": ctx.intent.service_type.as_deref().unwrap_or("unknown"),
            "site": ctx.site,
        },
        "metadata": {
            "labels": {
                "intent-id": ctx.intent.id,
                "target-site": ctx.site,
            },
            "name": name,
            "namespace": ctx.site_config.namespace,
        },
    });

    Ok(Resource { kind, name, document })
}

fn network_slice(ctx: &SiteContext<'_>) -> Resource {
    let kind = ResourceKind::NetworkSlice;
    let name = ctx.name(kind);
    let plmn = ctx.site_config.plmn_id.as_str();
    let (mcc, mnc) = plmn.split_at_checked(3).unwrap_or((plmn, ""));

    let mut spec = json!({
        "plmn": { "mcc": mcc, "mnc": mnc },
        "sliceType": ctx.profile.slice_type,
    });
    if let Some(sla) = &ctx.intent.sla {
        spec["qos"] = sla::qos_parameters(sla, &ctx.config.qos);
    }

    let document = json!({
        "apiVersion": "workload.nephio.org/v1alpha1",
        "kind": kind.as_str(),
        "metadata": {
            "labels": ctx.labels(),
            "name": name,
            "namespace": ctx.site_config.namespace,
        },
        "spec": spec,
    });

    Resource { kind, name, document }
}

/// Grouping manifest listing every other resource in the bundle.
fn kustomization(ctx: &SiteContext<'_>, members: &[Resource]) -> Resource {
    let kind = ResourceKind::Kustomization;
    let name = ctx.name(kind);

    let mut files: Vec<String> = members.iter().map(Resource::file_name).collect();
    files.sort();

    let document = json!({
        "apiVersion": "kustomize.config.k8s.io/v1beta1",
        "kind": kind.as_str(),
        "commonLabels": {
            "intent-id": ctx.intent.id,
            "target-site": ctx.site,
        },
        "metadata": {
            "annotations": { "config.kubernetes.io/local-config": "true" },
            "name": name,
        },
        "namespace": ctx.site_config.namespace,
        "resources": files,
    });

    Resource { kind, name, document }
}
