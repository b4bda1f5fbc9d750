//! Resource-type tokens and resource-string parsing.
//!
//! A resource string has the shape `<namespace>/<type>[/<name>]`. The
//! middle segment is the record type stored alongside every record.

use std::fmt;
use std::str::FromStr;

/// Segment separator inside resource strings.
pub const RESOURCE_SEP: char = '/';

/// The closed set of object kinds carried by the edge node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    ConfigMap,
    Secret,
    PersistentVolume,
    PersistentVolumeClaim,
    VolumeAttachment,
    Node,
    NodeStatus,
    Pod,
    PodStatus,
    Lease,
    ServiceAccountToken,
    CertificateSigningRequest,
    Event,
}

impl ResourceType {
    pub const ALL: [ResourceType; 13] = [
        ResourceType::ConfigMap,
        ResourceType::Secret,
        ResourceType::PersistentVolume,
        ResourceType::PersistentVolumeClaim,
        ResourceType::VolumeAttachment,
        ResourceType::Node,
        ResourceType::NodeStatus,
        ResourceType::Pod,
        ResourceType::PodStatus,
        ResourceType::Lease,
        ResourceType::ServiceAccountToken,
        ResourceType::CertificateSigningRequest,
        ResourceType::Event,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::ConfigMap => "configmap",
            ResourceType::Secret => "secret",
            ResourceType::PersistentVolume => "persistent-volume",
            ResourceType::PersistentVolumeClaim => "persistent-volume-claim",
            ResourceType::VolumeAttachment => "volume-attachment",
            ResourceType::Node => "node",
            ResourceType::NodeStatus => "node-status",
            ResourceType::Pod => "pod",
            ResourceType::PodStatus => "pod-status",
            ResourceType::Lease => "lease",
            ResourceType::ServiceAccountToken => "service-account-token",
            ResourceType::CertificateSigningRequest => "certificate-signing-request",
            ResourceType::Event => "event",
        }
    }

    /// Types whose stale local copy is unacceptable for pod admission.
    /// Queries for these go to the cloud when the local cache misses.
    pub fn requires_remote_query(&self) -> bool {
        matches!(
            self,
            ResourceType::ConfigMap
                | ResourceType::Secret
                | ResourceType::PersistentVolume
                | ResourceType::PersistentVolumeClaim
                | ResourceType::VolumeAttachment
                | ResourceType::Node
                | ResourceType::ServiceAccountToken
        )
    }

    /// Types that always go to the cloud, even on a cache hit.
    pub fn always_fresh(&self) -> bool {
        matches!(self, ResourceType::Node | ResourceType::VolumeAttachment)
    }

    /// Build `<namespace>/<type>[/<name>]`.
    pub fn resource(&self, namespace: &str, name: &str) -> String {
        if name.is_empty() {
            format!("{namespace}{RESOURCE_SEP}{}", self.as_str())
        } else {
            format!("{namespace}{RESOURCE_SEP}{}{RESOURCE_SEP}{name}", self.as_str())
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resource type `{0}`")]
pub struct UnknownResourceType(pub String);

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownResourceType(s.to_string()))
    }
}

/// Result of splitting a resource string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedResource {
    /// The full resource string, used verbatim as the record key.
    pub key: String,
    /// Middle segment; empty when the string is illegal.
    pub res_type: String,
    /// Trailing name segment; empty for type-wide resources.
    pub res_id: String,
}

impl ParsedResource {
    pub fn is_legal(&self) -> bool {
        !self.res_type.is_empty()
    }

    pub fn namespace(&self) -> &str {
        self.key.split(RESOURCE_SEP).next().unwrap_or_default()
    }

    pub fn resource_type(&self) -> Option<ResourceType> {
        self.res_type.parse().ok()
    }

    pub fn is(&self, ty: ResourceType) -> bool {
        self.res_type == ty.as_str()
    }
}

/// Split a resource string into `(key, type, id)`.
///
/// Two segments give a type-wide key, three segments name a single
/// object. Any other shape yields empty `res_type` and `res_id`.
pub fn parse_resource(resource: &str) -> ParsedResource {
    let tokens: Vec<&str> = resource.split(RESOURCE_SEP).collect();
    let (res_type, res_id) = match tokens.as_slice() {
        [_, ty] => (*ty, ""),
        [_, ty, id] => (*ty, *id),
        _ => ("", ""),
    };
    ParsedResource {
        key: resource.to_string(),
        res_type: res_type.to_string(),
        res_id: res_id.to_string(),
    }
}

/// Key of the pod a pod-status key mirrors.
pub fn pod_key_for_status(status_key: &str) -> String {
    mirror_key(status_key, ResourceType::PodStatus, ResourceType::Pod)
}

/// Key of the pod-status record that mirrors a pod key.
pub fn status_key_for_pod(pod_key: &str) -> String {
    mirror_key(pod_key, ResourceType::Pod, ResourceType::PodStatus)
}

fn mirror_key(key: &str, from: ResourceType, to: ResourceType) -> String {
    let from = format!("{RESOURCE_SEP}{}{RESOURCE_SEP}", from.as_str());
    let to = format!("{RESOURCE_SEP}{}{RESOURCE_SEP}", to.as_str());
    key.replacen(&from, &to, 1)
}
