//! Tag attachment shared by every taggable resource kind.

use std::collections::BTreeSet;

use super::types::{ApiAction, ApiRequest, QingCloudOperation};

/// A tag bound to one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTagPair {
    /// Tag ID.
    pub tag_id: String,
    /// Resource type, e.g. `instance` or `cache`.
    pub resource_type: &'static str,
    /// Resource ID.
    pub resource_id: String,
}

/// Attaches tags to resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachTags {
    /// Pairs to attach.
    pub pairs: Vec<ResourceTagPair>,
}

/// Detaches tags from resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachTags {
    /// Pairs to detach.
    pub pairs: Vec<ResourceTagPair>,
}

fn with_pairs(mut request: ApiRequest, pairs: &[ResourceTagPair]) -> ApiRequest {
    for (index, pair) in pairs.iter().enumerate() {
        let prefix = format!("resource_tag_pairs.{}", index + 1);
        request = request
            .with(&format!("{prefix}.tag_id"), &pair.tag_id)
            .with(&format!("{prefix}.resource_type"), pair.resource_type)
            .with(&format!("{prefix}.resource_id"), &pair.resource_id);
    }
    request
}

impl ApiAction for AttachTags {
    const ACTION: &'static str = "AttachTags";

    fn to_request(&self) -> ApiRequest {
        with_pairs(ApiRequest::new(Self::ACTION), &self.pairs)
    }
}

impl ApiAction for DetachTags {
    const ACTION: &'static str = "DetachTags";

    fn to_request(&self) -> ApiRequest {
        with_pairs(ApiRequest::new(Self::ACTION), &self.pairs)
    }
}

/// Calls that move the live tag set to the desired one: detach the extra
/// tags first, then attach the missing ones.
#[must_use]
pub fn tag_operations(
    resource_type: &'static str,
    resource_id: &str,
    desired: &BTreeSet<String>,
    live: &BTreeSet<String>,
) -> Vec<QingCloudOperation> {
    let pairs = |tags: Vec<&String>| -> Vec<ResourceTagPair> {
        tags.into_iter()
            .map(|tag_id| ResourceTagPair {
                tag_id: tag_id.clone(),
                resource_type,
                resource_id: resource_id.to_string(),
            })
            .collect()
    };

    let removed = pairs(live.difference(desired).collect());
    let added = pairs(desired.difference(live).collect());

    let mut operations = Vec::new();
    if !removed.is_empty() {
        operations.push(QingCloudOperation::immediate(&DetachTags { pairs: removed }));
    }
    if !added.is_empty() {
        operations.push(QingCloudOperation::immediate(&AttachTags { pairs: added }));
    }
    operations
}
