//! Tag resolution: which declared index tags does an entity actually carry?

use std::collections::HashMap;

use crate::model::{AttributeSet, DicomAttribute, DicomTag, QueryTag};

/// Index tag to the concrete attribute it binds to
pub type ResolvedTags<'a> = HashMap<QueryTag, &'a DicomAttribute>;

/// Bind index tags to attributes of one entity
///
/// Standard tags are a direct containment check. Private tags are grouped by
/// path and bound in a single scan of the entity's attributes: an attribute
/// binds when its path matches a pending group and its VR equals the tag's
/// declared VR. Tags without a matching attribute are omitted; that is
/// "value absent", never an error.
///
/// Two private creators declaring the same path with the same VR both bind
/// to whichever attribute the entity carries at that path.
pub fn resolve<'a>(attributes: &'a AttributeSet, index_tags: &[QueryTag]) -> ResolvedTags<'a> {
    let mut resolved = HashMap::with_capacity(index_tags.len());
    let mut pending_private: HashMap<DicomTag, Vec<&QueryTag>> = HashMap::new();

    for tag in index_tags {
        if tag.tag.is_private() {
            pending_private.entry(tag.tag).or_default().push(tag);
        } else if let Some(attribute) = attributes.get(&tag.tag) {
            resolved.insert(tag.clone(), attribute);
        }
    }

    if pending_private.is_empty() {
        return resolved;
    }

    for attribute in attributes.iter().filter(|a| a.tag.is_private()) {
        let Some(candidates) = pending_private.get(&attribute.tag) else {
            continue;
        };
        for tag in candidates.iter().filter(|t| t.vr == attribute.vr) {
            resolved.insert((*tag).clone(), attribute);
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QueryTagLevel, QueryTagStatus, TagCatalogEntry, Vr};

    fn extended(key: i32, path: &str, vr: Vr, creator: Option<&str>) -> QueryTag {
        QueryTag::from_entry(&TagCatalogEntry {
            key,
            path: path.to_string(),
            vr,
            private_creator: creator.map(str::to_string),
            level: QueryTagLevel::Instance,
            status: QueryTagStatus::Ready,
        })
        .unwrap()
    }

    #[test]
    fn test_public_tag_binds_by_containment() {
        let attrs = AttributeSet::new()
            .with(DicomAttribute::new(DicomTag::new(0x0008, 0x0060), Vr::CS, "CT"));
        let modality = extended(1, "00080060", Vr::CS, None);
        let missing = extended(2, "00081030", Vr::LO, None);

        let resolved = resolve(&attrs, &[modality.clone(), missing.clone()]);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[&modality].first_value(), Some("CT"));
        assert!(!resolved.contains_key(&missing));
    }

    #[test]
    fn test_private_tag_requires_matching_vr() {
        let tag = DicomTag::new(0x0009, 0x1001);
        let attrs = AttributeSet::new()
            .with(DicomAttribute::new(tag, Vr::DS, "1.5").with_private_creator("ACME"));

        let as_ds = extended(1, "00091001", Vr::DS, Some("ACME"));
        let as_lo = extended(2, "00091001", Vr::LO, Some("OTHER"));

        let resolved = resolve(&attrs, &[as_ds.clone(), as_lo.clone()]);
        assert!(resolved.contains_key(&as_ds));
        assert!(!resolved.contains_key(&as_lo));
    }

    #[test]
    fn test_empty_inputs() {
        let attrs = AttributeSet::new();
        assert!(resolve(&attrs, &[]).is_empty());
        assert!(resolve(&attrs, &[extended(1, "00091001", Vr::DS, Some("A"))]).is_empty());
    }
}
