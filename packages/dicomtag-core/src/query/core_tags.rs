//! Attributes the host store always indexes

use once_cell::sync::Lazy;

use crate::model::{DicomTag, QueryTag, QueryTagLevel, Vr};

struct CoreTagDef {
    keyword: &'static str,
    tag: DicomTag,
    vr: Vr,
    level: QueryTagLevel,
    range_queryable: bool,
}

const CORE_TAG_DEFS: &[CoreTagDef] = &[
    CoreTagDef {
        keyword: "StudyInstanceUID",
        tag: DicomTag::new(0x0020, 0x000D),
        vr: Vr::UI,
        level: QueryTagLevel::Study,
        range_queryable: false,
    },
    CoreTagDef {
        keyword: "SeriesInstanceUID",
        tag: DicomTag::new(0x0020, 0x000E),
        vr: Vr::UI,
        level: QueryTagLevel::Series,
        range_queryable: false,
    },
    CoreTagDef {
        keyword: "SOPInstanceUID",
        tag: DicomTag::new(0x0008, 0x0018),
        vr: Vr::UI,
        level: QueryTagLevel::Instance,
        range_queryable: false,
    },
    CoreTagDef {
        keyword: "StudyDate",
        tag: DicomTag::new(0x0008, 0x0020),
        vr: Vr::DA,
        level: QueryTagLevel::Study,
        range_queryable: true,
    },
    CoreTagDef {
        keyword: "StudyDescription",
        tag: DicomTag::new(0x0008, 0x1030),
        vr: Vr::LO,
        level: QueryTagLevel::Study,
        range_queryable: false,
    },
    CoreTagDef {
        keyword: "AccessionNumber",
        tag: DicomTag::new(0x0008, 0x0050),
        vr: Vr::SH,
        level: QueryTagLevel::Study,
        range_queryable: false,
    },
    CoreTagDef {
        keyword: "PatientID",
        tag: DicomTag::new(0x0010, 0x0020),
        vr: Vr::LO,
        level: QueryTagLevel::Study,
        range_queryable: false,
    },
    CoreTagDef {
        keyword: "PatientName",
        tag: DicomTag::new(0x0010, 0x0010),
        vr: Vr::PN,
        level: QueryTagLevel::Study,
        range_queryable: false,
    },
    CoreTagDef {
        keyword: "PatientBirthDate",
        tag: DicomTag::new(0x0010, 0x0030),
        vr: Vr::DA,
        level: QueryTagLevel::Study,
        range_queryable: false,
    },
    CoreTagDef {
        keyword: "Modality",
        tag: DicomTag::new(0x0008, 0x0060),
        vr: Vr::CS,
        level: QueryTagLevel::Series,
        range_queryable: false,
    },
    CoreTagDef {
        keyword: "ReferringPhysicianName",
        tag: DicomTag::new(0x0008, 0x0090),
        vr: Vr::PN,
        level: QueryTagLevel::Study,
        range_queryable: false,
    },
];

static CORE_TAGS: Lazy<Vec<QueryTag>> = Lazy::new(|| {
    CORE_TAG_DEFS
        .iter()
        .map(|def| QueryTag::core(def.keyword, def.tag, def.vr, def.level, def.range_queryable))
        .collect()
});

pub fn core_query_tags() -> &'static [QueryTag] {
    &CORE_TAGS
}

/// Whether a tag is already covered by the core index
pub fn is_core_tag(tag: &DicomTag) -> bool {
    CORE_TAG_DEFS.iter().any(|def| def.tag == *tag)
}
