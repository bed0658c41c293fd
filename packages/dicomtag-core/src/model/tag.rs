//! Attribute identity: group/element tags and value representations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// DICOM attribute tag (group, element)
///
/// The canonical textual form is the 8-digit upper-case hex path `GGGGEEEE`,
/// e.g. `00100020` for PatientID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DicomTag {
    pub group: u16,
    pub element: u16,
}

impl DicomTag {
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }

    /// Private tags live in odd groups
    pub fn is_private(&self) -> bool {
        self.group % 2 == 1
    }

    /// Private creator slots occupy (gggg,0010)..(gggg,00FF)
    pub fn is_private_creator(&self) -> bool {
        self.is_private() && (0x0010..=0x00FF).contains(&self.element)
    }

    pub fn path(&self) -> String {
        format!("{:04X}{:04X}", self.group, self.element)
    }

    /// Parse an 8 hex digit path. Case-insensitive.
    pub fn parse_path(path: &str) -> Option<Self> {
        if path.len() != 8 || !path.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let group = u16::from_str_radix(&path[..4], 16).ok()?;
        let element = u16::from_str_radix(&path[4..], 16).ok()?;
        Some(Self { group, element })
    }
}

impl fmt::Display for DicomTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

/// Value representation (VR): the declared kind of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vr {
    AE,
    AS,
    AT,
    CS,
    DA,
    DS,
    DT,
    FD,
    FL,
    IS,
    LO,
    LT,
    OB,
    OD,
    OF,
    OL,
    OV,
    OW,
    PN,
    SH,
    SL,
    SQ,
    SS,
    ST,
    SV,
    TM,
    UC,
    UI,
    UL,
    UN,
    UR,
    US,
    UT,
    UV,
}

/// VRs that can back an extended query tag
pub const INDEXABLE_VRS: &[Vr] = &[
    Vr::AE,
    Vr::AS,
    Vr::CS,
    Vr::DA,
    Vr::DS,
    Vr::DT,
    Vr::FD,
    Vr::FL,
    Vr::IS,
    Vr::LO,
    Vr::PN,
    Vr::SH,
    Vr::SL,
    Vr::SS,
    Vr::TM,
    Vr::UI,
    Vr::UL,
    Vr::US,
];

impl Vr {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vr::AE => "AE",
            Vr::AS => "AS",
            Vr::AT => "AT",
            Vr::CS => "CS",
            Vr::DA => "DA",
            Vr::DS => "DS",
            Vr::DT => "DT",
            Vr::FD => "FD",
            Vr::FL => "FL",
            Vr::IS => "IS",
            Vr::LO => "LO",
            Vr::LT => "LT",
            Vr::OB => "OB",
            Vr::OD => "OD",
            Vr::OF => "OF",
            Vr::OL => "OL",
            Vr::OV => "OV",
            Vr::OW => "OW",
            Vr::PN => "PN",
            Vr::SH => "SH",
            Vr::SL => "SL",
            Vr::SQ => "SQ",
            Vr::SS => "SS",
            Vr::ST => "ST",
            Vr::SV => "SV",
            Vr::TM => "TM",
            Vr::UC => "UC",
            Vr::UI => "UI",
            Vr::UL => "UL",
            Vr::UN => "UN",
            Vr::UR => "UR",
            Vr::US => "US",
            Vr::UT => "UT",
            Vr::UV => "UV",
        }
    }

    pub fn is_indexable(&self) -> bool {
        INDEXABLE_VRS.contains(self)
    }

    /// Index partition for values of this VR, if indexable
    pub fn index_data_type(&self) -> Option<IndexDataType> {
        match self {
            Vr::AE | Vr::AS | Vr::CS | Vr::LO | Vr::SH | Vr::UI => Some(IndexDataType::String),
            Vr::PN => Some(IndexDataType::PersonName),
            Vr::DS | Vr::FL | Vr::FD => Some(IndexDataType::Double),
            Vr::IS | Vr::SL | Vr::SS | Vr::UL | Vr::US | Vr::TM => Some(IndexDataType::Long),
            Vr::DA | Vr::DT => Some(IndexDataType::DateTime),
            _ => None,
        }
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vr = match s.trim().to_ascii_uppercase().as_str() {
            "AE" => Vr::AE,
            "AS" => Vr::AS,
            "AT" => Vr::AT,
            "CS" => Vr::CS,
            "DA" => Vr::DA,
            "DS" => Vr::DS,
            "DT" => Vr::DT,
            "FD" => Vr::FD,
            "FL" => Vr::FL,
            "IS" => Vr::IS,
            "LO" => Vr::LO,
            "LT" => Vr::LT,
            "OB" => Vr::OB,
            "OD" => Vr::OD,
            "OF" => Vr::OF,
            "OL" => Vr::OL,
            "OV" => Vr::OV,
            "OW" => Vr::OW,
            "PN" => Vr::PN,
            "SH" => Vr::SH,
            "SL" => Vr::SL,
            "SQ" => Vr::SQ,
            "SS" => Vr::SS,
            "ST" => Vr::ST,
            "SV" => Vr::SV,
            "TM" => Vr::TM,
            "UC" => Vr::UC,
            "UI" => Vr::UI,
            "UL" => Vr::UL,
            "UN" => Vr::UN,
            "UR" => Vr::UR,
            "US" => Vr::US,
            "UT" => Vr::UT,
            "UV" => Vr::UV,
            other => return Err(format!("Unknown value representation: {}", other)),
        };
        Ok(vr)
    }
}

/// Storage partition for index values; each has distinct comparison semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexDataType {
    String,
    Long,
    Double,
    DateTime,
    PersonName,
}

impl IndexDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexDataType::String => "string",
            IndexDataType::Long => "long",
            IndexDataType::Double => "double",
            IndexDataType::DateTime => "datetime",
            IndexDataType::PersonName => "person_name",
        }
    }
}
