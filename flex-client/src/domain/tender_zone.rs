use serde::{Deserialize, Serialize};

/// One distinct zone / competition pot / tender round combination from the
/// UKPN flexibility tender dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderZone {
    pub flexibility_zone: Option<String>,
    pub competition_pot: Option<String>,
    pub tender_round: Option<String>,
}

impl TenderZone {
    pub const COLUMNS: &'static [&'static str] =
        &["flexibility_zone", "competition_pot", "tender_round"];

    /// Comma-separated field list, used for both the `select` and the
    /// `group_by` query parameters.
    pub const GROUP_FIELDS: &'static str = "flexibility_zone,competition_pot,tender_round";
}
