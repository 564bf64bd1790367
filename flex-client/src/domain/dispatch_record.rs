use serde::{Deserialize, Serialize};
use time::PrimitiveDateTime;

use super::timestamp::naive_ts;

/// One UKPN flexibility-service activation.
///
/// Field names double as the persisted CSV column names. Every upstream field
/// is optional: a missing or malformed value is carried as `None` instead of
/// dropping the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub fu_id: Option<String>,
    pub zone: Option<String>,
    pub company_name: Option<String>,
    pub technology: Option<String>,
    pub product: Option<String>,
    pub dispatch_type: Option<String>,
    #[serde(default, with = "naive_ts")]
    pub start_time_local: Option<PrimitiveDateTime>,
    #[serde(default, with = "naive_ts")]
    pub end_time_local: Option<PrimitiveDateTime>,
    pub availability_mw_req: Option<f64>,
    pub utilisation_mw_req: Option<f64>,
    pub availability_mwh_req: Option<f64>,
    pub utilisation_mwh_req: Option<f64>,
    pub availability_price: Option<f64>,
    pub utilisation_price: Option<f64>,
    pub hours_requested: Option<f64>,
    pub availability_cost: Option<f64>,
    pub utilisation_cost: Option<f64>,
    pub total_cost: Option<f64>,
}

impl DispatchRecord {
    /// Column order of the persisted table. Matches the field order above.
    pub const COLUMNS: &'static [&'static str] = &[
        "fu_id",
        "zone",
        "company_name",
        "technology",
        "product",
        "dispatch_type",
        "start_time_local",
        "end_time_local",
        "availability_mw_req",
        "utilisation_mw_req",
        "availability_mwh_req",
        "utilisation_mwh_req",
        "availability_price",
        "utilisation_price",
        "hours_requested",
        "availability_cost",
        "utilisation_cost",
        "total_cost",
    ];

    /// Recompute the cost columns from the requested energy and prices.
    ///
    /// A missing input makes the dependent cost `None`; zero inputs give 0.0.
    pub fn derive_costs(&mut self) {
        self.availability_cost = product(self.availability_mwh_req, self.availability_price);
        self.utilisation_cost = product(self.utilisation_mwh_req, self.utilisation_price);
        self.total_cost = match (self.availability_cost, self.utilisation_cost) {
            (Some(a), Some(u)) => Some(a + u),
            _ => None,
        };
    }
}

fn product(quantity: Option<f64>, price: Option<f64>) -> Option<f64> {
    Some(quantity? * price?)
}
