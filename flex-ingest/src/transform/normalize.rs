use flex_client::domain::{ClearingEvent, DispatchRecord, PtuVolume, TenderZone};
use serde_json::Value;

use super::fields::{number, text, timestamp};
use crate::sources::RawRecord;

/// Build a typed UKPN dispatch row from its raw field mapping.
///
/// Missing or malformed fields become `None`; the cost columns are derived
/// from whatever survived.
pub fn normalize_dispatch(raw: &RawRecord) -> DispatchRecord {
    let mut record = DispatchRecord {
        fu_id: text(raw, "fu_id"),
        zone: text(raw, "zone"),
        company_name: text(raw, "company_name"),
        technology: text(raw, "technology"),
        product: text(raw, "product"),
        dispatch_type: text(raw, "dispatch_type"),
        start_time_local: timestamp(raw, "start_time_local"),
        end_time_local: timestamp(raw, "end_time_local"),
        availability_mw_req: number(raw, "availability_mw_req"),
        utilisation_mw_req: number(raw, "utilisation_mw_req"),
        availability_mwh_req: number(raw, "availability_mwh_req"),
        utilisation_mwh_req: number(raw, "utilisation_mwh_req"),
        availability_price: number(raw, "availability_price"),
        utilisation_price: number(raw, "utilisation_price"),
        hours_requested: number(raw, "hours_requested"),
        availability_cost: None,
        utilisation_cost: None,
        total_cost: None,
    };
    record.derive_costs();
    record
}

pub fn normalize_tender(raw: &RawRecord) -> TenderZone {
    TenderZone {
        flexibility_zone: text(raw, "flexibility_zone"),
        competition_pot: text(raw, "competition_pot"),
        tender_round: text(raw, "tender_round"),
    }
}

/// Build a typed GOPACS clearing event, keeping one PTU per list entry.
pub fn parse_clearing_event(raw: &RawRecord) -> ClearingEvent {
    let ptus = raw
        .get("clearedVolumesForPtus")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| item.as_object().map(parse_ptu).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();

    ClearingEvent {
        id: text(raw, "clearingEventId"),
        organisation_name: text(raw, "organisationName"),
        buy_volume_mwh: number(raw, "buyVolumeInMWh"),
        sell_volume_mwh: number(raw, "sellVolumeInMWh"),
        start_time: timestamp(raw, "startTime"),
        end_time: timestamp(raw, "endTime"),
        ptus,
    }
}

fn parse_ptu(raw: &RawRecord) -> PtuVolume {
    PtuVolume {
        start_time: timestamp(raw, "startTime"),
        end_time: timestamp(raw, "endTime"),
        buy_volume_mw: number(raw, "buyVolumeInMW"),
        sell_volume_mw: number(raw, "sellVolumeInMW"),
    }
}
