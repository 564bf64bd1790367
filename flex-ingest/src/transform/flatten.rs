use flex_client::domain::{ClearedBucketPtu, ClearingEvent};

/// Expand a clearing event into one row per PTU.
///
/// Every row carries the event-level fields unchanged plus its own PTU window
/// and volumes. An event without PTUs yields no rows.
pub fn flatten_clearing_event(event: ClearingEvent) -> Vec<ClearedBucketPtu> {
    let ClearingEvent {
        id,
        organisation_name,
        buy_volume_mwh,
        sell_volume_mwh,
        start_time,
        end_time,
        ptus,
    } = event;

    ptus.into_iter()
        .map(|ptu| {
            let mut row = ClearedBucketPtu {
                clearing_event_id: id.clone(),
                organisation_name: organisation_name.clone(),
                event_buy_volume_mwh: buy_volume_mwh,
                event_sell_volume_mwh: sell_volume_mwh,
                event_start_time: start_time,
                event_end_time: end_time,
                ptu_start_time: ptu.start_time,
                ptu_end_time: ptu.end_time,
                buy_volume_mw: ptu.buy_volume_mw,
                sell_volume_mw: ptu.sell_volume_mw,
                event_duration_hours: None,
                ptu_duration_minutes: None,
                energy_mwh: None,
            };
            row.derive_metrics();
            row
        })
        .collect()
}
