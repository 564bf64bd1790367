pub mod dedupe;
pub mod fields;
pub mod flatten;
pub mod normalize;

use flex_client::domain::{ClearedBucketPtu, DispatchRecord, TenderZone};

use crate::pipeline::{Envelope, PipelineError, Transform};
use crate::sources::RawRecord;

pub use dedupe::{dedupe_sorted, TableRow};
pub use flatten::flatten_clearing_event;
pub use normalize::{normalize_dispatch, normalize_tender, parse_clearing_event};

/// Raw UKPN record to one typed dispatch row.
#[derive(Clone, Default)]
pub struct DispatchNormalization;

#[async_trait::async_trait]
impl Transform<RawRecord, DispatchRecord> for DispatchNormalization {
    async fn apply(
        &self,
        input: Envelope<RawRecord>,
    ) -> Result<Vec<Envelope<DispatchRecord>>, PipelineError> {
        Ok(vec![input.map(|raw| normalize_dispatch(&raw))])
    }
}

/// Raw grouped tender record to one tender-zone row.
#[derive(Clone, Default)]
pub struct TenderNormalization;

#[async_trait::async_trait]
impl Transform<RawRecord, TenderZone> for TenderNormalization {
    async fn apply(
        &self,
        input: Envelope<RawRecord>,
    ) -> Result<Vec<Envelope<TenderZone>>, PipelineError> {
        Ok(vec![input.map(|raw| normalize_tender(&raw))])
    }
}

/// Raw GOPACS clearing event to one row per PTU.
#[derive(Clone, Default)]
pub struct ClearedBucketFlattening;

#[async_trait::async_trait]
impl Transform<RawRecord, ClearedBucketPtu> for ClearedBucketFlattening {
    async fn apply(
        &self,
        input: Envelope<RawRecord>,
    ) -> Result<Vec<Envelope<ClearedBucketPtu>>, PipelineError> {
        let received_at = input.received_at;
        let event = parse_clearing_event(&input.payload);
        if event.ptus.is_empty() {
            metrics::counter!("flatten_events_without_ptus_total").increment(1);
            tracing::debug!(clearing_event_id = ?event.id, "clearing event has no PTUs");
        }

        Ok(flatten_clearing_event(event)
            .into_iter()
            .map(|payload| Envelope {
                payload,
                received_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(v: serde_json::Value) -> Envelope<RawRecord> {
        Envelope::new(v.as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn dispatch_normalization_emits_exactly_one_row() {
        let out = DispatchNormalization
            .apply(envelope(json!({ "fu_id": "FU-3", "zone": "Z" })))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload.fu_id.as_deref(), Some("FU-3"));
    }

    #[tokio::test]
    async fn flattening_keeps_envelope_timestamp() {
        let input = envelope(json!({
            "clearingEventId": "E-1",
            "clearedVolumesForPtus": [
                { "startTime": "2024-01-01T00:00:00", "endTime": "2024-01-01T00:15:00" },
                { "startTime": "2024-01-01T00:15:00", "endTime": "2024-01-01T00:30:00" }
            ]
        }));
        let received_at = input.received_at;

        let out = ClearedBucketFlattening.apply(input).await.unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.received_at == received_at));
    }

    #[tokio::test]
    async fn event_without_ptu_list_yields_nothing() {
        let out = ClearedBucketFlattening
            .apply(envelope(json!({ "clearingEventId": "E-2" })))
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
