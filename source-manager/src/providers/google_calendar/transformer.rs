use chrono::DateTime;
use pulse::ResourceRecord;
use serde_json::Value;

/// Converts one `events.list` item into a resource record.
///
/// Items without an `id` are dropped.
pub fn event_to_record(event: Value) -> Option<ResourceRecord> {
    let id = event.get("id")?.as_str()?.to_string();
    let title = event
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or("(no title)");
    let timestamp = updated_of(&event)
        .and_then(|u| DateTime::parse_from_rfc3339(u).ok())
        .map(|dt| dt.timestamp_millis());

    Some(ResourceRecord {
        id,
        summary: format!("Calendar event: {}", title),
        timestamp,
        data: event,
    })
}

/// `id:updated`, so an edited event counts as a new occurrence.
pub fn event_identity(record: &ResourceRecord) -> String {
    format!("{}:{}", record.id, updated_of(&record.data).unwrap_or_default())
}

fn updated_of(event: &Value) -> Option<&str> {
    event.get("updated").and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_to_record() {
        let record = event_to_record(json!({
            "id": "abc123",
            "summary": "Standup",
            "updated": "2026-02-18T09:30:00.000Z",
            "status": "confirmed"
        }))
        .unwrap();

        assert_eq!(record.id, "abc123");
        assert_eq!(record.summary, "Calendar event: Standup");
        assert_eq!(record.timestamp, Some(1_771_407_000_000));
        assert_eq!(record.data["status"], "confirmed");
        assert_eq!(event_identity(&record), "abc123:2026-02-18T09:30:00.000Z");
    }

    #[test]
    fn test_event_without_title_or_updated() {
        let record = event_to_record(json!({ "id": "abc123" })).unwrap();
        assert_eq!(record.summary, "Calendar event: (no title)");
        assert!(record.timestamp.is_none());
        assert_eq!(event_identity(&record), "abc123:");
    }

    #[test]
    fn test_event_without_id_is_dropped() {
        assert!(event_to_record(json!({ "summary": "orphan" })).is_none());
    }
}
