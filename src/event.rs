//! Bucket change notifications.
//!
//! Accepts the S3 notification document (`{"Records": [...]}`), where each
//! record is either an S3 record or an SNS envelope whose `Message` string is
//! itself an S3 notification document. Keys and event names arrive
//! form-encoded (`+` for space, `%XX` escapes) and are decoded here.

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("invalid notification JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Removed,
    /// Any other event name (decoded), kept for logging.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEvent {
    pub kind: EventKind,
    pub key: String,
}

impl ObjectEvent {
    pub fn created(key: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Created,
            key: key.into(),
        }
    }

    pub fn removed(key: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Removed,
            key: key.into(),
        }
    }

    pub fn is_folder(&self) -> bool {
        crate::keys::is_folder_key(&self.key)
    }
}

#[derive(Deserialize)]
struct Notification {
    #[serde(rename = "Records", default)]
    records: Vec<Record>,
}

#[derive(Deserialize)]
struct Record {
    #[serde(rename = "eventName", default)]
    event_name: String,
    s3: Option<S3Entity>,
    #[serde(rename = "Sns")]
    sns: Option<SnsEnvelope>,
}

#[derive(Deserialize)]
struct S3Entity {
    object: S3Object,
}

#[derive(Deserialize)]
struct S3Object {
    key: String,
}

#[derive(Deserialize)]
struct SnsEnvelope {
    #[serde(rename = "Message", default)]
    message: String,
}

/// Form decoding: `+` is a space, then percent escapes. Invalid UTF-8 is
/// replaced rather than rejected.
pub fn unquote_plus(s: &str) -> String {
    let spaced = s.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}

fn classify(event_name: &str) -> EventKind {
    if event_name.starts_with("ObjectCreated:") {
        EventKind::Created
    } else if event_name.starts_with("ObjectRemoved:") {
        EventKind::Removed
    } else {
        EventKind::Other(event_name.to_string())
    }
}

fn to_event(event_name: &str, s3: S3Entity) -> ObjectEvent {
    ObjectEvent {
        kind: classify(&unquote_plus(event_name)),
        key: unquote_plus(&s3.object.key),
    }
}

/// Flatten a notification into object events, in delivery order.
///
/// SNS envelopes whose message is not a valid notification are skipped with a
/// warning; an invalid outer document is an error.
pub fn parse_notification(json: &str) -> Result<Vec<ObjectEvent>, EventError> {
    let notification: Notification = serde_json::from_str(json)?;
    let mut events = Vec::new();

    for record in notification.records {
        if let Some(s3) = record.s3 {
            events.push(to_event(&record.event_name, s3));
            continue;
        }
        let Some(sns) = record.sns else {
            tracing::debug!("record has neither s3 nor Sns payload, skipping");
            continue;
        };
        match serde_json::from_str::<Notification>(&sns.message) {
            Ok(inner) => events.extend(
                inner
                    .records
                    .into_iter()
                    .filter_map(|r| r.s3.map(|s3| to_event(&r.event_name, s3))),
            ),
            Err(e) => tracing::warn!(error = %e, "skipping unparseable SNS message"),
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s3_record(event_name: &str, key: &str) -> serde_json::Value {
        serde_json::json!({
            "eventSource": "aws:s3",
            "eventName": event_name,
            "s3": { "bucket": { "name": "photos" }, "object": { "key": key, "size": 10 } }
        })
    }

    #[test]
    fn direct_records() {
        let doc = serde_json::json!({ "Records": [
            s3_record("ObjectCreated:Put", "public/a.jpg"),
            s3_record("ObjectRemoved:Delete", "public/b.jpg"),
        ]});
        let events = parse_notification(&doc.to_string()).unwrap();
        assert_eq!(
            events,
            vec![
                ObjectEvent::created("public/a.jpg"),
                ObjectEvent::removed("public/b.jpg"),
            ]
        );
    }

    #[test]
    fn sns_wrapped_records() {
        let inner = serde_json::json!({ "Records": [
            s3_record("ObjectCreated:CompleteMultipartUpload", "public/big.tif"),
        ]});
        let doc = serde_json::json!({ "Records": [
            { "EventSource": "aws:sns", "Sns": { "Message": inner.to_string() } },
        ]});
        let events = parse_notification(&doc.to_string()).unwrap();
        assert_eq!(events, vec![ObjectEvent::created("public/big.tif")]);
    }

    #[test]
    fn unparseable_sns_message_is_skipped() {
        let doc = serde_json::json!({ "Records": [
            { "Sns": { "Message": "not json" } },
            s3_record("ObjectCreated:Put", "public/a.jpg"),
        ]});
        let events = parse_notification(&doc.to_string()).unwrap();
        assert_eq!(events, vec![ObjectEvent::created("public/a.jpg")]);
    }

    #[test]
    fn keys_are_form_decoded() {
        let doc = serde_json::json!({ "Records": [
            s3_record("ObjectCreated:Put", "public/My+Trip/caf%C3%A9+1.jpg"),
        ]});
        let events = parse_notification(&doc.to_string()).unwrap();
        assert_eq!(events[0].key, "public/My Trip/café 1.jpg");
    }

    #[test]
    fn unknown_event_names_are_other() {
        let doc = serde_json::json!({ "Records": [
            s3_record("ObjectRestore:Completed", "public/a.jpg"),
        ]});
        let events = parse_notification(&doc.to_string()).unwrap();
        assert_eq!(
            events[0].kind,
            EventKind::Other("ObjectRestore:Completed".into())
        );
    }

    #[test]
    fn folder_events() {
        assert!(ObjectEvent::created("public/trip/").is_folder());
        assert!(!ObjectEvent::created("public/trip.jpg").is_folder());
    }

    #[test]
    fn missing_records_is_empty() {
        assert!(parse_notification("{}").unwrap().is_empty());
    }

    #[test]
    fn invalid_document_is_an_error() {
        assert!(matches!(
            parse_notification("[1, 2"),
            Err(EventError::Json(_))
        ));
    }

    #[test]
    fn unquote_plus_decodes_escapes_after_plus() {
        assert_eq!(unquote_plus("100%25+done"), "100% done");
        assert_eq!(unquote_plus("a%2Bb"), "a+b");
    }
}
