//! Incident ticket records and feedback records rendered as store documents.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{
    normalize_incident_number, Document, DOC_TYPE, FEEDBACK_TYPE, INCIDENT_NUMBER_KEY, TYPE_KEY,
};

/// One row of the incident export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentRecord {
    pub incident_number: String,
    pub location: String,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub caller: String,
    pub assignment_group: String,
    pub assigned_to: String,
    pub state: String,
    pub created: String,
    pub updated: String,
    pub close_notes: String,
    pub resolved_time: String,
    pub updated_by: String,
    pub work_notes: String,
    pub category: String,
    pub additional_comments: String,
}

/// How a field value is normalised before rendering
#[derive(Clone, Copy)]
enum Casing {
    Lower,
    Keep,
}

impl IncidentRecord {
    /// (metadata key, content tag, label, value, casing) for every field after the id
    fn fields(&self) -> [(&'static str, &'static str, &'static str, &str, Casing); 16] {
        [
            ("title", "HAS_REPORTED_ISSUE", "Reported Issue", self.title.as_str(), Casing::Keep),
            ("description", "HAS_DESCRIPTION", "Description", self.description.as_str(), Casing::Lower),
            ("location", "HAS_LOCATION", "Location", self.location.as_str(), Casing::Lower),
            ("close_notes", "HAS_CLOSE_NOTES", "Close Notes", self.close_notes.as_str(), Casing::Lower),
            ("priority", "HAS_PRIORITY", "Priority", self.priority.as_str(), Casing::Lower),
            ("caller", "HAS_CALLER", "Caller", self.caller.as_str(), Casing::Lower),
            ("assignment_group", "HAS_ASSIGNMENT_GROUP", "Assignment_Group", self.assignment_group.as_str(), Casing::Lower),
            ("assigned_to", "HAS_ASSIGNED_TO", "Assigned_To", self.assigned_to.as_str(), Casing::Lower),
            ("state", "HAS_STATE", "State", self.state.as_str(), Casing::Lower),
            ("created", "HAS_CREATED_DATE", "Created on", self.created.as_str(), Casing::Keep),
            ("updated", "HAS_UPDATED_DATE", "Updated on", self.updated.as_str(), Casing::Keep),
            ("resolved_time", "HAS_RESOLVED_TIME", "Resolved time", self.resolved_time.as_str(), Casing::Keep),
            ("updated_by", "HAS_UPDATED_BY", "Updated by", self.updated_by.as_str(), Casing::Keep),
            ("work_notes", "HAS_WORK_NOTES", "Work notes", self.work_notes.as_str(), Casing::Lower),
            ("category", "HAS_CATEGORY", "Category", self.category.as_str(), Casing::Lower),
            ("additional_comments", "HAS_ADDITIONAL_COMMENTS", "Additional comments", self.additional_comments.as_str(), Casing::Lower),
        ]
    }

    /// Render the record as a `type = doc` document. Empty fields are
    /// omitted from the content but kept (empty) in the metadata.
    pub fn to_document(&self, index: usize) -> Document {
        let number = normalize_incident_number(&self.incident_number);
        let mut lines = vec![format!("INCIDENT_NUMBER: {}", number)];

        let mut doc = Document::new(String::new())
            .with_meta("index", index as u64)
            .with_meta(INCIDENT_NUMBER_KEY, number.clone());

        for (key, tag, label, raw, casing) in self.fields() {
            let value = match casing {
                Casing::Lower => raw.trim().to_lowercase(),
                Casing::Keep => raw.trim().to_string(),
            };
            if !value.is_empty() {
                lines.push(format!(
                    "{}: For incident number:{} -> {}: {}",
                    tag, number, label, value
                ));
            }
            doc.metadata.insert(key.to_string(), Value::String(value));
        }

        doc.content = lines.join("\n") + "\n";
        doc.with_meta(TYPE_KEY, DOC_TYPE)
    }
}

/// User feedback on a previously returned answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub user_query: String,
    pub feedback: String,
    pub content: String,
}

/// Compose the synthetic `type = feedback` document for a feedback record
pub fn feedback_document(record: &FeedbackRecord, at: DateTime<Utc>) -> Document {
    let content = format!(
        "A user provided feedback on an incident query. \
         User's Query: '{}'. \
         Provided Content: '{}'. \
         User's Feedback: '{}'.",
        record.user_query, record.content, record.feedback
    );

    Document::new(content)
        .with_meta(TYPE_KEY, FEEDBACK_TYPE)
        .with_meta(
            "feedback_timestamp_utc",
            at.to_rfc3339_opts(SecondsFormat::Micros, false),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_incident_to_document() {
        let record = IncidentRecord {
            incident_number: " INC456 ".to_string(),
            title: "VPN Down".to_string(),
            state: "Resolved".to_string(),
            ..Default::default()
        };

        let doc = record.to_document(3);
        assert_eq!(doc.doc_type(), Some(DOC_TYPE));
        assert_eq!(doc.metadata[INCIDENT_NUMBER_KEY], "inc456");
        assert_eq!(doc.metadata["index"], 3);
        assert_eq!(doc.metadata["state"], "resolved");
        assert_eq!(doc.metadata["caller"], "");
        assert!(doc.content.starts_with("INCIDENT_NUMBER: inc456\n"));
        assert!(doc
            .content
            .contains("HAS_REPORTED_ISSUE: For incident number:inc456 -> Reported Issue: VPN Down"));
        assert!(doc.content.contains("-> State: resolved"));
        assert!(!doc.content.contains("HAS_CALLER"));
        assert!(doc.content.ends_with('\n'));
    }

    #[test]
    fn test_feedback_document() {
        let record = FeedbackRecord {
            user_query: "status of INC1".to_string(),
            feedback: "wrong date".to_string(),
            content: "INC1 closed Monday".to_string(),
        };
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let doc = feedback_document(&record, at);
        assert_eq!(doc.doc_type(), Some(FEEDBACK_TYPE));
        assert_eq!(
            doc.content,
            "A user provided feedback on an incident query. User's Query: 'status of INC1'. \
             Provided Content: 'INC1 closed Monday'. User's Feedback: 'wrong date'."
        );
        assert_eq!(
            doc.metadata["feedback_timestamp_utc"],
            "2024-05-01T12:00:00.000000+00:00"
        );
    }
}
