//! Reference data mirrored from the remote store so forms work offline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{PendingRecord, RecordPayload, COLLECTION_EQUIPMENT, COLLECTION_SUBSTATIONS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Substations,
    Equipment,
}

impl ReferenceKind {
    pub const ALL: [ReferenceKind; 2] = [ReferenceKind::Substations, ReferenceKind::Equipment];

    pub fn collection(self) -> &'static str {
        match self {
            ReferenceKind::Substations => COLLECTION_SUBSTATIONS,
            ReferenceKind::Equipment => COLLECTION_EQUIPMENT,
        }
    }

    pub fn cache_key(self) -> &'static str {
        match self {
            ReferenceKind::Substations => "cache_substations",
            ReferenceKind::Equipment => "cache_equipment",
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.collection())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentRef {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub validated_by: String,
    /// Registered on this device and not yet approved.
    #[serde(default)]
    pub pending: bool,
}

impl EquipmentRef {
    /// Reads an equipment document, skipping entries without a name or location.
    pub fn from_document(doc: &Value) -> Option<Self> {
        let text = |field: &str| {
            doc.get(field)
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };
        let name = text("name");
        let location = text("location");
        if name.is_empty() || location.is_empty() {
            return None;
        }
        Some(Self {
            name,
            location,
            created_by: text("createdBy"),
            validated_by: text("validatedBy"),
            pending: false,
        })
    }

    fn from_pending(record: &PendingRecord) -> Option<Self> {
        match &record.payload {
            RecordPayload::Equipment(e) => Some(Self {
                name: e.name.clone(),
                location: e.location.clone(),
                created_by: e.created_by.clone(),
                validated_by: e.validated_by.clone().unwrap_or_default(),
                pending: true,
            }),
            RecordPayload::Inspection(_) => None,
        }
    }
}

pub fn substation_names(docs: &[Value]) -> Vec<String> {
    docs.iter()
        .filter_map(|d| d.get("name").and_then(Value::as_str))
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// Equipment selectable at `location`: approved entries first, then the ones
/// still waiting in the local queue.
pub fn equipment_at_location(
    approved: &[Value],
    pending: &[PendingRecord],
    location: &str,
) -> Vec<EquipmentRef> {
    approved
        .iter()
        .filter_map(EquipmentRef::from_document)
        .chain(pending.iter().filter_map(EquipmentRef::from_pending))
        .filter(|e| e.location == location)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EquipmentRegistration, SessionContext};
    use serde_json::json;

    #[test]
    fn documents_without_name_or_location_are_skipped() {
        let docs = [
            json!({ "name": "TR-01", "location": "North" }),
            json!({ "name": "", "location": "North" }),
            json!({ "name": "TR-02" }),
        ];
        let refs: Vec<_> = docs.iter().filter_map(EquipmentRef::from_document).collect();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "TR-01");
    }

    #[test]
    fn location_filter_merges_pending_registrations() {
        let approved = [
            json!({ "name": "TR-01", "location": "North" }),
            json!({ "name": "TR-09", "location": "South" }),
        ];
        let session = SessionContext::new("u1", "tech@example.com");
        let pending = [PendingRecord::new(
            &session,
            RecordPayload::Equipment(EquipmentRegistration {
                name: "TR-02".into(),
                location: "North".into(),
                created_by: String::new(),
                validated_by: None,
            }),
        )];

        let names: Vec<_> = equipment_at_location(&approved, &pending, "North")
            .into_iter()
            .map(|e| (e.name, e.pending))
            .collect();
        assert_eq!(
            names,
            vec![("TR-01".to_string(), false), ("TR-02".to_string(), true)]
        );
    }

    #[test]
    fn substation_names_ignore_blank_entries() {
        let docs = [json!({ "name": "North" }), json!({ "name": " " }), json!({})];
        assert_eq!(substation_names(&docs), vec!["North".to_string()]);
    }
}
