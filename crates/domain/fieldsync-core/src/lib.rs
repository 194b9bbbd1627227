use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod reference;
pub mod session;
pub mod validate;

pub use reference::{equipment_at_location, substation_names, EquipmentRef, ReferenceKind};
pub use session::{Creator, SessionContext};
pub use validate::ValidationError;

/// Version stamped on every queued record. Bump when the persisted shape changes.
pub const RECORD_SCHEMA_VERSION: u32 = 1;

pub const COLLECTION_INSPECTIONS: &str = "inspections";
pub const COLLECTION_EQUIPMENT: &str = "equipment";
pub const COLLECTION_EQUIPMENT_PENDING: &str = "equipment_pending";
pub const COLLECTION_SUBSTATIONS: &str = "substations";

/// Storage key of the inspection form being filled in.
pub const DRAFT_INSPECTION_KEY: &str = "draft_inspection";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Inspection,
    Equipment,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Inspection, RecordKind::Equipment];

    /// Storage key holding the pending queue for this kind.
    pub fn queue_key(self) -> &'static str {
        match self {
            RecordKind::Inspection => "pending_inspections",
            RecordKind::Equipment => "pending_equipment",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Inspection => "inspection",
            RecordKind::Equipment => "equipment",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistAnswer {
    pub item: String,
    pub answer: String,
}

/// Also used as the saved form draft, where any field may still be blank.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    pub equipment: String,
    pub location: String,
    pub status: String,
    pub checklist: Vec<ChecklistAnswer>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentRegistration {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordPayload {
    Inspection(Inspection),
    Equipment(EquipmentRegistration),
}

impl RecordPayload {
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordPayload::Inspection(_) => RecordKind::Inspection,
            RecordPayload::Equipment(_) => RecordKind::Equipment,
        }
    }
}

/// A user-submitted record that has not been confirmed by the remote store.
///
/// Records are never edited once created. They leave the queue only after the
/// remote store acknowledged the write, so delivery is at-least-once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingRecord {
    pub id: Uuid,
    pub schema_version: u32,
    pub payload: RecordPayload,
    pub created_by: Creator,
    pub created_at: DateTime<Utc>,
    pub collection: String,
    pub pending: bool,
}

impl PendingRecord {
    /// Builds a record owned by `session`.
    ///
    /// Equipment registered by an admin targets the approved collection and is
    /// stamped as validated by that admin; everyone else lands in the pending
    /// collection awaiting approval.
    pub fn new(session: &SessionContext, payload: RecordPayload) -> Self {
        let (payload, collection) = match payload {
            RecordPayload::Inspection(i) => {
                (RecordPayload::Inspection(i), COLLECTION_INSPECTIONS)
            }
            RecordPayload::Equipment(mut e) => {
                if e.created_by.is_empty() {
                    e.created_by = session.email.clone();
                }
                if session.is_admin {
                    e.validated_by = Some(session.email.clone());
                    (RecordPayload::Equipment(e), COLLECTION_EQUIPMENT)
                } else {
                    (RecordPayload::Equipment(e), COLLECTION_EQUIPMENT_PENDING)
                }
            }
        };

        Self {
            id: Uuid::new_v4(),
            schema_version: RECORD_SCHEMA_VERSION,
            payload,
            created_by: session.creator(),
            created_at: Utc::now(),
            collection: collection.to_string(),
            pending: false,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.payload.kind()
    }

    /// Copy flagged as queued locally.
    pub fn into_pending(mut self) -> Self {
        self.pending = true;
        self
    }

    /// Same registration retargeted at the approved collection, stamped by `admin`.
    ///
    /// Returns `None` for anything other than an equipment registration.
    pub fn approved_by(&self, admin: &SessionContext) -> Option<Self> {
        let RecordPayload::Equipment(e) = &self.payload else {
            return None;
        };
        let mut e = e.clone();
        e.validated_by = Some(admin.email.clone());
        Some(Self {
            payload: RecordPayload::Equipment(e),
            collection: COLLECTION_EQUIPMENT.to_string(),
            pending: false,
            ..self.clone()
        })
    }

    /// True when this binary understands the record's persisted shape.
    pub fn is_supported_schema(&self) -> bool {
        self.schema_version <= RECORD_SCHEMA_VERSION
    }

    /// Flat document sent to the remote store.
    ///
    /// The payload fields sit next to the metadata, and `clientId` lets the
    /// backend spot replays of the same record.
    pub fn to_document(&self) -> serde_json::Value {
        let mut doc = match &self.payload {
            RecordPayload::Inspection(i) => serde_json::to_value(i),
            RecordPayload::Equipment(e) => serde_json::to_value(e),
        }
        .unwrap_or_else(|_| serde_json::Value::Object(Default::default()));

        if let Some(map) = doc.as_object_mut() {
            map.insert("clientId".into(), self.id.to_string().into());
            map.insert("uid".into(), self.created_by.uid.clone().into());
            map.insert("user".into(), self.created_by.email.clone().into());
            map.insert("createdAt".into(), self.created_at.to_rfc3339().into());
            map.insert("schemaVersion".into(), self.schema_version.into());
        }
        doc
    }
}
