use crate::{EquipmentRegistration, Inspection, RecordPayload, SessionContext};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no authenticated user")]
    MissingUser,
    #[error("required field `{0}` is empty")]
    MissingField(&'static str),
    #[error("checklist item {index} (`{item}`) has no answer")]
    UnansweredItem { index: usize, item: String },
    #[error("checklist is empty")]
    EmptyChecklist,
}

pub fn validate_session(session: &SessionContext) -> Result<(), ValidationError> {
    if session.uid.trim().is_empty() || session.email.trim().is_empty() {
        return Err(ValidationError::MissingUser);
    }
    Ok(())
}

pub fn validate_payload(payload: &RecordPayload) -> Result<(), ValidationError> {
    match payload {
        RecordPayload::Inspection(i) => validate_inspection(i),
        RecordPayload::Equipment(e) => validate_equipment(e),
    }
}

fn require(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

pub fn validate_inspection(inspection: &Inspection) -> Result<(), ValidationError> {
    require(&inspection.location, "location")?;
    require(&inspection.equipment, "equipment")?;
    require(&inspection.status, "status")?;
    if inspection.checklist.is_empty() {
        return Err(ValidationError::EmptyChecklist);
    }
    if let Some((index, entry)) = inspection
        .checklist
        .iter()
        .enumerate()
        .find(|(_, entry)| entry.answer.trim().is_empty())
    {
        return Err(ValidationError::UnansweredItem {
            index,
            item: entry.item.clone(),
        });
    }
    Ok(())
}

pub fn validate_equipment(equipment: &EquipmentRegistration) -> Result<(), ValidationError> {
    require(&equipment.name, "name")?;
    require(&equipment.location, "location")?;
    Ok(())
}
