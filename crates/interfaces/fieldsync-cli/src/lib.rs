pub mod commands;
pub mod context;

use clap::{Args, ValueEnum};
use fieldsync_core::{ChecklistAnswer, RecordKind, ReferenceKind, SessionContext};

pub use context::AppContext;

#[derive(ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum CliRecordKind {
    Inspection,
    Equipment,
}

impl From<CliRecordKind> for RecordKind {
    fn from(k: CliRecordKind) -> Self {
        match k {
            CliRecordKind::Inspection => RecordKind::Inspection,
            CliRecordKind::Equipment => RecordKind::Equipment,
        }
    }
}

#[derive(ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum CliReference {
    Substations,
    Equipment,
}

impl From<CliReference> for ReferenceKind {
    fn from(r: CliReference) -> Self {
        match r {
            CliReference::Substations => ReferenceKind::Substations,
            CliReference::Equipment => ReferenceKind::Equipment,
        }
    }
}

/// Who is acting. Normally supplied by the login flow through the environment.
#[derive(Args, Clone, Debug)]
pub struct SessionArgs {
    #[arg(long, env = "FIELDSYNC_UID", global = true, default_value = "")]
    pub uid: String,
    #[arg(long, env = "FIELDSYNC_EMAIL", global = true, default_value = "")]
    pub email: String,
    #[arg(long, env = "FIELDSYNC_ADMIN", global = true)]
    pub admin: bool,
}

impl SessionArgs {
    pub fn session(&self) -> SessionContext {
        SessionContext {
            uid: self.uid.clone(),
            email: self.email.clone(),
            is_admin: self.admin,
        }
    }
}

/// Parses `item=answer`.
pub fn parse_checklist_entry(s: &str) -> Result<ChecklistAnswer, String> {
    let (item, answer) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ITEM=ANSWER, got {s:?}"))?;
    let item = item.trim();
    if item.is_empty() {
        return Err(format!("checklist item name is empty in {s:?}"));
    }
    Ok(ChecklistAnswer {
        item: item.to_string(),
        answer: answer.trim().to_string(),
    })
}
