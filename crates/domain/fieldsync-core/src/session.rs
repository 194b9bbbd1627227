use serde::{Deserialize, Serialize};

/// Identity of whoever is submitting records.
///
/// Passed explicitly into every operation that stamps ownership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionContext {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl SessionContext {
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            is_admin: false,
        }
    }

    pub fn admin(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::new(uid, email)
        }
    }

    pub fn creator(&self) -> Creator {
        Creator {
            uid: self.uid.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Creator {
    pub uid: String,
    pub email: String,
}
