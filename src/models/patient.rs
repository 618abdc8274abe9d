use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Greeting used when a patient has no usable name on file.
pub const GENERIC_SALUTATION: &str = "there";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub first_name: Option<String>,
    pub email: Option<String>,
}

impl Patient {
    /// Name used to greet the patient: first name, else the first token of
    /// the full name, else a generic greeting.
    pub fn salutation(&self) -> &str {
        self.first_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .or_else(|| self.name.split_whitespace().next())
            .unwrap_or(GENERIC_SALUTATION)
    }

    /// Trimmed email address, if one is on file.
    pub fn contact_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}
