use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use super::StoreError;

/// Key of a credential record. Used as a file name, so only a conservative set of
/// characters is allowed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct InstitutionId(String);

impl InstitutionId {
    pub fn new(id: impl Into<String>) -> Result<Self, StoreError> {
        let id = id.into();
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if valid {
            Ok(Self(id))
        } else {
            Err(StoreError::InvalidInstitutionId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InstitutionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InstitutionId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InstitutionId> for String {
    fn from(value: InstitutionId) -> Self {
        value.0
    }
}
