use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccessToken, InstitutionId};
use crate::config::Environment;

/// The durable result of linking one institution
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub institution_id: InstitutionId,
    pub item_id: String,
    pub access_token: AccessToken,
    pub institution_name: Option<String>,
    pub environment: Environment,
    pub linked_at: DateTime<Utc>,
}
