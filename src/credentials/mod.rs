mod access_token;
mod credential;
mod institution_id;
mod store;

pub use access_token::AccessToken;
pub use credential::Credential;
pub use institution_id::InstitutionId;
pub use store::{CredentialStore, StoreError};
