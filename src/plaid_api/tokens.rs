use std::fmt::{Debug, Formatter};

/// Short-lived token that initializes Plaid Link in the browser
#[derive(Clone, PartialEq, Eq)]
pub struct LinkToken(pub String);

/// Temporary token handed back by Plaid Link, exchanged for an access token
#[derive(Clone, PartialEq, Eq)]
pub struct PublicToken(pub String);

impl Debug for LinkToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "LinkToken(*****)")
    }
}

impl Debug for PublicToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicToken(*****)")
    }
}
