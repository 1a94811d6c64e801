//! Record identity.
//!
//! The cascade engine sees records only through `RecordRef`; field contents
//! never cross that boundary.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Store-assigned, opaque record identifier.
pub type RecordId = Uuid;

/// Address of one record inside one collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub collection: String,
    pub id: RecordId,
}

impl RecordRef {
    pub fn new(collection: impl Into<String>, id: RecordId) -> Self {
        Self {
            collection: collection.into(),
            id,
        }
    }
}

impl Display for RecordRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}
