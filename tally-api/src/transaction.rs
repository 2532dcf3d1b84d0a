use uuid::Uuid;

use crate::{Error, Time, UserId, STUB_UUID};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn stub() -> TransactionId {
        TransactionId(STUB_UUID)
    }
}

/// One raw spending record, e.g. an imported bank statement line.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub description: String,
    pub amount: f64,
    pub category: String,
    pub date: Time,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewTransaction {
    pub description: String,
    pub amount: f64,
    pub category: String,
    /// Defaults to the submission time when absent.
    #[serde(default)]
    pub date: Option<Time>,
}

impl NewTransaction {
    // See comments on other `validate` functions throughout tally-api
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.description)?;
        crate::validate_string(&self.category)?;
        Ok(())
    }
}
