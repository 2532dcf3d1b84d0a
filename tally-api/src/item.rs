use uuid::Uuid;

use crate::{Error, Time, UserId, STUB_UUID};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct ItemId(pub Uuid);

impl ItemId {
    pub fn stub() -> ItemId {
        ItemId(STUB_UUID)
    }
}

/// A budget line: one expense, owned by the user who logged it.
///
/// `date` doubles as the creation time and crosses the wire as `created_at`.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Item {
    pub id: ItemId,
    pub author_id: UserId,
    pub name: String,
    pub cost: f64,
    pub note: String,
    #[serde(rename = "created_at")]
    pub date: Time,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewItem {
    pub name: String,
    pub cost: f64,
    #[serde(default)]
    pub note: String,
}

impl NewItem {
    // See comments on other `validate` functions throughout tally-api
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.name)?;
        crate::validate_string(&self.note)?;
        Ok(())
    }
}
