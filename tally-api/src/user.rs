use uuid::Uuid;

use crate::{Error, STUB_UUID};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn stub() -> UserId {
        UserId(STUB_UUID)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Registration payload. The password is stored and compared verbatim.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl NewUser {
    pub fn new(id: UserId, name: String, password: String) -> NewUser {
        NewUser {
            id,
            name,
            password,
            email: None,
            phone: None,
        }
    }

    // See comments on other `validate` functions throughout tally-api
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::InvalidName(self.name.clone()));
        }
        crate::validate_string(&self.name)?;
        crate::validate_string(&self.password)?;
        if let Some(email) = &self.email {
            crate::validate_string(email)?;
        }
        if let Some(phone) = &self.phone {
            crate::validate_string(phone)?;
        }
        Ok(())
    }
}
