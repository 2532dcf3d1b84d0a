use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Uuid already used {0}")]
    UuidAlreadyUsed(Uuid),

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("Email already used {0}")]
    EmailAlreadyUsed(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Invalid user name {0:?}")]
    InvalidName(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Error::UuidAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::NameAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::EmailAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::InvalidName(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::InvalidCredentials => json!({
                "message": "invalid credentials",
                "type": "invalid-credentials",
            }),
            Error::UuidAlreadyUsed(u) => json!({
                "message": "uuid conflict",
                "type": "conflict-uuid",
                "uuid": u,
            }),
            Error::NameAlreadyUsed(n) => json!({
                "message": "name already used",
                "type": "conflict-name",
                "name": n,
            }),
            Error::EmailAlreadyUsed(e) => json!({
                "message": "email already used",
                "type": "conflict-email",
                "email": e,
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::InvalidName(n) => json!({
                "message": "there was an invalid user name",
                "type": "invalid-name",
                "name": n,
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let field = |name: &str| -> anyhow::Result<String> {
            Ok(String::from(
                data.get(name)
                    .and_then(|f| f.as_str())
                    .ok_or_else(|| anyhow!("error contents has no string field {name:?}"))?,
            ))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(field("message").unwrap_or_default()),
                "permission-denied" => Error::PermissionDenied,
                "invalid-credentials" => Error::InvalidCredentials,
                "conflict-uuid" => Error::UuidAlreadyUsed(
                    field("uuid")?
                        .parse()
                        .context("parsing uuid of a conflict-uuid error")?,
                ),
                "conflict-name" => Error::NameAlreadyUsed(field("name")?),
                "conflict-email" => Error::EmailAlreadyUsed(field("email")?),
                "null-byte" => Error::NullByteInString(field("string")?),
                "invalid-name" => Error::InvalidName(field("name")?),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_round_trip_through_json() {
        let errors = vec![
            Error::Unknown(String::from("boom")),
            Error::PermissionDenied,
            Error::InvalidCredentials,
            Error::UuidAlreadyUsed(crate::STUB_UUID),
            Error::NameAlreadyUsed(String::from("wilfred")),
            Error::EmailAlreadyUsed(String::from("w@example.com")),
            Error::NullByteInString(String::from("a\0b")),
            Error::InvalidName(String::from("")),
        ];
        for e in errors {
            let parsed = Error::parse(&e.contents()).expect("parsing serialized error");
            assert_eq!(parsed, e);
        }
    }
}
