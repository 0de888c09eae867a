use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::error::{CoreError, CoreResult, EmptyIdSnafu};

// Server-issued identifiers are opaque; the only local guarantee is that they are non-empty.
macro_rules! define_opaque_id {
    ($name:ident, $id_type:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: impl Into<String>) -> CoreResult<Self> {
                let raw = raw.into();
                ensure!(
                    !raw.trim().is_empty(),
                    EmptyIdSnafu {
                        stage: "parse-opaque-id",
                        id_type: $id_type,
                    }
                );
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(value: String) -> CoreResult<Self> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(raw: &str) -> CoreResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_opaque_id!(SessionId, "session-id");
define_opaque_id!(VisitorId, "visitor-id");
define_opaque_id!(MessageId, "message-id");
