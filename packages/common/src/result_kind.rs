#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a participant handed in for a challenge.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// A link to an externally hosted result.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "url"))]
    Url,
    /// A file stored in the blob store.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "file"))]
    File,
    /// Free-form text.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "text"))]
    Text,
}

impl ResultKind {
    pub const ALL: &'static [ResultKind] = &[Self::Url, Self::File, Self::Text];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::File => "file",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown result kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown result kind: {0}")]
pub struct ParseResultKindError(pub String);

impl FromStr for ResultKind {
    type Err = ParseResultKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "url" => Ok(Self::Url),
            "file" => Ok(Self::File),
            "text" => Ok(Self::Text),
            other => Err(ParseResultKindError(other.to_string())),
        }
    }
}
