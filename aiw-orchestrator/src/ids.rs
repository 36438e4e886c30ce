use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// How a workspace id is derived from the slug of its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// The slug itself; a second workspace with the same name is a `DuplicateId`.
    Verbatim,
    /// `slug-xxxxxxxx` with eight hex characters from a random UUID.
    #[default]
    Suffixed,
}

impl IdStrategy {
    pub fn generate(self, slug: &str) -> String {
        match self {
            Self::Verbatim => slug.to_string(),
            Self::Suffixed => {
                let uuid = Uuid::new_v4().simple().to_string();
                format!("{}-{}", slug, &uuid[..8])
            }
        }
    }
}

impl FromStr for IdStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verbatim" => Ok(Self::Verbatim),
            "suffixed" => Ok(Self::Suffixed),
            other => Err(format!(
                "Unknown id strategy '{}' (expected 'verbatim' or 'suffixed')",
                other
            )),
        }
    }
}

impl fmt::Display for IdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verbatim => f.write_str("verbatim"),
            Self::Suffixed => f.write_str("suffixed"),
        }
    }
}
