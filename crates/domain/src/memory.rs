//! Semantic memory items and namespace levels.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Scope of a memory item. Namespaces nest: session memories are the most
/// specific, user memories the broadest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLevel {
    User,
    Trip,
    Session,
}

impl MemoryLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Trip => "trip",
            Self::Session => "session",
        }
    }

    /// Encode the namespace for this level. Trip/session levels require
    /// their respective ids.
    pub fn namespace(
        self,
        user_id: i64,
        trip_id: Option<i64>,
        session_id: Option<&str>,
    ) -> Result<String> {
        match self {
            Self::User => Ok(format!("user:{user_id}")),
            Self::Trip => {
                let trip_id = trip_id.ok_or_else(|| {
                    Error::InvalidParams("trip_id is required for trip level memories".into())
                })?;
                Ok(format!("user:{user_id}:trip:{trip_id}"))
            }
            Self::Session => {
                let session_id = session_id.ok_or_else(|| {
                    Error::InvalidParams("session_id is required for session level memories".into())
                })?;
                Ok(format!("user:{user_id}:session:{session_id}"))
            }
        }
    }
}

/// One retrieved memory with its relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: String,
    pub text: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: Value,
}
