#[cfg(test)]
#[path = "project_test.rs"]
mod tests;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

/// Identifiers arrive as either strings or integers depending on the table.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    return match value {
        serde_json::Value::String(text) => Ok(text),
        serde_json::Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number identifier, got {other}"
        ))),
    };
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "user_id")]
    pub owner_user_id: String,
    pub repo_url: String,
    #[serde(rename = "last_commit", default)]
    pub last_commit_hash: Option<String>,
}

impl Project {
    pub fn repo_name(&self) -> &str {
        return self
            .repo_url
            .trim_end_matches('/')
            .trim_end_matches(".git")
            .rsplit('/')
            .next()
            .unwrap_or(&self.repo_url);
    }

    pub fn short_commit(&self) -> String {
        return match &self.last_commit_hash {
            Some(hash) if !hash.is_empty() => hash.chars().take(7).collect(),
            _ => "no-sync".to_string(),
        };
    }
}
