use serde::Deserialize;
use serde::Serialize;

use super::string_or_number;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub risk_type: String,
    pub description: String,
}
