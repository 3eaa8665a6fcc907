use serde::{Deserialize, Serialize};

/// A team. Only the columns the channel queries join on are modeled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub scheme_id: Option<String>,
    pub delete_at: i64,
}

/// A user account, reduced to what membership counts need.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub delete_at: i64,
}
