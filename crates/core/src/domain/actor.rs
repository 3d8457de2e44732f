use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    User,
    ProviderManager,
    Admin,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::ProviderManager => "pm",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "pm" | "provider_manager" | "providermanager" => Some(Self::ProviderManager),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// The authenticated caller, as supplied by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: ActorRole) -> Self {
        Self { id: id.into(), role }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::User)
    }

    pub fn provider_manager(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::ProviderManager)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, ActorRole::Admin)
    }
}
