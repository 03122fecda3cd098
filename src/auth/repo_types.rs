use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Subscription tier of an account.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Subscription {
    #[default]
    Starter,
    Pro,
    Business,
}

impl Subscription {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subscription::Starter => "starter",
            Subscription::Pro => "pro",
            Subscription::Business => "business",
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown subscription `{0}`")]
pub struct UnknownSubscription(pub String);

impl FromStr for Subscription {
    type Err = UnknownSubscription;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starter" => Ok(Subscription::Starter),
            "pro" => Ok(Subscription::Pro),
            "business" => Ok(Subscription::Business),
            other => Err(UnknownSubscription(other.to_string())),
        }
    }
}

/// User account as the handlers see it.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub subscription: Subscription,
    #[serde(skip_serializing)]
    pub token: Option<String>, // last issued session token; None after logout
    pub avatar_url: String,
    pub profile: serde_json::Value,
    pub created_at: OffsetDateTime,
}

/// Fields needed to create a user; id and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub subscription: Subscription,
    pub avatar_url: String,
    pub profile: serde_json::Value,
}

/// Partial update applied by `UserStore::update_by_id`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub token: Option<Option<String>>,
    pub avatar_url: Option<String>,
    pub subscription: Option<Subscription>,
}

impl UserPatch {
    pub fn token(token: Option<String>) -> Self {
        Self {
            token: Some(token),
            ..Self::default()
        }
    }

    pub fn avatar_url(url: impl Into<String>) -> Self {
        Self {
            avatar_url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn subscription(subscription: Subscription) -> Self {
        Self {
            subscription: Some(subscription),
            ..Self::default()
        }
    }

    pub(crate) fn apply(self, user: &mut User) {
        if let Some(token) = self.token {
            user.token = token;
        }
        if let Some(url) = self.avatar_url {
            user.avatar_url = url;
        }
        if let Some(subscription) = self.subscription {
            user.subscription = subscription;
        }
    }
}

/// `users` table row.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub subscription: String,
    pub token: Option<String>,
    pub avatar_url: String,
    pub profile: serde_json::Value,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = UnknownSubscription;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            subscription: r.subscription.parse()?,
            token: r.token,
            avatar_url: r.avatar_url,
            profile: r.profile,
            created_at: r.created_at,
        })
    }
}
