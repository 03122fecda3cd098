use serde::{Deserialize, Serialize};

use super::repo_types::{Subscription, User};

/// Request body for user registration. Unknown fields are kept as profile data.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub subscription: Option<Subscription>,
    #[serde(flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub subscription: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PublicUser {
    pub email: String,
    pub subscription: Subscription,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            email: u.email.clone(),
            subscription: u.subscription,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    #[serde(rename = "avatarURL")]
    pub avatar_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_collects_extra_fields() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "email": "a@x.com",
            "password": "secret1",
            "name": "Ann",
            "age": 33
        }))
        .unwrap();
        assert_eq!(req.subscription, None);
        assert_eq!(req.profile["name"], "Ann");
        assert_eq!(req.profile.len(), 2);
        assert!(!req.profile.contains_key("password"));
    }

    #[test]
    fn avatar_response_uses_camel_case_key() {
        let json = serde_json::to_value(AvatarResponse {
            avatar_url: "avatars/x.png".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "avatarURL": "avatars/x.png" }));
    }
}
