use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::layers::api::{ApiError, BackendClient};
use crate::layers::storage::{LocalStorage, ACCESS_TOKEN_KEY, PROFILE_UPDATE_TIME_KEY, USER_KEY};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    pub login_method: String,
    pub avatar_url: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub is_new_user: bool,
}

fn avatar_for(seed: &str) -> String {
    format!(
        "https://api.dicebear.com/9.x/adventurer/svg?seed={}",
        urlencoding::encode(seed)
    )
}

/// Interests arrive either as a list or as a JSON-encoded list in a string.
fn parse_interests(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Builds the stored user record from an auth response. The user may sit under
/// `user` or at the top level; `fallback_name` seeds the avatar when the
/// response has no username.
pub fn user_from_response(data: &Value, fallback_name: &str) -> User {
    let user = data.get("user").filter(|u| u.is_object()).unwrap_or(data);
    let str_field = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

    let username = str_field(user, "username");
    let seed = username.clone().unwrap_or_else(|| fallback_name.to_string());
    let avatar_url = str_field(user, "avatar_url")
        .or_else(|| str_field(data, "avatar_url"))
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| avatar_for(&seed));

    User {
        id: user.get("id").and_then(Value::as_i64),
        email: str_field(user, "email"),
        username,
        created_at: str_field(user, "created_at"),
        login_method: str_field(user, "login_method")
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "email".to_string()),
        avatar_url,
        interests: parse_interests(user.get("interests")),
        access_token: str_field(data, "access_token"),
        is_new_user: data.get("is_new_user").and_then(Value::as_bool).unwrap_or(false),
    }
}

/// Login state kept in local storage under `access_token` and `user`.
pub struct AuthSession {
    storage: LocalStorage,
}

impl AuthSession {
    pub fn new(storage: LocalStorage) -> Self {
        Self { storage }
    }

    pub fn token(&self) -> Result<Option<String>> {
        let token: Option<String> = self.storage.get_json(ACCESS_TOKEN_KEY)?;
        Ok(token.filter(|t| !t.is_empty()))
    }

    pub fn is_authenticated(&self) -> Result<bool> {
        Ok(self.token()?.is_some())
    }

    pub fn stored_user(&self) -> Result<Option<User>> {
        self.storage.get_json(USER_KEY)
    }

    fn remember(&self, user: &User) -> Result<()> {
        let token = user.access_token.clone().unwrap_or_default();
        self.storage.set_json(ACCESS_TOKEN_KEY, &token)?;
        self.storage.set_json(USER_KEY, user)?;
        self.storage
            .set_json(PROFILE_UPDATE_TIME_KEY, &chrono::Utc::now().timestamp_millis())?;
        Ok(())
    }

    pub async fn register(
        &self,
        client: &BackendClient,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<User> {
        let body = json!({ "email": email, "username": username, "password": password });
        let data: Value = client.post_json("/api/auth/register", &body).await?;
        let user = user_from_response(&data, username);
        self.remember(&user)?;
        tracing::info!("Registration successful: {}", username);
        Ok(user)
    }

    pub async fn login(&self, client: &BackendClient, username: &str, password: &str) -> Result<User> {
        let data: Value = client
            .post_form("/api/auth/login", &[("username", username), ("password", password)])
            .await?;
        let user = user_from_response(&data, username);
        self.remember(&user)?;
        tracing::info!("Login successful: {}", user.username.as_deref().unwrap_or(username));
        Ok(user)
    }

    /// Asks the backend who the current token belongs to.
    pub async fn current_user(&self, client: &BackendClient) -> Result<Value, ApiError> {
        client.get_json("/api/auth/me", &[]).await
    }

    pub fn logout(&self) -> Result<()> {
        self.storage.remove(ACCESS_TOKEN_KEY)?;
        self.storage.remove(USER_KEY)?;
        tracing::info!("User logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use url::Url;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_user_defaults_are_filled() {
        let data = json!({
            "access_token": "tok",
            "user": {"id": 3, "username": "ada", "interests": "[\"AI\",\"Biology\"]"}
        });
        let user = user_from_response(&data, "ignored");
        assert_eq!(user.id, Some(3));
        assert_eq!(user.login_method, "email");
        assert_eq!(user.avatar_url, "https://api.dicebear.com/9.x/adventurer/svg?seed=ada");
        assert_eq!(user.interests, vec!["AI", "Biology"]);
        assert_eq!(user.access_token.as_deref(), Some("tok"));
        assert!(!user.is_new_user);
    }

    #[test]
    fn test_flat_response_and_bad_interests() {
        let data = json!({"email": "a@b.c", "interests": "not json", "login_method": "google"});
        let user = user_from_response(&data, "fallback");
        assert_eq!(user.email.as_deref(), Some("a@b.c"));
        assert_eq!(user.login_method, "google");
        assert!(user.interests.is_empty());
        assert!(user.avatar_url.ends_with("seed=fallback"));
    }

    #[tokio::test]
    async fn test_login_stores_token_and_logout_clears() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("username=ada"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "user": {"id": 1, "username": "ada", "interests": ["AI"]},
                "is_new_user": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let session = AuthSession::new(LocalStorage::open(dir.path()).unwrap());
        let client = BackendClient::new(Url::parse(&server.uri()).unwrap()).unwrap();

        let user = session.login(&client, "ada", "pw").await.unwrap();
        assert!(user.is_new_user);
        assert_eq!(session.token().unwrap().as_deref(), Some("tok"));
        assert_eq!(session.stored_user().unwrap().unwrap().username.as_deref(), Some("ada"));

        session.logout().unwrap();
        assert!(!session.is_authenticated().unwrap());
        assert!(session.stored_user().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_login_keeps_storage_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Incorrect username or password"})))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let session = AuthSession::new(LocalStorage::open(dir.path()).unwrap());
        let client = BackendClient::new(Url::parse(&server.uri()).unwrap()).unwrap();

        let err = session.login(&client, "ada", "wrong").await.unwrap_err();
        let api = err.downcast_ref::<ApiError>().unwrap();
        assert_eq!(api.user_message(), "Incorrect username or password");
        assert!(!session.is_authenticated().unwrap());
    }
}
