//! Blocking HTTP client for the CRM REST API.
//!
//! Every request carries `Authorization: Bearer <token>` when a token is
//! held. A 401 response clears the token, so later calls go out
//! unauthenticated. Non-2xx responses surface the server's `detail` message
//! as is.

use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use log::{debug, warn};
use reqwest::{
    Method, StatusCode,
    blocking::{Client, RequestBuilder},
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue, json};

use super::{
    ContactItem, CrmBackend, Credentials, ItemUpdate, NewItem, NewUser, RemoteItem, SheetKind,
    TokenResponse, UserAccount, UserUpdate,
};
use crate::{
    config::Settings,
    error::{ApiError, ApiResult},
};

pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Mutex<Option<String>>,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> ApiResult<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: Mutex::new(token.filter(|t| !t.trim().is_empty())),
        })
    }

    pub fn from_settings(settings: &Settings, base_url: impl Into<String>) -> ApiResult<Self> {
        Self::new(
            base_url,
            settings.token.clone(),
            Duration::from_millis(settings.connect_timeout_ms),
            Duration::from_millis(settings.request_timeout_ms),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<String> {
        self.token_slot().clone()
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token_slot() = token;
    }

    fn token_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{method} {url}");
        let builder = self.client.request(method, url);
        match self.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends the request and returns the body, or `None` for 204 responses.
    fn execute(&self, builder: RequestBuilder) -> ApiResult<Option<String>> {
        let response = builder
            .send()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if status == StatusCode::UNAUTHORIZED {
            warn!("Server rejected the token; clearing it");
            self.set_token(None);
            return Err(ApiError::Unauthorized(error_message(status, &body)));
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(body))
    }

    fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ApiResult<T> {
        let body = self
            .execute(builder)?
            .ok_or_else(|| ApiError::Decode("empty response body".to_string()))?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn send_only(&self, builder: RequestBuilder) -> ApiResult<()> {
        self.execute(builder).map(|_| ())
    }
}

/// Extracts the user-facing message from an error body.
pub fn error_message(status: StatusCode, body: &str) -> String {
    let fallback = || {
        format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .trim_end()
        .to_string()
    };
    let Ok(parsed) = serde_json::from_str::<JsonValue>(body) else {
        return fallback();
    };
    match parsed.get("detail") {
        Some(JsonValue::String(message)) => message.clone(),
        Some(JsonValue::Array(entries)) => entries
            .first()
            .and_then(|entry| entry.get("msg"))
            .and_then(JsonValue::as_str)
            .unwrap_or("Unknown error")
            .to_string(),
        _ => fallback(),
    }
}

fn owner_body(key: &str, rows: &[Map<String, JsonValue>], owner_id: Option<&str>) -> JsonValue {
    let mut body = Map::new();
    body.insert(
        key.to_string(),
        JsonValue::Array(rows.iter().cloned().map(JsonValue::Object).collect()),
    );
    if let Some(owner) = owner_id {
        body.insert("owner_id".to_string(), JsonValue::String(owner.to_string()));
    }
    JsonValue::Object(body)
}

impl CrmBackend for HttpBackend {
    fn list(&self, kind: SheetKind) -> ApiResult<Vec<RemoteItem>> {
        self.fetch(self.request(Method::GET, &format!("/{}", kind.path())))
    }

    fn create(&self, kind: SheetKind, item: &NewItem) -> ApiResult<RemoteItem> {
        self.fetch(
            self.request(Method::POST, &format!("/{}", kind.path()))
                .json(item),
        )
    }

    fn update(&self, kind: SheetKind, id: &str, update: &ItemUpdate) -> ApiResult<RemoteItem> {
        self.fetch(
            self.request(Method::PUT, &format!("/{}/{id}", kind.path()))
                .json(update),
        )
    }

    fn delete(&self, kind: SheetKind, id: &str) -> ApiResult<()> {
        self.send_only(self.request(Method::DELETE, &format!("/{}/{id}", kind.path())))
    }

    fn clear(&self, kind: SheetKind) -> ApiResult<()> {
        self.send_only(self.request(Method::DELETE, &format!("/{}/clear", kind.path())))
    }

    fn import(
        &self,
        kind: SheetKind,
        items: &[Map<String, JsonValue>],
        owner_id: Option<&str>,
    ) -> ApiResult<Vec<RemoteItem>> {
        let body = owner_body(kind.import_key(), items, owner_id);
        self.fetch(
            self.request(Method::POST, &format!("/{}/import", kind.path()))
                .json(&body),
        )
    }

    fn list_contacts(&self) -> ApiResult<Vec<ContactItem>> {
        self.fetch(self.request(Method::GET, "/contacts"))
    }

    fn create_contact(&self, contact: &str, owner_id: Option<&str>) -> ApiResult<ContactItem> {
        let mut body = json!({ "contact": contact });
        if let Some(owner) = owner_id {
            body["owner_id"] = JsonValue::String(owner.to_string());
        }
        self.fetch(self.request(Method::POST, "/contacts").json(&body))
    }

    fn update_contact(&self, id: &str, contact: &str) -> ApiResult<ContactItem> {
        self.fetch(
            self.request(Method::PUT, &format!("/contacts/{id}"))
                .json(&json!({ "contact": contact })),
        )
    }

    fn delete_contact(&self, id: &str) -> ApiResult<()> {
        self.send_only(self.request(Method::DELETE, &format!("/contacts/{id}")))
    }

    fn clear_contacts(&self) -> ApiResult<()> {
        self.send_only(self.request(Method::DELETE, "/contacts/clear"))
    }

    fn import_contacts(
        &self,
        contacts: &[Map<String, JsonValue>],
        owner_id: Option<&str>,
    ) -> ApiResult<Vec<ContactItem>> {
        let body = owner_body("contacts", contacts, owner_id);
        self.fetch(self.request(Method::POST, "/contacts/import").json(&body))
    }

    fn login(&self, credentials: &Credentials) -> ApiResult<TokenResponse> {
        let response: TokenResponse =
            self.fetch(self.request(Method::POST, "/auth/login").json(credentials))?;
        self.set_token(Some(response.access_token.clone()));
        Ok(response)
    }

    fn register(&self, user: &NewUser) -> ApiResult<TokenResponse> {
        self.fetch(self.request(Method::POST, "/auth/register").json(user))
    }

    fn me(&self) -> ApiResult<UserAccount> {
        self.fetch(self.request(Method::GET, "/auth/me"))
    }

    fn logout(&self) -> ApiResult<()> {
        let outcome = self.send_only(self.request(Method::POST, "/auth/logout"));
        self.set_token(None);
        outcome
    }

    fn list_users(&self) -> ApiResult<Vec<UserAccount>> {
        self.fetch(self.request(Method::GET, "/users"))
    }

    fn update_user(&self, id: &str, update: &UserUpdate) -> ApiResult<UserAccount> {
        self.fetch(
            self.request(Method::PUT, &format!("/users/{id}"))
                .json(update),
        )
    }

    fn delete_user(&self, id: &str) -> ApiResult<()> {
        self.send_only(self.request(Method::DELETE, &format!("/users/{id}")))
    }

    fn set_user_password(&self, id: &str, password: &str) -> ApiResult<()> {
        self.send_only(
            self.request(Method::PUT, &format!("/users/{id}/password"))
                .json(&json!({ "password": password })),
        )
    }

    fn audit_summary(&self) -> ApiResult<JsonValue> {
        self.fetch(self.request(Method::GET, "/users/audit-summary"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_detail_string() {
        let message = error_message(StatusCode::BAD_REQUEST, r#"{"detail":"Incorrect file for Pipeline"}"#);
        assert_eq!(message, "Incorrect file for Pipeline");
    }

    #[test]
    fn error_message_reads_validation_lists() {
        let body = r#"{"detail":[{"loc":["body","email"],"msg":"value is not a valid email address","type":"value_error"}]}"#;
        assert_eq!(
            error_message(StatusCode::UNPROCESSABLE_ENTITY, body),
            "value is not a valid email address"
        );
    }

    #[test]
    fn error_message_falls_back_to_status_line() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "<html>oops</html>"),
            "HTTP 502: Bad Gateway"
        );
    }

    #[test]
    fn import_body_carries_owner_and_key() {
        let mut row = Map::new();
        row.insert("Company".into(), JsonValue::String("Acme".into()));
        let body = owner_body("deals", &[row], Some("u_1"));
        assert_eq!(body["deals"][0]["Company"], "Acme");
        assert_eq!(body["owner_id"], "u_1");
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let backend = HttpBackend::new(
            "http://localhost:8000/api/",
            Some("  ".to_string()),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .expect("client");
        assert_eq!(backend.base_url(), "http://localhost:8000/api");
        assert_eq!(backend.token(), None);
    }
}
