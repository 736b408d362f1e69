//! In-process backend.
//!
//! Mirrors the server's observable behavior closely enough to exercise the
//! reconciler: generated ids, owner defaulting to the caller, empty-row
//! skipping on import, duplicate-email rejection on registration. Every trait
//! call increments a counter so tests can assert that validation failures
//! never reach the network.

use std::{
    collections::BTreeMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use chrono::Utc;
use serde_json::{Map, Value as JsonValue, json};
use uuid::Uuid;

use super::{
    ContactItem, CrmBackend, Credentials, ItemUpdate, NewItem, NewUser, RemoteItem, Role,
    SheetKind, TokenResponse, UserAccount, UserUpdate,
};
use crate::error::{ApiError, ApiResult};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Default)]
struct State {
    sheets: BTreeMap<SheetKind, Vec<RemoteItem>>,
    contacts: Vec<ContactItem>,
    users: Vec<(UserAccount, String)>,
    session: Option<String>,
    failing_imports: Vec<SheetKind>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an account and makes it the current session.
    pub fn with_session(email: &str, role: Role) -> Self {
        let backend = Self::new();
        let id = backend.insert_user(email, "secret-password", role);
        backend.lock().session = Some(id);
        backend
    }

    /// Adds an account without counting a call; returns its id.
    pub fn insert_user(&self, email: &str, password: &str, role: Role) -> String {
        let account = UserAccount {
            id: format!("u_{}", short_id()),
            email: email.to_string(),
            name: email.to_string(),
            role,
            verified: true,
            created_at: now(),
            updated_at: None,
            last_login: None,
        };
        let id = account.id.clone();
        self.lock().users.push((account, password.to_string()));
        id
    }

    /// Seeds rows for a resource without counting a call.
    pub fn seed(&self, kind: SheetKind, rows: Vec<(Map<String, JsonValue>, Option<String>)>) {
        let mut state = self.lock();
        let items = state.sheets.entry(kind).or_default();
        for (data, owner_id) in rows {
            items.push(RemoteItem {
                id: format!("{}_{}", prefix(kind), short_id()),
                owner_id,
                data,
                created_at: now(),
                updated_at: None,
            });
        }
    }

    /// Makes every later bulk import for `kind` fail with a 500.
    pub fn fail_imports(&self, kind: SheetKind) {
        self.lock().failing_imports.push(kind);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn items(&self, kind: SheetKind) -> Vec<RemoteItem> {
        self.lock().sheets.get(&kind).cloned().unwrap_or_default()
    }

    pub fn contacts(&self) -> Vec<ContactItem> {
        self.lock().contacts.clone()
    }

    pub fn users(&self) -> Vec<UserAccount> {
        self.lock().users.iter().map(|(u, _)| u.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn session_user(state: &State) -> Option<UserAccount> {
        let id = state.session.as_deref()?;
        state
            .users
            .iter()
            .find(|(u, _)| u.id == id)
            .map(|(u, _)| u.clone())
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn prefix(kind: SheetKind) -> &'static str {
    match kind {
        SheetKind::Pipeline => "p",
        SheetKind::Companies => "co",
        SheetKind::Advisors => "a",
        SheetKind::Investors => "i",
        SheetKind::Deals => "d",
    }
}

fn not_found() -> ApiError {
    ApiError::Status {
        status: 404,
        message: "Not found".to_string(),
    }
}

fn is_blank(row: &Map<String, JsonValue>) -> bool {
    !row.values().any(|v| match v {
        JsonValue::Null => false,
        JsonValue::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

impl CrmBackend for MemoryBackend {
    fn list(&self, kind: SheetKind) -> ApiResult<Vec<RemoteItem>> {
        self.tick();
        Ok(self.items(kind))
    }

    fn create(&self, kind: SheetKind, item: &NewItem) -> ApiResult<RemoteItem> {
        self.tick();
        let mut state = self.lock();
        let owner_id = item
            .owner_id
            .clone()
            .or_else(|| Self::session_user(&state).map(|u| u.id));
        let created = RemoteItem {
            id: format!("{}_{}", prefix(kind), short_id()),
            owner_id,
            data: item.data.clone(),
            created_at: now(),
            updated_at: None,
        };
        state.sheets.entry(kind).or_default().push(created.clone());
        Ok(created)
    }

    fn update(&self, kind: SheetKind, id: &str, update: &ItemUpdate) -> ApiResult<RemoteItem> {
        self.tick();
        let mut state = self.lock();
        let item = state
            .sheets
            .get_mut(&kind)
            .and_then(|items| items.iter_mut().find(|i| i.id == id))
            .ok_or_else(not_found)?;
        if let Some(data) = &update.data {
            item.data = data.clone();
        }
        item.updated_at = Some(now());
        Ok(item.clone())
    }

    fn delete(&self, kind: SheetKind, id: &str) -> ApiResult<()> {
        self.tick();
        let mut state = self.lock();
        let items = state.sheets.entry(kind).or_default();
        let before = items.len();
        items.retain(|i| i.id != id);
        if items.len() == before {
            return Err(not_found());
        }
        Ok(())
    }

    fn clear(&self, kind: SheetKind) -> ApiResult<()> {
        self.tick();
        self.lock().sheets.remove(&kind);
        Ok(())
    }

    fn import(
        &self,
        kind: SheetKind,
        items: &[Map<String, JsonValue>],
        owner_id: Option<&str>,
    ) -> ApiResult<Vec<RemoteItem>> {
        self.tick();
        let mut state = self.lock();
        if state.failing_imports.contains(&kind) {
            return Err(ApiError::Status {
                status: 500,
                message: "Internal Server Error".to_string(),
            });
        }
        if items.is_empty() {
            return Err(ApiError::Status {
                status: 400,
                message: "Empty file".to_string(),
            });
        }
        let owner = owner_id
            .map(str::to_string)
            .or_else(|| Self::session_user(&state).map(|u| u.id));
        let created = items
            .iter()
            .filter(|row| !is_blank(row))
            .map(|row| RemoteItem {
                id: format!("{}_{}", prefix(kind), short_id()),
                owner_id: owner.clone(),
                data: row.clone(),
                created_at: now(),
                updated_at: None,
            })
            .collect::<Vec<_>>();
        state
            .sheets
            .entry(kind)
            .or_default()
            .extend(created.iter().cloned());
        Ok(created)
    }

    fn list_contacts(&self) -> ApiResult<Vec<ContactItem>> {
        self.tick();
        Ok(self.contacts())
    }

    fn create_contact(&self, contact: &str, owner_id: Option<&str>) -> ApiResult<ContactItem> {
        self.tick();
        let mut state = self.lock();
        let owner = owner_id
            .map(str::to_string)
            .or_else(|| Self::session_user(&state).map(|u| u.id));
        let created = ContactItem {
            id: format!("c_{}", short_id()),
            contact: contact.to_string(),
            owner_id: owner,
            created_at: now(),
            updated_at: None,
        };
        state.contacts.push(created.clone());
        Ok(created)
    }

    fn update_contact(&self, id: &str, contact: &str) -> ApiResult<ContactItem> {
        self.tick();
        let mut state = self.lock();
        let item = state
            .contacts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(not_found)?;
        item.contact = contact.to_string();
        item.updated_at = Some(now());
        Ok(item.clone())
    }

    fn delete_contact(&self, id: &str) -> ApiResult<()> {
        self.tick();
        let mut state = self.lock();
        let before = state.contacts.len();
        state.contacts.retain(|c| c.id != id);
        if state.contacts.len() == before {
            return Err(not_found());
        }
        Ok(())
    }

    fn clear_contacts(&self) -> ApiResult<()> {
        self.tick();
        self.lock().contacts.clear();
        Ok(())
    }

    fn import_contacts(
        &self,
        contacts: &[Map<String, JsonValue>],
        owner_id: Option<&str>,
    ) -> ApiResult<Vec<ContactItem>> {
        self.tick();
        let mut state = self.lock();
        let owner = owner_id
            .map(str::to_string)
            .or_else(|| Self::session_user(&state).map(|u| u.id));
        let created = contacts
            .iter()
            .filter_map(|row| row.get("contact").and_then(JsonValue::as_str))
            .map(str::trim)
            .filter(|contact| !contact.is_empty())
            .map(|contact| ContactItem {
                id: format!("c_{}", short_id()),
                contact: contact.to_string(),
                owner_id: owner.clone(),
                created_at: now(),
                updated_at: None,
            })
            .collect::<Vec<_>>();
        state.contacts.extend(created.iter().cloned());
        Ok(created)
    }

    fn login(&self, credentials: &Credentials) -> ApiResult<TokenResponse> {
        self.tick();
        let mut state = self.lock();
        let account = state
            .users
            .iter()
            .find(|(u, password)| {
                u.email.eq_ignore_ascii_case(&credentials.email) && *password == credentials.password
            })
            .map(|(u, _)| u.clone())
            .ok_or_else(|| ApiError::Unauthorized("Incorrect email or password".to_string()))?;
        state.session = Some(account.id.clone());
        Ok(TokenResponse {
            access_token: format!("token-{}", account.id),
            token_type: "bearer".to_string(),
            user: account,
        })
    }

    fn register(&self, user: &NewUser) -> ApiResult<TokenResponse> {
        self.tick();
        if user.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::Status {
                status: 422,
                message: format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
            });
        }
        let mut state = self.lock();
        if state
            .users
            .iter()
            .any(|(u, _)| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(ApiError::Status {
                status: 400,
                message: "User with this email already exists".to_string(),
            });
        }
        let account = UserAccount {
            id: format!("u_{}", short_id()),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.unwrap_or_default(),
            verified: false,
            created_at: now(),
            updated_at: None,
            last_login: None,
        };
        state.users.push((account.clone(), user.password.clone()));
        Ok(TokenResponse {
            access_token: format!("token-{}", account.id),
            token_type: "bearer".to_string(),
            user: account,
        })
    }

    fn me(&self) -> ApiResult<UserAccount> {
        self.tick();
        Self::session_user(&self.lock())
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))
    }

    fn logout(&self) -> ApiResult<()> {
        self.tick();
        self.lock().session = None;
        Ok(())
    }

    fn list_users(&self) -> ApiResult<Vec<UserAccount>> {
        self.tick();
        Ok(self.users())
    }

    fn update_user(&self, id: &str, update: &UserUpdate) -> ApiResult<UserAccount> {
        self.tick();
        let mut state = self.lock();
        let (account, _) = state
            .users
            .iter_mut()
            .find(|(u, _)| u.id == id)
            .ok_or_else(not_found)?;
        if let Some(email) = &update.email {
            account.email = email.clone();
        }
        if let Some(name) = &update.name {
            account.name = name.clone();
        }
        if let Some(role) = update.role {
            account.role = role;
        }
        if let Some(verified) = update.verified {
            account.verified = verified;
        }
        account.updated_at = Some(now());
        Ok(account.clone())
    }

    fn delete_user(&self, id: &str) -> ApiResult<()> {
        self.tick();
        let mut state = self.lock();
        let before = state.users.len();
        state.users.retain(|(u, _)| u.id != id);
        if state.users.len() == before {
            return Err(not_found());
        }
        Ok(())
    }

    fn set_user_password(&self, id: &str, password: &str) -> ApiResult<()> {
        self.tick();
        let mut state = self.lock();
        let entry = state
            .users
            .iter_mut()
            .find(|(u, _)| u.id == id)
            .ok_or_else(not_found)?;
        entry.1 = password.to_string();
        Ok(())
    }

    fn audit_summary(&self) -> ApiResult<JsonValue> {
        self.tick();
        let state = self.lock();
        let per_resource = state
            .sheets
            .iter()
            .map(|(kind, items)| (kind.path().to_string(), json!(items.len())))
            .collect::<Map<_, _>>();
        Ok(json!({
            "users": state.users.len(),
            "contacts": state.contacts.len(),
            "resources": per_resource,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_skips_blank_rows_and_stamps_session_owner() {
        let backend = MemoryBackend::with_session("a@x.com", Role::Employee);
        let mut filled = Map::new();
        filled.insert("Company".into(), json!("Acme"));
        let mut blank = Map::new();
        blank.insert("Company".into(), json!("  "));
        let created = backend
            .import(SheetKind::Pipeline, &[filled, blank], None)
            .expect("import");
        assert_eq!(created.len(), 1);
        let owner = created[0].owner_id.clone().expect("owner");
        assert_eq!(backend.me().unwrap().id, owner);
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn register_rejects_duplicate_email() {
        let backend = MemoryBackend::new();
        let user = NewUser {
            email: "a@x.com".into(),
            password: "secret1".into(),
            name: "A".into(),
            role: None,
        };
        backend.register(&user).expect("first registration");
        let err = backend.register(&user).unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert_eq!(backend.users().len(), 1);
    }
}
