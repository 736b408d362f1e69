//! REST contract of the CRM backend.
//!
//! [`CrmBackend`] is the seam between the sync engine and the service that
//! stores the collections. [`http::HttpBackend`] speaks the real REST API;
//! [`memory::MemoryBackend`] keeps everything in process and counts calls,
//! which is what the tests drive the reconciler with.

pub mod http;
pub mod memory;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::{
    error::ApiResult,
    row::{OwnerRefs, Row, is_owner_alias},
};

/// The five resources sharing the generic `{id, owner_id, data}` shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetKind {
    Pipeline,
    Companies,
    Advisors,
    Investors,
    Deals,
}

impl SheetKind {
    pub const ALL: [SheetKind; 5] = [
        SheetKind::Pipeline,
        SheetKind::Companies,
        SheetKind::Advisors,
        SheetKind::Investors,
        SheetKind::Deals,
    ];

    pub fn path(self) -> &'static str {
        match self {
            SheetKind::Pipeline => "pipeline",
            SheetKind::Companies => "companies",
            SheetKind::Advisors => "advisors",
            SheetKind::Investors => "investors",
            SheetKind::Deals => "deals",
        }
    }

    /// Key carrying the rows in a bulk import body.
    pub fn import_key(self) -> &'static str {
        match self {
            SheetKind::Deals => "deals",
            _ => "items",
        }
    }
}

impl fmt::Display for SheetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Every collection the CLI and the event bus can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pipeline,
    Companies,
    Advisors,
    Investors,
    Deals,
    Contacts,
    Users,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::Companies => "companies",
            ResourceKind::Advisors => "advisors",
            ResourceKind::Investors => "investors",
            ResourceKind::Deals => "deals",
            ResourceKind::Contacts => "contacts",
            ResourceKind::Users => "users",
        }
    }

    pub fn sheet(self) -> Option<SheetKind> {
        match self {
            ResourceKind::Pipeline => Some(SheetKind::Pipeline),
            ResourceKind::Companies => Some(SheetKind::Companies),
            ResourceKind::Advisors => Some(SheetKind::Advisors),
            ResourceKind::Investors => Some(SheetKind::Investors),
            ResourceKind::Deals => Some(SheetKind::Deals),
            ResourceKind::Contacts | ResourceKind::Users => None,
        }
    }
}

impl From<SheetKind> for ResourceKind {
    fn from(kind: SheetKind) -> Self {
        match kind {
            SheetKind::Pipeline => ResourceKind::Pipeline,
            SheetKind::Companies => ResourceKind::Companies,
            SheetKind::Advisors => ResourceKind::Advisors,
            SheetKind::Investors => ResourceKind::Investors,
            SheetKind::Deals => ResourceKind::Deals,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pipeline" => Ok(ResourceKind::Pipeline),
            "companies" | "company" => Ok(ResourceKind::Companies),
            "advisors" | "advisor" => Ok(ResourceKind::Advisors),
            "investors" | "investor" => Ok(ResourceKind::Investors),
            "deals" | "deal" => Ok(ResourceKind::Deals),
            "contacts" | "contact" => Ok(ResourceKind::Contacts),
            "users" | "user" => Ok(ResourceKind::Users),
            other => Err(format!("Unknown resource '{other}'")),
        }
    }
}

/// One record of a generic resource as the server returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub data: Map<String, JsonValue>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl RemoteItem {
    /// Flattens the item into a row. Owner aliases stored inside `data` by
    /// older clients are kept next to the server's `owner_id`.
    pub fn to_row(&self) -> Row {
        let mut row = Row::from_json_map(&self.data);
        row.id = Some(self.id.clone());
        if let Some(owner) = &self.owner_id {
            row.owner.set("owner_id", owner.clone());
        }
        row
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub data: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, JsonValue>>,
}

/// Converts a row into the `data` payload, carrying legacy owner aliases
/// other than `owner_id` so old rows stay editable by their creator.
pub fn row_payload(row: &Row) -> Map<String, JsonValue> {
    let mut data = row.to_data();
    for (alias, value) in row.owner.iter() {
        if alias != "owner_id" && is_owner_alias(alias) {
            data.insert(alias.to_string(), JsonValue::String(value.to_string()));
        }
    }
    data
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactItem {
    pub id: String,
    pub contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl ContactItem {
    pub fn to_row(&self) -> Row {
        let mut row = Row::with_id(self.id.clone());
        row.fields.insert("contact".to_string(), self.contact.clone());
        if let Some(owner) = &self.owner_id {
            row.owner = OwnerRefs::single(owner.clone());
        }
        row
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Employee,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "employee" | "" => Ok(Role::Employee),
            other => Err(format!("Unknown role '{other}'")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub role: Role,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserAccount,
}

/// CRUD, bulk import and auth operations of the CRM REST service.
pub trait CrmBackend {
    fn list(&self, kind: SheetKind) -> ApiResult<Vec<RemoteItem>>;
    fn create(&self, kind: SheetKind, item: &NewItem) -> ApiResult<RemoteItem>;
    fn update(&self, kind: SheetKind, id: &str, update: &ItemUpdate) -> ApiResult<RemoteItem>;
    fn delete(&self, kind: SheetKind, id: &str) -> ApiResult<()>;
    fn clear(&self, kind: SheetKind) -> ApiResult<()>;
    fn import(
        &self,
        kind: SheetKind,
        items: &[Map<String, JsonValue>],
        owner_id: Option<&str>,
    ) -> ApiResult<Vec<RemoteItem>>;

    fn list_contacts(&self) -> ApiResult<Vec<ContactItem>>;
    fn create_contact(&self, contact: &str, owner_id: Option<&str>) -> ApiResult<ContactItem>;
    fn update_contact(&self, id: &str, contact: &str) -> ApiResult<ContactItem>;
    fn delete_contact(&self, id: &str) -> ApiResult<()>;
    fn clear_contacts(&self) -> ApiResult<()>;
    fn import_contacts(
        &self,
        contacts: &[Map<String, JsonValue>],
        owner_id: Option<&str>,
    ) -> ApiResult<Vec<ContactItem>>;

    fn login(&self, credentials: &Credentials) -> ApiResult<TokenResponse>;
    fn register(&self, user: &NewUser) -> ApiResult<TokenResponse>;
    fn me(&self) -> ApiResult<UserAccount>;
    fn logout(&self) -> ApiResult<()>;

    fn list_users(&self) -> ApiResult<Vec<UserAccount>>;
    fn update_user(&self, id: &str, update: &UserUpdate) -> ApiResult<UserAccount>;
    fn delete_user(&self, id: &str) -> ApiResult<()>;
    fn set_user_password(&self, id: &str, password: &str) -> ApiResult<()>;
    fn audit_summary(&self) -> ApiResult<JsonValue>;
}

/// Loads any collection as rows.
pub fn load_rows<B: CrmBackend + ?Sized>(backend: &B, kind: ResourceKind) -> ApiResult<Vec<Row>> {
    match kind {
        ResourceKind::Contacts => Ok(backend
            .list_contacts()?
            .iter()
            .map(ContactItem::to_row)
            .collect()),
        ResourceKind::Users => Ok(backend
            .list_users()?
            .iter()
            .map(user_row)
            .collect()),
        other => match other.sheet() {
            Some(sheet) => Ok(backend.list(sheet)?.iter().map(RemoteItem::to_row).collect()),
            None => Ok(Vec::new()),
        },
    }
}

fn user_row(user: &UserAccount) -> Row {
    let mut row = Row::with_id(user.id.clone());
    row.set("email", user.email.clone());
    row.set("name", user.name.clone());
    row.set("role", user.role.as_str());
    row.set("verified", user.verified.to_string());
    row.set("created_at", user.created_at.clone());
    row.set("last_login", user.last_login.clone().unwrap_or_default());
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_item_keeps_legacy_owner_aliases() {
        let item: RemoteItem = serde_json::from_value(json!({
            "id": "p_1",
            "owner_id": "u_1",
            "data": {"Company": "Acme", "_owner": "a@x.com"},
            "created_at": "2024-01-01T00:00:00"
        }))
        .unwrap();
        let row = item.to_row();
        assert_eq!(row.id.as_deref(), Some("p_1"));
        assert_eq!(row.owner.values().collect::<Vec<_>>(), ["u_1", "a@x.com"]);
        assert_eq!(row.fields.len(), 1);

        let payload = row_payload(&row);
        assert_eq!(payload.get("_owner"), Some(&json!("a@x.com")));
        assert!(payload.get("owner_id").is_none());
    }

    #[test]
    fn resource_names_parse_leniently() {
        assert_eq!("Pipeline".parse::<ResourceKind>().unwrap(), ResourceKind::Pipeline);
        assert_eq!("advisor".parse::<ResourceKind>().unwrap(), ResourceKind::Advisors);
        assert!("invoices".parse::<ResourceKind>().is_err());
        assert_eq!(SheetKind::Deals.import_key(), "deals");
        assert_eq!(SheetKind::Investors.import_key(), "items");
    }
}
