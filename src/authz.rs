//! Row-level ownership checks.

use crate::{
    backend::{Role, UserAccount},
    row::Row,
};

/// The signed-in user as seen by the authorizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl Viewer {
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&UserAccount> for Viewer {
    fn from(account: &UserAccount) -> Self {
        Self::new(account.id.clone(), account.email.clone(), account.role)
    }
}

/// Admins may edit anything; everyone else only rows that name them under
/// some owner alias. Anonymous viewers may edit nothing.
///
/// Older rows record the owner's email, rows stamped by the server record the
/// account id; either identifies the viewer. Comparison is exact after
/// trimming.
pub fn can_edit(viewer: Option<&Viewer>, row: &Row) -> bool {
    let Some(viewer) = viewer else {
        return false;
    };
    if viewer.is_admin() {
        return true;
    }
    let identities = [viewer.email.trim(), viewer.id.trim()];
    row.owner
        .values()
        .any(|owner| identities.iter().any(|id| !id.is_empty() && *id == owner))
}

pub fn can_delete(viewer: Option<&Viewer>, row: &Row) -> bool {
    can_edit(viewer, row)
}

pub fn editable_rows<'a>(viewer: Option<&Viewer>, rows: &'a [Row]) -> Vec<&'a Row> {
    rows.iter().filter(|row| can_edit(viewer, row)).collect()
}
