use serde::{Deserialize, Serialize};

/// A user record as served by the directory API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// One page of users, `GET /users?page={n}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserPage {
    #[serde(rename = "data")]
    pub items: Vec<User>,
    pub page: u32,
    pub total_pages: u32,
}

impl UserPage {
    /// Page 1 of 1 with nothing in it; the state before any fetch.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            page: 1,
            total_pages: 1,
        }
    }

    /// Force `1 <= page <= total_pages`.
    pub fn normalized(mut self) -> Self {
        self.total_pages = self.total_pages.max(1);
        self.page = self.page.clamp(1, self.total_pages);
        self
    }
}

/// Editable subset of a user, sent as the body of `PUT /users/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.email.is_none()
    }

    /// Name of the first supplied field that is blank.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("email", &self.email),
        ]
        .into_iter()
        .find(|(_, value)| value.as_deref().is_some_and(|v| v.trim().is_empty()))
        .map(|(name, _)| name)
    }

    /// Set a field by its wire name. Returns false for unknown names.
    pub fn set(&mut self, field: &str, value: &str) -> bool {
        let slot = match field {
            "first_name" => &mut self.first_name,
            "last_name" => &mut self.last_name,
            "email" => &mut self.email,
            _ => return false,
        };
        *slot = Some(value.to_string());
        true
    }
}

/// Body of a successful update. The API echoes only what it was sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdatedFields {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, rename = "updatedAt")]
    pub updated_at: Option<String>,
}

impl UpdatedFields {
    pub fn apply_to(&self, user: &User) -> User {
        let mut updated = user.clone();
        if let Some(first_name) = &self.first_name {
            updated.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            updated.last_name = last_name.clone();
        }
        if let Some(email) = &self.email {
            updated.email = email.clone();
        }
        updated
    }
}

/// Local search and attribute filters over the resident page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub search_term: String,
    pub active: Option<bool>,
    pub role: Option<String>,
}

/// A single filter field change, as issued by `setFilter(name, value)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    Active(Option<bool>),
    Role(Option<String>),
}

impl FilterCriteria {
    pub fn apply_change(&mut self, change: FilterChange) {
        match change {
            FilterChange::Active(active) => self.active = active,
            FilterChange::Role(role) => self.role = role.filter(|r| !r.is_empty()),
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        self.search_term.is_empty() && self.active.is_none() && self.role.is_none()
    }

    /// Search matches first name, last name or email case-insensitively;
    /// every set attribute filter must match exactly.
    pub fn matches(&self, user: &User) -> bool {
        let term = self.search_term.to_lowercase();
        let matches_search = [&user.first_name, &user.last_name, &user.email]
            .iter()
            .any(|field| field.to_lowercase().contains(&term));

        let matches_active = self.active.is_none() || user.active == self.active;
        let matches_role = match self.role.as_deref() {
            None | Some("") => true,
            Some(role) => user.role.as_deref() == Some(role),
        };

        matches_search && matches_active && matches_role
    }
}

#[cfg(test)]
pub(crate) fn user(id: u64, first_name: &str, last_name: &str) -> User {
    User {
        id,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: format!(
            "{}.{}@reqres.in",
            first_name.to_lowercase(),
            last_name.to_lowercase()
        ),
        avatar: None,
        active: None,
        role: None,
    }
}
