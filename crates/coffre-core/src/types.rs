use serde::{Deserialize, Serialize};

/// Account role. A closed enum so authorization checks never compare raw
/// strings at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Account lock state. The gate consulted before any authenticated action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    Active,
    Locked,
}

impl LockState {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockState::Locked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Active => "active",
            LockState::Locked => "locked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(LockState::Active),
            "locked" => Some(LockState::Locked),
            _ => None,
        }
    }
}

/// Capability carried by a share grant, distinct from ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    View,
    Download,
    ViewDownload,
}

impl Permission {
    /// True when the grant allows previewing content.
    pub fn allows_view(&self) -> bool {
        matches!(self, Permission::View | Permission::ViewDownload)
    }

    /// True when the grant allows fetching the raw bytes.
    pub fn allows_download(&self) -> bool {
        matches!(self, Permission::Download | Permission::ViewDownload)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::View => "view",
            Permission::Download => "download",
            Permission::ViewDownload => "view_download",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "view" => Some(Permission::View),
            "download" => Some(Permission::Download),
            "view_download" => Some(Permission::ViewDownload),
            _ => None,
        }
    }
}

/// Security-relevant action recorded in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Upload,
    Download,
    Share,
    Delete,
    Login,
    FailedLogin,
    Lock,
    Unlock,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Upload => "upload",
            Action::Download => "download",
            Action::Share => "share",
            Action::Delete => "delete",
            Action::Login => "login",
            Action::FailedLogin => "failed_login",
            Action::Lock => "lock",
            Action::Unlock => "unlock",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(Action::Upload),
            "download" => Some(Action::Download),
            "share" => Some(Action::Share),
            "delete" => Some(Action::Delete),
            "login" => Some(Action::Login),
            "failed_login" => Some(Action::FailedLogin),
            "lock" => Some(Action::Lock),
            "unlock" => Some(Action::Unlock),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
