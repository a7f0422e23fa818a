//! Role-to-permission policy
//!
//! Bearers resolve to one of a small closed set of roles within a tenant;
//! the table here is the single source of truth for what each role may do.
//! `*` grants everything and is reserved for admins.

use std::collections::{HashMap, HashSet};
use std::fmt;

/// The wildcard permission
pub const WILDCARD: &str = "*";

/// Roles a bearer can hold within a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    LimitedAdmin,
    Technician,
    LimitedTechnician,
    Requester,
    ViewOnly,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Admin,
        Role::LimitedAdmin,
        Role::Technician,
        Role::LimitedTechnician,
        Role::Requester,
        Role::ViewOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::LimitedAdmin => "limited-admin",
            Role::Technician => "technician",
            Role::LimitedTechnician => "limited-technician",
            Role::Requester => "requester",
            Role::ViewOnly => "view-only",
        }
    }

    /// Parse a kebab-case role name
    pub fn parse(s: &str) -> Option<Role> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "limited-admin" => Some(Role::LimitedAdmin),
            "technician" => Some(Role::Technician),
            "limited-technician" => Some(Role::LimitedTechnician),
            "requester" => Some(Role::Requester),
            "view-only" => Some(Role::ViewOnly),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A set of held permission strings
pub type PermissionSet = HashSet<String>;

/// Maps roles to the permissions they hold and decides whether a held set
/// satisfies a token's requirements.
pub struct PermissionResolver {
    table: HashMap<Role, PermissionSet>,
    empty: PermissionSet,
}

impl PermissionResolver {
    pub fn new() -> Self {
        Self {
            table: default_table(),
            empty: PermissionSet::new(),
        }
    }

    /// Permissions granted to a role
    pub fn resolve(&self, role: Role) -> &PermissionSet {
        self.table.get(&role).unwrap_or(&self.empty)
    }

    /// Whether a held set covers every required permission.
    ///
    /// The wildcard satisfies anything; otherwise every required entry must
    /// be present verbatim.
    pub fn satisfies(&self, held: &PermissionSet, required: &[String]) -> bool {
        if held.contains(WILDCARD) {
            return true;
        }
        required.iter().all(|p| held.contains(p))
    }
}

impl Default for PermissionResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn set(perms: &[&str]) -> PermissionSet {
    perms.iter().map(|p| p.to_string()).collect()
}

fn default_table() -> HashMap<Role, PermissionSet> {
    let mut table = HashMap::new();
    table.insert(Role::Admin, set(&[WILDCARD]));
    table.insert(
        Role::LimitedAdmin,
        set(&[
            "qr:scan",
            "asset:read",
            "asset:write",
            "work-order:read",
            "work-order:write",
            "pm-schedule:read",
            "pm-schedule:write",
            "location:read",
            "location:write",
            "part:read",
            "part:write",
            "user:read",
        ]),
    );
    table.insert(
        Role::Technician,
        set(&[
            "qr:scan",
            "asset:read",
            "work-order:read",
            "work-order:write",
            "location:read",
            "part:read",
        ]),
    );
    table.insert(Role::LimitedTechnician, set(&["qr:scan", "work-order:read"]));
    table.insert(
        Role::Requester,
        set(&["qr:scan", "work-order:read", "work-order:create"]),
    );
    table.insert(
        Role::ViewOnly,
        set(&[
            "qr:scan",
            "asset:read",
            "work-order:read",
            "pm-schedule:read",
            "location:read",
            "part:read",
        ]),
    );
    table
}
