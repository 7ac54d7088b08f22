//! Strongly-typed identifiers and the policy token codec.
//!
//! Every entity that participates in authorization (users, roles,
//! permissions, tenants, menus) has a numeric id. Internally ids are carried
//! as [`EntityId`] (`kind` + `id`); they are only rendered to the prefixed
//! token form (`u42`, `r7`, `t1`, ...) at the policy-evaluator boundary.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Id of the tenant every installation starts with (`"default"`).
pub const DEFAULT_TENANT_ID: u64 = 1;

/// Code under which the default tenant is addressed by humans.
pub const DEFAULT_TENANT_CODE: &str = "default";

/// The kinds of entity that can appear in a policy tuple.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Role,
    /// A permission (resource) granted to roles or users.
    Permission,
    /// A tenant, used as the policy domain.
    Tenant,
    Menu,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::User,
        EntityKind::Role,
        EntityKind::Permission,
        EntityKind::Tenant,
        EntityKind::Menu,
    ];

    /// One-character tag prepended to the decimal id.
    pub const fn tag(self) -> char {
        match self {
            EntityKind::User => 'u',
            EntityKind::Role => 'r',
            EntityKind::Permission => 'a',
            EntityKind::Tenant => 't',
            EntityKind::Menu => 'm',
        }
    }

    pub fn from_tag(tag: char) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Role => "role",
            EntityKind::Permission => "permission",
            EntityKind::Tenant => "tenant",
            EntityKind::Menu => "menu",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(kind, id)` pair.
///
/// `EntityId::decode(&id.encode()) == Ok(id)` holds for every value, and
/// decoding is strict enough that no two tokens decode to the same id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EntityId {
    kind: EntityKind,
    id: u64,
}

impl EntityId {
    pub const fn new(kind: EntityKind, id: u64) -> Self {
        Self { kind, id }
    }

    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Render the policy token, e.g. `u42`.
    pub fn encode(&self) -> String {
        format!("{}{}", self.kind.tag(), self.id)
    }

    /// Parse a policy token.
    ///
    /// Rejects unknown tags, empty or non-digit remainders, leading zeros
    /// (other than `0` itself) and values overflowing `u64`.
    pub fn decode(token: &str) -> Result<Self, DomainError> {
        let mut chars = token.chars();
        let tag = chars
            .next()
            .ok_or_else(|| DomainError::invalid_argument("empty identifier token"))?;
        let kind = EntityKind::from_tag(tag).ok_or_else(|| {
            DomainError::invalid_argument(format!("unknown identifier tag '{tag}'"))
        })?;

        let id = parse_decimal(chars.as_str()).ok_or_else(|| {
            DomainError::invalid_argument(format!("malformed {kind} identifier '{token}'"))
        })?;

        Ok(Self { kind, id })
    }

    /// Decode a token that must be of the given kind.
    pub fn decode_as(kind: EntityKind, token: &str) -> Result<Self, DomainError> {
        let decoded = Self::decode(token)?;
        if decoded.kind != kind {
            return Err(DomainError::invalid_argument(format!(
                "expected a {kind} identifier, got a {} identifier",
                decoded.kind
            )));
        }
        Ok(decoded)
    }
}

/// Canonical non-negative decimal: digits only, no sign, no leading zeros.
pub fn parse_decimal(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.tag(), self.id)
    }
}

impl FromStr for EntityId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl From<EntityId> for String {
    fn from(value: EntityId) -> Self {
        value.encode()
    }
}

impl TryFrom<String> for EntityId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::decode(&value)
    }
}

/// Identifier of a tenant (policy domain).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(u64);

/// Identifier of a user.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

/// Identifier of a role.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(u64);

/// Identifier of a permission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(u64);

/// Identifier of a navigation menu entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MenuId(u64);

macro_rules! impl_entity_newtype {
    ($t:ident, $kind:expr) => {
        impl $t {
            pub const KIND: EntityKind = $kind;

            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            pub const fn get(&self) -> u64 {
                self.0
            }

            pub const fn entity(&self) -> EntityId {
                EntityId::new(Self::KIND, self.0)
            }

            /// Policy token for this id.
            pub fn encode(&self) -> String {
                self.entity().encode()
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.entity(), f)
            }
        }

        impl From<u64> for $t {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for EntityId {
            fn from(value: $t) -> Self {
                value.entity()
            }
        }

        impl TryFrom<EntityId> for $t {
            type Error = DomainError;

            fn try_from(value: EntityId) -> Result<Self, Self::Error> {
                if value.kind() != Self::KIND {
                    return Err(DomainError::invalid_argument(format!(
                        "expected a {} identifier, got '{}'",
                        Self::KIND,
                        value
                    )));
                }
                Ok(Self(value.id()))
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                EntityId::decode_as(Self::KIND, s).map(|e| Self(e.id()))
            }
        }
    };
}

impl_entity_newtype!(TenantId, EntityKind::Tenant);
impl_entity_newtype!(UserId, EntityKind::User);
impl_entity_newtype!(RoleId, EntityKind::Role);
impl_entity_newtype!(PermissionId, EntityKind::Permission);
impl_entity_newtype!(MenuId, EntityKind::Menu);

impl TenantId {
    pub const DEFAULT: TenantId = TenantId(DEFAULT_TENANT_ID);

    pub const fn is_default(&self) -> bool {
        self.0 == DEFAULT_TENANT_ID
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::DEFAULT
    }
}
