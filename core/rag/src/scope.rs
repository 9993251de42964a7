//! Tenant scoping.
//!
//! Every chat request carries some combination of user, group, and
//! organization identifiers. The combination collapses into one of three
//! scopes (plus "none"), which drive both document search filtering and
//! semantic cache isolation.

use serde::{Deserialize, Serialize};

/// The tenant scope of a request.
///
/// Documents belong to groups; a group belongs to at most one
/// organization. The organization id participates in cache isolation
/// only, never in document filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TenantScope {
    /// No usable identifiers. Searches return empty, cache is skipped.
    None,
    /// Personal scope: the user's own documents and cache entries.
    User {
        /// Requesting user id
        user_id: i64,
    },
    /// Group scope without an organization.
    Groups {
        /// Groups the requester can read
        group_ids: Vec<i64>,
    },
    /// Group scope under an organization.
    OrgGroups {
        /// Organization the groups belong to
        organization_id: i64,
        /// Groups the requester can read
        group_ids: Vec<i64>,
    },
}

impl TenantScope {
    /// Derive the scope from request identifiers.
    ///
    /// Non-empty groups win over the user id; an organization id without
    /// groups carries no scope of its own.
    pub fn from_request(
        user_id: Option<i64>,
        organization_id: Option<i64>,
        group_ids: Vec<i64>,
    ) -> Self {
        match (organization_id, group_ids.is_empty(), user_id) {
            (Some(org), false, _) => Self::OrgGroups {
                organization_id: org,
                group_ids,
            },
            (None, false, _) => Self::Groups { group_ids },
            (_, true, Some(user)) => Self::User { user_id: user },
            (_, true, None) => Self::None,
        }
    }

    /// True when no identifier is present.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Groups to filter documents by, if this is a group scope.
    pub fn group_ids(&self) -> Option<&[i64]> {
        match self {
            Self::Groups { group_ids } | Self::OrgGroups { group_ids, .. } => {
                Some(group_ids.as_slice())
            }
            _ => None,
        }
    }

    /// The user id, if this is a personal scope.
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Self::User { user_id } => Some(*user_id),
            _ => None,
        }
    }

    /// The organization id, if one is attached.
    pub fn organization_id(&self) -> Option<i64> {
        match self {
            Self::OrgGroups {
                organization_id, ..
            } => Some(*organization_id),
            _ => None,
        }
    }
}
