//! Query-key registry.
//!
//! A [`QueryKey`] deterministically identifies one cached query result:
//! `(resource namespace, query kind, discriminator)`. Construction is pure;
//! two logically identical queries always produce identical keys and keys
//! are never mutated after creation.

use std::fmt;

use crate::application::listing::ListQuery;

/// Cacheable resource namespaces. Invalidation operates on a whole
/// namespace at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Categories,
    Courses,
    Intakes,
    Users,
    Enrollments,
    Payments,
    Refunds,
    ContactRequests,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Categories => "categories",
            Resource::Courses => "courses",
            Resource::Intakes => "intakes",
            Resource::Users => "users",
            Resource::Enrollments => "enrollments",
            Resource::Payments => "payments",
            Resource::Refunds => "refunds",
            Resource::ContactRequests => "contact_requests",
        }
    }

    pub const ALL: [Resource; 8] = [
        Resource::Categories,
        Resource::Courses,
        Resource::Intakes,
        Resource::Users,
        Resource::Enrollments,
        Resource::Payments,
        Resource::Refunds,
        Resource::ContactRequests,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    List,
    Detail,
    All,
}

impl QueryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryKind::List => "list",
            QueryKind::Detail => "detail",
            QueryKind::All => "all",
        }
    }
}

/// Deterministic identifier for a cached query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    resource: Resource,
    kind: QueryKind,
    discriminator: String,
}

impl QueryKey {
    /// Key for a list query. The discriminator is the query's canonical
    /// serialization, so every result-affecting field participates.
    pub fn list(resource: Resource, query: &ListQuery) -> Self {
        Self {
            resource,
            kind: QueryKind::List,
            discriminator: query.canonical_key(),
        }
    }

    /// Key for a detail lookup. An empty id is a valid key: it names the
    /// "not yet created" placeholder slot used to pre-warm create forms.
    pub fn detail(resource: Resource, id: &str) -> Self {
        Self {
            resource,
            kind: QueryKind::Detail,
            discriminator: id.to_string(),
        }
    }

    /// Key for an unpaginated whole-collection read.
    pub fn all(resource: Resource) -> Self {
        Self {
            resource,
            kind: QueryKind::All,
            discriminator: String::new(),
        }
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.resource.as_str(),
            self.kind.as_str(),
            self.discriminator
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::listing::{FieldFilter, FilterOp, ListQuery, SortOrder};

    fn query() -> ListQuery {
        ListQuery {
            page: 1,
            page_size: 10,
            sort_by: "created_at".to_string(),
            order: SortOrder::Desc,
            filters: vec![FieldFilter::new("title", FilterOp::Contains, "rust")],
        }
    }

    #[test]
    fn equal_queries_share_a_key() {
        let first = QueryKey::list(Resource::Courses, &query());
        let second = QueryKey::list(Resource::Courses, &query());
        assert_eq!(first, second);
    }

    #[test]
    fn any_differing_field_changes_the_key() {
        let base = QueryKey::list(Resource::Courses, &query());

        let mut changed = query();
        changed.page = 2;
        assert_ne!(base, QueryKey::list(Resource::Courses, &changed));

        assert_ne!(base, QueryKey::list(Resource::Categories, &query()));
    }

    #[test]
    fn empty_detail_id_is_a_valid_key() {
        let placeholder = QueryKey::detail(Resource::Courses, "");
        let real = QueryKey::detail(Resource::Courses, "a-real-id");
        assert_ne!(placeholder, real);
        assert_eq!(placeholder, QueryKey::detail(Resource::Courses, ""));
    }

    #[test]
    fn display_is_namespaced() {
        let key = QueryKey::detail(Resource::Payments, "abc");
        assert_eq!(key.to_string(), "payments/detail/abc");
    }
}
