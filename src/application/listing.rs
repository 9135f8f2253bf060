//! The uniform list-query contract shared by every resource listing.
//!
//! A [`ListQuery`] is built per request from query-string input and validated
//! against the owning resource's [`ListSpec`] before it may touch storage.
//! Validation resolves field names to column expressions and raw filter
//! values to typed bind values, so the database layer never sees a column or
//! operator that was not allow-listed here.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Machine-readable error tags carried by result envelopes.
pub mod codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const FETCH_ERROR: &str = "FETCH_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl TryFrom<&str> for SortOrder {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(()),
        }
    }
}

/// The closed predicate algebra supported by list filters. Ranges are
/// expressed as a `Gte`/`Lte` pair over the same field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equals,
    Contains,
    Gte,
    Lte,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Equals => "eq",
            FilterOp::Contains => "contains",
            FilterOp::Gte => "gte",
            FilterOp::Lte => "lte",
        }
    }
}

impl TryFrom<&str> for FilterOp {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "eq" => Ok(FilterOp::Equals),
            "contains" => Ok(FilterOp::Contains),
            "gte" => Ok(FilterOp::Gte),
            "lte" => Ok(FilterOp::Lte),
            _ => Err(()),
        }
    }
}

/// One raw `(field, operator, value)` triple as received from the request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: String,
}

impl FieldFilter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

/// An unvalidated list request. Ephemeral: constructed per request and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub sort_by: String,
    pub order: SortOrder,
    pub filters: Vec<FieldFilter>,
}

impl ListQuery {
    /// Canonical serialization of every result-affecting field.
    ///
    /// Filters are sorted before serialization so that two deeply equal
    /// queries, regardless of the order filters arrived in, produce
    /// byte-identical output. Used as the list discriminator of a cache key.
    pub fn canonical_key(&self) -> String {
        let mut filters: Vec<&FieldFilter> = self.filters.iter().collect();
        filters.sort_by(|a, b| {
            (a.field.as_str(), a.op.as_str(), a.value.as_str())
                .cmp(&(b.field.as_str(), b.op.as_str(), b.value.as_str()))
        });

        let mut key = format!(
            "page={}&size={}&sort={}&order={}",
            self.page,
            self.page_size,
            escape_component(&self.sort_by),
            self.order.as_str()
        );
        for filter in filters {
            key.push_str("&f=");
            key.push_str(&escape_component(&filter.field));
            key.push(':');
            key.push_str(filter.op.as_str());
            key.push(':');
            key.push_str(&escape_component(&filter.value));
        }
        key
    }
}

// Escape the separator characters so distinct values can never collide once
// joined into a key.
fn escape_component(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            '&' => escaped.push_str("%26"),
            '=' => escaped.push_str("%3D"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// The value kind a filterable field accepts; drives operator compatibility
/// and bind-value parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    Uuid,
    Timestamp,
    Date,
}

#[derive(Debug, Clone, Copy)]
pub struct SortField {
    pub name: &'static str,
    pub column: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct FilterField {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
}

/// Per-resource allow-lists and paging bounds.
#[derive(Debug, Clone, Copy)]
pub struct ListSpec {
    pub resource: &'static str,
    pub sort_fields: &'static [SortField],
    pub filter_fields: &'static [FilterField],
    pub default_sort: &'static str,
    pub default_order: SortOrder,
    pub max_page_size: u32,
}

pub const DEFAULT_PAGE_SIZE: u32 = 20;

impl ListSpec {
    /// First page with defaults, used when a request carries no list params.
    pub fn default_query(&self) -> ListQuery {
        ListQuery {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE.min(self.max_page_size),
            sort_by: self.default_sort.to_string(),
            order: self.default_order,
            filters: Vec::new(),
        }
    }

    /// Validate a raw query against this spec, resolving the sort column and
    /// typing every filter value. Rejects anything outside the allow-lists.
    pub fn validate(&self, query: &ListQuery) -> Result<ValidatedListQuery, ListQueryError> {
        if query.page == 0 {
            return Err(ListQueryError::InvalidPage);
        }
        if query.page_size == 0 {
            return Err(ListQueryError::InvalidPageSize);
        }
        let page_size = query.page_size.min(self.max_page_size);

        let sort_column = self
            .sort_fields
            .iter()
            .find(|field| field.name == query.sort_by)
            .map(|field| field.column)
            .ok_or_else(|| ListQueryError::UnknownSortField {
                resource: self.resource,
                field: query.sort_by.clone(),
            })?;

        let mut predicates = Vec::with_capacity(query.filters.len());
        for filter in &query.filters {
            let field = self
                .filter_fields
                .iter()
                .find(|field| field.name == filter.field)
                .ok_or_else(|| ListQueryError::UnknownFilterField {
                    resource: self.resource,
                    field: filter.field.clone(),
                })?;

            if !op_supported(field.kind, filter.op) {
                return Err(ListQueryError::UnsupportedOperator {
                    field: field.name,
                    op: filter.op,
                });
            }

            let value = parse_bind_value(field, &filter.value)?;
            predicates.push(Predicate {
                column: field.column,
                op: filter.op,
                value,
            });
        }

        Ok(ValidatedListQuery {
            page: query.page,
            page_size,
            sort_column,
            order: query.order,
            predicates,
        })
    }
}

fn op_supported(kind: FieldKind, op: FilterOp) -> bool {
    match op {
        FilterOp::Equals => true,
        FilterOp::Contains => matches!(kind, FieldKind::Text),
        FilterOp::Gte | FilterOp::Lte => matches!(
            kind,
            FieldKind::Integer | FieldKind::Timestamp | FieldKind::Date
        ),
    }
}

fn parse_bind_value(field: &FilterField, raw: &str) -> Result<BindValue, ListQueryError> {
    let invalid = |reason: &str| ListQueryError::InvalidFilterValue {
        field: field.name,
        reason: reason.to_string(),
    };

    match field.kind {
        FieldKind::Text => Ok(BindValue::Text(raw.to_string())),
        FieldKind::Integer => raw
            .parse::<i64>()
            .map(BindValue::Integer)
            .map_err(|_| invalid("expected an integer")),
        FieldKind::Boolean => match raw {
            "true" => Ok(BindValue::Boolean(true)),
            "false" => Ok(BindValue::Boolean(false)),
            _ => Err(invalid("expected `true` or `false`")),
        },
        FieldKind::Uuid => Uuid::parse_str(raw)
            .map(BindValue::Uuid)
            .map_err(|_| invalid("expected a UUID")),
        FieldKind::Timestamp => OffsetDateTime::parse(raw, &Rfc3339)
            .map(BindValue::Timestamp)
            .map_err(|_| invalid("expected an RFC 3339 timestamp")),
        FieldKind::Date => Date::parse(raw, format_description!("[year]-[month]-[day]"))
            .map(BindValue::Date)
            .map_err(|_| invalid("expected a `YYYY-MM-DD` date")),
    }
}

/// A query that passed allow-list validation; the only form the database
/// layer accepts.
#[derive(Debug, Clone)]
pub struct ValidatedListQuery {
    pub page: u32,
    pub page_size: u32,
    pub sort_column: &'static str,
    pub order: SortOrder,
    pub predicates: Vec<Predicate>,
}

impl ValidatedListQuery {
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

/// One resolved predicate clause: allow-listed column, operator, typed value.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub column: &'static str,
    pub op: FilterOp,
    pub value: BindValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Uuid(Uuid),
    Timestamp(OffsetDateTime),
    Date(Date),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListQueryError {
    #[error("page must be at least 1")]
    InvalidPage,
    #[error("page size must be at least 1")]
    InvalidPageSize,
    #[error("`{field}` is not a sortable field of {resource}")]
    UnknownSortField {
        resource: &'static str,
        field: String,
    },
    #[error("`{field}` is not a filterable field of {resource}")]
    UnknownFilterField {
        resource: &'static str,
        field: String,
    },
    #[error("operator `{}` is not supported for field `{field}`", .op.as_str())]
    UnsupportedOperator { field: &'static str, op: FilterOp },
    #[error("invalid value for filter `{field}`: {reason}")]
    InvalidFilterValue {
        field: &'static str,
        reason: String,
    },
}

/// A page of rows plus the total matching-row count ignoring pagination; the
/// unit stored in the query cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListPage<T> {
    pub rows: Vec<T>,
    pub total: u64,
}

impl<T> ListPage<T> {
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            total: 0,
        }
    }
}

/// The envelope every list executor returns. Failures are carried in-band;
/// executors never raise storage errors past this boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResult<T> {
    pub success: bool,
    pub data: Vec<T>,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T> ListResult<T> {
    pub fn ok(data: Vec<T>, total: u64) -> Self {
        Self {
            success: true,
            data,
            total,
            error: None,
            code: None,
        }
    }

    pub fn failure(code: &'static str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Vec::new(),
            total: 0,
            error: Some(error.into()),
            code: Some(code),
        }
    }
}

impl<T> From<ListPage<T>> for ListResult<T> {
    fn from(page: ListPage<T>) -> Self {
        Self::ok(page.rows, page.total)
    }
}

/// The envelope detail executors return. `data: None` with `success: true`
/// is the reserved shape for the empty-id "new/unsaved" sentinel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailResult<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T> DetailResult<T> {
    pub fn ok(data: Option<T>) -> Self {
        Self {
            success: true,
            data,
            error: None,
            code: None,
        }
    }

    pub fn failure(code: &'static str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            code: Some(code),
        }
    }

    pub fn not_found(entity: &'static str) -> Self {
        Self::failure(codes::NOT_FOUND, format!("{entity} not found"))
    }
}
