use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::admin::{cached_detail, cached_list, parse_detail_id, report_fetch_error};
use crate::application::listing::{
    DetailResult, FieldKind, FilterField, ListPage, ListQuery, ListResult, ListSpec, SortField,
    SortOrder, codes,
};
use crate::application::repos::{ContactRequestsRepo, ContactRequestsWriteRepo, RepoError};
use crate::cache::{QueryKey, Resource, ResourceCache};
use crate::domain::entities::ContactRequestRecord;
use crate::domain::types::ContactStatus;

pub const CONTACT_LIST_SPEC: ListSpec = ListSpec {
    resource: "contact_requests",
    sort_fields: &[SortField {
        name: "created_at",
        column: "cr.created_at",
    }],
    filter_fields: &[
        FilterField {
            name: "status",
            column: "cr.status::text",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "email",
            column: "cr.email",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "name",
            column: "cr.name",
            kind: FieldKind::Text,
        },
        FilterField {
            name: "created_at",
            column: "cr.created_at",
            kind: FieldKind::Timestamp,
        },
    ],
    default_sort: "created_at",
    default_order: SortOrder::Desc,
    max_page_size: 100,
};

#[derive(Debug, Error)]
pub enum AdminContactError {
    #[error("contact request not found")]
    NotFound,
    #[error("contact request is already handled")]
    AlreadyHandled,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct AdminContactService {
    reader: Arc<dyn ContactRequestsRepo>,
    writer: Arc<dyn ContactRequestsWriteRepo>,
    cache: Option<Arc<ResourceCache<ContactRequestRecord>>>,
}

impl AdminContactService {
    pub fn new(
        reader: Arc<dyn ContactRequestsRepo>,
        writer: Arc<dyn ContactRequestsWriteRepo>,
    ) -> Self {
        Self {
            reader,
            writer,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Option<Arc<ResourceCache<ContactRequestRecord>>>) -> Self {
        self.cache = cache;
        self
    }

    pub async fn list(&self, query: &ListQuery) -> ListResult<ContactRequestRecord> {
        let validated = match CONTACT_LIST_SPEC.validate(query) {
            Ok(validated) => validated,
            Err(err) => return ListResult::failure(codes::VALIDATION_ERROR, err.to_string()),
        };

        let key = QueryKey::list(Resource::ContactRequests, query);
        let reader = self.reader.clone();
        cached_list(
            self.cache.as_ref().map(|cache| &cache.lists),
            key,
            move || async move {
                let rows = reader
                    .list_contact_requests(&validated)
                    .await
                    .map_err(|err| report_fetch_error("contact_requests", "list", &err))?;
                let total = reader
                    .count_contact_requests(&validated.predicates)
                    .await
                    .map_err(|err| report_fetch_error("contact_requests", "count", &err))?;
                Ok(ListPage { rows, total })
            },
        )
        .await
    }

    pub async fn detail(&self, id: &str) -> DetailResult<ContactRequestRecord> {
        let parsed = match parse_detail_id(id) {
            Ok(parsed) => parsed,
            Err(message) => return DetailResult::failure(codes::VALIDATION_ERROR, message),
        };
        let Some(request_id) = parsed else {
            return DetailResult::ok(None);
        };

        let key = QueryKey::detail(Resource::ContactRequests, id);
        let reader = self.reader.clone();
        cached_detail(
            self.cache.as_ref().map(|cache| &cache.details),
            key,
            "contact request",
            move || async move {
                reader
                    .find_by_id(request_id)
                    .await
                    .map_err(|err| report_fetch_error("contact_requests", "fetch", &err))
            },
        )
        .await
    }

    pub async fn mark_handled(
        &self,
        id: Uuid,
    ) -> Result<ContactRequestRecord, AdminContactError> {
        let existing = self
            .reader
            .find_by_id(id)
            .await?
            .ok_or(AdminContactError::NotFound)?;
        if existing.status == ContactStatus::Handled {
            return Err(AdminContactError::AlreadyHandled);
        }

        let request = self
            .writer
            .mark_handled(id, OffsetDateTime::now_utc())
            .await?;

        self.invalidate();
        Ok(request)
    }

    /// Idempotent: deleting an id that no longer exists is a success.
    pub async fn delete(&self, id: Uuid) -> Result<(), AdminContactError> {
        self.writer.delete_contact_request(id).await?;
        self.invalidate();
        Ok(())
    }

    fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::application::listing::{Predicate, ValidatedListQuery};
    use crate::application::repos::CreateContactRequestParams;

    struct StubContactsStore {
        request: Option<ContactRequestRecord>,
    }

    #[async_trait]
    impl ContactRequestsRepo for StubContactsStore {
        async fn list_contact_requests(
            &self,
            _query: &ValidatedListQuery,
        ) -> Result<Vec<ContactRequestRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn count_contact_requests(
            &self,
            _predicates: &[Predicate],
        ) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<ContactRequestRecord>, RepoError> {
            Ok(self.request.clone().filter(|request| request.id == id))
        }

        async fn count_by_status(&self, _status: ContactStatus) -> Result<u64, RepoError> {
            Ok(0)
        }
    }

    #[async_trait]
    impl ContactRequestsWriteRepo for StubContactsStore {
        async fn create_contact_request(
            &self,
            _params: CreateContactRequestParams,
        ) -> Result<ContactRequestRecord, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn mark_handled(
            &self,
            id: Uuid,
            handled_at: OffsetDateTime,
        ) -> Result<ContactRequestRecord, RepoError> {
            let existing = self.request.clone().expect("request");
            Ok(ContactRequestRecord {
                id,
                status: ContactStatus::Handled,
                handled_at: Some(handled_at),
                ..existing
            })
        }

        async fn delete_contact_request(&self, _id: Uuid) -> Result<(), RepoError> {
            Ok(())
        }
    }

    fn sample_request(id: Uuid, status: ContactStatus) -> ContactRequestRecord {
        ContactRequestRecord {
            id,
            name: "Noa".to_string(),
            email: "noa@example.com".to_string(),
            phone: None,
            message: "When does the next intake start?".to_string(),
            status,
            handled_at: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn mark_handled_transitions_and_stamps() {
        let id = Uuid::new_v4();
        let store = Arc::new(StubContactsStore {
            request: Some(sample_request(id, ContactStatus::New)),
        });
        let service = AdminContactService::new(store.clone(), store);

        let handled = service.mark_handled(id).await.expect("handled");
        assert_eq!(handled.status, ContactStatus::Handled);
        assert!(handled.handled_at.is_some());
    }

    #[tokio::test]
    async fn mark_handled_twice_is_rejected() {
        let id = Uuid::new_v4();
        let store = Arc::new(StubContactsStore {
            request: Some(sample_request(id, ContactStatus::Handled)),
        });
        let service = AdminContactService::new(store.clone(), store);

        let err = service.mark_handled(id).await.expect_err("already handled");
        assert!(matches!(err, AdminContactError::AlreadyHandled));
    }
}
