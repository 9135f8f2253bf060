//! Query caching: key registry, per-namespace read-through stores, and the
//! explicitly-constructed application-wide cache set.

pub mod config;
pub mod keys;
mod lock;
pub mod store;

pub use config::{CacheConfig, CachePolicy};
pub use keys::{QueryKey, QueryKind, Resource};
pub use store::{QueryCache, QueryState};

use std::sync::Arc;

use crate::application::listing::ListPage;
use crate::domain::entities::{
    CategoryRecord, ContactRequestRecord, CourseRecord, EnrollmentRecord, IntakeRecord,
    PaymentRecord, RefundRecord, UserRecord,
};

/// The list and detail caches of one resource namespace. Invalidation always
/// covers the whole namespace: lists and details together.
pub struct ResourceCache<R> {
    pub resource: Resource,
    pub lists: Arc<QueryCache<ListPage<R>>>,
    pub details: Arc<QueryCache<Option<R>>>,
}

impl<R> ResourceCache<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn new(resource: Resource, config: &CacheConfig, policy: CachePolicy) -> Self {
        Self {
            resource,
            lists: Arc::new(QueryCache::with_capacity(
                resource.as_str(),
                config,
                policy,
                config.list_entry_limit_non_zero(),
            )),
            details: Arc::new(QueryCache::with_capacity(
                resource.as_str(),
                config,
                policy,
                config.detail_entry_limit_non_zero(),
            )),
        }
    }

    /// Drop every cached list page and detail lookup under this namespace.
    pub fn invalidate(&self) {
        self.lists.invalidate_all();
        self.details.invalidate_all();
    }

    pub fn sweep_expired(&self) {
        self.lists.sweep_expired();
        self.details.sweep_expired();
    }
}

/// Every cache namespace the application owns, constructed once at startup
/// and injected into router state.
pub struct AppCaches {
    pub categories: Arc<ResourceCache<CategoryRecord>>,
    pub courses: Arc<ResourceCache<CourseRecord>>,
    pub intakes: Arc<ResourceCache<IntakeRecord>>,
    pub users: Arc<ResourceCache<UserRecord>>,
    pub enrollments: Arc<ResourceCache<EnrollmentRecord>>,
    pub payments: Arc<ResourceCache<PaymentRecord>>,
    pub refunds: Arc<ResourceCache<RefundRecord>>,
    pub contact_requests: Arc<ResourceCache<ContactRequestRecord>>,
}

impl AppCaches {
    pub fn new(config: &CacheConfig) -> Self {
        let catalog = config.catalog_policy();
        let admin = config.admin_policy();

        Self {
            categories: Arc::new(ResourceCache::new(Resource::Categories, config, catalog)),
            courses: Arc::new(ResourceCache::new(Resource::Courses, config, catalog)),
            intakes: Arc::new(ResourceCache::new(Resource::Intakes, config, catalog)),
            users: Arc::new(ResourceCache::new(Resource::Users, config, admin)),
            enrollments: Arc::new(ResourceCache::new(Resource::Enrollments, config, admin)),
            payments: Arc::new(ResourceCache::new(Resource::Payments, config, admin)),
            refunds: Arc::new(ResourceCache::new(Resource::Refunds, config, admin)),
            contact_requests: Arc::new(ResourceCache::new(
                Resource::ContactRequests,
                config,
                admin,
            )),
        }
    }

    /// Invalidate one resource namespace after a mutation.
    pub fn invalidate(&self, resource: Resource) {
        match resource {
            Resource::Categories => self.categories.invalidate(),
            Resource::Courses => self.courses.invalidate(),
            Resource::Intakes => self.intakes.invalidate(),
            Resource::Users => self.users.invalidate(),
            Resource::Enrollments => self.enrollments.invalidate(),
            Resource::Payments => self.payments.invalidate(),
            Resource::Refunds => self.refunds.invalidate(),
            Resource::ContactRequests => self.contact_requests.invalidate(),
        }
    }

    /// Run the idle-eviction sweep over every namespace; driven by a timer
    /// spawned at startup.
    pub fn sweep_expired(&self) {
        self.categories.sweep_expired();
        self.courses.sweep_expired();
        self.intakes.sweep_expired();
        self.users.sweep_expired();
        self.enrollments.sweep_expired();
        self.payments.sweep_expired();
        self.refunds.sweep_expired();
        self.contact_requests.sweep_expired();
    }
}
