use std::process;
use std::sync::Arc;

use enrolla::application::admin::{
    categories::AdminCategoryService, contacts::AdminContactService, courses::AdminCourseService,
    dashboard::AdminDashboardService, enrollments::AdminEnrollmentService,
    intakes::AdminIntakeService, payments::AdminPaymentService, refunds::AdminRefundService,
    users::AdminUserService,
};
use enrolla::application::auth::AuthService;
use enrolla::application::catalog::CatalogService;
use enrolla::application::error::AppError;
use enrolla::application::repos::{
    CategoriesRepo, CategoriesWriteRepo, ContactRequestsRepo, ContactRequestsWriteRepo,
    CoursesRepo, CoursesWriteRepo, EnrollmentsRepo, EnrollmentsWriteRepo, IntakesRepo,
    IntakesWriteRepo, PaymentsRepo, PaymentsWriteRepo, RefundsRepo, RefundsWriteRepo,
    SessionsRepo, UsersRepo, UsersWriteRepo,
};
use enrolla::cache::{AppCaches, CacheConfig};
use enrolla::config;
use enrolla::infra::db::PostgresRepositories;
use enrolla::infra::error::InfraError;
use enrolla::infra::http::{
    AdminState, PublicState, RateLimiter, build_admin_router, build_public_router,
};
use enrolla::infra::telemetry;
use time::Duration as TimeDuration;
use tokio::try_join;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect(&settings).await?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    info!(target = "enrolla::migrate", "migrations applied");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect(&settings).await?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let repositories = Arc::new(PostgresRepositories::new(pool));
    let cache_config = CacheConfig::from(&settings.cache);
    let caches = Arc::new(AppCaches::new(&cache_config));

    let sweep_handle = spawn_cache_sweeper(caches.clone(), &cache_config);

    let (public_state, admin_state) = build_states(&settings, &repositories, &caches);

    let result = serve_http(&settings, public_state, admin_state).await;

    sweep_handle.abort();
    let _ = sweep_handle.await;

    result
}

async fn connect(settings: &config::Settings) -> Result<sqlx::PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))
}

fn build_states(
    settings: &config::Settings,
    repositories: &Arc<PostgresRepositories>,
    caches: &Arc<AppCaches>,
) -> (PublicState, AdminState) {
    let categories_repo: Arc<dyn CategoriesRepo> = repositories.clone();
    let categories_write_repo: Arc<dyn CategoriesWriteRepo> = repositories.clone();
    let courses_repo: Arc<dyn CoursesRepo> = repositories.clone();
    let courses_write_repo: Arc<dyn CoursesWriteRepo> = repositories.clone();
    let intakes_repo: Arc<dyn IntakesRepo> = repositories.clone();
    let intakes_write_repo: Arc<dyn IntakesWriteRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let users_write_repo: Arc<dyn UsersWriteRepo> = repositories.clone();
    let enrollments_repo: Arc<dyn EnrollmentsRepo> = repositories.clone();
    let enrollments_write_repo: Arc<dyn EnrollmentsWriteRepo> = repositories.clone();
    let payments_repo: Arc<dyn PaymentsRepo> = repositories.clone();
    let payments_write_repo: Arc<dyn PaymentsWriteRepo> = repositories.clone();
    let refunds_repo: Arc<dyn RefundsRepo> = repositories.clone();
    let refunds_write_repo: Arc<dyn RefundsWriteRepo> = repositories.clone();
    let contacts_repo: Arc<dyn ContactRequestsRepo> = repositories.clone();
    let contacts_write_repo: Arc<dyn ContactRequestsWriteRepo> = repositories.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repositories.clone();

    let auth = AuthService::new(sessions_repo)
        .with_bootstrap_admin_token(settings.auth.bootstrap_admin_token.as_deref())
        .with_default_ttl(TimeDuration::hours(settings.auth.session_ttl_hours));

    let window = std::time::Duration::from_secs(settings.rate_limit.window_seconds);
    let admin_rate_limiter = Arc::new(RateLimiter::new(
        window,
        settings.rate_limit.admin_max_requests,
    ));

    let catalog = CatalogService::new(
        courses_repo.clone(),
        categories_repo.clone(),
        intakes_repo.clone(),
        contacts_write_repo.clone(),
    )
    .with_cache(Some(caches.courses.clone()));

    let dashboard = AdminDashboardService::new(
        courses_repo.clone(),
        enrollments_repo.clone(),
        payments_repo.clone(),
        refunds_repo.clone(),
        contacts_repo.clone(),
    );

    let admin_state = AdminState {
        auth,
        rate_limiter: admin_rate_limiter,
        dashboard,
        categories: AdminCategoryService::new(categories_repo.clone(), categories_write_repo)
            .with_cache(Some(caches.categories.clone())),
        courses: AdminCourseService::new(courses_repo.clone(), courses_write_repo, categories_repo)
            .with_cache(Some(caches.courses.clone())),
        intakes: AdminIntakeService::new(intakes_repo.clone(), intakes_write_repo, courses_repo.clone())
            .with_cache(Some(caches.intakes.clone())),
        users: AdminUserService::new(users_repo.clone(), users_write_repo)
            .with_cache(Some(caches.users.clone())),
        enrollments: AdminEnrollmentService::new(
            enrollments_repo.clone(),
            enrollments_write_repo.clone(),
            intakes_repo.clone(),
            courses_repo.clone(),
            users_repo,
            payments_repo.clone(),
        )
        .with_cache(Some(caches.enrollments.clone())),
        payments: AdminPaymentService::new(
            payments_repo.clone(),
            payments_write_repo,
            enrollments_repo,
            enrollments_write_repo,
            intakes_repo,
            courses_repo,
        )
        .with_caches(
            Some(caches.payments.clone()),
            Some(caches.enrollments.clone()),
        ),
        refunds: AdminRefundService::new(refunds_repo, refunds_write_repo, payments_repo)
            .with_cache(Some(caches.refunds.clone())),
        contacts: AdminContactService::new(contacts_repo, contacts_write_repo)
            .with_cache(Some(caches.contact_requests.clone())),
    };

    let public_state = PublicState {
        catalog,
        db: repositories.clone(),
        rate_limiter: Arc::new(RateLimiter::new(window, settings.rate_limit.max_requests)),
    };

    (public_state, admin_state)
}

fn spawn_cache_sweeper(
    caches: Arc<AppCaches>,
    config: &CacheConfig,
) -> tokio::task::JoinHandle<()> {
    let interval = config.sweep_interval();
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await; // the first tick fires immediately
        loop {
            timer.tick().await;
            caches.sweep_expired();
        }
    })
}

async fn serve_http(
    settings: &config::Settings,
    public_state: PublicState,
    admin_state: AdminState,
) -> Result<(), AppError> {
    let public_router = build_public_router(public_state);
    let admin_router = build_admin_router(admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "enrolla::server",
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listening"
    );

    let grace = settings.server.graceful_shutdown;
    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(shutdown_signal());

    // If in-flight requests outlive the grace window, stop waiting for them.
    let servers = async {
        try_join!(public_server, admin_server)
            .map(|_| ())
            .map_err(|err| AppError::unexpected(format!("server error: {err}")))
    };
    tokio::select! {
        result = servers => result,
        () = force_shutdown(grace) => {
            error!(target = "enrolla::server", "graceful shutdown window elapsed, exiting");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // With no signal handler the server runs until killed externally.
        std::future::pending::<()>().await;
    }
    info!(target = "enrolla::server", "shutdown signal received");
}

async fn force_shutdown(grace: std::time::Duration) {
    shutdown_signal().await;
    tokio::time::sleep(grace).await;
}
