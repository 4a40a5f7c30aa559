use axum::{http::Method, routing::get, Router};
use axum_login::{
    login_required,
    tower_sessions::{
        cookie::SameSite, CachingSessionStore, ExpiredDeletion, Expiry, SessionManagerLayer,
    },
    AuthManagerLayer, AuthManagerLayerBuilder,
};
use oauth2::{basic::BasicClient, AuthUrl, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use sqlx::PgPool;
use time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, TraceLayer},
};
use tower_sessions_moka_store::MokaStore;
use tower_sessions_sqlx_store::PostgresStore;

type SessionStore = CachingSessionStore<MokaStore, PostgresStore>;

use crate::{
    app_state::AppState,
    auth::{self, AuthBackend},
    config::Settings,
    domain::User,
    repositories::{NewUser, PgUserRepository, UserRepository},
    routes,
};

pub async fn create(connection_pool: PgPool, config: Settings) -> Router<()> {
    let base_app = Router::new()
        .nest("/api/activities", routes::activities::router())
        .nest("/api/records", routes::records::router())
        .nest("/api/statistics", routes::statistics::router());

    // If authentication is enabled, wrap the app with the auth middleware.
    // Otherwise every request runs as a well-known development user.
    let (app_with_auth, dev_user) = if config.application.disable_auth {
        (base_app, Some(upsert_dev_user(&connection_pool).await))
    } else {
        let auth_layer = new_auth_layer(connection_pool.clone(), config.clone()).await;
        let app = base_app
            .route_layer(login_required!(AuthBackend))
            .merge(Router::new().nest("/auth", auth::router()))
            .layer(auth_layer);
        (app, None)
    };

    let app_state = AppState::new(connection_pool, &config, dev_user);

    // Finally, wrap the app with health route, state, CORS and tracing
    let app_url = config.application.app_url.clone();
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(["content-type".parse().expect("valid header name")])
        .allow_credentials(true)
        .allow_origin(AllowOrigin::predicate(move |origin, _| {
            origin.to_str().unwrap_or_default() == app_url
        }));

    app_with_auth
        .route("/health", get(|| async { "OK" }))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
}

async fn upsert_dev_user(connection_pool: &PgPool) -> User {
    let user_repo = PgUserRepository::new(connection_pool.clone());
    user_repo
        .upsert_user(&NewUser::new(
            "dev@localhost".to_string(),
            "Development User".to_string(),
            String::new(),
            String::new(),
        ))
        .await
        .expect("Failed to upsert the development user")
}

async fn new_auth_layer(
    connection_pool: PgPool,
    config: Settings,
) -> AuthManagerLayer<AuthBackend, SessionStore> {
    let client = BasicClient::new(
        ClientId::new(config.auth.client_id),
        Some(ClientSecret::new(config.auth.client_secret)),
        AuthUrl::new(config.auth.auth_url).expect("Invalid authorization endpoint URL"),
        Some(TokenUrl::new(config.auth.token_url).expect("Invalid token endpoint URL")),
    )
    .set_redirect_uri(RedirectUrl::new(config.auth.redirect_url).expect("Invalid redirect URL"));

    // Use PostgresStore for DB-backed sessions that persist across restarts
    let db_store = PostgresStore::new(connection_pool.clone());
    db_store
        .migrate()
        .await
        .expect("Failed to run session store migration");

    // Spawn background task to clean up expired sessions from DB
    let deletion_task = tokio::task::spawn(
        db_store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(60)),
    );
    // Detach the task so it runs independently
    drop(deletion_task);

    // Wrap with in-memory Moka cache to reduce DB reads for hot sessions
    let cache_store = MokaStore::new(Some(2_000));
    let session_store = CachingSessionStore::new(cache_store, db_store);

    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::days(7)));

    let backend = AuthBackend::new(connection_pool, client);
    AuthManagerLayerBuilder::new(backend, session_layer).build()
}
