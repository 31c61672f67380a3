use deadpool_postgres::Pool;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::Result;
use crate::repositories::vote::PgVoteStore;
use crate::services::sessions::SessionStore;
use crate::services::votes::VoteLedger;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The database connection pool.
    pub db: Pool,
    /// The Redis connection manager, used for rate-limit counters.
    pub redis: ConnectionManager,
    /// The application's configuration.
    pub config: Config,
    /// Live sessions keyed by bearer token.
    pub sessions: SessionStore,
    /// The vote ledger over the Postgres vote store.
    pub votes: VoteLedger<PgVoteStore>,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// Builds the database pool and applies migrations, connects to Redis and
    /// constructs an empty session store. Call [`SessionStore::shutdown`] on
    /// `sessions` once the server has stopped.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url, config.db_pool_max_size)?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        crate::db::run_migrations(&db).await?;
        tracing::info!("✅ Database schema up to date");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized (pooled)");

        let sessions = SessionStore::new(config.session_ttl(), Arc::new(SystemClock));
        tracing::info!(
            "✅ Session store initialized (ttl {} days)",
            config.session_duration_days
        );

        let votes = VoteLedger::new(PgVoteStore::new(db.clone()));
        tracing::info!("✅ Vote ledger initialized");

        Ok(AppState {
            db,
            redis,
            config: config.clone(),
            sessions,
            votes,
        })
    }
}
