//! # Connection Registry
//!
//! Owns one pooled connection per tenant plus one for the consolidated
//! reference-data source. Pools are created lazily on first use. Each key
//! holds a `OnceCell` that serves as the in-flight creation marker: concurrent
//! first callers await the same creation, and a failed creation leaves the
//! cell empty so a later call can try again.

use crate::config::{AnalyticsConfig, DatabaseConfig};
use crate::database::PoolSnapshot;
use crate::error::{AnalyticsError, AnalyticsResult, ErrorClass};
use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Registry key of the consolidated reference-data connection
pub const CONSOLIDATED_KEY: &str = "@CONSOLIDATED";

/// What to connect to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Tenant code or [`CONSOLIDATED_KEY`]
    pub key: String,
    pub database: String,
}

/// Opens and closes pooled connections for a target
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Clone + Send + Sync + 'static;

    async fn connect(&self, target: &ConnectionTarget) -> AnalyticsResult<Self::Connection>;

    async fn close(&self, connection: &Self::Connection) -> AnalyticsResult<()>;

    fn snapshot(&self, key: &str, connection: &Self::Connection) -> PoolSnapshot;
}

/// Builds `PgPool`s from the shared database settings
#[derive(Debug, Clone)]
pub struct PgConnectionFactory {
    database: DatabaseConfig,
}

impl PgConnectionFactory {
    pub fn new(database: DatabaseConfig) -> Self {
        Self { database }
    }

    fn connect_options(&self, database: &str) -> PgConnectOptions {
        let ssl_mode = match self.database.ssl_mode.as_str() {
            "disable" => PgSslMode::Disable,
            "require" => PgSslMode::Require,
            _ => PgSslMode::Prefer,
        };

        PgConnectOptions::new()
            .host(&self.database.host)
            .port(self.database.port)
            .username(&self.database.username)
            .password(&self.database.password)
            .database(database)
            .ssl_mode(ssl_mode)
            .application_name("sales-analytics-core")
            .options([(
                "statement_timeout",
                self.database.pool.statement_timeout_ms.to_string(),
            )])
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    type Connection = PgPool;

    async fn connect(&self, target: &ConnectionTarget) -> AnalyticsResult<PgPool> {
        let pool = &self.database.pool;
        let options = PgPoolOptions::new()
            .max_connections(pool.max_connections)
            .min_connections(pool.min_connections)
            .acquire_timeout(pool.acquire_timeout())
            .idle_timeout(Some(pool.idle_timeout()))
            .max_lifetime(Some(pool.max_lifetime()))
            .test_before_acquire(true);

        let connect = options.connect_with(self.connect_options(&target.database));
        match tokio::time::timeout(pool.connect_timeout(), connect).await {
            Ok(Ok(pg_pool)) => Ok(pg_pool),
            Ok(Err(err)) => Err(AnalyticsError::connection(
                self.database.target(&target.database),
                err.to_string(),
            )),
            Err(_) => Err(AnalyticsError::connection(
                self.database.target(&target.database),
                format!(
                    "timed out after {}s establishing pool",
                    pool.connect_timeout_seconds
                ),
            )),
        }
    }

    async fn close(&self, connection: &PgPool) -> AnalyticsResult<()> {
        connection.close().await;
        Ok(())
    }

    fn snapshot(&self, key: &str, connection: &PgPool) -> PoolSnapshot {
        let size = connection.size();
        let idle = connection.num_idle();
        PoolSnapshot {
            name: key.to_string(),
            size,
            idle,
            active: (size as usize).saturating_sub(idle),
            max_connections: connection.options().get_max_connections(),
        }
    }
}

/// Lazily populated map of tenant code → pooled connection
pub struct ConnectionRegistry<F: ConnectionFactory> {
    factory: F,
    /// Uppercased tenant code → database name
    tenants: BTreeMap<String, String>,
    consolidated_database: Option<String>,
    connections: DashMap<String, Arc<OnceCell<F::Connection>>>,
    connect_retries: u32,
    connect_retry_backoff: std::time::Duration,
}

impl<F: ConnectionFactory> std::fmt::Debug for ConnectionRegistry<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("tenants", &self.tenants.keys().collect::<Vec<_>>())
            .field("open", &self.open_keys())
            .finish()
    }
}

impl<F: ConnectionFactory> ConnectionRegistry<F> {
    pub fn new(factory: F, config: &AnalyticsConfig) -> Self {
        let tenants = config
            .tenants
            .iter()
            .map(|(code, database)| (code.trim().to_uppercase(), database.clone()))
            .collect();

        Self {
            factory,
            tenants,
            consolidated_database: config.database.consolidated_database.clone(),
            connections: DashMap::new(),
            connect_retries: config.database.connect_retries,
            connect_retry_backoff: config.database.connect_retry_backoff(),
        }
    }

    /// Resolve a tenant code to its connection target
    pub fn resolve(&self, tenant: &str) -> AnalyticsResult<ConnectionTarget> {
        let key = tenant.trim().to_uppercase();
        let database = self.tenants.get(&key).cloned().ok_or_else(|| {
            AnalyticsError::Config(format!("unknown tenant '{tenant}': no database mapping"))
        })?;
        Ok(ConnectionTarget { key, database })
    }

    /// Live connection for `tenant`, creating it on first use
    pub async fn get_connection(&self, tenant: &str) -> AnalyticsResult<F::Connection> {
        let target = self.resolve(tenant)?;
        self.get_or_create(target).await
    }

    /// Connection to the consolidated reference-data source
    pub async fn consolidated_connection(&self) -> AnalyticsResult<F::Connection> {
        let database = self.consolidated_database.clone().ok_or_else(|| {
            AnalyticsError::Config("no consolidated_database configured".to_string())
        })?;
        self.get_or_create(ConnectionTarget {
            key: CONSOLIDATED_KEY.to_string(),
            database,
        })
        .await
    }

    async fn get_or_create(&self, target: ConnectionTarget) -> AnalyticsResult<F::Connection> {
        let cell = Arc::clone(
            self.connections
                .entry(target.key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );

        let connection = cell
            .get_or_try_init(|| self.create_connection(&target))
            .await?;
        Ok(connection.clone())
    }

    /// Establish a pool, retrying with fixed backoff
    async fn create_connection(&self, target: &ConnectionTarget) -> AnalyticsResult<F::Connection> {
        let attempts = self.connect_retries + 1;
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(
                tenant = %target.key,
                database = %target.database,
                attempt = attempt,
                "Creating connection pool"
            );

            match self.factory.connect(target).await {
                Ok(connection) => {
                    info!(
                        tenant = %target.key,
                        database = %target.database,
                        attempts = attempt,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Connection pool established"
                    );
                    return Ok(connection);
                }
                Err(err) if attempt < attempts && err.class() != ErrorClass::Fatal => {
                    warn!(
                        tenant = %target.key,
                        attempt = attempt,
                        max_attempts = attempts,
                        backoff_ms = self.connect_retry_backoff.as_millis() as u64,
                        error = %err,
                        "Connection attempt failed, retrying"
                    );
                    tokio::time::sleep(self.connect_retry_backoff).await;
                }
                Err(err) => {
                    warn!(
                        tenant = %target.key,
                        attempts = attempt,
                        error = %err,
                        "Connection pool could not be established"
                    );
                    return Err(err);
                }
            }
        }
    }

    /// Close every open connection independently, returning per-key failures
    pub async fn close_all(&self) -> Vec<(String, AnalyticsError)> {
        let cells: Vec<(String, Arc<OnceCell<F::Connection>>)> = self
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        self.connections.clear();

        let mut failures = Vec::new();
        for (key, cell) in cells {
            let Some(connection) = cell.get() else {
                continue;
            };
            match self.factory.close(connection).await {
                Ok(()) => info!(tenant = %key, "Connection pool closed"),
                Err(err) => {
                    warn!(tenant = %key, error = %err, "Failed to close connection pool");
                    failures.push((key, err));
                }
            }
        }
        failures
    }

    /// Snapshot of one tenant's pool if it has been created
    pub fn pool_snapshot(&self, tenant: &str) -> Option<PoolSnapshot> {
        let key = tenant.trim().to_uppercase();
        let entry = self.connections.get(&key)?;
        entry
            .value()
            .get()
            .map(|connection| self.factory.snapshot(&key, connection))
    }

    /// Snapshots of every created pool, ordered by key
    pub fn pool_snapshots(&self) -> Vec<PoolSnapshot> {
        let mut snapshots: Vec<PoolSnapshot> = self
            .connections
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .get()
                    .map(|connection| self.factory.snapshot(entry.key(), connection))
            })
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Keys whose connection has been created
    pub fn open_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .connections
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    /// Configured tenant codes, uppercased
    pub fn tenant_codes(&self) -> Vec<String> {
        self.tenants.keys().cloned().collect()
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}
