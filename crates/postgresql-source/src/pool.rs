//! Bounded PostgreSQL connection pool.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use sync_core::RetryPolicy;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info, warn};

/// PostgreSQL connection settings.
#[derive(Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Maximum number of open connections
    pub pool_size: usize,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl PostgresConfig {
    fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .password(&self.password)
            .application_name("pg-search-sync")
            .connect_timeout(self.connect_timeout);
        config
    }

    /// `host:port/database`, safe to log.
    pub fn display_target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

struct PoolInner {
    config: tokio_postgres::Config,
    target: String,
    idle: Mutex<Vec<Client>>,
    permits: Arc<Semaphore>,
    size: usize,
}

/// A fixed-size pool of `tokio_postgres` clients.
///
/// Connections are opened lazily and reused; a closed connection is dropped
/// instead of being returned.
#[derive(Clone)]
pub struct PgPool {
    inner: Arc<PoolInner>,
}

impl PgPool {
    pub fn new(config: &PostgresConfig) -> Self {
        let size = config.pool_size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                config: config.to_pg_config(),
                target: config.display_target(),
                idle: Mutex::new(Vec::with_capacity(size)),
                permits: Arc::new(Semaphore::new(size)),
                size,
            }),
        }
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Borrow a client, waiting while all connections are in use.
    pub async fn get(&self) -> Result<PooledClient> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("PostgreSQL pool closed")?;

        let reused = self.take_idle();
        let client = match reused {
            Some(client) => client,
            None => self.open().await?,
        };

        Ok(PooledClient {
            client: Some(client),
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Run `SELECT 1` on a pooled connection.
    pub async fn ping(&self) -> Result<()> {
        let client = self.get().await?;
        client
            .simple_query("SELECT 1")
            .await
            .with_context(|| format!("PostgreSQL at {} did not answer", self.inner.target))?;
        Ok(())
    }

    fn take_idle(&self) -> Option<Client> {
        let mut idle = self.inner.idle.lock().ok()?;
        while let Some(client) = idle.pop() {
            if !client.is_closed() {
                return Some(client);
            }
        }
        None
    }

    async fn open(&self) -> Result<Client> {
        debug!("Opening PostgreSQL connection to {}", self.inner.target);
        let (client, connection) = self
            .inner
            .config
            .connect(NoTls)
            .await
            .with_context(|| format!("Failed to connect to PostgreSQL at {}", self.inner.target))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {e}");
            }
        });
        Ok(client)
    }
}

/// A client borrowed from [`PgPool`], returned on drop.
pub struct PooledClient {
    client: Option<Client>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledClient {
    type Target = Client;

    fn deref(&self) -> &Client {
        self.client
            .as_ref()
            .expect("client is only taken when the guard drops")
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if client.is_closed() {
                return;
            }
            if let Ok(mut idle) = self.pool.idle.lock() {
                idle.push(client);
            }
        }
    }
}

/// Build a pool and check that PostgreSQL answers, retrying with backoff.
pub async fn connect_with_retries(config: &PostgresConfig, policy: &RetryPolicy) -> Result<PgPool> {
    let pool = PgPool::new(config);
    let attempts = policy.max_retries + 1;
    let mut attempt = 1;

    loop {
        match pool.ping().await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Connected to PostgreSQL after {attempt} attempts");
                } else {
                    info!("Connected to PostgreSQL at {}", config.display_target());
                }
                return Ok(pool);
            }
            Err(e) if attempt < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "Failed to connect to PostgreSQL (attempt {attempt}/{attempts}): {e:#}. Retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(e.context(format!(
                    "Giving up on PostgreSQL at {} after {attempts} attempts",
                    config.display_target()
                )))
            }
        }
    }
}
