// connection.rs
// Pool de conexiones, configuración y migraciones embebidas.
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use firma_domain::DomainError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

#[cfg(feature = "pg")]
pub(crate) type DbConn = diesel::pg::PgConnection;
#[cfg(not(feature = "pg"))]
pub(crate) type DbConn = diesel::sqlite::SqliteConnection;
pub(crate) type DbPool = Pool<ConnectionManager<DbConn>>;
pub(crate) type PooledConn = PooledConnection<ConnectionManager<DbConn>>;

/// URL por defecto sin `pg`: SQLite en memoria compartida.
pub const DEFAULT_SQLITE_URL: &str = "file:firmadb?mode=memory&cache=shared";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_POOL_SIZE: u32 = 4;
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuración de la base de datos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
  pub database_url: String,
  pub busy_timeout_ms: u64,
  pub pool_size: u32,
}

impl PersistenceConfig {
  pub fn new(database_url: impl Into<String>) -> Self {
    Self { database_url: database_url.into(), busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS, pool_size: DEFAULT_POOL_SIZE }
  }

  /// Lee `FIRMA_DB_URL` (o `DATABASE_URL`), `FIRMA_DB_BUSY_TIMEOUT_MS` y
  /// `FIRMA_DB_POOL_SIZE`. Con `pg` la URL es obligatoria y debe parecer
  /// una URL de Postgres.
  pub fn from_env() -> Result<Self, DomainError> {
    dotenvy::dotenv().ok();
    let url = std::env::var("FIRMA_DB_URL").or_else(|_| std::env::var("DATABASE_URL")).ok();
    let database_url = if cfg!(feature = "pg") {
      let url = url.ok_or_else(|| DomainError::ExternalError("FIRMA_DB_URL / DATABASE_URL no definido".into()))?;
      let l = url.to_lowercase();
      if !(l.starts_with("postgres://") || l.starts_with("postgresql://") || url.contains('@')) {
        return Err(DomainError::ExternalError("FIRMA_DB_URL / DATABASE_URL no parece una URL de Postgres".into()));
      }
      url
    } else {
      url.unwrap_or_else(|| DEFAULT_SQLITE_URL.to_string())
    };
    let busy_timeout_ms = parse_env("FIRMA_DB_BUSY_TIMEOUT_MS", DEFAULT_BUSY_TIMEOUT_MS)?;
    let pool_size = parse_env("FIRMA_DB_POOL_SIZE", DEFAULT_POOL_SIZE)?;
    if pool_size == 0 {
      return Err(DomainError::ValidationError("FIRMA_DB_POOL_SIZE debe ser mayor que cero".into()));
    }
    Ok(Self { database_url, busy_timeout_ms, pool_size })
  }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, DomainError> {
  match std::env::var(key) {
    Ok(raw) => raw.trim()
                  .parse::<T>()
                  .map_err(|_| DomainError::ValidationError(format!("{} inválido: {:?}", key, raw))),
    Err(_) => Ok(default),
  }
}

// PRAGMAs por conexión: el pool puede abrir conexiones nuevas en cualquier
// momento y cada una necesita claves foráneas y espera ante bloqueos.
#[cfg(not(feature = "pg"))]
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas {
  busy_timeout_ms: u64,
}

#[cfg(not(feature = "pg"))]
impl diesel::r2d2::CustomizeConnection<DbConn, diesel::r2d2::Error> for SqlitePragmas {
  fn on_acquire(&self, conn: &mut DbConn) -> Result<(), diesel::r2d2::Error> {
    use diesel::RunQueryDsl;
    diesel::sql_query(format!("PRAGMA busy_timeout = {};", self.busy_timeout_ms)).execute(conn)
                                                                                .map_err(diesel::r2d2::Error::QueryError)?;
    diesel::sql_query("PRAGMA foreign_keys = ON;").execute(conn)
                                                  .map_err(diesel::r2d2::Error::QueryError)?;
    Ok(())
  }
}

/// Construye el pool y aplica las migraciones pendientes.
pub(crate) fn build_pool(config: &PersistenceConfig) -> Result<DbPool, DomainError> {
  let manager = ConnectionManager::<DbConn>::new(config.database_url.as_str());
  let builder = Pool::builder().max_size(config.pool_size).connection_timeout(POOL_CONNECTION_TIMEOUT);
  #[cfg(not(feature = "pg"))]
  let builder = builder.connection_customizer(Box::new(SqlitePragmas { busy_timeout_ms: config.busy_timeout_ms }));
  let pool = builder.build(manager)
                    .map_err(|e| DomainError::ExternalError(format!("no se pudo crear el pool de conexiones: {}", e)))?;
  let mut conn = pool.get().map_err(|e| DomainError::ExternalError(format!("pool: {}", e)))?;
  #[cfg(not(feature = "pg"))]
  {
    use diesel::RunQueryDsl;
    if let Err(e) = diesel::sql_query("PRAGMA journal_mode = WAL;").execute(&mut conn) {
      log::debug!("journal_mode WAL no aplicado: {}", e);
    }
  }
  let applied = conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| DomainError::ExternalError(format!("migraciones: {}", e)))?;
  if !applied.is_empty() {
    log::info!("{} migraciones aplicadas", applied.len());
  }
  Ok(pool)
}
