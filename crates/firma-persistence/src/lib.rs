//! Persistencia Diesel para el motor de firmas.
//! Expone el módulo `schema` y el repositorio `DieselFirmaRepository`, que
//! implementa los traits de repositorio de documentos y delegados del
//! dominio. Sin la feature `pg` usa SQLite; con `pg`, Postgres.

mod connection;
mod delegate_persistence;
mod document_persistence;
pub mod schema;

pub use connection::{PersistenceConfig, DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_POOL_SIZE, DEFAULT_SQLITE_URL, MIGRATIONS};
pub use document_persistence::{new_from_env, DieselFirmaRepository};
