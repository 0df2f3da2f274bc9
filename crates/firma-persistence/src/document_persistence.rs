use crate::connection::{build_pool, DbConn, DbPool, PersistenceConfig, PooledConn};
use crate::schema;
use crate::schema::documents::dsl as doc_dsl;
use crate::schema::signatures::dsl as sig_dsl;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use firma_domain::{ConflictKind, Document, DocumentRepository, DocumentTx, DomainError, Signature, SignerType};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Repo Diesel que implementa `DocumentRepository` y `DelegateRepository`.
#[derive(Clone)]
pub struct DieselFirmaRepository {
  pool: Arc<DbPool>,
}

impl DieselFirmaRepository {
  pub fn new(database_url: &str) -> Result<Self, DomainError> {
    Self::with_config(&PersistenceConfig::new(database_url))
  }

  pub fn with_config(config: &PersistenceConfig) -> Result<Self, DomainError> {
    let pool = build_pool(config)?;
    Ok(Self { pool: Arc::new(pool) })
  }

  pub(crate) fn conn(&self) -> Result<PooledConn, DomainError> {
    self.pool.get().map_err(|e| DomainError::ExternalError(format!("pool: {}", e)))
  }
}

/// Crea el repositorio desde las variables de entorno (ver
/// `PersistenceConfig::from_env`).
pub fn new_from_env() -> Result<DieselFirmaRepository, DomainError> {
  let config = PersistenceConfig::from_env()?;
  DieselFirmaRepository::with_config(&config)
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::documents)]
struct DocumentRow {
  pub id: String,
  pub name: String,
  pub artifact_name: String,
  pub artifact_path: String,
  pub owner_rut: String,
  pub created_at_ts: i64,
  pub is_fully_signed: bool,
  pub deleted_at_ts: Option<i64>,
}

#[derive(Debug, Queryable, Insertable)]
#[diesel(table_name = schema::signatures)]
struct SignatureRow {
  pub id: String,
  pub document_id: String,
  pub owner_rut: String,
  pub signer_rut: Option<String>,
  pub signer_order: i32,
  pub signer_type: String,
  pub is_signed: bool,
  pub signed_at_ts: Option<i64>,
}

// Error interno de la transacción: la clausura de Diesel necesita un tipo
// que venga de `DieselError` y que a la vez transporte errores de dominio.
#[derive(Debug, Error)]
pub(crate) enum TxError {
  #[error("db: {0}")]
  Db(#[from] DieselError),
  #[error(transparent)]
  Domain(DomainError),
}

impl From<TxError> for DomainError {
  fn from(e: TxError) -> Self {
    match e {
      TxError::Db(e) => map_db_err(e),
      TxError::Domain(e) => e,
    }
  }
}

pub(crate) fn map_db_err(e: DieselError) -> DomainError {
  match e {
    DieselError::NotFound => DomainError::NotFound("registro".to_string()),
    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
      DomainError::ValidationError(format!("restricción de unicidad: {}", info.message()))
    }
    other => DomainError::ExternalError(format!("db: {}", other)),
  }
}

pub(crate) fn to_ms(at: DateTime<Utc>) -> i64 {
  at.timestamp_millis()
}

pub(crate) fn from_ms(ms: i64) -> Result<DateTime<Utc>, DomainError> {
  DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| DomainError::ExternalError(format!("timestamp inválido: {}", ms)))
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DomainError> {
  Uuid::parse_str(s).map_err(|e| DomainError::ExternalError(format!("invalid uuid: {}", e)))
}

fn document_row(document: &Document) -> DocumentRow {
  DocumentRow { id: document.id().to_string(),
                name: document.name().to_string(),
                artifact_name: document.artifact_name().to_string(),
                artifact_path: document.artifact_path().to_string(),
                owner_rut: document.owner_rut().to_string(),
                created_at_ts: to_ms(document.created_at()),
                is_fully_signed: document.is_fully_signed(),
                deleted_at_ts: document.deleted_at().map(to_ms) }
}

fn signature_row(slot: &Signature) -> SignatureRow {
  SignatureRow { id: slot.id().to_string(),
                 document_id: slot.document_id().to_string(),
                 owner_rut: slot.owner_rut().to_string(),
                 signer_rut: slot.signer_rut().map(|s| s.to_string()),
                 signer_order: slot.signer_order(),
                 signer_type: slot.signer_type().as_str().to_string(),
                 is_signed: slot.is_signed(),
                 signed_at_ts: slot.signed_at().map(to_ms) }
}

fn signature_from_row(r: SignatureRow) -> Result<Signature, DomainError> {
  let signer_type: SignerType = r.signer_type.parse()?;
  let signed_at = r.signed_at_ts.map(from_ms).transpose()?;
  Signature::from_parts(parse_uuid(&r.id)?,
                        parse_uuid(&r.document_id)?,
                        &r.owner_rut,
                        r.signer_rut,
                        r.signer_order,
                        signer_type,
                        r.is_signed,
                        signed_at)
}

fn document_from_rows(r: DocumentRow, slots: Vec<SignatureRow>) -> Result<Document, DomainError> {
  let signatures = slots.into_iter().map(signature_from_row).collect::<Result<Vec<_>, _>>()?;
  Document::from_parts(parse_uuid(&r.id)?,
                       r.name,
                       r.artifact_name,
                       r.artifact_path,
                       from_ms(r.created_at_ts)?,
                       r.owner_rut,
                       r.is_fully_signed,
                       r.deleted_at_ts.map(from_ms).transpose()?,
                       signatures)
}

// Carga documentos con sus slots en dos consultas.
fn load_documents(conn: &mut DbConn, rows: Vec<DocumentRow>) -> Result<Vec<Document>, DomainError> {
  if rows.is_empty() {
    return Ok(Vec::new());
  }
  let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
  let slot_rows = sig_dsl::signatures.filter(sig_dsl::document_id.eq_any(&ids))
                                     .load::<SignatureRow>(conn)
                                     .map_err(map_db_err)?;
  let mut by_doc: HashMap<String, Vec<SignatureRow>> = HashMap::new();
  for s in slot_rows {
    by_doc.entry(s.document_id.clone()).or_default().push(s);
  }
  rows.into_iter()
      .map(|r| {
        let slots = by_doc.remove(&r.id).unwrap_or_default();
        document_from_rows(r, slots)
      })
      .collect()
}

struct DieselTx<'a> {
  conn: &'a mut DbConn,
}

impl DocumentTx for DieselTx<'_> {
  fn insert_document(&mut self, document: &Document) -> Result<(), DomainError> {
    let conn = &mut *self.conn;
    diesel::insert_into(doc_dsl::documents).values(&document_row(document))
                                           .execute(conn)
                                           .map_err(map_db_err)?;
    let slots: Vec<SignatureRow> = document.signatures().iter().map(signature_row).collect();
    diesel::insert_into(sig_dsl::signatures).values(&slots)
                                            .execute(conn)
                                            .map_err(map_db_err)?;
    Ok(())
  }

  fn lock_document(&mut self, id: Uuid) -> Result<Option<Document>, DomainError> {
    let conn = &mut *self.conn;
    let id_s = id.to_string();
    // Postgres: bloqueo de filas. SQLite ya tiene el lock de escritura por la
    // transacción IMMEDIATE.
    #[cfg(feature = "pg")]
    let row = doc_dsl::documents.filter(doc_dsl::id.eq(&id_s))
                                .for_update()
                                .first::<DocumentRow>(conn)
                                .optional()
                                .map_err(map_db_err)?;
    #[cfg(not(feature = "pg"))]
    let row = doc_dsl::documents.filter(doc_dsl::id.eq(&id_s))
                                .first::<DocumentRow>(conn)
                                .optional()
                                .map_err(map_db_err)?;
    let Some(row) = row else {
      return Ok(None);
    };
    #[cfg(feature = "pg")]
    let slots = sig_dsl::signatures.filter(sig_dsl::document_id.eq(&id_s))
                                   .for_update()
                                   .load::<SignatureRow>(conn)
                                   .map_err(map_db_err)?;
    #[cfg(not(feature = "pg"))]
    let slots = sig_dsl::signatures.filter(sig_dsl::document_id.eq(&id_s))
                                   .load::<SignatureRow>(conn)
                                   .map_err(map_db_err)?;
    document_from_rows(row, slots).map(Some)
  }

  fn mark_signed(&mut self, slot: &Signature) -> Result<(), DomainError> {
    let (signer, at) = match (slot.signer_rut(), slot.signed_at()) {
      (Some(signer), Some(at)) => (signer.to_string(), at),
      _ => return Err(DomainError::ValidationError(format!("El slot {} no trae datos de firma", slot.id()))),
    };
    let conn = &mut *self.conn;
    let changed = diesel::update(sig_dsl::signatures.filter(sig_dsl::id.eq(slot.id().to_string()))
                                                    .filter(sig_dsl::is_signed.eq(false)))
                  .set((sig_dsl::is_signed.eq(true),
                        sig_dsl::signer_rut.eq(Some(signer)),
                        sig_dsl::signed_at_ts.eq(Some(to_ms(at)))))
                  .execute(conn)
                  .map_err(map_db_err)?;
    if changed != 1 {
      return Err(DomainError::conflict(ConflictKind::AlreadySigned,
                                       format!("El slot {} ya fue firmado o no existe", slot.id())));
    }
    Ok(())
  }

  fn set_fully_signed(&mut self, document_id: Uuid, fully_signed: bool) -> Result<(), DomainError> {
    let conn = &mut *self.conn;
    let changed = diesel::update(doc_dsl::documents.filter(doc_dsl::id.eq(document_id.to_string())))
                  .set(doc_dsl::is_fully_signed.eq(fully_signed))
                  .execute(conn)
                  .map_err(map_db_err)?;
    if changed != 1 {
      return Err(DomainError::NotFound(format!("documento {}", document_id)));
    }
    Ok(())
  }
}

impl DocumentRepository for DieselFirmaRepository {
  fn transaction(&self,
                 work: &mut dyn FnMut(&mut dyn DocumentTx) -> Result<(), DomainError>)
                 -> Result<(), DomainError> {
    let mut conn = self.conn()?;
    let run = |c: &mut DbConn| -> Result<(), TxError> {
      let mut tx = DieselTx { conn: c };
      work(&mut tx).map_err(TxError::Domain)
    };
    #[cfg(feature = "pg")]
    let res = conn.build_transaction().read_committed().run(run);
    #[cfg(not(feature = "pg"))]
    let res = conn.immediate_transaction(run);
    res.map_err(DomainError::from)
  }

  fn get_document(&self, id: Uuid) -> Result<Option<Document>, DomainError> {
    let mut conn = self.conn()?;
    let row = doc_dsl::documents.filter(doc_dsl::id.eq(id.to_string()))
                                .first::<DocumentRow>(&mut conn)
                                .optional()
                                .map_err(map_db_err)?;
    match row {
      Some(r) => Ok(load_documents(&mut conn, vec![r])?.pop()),
      None => Ok(None),
    }
  }

  fn documents_for_actor(&self, actor: &str, principals: &[String]) -> Result<Vec<Document>, DomainError> {
    let mut conn = self.conn()?;
    let mut ids: BTreeSet<String> = BTreeSet::new();
    ids.extend(sig_dsl::signatures.filter(sig_dsl::owner_rut.eq(actor))
                                  .select(sig_dsl::document_id)
                                  .load::<String>(&mut conn)
                                  .map_err(map_db_err)?);
    ids.extend(sig_dsl::signatures.filter(sig_dsl::signer_rut.eq(actor))
                                  .select(sig_dsl::document_id)
                                  .load::<String>(&mut conn)
                                  .map_err(map_db_err)?);
    if !principals.is_empty() {
      ids.extend(sig_dsl::signatures.filter(sig_dsl::is_signed.eq(false))
                                    .filter(sig_dsl::owner_rut.eq_any(principals))
                                    .select(sig_dsl::document_id)
                                    .load::<String>(&mut conn)
                                    .map_err(map_db_err)?);
    }
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let ids: Vec<String> = ids.into_iter().collect();
    let rows = doc_dsl::documents.filter(doc_dsl::id.eq_any(&ids))
                                 .filter(doc_dsl::deleted_at_ts.is_null())
                                 .load::<DocumentRow>(&mut conn)
                                 .map_err(map_db_err)?;
    load_documents(&mut conn, rows)
  }

  fn list_documents_by_owner(&self, owner_rut: &str) -> Result<Vec<Document>, DomainError> {
    let mut conn = self.conn()?;
    let rows = doc_dsl::documents.filter(doc_dsl::owner_rut.eq(owner_rut))
                                 .filter(doc_dsl::deleted_at_ts.is_null())
                                 .order(doc_dsl::created_at_ts.desc())
                                 .load::<DocumentRow>(&mut conn)
                                 .map_err(map_db_err)?;
    load_documents(&mut conn, rows)
  }

  fn soft_delete_document(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DomainError> {
    let mut conn = self.conn()?;
    let changed = diesel::update(doc_dsl::documents.filter(doc_dsl::id.eq(id.to_string()))
                                                   .filter(doc_dsl::deleted_at_ts.is_null()))
                  .set(doc_dsl::deleted_at_ts.eq(Some(to_ms(at))))
                  .execute(&mut conn)
                  .map_err(map_db_err)?;
    if changed != 1 {
      return Err(DomainError::NotFound(format!("documento {}", id)));
    }
    Ok(())
  }
}
