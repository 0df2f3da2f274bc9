use crate::document_persistence::{from_ms, map_db_err, parse_uuid, to_ms, DieselFirmaRepository};
use crate::schema;
use crate::schema::delegates::dsl as del_dsl;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use firma_domain::{ConflictKind, Delegate, DelegateRepository, DelegateState, DomainError};

const REVOKED: &str = "revoked";

#[derive(Debug, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = schema::delegates)]
#[diesel(treat_none_as_null = true)]
struct DelegateRow {
  pub id: String,
  pub owner_rut: String,
  pub delegate_rut: String,
  pub state: String,
  pub created_at_ts: i64,
  pub expires_at_ts: Option<i64>,
  pub revoked_at_ts: Option<i64>,
}

fn delegate_row(d: &Delegate) -> DelegateRow {
  DelegateRow { id: d.id().to_string(),
                owner_rut: d.owner_rut().to_string(),
                delegate_rut: d.delegate_rut().to_string(),
                state: d.state().as_str().to_string(),
                created_at_ts: to_ms(d.created_at()),
                expires_at_ts: d.expires_at().map(to_ms),
                revoked_at_ts: d.revoked_at().map(to_ms) }
}

fn delegate_from_row(r: DelegateRow) -> Result<Delegate, DomainError> {
  let revoked_at = r.revoked_at_ts.map(from_ms).transpose()?;
  let state = DelegateState::from_parts(&r.state, revoked_at)?;
  Ok(Delegate::from_parts(parse_uuid(&r.id)?,
                          r.owner_rut,
                          r.delegate_rut,
                          from_ms(r.created_at_ts)?,
                          r.expires_at_ts.map(from_ms).transpose()?,
                          state))
}

// El índice parcial `delegates_one_live_per_owner` es la última defensa
// contra dos filas vivas para el mismo dueño.
fn map_delegate_err(e: DieselError, owner_rut: &str) -> DomainError {
  match e {
    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
      DomainError::conflict(ConflictKind::DelegateAlreadyAppointed,
                            format!("Ya existe un delegado vigente para {}", owner_rut))
    }
    other => map_db_err(other),
  }
}

impl DelegateRepository for DieselFirmaRepository {
  fn find_live_delegate(&self, owner_rut: &str) -> Result<Option<Delegate>, DomainError> {
    let mut conn = self.conn()?;
    let row = del_dsl::delegates.filter(del_dsl::owner_rut.eq(owner_rut))
                                .filter(del_dsl::state.ne(REVOKED))
                                .first::<DelegateRow>(&mut conn)
                                .optional()
                                .map_err(map_db_err)?;
    row.map(delegate_from_row).transpose()
  }

  fn find_revoked_delegate(&self, owner_rut: &str, delegate_rut: &str) -> Result<Option<Delegate>, DomainError> {
    let mut conn = self.conn()?;
    let row = del_dsl::delegates.filter(del_dsl::owner_rut.eq(owner_rut))
                                .filter(del_dsl::delegate_rut.eq(delegate_rut))
                                .filter(del_dsl::state.eq(REVOKED))
                                .order(del_dsl::revoked_at_ts.desc())
                                .first::<DelegateRow>(&mut conn)
                                .optional()
                                .map_err(map_db_err)?;
    row.map(delegate_from_row).transpose()
  }

  fn insert_delegate(&self, delegate: &Delegate) -> Result<(), DomainError> {
    let mut conn = self.conn()?;
    diesel::insert_into(del_dsl::delegates).values(&delegate_row(delegate))
                                           .execute(&mut conn)
                                           .map_err(|e| map_delegate_err(e, delegate.owner_rut()))?;
    Ok(())
  }

  fn update_delegate(&self, delegate: &Delegate) -> Result<(), DomainError> {
    let mut conn = self.conn()?;
    let changed = diesel::update(del_dsl::delegates.filter(del_dsl::id.eq(delegate.id().to_string())))
                  .set(&delegate_row(delegate))
                  .execute(&mut conn)
                  .map_err(|e| map_delegate_err(e, delegate.owner_rut()))?;
    if changed != 1 {
      return Err(DomainError::NotFound(format!("delegado {}", delegate.id())));
    }
    Ok(())
  }

  fn live_delegations_for(&self, delegate_rut: &str) -> Result<Vec<Delegate>, DomainError> {
    let mut conn = self.conn()?;
    let rows = del_dsl::delegates.filter(del_dsl::delegate_rut.eq(delegate_rut))
                                 .filter(del_dsl::state.ne(REVOKED))
                                 .load::<DelegateRow>(&mut conn)
                                 .map_err(map_db_err)?;
    rows.into_iter().map(delegate_from_row).collect()
  }
}
