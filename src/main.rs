use chrono::{DateTime, Utc};
use firma_domain::{DomainError, SignerSpec, SignerType};
use firma_providers::{FakeSigningProvider, FsArtifactStore, HttpSigningProvider, SigningProvider};
use firma_workflow::{FirmaService, PendingFilters, SigningInputs, WorkflowConfig};
use std::error::Error;
use std::io::{self, Write};
use std::sync::Arc;
use uuid::Uuid;

/// Menú interactivo sobre el motor de firmas.
///
/// Usa la base indicada por `FIRMA_DB_URL`, el almacén en
/// `FIRMA_STORAGE_ROOT` y el proveedor HTTP de `FIRMA_PROVIDER_URL`. Sin
/// proveedor configurado se usa uno falso.
///
/// Opciones soportadas:
/// 1) Crear documento
/// 2) Firmar documento
/// 3) Ver pendientes
/// 4) Delegados
/// 5) Descargar artefacto
/// 6) Borrar documento
/// 7) Salir
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let service = build_service()?;

    loop {
        println!("\n== Firma CLI menu ==");
        println!("1) Crear documento");
        println!("2) Firmar documento");
        println!("3) Ver pendientes de un rut");
        println!("4) Delegados");
        println!("5) Descargar artefacto");
        println!("6) Borrar documento");
        println!("7) Salir");
        let choice = prompt("Elige una opción: ")?;
        match choice.trim() {
            "1" => create_document(&service)?,
            "2" => {
                let actor = prompt("Rut del firmante: ")?;
                let Some(id) = prompt_uuid("Id del documento (UUID): ")? else { continue };
                match service.sign_document(actor.trim(), id, &SigningInputs::default()) {
                    Ok(out) => {
                        println!("Slot {} firmado{}",
                                 out.signature.id(),
                                 if out.document_fully_signed { "; documento completo" } else { "" })
                    }
                    Err(e) => report("Error firmando", &e),
                }
            }
            "3" => {
                let actor = prompt("Rut: ")?;
                let name = prompt("Filtrar por nombre (enter para todos): ")?;
                let filters = PendingFilters { name_contains: Some(name.trim().to_string()).filter(|s| !s.is_empty()),
                                               ..Default::default() };
                match service.pending_first_page(actor.trim(), &filters) {
                    Ok(page) => {
                        println!("\nDOCUMENTO                            | NOMBRE               | SLOT DE      | ESTADO");
                        println!("-----------------------------------------------------------------------------------------");
                        for p in &page.items {
                            let owner = match &p.on_behalf_of {
                                Some(o) => format!("{} (deleg.)", o),
                                None => p.slot_owner_rut.clone(),
                            };
                            println!("{} | {:<20} | {:<12} | {}", p.document_id, p.document_name, owner, p.status);
                        }
                        println!("{} de {} (página {}/{})", page.items.len(), page.total, page.page, page.total_pages.max(1));
                    }
                    Err(e) => report("Error consultando pendientes", &e),
                }
            }
            "4" => delegates_menu(&service)?,
            "5" => {
                let Some(id) = prompt_uuid("Id del documento (UUID): ")? else { continue };
                let dest = prompt("Archivo destino: ")?;
                match service.download_artifact(id) {
                    Ok(bytes) => match std::fs::write(dest.trim(), &bytes) {
                        Ok(()) => println!("{} bytes escritos en {}", bytes.len(), dest.trim()),
                        Err(e) => eprintln!("Error escribiendo {}: {}", dest.trim(), e),
                    },
                    Err(e) => report("Error descargando", &e),
                }
            }
            "6" => {
                let actor = prompt("Rut del creador: ")?;
                let Some(id) = prompt_uuid("Id del documento (UUID): ")? else { continue };
                match service.delete_document(actor.trim(), id) {
                    Ok(()) => println!("Documento {} borrado", id),
                    Err(e) => report("Error borrando", &e),
                }
            }
            "7" => break,
            other => println!("Opción no válida: {}", other),
        }
    }

    Ok(())
}

fn build_service() -> Result<FirmaService, Box<dyn Error>> {
    // Inicializar repo (aplica migraciones embebidas si procede)
    let repo = Arc::new(firma_persistence::new_from_env()?);
    let store = Arc::new(FsArtifactStore::from_env()?);
    let provider: Arc<dyn SigningProvider> = match HttpSigningProvider::from_env() {
        Ok(p) => Arc::new(p),
        Err(e) => {
            log::warn!("proveedor de firma no configurado ({}); se usa el proveedor falso", e);
            Arc::new(FakeSigningProvider::new())
        }
    };
    let config = WorkflowConfig::from_env()?;
    Ok(FirmaService::new(repo.clone(), repo, store, provider, config))
}

fn create_document(service: &FirmaService) -> Result<(), Box<dyn Error>> {
    let creator = prompt("Rut del creador: ")?;
    let name = prompt("Nombre del documento: ")?;
    let source = prompt("Ruta del PDF: ")?;
    let content = match std::fs::read(source.trim()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("No se pudo leer {}: {}", source.trim(), e);
            return Ok(());
        }
    };
    println!("Firmantes, uno por línea como `rut orden V|F` (línea vacía para terminar):");
    let mut signers = Vec::new();
    loop {
        let line = prompt("> ")?;
        if line.trim().is_empty() {
            break;
        }
        match parse_signer(&line) {
            Some(s) => signers.push(s),
            None => println!("Formato inválido; ejemplo: 11111111-1 1 V"),
        }
    }
    match service.create_document(creator.trim(), name.trim(), &content, &signers) {
        Ok(doc) => println!("Documento creado: {} ({})", doc.id(), doc.artifact_path()),
        Err(e) => report("Error creando documento", &e),
    }
    Ok(())
}

fn delegates_menu(service: &FirmaService) -> Result<(), Box<dyn Error>> {
    println!("a) Nombrar  b) Revocar  c) Activar  d) Desactivar  e) Expiración  f) Ver actual");
    let op = prompt("Operación: ")?;
    let owner = prompt("Rut del dueño: ")?;
    let owner = owner.trim();
    let res = match op.trim() {
        "a" => {
            let delegate = prompt("Rut del delegado: ")?;
            service.appoint_delegate(owner, delegate.trim())
        }
        "b" => service.revoke_delegate(owner),
        "c" => service.activate_delegate(owner),
        "d" => service.deactivate_delegate(owner),
        "e" => {
            let raw = prompt("Expira (RFC 3339, enter para quitar): ")?;
            let expires_at = if raw.trim().is_empty() {
                None
            } else {
                match DateTime::parse_from_rfc3339(raw.trim()) {
                    Ok(d) => Some(d.with_timezone(&Utc)),
                    Err(e) => {
                        eprintln!("Fecha inválida: {}", e);
                        return Ok(());
                    }
                }
            };
            service.set_delegate_expiration(owner, expires_at)
        }
        "f" => service.current_delegate(owner),
        other => {
            println!("Operación no válida: {}", other);
            return Ok(());
        }
    };
    match res {
        Ok(d) => println!("{} -> {} [{}] expira: {}",
                          d.owner_rut(),
                          d.delegate_rut(),
                          d.state().as_str(),
                          d.expires_at().map(|e| e.to_rfc3339()).unwrap_or_else(|| "-".into())),
        Err(e) => report("Error en delegados", &e),
    }
    Ok(())
}

fn parse_signer(line: &str) -> Option<SignerSpec> {
    let mut parts = line.split_whitespace();
    let rut = parts.next()?;
    let order = parts.next()?.parse::<i32>().ok()?;
    let signer_type = match parts.next()?.to_uppercase().as_str() {
        "V" | "VISADOR" => SignerType::Visador,
        "F" | "FIRMADOR" => SignerType::Firmador,
        _ => return None,
    };
    Some(SignerSpec::new(rut, order, signer_type))
}

fn report(context: &str, e: &DomainError) {
    eprintln!("{}: {}", context, e.public_message());
    log::debug!("{}: {:?}", context, e);
}

fn prompt_uuid(msg: &str) -> io::Result<Option<Uuid>> {
    let raw = prompt(msg)?;
    match Uuid::parse_str(raw.trim()) {
        Ok(id) => Ok(Some(id)),
        Err(_) => {
            eprintln!("UUID inválido: {}", raw.trim());
            Ok(None)
        }
    }
}

fn prompt(msg: &str) -> io::Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s)
}
