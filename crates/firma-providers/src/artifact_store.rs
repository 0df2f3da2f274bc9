// Archivo: artifact_store.rs
// Propósito: contrato del almacén externo de artefactos y una
// implementación sobre el sistema de archivos.
use crate::errors::{ProviderError, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

/// Prefijo común de todas las rutas de artefactos.
pub const UPLOADS_PREFIX: &str = "/uploads";

/// Ruta canónica de un artefacto: `/uploads/<año>/<nombre>`.
pub fn artifact_path(year: i32, artifact_name: &str) -> String {
    format!("{}/{}/{}", UPLOADS_PREFIX, year, artifact_name)
}

/// Almacén externo de artefactos (bytes direccionados por ruta).
///
/// Las escrituras no participan de las transacciones de la base de datos:
/// quien orquesta es responsable de compensar (borrar o restaurar) cuando la
/// transacción falla después de escribir.
pub trait ArtifactStore: Send + Sync {
    /// Escribe (o sobrescribe) los bytes en `path`.
    fn put(&self, bytes: &[u8], path: &str) -> Result<()>;
    /// Lee los bytes almacenados en `path`.
    fn get(&self, path: &str) -> Result<Vec<u8>>;
    /// Borra el artefacto en `path`.
    fn delete(&self, path: &str) -> Result<()>;
    /// Indica si existe un artefacto en `path`.
    fn exists(&self, path: &str) -> Result<bool>;
}

/// Almacén respaldado por un directorio local.
///
/// ```ignore
/// <root>/
///   uploads/
///     <año>/
///       <nombre>
/// ```
///
/// Las escrituras pasan por un archivo temporal en el mismo directorio y un
/// rename, de modo que un lector nunca observa un artefacto a medio escribir.
#[derive(Clone, Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
                                     ProviderError::Store(format!("no se pudo crear el directorio raíz {}: {}",
                                                                  root.display(),
                                                                  e))
                                 })?;
        Ok(Self { root })
    }

    /// Construye el almacén desde `FIRMA_STORAGE_ROOT` (por defecto
    /// `./storage`).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let root = std::env::var("FIRMA_STORAGE_ROOT").unwrap_or_else(|_| "./storage".into());
        Self::new(root)
    }

    /// Traduce una ruta lógica a una ruta bajo `root`, rechazando
    /// componentes que escapen del directorio.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            return Err(ProviderError::InvalidPath(path.to_string()));
        }
        let mut out = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => out.push(part),
                _ => return Err(ProviderError::InvalidPath(path.to_string())),
            }
        }
        Ok(out)
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, bytes: &[u8], path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        let parent = target.parent()
                           .ok_or_else(|| ProviderError::InvalidPath(path.to_string()))?;
        fs::create_dir_all(parent).map_err(|e| ProviderError::Store(format!("{}: {}", parent.display(), e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| ProviderError::Store(e.to_string()))?;
        tmp.write_all(bytes).map_err(|e| ProviderError::Store(e.to_string()))?;
        tmp.flush().map_err(|e| ProviderError::Store(e.to_string()))?;
        tmp.persist(&target)
           .map_err(|e| ProviderError::Store(format!("{}: {}", target.display(), e.error)))?;
        log::debug!("artefacto escrito en {}", target.display());
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        match fs::read(&target) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ProviderError::ArtifactNotFound(path.to_string())),
            Err(e) => Err(ProviderError::Store(format!("{}: {}", target.display(), e))),
        }
    }

    fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ProviderError::ArtifactNotFound(path.to_string())),
            Err(e) => Err(ProviderError::Store(format!("{}: {}", target.display(), e))),
        }
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path)?.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_follows_upload_convention() {
        assert_eq!(artifact_path(2024, "abc.pdf"), "/uploads/2024/abc.pdf");
    }

    #[test]
    fn fs_store_put_get_overwrite_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        let path = artifact_path(2024, "doc.pdf");

        store.put(b"original", &path).unwrap();
        assert!(store.exists(&path).unwrap());
        assert_eq!(store.get(&path).unwrap(), b"original");

        store.put(b"firmado", &path).unwrap();
        assert_eq!(store.get(&path).unwrap(), b"firmado");
        assert!(dir.path().join("uploads/2024/doc.pdf").is_file());

        store.delete(&path).unwrap();
        assert!(!store.exists(&path).unwrap());
        assert!(matches!(store.get(&path), Err(ProviderError::ArtifactNotFound(_))));
    }

    #[test]
    fn fs_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        assert!(matches!(store.put(b"x", "/uploads/../../etc/passwd"), Err(ProviderError::InvalidPath(_))));
        assert!(matches!(store.get("/"), Err(ProviderError::InvalidPath(_))));
    }
}
