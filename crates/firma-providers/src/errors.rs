// Archivo: errors.rs
// Propósito: errores de los colaboradores externos (almacén de artefactos y
// proveedor de firma). El crate de dominio los convierte en `DomainError`.
use thiserror::Error;

/// Errores producidos al hablar con sistemas externos.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// El proveedor respondió pero rechazó la firma.
    #[error("El proveedor de firma rechazó la solicitud: {0}")]
    Rejected(String),
    /// El proveedor no respondió dentro del plazo configurado.
    #[error("Tiempo de espera agotado con el proveedor de firma: {0}")]
    Timeout(String),
    /// Error de red o de protocolo al contactar al proveedor.
    #[error("Error de transporte con el proveedor de firma: {0}")]
    Transport(String),
    /// La respuesta no se pudo interpretar o no es consistente.
    #[error("Respuesta inválida del proveedor de firma: {0}")]
    InvalidResponse(String),
    /// No existe un artefacto en la ruta pedida.
    #[error("Artefacto no encontrado: {0}")]
    ArtifactNotFound(String),
    /// Fallo de lectura/escritura en el almacén.
    #[error("Error del almacén de artefactos: {0}")]
    Store(String),
    /// Ruta fuera de la convención `/uploads/<año>/<nombre>`.
    #[error("Ruta de artefacto inválida: {0}")]
    InvalidPath(String),
    /// Configuración ausente o mal formada.
    #[error("Error de configuración: {0}")]
    Config(String),
}

impl ProviderError {
    /// `true` para errores originados en el proveedor de firma (no en el
    /// almacén).
    pub fn is_signing_failure(&self) -> bool {
        matches!(self,
                 ProviderError::Rejected(_)
                 | ProviderError::Timeout(_)
                 | ProviderError::Transport(_)
                 | ProviderError::InvalidResponse(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout(e.to_string())
        } else if e.is_decode() {
            ProviderError::InvalidResponse(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

/// Alias de resultado usado por las APIs del crate.
pub type Result<T> = std::result::Result<T, ProviderError>;
