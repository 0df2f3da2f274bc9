// Archivo: signing_provider.rs
// Propósito: contrato del proveedor externo de firma electrónica y un
// cliente HTTP bloqueante con timeout propio.
use crate::checksum::{decode_base64, sha256_hex};
use crate::errors::{ProviderError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::time::Duration;

/// Timeout por defecto de la llamada al proveedor, independiente de los
/// timeouts de la base de datos.
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Solicitud de firma: contenido en base64, checksum sha256 en hex y
/// metadatos de diagramación (página, posición, etc.) que el proveedor
/// interpreta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRequest {
    pub content: String,
    pub checksum: String,
    #[serde(default)]
    pub layout: JsonValue,
}

/// Respuesta del proveedor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignResponse {
    pub success: bool,
    #[serde(default)]
    pub signed_content: Option<String>,
    #[serde(default)]
    pub signed_checksum: Option<String>,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl SignResponse {
    /// Valida la respuesta y devuelve los bytes firmados junto a la
    /// metadata. Una respuesta sin éxito, sin contenido o con checksum que
    /// no calza con el contenido decodificado se trata como fallo del
    /// proveedor.
    pub fn into_signed_bytes(self) -> Result<(Vec<u8>, JsonValue)> {
        if !self.success {
            let reason = self.metadata
                             .get("message")
                             .and_then(|m| m.as_str())
                             .unwrap_or("sin detalle")
                             .to_string();
            return Err(ProviderError::Rejected(reason));
        }
        let encoded = self.signed_content
                          .ok_or_else(|| ProviderError::InvalidResponse("respuesta sin contenido firmado".into()))?;
        let bytes = decode_base64(&encoded)?;
        if let Some(expected) = self.signed_checksum {
            let actual = sha256_hex(&bytes);
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(ProviderError::InvalidResponse(format!("checksum no coincide: esperado {}, calculado {}",
                                                                  expected, actual)));
            }
        }
        Ok((bytes, self.metadata))
    }
}

/// Proveedor externo de firma.
pub trait SigningProvider: Send + Sync {
    fn sign(&self, request: &SignRequest) -> Result<SignResponse>;
}

/// Configuración del cliente HTTP del proveedor. El token nunca se
/// serializa ni aparece en `Debug`.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub endpoint: String,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
         .field("endpoint", &self.endpoint)
         .field("token", &self.token.as_ref().map(|_| "<oculto>"))
         .field("timeout", &self.timeout)
         .finish()
    }
}

impl ProviderConfig {
    /// Lee `FIRMA_PROVIDER_URL` (obligatoria), `FIRMA_PROVIDER_TOKEN` y
    /// `FIRMA_PROVIDER_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let endpoint = std::env::var("FIRMA_PROVIDER_URL").map_err(|_| {
                                                               ProviderError::Config("FIRMA_PROVIDER_URL not set".into())
                                                           })?;
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ProviderError::Config(format!("FIRMA_PROVIDER_URL no parece una URL http: {}", endpoint)));
        }
        let token = std::env::var("FIRMA_PROVIDER_TOKEN").ok().filter(|t| !t.trim().is_empty());
        let secs = match std::env::var("FIRMA_PROVIDER_TIMEOUT_SECS") {
            Ok(raw) => raw.trim()
                          .parse::<u64>()
                          .map_err(|_| ProviderError::Config(format!("FIRMA_PROVIDER_TIMEOUT_SECS inválido: {}", raw)))?,
            Err(_) => DEFAULT_PROVIDER_TIMEOUT_SECS,
        };
        Ok(Self { endpoint, token, timeout: Duration::from_secs(secs) })
    }
}

/// Cliente HTTP (POST JSON) del proveedor de firma.
pub struct HttpSigningProvider {
    client: reqwest::blocking::Client,
    config: ProviderConfig,
}

impl HttpSigningProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder().timeout(config.timeout)
                                                         .connect_timeout(config.timeout)
                                                         .build()
                                                         .map_err(|e| ProviderError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ProviderConfig::from_env()?)
    }
}

impl SigningProvider for HttpSigningProvider {
    fn sign(&self, request: &SignRequest) -> Result<SignResponse> {
        let mut call = self.client.post(&self.config.endpoint).json(request);
        if let Some(token) = &self.config.token {
            call = call.bearer_auth(token);
        }
        let response = call.send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            log::warn!("proveedor de firma respondió {}: {}", status, body);
            return Err(ProviderError::Rejected(format!("HTTP {}", status)));
        }
        Ok(response.json::<SignResponse>()?)
    }
}
