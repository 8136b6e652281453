use crate::clients::ClientError;
use crate::models::Source;

/// Erreurs d'une passe de réconciliation
///
/// `MissingKey` et les conflits de hostname sont non fatals (journalisés,
/// l'entité est ignorée). `InternalInvariant` et `UpstreamUnavailable`
/// interrompent la passe.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("invalid host key: {0}")]
    InvalidKey(String),
    #[error("{origin} entity {entity} has no {field}")]
    MissingKey {
        origin: Source,
        entity: String,
        field: &'static str,
    },
    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
    #[error("{collaborator} unavailable during {phase}: {source}")]
    UpstreamUnavailable {
        collaborator: &'static str,
        phase: &'static str,
        source: ClientError,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReconcileError {
    /// Vrai si l'erreur doit interrompre la passe
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ReconcileError::MissingKey { .. })
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
