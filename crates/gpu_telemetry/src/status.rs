//! Códigos de status retornados pela binding e classificação de falhas.
//!
//! Toda chamada à biblioteca do fabricante resulta em sucesso (`Ok`) ou em um
//! [`StatusCode`]. Nenhum desses códigos vira pânico: quem chama sempre
//! inspeciona o resultado.

/// Resultado de uma chamada à binding.
pub type BindingResult<T> = Result<T, StatusCode>;

/// Conjunto fechado de falhas reportadas pela binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum StatusCode {
    #[error("biblioteca não inicializada")]
    Uninitialized,

    #[error("argumento inválido")]
    InvalidArgument,

    #[error("operação não suportada pelo dispositivo")]
    NotSupported,

    #[error("sem permissão para a operação")]
    NoPermission,

    #[error("objeto não encontrado")]
    NotFound,

    #[error("buffer insuficiente")]
    InsufficientSize,

    #[error("driver não carregado")]
    DriverNotLoaded,

    #[error("timeout")]
    Timeout,

    #[error("biblioteca compartilhada não encontrada")]
    LibraryNotFound,

    #[error("função não implementada nesta versão da biblioteca")]
    FunctionNotFound,

    #[error("GPU caiu do barramento ou ficou inacessível")]
    GpuLost,

    #[error("GPU precisa de reset")]
    ResetRequired,

    #[error("erro desconhecido")]
    Unknown,
}

/// Categoria de uma falha, usada para decidir como reagir a ela.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Biblioteca ou driver ausente. Permanente para o processo.
    Unavailable,
    /// Falha passageira; a métrica fica com o último valor.
    Transient,
    /// O dispositivo não oferece a métrica; o slot nunca é atualizado.
    CapabilityAbsent,
    /// Não deveria acontecer com buffers de tamanho fixo. Tratada como transitória.
    Programming,
}

impl StatusCode {
    /// Classifica o código segundo a política de falhas.
    pub fn class(self) -> FailureClass {
        match self {
            StatusCode::Uninitialized
            | StatusCode::DriverNotLoaded
            | StatusCode::LibraryNotFound => FailureClass::Unavailable,
            StatusCode::NotSupported | StatusCode::FunctionNotFound | StatusCode::NoPermission => {
                FailureClass::CapabilityAbsent
            }
            StatusCode::InvalidArgument | StatusCode::InsufficientSize | StatusCode::NotFound => {
                FailureClass::Programming
            }
            StatusCode::Timeout
            | StatusCode::GpuLost
            | StatusCode::ResetRequired
            | StatusCode::Unknown => FailureClass::Transient,
        }
    }

    /// `true` quando a falha pode desaparecer no próximo ciclo.
    pub fn is_recoverable(self) -> bool {
        matches!(
            self.class(),
            FailureClass::Transient | FailureClass::Programming
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_absent_is_not_recoverable() {
        assert_eq!(StatusCode::NotSupported.class(), FailureClass::CapabilityAbsent);
        assert!(!StatusCode::FunctionNotFound.is_recoverable());
    }

    #[test]
    fn permission_denied_only_affects_the_query() {
        assert_eq!(StatusCode::NoPermission.class(), FailureClass::CapabilityAbsent);
        assert!(!StatusCode::NoPermission.is_recoverable());
    }

    #[test]
    fn lost_gpu_is_transient() {
        assert_eq!(StatusCode::GpuLost.class(), FailureClass::Transient);
        assert!(StatusCode::Timeout.is_recoverable());
        assert!(StatusCode::InsufficientSize.is_recoverable());
    }

    #[test]
    fn missing_driver_is_unavailable() {
        assert_eq!(StatusCode::DriverNotLoaded.class(), FailureClass::Unavailable);
        assert_eq!(StatusCode::LibraryNotFound.class(), FailureClass::Unavailable);
    }
}
