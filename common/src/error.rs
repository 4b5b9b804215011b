use std::io;

/// Fallas al crear una tarea nueva.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// La forma del pedido es inválida (origen de red, largo de ids, alpha...)
    #[error("Invalid submission: {0}")]
    Validation(String),

    /// No se pudo leer el cuerpo del pedido (corte de conexión, límite de tamaño...)
    #[error("Unable to read request body: {0}")]
    Upload(String),

    #[error("Unable to write task to disk: {0}")]
    Io(#[from] io::Error),

    #[error("Unable to serialize task: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SubmitError {
    pub fn is_validation(&self) -> bool {
        matches!(self, SubmitError::Validation(_))
    }

    /// Etiqueta que viaja en la respuesta HTTP
    pub fn kind(&self) -> &'static str {
        if self.is_validation() {
            "validation"
        } else {
            "internal"
        }
    }
}
