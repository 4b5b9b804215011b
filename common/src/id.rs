use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::task::TaskId;

/// Estrategia para generar ids de tarea.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> TaskId;
}

/// Ids aleatorios (uuid v4), el modo normal del servicio.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> TaskId {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Contador determinístico, para pruebas reproducibles.
#[derive(Debug)]
pub struct SequentialGenerator {
    next: AtomicU64,
}

impl SequentialGenerator {
    pub fn new(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl Default for SequentialGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IdGenerator for SequentialGenerator {
    fn next_id(&self) -> TaskId {
        self.next.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    #[default]
    Uuid,
    Sequential,
}

impl IdStrategy {
    pub fn build(self) -> Arc<dyn IdGenerator> {
        match self {
            IdStrategy::Uuid => Arc::new(UuidGenerator),
            IdStrategy::Sequential => Arc::new(SequentialGenerator::default()),
        }
    }
}

impl FromStr for IdStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uuid" | "random" => Ok(IdStrategy::Uuid),
            "sequential" | "counter" => Ok(IdStrategy::Sequential),
            other => Err(format!("unknown id strategy: {other}")),
        }
    }
}
