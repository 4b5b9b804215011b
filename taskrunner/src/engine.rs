use async_trait::async_trait;
use nbgwas_common::ScoreMap;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, process::Stdio};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, warn};

use crate::fetch::NetworkFormat;

/// Todo lo que el motor necesita para correr una tarea, con rutas ya resueltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tasktype", rename_all = "snake_case")]
pub enum PropagationInput {
    NetworkPropagation {
        network_file: PathBuf,
        network_format: NetworkFormat,
        alpha: f64,
        seeds: Vec<String>,
    },
    SnpAnalysis {
        network_file: PathBuf,
        network_format: NetworkFormat,
        #[serde(skip_serializing_if = "Option::is_none")]
        alpha: Option<f64>,
        window: u32,
        snp_level_summary_file: PathBuf,
        protein_coding_file: PathBuf,
        chromosome_col: String,
        basepair_col: String,
        pvalue_col: String,
    },
}

/// Calcula los puntajes de una tarea. Un error es un mensaje para el usuario.
#[async_trait]
pub trait Propagator: Send + Sync {
    async fn propagate(&self, input: &PropagationInput) -> Result<ScoreMap, String>;
}

/// Motor externo: recibe el `PropagationInput` en JSON por stdin y responde
/// `{"gen": puntaje, ...}` por stdout.
#[derive(Debug, Clone)]
pub struct CommandPropagator {
    program: String,
    args: Vec<String>,
}

impl CommandPropagator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl Propagator for CommandPropagator {
    async fn propagate(&self, input: &PropagationInput) -> Result<ScoreMap, String> {
        let payload =
            serde_json::to_vec(input).map_err(|e| format!("Unable to encode engine input: {e}"))?;

        debug!("lanzando motor {} {:?}", self.program, self.args);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Unable to start engine {}: {e}", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            // si el motor murió antes de leer, lo que importa es su código de salida
            if let Err(e) = stdin.write_all(&payload).await {
                warn!("no se pudo escribir la entrada del motor: {}", e);
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| format!("Unable to wait for engine: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "Engine exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        serde_json::from_slice::<ScoreMap>(&output.stdout)
            .map_err(|e| format!("Unable to parse engine output: {e}"))
    }
}
