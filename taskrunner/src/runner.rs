use nbgwas_common::{
    FileBasedTask, NetworkSource, SubmittedTaskFactory, TaskKind, TaskState, FETCHED_NETWORK,
    NETWORK_DATA, PROTEIN_CODING, SNP_LEVEL_SUMMARY,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{
    engine::{PropagationInput, Propagator},
    fetch::{FetchError, NetworkFetcher, NetworkFormat},
};

pub const NO_RESULT_MESSAGE: &str = "No result generated";

/// Fallas al procesar una tarea; todas terminan en una transición a error.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Task has no parsed metadata")]
    MissingRecord,

    #[error("Task is missing its {0} file")]
    MissingFile(&'static str),

    #[error("Unable to get network for task: {0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Propagation(String),

    #[error("{}", NO_RESULT_MESSAGE)]
    NoResult,

    #[error("Task processing crashed: {0}")]
    Panicked(String),

    #[error("{0}")]
    Transition(String),
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Espera entre consultas cuando no hay tareas
    pub wait_time: Duration,
    /// Consultas vacías seguidas antes de vaciar la lista de problemas (0 = nunca)
    pub cleanup_every: u32,
    pub delete_temp_files: bool,
    pub protein_coding_dir: Option<PathBuf>,
    pub protein_coding_suffix: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_secs(30),
            cleanup_every: 3,
            delete_temp_files: true,
            protein_coding_dir: None,
            protein_coding_suffix: ".txt".to_string(),
        }
    }
}

/// Consumidor único de la cola: toma tareas de `submitted` de a una.
pub struct TaskRunner {
    factory: SubmittedTaskFactory,
    fetcher: Arc<dyn NetworkFetcher>,
    propagator: Arc<dyn Propagator>,
    settings: RunnerSettings,
}

impl TaskRunner {
    pub fn new(
        factory: SubmittedTaskFactory,
        fetcher: Arc<dyn NetworkFetcher>,
        propagator: Arc<dyn Propagator>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            factory,
            fetcher,
            propagator,
            settings,
        }
    }

    pub fn factory(&self) -> &SubmittedTaskFactory {
        &self.factory
    }

    /// Loop principal. Sigue mientras `keep_looping` devuelva true; nada de lo
    /// que pase con una tarea lo corta.
    pub async fn run_tasks(&mut self, mut keep_looping: impl FnMut() -> bool) {
        let mut empty_polls: u32 = 0;

        while keep_looping() {
            let Some(mut task) = self.factory.next_task() else {
                empty_polls += 1;
                if self.settings.cleanup_every > 0
                    && empty_polls % self.settings.cleanup_every == 0
                    && self.factory.problem_count() > 0
                {
                    let drained = self.factory.drain_problems();
                    info!("{} tareas con task.json ilegible pasadas a error", drained);
                }
                sleep(self.settings.wait_time).await;
                continue;
            };
            empty_polls = 0;

            debug!("tarea encontrada: {}", task.summary());
            if let Err(e) = self.process_task(&mut task).await {
                let emsg = e.to_string();
                error!("falló la tarea {}: {}", task.summary(), emsg);

                if let Err(move_err) =
                    task.move_to(TaskState::Error, Some(emsg.as_str()), self.settings.delete_temp_files)
                {
                    // la tarea sigue donde estaba, no hay que volver a tomarla enseguida
                    error!(
                        "no se pudo mover {} a error: {}",
                        task.summary(),
                        move_err
                    );
                    sleep(self.settings.wait_time).await;
                }
            }
        }
    }

    /// processing -> red -> motor -> done. Cualquier `Err` lo convierte el
    /// loop en una transición a error.
    pub async fn process_task(&self, task: &mut FileBasedTask) -> Result<(), RunnerError> {
        info!("procesando tarea {}", task.summary());
        task.move_to(TaskState::Processing, None, false)
            .map_err(RunnerError::Transition)?;

        // descarga y motor corren en su propia tarea: un panic no tumba el loop
        let fetcher = Arc::clone(&self.fetcher);
        let propagator = Arc::clone(&self.propagator);
        let settings = self.settings.clone();
        let snapshot = task.clone();
        let handle = tokio::spawn(async move {
            let input = resolve_input(fetcher.as_ref(), &settings, &snapshot).await?;
            propagator
                .propagate(&input)
                .await
                .map_err(RunnerError::Propagation)
        });
        let result = match handle.await {
            Ok(result) => result?,
            Err(e) => return Err(RunnerError::Panicked(e.to_string())),
        };

        if result.is_empty() {
            return Err(RunnerError::NoResult);
        }

        info!(
            "tarea {} terminada con {} puntajes",
            task.task_id().unwrap_or_default(),
            result.len()
        );
        task.set_result(result);
        task.save().map_err(RunnerError::Transition)?;
        task.move_to(TaskState::Done, None, self.settings.delete_temp_files)
            .map_err(RunnerError::Transition)
    }
}

async fn resolve_network(
    fetcher: &dyn NetworkFetcher,
    task: &FileBasedTask,
    source: &NetworkSource,
) -> Result<(PathBuf, NetworkFormat), RunnerError> {
    let fetched = |task: &FileBasedTask| {
        task.taskdir()
            .map(|dir| dir.join(FETCHED_NETWORK))
            .ok_or_else(|| RunnerError::Transition("Task dir is None".to_string()))
    };

    match source {
        NetworkSource::Upload(name) => {
            debug!("usando red subida {}", name);
            let file = task
                .network_file()
                .ok_or(RunnerError::MissingFile(NETWORK_DATA))?;
            Ok((file, NetworkFormat::EdgeList))
        }
        NetworkSource::Ndex(id) => {
            let dest = fetched(task)?;
            let format = fetcher.fetch_ndex(id, &dest).await?;
            Ok((dest, format))
        }
        NetworkSource::Column(column) => {
            let dest = fetched(task)?;
            let format = fetcher.fetch_column(column, &dest).await?;
            Ok((dest, format))
        }
    }
}

async fn resolve_input(
    fetcher: &dyn NetworkFetcher,
    settings: &RunnerSettings,
    task: &FileBasedTask,
) -> Result<PropagationInput, RunnerError> {
    let kind = task.record().ok_or(RunnerError::MissingRecord)?.kind.clone();
    let (network_file, network_format) = resolve_network(fetcher, task, kind.source()).await?;

    let input = match kind {
        TaskKind::NetworkPropagation(params) => PropagationInput::NetworkPropagation {
            network_file,
            network_format,
            alpha: params.alpha,
            seeds: params.seed_list(),
        },
        TaskKind::SnpAnalysis(params) => {
            let snp_level_summary_file = task
                .snp_level_summary_file()
                .ok_or(RunnerError::MissingFile(SNP_LEVEL_SUMMARY))?;
            let protein_coding_file = task
                .protein_coding_file(
                    settings.protein_coding_dir.as_deref(),
                    &settings.protein_coding_suffix,
                )
                .ok_or_else(|| {
                    warn!("no hay archivo protein coding para {}", params.protein_coding);
                    RunnerError::MissingFile(PROTEIN_CODING)
                })?;
            PropagationInput::SnpAnalysis {
                network_file,
                network_format,
                alpha: params.alpha,
                window: params.window,
                snp_level_summary_file,
                protein_coding_file,
                chromosome_col: params.chromosome_label().to_string(),
                basepair_col: params.basepair_label().to_string(),
                pvalue_col: params.pvalue_label().to_string(),
            }
        }
    };
    Ok(input)
}
