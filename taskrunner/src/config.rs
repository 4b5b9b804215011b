use clap::Parser;
use std::{path::PathBuf, time::Duration};

use crate::runner::RunnerSettings;

pub const DEFAULT_NDEX_SERVER: &str = "public.ndexbio.org";
pub const DEFAULT_BIGGIM_URL: &str = "https://biggim.ncats.io/api";
pub const DEFAULT_ENGINE: &str = "nbgwas-engine";

/// Corre las tareas que deja el servicio REST de NBGWAS.
#[derive(Parser, Debug, Clone)]
#[command(name = "nbgwas-taskrunner")]
#[command(about = "Procesa las tareas encoladas por el servicio REST de NBGWAS")]
pub struct RunnerArgs {
    /// Directorio base de tareas (contiene submitted/, processing/ y done/)
    #[arg(value_name = "TASKDIR")]
    pub taskdir: PathBuf,

    /// Directorio con los archivos de genes codificantes (hg18, hg19...)
    #[arg(long, value_name = "DIR")]
    pub protein_coding_dir: PathBuf,

    #[arg(long, default_value = ".txt")]
    pub protein_coding_suffix: String,

    /// Segundos a esperar cuando no hay tareas
    #[arg(long, default_value_t = 30)]
    pub wait_time: u64,

    #[arg(long, default_value = DEFAULT_NDEX_SERVER)]
    pub ndex_server: String,

    #[arg(long, default_value = DEFAULT_BIGGIM_URL)]
    pub biggim_url: String,

    /// Comando que implementa la propagación (lee JSON por stdin)
    #[arg(long, default_value = DEFAULT_ENGINE)]
    pub engine: String,

    /// Argumento extra para el motor, se puede repetir
    #[arg(long = "engine-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// Cada cuántas consultas vacías se limpia la lista de problemas
    #[arg(long, default_value_t = 3)]
    pub cleanup_every: u32,

    /// No borrar los archivos grandes al terminar una tarea
    #[arg(long)]
    pub keep_temp_files: bool,

    /// Verbosidad: -v warn, -vv info, -vvv debug, -vvvv trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl RunnerArgs {
    /// Filtro de tracing según la cantidad de -v (sin -v se comporta como uno)
    pub fn env_filter(&self) -> String {
        let level = match self.verbose {
            0 | 1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        };
        format!("nbgwas_taskrunner={level},nbgwas_common={level},reqwest=warn")
    }

    pub fn settings(&self) -> RunnerSettings {
        RunnerSettings {
            wait_time: Duration::from_secs(self.wait_time),
            cleanup_every: self.cleanup_every,
            delete_temp_files: !self.keep_temp_files,
            protein_coding_dir: Some(self.protein_coding_dir.clone()),
            protein_coding_suffix: self.protein_coding_suffix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_de_linea_de_comandos() {
        let args =
            RunnerArgs::try_parse_from(["runner", "/tmp/tasks", "--protein-coding-dir", "/pc"])
                .unwrap();
        assert_eq!(args.taskdir, PathBuf::from("/tmp/tasks"));
        assert_eq!(args.wait_time, 30);
        assert_eq!(args.ndex_server, DEFAULT_NDEX_SERVER);
        assert_eq!(args.protein_coding_suffix, ".txt");
        assert_eq!(args.cleanup_every, 3);
        assert!(args.env_filter().starts_with("nbgwas_taskrunner=warn"));

        let settings = args.settings();
        assert!(settings.delete_temp_files);
        assert_eq!(settings.wait_time, Duration::from_secs(30));
    }

    #[test]
    fn verbosidad_y_argumentos_del_motor() {
        let args = RunnerArgs::try_parse_from([
            "runner",
            "/tmp/tasks",
            "--protein-coding-dir",
            "/pc",
            "-vvv",
            "--engine",
            "python3",
            "--engine-arg",
            "-m",
            "--engine-arg",
            "nbgwas.cli",
            "--keep-temp-files",
        ])
        .unwrap();
        assert!(args.env_filter().starts_with("nbgwas_taskrunner=debug"));
        assert_eq!(args.engine_args, vec!["-m", "nbgwas.cli"]);
        assert!(!args.settings().delete_temp_files);
    }

    #[test]
    fn protein_coding_dir_es_obligatorio() {
        assert!(RunnerArgs::try_parse_from(["runner", "/tmp/tasks"]).is_err());
    }
}
