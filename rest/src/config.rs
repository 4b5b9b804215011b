use nbgwas_common::IdStrategy;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

pub const DEFAULT_JOB_PATH: &str = "/tmp/nbgwas/tasks";
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_WAIT_COUNT: u32 = 60;
pub const DEFAULT_SLEEP_TIME_SECS: u64 = 10;
/// 1 GiB; los resúmenes de SNPs reales pasan holgado los 2 MiB de axum
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1 << 30;
/// Carpeta de temporales de subida, dentro de la ruta base
pub const UPLOAD_SPOOL_DIR: &str = ".uploads";

/// Configuración del servicio REST, leída de variables de entorno.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Ruta base con submitted/, processing/ y done/
    pub job_path: PathBuf,
    pub bind: String,
    /// Intentos del endpoint sincrónico antes de rendirse
    pub wait_count: u32,
    pub sleep_time: Duration,
    pub id_strategy: IdStrategy,
    /// Prefijo para el header Location (ej. "https://host/rest/v1")
    pub location_prefix: String,
    /// Tamaño máximo del cuerpo de un POST; 0 = sin límite
    pub max_upload_bytes: usize,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            job_path: PathBuf::from(DEFAULT_JOB_PATH),
            bind: DEFAULT_BIND.to_string(),
            wait_count: DEFAULT_WAIT_COUNT,
            sleep_time: Duration::from_secs(DEFAULT_SLEEP_TIME_SECS),
            id_strategy: IdStrategy::Uuid,
            location_prefix: String::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("valor inválido en {key}={raw:?}: {e}")),
        _ => Ok(default),
    }
}

impl RestConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            job_path: lookup("NBGWAS_JOB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.job_path),
            bind: lookup("NBGWAS_BIND").unwrap_or(defaults.bind),
            wait_count: parse_or(&lookup, "NBGWAS_WAIT_COUNT", defaults.wait_count)?,
            sleep_time: Duration::from_secs(parse_or(
                &lookup,
                "NBGWAS_SLEEP_TIME",
                DEFAULT_SLEEP_TIME_SECS,
            )?),
            id_strategy: parse_or(&lookup, "NBGWAS_ID_STRATEGY", defaults.id_strategy)?,
            location_prefix: lookup("NBGWAS_LOCATION_PREFIX")
                .map(|p| p.trim_end_matches('/').to_string())
                .unwrap_or(defaults.location_prefix),
            max_upload_bytes: parse_or(
                &lookup,
                "NBGWAS_MAX_UPLOAD_BYTES",
                defaults.max_upload_bytes,
            )?,
        })
    }

    /// Donde se vuelcan los archivos subidos mientras se arma la tarea
    pub fn spool_dir(&self) -> PathBuf {
        self.job_path.join(UPLOAD_SPOOL_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn sin_variables_usa_defaults() {
        let cfg = RestConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg.job_path, PathBuf::from(DEFAULT_JOB_PATH));
        assert_eq!(cfg.wait_count, DEFAULT_WAIT_COUNT);
        assert_eq!(cfg.id_strategy, IdStrategy::Uuid);
        assert_eq!(cfg.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(
            cfg.spool_dir(),
            PathBuf::from(DEFAULT_JOB_PATH).join(UPLOAD_SPOOL_DIR)
        );
    }

    #[test]
    fn lee_variables() {
        let cfg = RestConfig::from_lookup(lookup_from(&[
            ("NBGWAS_JOB_PATH", "/data/tasks"),
            ("NBGWAS_WAIT_COUNT", "1"),
            ("NBGWAS_SLEEP_TIME", "0"),
            ("NBGWAS_ID_STRATEGY", "sequential"),
            ("NBGWAS_LOCATION_PREFIX", "http://host/rest/"),
            ("NBGWAS_MAX_UPLOAD_BYTES", "0"),
        ]))
        .unwrap();
        assert_eq!(cfg.job_path, PathBuf::from("/data/tasks"));
        assert_eq!(cfg.wait_count, 1);
        assert_eq!(cfg.sleep_time, Duration::ZERO);
        assert_eq!(cfg.id_strategy, IdStrategy::Sequential);
        assert_eq!(cfg.location_prefix, "http://host/rest");
        assert_eq!(cfg.max_upload_bytes, 0);
    }

    #[test]
    fn numero_invalido_es_error() {
        assert!(RestConfig::from_lookup(lookup_from(&[("NBGWAS_WAIT_COUNT", "muchos")])).is_err());
    }
}
