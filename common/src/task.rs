use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type TaskId = String;

/// Resultado de la propagación: nombre de gen/nodo -> puntaje
pub type ScoreMap = BTreeMap<String, f64>;

pub const DEFAULT_ALPHA: f64 = 0.5;
pub const DEFAULT_WINDOW: u32 = 10_000;
pub const DEFAULT_PROTEIN_CODING: &str = "hg18";
/// Largo máximo de un id de red NDEx
pub const MAX_NDEX_ID_LEN: usize = 40;

pub const DEFAULT_CHROM_COL: &str = "hg18chr";
pub const DEFAULT_BP_COL: &str = "bp";
pub const DEFAULT_PVAL_COL: &str = "pval";

/* --------- Origen de la red --------- */

/// De dónde sale la red sobre la que se propaga. Siempre hay exactamente una.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SourceFields", into = "SourceFields")]
pub enum NetworkSource {
    /// Lista de aristas subida; guarda el nombre original del archivo,
    /// los bytes quedan en `network_data`
    Upload(String),
    /// Id de red en NDEx
    Ndex(String),
    /// Id de columna en BigGIM
    Column(String),
}

/// Forma plana en que el origen aparece en task.json y en los formularios.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ndex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl TryFrom<SourceFields> for NetworkSource {
    type Error = String;

    fn try_from(fields: SourceFields) -> Result<Self, Self::Error> {
        match (fields.network, fields.ndex, fields.column) {
            (Some(name), None, None) => Ok(NetworkSource::Upload(name)),
            (None, Some(id), None) => Ok(NetworkSource::Ndex(id)),
            (None, None, Some(col)) => Ok(NetworkSource::Column(col)),
            (None, None, None) => Err("One of network, ndex or column must be set".to_string()),
            _ => Err("Only one of network, ndex or column may be set".to_string()),
        }
    }
}

impl From<NetworkSource> for SourceFields {
    fn from(source: NetworkSource) -> Self {
        match source {
            NetworkSource::Upload(name) => SourceFields {
                network: Some(name),
                ..Default::default()
            },
            NetworkSource::Ndex(id) => SourceFields {
                ndex: Some(id),
                ..Default::default()
            },
            NetworkSource::Column(col) => SourceFields {
                column: Some(col),
                ..Default::default()
            },
        }
    }
}

/* --------- Parámetros por tipo de tarea --------- */

/// Tarea "legacy": semillas + red, difusión random walk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkTaskParams {
    pub alpha: f64,
    /// Lista de genes separada por comas
    pub seeds: String,
    #[serde(flatten)]
    pub source: NetworkSource,
}

impl NetworkTaskParams {
    pub fn seed_list(&self) -> Vec<String> {
        self.seeds
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Tarea a partir de un resumen de SNPs subido por el cliente.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnpTaskParams {
    /// Sin alpha el motor elige el valor óptimo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    #[serde(default = "default_window")]
    pub window: u32,
    pub protein_coding: String,
    /// "cromosoma,basepair,pvalue"; cualquier posición vacía usa el default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snp_level_summary_col_label: Option<String>,
    #[serde(flatten)]
    pub source: NetworkSource,
}

fn default_window() -> u32 {
    DEFAULT_WINDOW
}

impl SnpTaskParams {
    fn column_label(&self, index: usize) -> Option<&str> {
        self.snp_level_summary_col_label
            .as_deref()?
            .split(',')
            .nth(index)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn chromosome_label(&self) -> &str {
        self.column_label(0).unwrap_or(DEFAULT_CHROM_COL)
    }

    pub fn basepair_label(&self) -> &str {
        self.column_label(1).unwrap_or(DEFAULT_BP_COL)
    }

    pub fn pvalue_label(&self) -> &str {
        self.column_label(2).unwrap_or(DEFAULT_PVAL_COL)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tasktype", rename_all = "snake_case")]
pub enum TaskKind {
    NetworkPropagation(NetworkTaskParams),
    SnpAnalysis(SnpTaskParams),
}

impl TaskKind {
    pub fn source(&self) -> &NetworkSource {
        match self {
            TaskKind::NetworkPropagation(p) => &p.source,
            TaskKind::SnpAnalysis(p) => &p.source,
        }
    }

    pub fn alpha(&self) -> Option<f64> {
        match self {
            TaskKind::NetworkPropagation(p) => Some(p.alpha),
            TaskKind::SnpAnalysis(p) => p.alpha,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::NetworkPropagation(_) => "network_propagation",
            TaskKind::SnpAnalysis(_) => "snp_analysis",
        }
    }

    /// Reglas que no dependen de los archivos subidos.
    pub fn validate(&self) -> Result<(), String> {
        if let NetworkSource::Ndex(id) = self.source() {
            if id.trim().is_empty() {
                return Err("ndex id is empty".to_string());
            }
            if id.chars().count() > MAX_NDEX_ID_LEN {
                return Err(format!(
                    "ndex id exceeds {} characters",
                    MAX_NDEX_ID_LEN
                ));
            }
        }
        if let NetworkSource::Column(col) = self.source() {
            if col.trim().is_empty() {
                return Err("column id is empty".to_string());
            }
        }
        if let Some(alpha) = self.alpha() {
            if !(0.0..=1.0).contains(&alpha) {
                return Err(format!("alpha must be between 0 and 1, got {alpha}"));
            }
        }
        match self {
            TaskKind::NetworkPropagation(p) if p.seed_list().is_empty() => {
                Err("seeds must contain at least one gene".to_string())
            }
            TaskKind::SnpAnalysis(p) if p.protein_coding.trim().is_empty() => {
                Err("protein_coding is empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Contenido de task.json: sobre común + parámetros según `tasktype`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub remote_ip: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TaskKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ndex_task(id: &str) -> TaskKind {
        TaskKind::NetworkPropagation(NetworkTaskParams {
            alpha: 0.4,
            seeds: "s1,s2".to_string(),
            source: NetworkSource::Ndex(id.to_string()),
        })
    }

    #[test]
    fn origen_exige_exactamente_un_campo() {
        let none = SourceFields::default();
        assert!(NetworkSource::try_from(none).is_err());

        let two = SourceFields {
            ndex: Some("a".into()),
            column: Some("b".into()),
            ..Default::default()
        };
        assert!(NetworkSource::try_from(two).is_err());

        let three = SourceFields {
            network: Some("net.txt".into()),
            ndex: Some("a".into()),
            column: Some("b".into()),
        };
        assert!(NetworkSource::try_from(three).is_err());

        let one = SourceFields {
            column: Some("col".into()),
            ..Default::default()
        };
        assert_eq!(
            NetworkSource::try_from(one).unwrap(),
            NetworkSource::Column("col".into())
        );
    }

    #[test]
    fn registro_se_serializa_plano() {
        let record = TaskRecord {
            task_id: "abc".into(),
            remote_ip: "1.2.3.4".into(),
            submitted_at: Utc::now(),
            kind: ndex_task("someid"),
            error: None,
        };

        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["tasktype"], json!("network_propagation"));
        assert_eq!(v["alpha"], json!(0.4));
        assert_eq!(v["seeds"], json!("s1,s2"));
        assert_eq!(v["ndex"], json!("someid"));
        assert!(v.get("column").is_none());
        assert!(v.get("error").is_none());

        let back: TaskRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn registro_con_dos_origenes_no_se_puede_leer() {
        let v = json!({
            "task_id": "abc",
            "remote_ip": "1.2.3.4",
            "submitted_at": "2024-01-01T00:00:00Z",
            "tasktype": "network_propagation",
            "alpha": 0.5,
            "seeds": "a",
            "ndex": "x",
            "column": "y"
        });
        assert!(serde_json::from_value::<TaskRecord>(v).is_err());
    }

    #[test]
    fn snp_usa_defaults_de_ventana_y_columnas() {
        let v = json!({
            "task_id": "abc",
            "remote_ip": "1.2.3.4",
            "submitted_at": "2024-01-01T00:00:00Z",
            "tasktype": "snp_analysis",
            "protein_coding": "hg19",
            "snp_level_summary_col_label": "chr,,p",
            "ndex": "x"
        });
        let record: TaskRecord = serde_json::from_value(v).unwrap();
        let TaskKind::SnpAnalysis(params) = &record.kind else {
            panic!("se esperaba snp_analysis");
        };
        assert_eq!(params.window, DEFAULT_WINDOW);
        assert_eq!(params.alpha, None);
        assert_eq!(params.chromosome_label(), "chr");
        assert_eq!(params.basepair_label(), DEFAULT_BP_COL);
        assert_eq!(params.pvalue_label(), "p");
    }

    #[test]
    fn validate_rechaza_ndex_largo_y_alpha_fuera_de_rango() {
        assert!(ndex_task("someid").validate().is_ok());
        assert!(ndex_task(&"x".repeat(MAX_NDEX_ID_LEN)).validate().is_ok());
        assert!(ndex_task(&"x".repeat(MAX_NDEX_ID_LEN + 1)).validate().is_err());

        let bad_alpha = TaskKind::NetworkPropagation(NetworkTaskParams {
            alpha: 1.5,
            seeds: "a".into(),
            source: NetworkSource::Column("c".into()),
        });
        assert!(bad_alpha.validate().is_err());
    }
}
