use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use nbgwas_common::{ErrorResponse, StatusKind, StatusReport, SubmitResponse};
use reqwest::{
    multipart::{Form, Part},
    Client, Response, StatusCode,
};
use std::{env, path::Path, time::Duration};

/// - En Docker: NBGWAS_URL=http://rest:8080
/// - Local: default http://localhost:8080
fn service_base_url() -> String {
    env::var("NBGWAS_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string())
        .trim_end_matches('/')
        .to_string()
}

#[derive(Parser, Debug)]
#[command(name = "nbgwas-client")]
#[command(about = "CLI simple para hablar con el servicio REST de NBGWAS")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Exactamente un origen de red
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Id de red en NDEx
    #[arg(long)]
    ndex: Option<String>,

    /// Id de columna en BigGIM
    #[arg(long)]
    column: Option<String>,

    /// Archivo local con la lista de aristas
    #[arg(long, value_name = "ARCHIVO")]
    network: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encola una propagación desde genes semilla
    Submit {
        /// Genes separados por comas
        #[arg(long)]
        seeds: String,

        #[arg(long)]
        alpha: Option<f64>,

        #[command(flatten)]
        source: SourceArgs,
    },
    /// Encola un análisis a partir de un resumen de SNPs
    Snp {
        #[arg(value_name = "SNP_LEVEL_SUMMARY")]
        snp_file: String,

        #[arg(long)]
        alpha: Option<f64>,

        #[arg(long)]
        window: Option<u32>,

        /// hg18, hg19...
        #[arg(long)]
        protein_coding: Option<String>,

        /// Archivo propio de genes codificantes
        #[arg(long, value_name = "ARCHIVO")]
        protein_coding_file: Option<String>,

        /// "cromosoma,basepair,pvalue"
        #[arg(long)]
        col_label: Option<String>,

        #[command(flatten)]
        source: SourceArgs,
    },
    /// Consulta el estado de una tarea
    Status {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Espera a que una tarea termine y muestra los puntajes
    Wait {
        #[arg(value_name = "TASK_ID")]
        id: String,

        /// Segundos entre consultas
        #[arg(long, default_value_t = 5)]
        interval: u64,

        #[arg(long, default_value_t = 120)]
        attempts: u32,
    },
}

fn task_url(base_url: &str, id: &str) -> String {
    format!("{}/nbgwas/tasks/{}", base_url, id)
}

async fn file_part(path: &str) -> Result<Part> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("no se pudo leer {path}"))?;
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Part::bytes(data).file_name(name))
}

fn text_fields(form: Form, fields: Vec<(&'static str, Option<String>)>) -> Form {
    fields
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .fold(form, |form, (k, v)| form.text(k, v))
}

async fn with_source(form: Form, source: SourceArgs) -> Result<Form> {
    let form = text_fields(form, vec![("ndex", source.ndex), ("column", source.column)]);
    match source.network {
        Some(path) => Ok(form.part("network", file_part(&path).await?)),
        None => Ok(form),
    }
}

async fn print_submit(resp: Response) -> Result<()> {
    if resp.status() == StatusCode::ACCEPTED {
        let created: SubmitResponse = resp.json().await?;
        println!("Tarea encolada:");
        println!("  id: {}", created.task_id);
        println!("  location: {}", created.location);
        return Ok(());
    }

    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(err) => bail!("el servicio rechazó la tarea ({}): {}", err.kind, err.message),
        Err(_) => bail!("el servicio respondió {}", status),
    }
}

async fn fetch_status(client: &Client, url: &str) -> Result<StatusReport> {
    let resp = client.get(url).send().await?;
    resp.json::<StatusReport>()
        .await
        .context("respuesta de estado ilegible")
}

/// Texto para mostrar un estado; con resultado, los puntajes de mayor a menor
fn describe(id: &str, report: &StatusReport) -> String {
    let mut out = format!("Tarea {id}: {:?}", report.status).to_lowercase();
    if let Some(message) = &report.message {
        out.push_str(&format!("\n  mensaje: {message}"));
    }
    if let Some(result) = &report.result {
        let mut scores: Vec<(&String, f64)> = result
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|s| (k, s)))
            .collect();
        scores.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (gene, score) in scores {
            out.push_str(&format!("\n  {gene}\t{score}"));
        }
    }
    out
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = service_base_url();

    match cli.command {
        Commands::Submit {
            seeds,
            alpha,
            source,
        } => {
            let form = text_fields(
                Form::new(),
                vec![("seeds", Some(seeds)), ("alpha", alpha.map(|a| a.to_string()))],
            );
            let form = with_source(form, source).await?;
            let url = format!("{}/nbgwas/tasks", base_url);
            let resp = client.post(&url).multipart(form).send().await?;
            print_submit(resp).await?;
        }
        Commands::Snp {
            snp_file,
            alpha,
            window,
            protein_coding,
            protein_coding_file,
            col_label,
            source,
        } => {
            let form = text_fields(
                Form::new(),
                vec![
                    ("alpha", alpha.map(|a| a.to_string())),
                    ("window", window.map(|w| w.to_string())),
                    ("protein_coding", protein_coding),
                    ("snp_level_summary_col_label", col_label),
                ],
            );
            let mut form = with_source(form, source)
                .await?
                .part("snp_level_summary", file_part(&snp_file).await?);
            if let Some(path) = protein_coding_file {
                form = form.part("protein_coding_file", file_part(&path).await?);
            }
            let url = format!("{}/nbgwas/snpanalyzer", base_url);
            let resp = client.post(&url).multipart(form).send().await?;
            print_submit(resp).await?;
        }
        Commands::Status { id } => {
            let report = fetch_status(&client, &task_url(&base_url, &id)).await?;
            println!("{}", describe(&id, &report));
        }
        Commands::Wait {
            id,
            interval,
            attempts,
        } => {
            let url = task_url(&base_url, &id);
            for _ in 0..attempts.max(1) {
                let report = fetch_status(&client, &url).await?;
                match report.status {
                    StatusKind::Submitted | StatusKind::Processing => {
                        tokio::time::sleep(Duration::from_secs(interval)).await;
                    }
                    _ => {
                        println!("{}", describe(&id, &report));
                        return Ok(());
                    }
                }
            }
            bail!("la tarea {id} no terminó después de {attempts} consultas");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn submit_exige_un_solo_origen() {
        assert!(Cli::try_parse_from(["c", "submit", "--seeds", "a"]).is_err());
        assert!(
            Cli::try_parse_from(["c", "submit", "--seeds", "a", "--ndex", "x", "--column", "y"])
                .is_err()
        );

        let cli = Cli::try_parse_from(["c", "submit", "--seeds", "a,b", "--ndex", "x"]).unwrap();
        match cli.command {
            Commands::Submit { seeds, source, .. } => {
                assert_eq!(seeds, "a,b");
                assert_eq!(source.ndex.as_deref(), Some("x"));
            }
            other => panic!("comando inesperado: {other:?}"),
        }
    }

    #[test]
    fn url_de_tarea() {
        assert_eq!(
            task_url("http://localhost:8080", "abc"),
            "http://localhost:8080/nbgwas/tasks/abc"
        );
    }

    #[test]
    fn describe_ordena_puntajes() {
        let report: StatusReport = serde_json::from_value(json!({
            "status": "done",
            "result": {"B": 0.1, "A": 0.9}
        }))
        .unwrap();
        assert_eq!(describe("7", &report), "tarea 7: done\n  A\t0.9\n  B\t0.1");

        let report: StatusReport = serde_json::from_value(json!({
            "status": "error",
            "message": "No result generated"
        }))
        .unwrap();
        assert_eq!(
            describe("7", &report),
            "tarea 7: error\n  mensaje: No result generated"
        );
    }
}
