mod take;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    listing::{paginate, render_table, DEFAULT_PAGE_SIZE},
    load_settings, ApiClient, ClientError, Notice, ResultView, SessionContext, TestBackend,
};
use shared::{
    cin::Cin,
    domain::{CertificateId, Language, VersionId},
};
use storage::ClientPrefs;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "HSE induction test kiosk")]
struct Args {
    /// Backend base URL; overrides hse.toml and HSE_API_URL.
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    language: Option<Language>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the active test versions.
    Versions {
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Take the timed test.
    Take {
        #[arg(long)]
        version: Option<i64>,
        #[arg(long)]
        cin: Option<String>,
    },
    /// Show the result of the latest attempt on a version.
    Result {
        #[arg(long)]
        version: i64,
    },
    /// Look up certificates issued to a CIN.
    Certificates {
        #[arg(long)]
        cin: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Save a certificate PDF.
    Download {
        #[arg(long)]
        certificate: CertificateId,
        #[arg(long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(api_url) = args.api_url {
        settings.api_base_url = api_url;
    }
    if let Some(database_url) = args.database_url {
        settings.database_url = database_url;
    }
    if let Some(language) = args.language {
        settings.language = language;
    }

    let prefs = ClientPrefs::open(&settings.database_url)
        .await
        .context("opening local preferences")?;
    let api = ApiClient::with_timeout(
        &settings.api_base_url,
        SessionContext::new(),
        settings.request_timeout(),
    )?;

    let outcome = match args.command {
        Command::Versions { page } => {
            let versions = api.active_versions().await?;
            print!(
                "{}",
                render_table(&paginate(&versions, page, DEFAULT_PAGE_SIZE), settings.language)
            );
            Ok(())
        }
        Command::Take { version, cin } => {
            take::run(&api, &prefs, &settings, version.map(VersionId), cin).await
        }
        Command::Result { version } => {
            let result = api.fetch_result(VersionId(version)).await?;
            let view = ResultView::new(result, 0, settings.pass_threshold_percent);
            take::print_result(&view);
            Ok(())
        }
        Command::Certificates { cin, page } => {
            let cin = Cin::parse(&cin)?;
            let certificates = api.search_certificates(&cin).await?;
            if certificates.is_empty() {
                println!("No certificate found for {cin}.");
            } else {
                print!(
                    "{}",
                    render_table(
                        &paginate(&certificates, page, DEFAULT_PAGE_SIZE),
                        settings.language
                    )
                );
            }
            Ok(())
        }
        Command::Download { certificate, out } => download(&api, certificate, &out).await,
    };

    if let Err(err) = &outcome {
        if let Some(client_err) = err.downcast_ref::<ClientError>() {
            eprintln!("{}", Notice::from(client_err));
        }
    }
    outcome
}

pub(crate) async fn download(
    api: &ApiClient,
    certificate: CertificateId,
    out: &std::path::Path,
) -> Result<()> {
    let bytes = api.download_certificate(certificate).await?;
    tokio::fs::write(out, &bytes)
        .await
        .with_context(|| format!("writing {}", out.display()))?;
    println!("Certificate saved to {} ({} bytes).", out.display(), bytes.len());
    Ok(())
}
