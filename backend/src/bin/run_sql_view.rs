//! Execute one SQL view headlessly and print the merged table as JSON.
//!
//! Progress and warnings go to the log on stderr; stdout carries only the
//! table, or its annotated rows with `--annotate`, so the output can be
//! piped.
//!
//! The command line only describes the request. Server and tuning settings
//! (`SQLVIEW_BASE_URL`, credentials, row cap, timeouts) are read from
//! `SQLVIEW_*` environment variables and configuration files.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::io::{self, Write};
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use mockable::DefaultClock;
use ortho_config::OrthoConfig;
use tokio::runtime::Builder;
use tracing::{info, warn};
use url::Url;

use sqlview_backend::PipelineSettings;
use sqlview_backend::domain::ports::CredentialProvider;
use sqlview_backend::domain::{
    EndpointOptions, Error, ExecutionHooks, ExecutionRequest, MetadataKind, QualityScorer,
    RowAnnotator, SqlViewExecutor, SqlViewExecutorPorts,
};
use sqlview_backend::outbound::cache::InMemoryResultCache;
use sqlview_backend::outbound::dhis2::{
    ApiTokenCredentials, BasicAuthCredentials, Dhis2HttpSqlViewSource,
};
use sqlview_backend::telemetry;

/// `run-sql-view` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "run-sql-view",
    about = "Fetch every page of a DHIS2 SQL view and print the merged table",
    after_help = "Server URL, credentials and tuning come from SQLVIEW_* environment \
                  variables or configuration files, not from flags.",
    version
)]
struct CliArgs {
    /// SQL view identifier.
    #[arg(long = "sql-view", value_name = "id")]
    sql_view_id: String,
    /// Query text declaring `${name}` placeholders. Without it every `--var`
    /// is sent.
    #[arg(long = "template", value_name = "sql")]
    template: Option<String>,
    /// Placeholder value as `name=value`; repeatable.
    #[arg(long = "var", value_name = "name=value", value_parser = parse_pair)]
    vars: Vec<(String, String)>,
    /// Column criterion as `name=value`; repeatable.
    #[arg(long = "filter", value_name = "name=value", value_parser = parse_pair)]
    filters: Vec<(String, String)>,
    /// Skip the result cache.
    #[arg(long = "no-cache")]
    no_cache: bool,
    /// Score rows and link endpoints as records of this kind, e.g.
    /// `dataElements`.
    #[arg(long = "annotate", value_name = "kind")]
    annotate: Option<MetadataKind>,
    /// Analytics period for endpoint links.
    #[arg(long = "period", value_name = "pe", requires = "annotate")]
    period: Option<String>,
    /// Organisation unit for endpoint links.
    #[arg(long = "org-unit", value_name = "ou", requires = "annotate")]
    org_unit: Option<String>,
    /// Also link the maintenance app page of each row.
    #[arg(long = "web-ui", requires = "annotate")]
    web_ui: bool,
}

impl CliArgs {
    fn endpoint_options(&self) -> EndpointOptions {
        EndpointOptions {
            period: self.period.clone(),
            org_unit: self.org_unit.clone(),
            include_web_ui: self.web_ui,
        }
    }
}

fn parse_pair(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_owned(), value.to_owned()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=value, got `{raw}`"))
}

fn main() -> Result<()> {
    color_eyre::install()?;
    telemetry::init();

    let args = CliArgs::parse();
    let settings = PipelineSettings::load_from_iter([OsString::from("run-sql-view")])
        .map_err(|error| eyre!("load settings: {error}"))?;

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("create Tokio runtime")?;
    runtime.block_on(run(args, settings))
}

async fn run(args: CliArgs, settings: PipelineSettings) -> Result<()> {
    let base_url = Url::parse(settings.base_url())
        .wrap_err_with(|| format!("invalid base url `{}`", settings.base_url()))?;
    let credentials = credentials(&settings)?;
    let source = Dhis2HttpSqlViewSource::new(base_url, settings.request_timeout(), credentials)
        .wrap_err("build http client")?;

    let clock = Arc::new(DefaultClock);
    let annotator = args.annotate.map(|kind| {
        RowAnnotator::new(kind, QualityScorer::new(clock.clone()), settings.base_url())
            .with_options(args.endpoint_options())
    });
    let executor = SqlViewExecutor::new(
        SqlViewExecutorPorts::new(
            Arc::new(source),
            Arc::new(InMemoryResultCache::new(clock.clone())),
        ),
        clock,
        settings.executor_config(),
    );

    let mut request = ExecutionRequest::new(args.sql_view_id)
        .with_cache_expiry_minutes(settings.cache_expiry_minutes());
    if let Some(template) = args.template {
        request = request.with_template(template);
    }
    for (name, value) in args.vars {
        request = request.with_parameter(name, value);
    }
    for (name, value) in args.filters {
        request = request.with_filter(name, value);
    }
    if args.no_cache {
        request = request.without_cache();
    }

    let hooks = ExecutionHooks::new().with_progress(|progress| {
        info!(
            pages_fetched = progress.pages_fetched,
            rows_so_far = progress.rows_so_far,
            estimated_total = progress.estimated_total,
            "progress",
        );
    });
    let execution = match executor.execute_with(request, hooks).await {
        Ok(execution) => execution,
        Err(error) => {
            let report = Error::from(error);
            let rendered = serde_json::to_string(&report).wrap_err("render error")?;
            return Err(eyre!(rendered).wrap_err(report.to_string()));
        }
    };

    if let Some(warning) = execution.warning {
        warn!(?warning, "result is partial");
    }
    for drift in &execution.header_drift {
        warn!(page = drift.page, extra = ?drift.extra, missing = ?drift.missing, "header drift");
    }

    let mut stdout = io::stdout().lock();
    match annotator {
        Some(annotator) => {
            let annotated = annotator.annotate(&execution.table);
            serde_json::to_writer_pretty(&mut stdout, &annotated).wrap_err("write table")?;
        }
        None => serde_json::to_writer_pretty(&mut stdout, execution.table.as_ref())
            .wrap_err("write table")?,
    }
    writeln!(stdout).wrap_err("write table")?;
    Ok(())
}

fn credentials(settings: &PipelineSettings) -> Result<Arc<dyn CredentialProvider>> {
    if let Some(token) = settings.token.as_deref() {
        return Ok(Arc::new(ApiTokenCredentials::new(token)));
    }
    match (settings.username.as_deref(), settings.password.as_deref()) {
        (Some(username), Some(password)) => {
            Ok(Arc::new(BasicAuthCredentials::new(username, password)))
        }
        _ => Err(eyre!(
            "no credentials configured; set SQLVIEW_TOKEN or SQLVIEW_USERNAME and SQLVIEW_PASSWORD"
        )),
    }
}
