//! Sync command implementation.

use rollsync_engine::{
    Applier, FetchClient, HttpFetchClient, MirrorApplier, PasswordGrant, ReqwestClient,
    SchedulerHandle, StaticToken, SyncConfig, SyncOrchestrator, SyncScheduler, TokenProvider,
};
use rollsync_store::CursorStore;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Arguments of the sync command.
pub struct SyncArgs {
    /// Run one cycle per collection and exit.
    pub once: bool,
    /// Export API base URL, overriding the config file.
    pub base_url: Option<String>,
    /// JSON configuration file.
    pub config: Option<PathBuf>,
    /// Pre-issued bearer token.
    pub token: Option<String>,
    /// Password-grant username.
    pub username: Option<String>,
    /// Password-grant password.
    pub password: Option<String>,
}

/// Builds the sync configuration from the file and flag overrides.
pub fn load_config(
    file: Option<&Path>,
    base_url: Option<String>,
) -> Result<SyncConfig, Box<dyn std::error::Error>> {
    let mut config = match file {
        Some(path) => SyncConfig::from_json_file(path)?,
        None => {
            let base_url = base_url
                .clone()
                .ok_or("--base-url or --config is required")?;
            SyncConfig::new(base_url)
        }
    };
    if let Some(url) = base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    config.validate()?;
    Ok(config)
}

fn token_provider(
    args: &SyncArgs,
    base_url: &str,
    client: &ReqwestClient,
) -> Result<Arc<dyn TokenProvider>, Box<dyn std::error::Error>> {
    match (&args.token, &args.username, &args.password) {
        (Some(token), _, _) => Ok(Arc::new(StaticToken::new(token.clone()))),
        (None, Some(username), Some(password)) => Ok(Arc::new(PasswordGrant::new(
            base_url,
            username.clone(),
            password.clone(),
            client.clone(),
        ))),
        _ => Err("either --token or --username/--password is required".into()),
    }
}

/// Runs one cycle per collection and renders one line each.
///
/// Returns the lines and the number of collections that failed.
pub fn run_once<F: FetchClient, C: CursorStore, A: Applier>(
    orchestrator: &SyncOrchestrator<F, C, A>,
) -> (Vec<String>, usize) {
    let results = orchestrator.run_all();
    let mut lines = Vec::with_capacity(results.len());
    let mut failed = 0;

    for ((collection, result), status) in results.into_iter().zip(orchestrator.statuses()) {
        match result {
            Ok(report) => lines.push(format!(
                "{collection}: {} fetched, {} applied, cursor {} -> {}",
                report.fetched, status.records_applied, report.previous_cursor, report.cursor
            )),
            Err(e) => {
                failed += 1;
                lines.push(format!(
                    "{collection}: FAILED ({} consecutive): {e}",
                    status.consecutive_failures
                ));
            }
        }
    }
    (lines, failed)
}

/// How a scheduled run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The stop signal fired.
    Interrupted,
    /// Every collection's loop ended on its own.
    Finished,
}

/// Waits for `stop` or for every scheduled loop to end, checking the loops
/// once per `tick`.
///
/// `stop` is pinned once and polled across ticks.
pub async fn wait_for_stop<F, C, A>(
    handle: &SchedulerHandle<F, C, A>,
    stop: impl Future<Output = ()>,
    tick: Duration,
) -> StopReason
where
    F: FetchClient + 'static,
    C: CursorStore + 'static,
    A: Applier + 'static,
{
    tokio::pin!(stop);
    loop {
        tokio::select! {
            () = &mut stop => {
                info!("interrupted");
                return StopReason::Interrupted;
            }
            () = tokio::time::sleep(tick) => {
                if handle.is_finished() {
                    warn!("all sync loops stopped");
                    return StopReason::Finished;
                }
            }
        }
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Runs the sync command.
pub fn run(state_dir: &Path, args: SyncArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(args.config.as_deref(), args.base_url.clone())?;
    let client = ReqwestClient::new(&config)?;
    let tokens = token_provider(&args, &config.base_url, &client)?;
    let fetcher = HttpFetchClient::new(config.base_url.clone(), client, tokens);

    let (cursors, mirror) = super::open_stores(state_dir, true)?;
    info!(base_url = %config.base_url, state_dir = %state_dir.display(), "starting sync");

    let orchestrator = Arc::new(SyncOrchestrator::new(
        config,
        fetcher,
        cursors,
        MirrorApplier::new(mirror),
    ));

    if args.once {
        let (lines, failed) = run_once(&*orchestrator);
        for line in lines {
            println!("{line}");
        }
        if failed > 0 {
            return Err(format!("{failed} collection(s) failed to sync").into());
        }
        return Ok(());
    }

    // The blocking HTTP client must not be dropped on the runtime, so the
    // last reference stays out here.
    let scheduled = Arc::clone(&orchestrator);
    let runtime = tokio::runtime::Runtime::new()?;
    let results = runtime.block_on(async move {
        let handle = SyncScheduler::spawn(scheduled);
        wait_for_stop(&handle, ctrl_c(), Duration::from_secs(1)).await;
        handle.shutdown().await
    });

    let failed: Vec<String> = results
        .into_iter()
        .filter_map(|(collection, result)| result.err().map(|e| format!("{collection}: {e}")))
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(failed.join("; ").into())
    }
}
