use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use tokio::runtime::Builder;

use modpack_sync::engine::state::{SyncOutcome, SyncSession, SyncState};
use modpack_sync::engine::{EngineOptions, SyncEngine, SyncHandle, spawn_sync};
use modpack_sync::listing::{MODS_FOLDER, SERVER_FOLDER};
use modpack_sync::util::{format_bytes, format_speed};
use modpack_sync::{SyncError, config, layout, resolver};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(
    name = "modpack-sync",
    author,
    version,
    about = "Keep a mods folder in sync with a folder in a GitHub, GitLab, Gitea or Codeberg repository"
)]
struct Cli {
    /// Game or server directory that contains the `mods` folder.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Repository URL. Defaults to the one saved with `set-repo`.
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Filename prefix of this tool's own jar; matching files are never removed.
    #[arg(long, global = true, default_value = layout::SELF_PREFIX)]
    self_prefix: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync the local mods folder from the repository's `mods` folder (default).
    Sync,
    /// Sync the local mods folder from the repository's `server` folder.
    Server,
    /// Show what a sync would change without touching anything.
    Plan {
        /// Plan against the `server` folder instead of `mods`.
        #[arg(long)]
        server: bool,
        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Validate and save the repository URL for later runs.
    SetRepo { url: String },
    /// Show how a repository URL is interpreted.
    Resolve { url: String },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match &cli.command {
        None | Some(Command::Sync) => run_sync(&cli, MODS_FOLDER),
        Some(Command::Server) => run_sync(&cli, SERVER_FOLDER),
        Some(Command::Plan { server, json }) => {
            let folder = if *server { SERVER_FOLDER } else { MODS_FOLDER };
            show_plan(&cli, folder, *json)
        }
        Some(Command::SetRepo { url }) => set_repo(&cli, url),
        Some(Command::Resolve { url }) => describe_url(url),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn repository_url(cli: &Cli) -> Result<String, SyncError> {
    if let Some(url) = cli.repo.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        return Ok(url.to_owned());
    }
    config::load_repository_url(&cli.root).ok_or_else(|| {
        SyncError::InvalidRepoUrl(format!(
            "no repository configured; pass --repo or run `modpack-sync set-repo <url>` (config file: {})",
            layout::config_path(&cli.root).display()
        ))
    })
}

fn engine_for(cli: &Cli, folder: &str) -> SyncEngine {
    SyncEngine::new(
        EngineOptions::new(&cli.root)
            .with_folder(folder)
            .with_self_prefix(cli.self_prefix.clone()),
    )
}

fn run_sync(cli: &Cli, folder: &str) -> Result<bool, SyncError> {
    let repo = repository_url(cli)?;
    layout::ensure_base_dirs(&cli.root)
        .map_err(|e| SyncError::io("failed to create mods folder", e))?;
    let mut session = SyncSession::new();
    if !session.begin_initial_check() {
        warn!("a sync is already running");
        return Ok(false);
    }

    let handle = spawn_sync(engine_for(cli, folder), repo)
        .map_err(|e| SyncError::io("failed to start sync worker", e))?;
    let outcome = if folder == SERVER_FOLDER {
        follow_with_log(handle)
    } else {
        follow_with_bar(handle)
    };
    session.finish(&outcome);

    match &outcome {
        SyncOutcome::UpToDate => println!("Mods are up to date."),
        SyncOutcome::Updated(report) => println!(
            "Updated: {} downloaded, {} removed.",
            report.downloaded.len(),
            report.removed.len()
        ),
        SyncOutcome::Failed(message) => eprintln!("Mod pack update failed: {message}"),
    }
    Ok(session.take_allow_continue())
}

fn print_state(state: &SyncState) {
    match state {
        SyncState::Fetching { folder } => info!("fetching {folder}/ listing"),
        SyncState::Computing => info!("computing changes"),
        SyncState::Applying { plan } => {
            for name in &plan.to_add {
                println!("  + {name}");
            }
            for name in &plan.to_update {
                println!("  ~ {name}");
            }
            for name in &plan.to_remove {
                println!("  - {name}");
            }
        }
        SyncState::UpToDate | SyncState::Completed(_) | SyncState::Error(_) => {}
    }
}

fn follow_with_bar(mut handle: SyncHandle) -> SyncOutcome {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{prefix:>7} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style.progress_chars("=> "));

    loop {
        let finished = handle.is_finished();
        while let Ok(state) = handle.updates.try_recv() {
            bar.suspend(|| print_state(&state));
        }
        if let Some(progress) = handle.progress.changed() {
            bar.set_length(progress.total_bytes);
            bar.set_position(progress.bytes_so_far);
            bar.set_prefix(format!("{}/{}", progress.index, progress.total));
            bar.set_message(format!(
                "{} {}",
                progress.filename,
                format_speed(progress.bytes_per_second)
            ));
        }
        if finished {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
    bar.finish_and_clear();
    handle.join()
}

fn follow_with_log(mut handle: SyncHandle) -> SyncOutcome {
    let mut announced = 0;
    loop {
        let finished = handle.is_finished();
        while let Ok(state) = handle.updates.try_recv() {
            print_state(&state);
        }
        if let Some(progress) = handle.progress.changed() {
            if progress.index != announced {
                announced = progress.index;
                info!(
                    "downloading server mod {}/{}: {}",
                    progress.index, progress.total, progress.filename
                );
            } else if progress.total_bytes > 0 {
                debug!(
                    "{}: {:.0}% at {}",
                    progress.filename,
                    progress.percent(),
                    format_speed(progress.bytes_per_second)
                );
            }
        }
        if finished {
            break;
        }
        thread::sleep(POLL_INTERVAL);
    }
    handle.join()
}

fn show_plan(cli: &Cli, folder: &str, json: bool) -> Result<bool, SyncError> {
    let repo = repository_url(cli)?;
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SyncError::io("failed to start async runtime", e))?;
    let engine = engine_for(cli, folder);
    let prepared = runtime.block_on(engine.check(&repo))?;
    let plan = &prepared.plan;

    if json {
        let rendered = serde_json::to_string_pretty(plan)
            .map_err(|e| SyncError::io("failed to render plan", e.into()))?;
        println!("{rendered}");
        return Ok(true);
    }

    println!(
        "{} files listed in {folder}/ of {}",
        prepared.manifest.len(),
        prepared.repository_url
    );
    if !plan.has_changes() {
        println!("Nothing to do.");
        return Ok(true);
    }
    let mods_dir = layout::mods_dir(&cli.root);
    for name in &plan.to_add {
        println!("  add     {name}");
    }
    for name in &plan.to_update {
        let size = std::fs::metadata(mods_dir.join(name))
            .map(|meta| format_bytes(meta.len()))
            .unwrap_or_default();
        println!("  update  {name} (local {size})");
    }
    for name in &plan.to_remove {
        println!("  remove  {name}");
    }
    Ok(true)
}

fn set_repo(cli: &Cli, url: &str) -> Result<bool, SyncError> {
    let info =
        resolver::resolve_base(url).ok_or_else(|| SyncError::InvalidRepoUrl(url.trim().into()))?;
    config::save_repository_url(&cli.root, url)?;
    println!(
        "Saved {} ({}) to {}",
        url.trim(),
        info.provider,
        layout::config_path(&cli.root).display()
    );
    Ok(true)
}

fn describe_url(url: &str) -> Result<bool, SyncError> {
    let resolved =
        resolver::resolve(url).ok_or_else(|| SyncError::InvalidRepoUrl(url.trim().into()))?;
    println!("provider: {}", resolved.base.provider);
    println!("base:     {}", resolved.base.base_url);
    match resolved.identity {
        Some(identity) => {
            println!("host:     {}", identity.host);
            println!("owner:    {}", identity.owner);
            println!("repo:     {}", identity.repo);
            println!("ref:      {} {}", identity.ref_kind.as_str(), identity.branch);
        }
        None => println!("(literal content root, no listing API)"),
    }
    Ok(true)
}
