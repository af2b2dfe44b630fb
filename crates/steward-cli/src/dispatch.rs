use std::io;
use std::path::Path;

use anyhow::{anyhow, Result};
use steward_cache::FsCacheStore;
use steward_core::{default_config_path, StewardConfig, StewardPaths};
use steward_maintenance::{
    apply_update, unwritable_paths, ApplyContext, CommandUpdateExecutor, FsSystemController,
    FsWritabilityProbe, SystemController, UpdateTarget,
};
use steward_updates::{
    DisabledTelemetryClient, FsExtensionDirectory, HttpTelemetryClient, LocalCore,
    TelemetryClient, UpdateAggregator,
};
use tracing::debug;

use crate::completion::write_completions_script;
use crate::render::{
    format_apply_outcome_lines, format_snapshot_lines, format_update_entry_lines,
    TerminalRenderer,
};
use crate::{Cli, Commands, SystemAction};

const NOTHING_CACHED_HINT: &str = "no update information cached; run `steward check --force`";

pub(crate) struct Runtime {
    pub(crate) config: StewardConfig,
    pub(crate) paths: StewardPaths,
    cache: FsCacheStore,
    telemetry: Box<dyn TelemetryClient>,
    extensions: FsExtensionDirectory,
    system: FsSystemController,
}

impl Runtime {
    pub(crate) fn from_config(config: StewardConfig) -> Result<Self> {
        let paths = config.paths();
        let telemetry: Box<dyn TelemetryClient> = match config.telemetry.endpoint.as_deref() {
            Some(endpoint) => Box::new(HttpTelemetryClient::new(
                endpoint,
                config.telemetry_timeout(),
            )?),
            None => {
                debug!("no telemetry endpoint configured; remote checks are disabled");
                Box::new(DisabledTelemetryClient)
            }
        };

        Ok(Self {
            cache: FsCacheStore::new(paths.cache_dir()),
            extensions: FsExtensionDirectory::open(paths.extensions.clone()),
            system: FsSystemController::new(paths.offline_marker_path()),
            telemetry,
            paths,
            config,
        })
    }

    pub(crate) fn aggregator(&self) -> UpdateAggregator<'_> {
        UpdateAggregator::new(
            &self.cache,
            self.telemetry.as_ref(),
            &self.extensions,
            LocalCore {
                name: self.config.core.name.clone(),
                version: self.config.core.version.clone(),
                build: self.config.core.build.clone(),
            },
            self.config.cache_ttl(),
        )
    }
}

pub(crate) fn load_config(explicit: Option<&Path>) -> Result<StewardConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    debug!(path = %path.display(), "loading configuration");
    StewardConfig::load(&path)
}

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut stdout = io::stdout().lock();
        return write_completions_script(shell, &mut stdout);
    }

    let runtime = Runtime::from_config(load_config(cli.config.as_deref())?)?;
    run_command(&runtime, cli.command)
}

pub(crate) fn run_command(runtime: &Runtime, command: Commands) -> Result<()> {
    let renderer = TerminalRenderer::current();
    let core_name = runtime.config.core.name.as_str();

    match command {
        Commands::Check { force } => {
            let mut aggregator = runtime.aggregator();
            let spinner = force.then(|| renderer.start_remote_check("update check"));
            let snapshot = aggregator.get_snapshot(force).cloned();
            if let Some(spinner) = spinner {
                spinner.finish();
            }

            match snapshot {
                Some(snapshot) => {
                    renderer.print_section("Update status");
                    renderer.print_lines(&format_snapshot_lines(
                        &snapshot,
                        core_name,
                        renderer.style(),
                    ));
                }
                None => renderer.print_status("info", NOTHING_CACHED_HINT),
            }
        }
        Commands::List { force } => {
            let mut aggregator = runtime.aggregator();
            let spinner = force.then(|| renderer.start_remote_check("update check"));
            let entries = aggregator.list_available_updates(force);
            if let Some(spinner) = spinner {
                spinner.finish();
            }

            match entries {
                Some(entries) => {
                    renderer.print_section("Available updates");
                    renderer.print_lines(&format_update_entry_lines(&entries, renderer.style()));
                }
                None => renderer.print_status("info", NOTHING_CACHED_HINT),
            }
        }
        Commands::Status => {
            let mut aggregator = runtime.aggregator();
            let cached = aggregator.get_snapshot(false).is_some();
            let live = runtime.system.is_live()?;
            renderer.print_lines(&[
                format!(
                    "update info: {}",
                    if cached { "cached" } else { "not cached" }
                ),
                format!(
                    "critical update available: {}",
                    yes_no(aggregator.is_critical_update_available())
                ),
                format!(
                    "manual update required: {}",
                    yes_no(aggregator.is_manual_update_required())
                ),
                format!("system: {}", if live { "live" } else { "offline" }),
            ]);
        }
        Commands::Flush => {
            if runtime.aggregator().flush() {
                renderer.print_status("ok", "cleared cached update information");
            } else {
                renderer.print_status("info", "no cached update information to clear");
            }
        }
        Commands::Preflight => {
            let unwritable = unwritable_paths(&FsWritabilityProbe, &runtime.paths.update_targets());
            if unwritable.is_empty() {
                renderer.print_status("ok", "all update targets are writable");
            } else {
                for path in &unwritable {
                    renderer.print_status("error", &format!("not writable: {}", path.display()));
                }
                return Err(anyhow!(
                    "update-preflight-failed: {} update target(s) are not writable",
                    unwritable.len()
                ));
            }
        }
        Commands::Apply { extension } => {
            let target = UpdateTarget::from_extension(extension);
            let executor = CommandUpdateExecutor::from_config(&runtime.config.executor);
            let ctx = ApplyContext {
                system: &runtime.system,
                probe: &FsWritabilityProbe,
                executor: &executor,
                cache: &runtime.cache,
                required_paths: runtime.paths.update_targets(),
            };
            let outcome = apply_update(&target, &ctx)?;
            renderer.print_lines(&format_apply_outcome_lines(&outcome, renderer.style()));
        }
        Commands::System { action } => run_system_command(renderer, &runtime.system, action)?,
        Commands::Completions { shell } => {
            let mut stdout = io::stdout().lock();
            write_completions_script(shell, &mut stdout)?;
        }
    }

    Ok(())
}

fn run_system_command(
    renderer: TerminalRenderer,
    system: &dyn SystemController,
    action: SystemAction,
) -> Result<()> {
    match action {
        SystemAction::On => {
            system.set_live(true)?;
            renderer.print_status("ok", "system is live");
        }
        SystemAction::Off => {
            system.set_live(false)?;
            renderer.print_status("warn", "system is offline");
        }
        SystemAction::Status => {
            if system.is_live()? {
                renderer.print_status("ok", "system is live");
            } else {
                renderer.print_status("warn", "system is offline");
            }
        }
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
