// CLI Controller - Runs commands against the session manager
//
// Each invocation opens one configuration file, applies a single command and
// saves when the command changed something. Background lookups and scans run on
// the tokio runtime behind `handle` and are awaited before printing.

use crate::cli::Command;
use crate::config::ConfigManager;
use crate::models::{AppSettings, ModEntry, NewEntry};
use crate::services::{
    ReconcileError, SteamWorkshopClient, WorkshopLookup, docker_mods_value,
    docker_workshop_value, extract_workshop_id,
};
use crate::state::{SessionChange, SessionManager};
use anyhow::{Context, Result, anyhow, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::Write;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

/// Command runner wiring the session manager, settings and tokio runtime together
///
/// # Example
/// ```ignore
/// let runtime = tokio::runtime::Runtime::new()?;
/// let controller = CliController::new(SessionManager::new(), config_manager, runtime.handle().clone());
/// controller.run(Some(path), &Command::List, &mut std::io::stdout())?;
/// ```
pub struct CliController {
    sessions: SessionManager,
    config_manager: ConfigManager,
    handle: Handle,

    /// Replaces the Steam client built from the settings
    lookup: Option<Arc<dyn WorkshopLookup>>,
}

impl CliController {
    pub fn new(sessions: SessionManager, config_manager: ConfigManager, handle: Handle) -> Self {
        Self {
            sessions,
            config_manager,
            handle,
            lookup: None,
        }
    }

    /// Use `lookup` for name resolution instead of the Steam Web API.
    pub fn with_lookup(mut self, lookup: Arc<dyn WorkshopLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn resolve_file(file: Option<&Utf8Path>, settings: &AppSettings) -> Result<Utf8PathBuf> {
        if let Some(file) = file {
            return Ok(file.to_path_buf());
        }
        if !settings.last_ini_path.is_empty() {
            return Ok(Utf8PathBuf::from(&settings.last_ini_path));
        }
        bail!("No configuration file given and none opened before; pass --file")
    }

    /// Open the configuration file and run `command` against it.
    pub fn run(&self, file: Option<&Utf8Path>, command: &Command, out: &mut dyn Write) -> Result<()> {
        let settings = self.config_manager.load_settings()?;
        let path = Self::resolve_file(file, &settings)?;

        self.sessions.open(&path)?;
        if let Err(e) = self.config_manager.add_recent_file(&path) {
            tracing::warn!("Failed to update recent files: {:#}", e);
        }

        let result = self.execute(command, &settings, out);

        if result.is_ok() && !command.is_read_only() && self.sessions.is_dirty() {
            self.sessions.save()?;
            writeln!(out, "Saved {}", path)?;
        }
        self.sessions.close();
        result
    }

    fn execute(&self, command: &Command, settings: &AppSettings, out: &mut dyn Write) -> Result<()> {
        match command {
            Command::List => self.print_list(out),

            Command::Add {
                id_or_url,
                mod_id,
                at,
            } => {
                let order = match mod_id {
                    Some(mod_id) => {
                        let workshop_id = extract_workshop_id(id_or_url)
                            .ok_or_else(|| ReconcileError::InvalidIdentifier(id_or_url.clone()))?;
                        self.sessions.insert_entry(
                            NewEntry::workshop(workshop_id).with_mod_id(mod_id.as_str()),
                            *at,
                        )?
                    }
                    None => self.sessions.add_entry(id_or_url, *at)?,
                };
                writeln!(out, "Added at {}", order)?;
                Ok(())
            }

            Command::Remove { order } => {
                let entry = self.sessions.remove_entry(*order)?;
                writeln!(out, "Removed {}", entry.label())?;
                Ok(())
            }

            Command::Move { from, to } => {
                if self.sessions.move_entry(*from, *to)? {
                    writeln!(out, "Moved {} to {}", from, to)?;
                }
                Ok(())
            }

            Command::Enable { order } | Command::Disable { order } => {
                let enabled = matches!(command, Command::Enable { .. });
                let changed = self.sessions.set_enabled(*order, enabled)?;
                let state = if enabled { "enabled" } else { "disabled" };
                if changed {
                    writeln!(out, "Entry {} {}", order, state)?;
                } else {
                    writeln!(out, "Entry {} already {}", order, state)?;
                }
                Ok(())
            }

            Command::EnableAll | Command::DisableAll => {
                let enabled = matches!(command, Command::EnableAll);
                let count = self.sessions.set_all_enabled(enabled)?;
                writeln!(
                    out,
                    "{} {} entries",
                    if enabled { "Enabled" } else { "Disabled" },
                    count
                )?;
                Ok(())
            }

            Command::Scan { path, dry_run } => self.scan(path.as_deref(), *dry_run, settings, out),

            Command::Names => self.resolve_names(settings, out),

            Command::Export { workshop, mods } => {
                let entries = self.sessions.entries()?;
                if !*workshop {
                    writeln!(out, "MOD_IDS={}", docker_mods_value(&entries))?;
                }
                if !*mods {
                    writeln!(out, "WORKSHOP_IDS={}", docker_workshop_value(&entries))?;
                }
                Ok(())
            }

            Command::Settings { filter } => {
                let filter = filter.as_deref().map(str::to_lowercase);
                for setting in self.sessions.settings()? {
                    if let Some(filter) = &filter {
                        if !setting.key.to_lowercase().contains(filter.as_str()) {
                            continue;
                        }
                    }
                    let bounds = match (setting.min, setting.max) {
                        (Some(min), Some(max)) => format!(" [{}..{}]", min, max),
                        _ => String::new(),
                    };
                    writeln!(
                        out,
                        "{}={} ({:?}{})",
                        setting.key,
                        setting.value,
                        setting.value_type(),
                        bounds
                    )?;
                }
                Ok(())
            }

            Command::SaveAs { path } => {
                self.sessions.save_as(path)?;
                if let Err(e) = self.config_manager.add_recent_file(path) {
                    tracing::warn!("Failed to update recent files: {:#}", e);
                }
                writeln!(out, "Saved {}", path)?;
                Ok(())
            }

            Command::Set { key, value } => {
                if self.sessions.set_setting(key, value)? {
                    writeln!(out, "{}={}", key, value)?;
                } else {
                    writeln!(out, "{} unchanged", key)?;
                }
                Ok(())
            }
        }
    }

    fn print_list(&self, out: &mut dyn Write) -> Result<()> {
        let entries = self.sessions.entries()?;
        for entry in &entries {
            writeln!(out, "{}", format_entry(entry))?;
        }
        let disabled = entries.iter().filter(|e| !e.enabled).count();
        writeln!(out, "{} mods ({} disabled)", entries.len(), disabled)?;
        Ok(())
    }

    fn scan(
        &self,
        path: Option<&Utf8Path>,
        dry_run: bool,
        settings: &AppSettings,
        out: &mut dyn Write,
    ) -> Result<()> {
        let root = match path {
            Some(path) => path.to_path_buf(),
            None if settings.has_workshop_path() => Utf8PathBuf::from(&settings.workshop_path),
            None => bail!("No workshop path configured; pass --path or set PZMM_WORKSHOP_PATH"),
        };

        let mut rx = self.sessions.subscribe();
        let task = self
            .sessions
            .spawn_scan(&self.handle, root.clone())
            .ok_or_else(|| anyhow!("No configuration file is open"))?;
        self.handle
            .block_on(task)
            .context("Workshop scan task panicked")?;

        match drain_events(&mut rx).into_iter().find_map(scan_outcome) {
            Some(Ok((mod_ids, workshop_ids, names))) => writeln!(
                out,
                "Scanned {}: filled {} mod ids, {} workshop ids, {} names",
                root, mod_ids, workshop_ids, names
            )?,
            Some(Err(message)) => bail!("Workshop scan failed: {}", message),
            None => writeln!(out, "Scan discarded")?,
        }

        if dry_run {
            self.print_list(out)?;
            // Reopening drops the filled ids so run() has nothing to save
            let path = self.sessions.read(|session| session.path.clone())?;
            self.sessions.open(&path)?;
        }
        Ok(())
    }

    fn resolve_names(&self, settings: &AppSettings, out: &mut dyn Write) -> Result<()> {
        let lookup: Arc<dyn WorkshopLookup> = match &self.lookup {
            Some(lookup) => Arc::clone(lookup),
            None => Arc::new(
                SteamWorkshopClient::new(settings.steam_api_key.as_str())
                    .context("Set a Steam API key with PZMM_STEAM_API_KEY")?,
            ),
        };

        let mut rx = self.sessions.subscribe();
        let Some(task) = self.sessions.spawn_name_lookup(&self.handle, lookup) else {
            writeln!(out, "All names resolved")?;
            return Ok(());
        };
        self.handle
            .block_on(task)
            .context("Name lookup task panicked")?;

        for event in drain_events(&mut rx) {
            match event {
                SessionChange::NamesResolved { applied } => {
                    writeln!(out, "Resolved {} names", applied)?;
                }
                SessionChange::LookupFailed { message } => {
                    writeln!(out, "Name lookup failed: {}", message)?;
                }
                _ => {}
            }
        }
        self.print_list(out)
    }
}

fn drain_events(rx: &mut broadcast::Receiver<SessionChange>) -> Vec<SessionChange> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            // Per-entry updates of large lists can overflow the channel; the
            // summary event comes last and survives
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::debug!("Skipped {} session events", skipped);
            }
            Err(_) => break,
        }
    }
    events
}

fn scan_outcome(event: SessionChange) -> Option<Result<(usize, usize, usize), String>> {
    match event {
        SessionChange::ScanApplied {
            mod_ids_filled,
            workshop_ids_filled,
            names_applied,
        } => Some(Ok((mod_ids_filled, workshop_ids_filled, names_applied))),
        SessionChange::ScanFailed { message } => Some(Err(message)),
        _ => None,
    }
}

/// One listing line: `  3 [x] ModA (2875848298) - Mod A Title`
pub fn format_entry(entry: &ModEntry) -> String {
    let mut line = format!(
        "{:>3} [{}] {}",
        entry.order,
        if entry.enabled { 'x' } else { ' ' },
        if entry.has_mod_id() { entry.mod_id.as_str() } else { "?" }
    );
    if let Some(workshop_id) = &entry.workshop_id {
        line.push_str(&format!(" ({})", workshop_id));
    }
    if let Some(name) = &entry.display_name {
        line.push_str(&format!(" - {}", name));
    }
    line
}
