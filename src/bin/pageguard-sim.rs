// PageGuard simulator - replays a scripted page session against the guard
// Runs the same controller the browser build uses on a virtual clock

#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use anyhow::{Context, Result};
    use clap::Parser;
    use log::{info, warn};
    use pageguard::config_file::GuardSettings;
    use pageguard::script::Script;
    use std::path::PathBuf;

    /// Replay page visibility, keyboard and unload events against PageGuard
    #[derive(Parser, Debug)]
    #[command(
        author,
        version,
        about = "Replay page visibility, keyboard and unload events against PageGuard",
        long_about = "Replay a scripted page session against PageGuard on a virtual clock.

A script is a TOML file listing timed page events:

  [store]
  redirectOnHideEnabled = \"false\"

  [[step]]
  at_ms = 0
  action = \"hide\"

  [[step]]
  at_ms = 40
  action = \"key\"
  key = \"e\"

Actions: hide, show, focus, key, unload, set, unset.

SETTINGS:
  Guard settings come from (first match wins):
    - the script's [settings] table
    - --settings <FILE>
    - ~/.config/pageguard/settings.toml (platform config dir)
    - built-in defaults"
    )]
    struct Args {
        /// Script to replay
        script: PathBuf,

        /// Guard settings file (overrides the default settings path)
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Seed a store flag, e.g. --set tabCloseProtectionEnabled=true
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Log every state change
        #[arg(short, long)]
        verbose: bool,
    }

    fn load_settings(path: Option<&PathBuf>) -> Result<GuardSettings> {
        if let Some(path) = path {
            return GuardSettings::load_from_path(path);
        }

        match GuardSettings::default_path() {
            Some(path) if path.exists() => {
                info!("Using settings from {}", path.display());
                GuardSettings::load_from_path(&path)
            }
            _ => Ok(GuardSettings::default()),
        }
    }

    fn parse_assignment(raw: &str) -> Result<(String, String)> {
        let (key, value) = raw
            .split_once('=')
            .with_context(|| format!("Expected KEY=VALUE, got: {}", raw))?;
        if key.is_empty() {
            anyhow::bail!("Empty key in: {}", raw);
        }
        Ok((key.to_string(), value.to_string()))
    }

    pub fn run() -> Result<()> {
        let args = Args::parse();

        // Initialize logger
        env_logger::Builder::from_default_env()
            .filter_level(if args.verbose {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            })
            .init();

        let settings = load_settings(args.settings.as_ref()).context("Failed to load settings")?;
        let mut script = Script::load_from_path(&args.script)?;

        for raw in &args.set {
            let (key, value) = parse_assignment(raw)?;
            if script.store.insert(key.clone(), value).is_some() {
                warn!("--set {} overrides the script's [store] value", key);
            }
        }

        info!("Replaying {} ({} steps)", args.script.display(), script.steps.len());
        let page = script.run(&settings)?;

        println!("Trace");
        println!("=====");
        for entry in page.trace() {
            println!("{:>7}ms  {}", entry.at_ms, entry.what);
        }

        let flags = page.flags();
        println!();
        println!("Final state");
        println!("===========");
        println!("  clock:              {}ms", page.now_ms());
        println!("  overlay:            {:?}", page.state());
        println!("  redirect pending:   {}", page.controller().redirect_pending());
        println!("  pending timers:     {}", page.pending_timers());
        println!("  redirect on hide:   {}", flags.redirect_on_hide);
        println!("  close protection:   {}", flags.tab_close_protection);

        let navigations = page.navigations();
        if navigations.is_empty() {
            println!("  navigations:        none");
        } else {
            for url in navigations {
                println!("  navigated to:       {}", url);
            }
        }

        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    cli::run()
}

#[cfg(target_arch = "wasm32")]
fn main() {}
