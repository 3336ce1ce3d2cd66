use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{
    Parser,
    builder::{Styles, styling},
};
use console::{Key, Term, style};
use sysinfo::{ProcessRefreshKind, RefreshKind, System, UpdateKind, Users};
use tabled::{Table, Tabled, settings::Style as TableStyle};

use crate::arch::ProcessArchitecture;
use crate::candidates;
use crate::config::PooldumpConfig;
use crate::correlate::{self, CorrelatedProcess};
use crate::dispatch;
use crate::pool;
use crate::prelude::*;
use crate::procdump;

fn create_styles() -> Styles {
    styling::Styles::styled()
        .header(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .usage(styling::AnsiColor::Green.on_default() | styling::Effects::BOLD)
        .literal(styling::AnsiColor::Cyan.on_default() | styling::Effects::BOLD)
        .placeholder(styling::AnsiColor::Cyan.on_default())
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Attach ProcDump to the process hosting an IIS application pool",
    styles = create_styles()
)]
pub struct Cli {
    /// IIS application pool name to attach to; omit it (or pass `*`) to
    /// list the correlated processes instead
    pub app_pool: Option<String>,

    /// Arguments forwarded verbatim to ProcDump. Do not pass a PID or a
    /// process name; finding those is this tool's job
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub procdump_args: Vec<String>,

    /// List the correlated processes and exit
    #[arg(long, short = 'l')]
    pub list: bool,

    /// Full path to ProcDump.exe, overriding the configuration file
    #[arg(long, env = "POOLDUMP_PROCDUMP_PATH")]
    pub procdump_path: Option<String>,

    /// The configuration name to use
    /// If provided, the configuration will be loaded from ~/.config/pooldump/{config-name}.yaml
    /// Otherwise, loads from ~/.config/pooldump/config.yaml
    #[arg(long, env = "POOLDUMP_CONFIG_NAME")]
    pub config_name: Option<String>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config =
        PooldumpConfig::load_with_override(cli.config_name.as_deref(), cli.procdump_path.as_deref())?;

    let sys = System::new_with_specifics(
        RefreshKind::nothing().with_processes(
            ProcessRefreshKind::nothing()
                .with_user(UpdateKind::OnlyIfNotSet)
                .with_environ(UpdateKind::OnlyIfNotSet),
        ),
    );
    let users = Users::new_with_refreshed_list();

    // The pipeline runs front to back on every invocation; nothing is
    // cached across runs.
    let workers = pool::enumerate_worker_processes(&sys)?;
    let candidates = candidates::enumerate_all(&sys, &users, &config.process_names);
    let correlated = correlate::join(candidates, &workers);

    if correlated.is_empty() {
        // Enumeration itself succeeded; there is just nothing hosted.
        println!("No process hosting an application under an IIS application pool was found.");
        println!(
            "If the application is self-hosted under its own executable, add that name to the configuration file."
        );
        return Ok(());
    }

    let target = match cli.app_pool.as_deref() {
        None | Some("*") => None,
        Some(_) if cli.list => None,
        Some(pool) => Some(pool.to_string()),
    };

    match target {
        None => {
            print_listing(&correlated);
            Ok(())
        }
        Some(target) => attach(&cli, &mut config, &correlated, &target),
    }
}

fn attach(
    cli: &Cli,
    config: &mut PooldumpConfig,
    correlated: &[CorrelatedProcess],
    target: &str,
) -> Result<()> {
    // Resolve ProcDump before prompting for anything else; without it there
    // is nothing to dispatch.
    let procdump_path = resolve_procdump_interactively(config, cli.config_name.as_deref())?;

    println!("Searching for the {target:?} application pool in the process list...");
    let outcome = dispatch::match_pool(correlated, target, &cli.procdump_args, prompt_for_architecture);

    let mut started = 0usize;
    for invocation in &outcome.invocations {
        match procdump::launch(&procdump_path, invocation) {
            Ok(()) => started += 1,
            Err(err) => error!("{err:#}"),
        }
    }

    println!("\nTotal number of process(es) scanned: {}", outcome.scanned);
    println!(
        "Total number of process(es) matched for {target:?}: {}",
        outcome.matched
    );
    println!("Total number of ProcDump instances started: {started}");

    if outcome.matched == 0 {
        println!(
            "\n{}",
            style("No process found to attach ProcDump to.").red().bold()
        );
        println!("Known correlated processes:\n");
        print_listing(correlated);
    } else if started > 0 {
        println!(
            "\nCheck the launched ProcDump window(s) for results. A window closing immediately \
             usually means the forwarded ProcDump arguments were not accepted."
        );
    }

    Ok(())
}

/// Validate the configured ProcDump path, falling back to a prompt when it
/// is missing. A path entered at the prompt is written back to the
/// configuration once it validates.
fn resolve_procdump_interactively(
    config: &mut PooldumpConfig,
    config_name: Option<&str>,
) -> Result<PathBuf> {
    let mut entered_manually = false;
    loop {
        match procdump::resolve_path(config.procdump.path.as_deref()) {
            Ok(path) => {
                if entered_manually {
                    if let Err(err) = config.persist(config_name) {
                        warn!(
                            "The new ProcDump path will be used but could not be saved: {err:#}"
                        );
                    } else {
                        println!("Configuration updated with the new ProcDump path.");
                    }
                }
                return Ok(path);
            }
            Err(err) if std::io::stdin().is_terminal() => {
                println!("{}", style(format!("{err:#}")).red());
                println!(
                    "Provide the full path of ProcDump.exe (e.g. C:\\Downloads\\procdump.exe), or leave empty to exit:"
                );
                let entered = Term::stdout().read_line()?;
                let entered = entered.trim();
                if entered.is_empty() {
                    bail!("No usable ProcDump path; set procdump.path in the configuration file");
                }
                config.procdump.path = Some(entered.to_string());
                entered_manually = true;
            }
            Err(err) => {
                return Err(err.context(
                    "Set procdump.path in the configuration file or pass --procdump-path",
                ));
            }
        }
    }
}

/// Ask the user to settle an unresolved bitness. Any answer other than 1 or
/// 2 skips the process; without a terminal the process is skipped outright.
fn prompt_for_architecture(process: &CorrelatedProcess) -> Option<ProcessArchitecture> {
    if !std::io::stdin().is_terminal() {
        return None;
    }
    println!(
        "\nUnable to detect the bitness of pid {} ({}).",
        process.process_id, process.process_name
    );
    println!("Press 1 if it is a 32-bit process, 2 if it is 64-bit, or any other key to skip it.");
    match Term::stdout().read_key() {
        Ok(Key::Char('1')) => Some(ProcessArchitecture::X86),
        Ok(Key::Char('2')) => Some(ProcessArchitecture::X64),
        _ => None,
    }
}

#[derive(Tabled)]
struct ProcessRow {
    #[tabled(rename = "Process Name")]
    process_name: String,
    #[tabled(rename = "PID")]
    process_id: u32,
    #[tabled(rename = "App Pool")]
    app_pool: String,
    #[tabled(rename = "Arch")]
    architecture: String,
    #[tabled(rename = "Owner")]
    owner: String,
}

/// Listing order is by pool name ascending; it only affects presentation.
fn listing_rows(correlated: &[CorrelatedProcess]) -> Vec<ProcessRow> {
    let mut sorted: Vec<&CorrelatedProcess> = correlated.iter().collect();
    sorted.sort_by(|a, b| a.app_pool_name.cmp(&b.app_pool_name));
    sorted
        .into_iter()
        .map(|process| ProcessRow {
            process_name: process.process_name.clone(),
            process_id: process.process_id,
            app_pool: process.app_pool_name.clone(),
            architecture: process.architecture.to_string(),
            owner: process.owner.clone(),
        })
        .collect()
}

fn print_listing(correlated: &[CorrelatedProcess]) {
    let mut table = Table::new(listing_rows(correlated));
    table.with(TableStyle::sharp());
    println!("{table}");
    println!("\nTotal {} process(es) found.", correlated.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlated(pid: u32, pool: &str) -> CorrelatedProcess {
        CorrelatedProcess {
            process_name: "dotnet.exe".into(),
            process_id: pid,
            parent_process_id: 1000,
            architecture: ProcessArchitecture::X64,
            owner: String::new(),
            app_pool_name: pool.into(),
        }
    }

    #[test]
    fn pool_name_and_passthrough_args_are_split() {
        let cli =
            Cli::try_parse_from(["pooldump", "My Pool", "-ma", "-e", "1", "c:\\dumps"]).unwrap();
        assert_eq!(cli.app_pool.as_deref(), Some("My Pool"));
        assert_eq!(cli.procdump_args, vec!["-ma", "-e", "1", "c:\\dumps"]);
    }

    #[test]
    fn a_bare_invocation_has_no_target() {
        let cli = Cli::try_parse_from(["pooldump"]).unwrap();
        assert_eq!(cli.app_pool, None);
        assert!(cli.procdump_args.is_empty());
        assert!(!cli.list);
    }

    #[test]
    fn the_list_flag_parses_before_the_positional() {
        let cli = Cli::try_parse_from(["pooldump", "--list"]).unwrap();
        assert!(cli.list);
    }

    #[test]
    fn listing_is_sorted_by_pool_name() {
        let rows = listing_rows(&[
            correlated(3, "Zeta"),
            correlated(1, "Alpha"),
            correlated(2, "Mid"),
        ]);
        let pools: Vec<&str> = rows.iter().map(|r| r.app_pool.as_str()).collect();
        assert_eq!(pools, vec!["Alpha", "Mid", "Zeta"]);
    }
}
