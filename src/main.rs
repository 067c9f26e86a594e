//! rservod - Debug board control daemon
//!
//! Loads control documents, opens the debug board's interfaces in pool order
//! and runs get/set requests against the named controls.
//!
//! ```bash
//! rservod -c servo_v2.toml -i dummy get cold_reset ppvar_vbus_mv
//! rservod -c servo_v2.toml -i dummy --init set power_state:reset
//! echo "fw_wp_state" | rservod -c servo_v2.toml -i dummy shell
//! ```

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use rservo_core::{Dispatcher, DriverRegistry, SystemConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Commands::ListInterfaces = cli.command {
        commands::list_interfaces();
        return Ok(());
    }

    let servo = match open_dispatcher(&cli) {
        Ok(servo) => servo,
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    if cli.init {
        commands::control::run_hwinit(&servo);
    }

    let mut stdout = std::io::stdout().lock();
    let result = match cli.command {
        Commands::Get { names } => commands::control::run_get(&servo, &names, &mut stdout),
        Commands::Set { assignments } => commands::control::run_set(&servo, &assignments),
        Commands::Doc { name } => commands::control::run_doc(&servo, &name, &mut stdout),
        Commands::DocAll => {
            print!("{}", servo.doc_all());
            Ok(())
        }
        Commands::Hwinit => {
            commands::control::run_hwinit(&servo);
            Ok(())
        }
        Commands::GetAll { verbose } => {
            print!("{}", servo.get_all(verbose));
            Ok(())
        }
        Commands::Shell => {
            let stdin = std::io::stdin().lock();
            commands::shell::run_shell(&servo, stdin, &mut stdout).map_err(Into::into)
        }
        Commands::ListInterfaces => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Load the control documents, open the interface pool and validate both
fn open_dispatcher(cli: &Cli) -> Result<Dispatcher, Box<dyn std::error::Error>> {
    if cli.configs.is_empty() {
        return Err("No control document given (use -c <file>)".into());
    }

    let mut config = SystemConfig::new();
    for dir in &cli.search_paths {
        config.add_search_path(dir);
    }
    for path in &cli.configs {
        config.add_source(path)?;
    }
    log::info!("Loaded {} controls", config.control_names().count());

    let pool = rservo_interfaces::open_pool(&cli.interfaces)?;
    if pool.is_empty() {
        log::warn!("No interfaces opened; only servo-level controls will work");
    }

    Ok(Dispatcher::new(config, pool, DriverRegistry::builtin())?)
}
