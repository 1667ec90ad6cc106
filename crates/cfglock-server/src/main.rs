//! Main entry point for the cfglock binary.
//!
//! Runs programs that write the shared configuration store under the
//! cluster-wide configuration lock, and reports lock status.

use clap::Parser;
use tracing::info;

use cfglock_common::LockKind;
use cfglock_server::model::{Cli, Command, Configuration};
use cfglock_server::service::{self, EXIT_FAILURE};
use cfglock_server::startup;

fn run(cli: Cli) -> anyhow::Result<i32> {
    let configuration = Configuration::from_cli(&cli)?;
    let _logging_guard = startup::init_logging(&configuration.logging_config())?;

    let settings = configuration.lock_settings()?;
    info!(
        enabled = settings.enabled,
        provider = %settings.provider,
        lock = %settings.lock_name,
        "Configuration lock settings loaded"
    );

    match cli.command {
        Command::Exec(args) => {
            let lock = service::exec_lock(&settings, args.try_only)?;
            let kind = if args.read {
                LockKind::Read
            } else {
                LockKind::Write
            };
            let (program, program_args) = args
                .program
                .split_first()
                .ok_or_else(|| anyhow::anyhow!("no program given"))?;
            service::run_locked(&lock, kind, args.try_only, program, program_args)
        }
        Command::Status => {
            let status = service::lock_status(&settings)?;
            println!("{}: {}", settings.lock_name, status);
            Ok(0)
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("cfglock: {:#}", e);
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}
