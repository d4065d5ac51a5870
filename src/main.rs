// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use fintally::{cli, commands, config::Settings, db};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "fintally=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::build_cli();
    let matches = cli.get_matches();

    let mut conn = db::open_or_init()?;
    let settings = Settings::load(&conn)?;

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path()?.display());
        }
        Some(("config", sub)) => commands::config::handle(&conn, sub)?,
        Some(("asset", sub)) => commands::assets::handle(&mut conn, &settings, sub)?,
        Some(("tx", sub)) => commands::transactions::handle(&mut conn, &settings, sub)?,
        Some(("import", sub)) => commands::importer::handle(&mut conn, &settings, sub)?,
        Some(("fx", sub)) => commands::fx::handle(&conn, &settings, sub)?,
        Some(("budget", sub)) => commands::budgets::handle(&conn, &settings, sub)?,
        Some(("rules", sub)) => commands::rules::handle(&conn, sub)?,
        Some(("doctor", _)) => commands::doctor::handle(&conn)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
