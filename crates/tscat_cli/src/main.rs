//! CLI probe over a catalogue database.
//!
//! # Responsibility
//! - Verify `tscat_core` linkage without an embedding application.
//! - List or export the catalogues of a database file for quick inspection.
//!
//! Usage: `tscat_cli [<db-path> [export]]`
//!
//! File logging starts when `TSCAT_LOG_DIR` holds an absolute directory;
//! `TSCAT_LOG_LEVEL` overrides the build default level.

use log::{error, info};
use std::process::ExitCode;
use tscat_core::{
    default_log_level, export_json, init_logging, open_db, CatalogueScope, CatalogueService,
    CoreResult, EventScope, QueryOptions, SqliteBackend,
};

const LOG_DIR_ENV: &str = "TSCAT_LOG_DIR";
const LOG_LEVEL_ENV: &str = "TSCAT_LOG_LEVEL";

fn main() -> ExitCode {
    if let Ok(log_dir) = std::env::var(LOG_DIR_ENV) {
        let level =
            std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| default_log_level().to_string());
        if let Err(err) = init_logging(&level, &log_dir) {
            eprintln!("warning: logging disabled: {err}");
        }
    }

    println!("tscat_core ping={}", tscat_core::ping());
    println!("tscat_core version={}", tscat_core::core_version());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.as_slice() {
        [] => Ok(()),
        [path] => run(path, false),
        [path, command] if command == "export" => run(path, true),
        _ => {
            eprintln!("usage: tscat_cli [<db-path> [export]]");
            return ExitCode::from(2);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(path: &str, export: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("event=cli_run module=cli status=start export={export}");
    let conn = open_db(path)?;
    let service = CatalogueService::new(SqliteBackend::try_new(&conn)?);
    if export {
        println!("{}", export_all(&service)?);
    } else {
        list_catalogues(&service)?;
    }
    Ok(())
}

fn list_catalogues(service: &CatalogueService<SqliteBackend<'_>>) -> CoreResult<()> {
    for catalogue in service.get_catalogues(CatalogueScope::All, false)? {
        let events = service.get_events(EventScope::Catalogue(&catalogue), QueryOptions::default())?;
        println!(
            "{}\t{}\tevents={}\tdynamic={}",
            catalogue.fixed_attributes()?.uuid,
            catalogue.name()?,
            events.len(),
            catalogue.is_dynamic()?
        );
    }
    Ok(())
}

fn export_all(service: &CatalogueService<SqliteBackend<'_>>) -> CoreResult<String> {
    let catalogues = service.get_catalogues(CatalogueScope::All, false)?;
    let refs: Vec<_> = catalogues.iter().collect();
    export_json(service, &refs)
}
