//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise `tablekit_core` end to end against one database: schema,
//!   insert, lookup, transactional rollback and a paged read.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `tablekit_cli [connection-string] [absolute-log-dir]`

use log::info;
use rusqlite::Row;
use std::error::Error;
use tablekit_core::{
    ConnectionOptions, Entity, EntityDescriptor, FromRow, NamedParams, RepoError, UnitOfWork,
};

const DEFAULT_CONNECTION: &str = "Data Source=:memory:";
const SAMPLE_ROWS: i64 = 12;

#[derive(Debug)]
struct Note {
    id: i64,
    title: String,
}

impl FromRow for Note {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("Id")?,
            title: row.get("Title")?,
        })
    }
}

impl Entity for Note {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new()
            .table("SMOKE_NOTES")
            .key_as("Id", "NOTE_ID")
            .property_as("Title", "TITLE")
    }

    fn to_params(&self) -> NamedParams {
        NamedParams::new()
            .with("Id", self.id)
            .with("Title", self.title.clone())
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("tablekit smoke failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let connection = args.next().unwrap_or_else(|| DEFAULT_CONNECTION.to_string());
    if let Some(log_dir) = args.next() {
        tablekit_core::init_logging(tablekit_core::default_log_level(), &log_dir)?;
    }

    println!("tablekit_core version={}", tablekit_core::core_version());
    let options = ConnectionOptions::from_connection_string(&connection)?;
    info!("event=smoke_start module=cli path={}", options.path);

    let uow = UnitOfWork::new(options);
    uow.connection()?.execute_batch(
        "DROP TABLE IF EXISTS SMOKE_NOTES;
         CREATE TABLE SMOKE_NOTES (NOTE_ID INTEGER PRIMARY KEY, TITLE TEXT NOT NULL);",
    )?;

    let notes = uow.repository::<Note>()?;
    uow.transaction_scope(|_| -> Result<(), RepoError> {
        for id in 1..=SAMPLE_ROWS {
            notes.add(&Note {
                id,
                title: format!("note {id}"),
            })?;
        }
        Ok(())
    })?;
    println!("inserted={}", notes.count(None, &NamedParams::new())?);

    if let Some(note) = notes.get_by_id(3_i64)? {
        println!("get_by_id id={} title={}", note.id, note.title);
    }

    uow.begin_transaction()?;
    notes.delete_where(None, &NamedParams::new())?;
    uow.rollback()?;
    println!(
        "after_rollback={}",
        notes.count(None, &NamedParams::new())?
    );

    let page = notes.get_paged(&notes.page_request(2, 5).order_by("NOTE_ID"))?;
    let ids: Vec<String> = page.items.iter().map(|n| n.id.to_string()).collect();
    println!(
        "page index={} size={} total={} pages={} ids={}",
        page.page_index,
        page.page_size,
        page.total_count,
        page.page_count(),
        ids.join(",")
    );

    uow.dispose()?;
    info!("event=smoke_finish module=cli status=ok");
    Ok(())
}
