// Parts of the translator API are only exercised through the library tests
#![allow(dead_code)]

mod db;
mod errors;
mod fs;
mod path;
mod schema;
mod translator;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueHint};
use env_logger::Env;
use fuser::MountOption;

use db::DbGateway;
use fs::SqlFs;

#[derive(Parser)]
#[command(name = "sqlfs")]
#[command(version)]
#[command(about = "Mount a SQLite database as a filesystem")]
#[command(after_help = "Example:
  sqlfs -o db=/var/data/shop.db /mnt/shop
  ls /mnt/shop/orders/1
  cat /mnt/shop/orders/1/item.vfs2db")]
struct Cli {
    /// Directory to mount the database on
    #[arg(value_hint = ValueHint::DirPath)]
    mountpoint: PathBuf,

    /// Mount options, comma-separated. db=<path> selects the database file
    /// and is required; every other option is passed through to FUSE.
    #[arg(short = 'o', value_name = "OPT[,OPT...]", value_delimiter = ',')]
    options: Vec<String>,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut db_path = None;
    let mut mount_options = vec![MountOption::FSName("sqlfs".to_string())];
    for opt in &cli.options {
        match opt.strip_prefix("db=") {
            Some(path) => db_path = Some(PathBuf::from(path)),
            None => mount_options.push(fs::mount_option(opt)),
        }
    }
    let Some(db_path) = db_path else {
        bail!("missing required mount option db=<path>");
    };

    let gateway = DbGateway::open(&db_path)
        .with_context(|| format!("cannot open database {}", db_path.display()))?;

    log::info!(
        "mounting {} on {}",
        db_path.display(),
        cli.mountpoint.display()
    );
    fuser::mount2(SqlFs::new(gateway), &cli.mountpoint, &mount_options)
        .with_context(|| format!("cannot mount on {}", cli.mountpoint.display()))?;
    Ok(())
}
