use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::exit;

use clap::Parser;

use lbvctrl::{Isolate, Key, Lbv, LbvError, VpnConfiguration};

#[macro_use]
extern crate lazy_static;

mod config;

const DEFAULT_CONFIG_PATH: &str = "lbv-quick.toml";

lazy_static! {
    static ref ARGS: Args = Args::parse();
}

#[derive(clap::Parser)]
#[clap(about, version)]
struct Args {
    /// Path to the native tunnel library
    #[clap(long, short = 'l', value_name = "LIBRARY")]
    library: Option<PathBuf>,

    #[clap(long, short = 'c', value_name = "CONFIG")]
    config: Option<String>,

    /// Log filter (error, warn, info, debug, trace)
    #[clap(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Bring a tunnel up from a wg-quick style configuration file
    Up { wgfile: PathBuf },
    /// Bring down the tunnel started from a configuration file
    Down { wgfile: PathBuf },
    /// Generate a new private key
    Genkey,
    /// Generate a new preshared key
    Genpsk,
    /// Derive the public key for a private key read from stdin
    Pubkey,
}

fn main() {
    env_logger::Builder::new()
        .parse_filters(&ARGS.log_level)
        .init();

    let cfg = match &ARGS.config {
        Some(path) => config::read_config(path, true),
        None => config::read_config(DEFAULT_CONFIG_PATH, false),
    };
    if let Some(library) = cfg.library() {
        log::debug!("configured tunnel library: {}", library);
    }

    if let Err(e) = run(&cfg) {
        eprintln!("lbv-quick: {}", e);
        exit(1);
    }
}

fn run(cfg: &config::Config) -> Result<(), LbvError> {
    match &ARGS.command {
        Command::Genkey => {
            println!("{}", Key::generate_private());
            Ok(())
        }
        Command::Genpsk => {
            println!("{}", Key::generate_preshared());
            Ok(())
        }
        Command::Pubkey => {
            let line = read_stdin_line()?;
            println!("{}", Key::from_base64(line.trim())?.public_key());
            Ok(())
        }
        Command::Up { wgfile } => {
            let vpncfg = VpnConfiguration::from_file(wgfile)?;
            let isolate = open_isolate(cfg)?;
            let tunnel = isolate.up(&vpncfg)?;
            println!("{}", tunnel.handle());
            // The tunnel outlives this process; only the isolate is
            // torn down on exit.
            tunnel.leak();
            isolate.teardown()
        }
        Command::Down { wgfile } => {
            let isolate = open_isolate(cfg)?;
            isolate.stop(wgfile)?;
            isolate.teardown()
        }
    }
}

fn open_isolate(cfg: &config::Config) -> Result<Isolate, LbvError> {
    let lbv = match (&ARGS.library, cfg.library()) {
        (Some(path), _) => Lbv::load(path)?,
        (None, Some(path)) => Lbv::load(path)?,
        (None, None) => Lbv::load_default()?,
    };

    let isolate = Isolate::new(lbv)?;
    if let Some(search_path) = cfg.search_path() {
        isolate.set_configuration_search_path(Path::new(search_path))?;
    }
    Ok(isolate)
}

fn read_stdin_line() -> Result<String, LbvError> {
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => Ok(line),
        Err(e) => Err(LbvError::BadParameter {
            msg: format!("cannot read stdin: {}", e),
        }),
    }
}
