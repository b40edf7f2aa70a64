use std::io::Write;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use xtftp::config::FileConfig;
use xtftp::tftp::client::{Client, ClientConfig};
use xtftp::tftp::core::TftpError;
use xtftp::tftp::server::{self, Config};

#[derive(Parser)]
#[command(name = "xtftp", version, about = "Lock-step TFTP client and server")]
struct Cli {
    /// Config file (defaults to $XTFTP_CONFIG or ./xtftp.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve files from a directory
    Server {
        /// IP address to listen on
        #[arg(long)]
        ip: Option<IpAddr>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory to serve
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Reject write requests
        #[arg(long)]
        read_only: bool,
    },
    /// Read a file from or write a file to a server
    Client {
        /// Server IP address
        #[arg(short, long)]
        server: Option<IpAddr>,
        /// Server port
        #[arg(short, long)]
        port: Option<u16>,
        /// Local files directory
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// r to read from the server, w to write to it
        #[arg(value_enum)]
        request: Request,
        /// File name, both locally and on the server
        filename: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Request {
    #[value(name = "r")]
    Read,
    #[value(name = "w")]
    Write,
}

fn init_logger(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage problems are benign
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    init_logger(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            let code = e
                .chain()
                .find_map(|cause| cause.downcast_ref::<TftpError>())
                .map_or(1, TftpError::exit_code);
            ExitCode::from(code as u8)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let file = FileConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Server {
            ip,
            port,
            dir,
            read_only,
        } => {
            let config = Config::with_defaults()
                .merge_file(&file)
                .merge_cli(ip, port, dir, read_only);
            server::run(config)
        }
        Commands::Client {
            server,
            port,
            dir,
            request,
            filename,
        } => {
            let config = ClientConfig::default()
                .merge_file(&file)
                .merge_cli(server, port, dir);
            let local = config.directory.join(&filename);

            match request {
                Request::Read => {
                    std::fs::create_dir_all(&config.directory)?;
                    Client::new(config)?.get(&filename, &local)?;
                }
                Request::Write => {
                    if !local.is_file() {
                        log::warn!("The file does not exist: {}", local.display());
                        return Ok(());
                    }
                    Client::new(config)?.put(&local, &filename)?;
                }
            }
            Ok(())
        }
    }
}
