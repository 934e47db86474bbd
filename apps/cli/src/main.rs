//! SliceVault command-line client.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use slicevault_client::{Client, Downloader, UploadOptions, Uploader};
use slicevault_protocol::FileKind;
use slicevault_transfer::expand_resend_list;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Server URL.
    #[arg(long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a file in slices; pass --fid to resume an interrupted upload.
    Upload {
        file: PathBuf,
        /// Name to store the file under (defaults to the file's name).
        #[arg(long)]
        name: Option<String>,
        /// Bytes per slice.
        #[arg(long, default_value_t = slicevault_client::DEFAULT_SLICE_SIZE)]
        slice_size: usize,
        /// Resume the transfer with this fid instead of starting a new one.
        #[arg(long)]
        fid: Option<String>,
        /// Send slices as base64 JSON instead of binary frames.
        #[arg(long)]
        json: bool,
    },
    /// Show which slices of a transfer the server is still missing.
    Status {
        name: String,
        #[arg(long)]
        fid: String,
    },
    /// Download a stored file.
    Download {
        name: String,
        /// Output path (defaults to the stored name in the current directory).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List downloadable files.
    List,
    /// Show the catalog entry of one file.
    Info { name: String },
    /// Print the metadata record of a sliced file as JSON.
    Metadata { name: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let client = Client::connect(&cli.server)
        .await
        .with_context(|| format!("failed to connect to {}", cli.server))?;

    match cli.command {
        Command::Upload {
            file,
            name,
            slice_size,
            fid,
            json,
        } => {
            let name = match name {
                Some(name) => name,
                None => file_name(&file)?,
            };
            let options = UploadOptions {
                slice_size,
                binary: !json,
                ..UploadOptions::default()
            };
            let uploader = Uploader::new(&client, options);
            let report = match fid {
                Some(fid) => uploader.resume(&file, &name, &fid).await,
                None => uploader.upload(&file, &name).await,
            }
            .with_context(|| format!("upload of {} failed", file.display()))?;

            println!(
                "uploaded {name}: {} bytes in {} slices (fid {}, md5 {})",
                report.metadata.filesize,
                report.metadata.slice_count,
                report.metadata.fid,
                report.checksum
            );
        }
        Command::Status { name, fid } => {
            let record = client.get_metadata(&name).await?;
            let list = client.query_resend_list(&fid, &name).await?;
            let missing = expand_resend_list(&list, record.slice_count);
            if missing.is_empty() {
                println!("{name}: all {} slices present", record.slice_count);
            } else {
                println!(
                    "{name}: {} of {} slices missing {:?}",
                    missing.len(),
                    record.slice_count,
                    list
                );
            }
        }
        Command::Download { name, output } => {
            let output = output.unwrap_or_else(|| PathBuf::from(&name));
            let report = Downloader::new(&client).download(&name, &output).await?;
            println!("downloaded {name}: {} bytes to {}", report.bytes, output.display());
        }
        Command::List => {
            for file in client.list_files().await? {
                println!("{:>12}  {:<6}  {}", file.filesize, kind_label(file.filetype), file.filename);
            }
        }
        Command::Info { name } => {
            let info = client.get_file_info(&name).await?;
            println!("{}: {} bytes, {}", info.filename, info.filesize, kind_label(info.filetype));
        }
        Command::Metadata { name } => {
            let meta = client.get_metadata(&name).await?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
    }

    client.close().await;
    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .with_context(|| format!("cannot derive a name from {}; pass --name", path.display()))
}

fn kind_label(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Normal => "normal",
        FileKind::Slice => "slice",
    }
}
