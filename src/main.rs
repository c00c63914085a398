use anyhow::{Context, Result};
use b100_tools::at::AtChannel;
use b100_tools::config::Config;
use b100_tools::connection::{AtConnection, SerialAtConnection};
use b100_tools::file_manager::{
    download_directory, download_file, format_directory_listing, list_directory, list_drives,
    send_file,
};
use b100_tools::local_fs::create_directory;
use b100_tools::models::FileEntry;
use b100_tools::phone_book::PhoneBook;
use b100_tools::{mms, sms};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "b100-tools",
    version,
    about = "Retrieve files, SMS and MMS from a CAT B100 phone"
)]
struct Cli {
    /// Serial port the phone is attached to (e.g. /dev/ttyUSB0).
    #[arg(env = "B100_SERIAL_PORT")]
    device: String,

    /// Serial link speed.
    #[arg(long, global = true)]
    baudrate: Option<u32>,

    /// Seconds to wait for one answer line, 0 waits forever.
    #[arg(long, value_name = "SECS", global = true)]
    read_timeout: Option<u64>,

    /// Root directory for retrieved SMS and MMS.
    #[arg(long, value_name = "DIR", global = true)]
    output: Option<PathBuf>,

    /// Skip messages that fail to decode instead of stopping.
    #[arg(long, global = true)]
    keep_going: bool,

    /// Log every AT command and answer.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// List the phone drives.
    ListDrives {
        #[arg(long)]
        json: bool,
    },
    /// List a phone directory.
    ListDirectory {
        path: String,
        #[arg(long)]
        json: bool,
    },
    /// Copy a phone file to the computer.
    GetFile { phone_path: String, pc_path: PathBuf },
    /// Copy a computer file to the phone.
    SendFile { pc_path: PathBuf, phone_path: String },
    /// Copy a phone directory tree to the computer.
    GetDirectory { phone_path: String, pc_path: PathBuf },
    /// Save every MMS attachment.
    GetAllMms,
    /// Save every SMS, grouped by contact.
    GetAllSms,
}

fn build_config(cli: &Cli) -> Config {
    let mut config = Config::load();
    config.serial.port = cli.device.clone();
    if let Some(baudrate) = cli.baudrate {
        config.serial.baudrate = baudrate;
    }
    if let Some(seconds) = cli.read_timeout {
        config.serial.read_timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
    }
    if let Some(output) = &cli.output {
        config.output_directory = output.clone();
    }
    if cli.keep_going {
        config.batch.keep_going = true;
    }
    config
}

fn print_listing(entries: &[FileEntry], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
    } else {
        print!("{}", format_directory_listing(entries));
    }
    Ok(())
}

fn execute(at: &mut AtChannel, command: &Command, config: &Config) -> Result<()> {
    match command {
        Command::ListDrives { json } => {
            let drives = list_drives(at).context("cannot list the phone drives")?;
            print_listing(&drives, *json)?;
        }
        Command::ListDirectory { path, json } => {
            let entries = list_directory(at, path)
                .with_context(|| format!("cannot list the directory \"{path}\""))?;
            print_listing(&entries, *json)?;
        }
        Command::GetFile {
            phone_path,
            pc_path,
        } => {
            download_file(at, phone_path, pc_path)
                .with_context(|| format!("cannot retrieve the file \"{phone_path}\""))?;
            println!("File successfully retrieved.");
        }
        Command::SendFile {
            pc_path,
            phone_path,
        } => {
            send_file(at, pc_path, phone_path, config.transfer.upload_buffer_size)
                .with_context(|| format!("cannot send the file \"{}\"", pc_path.display()))?;
            println!("File successfully sent.");
        }
        Command::GetDirectory {
            phone_path,
            pc_path,
        } => {
            download_directory(at, phone_path, pc_path)
                .with_context(|| format!("cannot retrieve the directory \"{phone_path}\""))?;
            println!("Directory successfully retrieved.");
        }
        Command::GetAllMms => {
            let summary = mms::download_all(at, &config.output_directory, config.batch.keep_going)
                .context("cannot retrieve the MMS")?;
            println!(
                "{} MMS successfully retrieved ({} skipped).",
                summary.saved, summary.skipped
            );
        }
        Command::GetAllSms => {
            let phone_book = PhoneBook::read_all(at, config.phone_book.retry)
                .context("cannot read the phone book")?;
            let count = sms::download_all(
                at,
                &phone_book,
                &config.output_directory,
                config.batch.keep_going,
            )
            .context("cannot retrieve the SMS")?;
            println!("{count} SMS successfully retrieved.");
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli);
    create_directory(&config.output_directory).with_context(|| {
        format!(
            "cannot create the output directory \"{}\"",
            config.output_directory.display()
        )
    })?;

    let mut connection = SerialAtConnection::new(config.serial.port.clone(), config.serial.baudrate);
    connection
        .connect()
        .with_context(|| format!("cannot open the serial port \"{}\"", config.serial.port))?;
    let mut at = AtChannel::new(Box::new(connection), config.serial.read_timeout);

    let result = execute(&mut at, &cli.command, &config);
    if let Err(e) = at.close() {
        warn!("Failed to close the serial port: {}", e);
    }
    result
}

fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    info!("Using serial port {}", cli.device);
    if let Err(e) = run(cli) {
        println!("Error : {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_directory() {
        let cli = Cli::try_parse_from([
            "b100-tools",
            "/dev/ttyUSB0",
            "list-directory",
            "C:\\Photos",
            "--json",
        ])
        .expect("list-directory args should parse");
        assert_eq!(cli.device, "/dev/ttyUSB0");
        assert_eq!(
            cli.command,
            Command::ListDirectory {
                path: "C:\\Photos".into(),
                json: true
            }
        );
    }

    #[test]
    fn parses_transfer_commands() {
        let cli = Cli::try_parse_from(["b100-tools", "COM3", "send-file", "a.jpg", "C:\\a.jpg"])
            .expect("send-file args should parse");
        assert_eq!(
            cli.command,
            Command::SendFile {
                pc_path: PathBuf::from("a.jpg"),
                phone_path: "C:\\a.jpg".into()
            }
        );
        assert!(Cli::try_parse_from(["b100-tools", "COM3", "get-file", "C:\\a.jpg"]).is_err());
    }

    #[test]
    fn global_flags_override_config() {
        let cli = Cli::try_parse_from([
            "b100-tools",
            "--baudrate",
            "9600",
            "--read-timeout",
            "3",
            "/dev/ttyS1",
            "get-all-sms",
            "--output",
            "dump",
            "--keep-going",
        ])
        .expect("flags should parse");
        assert_eq!(cli.command, Command::GetAllSms);

        let config = build_config(&cli);
        assert_eq!(config.serial.port, "/dev/ttyS1");
        assert_eq!(config.serial.baudrate, 9600);
        assert_eq!(config.serial.read_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.output_directory, PathBuf::from("dump"));
        assert!(config.batch.keep_going);
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(Cli::try_parse_from(["b100-tools", "/dev/ttyUSB0", "format-phone"]).is_err());
    }
}
