use std::io::Write;
use std::process::ExitCode;

use framecast::config::DEFAULT_PORT;
use framecast::{
    JpegCodec, PatternCamera, QrScanner, Receiver, ReceiverConfig, RqrrDetector, Shutdown,
    TerminalDisplay, Transmitter, TransmitterConfig,
};

#[derive(clap::Parser)]
#[command(name = "framecast")]
#[command(about = "Stream camera frames over TCP and scan them for QR codes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Accept one client and stream camera frames to it
    Server {
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Connect to a server, show frames and report QR codes
    Client {
        /// Server IP address
        ip: String,
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

fn main() -> ExitCode {
    let cli: Cli = clap::Parser::parse();

    // The client holds the terminal in raw mode, so end lines with CR LF
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            write!(
                buf,
                "[{}] {} - {}\r\n",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let result = Shutdown::install().and_then(|shutdown| match cli.command {
        Commands::Server { port } => run_server(port, &shutdown),
        Commands::Client { ip, port } => run_client(&ip, port, &shutdown),
    });

    // Only setup failures get here as errors; session endings return Ok
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_server(port: u16, shutdown: &Shutdown) -> framecast::Result<()> {
    let config = TransmitterConfig::on_port(port);
    let (width, height) = (config.width, config.height);
    let mut codec = JpegCodec::new(config.jpeg_quality);

    let transmitter = Transmitter::bind(config)?;
    let summary = transmitter.run(|| PatternCamera::open(width, height), &mut codec, shutdown)?;
    if summary.end.is_failure() {
        log::error!("Stream stopped early: {:?}", summary.end);
    }
    Ok(())
}

fn run_client(ip: &str, port: u16, shutdown: &Shutdown) -> framecast::Result<()> {
    let config = ReceiverConfig::new(ip, port);
    let receiver = Receiver::connect(&config)?;

    let mut display = TerminalDisplay::new()?;
    let summary = receiver.run(
        &mut JpegCodec::default(),
        &mut QrScanner::new(RqrrDetector),
        &mut display,
        shutdown,
    );
    if summary.end.is_failure() {
        log::error!("Stream stopped early: {:?}", summary.end);
    }
    Ok(())
}
