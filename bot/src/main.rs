use bot::auth::{acquire_token, FileTokenStore};
use bot::config::{SessionConfig, DEFAULT_LOCALE, DEFAULT_SERVER};
use bot::lang::{LangTable, Passthrough, Translator};
use bot::session::{interrupt_signal, Session};
use bot::tcp::TcpConnector;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = DEFAULT_SERVER)]
    server: String,

    /// Locale used to translate server messages
    #[arg(short = 'l', long, default_value = DEFAULT_LOCALE)]
    locale: String,

    /// Where the access token is cached
    #[arg(short = 't', long, default_value = "token.json")]
    token_file: PathBuf,

    /// JSON language table ({"locale": {"key": "text"}})
    #[arg(long)]
    lang_file: Option<PathBuf>,

    /// Delay between connection attempts in milliseconds
    #[arg(long, default_value = "1000")]
    retry_delay_ms: u64,

    /// How long to wait for the event loop to accept a shutdown, in seconds
    #[arg(long, default_value = "5")]
    shutdown_timeout_secs: u64,
}

impl Args {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            server_address: self.server.clone(),
            locale: self.locale.clone(),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            ..SessionConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.session_config();

    info!("Loading token");
    let store = FileTokenStore::new(args.token_file.clone());
    let token = match acquire_token(&store, BufReader::new(tokio::io::stdin())).await {
        Ok(token) => token,
        Err(e) => {
            error!("Error getting token: {}", e);
            return Err(e.into());
        }
    };

    let translator: Arc<dyn Translator> = match &args.lang_file {
        Some(path) => Arc::new(LangTable::from_file(path)?),
        None => Arc::new(Passthrough),
    };

    let session = Session::new(
        TcpConnector::new(config.handshake_timeout),
        config,
        translator,
        token,
    );

    match session.run_until(interrupt_signal()).await {
        Ok(report) => {
            info!(
                "Session ended after {} messages, {} entities in view",
                report.messages_dispatched, report.entities_visible
            );
            Ok(())
        }
        Err(e) => {
            error!("Session failed: {}", e);
            Err(e.into())
        }
    }
}
