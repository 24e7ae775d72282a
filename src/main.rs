use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, prelude::*};

mod api;
mod carousel;
mod columns;
mod controller;
mod domain;
mod fetch;
mod inputter;
mod locale;
mod model;
mod session;
mod table;
mod ui;

use controller::Controller;
use domain::{AppConfig, DEFAULT_API_URL, PharmError};
use locale::Language;
use model::{Model, Status};
use session::DEFAULT_TOKEN_FILE;

#[derive(Parser, Debug)]
#[command(version, about = "Browse and administer the pharma site from the terminal")]
struct Args {
    /// Base url of the REST api
    #[arg(long, env = "PHARMTV_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Display language: uz, ru or en
    #[arg(long, env = "PHARMTV_LANG", default_value = "uz", value_parser = parse_language)]
    lang: Language,

    /// Where the login token is kept between runs
    #[arg(long, env = "PHARMTV_TOKEN_FILE", default_value = DEFAULT_TOKEN_FILE)]
    token_file: String,

    /// Keep the session in memory only
    #[arg(long)]
    no_token_file: bool,

    /// Log file, filtered by PHARMTV_LOG
    #[arg(long, env = "PHARMTV_LOG_FILE", default_value = "pharmtv.log")]
    log_file: PathBuf,

    #[arg(long, default_value_t = table::DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Hero carousel interval in milliseconds
    #[arg(long, default_value_t = carousel::AUTOPLAY_INTERVAL.as_millis() as u64)]
    autoplay_ms: u64,

    /// Directory database backups are downloaded to
    #[arg(long, default_value = ".")]
    download_dir: PathBuf,
}

fn parse_language(code: &str) -> Result<Language, String> {
    Language::parse(code).ok_or_else(|| format!("unknown language `{code}`, use uz, ru or en"))
}

impl Args {
    fn config(&self) -> AppConfig {
        AppConfig {
            api_url: self.api_url.clone(),
            language: self.lang,
            page_size: self.page_size,
            autoplay_interval: Duration::from_millis(self.autoplay_ms),
            token_file: (!self.no_token_file).then(|| self.token_file.clone()),
            download_dir: self.download_dir.clone(),
            ..AppConfig::default()
        }
    }
}

fn init_logging(path: &PathBuf) -> Result<(), PharmError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let filter = EnvFilter::try_from_env("PHARMTV_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_thread_names(true),
        )
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|e| PharmError::Logging(e.to_string()))
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(&args.log_file) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    let mut terminal = ratatui::init();
    let result = run(&args.config(), &mut terminal);
    ratatui::restore();

    match result {
        Err(e) => {
            error!("Exiting with error: {e:?}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run(cfg: &AppConfig, terminal: &mut ratatui::DefaultTerminal) -> Result<(), PharmError> {
    info!("Starting pharmtv against {}", cfg.api_url);

    let mut model = Model::init(cfg)?;
    let controller = Controller::new(cfg);

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui::draw(&model, f))?;

        // Handle events and map to a Message
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }

    info!("Bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_site() {
        // pass every env backed option so PHARMTV_* in the shell cannot leak in
        let args = Args::parse_from([
            "pharmtv",
            "--api-url",
            DEFAULT_API_URL,
            "--lang",
            "uz",
            "--token-file",
            DEFAULT_TOKEN_FILE,
            "--log-file",
            "pharmtv.log",
        ]);
        let cfg = args.config();
        assert_eq!(cfg.page_size, 10);
        assert_eq!(cfg.autoplay_interval, Duration::from_millis(5000));
        assert_eq!(cfg.download_dir, PathBuf::from("."));
        assert_eq!(cfg.token_file.as_deref(), Some(DEFAULT_TOKEN_FILE));
        assert_eq!(cfg.language, Language::Uz);
    }

    #[test]
    fn flags_override() {
        let args = Args::parse_from([
            "pharmtv",
            "--lang",
            "ru",
            "--no-token-file",
            "--api-url",
            "http://api.test",
        ]);
        let cfg = args.config();
        assert_eq!(cfg.language, Language::Ru);
        assert_eq!(cfg.token_file, None);
        assert_eq!(cfg.api_url, "http://api.test");
        assert!(Args::try_parse_from(["pharmtv", "--lang", "de"]).is_err());
    }
}
