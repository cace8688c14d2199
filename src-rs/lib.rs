#![deny(clippy::all)]

pub mod cons;
pub mod config;
pub mod llm;


use std::sync::Once;

pub use crate::cons::provider_cons::Provider;
pub use crate::llm::models::provider_base::{Message, Model, ProviderClient, Response, Role, TokenUsage};
pub use crate::llm::models::provider_handle::LlmManager;
pub use crate::llm::utils::transport::{HttpReply, HttpRequest, HttpTransport, ReqwestTransport};

static INIT: Once = Once::new();

pub fn init_logger() {
    INIT.call_once(|| {
        use log::LevelFilter;
        use log4rs::append::file::FileAppender;
        use log4rs::config::{Appender, Config, Root};
        use log4rs::encode::pattern::PatternEncoder;

        // An explicit log4rs file wins over the built-in file appender
        let config_path = std::env::var("LOG4RS_CONFIG").unwrap_or_else(|_| "log4rs.yaml".to_string());
        let _ = std::fs::create_dir_all("logs");
        if log4rs::init_file(&config_path, Default::default()).is_ok() {
            log::info!("Logger initialized from {}", config_path);
            return;
        }

        let pattern = "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}\n";

        let logfile = match FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(pattern)))
            .build("logs/ida-re-llm.log")
        {
            Ok(f) => f,
            Err(e) => {
                eprintln!("[INIT] Failed to create log file: {}", e);
                return;
            }
        };

        let config = match Config::builder()
            .appender(Appender::builder().build("logfile", Box::new(logfile)))
            .build(Root::builder().appender("logfile").build(LevelFilter::Debug))
        {
            Ok(c) => c,
            Err(e) => {
                eprintln!("[INIT] Failed to build logger config: {}", e);
                return;
            }
        };

        if let Err(e) = log4rs::init_config(config) {
            eprintln!("[INIT] Failed to initialize logger: {}", e);
        }
    });
}

/// Loads the user configuration and builds a manager wired to it.
pub fn manager_from_config() -> anyhow::Result<LlmManager> {
    let cfg = config::AppConfig::load()?;
    let manager = LlmManager::new();
    cfg.apply_to(&manager);
    Ok(manager)
}
