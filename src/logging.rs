//! Logger setup: `log4rs.yml` when present, a console appender otherwise.

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::error::Error;
use std::path::Path;

pub const LOG_CONFIG_PATH: &str = "log4rs.yml";

const CONSOLE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}";

pub fn init() -> Result<(), Box<dyn Error>> {
    if Path::new(LOG_CONFIG_PATH).exists() {
        log4rs::init_file(LOG_CONFIG_PATH, Default::default())?;
    } else {
        log4rs::init_config(console_config(LevelFilter::Info)?)?;
    }
    Ok(())
}

fn console_config(level: LevelFilter) -> Result<Config, log4rs::config::runtime::ConfigErrors> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .build();

    Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .logger(Logger::builder().build("headless_chrome", LevelFilter::Warn))
        .logger(Logger::builder().build("tungstenite", LevelFilter::Warn))
        .build(Root::builder().appender("stdout").build(level))
}
