use std::io;
use std::sync::Once;

use tracing::Level;
use tracing_appender::rolling;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Guards the process-wide subscriber install: the only
/// legitimate process-wide state in this crate besides the TLS trust-store
/// singleton in `mapi::tls`.
static INIT: Once = Once::new();

#[derive(Debug, Clone, Default)]
pub struct TracingFactory {
    options: TracingFactoryOptions,
}

#[derive(Debug, Clone)]
pub struct TracingFactoryOptions {
    debug: bool,
    output_type: OutputType,
    level: Option<Level>,
    log_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub enum OutputType {
    Stdout,
    Log,
}

impl TracingFactory {
    pub fn init_log(debug: bool) -> Self {
        TracingFactory::init_log_with_options(TracingFactoryOptions::new_with_debug(debug))
    }

    pub fn init_log_with_options(opt: TracingFactoryOptions) -> Self {
        let mut opts = opt.clone();

        let dir = match &opts.log_dir {
            None => {
                let path = String::from("/tmp/mapi/logs");
                opts.log_dir = Some(path.clone());
                path
            }
            Some(dir) => dir.clone(),
        };

        let level = opts.level.unwrap_or(Level::INFO);

        INIT.call_once(|| {
            let format = fmt::format()
                .pretty()
                .with_file(true)
                .with_line_number(false)
                .with_target(false)
                .with_thread_ids(true)
                .with_thread_names(true)
                .compact();

            match opts.output_type {
                OutputType::Stdout => {
                    let _ = tracing_subscriber::fmt()
                        .with_max_level(level)
                        .event_format(format)
                        .pretty()
                        .try_init();
                }
                OutputType::Log => {
                    let file_appender =
                        rolling::daily(format!("{}/mapi", dir.as_str()), "session.log");
                    let merge = file_appender.and(io::stdout);

                    let _ = tracing_subscriber::fmt()
                        .with_max_level(level)
                        .event_format(format)
                        .pretty()
                        .with_writer(merge)
                        .try_init();
                }
            };
        });

        TracingFactory { options: opts }
    }

    pub fn get_log_dir(&self) -> &str {
        self.options.get_log_dir()
    }
}

impl Default for TracingFactoryOptions {
    fn default() -> Self {
        TracingFactoryOptions::new_with_debug(true)
    }
}

impl Default for OutputType {
    fn default() -> Self {
        OutputType::Stdout
    }
}

impl TracingFactoryOptions {
    pub fn new_with_debug(debug: bool) -> Self {
        TracingFactoryOptions::new_with_type(debug, OutputType::Stdout)
    }

    pub fn new_with_type(debug: bool, output_type: OutputType) -> Self {
        TracingFactoryOptions::new(debug, output_type, None)
    }

    pub fn new(debug: bool, output_type: OutputType, log_dir: Option<String>) -> Self {
        let level = if debug { Level::DEBUG } else { Level::INFO };
        TracingFactoryOptions {
            debug,
            output_type,
            level: Some(level),
            log_dir,
        }
    }

    pub fn get_log_dir(&self) -> &str {
        match &self.log_dir {
            None => "",
            Some(dir) => dir.as_str(),
        }
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }
}

#[cfg(test)]
mod test {
    use tracing::{debug, error, info, warn};

    use super::TracingFactory;

    #[test]
    fn init_log_is_idempotent() {
        TracingFactory::init_log(true);
        TracingFactory::init_log(true);

        debug!("tracing factory test: {:?}", "test");
        info!("tracing factory test: {:?}", "test");
        warn!("tracing factory test: {:?}", "test");
        error!("tracing factory test: {:?}", "test");
    }
}
