//! Log output for the binaries.

use log::LevelFilter;

const TIMESTAMP_FORMAT: &str = "%H:%M:%S%.3f";

/// Installs a global logger writing to standard error. Each repetition of
/// `-v` lowers the threshold by one level, starting from `warn`.
pub fn setup(verbosity: u64) -> Result<(), log::SetLoggerError> {
    let level = match verbosity {
    | 0 => LevelFilter::Warn,
    | 1 => LevelFilter::Info,
    | 2 => LevelFilter::Debug,
    | _ => LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format(TIMESTAMP_FORMAT),
                record.level(),
                record.target(),
                message,
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
}
