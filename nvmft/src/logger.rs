use std::{io::Write, path::Path};

use env_logger::{Builder, Env};

fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

/// Sets up the console logger. The default filter only enables records
/// from this crate, so `init("TRACE")` behaves like `RUST_LOG=nvmft=TRACE`;
/// a RUST_LOG set in the environment still takes precedence.
pub fn init(level: &str) {
    let filter = format!("nvmft={}", level);
    let mut builder =
        Builder::from_env(Env::default().default_filter_or(filter));

    builder.format(|buf, record| {
        let mut level_style = buf.default_level_style(record.level());
        level_style.set_intense(true);
        // records carry their source location, fall back to the target of
        // the logger for the few that do not
        let location = match (record.file(), record.line()) {
            (Some(file), Some(line)) => format!("{}:{}", basename(file), line),
            _ => record.target().to_string(),
        };
        writeln!(
            buf,
            "[{} {} {} {}] {}",
            buf.timestamp_nanos(),
            level_style.value(record.level()),
            record.target(),
            location,
            record.args()
        )
    });
    builder.init();
}
