use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Writes every record to stderr and, when available, to the daily log file.
struct TeeWriter {
    file: Option<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            // File write errors are dropped; stderr already has the record
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
        Ok(())
    }
}

/// `<logs_dir>/<component>_YYYYMMDD.log`
pub fn log_file_path(logs_dir: &Path, component: &str) -> PathBuf {
    logs_dir.join(format!(
        "{}_{}.log",
        component,
        chrono::Local::now().format("%Y%m%d")
    ))
}

/// Initialize env_logger (default level `info`, `RUST_LOG` overrides) teeing
/// to stderr and the component's daily log file.
pub fn init_logging(component: &str, logs_dir: &Path) {
    let path = log_file_path(logs_dir, component);
    let file = std::fs::create_dir_all(logs_dir)
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));

    let (file, open_error) = match file {
        Ok(file) => (Some(file), None),
        Err(e) => (None, Some(e)),
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })))
        .init();

    if let Some(e) = open_error {
        log::warn!("Could not open log file {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        let path = log_file_path(Path::new("logs"), "scheduler");
        let name = path.file_name().unwrap().to_string_lossy().to_string();

        assert!(name.starts_with("scheduler_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "scheduler_YYYYMMDD.log".len());
    }

    #[test]
    fn test_tee_writer_appends_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.log");
        let file = OpenOptions::new().create(true).append(true).open(&path).unwrap();

        let mut writer = TeeWriter { file: Some(file) };
        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\n");
    }
}
