/*!
Utilitaires fichiers et logging pour les tests du kernel
*/

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_subscriber::EnvFilter;

pub const HOSTS_FILE_NAME: &str = "hosts.txt";

/// Écrit (ou réécrit) `dir/hosts.txt`, une entrée par ligne
pub fn write_hosts_file(dir: &Path, lines: &[&str]) -> PathBuf {
    let path = dir.join(HOSTS_FILE_NAME);
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(&path, content).unwrap_or_else(|e| panic!("cannot write {}: {e}", path.display()));
    path
}

/// Force la date de modification à maintenant + `offset`
/// (deux écritures rapprochées peuvent sinon partager la même mtime)
pub fn touch(path: &Path, offset: Duration) {
    let file = File::options()
        .write(true)
        .open(path)
        .unwrap_or_else(|e| panic!("cannot open {}: {e}", path.display()));
    file.set_modified(SystemTime::now() + offset)
        .unwrap_or_else(|e| panic!("cannot set mtime on {}: {e}", path.display()));
}

/// Logs capturés par le harness de test, RUST_LOG respecté. Idempotent.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_hosts_file_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        write_hosts_file(dir.path(), &["http://a:19999|a", "http://b:19999|b"]);
        let path = write_hosts_file(dir.path(), &["# only one", "http://c:19999"]);

        assert_eq!(path, dir.path().join("hosts.txt"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "# only one\nhttp://c:19999\n");
    }

    #[test]
    fn test_touch_moves_mtime_forward() {
        init_test_tracing();
        let dir = tempfile::tempdir().unwrap();
        let path = write_hosts_file(dir.path(), &["http://a:19999"]);
        let before = fs::metadata(&path).unwrap().modified().unwrap();

        touch(&path, Duration::from_secs(60));
        let after = fs::metadata(&path).unwrap().modified().unwrap();
        assert!(after > before);
    }
}
