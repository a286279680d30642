//! Banner file handling.

use std::{fs, path::Path};

/// Largest banner file honored, in bytes.
const BANNER_MAX_SIZE: u64 = 1024 * 1024;

/// Read the banner text, `None` on any size, I/O or encoding problem.
pub(crate) fn read(path: &Path) -> Option<String> {
    let metadata = fs::metadata(path).ok()?;

    let size = metadata.len();
    if !metadata.is_file() || size == 0 || size > BANNER_MAX_SIZE {
        tracing::debug!("Banner file `{}` unusable, suppressed", path.display());

        return None;
    }

    let data = fs::read(path).ok()?;
    if data.len() as u64 != size {
        return None;
    }

    String::from_utf8(data).ok()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    struct Scratch(PathBuf);

    impl Scratch {
        fn with(name: &str, contents: &[u8]) -> Self {
            let path = std::env::temp_dir().join(format!("banner-{}-{name}", std::process::id()));
            fs::write(&path, contents).expect("writable temp dir");

            Self(path)
        }
    }

    impl Drop for Scratch {
        fn drop(&mut self) {
            fs::remove_file(&self.0).ok();
        }
    }

    #[test]
    fn reads_a_small_banner() {
        let file = Scratch::with("small", b"mind the gap\r\n");

        assert_eq!(read(&file.0).as_deref(), Some("mind the gap\r\n"));
    }

    #[test]
    fn suppresses_an_empty_banner() {
        let file = Scratch::with("empty", b"");

        assert_eq!(read(&file.0), None);
    }

    #[test]
    fn honors_a_banner_at_the_size_cap() {
        let file = Scratch::with("cap", &vec![b'a'; 1024 * 1024]);

        assert_eq!(read(&file.0).map(|banner| banner.len()), Some(1024 * 1024));
    }

    #[test]
    fn suppresses_a_banner_over_the_size_cap() {
        let file = Scratch::with("over", &vec![b'a'; 1024 * 1024 + 1]);

        assert_eq!(read(&file.0), None);
    }

    #[test]
    fn suppresses_a_missing_banner() {
        assert_eq!(read(Path::new("/nonexistent/banner")), None);
    }
}
