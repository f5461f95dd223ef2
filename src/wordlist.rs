use std::path::PathBuf;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

pub const EXT_MARKER: &str = "%EXT%";

#[derive(Clone, Debug)]
pub enum WordlistSource {
    FilePath(PathBuf),
    Inline(Vec<String>),
}

#[derive(Debug, Error)]
pub enum WordlistError {
    #[error("failed to open wordlist: {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read wordlist: {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// expands one wordlist line into the paths it stands for. blank lines yield
// nothing, a line with `%EXT%` yields one path per extension.
pub fn expand_line(line: &str, extensions: &[String]) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    if !line.contains(EXT_MARKER) {
        return vec![line.to_string()];
    }
    extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.'))
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            line.replace(&format!(".{EXT_MARKER}"), &format!(".{ext}"))
                .replace(EXT_MARKER, &format!(".{ext}"))
        })
        .collect()
}

// a restartable, lazily read job source. `count_jobs` and `lines` go through
// the same expansion so the two always agree.
impl WordlistSource {
    pub fn describe(&self) -> String {
        match self {
            Self::FilePath(path) => path.display().to_string(),
            Self::Inline(words) => format!("<{} inline entries>", words.len()),
        }
    }

    pub async fn count_jobs(&self, extensions: &[String]) -> Result<u64, WordlistError> {
        let mut lines = self.lines().await?;
        let mut total = 0u64;
        while let Some(line) = lines.next_line().await? {
            total += expand_line(&line, extensions).len() as u64;
        }
        Ok(total)
    }

    pub async fn lines(&self) -> Result<WordlistLines, WordlistError> {
        match self {
            Self::Inline(words) => Ok(WordlistLines::Inline(words.clone().into_iter())),
            Self::FilePath(path) => {
                let handle = File::open(path).await.map_err(|e| WordlistError::Open {
                    path: path.display().to_string(),
                    source: e,
                })?;
                Ok(WordlistLines::File {
                    path: path.clone(),
                    lines: BufReader::new(handle).lines(),
                })
            }
        }
    }
}

pub enum WordlistLines {
    Inline(std::vec::IntoIter<String>),
    File {
        path: PathBuf,
        lines: Lines<BufReader<File>>,
    },
}

impl WordlistLines {
    pub async fn next_line(&mut self) -> Result<Option<String>, WordlistError> {
        match self {
            Self::Inline(words) => Ok(words.next()),
            Self::File { path, lines } => lines.next_line().await.map_err(|e| WordlistError::Read {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn exts(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dotted_marker_takes_the_bare_extension() {
        assert_eq!(
            expand_line("file.%EXT%", &exts(&["php", "txt"])),
            vec!["file.php".to_string(), "file.txt".to_string()]
        );
    }

    #[test]
    fn bare_marker_gets_a_dot() {
        assert_eq!(
            expand_line("backup%EXT%", &exts(&["zip"])),
            vec!["backup.zip".to_string()]
        );
    }

    #[test]
    fn leading_dots_in_extensions_are_ignored() {
        assert_eq!(
            expand_line("index.%EXT%", &exts(&[".html"])),
            vec!["index.html".to_string()]
        );
    }

    #[test]
    fn plain_and_blank_lines() {
        assert_eq!(expand_line("  admin  ", &exts(&["php"])), vec!["admin".to_string()]);
        assert!(expand_line("   ", &exts(&["php"])).is_empty());
        assert!(expand_line("x.%EXT%", &[]).is_empty());
    }

    #[tokio::test]
    async fn count_matches_streamed_expansion() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a\n\nfile.%EXT%\n  admin/  \n%EXT%").unwrap();
        let source = WordlistSource::FilePath(file.path().to_path_buf());
        let extensions = exts(&["php", "txt"]);

        let mut streamed = Vec::new();
        let mut lines = source.lines().await.unwrap();
        while let Some(line) = lines.next_line().await.unwrap() {
            streamed.extend(expand_line(&line, &extensions));
        }
        assert_eq!(
            source.count_jobs(&extensions).await.unwrap(),
            streamed.len() as u64
        );
        assert_eq!(
            streamed,
            vec!["a", "file.php", "file.txt", "admin/", ".php", ".txt"]
        );
    }

    #[tokio::test]
    async fn missing_file_fails_to_open() {
        let source = WordlistSource::FilePath(PathBuf::from("/nonexistent/words.txt"));
        assert!(matches!(
            source.count_jobs(&[]).await,
            Err(WordlistError::Open { .. })
        ));
    }
}
