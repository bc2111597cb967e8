use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info, warn};

use crate::formats::{FormatOptions, format_options};

const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
const MERGED_EXTENSION: &str = "mp4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub output_template: String,
    pub format: FormatOptions,
    pub quiet: bool,
    pub no_warnings: bool,
}

#[derive(Debug, Clone)]
pub struct ExtractedInfo {
    pub title: String,
    pub format: String,
    /// Where the tool says it wrote the file; merging may still change the
    /// extension.
    pub filename: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    Download(String),
    Unexpected(String),
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download(message) => write!(f, "Download error: {message}"),
            Self::Unexpected(message) => f.write_str(message),
        }
    }
}

pub trait Extractor: Send + Sync + 'static {
    fn extract(&self, url: &str, options: &ExtractOptions) -> Result<ExtractedInfo, ExtractError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedDownload {
    pub title: String,
    pub filename: String,
    pub format: String,
    pub size: Option<String>,
}

pub type DownloadOutcome = Result<CompletedDownload, String>;

#[derive(Clone)]
pub struct DownloadExecutor {
    extractor: Arc<dyn Extractor>,
    download_dir: PathBuf,
}

impl DownloadExecutor {
    pub fn new(extractor: Arc<dyn Extractor>, download_dir: PathBuf) -> Self {
        Self {
            extractor,
            download_dir,
        }
    }

    pub fn options_for(&self, format_keyword: &str) -> ExtractOptions {
        ExtractOptions {
            output_template: self
                .download_dir
                .join(OUTPUT_TEMPLATE)
                .to_string_lossy()
                .into_owned(),
            format: format_options(format_keyword),
            quiet: true,
            no_warnings: true,
        }
    }

    pub async fn execute(&self, url: &str, format_keyword: &str) -> DownloadOutcome {
        let options = self.options_for(format_keyword);
        let extractor = Arc::clone(&self.extractor);
        let owned_url = url.to_string();

        debug!(
            "Dispatching extraction url={:?} selector={:?}",
            url, options.format.selector
        );
        let joined = tokio::task::spawn_blocking(move || {
            download_blocking(extractor.as_ref(), &owned_url, &options)
        })
        .await;

        match joined {
            Ok(Ok(completed)) => {
                info!(
                    "Download finished url={:?} file={:?} size={:?}",
                    url, completed.filename, completed.size
                );
                Ok(completed)
            }
            Ok(Err(error)) => {
                warn!("Download failed url={:?}: {error}", url);
                Err(error)
            }
            Err(error) => {
                warn!("Download worker for {:?} did not complete: {error}", url);
                Err(format!("Download worker failed: {error}"))
            }
        }
    }
}

fn download_blocking(
    extractor: &dyn Extractor,
    url: &str,
    options: &ExtractOptions,
) -> DownloadOutcome {
    let info = extractor
        .extract(url, options)
        .map_err(|error| error.to_string())?;

    let (path, size) = locate_output(&info.filename);
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| format!("Extractor reported an unusable output path: {}", path.display()))?;

    Ok(CompletedDownload {
        title: info.title,
        filename,
        format: info.format,
        size: size.map(format_bytes),
    })
}

/// Merging may rewrite the extension, so a missing prepared path is retried
/// once as `.mp4`. When neither exists the prepared path is kept without a
/// size.
fn locate_output(prepared: &Path) -> (PathBuf, Option<u64>) {
    if let Ok(metadata) = std::fs::metadata(prepared) {
        return (prepared.to_path_buf(), Some(metadata.len()));
    }

    let merged = prepared.with_extension(MERGED_EXTENSION);
    if let Ok(metadata) = std::fs::metadata(&merged) {
        return (merged, Some(metadata.len()));
    }

    warn!("Output file {:?} not found after download", prepared);
    (prepared.to_path_buf(), None)
}

pub fn format_bytes(size: u64) -> String {
    let mut value = size as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} PB")
}
