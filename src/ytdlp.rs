use std::{io::ErrorKind, path::PathBuf, process::Command};

use serde::Deserialize;

use crate::executor::{ExtractError, ExtractOptions, ExtractedInfo, Extractor};

/// Subset of the info JSON printed by `--dump-single-json`. The written path
/// lives on `requested_downloads`, the top-level keys only show up in older
/// releases.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    format: Option<String>,
    #[serde(default)]
    requested_downloads: Vec<YtDlpRequestedDownload>,
    filename: Option<String>,
    #[serde(rename = "_filename")]
    legacy_filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct YtDlpRequestedDownload {
    filepath: Option<String>,
    #[serde(rename = "_filename")]
    filename: Option<String>,
}

#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: PathBuf,
}

impl YtDlp {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Extractor for YtDlp {
    fn extract(&self, url: &str, options: &ExtractOptions) -> Result<ExtractedInfo, ExtractError> {
        let output = Command::new(&self.binary)
            .args(build_args(url, options))
            .env("PYTHONIOENCODING", "utf-8")
            .output()
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    ExtractError::Unexpected(format!(
                        "{} is not installed. Install yt-dlp and restart the backend.",
                        self.binary.display()
                    ))
                } else {
                    ExtractError::Unexpected(format!("Could not run yt-dlp: {error}"))
                }
            })?;

        if !output.status.success() {
            return Err(ExtractError::Download(run_error_message(&output.stderr)));
        }

        parse_info(&output.stdout)
    }
}

fn build_args(url: &str, options: &ExtractOptions) -> Vec<String> {
    let mut args = vec![
        "--dump-single-json".to_string(),
        "--no-simulate".to_string(),
        "--no-playlist".to_string(),
        "-o".to_string(),
        options.output_template.clone(),
        "-f".to_string(),
        options.format.selector.to_string(),
    ];

    if let Some(container) = options.format.merge_output_format {
        args.push("--merge-output-format".to_string());
        args.push(container.to_string());
    }
    if options.quiet {
        args.push("--quiet".to_string());
    }
    if options.no_warnings {
        args.push("--no-warnings".to_string());
    }

    args.push("--".to_string());
    args.push(url.to_string());
    args
}

fn parse_info(stdout: &[u8]) -> Result<ExtractedInfo, ExtractError> {
    let info: Option<YtDlpInfo> = serde_json::from_slice(stdout).map_err(|error| {
        ExtractError::Unexpected(format!("Could not parse yt-dlp output: {error}"))
    })?;
    let info =
        info.ok_or_else(|| ExtractError::Unexpected("Could not extract video info".to_string()))?;

    let requested = info
        .requested_downloads
        .into_iter()
        .next_back()
        .and_then(|download| download.filepath.or(download.filename));
    let filename = requested
        .into_iter()
        .chain(info.filename)
        .chain(info.legacy_filename)
        .find(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            ExtractError::Unexpected("yt-dlp did not report an output filename".to_string())
        })?;

    Ok(ExtractedInfo {
        title: info.title.unwrap_or_default(),
        format: info.format.unwrap_or_default(),
        filename: PathBuf::from(filename),
    })
}

fn run_error_message(stderr: &[u8]) -> String {
    let message = String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp could not complete the download")
        .to_string();

    message
        .strip_prefix("ERROR: ")
        .map(ToString::to_string)
        .unwrap_or(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::format_options;

    fn options(keyword: &str) -> ExtractOptions {
        ExtractOptions {
            output_template: "/dl/%(title)s.%(ext)s".to_string(),
            format: format_options(keyword),
            quiet: true,
            no_warnings: true,
        }
    }

    #[test]
    fn args_carry_merge_format_for_composite_presets() {
        let args = build_args("https://youtu.be/abc", &options("best"));
        let merge = args
            .iter()
            .position(|arg| arg == "--merge-output-format")
            .expect("merge flag");
        assert_eq!(args[merge + 1], "mp4");
        assert!(args.contains(&"--quiet".to_string()));
        assert!(args.contains(&"--no-warnings".to_string()));
    }

    #[test]
    fn args_omit_merge_format_for_single_stream_presets() {
        let args = build_args("https://youtu.be/abc", &options("webm"));
        assert!(!args.contains(&"--merge-output-format".to_string()));
        let selector = args.iter().position(|arg| arg == "-f").unwrap();
        assert_eq!(
            args[selector + 1],
            "bestvideo[ext=webm]+bestaudio[ext=webm]/best[ext=webm]"
        );
    }

    #[test]
    fn url_is_passed_after_option_terminator() {
        let args = build_args("--exec=rm youtube.com", &options("best"));
        let len = args.len();
        assert_eq!(args[len - 2], "--");
        assert_eq!(args[len - 1], "--exec=rm youtube.com");
    }

    #[test]
    fn parses_info_json() {
        let stdout = br#"{"title":"Test Video","format":"243 - 640x360","filename":"/dl/Test Video.webm","ext":"webm"}"#;
        let info = parse_info(stdout).unwrap();
        assert_eq!(info.title, "Test Video");
        assert_eq!(info.format, "243 - 640x360");
        assert_eq!(info.filename, PathBuf::from("/dl/Test Video.webm"));
    }

    #[test]
    fn reads_final_path_from_requested_downloads() {
        let stdout = br#"{
            "id": "abc123",
            "title": "Test Video",
            "ext": "mp4",
            "format": "137 - 1920x1080 (1080p)+140 - audio only (medium)",
            "format_id": "137+140",
            "requested_formats": [
                {"format_id": "137", "ext": "mp4"},
                {"format_id": "140", "ext": "m4a"}
            ],
            "requested_downloads": [
                {
                    "format_id": "137+140",
                    "ext": "mp4",
                    "filepath": "/dl/Test Video.mp4",
                    "_filename": "/dl/Test Video.f137.mp4",
                    "__finaldir": "/dl"
                }
            ]
        }"#;
        let info = parse_info(stdout).unwrap();
        assert_eq!(info.title, "Test Video");
        assert_eq!(info.filename, PathBuf::from("/dl/Test Video.mp4"));
    }

    #[test]
    fn requested_download_without_filepath_uses_its_filename() {
        let stdout = br#"{"title":"A","requested_downloads":[{"_filename":"/dl/A.webm"}]}"#;
        let info = parse_info(stdout).unwrap();
        assert_eq!(info.filename, PathBuf::from("/dl/A.webm"));
    }

    #[test]
    fn missing_filename_everywhere_is_unexpected() {
        let error = parse_info(br#"{"title":"A","requested_downloads":[]}"#).unwrap_err();
        assert_eq!(
            error,
            ExtractError::Unexpected("yt-dlp did not report an output filename".to_string())
        );
    }

    #[test]
    fn falls_back_to_legacy_filename_key() {
        let stdout = br#"{"title":"A","_filename":"/dl/A.mp4"}"#;
        let info = parse_info(stdout).unwrap();
        assert_eq!(info.filename, PathBuf::from("/dl/A.mp4"));
        assert_eq!(info.format, "");
    }

    #[test]
    fn null_info_is_unexpected() {
        let error = parse_info(b"null").unwrap_err();
        assert_eq!(
            error,
            ExtractError::Unexpected("Could not extract video info".to_string())
        );
    }

    #[test]
    fn garbage_output_is_unexpected() {
        let error = parse_info(b"[download] 100%").unwrap_err();
        assert!(matches!(error, ExtractError::Unexpected(_)));
    }

    #[test]
    fn error_message_uses_last_stderr_line() {
        let stderr = b"WARNING: something\nERROR: [youtube] abc: Video unavailable\n\n";
        assert_eq!(
            run_error_message(stderr),
            "[youtube] abc: Video unavailable"
        );
        assert_eq!(
            run_error_message(b""),
            "yt-dlp could not complete the download"
        );
    }

    #[test]
    fn missing_binary_is_unexpected() {
        let extractor = YtDlp::new("/nonexistent/yt-dlp-binary");
        let error = extractor
            .extract("https://youtu.be/abc", &options("best"))
            .unwrap_err();
        match error {
            ExtractError::Unexpected(message) => assert!(message.contains("not installed")),
            other => panic!("unexpected error kind: {other:?}"),
        }
    }
}
