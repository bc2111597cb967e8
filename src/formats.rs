pub const DEFAULT_FORMAT: &str = "best";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    pub selector: &'static str,
    pub merge_output_format: Option<&'static str>,
}

const FORMAT_PRESETS: [(&str, FormatOptions); 6] = [
    (
        "best",
        FormatOptions {
            selector: "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best",
            merge_output_format: Some("mp4"),
        },
    ),
    (
        "bestvideo+bestaudio",
        FormatOptions {
            selector: "bestvideo+bestaudio/best",
            merge_output_format: Some("mp4"),
        },
    ),
    (
        "bestvideo",
        FormatOptions {
            selector: "bestvideo",
            merge_output_format: None,
        },
    ),
    (
        "bestaudio",
        FormatOptions {
            selector: "bestaudio",
            merge_output_format: None,
        },
    ),
    (
        "mp4",
        FormatOptions {
            selector: "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]",
            merge_output_format: Some("mp4"),
        },
    ),
    (
        "webm",
        FormatOptions {
            selector: "bestvideo[ext=webm]+bestaudio[ext=webm]/best[ext=webm]",
            merge_output_format: None,
        },
    ),
];

/// Unknown keywords resolve to the `best` preset.
pub fn format_options(keyword: &str) -> FormatOptions {
    FORMAT_PRESETS
        .iter()
        .find(|(name, _)| *name == keyword)
        .or_else(|| FORMAT_PRESETS.iter().find(|(name, _)| *name == DEFAULT_FORMAT))
        .map(|(_, options)| *options)
        .unwrap_or(FORMAT_PRESETS[0].1)
}

pub fn default_format() -> String {
    DEFAULT_FORMAT.to_string()
}
