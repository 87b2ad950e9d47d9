//! Parser for yt-dlp console output

use super::traits::FetchProgress;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Prefix of the progress lines requested with `--progress-template`
pub(crate) const PROGRESS_MARKER: &str = "[bili-progress]";

/// Prefix of the final-path line requested with `--print after_move:`
pub(crate) const OUTPUT_MARKER: &str = "[bili-output]";

/// `--progress-template` value producing `[bili-progress] 42.0%|1.2MiB/s|00:03`
pub(crate) fn progress_template() -> String {
    format!(
        "download:{PROGRESS_MARKER} %(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s"
    )
}

/// `--print` value producing `[bili-output] /path/to/file.mp3` once post-processing moved the file
pub(crate) fn output_template() -> String {
    format!("after_move:{OUTPUT_MARKER} %(filepath)s")
}

static DOWNLOAD_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\[download\]\s+([\d.]+)%(?:.*?\bat\s+(\S+))?(?:.*?\bETA\s+(\S+))?").ok()
});

static ANSI_ESCAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").ok());

/// A line of yt-dlp output the fetcher cares about
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OutputLine {
    /// Download progress
    Progress(FetchProgress),
    /// Final location of the transcoded file
    FinalPath(PathBuf),
}

/// Classify one line of output; anything unrecognized yields `None`
pub(crate) fn parse_line(raw: &str) -> Option<OutputLine> {
    let cleaned = strip_ansi(raw);
    let line = cleaned.trim();

    if let Some(rest) = line.strip_prefix(OUTPUT_MARKER) {
        let path = rest.trim();
        return (!path.is_empty() && path != "NA").then(|| OutputLine::FinalPath(PathBuf::from(path)));
    }

    if let Some(rest) = line.strip_prefix(PROGRESS_MARKER) {
        let mut fields = rest.split('|').map(str::trim);
        let percent = parse_percent(fields.next()?)?;
        return Some(OutputLine::Progress(FetchProgress {
            percent,
            speed: fields.next().and_then(known_value),
            eta: fields.next().and_then(known_value),
        }));
    }

    let caps = DOWNLOAD_LINE.as_ref()?.captures(line)?;
    let percent = parse_percent(caps.get(1)?.as_str())?;
    Some(OutputLine::Progress(FetchProgress {
        percent,
        speed: caps.get(2).and_then(|m| known_value(m.as_str())),
        eta: caps.get(3).and_then(|m| known_value(m.as_str())),
    }))
}

fn strip_ansi(line: &str) -> String {
    match ANSI_ESCAPE.as_ref() {
        Some(re) => re.replace_all(line, "").into_owned(),
        None => line.to_string(),
    }
}

fn parse_percent(raw: &str) -> Option<f64> {
    let value: f64 = raw.trim().trim_end_matches('%').trim().parse().ok()?;
    value.is_finite().then(|| value.clamp(0.0, 100.0))
}

fn known_value(raw: &str) -> Option<String> {
    let value = raw.trim();
    match value {
        "" | "NA" | "N/A" | "Unknown" | "Unknown speed" | "Unknown ETA" => None,
        _ => Some(value.to_string()),
    }
}
