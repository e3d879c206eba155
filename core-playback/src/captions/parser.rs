//! WebVTT and SRT cue parsing.

use thiserror::Error;

/// Timed caption cue, active over `[start, end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Cue {
    pub fn is_active(&self, time: f64) -> bool {
        self.start <= time && time < self.end
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptionParseError {
    #[error("Caption file is empty")]
    Empty,

    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("No cues found")]
    NoCues,
}

/// Parse a WebVTT or SRT document into cues ordered by start time.
pub fn parse_captions(input: &str) -> Result<Vec<Cue>, CaptionParseError> {
    let text = input.trim_start_matches('\u{feff}').replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CaptionParseError::Empty);
    }
    let is_vtt = trimmed.starts_with("WEBVTT");

    let mut cues = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    for line in text.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if let Some(cue) = parse_block(&block)? {
                cues.push(cue);
            }
            block.clear();
        } else {
            block.push(line);
        }
    }

    if cues.is_empty() && !is_vtt {
        return Err(CaptionParseError::NoCues);
    }
    cues.sort_by(|a, b| a.start.total_cmp(&b.start));
    Ok(cues)
}

fn parse_block(lines: &[&str]) -> Result<Option<Cue>, CaptionParseError> {
    // Header, NOTE, STYLE and REGION blocks carry no timing line.
    let Some(timing_index) = lines.iter().position(|line| line.contains("-->")) else {
        return Ok(None);
    };

    let timing = lines[timing_index];
    let (start, rest) = timing
        .split_once("-->")
        .ok_or_else(|| CaptionParseError::InvalidTimestamp(timing.to_string()))?;
    let end = rest.split_whitespace().next().unwrap_or_default();

    let start = parse_timestamp(start.trim())?;
    let end = parse_timestamp(end)?;

    let text = lines[timing_index + 1..]
        .iter()
        .map(|line| strip_tags(line))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(Some(Cue { start, end, text }))
}

/// `hh:mm:ss.mmm`, `mm:ss.mmm`, with `.` or `,` before the milliseconds.
pub fn parse_timestamp(value: &str) -> Result<f64, CaptionParseError> {
    let invalid = || CaptionParseError::InvalidTimestamp(value.to_string());
    let normalized = value.replace(',', ".");
    let parts: Vec<&str> = normalized.split(':').collect();

    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => ("0", *m, *s),
        _ => return Err(invalid()),
    };

    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return Err(invalid());
    }

    Ok(f64::from(hours) * 3600.0 + f64::from(minutes) * 60.0 + seconds)
}

fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_tag = false;
    for c in line.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_webvtt_with_header_and_settings() {
        let vtt = "WEBVTT\n\nNOTE generated\n\n1\n00:00:01.000 --> 00:00:03.500 align:start\n<v Roger>Hello</v>\nthere\n\n00:04.000 --> 00:05.000\nBye\n";
        let cues = parse_captions(vtt).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start, 1.0);
        assert_eq!(cues[0].end, 3.5);
        assert_eq!(cues[0].text, "Hello\nthere");
        assert_eq!(cues[1].start, 4.0);
    }

    #[test]
    fn parses_srt_with_crlf() {
        let srt = "1\r\n00:00:10,500 --> 00:00:12,000\r\nFirst\r\n\r\n2\r\n00:01:00,000 --> 00:01:02,000\r\nSecond\r\n";
        let cues = parse_captions(srt).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start, 10.5);
        assert_eq!(cues[1].start, 60.0);
        assert_eq!(cues[1].text, "Second");
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_captions("   "), Err(CaptionParseError::Empty));
        assert_eq!(parse_captions("<html>404</html>"), Err(CaptionParseError::NoCues));
        assert!(matches!(
            parse_captions("00:xx:01.000 --> 00:00:02.000\nA"),
            Err(CaptionParseError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn empty_webvtt_is_valid() {
        assert_eq!(parse_captions("WEBVTT\n"), Ok(vec![]));
    }

    #[test]
    fn cue_window_is_half_open() {
        let cue = Cue {
            start: 1.0,
            end: 2.0,
            text: String::new(),
        };
        assert!(cue.is_active(1.0));
        assert!(cue.is_active(1.999));
        assert!(!cue.is_active(2.0));
        assert!(!cue.is_active(0.5));
    }
}
