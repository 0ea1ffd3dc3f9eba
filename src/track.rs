//! Readers for the per-utterance text tracks produced by external tools.
//!
//! Two formats are accepted:
//! - time tracks (pitch marks, parameter frames): an optional EST header
//!   ending in `EST_Header_End`, then one `time [values...]` line per frame;
//! - label tracks: an optional header ending in a lone `#`, then one
//!   `end-time unit-index symbol` line per label.

use crate::error::{Result, VoicebankError};
use std::fs;
use std::path::Path;

/// Frames of a time track: one time (seconds) and zero or more values each.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub times: Vec<f64>,
    pub frames: Vec<Vec<f32>>,
}

impl Track {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    pub fn parse(text: &str, origin: &str) -> Result<Self> {
        let err = |line: usize, message: String| VoicebankError::Track {
            path: origin.to_string(),
            message: format!("line {line}: {message}"),
        };

        let mut lines = text.lines().enumerate().peekable();
        // EST tracks store "time break ch1 ch2 ..."; the channel count comes from the header.
        let mut est_channels: Option<usize> = None;
        if lines
            .peek()
            .is_some_and(|(_, l)| l.trim_start().starts_with("EST_File"))
        {
            let mut channels = 0;
            let mut closed = false;
            for (_, line) in lines.by_ref() {
                let line = line.trim();
                if line == "EST_Header_End" {
                    closed = true;
                    break;
                }
                if let Some(rest) = line.strip_prefix("NumChannels") {
                    channels = rest.trim().parse().unwrap_or(0);
                }
            }
            if !closed {
                return Err(err(0, "EST header is not terminated".to_string()));
            }
            est_channels = Some(channels);
        }

        let mut track = Track::default();
        let mut previous = f64::NEG_INFINITY;
        for (n, line) in lines {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let time: f64 = fields
                .next()
                .and_then(|t| t.parse().ok())
                .ok_or_else(|| err(n + 1, format!("bad time in '{line}'")))?;
            if time < previous {
                return Err(err(n + 1, format!("time {time} goes backwards")));
            }
            previous = time;

            let rest: Vec<&str> = fields.collect();
            let values = match est_channels {
                Some(channels) => {
                    // skip the break flag
                    if rest.len() < channels + 1 && channels > 0 {
                        return Err(err(
                            n + 1,
                            format!("expected {channels} channels after the break flag"),
                        ));
                    }
                    rest.iter().skip(1).take(channels).copied().collect()
                }
                None => rest,
            };
            let frame = values
                .iter()
                .map(|v| v.parse::<f32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| err(n + 1, e.to_string()))?;
            track.times.push(time);
            track.frames.push(frame);
        }
        Ok(track)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Frame times converted to sample positions at `sample_rate`.
    pub fn sample_positions(&self, sample_rate: u32) -> Vec<u64> {
        self.times
            .iter()
            .map(|t| seconds_to_samples(*t, sample_rate))
            .collect()
    }
}

pub fn seconds_to_samples(seconds: f64, sample_rate: u32) -> u64 {
    (seconds.max(0.0) * f64::from(sample_rate)).round() as u64
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    /// End time in seconds; the start is the previous label's end (or 0).
    pub end: f64,
    pub symbol: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTrack {
    pub labels: Vec<Label>,
}

impl LabelTrack {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    pub fn parse(text: &str, origin: &str) -> Result<Self> {
        let err = |line: usize, message: String| VoicebankError::Track {
            path: origin.to_string(),
            message: format!("line {line}: {message}"),
        };

        let has_header = text.lines().any(|l| l.trim() == "#");
        let mut in_header = has_header;
        let mut labels = Vec::new();
        let mut previous = 0.0f64;
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if in_header {
                if line == "#" {
                    in_header = false;
                }
                continue;
            }
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [end, _index, symbol, ..] = fields.as_slice() else {
                return Err(err(n + 1, format!("expected 'end index symbol', got '{line}'")));
            };
            let end: f64 = end
                .parse()
                .map_err(|_| err(n + 1, format!("bad end time '{end}'")))?;
            if end < previous {
                return Err(err(n + 1, format!("end time {end} goes backwards")));
            }
            previous = end;
            labels.push(Label {
                end,
                symbol: symbol.to_string(),
            });
        }
        Ok(Self { labels })
    }

    pub fn symbols(&self) -> Vec<&str> {
        self.labels.iter().map(|l| l.symbol.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_track() {
        let track = Track::parse("0.010 1.5 2.5\n0.020 3.0 4.0\n", "t").unwrap();
        assert_eq!(track.times, vec![0.010, 0.020]);
        assert_eq!(track.frames[1], vec![3.0, 4.0]);
        assert_eq!(track.sample_positions(16000), vec![160, 320]);
    }

    #[test]
    fn test_est_pitchmarks() {
        let text = "EST_File Track\nDataType ascii\nNumFrames 2\nNumChannels 0\nEST_Header_End\n0.005 1\n0.011 1\n";
        let track = Track::parse(text, "pm").unwrap();
        assert_eq!(track.len(), 2);
        assert!(track.frames.iter().all(|f| f.is_empty()));
    }

    #[test]
    fn test_est_channels_skip_break_flag() {
        let text = "EST_File Track\nNumChannels 2\nEST_Header_End\n0.005 1 0.25 0.5\n";
        let track = Track::parse(text, "mcep").unwrap();
        assert_eq!(track.frames[0], vec![0.25, 0.5]);
    }

    #[test]
    fn test_unterminated_est_header() {
        let err = Track::parse("EST_File Track\nNumChannels 2\n", "x").unwrap_err();
        assert!(err.to_string().contains("not terminated"));
    }

    #[test]
    fn test_backwards_time_rejected() {
        assert!(Track::parse("0.2\n0.1\n", "x").is_err());
    }

    #[test]
    fn test_label_track_with_header() {
        let text = "separator ;\nnfields 1\n#\n0.100 125 a\n0.300 125 b\n0.450 125 c\n";
        let labels = LabelTrack::parse(text, "lab").unwrap();
        assert_eq!(labels.symbols(), vec!["a", "b", "c"]);
        assert_eq!(labels.labels[2].end, 0.45);
    }

    #[test]
    fn test_label_track_without_header() {
        let labels = LabelTrack::parse("0.1 1 _\n0.2 1 x\n", "lab").unwrap();
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn test_malformed_label_line() {
        let err = LabelTrack::parse("0.1 a\n", "lab").unwrap_err();
        assert!(matches!(err, VoicebankError::Track { .. }));
    }
}
