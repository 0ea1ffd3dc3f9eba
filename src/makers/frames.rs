//! Parameter-frame timeline: one datagram per analysis frame.

use crate::error::{Result, VoicebankError};
use crate::timeline::{Datagram, TimelineWriter};
use crate::track::{Track, seconds_to_samples};
use std::io::{Seek, Write};
use tracing::debug;

/// Feeds the frames of one utterance, then pads it to `end` (samples at the
/// timeline rate) with one empty datagram.
///
/// Frame `i` covers the span from the previous frame time (or 0) to its own
/// time. Durations come from cumulative sample positions, so rounding never
/// drifts. Frames past `end` are dropped. Returns the number of frames fed.
pub fn feed_frames<W: Write + Seek>(
    timeline: &mut TimelineWriter<W>,
    track: &Track,
    end: u64,
) -> Result<usize> {
    let rate = timeline.sample_rate();
    let width = track.frames.first().map_or(0, Vec::len);
    let mut position = 0u64;
    let mut fed = 0;
    for (time, frame) in track.times.iter().zip(&track.frames) {
        if frame.len() != width {
            return Err(VoicebankError::format(format!(
                "frame at {time}s has {} values, expected {width}",
                frame.len()
            )));
        }
        let at = seconds_to_samples(*time, rate);
        if at > end {
            debug!(time, end, "Dropping frames past the utterance end");
            break;
        }
        let duration = u32::try_from(at - position)
            .map_err(|_| VoicebankError::state(format!("frame gap of {} samples", at - position)))?;
        timeline.feed(Datagram::from_frame(duration, frame), rate)?;
        position = at;
        fed += 1;
    }
    if end > position {
        let padding = u32::try_from(end - position)
            .map_err(|_| VoicebankError::state(format!("padding of {} samples", end - position)))?;
        timeline.feed(Datagram::new(padding, Vec::new()), rate)?;
    }
    Ok(fed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::TimelineReader;
    use std::io::Cursor;

    fn track(times: &[f64]) -> Track {
        Track {
            times: times.to_vec(),
            frames: times.iter().map(|t| vec![*t as f32, 1.0]).collect(),
        }
    }

    fn feed(track: &Track, end: u64) -> (usize, Vec<Datagram>) {
        let mut sink = Cursor::new(Vec::new());
        let fed = {
            let mut timeline = TimelineWriter::new(&mut sink, 1000, 0.05, "mcep").unwrap();
            let fed = feed_frames(&mut timeline, track, end).unwrap();
            timeline.close().unwrap();
            fed
        };
        let mut reader = TimelineReader::from_reader(Cursor::new(sink.into_inner())).unwrap();
        (fed, reader.read_all().unwrap())
    }

    #[test]
    fn test_durations_from_frame_times() {
        let (fed, all) = feed(&track(&[0.010, 0.0212, 0.030]), 40);
        assert_eq!(fed, 3);
        // 10, 21 (rounded), 30, then 10 samples of padding
        let durations: Vec<u32> = all.iter().map(|d| d.duration).collect();
        assert_eq!(durations, vec![10, 11, 9, 10]);
        assert_eq!(all[1].frame().len(), 2);
        assert_eq!(all[1].frame()[1], 1.0);
        assert!(all[3].payload.is_empty());
    }

    #[test]
    fn test_no_padding_when_frames_reach_end() {
        let (_, all) = feed(&track(&[0.010, 0.020]), 20);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_frames_past_end_dropped() {
        let (fed, all) = feed(&track(&[0.010, 0.020, 0.030]), 25);
        assert_eq!(fed, 2);
        let total: u32 = all.iter().map(|d| d.duration).sum();
        assert_eq!(total, 25);
    }

    #[test]
    fn test_ragged_frames_rejected() {
        let mut t = track(&[0.01, 0.02]);
        t.frames[1].pop();
        let mut timeline = TimelineWriter::new(Cursor::new(Vec::new()), 1000, 0.05, "").unwrap();
        assert!(feed_frames(&mut timeline, &t, 30).is_err());
    }
}
