//! Waveform timeline: one datagram per pitch period.

use crate::error::{Result, VoicebankError};
use crate::timeline::{Datagram, TimelineWriter};
use crate::track::seconds_to_samples;
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

/// Mono 16-bit audio of one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Waveform {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parses WAV data, mixing multi-channel audio down to mono.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut wav = hound::WavReader::new(reader)?;
        let spec = wav.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(VoicebankError::format(format!(
                "expected 16-bit PCM, got {} bits {:?}",
                spec.bits_per_sample, spec.sample_format
            )));
        }
        let raw: Vec<i16> = wav
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let channels = usize::from(spec.channels.max(1));
        let samples = if channels == 1 {
            raw
        } else {
            raw.chunks_exact(channels)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                    (sum / channels as i32) as i16
                })
                .collect()
        };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }
}

/// Feeds one datagram per pitch period `[previous mark, mark)`, starting
/// at time 0. Audio after the last mark is dropped.
///
/// `pitchmarks` are times in seconds. Payloads are cut at the waveform's
/// rate; durations are the gaps between marks rounded at the timeline's
/// rate, so an utterance always spans `round(last mark * timeline rate)`
/// samples whatever rate it was recorded at. A period shorter than one
/// timeline sample is merged into the next. A period running past the end
/// of the audio keeps its full duration with a truncated payload.
pub fn feed_pitch_periods<W: Write + Seek>(
    timeline: &mut TimelineWriter<W>,
    wave: &Waveform,
    pitchmarks: &[f64],
) -> Result<usize> {
    let rate = timeline.sample_rate();
    let len = wave.samples.len() as u64;
    let mut position = 0u64;
    let mut cut = 0u64;
    let mut fed = 0;
    for &mark in pitchmarks {
        let at = seconds_to_samples(mark, rate);
        if at <= position {
            continue;
        }
        let duration = u32::try_from(at - position).map_err(|_| {
            VoicebankError::state(format!("pitch period of {} samples", at - position))
        })?;
        let end = seconds_to_samples(mark, wave.sample_rate).max(cut);
        let from = cut.min(len) as usize;
        let to = end.min(len) as usize;
        timeline.feed(Datagram::from_samples(duration, &wave.samples[from..to]), rate)?;
        position = at;
        cut = end;
        fed += 1;
    }
    Ok(fed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::TimelineReader;
    use std::io::Cursor;

    fn wav_bytes(samples: &[i16], rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in samples {
                writer.write_sample(*s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_reads_mono() {
        let wave = Waveform::from_reader(Cursor::new(wav_bytes(&[1, 2, 3], 16000, 1))).unwrap();
        assert_eq!(wave.samples, vec![1, 2, 3]);
        assert_eq!(wave.sample_rate, 16000);
    }

    #[test]
    fn test_mixes_stereo_down() {
        let wave =
            Waveform::from_reader(Cursor::new(wav_bytes(&[100, 200, -50, 50], 8000, 2))).unwrap();
        assert_eq!(wave.samples, vec![150, 0]);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Waveform::from_reader(Cursor::new(vec![0u8; 16])).is_err());
    }

    fn marks(samples: &[u64], rate: u32) -> Vec<f64> {
        samples.iter().map(|&s| s as f64 / f64::from(rate)).collect()
    }

    #[test]
    fn test_one_datagram_per_period() {
        let wave = Waveform {
            samples: (0..100).collect(),
            sample_rate: 1000,
        };
        let mut sink = Cursor::new(Vec::new());
        {
            let mut timeline = TimelineWriter::new(&mut sink, 1000, 0.02, "wave").unwrap();
            assert_eq!(
                feed_pitch_periods(&mut timeline, &wave, &marks(&[10, 25, 25, 60], 1000)).unwrap(),
                3
            );
            timeline.close().unwrap();
        }
        let mut reader = TimelineReader::from_reader(Cursor::new(sink.into_inner())).unwrap();
        let all = reader.read_all().unwrap();
        assert_eq!(
            all.iter().map(|d| d.duration).collect::<Vec<_>>(),
            vec![10, 15, 35]
        );
        assert_eq!(all[1].samples(), (10..25).collect::<Vec<i16>>());
        assert_eq!(reader.total_duration(), 60);
    }

    #[test]
    fn test_periods_converted_to_timeline_rate() {
        let wave = Waveform {
            samples: vec![0; 441],
            sample_rate: 44100,
        };
        let mut timeline =
            TimelineWriter::new(Cursor::new(Vec::new()), 16000, 0.01, "wave").unwrap();
        feed_pitch_periods(&mut timeline, &wave, &marks(&[441], 44100)).unwrap();
        assert_eq!(timeline.time_position(), 160);
    }

    #[test]
    fn test_many_periods_at_another_rate_do_not_drift() {
        // 200 periods of 147 samples at 22050 Hz: 1.3333 s
        let wave = Waveform {
            samples: vec![7; 200 * 147],
            sample_rate: 22050,
        };
        let pitchmarks: Vec<f64> = (1..=200u64).map(|k| (k * 147) as f64 / 22050.0).collect();
        let last = pitchmarks[199];
        let mut sink = Cursor::new(Vec::new());
        {
            let mut timeline = TimelineWriter::new(&mut sink, 16000, 0.1, "wave").unwrap();
            assert_eq!(feed_pitch_periods(&mut timeline, &wave, &pitchmarks).unwrap(), 200);
            assert_eq!(timeline.time_position(), seconds_to_samples(last, 16000));
            assert_eq!(timeline.time_position(), 21333);
            timeline.close().unwrap();
        }
        let mut reader = TimelineReader::from_reader(Cursor::new(sink.into_inner())).unwrap();
        let all = reader.read_all().unwrap();
        // Every source sample lands in exactly one payload
        let payload: usize = all.iter().map(|d| d.samples().len()).sum();
        assert_eq!(payload, 200 * 147);
        // Each mark sits where the unit table puts it
        let mut position = 0u64;
        for (datagram, &mark) in all.iter().zip(&pitchmarks) {
            position += u64::from(datagram.duration);
            assert_eq!(position, seconds_to_samples(mark, 16000));
        }
    }

    #[test]
    fn test_period_shorter_than_a_timeline_sample_joins_the_next() {
        let wave = Waveform {
            samples: (0..40).collect(),
            sample_rate: 8000,
        };
        let mut sink = Cursor::new(Vec::new());
        {
            let mut timeline = TimelineWriter::new(&mut sink, 1000, 0.1, "wave").unwrap();
            // 16 and 17 samples at 8 kHz both round to 2 ms
            let fed = feed_pitch_periods(&mut timeline, &wave, &marks(&[16, 17, 40], 8000)).unwrap();
            assert_eq!(fed, 2);
            timeline.close().unwrap();
        }
        let mut reader = TimelineReader::from_reader(Cursor::new(sink.into_inner())).unwrap();
        let all = reader.read_all().unwrap();
        assert_eq!(
            all.iter().map(|d| d.duration).collect::<Vec<_>>(),
            vec![2, 3]
        );
        assert_eq!(all[1].samples(), (16..40).collect::<Vec<i16>>());
    }
}
