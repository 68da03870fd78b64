use crate::channel_config::ChannelTable;
use polars::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Sample underrun: {needed} bytes needed for all channels, {available} received")]
    Underrun { needed: usize, available: usize },
}

/// One calibrated reading per channel, in channel order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    voltages: Vec<f64>,
}

impl Sample {
    pub fn voltages(&self) -> &[f64] {
        &self.voltages
    }

    pub fn into_voltages(self) -> Vec<f64> {
        self.voltages
    }

    pub fn channel(&self, channel: usize) -> Option<f64> {
        self.voltages.get(channel).copied()
    }

    pub fn len(&self) -> usize {
        self.voltages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voltages.is_empty()
    }
}

fn decode_frame(frame: &[u8], channels: &ChannelTable) -> Sample {
    let voltages = frame
        .chunks_exact(2)
        .zip(channels.iter())
        .map(|(pair, channel)| {
            let raw = i16::from_le_bytes([pair[0], pair[1]]);
            channel.scale().to_voltage(raw)
        })
        .collect();

    Sample { voltages }
}

/// Decode the first sample frame of `raw`.
///
/// Channel `i` is the little-endian two's-complement count in bytes `2i` and
/// `2i + 1`. A buffer too short for every configured channel is rejected.
pub fn decode_sample(raw: &[u8], channels: &ChannelTable) -> Result<Sample, DecodeError> {
    let needed = channels.frame_size();
    let frame = raw.get(..needed).ok_or(DecodeError::Underrun {
        needed,
        available: raw.len(),
    })?;

    Ok(decode_frame(frame, channels))
}

/// Decode every complete sample frame of `raw`, in order.
///
/// Trailing bytes that do not form a whole frame are dropped.
pub fn decode_frames(raw: &[u8], channels: &ChannelTable) -> Result<Vec<Sample>, DecodeError> {
    #[cfg(feature = "cpu-profiling")]
    let _zone = tracy_client::Client::running().map(|client| {
        client.span_alloc(Some("decode_frames"), "decode_frames", file!(), line!(), 0)
    });

    let frame_size = channels.frame_size();
    if raw.len() < frame_size {
        return Err(DecodeError::Underrun {
            needed: frame_size,
            available: raw.len(),
        });
    }

    let frames = raw.chunks_exact(frame_size);
    let remainder = frames.remainder().len();
    if remainder > 0 {
        log::debug!("Dropping {remainder} trailing byte(s) of a partial frame");
    }

    Ok(frames.map(|frame| decode_frame(frame, channels)).collect())
}

/// Samples collected over several streaming reads.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    channel_count: usize,
    samples: Vec<Sample>,
}

impl SampleBatch {
    pub fn new(channel_count: usize) -> Self {
        Self {
            channel_count,
            samples: Vec::new(),
        }
    }

    pub fn extend(&mut self, samples: impl IntoIterator<Item = Sample>) {
        self.samples.extend(samples);
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn column_name(channel: usize) -> String {
        format!("ch{channel}")
    }

    /// One `f64` column per channel (`ch0`, `ch1`, ...) after a `sample` index.
    pub fn into_dataframe(self) -> PolarsResult<DataFrame> {
        let columns: Vec<Column> = (0..self.channel_count)
            .map(|channel| {
                let values: Vec<Option<f64>> = self
                    .samples
                    .iter()
                    .map(|sample| sample.channel(channel))
                    .collect();
                Series::new(Self::column_name(channel).into(), values).into()
            })
            .collect();

        DataFrame::new(columns)?
            .lazy()
            .with_row_index("sample", Some(0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range_table::InputRange;

    fn table(ranges: &[u8]) -> ChannelTable {
        let mut table = ChannelTable::new(ranges.len()).unwrap();
        for (channel, &code) in ranges.iter().enumerate() {
            table.set_range(channel, code).unwrap();
        }
        table
    }

    #[test]
    fn test_mixed_range_scenario() {
        let sample = decode_sample(&[0x00, 0x40, 0x00, 0x20], &table(&[0, 3])).unwrap();
        assert_eq!(sample.voltages(), &[5.0, 6.25]);
    }

    #[test]
    fn test_every_count_for_every_range() {
        for range in InputRange::ALL {
            let channels = table(&[range.code()]);
            let scale = range.scale();
            for raw in i16::MIN..=i16::MAX {
                let sample = decode_sample(&raw.to_le_bytes(), &channels).unwrap();
                let expected = scale.multiplier * f64::from(raw) * scale.divisor + scale.offset();
                assert!((sample.voltages()[0] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_negative_counts() {
        let sample = decode_sample(&[0x00, 0x80, 0x00, 0xc0], &table(&[1, 4])).unwrap();
        assert_eq!(sample.voltages(), &[-5.0, 1.25]);
    }

    #[test]
    fn test_underrun() {
        assert_eq!(
            decode_sample(&[0x00, 0x40, 0x00], &table(&[0, 0])),
            Err(DecodeError::Underrun {
                needed: 4,
                available: 3
            })
        );
        assert!(decode_frames(&[], &table(&[0])).is_err());
    }

    #[test]
    fn test_extra_bytes_are_ignored() {
        let sample = decode_sample(&[0x00, 0x40, 0xff, 0xff], &table(&[0])).unwrap();
        assert_eq!(sample.len(), 1);
        assert_eq!(sample.channel(0), Some(5.0));
    }

    #[test]
    fn test_decode_frames() {
        let raw = [0x00, 0x40, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00, 0x01];
        let samples = decode_frames(&raw, &table(&[0, 3])).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].voltages(), &[5.0, 6.25]);
        assert_eq!(samples[1].voltages(), &[0.0, 5.0]);
    }

    #[test]
    fn test_batch_into_dataframe() {
        let channels = table(&[0, 3]);
        let mut batch = SampleBatch::new(channels.len());
        batch.extend(decode_frames(&[0x00, 0x40, 0x00, 0x20, 0x00, 0x00, 0x00, 0x00], &channels).unwrap());

        let df = batch.into_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 3);

        let ch1: Vec<f64> = df.column("ch1").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(ch1, vec![6.25, 5.0]);
    }
}
