//! CSV files written at the end of a run.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::{Error, Result};
use crate::capture::{Averages, Block};
use crate::config::{Naming, OutputConfiguration};
use crate::params::Settings;

/// Everything that goes into an averages file.
#[derive(Debug, Clone, Copy)]
pub struct AveragesRecord<'a> {
    pub settings: &'a Settings,
    pub averages: &'a Averages,
}

impl<'a> AveragesRecord<'a> {
    pub fn new(settings: &'a Settings, averages: &'a Averages) -> AveragesRecord<'a> {
        AveragesRecord { settings, averages }
    }

    fn range(&self, channel: u16) -> Option<f64> {
        self.settings.channels.iter()
            .find(|&&(index, _)| index == channel)
            .map(|&(_, range)| range)
    }

    fn write_metadata<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let (settings, averages) = (self.settings, self.averages);
        writeln!(writer, "sampling rate [Sa/s]: {}", settings.sample_frequency)?;
        writeln!(writer, "record length [Sa]: {}", settings.record_length)?;
        writeln!(writer, "record duration [s]: {:.8e}", settings.duration())?;
        for average in &averages.channels {
            if let Some(range) = self.range(average.channel) {
                writeln!(writer, "range Ch{} [V]: {}", average.channel + 1, range)?;
            }
        }
        writeln!(writer, "resolution [b]: {}", settings.resolution)?;
        for average in &averages.channels {
            if let Some(range) = self.range(average.channel) {
                writeln!(writer, "amplitude resolution Ch{} [V]: {:.8e}",
                    average.channel + 1, settings.amplitude_resolution(range))?;
            }
        }
        writeln!(writer, "block acquisition count: {}", averages.block_count)?;
        writeln!(writer, "cycles per block: {}", averages.cycles_per_block)?;
        writeln!(writer, "cycle length [Sa]: {}", averages.cycle_length)?;
        writeln!(writer, "number of averages: {}", averages.divisor)?;
        writeln!(writer, "samples dropped per block: {}", averages.remainder)?;
        writeln!(writer, "DAQ elapsed time [s]: {:.6}", averages.elapsed.as_secs_f64())?;
        Ok(())
    }
}

/// Opens the file the next record is written to, creating the output directory if needed.
///
/// With numbered naming the first `<stem>_<n>.csv` that does not exist yet is created;
/// with fixed naming `<stem>.csv` is truncated.
pub fn create_output(output: &OutputConfiguration) -> Result<(PathBuf, File)> {
    let file_open = |path: PathBuf, error: io::Error| Error::FileOpen { path, error };
    if !output.directory.as_os_str().is_empty() {
        fs::create_dir_all(&output.directory)
            .map_err(|error| file_open(output.directory.clone(), error))?;
    }
    match output.naming {
        Naming::Fixed => {
            let path = output.directory.join(format!("{}.csv", output.stem));
            match File::create(&path) {
                Ok(file) => Ok((path, file)),
                Err(error) => Err(file_open(path, error)),
            }
        }
        Naming::Numbered => {
            for number in 0.. {
                let path = output.directory.join(format!("{}_{}.csv", output.stem, number));
                match OpenOptions::new().write(true).create_new(true).open(&path) {
                    Ok(file) => {
                        log::debug!("created {}", path.display());
                        return Ok((path, file))
                    }
                    Err(error) if error.kind() == io::ErrorKind::AlreadyExists => continue,
                    Err(error) => return Err(file_open(path, error)),
                }
            }
            unreachable!()
        }
    }
}

/// Writes the metadata header followed by one `Time,Ch1[,Ch2...]` row per cycle sample.
pub fn write_averages<W: Write>(mut writer: W, record: &AveragesRecord) -> Result<()> {
    record.write_metadata(&mut writer)?;

    let averages = record.averages;
    let mut csv = csv::Writer::from_writer(&mut writer);
    let mut header = vec!["Time".to_owned()];
    header.extend(averages.channels.iter().map(|average| format!("Ch{}", average.channel + 1)));
    csv.write_record(&header)?;
    for index in 0..averages.cycle_length {
        let mut row = Vec::with_capacity(averages.channels.len() + 1);
        row.push(format!("{:.8e}", index as f64 / record.settings.sample_frequency));
        for average in &averages.channels {
            row.push(format!("{:.8e}", average.values[index]));
        }
        csv.write_record(&row)?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes a `Sample,Ch1[,Ch2...]` table of a single block.
pub fn write_block<W: Write>(writer: W, block: &Block) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    let mut header = vec!["Sample".to_owned()];
    header.extend(block.channels().map(|channel| format!("Ch{}", channel + 1)));
    csv.write_record(&header)?;
    let channels = block.iter().map(|(_, samples)| samples).collect::<Vec<_>>();
    for index in 0..block.record_length() {
        let mut row = Vec::with_capacity(channels.len() + 1);
        row.push(index.to_string());
        row.extend(channels.iter().map(|samples| format!("{:.6}", samples[index])));
        csv.write_record(&row)?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes the samples of every channel in turn as little-endian `f32`.
pub fn write_raw_block<W: Write>(mut writer: W, block: &Block) -> Result<()> {
    for (_, samples) in block.iter() {
        if cfg!(target_endian = "little") {
            writer.write_all(bytemuck::cast_slice(samples))?;
        } else {
            for sample in samples {
                writer.write_all(&sample.to_le_bytes())?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}
