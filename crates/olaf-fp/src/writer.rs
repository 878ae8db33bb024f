//! .ofp file writer

use crate::format::{OfpFile, OfpHeader, OfpMetadata};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct OfpWriter;

impl OfpWriter {
    /// Write a .ofp file. Entries are sorted before serialization so the
    /// payload always satisfies the database's ordering requirement.
    pub fn write(path: &Path, ofp_file: &OfpFile) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create .ofp file: {}", path.display()))?;

        let mut writer = BufWriter::new(file);

        let mut entries = ofp_file.entries.clone();
        entries.sort_unstable();

        let mut header = ofp_file.header.clone();
        header.num_entries = entries.len() as u32;

        Self::write_header(&mut writer, &header)?;
        Self::write_metadata(&mut writer, &ofp_file.metadata)?;
        Self::write_entries(&mut writer, &entries)?;

        writer.flush()?;
        Ok(())
    }

    fn write_header(writer: &mut BufWriter<File>, header: &OfpHeader) -> Result<()> {
        // Little-endian binary, field by field
        writer.write_all(&header.magic)?;
        writer.write_all(&header.version.to_le_bytes())?;
        writer.write_all(&header.flags.to_le_bytes())?;
        writer.write_all(&header.audio_id.to_le_bytes())?;
        writer.write_all(&header.num_entries.to_le_bytes())?;
        writer.write_all(&header.sample_rate.to_le_bytes())?;
        writer.write_all(&header.block_size.to_le_bytes())?;
        writer.write_all(&header.step_size.to_le_bytes())?;
        writer.write_all(&header.duration_ms.to_le_bytes())?;
        writer.write_all(&header.reserved.to_le_bytes())?;
        Ok(())
    }

    fn write_metadata(writer: &mut BufWriter<File>, metadata: &OfpMetadata) -> Result<()> {
        // Algorithm ID (8 bytes, null-padded)
        let mut algo_id = [0u8; 8];
        let bytes = metadata.algorithm_id.as_bytes();
        let len = bytes.len().min(8);
        algo_id[..len].copy_from_slice(&bytes[..len]);
        writer.write_all(&algo_id)?;

        // Algorithm params as JSON (length-prefixed)
        let params_bytes = metadata.algorithm_params.as_bytes();
        writer.write_all(&(params_bytes.len() as u32).to_le_bytes())?;
        writer.write_all(params_bytes)?;

        // Original filename (null-terminated)
        writer.write_all(metadata.original_filename.as_bytes())?;
        writer.write_all(&[0])?;
        Ok(())
    }

    fn write_entries(writer: &mut BufWriter<File>, entries: &[u64]) -> Result<()> {
        for entry in entries {
            writer.write_all(&entry.to_le_bytes())?;
        }
        Ok(())
    }
}
