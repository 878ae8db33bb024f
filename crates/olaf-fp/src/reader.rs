//! .ofp file reader

use crate::format::{OfpFile, OfpHeader, OfpMetadata, MAGIC, VERSION};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

pub struct OfpReader;

impl OfpReader {
    /// Read and validate a .ofp file.
    pub fn read(path: &Path) -> Result<OfpFile> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open .ofp file: {}", path.display()))?;

        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;
        if header.magic != MAGIC {
            anyhow::bail!("Invalid .ofp file: magic bytes mismatch");
        }
        if header.version != VERSION {
            anyhow::bail!("Unsupported .ofp version: {}", header.version);
        }

        let metadata = Self::read_metadata(&mut reader)?;
        let entries = Self::read_entries(&mut reader, header.num_entries as usize)?;

        if !entries.windows(2).all(|w| w[0] <= w[1]) {
            anyhow::bail!("Invalid .ofp file: entries are not sorted");
        }

        Ok(OfpFile {
            header,
            metadata,
            entries,
        })
    }

    fn read_header(reader: &mut BufReader<File>) -> Result<OfpHeader> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;

        Ok(OfpHeader {
            magic,
            version: Self::read_u16(reader)?,
            flags: Self::read_u16(reader)?,
            audio_id: Self::read_u32(reader)?,
            num_entries: Self::read_u32(reader)?,
            sample_rate: Self::read_u32(reader)?,
            block_size: Self::read_u16(reader)?,
            step_size: Self::read_u16(reader)?,
            duration_ms: Self::read_u32(reader)?,
            reserved: Self::read_u32(reader)?,
        })
    }

    fn read_metadata(reader: &mut BufReader<File>) -> Result<OfpMetadata> {
        // Algorithm ID (8 bytes)
        let mut algo_id = [0u8; 8];
        reader.read_exact(&mut algo_id)?;
        let algorithm_id = String::from_utf8_lossy(&algo_id)
            .trim_end_matches('\0')
            .to_string();

        // Algorithm params (length-prefixed)
        let params_len = Self::read_u32(reader)? as usize;
        let mut params_bytes = vec![0u8; params_len];
        reader.read_exact(&mut params_bytes)?;
        let algorithm_params = String::from_utf8(params_bytes)?;

        // Original filename (null-terminated)
        let mut filename_bytes = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            reader.read_exact(&mut byte)?;
            if byte[0] == 0 {
                break;
            }
            filename_bytes.push(byte[0]);
        }
        let original_filename = String::from_utf8(filename_bytes)?;

        Ok(OfpMetadata {
            algorithm_id,
            algorithm_params,
            original_filename,
        })
    }

    fn read_entries(reader: &mut BufReader<File>, count: usize) -> Result<Vec<u64>> {
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            entries.push(u64::from_le_bytes(buf));
        }
        Ok(entries)
    }

    fn read_u16(reader: &mut BufReader<File>) -> Result<u16> {
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(reader: &mut BufReader<File>) -> Result<u32> {
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}
