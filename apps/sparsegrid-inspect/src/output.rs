//! Raw dump of packed buffers for renderer upload.
//!
//! Layout, little-endian on the usual targets:
//! magic `SGPK`, then `u32` node, tile and dense-block counts and leaf voxel
//! count, 12 `f32` index-to-object values, 2 `f32` value range, then the
//! 32-byte node records, tile values and dense data.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use sparsegrid_volume::PackedGridBuffer;

const PACKED_MAGIC: [u8; 4] = *b"SGPK";

pub fn write_packed(path: &Path, buffer: &PackedGridBuffer) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(&PACKED_MAGIC)?;

    let counts = [
        buffer.len() as u32,
        buffer.tile_count() as u32,
        buffer.dense_count() as u32,
        buffer.leaf_voxels() as u32,
    ];
    out.write_all(bytemuck::cast_slice(&counts))?;
    out.write_all(bytemuck::bytes_of(buffer.index_to_object()))?;
    out.write_all(bytemuck::bytes_of(&buffer.value_range()))?;

    out.write_all(bytemuck::cast_slice(&buffer.gpu_nodes()))?;
    out.write_all(bytemuck::cast_slice(buffer.tile_values()))?;
    out.write_all(bytemuck::cast_slice(buffer.dense_data()))?;
    out.flush()
}
