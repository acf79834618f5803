// IDM chunk container framing.
//
// An asset container is a flat sequence of chunks, each with a 16-byte
// header carrying a magic/version word, a type id, alignment padding, the
// total framed size, and a chunk id. The payload formats themselves live in
// the collision and grid modules; this module only frames and locates them.

use idm_shared::util::{ByteView, ByteWriter};

use crate::error::ChunkError;
use crate::grid::GridChunk;

const CHUNK_HEADER_SIZE: usize = 0x10;
/// "IDM" in the low three bytes of the header word; the high byte is a
/// per-type version.
const CHUNK_MAGIC: u32 = 0x4d4449;

/// Known chunk type ids. Type 18 is shared by skeletons and character
/// asset tables in real files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum ChunkType {
    Eof = 0,
    Materials = 2,
    WorldModel = 3,
    Image = 4,
    Collision = 5,
    ModelList = 8,
    DynamicModel = 12,
    Model = 13,
    Skeleton = 18,
    WorldGrid = 19,
    DynamicObjects = 29,
    Header = 31,
    AssetGroup = 32,
    ShadowModel = 33,
    ZoneVis = 35,
    LevelDll = 37,
    Table = 42,
    DialogueTable = 1000,
    WorldInfo = 1001,
}

impl ChunkType {
    pub fn from_i16(value: i16) -> Option<Self> {
        use ChunkType::*;
        Some(match value {
            0 => Eof,
            2 => Materials,
            3 => WorldModel,
            4 => Image,
            5 => Collision,
            8 => ModelList,
            12 => DynamicModel,
            13 => Model,
            18 => Skeleton,
            19 => WorldGrid,
            29 => DynamicObjects,
            31 => Header,
            32 => AssetGroup,
            33 => ShadowModel,
            35 => ZoneVis,
            37 => LevelDll,
            42 => Table,
            1000 => DialogueTable,
            1001 => WorldInfo,
            _ => return None,
        })
    }
}

/// One framed chunk. Unknown type ids are carried through untouched, so the
/// type is kept raw rather than as a `ChunkType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub chunk_type: i16,
    pub id: i16,
    pub contents: Vec<u8>,
}

impl Chunk {
    pub fn new(chunk_type: ChunkType, id: i16, contents: Vec<u8>) -> Self {
        Chunk { chunk_type: chunk_type as i16, id, contents }
    }

    fn alignment(&self) -> i64 {
        // Level DLL payloads are mapped directly and need page-ish
        // alignment; everything else packs at 16.
        if self.chunk_type == ChunkType::LevelDll as i16 { 0x80 } else { 0x10 }
    }

    fn version_byte(&self) -> u8 {
        match self.chunk_type {
            4 | 37 => 4,
            42 | 43 => 205,
            _ => 1,
        }
    }
}

/// A parsed asset container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkFile {
    pub chunks: Vec<Chunk>,
}

impl ChunkFile {
    pub fn parse(bytes: &[u8]) -> Result<Self, ChunkError> {
        let view = ByteView::new(bytes);
        let mut chunks = Vec::new();
        let mut offset = 0usize;
        loop {
            if offset >= bytes.len() {
                return Err(ChunkError::malformed("file", "missing end-of-file terminator"));
            }
            let magic = view.read_u32(offset)?;
            if magic & 0xFFFFFF != CHUNK_MAGIC {
                return Err(ChunkError::BadMagic);
            }
            let chunk_type = view.read_i16(offset + 0x4)?;
            let padding = view.read_i16(offset + 0x6)? as usize;
            let total_size = view.read_i32(offset + 0x8)? as usize;
            let id = view.read_i16(offset + 0xE)?;

            if chunk_type == ChunkType::Eof as i16 {
                return Ok(ChunkFile { chunks });
            }
            let contents_start = offset + CHUNK_HEADER_SIZE + padding;
            let contents_len = (offset + total_size).checked_sub(contents_start).ok_or_else(
                || ChunkError::malformed("file", format!("chunk frame size {:#x}", total_size)),
            )?;
            let contents = view.read_bytes(contents_start, contents_len)?.to_vec();
            chunks.push(Chunk { chunk_type, id, contents });
            offset += total_size;
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut total = 0usize;
        let mut paddings = Vec::with_capacity(self.chunks.len());
        for chunk in &self.chunks {
            let padding = frame_padding(total, chunk.alignment());
            paddings.push(padding);
            total += CHUNK_HEADER_SIZE + padding + chunk.contents.len();
        }
        total += CHUNK_HEADER_SIZE;

        let mut writer = ByteWriter::with_len(total);
        let mut offset = 0usize;
        for (chunk, padding) in self.chunks.iter().zip(&paddings) {
            write_chunk_header(
                &mut writer,
                offset,
                chunk.chunk_type,
                chunk.version_byte(),
                *padding,
                CHUNK_HEADER_SIZE + padding + chunk.contents.len(),
                chunk.id,
            );
            writer.write_bytes(offset + CHUNK_HEADER_SIZE + padding, &chunk.contents);
            offset += CHUNK_HEADER_SIZE + padding + chunk.contents.len();
        }
        // End-of-file terminator chunk.
        write_chunk_header(&mut writer, offset, 0, 1, 0, CHUNK_HEADER_SIZE, 0);
        writer.into_inner()
    }

    pub fn get_chunk_of_type(&self, chunk_type: ChunkType) -> Result<&Chunk, ChunkError> {
        self.chunks
            .iter()
            .find(|chunk| chunk.chunk_type == chunk_type as i16)
            .ok_or(ChunkError::ChunkNotFound(chunk_type as i16))
    }

    pub fn get_chunks_of_type(&self, chunk_type: ChunkType) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(move |chunk| chunk.chunk_type == chunk_type as i16)
    }

    pub fn get_chunk_by_id(&self, chunk_type: ChunkType, id: i16) -> Result<&Chunk, ChunkError> {
        self.chunks
            .iter()
            .find(|chunk| chunk.chunk_type == chunk_type as i16 && chunk.id == id)
            .ok_or(ChunkError::ChunkNotFound(chunk_type as i16))
    }

    /// Re-derive the world grid's collision references from the container's
    /// collision chunks and write the grid back in place. Use after
    /// modifying collision.
    pub fn rebuild_grid(&mut self, do_trim: bool) -> Result<(), ChunkError> {
        let index = self
            .chunks
            .iter()
            .position(|chunk| chunk.chunk_type == ChunkType::WorldGrid as i16)
            .ok_or(ChunkError::ChunkNotFound(ChunkType::WorldGrid as i16))?;
        let mut grid = GridChunk::decode(&self.chunks[index].contents)?;
        grid.rebuild(self, do_trim)?;
        self.chunks[index].contents = grid.encode();
        Ok(())
    }
}

/// Padding between the frame start and the header so the payload lands on
/// the chunk's alignment. Payloads start `0x10` past the padded frame start
/// and the file origin is treated as `0x80`-aligned.
fn frame_padding(offset: usize, alignment: i64) -> usize {
    ((0x80 - (offset as i64 + 0x10)) & (alignment - 1)) as usize
}

fn write_chunk_header(
    writer: &mut ByteWriter,
    offset: usize,
    chunk_type: i16,
    version: u8,
    padding: usize,
    total_size: usize,
    id: i16,
) {
    writer.write_u32(offset, CHUNK_MAGIC | ((version as u32) << 24));
    writer.write_i16(offset + 0x4, chunk_type);
    writer.write_i16(offset + 0x6, padding as i16);
    writer.write_i32(offset + 0x8, total_size as i32);
    writer.write_i16(offset + 0xE, id);
}
