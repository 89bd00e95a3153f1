//! Packed DMS index streams.
//!
//! Each mesh stores one `u32` stream mixing triangle strips and loose triangles.
//! Entries with the high bit set belong to a strip; the next seven bits carry a
//! strip id used only to find where one run ends and the next begins. The low 24
//! bits are always the vertex index. Entries without the high bit are consumed
//! three at a time as independent triangles.

pub const STRIP_FLAG: u32 = 0x8000_0000;
pub const STRIP_ID_SHIFT: u32 = 24;
pub const STRIP_ID_MASK: u32 = 0x7F;
pub const INDEX_MASK: u32 = 0x00FF_FFFF;

/// Largest vertex index representable in a packed entry
pub const MAX_VERTEX_INDEX: u32 = INDEX_MASK;

#[inline]
pub fn is_strip(raw: u32) -> bool {
    raw & STRIP_FLAG != 0
}

#[inline]
pub fn strip_id(raw: u32) -> u8 {
    ((raw >> STRIP_ID_SHIFT) & STRIP_ID_MASK) as u8
}

#[inline]
pub fn vertex_index(raw: u32) -> u32 {
    raw & INDEX_MASK
}

/// Pack a vertex index as a member of strip `id` (only the low 7 bits of the id are kept)
#[inline]
pub fn encode_strip_index(id: u8, index: u32) -> u32 {
    STRIP_FLAG | ((id as u32 & STRIP_ID_MASK) << STRIP_ID_SHIFT) | (index & INDEX_MASK)
}

/// One primitive run decoded from a packed index stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk<'a> {
    /// A run of consecutive strip entries sharing one id. `raw` still carries the flag bits.
    Strip { id: u8, raw: &'a [u32] },
    /// An independent triangle (vertex indices already unpacked)
    Triangle([u32; 3]),
}

impl<'a> Chunk<'a> {
    /// Number of vertex indices in this chunk
    pub fn len(&self) -> usize {
        match self {
            Chunk::Strip { raw, .. } => raw.len(),
            Chunk::Triangle(_) => 3,
        }
    }

    /// Number of triangles this chunk rasterizes to
    pub fn triangle_count(&self) -> usize {
        self.len().saturating_sub(2)
    }

    /// Unpacked vertex index at `i`
    pub fn index(&self, i: usize) -> u32 {
        match self {
            Chunk::Strip { raw, .. } => vertex_index(raw[i]),
            Chunk::Triangle(tri) => tri[i],
        }
    }
}

/// Iterator over the chunks of a packed index stream
pub struct Chunks<'a> {
    stream: &'a [u32],
    pos: usize,
}

pub fn chunks(stream: &[u32]) -> Chunks<'_> {
    Chunks { stream, pos: 0 }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        let stream = self.stream;

        while self.pos < stream.len() {
            let start = self.pos;
            let raw = stream[start];

            if is_strip(raw) {
                let id = strip_id(raw);
                let run = stream[start..]
                    .iter()
                    .take_while(|r| is_strip(**r) && strip_id(**r) == id)
                    .count();

                self.pos += run;
                return Some(Chunk::Strip { id, raw: &stream[start..start + run] });
            }

            if start + 2 < stream.len() {
                self.pos += 3;
                return Some(Chunk::Triangle([
                    vertex_index(stream[start]),
                    vertex_index(stream[start + 1]),
                    vertex_index(stream[start + 2]),
                ]));
            }

            // trailing loose entries which can't form a triangle
            self.pos += 1;
        }

        None
    }
}

/// Count triangles in a packed stream. Unindexed meshes draw every three vertices as a triangle.
pub fn triangle_count(stream: &[u32], vertex_count: usize) -> usize {
    if stream.is_empty() {
        return vertex_count / 3;
    }

    chunks(stream).map(|c| c.triangle_count()).sum()
}
