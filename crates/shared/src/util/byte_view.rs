// ByteView/ByteWriter - absolute-offset little-endian access over a flat buffer.
//
// The IDM chunk formats are pointer-linked: records carry byte offsets to
// other records in the same buffer, so reads and writes happen at computed
// absolute positions rather than through a sequential cursor.

use byteorder::{ByteOrder, LittleEndian};

/// Bounds-checked little-endian reader over a borrowed byte slice.
#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a> {
    data: &'a [u8],
}

fn eof(offset: usize, wanted: usize, len: usize) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("read of {} bytes at offset {:#x} past end of {} byte buffer", wanted, offset, len),
    )
}

impl<'a> ByteView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteView { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn range(&self, offset: usize, count: usize) -> Result<&'a [u8], std::io::Error> {
        if offset.checked_add(count).is_none_or(|end| end > self.data.len()) {
            return Err(eof(offset, count, self.data.len()));
        }
        Ok(&self.data[offset..offset + count])
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8, std::io::Error> {
        Ok(self.range(offset, 1)?[0])
    }

    pub fn read_i8(&self, offset: usize) -> Result<i8, std::io::Error> {
        Ok(self.range(offset, 1)?[0] as i8)
    }

    pub fn read_u16(&self, offset: usize) -> Result<u16, std::io::Error> {
        Ok(LittleEndian::read_u16(self.range(offset, 2)?))
    }

    pub fn read_i16(&self, offset: usize) -> Result<i16, std::io::Error> {
        Ok(LittleEndian::read_i16(self.range(offset, 2)?))
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32, std::io::Error> {
        Ok(LittleEndian::read_u32(self.range(offset, 4)?))
    }

    pub fn read_i32(&self, offset: usize) -> Result<i32, std::io::Error> {
        Ok(LittleEndian::read_i32(self.range(offset, 4)?))
    }

    pub fn read_f32(&self, offset: usize) -> Result<f32, std::io::Error> {
        Ok(LittleEndian::read_f32(self.range(offset, 4)?))
    }

    pub fn read_bytes(&self, offset: usize, count: usize) -> Result<&'a [u8], std::io::Error> {
        self.range(offset, count)
    }
}

/// Fixed-size zero-initialized output buffer with absolute-offset writes.
///
/// The encoders size the buffer up front from the layout allocator, then
/// patch every record in at its reserved offset. Writing past the end is a
/// layout bug, so it panics rather than growing the buffer.
#[derive(Debug, Clone)]
pub struct ByteWriter {
    data: Vec<u8>,
}

impl ByteWriter {
    pub fn with_len(len: usize) -> Self {
        ByteWriter { data: vec![0u8; len] }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn range_mut(&mut self, offset: usize, count: usize) -> &mut [u8] {
        assert!(
            offset.checked_add(count).is_some_and(|end| end <= self.data.len()),
            "write of {} bytes at offset {:#x} past end of {} byte buffer",
            count,
            offset,
            self.data.len()
        );
        &mut self.data[offset..offset + count]
    }

    pub fn write_u8(&mut self, offset: usize, val: u8) {
        self.range_mut(offset, 1)[0] = val;
    }

    pub fn write_i8(&mut self, offset: usize, val: i8) {
        self.range_mut(offset, 1)[0] = val as u8;
    }

    pub fn write_u16(&mut self, offset: usize, val: u16) {
        LittleEndian::write_u16(self.range_mut(offset, 2), val);
    }

    pub fn write_i16(&mut self, offset: usize, val: i16) {
        LittleEndian::write_i16(self.range_mut(offset, 2), val);
    }

    pub fn write_u32(&mut self, offset: usize, val: u32) {
        LittleEndian::write_u32(self.range_mut(offset, 4), val);
    }

    pub fn write_i32(&mut self, offset: usize, val: i32) {
        LittleEndian::write_i32(self.range_mut(offset, 4), val);
    }

    pub fn write_f32(&mut self, offset: usize, val: f32) {
        LittleEndian::write_f32(self.range_mut(offset, 4), val);
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.range_mut(offset, bytes.len()).copy_from_slice(bytes);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_scalars() {
        let mut writer = ByteWriter::with_len(16);
        writer.write_u32(0, 0xDEADBEEF);
        writer.write_f32(4, 1.5);
        writer.write_i16(8, -42);
        writer.write_u8(10, 7);
        let bytes = writer.into_inner();

        let view = ByteView::new(&bytes);
        assert_eq!(view.read_u32(0).unwrap(), 0xDEADBEEF);
        assert_eq!(view.read_f32(4).unwrap(), 1.5);
        assert_eq!(view.read_i16(8).unwrap(), -42);
        assert_eq!(view.read_u8(10).unwrap(), 7);
    }

    #[test]
    fn test_read_past_end() {
        let bytes = [1u8, 2, 3];
        let view = ByteView::new(&bytes);
        assert!(view.read_u32(0).is_err());
        assert!(view.read_u8(3).is_err());
        assert_eq!(view.read_u16(1).unwrap(), 0x0302);
    }

    #[test]
    #[should_panic]
    fn test_write_past_end_panics() {
        let mut writer = ByteWriter::with_len(2);
        writer.write_u32(0, 1);
    }

    #[test]
    fn test_writer_zero_initialized() {
        let writer = ByteWriter::with_len(8);
        assert_eq!(writer.into_inner(), vec![0u8; 8]);
    }
}
