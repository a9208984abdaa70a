//! Writable pixel view over a free buffer.

use waylite_protocol::ShmFormat;

/// A bounds-checked view of one buffer's pixels.
///
/// Only handed out for buffers in the `Free` state. Colors are `0xAARRGGBB`
/// words stored little-endian, which is the byte layout of both supported
/// formats.
#[derive(Debug)]
pub struct Canvas<'a> {
    data: &'a mut [u8],
    width: u32,
    height: u32,
    stride: u32,
    format: ShmFormat,
}

impl<'a> Canvas<'a> {
    /// Wrap `data`, which must hold `stride * height` bytes.
    pub(crate) fn new(
        data: &'a mut [u8],
        width: u32,
        height: u32,
        stride: u32,
        format: ShmFormat,
    ) -> Self {
        debug_assert!(data.len() >= stride as usize * height as usize);
        Self {
            data,
            width,
            height,
            stride,
            format,
        }
    }

    /// Wrap caller-owned ARGB pixels, such as an off-screen frame.
    ///
    /// Returns `None` if a row does not fit in `stride` or `data` is shorter
    /// than `stride * height`.
    pub fn from_bytes(data: &'a mut [u8], width: u32, height: u32, stride: u32) -> Option<Self> {
        if u64::from(stride) < u64::from(width) * 4
            || data.len() < stride as usize * height as usize
        {
            return None;
        }
        Some(Self::new(data, width, height, stride, ShmFormat::Argb8888))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[must_use]
    pub fn format(&self) -> ShmFormat {
        self.format
    }

    /// Raw bytes, row-major with `stride` bytes per row.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.data
    }

    /// Fill every pixel with `color`.
    pub fn clear(&mut self, color: u32) {
        self.fill_rect(0, 0, self.width, self.height, color);
    }

    /// Fill a rectangle, clipped to the canvas.
    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: u32) {
        let x0 = x.max(0) as i64;
        let y0 = y.max(0) as i64;
        let x1 = (i64::from(x) + i64::from(width)).min(i64::from(self.width));
        let y1 = (i64::from(y) + i64::from(height)).min(i64::from(self.height));
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let pixel = color.to_le_bytes();
        for row in y0..y1 {
            let start = row as usize * self.stride as usize + x0 as usize * 4;
            let end = row as usize * self.stride as usize + x1 as usize * 4;
            for chunk in self.data[start..end].chunks_exact_mut(4) {
                chunk.copy_from_slice(&pixel);
            }
        }
    }

    /// Set one pixel. Out-of-range coordinates are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, color: u32) {
        if x < self.width && y < self.height {
            let at = y as usize * self.stride as usize + x as usize * 4;
            self.data[at..at + 4].copy_from_slice(&color.to_le_bytes());
        }
    }

    /// Read one pixel back.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = y as usize * self.stride as usize + x as usize * 4;
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.data[at..at + 4]);
        Some(u32::from_le_bytes(word))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_fills_all_pixels() {
        let mut data = vec![0u8; 4 * 4 * 3];
        let mut canvas = Canvas::new(&mut data, 4, 3, 16, ShmFormat::Argb8888);
        canvas.clear(0xff11_2233);
        assert_eq!(canvas.pixel(0, 0), Some(0xff11_2233));
        assert_eq!(canvas.pixel(3, 2), Some(0xff11_2233));
        assert_eq!(&data[..4], &[0x33, 0x22, 0x11, 0xff]);
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut data = vec![0u8; 4 * 4 * 4];
        let mut canvas = Canvas::new(&mut data, 4, 4, 16, ShmFormat::Xrgb8888);
        canvas.fill_rect(-2, 2, 3, 10, 7);
        assert_eq!(canvas.pixel(0, 2), Some(7));
        assert_eq!(canvas.pixel(0, 3), Some(7));
        assert_eq!(canvas.pixel(1, 3), Some(0));
    }

    #[test]
    fn test_fill_rect_outside_is_noop() {
        let mut data = vec![0u8; 16];
        let mut canvas = Canvas::new(&mut data, 2, 2, 8, ShmFormat::Argb8888);
        canvas.fill_rect(5, 5, 4, 4, 1);
        canvas.fill_rect(0, 0, 0, 2, 1);
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_stride_padding_untouched() {
        // Row stride larger than width * 4
        let mut data = vec![0u8; 12 * 2];
        let mut canvas = Canvas::new(&mut data, 2, 2, 12, ShmFormat::Argb8888);
        canvas.clear(0xffff_ffff);
        assert_eq!(&data[8..12], &[0, 0, 0, 0]);
        assert_eq!(&data[20..24], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_from_bytes_checks_geometry() {
        let mut data = vec![0u8; 32];
        assert!(Canvas::from_bytes(&mut data, 4, 2, 12).is_none());
        assert!(Canvas::from_bytes(&mut data, 4, 3, 16).is_none());
        let canvas = Canvas::from_bytes(&mut data, 4, 2, 16).unwrap();
        assert_eq!(canvas.format(), ShmFormat::Argb8888);
    }

    #[test]
    fn test_put_pixel_out_of_range() {
        let mut data = vec![0u8; 16];
        let mut canvas = Canvas::new(&mut data, 2, 2, 8, ShmFormat::Argb8888);
        canvas.put_pixel(2, 0, 9);
        canvas.put_pixel(1, 1, 9);
        assert_eq!(canvas.pixel(1, 1), Some(9));
        assert_eq!(canvas.pixel(2, 0), None);
    }
}
