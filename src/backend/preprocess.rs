//! Frame to input-buffer coercion
//!
//! Frames arrive in whatever size and pixel format the source delivers. The
//! engine input buffer has a fixed RGB shape, so every submission goes through
//! [`copy_into_input`], which converts to RGB and resizes with nearest-neighbor
//! sampling (no interpolation).

use crate::types::{Frame, FrameShape, PixelFormat};

/// Copy `frame` into `input`, converting to RGB and resizing to `shape`
///
/// `input` must be exactly `shape.len()` bytes and `shape.channels` must be 3.
/// An empty frame fills the buffer with zeros.
pub fn copy_into_input(frame: &Frame, input: &mut [u8], shape: FrameShape) {
    debug_assert_eq!(input.len(), shape.len());
    debug_assert_eq!(shape.channels, 3);

    if frame.height() == 0 || frame.width() == 0 {
        input.fill(0);
        return;
    }

    // Fast path: same size, already RGB
    if frame.format() == PixelFormat::Rgb8
        && frame.height() == shape.height
        && frame.width() == shape.width
    {
        input.copy_from_slice(frame.data());
        return;
    }

    let columns: Vec<usize> = (0..shape.width)
        .map(|x| nearest_source_index(x, shape.width, frame.width()))
        .collect();

    for y in 0..shape.height {
        let src_row = nearest_source_index(y, shape.height, frame.height());
        let row_start = y * shape.width * 3;
        for (x, &src_col) in columns.iter().enumerate() {
            let offset = row_start + x * 3;
            input[offset..offset + 3].copy_from_slice(&frame.rgb_at(src_row, src_col));
        }
    }
}

/// Nearest source index for destination index `dst` when scaling `src_len` to `dst_len`
fn nearest_source_index(dst: usize, dst_len: usize, src_len: usize) -> usize {
    ((dst * src_len) / dst_len).min(src_len - 1)
}
