//! Test data builders for creating test objects

use pose_pipeline::types::{Frame, FrameShape, PixelFormat};

/// Builder for test frames with a known byte sum
pub struct FrameBuilder {
    height: usize,
    width: usize,
    format: PixelFormat,
    fill: u8,
    sum: Option<u8>,
}

impl FrameBuilder {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            format: PixelFormat::Rgb8,
            fill: 0,
            sum: None,
        }
    }

    pub fn shape(shape: FrameShape) -> Self {
        Self::new(shape.height, shape.width)
    }

    pub fn format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn fill(mut self, value: u8) -> Self {
        self.fill = value;
        self
    }

    /// Black frame whose bytes add up to `sum` (first byte set)
    pub fn sum(mut self, sum: u8) -> Self {
        self.sum = Some(sum);
        self
    }

    pub fn build(self) -> Frame {
        let mut frame = Frame::filled(self.height, self.width, self.format, self.fill);
        if let Some(sum) = self.sum {
            frame.data_mut().fill(0);
            frame.data_mut()[0] = sum;
        }
        frame
    }
}

/// Frames with the given byte sums, in order
pub fn frames_with_sums(shape: FrameShape, sums: &[u8]) -> Vec<Frame> {
    sums.iter()
        .map(|&s| FrameBuilder::shape(shape).sum(s).build())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_builder() {
        let frame = FrameBuilder::new(2, 3).sum(42).build();

        assert_eq!(frame.height(), 2);
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.byte_sum(), 42);
    }
}
