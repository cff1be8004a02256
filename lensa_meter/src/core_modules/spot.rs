// THEORY:
// The `spot` module turns a raw video frame into a single brightness sample.
// It is the bridge between the capture device and the exposure math.
//
// Key architectural principles:
// 1.  **Spot Metering**: Only a fixed-size square at the centre of the frame is
//     read. There is no multi-zone or matrix weighting; the rest of the frame is
//     ignored entirely.
// 2.  **Spatial Pooling**: The spot is reduced to the mean Rec. 601 luma of its
//     pixels, which also averages away single-pixel sensor noise.
// 3.  **Sampler Boundary**: `LumaSampler` is the seam between the meter and
//     whatever owns the camera. A sampler either yields a brightness in
//     [0, 255], reports that the frame is not ready yet (skip the tick), or
//     reports that capture is gone for good.

pub mod spot {
    use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};
    use crate::error::{MeterError, MeterResult};
    use image::RgbaImage;

    /// Mean luma of the metering spot, 0.0..=255.0.
    pub type Brightness = f64;

    pub const DEFAULT_SPOT_SIZE: u32 = 50;

    /// Centre-weighted spot meter over RGBA8 frames.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpotMeter {
        /// Edge length of the square metering spot in pixels.
        pub sample_size: u32,
    }

    impl Default for SpotMeter {
        fn default() -> Self {
            Self::new(DEFAULT_SPOT_SIZE)
        }
    }

    impl SpotMeter {
        pub fn new(sample_size: u32) -> Self {
            Self {
                sample_size: sample_size.max(1),
            }
        }

        /// Top-left corner of the spot for a frame of the given size, or `None`
        /// when the frame cannot hold the spot.
        pub fn spot_origin(&self, width: u32, height: u32) -> Option<(u32, u32)> {
            if width < self.sample_size || height < self.sample_size {
                return None;
            }
            Some(((width - self.sample_size) / 2, (height - self.sample_size) / 2))
        }

        /// Measures the mean luma of the centre spot of a tightly packed RGBA8 buffer.
        pub fn measure(&self, frame_buffer: &[u8], width: u32, height: u32) -> MeterResult<Brightness> {
            let expected = width as usize * height as usize * CHANNELS;
            if frame_buffer.len() != expected {
                return Err(MeterError::invalid_frame(format!(
                    "expected {expected} bytes for {width}x{height} RGBA, got {}",
                    frame_buffer.len()
                )));
            }

            let (start_x, start_y) = self.spot_origin(width, height).ok_or(MeterError::FrameNotReady {
                width,
                height,
                spot: self.sample_size,
            })?;

            let mut total = 0.0f64;
            for row in start_y..start_y + self.sample_size {
                let row_start = (row as usize * width as usize + start_x as usize) * CHANNELS;
                let row_end = row_start + self.sample_size as usize * CHANNELS;
                for pixel_bytes in frame_buffer[row_start..row_end].chunks_exact(CHANNELS) {
                    total += Pixel::from(pixel_bytes).luminance();
                }
            }

            let pixel_count = (self.sample_size as f64) * (self.sample_size as f64);
            Ok(total / pixel_count)
        }

        /// Convenience wrapper for frames decoded with the `image` crate.
        pub fn measure_image(&self, frame: &RgbaImage) -> MeterResult<Brightness> {
            self.measure(frame.as_raw(), frame.width(), frame.height())
        }
    }

    /// The capture side of the meter. Called once per sampling tick.
    pub trait LumaSampler {
        /// Returns the brightness of the current frame.
        ///
        /// `MeterError::FrameNotReady` means "skip this tick";
        /// `MeterError::CaptureUnavailable` means the source will never produce
        /// another sample.
        fn sample(&mut self) -> MeterResult<Brightness>;
    }

    /// Adapts any sequence of decoded frames into a `LumaSampler`.
    pub struct FrameSampler<I> {
        frames: I,
        meter: SpotMeter,
    }

    impl<I> FrameSampler<I>
    where
        I: Iterator<Item = RgbaImage>,
    {
        pub fn new(frames: I, meter: SpotMeter) -> Self {
            Self { frames, meter }
        }
    }

    impl<I> LumaSampler for FrameSampler<I>
    where
        I: Iterator<Item = RgbaImage>,
    {
        fn sample(&mut self) -> MeterResult<Brightness> {
            match self.frames.next() {
                Some(frame) => self.meter.measure_image(&frame),
                None => Err(MeterError::capture_unavailable("frame source exhausted")),
            }
        }
    }

    /// Wraps a closure as a sampler, for callers that already own the capture loop.
    pub struct FnSampler<F>(pub F);

    impl<F> LumaSampler for FnSampler<F>
    where
        F: FnMut() -> MeterResult<Brightness>,
    {
        fn sample(&mut self) -> MeterResult<Brightness> {
            (self.0)()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::spot::*;
    use crate::error::MeterError;
    use image::{Rgba, RgbaImage};

    fn solid(width: u32, height: u32, value: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([value, value, value, 255]))
    }

    #[test]
    fn uniform_frame_measures_its_grey_level() {
        let meter = SpotMeter::default();
        let brightness = meter.measure_image(&solid(320, 240, 128)).unwrap();
        assert!((brightness - 128.0).abs() < 1e-9);
    }

    #[test]
    fn only_the_centre_spot_is_read() {
        let mut frame = solid(200, 100, 0);
        let meter = SpotMeter::new(10);
        let (x0, y0) = meter.spot_origin(200, 100).unwrap();
        assert_eq!((x0, y0), (95, 45));
        for y in y0..y0 + 10 {
            for x in x0..x0 + 10 {
                frame.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let brightness = meter.measure_image(&frame).unwrap();
        assert!((brightness - 255.0).abs() < 1e-9);
    }

    #[test]
    fn frame_smaller_than_spot_is_not_ready() {
        let meter = SpotMeter::new(50);
        let err = meter.measure_image(&solid(40, 40, 10)).unwrap_err();
        assert!(matches!(err, MeterError::FrameNotReady { width: 40, height: 40, spot: 50 }));
    }

    #[test]
    fn mismatched_buffer_length_is_rejected() {
        let meter = SpotMeter::new(2);
        let err = meter.measure(&[0u8; 10], 4, 4).unwrap_err();
        assert!(matches!(err, MeterError::InvalidFrame(_)));
    }

    #[test]
    fn frame_sampler_reports_capture_loss_when_exhausted() {
        let frames = vec![solid(60, 60, 255)];
        let mut sampler = FrameSampler::new(frames.into_iter(), SpotMeter::default());
        assert!((sampler.sample().unwrap() - 255.0).abs() < 1e-9);
        assert!(sampler.sample().unwrap_err().is_capture_lost());
    }
}
