// THEORY (1D Pixel Heuristics):
// The `Pixel` module is the most fundamental unit of the meter. It is a "dumb"
// data container for a single RGBA pixel plus the one single-pixel heuristic the
// meter needs: perceived brightness. Anything that needs more than one pixel
// (averaging over the metering spot) belongs in `spot`.
//
// Brightness uses the fixed Rec. 601 luma weights on the gamma-encoded byte
// values, exactly as a browser canvas hands them over. No linearization, no
// colour science beyond that weighting. Alpha is carried but never weighted.

pub mod pixel {
    pub type Byte = u8;
    pub type Channel = Byte;
    pub type Luminance = f64;

    pub const CHANNELS: usize = 4;

    const LUMA_RED: f64 = 0.299;
    const LUMA_GREEN: f64 = 0.587;
    const LUMA_BLUE: f64 = 0.114;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (transparency) channel value (0-255).
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Pixel {
                red,
                green,
                blue,
                alpha,
            }
        }

        /// Luminance estimate (Rec. 601 luma) in 0.0..=255.0.
        pub fn luminance(&self) -> Luminance {
            LUMA_RED * self.red as f64 + LUMA_GREEN * self.green as f64 + LUMA_BLUE * self.blue as f64
        }
    }

    impl From<&[Byte]> for Pixel {
        /// Builds a pixel from an RGBA byte slice. Missing trailing channels read as
        /// zero, except alpha which reads as opaque.
        fn from(bytes: &[Byte]) -> Self {
            let at = |i: usize, fallback: Byte| bytes.get(i).copied().unwrap_or(fallback);
            Pixel::new(at(0, 0), at(1, 0), at(2, 0), at(3, 255))
        }
    }

    impl From<image::Rgba<u8>> for Pixel {
        fn from(px: image::Rgba<u8>) -> Self {
            let [red, green, blue, alpha] = px.0;
            Pixel::new(red, green, blue, alpha)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::*;

    #[test]
    fn white_and_black_span_the_full_range() {
        assert!((Pixel::new(255, 255, 255, 255).luminance() - 255.0).abs() < 1e-9);
        assert_eq!(Pixel::new(0, 0, 0, 255).luminance(), 0.0);
    }

    #[test]
    fn green_dominates_luma() {
        let red = Pixel::new(200, 0, 0, 255).luminance();
        let green = Pixel::new(0, 200, 0, 255).luminance();
        let blue = Pixel::new(0, 0, 200, 255).luminance();
        assert!(green > red && red > blue);
    }

    #[test]
    fn alpha_does_not_change_luma() {
        let opaque = Pixel::new(10, 20, 30, 255).luminance();
        let clear = Pixel::new(10, 20, 30, 0).luminance();
        assert_eq!(opaque, clear);
    }

    #[test]
    fn from_short_slice_defaults_alpha_to_opaque() {
        let px = Pixel::from(&[1u8, 2, 3][..]);
        assert_eq!(px, Pixel::new(1, 2, 3, 255));
    }
}
