//! Per-frame camera background replacement.
//!
//! For each incoming frame the compositor asks a [`SegmentationProvider`] for
//! a person mask, renders the selected [`BackgroundEffect`] into a scratch
//! image the size of the frame, and lays the masked person pixels over it.
//! Only one frame is ever in flight; the compositor holds no queue.

use std::future::Future;

use image::imageops::{self, FilterType};
use image::{GrayImage, Rgba, RgbaImage};

use crate::error::SegmentationError;
use crate::params::Rgb;

/// One decoded video frame. `timestamp_us` is carried through untouched.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub timestamp_us: i64,
    pub image: RgbaImage,
}

impl VideoFrame {
    pub fn new(timestamp_us: i64, image: RgbaImage) -> Self {
        Self { timestamp_us, image }
    }
}

#[derive(Debug, Clone)]
pub enum BackgroundEffect {
    /// Gaussian blur of the frame itself.
    Blur { sigma: f32 },
    /// Mirror split around the subject.
    Mirror,
    /// Static picture, stretched to the frame size.
    Image(RgbaImage),
    Color(Rgb),
    /// Fully transparent background.
    Cleared,
}

impl Default for BackgroundEffect {
    fn default() -> Self {
        BackgroundEffect::Blur { sigma: 8.0 }
    }
}

/// Person-segmentation mask: 255 is person, 0 is background.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    mask: GrayImage,
}

impl SegmentationMask {
    pub fn new(mask: GrayImage) -> Self {
        Self { mask }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    /// Resamples the mask when the provider worked at a different resolution.
    pub fn fitted(self, width: u32, height: u32) -> Self {
        if self.mask.dimensions() == (width, height) {
            return self;
        }
        Self { mask: imageops::resize(&self.mask, width, height, FilterType::Triangle) }
    }

    /// Person coverage at a pixel in `[0, 1]`.
    pub fn coverage(&self, x: u32, y: u32) -> f32 {
        self.mask.get_pixel(x, y).0[0] as f32 / 255.0
    }

    /// Coverage-weighted mean x position as a fraction of the width.
    /// `None` when the mask is empty.
    pub fn centroid_x(&self) -> Option<f32> {
        let (width, _) = self.mask.dimensions();
        let mut weight = 0.0f64;
        let mut sum = 0.0f64;
        for (x, _, px) in self.mask.enumerate_pixels() {
            let w = px.0[0] as f64;
            weight += w;
            sum += w * (x as f64 + 0.5);
        }
        if weight == 0.0 || width == 0 {
            return None;
        }
        Some((sum / weight / width as f64) as f32)
    }
}

/// "Given a frame, return a mask". The only suspending step of the pipeline.
pub trait SegmentationProvider {
    fn segment(
        &mut self,
        frame: &RgbaImage,
    ) -> impl Future<Output = Result<Option<SegmentationMask>, SegmentationError>>;
}

/// Returns the same mask for every frame.
#[derive(Debug, Clone)]
pub struct StaticMaskProvider {
    mask: SegmentationMask,
}

impl StaticMaskProvider {
    pub fn new(mask: GrayImage) -> Self {
        Self { mask: SegmentationMask::new(mask) }
    }
}

impl SegmentationProvider for StaticMaskProvider {
    async fn segment(&mut self, _frame: &RgbaImage) -> Result<Option<SegmentationMask>, SegmentationError> {
        Ok(Some(self.mask.clone()))
    }
}

/// Keys on brightness: pixels at or above `threshold` count as the person,
/// with a linear ramp `softness` levels wide below it.
#[derive(Debug, Clone, Copy)]
pub struct LumaKeyProvider {
    pub threshold: u8,
    pub softness: u8,
}

impl LumaKeyProvider {
    pub fn new(threshold: u8) -> Self {
        Self { threshold, softness: 16 }
    }

    fn key(&self, luma: u8) -> u8 {
        if luma >= self.threshold {
            return 255;
        }
        let below = self.threshold - luma;
        if self.softness == 0 || below >= self.softness {
            return 0;
        }
        (255 - (below as u32 * 255 / self.softness as u32)) as u8
    }
}

impl SegmentationProvider for LumaKeyProvider {
    async fn segment(&mut self, frame: &RgbaImage) -> Result<Option<SegmentationMask>, SegmentationError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Ok(None);
        }
        let mask = GrayImage::from_fn(width, height, |x, y| {
            let [r, g, b, _] = frame.get_pixel(x, y).0;
            let luma = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8;
            image::Luma([self.key(luma)])
        });
        Ok(Some(SegmentationMask::new(mask)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompositorStats {
    pub frames_processed: u64,
    /// Frames emitted background-only because no mask was available.
    pub mask_fallbacks: u64,
}

pub struct FrameCompositor<P: SegmentationProvider> {
    provider: P,
    effect: BackgroundEffect,
    /// `Image` effect resized to the last frame size.
    scaled_image: Option<RgbaImage>,
    stats: CompositorStats,
}

impl<P: SegmentationProvider> FrameCompositor<P> {
    pub fn new(provider: P, effect: BackgroundEffect) -> Self {
        Self {
            provider,
            effect,
            scaled_image: None,
            stats: CompositorStats::default(),
        }
    }

    pub fn set_effect(&mut self, effect: BackgroundEffect) {
        self.scaled_image = None;
        self.effect = effect;
    }

    pub fn effect(&self) -> &BackgroundEffect {
        &self.effect
    }

    pub fn stats(&self) -> CompositorStats {
        self.stats
    }

    /// Produces the output for one frame and drops the input.
    ///
    /// Segmentation failures are not propagated: the frame is emitted with
    /// the background only.
    pub async fn process(&mut self, frame: VideoFrame) -> VideoFrame {
        let VideoFrame { timestamp_us, image } = frame;
        let (width, height) = image.dimensions();

        let mask = match self.provider.segment(&image).await {
            Ok(Some(mask)) => Some(mask.fitted(width, height)),
            Ok(None) => {
                log::warn!("no segmentation mask for frame at {}us; background only", timestamp_us);
                None
            }
            Err(e) => {
                log::warn!("{} (frame at {}us); background only", e, timestamp_us);
                None
            }
        };

        let mut output = self.render_background(&image, mask.as_ref());
        match &mask {
            Some(mask) => composite_person(&mut output, &image, mask),
            None => self.stats.mask_fallbacks += 1,
        }
        self.stats.frames_processed += 1;

        VideoFrame { timestamp_us, image: output }
    }

    /// Processes frames strictly one at a time, handing each result to `sink`
    /// before pulling the next input. Inputs are pulled lazily, so a source
    /// that decodes on demand keeps a single frame in memory. Stops at the
    /// first source or sink error.
    pub async fn run<I, F, E>(&mut self, frames: I, mut sink: F) -> Result<u64, E>
    where
        I: IntoIterator<Item = Result<VideoFrame, E>>,
        F: FnMut(VideoFrame) -> Result<(), E>,
    {
        let mut emitted = 0;
        for frame in frames {
            let out = self.process(frame?).await;
            sink(out)?;
            emitted += 1;
        }
        Ok(emitted)
    }

    fn render_background(&mut self, frame: &RgbaImage, mask: Option<&SegmentationMask>) -> RgbaImage {
        let (width, height) = frame.dimensions();
        match &self.effect {
            BackgroundEffect::Blur { sigma } if *sigma > 0.0 => imageops::blur(frame, *sigma),
            BackgroundEffect::Blur { .. } => frame.clone(),
            BackgroundEffect::Mirror => mirror_split(frame, mask.and_then(SegmentationMask::centroid_x)),
            BackgroundEffect::Image(picture) => {
                let fits = self
                    .scaled_image
                    .as_ref()
                    .is_some_and(|img| img.dimensions() == (width, height));
                if !fits {
                    self.scaled_image = Some(imageops::resize(picture, width, height, FilterType::Triangle));
                }
                match &self.scaled_image {
                    Some(img) => img.clone(),
                    None => RgbaImage::new(width, height),
                }
            }
            BackgroundEffect::Color(rgb) => {
                let [r, g, b] = rgb.to_bytes();
                RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]))
            }
            BackgroundEffect::Cleared => RgbaImage::new(width, height),
        }
    }
}

/// Mirrors the half of the frame away from the subject over the subject's
/// half. `centroid_x` is the subject position as a fraction of the width;
/// without one the whole frame is flipped horizontally.
pub fn mirror_split(frame: &RgbaImage, centroid_x: Option<f32>) -> RgbaImage {
    let cx = match centroid_x {
        Some(cx) => cx,
        None => return imageops::flip_horizontal(frame),
    };
    let (width, height) = frame.dimensions();
    let half = width / 2;
    let subject_left = cx < 0.5;
    let mut out = frame.clone();
    for y in 0..height {
        for x in 0..width {
            let in_subject_half = if subject_left { x < half } else { x >= width - half };
            if in_subject_half {
                out.put_pixel(x, y, *frame.get_pixel(width - 1 - x, y));
            }
        }
    }
    out
}

/// `out = person * m + background * (1 - m)` per channel, alpha included.
fn composite_person(background: &mut RgbaImage, frame: &RgbaImage, mask: &SegmentationMask) {
    for (x, y, bg) in background.enumerate_pixels_mut() {
        let m = mask.coverage(x, y);
        if m <= 0.0 {
            continue;
        }
        let fg = frame.get_pixel(x, y);
        for c in 0..4 {
            let blended = fg.0[c] as f32 * m + bg.0[c] as f32 * (1.0 - m);
            bg.0[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    /// Left half red, right half blue.
    fn split_frame(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, _| if x < width / 2 { RED } else { BLUE })
    }

    fn left_column_mask(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| if x == 0 { Luma([255]) } else { Luma([0]) })
    }

    struct FailingProvider;

    impl SegmentationProvider for FailingProvider {
        async fn segment(&mut self, _frame: &RgbaImage) -> Result<Option<SegmentationMask>, SegmentationError> {
            Err(SegmentationError::Unavailable("model not loaded".to_string()))
        }
    }

    #[test]
    fn test_color_background_with_person_cutout() {
        let provider = StaticMaskProvider::new(left_column_mask(4, 2));
        let green = Rgb::from_bytes(0, 255, 0);
        let mut compositor = FrameCompositor::new(provider, BackgroundEffect::Color(green));

        let out = pollster::block_on(compositor.process(VideoFrame::new(42, split_frame(4, 2))));
        assert_eq!(out.timestamp_us, 42);
        assert_eq!(*out.image.get_pixel(0, 0), RED);
        assert_eq!(*out.image.get_pixel(1, 1), Rgba([0, 255, 0, 255]));
        assert_eq!(*out.image.get_pixel(3, 0), Rgba([0, 255, 0, 255]));
        assert_eq!(compositor.stats().mask_fallbacks, 0);
    }

    #[test]
    fn test_segmentation_failure_falls_back_to_background() {
        let mut compositor = FrameCompositor::new(FailingProvider, BackgroundEffect::Cleared);
        let out = pollster::block_on(compositor.process(VideoFrame::new(0, split_frame(4, 4))));
        assert!(out.image.pixels().all(|p| *p == Rgba([0, 0, 0, 0])));
        assert_eq!(
            compositor.stats(),
            CompositorStats { frames_processed: 1, mask_fallbacks: 1 }
        );
    }

    #[test]
    fn test_mask_is_resized_to_frame() {
        let provider = StaticMaskProvider::new(GrayImage::from_pixel(2, 2, Luma([255])));
        let mut compositor = FrameCompositor::new(provider, BackgroundEffect::Cleared);
        let out = pollster::block_on(compositor.process(VideoFrame::new(0, split_frame(8, 6))));
        assert_eq!(out.image.dimensions(), (8, 6));
        let corner = out.image.get_pixel(7, 5).0;
        assert!(corner[2] >= 250 && corner[3] >= 250);
    }

    #[test]
    fn test_blur_background_keeps_person_sharp() {
        let provider = StaticMaskProvider::new(left_column_mask(8, 4));
        let mut compositor = FrameCompositor::new(provider, BackgroundEffect::Blur { sigma: 2.0 });

        let input = split_frame(8, 4);
        let out = pollster::block_on(compositor.process(VideoFrame::new(0, input.clone())));
        assert_eq!(out.image.dimensions(), (8, 4));
        for y in 0..4 {
            assert_eq!(*out.image.get_pixel(0, y), RED);
        }
        // Either side of the red/blue edge picks up the other colour.
        assert_ne!(out.image.get_pixel(3, 1), input.get_pixel(3, 1));
        assert_ne!(out.image.get_pixel(4, 1), input.get_pixel(4, 1));
    }

    #[test]
    fn test_zero_sigma_blur_passes_frame_through() {
        let mut compositor = FrameCompositor::new(FailingProvider, BackgroundEffect::Blur { sigma: 0.0 });
        let input = split_frame(4, 2);
        let out = pollster::block_on(compositor.process(VideoFrame::new(0, input.clone())));
        assert_eq!(out.image, input);
    }

    fn is_close(px: &Rgba<u8>, expected: Rgba<u8>) -> bool {
        px.0.iter().zip(expected.0).all(|(a, b)| a.abs_diff(b) <= 2)
    }

    #[test]
    fn test_image_background_follows_frame_size() {
        let green = Rgba([0, 255, 0, 255]);
        let picture = RgbaImage::from_pixel(3, 3, green);
        let mut compositor = FrameCompositor::new(FailingProvider, BackgroundEffect::Image(picture));

        let out = pollster::block_on(compositor.process(VideoFrame::new(0, split_frame(8, 4))));
        assert_eq!(out.image.dimensions(), (8, 4));
        assert!(out.image.pixels().all(|p| is_close(p, green)));

        let out = pollster::block_on(compositor.process(VideoFrame::new(1, split_frame(5, 7))));
        assert_eq!(out.image.dimensions(), (5, 7));
        assert_eq!(compositor.scaled_image.as_ref().map(|img| img.dimensions()), Some((5, 7)));
        assert!(out.image.pixels().all(|p| is_close(p, green)));
    }

    #[test]
    fn test_set_effect_drops_scaled_image() {
        let picture = RgbaImage::from_pixel(2, 2, Rgba([0, 255, 0, 255]));
        let mut compositor = FrameCompositor::new(FailingProvider, BackgroundEffect::Image(picture));
        pollster::block_on(compositor.process(VideoFrame::new(0, split_frame(4, 4))));
        assert!(compositor.scaled_image.is_some());

        // Same frame size, so a kept cache would still look valid.
        compositor.set_effect(BackgroundEffect::Image(RgbaImage::from_pixel(2, 2, BLUE)));
        assert!(compositor.scaled_image.is_none());
        let out = pollster::block_on(compositor.process(VideoFrame::new(1, split_frame(4, 4))));
        assert!(out.image.pixels().all(|p| is_close(p, BLUE)));
    }

    #[test]
    fn test_mirror_uses_mask_centroid() {
        // Subject on the left: the right (blue) half is mirrored over it.
        let mirrored = mirror_split(&split_frame(4, 1), Some(0.1));
        assert_eq!(*mirrored.get_pixel(0, 0), BLUE);
        assert_eq!(*mirrored.get_pixel(3, 0), BLUE);

        // Subject on the right: the left (red) half is mirrored over it.
        let mirrored = mirror_split(&split_frame(4, 1), Some(0.9));
        assert_eq!(*mirrored.get_pixel(0, 0), RED);
        assert_eq!(*mirrored.get_pixel(3, 0), RED);
    }

    #[test]
    fn test_mirror_without_mask_flips() {
        let flipped = mirror_split(&split_frame(4, 1), None);
        assert_eq!(*flipped.get_pixel(0, 0), BLUE);
        assert_eq!(*flipped.get_pixel(3, 0), RED);
    }

    #[test]
    fn test_centroid() {
        let mask = SegmentationMask::new(left_column_mask(4, 3));
        assert_eq!(mask.centroid_x(), Some(0.125));
        assert_eq!(SegmentationMask::new(GrayImage::new(4, 4)).centroid_x(), None);
    }

    #[test]
    fn test_luma_key_ramp() {
        let key = LumaKeyProvider { threshold: 100, softness: 20 };
        assert_eq!(key.key(100), 255);
        assert_eq!(key.key(200), 255);
        assert_eq!(key.key(80), 0);
        assert_eq!(key.key(90), 128);
    }

    #[test]
    fn test_run_processes_every_frame_in_order() {
        let mut compositor = FrameCompositor::new(LumaKeyProvider::new(128), BackgroundEffect::Mirror);
        let frames = (0..3).map(|i| Ok(VideoFrame::new(i * 33_000, split_frame(4, 2))));
        let mut seen = Vec::new();
        let count = pollster::block_on(compositor.run(frames, |f| {
            seen.push(f.timestamp_us);
            Ok::<(), ()>(())
        }))
        .unwrap();
        assert_eq!(count, 3);
        assert_eq!(seen, vec![0, 33_000, 66_000]);
        assert_eq!(compositor.stats().frames_processed, 3);
    }

    #[test]
    fn test_run_pulls_one_frame_at_a_time() {
        use std::cell::Cell;

        let mut compositor = FrameCompositor::new(FailingProvider, BackgroundEffect::Cleared);
        let decoded = Cell::new(0u32);
        let written = Cell::new(0u32);
        let frames = (0..5).map(|i| {
            // Every earlier frame has been emitted before the next is decoded.
            assert_eq!(decoded.get(), written.get());
            decoded.set(decoded.get() + 1);
            if i == 3 {
                Err("corrupt frame")
            } else {
                Ok(VideoFrame::new(i, split_frame(2, 2)))
            }
        });

        let result = pollster::block_on(compositor.run(frames, |_| {
            written.set(written.get() + 1);
            Ok(())
        }));
        assert_eq!(result, Err("corrupt frame"));
        assert_eq!(written.get(), 3);
        assert_eq!(decoded.get(), 4);
    }
}
