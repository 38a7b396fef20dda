//! Synthetic scene standing in for the host renderer: a moving test pattern
//! and a sine-tone audio engine.

use std::f64::consts::TAU;

use frameport_common::FrameportResult;
use frameport_render_engine::{AudioEngine, MappedRegion, ReadableTexture, TextureDescription};
use frameport_render_model::Resolution;

/// Row alignment of the staging texture, as graphics drivers commonly use.
const ROW_ALIGNMENT: usize = 256;

/// BGRA test pattern with color bars and a bar sweeping once per second.
pub struct TestPattern {
    size: Resolution,
    row_pitch: usize,
    pixels: Vec<u8>,
}

impl TestPattern {
    pub fn new(size: Resolution) -> Self {
        let stride = size.width as usize * 4;
        let row_pitch = stride.div_ceil(ROW_ALIGNMENT) * ROW_ALIGNMENT;
        Self {
            size,
            row_pitch,
            pixels: vec![0; row_pitch * size.height as usize],
        }
    }

    pub fn row_pitch(&self) -> usize {
        self.row_pitch
    }

    /// Redraw the pattern for scene time `time_secs`.
    pub fn draw(&mut self, time_secs: f64) {
        const BARS: [[u8; 3]; 7] = [
            [255, 255, 255],
            [255, 255, 0],
            [0, 255, 255],
            [0, 255, 0],
            [255, 0, 255],
            [255, 0, 0],
            [0, 0, 255],
        ];

        let width = self.size.width as usize;
        let sweep = ((time_secs.rem_euclid(1.0)) * width as f64) as usize;
        let sweep_width = (width / 32).max(1);

        for (y, row) in self.pixels.chunks_exact_mut(self.row_pitch).enumerate() {
            let dim = (y * 127 / self.size.height.max(1) as usize) as u8;
            for (x, pixel) in row[..width * 4].chunks_exact_mut(4).enumerate() {
                let [r, g, b] = if x >= sweep && x < sweep + sweep_width {
                    [0, 0, 0]
                } else {
                    let [r, g, b] = BARS[x * BARS.len() / width];
                    [r.saturating_sub(dim), g.saturating_sub(dim), b.saturating_sub(dim)]
                };
                pixel.copy_from_slice(&[b, g, r, 255]);
            }
        }
    }
}

impl ReadableTexture for TestPattern {
    fn description(&self) -> TextureDescription {
        TextureDescription {
            width: self.size.width,
            height: self.size.height,
        }
    }

    fn is_released(&self) -> bool {
        false
    }

    fn map_for_read(&self) -> FrameportResult<MappedRegion<'_>> {
        Ok(MappedRegion {
            data: &self.pixels,
            row_pitch: self.row_pitch,
        })
    }

    fn unmap(&self) {}
}

/// Audio engine producing a steady sine tone.
pub struct SineTone {
    frequency: f64,
    amplitude: f32,
    sample_rate: u32,
    channels: u16,
    phase: f64,
    mixed_secs: f64,
}

impl SineTone {
    pub fn new(frequency: f64) -> Self {
        Self {
            frequency,
            amplitude: 0.2,
            sample_rate: 48_000,
            channels: 2,
            phase: 0.0,
            mixed_secs: 0.0,
        }
    }

    /// Seconds of audio the mixer advanced since recording started.
    pub fn mixed_secs(&self) -> f64 {
        self.mixed_secs
    }
}

impl AudioEngine for SineTone {
    fn prepare_recording(&mut self, fps: f64) {
        tracing::debug!(fps, frequency = self.frequency, "Sine tone recording started");
        self.phase = 0.0;
        self.mixed_secs = 0.0;
    }

    fn end_recording(&mut self, _fps: f64) {
        tracing::debug!(mixed_secs = self.mixed_secs, "Sine tone recording ended");
    }

    fn complete_frame(&mut self, delta_secs: f64) {
        self.mixed_secs += delta_secs;
    }

    fn last_mixdown_buffer(&mut self, duration_secs: f64) -> Vec<f32> {
        let frames = (duration_secs * self.sample_rate as f64).round().max(0.0) as usize;
        let step = TAU * self.frequency / self.sample_rate as f64;
        let mut samples = Vec::with_capacity(frames * self.channels as usize);
        for _ in 0..frames {
            let value = self.amplitude * self.phase.sin() as f32;
            samples.extend(std::iter::repeat(value).take(self.channels as usize));
            self.phase = (self.phase + step) % TAU;
        }
        samples
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
