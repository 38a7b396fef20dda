//! Frameport Render Engine
//!
//! Real-time frame export: every application tick the rendered scene
//! texture is copied to the CPU, handed to an encoder subprocess through a
//! bounded buffer, and the playback clock is stepped by exactly one frame.
//!
//! # Pipeline Architecture
//!
//! ```text
//! scene texture ──► ReadbackAdapter ──► FrameBuffer (bounded) ──► encoder thread
//!                        │                                            │
//!                    FramePool ◄──── frames return on drop ───────────┤
//!                                                                     ▼
//! audio engine ───► PCM side file ─────────────────┐        ffmpeg (rawvideo stdin)
//!       ▲                                          │                  │
//!       │                                          ▼                  ▼
//! RenderTiming (one frame per tick) ──────►  mux pass (-c:v copy) ◄─ video.tmp
//!                                                  │
//!                                                  ▼
//!                                             output.mp4
//! ```

pub mod audio_file;
pub mod codec;
pub mod encoder;
pub mod frame_buffer;
pub mod frame_pool;
pub mod job;
pub mod paths;
pub mod playback;
pub mod readback;
pub mod timing;

pub use codec::{EncodeTarget, PcmFormat};
pub use encoder::{
    is_encoder_available, AudioExport, DriverState, EncoderBinary, EncoderDriver,
    EncoderJobConfig, MuxOutcome, PipeBrokenCallback,
};
pub use frame_buffer::{FrameBuffer, TryEnqueueError};
pub use frame_pool::{Frame, FramePool};
pub use job::{ExportJob, ExportReport, JobOptions, JobState};
pub use playback::{
    AudioEngine, ConstantTempo, ManualPlayback, PlaybackEngine, SoundtrackBounds, TempoMap,
};
pub use readback::{MappedRegion, ReadableTexture, ReadbackAdapter, TextureDescription};
pub use timing::RenderTiming;
