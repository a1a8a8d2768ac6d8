//! Frame decoder seam
//!
//! The radio protocol lives behind [`FrameDecoder`]. The sampler feeds it one
//! pulse per rising edge and copies the frame out whenever it reports
//! completion. Protocol decoders are stateful and are owned by the sampler
//! thread, so the trait only requires `Send`.
//!
//! [`ReplayDecoder`] is a bench decoder: it ignores pulse shapes and reports
//! the next configured frame every N pulses. It exercises the whole pipeline
//! without a transmitter in range.

use crate::config::DecoderSettings;
use crate::error::{RelayError, Result};
use crate::types::SensorFrame;

/// Stateful pulse-to-frame reconstruction
pub trait FrameDecoder: Send {
    /// Feed one pulse measured in sampling ticks
    ///
    /// `duration_ticks` spans from the previous rising edge to this one and
    /// `low_ticks` counts the ticks spent low in between. Returns true when a
    /// complete, validated frame is available from [`current_frame`].
    ///
    /// [`current_frame`]: FrameDecoder::current_frame
    fn pulse(&mut self, duration_ticks: u32, low_ticks: u32) -> bool;

    /// The most recently completed frame
    fn current_frame(&self) -> SensorFrame;
}

/// Bench decoder cycling through a fixed list of frames
#[derive(Debug, Clone)]
pub struct ReplayDecoder {
    frames: Vec<SensorFrame>,
    every_pulses: u32,
    pulses_seen: u32,
    next: usize,
    current: SensorFrame,
}

impl ReplayDecoder {
    /// Create a replay decoder; needs at least one frame and a non-zero period
    pub fn new(frames: Vec<SensorFrame>, every_pulses: u32) -> Result<Self> {
        if frames.is_empty() {
            return Err(RelayError::Config(
                "replay decoder needs at least one frame".to_string(),
            ));
        }
        if every_pulses == 0 {
            return Err(RelayError::Config(
                "replay decoder every_pulses must be at least 1".to_string(),
            ));
        }
        let current = frames[0];
        Ok(Self {
            frames,
            every_pulses,
            pulses_seen: 0,
            next: 0,
            current,
        })
    }
}

impl FrameDecoder for ReplayDecoder {
    fn pulse(&mut self, _duration_ticks: u32, _low_ticks: u32) -> bool {
        self.pulses_seen += 1;
        if self.pulses_seen < self.every_pulses {
            return false;
        }

        self.pulses_seen = 0;
        self.current = self.frames[self.next];
        self.next = (self.next + 1) % self.frames.len();
        true
    }

    fn current_frame(&self) -> SensorFrame {
        self.current
    }
}

/// Build the decoder selected in `[receiver.decoder]`
pub fn decoder_from_settings(settings: Option<&DecoderSettings>) -> Result<Box<dyn FrameDecoder>> {
    match settings {
        Some(DecoderSettings::Replay {
            every_pulses,
            frames,
        }) => {
            tracing::info!(
                "Using replay decoder: {} frame(s), one every {} pulses",
                frames.len(),
                every_pulses
            );
            Ok(Box::new(ReplayDecoder::new(frames.clone(), *every_pulses)?))
        }
        None => Err(RelayError::Config(
            "no frame decoder configured; add a [receiver.decoder] section".to_string(),
        )),
    }
}
