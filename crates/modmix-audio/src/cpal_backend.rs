//! CPAL-based audio output.
//!
//! The engine runs on the caller's thread and pushes frames into an SPSC
//! ring buffer; the cpal callback drains it. About 100 ms of buffer keeps
//! the callback fed without adding noticeable latency.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use modmix_engine::Frame;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::traits::{AudioError, AudioOutput};

/// Stereo output through the default cpal device.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    producer: HeapProd<Frame>,
    consumer: Option<HeapCons<Frame>>,
    running: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Open the default output device. The stream itself starts on
    /// [`start`](AudioOutput::start).
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        // The callback assumes 2-channel interleaving
        config.channels = 2;

        let buffer_size = (config.sample_rate.0 as usize / 10) * 2;
        let (producer, consumer) = HeapRb::<Frame>::new(buffer_size).split();

        Ok(Self {
            device,
            config,
            stream: None,
            producer,
            consumer: Some(consumer),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    fn build_stream(&mut self) -> Result<(), AudioError> {
        let Some(mut consumer) = self.consumer.take() else {
            return Ok(());
        };
        let running = self.running.clone();
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }

                    for chunk in data.chunks_mut(channels) {
                        match consumer.try_pop() {
                            Some(frame) => {
                                let left = f32::from(frame.left) / 32768.0;
                                let right = f32::from(frame.right) / 32768.0;
                                for (i, sample) in chunk.iter_mut().enumerate() {
                                    *sample = match i {
                                        0 => left,
                                        1 => right,
                                        _ => 0.0,
                                    };
                                }
                            }
                            // Underrun: better a gap than stale data
                            None => chunk.fill(0.0),
                        }
                    }
                },
                |err| eprintln!("audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn write_frame(&mut self, frame: Frame) {
        while self.producer.try_push(frame).is_err() {
            std::hint::spin_loop();
        }
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.build_stream()?;
        self.running.store(true, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            stream
                .pause()
                .map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
