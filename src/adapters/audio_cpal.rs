//! cpal microphone capture.
//!
//! The cpal Stream type is not Send, so it lives on a dedicated audio
//! thread driven by a command channel. Samples flow through a lock-free
//! ring buffer sized for the maximum recording duration; level updates
//! are published on the event bus roughly ten times a second while a
//! stream is open.

use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::bus::{BusEvent, EventBus};
use crate::domain::{encode_wav, CaptureConfig, DomainError};
use crate::ports::{AudioInput, CaptureStream};

type RingProducer = ringbuf::HeapProd<i16>;
type RingConsumer = ringbuf::HeapCons<i16>;

/// Gain applied when mapping RMS to the 0..100 display range; speech RMS
/// rarely exceeds 0.25.
const LEVEL_GAIN: f32 = 400.0;

enum AudioCommand {
    Open {
        reply: oneshot::Sender<Result<(), DomainError>>,
    },
    Finalize {
        reply: oneshot::Sender<Result<Vec<i16>, DomainError>>,
    },
    Abort {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

fn default_device() -> Result<Device, DomainError> {
    cpal::default_host()
        .default_input_device()
        .ok_or_else(|| DomainError::Capture("no default input device available".to_string()))
}

fn stream_config(device: &Device) -> Result<(StreamConfig, SampleFormat), DomainError> {
    let supported = device
        .default_input_config()
        .map_err(|e| DomainError::Capture(format!("failed to get device config: {}", e)))?;
    debug!(
        sample_rate = ?supported.sample_rate(),
        channels = supported.channels(),
        format = ?supported.sample_format(),
        "device default config"
    );
    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    Ok((config, supported.sample_format()))
}

fn downmix(data: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Linear interpolation resampler; good enough for speech input.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = src_pos.fract();
        let sample = if src_idx + 1 < samples.len() {
            let s0 = samples[src_idx] as f64;
            let s1 = samples[src_idx + 1] as f64;
            (s0 + (s1 - s0) * frac) as i16
        } else if src_idx < samples.len() {
            samples[src_idx]
        } else {
            0
        };
        output.push(sample);
    }
    output
}

fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
    let rms = ((sum_squares / samples.len() as f64).sqrt() / 32767.0) as f32;
    (rms * LEVEL_GAIN).min(100.0)
}

#[allow(clippy::too_many_arguments)]
fn ingest(
    data: &[i16],
    channels: usize,
    device_rate: u32,
    target_rate: u32,
    producer: &mut RingProducer,
    level_window: &mut Vec<i16>,
    samples_per_update: usize,
    bus: &EventBus,
) {
    let mono = downmix(data, channels);
    let resampled = resample(&mono, device_rate, target_rate);

    let _ = producer.push_slice(&resampled);

    level_window.extend_from_slice(&resampled);
    if level_window.len() >= samples_per_update {
        let level = rms_level(level_window);
        bus.publish(BusEvent::AudioLevel { level });
        level_window.clear();
    }
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    target_rate: u32,
    samples_per_update: usize,
    mut producer: RingProducer,
    bus: EventBus,
) -> Result<Stream, DomainError> {
    let channels = config.channels as usize;
    let device_rate = config.sample_rate.0;
    let mut level_window: Vec<i16> = Vec::with_capacity(samples_per_update);

    let on_error = |err: cpal::StreamError| {
        error!(?err, "audio stream error");
    };

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                ingest(
                    data,
                    channels,
                    device_rate,
                    target_rate,
                    &mut producer,
                    &mut level_window,
                    samples_per_update,
                    &bus,
                );
            },
            on_error,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let converted: Vec<i16> = data
                    .iter()
                    .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
                    .collect();
                ingest(
                    &converted,
                    channels,
                    device_rate,
                    target_rate,
                    &mut producer,
                    &mut level_window,
                    samples_per_update,
                    &bus,
                );
            },
            on_error,
            None,
        ),
        other => {
            return Err(DomainError::Capture(format!(
                "unsupported sample format: {:?}",
                other
            )));
        }
    }
    .map_err(|e| DomainError::Capture(format!("failed to build input stream: {}", e)))?;

    Ok(stream)
}

/// Audio thread body. The Stream stays on this thread for its whole life.
fn audio_thread_main(config: CaptureConfig, bus: EventBus, mut cmd_rx: mpsc::Receiver<AudioCommand>) {
    let mut stream: Option<Stream> = None;
    let mut ring_consumer: Option<RingConsumer> = None;
    let samples_per_update =
        (config.sample_rate / config.level_updates_per_sec.max(1)) as usize;

    while let Some(cmd) = cmd_rx.blocking_recv() {
        match cmd {
            AudioCommand::Open { reply } => {
                let result = (|| -> Result<(), DomainError> {
                    if stream.is_some() {
                        return Err(DomainError::Capture(
                            "a capture stream is already open".to_string(),
                        ));
                    }

                    let device = default_device()?;
                    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
                    let (stream_config, sample_format) = stream_config(&device)?;

                    let ring = HeapRb::<i16>::new(config.buffer_capacity());
                    let (producer, consumer) = ring.split();

                    let new_stream = build_stream(
                        &device,
                        &stream_config,
                        sample_format,
                        config.sample_rate,
                        samples_per_update,
                        producer,
                        bus.clone(),
                    )?;
                    new_stream
                        .play()
                        .map_err(|e| DomainError::Capture(format!("failed to start stream: {}", e)))?;

                    stream = Some(new_stream);
                    ring_consumer = Some(consumer);
                    info!(device = %device_name, "capture stream opened");
                    Ok(())
                })();
                let _ = reply.send(result);
            }
            AudioCommand::Finalize { reply } => {
                let result = (|| -> Result<Vec<i16>, DomainError> {
                    stream.take();
                    let mut consumer = ring_consumer
                        .take()
                        .ok_or_else(|| DomainError::Capture("no open stream".to_string()))?;

                    let available = consumer.occupied_len();
                    let mut samples = vec![0i16; available];
                    let read = consumer.pop_slice(&mut samples);
                    samples.truncate(read);

                    bus.publish(BusEvent::AudioLevel { level: 0.0 });
                    info!(samples = samples.len(), "capture stream finalized");
                    Ok(samples)
                })();
                let _ = reply.send(result);
            }
            AudioCommand::Abort { reply } => {
                stream.take();
                ring_consumer.take();
                bus.publish(BusEvent::AudioLevel { level: 0.0 });
                info!("capture stream aborted");
                let _ = reply.send(());
            }
            AudioCommand::Shutdown => break,
        }
    }
    debug!("audio thread shutting down");
}

/// cpal-backed capture source. One instance owns the audio thread; each
/// `open` hands out a stream handle that must be finalized or aborted.
pub struct CpalAudioInput {
    config: CaptureConfig,
    cmd_tx: mpsc::Sender<AudioCommand>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl CpalAudioInput {
    pub fn new(config: CaptureConfig, bus: EventBus) -> Result<Self, DomainError> {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);

        let thread_config = config.clone();
        let thread_handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || audio_thread_main(thread_config, bus, cmd_rx))
            .map_err(|e| DomainError::Capture(format!("failed to spawn audio thread: {}", e)))?;

        info!(
            buffer_duration = config.buffer_duration_secs,
            sample_rate = config.sample_rate,
            "cpal capture initialized"
        );

        Ok(Self {
            config,
            cmd_tx,
            thread_handle: Mutex::new(Some(thread_handle)),
        })
    }
}

impl Drop for CpalAudioInput {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(AudioCommand::Shutdown);
        if let Some(handle) = self.thread_handle.lock().take() {
            let _ = handle.join();
        }
    }
}

#[async_trait]
impl AudioInput for CpalAudioInput {
    async fn open(&self) -> Result<Box<dyn CaptureStream>, DomainError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(AudioCommand::Open { reply: reply_tx })
            .await
            .map_err(|_| DomainError::Capture("audio thread not running".to_string()))?;
        reply_rx
            .await
            .map_err(|_| DomainError::Capture("audio thread did not respond".to_string()))??;

        Ok(Box::new(CpalCaptureStream {
            cmd_tx: self.cmd_tx.clone(),
            sample_rate: self.config.sample_rate,
        }))
    }
}

struct CpalCaptureStream {
    cmd_tx: mpsc::Sender<AudioCommand>,
    sample_rate: u32,
}

#[async_trait]
impl CaptureStream for CpalCaptureStream {
    async fn finalize(self: Box<Self>) -> Result<Vec<u8>, DomainError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(AudioCommand::Finalize { reply: reply_tx })
            .await
            .map_err(|_| DomainError::Capture("audio thread not running".to_string()))?;
        let samples = reply_rx
            .await
            .map_err(|_| DomainError::Capture("audio thread did not respond".to_string()))??;
        encode_wav(&samples, self.sample_rate)
    }

    async fn abort(self: Box<Self>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(AudioCommand::Abort { reply: reply_tx })
            .await
            .is_err()
        {
            warn!("audio thread not running during abort");
            return;
        }
        let _ = reply_rx.await;
    }
}
