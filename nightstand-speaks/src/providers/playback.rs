//! Rodio-backed audio output for the offline engine.
//!
//! Each track owns a dedicated thread holding the output stream open, since
//! the stream handle is not `Send` on every platform. The thread exits when
//! the track is released.

use std::sync::Arc;
use std::sync::mpsc;

use rodio::{OutputStreamBuilder, Sink};
use tracing::debug;

use crate::errors::SpeechError;
use crate::traits::{AudioSink, AudioTrack};
use crate::types::PcmFormat;

/// [`AudioSink`] playing through the default output device.
#[derive(Debug, Clone, Copy, Default)]
pub struct RodioSink;

impl RodioSink {
    pub fn new() -> Self {
        Self
    }
}

impl AudioSink for RodioSink {
    fn open_static(&self, format: PcmFormat, len: usize) -> Result<Box<dyn AudioTrack>, SpeechError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Arc<Sink>, String>>();
        let (keepalive_tx, keepalive_rx) = mpsc::channel::<()>();

        std::thread::spawn(move || {
            let mut stream = match OutputStreamBuilder::open_default_stream() {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(format!("audio output unavailable: {e}")));
                    return;
                }
            };
            stream.log_on_drop(false);

            let sink = Arc::new(Sink::connect_new(stream.mixer()));
            sink.pause();
            if ready_tx.send(Ok(Arc::clone(&sink))).is_err() {
                return;
            }

            // blocks until the track drops its sender
            let _ = keepalive_rx.recv();
            sink.stop();
            drop(stream);
            debug!("rodio output stream closed");
        });

        let sink = ready_rx
            .recv()
            .map_err(|_| SpeechError::playback("audio output thread exited"))?
            .map_err(SpeechError::playback)?;

        Ok(Box::new(RodioTrack {
            sink,
            format,
            capacity: len,
            keepalive: Some(keepalive_tx),
        }))
    }
}

struct RodioTrack {
    sink: Arc<Sink>,
    format: PcmFormat,
    capacity: usize,
    keepalive: Option<mpsc::Sender<()>>,
}

impl AudioTrack for RodioTrack {
    fn write(&mut self, samples: &[f32]) -> Result<usize, SpeechError> {
        if self.keepalive.is_none() {
            return Err(SpeechError::playback("track already released"));
        }
        let accepted = samples.len().min(self.capacity);
        if accepted == 0 {
            return Ok(0);
        }
        self.sink.append(rodio::buffer::SamplesBuffer::new(
            self.format.channels,
            self.format.sample_rate,
            samples[..accepted].to_vec(),
        ));
        Ok(accepted)
    }

    fn play(&mut self) -> Result<(), SpeechError> {
        self.sink.play();
        Ok(())
    }

    fn is_playing(&self) -> bool {
        !self.sink.is_paused() && !self.sink.empty()
    }

    fn stop(&mut self) {
        self.sink.stop();
    }

    fn flush(&mut self) {
        self.sink.clear();
    }

    fn release(&mut self) {
        self.keepalive.take();
    }
}
