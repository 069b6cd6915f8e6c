//! Audio device integration using rodio
//!
//! Desktop implementation of [`AudioOutput`]: submitted chunks land in a
//! shared queue drained by a rodio `Source` iterator. Underruns produce
//! silence so the stream stays alive between network chunks; the queue
//! depth backs the producer-side pipeline bound.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

use super::{AudioOutput, StreamSpec};
use crate::{GotchiError, Result};

/// Shared chunk queue between the submitting thread and the rodio source
struct ChunkQueue {
    chunks: VecDeque<Vec<i16>>,
    /// Read position within the front chunk
    front_pos: usize,
}

impl ChunkQueue {
    fn new() -> Self {
        ChunkQueue {
            chunks: VecDeque::new(),
            front_pos: 0,
        }
    }

    fn depth(&self) -> usize {
        self.chunks.len()
    }

    fn next_sample(&mut self) -> Option<i16> {
        loop {
            let front = self.chunks.front()?;
            if self.front_pos < front.len() {
                let s = front[self.front_pos];
                self.front_pos += 1;
                return Some(s);
            }
            self.chunks.pop_front();
            self.front_pos = 0;
        }
    }

    fn clear(&mut self) {
        self.chunks.clear();
        self.front_pos = 0;
    }
}

/// Source iterator feeding rodio from the chunk queue
struct ChunkQueueSource {
    queue: Arc<Mutex<ChunkQueue>>,
    sample_rate: u32,
    channels: u16,
    finished: Arc<AtomicBool>,
}

impl Iterator for ChunkQueueSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }
        let sample = self.queue.lock().next_sample();
        match sample {
            Some(s) => Some(s as f32 / 32_768.0),
            // Underrun: keep the stream alive with silence
            None => Some(0.0),
        }
    }
}

impl Source for ChunkQueueSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

/// Audio playback device backed by rodio
pub struct AudioDevice {
    handle: OutputStreamHandle,
    sink: Option<Sink>,
    queue: Arc<Mutex<ChunkQueue>>,
    finished: Arc<AtomicBool>,
    spec: Option<StreamSpec>,
    volume: f32,
}

impl AudioDevice {
    /// Open the default system output device.
    ///
    /// The `OutputStream` itself is not `Send`, so it lives parked on a
    /// dedicated thread for the process lifetime; only its handle is kept.
    pub fn open() -> Result<Self> {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::Builder::new()
            .name("audio-stream".into())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = tx.send(Ok(handle));
                    // Parking forever keeps the stream alive on this thread
                    let _keep = stream;
                    loop {
                        std::thread::park();
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(GotchiError::AudioDeviceError(format!(
                        "failed to open stream: {e}"
                    ))));
                }
            })
            .map_err(|e| GotchiError::AudioDeviceError(format!("stream thread: {e}")))?;

        let handle = rx
            .recv()
            .map_err(|_| GotchiError::AudioDeviceError("stream thread died".into()))??;
        let mut device = AudioDevice {
            handle,
            sink: None,
            queue: Arc::new(Mutex::new(ChunkQueue::new())),
            finished: Arc::new(AtomicBool::new(false)),
            spec: None,
            volume: 0.3,
        };
        // Bring the device up immediately so playback readiness is visible
        // before the first stream arrives
        device.begin(StreamSpec {
            sample_rate: 16_000,
            channels: 1,
        })?;
        Ok(device)
    }

    fn rebuild_sink(&mut self, spec: StreamSpec) -> Result<()> {
        // Tear down the previous source; its iterator returns None and ends
        self.finished.store(true, Ordering::Relaxed);
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.queue.lock().clear();

        let sink = Sink::try_new(&self.handle)
            .map_err(|e| GotchiError::AudioDeviceError(format!("failed to create sink: {e}")))?;
        let finished = Arc::new(AtomicBool::new(false));
        let source = ChunkQueueSource {
            queue: Arc::clone(&self.queue),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            finished: Arc::clone(&finished),
        };
        sink.set_volume(self.volume);
        sink.append(source);
        self.sink = Some(sink);
        self.finished = finished;
        self.spec = Some(spec);
        Ok(())
    }
}

impl AudioOutput for AudioDevice {
    fn begin(&mut self, spec: StreamSpec) -> Result<()> {
        if self.spec != Some(spec) || self.sink.is_none() {
            self.rebuild_sink(spec)?;
        } else {
            self.queue.lock().clear();
        }
        Ok(())
    }

    fn submit(&mut self, chunk: Vec<i16>) -> Result<()> {
        if self.sink.is_none() {
            return Err(GotchiError::AudioDeviceError("device not started".into()));
        }
        self.queue.lock().chunks.push_back(chunk);
        Ok(())
    }

    fn pending(&self) -> usize {
        self.queue.lock().depth()
    }

    fn stop(&mut self) {
        self.queue.lock().clear();
    }

    fn is_running(&self) -> bool {
        self.sink.is_some()
    }

    fn restart(&mut self) -> Result<()> {
        match self.spec {
            Some(spec) => self.rebuild_sink(spec),
            None => Ok(()),
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.volume);
        }
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.finished.store(true, Ordering::Relaxed);
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn try_device() -> Option<AudioDevice> {
        match AudioDevice::open() {
            Ok(dev) => Some(dev),
            Err(err) => {
                eprintln!("Skipping audio::device test (audio backend unavailable): {err}");
                None
            }
        }
    }

    #[test]
    fn test_chunk_queue_drains_in_order() {
        let mut q = ChunkQueue::new();
        q.chunks.push_back(vec![1, 2]);
        q.chunks.push_back(vec![3]);
        assert_eq!(q.depth(), 2);
        assert_eq!(q.next_sample(), Some(1));
        assert_eq!(q.next_sample(), Some(2));
        assert_eq!(q.depth(), 2); // front not popped until the next pull
        assert_eq!(q.next_sample(), Some(3));
        assert_eq!(q.next_sample(), None);
        assert_eq!(q.depth(), 0);
    }

    #[test]
    fn test_source_silence_on_underrun() {
        let queue = Arc::new(Mutex::new(ChunkQueue::new()));
        let mut source = ChunkQueueSource {
            queue,
            sample_rate: 16_000,
            channels: 1,
            finished: Arc::new(AtomicBool::new(false)),
        };
        assert_eq!(source.next(), Some(0.0));
        assert_eq!(source.sample_rate(), 16_000);
        assert_eq!(source.channels(), 1);
    }

    #[test]
    fn test_source_ends_on_finished() {
        let queue = Arc::new(Mutex::new(ChunkQueue::new()));
        let finished = Arc::new(AtomicBool::new(false));
        let mut source = ChunkQueueSource {
            queue,
            sample_rate: 16_000,
            channels: 1,
            finished: Arc::clone(&finished),
        };
        assert!(source.next().is_some());
        finished.store(true, Ordering::Relaxed);
        assert_eq!(source.next(), None);
    }

    #[test]
    fn test_device_begin_submit() {
        let Some(mut dev) = try_device() else {
            return;
        };
        let spec = StreamSpec {
            sample_rate: 16_000,
            channels: 1,
        };
        dev.begin(spec).unwrap();
        assert!(dev.is_running());
        dev.submit(vec![0i16; 256]).unwrap();
        assert!(dev.pending() <= 1);
        dev.stop();
        assert_eq!(dev.pending(), 0);
    }

    #[test]
    fn test_open_starts_running() {
        let Some(mut dev) = try_device() else {
            return;
        };
        assert!(dev.is_running());
        // Rebuilding for a new stream spec keeps the device usable
        dev.begin(StreamSpec {
            sample_rate: 44_100,
            channels: 2,
        })
        .unwrap();
        assert!(dev.is_running());
        dev.submit(vec![0i16; 8]).unwrap();
    }
}
