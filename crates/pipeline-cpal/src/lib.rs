// cpal/symphonia implementation of the media pipeline collaborator
//
// A dedicated worker thread owns the decoder, the output stream and the
// command queue. Control calls only enqueue commands; every lifecycle
// event is delivered to the session's event sink from the worker thread,
// which is the pipeline's single delivery thread.

pub mod buffer;
pub mod decoder;

pub use decoder::{AudioDecoder, TrackFormat};

use buffer::SampleRing;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tonearm_core::clock::{Ticks, TICKS_PER_SECOND};
use tonearm_core::pipeline::{
    EventDisposition, EventSink, MediaPipeline, PipelineError, PipelineEvent, PipelineEventKind,
    PipelineFactory,
};

/// Ring capacity, in seconds of audio ahead of the output callback
const RING_SECONDS: usize = 4;

/// Worker poll interval between commands; also paces the decode pump
const PUMP_INTERVAL: Duration = Duration::from_millis(5);

enum Command {
    Open(String),
    Start(Option<Ticks>),
    Pause,
    Stop,
    Close,
    NotifyVolume(f32),
}

/// State shared between the control surface, the worker and the output
/// callback.
struct Shared {
    playing: AtomicBool,
    volume: Mutex<f32>,
    /// Render clock in ticks, advanced by the output callback
    position: AtomicU64,
    /// Set once a stream exists, so the clock reads as unavailable before
    clock_ready: AtomicBool,
}

/// Builds cpal-backed pipeline instances for the session controller.
pub struct CpalPipelineFactory;

impl PipelineFactory for CpalPipelineFactory {
    fn create(
        &self,
        sink: Arc<dyn EventSink>,
    ) -> Result<Arc<dyn MediaPipeline>, PipelineError> {
        Ok(Arc::new(CpalPipeline::spawn(sink)?))
    }
}

/// Control surface of one pipeline instance. Commands are forwarded to
/// the worker; volume and the render clock are immediate reads of shared
/// state.
pub struct CpalPipeline {
    commands: Mutex<mpsc::Sender<Command>>,
    shared: Arc<Shared>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CpalPipeline {
    pub fn spawn(sink: Arc<dyn EventSink>) -> Result<Self, PipelineError> {
        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            playing: AtomicBool::new(false),
            volume: Mutex::new(1.0),
            position: AtomicU64::new(0),
            clock_ready: AtomicBool::new(false),
        });
        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("tonearm-pipeline".to_string())
            .spawn(move || Worker::new(sink, rx, worker_shared).run())
            .map_err(|e| PipelineError::Transport(format!("worker spawn failed: {}", e)))?;
        Ok(Self {
            commands: Mutex::new(tx),
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    fn send(&self, command: Command) -> Result<(), PipelineError> {
        self.commands
            .lock()
            .send(command)
            .map_err(|_| PipelineError::Disconnected)
    }
}

impl MediaPipeline for CpalPipeline {
    fn open(&self, path: &str) -> Result<(), PipelineError> {
        self.send(Command::Open(path.to_string()))
    }

    fn start(&self, position: Option<Ticks>) -> Result<(), PipelineError> {
        self.send(Command::Start(position))
    }

    fn pause(&self) -> Result<(), PipelineError> {
        self.send(Command::Pause)
    }

    fn stop(&self) -> Result<(), PipelineError> {
        self.send(Command::Stop)
    }

    fn close(&self) -> Result<(), PipelineError> {
        self.send(Command::Close)
    }

    fn set_volume(&self, volume: f32) -> Result<(), PipelineError> {
        // Takes effect immediately in the output callback; the
        // confirmation event still arrives on the delivery thread.
        *self.shared.volume.lock() = volume;
        self.send(Command::NotifyVolume(volume))
    }

    fn volume(&self) -> Result<f32, PipelineError> {
        Ok(*self.shared.volume.lock())
    }

    fn clock_position(&self) -> Option<Ticks> {
        if !self.shared.clock_ready.load(Ordering::Relaxed) {
            return None;
        }
        Some(self.shared.position.load(Ordering::Relaxed))
    }
}

impl Drop for CpalPipeline {
    fn drop(&mut self) {
        // Best-effort teardown when the session did not close explicitly;
        // the send fails harmlessly if the worker already exited.
        let _ = self.commands.lock().send(Command::Close);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Everything that lives on the worker thread. The cpal stream never
/// leaves this thread.
struct Worker {
    sink: Arc<dyn EventSink>,
    commands: mpsc::Receiver<Command>,
    shared: Arc<Shared>,
    decoder: Option<AudioDecoder>,
    stream: Option<cpal::Stream>,
    ring: Option<Arc<Mutex<SampleRing>>>,
    /// Decoded samples the ring had no room for yet
    pending: Vec<f32>,
    decoder_done: bool,
    end_announced: bool,
    detached: bool,
}

impl Worker {
    fn new(sink: Arc<dyn EventSink>, commands: mpsc::Receiver<Command>, shared: Arc<Shared>) -> Self {
        Self {
            sink,
            commands,
            shared,
            decoder: None,
            stream: None,
            ring: None,
            pending: Vec::new(),
            decoder_done: false,
            end_announced: false,
            detached: false,
        }
    }

    fn run(mut self) {
        log::debug!("pipeline worker started");
        loop {
            match self.commands.recv_timeout(PUMP_INTERVAL) {
                Ok(command) => {
                    if self.handle(command) {
                        break;
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => self.pump(),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    // Control handle dropped without a close
                    self.teardown();
                    break;
                }
            }
        }
        log::debug!("pipeline worker exited");
    }

    /// Returns true when the worker should exit.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Open(path) => self.handle_open(&path),
            Command::Start(position) => self.handle_start(position),
            Command::Pause => self.handle_pause(),
            Command::Stop => self.handle_stop(),
            Command::NotifyVolume(volume) => {
                self.emit(PipelineEvent::ok(PipelineEventKind::VolumeChanged { volume }));
            }
            Command::Close => {
                self.teardown();
                self.emit(PipelineEvent::ok(PipelineEventKind::Closed));
                return true;
            }
        }
        false
    }

    fn handle_open(&mut self, path: &str) {
        self.teardown();

        let decoder = match AudioDecoder::open(path) {
            Ok(decoder) => decoder,
            Err(e) => {
                self.emit(PipelineEvent::failed(
                    PipelineEventKind::Opened { duration: 0 },
                    e.to_string(),
                ));
                return;
            }
        };
        let duration = decoder.format.duration;

        let (stream, ring) =
            match self.build_stream(decoder.format.sample_rate, decoder.format.channels) {
                Ok(built) => built,
                Err(e) => {
                    self.emit(PipelineEvent::failed(
                        PipelineEventKind::Opened { duration: 0 },
                        e.to_string(),
                    ));
                    return;
                }
            };

        self.decoder = Some(decoder);
        self.stream = Some(stream);
        self.ring = Some(ring);
        self.shared.clock_ready.store(true, Ordering::Relaxed);
        self.emit(PipelineEvent::ok(PipelineEventKind::Opened { duration }));
    }

    fn handle_start(&mut self, position: Option<Ticks>) {
        let Some(decoder) = self.decoder.as_mut() else {
            self.emit(PipelineEvent::failed(
                PipelineEventKind::Started,
                "no resource opened",
            ));
            return;
        };

        if let Some(position) = position {
            if let Err(e) = decoder.seek(position) {
                self.emit(PipelineEvent::failed(PipelineEventKind::Started, e.to_string()));
                return;
            }
            if let Some(ring) = &self.ring {
                ring.lock().clear();
            }
            self.pending.clear();
            self.decoder_done = false;
            self.end_announced = false;
            self.shared.position.store(position, Ordering::Relaxed);
        }

        if let Some(stream) = &self.stream {
            if let Err(e) = stream.play() {
                self.emit(PipelineEvent::failed(
                    PipelineEventKind::Started,
                    format!("stream start failed: {}", e),
                ));
                return;
            }
        }
        self.shared.playing.store(true, Ordering::Relaxed);
        self.emit(PipelineEvent::ok(PipelineEventKind::Started));
    }

    fn handle_pause(&mut self) {
        self.shared.playing.store(false, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            // Some hosts cannot pause; the callback already renders
            // silence while `playing` is down, so that is tolerable.
            if let Err(e) = stream.pause() {
                log::warn!("stream pause unsupported: {}", e);
            }
        }
        self.emit(PipelineEvent::ok(PipelineEventKind::Paused));
    }

    fn handle_stop(&mut self) {
        self.shared.playing.store(false, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                log::warn!("stream pause unsupported: {}", e);
            }
        }
        if let Some(decoder) = self.decoder.as_mut() {
            if let Err(e) = decoder.seek(0) {
                self.emit(PipelineEvent::failed(PipelineEventKind::Stopped, e.to_string()));
                return;
            }
        }
        if let Some(ring) = &self.ring {
            ring.lock().clear();
        }
        self.pending.clear();
        self.decoder_done = false;
        self.end_announced = false;
        self.shared.position.store(0, Ordering::Relaxed);
        self.emit(PipelineEvent::ok(PipelineEventKind::Stopped));
    }

    /// Keep the ring topped up while rendering; announce end of stream
    /// once the decoder is exhausted and the ring has drained.
    fn pump(&mut self) {
        if !self.shared.playing.load(Ordering::Relaxed) {
            return;
        }
        let Some(ring) = self.ring.clone() else {
            return;
        };

        loop {
            if !self.pending.is_empty() {
                let taken = ring.lock().push(&self.pending);
                self.pending.drain(..taken);
                if !self.pending.is_empty() {
                    // Ring is full; try again next interval
                    return;
                }
            }

            if self.decoder_done {
                if !self.end_announced && ring.lock().is_empty() {
                    self.shared.playing.store(false, Ordering::Relaxed);
                    self.end_announced = true;
                    self.emit(PipelineEvent::ok(PipelineEventKind::EndOfStream));
                }
                return;
            }

            let Some(decoder) = self.decoder.as_mut() else {
                return;
            };
            match decoder.next_samples() {
                Ok(Some(samples)) => {
                    let taken = ring.lock().push(&samples);
                    if taken < samples.len() {
                        self.pending.extend_from_slice(&samples[taken..]);
                    }
                }
                Ok(None) => {
                    self.decoder_done = true;
                }
                Err(e) => {
                    log::error!("decode failed: {}", e);
                    self.shared.playing.store(false, Ordering::Relaxed);
                    self.decoder_done = true;
                    self.emit(PipelineEvent::ok(PipelineEventKind::Error {
                        message: e.to_string(),
                    }));
                    return;
                }
            }
        }
    }

    fn build_stream(
        &self,
        sample_rate: u32,
        channels: u16,
    ) -> Result<(cpal::Stream, Arc<Mutex<SampleRing>>), PipelineError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PipelineError::Device("no output device".to_string()))?;
        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ring = Arc::new(Mutex::new(SampleRing::new(
            sample_rate as usize * channels as usize * RING_SECONDS,
        )));
        let callback_ring = ring.clone();
        let shared = self.shared.clone();
        let err_fn = |err| log::error!("output stream error: {}", err);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !shared.playing.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    let read = callback_ring.lock().pop_into(data);

                    let volume = *shared.volume.lock();
                    if (volume - 1.0).abs() > f32::EPSILON {
                        for sample in data[..read].iter_mut() {
                            *sample *= volume;
                        }
                    }

                    let frames = (read / channels as usize) as u64;
                    shared.position.fetch_add(
                        frames * TICKS_PER_SECOND / sample_rate as u64,
                        Ordering::Relaxed,
                    );
                },
                err_fn,
                None,
            )
            .map_err(|e| PipelineError::Device(format!("failed to build output stream: {}", e)))?;

        Ok((stream, ring))
    }

    fn teardown(&mut self) {
        self.shared.playing.store(false, Ordering::Relaxed);
        self.shared.clock_ready.store(false, Ordering::Relaxed);
        self.shared.position.store(0, Ordering::Relaxed);
        self.stream = None;
        self.decoder = None;
        self.ring = None;
        self.pending.clear();
        self.decoder_done = false;
        self.end_announced = false;
    }

    fn emit(&mut self, event: PipelineEvent) {
        if self.detached {
            return;
        }
        if self.sink.on_event(event) == EventDisposition::Detach {
            self.detached = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonearm_core::pipeline::EventStatus;

    /// Sink that records every delivered event and detaches on Closed,
    /// the way the session's router does.
    struct RecordingSink {
        events: Mutex<Vec<PipelineEvent>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn wait_for_events(&self, count: usize) -> Vec<PipelineEvent> {
            for _ in 0..200 {
                if self.events.lock().len() >= count {
                    break;
                }
                thread::sleep(Duration::from_millis(5));
            }
            self.events.lock().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn on_event(&self, event: PipelineEvent) -> EventDisposition {
            let terminal = matches!(event.kind, PipelineEventKind::Closed);
            self.events.lock().push(event);
            if terminal {
                EventDisposition::Detach
            } else {
                EventDisposition::Continue
            }
        }
    }

    #[test]
    fn test_open_of_missing_file_delivers_failed_event() {
        let sink = RecordingSink::new();
        let pipeline = CpalPipeline::spawn(sink.clone()).unwrap();
        pipeline.open("/no/such/file.wav").unwrap();

        let events = sink.wait_for_events(1);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].kind,
            PipelineEventKind::Opened { duration: 0 }
        ));
        assert!(matches!(events[0].status, EventStatus::Failed(_)));
    }

    #[test]
    fn test_start_without_open_fails_on_delivery_thread() {
        let sink = RecordingSink::new();
        let pipeline = CpalPipeline::spawn(sink.clone()).unwrap();
        pipeline.start(None).unwrap();

        let events = sink.wait_for_events(1);
        assert!(matches!(events[0].kind, PipelineEventKind::Started));
        assert!(matches!(events[0].status, EventStatus::Failed(_)));
    }

    #[test]
    fn test_close_acknowledges_and_worker_exits() {
        let sink = RecordingSink::new();
        let pipeline = CpalPipeline::spawn(sink.clone()).unwrap();
        pipeline.close().unwrap();

        let events = sink.wait_for_events(1);
        assert!(matches!(events[0].kind, PipelineEventKind::Closed));
        assert!(matches!(events[0].status, EventStatus::Ok));

        // The worker is gone; further commands report disconnection
        for _ in 0..200 {
            if pipeline.stop().is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(
            pipeline.stop().unwrap_err(),
            PipelineError::Disconnected
        ));
    }

    #[test]
    fn test_volume_is_immediate_and_confirmed() {
        let sink = RecordingSink::new();
        let pipeline = CpalPipeline::spawn(sink.clone()).unwrap();
        pipeline.set_volume(0.5).unwrap();
        assert_eq!(pipeline.volume().unwrap(), 0.5);

        let events = sink.wait_for_events(1);
        assert!(matches!(
            events[0].kind,
            PipelineEventKind::VolumeChanged { .. }
        ));
    }

    #[test]
    fn test_clock_is_unavailable_before_open() {
        let sink = RecordingSink::new();
        let pipeline = CpalPipeline::spawn(sink).unwrap();
        assert_eq!(pipeline.clock_position(), None);
    }
}
