//! A small cpal synthesizer that voices each instrument kind.
//!
//! The cpal stream is not `Send`, so it lives on a dedicated worker thread.
//! Notes reach that thread over a command channel and are mixed by the
//! output callback from a shared voice list.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, Stream, StreamConfig,
};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use songtrax_core::{Error, InstrumentKind, Pitch, Result};
use tracing::{debug, error, info, trace, warn};

use crate::instrument::Instrument;

/// Most voices sounding at once; the oldest is dropped beyond this.
const MAX_VOICES: usize = 32;

/// Output gain applied to the voice mix.
const MASTER_GAIN: f32 = 0.3;

/// How long to wait for the output device to come up.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Attack and release times of a note, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack: f32,
    pub release: f32,
}

impl Envelope {
    pub const fn for_kind(kind: InstrumentKind) -> Self {
        match kind {
            InstrumentKind::Piano => Self {
                attack: 0.005,
                release: 0.3,
            },
            InstrumentKind::Guitar => Self {
                attack: 0.002,
                release: 0.15,
            },
            InstrumentKind::FrenchHorn => Self {
                attack: 0.06,
                release: 0.2,
            },
            InstrumentKind::Drums => Self {
                attack: 0.001,
                release: 0.05,
            },
        }
    }

    /// Gain at `t` seconds into a note held for `held` seconds.
    pub fn gain(&self, t: f32, held: f32) -> f32 {
        if t < 0.0 {
            return 0.0;
        }
        if t < self.attack {
            return t / self.attack;
        }
        if t < held {
            return 1.0;
        }
        let released = t - held;
        if released >= self.release {
            0.0
        } else {
            1.0 - released / self.release
        }
    }
}

/// One oscillator sample for `kind` at `phase` (0..1), `t` seconds in.
pub fn waveform(kind: InstrumentKind, phase: f32, t: f32, noise: f32) -> f32 {
    let sine = |harmonic: f32| (phase * harmonic * TAU).sin();
    match kind {
        // Bright attack that mellows as the upper partials decay.
        InstrumentKind::Piano => {
            let decay = (-t * 6.0).exp();
            sine(1.0) * 0.7 + sine(2.0) * 0.2 * decay + sine(3.0) * 0.1 * decay
        }
        // Plucked triangle with a fast decay.
        InstrumentKind::Guitar => {
            let triangle = 4.0 * (phase - (phase + 0.5).floor()).abs() - 1.0;
            triangle * (-t * 4.0).exp()
        }
        // Soft band-limited sawtooth.
        InstrumentKind::FrenchHorn => {
            (1..=5).map(|h| sine(h as f32) / h as f32).sum::<f32>() * 0.6
        }
        // Pitched thump plus a noise burst.
        InstrumentKind::Drums => {
            let body = (phase * TAU * (1.0 + 2.0 * (-t * 30.0).exp())).sin() * (-t * 12.0).exp();
            body * 0.8 + noise * 0.4 * (-t * 40.0).exp()
        }
    }
}

#[derive(Debug, Clone)]
struct Voice {
    kind: InstrumentKind,
    frequency: f32,
    held: f32,
    envelope: Envelope,
    phase: f32,
    elapsed: f32,
    noise_state: u32,
}

impl Voice {
    fn new(kind: InstrumentKind, frequency: f32, held: f32) -> Self {
        Self {
            kind,
            frequency,
            held,
            envelope: Envelope::for_kind(kind),
            phase: 0.0,
            elapsed: 0.0,
            noise_state: frequency.to_bits() | 1,
        }
    }

    fn is_finished(&self) -> bool {
        self.elapsed >= self.held + self.envelope.release
    }

    fn next_sample(&mut self, sample_rate: f32) -> f32 {
        // xorshift32
        self.noise_state ^= self.noise_state << 13;
        self.noise_state ^= self.noise_state >> 17;
        self.noise_state ^= self.noise_state << 5;
        let noise = (self.noise_state as f32 / u32::MAX as f32).mul_add(2.0, -1.0);

        let value = waveform(self.kind, self.phase, self.elapsed, noise)
            * self.envelope.gain(self.elapsed, self.held);

        self.phase = (self.phase + self.frequency / sample_rate).fract();
        self.elapsed += 1.0 / sample_rate;
        value
    }
}

type Voices = Arc<Mutex<Vec<Voice>>>;

#[derive(Debug)]
enum SynthCommand {
    NoteOn {
        kind: InstrumentKind,
        frequency: f32,
        duration: f32,
    },
    AllNotesOff,
    Shutdown,
}

/// Handle to the synth worker thread.
pub struct Synth {
    command_tx: Sender<SynthCommand>,
    alive: Arc<AtomicBool>,
    device_name: String,
}

impl Synth {
    /// Open the default output device and start the worker.
    pub fn new() -> Result<Self> {
        let (command_tx, command_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);
        let alive = Arc::new(AtomicBool::new(false));
        let alive_worker = Arc::clone(&alive);

        std::thread::Builder::new()
            .name("songtrax-synth".to_string())
            .spawn(move || {
                let voices: Voices = Arc::new(Mutex::new(Vec::new()));
                // Create the stream on this thread: cpal::Stream is not Send.
                match open_output(Arc::clone(&voices)) {
                    Ok((stream, device_name)) => {
                        alive_worker.store(true, Ordering::SeqCst);
                        let _ = ready_tx.send(Ok(device_name));
                        run_worker(&command_rx, &voices);
                        drop(stream);
                    }
                    Err(e) => {
                        error!("Failed to initialize synth output: {e}");
                        let _ = ready_tx.send(Err(e));
                    }
                }
                alive_worker.store(false, Ordering::SeqCst);
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn synth thread: {e}")))?;

        let device_name = match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => return Err(Error::PlaybackUnavailable(e.to_string())),
            Err(_) => {
                let _ = command_tx.send(SynthCommand::Shutdown);
                return Err(Error::PlaybackUnavailable(
                    "audio output did not start in time".to_string(),
                ));
            }
        };

        info!("Synth ready on {device_name}");
        Ok(Self {
            command_tx,
            alive,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Sound a note on the given instrument.
    pub fn note_on(&self, kind: InstrumentKind, frequency: f32, duration: f32) -> Result<()> {
        self.send(SynthCommand::NoteOn {
            kind,
            frequency,
            duration,
        })
    }

    /// Cut every sounding voice.
    pub fn all_notes_off(&self) -> Result<()> {
        self.send(SynthCommand::AllNotesOff)
    }

    fn send(&self, command: SynthCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|e| Error::AudioOutput(format!("Synth is gone: {e}")))
    }
}

impl Drop for Synth {
    fn drop(&mut self) {
        let _ = self.command_tx.send(SynthCommand::Shutdown);
    }
}

fn run_worker(command_rx: &Receiver<SynthCommand>, voices: &Voices) {
    debug!("Synth worker started");
    loop {
        match command_rx.recv_timeout(Duration::from_millis(250)) {
            Ok(SynthCommand::NoteOn {
                kind,
                frequency,
                duration,
            }) => {
                let mut voices = voices.lock();
                if voices.len() >= MAX_VOICES {
                    voices.remove(0);
                }
                voices.push(Voice::new(kind, frequency, duration));
                trace!("{kind} note at {frequency:.1} Hz, {} voices", voices.len());
            }
            Ok(SynthCommand::AllNotesOff) => voices.lock().clear(),
            Ok(SynthCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
    debug!("Synth worker stopped");
}

fn open_output(voices: Voices) -> Result<(Stream, String)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No output device found".to_string()))?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get output config: {e}")))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    debug!(
        "Synth output: {}Hz, {} channels, {sample_format:?}",
        config.sample_rate.0, config.channels
    );

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, voices)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, voices)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, voices)?,
        _ => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {sample_format:?}"
            )));
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;

    Ok((stream, device_name))
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    voices: Voices,
) -> Result<Stream> {
    let channels = usize::from(config.channels).max(1);
    let sample_rate = config.sample_rate.0 as f32;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut voices = voices.lock();
                for frame in data.chunks_mut(channels) {
                    let mixed: f32 = voices.iter_mut().map(|v| v.next_sample(sample_rate)).sum();
                    let value = T::from_sample((mixed * MASTER_GAIN).tanh());
                    for sample in frame.iter_mut() {
                        *sample = value;
                    }
                }
                voices.retain(|v| !v.is_finished());
            },
            |err| error!("Synth stream error: {err}"),
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))
}

/// An [`Instrument`] voiced by a shared [`Synth`].
#[derive(Clone)]
pub struct SynthInstrument {
    synth: Arc<Synth>,
    kind: InstrumentKind,
}

impl SynthInstrument {
    pub const fn new(synth: Arc<Synth>, kind: InstrumentKind) -> Self {
        Self { synth, kind }
    }

    pub const fn kind(&self) -> InstrumentKind {
        self.kind
    }
}

impl Instrument for SynthInstrument {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.synth.is_alive() {
            Ok(())
        } else {
            warn!("Synth worker is not running");
            Err(Error::PlaybackUnavailable("synth is not running".to_string()))
        }
    }

    fn trigger_note(&self, pitch: Pitch, duration: f64, _at: f64) -> Result<()> {
        self.synth
            .note_on(self.kind, pitch.frequency(), duration as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f32 = 48_000.0;

    #[test]
    fn test_envelope_shape() {
        let env = Envelope::for_kind(InstrumentKind::Piano);
        assert!(env.gain(-0.1, 0.25).abs() < f32::EPSILON);
        assert!(env.gain(0.0025, 0.25) > 0.0 && env.gain(0.0025, 0.25) < 1.0);
        assert!((env.gain(0.1, 0.25) - 1.0).abs() < f32::EPSILON);
        assert!(env.gain(0.4, 0.25) < 1.0);
        assert!(env.gain(0.6, 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_every_kind_is_bounded_and_audible() {
        for kind in InstrumentKind::ALL {
            let mut voice = Voice::new(kind, Pitch::A.frequency(), 0.25);
            let samples: Vec<f32> = (0..4_800).map(|_| voice.next_sample(RATE)).collect();
            assert!(samples.iter().all(|s| s.is_finite() && s.abs() <= 2.0), "{kind}");
            assert!(samples.iter().any(|s| s.abs() > 0.05), "{kind} is silent");
        }
    }

    #[test]
    fn test_voice_finishes_after_release() {
        let mut voice = Voice::new(InstrumentKind::Guitar, Pitch::C.frequency(), 0.25);
        let release = Envelope::for_kind(InstrumentKind::Guitar).release;
        // A little past the end so float drift cannot matter.
        let total = ((0.25 + release + 0.05) * RATE) as usize;
        for _ in 0..total {
            voice.next_sample(RATE);
        }
        assert!(voice.is_finished());
    }

    #[test]
    fn test_kinds_sound_different() {
        let render = |kind| {
            let mut voice = Voice::new(kind, Pitch::E.frequency(), 0.25);
            (0..512).map(|_| voice.next_sample(RATE)).collect::<Vec<f32>>()
        };
        assert_ne!(render(InstrumentKind::Piano), render(InstrumentKind::Guitar));
        assert_ne!(render(InstrumentKind::FrenchHorn), render(InstrumentKind::Drums));
    }

    #[test]
    fn test_synth_creation() {
        // May fail without audio hardware; it must not panic either way.
        match Synth::new() {
            Ok(synth) => assert!(synth.is_alive()),
            Err(e) => assert!(matches!(e, Error::PlaybackUnavailable(_))),
        }
    }
}
