//! In-memory cube.
//!
//! [`SimulatedCube`] speaks the device side of the protocol: it echoes probes,
//! streams its stored animations on `'g'`, stores an uploaded set on `'s'`
//! once the finish marker arrives, and clears its memory on `'d'`. Faults can
//! be injected per reply unit (silence, corruption, truncation) or per host
//! write (slow write) to exercise the engine's abort paths.
//!
//! Clones share the same device, so a test can hand one clone to a session
//! and inspect the other.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::trace;

use super::Transport;
use crate::model::{Animation, AnimationSet, Frame};
use crate::protocol::{codec, layout};

/// Injected misbehaviour.
///
/// Reply indices count every unit the cube has sent since it was created,
/// starting at zero. Write indices count host `send` calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Drop reply `from_reply` and every reply after it.
    Silent { from_reply: usize },
    /// Replace the first byte of reply `reply` with `byte`.
    Corrupt { reply: usize, byte: u8 },
    /// Cut reply `reply` down to `keep` bytes, then hang up.
    Truncate { reply: usize, keep: usize },
    /// Stall host write `write` for `delay` before processing it.
    SlowWrite { write: usize, delay: Duration },
}

#[derive(Debug)]
enum Phase {
    Idle,
    Download {
        units: VecDeque<Vec<u8>>,
    },
    AnimationCount,
    FrameCount {
        animations_left: usize,
    },
    FrameDuration {
        animations_left: usize,
        frames_left: usize,
    },
    Pixels {
        animations_left: usize,
        frames_left: usize,
        duration: u8,
        pixels: Vec<u8>,
    },
    Finish {
        seen: usize,
    },
}

#[derive(Debug)]
struct CubeState {
    stored: AnimationSet,
    incoming: Vec<Vec<Frame>>,
    phase: Phase,
    outbound: VecDeque<u8>,
    host_bytes: Vec<u8>,
    replies: usize,
    writes: usize,
    hung_up: bool,
    faults: Vec<Fault>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<CubeState>,
    readable: Condvar,
}

/// Cube emulator implementing [`Transport`].
#[derive(Debug, Clone)]
pub struct SimulatedCube {
    shared: Arc<Shared>,
    poll_interval: Duration,
}

impl Default for SimulatedCube {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCube {
    pub fn new() -> Self {
        Self::with_animations(AnimationSet::new())
    }

    /// A cube whose memory already holds `stored`.
    pub fn with_animations(stored: AnimationSet) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CubeState {
                    stored,
                    incoming: Vec::new(),
                    phase: Phase::Idle,
                    outbound: VecDeque::new(),
                    host_bytes: Vec::new(),
                    replies: 0,
                    writes: 0,
                    hung_up: false,
                    faults: Vec::new(),
                }),
                readable: Condvar::new(),
            }),
            poll_interval: Duration::from_millis(5),
        }
    }

    pub fn with_fault(self, fault: Fault) -> Self {
        self.lock().faults.push(fault);
        self
    }

    /// Animations currently in the cube's memory.
    pub fn stored(&self) -> AnimationSet {
        self.lock().stored.clone()
    }

    /// Every byte the host has sent, in order.
    pub fn host_bytes(&self) -> Vec<u8> {
        self.lock().host_bytes.clone()
    }

    /// Number of reply units emitted so far, faulted ones included.
    pub fn replies(&self) -> usize {
        self.lock().replies
    }

    fn lock(&self) -> MutexGuard<'_, CubeState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for SimulatedCube {
    fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let delay = {
            let mut state = self.lock();
            let write = state.writes;
            state.writes += 1;
            state.faults.iter().find_map(|fault| match fault {
                Fault::SlowWrite { write: at, delay } if *at == write => Some(*delay),
                _ => None,
            })
        };
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        let mut state = self.lock();
        for &byte in bytes {
            state.host_bytes.push(byte);
            state.accept(byte);
        }
        drop(state);
        self.shared.readable.notify_all();
        Ok(bytes.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.lock();
        let (mut state, _) = self
            .shared
            .readable
            .wait_timeout_while(state, self.poll_interval, |state| {
                state.outbound.is_empty() && !state.hung_up
            })
            .unwrap_or_else(PoisonError::into_inner);

        if state.outbound.is_empty() {
            if state.hung_up {
                return Ok(0);
            }
            return Err(io::ErrorKind::TimedOut.into());
        }
        let n = buf.len().min(state.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.lock().outbound.clear();
        Ok(())
    }
}

impl CubeState {
    fn accept(&mut self, byte: u8) {
        let phase = std::mem::replace(&mut self.phase, Phase::Idle);
        self.phase = match phase {
            Phase::Idle => self.command(byte),
            Phase::Download { mut units } => {
                if byte != layout::ACK {
                    trace!("sim: download aborted by {byte:#04x}");
                    Phase::Idle
                } else if let Some(unit) = units.pop_front() {
                    self.emit(unit);
                    Phase::Download { units }
                } else {
                    Phase::Idle
                }
            }
            Phase::AnimationCount => {
                self.incoming.clear();
                self.emit(vec![layout::ACK]);
                self.next_animation(byte as usize)
            }
            Phase::FrameCount { animations_left } => {
                self.incoming.push(Vec::new());
                self.emit(vec![layout::ACK]);
                self.next_frame(animations_left - 1, byte as usize)
            }
            Phase::FrameDuration {
                animations_left,
                frames_left,
            } => {
                self.emit(vec![layout::ACK]);
                Phase::Pixels {
                    animations_left,
                    frames_left,
                    duration: byte,
                    pixels: Vec::with_capacity(layout::FRAME_PIXELS),
                }
            }
            Phase::Pixels {
                animations_left,
                frames_left,
                duration,
                mut pixels,
            } => {
                pixels.push(byte);
                if pixels.len() < layout::FRAME_PIXELS {
                    Phase::Pixels {
                        animations_left,
                        frames_left,
                        duration,
                        pixels,
                    }
                } else {
                    let frame = codec::decode_frame(duration, &pixels);
                    if let (Ok(frame), Some(frames)) = (frame, self.incoming.last_mut()) {
                        frames.push(frame);
                    }
                    self.emit(vec![layout::ACK]);
                    self.next_frame(animations_left, frames_left - 1)
                }
            }
            Phase::Finish { seen } => {
                if byte != layout::ACK {
                    trace!("sim: bad finish marker byte {byte:#04x}");
                    self.emit(vec![layout::DEVICE_ERROR]);
                    Phase::Idle
                } else if seen + 1 < layout::FINISH_MARKER.len() {
                    Phase::Finish { seen: seen + 1 }
                } else {
                    // counts arrive as single bytes, so both levels stay in bounds
                    let incoming = std::mem::take(&mut self.incoming);
                    self.stored = AnimationSet::from_wire(
                        incoming.into_iter().map(Animation::from_wire).collect(),
                    );
                    self.emit(vec![layout::ACK]);
                    Phase::Idle
                }
            }
        };
    }

    fn command(&mut self, byte: u8) -> Phase {
        match byte {
            layout::ACK => {
                self.emit(vec![layout::ACK]);
                Phase::Idle
            }
            layout::CMD_DOWNLOAD => {
                self.emit(vec![layout::ACK]);
                let mut units = download_units(&self.stored);
                match units.pop_front() {
                    Some(count) => self.emit(count),
                    None => return Phase::Idle,
                }
                Phase::Download { units }
            }
            layout::CMD_UPLOAD => {
                self.emit(vec![layout::ACK]);
                Phase::AnimationCount
            }
            layout::CMD_CLEAR => {
                self.stored = AnimationSet::new();
                self.emit(vec![layout::ACK]);
                Phase::Idle
            }
            other => {
                trace!("sim: ignoring {other:#04x}");
                Phase::Idle
            }
        }
    }

    fn next_animation(&mut self, animations_left: usize) -> Phase {
        if animations_left == 0 {
            Phase::Finish { seen: 0 }
        } else {
            Phase::FrameCount { animations_left }
        }
    }

    fn next_frame(&mut self, animations_left: usize, frames_left: usize) -> Phase {
        if frames_left == 0 {
            self.next_animation(animations_left)
        } else {
            Phase::FrameDuration {
                animations_left,
                frames_left,
            }
        }
    }

    fn emit(&mut self, mut unit: Vec<u8>) {
        let index = self.replies;
        self.replies += 1;
        if self.hung_up {
            return;
        }
        for fault in &self.faults {
            match fault {
                Fault::Silent { from_reply } if index >= *from_reply => {
                    trace!("sim: dropping reply {index}");
                    return;
                }
                Fault::Corrupt { reply, byte } if *reply == index => {
                    if let Some(first) = unit.first_mut() {
                        *first = *byte;
                    }
                }
                Fault::Truncate { reply, keep } if *reply == index => {
                    unit.truncate(*keep);
                    self.hung_up = true;
                }
                _ => {}
            }
        }
        self.outbound.extend(unit);
    }
}

/// Units the cube sends for a download, in order: the animation count, then
/// per animation its frame count, then per frame the duration and the pixels.
fn download_units(set: &AnimationSet) -> VecDeque<Vec<u8>> {
    let mut units = VecDeque::new();
    units.push_back(codec::encode_count(set.animation_count()).to_vec());
    for animation in set.animations() {
        units.push_back(codec::encode_count(animation.frame_count()).to_vec());
        for frame in animation.frames() {
            let (duration, pixels) = codec::encode_frame(frame);
            units.push_back(duration.to_vec());
            units.push_back(pixels.to_vec());
        }
    }
    units
}

/// Number of reply units a download of `set` produces, the leading ack
/// included.
pub fn download_reply_count(set: &AnimationSet) -> usize {
    1 + download_units(set).len()
}

/// Number of reply units an upload of `set` produces.
pub fn upload_reply_count(set: &AnimationSet) -> usize {
    // command, animation count, finish marker
    3 + set
        .animations()
        .iter()
        .map(|animation| 1 + 2 * animation.len())
        .sum::<usize>()
}

/// Render bytes as lowercase hex, sixteen per line.
///
/// # Examples
/// ```
/// use cubesync_core::link::sim::hex_dump;
///
/// assert_eq!(hex_dump(&[0x73, 0x02]), "73 02\n");
/// ```
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for line in bytes.chunks(16) {
        let hex: Vec<String> = line.iter().map(|byte| format!("{byte:02x}")).collect();
        out.push_str(&hex.join(" "));
        out.push('\n');
    }
    out
}
