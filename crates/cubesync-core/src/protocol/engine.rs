//! Protocol session.
//!
//! A [`Session`] owns the link to one cube for its whole lifetime: creating it
//! opens the transport, dropping it closes the transport. Operations take
//! `&mut self`, so at most one exchange is in flight per session.
//!
//! Each operation is a fixed lock-step sequence. Every "send" and every
//! "expect ack" is a bounded link call; the first timeout, unexpected byte or
//! short unit aborts the whole operation. Download results are assembled
//! locally and only returned once the last unit has been acknowledged.
//!
//! ```text
//! probe:    ACK ->            <- ACK
//! clear:    'd' ->            <- ACK
//! upload:   's' ->            <- ACK
//!           N ->              <- ACK
//!           per animation:  M -> <- ACK
//!             per frame:    duration -> <- ACK, 64 pixels -> <- ACK
//!           ACK ACK ACK ACK -> <- ACK
//! download: 'g' ->            <- ACK
//!                             <- N        ACK ->
//!           per animation:    <- M        ACK ->
//!             per frame:      <- duration ACK ->, <- 64 pixels ACK ->
//! ```

use log::{debug, trace};

use super::codec;
use super::error::{ProtocolError, Step};
use super::layout;
use super::notify::{ERROR_TITLE, LogNotifier, Notifier};
use crate::link::{BoundedIo, LinkConfig, LinkError, SerialTransport, Transport};
use crate::model::{Animation, AnimationSet};

/// Exclusive protocol session with one cube.
pub struct Session<N: Notifier = LogNotifier> {
    link: BoundedIo,
    notifier: N,
}

impl Session<LogNotifier> {
    /// Start a session over an already-open transport.
    pub fn new<T: Transport>(transport: T, config: &LinkConfig) -> Result<Self, LinkError> {
        Ok(Self {
            link: BoundedIo::spawn(transport, config)?,
            notifier: LogNotifier,
        })
    }

    /// Open `port_name` and start a session on it.
    pub fn open(port_name: &str, config: &LinkConfig) -> Result<Self, LinkError> {
        Self::new(SerialTransport::open(port_name, config)?, config)
    }
}

impl<N: Notifier> Session<N> {
    /// Replace the failure sink used by the notifying operations.
    pub fn with_notifier<M: Notifier>(self, notifier: M) -> Session<M> {
        Session {
            link: self.link,
            notifier,
        }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// True while an abandoned link request blocks new exchanges.
    pub fn is_fenced(&self) -> bool {
        self.link.is_fenced()
    }

    /// Check that the cube answers. Reports a failure and returns `false`
    /// otherwise.
    pub fn probe(&mut self) -> bool {
        let result = self.try_probe();
        self.notify("probe", result).is_some()
    }

    /// Fetch every animation stored on the cube, or `None` after reporting a
    /// failure. Partial data is never returned.
    pub fn download(&mut self) -> Option<AnimationSet> {
        let result = self.try_download();
        self.notify("download", result)
    }

    /// Replace the cube's animations with `set`. Reports a failure and
    /// returns `false` otherwise.
    pub fn upload(&mut self, set: &AnimationSet) -> bool {
        let result = self.try_upload(set);
        self.notify("upload", result).is_some()
    }

    /// Erase the cube's animation memory. Reports a failure and returns
    /// `false` otherwise.
    pub fn clear(&mut self) -> bool {
        let result = self.try_clear();
        self.notify("clear", result).is_some()
    }

    pub fn try_probe(&mut self) -> Result<(), ProtocolError> {
        debug!("probing cube");
        self.begin(Step::Probe)?;
        self.send(Step::Probe, &[layout::ACK])?;
        self.expect_ack(Step::Probe)
    }

    pub fn try_download(&mut self) -> Result<AnimationSet, ProtocolError> {
        debug!("downloading animations");
        self.begin(Step::Command)?;
        self.send(Step::Command, &[layout::CMD_DOWNLOAD])?;
        self.expect_ack(Step::Command)?;

        let animation_count = self.receive_byte(Step::AnimationCount)?;
        self.send_ack(Step::AnimationCount)?;

        let mut animations = Vec::with_capacity(animation_count as usize);
        for animation in 0..animation_count as usize {
            let step = Step::FrameCount { animation };
            let frame_count = self.receive_byte(step)?;
            self.send_ack(step)?;

            let mut frames = Vec::with_capacity(frame_count as usize);
            for frame in 0..frame_count as usize {
                let step = Step::FrameDuration { animation, frame };
                let duration = self.receive_byte(step)?;
                self.send_ack(step)?;

                let step = Step::FrameData { animation, frame };
                let pixels = self.receive(step, layout::FRAME_PIXELS)?;
                let decoded = codec::decode_frame(duration, &pixels)
                    .map_err(|err| ProtocolError::malformed(step, err))?;
                self.send_ack(step)?;
                frames.push(decoded);
            }
            animations.push(Animation::from_wire(frames));
        }

        let set = AnimationSet::from_wire(animations);
        debug!(
            "downloaded {} animation(s), {} frame(s)",
            set.len(),
            set.total_frames()
        );
        Ok(set)
    }

    pub fn try_upload(&mut self, set: &AnimationSet) -> Result<(), ProtocolError> {
        debug!(
            "uploading {} animation(s), {} frame(s)",
            set.len(),
            set.total_frames()
        );
        self.begin(Step::Command)?;
        self.send(Step::Command, &[layout::CMD_UPLOAD])?;
        self.expect_ack(Step::Command)?;

        self.send(
            Step::AnimationCount,
            &codec::encode_count(set.animation_count()),
        )?;
        self.expect_ack(Step::AnimationCount)?;

        for (animation, frames) in set.animations().iter().enumerate() {
            let step = Step::FrameCount { animation };
            self.send(step, &codec::encode_count(frames.frame_count()))?;
            self.expect_ack(step)?;

            for (frame, data) in frames.frames().iter().enumerate() {
                let (duration, pixels) = codec::encode_frame(data);

                let step = Step::FrameDuration { animation, frame };
                self.send(step, &duration)?;
                self.expect_ack(step)?;

                let step = Step::FrameData { animation, frame };
                self.send(step, &pixels)?;
                self.expect_ack(step)?;
            }
        }

        self.send(Step::Finish, &layout::FINISH_MARKER)?;
        self.expect_ack(Step::Finish)?;
        debug!("upload complete");
        Ok(())
    }

    pub fn try_clear(&mut self) -> Result<(), ProtocolError> {
        debug!("clearing cube memory");
        self.begin(Step::Command)?;
        self.send(Step::Command, &[layout::CMD_CLEAR])?;
        self.expect_ack(Step::Command)
    }

    /// Drop stale input left over from an earlier aborted exchange.
    fn begin(&mut self, step: Step) -> Result<(), ProtocolError> {
        self.link
            .discard_input()
            .map_err(|err| ProtocolError::from_link(step, err))
    }

    fn send(&mut self, step: Step, bytes: &[u8]) -> Result<(), ProtocolError> {
        trace!("{step}: sending {} byte(s)", bytes.len());
        self.link
            .write(bytes)
            .map_err(|err| ProtocolError::from_link(step, err))
    }

    fn send_ack(&mut self, step: Step) -> Result<(), ProtocolError> {
        self.send(step, &[layout::ACK])
    }

    fn receive(&mut self, step: Step, len: usize) -> Result<Vec<u8>, ProtocolError> {
        let bytes = self
            .link
            .read(len)
            .map_err(|err| ProtocolError::from_link(step, err))?;
        trace!("{step}: received {} byte(s)", bytes.len());
        Ok(bytes)
    }

    fn receive_byte(&mut self, step: Step) -> Result<u8, ProtocolError> {
        let unit = self.receive(step, 1)?;
        codec::decode_byte(&unit).map_err(|err| ProtocolError::malformed(step, err))
    }

    fn expect_ack(&mut self, step: Step) -> Result<(), ProtocolError> {
        match self.receive_byte(step)? {
            layout::ACK => Ok(()),
            layout::DEVICE_ERROR => Err(ProtocolError::DeviceError { step }),
            actual => Err(ProtocolError::Mismatch {
                step,
                expected: layout::ACK,
                actual,
            }),
        }
    }

    fn notify<T>(&mut self, operation: &str, result: Result<T, ProtocolError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                let message = format!("{operation} failed: {err}");
                self.notifier.report_error(ERROR_TITLE, &message);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::SimulatedCube;
    use crate::model::Frame;
    use crate::protocol::notify::Notification;

    fn fast_config() -> LinkConfig {
        LinkConfig {
            byte_timeout_ms: 100,
            fence_timeout_ms: 500,
            ..LinkConfig::default()
        }
    }

    fn session(cube: &SimulatedCube) -> Session<Vec<Notification>> {
        Session::new(cube.clone(), &fast_config())
            .unwrap()
            .with_notifier(Vec::new())
    }

    #[test]
    fn probe_succeeds_against_echoing_cube() {
        let cube = SimulatedCube::new();
        let mut session = session(&cube);
        assert!(session.probe());
        assert!(session.notifier().is_empty());
        assert_eq!(cube.host_bytes(), vec![layout::ACK]);
    }

    #[test]
    fn clear_erases_stored_animations() {
        let frame = Frame::from_array(1, [0u8; layout::FRAME_PIXELS]);
        let set =
            AnimationSet::from_animations(vec![Animation::from_frames(vec![frame]).unwrap()])
                .unwrap();
        let cube = SimulatedCube::with_animations(set);
        let mut session = session(&cube);

        assert!(session.clear());
        assert!(cube.stored().is_empty());
        assert_eq!(cube.host_bytes(), vec![layout::CMD_CLEAR]);
    }

    #[test]
    fn download_of_empty_cube_is_empty_set() {
        let cube = SimulatedCube::new();
        let mut session = session(&cube);
        let set = session.try_download().unwrap();
        assert!(set.is_empty());
        assert_eq!(cube.host_bytes(), vec![layout::CMD_DOWNLOAD, layout::ACK]);
    }

    /// Port that reports its own write timeout on every send.
    struct WriteTimesOut;

    impl Transport for WriteTimesOut {
        fn send(&mut self, _bytes: &[u8]) -> std::io::Result<usize> {
            std::thread::sleep(std::time::Duration::from_millis(2));
            Err(std::io::ErrorKind::TimedOut.into())
        }

        fn receive(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::TimedOut.into())
        }
    }

    #[test]
    fn port_write_timeout_is_a_protocol_timeout() {
        let mut session = Session::new(WriteTimesOut, &fast_config()).unwrap();
        let err = session.try_probe().unwrap_err();
        assert!(err.is_timeout(), "{err}");
        assert_eq!(err.step(), Step::Probe);
    }
}
