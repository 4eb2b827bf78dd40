//! Session controller: owns the base image, the placements and the rendered output.
//!
//! Detection runs on the rayon pool. Every call to [`EmojiSession::detect`] starts a
//! new job and supersedes the previous one; results from superseded jobs are dropped
//! without touching session state. Edits run synchronously and re-render the whole
//! list onto a fresh copy of the base image. State changes are published as
//! [`SessionEvent`]s to every subscriber.

use std::{
    borrow::Cow,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
    },
    time::Duration,
};

use image::{DynamicImage, RgbaImage};
use log::{debug, info, warn};
use rand::{SeedableRng, rngs::StdRng};

use emojiface_utils::{
    compute_resize_scales, config::AppSettings, decode_image, downscale_to_limit, encode_png,
    timing_guard,
};

use crate::annotation::{AnnotationList, EditOutcome, Placement};
use crate::assign::EmojiAssigner;
use crate::detection::DetectionSource;
use crate::error::OverlayError;
use crate::geometry::ScaleFactors;
use crate::render::OverlayRenderer;

/// How long a timed-out waiter lingers for a result that was already committed.
const SETTLE_GRACE: Duration = Duration::from_millis(50);

/// Session-level knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    /// Longest side of the image handed to the detection source (0 = unscaled).
    pub max_side: u32,
    /// Reseed the assignment generator with this value for every batch.
    pub seed: Option<u64>,
    /// Default timeout applied by [`DetectionJob::wait`].
    pub timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_side: 1024,
            seed: None,
            timeout: None,
        }
    }
}

impl From<&AppSettings> for SessionOptions {
    fn from(settings: &AppSettings) -> Self {
        Self {
            max_side: settings.input.max_side,
            seed: settings.assignment.seed,
            timeout: settings.detection.timeout(),
        }
    }
}

/// Published whenever the session state changes.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Placements and rendered output were dropped.
    Cleared,
    DetectionStarted {
        job_id: u64,
    },
    /// A detection batch was placed and rendered.
    Detected {
        job_id: u64,
        placements: Vec<Placement>,
        image: Arc<RgbaImage>,
    },
    DetectionFailed {
        job_id: u64,
        error: String,
    },
    /// The list was edited (or loaded) and re-rendered.
    Edited {
        placements: Vec<Placement>,
        image: Arc<RgbaImage>,
    },
}

#[derive(Debug)]
struct SessionState {
    palette: Vec<String>,
    renderer: OverlayRenderer,
    /// Bumped by every renderer swap so in-flight jobs can tell they drew with a stale one.
    renderer_epoch: u64,
    base: Option<Arc<RgbaImage>>,
    annotations: AnnotationList,
    rendered: Option<Arc<RgbaImage>>,
    next_job: u64,
    active_job: Option<u64>,
}

impl SessionState {
    fn reset(&mut self) {
        self.base = None;
        self.annotations.clear();
        self.rendered = None;
    }
}

struct Rendered {
    base: Arc<RgbaImage>,
    annotations: AnnotationList,
    image: Arc<RgbaImage>,
}

struct Shared {
    source: Arc<dyn DetectionSource>,
    options: SessionOptions,
    state: Mutex<SessionState>,
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: SessionEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn run_detection(&self, job: JobInputs) -> Result<Vec<Placement>, OverlayError> {
        let JobInputs {
            job_id,
            bytes,
            palette,
            renderer,
            renderer_epoch,
        } = job;
        let outcome = self.place_and_render(&bytes, palette, &renderer);

        let mut state = self.lock_state();
        if state.active_job != Some(job_id) {
            debug!("discarding result of superseded detection job {job_id}");
            return Err(OverlayError::Superseded(job_id));
        }
        state.active_job = None;

        let outcome = outcome.and_then(|rendered| {
            if state.renderer_epoch == renderer_epoch {
                return Ok(rendered);
            }
            debug!("renderer changed during detection job {job_id}; drawing again");
            let image = state
                .renderer
                .render(&rendered.base, rendered.annotations.as_slice())?;
            Ok(Rendered {
                image: Arc::new(image),
                ..rendered
            })
        });

        match outcome {
            Ok(rendered) => {
                let placements = rendered.annotations.to_vec();
                info!(
                    "detection job {job_id} placed {} emoji",
                    placements.len()
                );
                state.base = Some(rendered.base);
                state.annotations = rendered.annotations;
                state.rendered = Some(Arc::clone(&rendered.image));
                self.publish(SessionEvent::Detected {
                    job_id,
                    placements: placements.clone(),
                    image: rendered.image,
                });
                Ok(placements)
            }
            Err(err) => {
                warn!("detection job {job_id} failed: {err}");
                state.reset();
                self.publish(SessionEvent::DetectionFailed {
                    job_id,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    fn place_and_render(
        &self,
        bytes: &[u8],
        palette: Vec<String>,
        renderer: &OverlayRenderer,
    ) -> Result<Rendered, OverlayError> {
        let _guard = timing_guard("emojiface_core::session_detect", log::Level::Debug);
        let base = decode_image(bytes).map_err(OverlayError::detection)?;
        let scaled = downscale_to_limit(&base, self.options.max_side);
        let (scale_x, scale_y) = compute_resize_scales(
            (base.width(), base.height()),
            (scaled.width(), scaled.height()),
        )
        .map_err(OverlayError::detection)?;

        let encoded;
        let detector_input: &[u8] = match &scaled {
            Cow::Borrowed(_) => bytes,
            Cow::Owned(image) => {
                encoded = encode_png(image).map_err(OverlayError::detection)?;
                &encoded
            }
        };
        let detections = self
            .source
            .detect(detector_input)
            .map_err(OverlayError::detection)?;
        debug!(
            "detection source returned {} record(s) (scale {scale_x:.3}x{scale_y:.3})",
            detections.len()
        );

        let mut assigner = EmojiAssigner::new(palette)?;
        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let annotations = AnnotationList::from_detections(
            &detections,
            ScaleFactors::new(scale_x, scale_y),
            &mut assigner,
            &mut rng,
        )?;

        let base = base.to_rgba8();
        let image = renderer.render(&base, annotations.as_slice())?;
        Ok(Rendered {
            base: Arc::new(base),
            annotations,
            image: Arc::new(image),
        })
    }

    /// Stop waiting for `job_id`. Returns `false` when the job is no longer active,
    /// because it finished or something newer replaced it.
    fn abandon(&self, job_id: u64, reason: &OverlayError) -> bool {
        let mut state = self.lock_state();
        if state.active_job != Some(job_id) {
            return false;
        }
        state.active_job = None;
        warn!("abandoning detection job {job_id}: {reason}");
        self.publish(SessionEvent::DetectionFailed {
            job_id,
            error: reason.to_string(),
        });
        true
    }

    /// Re-render `annotations` over the current base and commit both on success.
    fn commit_edit(
        &self,
        state: &mut SessionState,
        annotations: AnnotationList,
    ) -> Result<(), OverlayError> {
        let base = state.base.as_ref().ok_or(OverlayError::NoImage)?;
        let image = Arc::new(state.renderer.render(base, annotations.as_slice())?);
        let placements = annotations.to_vec();
        state.annotations = annotations;
        state.rendered = Some(Arc::clone(&image));
        self.publish(SessionEvent::Edited { placements, image });
        Ok(())
    }
}

/// Everything a detection job needs, captured when it starts.
struct JobInputs {
    job_id: u64,
    bytes: Vec<u8>,
    palette: Vec<String>,
    renderer: OverlayRenderer,
    renderer_epoch: u64,
}

/// An emoji overlay session over one base image at a time.
#[derive(Clone)]
pub struct EmojiSession {
    shared: Arc<Shared>,
}

impl EmojiSession {
    pub fn new<I, S>(
        source: Arc<dyn DetectionSource>,
        renderer: OverlayRenderer,
        palette: I,
        options: SessionOptions,
    ) -> Result<Self, OverlayError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let palette = EmojiAssigner::new(palette)?.palette().to_vec();
        Ok(Self {
            shared: Arc::new(Shared {
                source,
                options,
                state: Mutex::new(SessionState {
                    palette,
                    renderer,
                    renderer_epoch: 0,
                    base: None,
                    annotations: AnnotationList::new(),
                    rendered: None,
                    next_job: 0,
                    active_job: None,
                }),
                subscribers: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Start detecting faces in an encoded image.
    ///
    /// The current list and rendered output are cleared immediately. Any detection
    /// still in flight is superseded.
    pub fn detect(&self, image_bytes: Vec<u8>) -> DetectionJob {
        let inputs = {
            let mut state = self.shared.lock_state();
            state.next_job += 1;
            let job_id = state.next_job;
            if let Some(previous) = state.active_job.replace(job_id) {
                debug!("detection job {previous} superseded by {job_id}");
            }
            state.reset();
            self.shared.publish(SessionEvent::Cleared);
            self.shared
                .publish(SessionEvent::DetectionStarted { job_id });
            JobInputs {
                job_id,
                bytes: image_bytes,
                palette: state.palette.clone(),
                renderer: state.renderer.clone(),
                renderer_epoch: state.renderer_epoch,
            }
        };

        let job_id = inputs.job_id;
        info!(
            "launching detection job {job_id} ({} bytes)",
            inputs.bytes.len()
        );
        let (tx, rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        rayon::spawn(move || {
            let result = shared.run_detection(inputs);
            if tx.send(result).is_err() {
                debug!("nobody is waiting for detection job {job_id}");
            }
        });

        DetectionJob {
            job_id,
            receiver: rx,
            shared: Arc::clone(&self.shared),
            timeout: self.shared.options.timeout,
        }
    }

    /// Change the symbol at `index`, or remove it when `symbol` is empty.
    pub fn update(
        &self,
        index: usize,
        symbol: &str,
        diameter: f32,
        angle_degrees: f32,
    ) -> Result<EditOutcome, OverlayError> {
        let mut state = self.shared.lock_state();
        if state.base.is_none() {
            return Err(OverlayError::NoImage);
        }
        let mut annotations = state.annotations.clone();
        let outcome = annotations.update(index, symbol, diameter, angle_degrees)?;
        self.shared.commit_edit(&mut state, annotations)?;
        Ok(outcome)
    }

    /// Append a placement and return its index.
    pub fn add(
        &self,
        center_x: f32,
        center_y: f32,
        symbol: &str,
        diameter: f32,
        angle_degrees: f32,
    ) -> Result<usize, OverlayError> {
        let mut state = self.shared.lock_state();
        if state.base.is_none() {
            return Err(OverlayError::NoImage);
        }
        let mut annotations = state.annotations.clone();
        let index = annotations.add(center_x, center_y, symbol, diameter, angle_degrees)?;
        self.shared.commit_edit(&mut state, annotations)?;
        Ok(index)
    }

    /// Drop everything and return to the state before any detection.
    pub fn clear(&self) {
        let mut state = self.shared.lock_state();
        if let Some(job_id) = state.active_job.take() {
            debug!("detection job {job_id} cancelled by clear");
        }
        state.reset();
        self.shared.publish(SessionEvent::Cleared);
    }

    /// Replace the base image and list without running detection.
    pub fn load_placements(
        &self,
        image: &DynamicImage,
        placements: Vec<Placement>,
    ) -> Result<(), OverlayError> {
        let annotations = AnnotationList::from_placements(placements)?;
        let base = Arc::new(image.to_rgba8());

        let mut state = self.shared.lock_state();
        let rendered = Arc::new(state.renderer.render(&base, annotations.as_slice())?);
        if let Some(job_id) = state.active_job.take() {
            debug!("detection job {job_id} superseded by loaded placements");
        }
        let placements = annotations.to_vec();
        state.base = Some(base);
        state.annotations = annotations;
        state.rendered = Some(Arc::clone(&rendered));
        self.shared.publish(SessionEvent::Edited {
            placements,
            image: rendered,
        });
        Ok(())
    }

    /// Replace the palette used by subsequent detections.
    pub fn set_palette<I, S>(&self, palette: I) -> Result<(), OverlayError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let palette = EmojiAssigner::new(palette)?.palette().to_vec();
        self.shared.lock_state().palette = palette;
        Ok(())
    }

    /// Swap the renderer (font or colour) and redraw the current list with it.
    ///
    /// Without a base image the renderer is simply stored. If the redraw fails the
    /// previous renderer and output stay in place.
    pub fn set_renderer(&self, renderer: OverlayRenderer) -> Result<(), OverlayError> {
        let mut state = self.shared.lock_state();
        let previous = std::mem::replace(&mut state.renderer, renderer);
        if state.base.is_some() {
            let annotations = state.annotations.clone();
            if let Err(err) = self.shared.commit_edit(&mut state, annotations) {
                state.renderer = previous;
                return Err(err);
            }
        }
        state.renderer_epoch += 1;
        info!("renderer replaced ({:?})", state.renderer);
        Ok(())
    }

    pub fn palette(&self) -> Vec<String> {
        self.shared.lock_state().palette.clone()
    }

    pub fn placements(&self) -> Vec<Placement> {
        self.shared.lock_state().annotations.to_vec()
    }

    pub fn rendered(&self) -> Option<Arc<RgbaImage>> {
        self.shared.lock_state().rendered.clone()
    }

    pub fn base_image(&self) -> Option<Arc<RgbaImage>> {
        self.shared.lock_state().base.clone()
    }

    pub fn is_detecting(&self) -> bool {
        self.shared.lock_state().active_job.is_some()
    }
}

/// Handle to a detection started with [`EmojiSession::detect`].
pub struct DetectionJob {
    job_id: u64,
    receiver: Receiver<Result<Vec<Placement>, OverlayError>>,
    shared: Arc<Shared>,
    timeout: Option<Duration>,
}

impl DetectionJob {
    pub fn id(&self) -> u64 {
        self.job_id
    }

    /// Block until the job finishes, honouring the session's default timeout.
    pub fn wait(self) -> Result<Vec<Placement>, OverlayError> {
        match self.timeout {
            Some(timeout) => self.wait_timeout(timeout),
            None => self
                .receiver
                .recv()
                .unwrap_or_else(|_| Err(worker_stopped())),
        }
    }

    /// Block for at most `timeout`. A job that times out is superseded.
    ///
    /// A job that a newer detect, `clear` or `load_placements` already replaced reports
    /// [`OverlayError::Superseded`] rather than a timeout.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Vec<Placement>, OverlayError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                let err = OverlayError::Timeout(timeout);
                if self.shared.abandon(self.job_id, &err) {
                    return Err(err);
                }
                // A job that finished just now sends promptly; a replaced one may not.
                self.receiver
                    .recv_timeout(SETTLE_GRACE)
                    .unwrap_or(Err(OverlayError::Superseded(self.job_id)))
            }
            Err(RecvTimeoutError::Disconnected) => Err(worker_stopped()),
        }
    }

    /// Non-blocking check; `None` while the job is still running.
    pub fn poll(&self) -> Option<Result<Vec<Placement>, OverlayError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(worker_stopped())),
        }
    }
}

fn worker_stopped() -> OverlayError {
    OverlayError::Detection("detection worker stopped without a result".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Detection, RecordedDetections, source_fn};
    use crate::render::{GlyphInk, GlyphSource, OutlineCurve, ShapedSymbol, point};
    use emojiface_utils::RgbaColor;
    use image::Rgba;

    struct SquareGlyphs;

    impl GlyphSource for SquareGlyphs {
        fn shape(&self, _symbol: &str, size: f32) -> ShapedSymbol {
            let c = [
                point(0.0, -0.8 * size),
                point(size, -0.8 * size),
                point(size, 0.2 * size),
                point(0.0, 0.2 * size),
            ];
            ShapedSymbol {
                ascent: 0.8 * size,
                descent: -0.2 * size,
                advance: size,
                ink: vec![GlyphInk::Outline(
                    (0..4)
                        .map(|i| OutlineCurve::Line(c[i], c[(i + 1) % 4]))
                        .collect(),
                )],
            }
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([255, 255, 255, 255]),
        ));
        encode_png(&image).unwrap()
    }

    fn face(cx: f32) -> Detection {
        let mut row = [0.0f32; 21];
        row[..5].copy_from_slice(&[cx, 20.0, 16.0, 16.0, 0.9]);
        row[6] = cx - 4.0;
        row[7] = 18.0;
        row[9] = cx + 4.0;
        row[10] = 18.0;
        Detection::from_row(&row).unwrap()
    }

    fn session_with(source: Arc<dyn DetectionSource>, seed: Option<u64>) -> EmojiSession {
        EmojiSession::new(
            source,
            OverlayRenderer::new(Arc::new(SquareGlyphs), RgbaColor::default()),
            ["😂", "😎", "😆"],
            SessionOptions {
                seed,
                ..SessionOptions::default()
            },
        )
        .unwrap()
    }

    fn drain(rx: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn empty_palette_is_rejected() {
        let result = EmojiSession::new(
            Arc::new(RecordedDetections::default()),
            OverlayRenderer::without_glyphs(RgbaColor::default()),
            Vec::<String>::new(),
            SessionOptions::default(),
        );
        assert!(matches!(result, Err(OverlayError::EmptyPalette)));
    }

    #[test]
    fn edits_need_an_image() {
        let session = session_with(Arc::new(RecordedDetections::default()), None);
        assert!(matches!(
            session.add(1.0, 1.0, "😂", 5.0, 0.0),
            Err(OverlayError::NoImage)
        ));
        assert!(matches!(
            session.update(0, "😂", 5.0, 0.0),
            Err(OverlayError::NoImage)
        ));
    }

    #[test]
    fn detect_publishes_events_in_order() {
        let source = RecordedDetections::new(vec![face(40.0), face(10.0)]);
        let session = session_with(Arc::new(source), Some(1));
        let events = session.subscribe();

        let placements = session.detect(png(64, 48)).wait().expect("detect");
        assert_eq!(placements.len(), 2);
        assert!(placements[0].center_x < placements[1].center_x);
        assert!(!session.is_detecting());

        let events = drain(&events);
        assert!(matches!(events[0], SessionEvent::Cleared));
        assert!(matches!(events[1], SessionEvent::DetectionStarted { job_id: 1 }));
        match &events[2] {
            SessionEvent::Detected {
                job_id, placements, ..
            } => {
                assert_eq!(*job_id, 1);
                assert_eq!(placements.len(), 2);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn failed_detection_leaves_nothing_behind() {
        let source = source_fn(|_bytes: &[u8]| anyhow::bail!("model exploded"));
        let session = session_with(Arc::new(source), None);
        let events = session.subscribe();

        let err = session.detect(png(8, 8)).wait().expect_err("should fail");
        assert!(err.to_string().contains("model exploded"));
        assert!(session.placements().is_empty());
        assert!(session.rendered().is_none());
        assert!(
            drain(&events)
                .iter()
                .any(|e| matches!(e, SessionEvent::DetectionFailed { .. }))
        );
    }

    #[test]
    fn undecodable_bytes_fail_the_job() {
        let session = session_with(Arc::new(RecordedDetections::default()), None);
        let err = session.detect(b"garbage".to_vec()).wait().expect_err("bad bytes");
        assert!(matches!(err, OverlayError::Detection(_)));
    }

    #[test]
    fn large_images_are_downscaled_for_the_source() {
        let seen = Arc::new(Mutex::new(None));
        let seen_by_source = Arc::clone(&seen);
        let source = source_fn(move |bytes: &[u8]| {
            let image = decode_image(bytes)?;
            *seen_by_source.lock().unwrap() = Some((image.width(), image.height()));
            // One face centered in the downscaled image.
            let mut row = [0.0f32; 21];
            row[..5].copy_from_slice(&[
                image.width() as f32 / 2.0,
                image.height() as f32 / 2.0,
                10.0,
                10.0,
                0.9,
            ]);
            row[9] = 1.0;
            Ok(vec![Detection::from_row(&row)?])
        });
        let session = EmojiSession::new(
            Arc::new(source),
            OverlayRenderer::new(Arc::new(SquareGlyphs), RgbaColor::default()),
            ["🙂"],
            SessionOptions {
                max_side: 50,
                ..SessionOptions::default()
            },
        )
        .unwrap();

        let placements = session.detect(png(200, 100)).wait().expect("detect");
        assert_eq!(*seen.lock().unwrap(), Some((50, 25)));
        assert_eq!(placements.len(), 1);
        assert!((placements[0].center_x - 100.0).abs() < 1e-3);
        assert!((placements[0].center_y - 50.0).abs() < 1e-3);
        assert!((placements[0].diameter - 40.0).abs() < 1e-3);

        let rendered = session.rendered().unwrap();
        assert_eq!(rendered.dimensions(), (200, 100));
    }

    #[test]
    fn newer_detection_supersedes_older() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let source = source_fn(move |bytes: &[u8]| {
            let image = decode_image(bytes)?;
            if image.width() == 30 {
                // The first job blocks until the test lets it go.
                let _ = release_rx.lock().unwrap().recv();
                return Ok(vec![face(5.0), face(15.0), face(25.0)]);
            }
            Ok(vec![face(10.0)])
        });
        let session = session_with(Arc::new(source), Some(3));

        let first = session.detect(png(30, 30));
        let second = session.detect(png(40, 40));
        release_tx.send(()).unwrap();

        let placements = second.wait().expect("second job");
        assert_eq!(placements.len(), 1);
        assert!(matches!(first.wait(), Err(OverlayError::Superseded(1))));
        assert_eq!(session.placements().len(), 1);
        assert_eq!(session.base_image().unwrap().dimensions(), (40, 40));
    }

    #[test]
    fn timed_out_job_is_abandoned() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let source = source_fn(move |_bytes: &[u8]| {
            let _ = release_rx.lock().unwrap().recv();
            Ok(vec![face(10.0)])
        });
        let session = session_with(Arc::new(source), None);

        let job = session.detect(png(20, 20));
        let err = job
            .wait_timeout(Duration::from_millis(20))
            .expect_err("should time out");
        assert!(matches!(err, OverlayError::Timeout(_)));
        assert!(!session.is_detecting());

        release_tx.send(()).unwrap();
        // The late result must not land in the session.
        std::thread::sleep(Duration::from_millis(100));
        assert!(session.placements().is_empty());
        assert!(session.rendered().is_none());
    }

    #[test]
    fn replaced_job_reports_superseded_after_a_timeout() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let source = source_fn(move |bytes: &[u8]| {
            if decode_image(bytes)?.width() == 30 {
                let _ = release_rx.lock().unwrap().recv();
            }
            Ok(vec![face(10.0)])
        });
        let session = session_with(Arc::new(source), None);

        let first = session.detect(png(30, 30));
        let second = session.detect(png(40, 40));
        let err = first
            .wait_timeout(Duration::from_millis(20))
            .expect_err("first job was replaced");
        assert!(matches!(err, OverlayError::Superseded(1)));
        // Waiting on the old job must not cancel the new one.
        assert!(session.is_detecting());

        release_tx.send(()).unwrap();
        assert_eq!(second.wait().expect("second job").len(), 1);
        assert_eq!(session.placements().len(), 1);
    }

    #[test]
    fn poll_stays_empty_until_the_job_finishes() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let source = source_fn(move |_bytes: &[u8]| {
            let _ = release_rx.lock().unwrap().recv();
            Ok(vec![face(10.0)])
        });
        let session = session_with(Arc::new(source), None);

        let job = session.detect(png(20, 40));
        assert_eq!(job.id(), 1);
        assert!(job.poll().is_none());

        release_tx.send(()).unwrap();
        let mut result = None;
        for _ in 0..400 {
            result = job.poll();
            if result.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let placements = result.expect("job finished").expect("detect");
        assert_eq!(placements.len(), 1);
        assert_eq!(session.placements(), placements);

        // With the sender gone the source no longer blocks.
        drop(release_tx);
        let next = session.detect(png(20, 40));
        assert_eq!(next.id(), 2);
        next.wait().expect("second detect");
    }

    #[test]
    fn set_renderer_redraws_the_current_list() {
        let session = session_with(Arc::new(RecordedDetections::new(vec![face(10.0)])), Some(2));
        let placements = session.detect(png(32, 40)).wait().expect("detect");
        let (x, y) = (
            placements[0].center_x.round() as u32,
            placements[0].center_y.round() as u32,
        );
        assert_eq!(*session.rendered().unwrap().get_pixel(x, y), Rgba([0, 0, 0, 255]));
        let events = session.subscribe();

        let red = OverlayRenderer::new(Arc::new(SquareGlyphs), RgbaColor::opaque(255, 0, 0));
        session.set_renderer(red).expect("redraw");
        assert_eq!(session.placements(), placements);
        assert_eq!(*session.rendered().unwrap().get_pixel(x, y), Rgba([255, 0, 0, 255]));
        assert!(matches!(
            drain(&events).as_slice(),
            [SessionEvent::Edited { .. }]
        ));

        // A renderer that cannot draw the list is refused and the red one stays.
        let err = session
            .set_renderer(OverlayRenderer::without_glyphs(RgbaColor::default()))
            .expect_err("no glyphs");
        assert!(matches!(err, OverlayError::MissingGlyphs(1)));
        session.update(0, "😎", placements[0].diameter, 0.0).expect("edit");
        assert_eq!(*session.rendered().unwrap().get_pixel(x, y), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn set_renderer_without_an_image_only_stores_it() {
        let session = session_with(Arc::new(RecordedDetections::new(vec![face(10.0)])), None);
        let events = session.subscribe();
        session
            .set_renderer(OverlayRenderer::without_glyphs(RgbaColor::default()))
            .expect("stored");
        assert!(drain(&events).is_empty());
        assert!(session.rendered().is_none());

        let err = session.detect(png(32, 40)).wait().expect_err("no glyphs to draw with");
        assert!(matches!(err, OverlayError::MissingGlyphs(1)));
    }

    #[test]
    fn renderer_swapped_during_detection_is_used_for_the_result() {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let source = source_fn(move |_bytes: &[u8]| {
            let _ = release_rx.lock().unwrap().recv();
            Ok(vec![face(10.0)])
        });
        let session = session_with(Arc::new(source), None);

        let job = session.detect(png(32, 40));
        let red = OverlayRenderer::new(Arc::new(SquareGlyphs), RgbaColor::opaque(255, 0, 0));
        session.set_renderer(red).expect("stored");
        release_tx.send(()).unwrap();

        let placements = job.wait().expect("detect");
        let (x, y) = (
            placements[0].center_x.round() as u32,
            placements[0].center_y.round() as u32,
        );
        assert_eq!(*session.rendered().unwrap().get_pixel(x, y), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn clear_resets_and_cancels() {
        let session = session_with(Arc::new(RecordedDetections::new(vec![face(10.0)])), None);
        session.detect(png(20, 20)).wait().unwrap();
        assert!(session.base_image().is_some());

        session.clear();
        assert!(session.placements().is_empty());
        assert!(session.rendered().is_none());
        assert!(session.base_image().is_none());
    }

    #[test]
    fn failed_edit_keeps_previous_state() {
        let session = session_with(Arc::new(RecordedDetections::new(vec![face(10.0)])), None);
        session.detect(png(20, 20)).wait().unwrap();
        let before = session.placements();
        let rendered_before = session.rendered().unwrap();

        assert!(session.update(5, "😂", 10.0, 0.0).is_err());
        assert!(session.update(0, "😂", -1.0, 0.0).is_err());
        assert!(session.add(1.0, 1.0, "", 10.0, 0.0).is_err());
        assert_eq!(session.placements(), before);
        assert_eq!(*session.rendered().unwrap(), *rendered_before);
    }

    #[test]
    fn set_palette_validates() {
        let session = session_with(Arc::new(RecordedDetections::default()), None);
        assert!(session.set_palette(Vec::<String>::new()).is_err());
        session.set_palette(["🐱", "🐶"]).unwrap();
        assert_eq!(session.palette(), vec!["🐱", "🐶"]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let session = session_with(Arc::new(RecordedDetections::default()), None);
        let kept = session.subscribe();
        drop(session.subscribe());
        session.clear();
        assert_eq!(drain(&kept).len(), 1);
        assert_eq!(session.shared.subscribers.lock().unwrap().len(), 1);
    }
}
