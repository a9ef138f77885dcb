//! Live projector session.
//!
//! [`ChristieProjector`] owns everything for one device:
//!
//! ```text
//! transport reader ─► LineFramer ─► ReceiveQueue ─► parse_response ─► state + feedback
//!                                                                        │
//! control calls ─► interlock checks ─► CommandSender ─► transport ◄──────┘ (polls)
//! ```
//!
//! # Power interlock
//!
//! Powering on from off raises `warming`; powering off from on raises
//! `cooling`. While either flag is up, power commands are ignored. Each flag
//! is cleared only by its own timer (warming/cooling time from the
//! properties), never by power feedback, so `power_on` and `warming` are
//! independent signals. Every activation gets a new generation number and a
//! timer only clears the flag if its generation is still current.
//!
//! # Deferred input switch
//!
//! Selecting an input while the projector is not on stores the request in a
//! single pending slot (a newer request overwrites it) and powers on. When
//! the warm-up timer clears the flag, the pending switch runs once.
//!
//! State lives behind a short-lived mutex. Frames are applied one at a time
//! by the receive queue worker; control calls only hold the lock for the
//! check-and-set, never across a send or a settle delay.

use crate::config::{ProjectorConfig, ProjectorProperties, SessionLogging};
use crate::dialect::{ModelDialect, ProjectorModel, POWER_CODE, SHUTTER_CODE};
use crate::inputs::InputPort;
use crate::poll::PollSequencer;
use crate::protocol::{self, ParsedResponse, Response};
use crate::sender::CommandSender;
use pjctl_core::capabilities::SwitchOutcome;
use pjctl_core::monitor::{CommunicationMonitor, MonitorConfig, MonitorStatus};
use pjctl_core::observable::Observable;
use pjctl_core::queue::{FrameHandler, FrameSink, ReceiveQueue};
use pjctl_core::transport::{StreamTransport, Transport};
use pjctl_core::{PjError, PjResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Instrument, Span};

/// Wait after `(PWR1)` before querying power.
pub const POWER_ON_SETTLE: Duration = Duration::from_millis(1500);
/// Wait after `(PWR0)` before querying power.
pub const POWER_OFF_SETTLE: Duration = Duration::from_millis(50);
/// Wait after an input select before querying the input.
pub const INPUT_SETTLE: Duration = Duration::from_secs(2);
/// Wait after `(SHU0/1)` before querying the shutter.
pub const VIDEO_MUTE_SETTLE: Duration = Duration::from_millis(25);

/// Threshold after which a silent device is reported as `Warning`.
pub const COMM_WARNING_AFTER: Duration = Duration::from_secs(180);
/// Threshold after which a silent device is reported as `Error`.
pub const COMM_ERROR_AFTER: Duration = Duration::from_secs(300);

const EVENT_CAPACITY: usize = 64;

/// Change notifications, one per state change.
///
/// Power, video mute and input fire only when the value changes. Warming,
/// cooling and lamp hours fire on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProjectorEvent {
    /// Power feedback changed.
    Power {
        /// Reported power state.
        on: bool,
    },
    /// Warm-up interlock raised or cleared.
    Warming {
        /// Interlock state.
        active: bool,
    },
    /// Cool-down interlock raised or cleared.
    Cooling {
        /// Interlock state.
        active: bool,
    },
    /// Active input changed.
    Input {
        /// 1-based ordinal.
        ordinal: usize,
        /// Routing key.
        key: String,
    },
    /// Video mute feedback changed.
    VideoMute {
        /// Reported mute state.
        on: bool,
    },
    /// Lamp hours reported.
    LampHours {
        /// Reported hours.
        hours: i32,
    },
}

/// Observable feedback for UI bindings.
#[derive(Debug, Clone)]
pub struct ProjectorFeedback {
    /// Last reported power state.
    pub power_on: Observable<bool>,
    /// Warm-up interlock.
    pub warming: Observable<bool>,
    /// Cool-down interlock.
    pub cooling: Observable<bool>,
    /// Key of the active input, `None` until first reported.
    pub current_input: Observable<Option<String>>,
    /// 1-based ordinal of the active input, 0 until first reported.
    pub current_input_number: Observable<usize>,
    /// Last reported video mute state.
    pub video_mute: Observable<bool>,
    /// Lamp hours, `None` until first reported.
    pub lamp_hours: Observable<Option<i32>>,
    /// Connected and answering.
    pub online: Observable<bool>,
    /// Traffic-based link status.
    pub communication: Observable<MonitorStatus>,
}

impl ProjectorFeedback {
    fn new(monitor: &CommunicationMonitor) -> Self {
        Self {
            power_on: Observable::new("power_on", false),
            warming: Observable::new("warming", false)
                .with_description("Warm-up interlock active"),
            cooling: Observable::new("cooling", false)
                .with_description("Cool-down interlock active"),
            current_input: Observable::new("current_input", None),
            current_input_number: Observable::new("current_input_number", 0),
            video_mute: Observable::new("video_mute", false),
            lamp_hours: Observable::new("lamp_hours", None)
                .with_description("Lamp or laser runtime")
                .with_units("h"),
            online: monitor.online(),
            communication: monitor.status(),
        }
    }
}

/// Everything known about a projector at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectorStatus {
    /// Device key.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Model.
    pub model: ProjectorModel,
    /// Transport link up.
    pub connected: bool,
    /// Traffic-based link status.
    pub communication: MonitorStatus,
    /// Connected and answering.
    pub online: bool,
    /// Last reported power state.
    pub power_on: bool,
    /// Warm-up interlock.
    pub warming: bool,
    /// Cool-down interlock.
    pub cooling: bool,
    /// Display name of the active input.
    pub current_input: Option<String>,
    /// Key of the active input.
    pub current_input_key: Option<String>,
    /// 1-based ordinal of the active input, 0 if unknown.
    pub current_input_number: usize,
    /// Last reported video mute state.
    pub video_mute: bool,
    /// Lamp hours, if reported.
    pub lamp_hours: Option<i32>,
    /// Lamp capability flag.
    pub has_lamps: bool,
    /// Screen capability flag.
    pub has_screen: bool,
    /// Lift capability flag.
    pub has_lift: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    power_on: bool,
    warming: bool,
    cooling: bool,
    warm_generation: u64,
    cool_generation: u64,
    current_input: Option<(usize, &'static InputPort)>,
    video_mute: bool,
    lamp_hours: Option<i32>,
    pending_switch: Option<usize>,
}

struct Inner {
    key: String,
    name: String,
    dialect: &'static ModelDialect,
    properties: ProjectorProperties,
    logging: SessionLogging,
    transport: Arc<dyn Transport>,
    sender: CommandSender,
    poller: PollSequencer,
    state: Mutex<SessionState>,
    feedback: ProjectorFeedback,
    events: broadcast::Sender<ProjectorEvent>,
    queue: ReceiveQueue,
    monitor: CommunicationMonitor,
    cancel: CancellationToken,
    span: Span,
}

/// A Christie projector session.
///
/// Cheap to clone; clones share the session. Must be created inside a tokio
/// runtime (the receive worker is spawned immediately).
#[derive(Clone)]
pub struct ChristieProjector {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChristieProjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChristieProjector")
            .field("key", &self.inner.key)
            .field("model", &self.inner.dialect.model)
            .field("state", &*self.inner.state.lock())
            .finish_non_exhaustive()
    }
}

impl ChristieProjector {
    /// Session reaching the projector as configured in `config.control`.
    pub fn new(config: &ProjectorConfig) -> PjResult<Self> {
        config.validate()?;
        let connector = config.control.connector();
        Ok(Self::with_transport(config, move |sink| {
            Arc::new(StreamTransport::new(connector, protocol::FRAME_DELIMITER, sink))
                as Arc<dyn Transport>
        }))
    }

    /// Session over a caller-supplied transport.
    ///
    /// `make_transport` receives the sink that incoming frames must be
    /// pushed into. `config.control` is ignored.
    pub fn with_transport<F>(config: &ProjectorConfig, make_transport: F) -> Self
    where
        F: FnOnce(FrameSink) -> Arc<dyn Transport>,
    {
        let dialect = config.model().dialect();
        let properties = config.properties.clone();
        let span = tracing::info_span!("projector", device = %config.key);

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let _enter = span.enter();

            let handler: FrameHandler = {
                let weak = weak.clone();
                Arc::new(move |frame: &str| match weak.upgrade() {
                    Some(inner) => inner.handle_frame(frame),
                    None => Ok(()),
                })
            };
            let queue = ReceiveQueue::spawn(config.key.clone(), handler);
            let transport = make_transport(queue.sink());
            let sender = CommandSender::new(transport.clone(), config.logging);
            let monitor = CommunicationMonitor::new(
                transport.clone(),
                MonitorConfig {
                    poll_interval: properties.poll_interval(),
                    warning_after: COMM_WARNING_AFTER,
                    error_after: COMM_ERROR_AFTER,
                },
            );
            let (events, _) = broadcast::channel(EVENT_CAPACITY);

            Inner {
                key: config.key.clone(),
                name: config.display_name().to_string(),
                dialect,
                logging: config.logging,
                poller: PollSequencer::new(sender.clone(), dialect, properties.has_lamps),
                properties: properties.clone(),
                transport,
                sender,
                state: Mutex::new(SessionState::default()),
                feedback: ProjectorFeedback::new(&monitor),
                events,
                queue,
                monitor,
                cancel: CancellationToken::new(),
                span: span.clone(),
            }
        });

        debug!(device = %inner.key, model = %dialect.model, "Projector session created");
        Self { inner }
    }

    // -------------------------------------------------------------------------
    // Identity and static properties
    // -------------------------------------------------------------------------

    /// Projector has a lamp counter.
    pub fn has_lamps(&self) -> bool {
        self.inner.properties.has_lamps
    }

    /// A motorised screen is installed.
    pub fn has_screen(&self) -> bool {
        self.inner.properties.has_screen
    }

    /// A projector lift is installed.
    pub fn has_lift(&self) -> bool {
        self.inner.properties.has_lift
    }

    // -------------------------------------------------------------------------
    // Feedback
    // -------------------------------------------------------------------------

    /// Observable feedback.
    pub fn feedback(&self) -> &ProjectorFeedback {
        &self.inner.feedback
    }

    /// Subscribe to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProjectorEvent> {
        self.inner.events.subscribe()
    }

    /// Sink for frames received from the device.
    pub fn frame_sink(&self) -> FrameSink {
        self.inner.queue.sink()
    }

    /// Apply one received frame immediately.
    ///
    /// Normally frames arrive through the receive queue; this is the
    /// function its worker runs. Frames that fail to parse are logged and
    /// dropped.
    pub fn handle_frame(&self, frame: &str) {
        if let Err(e) = self.inner.handle_frame(frame) {
            let _enter = self.inner.span.enter();
            warn!(frame = %frame.trim(), "Dropping frame: {}", e);
        }
    }

    /// Snapshot of all feedback.
    pub fn status(&self) -> ProjectorStatus {
        let st = self.inner.state.lock();
        ProjectorStatus {
            key: self.inner.key.clone(),
            name: self.inner.name.clone(),
            model: self.inner.dialect.model,
            connected: self.inner.transport.is_connected(),
            communication: self.inner.feedback.communication.get(),
            online: self.inner.feedback.online.get(),
            power_on: st.power_on,
            warming: st.warming,
            cooling: st.cooling,
            current_input: st.current_input.map(|(_, p)| p.display_name.to_string()),
            current_input_key: st.current_input.map(|(_, p)| p.key.to_string()),
            current_input_number: st.current_input.map(|(o, _)| o).unwrap_or(0),
            video_mute: st.video_mute,
            lamp_hours: st.lamp_hours,
            has_lamps: self.has_lamps(),
            has_screen: self.has_screen(),
            has_lift: self.has_lift(),
        }
    }

    /// Whether a deferred input switch is waiting for warm-up.
    pub fn pending_input(&self) -> Option<usize> {
        self.inner.state.lock().pending_switch
    }

    // -------------------------------------------------------------------------
    // Inputs
    // -------------------------------------------------------------------------

    /// Input display names in ordinal order.
    pub fn input_names(&self) -> Vec<String> {
        self.inner.dialect.inputs.names()
    }

    /// 1-based ordinal of the active input, 0 if unknown.
    pub fn current_input_number(&self) -> usize {
        self.inner
            .state
            .lock()
            .current_input
            .map(|(o, _)| o)
            .unwrap_or(0)
    }

    /// Whether `ordinal` is the active input.
    pub fn is_input_selected(&self, ordinal: usize) -> bool {
        ordinal != 0 && self.current_input_number() == ordinal
    }

    /// Log and return the model's input table.
    pub fn list_input_ports(&self) -> Vec<&'static InputPort> {
        let _enter = self.inner.span.enter();
        self.inner
            .dialect
            .inputs
            .iter()
            .enumerate()
            .map(|(i, port)| {
                info!(
                    index = i + 1,
                    key = port.key,
                    kind = %port.connection_kind,
                    feedback_code = port.feedback_match_code,
                    "Input port: {}",
                    port.display_name
                );
                port
            })
            .collect()
    }

    /// Select the input at 1-based `ordinal`.
    ///
    /// Sends the select immediately if the projector reports power on.
    /// Otherwise the request is parked until warm-up completes and power on
    /// is issued. Out-of-range ordinals are logged and rejected.
    pub async fn request_input(&self, ordinal: usize) -> SwitchOutcome {
        let span = self.inner.span.clone();
        self.inner.request_input(ordinal).instrument(span).await
    }

    /// Not supported by the Christie protocol.
    pub async fn input_toggle(&self) -> PjResult<()> {
        Err(PjError::Unsupported("InputToggle"))
    }

    /// Query the active input.
    pub async fn input_get(&self) {
        let span = self.inner.span.clone();
        self.inner
            .sender
            .send_query(self.inner.dialect.input_code)
            .instrument(span)
            .await;
    }

    // -------------------------------------------------------------------------
    // Power
    // -------------------------------------------------------------------------

    /// Power on. Ignored while warming or cooling.
    pub async fn power_on(&self) {
        let span = self.inner.span.clone();
        self.inner.power_on().instrument(span).await;
    }

    /// Power off. Ignored while warming or cooling.
    pub async fn power_off(&self) {
        let span = self.inner.span.clone();
        self.inner.power_off().instrument(span).await;
    }

    /// Off if on, on otherwise.
    pub async fn power_toggle(&self) {
        let on = self.inner.state.lock().power_on;
        if on {
            self.power_off().await;
        } else {
            self.power_on().await;
        }
    }

    /// Query power.
    pub async fn power_get(&self) {
        let span = self.inner.span.clone();
        self.inner.sender.send_query(POWER_CODE).instrument(span).await;
    }

    // -------------------------------------------------------------------------
    // Video mute
    // -------------------------------------------------------------------------

    /// Blank the picture.
    pub async fn video_mute_on(&self) {
        let span = self.inner.span.clone();
        self.inner.video_mute(true).instrument(span).await;
    }

    /// Restore the picture.
    pub async fn video_mute_off(&self) {
        let span = self.inner.span.clone();
        self.inner.video_mute(false).instrument(span).await;
    }

    /// Flip based on the last reported state.
    pub async fn video_mute_toggle(&self) {
        let muted = self.inner.state.lock().video_mute;
        if muted {
            self.video_mute_off().await;
        } else {
            self.video_mute_on().await;
        }
    }

    /// Query the shutter.
    pub async fn video_mute_get(&self) {
        let span = self.inner.span.clone();
        self.inner.sender.send_query(SHUTTER_CODE).instrument(span).await;
    }

    // -------------------------------------------------------------------------
    // Lamp and polling
    // -------------------------------------------------------------------------

    /// Query lamp hours.
    pub async fn lamp_get(&self) {
        let span = self.inner.span.clone();
        self.inner
            .sender
            .send_query(self.inner.dialect.lamp_query_code)
            .instrument(span)
            .await;
    }

    /// Run one status poll. Returns `false` if one was already running.
    pub async fn status_get(&self) -> bool {
        let span = self.inner.span.clone();
        self.inner.status_get().instrument(span).await
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Connect and start the communication monitor.
    ///
    /// A failed first connect is logged, not returned; the monitor retries on
    /// every poll tick.
    pub async fn start(&self) {
        let span = self.inner.span.clone();
        self.inner.start().instrument(span).await;
    }

    /// Stop all background work and disconnect. The session cannot be
    /// restarted afterwards.
    pub async fn shutdown(&self) {
        let span = self.inner.span.clone();
        self.inner.shutdown().instrument(span).await;
    }
}

impl Inner {
    fn emit(&self, event: ProjectorEvent) {
        let _ = self.events.send(event);
    }

    // -------------------------------------------------------------------------
    // Receive path
    // -------------------------------------------------------------------------

    fn handle_frame(&self, frame: &str) -> PjResult<()> {
        if self.logging.log_frames {
            debug!(frame = %frame.trim(), "RX");
        } else {
            trace!(frame = %frame.trim(), "RX");
        }
        let parsed = protocol::parse_response(frame);
        match &parsed {
            Ok(Some(Response::General(parsed))) => self.apply(parsed),
            Ok(Some(Response::LampHours(hours))) => self.apply_lamp_hours(*hours),
            Ok(None) => trace!("Ignoring frame without a response"),
            Err(_) => {}
        }
        // After applying, so `online` never runs ahead of the state it reports.
        self.monitor.record_activity();
        parsed.map(|_| ())
    }

    fn apply(&self, parsed: &ParsedResponse) {
        let code = parsed.command_code.as_str();
        if code == POWER_CODE {
            self.apply_power(parsed.value == 1);
        } else if code == SHUTTER_CODE {
            self.apply_video_mute(parsed.value == 1);
        } else if code == self.dialect.input_code {
            self.apply_input(parsed.value);
        } else if Some(code) == self.dialect.lamp_response_code {
            self.apply_lamp_hours(parsed.value);
        } else {
            debug!(code, value = parsed.value, "Unhandled response");
        }
    }

    fn apply_power(&self, on: bool) {
        let mut st = self.state.lock();
        if st.power_on == on {
            return;
        }
        st.power_on = on;
        self.feedback.power_on.set_if_changed(on);
        self.emit(ProjectorEvent::Power { on });
        info!(power_on = on, "Power feedback");
    }

    fn apply_video_mute(&self, on: bool) {
        let mut st = self.state.lock();
        if st.video_mute == on {
            return;
        }
        st.video_mute = on;
        self.feedback.video_mute.set_if_changed(on);
        self.emit(ProjectorEvent::VideoMute { on });
        debug!(video_mute = on, "Video mute feedback");
    }

    fn apply_input(&self, code: i32) {
        let Some((ordinal, port)) = self.dialect.inputs.by_feedback_code(code) else {
            debug!(code, "No input matches feedback code");
            return;
        };

        let mut st = self.state.lock();
        if matches!(st.current_input, Some((current, _)) if current == ordinal) {
            trace!(input = port.key, "Input unchanged");
            return;
        }
        st.current_input = Some((ordinal, port));
        self.feedback
            .current_input
            .set_if_changed(Some(port.key.to_string()));
        self.feedback.current_input_number.set(ordinal);
        self.emit(ProjectorEvent::Input {
            ordinal,
            key: port.key.to_string(),
        });
        info!(input = port.key, ordinal, "Input feedback: {}", port.display_name);
    }

    fn apply_lamp_hours(&self, hours: i32) {
        self.state.lock().lamp_hours = Some(hours);
        self.feedback.lamp_hours.set(Some(hours));
        self.emit(ProjectorEvent::LampHours { hours });
        debug!(hours, "Lamp hours");
    }

    // -------------------------------------------------------------------------
    // Power interlock
    // -------------------------------------------------------------------------

    async fn power_on(self: &Arc<Self>) {
        {
            let mut st = self.state.lock();
            if st.warming || st.cooling {
                debug!(warming = st.warming, cooling = st.cooling, "Power on ignored");
                return;
            }
            if !st.power_on {
                self.begin_warming(&mut st);
            }
        }

        self.sender.send_set(POWER_CODE, 1).await;
        tokio::time::sleep(POWER_ON_SETTLE).await;
        self.sender.send_query(POWER_CODE).await;
    }

    async fn power_off(self: &Arc<Self>) {
        {
            let mut st = self.state.lock();
            if st.warming || st.cooling {
                debug!(warming = st.warming, cooling = st.cooling, "Power off ignored");
                return;
            }
            if st.power_on {
                self.begin_cooling(&mut st);
            }
        }

        self.sender.send_set(POWER_CODE, 0).await;
        tokio::time::sleep(POWER_OFF_SETTLE).await;
        self.sender.send_query(POWER_CODE).await;
    }

    fn begin_warming(self: &Arc<Self>, st: &mut SessionState) {
        st.warming = true;
        st.warm_generation += 1;
        let generation = st.warm_generation;
        self.feedback.warming.set(true);
        self.emit(ProjectorEvent::Warming { active: true });
        info!(generation, "Warming up");

        let weak = Arc::downgrade(self);
        let delay = self.properties.warming_time();
        let cancel = self.cancel.clone();
        tokio::spawn(
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        if let Some(inner) = weak.upgrade() {
                            inner.end_warming(generation).await;
                        }
                    }
                }
            }
            .instrument(self.span.clone()),
        );
    }

    fn begin_cooling(self: &Arc<Self>, st: &mut SessionState) {
        st.cooling = true;
        st.cool_generation += 1;
        let generation = st.cool_generation;
        self.feedback.cooling.set(true);
        self.emit(ProjectorEvent::Cooling { active: true });
        info!(generation, "Cooling down");

        let weak = Arc::downgrade(self);
        let delay = self.properties.cooling_time();
        let cancel = self.cancel.clone();
        tokio::spawn(
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        if let Some(inner) = weak.upgrade() {
                            inner.end_cooling(generation);
                        }
                    }
                }
            }
            .instrument(self.span.clone()),
        );
    }

    async fn end_warming(self: &Arc<Self>, generation: u64) {
        let pending = {
            let mut st = self.state.lock();
            if !st.warming || st.warm_generation != generation {
                debug!(generation, current = st.warm_generation, "Stale warm-up timer");
                return;
            }
            st.warming = false;
            self.feedback.warming.set(false);
            self.emit(ProjectorEvent::Warming { active: false });
            st.pending_switch.take()
        };
        info!("Warm-up complete");

        if let Some(ordinal) = pending {
            match self.dialect.inputs.by_ordinal(ordinal) {
                Ok(port) => {
                    info!(input = port.key, "Running deferred input switch");
                    self.run_select(port).await;
                }
                Err(e) => warn!("Deferred input switch dropped: {}", e),
            }
        }
    }

    fn end_cooling(&self, generation: u64) {
        let mut st = self.state.lock();
        if !st.cooling || st.cool_generation != generation {
            debug!(generation, current = st.cool_generation, "Stale cool-down timer");
            return;
        }
        st.cooling = false;
        self.feedback.cooling.set(false);
        self.emit(ProjectorEvent::Cooling { active: false });
        info!("Cool-down complete");
    }

    // -------------------------------------------------------------------------
    // Input routing
    // -------------------------------------------------------------------------

    async fn request_input(self: &Arc<Self>, ordinal: usize) -> SwitchOutcome {
        let port = match self.dialect.inputs.by_ordinal(ordinal) {
            Ok(port) => port,
            Err(e) => {
                warn!("Input request rejected: {}", e);
                return SwitchOutcome::Rejected;
            }
        };

        let powered = {
            let mut st = self.state.lock();
            if st.power_on {
                if let Some(previous) = st.pending_switch.take() {
                    debug!(previous, "Dropping pending input switch");
                }
                true
            } else {
                if let Some(previous) = st.pending_switch.replace(ordinal) {
                    debug!(previous, ordinal, "Replacing pending input switch");
                }
                false
            }
        };

        if powered {
            debug!(input = port.key, ordinal, "Selecting input");
            self.spawn_select(port);
            SwitchOutcome::Selected
        } else {
            info!(input = port.key, ordinal, "Projector off; input switch deferred until warm-up completes");
            self.power_on().await;
            SwitchOutcome::Deferred
        }
    }

    fn spawn_select(self: &Arc<Self>, port: &'static InputPort) {
        let inner = self.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = inner.run_select(port) => {}
                }
            }
            .instrument(self.span.clone()),
        );
    }

    async fn run_select(&self, port: &'static InputPort) {
        self.sender.send_set(port.select.code, port.select.value).await;
        tokio::time::sleep(INPUT_SETTLE).await;
        self.sender.send_query(self.dialect.input_code).await;
    }

    // -------------------------------------------------------------------------
    // Video mute
    // -------------------------------------------------------------------------

    async fn video_mute(&self, on: bool) {
        self.sender.send_set(SHUTTER_CODE, i32::from(on)).await;
        tokio::time::sleep(VIDEO_MUTE_SETTLE).await;
        self.sender.send_query(SHUTTER_CODE).await;
    }

    // -------------------------------------------------------------------------
    // Polling and lifecycle
    // -------------------------------------------------------------------------

    async fn status_get(&self) -> bool {
        self.poller.status_get(&self.feedback.power_on).await
    }

    async fn start(self: &Arc<Self>) {
        if let Err(e) = self.transport.connect().await {
            warn!("Initial connect failed: {}", e);
        }

        let weak = Arc::downgrade(self);
        self.monitor.start(Arc::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.status_get().await;
                }
            })
        }));
        info!("Session started");
    }

    async fn shutdown(&self) {
        self.monitor.stop();
        self.cancel.cancel();
        self.transport.disconnect().await;
        self.queue.shutdown();

        let mut st = self.state.lock();
        st.warm_generation += 1;
        st.cool_generation += 1;
        st.pending_switch = None;
        if st.warming {
            st.warming = false;
            self.feedback.warming.set(false);
        }
        if st.cooling {
            st.cooling = false;
            self.feedback.cooling.set(false);
        }
        info!("Session shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pjctl_core::mock::MockTransport;
    use tracing_test::traced_test;

    fn session() -> (ChristieProjector, Arc<MockTransport>) {
        let transport = MockTransport::connected();
        let config = ProjectorConfig::tcp("proj-test", "127.0.0.1", 3002);
        let t = transport.clone();
        let projector = ChristieProjector::with_transport(&config, move |_| t as Arc<dyn Transport>);
        (projector, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_warm_timer_does_not_clear_flag() {
        let (projector, _transport) = session();
        projector.power_on().await;
        assert!(projector.feedback().warming.get());

        let current = projector.inner.state.lock().warm_generation;
        projector.inner.end_warming(current - 1).await;
        assert!(projector.feedback().warming.get());

        projector.inner.end_warming(current).await;
        assert!(!projector.feedback().warming.get());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_cool_timer_does_not_clear_flag() {
        let (projector, _transport) = session();
        projector.handle_frame("(PWR!1)");
        projector.power_off().await;
        assert!(projector.feedback().cooling.get());

        let current = projector.inner.state.lock().cool_generation;
        projector.inner.end_cooling(current + 1);
        assert!(projector.feedback().cooling.get());
        projector.inner.end_cooling(current);
        assert!(!projector.feedback().cooling.get());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_clears_interlocks() {
        let (projector, transport) = session();
        projector.power_on().await;
        assert!(projector.status().warming);

        projector.shutdown().await;
        assert!(!projector.status().warming);
        assert!(!transport.is_connected());

        // The cancelled timer never fires a deferred switch.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(projector.pending_input(), None);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_unparseable_frame_is_logged_and_dropped() {
        let (projector, _transport) = session();
        projector.handle_frame("(PWR!99999999999)");
        assert!(logs_contain("Dropping frame"));

        projector.handle_frame("(PWR!1)");
        assert!(projector.status().power_on);
    }

    #[tokio::test(start_paused = true)]
    async fn test_online_follows_applied_state() {
        let (projector, _transport) = session();
        let mut online = projector.feedback().online.subscribe();
        let watcher = projector.clone();
        let seen = tokio::spawn(async move {
            online.wait_for(|up| *up).await.map(|_| watcher.status().power_on)
        });

        projector.frame_sink().enqueue("(PWR!1)");
        assert!(seen.await.unwrap().unwrap());
    }
}
