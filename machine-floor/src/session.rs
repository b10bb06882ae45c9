//! View session: selection, timers and request tagging.
//!
//! A [`Session`] owns everything that changes while the dashboard is open:
//! the selected machine and database, which view is active, the current
//! [`ViewState`] or grid cards, the minute and auto-refresh tickers, and the
//! single fetch that may be in flight. It runs as an actor: commands arrive
//! on a channel, fetches and tickers report back on internal channels, and
//! every state change is pushed through a [`RenderPort`].
//!
//! Navigation (another machine, another database, the other view) bumps the
//! session generation, aborts the in-flight fetch and cancels both tickers.
//! Fetch outcomes carry the tag they were issued under and are dropped when
//! it no longer matches. Ticker events carry the id of the ticker that sent
//! them, so ticks queued by a cancelled ticker are ignored as well.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::api_client::MachineSource;
use crate::api_client::types::{Database, MachineStatusRecord};
use crate::config::{DEFAULT_GRID_MACHINE_IDS, DEFAULT_REFRESH_INTERVAL, parse_machine_id};
use crate::error::{Error, Result};
use crate::presenter::{GridCard, Section, TimestampOptions, ViewState, derive_view_state};
use crate::render::{MessageKind, RenderPort, present, present_duration, show_only};
use crate::ticker::Ticker;
use crate::tracing::prelude::*;

pub const LOADING_MACHINE_MESSAGE: &str = "Loading machine data…";
pub const LOADING_GRID_MESSAGE: &str = "Loading all machines...";
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load machine data.";

const TICK_INTERVAL: Duration = Duration::from_secs(60);
const CHANNEL_CAPACITY: usize = 32;

/// User requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `None` clears the selection and shows the placeholder.
    SelectMachine(Option<u32>),
    SelectDatabase(Database),
    Refresh,
    SetAutoRefresh(bool),
    ShowGrid,
    ShowSingle,
    Shutdown,
}

impl FromStr for Command {
    type Err = Error;

    /// Line syntax: `m <id>`, `db <KOL|AHM>`, `r`, `auto on|off`, `grid`,
    /// `single`, `q`.
    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        let arg = words.next();

        let command = match (verb.as_str(), arg) {
            ("m" | "machine", id) => Command::SelectMachine(id.and_then(parse_machine_id)),
            ("db" | "database", Some(name)) => Command::SelectDatabase(
                Database::from_str(name)
                    .map_err(|_| Error::Other(format!("unknown database: {name}")))?,
            ),
            ("r" | "refresh", None) => Command::Refresh,
            ("auto", Some(state)) => match state.to_ascii_lowercase().as_str() {
                "on" => Command::SetAutoRefresh(true),
                "off" => Command::SetAutoRefresh(false),
                _ => {
                    return Err(Error::Other(format!(
                        "expected `auto on` or `auto off`, got `{}`",
                        line.trim()
                    )));
                }
            },
            ("grid", None) => Command::ShowGrid,
            ("single", None) => Command::ShowSingle,
            ("q" | "quit", None) => Command::Shutdown,
            _ => return Err(Error::Other(format!("unknown command: {}", line.trim()))),
        };

        Ok(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Single,
    Grid,
}

/// Starting point of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub machine_id: Option<u32>,
    pub database: Database,
    pub mode: ViewMode,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub refresh_interval: Duration,
    /// Period of the local duration counters.
    pub tick_interval: Duration,
    pub grid_machine_ids: Vec<u32>,
    pub timestamps: TimestampOptions,
    /// Initial state of the auto-refresh toggle.
    pub auto_refresh: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            tick_interval: TICK_INTERVAL,
            grid_machine_ids: DEFAULT_GRID_MACHINE_IDS.to_vec(),
            timestamps: TimestampOptions::default(),
            auto_refresh: true,
        }
    }
}

/// Identity of a fetch: the session generation and selection it was
/// issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTag {
    pub generation: u64,
    pub mode: ViewMode,
    /// `None` for grid fetches.
    pub machine_id: Option<u32>,
    pub database: Database,
}

#[derive(Debug)]
enum FetchOutcome {
    Single {
        tag: RequestTag,
        outcome: Result<MachineStatusRecord>,
    },
    Grid {
        tag: RequestTag,
        cards: Vec<GridCard>,
    },
}

impl FetchOutcome {
    fn tag(&self) -> RequestTag {
        match self {
            FetchOutcome::Single { tag, .. } | FetchOutcome::Grid { tag, .. } => *tag,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerEvent {
    Minute(u64),
    Refresh(u64),
}

#[derive(Debug)]
struct ArmedTicker {
    id: u64,
    ticker: Ticker,
}

/// State and behaviour of one open dashboard.
struct ViewContext<R> {
    source: Arc<dyn MachineSource>,
    port: R,
    settings: SessionSettings,

    mode: ViewMode,
    machine_id: Option<u32>,
    database: Database,
    auto_refresh: bool,

    generation: u64,
    view: Option<ViewState>,
    cards: Vec<GridCard>,
    in_flight: Option<(RequestTag, AbortHandle)>,

    next_ticker_id: u64,
    minute: Option<ArmedTicker>,
    refresh: Option<ArmedTicker>,

    fetch_tx: mpsc::Sender<FetchOutcome>,
    timer_tx: mpsc::Sender<TimerEvent>,
}

impl<R: RenderPort> ViewContext<R> {
    fn current_tag(&self) -> RequestTag {
        RequestTag {
            generation: self.generation,
            mode: self.mode,
            machine_id: match self.mode {
                ViewMode::Single => self.machine_id,
                ViewMode::Grid => None,
            },
            database: self.database,
        }
    }

    /// Load the selected machine into the single view.
    fn load(&mut self) {
        self.stop_minute_ticker();
        self.view = None;

        let Some(machine_id) = self.machine_id else {
            self.stop_refresh_ticker();
            self.abort_in_flight();
            self.port.set_message("", MessageKind::Info);
            show_only(&mut self.port, Some(Section::Placeholder));
            self.port.flush();
            return;
        };

        self.port.set_message(LOADING_MACHINE_MESSAGE, MessageKind::Info);
        show_only(&mut self.port, None);
        self.port.flush();

        let tag = self.current_tag();
        let database = self.database;
        let source = Arc::clone(&self.source);
        let tx = self.fetch_tx.clone();

        debug!(machine_id, %database, generation = tag.generation, "Loading machine");
        self.spawn_fetch(tag, async move {
            let outcome = source.get_machine(machine_id, database).await;
            // Closed only when the session is gone.
            let _ = tx.send(FetchOutcome::Single { tag, outcome }).await;
        });
    }

    /// Load every configured machine into the grid.
    fn load_grid(&mut self) {
        self.stop_minute_ticker();
        self.cards.clear();

        self.port.set_message(LOADING_GRID_MESSAGE, MessageKind::Info);
        self.port.render_grid(&[]);
        show_only(&mut self.port, Some(Section::Grid));
        self.port.flush();

        let tag = self.current_tag();
        let database = self.database;
        let source = Arc::clone(&self.source);
        let machine_ids = self.settings.grid_machine_ids.clone();
        let timestamps = self.settings.timestamps;
        let tx = self.fetch_tx.clone();

        debug!(
            machines = machine_ids.len(),
            %database,
            generation = tag.generation,
            "Loading grid"
        );
        self.spawn_fetch(tag, async move {
            let cards = fetch_grid(source.as_ref(), &machine_ids, database, &timestamps).await;
            let _ = tx.send(FetchOutcome::Grid { tag, cards }).await;
        });
    }

    fn spawn_fetch<F>(&mut self, tag: RequestTag, fetch: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.abort_in_flight();
        let handle = tokio::spawn(fetch);
        self.in_flight = Some((tag, handle.abort_handle()));
    }

    fn abort_in_flight(&mut self) {
        if let Some((tag, handle)) = self.in_flight.take() {
            trace!(generation = tag.generation, "Aborting in-flight fetch");
            handle.abort();
        }
    }

    /// Tear down whatever the current view owns and start a new generation.
    fn navigate(&mut self) {
        self.generation += 1;
        self.abort_in_flight();
        self.stop_minute_ticker();
        self.stop_refresh_ticker();
        self.view = None;
        self.cards.clear();
    }

    fn reload(&mut self) {
        match self.mode {
            ViewMode::Single => self.load(),
            ViewMode::Grid => self.load_grid(),
        }
    }

    fn start(&mut self) {
        self.reload();
    }

    fn handle_command(&mut self, command: Command) {
        debug!(?command, "Handling command");
        match command {
            Command::SelectMachine(machine_id) => {
                self.machine_id = machine_id.filter(|id| *id > 0);
                // The grid ignores the selection until the single view is
                // shown again.
                if self.mode == ViewMode::Single {
                    self.navigate();
                    self.load();
                }
            }
            Command::SelectDatabase(database) => {
                self.database = database;
                self.navigate();
                self.reload();
            }
            Command::Refresh => {
                if self.in_flight.is_some() {
                    debug!("Fetch already in flight, ignoring refresh");
                } else {
                    self.reload();
                }
            }
            Command::SetAutoRefresh(enabled) => {
                self.auto_refresh = enabled;
                if !enabled {
                    self.stop_refresh_ticker();
                } else if self.mode == ViewMode::Grid || self.machine_id.is_some() {
                    self.start_refresh_ticker();
                } else {
                    debug!("No machine selected, auto-refresh stays idle");
                }
            }
            Command::ShowGrid => {
                if self.mode != ViewMode::Grid {
                    self.navigate();
                    self.mode = ViewMode::Grid;
                    self.load_grid();
                }
            }
            Command::ShowSingle => {
                if self.mode != ViewMode::Single {
                    self.navigate();
                    self.mode = ViewMode::Single;
                    self.load();
                }
            }
            Command::Shutdown => self.shutdown(),
        }
    }

    fn handle_fetch(&mut self, outcome: FetchOutcome) {
        let tag = outcome.tag();
        let expected = self.in_flight.as_ref().map(|(t, _)| *t);
        if expected != Some(tag) || tag != self.current_tag() {
            debug!(?tag, "Discarding stale fetch result");
            return;
        }
        self.in_flight = None;

        match outcome {
            FetchOutcome::Single {
                outcome: Ok(record),
                ..
            } => {
                let view = derive_view_state(&record, &self.settings.timestamps);
                present(&view, &mut self.port);
                self.port.set_message("", MessageKind::Info);
                show_only(&mut self.port, Some(Section::Dashboard));
                self.port.flush();

                let live = view.counter().is_live();
                self.view = Some(view);
                if live {
                    self.start_minute_ticker();
                }
                if self.auto_refresh {
                    self.start_refresh_ticker();
                }
            }
            FetchOutcome::Single {
                outcome: Err(e), ..
            } => {
                error!(
                    machine_id = ?tag.machine_id,
                    database = %tag.database,
                    "Failed to load machine data: {e}"
                );
                let mut message = e.to_string();
                if message.is_empty() {
                    message = LOAD_FAILED_MESSAGE.to_string();
                }
                self.port.set_message(&message, MessageKind::Error);
                show_only(&mut self.port, None);
                self.port.flush();
            }
            FetchOutcome::Grid { cards, .. } => {
                let failed = cards
                    .iter()
                    .filter(|card| matches!(card, GridCard::Failed { .. }))
                    .count();
                info!(loaded = cards.len() - failed, failed, "Grid loaded");

                self.port.render_grid(&cards);
                self.port.set_message("", MessageKind::Info);
                self.port.flush();

                let live = cards.iter().any(GridCard::is_live);
                self.cards = cards;
                if live {
                    self.start_minute_ticker();
                }
                // The grid always refreshes itself.
                self.auto_refresh = true;
                self.start_refresh_ticker();
            }
        }
    }

    fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Minute(id) => {
                if !is_armed(&self.minute, id) {
                    trace!(id, "Ignoring tick from cancelled ticker");
                    return;
                }
                match self.mode {
                    ViewMode::Single => {
                        if let Some(view) = self.view.as_mut() {
                            view.tick();
                            present_duration(view, &mut self.port);
                            self.port.flush();
                        }
                    }
                    ViewMode::Grid => {
                        self.cards.iter_mut().for_each(GridCard::tick);
                        self.port.render_grid(&self.cards);
                        self.port.flush();
                    }
                }
            }
            TimerEvent::Refresh(id) => {
                if !is_armed(&self.refresh, id) {
                    trace!(id, "Ignoring refresh from cancelled ticker");
                    return;
                }
                if self.in_flight.is_some() {
                    debug!("Previous fetch still in flight, skipping auto-refresh");
                    return;
                }
                debug!(mode = ?self.mode, "Auto-refreshing");
                self.reload();
            }
        }
    }

    fn start_minute_ticker(&mut self) {
        self.stop_minute_ticker();
        let id = self.next_ticker_id();
        let ticker = Ticker::start(
            self.settings.tick_interval,
            self.timer_tx.clone(),
            TimerEvent::Minute(id),
        );
        trace!(id, "Minute ticker started");
        self.minute = Some(ArmedTicker { id, ticker });
    }

    fn stop_minute_ticker(&mut self) {
        if let Some(armed) = self.minute.take() {
            armed.ticker.stop();
            trace!(id = armed.id, "Minute ticker stopped");
        }
    }

    fn start_refresh_ticker(&mut self) {
        self.stop_refresh_ticker();
        let id = self.next_ticker_id();
        let period = self.settings.refresh_interval;
        let ticker = Ticker::start(period, self.timer_tx.clone(), TimerEvent::Refresh(id));
        debug!(id, period_secs = period.as_secs(), mode = ?self.mode, "Auto-refresh started");
        self.refresh = Some(ArmedTicker { id, ticker });
    }

    fn stop_refresh_ticker(&mut self) {
        if let Some(armed) = self.refresh.take() {
            armed.ticker.stop();
            debug!(id = armed.id, "Auto-refresh stopped");
        }
    }

    fn next_ticker_id(&mut self) -> u64 {
        self.next_ticker_id += 1;
        self.next_ticker_id
    }

    fn shutdown(&mut self) {
        self.navigate();
    }
}

fn is_armed(slot: &Option<ArmedTicker>, id: u64) -> bool {
    slot.as_ref().is_some_and(|armed| armed.id == id)
}

/// Fetch every machine concurrently. A failure yields an error card for
/// that machine and leaves the others untouched. Cards keep the order of
/// `machine_ids`.
pub async fn fetch_grid(
    source: &dyn MachineSource,
    machine_ids: &[u32],
    database: Database,
    timestamps: &TimestampOptions,
) -> Vec<GridCard> {
    let fetches = machine_ids.iter().map(|&machine_id| async move {
        match source.get_machine(machine_id, database).await {
            Ok(record) => GridCard::Loaded {
                machine_id,
                view: derive_view_state(&record, timestamps),
            },
            Err(e) => {
                error!(machine_id, %database, "Failed to load machine: {e}");
                GridCard::Failed {
                    machine_id,
                    message: e.to_string(),
                }
            }
        }
    });

    join_all(fetches).await
}

/// A dashboard session driving a [`RenderPort`].
pub struct Session<R> {
    context: ViewContext<R>,
    fetch_rx: mpsc::Receiver<FetchOutcome>,
    timer_rx: mpsc::Receiver<TimerEvent>,
}

impl<R: RenderPort> Session<R> {
    pub fn new(
        source: Arc<dyn MachineSource>,
        port: R,
        settings: SessionSettings,
        selection: Selection,
    ) -> Self {
        let (fetch_tx, fetch_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (timer_tx, timer_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let context = ViewContext {
            source,
            port,
            auto_refresh: settings.auto_refresh,
            settings,
            mode: selection.mode,
            machine_id: selection.machine_id.filter(|id| *id > 0),
            database: selection.database,
            generation: 0,
            view: None,
            cards: Vec::new(),
            in_flight: None,
            next_ticker_id: 0,
            minute: None,
            refresh: None,
            fetch_tx,
            timer_tx,
        };

        Self {
            context,
            fetch_rx,
            timer_rx,
        }
    }

    pub fn port(&self) -> &R {
        &self.context.port
    }

    pub fn view(&self) -> Option<&ViewState> {
        self.context.view.as_ref()
    }

    pub fn cards(&self) -> &[GridCard] {
        &self.context.cards
    }

    pub fn mode(&self) -> ViewMode {
        self.context.mode
    }

    pub fn database(&self) -> Database {
        self.context.database
    }

    pub fn machine_id(&self) -> Option<u32> {
        self.context.machine_id
    }

    pub fn auto_refresh(&self) -> bool {
        self.context.auto_refresh
    }

    pub fn is_fetching(&self) -> bool {
        self.context.in_flight.is_some()
    }

    /// Whether the auto-refresh timer is currently armed.
    pub fn is_refresh_armed(&self) -> bool {
        self.context
            .refresh
            .as_ref()
            .is_some_and(|armed| armed.ticker.is_running())
    }

    /// Render the initial view for the selection.
    pub fn start(&mut self) {
        self.context.start();
    }

    pub fn handle_command(&mut self, command: Command) {
        self.context.handle_command(command);
    }

    /// Wait for the next fetch outcome or timer event and apply it.
    pub async fn step(&mut self) {
        tokio::select! {
            Some(outcome) = self.fetch_rx.recv() => self.context.handle_fetch(outcome),
            Some(event) = self.timer_rx.recv() => self.context.handle_timer(event),
        }
    }

    /// Run until `Shutdown`, the command channel closes, or `cancellation`
    /// fires. Returns the render port.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        cancellation: CancellationToken,
    ) -> R {
        self.start();
        info!(
            mode = ?self.context.mode,
            machine_id = ?self.context.machine_id,
            database = %self.context.database,
            "Session started"
        );

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.context.handle_command(command),
                },
                Some(outcome) = self.fetch_rx.recv() => self.context.handle_fetch(outcome),
                Some(event) = self.timer_rx.recv() => self.context.handle_timer(event),
            }
        }

        self.context.shutdown();
        info!("Session stopped");
        self.context.port
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    use async_trait::async_trait;
    use serde_json::{Value, json};
    use test_case::test_case;
    use tokio::time;

    use super::*;
    use crate::presenter::{Field, Indicator};
    use crate::render::Snapshot;

    /// Canned backend. Machines without a reply answer like a backend that
    /// does not know them.
    #[derive(Default)]
    struct FakeSource {
        replies: Mutex<HashMap<u32, std::result::Result<Value, String>>>,
        delay_ms: AtomicU64,
        calls: Mutex<Vec<(u32, Database)>>,
    }

    impl FakeSource {
        fn with(replies: &[(u32, std::result::Result<Value, &str>)]) -> Arc<Self> {
            let source = Self::default();
            for (id, reply) in replies {
                source.set(*id, reply.clone().map_err(str::to_string));
            }
            Arc::new(source)
        }

        fn set(&self, id: u32, reply: std::result::Result<Value, String>) {
            self.replies.lock().unwrap().insert(id, reply);
        }

        fn delay(&self, delay: Duration) {
            self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
        }

        fn calls(&self) -> Vec<(u32, Database)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MachineSource for FakeSource {
        async fn get_machine(
            &self,
            machine_id: u32,
            database: Database,
        ) -> Result<MachineStatusRecord> {
            self.calls.lock().unwrap().push((machine_id, database));
            let delay = self.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                time::sleep(Duration::from_millis(delay)).await;
            }
            let reply = self.replies.lock().unwrap().get(&machine_id).cloned();
            match reply {
                Some(Ok(record)) => Ok(serde_json::from_value(record)?),
                Some(Err(message)) => Err(Error::Api(message)),
                None => Err(Error::HttpStatus(404)),
            }
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            grid_machine_ids: vec![14, 47, 58],
            ..SessionSettings::default()
        }
    }

    fn session(source: Arc<FakeSource>, machine_id: Option<u32>) -> Session<Snapshot> {
        Session::new(
            source,
            Snapshot::default(),
            settings(),
            Selection {
                machine_id,
                ..Selection::default()
            },
        )
    }

    fn idle(minutes: u32) -> Value {
        json!({ "MachineName": "Press 14", "IsRunning": 0, "IdleSinceMinutes": minutes })
    }

    #[tokio::test(start_paused = true)]
    async fn no_machine_shows_placeholder() {
        let source = FakeSource::with(&[]);
        let mut session = session(source.clone(), None);
        session.start();

        let port = session.port();
        assert!(port.is_visible(Section::Placeholder));
        assert!(!port.is_visible(Section::Dashboard));
        assert_eq!(port.message_text(), None);
        assert!(source.calls().is_empty());
        assert!(!session.is_fetching());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_machine_id_counts_as_unselected() {
        let source = FakeSource::with(&[]);
        let mut session = session(source.clone(), None);
        session.handle_command(Command::SelectMachine(Some(0)));

        assert!(session.port().is_visible(Section::Placeholder));
        assert_eq!(session.machine_id(), None);
        assert!(source.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn successful_load_shows_dashboard() {
        let source = FakeSource::with(&[(14, Ok(idle(95)))]);
        let mut session = session(source.clone(), Some(14));
        session.start();

        assert_eq!(session.port().message_text(), Some(LOADING_MACHINE_MESSAGE));
        assert!(!session.port().is_visible(Section::Dashboard));
        assert!(!session.port().is_visible(Section::Placeholder));

        session.step().await;

        let port = session.port();
        assert_eq!(port.message_text(), None);
        assert!(port.is_visible(Section::Dashboard));
        assert!(port.is_visible(Section::Idle));
        assert_eq!(port.text(Field::MachineName), Some("Press 14"));
        assert_eq!(port.text(Field::IdleDuration), Some("1h 35m"));
        assert_eq!(port.status, Some(("IDLE".to_string(), Indicator::Alert)));
        assert_eq!(source.calls(), vec![(14, Database::Kol)]);
    }

    #[tokio::test(start_paused = true)]
    async fn api_error_message_is_shown_verbatim() {
        let source = FakeSource::with(&[(14, Err("DB timeout"))]);
        let mut session = session(source, Some(14));
        session.start();
        session.step().await;

        let port = session.port();
        assert_eq!(port.message, Some(("DB timeout".to_string(), MessageKind::Error)));
        assert!(!port.is_visible(Section::Dashboard));
        assert!(session.view().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn http_failure_message() {
        let source = FakeSource::with(&[]);
        let mut session = session(source, Some(99));
        session.start();
        session.step().await;

        assert_eq!(
            session.port().message_text(),
            Some("Request failed with status 404")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn counter_ticks_every_minute() {
        let source = FakeSource::with(&[(14, Ok(idle(95)))]);
        let mut session = session(source, Some(14));
        session.start();
        session.step().await;

        let loaded_at = time::Instant::now();
        session.step().await;
        assert_eq!(loaded_at.elapsed(), Duration::from_secs(60));
        assert_eq!(session.port().text(Field::IdleDuration), Some("1h 36m"));

        session.step().await;
        assert_eq!(session.port().text(Field::IdleDuration), Some("1h 37m"));
    }

    #[tokio::test(start_paused = true)]
    async fn reload_resets_counter() {
        let source = FakeSource::with(&[(14, Ok(idle(95)))]);
        let mut session = session(source, Some(14));
        session.start();
        session.step().await;
        session.step().await;
        assert_eq!(session.port().text(Field::IdleDuration), Some("1h 36m"));

        session.handle_command(Command::Refresh);
        session.step().await;
        assert_eq!(session.port().text(Field::IdleDuration), Some("1h 35m"));
    }

    #[tokio::test(start_paused = true)]
    async fn running_counter_ticks_too() {
        let source = FakeSource::with(&[(
            14,
            Ok(json!({ "IsRunning": 1, "RunningSinceMinutes": 0 })),
        )]);
        let mut session = session(source, Some(14));
        session.start();
        session.step().await;
        session.step().await;
        assert_eq!(session.port().text(Field::RunningDuration), Some("0h 01m"));
    }

    #[tokio::test(start_paused = true)]
    async fn result_for_previous_machine_is_discarded() {
        let source = FakeSource::with(&[(14, Ok(idle(10))), (47, Ok(idle(20)))]);
        let mut session = session(source, Some(14));
        session.start();
        let stale = session.context.current_tag();

        session.handle_command(Command::SelectMachine(Some(47)));

        // A late answer for machine 14 must not replace the loading state.
        session.context.handle_fetch(FetchOutcome::Single {
            tag: stale,
            outcome: Ok(serde_json::from_value(idle(10)).unwrap()),
        });
        assert!(session.view().is_none());
        assert!(session.is_fetching());

        session.step().await;
        assert_eq!(session.port().text(Field::IdleDuration), Some("0h 20m"));
    }

    #[tokio::test(start_paused = true)]
    async fn switching_machine_aborts_slow_fetch() {
        let source = FakeSource::with(&[(14, Ok(idle(10))), (47, Ok(idle(20)))]);
        source.delay(Duration::from_secs(5));
        let mut session = session(source.clone(), Some(14));
        session.start();
        time::sleep(Duration::from_secs(1)).await;

        session.handle_command(Command::SelectMachine(Some(47)));
        session.step().await;

        assert_eq!(session.port().text(Field::IdleDuration), Some("0h 20m"));
        assert_eq!(
            source.calls(),
            vec![(14, Database::Kol), (47, Database::Kol)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn database_switch_reloads() {
        let source = FakeSource::with(&[(14, Ok(idle(10)))]);
        let mut session = session(source.clone(), Some(14));
        session.start();
        session.step().await;

        session.handle_command(Command::SelectDatabase(Database::Ahm));
        assert_eq!(session.port().message_text(), Some(LOADING_MACHINE_MESSAGE));
        session.step().await;

        assert_eq!(session.database(), Database::Ahm);
        assert_eq!(source.calls().last(), Some(&(14, Database::Ahm)));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_refresh_reloads_after_interval() {
        let source = FakeSource::with(&[(14, Ok(idle(10)))]);
        let mut session = Session::new(
            source.clone(),
            Snapshot::default(),
            SessionSettings {
                refresh_interval: Duration::from_secs(30),
                ..settings()
            },
            Selection {
                machine_id: Some(14),
                ..Selection::default()
            },
        );
        session.start();
        session.step().await;

        // Refresh tick at 30s starts a fetch; its result arrives next.
        session.step().await;
        assert!(session.is_fetching());
        session.step().await;

        assert_eq!(source.calls().len(), 2);
        assert!(session.port().is_visible(Section::Dashboard));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_tick_skipped_while_fetch_in_flight() {
        let source = FakeSource::with(&[(14, Ok(idle(10)))]);
        let mut session = Session::new(
            source.clone(),
            Snapshot::default(),
            SessionSettings {
                refresh_interval: Duration::from_secs(10),
                ..settings()
            },
            Selection {
                machine_id: Some(14),
                ..Selection::default()
            },
        );
        session.start();
        session.step().await;

        source.delay(Duration::from_secs(25));
        session.step().await; // t=10: refresh starts a slow fetch
        session.step().await; // t=20: skipped
        assert_eq!(source.calls().len(), 2);

        session.step().await; // t=30: skipped again
        session.step().await; // t=35: slow fetch lands
        assert_eq!(source.calls().len(), 2);
        assert!(!session.is_fetching());
        assert!(session.port().is_visible(Section::Dashboard));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_ignored_while_fetching() {
        let source = FakeSource::with(&[(14, Ok(idle(10)))]);
        let mut session = session(source.clone(), Some(14));
        session.start();
        session.handle_command(Command::Refresh);
        session.step().await;
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_auto_refresh_stops_timer() {
        let source = FakeSource::with(&[(14, Ok(idle(10)))]);
        let mut session = session(source, Some(14));
        session.start();
        session.step().await;
        assert!(session.is_refresh_armed());

        session.handle_command(Command::SetAutoRefresh(false));
        assert!(!session.is_refresh_armed());
        assert!(!session.auto_refresh());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_load_keeps_auto_refresh_for_retry() {
        let source = FakeSource::with(&[(14, Ok(idle(10)))]);
        let mut session = session(source.clone(), Some(14));
        session.start();
        session.step().await;

        source.set(14, Err("DB timeout".into()));
        session.handle_command(Command::Refresh);
        session.step().await;
        assert_eq!(session.port().message_text(), Some("DB timeout"));
        assert!(session.is_refresh_armed());
        assert!(session.context.minute.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn grid_isolates_failures() {
        let source = FakeSource::with(&[
            (14, Ok(idle(10))),
            (47, Err("DB timeout")),
            (58, Ok(json!({ "IsRunning": 1, "IsBehindSchedule": 1 }))),
        ]);
        let mut session = session(source, None);
        session.handle_command(Command::SetAutoRefresh(false));
        session.handle_command(Command::ShowGrid);

        assert_eq!(session.port().message_text(), Some(LOADING_GRID_MESSAGE));
        assert!(session.port().is_visible(Section::Grid));
        session.step().await;

        let cards = &session.port().grid;
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[0].title(), "Press 14");
        assert_eq!(cards[1].title(), "Machine 47 - Error");
        assert_eq!(cards[1].indicator(), Indicator::Alert);
        assert_eq!(cards[2].title(), "Machine 58");
        assert_eq!(cards[2].status().unwrap().text, "Running behind schedule");

        assert_eq!(session.port().message_text(), None);
        assert!(session.auto_refresh());
        assert!(session.is_refresh_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn grid_tick_advances_every_card() {
        let source = FakeSource::with(&[(14, Ok(idle(10))), (47, Ok(idle(59))), (58, Ok(idle(0)))]);
        let mut session = session(source, None);
        session.handle_command(Command::ShowGrid);
        session.step().await;
        session.step().await;

        let durations: Vec<String> = session
            .cards()
            .iter()
            .map(|card| card.view().unwrap().counter().display())
            .collect();
        assert_eq!(durations, ["0h 11m", "1h 00m", "0h 01m"]);
        assert_eq!(session.port().grid, session.cards());
    }

    #[tokio::test(start_paused = true)]
    async fn selecting_machine_in_grid_defers_load() {
        let source =
            FakeSource::with(&[(14, Ok(idle(10))), (47, Ok(idle(10))), (58, Ok(idle(10)))]);
        let mut session = session(source.clone(), None);
        session.handle_command(Command::ShowGrid);
        session.handle_command(Command::SelectMachine(Some(47)));
        session.step().await;
        assert_eq!(session.cards().len(), 3);
        assert_eq!(source.calls().len(), 3);

        session.handle_command(Command::ShowSingle);
        assert!(session.cards().is_empty());
        assert!(!session.port().is_visible(Section::Grid));
        session.step().await;
        assert!(session.port().is_visible(Section::Dashboard));
        assert_eq!(source.calls().last(), Some(&(47, Database::Kol)));
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_view_cancels_tickers() {
        let source = FakeSource::with(&[(14, Ok(idle(10)))]);
        let mut session = session(source, Some(14));
        session.start();
        session.step().await;
        assert!(session.context.minute.is_some());

        session.handle_command(Command::SelectMachine(None));
        assert!(session.context.minute.is_none());
        assert!(!session.is_refresh_armed());
        assert!(session.port().is_visible(Section::Placeholder));
    }

    #[tokio::test(start_paused = true)]
    async fn queued_tick_from_cancelled_ticker_is_ignored() {
        let source = FakeSource::with(&[(14, Ok(idle(10)))]);
        let mut session = session(source, Some(14));
        session.start();
        session.step().await;

        let old = session.context.minute.as_ref().unwrap().id;
        session.handle_command(Command::Refresh);
        session.step().await;

        session.context.handle_timer(TimerEvent::Minute(old));
        assert_eq!(session.port().text(Field::IdleDuration), Some("0h 10m"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let source = FakeSource::with(&[(14, Ok(idle(95)))]);
        let session = session(source, Some(14));
        let (tx, rx) = mpsc::channel(4);

        let handle = tokio::spawn(session.run(rx, CancellationToken::new()));
        time::sleep(Duration::from_millis(10)).await;
        tx.send(Command::Shutdown).await.unwrap();

        let port = handle.await.unwrap();
        assert_eq!(port.text(Field::IdleDuration), Some("1h 35m"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_cancellation() {
        let source = FakeSource::with(&[]);
        let session = session(source, None);
        let (_tx, rx) = mpsc::channel(4);
        let cancellation = CancellationToken::new();

        let handle = tokio::spawn(session.run(rx, cancellation.clone()));
        cancellation.cancel();
        let port = handle.await.unwrap();
        assert!(port.is_visible(Section::Placeholder));
    }

    #[test_case("m 47", Command::SelectMachine(Some(47)); "machine")]
    #[test_case("machine 0", Command::SelectMachine(None); "machine zero")]
    #[test_case("m", Command::SelectMachine(None); "clear machine")]
    #[test_case("db ahm", Command::SelectDatabase(Database::Ahm); "database")]
    #[test_case("r", Command::Refresh; "refresh")]
    #[test_case("auto OFF", Command::SetAutoRefresh(false); "auto off")]
    #[test_case("auto on", Command::SetAutoRefresh(true); "auto on")]
    #[test_case("grid", Command::ShowGrid; "grid")]
    #[test_case("single", Command::ShowSingle; "single")]
    #[test_case("  q ", Command::Shutdown; "quit")]
    fn parses_commands(line: &str, expected: Command) {
        assert_eq!(line.parse::<Command>().unwrap(), expected);
    }

    #[test_case("db xyz"; "unknown database")]
    #[test_case("auto maybe"; "bad toggle")]
    #[test_case("launch"; "unknown verb")]
    #[test_case(""; "empty")]
    fn rejects_bad_commands(line: &str) {
        assert!(line.parse::<Command>().is_err());
    }
}
