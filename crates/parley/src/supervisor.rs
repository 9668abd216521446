//! Connection lifecycle: the network worker, the delayed join task, and
//! auto-restart.
//!
//! The supervisor owns a tokio runtime. Each connection attempt runs as
//! one *worker* task on it:
//!
//! 1. init → connect → login (delegated to the transport)
//! 2. CAS `Initializing → Running`
//! 3. schedule the one-shot *join task* (after `join_delay`)
//! 4. receive until the link drops or the state leaves `Running`
//!
//! The join task holds only a `Weak` reference to the shared state and
//! checks the connection epoch before doing anything, and teardown aborts
//! it. A join scheduled for an old connection can therefore never act on
//! a newer one, or on a client that is gone.
//!
//! Teardown cancels the worker by force-closing the transport, which ends
//! its pending `recv`. If the worker still has not finished after
//! `worker_join_timeout`, it is aborted.
//!
//! # Races with a stop
//!
//! `disconnect()` can land at any point of the worker's life. The cases
//! that matter:
//!
//! - **During connect or login.** The forced close runs before the link
//!   exists, so it closes nothing. The worker then fails its
//!   `Initializing → Running` compare-exchange (the state is already
//!   `Stopping`) and closes the link itself before exiting.
//! - **Before the join delay expires.** The join task is aborted, and
//!   even if it wakes first it sees a stale epoch or a non-`Running`
//!   state and does nothing.
//! - **While the join task is sending.** `abort` only takes effect at the
//!   next `.await`, so the control flag is raised with a swap and backed
//!   out again if the connection is no longer current.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use parley_presence::{GameStatePublisher, IdentityManager, PeerRegistry};
use parley_protocol::{EnvelopeCipher, SignalCodec, SignalMessage};
use parley_transport::{ChatMessage, ChatTransport, Command, TransportError};
use tokio::runtime::Runtime;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::control::{ControlAction, ControlHandler};
use crate::state::AtomicConnectionState;
use crate::{CommandDispatchTable, ConnectionConfig, ConnectionState};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared between the owning thread, the worker and the join task.
///
/// Every table guards itself; nothing here is held across an `.await`
/// and no code path holds two of these locks at once.
pub(crate) struct Shared<T: ChatTransport, C: EnvelopeCipher> {
    pub(crate) transport: T,
    /// Read on every inbound control message, written only by
    /// `update_config` while the connection is off.
    pub(crate) codec: RwLock<SignalCodec<C>>,
    /// The config is swapped as a whole. Readers clone the `Arc` and
    /// drop the lock at once, so a worker keeps a consistent view of the
    /// config its connection was started with.
    pub(crate) config: RwLock<Arc<ConnectionConfig>>,
    pub(crate) state: AtomicConnectionState,
    /// Set once the join task joined a control channel.
    pub(crate) control_active: AtomicBool,
    pub(crate) identity: IdentityManager,
    pub(crate) registry: PeerRegistry,
    pub(crate) publisher: GameStatePublisher,
    pub(crate) dispatch: CommandDispatchTable,
    pub(crate) control: ControlHandler,
    /// The pending join task of the current connection, if any.
    join_task: Mutex<Option<AbortHandle>>,
    /// Incremented for every connection attempt.
    ///
    /// A join task compares its own epoch against this one before it
    /// touches the link. The state alone cannot tell an old connection
    /// from a new one: both read `Running`.
    epoch: AtomicU64,
}

/// What the worker loop should do after an inbound message.
#[derive(Debug, PartialEq, Eq)]
enum Inbound {
    Continue,
    /// We reset our identity and closed the link.
    Collision,
}

impl<T: ChatTransport, C: EnvelopeCipher> Shared<T, C> {
    pub(crate) fn new(transport: T, cipher: C, config: ConnectionConfig) -> Self {
        let identity = IdentityManager::new(&config.nickname, &config.username, config.is_bot);
        Self {
            transport,
            codec: RwLock::new(SignalCodec::new(cipher, config.key_tag)),
            state: AtomicConnectionState::new(ConnectionState::Off),
            control_active: AtomicBool::new(false),
            identity,
            registry: PeerRegistry::new(),
            publisher: GameStatePublisher::new(config.timing.heartbeat_interval()),
            dispatch: CommandDispatchTable::new(),
            control: ControlHandler::new(config.timing.reauth_interval()),
            join_task: Mutex::new(None),
            epoch: AtomicU64::new(0),
            config: RwLock::new(Arc::new(config)),
        }
    }

    /// The config of the current (or next) connection attempt.
    pub(crate) fn config(&self) -> Arc<ConnectionConfig> {
        Arc::clone(&self.config.read())
    }

    pub(crate) fn is_control_active(&self) -> bool {
        self.control_active.load(Ordering::Acquire)
    }

    /// Whether connection attempt `epoch` is still the live one.
    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::Acquire) == epoch
            && self.state.load() == ConnectionState::Running
    }

    /// Raises the control flag for connection `epoch`.
    ///
    /// Teardown moves the state away from `Running` before it clears the
    /// flag, and `abort` on the join task only lands at its next `.await`.
    /// The flag is therefore raised with a swap, which synchronizes with a
    /// teardown that already cleared it, and the state is checked again
    /// afterwards. Whichever side runs last, a torn-down connection never
    /// ends up reporting an active control channel.
    fn activate_control(&self, epoch: u64) -> bool {
        self.control_active.swap(true, Ordering::AcqRel);
        if self.is_current(epoch) {
            return true;
        }
        self.control_active.store(false, Ordering::Release);
        false
    }

    /// Sends one raw line while the connection is `Running`.
    pub(crate) async fn send_raw(&self, line: &str) -> bool {
        if line.is_empty() || self.state.load() != ConnectionState::Running {
            return false;
        }
        match self.transport.send_line(line).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "send failed");
                false
            }
        }
    }

    /// Seals `msg` and sends it to the control channel.
    pub(crate) async fn send_signal(&self, msg: &SignalMessage) -> bool {
        let Some(channel) = self.config().control_channel.clone() else {
            return false;
        };
        let text = self.codec.read().seal(msg);
        debug!(kind = msg.kind(), id = %msg.id(), "sending signal");
        self.send_raw(&Command::Privmsg { target: channel, text }.to_string())
            .await
    }

    /// Joins the channels once the login settled.
    ///
    /// The control channel gets `+k` (when a secret is set), `+s` and `+n`
    /// so it stays out of channel listings and only keyed members can
    /// talk in it. Whoever joins first holds operator rights and makes
    /// these stick; for later joiners the server ignores the modes.
    async fn join_channels(&self, epoch: u64) {
        let config = self.config();
        self.send_raw(
            &Command::Join {
                channel: config.presence_channel.clone(),
                key: None,
            }
            .to_string(),
        )
        .await;
        info!(channel = %config.presence_channel, "joined presence channel");

        let Some(control) = config.control_channel.clone() else {
            return;
        };
        let secret = config.control_secret.clone();
        self.send_raw(
            &Command::Join {
                channel: control.clone(),
                key: secret.clone(),
            }
            .to_string(),
        )
        .await;
        if let Some(secret) = secret {
            self.send_raw(&mode(&control, "+k", Some(secret))).await;
        }
        self.send_raw(&mode(&control, "+s", None)).await;
        self.send_raw(&mode(&control, "+n", None)).await;

        self.publisher.reset_timer();
        if !self.activate_control(epoch) {
            debug!(epoch, "connection torn down while joining; control mode not entered");
            return;
        }

        let local = self.identity.id();
        self.send_signal(&SignalMessage::Signon { id: local }).await;
        info!(channel = %control, id = %local, "control mode active; signon sent");
    }

    /// Offers one inbound message to the handlers and the control logic.
    async fn handle_inbound(&self, msg: ChatMessage) -> Inbound {
        if !self.dispatch.is_empty() {
            let report = self.dispatch.dispatch(&msg);
            if report.failed > 0 {
                debug!(
                    command = %msg.command,
                    invoked = report.invoked,
                    failed = report.failed,
                    "command handlers reported failures"
                );
            }
        }

        if !self.is_control_active() {
            return Inbound::Continue;
        }
        let Some((target, payload)) = msg.as_privmsg() else {
            return Inbound::Continue;
        };
        let config = self.config();
        let on_control = config
            .control_channel
            .as_deref()
            .is_some_and(|channel| channel.eq_ignore_ascii_case(target));
        if !on_control {
            return Inbound::Continue;
        }

        let opened = self.codec.read().open(payload);
        let signal = match opened {
            Ok(signal) => signal,
            Err(e) => {
                warn!(sender = %msg.sender, error = %e, "dropping control message");
                return Inbound::Continue;
            }
        };
        debug!(sender = %msg.sender, kind = signal.kind(), id = %signal.id(), "control signal");

        let local = self.identity.current();
        let action = self
            .control
            .handle(signal, &msg.sender, &local, &self.registry, Instant::now());
        match action {
            ControlAction::Nothing => Inbound::Continue,
            ControlAction::Reply(reply) => {
                self.send_signal(&reply).await;
                Inbound::Continue
            }
            ControlAction::SelfCollision => {
                self.resolve_collision().await;
                Inbound::Collision
            }
        }
    }

    /// Picks a new id and drops the link; the next tick reconnects.
    async fn resolve_collision(&self) {
        let old = self.identity.id();
        let new = self.identity.regenerate(|id| self.registry.contains(id));
        warn!(%old, %new, "identity collision; reconnecting under a new id");
        self.control_active.store(false, Ordering::Release);
        self.transport.disconnect().await;
    }

    fn cancel_join_task(&self) {
        if let Some(task) = self.join_task.lock().take() {
            task.abort();
        }
    }
}

fn mode(channel: &str, flags: &str, arg: Option<String>) -> String {
    Command::Mode {
        channel: channel.to_string(),
        flags: flags.to_string(),
        arg,
    }
    .to_string()
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Init, connect and log in.
async fn establish<T: ChatTransport>(
    transport: &T,
    config: &ConnectionConfig,
    nick: &str,
    user: &str,
) -> Result<(), TransportError> {
    transport.init().await?;
    transport
        .connect(&config.server_address, config.server_port)
        .await?;
    transport.login(nick, user).await
}

/// Body of the network worker for connection attempt `epoch`.
async fn run_worker<T: ChatTransport, C: EnvelopeCipher>(shared: Arc<Shared<T, C>>, epoch: u64) {
    let config = shared.config();
    let identity = shared.identity.current();
    let nick = identity.login_nick();
    info!(
        server = %config.server_address,
        port = config.server_port,
        %nick,
        "network worker starting"
    );

    if let Err(e) = establish(&shared.transport, &config, &nick, &identity.username).await {
        warn!(error = %e, "connection setup failed");
        shared
            .state
            .transition(ConnectionState::Initializing, ConnectionState::Joining);
        return;
    }

    if !shared
        .state
        .transition(ConnectionState::Initializing, ConnectionState::Running)
    {
        // Teardown already closed the transport, but possibly while
        // connect or login was still pending, so the link we just
        // finished opening is ours to close.
        debug!(state = %shared.state.load(), "stop requested during login; closing link");
        shared.transport.disconnect().await;
        return;
    }
    info!(%nick, "logged in");
    schedule_join(&shared, epoch);

    loop {
        if shared.state.load() != ConnectionState::Running || !shared.transport.is_connected() {
            break;
        }
        match shared.transport.recv().await {
            Ok(Some(msg)) => {
                if shared.handle_inbound(msg).await == Inbound::Collision {
                    break;
                }
            }
            Ok(None) => {
                info!("connection closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "receive failed");
                break;
            }
        }
    }

    shared.control_active.store(false, Ordering::Release);
    if shared
        .state
        .transition(ConnectionState::Running, ConnectionState::Joining)
    {
        info!("connection lost; restarting on next tick");
    }
}

/// Schedules the one-shot channel join for connection `epoch`.
fn schedule_join<T: ChatTransport, C: EnvelopeCipher>(shared: &Arc<Shared<T, C>>, epoch: u64) {
    let weak: Weak<Shared<T, C>> = Arc::downgrade(shared);
    let delay = shared.config().timing.join_delay();

    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(shared) = weak.upgrade() else {
            return;
        };
        if !shared.is_current(epoch) || !shared.transport.is_connected() {
            debug!(epoch, "connection gone before channel join");
            return;
        }
        shared.join_channels(epoch).await;
    });

    if let Some(previous) = shared.join_task.lock().replace(task.abort_handle()) {
        previous.abort();
    }
}

// ---------------------------------------------------------------------------
// ConnectionSupervisor
// ---------------------------------------------------------------------------

/// Drives the connection state machine from the owning thread.
///
/// Every method is called from the owning thread. Only
/// [`disconnect`](Self::disconnect) and the teardown inside
/// [`tick`](Self::tick) block, and only for as long as it takes the
/// worker to notice the closed link.
///
/// Must not be dropped from inside an async context: teardown blocks on
/// the owned runtime.
pub(crate) struct ConnectionSupervisor<T: ChatTransport, C: EnvelopeCipher> {
    shared: Arc<Shared<T, C>>,
    runtime: Runtime,
    should_run: bool,
    worker: Option<JoinHandle<()>>,
}

impl<T: ChatTransport, C: EnvelopeCipher> ConnectionSupervisor<T, C> {
    pub(crate) fn new(shared: Shared<T, C>, runtime: Runtime) -> Self {
        Self {
            shared: Arc::new(shared),
            runtime,
            should_run: false,
            worker: None,
        }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared<T, C>> {
        &self.shared
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.shared.state.load()
    }

    pub(crate) fn should_run(&self) -> bool {
        self.should_run
    }

    /// Requests a connection. No-op unless the state is `Off`.
    pub(crate) fn connect(&mut self) {
        self.should_run = true;
        self.start();
    }

    /// Stops the connection and waits for the worker to exit.
    pub(crate) fn disconnect(&mut self) {
        self.should_run = false;
        if self.state() == ConnectionState::Off && self.worker.is_none() {
            return;
        }
        self.stop();
    }

    /// Reconnects after `Joining`, emits heartbeats and evicts silent
    /// peers.
    pub(crate) fn tick(&mut self, now: Instant) {
        if self.state() == ConnectionState::Joining {
            info!("tearing down failed connection");
            self.teardown();
            self.shared.state.store(ConnectionState::Off);
        }
        match (self.should_run, self.state()) {
            (true, ConnectionState::Off) => {
                // The server may still hold the old login nick until it
                // notices the dead link, so every restart logs in under a
                // fresh id.
                let old = self.shared.identity.id();
                let new = self
                    .shared
                    .identity
                    .regenerate(|id| self.shared.registry.contains(id));
                debug!(%old, %new, "restarting under a new id");
                self.start();
            }
            (false, ConnectionState::Running) => self.stop(),
            _ => {}
        }

        if self.shared.is_control_active() {
            let local = self.shared.identity.id();
            if let Some(heartbeat) = self.shared.publisher.poll(local, now) {
                let shared = Arc::clone(&self.shared);
                self.runtime.spawn(async move {
                    shared.send_signal(&heartbeat).await;
                });
            }
        }

        let timeout = self.shared.config().timing.peer_timeout();
        for id in self.shared.registry.sweep_expired(now, timeout) {
            info!(peer = %id, "peer timed out");
            self.shared.control.forget(id);
        }
    }

    /// Runs `future` on the supervisor's runtime without waiting for it.
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(future);
    }

    fn start(&mut self) {
        if !self
            .shared
            .state
            .transition(ConnectionState::Off, ConnectionState::Initializing)
        {
            debug!(state = %self.state(), "connect ignored; connection not off");
            return;
        }
        let epoch = self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.control_active.store(false, Ordering::Release);
        self.shared.control.reset();
        self.shared.publisher.reset_timer();

        info!(epoch, "starting connection");
        let worker = self
            .runtime
            .spawn(run_worker(Arc::clone(&self.shared), epoch));
        self.worker = Some(worker);
    }

    fn stop(&mut self) {
        self.shared.state.store(ConnectionState::Stopping);
        info!("stopping connection");
        self.teardown();
        self.shared.state.store(ConnectionState::Off);
        info!("connection off");
    }

    /// Cancels the join task, closes the link and joins the worker.
    fn teardown(&mut self) {
        self.shared.cancel_join_task();
        self.shared.control_active.store(false, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let worker = self.worker.take();
        let timeout = shared.config().timing.worker_join_timeout();
        self.runtime.block_on(async move {
            shared.transport.disconnect().await;
            let Some(mut worker) = worker else {
                return;
            };
            if tokio::time::timeout(timeout, &mut worker).await.is_err() {
                warn!(?timeout, "network worker did not exit; aborting it");
                worker.abort();
            }
        });
    }
}

impl<T: ChatTransport, C: EnvelopeCipher> Drop for ConnectionSupervisor<T, C> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
