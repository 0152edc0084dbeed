//! Command dispatcher and its cooperative driver loop.
//!
//! The [`Dispatcher`] owns one link to the radio:
//! 1. Encode and transmit requests
//! 2. Pump the port into the frame receiver and its bounded queue
//! 3. Complete the single outstanding synchronous wait, or route the frame
//!    to its registered handler
//! 4. Run due tasklets, including the deadline bounding the wait
//!
//! Partial frames left incomplete past the RX timeout are dropped. With
//! [`LinkConfig::handshake`] set, every received frame is acknowledged
//! and every transmission waits for the peer's acknowledgement of the
//! previous one.
//!
//! A synchronous call correlates its confirm by command id alone, so only
//! one wait may be outstanding at a time.
//!
//! # Example
//!
//! ```ignore
//! use ca821x_link::{CommandId, Dispatcher, Disposition, Frame, LinkConfig, SystemClock};
//!
//! let mut dispatcher: Dispatcher<_> = Dispatcher::builder(port)
//!     .config(LinkConfig::default())
//!     .clock(SystemClock::shared())
//!     .handle(CommandId::MCPS_DATA_INDICATION, |frame: &Frame| {
//!         println!("rx {:?}", frame.payload());
//!         Ok(Disposition::Handled)
//!     })
//!     .build()?;
//!
//! let confirm = dispatcher.downstream(&Frame::new(CommandId::MLME_GET_REQUEST, vec![0x53, 0x00])?)?;
//! ```

use std::task::Poll;

use super::handshake::{Ack, Handshake};
use super::registry::{CallbackTable, Dispatched, Handler, HandlerResult};
use crate::config::{validate_timeout, LinkConfig};
use crate::error::{LinkError, Result};
use crate::protocol::{CommandId, Frame, FrameReceiver};
use crate::tasklet::{Scheduler, SharedClock, SystemClock, TaskletId};
use crate::transport::Port;

/// Bytes pulled from the port per read.
const READ_CHUNK: usize = 64;

/// Reads attempted per poll before yielding to the scheduler.
const MAX_READS_PER_POLL: usize = 8;

/// What an outstanding wait is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    /// Synchronous confirm to a request. Bypasses handlers.
    Confirm,
    /// Asynchronous indication. Handlers still see it.
    Indication,
}

/// The single outstanding wait.
#[derive(Debug)]
struct PendingWait {
    expected: CommandId,
    kind: WaitKind,
    timeout_ms: u32,
    response: Option<Frame>,
}

/// The deadline tasklet is armed without context, so this never runs.
fn deadline_expired<T, const N: usize>(_: &mut Scheduler<T, N>, _: TaskletId, _: T) -> Result<()> {
    Ok(())
}

/// Builder for configuring and creating a [`Dispatcher`].
pub struct DispatcherBuilder<P> {
    port: P,
    config: LinkConfig,
    clock: Option<SharedClock>,
    callbacks: CallbackTable,
}

impl<P: Port> DispatcherBuilder<P> {
    /// Start from a port with default settings.
    pub fn new(port: P) -> Self {
        Self {
            port,
            config: LinkConfig::default(),
            clock: None,
            callbacks: CallbackTable::new(),
        }
    }

    /// Use these link settings.
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this clock. Defaults to a [`SystemClock`].
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Register a handler for `command`.
    pub fn handle<H: Handler>(mut self, command: CommandId, handler: H) -> Self {
        self.callbacks.register(command, handler);
        self
    }

    /// Register a handler with its own context state.
    pub fn handle_with_context<C, F>(mut self, command: CommandId, context: C, handler: F) -> Self
    where
        C: 'static,
        F: FnMut(&Frame, &mut C) -> HandlerResult + 'static,
    {
        self.callbacks
            .register_with_context(command, context, handler);
        self
    }

    /// Register the fallback handler.
    pub fn generic<H: Handler>(mut self, handler: H) -> Self {
        self.callbacks.register_generic(handler);
        self
    }

    /// Validate the settings and build the dispatcher.
    pub fn build<T, const N: usize>(self) -> Result<Dispatcher<P, T, N>> {
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let mut dispatcher = Dispatcher::new(self.port, self.config, clock)?;
        dispatcher.callbacks = self.callbacks;
        Ok(dispatcher)
    }
}

/// Command dispatcher for one radio link.
///
/// `T` and `N` parametrize the embedded tasklet [`Scheduler`]; one of its
/// slots is reserved for the wait deadline.
pub struct Dispatcher<P, T = (), const N: usize = 16> {
    port: P,
    config: LinkConfig,
    receiver: FrameReceiver,
    callbacks: CallbackTable,
    handshake: Handshake,
    pending: Option<PendingWait>,
    scheduler: Scheduler<T, N>,
    deadline: TaskletId,
    read_buf: [u8; READ_CHUNK],
    /// Last poll read bytes or did work.
    active: bool,
}

impl<P: Port> Dispatcher<P> {
    /// Create a builder.
    pub fn builder(port: P) -> DispatcherBuilder<P> {
        DispatcherBuilder::new(port)
    }
}

impl<P: Port, T, const N: usize> Dispatcher<P, T, N> {
    /// Create a dispatcher over `port`.
    pub fn new(port: P, config: LinkConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;

        let mut scheduler = Scheduler::new(clock);
        let deadline = scheduler.init(deadline_expired::<T, N>)?;

        Ok(Self {
            port,
            receiver: FrameReceiver::new(&config),
            handshake: Handshake::new(&config),
            config,
            callbacks: CallbackTable::new(),
            pending: None,
            scheduler,
            deadline,
            read_buf: [0; READ_CHUNK],
            active: false,
        })
    }

    // ------------------------------------------------------------------
    // Callback registration
    // ------------------------------------------------------------------

    /// Register `handler` for `command`, replacing any existing one.
    pub fn register<H: Handler>(&mut self, command: CommandId, handler: H) {
        self.callbacks.register(command, handler);
    }

    /// Register a handler that receives `context` on every call.
    pub fn register_with_context<C, F>(&mut self, command: CommandId, context: C, handler: F)
    where
        C: 'static,
        F: FnMut(&Frame, &mut C) -> HandlerResult + 'static,
    {
        self.callbacks
            .register_with_context(command, context, handler);
    }

    /// Remove the handler for `command`.
    pub fn unregister(&mut self, command: CommandId) -> bool {
        self.callbacks.unregister(command)
    }

    /// Set the fallback handler for commands without a specific one.
    pub fn register_generic<H: Handler>(&mut self, handler: H) {
        self.callbacks.register_generic(handler);
    }

    /// Remove the fallback handler.
    pub fn clear_generic(&mut self) {
        self.callbacks.clear_generic();
    }

    // ------------------------------------------------------------------
    // Transmit
    // ------------------------------------------------------------------

    /// Transmit a frame without waiting for a response.
    ///
    /// With the handshake enabled this first drives the poll loop until the
    /// previous transmission is acknowledged or its ack timeout passes.
    pub fn send(&mut self, frame: &Frame) -> Result<()> {
        if self.handshake.is_enabled() {
            self.await_ack()?;
        }
        self.write_frame(frame)?;

        let now = self.scheduler.now();
        self.handshake.sent(frame, now);
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode(self.config.start_marker);

        let result = self
            .port
            .write_all(&bytes)
            .and_then(|()| self.port.flush());
        if let Err(e) = result {
            tracing::warn!("Failed to send {}: {}", frame.command(), e);
            return Err(e);
        }

        tracing::debug!("Sent {} ({} bytes)", frame.command(), bytes.len());
        Ok(())
    }

    /// Transmit a request and, if it has a synchronous confirm, arm the wait.
    ///
    /// Returns true if a wait was armed; drive it with
    /// [`poll_wait`](Self::poll_wait). Fails with `Busy` while another wait
    /// is outstanding. A failed write arms nothing.
    pub fn start_downstream(&mut self, frame: &Frame, timeout_ms: u32) -> Result<bool> {
        self.ensure_idle()?;
        validate_timeout(timeout_ms)?;

        self.send(frame)?;

        match frame.command().sync_response() {
            Some(expected) => {
                self.arm_wait(expected, WaitKind::Confirm, timeout_ms)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Arm a wait for an asynchronous indication without transmitting.
    pub fn start_wait_for(&mut self, command: CommandId, timeout_ms: u32) -> Result<()> {
        self.ensure_idle()?;
        validate_timeout(timeout_ms)?;
        self.arm_wait(command, WaitKind::Indication, timeout_ms)
    }

    /// Send a request and block until its confirm, using the configured timeout.
    ///
    /// Returns `None` for requests without a synchronous confirm.
    pub fn downstream(&mut self, frame: &Frame) -> Result<Option<Frame>> {
        let timeout_ms = self.config.sync_timeout_ms;
        self.downstream_timeout(frame, timeout_ms)
    }

    /// Send a request and block until its confirm or `timeout_ms` passes.
    pub fn downstream_timeout(&mut self, frame: &Frame, timeout_ms: u32) -> Result<Option<Frame>> {
        if self.start_downstream(frame, timeout_ms)? {
            self.block_on_wait().map(Some)
        } else {
            Ok(None)
        }
    }

    /// Block until `command` arrives or `timeout_ms` passes.
    ///
    /// The handler registered for `command` still runs; the caller gets a copy.
    pub fn wait_for(&mut self, command: CommandId, timeout_ms: u32) -> Result<Frame> {
        self.start_wait_for(command, timeout_ms)?;
        self.block_on_wait()
    }

    // ------------------------------------------------------------------
    // Driver loop
    // ------------------------------------------------------------------

    /// One pump of the driver loop: read, dispatch in arrival order, run
    /// due tasklets.
    ///
    /// Each read is parsed into the receiver's bounded queue and drained
    /// before the next, so a single read completing more frames than
    /// `rx_queue_depth` overwrites the oldest. A partial frame older than
    /// the RX timeout is dropped first.
    ///
    /// Returns the number of frames dispatched plus tasklets fired. Handler
    /// errors are logged; transport errors are returned.
    pub fn poll(&mut self) -> Result<usize> {
        let mut work = 0;
        let mut read_any = false;
        let now = self.scheduler.now();

        if self.receiver.expire(now) && self.handshake.is_enabled() {
            self.write_frame(&Ack::Fail.frame())?;
        }
        self.handshake.expire(now);

        for _ in 0..MAX_READS_PER_POLL {
            let n = self.port.read(&mut self.read_buf)?;
            if n == 0 {
                break;
            }
            read_any = true;

            self.receiver.consume_at(now, &self.read_buf[..n]);
            work += self.drain_received(now)?;
        }

        match self.scheduler.process() {
            Ok(fired) => work += fired,
            Err(LinkError::NotFound) => {}
            Err(e) => return Err(e),
        }

        self.active = read_any || work > 0;
        Ok(work)
    }

    /// Pump once and report on the outstanding wait.
    ///
    /// On timeout the wait is released and any partial frame is discarded.
    /// On a transport error the wait is abandoned and the error returned.
    pub fn poll_wait(&mut self) -> Poll<Result<Frame>> {
        if self.pending.is_none() {
            return Poll::Ready(Err(LinkError::InvalidState(
                "no wait outstanding".to_string(),
            )));
        }

        if let Err(e) = self.poll() {
            self.cancel_wait();
            return Poll::Ready(Err(e));
        }

        self.check_wait()
    }

    /// Abandon the outstanding wait. Returns true if there was one.
    pub fn cancel_wait(&mut self) -> bool {
        match self.pending.take() {
            Some(wait) => {
                tracing::debug!("Abandoning wait for {}", wait.expected);
                let _ = self.scheduler.cancel(self.deadline);
                true
            }
            None => false,
        }
    }

    /// Route an inbound frame.
    ///
    /// A frame matching the outstanding wait completes it; confirms stop
    /// there while indications also reach their handler. Anything else goes
    /// to its handler, else the generic handler, else it is dropped.
    pub fn dispatch(&mut self, frame: &Frame) -> Result<Dispatched> {
        if let Some(wait) = self.pending.as_mut() {
            if wait.response.is_none() && wait.expected == frame.command() {
                wait.response = Some(frame.clone());
                tracing::debug!("{} completes pending wait", frame.command());

                if wait.kind == WaitKind::Indication {
                    self.callbacks.dispatch(frame)?;
                }
                return Ok(Dispatched::Completed);
            }
        }

        self.callbacks.dispatch(frame)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// True while a wait is outstanding.
    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    /// Command the outstanding wait expects.
    pub fn pending_command(&self) -> Option<CommandId> {
        self.pending.as_ref().map(|wait| wait.expected)
    }

    /// Link settings.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Frame receiver state.
    pub fn receiver(&self) -> &FrameReceiver {
        &self.receiver
    }

    /// Ack handshake state.
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// The callback table.
    pub fn callbacks(&self) -> &CallbackTable {
        &self.callbacks
    }

    /// Tasklet scheduler driven by [`poll`](Self::poll).
    pub fn scheduler(&self) -> &Scheduler<T, N> {
        &self.scheduler
    }

    /// Mutable access to the tasklet scheduler.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler<T, N> {
        &mut self.scheduler
    }

    /// Borrow the port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Mutably borrow the port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Tear down, returning the port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Dispatch every parked frame, answering acks first.
    fn drain_received(&mut self, now: u32) -> Result<usize> {
        let mut dispatched = 0;

        while let Some(frame) = self.receiver.next_frame() {
            if self.handshake.is_enabled() {
                if let Some(ack) = Ack::from_frame(&frame) {
                    if let Some(resend) = self.handshake.receive(ack, now) {
                        tracing::debug!("Retransmitting {}", resend.command());
                        self.write_frame(&resend)?;
                    }
                    continue;
                }
                self.write_frame(&Ack::Ready.frame())?;
            }

            dispatched += 1;
            if let Err(e) = self.dispatch(&frame) {
                tracing::error!("Handler error for {}: {}", frame.command(), e);
            }
        }

        Ok(dispatched)
    }

    fn await_ack(&mut self) -> Result<()> {
        loop {
            let now = self.scheduler.now();
            self.handshake.expire(now);
            let remaining = match self.handshake.remaining(now) {
                Some(remaining) => remaining,
                None => return Ok(()),
            };

            self.poll()?;
            if self.handshake.is_stalled() && !self.active {
                let max_ms = match self.scheduler.time_to_next() {
                    Ok(next) => next.min(remaining),
                    Err(_) => remaining,
                };
                self.scheduler.clock().idle(Some(max_ms));
            }
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        match &self.pending {
            Some(wait) => {
                tracing::warn!("Rejecting call while waiting for {}", wait.expected);
                Err(LinkError::Busy)
            }
            None => Ok(()),
        }
    }

    fn arm_wait(&mut self, expected: CommandId, kind: WaitKind, timeout_ms: u32) -> Result<()> {
        if self.scheduler.is_scheduled(self.deadline) {
            self.scheduler.cancel(self.deadline)?;
        }
        self.scheduler.arm(self.deadline, timeout_ms)?;

        tracing::debug!("Waiting up to {}ms for {}", timeout_ms, expected);
        self.pending = Some(PendingWait {
            expected,
            kind,
            timeout_ms,
            response: None,
        });
        Ok(())
    }

    fn check_wait(&mut self) -> Poll<Result<Frame>> {
        let response = match self.pending.as_mut() {
            Some(wait) => wait.response.take(),
            None => return Poll::Pending,
        };

        if let Some(frame) = response {
            self.pending = None;
            if self.scheduler.is_scheduled(self.deadline) {
                let _ = self.scheduler.cancel(self.deadline);
            }
            return Poll::Ready(Ok(frame));
        }

        if self.scheduler.is_scheduled(self.deadline) {
            return Poll::Pending;
        }

        match self.pending.take() {
            Some(wait) => {
                self.receiver.reset();
                tracing::warn!(
                    "Timed out after {}ms waiting for {}",
                    wait.timeout_ms,
                    wait.expected
                );
                Poll::Ready(Err(LinkError::Timeout {
                    command: wait.expected,
                    timeout_ms: wait.timeout_ms,
                }))
            }
            None => Poll::Pending,
        }
    }

    fn block_on_wait(&mut self) -> Result<Frame> {
        loop {
            match self.poll_wait() {
                Poll::Ready(result) => return result,
                Poll::Pending => {
                    if !self.active {
                        let max_ms = self.scheduler.time_to_next().ok();
                        self.scheduler.clock().idle(max_ms);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Disposition;
    use crate::tasklet::{Clock, ManualClock};
    use crate::transport::{MemoryPort, MemoryPortHandle};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (Dispatcher<MemoryPort>, MemoryPortHandle, ManualClock) {
        setup_with(LinkConfig::default())
    }

    fn setup_with(config: LinkConfig) -> (Dispatcher<MemoryPort>, MemoryPortHandle, ManualClock) {
        let clock = ManualClock::new(0);
        let (port, radio) = MemoryPort::new(config.start_marker);
        let dispatcher = Dispatcher::new(port, config, clock.shared()).unwrap();
        (dispatcher, radio, clock)
    }

    fn rxrdy() -> Frame {
        Frame::empty(CommandId::EVBME_RXRDY)
    }

    fn rxfail() -> Frame {
        Frame::empty(CommandId::EVBME_RXFAIL)
    }

    fn get_request() -> Frame {
        Frame::new(CommandId::MLME_GET_REQUEST, vec![0x53, 0x00]).unwrap()
    }

    fn get_confirm() -> Frame {
        Frame::new(CommandId::MLME_GET_CONFIRM, vec![0x00, 0x53, 0x00, 0x01, 0x0B]).unwrap()
    }

    #[test]
    fn test_downstream_returns_confirm() {
        let (mut dispatcher, radio, _clock) = setup();
        radio.reply_to(CommandId::MLME_GET_REQUEST, get_confirm());

        let response = dispatcher.downstream(&get_request()).unwrap();

        assert_eq!(response, Some(get_confirm()));
        assert_eq!(radio.written_frames(), vec![get_request()]);
        assert!(!dispatcher.is_waiting());
        assert!(dispatcher.scheduler().is_empty());
    }

    #[test]
    fn test_downstream_times_out_on_silence() {
        let (mut dispatcher, _radio, clock) = setup();

        let result = dispatcher.downstream_timeout(&get_request(), 100);

        match result {
            Err(LinkError::Timeout {
                command,
                timeout_ms,
            }) => {
                assert_eq!(command, CommandId::MLME_GET_CONFIRM);
                assert_eq!(timeout_ms, 100);
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert_eq!(clock.now_ms(), 100);
        assert!(!dispatcher.is_waiting());
    }

    #[test]
    fn test_async_request_does_not_wait() {
        let (mut dispatcher, radio, _clock) = setup();
        let request = Frame::new(CommandId::MCPS_DATA_REQUEST, vec![1, 2, 3]).unwrap();

        let response = dispatcher.downstream(&request).unwrap();

        assert_eq!(response, None);
        assert!(!dispatcher.is_waiting());
        assert_eq!(radio.written_frames(), vec![request]);
    }

    #[test]
    fn test_second_call_while_waiting_is_busy() {
        let (mut dispatcher, radio, _clock) = setup();

        assert!(dispatcher.start_downstream(&get_request(), 100).unwrap());
        let result = dispatcher.start_downstream(&get_request(), 100);

        assert!(matches!(result, Err(LinkError::Busy)));
        assert!(matches!(
            dispatcher.wait_for(CommandId::MLME_COMM_STATUS_INDICATION, 100),
            Err(LinkError::Busy)
        ));
        // Only the first request reached the wire
        assert_eq!(radio.written_frames().len(), 1);
        assert_eq!(
            dispatcher.pending_command(),
            Some(CommandId::MLME_GET_CONFIRM)
        );
    }

    #[test]
    fn test_write_failure_arms_nothing() {
        let (mut dispatcher, radio, _clock) = setup();
        radio.fail_writes(true);

        let result = dispatcher.downstream(&get_request());

        assert!(matches!(result, Err(LinkError::Io(_))));
        assert!(!dispatcher.is_waiting());
        assert!(dispatcher.scheduler().is_empty());
    }

    #[test]
    fn test_invalid_timeout_rejected_before_send() {
        let (mut dispatcher, radio, _clock) = setup();

        let result = dispatcher.downstream_timeout(&get_request(), 0);

        assert!(matches!(result, Err(LinkError::InvalidArgs(_))));
        assert!(radio.written().is_empty());
    }

    #[test]
    fn test_timeout_discards_partial_frame() {
        let (mut dispatcher, radio, _clock) = setup();
        // Header of a confirm whose payload never arrives
        radio.inject(&[0xDE, 0x68, 0x05, 0x00]);

        let result = dispatcher.downstream_timeout(&get_request(), 50);

        assert!(matches!(result, Err(LinkError::Timeout { .. })));
        assert!(dispatcher.receiver().is_idle());
    }

    #[test]
    fn test_confirm_bypasses_handler() {
        let (mut dispatcher, radio, _clock) = setup();
        let calls = Rc::new(RefCell::new(0));

        let counter = calls.clone();
        dispatcher.register(CommandId::MLME_GET_CONFIRM, move |_: &Frame| {
            *counter.borrow_mut() += 1;
            Ok(Disposition::Handled)
        });
        radio.reply_to(CommandId::MLME_GET_REQUEST, get_confirm());

        dispatcher.downstream(&get_request()).unwrap();
        assert_eq!(*calls.borrow(), 0);

        // Outside a wait the same command reaches its handler
        radio.inject_frame(&get_confirm());
        dispatcher.poll().unwrap();
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_indications_routed_while_waiting() {
        let (mut dispatcher, radio, _clock) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        dispatcher.register_generic(move |frame: &Frame| {
            sink.borrow_mut().push(frame.command());
            Ok(Disposition::Handled)
        });

        // An indication arrives ahead of the confirm in the same read
        let indication = Frame::new(CommandId::MCPS_DATA_INDICATION, vec![0xAA]).unwrap();
        radio.inject_frame(&indication);
        radio.inject_frame(&get_confirm());

        let response = dispatcher.downstream(&get_request()).unwrap();

        assert_eq!(response, Some(get_confirm()));
        assert_eq!(*seen.borrow(), vec![CommandId::MCPS_DATA_INDICATION]);
    }

    #[test]
    fn test_routing_order() {
        let (mut dispatcher, _radio, _clock) = setup();
        dispatcher.register(CommandId::MCPS_DATA_INDICATION, |_: &Frame| {
            Ok(Disposition::Handled)
        });

        let data = Frame::empty(CommandId::MCPS_DATA_INDICATION);
        let status = Frame::empty(CommandId::MLME_COMM_STATUS_INDICATION);

        assert_eq!(
            dispatcher.dispatch(&data).unwrap(),
            Dispatched::Handler(Disposition::Handled)
        );
        assert_eq!(dispatcher.dispatch(&status).unwrap(), Dispatched::Dropped);

        dispatcher.register_generic(|_: &Frame| Ok(Disposition::NotHandled));
        assert_eq!(
            dispatcher.dispatch(&status).unwrap(),
            Dispatched::Generic(Disposition::NotHandled)
        );

        dispatcher.clear_generic();
        assert!(dispatcher.unregister(CommandId::MCPS_DATA_INDICATION));
        assert_eq!(dispatcher.dispatch(&data).unwrap(), Dispatched::Dropped);
    }

    #[test]
    fn test_handler_error_does_not_stop_poll() {
        let (mut dispatcher, radio, _clock) = setup();
        let seen = Rc::new(RefCell::new(0));

        dispatcher.register(CommandId::MCPS_DATA_INDICATION, |frame: &Frame| {
            Err(LinkError::Handler {
                command: frame.command(),
                message: "rejected".to_string(),
            })
        });
        let counter = seen.clone();
        dispatcher.register(CommandId::MLME_COMM_STATUS_INDICATION, move |_: &Frame| {
            *counter.borrow_mut() += 1;
            Ok(Disposition::Handled)
        });

        radio.inject_frame(&Frame::empty(CommandId::MCPS_DATA_INDICATION));
        radio.inject_frame(&Frame::empty(CommandId::MLME_COMM_STATUS_INDICATION));

        assert_eq!(dispatcher.poll().unwrap(), 2);
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn test_wait_for_indication_runs_handler() {
        let (mut dispatcher, radio, _clock) = setup();
        let calls = Rc::new(RefCell::new(0));

        let counter = calls.clone();
        dispatcher.register(CommandId::MLME_SCAN_CONFIRM, move |_: &Frame| {
            *counter.borrow_mut() += 1;
            Ok(Disposition::Handled)
        });
        let scan = Frame::new(CommandId::MLME_SCAN_CONFIRM, vec![0x00, 0x01]).unwrap();
        radio.inject_frame(&scan);

        let frame = dispatcher
            .wait_for(CommandId::MLME_SCAN_CONFIRM, 1000)
            .unwrap();

        assert_eq!(frame, scan);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_wait_for_times_out() {
        let (mut dispatcher, _radio, clock) = setup();

        let result = dispatcher.wait_for(CommandId::MLME_ASSOCIATE_CONFIRM, 250);

        assert!(matches!(
            result,
            Err(LinkError::Timeout {
                command: CommandId::MLME_ASSOCIATE_CONFIRM,
                timeout_ms: 250,
            })
        ));
        assert_eq!(clock.now_ms(), 250);
    }

    #[test]
    fn test_poll_wait_is_non_blocking() {
        let (mut dispatcher, radio, clock) = setup();

        assert!(dispatcher.start_downstream(&get_request(), 100).unwrap());
        assert!(dispatcher.poll_wait().is_pending());

        clock.advance(50);
        radio.inject_frame(&get_confirm());

        match dispatcher.poll_wait() {
            Poll::Ready(Ok(frame)) => assert_eq!(frame, get_confirm()),
            other => panic!("expected confirm, got {:?}", other),
        }
        assert!(matches!(
            dispatcher.poll_wait(),
            Poll::Ready(Err(LinkError::InvalidState(_)))
        ));
    }

    #[test]
    fn test_cancel_wait_frees_slot() {
        let (mut dispatcher, radio, _clock) = setup();

        dispatcher.start_downstream(&get_request(), 100).unwrap();
        assert!(dispatcher.cancel_wait());
        assert!(!dispatcher.cancel_wait());
        assert!(dispatcher.scheduler().is_empty());

        radio.reply_to(CommandId::MLME_GET_REQUEST, get_confirm());
        assert!(dispatcher.downstream(&get_request()).unwrap().is_some());
    }

    fn inject_confirm(
        _: &mut Scheduler<MemoryPortHandle>,
        _: TaskletId,
        radio: MemoryPortHandle,
    ) -> Result<()> {
        radio.inject_frame(&get_confirm());
        Ok(())
    }

    #[test]
    fn test_tasklet_runs_during_wait() {
        let clock = ManualClock::new(0);
        let (port, radio) = MemoryPort::new(0xDE);
        let mut dispatcher: Dispatcher<MemoryPort, MemoryPortHandle> =
            Dispatcher::new(port, LinkConfig::default(), clock.shared()).unwrap();

        let id = dispatcher.scheduler_mut().init(inject_confirm).unwrap();
        dispatcher
            .scheduler_mut()
            .schedule_delta(id, 20, radio.clone())
            .unwrap();

        let response = dispatcher.downstream_timeout(&get_request(), 100).unwrap();

        assert_eq!(response, Some(get_confirm()));
        assert_eq!(clock.now_ms(), 20);
    }

    #[test]
    fn test_builder_registers_handlers() {
        let clock = ManualClock::new(0);
        let (port, radio) = MemoryPort::new(0xC5);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        let mut dispatcher: Dispatcher<MemoryPort> = Dispatcher::builder(port)
            .config(LinkConfig::default().with_start_marker(0xC5))
            .clock(clock.shared())
            .handle(CommandId::EVBME_MESSAGE_INDICATION, move |frame: &Frame| {
                sink.borrow_mut().push(frame.payload_bytes().clone());
                Ok(Disposition::Handled)
            })
            .build()
            .unwrap();

        radio.inject(&[0xC5, 0xA0, 0x02, b'o', b'k']);
        dispatcher.poll().unwrap();

        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(&seen.borrow()[0][..], b"ok");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let (port, _radio) = MemoryPort::new(0xDE);
        let config = LinkConfig::default().with_rx_queue_depth(0);

        let result: Result<Dispatcher<MemoryPort>> =
            Dispatcher::new(port, config, ManualClock::new(0).shared());

        assert!(matches!(result, Err(LinkError::InvalidArgs(_))));
    }

    #[test]
    fn test_stale_partial_frame_dropped_between_polls() {
        let (mut dispatcher, radio, clock) = setup();
        let calls = Rc::new(RefCell::new(0));

        let counter = calls.clone();
        dispatcher.register(CommandId::MLME_COMM_STATUS_INDICATION, move |_: &Frame| {
            *counter.borrow_mut() += 1;
            Ok(Disposition::Handled)
        });

        // Truncated frame: five payload bytes announced, one delivered
        radio.inject(&[0xDE, 0x20, 0x05, 0x01]);
        dispatcher.poll().unwrap();
        assert!(!dispatcher.receiver().is_idle());

        clock.advance(5_000);
        dispatcher.poll().unwrap();
        assert!(dispatcher.receiver().is_idle());
        assert_eq!(dispatcher.receiver().timeouts(), 1);

        radio.inject_frame(&Frame::new(CommandId::MLME_COMM_STATUS_INDICATION, vec![0x00]).unwrap());
        dispatcher.poll().unwrap();

        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_partial_frame_kept_within_rx_timeout() {
        let (mut dispatcher, radio, clock) = setup();
        let frame = Frame::new(CommandId::MCPS_DATA_INDICATION, vec![1, 2, 3]).unwrap();
        let bytes = frame.encode(0xDE);

        radio.inject(&bytes[..3]);
        dispatcher.poll().unwrap();

        clock.advance(200);
        radio.inject(&bytes[3..]);
        assert_eq!(dispatcher.poll().unwrap(), 1);
        assert_eq!(dispatcher.receiver().timeouts(), 0);
    }

    #[test]
    fn test_poll_honours_rx_queue_depth() {
        let (mut dispatcher, radio, _clock) = setup_with(LinkConfig::default().with_rx_queue_depth(1));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        dispatcher.register(CommandId::MCPS_DATA_INDICATION, move |frame: &Frame| {
            sink.borrow_mut().push(frame.payload()[0]);
            Ok(Disposition::Handled)
        });

        // Ten frames land in a single read
        for n in 0..10u8 {
            radio.inject_frame(&Frame::new(CommandId::MCPS_DATA_INDICATION, vec![n]).unwrap());
        }

        assert_eq!(dispatcher.poll().unwrap(), 1);
        assert_eq!(*seen.borrow(), vec![9]);
        assert_eq!(dispatcher.receiver().overwritten(), 9);
    }

    #[test]
    fn test_send_writes_matching_length_byte() {
        let (mut dispatcher, radio, _clock) = setup();
        let frame = Frame::new(CommandId::MCPS_DATA_REQUEST, vec![0x5A; 255]).unwrap();

        dispatcher.send(&frame).unwrap();

        let written = radio.written();
        assert_eq!(written.len(), 3 + 255);
        assert_eq!(written[2], 0xFF);
        assert!(Frame::new(CommandId::MCPS_DATA_REQUEST, vec![0x5A; 300]).is_err());
    }

    #[test]
    fn test_handshake_acks_received_frames() {
        let (mut dispatcher, radio, _clock) = setup_with(LinkConfig::default().with_handshake(true));

        radio.inject_frame(&Frame::empty(CommandId::MLME_SYNC_LOSS_INDICATION));
        radio.inject_frame(&rxrdy());
        assert_eq!(dispatcher.poll().unwrap(), 1);

        // One ack for the indication, none for the peer's own ack
        assert_eq!(radio.written_frames(), vec![rxrdy()]);
    }

    #[test]
    fn test_handshake_send_waits_for_rxrdy() {
        let (mut dispatcher, radio, clock) = setup_with(LinkConfig::default().with_handshake(true));
        let first = Frame::new(CommandId::MCPS_DATA_REQUEST, vec![1]).unwrap();
        let second = Frame::new(CommandId::MCPS_DATA_REQUEST, vec![2]).unwrap();

        dispatcher.send(&first).unwrap();
        assert!(dispatcher.handshake().is_stalled());

        radio.inject_frame(&rxrdy());
        dispatcher.send(&second).unwrap();

        assert_eq!(clock.now_ms(), 0);
        assert_eq!(dispatcher.handshake().missed(), 0);
        assert_eq!(radio.written_frames(), vec![first, second]);
    }

    #[test]
    fn test_handshake_stall_times_out() {
        let (mut dispatcher, radio, clock) = setup_with(
            LinkConfig::default()
                .with_handshake(true)
                .with_ack_timeout_ms(300),
        );
        let request = Frame::new(CommandId::MCPS_DATA_REQUEST, vec![1]).unwrap();

        dispatcher.send(&request).unwrap();
        dispatcher.send(&request).unwrap();

        assert_eq!(clock.now_ms(), 301);
        assert_eq!(dispatcher.handshake().missed(), 1);
        assert_eq!(radio.written_frames().len(), 2);
    }

    #[test]
    fn test_handshake_rxfail_retransmits() {
        let (mut dispatcher, radio, _clock) = setup_with(LinkConfig::default().with_handshake(true));
        let request = Frame::new(CommandId::MCPS_DATA_REQUEST, vec![7, 7]).unwrap();

        dispatcher.send(&request).unwrap();
        radio.inject_frame(&rxfail());
        dispatcher.poll().unwrap();

        assert_eq!(radio.written_frames(), vec![request.clone(), request]);
        assert!(dispatcher.handshake().is_stalled());
    }

    #[test]
    fn test_handshake_rx_timeout_sends_rxfail() {
        let (mut dispatcher, radio, clock) = setup_with(LinkConfig::default().with_handshake(true));

        radio.inject(&[0xDE, 0x20, 0x04]);
        dispatcher.poll().unwrap();
        assert!(radio.written().is_empty());

        clock.advance(201);
        dispatcher.poll().unwrap();

        assert_eq!(radio.written_frames(), vec![rxfail()]);
    }

    #[test]
    fn test_handshake_downstream() {
        let (mut dispatcher, radio, _clock) = setup_with(LinkConfig::default().with_handshake(true));
        radio.reply_to(CommandId::MLME_GET_REQUEST, get_confirm());
        radio.inject_frame(&rxrdy());

        let response = dispatcher.downstream(&get_request()).unwrap();

        assert_eq!(response, Some(get_confirm()));
        assert_eq!(radio.written_frames(), vec![get_request(), rxrdy()]);
        assert!(!dispatcher.handshake().is_stalled());
    }
}
