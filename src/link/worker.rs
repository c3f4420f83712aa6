//! Link worker thread
//!
//! One worker per sensor owns the socket for the whole connected lifetime.
//! Every loop cycle it applies queued consumer commands, reads with a short
//! timeout, feeds the protocol session and writes whatever the session
//! produced.
//!
//! The inactivity timer is reset on connect and on every read that returned
//! bytes. A sensor that stays connected but goes quiet lets it run out.

use super::shared::LinkShared;
use super::transport::{TcpTransport, Transport};
use super::NetworkTarget;
use crate::devices::{LinkCommand, ProtocolSettings, SensorKind, Session, SessionOutput};
use crate::error::Result;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

const READ_CHUNK_SIZE: usize = 4096;

/// Notifications from a worker to its link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Socket connected and start commands sent
    Connected,
    /// Connection failed or dropped
    Disconnected(String),
    /// Status field reported by the device
    Status { key: String, value: String },
}

/// Everything a worker needs, moved into its thread
pub struct WorkerContext {
    pub name: String,
    pub target: NetworkTarget,
    pub kind: SensorKind,
    pub resolution: usize,
    pub protocol: ProtocolSettings,
    pub connect_timeout: Duration,
    pub shared: Arc<LinkShared>,
    pub commands: Receiver<LinkCommand>,
    pub events: Sender<LinkEvent>,
}

/// Thread entry: connect, then run the session until stopped or disconnected
pub fn run(ctx: WorkerContext) {
    log::info!(
        "Link '{}': connecting to {}:{} ({})",
        ctx.name,
        ctx.target.address,
        ctx.target.port,
        ctx.kind
    );
    ctx.shared.inactivity.reset();

    match TcpTransport::connect(&ctx.target, ctx.connect_timeout) {
        Ok(transport) => {
            log::info!("Link '{}': connected to {}", ctx.name, transport.peer());
            run_session(transport, &ctx);
        }
        Err(e) => {
            log::warn!("Link '{}': connect failed: {}", ctx.name, e);
            let _ = ctx.events.send(LinkEvent::Disconnected(e.to_string()));
        }
    }
}

/// Drive `session` over `transport` until stop is requested or I/O fails
pub fn run_session<T: Transport>(mut transport: T, ctx: &WorkerContext) {
    let mut session = Session::new(ctx.kind, ctx.resolution, &ctx.protocol);
    let mut out = SessionOutput::default();
    let mut buf = [0u8; READ_CHUNK_SIZE];

    session.start(Instant::now(), &mut out);
    if let Err(e) = flush(&mut transport, &mut out) {
        log::warn!("Link '{}': failed to send start commands: {}", ctx.name, e);
        let _ = ctx.events.send(LinkEvent::Disconnected(e.to_string()));
        return;
    }
    ctx.shared.inactivity.reset();
    let _ = ctx.events.send(LinkEvent::Connected);

    while !ctx.shared.should_stop() {
        if let Err(e) = cycle(&mut transport, &mut session, &mut out, &mut buf, ctx) {
            log::error!("Link '{}': {}", ctx.name, e);
            if !ctx.shared.should_stop() {
                let _ = ctx.events.send(LinkEvent::Disconnected(e.to_string()));
            }
            break;
        }
    }

    log::info!("Link '{}': worker exiting", ctx.name);
}

fn cycle<T: Transport>(
    transport: &mut T,
    session: &mut Session,
    out: &mut SessionOutput,
    buf: &mut [u8],
    ctx: &WorkerContext,
) -> Result<()> {
    let now = Instant::now();

    while let Ok(cmd) = ctx.commands.try_recv() {
        log::debug!("Link '{}': command {:?}", ctx.name, cmd);
        session.on_command(cmd, out);
    }

    let n = transport.read(buf)?;
    if n > 0 {
        ctx.shared.inactivity.reset();
        session.on_bytes(&buf[..n], now, out);
    }
    session.on_tick(now, out);

    if out.scan_ready {
        ctx.shared.slot.publish(session.frame());
        let frames = ctx.shared.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if frames % 500 == 0 {
            log::debug!(
                "Link '{}': {} frames, {} dropped",
                ctx.name,
                frames,
                ctx.shared.dropped_frames.load(Ordering::Relaxed)
            );
        }
    }
    if out.dropped_frames > 0 {
        ctx.shared
            .dropped_frames
            .fetch_add(out.dropped_frames as u64, Ordering::Relaxed);
    }
    for (key, value) in out.status.drain(..) {
        let _ = ctx.events.send(LinkEvent::Status { key, value });
    }

    flush(transport, out)
}

fn flush<T: Transport>(transport: &mut T, out: &mut SessionOutput) -> Result<()> {
    for bytes in out.outgoing.drain(..) {
        transport.write_all(&bytes)?;
    }
    out.reset();
    Ok(())
}
