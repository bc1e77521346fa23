//! Sound server - applies transport batches to the organ
//!
//! One consumer drains the inbound queue, applies each batch in order and
//! commits once per batch. Shutdown is requested through a watch channel; the
//! server then silences the organ and closes the sink.

use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::organ::{Organ, OrganError};
use crate::sink::SoundSink;
use crate::transport::{parse_message, Inbound, OrganEvent};

/// State kept by the server between batches
#[derive(Debug, Clone, Default)]
pub struct ServerContext {
    /// Whether the broker connection is up
    pub connected: bool,
    /// Batches processed
    pub events: u64,
    /// Time spent processing batches
    pub busy: Duration,
}

impl ServerContext {
    pub fn record(&mut self, elapsed: Duration) {
        self.events += 1;
        self.busy += elapsed;
    }

    /// Average batch processing time in milliseconds
    pub fn average_ms(&self) -> Option<f64> {
        (self.events > 0).then(|| self.busy.as_secs_f64() * 1000.0 / self.events as f64)
    }
}

/// Organ plus the bookkeeping of the event loop
pub struct OrganServer<S: SoundSink> {
    organ: Organ<S>,
    ctx: ServerContext,
}

impl<S: SoundSink> OrganServer<S> {
    pub fn new(organ: Organ<S>) -> Self {
        Self {
            organ,
            ctx: ServerContext::default(),
        }
    }

    pub fn organ(&self) -> &Organ<S> {
        &self.organ
    }

    pub fn organ_mut(&mut self) -> &mut Organ<S> {
        &mut self.organ
    }

    pub fn context(&self) -> &ServerContext {
        &self.ctx
    }

    /// Process one inbound item. Only fatal organ errors are returned.
    pub fn handle(&mut self, inbound: Inbound) -> Result<(), OrganError> {
        match inbound {
            Inbound::Payload(payload) => self.handle_payload(&payload),
            Inbound::Events(events) => {
                let started = Instant::now();
                self.apply_batch(&events)?;
                self.ctx.record(started.elapsed());
                Ok(())
            }
            Inbound::Connection(up) => {
                if up != self.ctx.connected {
                    info!("Broker connection {}", if up { "up" } else { "down" });
                }
                self.ctx.connected = up;
                Ok(())
            }
        }
    }

    /// Decode a protocol message, apply it and commit
    pub fn handle_payload(&mut self, payload: &str) -> Result<(), OrganError> {
        let started = Instant::now();
        debug!("Message: {}", payload.trim());

        let events = match parse_message(payload) {
            Ok(events) => events,
            Err(e) => {
                warn!("Dropping malformed message '{}': {}", payload.trim(), e);
                return Ok(());
            }
        };
        self.apply_batch(&events)?;
        self.ctx.record(started.elapsed());
        Ok(())
    }

    fn apply_batch(&mut self, events: &[OrganEvent]) -> Result<(), OrganError> {
        for event in events {
            self.apply(*event)?;
        }
        self.organ.commit();
        Ok(())
    }

    /// Apply one event to the organ without committing
    pub fn apply(&mut self, event: OrganEvent) -> Result<(), OrganError> {
        match event {
            OrganEvent::Note { manual, note, velocity } => {
                let (Ok(manual), Ok(key)) = (usize::try_from(manual), u8::try_from(note)) else {
                    debug!(manual, note, "Ignoring note outside valid range");
                    return Ok(());
                };
                if key >= 128 {
                    debug!(manual, note, "Ignoring note outside valid range");
                } else if velocity > 0 {
                    self.organ.key_down(manual, key);
                } else if velocity == 0 {
                    self.organ.key_up(manual, key);
                }
            }
            OrganEvent::Stop { stop, action } => {
                let Ok(stop) = usize::try_from(stop) else {
                    debug!(stop, "Ignoring negative stop index");
                    return Ok(());
                };
                match action {
                    0 => self.organ.stop_off(stop),
                    1 => self.organ.stop_on(stop),
                    2 => self.organ.toggle_stop(stop),
                    other => debug!(stop, action = other, "Ignoring unknown stop action"),
                }
            }
            OrganEvent::Mode(mode) => {
                let index = usize::try_from(mode).unwrap_or(usize::MAX);
                match self.organ.set_instrument(index) {
                    Ok(()) => info!("Instrument mode {} selected", mode),
                    Err(e) if !e.is_fatal() => warn!("Ignoring mode change: {}", e),
                    Err(e) => return Err(e),
                }
            }
            OrganEvent::Transpose(amount) => {
                let amount = amount.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
                self.organ.transpose(amount);
            }
            OrganEvent::Volume(velocity) => {
                self.organ.set_volume(velocity.clamp(0, 127) as u8);
            }
        }
        Ok(())
    }

    /// Run until shutdown is requested, every transport is gone, or a fatal error
    pub async fn run(
        &mut self,
        mut rx: mpsc::Receiver<Inbound>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        info!("Ready to process console events");
        let mut fatal = None;

        while !*shutdown.borrow() {
            tokio::select! {
                inbound = rx.recv() => match inbound {
                    Some(inbound) => {
                        if let Err(e) = self.handle(inbound) {
                            error!("Organ failure: {}", e);
                            fatal = Some(e);
                            break;
                        }
                    }
                    None => {
                        info!("All transports closed");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped");
                    }
                    info!("Shutdown signal received, stopping event loop");
                    break;
                }
            }
        }

        info!("Cleaning up");
        self.organ.shutdown()?;
        match self.ctx.average_ms() {
            Some(avg) => info!("Average event process time = {:.2}ms", avg),
            None => info!("No events received"),
        }

        match fatal {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::sink::{ConsoleSink, SinkCommand};

    const CONFIG: &str = r#"
global:
  num_keyboards: 2
local:
  this_console: 0
consoles:
  - index: 0
    modes: [Church, Broken]
    instruments:
      Church:
        soundfont: church.sf2
        stops:
          - { patch: 0, name: Principal }
          - { patch: 1, name: Flute }
      Broken:
        soundfont: broken.sf2
        num_stops: 20
        stops:
          - { patch: 0, name: Only }
synth:
  backend: console
"#;

    fn make_server() -> OrganServer<ConsoleSink> {
        let config = AppConfig::parse(CONFIG).unwrap();
        let console = config.local_console().unwrap().clone();
        let organ = Organ::new(ConsoleSink::new(), Box::new(console), 2).unwrap();
        let mut server = OrganServer::new(organ);
        server.organ_mut().sink_mut().take_history();
        server
    }

    fn sounding(server: &OrganServer<ConsoleSink>) -> Vec<(u8, u8)> {
        server.organ().sink().sounding()
    }

    #[test]
    fn test_payload_is_one_batch() {
        let mut server = make_server();
        server.handle_payload("S 0 1 S 1 1 N 0 60 100").unwrap();
        assert_eq!(sounding(&server), vec![(0, 60), (1, 60)]);
        assert_eq!(server.context().events, 1);

        server.handle_payload("N 0 60 0").unwrap();
        assert!(sounding(&server).is_empty());
        assert_eq!(server.context().events, 2);
        assert!(server.context().average_ms().is_some());
    }

    #[test]
    fn test_stop_actions() {
        let mut server = make_server();
        server.handle_payload("S 0 2 S 1 1").unwrap();
        assert_eq!(server.organ().stop_states(), &[true, true]);
        server.handle_payload("S 0 2 S 1 0 S 1 7 S -1 1").unwrap();
        assert_eq!(server.organ().stop_states(), &[false, false]);
    }

    #[test]
    fn test_note_arguments_out_of_range_are_ignored() {
        let mut server = make_server();
        server
            .handle_payload("S 0 1 N -1 60 100 N 0 300 100 N 0 -5 100 N 9 60 100 N 0 60 -3")
            .unwrap();
        assert!(server.organ().held_keys().is_empty());
        assert!(sounding(&server).is_empty());
    }

    #[test]
    fn test_malformed_message_is_dropped_whole() {
        let mut server = make_server();
        server.handle_payload("S 0 1 N 0 60").unwrap();
        assert_eq!(server.organ().stop_states(), &[false, false]);
        assert_eq!(server.context().events, 0);
    }

    #[test]
    fn test_transpose_and_volume_commands() {
        let mut server = make_server();
        server.handle_payload("S 0 1 N 1 60 1").unwrap();
        assert_eq!(server.organ().sink().velocity_of(0, 60), Some(127));

        // Retriggered at the new pitch when the batch commits, with the new volume
        server.handle_payload("T 2 V 50").unwrap();
        assert_eq!(sounding(&server), vec![(0, 62)]);
        assert_eq!(server.organ().sink().velocity_of(0, 62), Some(50));

        server.handle_payload("V 999").unwrap();
        assert_eq!(server.organ().volume(), 127);
    }

    #[test]
    fn test_oversized_transpose_keeps_serving() {
        let mut server = make_server();
        server.handle_payload("S 0 1 N 0 60 100").unwrap();
        server.handle_payload("T 9999999999").unwrap();
        assert_eq!(server.organ().transpose_amount(), i32::MAX);
        assert!(sounding(&server).is_empty());

        server.handle_payload("T -9999999999 N 0 64 100").unwrap();
        assert!(sounding(&server).is_empty());

        server.handle_payload("T 0").unwrap();
        assert_eq!(sounding(&server), vec![(0, 60), (0, 64)]);
    }

    #[test]
    fn test_unknown_mode_is_ignored() {
        let mut server = make_server();
        server.handle_payload("S 0 1 N 0 60 100 M 5").unwrap();
        assert_eq!(server.organ().mode_index(), 0);
        assert_eq!(sounding(&server), vec![(0, 60)]);

        server.handle_payload("M -1").unwrap();
        assert_eq!(server.organ().mode_index(), 0);
    }

    #[test]
    fn test_invalid_mode_profile_is_fatal() {
        let mut server = make_server();
        let err = server.handle_payload("M 1").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_midi_events_batch() {
        let mut server = make_server();
        server.handle(Inbound::Payload("S 1 1".to_string())).unwrap();
        server
            .handle(Inbound::Events(vec![OrganEvent::Note { manual: 1, note: 48, velocity: 90 }]))
            .unwrap();
        assert_eq!(sounding(&server), vec![(1, 48)]);

        server.handle(Inbound::Connection(true)).unwrap();
        assert!(server.context().connected);
    }

    #[tokio::test]
    async fn test_run_until_transports_close() {
        let mut server = make_server();
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(Inbound::Payload("S 0 1 N 0 60 100".to_string())).await.unwrap();
        drop(tx);

        server.run(rx, shutdown_rx).await.unwrap();
        assert_eq!(server.context().events, 1);

        // Final commit released the held note before the sink closed
        let history = server.organ().sink().history();
        assert!(history.contains(&SinkCommand::Release { channel: 0, note: 60 }));
        assert!(sounding(&server).is_empty());
        assert!(!server.organ().sink().is_started());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_signal() {
        let mut server = make_server();
        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(Inbound::Payload("S 0 1 N 0 70 100".to_string())).await.unwrap();
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            shutdown_tx.send(true).unwrap();
        });

        server.run(rx, shutdown_rx).await.unwrap();
        stopper.await.unwrap();
        assert!(sounding(&server).is_empty());
        drop(tx);
    }

    #[tokio::test]
    async fn test_run_returns_fatal_error() {
        let mut server = make_server();
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(Inbound::Payload("M 1".to_string())).await.unwrap();
        assert!(server.run(rx, shutdown_rx).await.is_err());
        drop(tx);
    }
}
