//! Single-threaded command loop driving a [`SyncEngine`].
//!
//! Everything that touches the engine goes through one channel, so registrations,
//! webhook deliveries and timer-driven passes are serialized and a pass can never
//! start while another is running.

use crate::client::TadoApi;
use crate::models::state::DeviceRecord;
use crate::sync::engine::SyncEngine;
use log::{debug, info, warn};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Register(DeviceRecord),
    Update(DeviceRecord),
    Unregister(String),
    /// Raw body of an inbound webhook delivery.
    Webhook(String),
    Shutdown,
}

/// Cloneable sender side of the command loop.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: Sender<Command>,
}

impl EngineHandle {
    /// Queue `command`. Fails only when the loop has exited.
    pub fn send(&self, command: Command) -> Result<(), String> {
        self.tx.send(command).map_err(|_| String::from("sync loop is not running"))
    }
}

pub fn channel() -> (EngineHandle, Receiver<Command>) {
    let (tx, rx) = mpsc::channel();
    (EngineHandle { tx }, rx)
}

/// Run until [`Command::Shutdown`] arrives or every handle is dropped.
pub fn run<A: TadoApi>(engine: &mut SyncEngine<A>, commands: Receiver<Command>) {
    info!("Sync loop started");
    loop {
        while let Some(report) = engine.poll_timers(Instant::now()) {
            debug!("Pass finished with {} failure(s)", report.failures.len());
        }

        let command = match engine.next_deadline() {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match commands.recv_timeout(wait) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match commands.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        if !apply(engine, command) {
            break;
        }
    }
    info!("Sync loop stopped");
}

/// Apply one command. Returns `false` on shutdown.
fn apply<A: TadoApi>(engine: &mut SyncEngine<A>, command: Command) -> bool {
    match command {
        Command::Register(record) => {
            engine.register_device(record, Instant::now());
        }
        Command::Update(record) => {
            engine.update_device(record);
        }
        Command::Unregister(id) => {
            engine.unregister_device(&id);
        }
        Command::Webhook(body) => {
            if let Err(e) = engine.handle_webhook_body(&body) {
                warn!("Dropping webhook delivery: {}", e);
            }
        }
        Command::Shutdown => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tado::{HomeId, ZoneId, ZoneType};
    use crate::sync::scheduler::Scheduler;
    use crate::testing::FakeApi;
    use std::time::Duration;

    #[test]
    fn commands_are_applied_in_order_until_shutdown() {
        let mut engine = SyncEngine::new(FakeApi::new(), Scheduler::new(Duration::from_secs(3600), Duration::from_secs(3600)));
        let (handle, rx) = channel();
        let record = DeviceRecord::new("RU1", HomeId(1), ZoneId(1), ZoneType::Heating);

        handle.send(Command::Register(record.clone())).unwrap();
        handle.send(Command::Register(DeviceRecord::new("VA1", HomeId(1), ZoneId(2), ZoneType::Heating))).unwrap();
        handle.send(Command::Update(DeviceRecord { zone_id: ZoneId(3), ..record })).unwrap();
        handle.send(Command::Unregister("VA1".into())).unwrap();
        handle.send(Command::Webhook("garbage".into())).unwrap();
        handle.send(Command::Shutdown).unwrap();
        run(&mut engine, rx);

        assert_eq!(engine.registry().len(), 1);
        assert_eq!(engine.registry().get("RU1").unwrap().zone_id, ZoneId(3));
        assert!(engine.api().calls().is_empty());
    }

    #[test]
    fn due_debounce_runs_a_pass_before_waiting() {
        let api = FakeApi::new();
        api.set_zones(HomeId(1), Vec::new());
        let mut engine = SyncEngine::new(api, Scheduler::new(Duration::ZERO, Duration::from_secs(3600)));
        let (handle, rx) = channel();

        handle.send(Command::Register(DeviceRecord::new("RU1", HomeId(1), ZoneId(1), ZoneType::Heating))).unwrap();
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let _ = handle.send(Command::Shutdown);
        });
        run(&mut engine, rx);
        worker.join().unwrap();

        assert_eq!(engine.api().count_calls("GET /homes/1/zones"), 1);
    }

    #[test]
    fn loop_exits_when_all_handles_are_dropped() {
        let mut engine = SyncEngine::new(FakeApi::new(), Scheduler::default());
        let (handle, rx) = channel();
        drop(handle);
        run(&mut engine, rx);
        assert!(engine.registry().is_empty());
    }
}
