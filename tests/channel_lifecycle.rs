//! Per-channel lifecycle tests over loopback TCP.
//!
//! Each test drives a single ServerManager with a simulated device and a
//! real client on 127.0.0.1, port 0.

#![cfg(feature = "mock")]

use rover_link::client::{ClientCommandSender, DistanceStream};
use rover_link::config::CameraConfig;
use rover_link::core::driver::{Actuator, CaptureDevice, VideoSink};
use rover_link::devices::mock::{MockCamera, MockRangeFinder, RecordingDrive};
use rover_link::server::{ChannelWorker, CommandWorker, SensorWorker, VideoWorker};
use rover_link::transport::{send_message, send_sentinel};
use rover_link::{Channel, Command, Error, Result, ServerManager, ServerState};
use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

/// Drive stuck inside its first command
struct StuckDrive {
    entered: Arc<AtomicBool>,
}

impl Actuator for StuckDrive {
    fn actuate(&mut self, _command: Command) -> Result<()> {
        self.entered.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_secs(3));
        Ok(())
    }
}

/// Camera that can fail to start or fail to close
struct FaultyCamera {
    fail_start: bool,
}

impl CaptureDevice for FaultyCamera {
    fn start_recording(&mut self, _sink: VideoSink) -> Result<()> {
        if self.fail_start {
            return Err(Error::CaptureUnavailable("no camera attached".to_string()));
        }
        Ok(())
    }

    fn wait_recording(&mut self, timeout: Duration) -> Result<()> {
        thread::sleep(timeout.min(Duration::from_millis(20)));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Err(Error::Other("camera close failed".to_string()))
    }
}

fn worker_for(channel: Channel) -> Box<dyn ChannelWorker> {
    match channel {
        Channel::Video => Box::new(VideoWorker::new(Box::new(MockCamera::new(
            CameraConfig::default(),
        )))),
        Channel::DistanceSensor => Box::new(
            SensorWorker::new(Box::new(MockRangeFinder::scripted(vec![50, 51])))
                .with_interval(Duration::from_millis(10)),
        ),
        Channel::Command => Box::new(CommandWorker::new(Box::new(RecordingDrive::new()))),
    }
}

/// Listen, connect a client, then start the worker
fn connected(channel: Channel, worker: Box<dyn ChannelWorker>) -> (ServerManager, TcpStream) {
    let mut manager = ServerManager::new(channel, loopback());
    let addr = manager.listen().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    manager.start(worker).unwrap();
    (manager, client)
}

#[test]
fn test_shutdown_returns_and_port_rebinds_on_every_channel() {
    for channel in Channel::ALL {
        let (mut manager, _client) = connected(channel, worker_for(channel));
        let addr = manager.local_addr().unwrap();
        assert_eq!(manager.state(), ServerState::Connected);
        assert!(manager.peer_addr().is_some());

        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        manager.shutdown().unwrap();
        assert!(started.elapsed() < Duration::from_secs(3), "{} shutdown hung", channel);
        assert_eq!(manager.state(), ServerState::Closed);

        TcpListener::bind(addr).unwrap_or_else(|e| panic!("{} port still held: {}", channel, e));

        // Second call is a no-op
        manager.shutdown().unwrap();
    }
}

#[test]
fn test_commands_dispatch_in_fifo_order() {
    let drive = RecordingDrive::new();
    let mut manager = ServerManager::new(Channel::Command, loopback());
    let addr = manager.listen().unwrap();

    let sender = ClientCommandSender::connect(addr).unwrap();
    manager
        .start(Box::new(CommandWorker::new(Box::new(drive.clone()))))
        .unwrap();

    sender.forward();
    sender.left();
    sender.stop();
    sender.shutdown().unwrap();

    assert!(wait_until(Duration::from_secs(2), || manager.is_worker_finished()));
    assert_eq!(
        drive.commands(),
        vec![Command::Forward, Command::Left, Command::Stop]
    );
    manager.shutdown().unwrap();
}

#[test]
fn test_unknown_command_keeps_worker_alive() {
    let drive = RecordingDrive::new();
    let (mut manager, mut client) = connected(
        Channel::Command,
        Box::new(CommandWorker::new(Box::new(drive.clone()))),
    );

    send_message(&mut client, "jump").unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(!manager.is_worker_finished());

    send_message(&mut client, "stop").unwrap();
    assert!(wait_until(Duration::from_secs(2), || drive.last()
        == Some(Command::Stop)));
    assert!(!manager.is_worker_finished());

    send_sentinel(&client).unwrap();
    assert!(wait_until(Duration::from_secs(2), || manager.is_worker_finished()));
    assert_eq!(drive.commands(), vec![Command::Stop]);
    manager.shutdown().unwrap();
}

#[test]
fn test_sentinel_ends_only_its_channel() {
    let (mut sensor, sensor_client) = connected(
        Channel::DistanceSensor,
        worker_for(Channel::DistanceSensor),
    );
    let drive = RecordingDrive::new();
    let (mut command, command_client) = connected(
        Channel::Command,
        Box::new(CommandWorker::new(Box::new(drive.clone()))),
    );

    let mut samples = DistanceStream::from_stream(sensor_client);
    samples.set_timeout(Some(Duration::from_secs(2))).unwrap();
    let sender = ClientCommandSender::from_stream(command_client).unwrap();

    // Operator finishes with the command channel
    sender.stop();
    sender.shutdown().unwrap();
    assert!(wait_until(Duration::from_secs(2), || command.is_worker_finished()));
    assert_eq!(drive.commands(), vec![Command::Stop]);

    // Sensor channel keeps streaming. Samples queued while nobody read may
    // arrive coalesced, so only liveness is checked here.
    assert!(!sensor.is_worker_finished());
    assert!(matches!(
        samples.recv(),
        Ok(Some(_)) | Err(Error::MalformedSample(_))
    ));

    // Field unit ends the sensor stream; the client sees end of stream
    sensor.shutdown().unwrap();
    let mut ended = false;
    for _ in 0..10_000 {
        match samples.recv() {
            Ok(Some(_)) | Err(Error::MalformedSample(_)) => {}
            Ok(None) => {
                ended = true;
                break;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert!(ended);

    command.shutdown().unwrap();
}

#[test]
fn test_worker_for_other_channel_is_rejected() {
    let mut manager = ServerManager::new(Channel::Video, loopback());
    manager.listen().unwrap();
    assert!(
        manager
            .start(worker_for(Channel::Command))
            .is_err()
    );
    manager.shutdown().unwrap();
}

#[test]
fn test_unknown_word_containing_mnemonic_moves_nothing() {
    let drive = RecordingDrive::new();
    let (mut manager, mut client) = connected(
        Channel::Command,
        Box::new(CommandWorker::new(Box::new(drive.clone()))),
    );

    send_message(&mut client, "leftturn").unwrap();
    thread::sleep(Duration::from_millis(100));
    send_message(&mut client, "stop").unwrap();
    send_sentinel(&client).unwrap();

    assert!(wait_until(Duration::from_secs(2), || manager.is_worker_finished()));
    assert_eq!(drive.commands(), vec![Command::Stop]);
    manager.shutdown().unwrap();
}

#[test]
fn test_stuck_worker_escalates_to_shutdown_timeout() {
    let entered = Arc::new(AtomicBool::new(false));
    let drive = StuckDrive {
        entered: Arc::clone(&entered),
    };
    let grace = Duration::from_millis(300);

    let mut manager = ServerManager::new(Channel::Command, loopback()).with_grace_period(grace);
    let addr = manager.listen().unwrap();
    let mut client = TcpStream::connect(addr).unwrap();
    manager
        .start(Box::new(CommandWorker::new(Box::new(drive))))
        .unwrap();

    send_message(&mut client, "fwd").unwrap();
    assert!(wait_until(Duration::from_secs(2), || entered.load(Ordering::SeqCst)));

    let started = Instant::now();
    let result = manager.shutdown();
    let took = started.elapsed();

    match result {
        Err(Error::ShutdownTimeout { channel, grace: g }) => {
            assert_eq!(channel, Channel::Command);
            assert_eq!(g, grace);
        }
        other => panic!("expected shutdown timeout, got {:?}", other),
    }
    assert!(took < grace + Duration::from_millis(900), "shutdown took {:?}", took);
    assert_eq!(manager.state(), ServerState::Closed);

    TcpListener::bind(addr).unwrap();
}

#[test]
fn test_failed_release_still_closes_connection_and_listener() {
    let (mut manager, mut client) = connected(
        Channel::Video,
        Box::new(VideoWorker::new(Box::new(FaultyCamera { fail_start: false }))),
    );
    let addr = manager.local_addr().unwrap();

    manager.shutdown().unwrap();

    client
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(client.read(&mut buf).unwrap(), 0);

    TcpListener::bind(addr).unwrap();
}

#[test]
fn test_worker_error_surfaces_on_shutdown() {
    let (mut manager, _client) = connected(
        Channel::Video,
        Box::new(VideoWorker::new(Box::new(FaultyCamera { fail_start: true }))),
    );
    let addr = manager.local_addr().unwrap();

    assert!(wait_until(Duration::from_secs(2), || manager.is_worker_finished()));
    assert!(matches!(
        manager.shutdown(),
        Err(Error::CaptureUnavailable(_))
    ));

    TcpListener::bind(addr).unwrap();
}
