//! operator - drives the robot from a terminal
//!
//! ```text
//! operator [--config <path>]
//! ```
//!
//! Keys (one per line): `w` forward, `s` backward, `a` left, `d` right,
//! `q` rotate left, `e` rotate right, `h` stop, space or `x` quit.
//! Distance samples are logged as they arrive; video throughput is
//! reported on exit.

use crossbeam_channel::{Receiver, TryRecvError, unbounded};
use rover_link::client::{ClientCommandSender, ClientStreamReader, DistanceStream};
use rover_link::config::{Config, parse_config_path};
use rover_link::{Channel, Command, Error, FpsTimer, Result, ShutdownSignal};
use std::env;
use std::io::{self, BufRead};
use std::thread;
use std::time::Duration;

/// Control loop period
const LOOP_INTERVAL: Duration = Duration::from_millis(20);

/// Longest the loop waits for a distance sample
const SAMPLE_WAIT: Duration = Duration::from_millis(10);

/// What a key line asks for
enum Key {
    Drive(Command),
    Quit,
}

fn parse_key(line: &str) -> Option<Key> {
    if line == " " || line.trim() == "x" {
        return Some(Key::Quit);
    }
    let command = match line.trim() {
        "w" => Command::Forward,
        "s" => Command::Backward,
        "a" => Command::Left,
        "d" => Command::Right,
        "q" => Command::RotateLeft,
        "e" => Command::RotateRight,
        "h" => Command::Stop,
        _ => return None,
    };
    Some(Key::Drive(command))
}

/// Forward stdin lines; the channel disconnects at end of input
fn spawn_keyboard() -> Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("keyboard".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .map_err(|e| Error::Other(format!("Failed to spawn keyboard thread: {}", e)))?;
    Ok(rx)
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = Config::load_or_default(parse_config_path(&args).as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("rover-link operator v{} starting...", env!("CARGO_PKG_VERSION"));

    let quit = ShutdownSignal::new();
    let quit_handler = quit.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        quit_handler.set();
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let network = &config.network;
    let mut video = if config.channels.camera {
        Some(ClientStreamReader::open(network.robot_addr(Channel::Video))?)
    } else {
        None
    };
    let commands = if config.channels.remote_control {
        Some(ClientCommandSender::connect(network.robot_addr(Channel::Command))?)
    } else {
        None
    };
    let mut distances = if config.channels.distance_sensor {
        let mut stream = DistanceStream::connect(network.robot_addr(Channel::DistanceSensor))?;
        stream.set_timeout(Some(SAMPLE_WAIT))?;
        Some(stream)
    } else {
        None
    };

    let keys = spawn_keyboard()?;
    let mut fps = FpsTimer::new();
    fps.start();
    let mut last_frame = None;

    log::info!("Operator ready: w/s/a/d move, q/e rotate, h stop, x quit");

    while !quit.is_set() {
        match keys.try_recv() {
            Ok(line) => match parse_key(&line) {
                Some(Key::Quit) => break,
                Some(Key::Drive(command)) => match &commands {
                    Some(sender) => sender.send(command),
                    None => log::warn!("Command channel disabled, ignoring {}", command),
                },
                None => log::debug!("Ignoring key {:?}", line),
            },
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        if let Some(reader) = &video {
            let (frame, live) = reader.read();
            if last_frame != Some(frame.index()) {
                last_frame = Some(frame.index());
                fps.update();
            }
            if !live {
                log::warn!("Video stream ended");
                video = None;
            }
        }

        if let Some(stream) = distances.as_mut() {
            match stream.recv() {
                Ok(Some(sample)) => log::info!("Distance: {} cm", sample.0),
                Ok(None) => {
                    log::warn!("Distance stream ended");
                    distances = None;
                }
                Err(Error::Timeout) => {}
                Err(e) => log::warn!("Distance sample skipped: {}", e),
            }
        }

        thread::sleep(LOOP_INTERVAL);
    }

    fps.stop();
    if let Some(rate) = fps.fps() {
        log::info!("Video: {} frames, {:.1} fps", fps.frames(), rate);
    }

    log::info!("Shutting down...");
    if let Some(sender) = commands {
        sender.shutdown()?;
    }
    if let Some(mut reader) = video {
        reader.release()?;
    }
    drop(distances);
    log::info!("Operator stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert!(matches!(parse_key("w"), Some(Key::Drive(Command::Forward))));
        assert!(matches!(parse_key("q\n"), Some(Key::Drive(Command::RotateLeft))));
        assert!(matches!(parse_key("h"), Some(Key::Drive(Command::Stop))));
        assert!(matches!(parse_key(" "), Some(Key::Quit)));
        assert!(matches!(parse_key("x"), Some(Key::Quit)));
        assert!(parse_key("z").is_none());
    }
}
