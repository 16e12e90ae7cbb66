//! Periodic `time=<ms>` datagram sender.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use log::{debug, info};
use tslatency_protocol::TimestampMessage;

use crate::clock::wall_clock_millis;
use crate::config::SenderConfig;
use crate::error::LatencyError;
use crate::signal::StopFlag;

/// What a finished sender run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendSummary {
    pub sent: u64,
    pub elapsed: Duration,
}

/// Send timestamp datagrams until interrupted or a configured bound is hit.
///
/// The socket lives for the duration of this call and is closed on return.
/// A failed send is fatal.
pub fn run(config: &SenderConfig, stop: &StopFlag) -> Result<SendSummary, LatencyError> {
    let bind_addr: SocketAddr = if config.target.is_ipv6() {
        SocketAddr::from(([0u16; 8], 0))
    } else {
        SocketAddr::from(([0, 0, 0, 0], 0))
    };
    let socket = UdpSocket::bind(bind_addr).map_err(|source| LatencyError::Bind {
        addr: bind_addr.to_string(),
        source,
    })?;

    info!(
        "Sending timestamps to {} every {:?}",
        config.target, config.interval
    );
    if let Some(count) = config.count {
        info!("  Stop after {} datagrams", count);
    }
    if let Some(duration) = config.duration {
        info!("  Stop after {:?}", duration);
    }

    let started = Instant::now();
    let mut sent = 0u64;

    while !stop.is_stopped() {
        if config.count.map_or(false, |max| sent >= max) {
            break;
        }
        if config.duration.map_or(false, |d| started.elapsed() >= d) {
            break;
        }

        let message = TimestampMessage::from_millis(wall_clock_millis());
        socket
            .send_to(&message.encode(), config.target)
            .map_err(|source| LatencyError::Send {
                addr: config.target.to_string(),
                source,
            })?;
        sent += 1;
        debug!("sent {}", message);

        if !stop.sleep(config.interval) {
            break;
        }
    }

    let summary = SendSummary {
        sent,
        elapsed: started.elapsed(),
    };
    info!("Sent {} datagrams in {:?}", summary.sent, summary.elapsed);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_receiver() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        socket
    }

    #[test]
    fn test_sends_exact_count() {
        let receiver = loopback_receiver();
        let config = SenderConfig {
            target: receiver.local_addr().unwrap(),
            interval: Duration::from_millis(1),
            count: Some(5),
            duration: None,
        };

        let before = wall_clock_millis();
        let summary = run(&config, &StopFlag::new()).unwrap();
        assert_eq!(summary.sent, 5);

        let mut buf = [0u8; 64];
        for _ in 0..5 {
            let (len, _) = receiver.recv_from(&mut buf).unwrap();
            let message = TimestampMessage::decode(&buf[..len]).unwrap();
            assert!(message.millis() >= before);
            assert!(message.millis() <= wall_clock_millis());
        }
    }

    #[test]
    fn test_duration_bounds_datagram_count() {
        let receiver = loopback_receiver();
        let config = SenderConfig {
            target: receiver.local_addr().unwrap(),
            interval: Duration::from_millis(20),
            count: None,
            duration: Some(Duration::from_millis(200)),
        };

        let summary = run(&config, &StopFlag::new()).unwrap();
        // D / i = 10
        assert!(summary.sent >= 1);
        assert!(summary.sent <= 11, "sent {}", summary.sent);
        assert!(summary.elapsed >= Duration::from_millis(200));
    }

    #[test]
    fn test_stop_before_start() {
        let receiver = loopback_receiver();
        let config = SenderConfig {
            target: receiver.local_addr().unwrap(),
            ..Default::default()
        };
        let stop = StopFlag::new();
        stop.stop();

        assert_eq!(run(&config, &stop).unwrap().sent, 0);
    }

    #[test]
    fn test_stop_while_running() {
        let receiver = loopback_receiver();
        let config = SenderConfig {
            target: receiver.local_addr().unwrap(),
            ..Default::default()
        };
        let stop = StopFlag::new();
        let remote = stop.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            remote.stop();
        });

        let summary = run(&config, &stop).unwrap();
        handle.join().unwrap();
        assert!(summary.sent >= 1);
        assert!(summary.elapsed < Duration::from_secs(5));
    }
}
