use std::io::Write as _;
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ledmx_core::protocol::LED_COUNT;
use ledmx_core::RGB8;
use ledmx_host::aggregator::{ResponseAggregator, SILENCE_WINDOW};
use ledmx_host::client::{MatrixClient, MatrixEvent};
use ledmx_host::error::ClientError;
use ledmx_host::store::MemoryStore;
use ledmx_host::transport::Connect;

// -- plumbing ---------------------------------------------------------------

/// Loopback pair: the host side gets a bounded read timeout, the device
/// side is handed to the firmware (or left dangling for timeout tests).
fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let host = TcpStream::connect(addr).unwrap();
    host.set_read_timeout(Some(Duration::from_millis(10)))
        .unwrap();
    host.set_nodelay(true).unwrap();
    let (device, _) = listener.accept().unwrap();
    (host, device)
}

fn spawn_firmware(device: TcpStream) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let _ = mock_matrix::run_connection(device);
    })
}

/// Hands out a pre-built loopback stream for whatever device id the
/// client asks for.
struct TestConnector {
    link: Option<TcpStream>,
}

impl Connect for TestConnector {
    type Link = TcpStream;

    fn open(&mut self, _device: &str) -> Result<TcpStream, ClientError> {
        self.link
            .take()
            .ok_or_else(|| ClientError::Io(std::io::Error::other("loopback already consumed")))
    }
}

fn last_error_event(events: &Receiver<MatrixEvent>) -> Option<Option<String>> {
    let mut last = None;
    while let Ok(event) = events.try_recv() {
        if let MatrixEvent::LastError(e) = event {
            last = Some(e);
        }
    }
    last
}

// -- aggregator -------------------------------------------------------------

#[test]
fn publishes_once_after_the_silence_window() {
    let (host, mut device) = loopback_pair();
    let aggregator = ResponseAggregator::start(Arc::new(Mutex::new(host)), SILENCE_WINDOW);

    let started = Instant::now();
    device.write_all(&[0x01]).unwrap();

    let message = aggregator
        .await_message(Duration::from_millis(500))
        .unwrap();
    assert_eq!(message, vec![0x01]);
    assert!(started.elapsed() >= SILENCE_WINDOW);

    // continued silence publishes nothing further
    assert!(matches!(
        aggregator.await_message(Duration::from_millis(150)),
        Err(ClientError::Timeout)
    ));
}

#[test]
fn coalesces_bursts_inside_the_window() {
    let (host, mut device) = loopback_pair();
    let aggregator = ResponseAggregator::start(Arc::new(Mutex::new(host)), SILENCE_WINDOW);

    let started = Instant::now();
    device.write_all(&[0x01]).unwrap();
    thread::sleep(Duration::from_millis(10));
    device.write_all(&[0x00, 0xAA]).unwrap();

    let message = aggregator
        .await_message(Duration::from_millis(500))
        .unwrap();
    assert_eq!(message, vec![0x01, 0x00, 0xAA]);
    // the silence window restarts at the second burst
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[test]
fn reset_discards_stale_bytes_and_messages() {
    let (host, mut device) = loopback_pair();
    let aggregator = ResponseAggregator::start(Arc::new(Mutex::new(host)), SILENCE_WINDOW);

    device.write_all(&[0xDE, 0xAD]).unwrap();
    thread::sleep(Duration::from_millis(120));
    aggregator.reset();

    device.write_all(&[0x02, 0x00]).unwrap();
    let message = aggregator
        .await_message(Duration::from_millis(500))
        .unwrap();
    assert_eq!(message, vec![0x02, 0x00]);
}

#[test]
fn a_closed_transport_reads_as_disconnected() {
    let (host, device) = loopback_pair();
    let aggregator = ResponseAggregator::start(Arc::new(Mutex::new(host)), SILENCE_WINDOW);

    drop(device);
    let result = aggregator.await_message(Duration::from_millis(200));
    assert!(matches!(result, Err(ClientError::Disconnected)));
    assert!(!aggregator.is_alive());
}

// -- end to end against the real firmware -----------------------------------

#[test]
fn write_all_round_trip_clears_the_error_state() {
    let (host, device) = loopback_pair();
    let _firmware = spawn_firmware(device);
    let (mut client, events) = MatrixClient::new(
        TestConnector { link: Some(host) },
        Box::new(MemoryStore::default()),
    );

    client.select_device("loopback").unwrap();

    let red = RGB8 { r: 255, g: 0, b: 0 };
    let all: Vec<u8> = (0..LED_COUNT as u8).collect();
    client.set_local_color(&all, red);
    client.send_colors(&all).unwrap();

    client.refresh().unwrap();
    assert!(client.leds().iter().all(|led| led.color == red));
    assert_eq!(last_error_event(&events), Some(None));
}

#[test]
fn single_record_write_round_trips() {
    let (host, device) = loopback_pair();
    let _firmware = spawn_firmware(device);
    let (mut client, _events) = MatrixClient::new(
        TestConnector { link: Some(host) },
        Box::new(MemoryStore::default()),
    );

    client.select_device("loopback").unwrap();

    let green = RGB8 { r: 0, g: 200, b: 0 };
    client.set_local_color(&[5], green);
    client.send_colors(&[5]).unwrap();

    client.refresh().unwrap();
    assert_eq!(client.leds()[5].color, green);

    // the device is quiescent after a write: repeated reads agree
    let snapshot = client.leds();
    client.refresh().unwrap();
    assert_eq!(client.leds(), snapshot);
}

#[test]
fn a_silent_device_times_out_with_a_user_visible_message() {
    let (host, _device) = loopback_pair();
    let (mut client, events) = MatrixClient::new(
        TestConnector { link: Some(host) },
        Box::new(MemoryStore::default()),
    );

    client.select_device("loopback").unwrap();

    let started = Instant::now();
    let err = client.send_colors(&[0]).unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(matches!(err, ClientError::Timeout));
    assert_eq!(err.to_string(), "Timeout");
    assert_eq!(last_error_event(&events), Some(Some("Timeout".to_string())));
}
