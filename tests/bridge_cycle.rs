//! End-to-end bridge cycles over a loopback UDP socket

use std::collections::VecDeque;
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use linrad_bridge::linrad::{FRAMES_PER_PACKET, PACKET_SIZE, UdpOptions};
use linrad_bridge::{
    Bridge, BridgeConfig, BridgeMode, Frame, LinradBridge, LinradPacket, Result, RxEndpoint,
    StreamEndpoint, StreamStatus, TerminationReason, UdpTransport,
};
use tokio_util::sync::CancellationToken;

/// Receive endpoint serving a fixed list of frames in small chunks.
struct ChunkedRx {
    frames: VecDeque<Frame>,
    chunk: usize,
}

impl StreamEndpoint for ChunkedRx {
    fn status(&mut self) -> Result<StreamStatus> {
        Ok(StreamStatus { filled: self.frames.len().min(4096), capacity: 4096, ..Default::default() })
    }

    fn teardown(&mut self) -> Result<()> {
        Ok(())
    }
}

impl RxEndpoint for ChunkedRx {
    fn pull(&mut self, buf: &mut [Frame], _timeout: Duration) -> Result<usize> {
        let n = buf.len().min(self.chunk).min(self.frames.len());
        for (slot, frame) in buf.iter_mut().zip(self.frames.drain(..n)) {
            *slot = frame;
        }
        Ok(n)
    }
}

fn listener() -> (UdpSocket, SocketAddrV4) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let port = socket.local_addr().unwrap().port();
    (socket, SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))
}

fn receive_packet(socket: &UdpSocket) -> LinradPacket {
    let mut buf = [0u8; 2048];
    let n = socket.recv(&mut buf).unwrap();
    assert_eq!(n, PACKET_SIZE);
    LinradPacket::decode(&buf[..n]).unwrap()
}

fn sample(k: usize) -> Frame {
    Frame::new((k * 16) as i16, -((k * 16) as i16))
}

#[test]
fn three_cycles_over_loopback() {
    let (socket, addr) = listener();
    let input: Vec<Frame> = (0..3 * FRAMES_PER_PACKET).map(sample).collect();
    let rx = ChunkedRx { frames: input.iter().copied().collect(), chunk: 100 };
    let transport = UdpTransport::open(addr, UdpOptions::default()).unwrap();

    let summary = Bridge::builder(Box::new(rx), Box::new(transport))
        .center_mhz(432.0)
        .cycle_limit(3)
        .build()
        .run();
    assert!(matches!(summary.reason, TerminationReason::CycleLimit));
    assert_eq!(summary.packets_sent, 3);

    let sequence = [(1392u32, 0u16), (2784, 1), (80, 2)];
    for (n, (ptr, block_no)) in sequence.into_iter().enumerate() {
        let packet = receive_packet(&socket);
        assert_eq!(packet.ptr, ptr);
        assert_eq!(packet.block_no, block_no);
        assert_eq!(packet.userx_no, -1);
        assert_eq!(packet.passband_direction, 1);
        assert_eq!(packet.passband_center, 432.0);

        let expected: Vec<Frame> = input[n * FRAMES_PER_PACKET..(n + 1) * FRAMES_PER_PACKET]
            .iter()
            .map(|f| Frame::new(f.i | 8, f.q | 8))
            .collect();
        assert_eq!(packet.payload.to_vec(), expected);
    }
}

fn write_capture(frames: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for k in 0..frames {
        file.write_all(&sample(k).to_le_bytes()).unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn receive_only_replay_from_config() {
    let (socket, addr) = listener();
    let capture = write_capture(FRAMES_PER_PACKET);

    let mut config = BridgeConfig::default();
    config.mode = BridgeMode::ReceiveOnly;
    config.radio.rx.frequency_hz = 1296.1e6;
    config.linrad.destination = Some(*addr.ip());
    config.linrad.port = addr.port();
    config.endpoints.replay = Some(capture.path().to_path_buf());
    config.cycle_limit = Some(2);

    let bridge = LinradBridge::from_config(&config, CancellationToken::new()).unwrap();
    assert_eq!(bridge.mode(), BridgeMode::ReceiveOnly);
    let summary = bridge.run();
    assert!(summary.is_clean(), "{:?}", summary.error());
    assert!(summary.tx_totals.is_none());

    let first = receive_packet(&socket);
    let second = receive_packet(&socket);
    assert!((first.passband_center - 1296.1).abs() < 1e-9);
    assert_eq!((first.block_no, second.block_no), (0, 1));
    // The capture loops, so both packets carry the same samples
    assert_eq!(first.payload, second.payload);
    assert_eq!(first.payload[1], Frame::new(16 | 8, -16 | 8));
}

#[test]
fn duplex_records_what_the_fifo_delivered() {
    let (socket, addr) = listener();
    let capture = write_capture(FRAMES_PER_PACKET);
    let dir = tempfile::tempdir().unwrap();
    let fifo = dir.path().join("txfifo");
    let record = dir.path().join("tx.iq");

    let tx_frames: Vec<Frame> = (0..10).map(|k| Frame::new(k, k + 100)).collect();
    let tx_bytes: Vec<u8> = tx_frames.iter().flat_map(|f| f.to_le_bytes()).collect();
    std::fs::write(&fifo, &tx_bytes).unwrap();

    let mut config = BridgeConfig::default();
    config.radio.rx.frequency_hz = 144.3e6;
    config.radio.tx.frequency_hz = 144.3e6;
    config.linrad.destination = Some(*addr.ip());
    config.linrad.port = addr.port();
    config.transmit.fifo = fifo;
    config.endpoints.replay = Some(capture.path().to_path_buf());
    config.endpoints.sink_record = Some(record.clone());
    config.cycle_limit = Some(2);

    let summary = LinradBridge::from_config(&config, CancellationToken::new()).unwrap().run();
    assert!(summary.is_clean(), "{:?}", summary.error());
    assert_eq!(summary.frames_fed, 10);
    assert!(summary.tx_totals.is_some());

    assert_eq!(std::fs::read(&record).unwrap(), tx_bytes);
    assert_eq!(receive_packet(&socket).block_no, 0);
}

#[test]
fn missing_fifo_is_a_configuration_error() {
    let capture = write_capture(FRAMES_PER_PACKET);
    let mut config = BridgeConfig::default();
    config.radio.rx.frequency_hz = 144.3e6;
    config.radio.tx.frequency_hz = 144.3e6;
    config.transmit.fifo = "/nonexistent/txfifo".into();
    config.endpoints.replay = Some(capture.path().to_path_buf());

    let err = LinradBridge::from_config(&config, CancellationToken::new()).err().unwrap();
    assert_eq!(err.class(), linrad_bridge::ErrorClass::Configuration);
}
