//! Control services over real TCP sockets

use std::sync::Arc;
use std::time::Duration;

use linrad_bridge::config::ServicesConfig;
use linrad_bridge::control::{
    ControlServices, LinradParams, MemoryPtt, ParamServer, PttLine, RigctlServer, Watchdog,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn linrad_handshake_then_ignored_bytes() {
    let server = ParamServer::bind("127.0.0.1:0".parse().unwrap(), LinradParams::iq(2e6))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(server.run(cancel.clone()));

    let mut client = TcpStream::connect(addr).await.unwrap();

    // Unknown requests get no reply, so the next reply is for 0xB5
    client.write_all(&[0x42]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.write_all(&[0xB5]).await.unwrap();
    let mut ack = [0xFFu8; 1];
    client.read_exact(&mut ack).await.unwrap();
    assert_eq!(ack, [0]);

    client.write_all(&[0xB8]).await.unwrap();
    let mut block = [0u8; 32];
    client.read_exact(&mut block).await.unwrap();
    let words: Vec<i32> =
        block.chunks_exact(4).map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
    assert_eq!(words, vec![2_000_000, 2, 1, 4, 4096, 0, 0, 0]);

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn rigctl_session_keys_and_reads_ptt() {
    let ptt = Arc::new(MemoryPtt::new());
    let server = RigctlServer::bind("127.0.0.1:0".parse().unwrap(), ptt.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(server.run(cancel.clone()));

    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    for (command, reply) in [("T 1\n", "RPRT 0\n"), ("t\n", "1\n"), ("T 0\n", "RPRT 0\n"), ("t\n", "0\n")] {
        writer.write_all(command.as_bytes()).await.unwrap();
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, reply, "reply to {:?}", command);
    }

    writer.write_all(b"m\n").await.unwrap();
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, "USB\n");
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, "15000\n");

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn watchdog_releases_stuck_ptt() {
    let ptt = Arc::new(MemoryPtt::new());
    ptt.set(true).unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(
        Watchdog::new(ptt.clone(), Duration::from_secs(60))
            .with_poll(Duration::from_millis(500))
            .run(cancel.clone()),
    );

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(ptt.is_keyed().unwrap());
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!ptt.is_keyed().unwrap());

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn services_start_from_config_and_force_ptt_off() {
    let dir = tempfile::tempdir().unwrap();
    let gpio = dir.path().join("value");
    std::fs::write(&gpio, "1\n").unwrap();

    let mut config = ServicesConfig::default();
    config.params.enabled = true;
    config.params.listen = "127.0.0.1:0".parse().unwrap();
    config.rigctl.enabled = true;
    config.rigctl.listen = "127.0.0.1:0".parse().unwrap();
    config.rigctl.gpio = gpio.clone();

    let cancel = CancellationToken::new();
    let services = ControlServices::start(&config, 2e6, cancel.clone()).await.unwrap();
    assert_eq!(services.len(), 3);
    assert_eq!(std::fs::read_to_string(&gpio).unwrap(), "0\n");

    cancel.cancel();
    services.join().await;
}

#[tokio::test]
async fn disabled_services_start_nothing() {
    let services =
        ControlServices::start(&ServicesConfig::default(), 2e6, CancellationToken::new()).await.unwrap();
    assert!(services.is_empty());
    services.join().await;
}
