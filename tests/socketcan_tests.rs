#![cfg(all(target_os = "linux", feature = "test-vcan"))]
use std::time::{Duration, Instant};

use obd_emulator::ecu::{Ecu, EcuConfig};
use obd_emulator::socketcan::SocketCanController;
use obd_emulator::vehicle::VehicleHandle;
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Id, Socket, StandardId};

static INTERFACE: &str = "vcan0";
static RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

fn tester() -> CanSocket {
    CanSocket::open(INTERFACE).unwrap()
}

fn send(socket: &CanSocket, id: u16, data: &[u8]) {
    let frame = CanFrame::new(StandardId::new(id).unwrap(), data).unwrap();
    socket.write_frame(&frame).unwrap();
}

fn recv_response(socket: &CanSocket) -> Vec<u8> {
    let start = Instant::now();
    while start.elapsed() < RESPONSE_TIMEOUT {
        if let Ok(CanFrame::Data(frame)) = socket.read_frame_timeout(RESPONSE_TIMEOUT) {
            if frame.id() == Id::Standard(StandardId::new(0x7e8).unwrap()) {
                return frame.data().to_vec();
            }
        }
    }
    panic!("no response");
}

fn config() -> EcuConfig {
    EcuConfig {
        self_test: false,
        ..Default::default()
    }
}

#[tokio::test]
#[serial_test::serial]
async fn vcan_speed_query() {
    let tester = tester();
    let vehicle = VehicleHandle::default();
    vehicle.set_field("speed", "85");

    let ecu = Ecu::start(SocketCanController::new(INTERFACE), config(), vehicle.reader()).unwrap();

    send(&tester, 0x7df, &[0x02, 0x01, 0x0d, 0x00, 0x00, 0x00, 0x00, 0x00]);
    let data = tokio::task::spawn_blocking(move || recv_response(&tester)).await.unwrap();
    assert_eq!(data, vec![0x03, 0x41, 0x0d, 85, 0x00, 0x00, 0x00, 0x00]);

    ecu.shutdown().await.unwrap();
}

#[tokio::test]
#[serial_test::serial]
async fn vcan_vin_query() {
    let tester = tester();
    let vehicle = VehicleHandle::default();
    let ecu = Ecu::start(SocketCanController::new(INTERFACE), config(), vehicle.reader()).unwrap();

    send(&tester, 0x7df, &[0x02, 0x09, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00]);
    let (tester, first) = tokio::task::spawn_blocking(move || {
        let data = recv_response(&tester);
        (tester, data)
    })
    .await
    .unwrap();
    assert_eq!(&first[..5], &[0x10, 0x14, 0x49, 0x02, 0x01]);

    send(&tester, 0x7e0, &[0x30, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    let consecutive = tokio::task::spawn_blocking(move || [recv_response(&tester), recv_response(&tester)])
        .await
        .unwrap();
    assert_eq!(consecutive[0][0], 0x21);
    assert_eq!(consecutive[1][0], 0x22);

    ecu.shutdown().await.unwrap();
}
