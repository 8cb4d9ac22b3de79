use std::sync::Arc;
use std::time::{Duration, Instant};

use obd_emulator::can::{Alerts, BusState, Frame, VirtualBus};
use obd_emulator::ecu::{Ecu, EcuConfig};
use obd_emulator::vehicle::VehicleHandle;

static WAIT_TIMEOUT: Duration = Duration::from_secs(2);

fn config() -> EcuConfig {
    EcuConfig {
        rx_poll_timeout: Duration::from_millis(10),
        self_test: false,
        ..Default::default()
    }
}

async fn wait_for(condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while !condition() {
        if start.elapsed() > WAIT_TIMEOUT {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    true
}

fn query(mode: u8, pid: u8) -> Frame {
    Frame::new(0x7df.into(), &[0x02, mode, pid, 0x55, 0x55, 0x55, 0x55, 0x55]).unwrap()
}

#[tokio::test]
async fn self_test_frame() {
    let bus = Arc::new(VirtualBus::new());
    let vehicle = VehicleHandle::default();
    vehicle.set_field("speed", "85");

    let config = EcuConfig {
        self_test: true,
        ..config()
    };
    let ecu = Ecu::start(bus.clone(), config, vehicle.reader()).unwrap();

    let transmitted = bus.transmitted();
    assert_eq!(transmitted.len(), 1);
    assert_eq!(transmitted[0].data(), &[0x03, 0x41, 0x0d, 85, 0x00, 0x00, 0x00, 0x00]);

    ecu.shutdown().await.unwrap();
}

#[tokio::test]
async fn answers_speed_query() {
    let bus = Arc::new(VirtualBus::new());
    let vehicle = VehicleHandle::default();
    let ecu = Ecu::start(bus.clone(), config(), vehicle.reader()).unwrap();

    vehicle.set_field("speed", "85");
    bus.inject(&query(0x01, 0x0d));

    assert!(wait_for(|| bus.transmitted().len() == 1).await);
    assert_eq!(
        bus.transmitted()[0].data(),
        &[0x03, 0x41, 0x0d, 85, 0x00, 0x00, 0x00, 0x00]
    );

    ecu.shutdown().await.unwrap();
}

#[tokio::test]
async fn vin_with_flow_control() {
    let bus = Arc::new(VirtualBus::new());
    let vehicle = VehicleHandle::default();
    let ecu = Ecu::start(bus.clone(), config(), vehicle.reader()).unwrap();

    bus.inject(&query(0x09, 0x02));
    assert!(wait_for(|| bus.transmitted().len() == 1).await);
    assert_eq!(&bus.transmitted()[0].data()[..5], &[0x10, 0x14, 0x49, 0x02, 0x01]);

    bus.inject(&Frame::new(0x7e0.into(), &[0x30, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap());
    assert!(wait_for(|| bus.transmitted().len() == 3).await);

    let pci: Vec<u8> = bus.transmitted().iter().map(|frame| frame.data()[0]).collect();
    assert_eq!(pci, vec![0x10, 0x21, 0x22]);

    ecu.shutdown().await.unwrap();
}

#[tokio::test]
async fn recovers_from_bus_off() {
    let bus = Arc::new(VirtualBus::new());
    let vehicle = VehicleHandle::default();
    let ecu = Ecu::start(bus.clone(), config(), vehicle.reader()).unwrap();

    bus.raise(Alerts::BUS_OFF);
    assert!(wait_for(|| ecu.transport().state() == BusState::Recovering).await);
    assert_eq!(bus.calls().recovery, 1);
    assert_eq!(ecu.diagnostics().unwrap().status.state, BusState::Recovering);

    bus.raise(Alerts::BUS_RECOVERED);
    assert!(wait_for(|| ecu.transport().state() == BusState::Running).await);
    assert_eq!(bus.calls().recovery, 1);

    bus.inject(&query(0x01, 0x0d));
    assert!(wait_for(|| bus.transmitted().len() == 1).await);

    ecu.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_releases_controller() {
    let bus = Arc::new(VirtualBus::new());
    let vehicle = VehicleHandle::default();
    let ecu = Ecu::start(bus.clone(), config(), vehicle.reader()).unwrap();

    ecu.shutdown().await.unwrap();

    assert!(!bus.is_installed());
    assert_eq!(bus.calls().stop, 1);
    assert_eq!(bus.calls().uninstall, 1);
}

#[tokio::test]
async fn drop_releases_controller() {
    let bus = Arc::new(VirtualBus::new());
    let vehicle = VehicleHandle::default();

    {
        let _ecu = Ecu::start(bus.clone(), config(), vehicle.reader()).unwrap();
    }

    assert!(!bus.is_installed());
}

#[tokio::test]
async fn zero_queue_capacity_is_rejected() {
    let bus = Arc::new(VirtualBus::new());
    let vehicle = VehicleHandle::default();
    let config = EcuConfig {
        rx_queue_capacity: 0,
        ..config()
    };

    assert!(matches!(
        Ecu::start(bus.clone(), config, vehicle.reader()),
        Err(obd_emulator::Error::CanError(
            obd_emulator::can::error::Error::InvalidQueueCapacity(0)
        ))
    ));
    assert!(!bus.is_installed());
}

#[tokio::test]
async fn shutdown_aborts_stuck_responder() {
    let bus = Arc::new(VirtualBus::new());
    let vehicle = VehicleHandle::default();
    let config = EcuConfig {
        tx_timeout: Duration::from_secs(5),
        ..config()
    };
    let ecu = Ecu::start(bus.clone(), config, vehicle.reader()).unwrap();

    bus.delay_transmit(Some(Duration::from_millis(2500)));
    bus.inject(&query(0x01, 0x0d));
    assert!(wait_for(|| bus.calls().transmit == 1).await);

    let start = Instant::now();
    assert!(matches!(ecu.shutdown().await, Err(obd_emulator::Error::Timeout)));
    assert!(start.elapsed() < Duration::from_millis(2400));
    assert!(!bus.is_installed());
}

#[tokio::test]
async fn start_failure_is_reported() {
    let bus = Arc::new(VirtualBus::new());
    bus.fail_start(true);

    let vehicle = VehicleHandle::default();
    assert!(Ecu::start(bus.clone(), config(), vehicle.reader()).is_err());
    assert!(!bus.is_installed());
}
