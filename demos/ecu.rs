use std::sync::Arc;
use std::time::Duration;

use obd_emulator::can::{Frame, VirtualBus};
use obd_emulator::ecu::{Ecu, EcuConfig};
use obd_emulator::vehicle::VehicleHandle;

fn query(mode: u8, pid: u8) -> Frame {
    Frame::new(0x7df.into(), &[0x02, mode, pid, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap()
}

async fn print_responses(bus: &VirtualBus) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    for frame in bus.take_transmitted() {
        let id: u32 = frame.id().into();
        println!("0x{:03x}\t{}", id, hex::encode(frame.data()));
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let bus = Arc::new(VirtualBus::new());
    let vehicle = VehicleHandle::default();
    let ecu = Ecu::start(bus.clone(), EcuConfig::default(), vehicle.reader()).unwrap();
    print_responses(&bus).await;

    vehicle.set_field("speed", "62");
    vehicle.set_field("rpm", "2150");
    vehicle.set_field("throttle", "18.5");

    for pid in [0x00, 0x05, 0x0c, 0x0d, 0x11, 0x2f] {
        bus.inject(&query(0x01, pid));
    }
    print_responses(&bus).await;

    bus.inject(&query(0x09, 0x02));
    print_responses(&bus).await;

    bus.inject(&Frame::new(0x7e0.into(), &[0x30, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap());
    print_responses(&bus).await;

    println!("{}", ecu.diagnostics().unwrap());
    ecu.shutdown().await.unwrap();
}
