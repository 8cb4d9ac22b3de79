use obd_emulator::ecu::{Ecu, EcuConfig};
use obd_emulator::socketcan::SocketCanController;
use obd_emulator::vehicle::VehicleHandle;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let interface = std::env::args().nth(1).unwrap_or_else(|| "vcan0".into());
    let vehicle = VehicleHandle::default();
    let ecu = Ecu::start(SocketCanController::new(&interface), EcuConfig::default(), vehicle.reader()).unwrap();

    let mut interval = tokio::time::interval(std::time::Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = interval.tick() => println!("{}", ecu.diagnostics().unwrap()),
        }
    }

    ecu.shutdown().await.unwrap();
}
