//! Offline race from synthetic reader traffic

use swimtag::{ArrivalRegister, ChecksumMode, Command, Frame, Reader, ReaderConfig, ReplayTransport};
use tokio_util::sync::CancellationToken;

fn inventory(last_epc_byte: u8, rssi: u8) -> Vec<u8> {
    let mut data = vec![0x01, 0x30, 0x00, 0xE2, 0x80, 0x11, 0x90, 0, 0, 0, 0, 0, 0, 0];
    data.extend([last_epc_byte, rssi]);
    Frame::with_data(0x01, Command::RealTimeInventory, data)
        .encode(ChecksumMode::Xor)
        .map(|frame| frame.to_vec())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> swimtag::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // Three swimmers, the second one seen twice, some line noise in between
    let mut wire = inventory(0x01, 0x48);
    wire.extend([0x00, 0x13, 0x37]);
    wire.extend(inventory(0x02, 0xC8));
    wire.extend(inventory(0x02, 0x50));
    wire.extend(inventory(0x03, 0x40));

    let config = ReaderConfig::default().with_antenna_base(1);
    let transport = ReplayTransport::from_bytes(wire, 9);
    let mut reader = Reader::with_transport(Box::new(transport), &config);
    reader.connect().await?;

    let register = ArrivalRegister::new();
    register.establish_point_zero()?;

    reader
        .run(&CancellationToken::new(), |event| {
            for tag in event.events() {
                if let Ok(Some(record)) = register.register_arrival(tag) {
                    println!("{}", record);
                }
            }
        })
        .await?;

    let mut csv = Vec::new();
    swimtag::report::write_results_csv(&register.finalize(), &mut csv)?;
    println!("{}", String::from_utf8_lossy(&csv));

    Ok(())
}
