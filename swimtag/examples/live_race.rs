//! Live race example

use std::time::Duration;

use swimtag::{ArrivalRegister, Reader, ReaderConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> swimtag::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // SWIMTAG_READER_IP / SWIMTAG_READER_PORT override the factory address
    let config = ReaderConfig::default().apply_env()?;

    let mut reader = Reader::new(&config).with_duration(Duration::from_secs(60));
    reader.connect().await?;

    let register = ArrivalRegister::new();
    register.establish_point_zero()?;

    let reason = reader
        .run(&CancellationToken::new(), |event| {
            for tag in event.events() {
                if let Ok(Some(record)) = register.register_arrival(tag) {
                    println!("{}", record);
                }
            }
        })
        .await?;

    let result = register.finalize();
    println!("Stopped ({:?}) with {} arrivals", reason, result.len());

    Ok(())
}
