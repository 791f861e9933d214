#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sharmar_booking::run().await
}
