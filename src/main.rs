#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    orchat::run().await
}
