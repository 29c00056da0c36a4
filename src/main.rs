#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlpilot_lib::run().await
}
