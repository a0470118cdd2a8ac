use anyhow::Result;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tokencraft_cli::run().await?;
    Ok(())
}
