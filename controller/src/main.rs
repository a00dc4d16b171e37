mod host;
mod rest;
mod statestream;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
