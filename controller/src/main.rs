mod app;
mod hardware;
#[cfg(feature = "rpi")]
mod rpi;
mod sensors;
#[cfg(not(feature = "rpi"))]
mod sim;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::run().await
}
