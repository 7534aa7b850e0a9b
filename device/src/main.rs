#[cfg(feature = "esp32")]
mod esp;
#[cfg(not(feature = "esp32"))]
mod host;
#[cfg(not(feature = "esp32"))]
mod sim;

#[cfg(not(feature = "esp32"))]
fn main() -> anyhow::Result<()> {
    host::run()
}

#[cfg(feature = "esp32")]
fn main() -> anyhow::Result<()> {
    esp::run()
}
