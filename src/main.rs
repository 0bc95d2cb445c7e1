use once_cell::sync::OnceCell;
use single_instance::SingleInstance;

mod services;
mod util;

static CONFIG_INSTANCE: OnceCell<Config> = OnceCell::new();

const WELL_KNOWN_NAME: &str = "org.freedesktop.impl.portal.desktop.dialog";

const PICKER_COMMAND_ENV: &str = "XDP_DIALOG_PICKER";
const DEFAULT_PICKER_COMMAND: &str = "/usr/local/bin/qtfiledialog";

#[derive(Debug)]
pub struct Config {
    picker_command: String,
}

impl Config {
    pub fn global() -> &'static Self {
        CONFIG_INSTANCE.get().expect("config is not initialized")
    }

    pub fn picker_command(&self) -> &str {
        &self.picker_command
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let instance = SingleInstance::new(&format!("xdp-dialog-{}", std::env::var("USER")?))?;
    if !instance.is_single() {
        log::error!("Another instance is already running!");
        return Ok(());
    }

    let picker_command = std::env::var(PICKER_COMMAND_ENV)
        .unwrap_or_else(|_| DEFAULT_PICKER_COMMAND.to_string());
    CONFIG_INSTANCE.set(Config { picker_command }).unwrap();

    let connection = zbus::ConnectionBuilder::session()?
        .internal_executor(false)
        .build()
        .await?;

    let handle = {
        let connection = connection.clone();
        tokio::spawn(async move {
            loop {
                connection.executor().tick().await;
            }
        })
    };

    connection.request_name(WELL_KNOWN_NAME).await?;

    services::init_all(&connection).await?;

    log::info!("all services initialized");

    handle.await?;

    connection.release_name(WELL_KNOWN_NAME).await?;

    Ok(())
}
