//! Shared setup for commands that talk to the hub

use anyhow::{bail, Context, Result};

use crate::config::RuntimeContext;
use crate::connection::HubClient;
use crate::error::HubError;
use crate::rooms::ViewOptions;

/// Connect and wait until the local mirror is fully loaded
pub async fn connect(ctx: &RuntimeContext) -> Result<HubClient> {
    let settings = ctx.hub_settings()?;
    log::debug!("Connecting to {}", settings.websocket_url());

    let client = HubClient::new();
    client.configure_with(settings);
    client.connect()?;

    match client.wait_synced(ctx.sync_timeout()).await {
        Ok(()) => Ok(client),
        Err(HubError::AuthInvalid(_)) => {
            client.shutdown();
            bail!("Home Assistant rejected the access token. Run 'roomdeck setup' to replace it.")
        }
        Err(err) => {
            client.shutdown();
            Err(err).with_context(|| {
                format!(
                    "syncing with Home Assistant (state: {:?})",
                    client.state()
                )
            })
        }
    }
}

/// View options from the saved preferences and the `--all` flag
pub fn view_options(ctx: &RuntimeContext, all: bool) -> Result<ViewOptions> {
    let state = ctx.state_file().load()?;
    Ok(ViewOptions {
        filter: state.domain_filter(),
        show_hidden: all || state.show_hidden,
    })
}
