use crate::config::BootstrapConfig;
use crate::errors::StartupError;
use authz_engine::{AuthorizationService, RegisteredClient};
use log::info;

/// Registers the configured development client, replacing any previous
/// registration with the same client id.
pub async fn register_client(
    config: &BootstrapConfig,
    service: &AuthorizationService,
) -> Result<Option<RegisteredClient>, StartupError> {
    if !config.enabled {
        info!("Bootstrap client registration is disabled");
        return Ok(None);
    }

    let registration = config.registration().map_err(StartupError::Config)?;
    let client = service.registry().save(registration).await?;
    info!(
        "Registered bootstrap client '{}' with scopes [{}]",
        client.client_id,
        client.scopes.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    Ok(Some(client))
}
