//! Providers command handlers

use crate::cli::output::{format_providers_table, ProviderView};
use crate::cli::ProvidersListArgs;
use crate::config::CarbonConfig;

/// Handle `carbon providers list` command
pub fn handle_providers_list(
    args: &ProvidersListArgs,
) -> Result<String, Box<dyn std::error::Error>> {
    let config = CarbonConfig::load(Some(&args.config))?.with_env_overrides();
    config.validate()?;

    let views: Vec<ProviderView> = config.providers.iter().map(ProviderView::from).collect();

    if args.json {
        Ok(serde_json::to_string_pretty(&views)?)
    } else if views.is_empty() {
        Ok("No provider resources declared.".to_string())
    } else {
        Ok(format_providers_table(&views))
    }
}
