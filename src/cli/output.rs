//! Output formatting helpers for CLI commands

use crate::config::ProviderResourceConfig;
use crate::resource::ProviderKind;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

/// View model for provider display
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderView {
    pub name: String,
    pub namespace: String,
    pub provider: String,
    pub zone: String,
    pub forecast_refresh_interval_hours: u32,
    pub live_refresh_interval_hours: u32,
}

impl From<&ProviderResourceConfig> for ProviderView {
    fn from(config: &ProviderResourceConfig) -> Self {
        let zone = match config.spec.provider {
            ProviderKind::WattTime => config
                .spec
                .watttime
                .as_ref()
                .map(|w| w.region.clone()),
            ProviderKind::ElectricityMaps => config
                .spec
                .electricitymaps
                .as_ref()
                .map(|e| e.zone.clone()),
            ProviderKind::Simulator => config.spec.simulator.as_ref().map(|s| s.zone.clone()),
        };

        Self {
            name: config.name.clone(),
            namespace: config.namespace.clone(),
            provider: config.spec.provider.to_string(),
            zone: zone.unwrap_or_else(|| "-".to_string()),
            forecast_refresh_interval_hours: config.spec.forecast_refresh_interval_hours,
            live_refresh_interval_hours: config.spec.live_refresh_interval_hours,
        }
    }
}

/// Format providers as a table
pub fn format_providers_table(providers: &[ProviderView]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Name",
        "Namespace",
        "Provider",
        "Zone",
        "Forecast (h)",
        "Live (h)",
    ]);

    for p in providers {
        let provider_str = match p.provider.as_str() {
            "watttime" => p.provider.cyan().to_string(),
            "electricitymaps" => p.provider.green().to_string(),
            _ => p.provider.yellow().to_string(),
        };

        table.add_row(vec![
            Cell::new(&p.name),
            Cell::new(&p.namespace),
            Cell::new(provider_str),
            Cell::new(&p.zone),
            Cell::new(p.forecast_refresh_interval_hours),
            Cell::new(p.live_refresh_interval_hours),
        ]);
    }

    table.to_string()
}
