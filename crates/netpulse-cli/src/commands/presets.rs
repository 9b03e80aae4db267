// Preset download targets

use crate::output::{print_table_header, print_table_row, OutputFormat};
use anyhow::Result;
use netpulse_core::DownloadPreset;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct PresetEntry {
    name: &'static str,
    label: &'static str,
    url: &'static str,
}

/// CLI name of a preset, as accepted by `run --preset`
pub fn preset_name(preset: DownloadPreset) -> &'static str {
    match preset {
        DownloadPreset::Cloudflare100Mb => "cf-100mb",
        DownloadPreset::Cloudflare500Mb => "cf-500mb",
        DownloadPreset::Cloudflare1Gb => "cf-1gb",
    }
}

/// Look up a preset by its CLI name
pub fn find_preset(name: &str) -> Option<DownloadPreset> {
    DownloadPreset::ALL
        .into_iter()
        .find(|preset| preset_name(*preset) == name)
}

pub fn run(output: OutputFormat) -> Result<()> {
    let entries: Vec<PresetEntry> = DownloadPreset::ALL
        .into_iter()
        .map(|preset| PresetEntry {
            name: preset_name(preset),
            label: preset.label(),
            url: preset.url(),
        })
        .collect();

    if !output.is_text() {
        return output.print_value(&entries);
    }

    print_table_header(&[("NAME", 10), ("LABEL", 10), ("URL", 60)]);
    for entry in &entries {
        print_table_row(&[(entry.name, 10), (entry.label, 10), (entry.url, 60)]);
    }
    Ok(())
}
